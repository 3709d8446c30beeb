use serde::{Deserialize, Serialize};
use std::fmt;

/// A row of the company CSV. `careers_url` is a cache: once set, discovery
/// is skipped unless the caller forces a reprocess.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyInput {
    pub name: String,
    pub website: String,
    pub careers_url: Option<String>,
}

impl CompanyInput {
    pub fn new(name: &str, website: &str) -> Self {
        Self {
            name: name.to_string(),
            website: website.to_string(),
            careers_url: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Confidence {
    Low,
    Medium,
    High,
}

impl Confidence {
    pub fn downgrade(self) -> Self {
        match self {
            Confidence::High => Confidence::Medium,
            Confidence::Medium | Confidence::Low => Confidence::Low,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Confidence::High => "high",
            Confidence::Medium => "medium",
            Confidence::Low => "low",
        }
    }
}

impl fmt::Display for Confidence {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationResult {
    pub confidence: Confidence,
    pub notes: Vec<String>,
    pub job_listings_page_link: Option<String>,
}

impl ValidationResult {
    pub fn low(note: impl Into<String>) -> Self {
        Self {
            confidence: Confidence::Low,
            notes: vec![note.into()],
            job_listings_page_link: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CareerDiscoveryResult {
    pub url: Option<String>,
    pub discovered: bool,
    pub confidence: Confidence,
    pub notes: Vec<String>,
}

impl CareerDiscoveryResult {
    pub fn not_found(notes: Vec<String>) -> Self {
        Self {
            url: None,
            discovered: false,
            confidence: Confidence::Low,
            notes,
        }
    }
}

/// Untrusted job record straight out of the extraction primitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedJob {
    pub title: String,
    pub description: String,
    pub location: Option<String>,
    pub job_type: Option<String>,
    pub url: Option<String>,
    pub language_of_listing: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum JobType {
    FullTime,
    PartTime,
    Contract,
    Internship,
    Remote,
    Hybrid,
    Unknown,
    /// Value that matched no synonym group, kept verbatim for manual review.
    Unmapped(String),
}

impl JobType {
    pub fn as_str(&self) -> &str {
        match self {
            JobType::FullTime => "full-time",
            JobType::PartTime => "part-time",
            JobType::Contract => "contract",
            JobType::Internship => "internship",
            JobType::Remote => "remote",
            JobType::Hybrid => "hybrid",
            JobType::Unknown => "unknown",
            JobType::Unmapped(raw) => raw,
        }
    }
}

impl Serialize for JobType {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for JobType {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(match raw.as_str() {
            "full-time" => JobType::FullTime,
            "part-time" => JobType::PartTime,
            "contract" => JobType::Contract,
            "internship" => JobType::Internship,
            "remote" => JobType::Remote,
            "hybrid" => JobType::Hybrid,
            "unknown" => JobType::Unknown,
            _ => JobType::Unmapped(raw),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Language {
    #[serde(rename = "de")]
    German,
    #[serde(rename = "en")]
    English,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobListing {
    pub id: uuid::Uuid,
    pub company: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub job_type: Option<JobType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language_of_listing: Option<Language>,
    pub scrape_timestamp: String,
    pub scrape_run_id: uuid::Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScrapingMetadata {
    pub run_id: uuid::Uuid,
    pub run_timestamp: String,
    pub total_jobs: usize,
    pub companies_processed: usize,
    pub companies_successful: usize,
    pub companies_failed: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobsOutput {
    pub metadata: ScrapingMetadata,
    pub jobs: Vec<JobListing>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_ordering_and_downgrade() {
        assert!(Confidence::High > Confidence::Medium);
        assert!(Confidence::Medium > Confidence::Low);
        assert_eq!(Confidence::High.downgrade(), Confidence::Medium);
        assert_eq!(Confidence::Medium.downgrade(), Confidence::Low);
        assert_eq!(Confidence::Low.downgrade(), Confidence::Low);
    }

    #[test]
    fn test_job_type_serializes_as_plain_string() {
        let json = serde_json::to_string(&JobType::FullTime).unwrap();
        assert_eq!(json, "\"full-time\"");

        let json = serde_json::to_string(&JobType::Unmapped("Werkstudent".to_string())).unwrap();
        assert_eq!(json, "\"Werkstudent\"");

        let parsed: JobType = serde_json::from_str("\"Werkstudent\"").unwrap();
        assert_eq!(parsed, JobType::Unmapped("Werkstudent".to_string()));
    }

    #[test]
    fn test_job_listing_uses_camel_case_keys() {
        let listing = JobListing {
            id: uuid::Uuid::new_v4(),
            company: "Acme GmbH".to_string(),
            title: "Entwickler".to_string(),
            description: None,
            location: Some("Berlin".to_string()),
            job_type: Some(JobType::PartTime),
            url: None,
            language_of_listing: Some(Language::German),
            scrape_timestamp: "2024-01-01T00:00:00Z".to_string(),
            scrape_run_id: uuid::Uuid::new_v4(),
        };

        let value = serde_json::to_value(&listing).unwrap();
        assert_eq!(value["type"], "part-time");
        assert_eq!(value["languageOfListing"], "de");
        assert!(value.get("scrapeRunId").is_some());
        assert!(value.get("description").is_none());
    }
}
