use anyhow::{anyhow, Context, Result};
use serde::Serialize;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::models::{CompanyInput, JobListing, JobsOutput, ScrapingMetadata};

const CAREERS_HEADERS: &[&str] = &[
    "careerspage",
    "careers page",
    "careers-url",
    "careers_url",
    "careers",
    "career",
    "karriereseite",
    "karriere",
];

const NAME_HEADERS: &[&str] = &[
    "name",
    "company",
    "company name",
    "company_name",
    "companyname",
    "unternehmen",
    "firma",
    "firmenname",
    "gesellschaft",
];

const WEBSITE_HEADERS: &[&str] = &[
    "website",
    "url",
    "site",
    "web",
    "homepage",
    "website url",
    "website_url",
    "webseite",
    "internetseite",
    "webadresse",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Column {
    Name,
    Website,
    Careers,
}

// Careers first: "careers_url" would otherwise be taken for a website column.
fn classify_header(header: &str) -> Option<Column> {
    let h = header.trim().trim_start_matches('\u{feff}').to_lowercase();
    if CAREERS_HEADERS.contains(&h.as_str()) {
        Some(Column::Careers)
    } else if NAME_HEADERS.contains(&h.as_str()) {
        Some(Column::Name)
    } else if WEBSITE_HEADERS.contains(&h.as_str()) {
        Some(Column::Website)
    } else {
        None
    }
}

/// `;` when the header line has more semicolons than commas, as in German Excel exports.
fn detect_delimiter(content: &str) -> u8 {
    let header = content.lines().next().unwrap_or_default();
    let semicolons = header.matches(';').count();
    let commas = header.matches(',').count();
    if semicolons > commas { b';' } else { b',' }
}

/// Adds `https://` when no scheme is present. `None` if the result is not a URL.
pub fn ensure_url_protocol(raw: &str) -> Option<String> {
    let raw = raw.trim();
    if raw.is_empty() {
        return None;
    }
    let candidate = if raw.contains("://") {
        raw.to_string()
    } else {
        format!("https://{}", raw)
    };
    url::Url::parse(&candidate)
        .ok()
        .filter(|u| u.host_str().is_some())
        .map(|u| u.to_string())
}

pub fn read_companies(path: &Path) -> Result<Vec<CompanyInput>> {
    if !path.exists() {
        return Err(anyhow!("CSV file not found: {}", path.display()));
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(detect_delimiter(&content))
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());

    let mut name_col = None;
    let mut website_col = None;
    let mut careers_col = None;
    for (idx, header) in reader.headers()?.iter().enumerate() {
        match classify_header(header) {
            Some(Column::Name) if name_col.is_none() => name_col = Some(idx),
            Some(Column::Website) if website_col.is_none() => website_col = Some(idx),
            Some(Column::Careers) if careers_col.is_none() => careers_col = Some(idx),
            _ => {}
        }
    }
    let (Some(name_col), Some(website_col)) = (name_col, website_col) else {
        return Err(anyhow!(
            "{} needs a name column and a website column (e.g. Name, Website)",
            path.display()
        ));
    };

    let mut companies = Vec::new();
    for (line, record) in reader.records().enumerate() {
        let record = record.with_context(|| format!("Malformed CSV row {}", line + 2))?;
        let name = record.get(name_col).unwrap_or_default();
        let website = record.get(website_col).unwrap_or_default();

        if name.chars().count() < 2 {
            warn!("Skipping row {}: invalid company name '{}'", line + 2, name);
            continue;
        }
        let Some(website) = ensure_url_protocol(website).filter(|_| website.chars().count() >= 4) else {
            warn!("Skipping {}: invalid website '{}'", name, website);
            continue;
        };

        let careers_url = careers_col
            .and_then(|idx| record.get(idx))
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .map(str::to_string);

        companies.push(CompanyInput {
            name: name.to_string(),
            website,
            careers_url,
        });
    }

    info!("Read {} companies from {}", companies.len(), path.display());
    Ok(companies)
}

pub fn write_companies(path: &Path, companies: &[CompanyInput]) -> Result<()> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(path)
        .with_context(|| format!("Failed to open {} for writing", path.display()))?;

    writer.write_record(["Name", "Website", "CareersPage"])?;
    for company in companies {
        writer.write_record([
            company.name.as_str(),
            company.website.as_str(),
            company.careers_url.as_deref().unwrap_or(""),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Serialize)]
struct JobsOutputView<'a> {
    metadata: &'a ScrapingMetadata,
    jobs: &'a [JobListing],
}

pub fn write_jobs_json(path: &Path, jobs: &[JobListing], metadata: &ScrapingMetadata) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(&JobsOutputView { metadata, jobs })?;
    fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))?;
    info!("Wrote {} jobs to {}", jobs.len(), path.display());
    Ok(())
}

pub fn read_jobs_json(path: &Path) -> Result<JobsOutput> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("{} is not a jobs output file", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::JobType;
    use std::path::PathBuf;

    fn temp_path(ext: &str) -> PathBuf {
        std::env::temp_dir().join(format!("jobscout-test-{}.{}", uuid::Uuid::new_v4(), ext))
    }

    fn write_temp(content: &str) -> PathBuf {
        let path = temp_path("csv");
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn test_ensure_url_protocol() {
        assert_eq!(ensure_url_protocol("acme.example").as_deref(), Some("https://acme.example/"));
        assert_eq!(
            ensure_url_protocol(" http://acme.example/karriere ").as_deref(),
            Some("http://acme.example/karriere")
        );
        assert_eq!(ensure_url_protocol(""), None);
        assert_eq!(ensure_url_protocol("not a url"), None);
    }

    #[test]
    fn test_classify_header_prefers_careers() {
        assert_eq!(classify_header("Careers_URL"), Some(Column::Careers));
        assert_eq!(classify_header(" Unternehmen "), Some(Column::Name));
        assert_eq!(classify_header("Webseite"), Some(Column::Website));
        assert_eq!(classify_header("\u{feff}Name"), Some(Column::Name));
        assert_eq!(classify_header("Branche"), None);
    }

    #[test]
    fn test_read_companies_comma_separated() {
        let path = write_temp(
            "Name,Website,CareersPage\n\
             Acme GmbH,acme.example,\n\
             Beta AG,https://beta.example,https://beta.example/jobs\n",
        );

        let companies = read_companies(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(companies.len(), 2);
        assert_eq!(companies[0].website, "https://acme.example/");
        assert_eq!(companies[0].careers_url, None);
        assert_eq!(companies[1].careers_url.as_deref(), Some("https://beta.example/jobs"));
    }

    #[test]
    fn test_read_companies_semicolon_german_headers() {
        let path = write_temp(
            "Firma;Webseite;Karriereseite\n\
             Müller & Söhne KG;mueller.example;\n\
             X;x.example;\n\
             Ohne Webseite;;\n",
        );

        let companies = read_companies(&path).unwrap();
        fs::remove_file(&path).ok();

        assert_eq!(companies.len(), 1);
        assert_eq!(companies[0].name, "Müller & Söhne KG");
        assert_eq!(companies[0].website, "https://mueller.example/");
    }

    #[test]
    fn test_read_companies_missing_file() {
        let result = read_companies(&temp_path("csv"));
        assert!(result.unwrap_err().to_string().contains("CSV file not found"));
    }

    #[test]
    fn test_read_companies_requires_name_and_website_columns() {
        let path = write_temp("Branche,Ort\nMetall,Köln\n");
        let result = read_companies(&path);
        fs::remove_file(&path).ok();
        assert!(result.is_err());
    }

    #[test]
    fn test_write_companies_then_read_back() {
        let path = temp_path("csv");
        let mut acme = CompanyInput::new("Acme, Inc.", "https://acme.example/");
        acme.careers_url = Some("https://acme.example/stellenangebote".to_string());
        let companies = vec![acme, CompanyInput::new("Beta AG", "https://beta.example/")];

        write_companies(&path, &companies).unwrap();
        let written = fs::read_to_string(&path).unwrap();
        let reread = read_companies(&path).unwrap();
        fs::remove_file(&path).ok();

        assert!(written.starts_with("Name,Website,CareersPage\n"));
        assert!(written.contains("\"Acme, Inc.\""));
        assert_eq!(reread, companies);
    }

    #[test]
    fn test_write_jobs_json_creates_parent_dir() {
        let dir = std::env::temp_dir().join(format!("jobscout-test-{}", uuid::Uuid::new_v4()));
        let path = dir.join("public").join("jobs.json");
        let run_id = uuid::Uuid::new_v4();
        let metadata = ScrapingMetadata {
            run_id,
            run_timestamp: "2024-05-01T10:00:00Z".to_string(),
            total_jobs: 1,
            companies_processed: 1,
            companies_successful: 1,
            companies_failed: 0,
        };
        let jobs = vec![JobListing {
            id: uuid::Uuid::new_v4(),
            company: "Acme GmbH".to_string(),
            title: "Schlosser".to_string(),
            description: None,
            location: None,
            job_type: Some(JobType::FullTime),
            url: None,
            language_of_listing: None,
            scrape_timestamp: "2024-05-01T10:00:00Z".to_string(),
            scrape_run_id: run_id,
        }];

        write_jobs_json(&path, &jobs, &metadata).unwrap();
        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let output = read_jobs_json(&path).unwrap();
        fs::remove_dir_all(&dir).ok();

        assert_eq!(raw["metadata"]["totalJobs"], 1);
        assert_eq!(raw["jobs"][0]["type"], "full-time");
        assert_eq!(output.metadata, metadata);
        assert_eq!(output.jobs, jobs);
    }
}
