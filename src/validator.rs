//! Career page validation.
//!
//! A candidate page is scored by an ordered list of rules over an
//! [`Assessment`] accumulator: content signals first, then the negative
//! keyword downgrade, then the placeholder-title override, and the URL
//! keyword override last. Later rules see what earlier ones decided, so
//! the order is the tie-break.

use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

use crate::models::{Confidence, ValidationResult};
use crate::page::{extract_as, null_as_default, ExtractSchema, PageActions};

const POSITIVE_KEYWORDS: &[&str] = &[
    "jobs",
    "stellenangebote",
    "positionen",
    "bewerbung",
    "karriere",
    "job",
    "career",
];

const NEGATIVE_KEYWORDS: &[&str] = &["news", "about", "contact", "product", "service", "über uns"];

const PLACEHOLDER_TITLES: &[&str] = &["jobs", "willkommen im team", "company news", "about us"];

const STRONG_URL_KEYWORDS: &[&str] = &["stellenangebote", "stellen"];

const CAREER_URL_KEYWORDS: &[&str] = &["job", "career", "karriere", "bewerbung"];

const VALIDATION_INSTRUCTION: &str = "Check whether this page is a careers page. Report the page title, \
    all headings, whether job listings (Stellenangebote) are visible, whether an application form \
    (Bewerbungsformular) is present, the link to the job listings overview if this page only links \
    to it, and a short summary of the general text content.";

/// What the extraction primitive reports about a candidate page.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct PageSignals {
    pub title: Option<String>,
    #[serde(deserialize_with = "null_as_default")]
    pub headings: Vec<String>,
    pub has_job_listings: Option<bool>,
    pub has_application_form: Option<bool>,
    pub link_to_job_listing_overview: Option<String>,
    pub content: Option<String>,
}

impl PageSignals {
    fn combined_text(&self) -> String {
        let mut parts: Vec<&str> = Vec::new();
        if let Some(title) = &self.title {
            parts.push(title);
        }
        parts.extend(self.headings.iter().map(|h| h.as_str()));
        if let Some(content) = &self.content {
            parts.push(content);
        }
        parts.join(" ").to_lowercase()
    }
}

pub fn page_validation_schema() -> ExtractSchema {
    ExtractSchema {
        name: "page_validation",
        schema: json!({
            "type": "object",
            "properties": {
                "title": { "type": ["string", "null"], "description": "The page title" },
                "headings": { "type": "array", "items": { "type": "string" }, "description": "Headings on the page" },
                "hasJobListings": { "type": "boolean", "description": "Whether there are visible job listings" },
                "hasApplicationForm": { "type": "boolean", "description": "Whether there is an application form" },
                "linkToJobListingOverview": { "type": ["string", "null"], "description": "The link to the page that contains the job listings" },
                "content": { "type": ["string", "null"], "description": "General text content of the page" }
            },
            "required": ["hasJobListings", "hasApplicationForm"]
        }),
    }
}

/// Strips scheme, leading `www.` and trailing slash, lowercased.
pub fn normalize_url(url: &str) -> String {
    let lower = url.trim().to_lowercase();
    let without_scheme = lower
        .strip_prefix("https://")
        .or_else(|| lower.strip_prefix("http://"))
        .unwrap_or(&lower);
    let without_www = without_scheme.strip_prefix("www.").unwrap_or(without_scheme);
    without_www.trim_end_matches('/').to_string()
}

// --- Rule pipeline ---

#[derive(Debug, Clone)]
pub struct Assessment {
    pub confidence: Confidence,
    pub notes: Vec<String>,
}

type Rule = fn(Assessment, &PageSignals, &str) -> Assessment;

const RULES: &[Rule] = &[content_signals, negative_keywords, placeholder_title, url_keywords];

fn content_signals(mut acc: Assessment, signals: &PageSignals, _url: &str) -> Assessment {
    let text = signals.combined_text();
    let matches: Vec<&str> = POSITIVE_KEYWORDS
        .iter()
        .copied()
        .filter(|k| text.contains(k))
        .collect();

    acc.confidence = match matches.len() {
        0 => Confidence::Low,
        1 => Confidence::Medium,
        _ => Confidence::High,
    };
    if matches.is_empty() {
        acc.notes.push("No career keywords in page content".to_string());
    } else {
        acc.notes
            .push(format!("Career keywords in page content: {}", matches.join(", ")));
    }

    if signals.has_job_listings == Some(true) {
        acc.confidence = Confidence::High;
        acc.notes.push("Page contains visible job listings".to_string());
    }
    if signals.has_application_form == Some(true) {
        acc.confidence = Confidence::High;
        acc.notes.push("Page contains an application form".to_string());
    }
    acc
}

fn negative_keywords(mut acc: Assessment, signals: &PageSignals, _url: &str) -> Assessment {
    let text = signals.combined_text();
    if let Some(keyword) = NEGATIVE_KEYWORDS.iter().find(|k| text.contains(*k)) {
        let downgraded = acc.confidence.downgrade();
        acc.notes.push(format!(
            "Negative keyword '{}' present, {} -> {}",
            keyword, acc.confidence, downgraded
        ));
        acc.confidence = downgraded;
    }
    acc
}

fn placeholder_title(mut acc: Assessment, signals: &PageSignals, _url: &str) -> Assessment {
    if let Some(placeholder) = find_placeholder(signals) {
        acc.confidence = Confidence::Low;
        acc.notes
            .push(format!("Generic placeholder title '{}' detected", placeholder));
    }
    acc
}

fn find_placeholder(signals: &PageSignals) -> Option<&'static str> {
    let text = signals.combined_text();
    PLACEHOLDER_TITLES
        .iter()
        .copied()
        .find(|placeholder| text.contains(placeholder))
}

fn url_keywords(mut acc: Assessment, _signals: &PageSignals, url: &str) -> Assessment {
    let url = url.to_lowercase();
    if STRONG_URL_KEYWORDS.iter().any(|k| url.contains(k)) {
        acc.confidence = Confidence::High;
        acc.notes
            .push("URL contains stellenangebote-related keywords".to_string());
    } else if CAREER_URL_KEYWORDS.iter().any(|k| url.contains(k)) {
        acc.notes.push("URL contains career-related keywords".to_string());
        if acc.confidence == Confidence::Low {
            acc.confidence = Confidence::Medium;
        }
    }
    acc
}

/// Runs the rule list over already extracted signals.
pub fn assess(signals: &PageSignals, url: &str) -> Assessment {
    let start = Assessment {
        confidence: Confidence::Low,
        notes: Vec::new(),
    };
    RULES.iter().fold(start, |acc, rule| rule(acc, signals, url))
}

pub struct CareerPageValidator;

impl CareerPageValidator {
    pub fn validate<P: PageActions + ?Sized>(
        page: &mut P,
        candidate_url: &str,
        homepage_url: &str,
    ) -> ValidationResult {
        if normalize_url(candidate_url) == normalize_url(homepage_url) {
            return ValidationResult::low("URL is same as website homepage");
        }

        let signals: PageSignals =
            match extract_as(page, VALIDATION_INSTRUCTION, &page_validation_schema()) {
                Ok(signals) => signals,
                Err(e) => {
                    debug!("validation extraction failed for {}: {}", candidate_url, e);
                    return ValidationResult::low(format!("Validation error: {}", e));
                }
            };

        let assessment = assess(&signals, candidate_url);
        info!(
            url = candidate_url,
            confidence = %assessment.confidence,
            "validated candidate page"
        );

        ValidationResult {
            confidence: assessment.confidence,
            notes: assessment.notes,
            job_listings_page_link: signals
                .link_to_job_listing_overview
                .filter(|link| !link.trim().is_empty()),
        }
    }
}
