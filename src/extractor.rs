use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::models::ExtractedJob;
use crate::page::{extract_as, null_as_default, ActTarget, ExtractSchema, LoadState, PageActions, PageError};

const JOBS_INSTRUCTION: &str = "Extract all job listings visible on this careers page, including \
    title, description, location, job type, the URL of the individual posting and the language the \
    listing is written in. Include listings in English and German (Stellenangebote, Arbeitsplätze).";

const LOAD_MORE_INSTRUCTION: &str = "Click 'load more jobs', 'show more positions', \
    'Mehr laden', 'Weitere Stellen anzeigen' or 'Mehr Jobs anzeigen'";

const PAGINATION_WAIT_MS: u64 = 2000;
const PAGINATION_SETTLE_TIMEOUT_MS: u64 = 10_000;

/// One initial pass plus at most one "load more" pass.
pub const MAX_EXTRACTION_PASSES: usize = 2;

// Items stay untyped so one malformed entry does not sink the whole pass.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct RawJobPage {
    #[serde(deserialize_with = "null_as_default")]
    jobs: Vec<Value>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
struct RawJob {
    title: Option<String>,
    description: Option<String>,
    location: Option<String>,
    #[serde(rename = "type")]
    job_type: Option<String>,
    url: Option<String>,
    language_of_listing: Option<String>,
}

pub fn job_listings_schema() -> ExtractSchema {
    ExtractSchema {
        name: "job_listings",
        schema: json!({
            "type": "object",
            "properties": {
                "jobs": {
                    "type": "array",
                    "items": {
                        "type": "object",
                        "properties": {
                            "title": { "type": "string", "description": "Job title" },
                            "description": { "type": "string", "description": "Short description of the position" },
                            "location": { "type": ["string", "null"], "description": "Work location" },
                            "type": { "type": ["string", "null"], "description": "Employment type, e.g. Vollzeit, Teilzeit, Praktikum" },
                            "url": { "type": ["string", "null"], "description": "Link to the individual job posting" },
                            "languageOfListing": { "type": ["string", "null"], "description": "Language of the listing: de or en" }
                        },
                        "required": ["title", "description"]
                    }
                }
            },
            "required": ["jobs"]
        }),
    }
}

/// Absolute http(s), root-relative, or anything with a dot (document links, bare hosts).
pub fn is_plausible_job_url(url: &str) -> bool {
    let url = url.trim();
    if url.is_empty() {
        return false;
    }
    url.starts_with("http://") || url.starts_with("https://") || url.starts_with('/') || url.contains('.')
}

/// Resolves a relative posting link against the careers page.
fn resolve_job_url(url: &str, careers_url: &str) -> String {
    match url::Url::parse(url) {
        Ok(_) => url.to_string(),
        Err(_) => url::Url::parse(careers_url)
            .and_then(|base| base.join(url))
            .map(|u| u.to_string())
            .unwrap_or_else(|_| url.to_string()),
    }
}

fn to_extracted(raw: RawJob, careers_url: &str) -> ExtractedJob {
    let url = raw
        .url
        .map(|u| u.trim().to_string())
        .filter(|u| is_plausible_job_url(u))
        .map(|u| resolve_job_url(&u, careers_url))
        .unwrap_or_else(|| careers_url.to_string());

    ExtractedJob {
        title: raw.title.unwrap_or_default(),
        description: raw.description.unwrap_or_default(),
        location: raw.location,
        job_type: raw.job_type,
        url: Some(url),
        language_of_listing: raw.language_of_listing,
    }
}

pub struct JobListingExtractor<'a, P: PageActions + ?Sized> {
    page: &'a mut P,
}

impl<'a, P: PageActions + ?Sized> JobListingExtractor<'a, P> {
    pub fn new(page: &'a mut P) -> Self {
        Self { page }
    }

    /// Extracts from the current page, then follows one "load more" control.
    /// Errors end extraction but keep what was already collected.
    pub fn extract_all(&mut self, careers_url: &str) -> Vec<ExtractedJob> {
        let mut jobs = Vec::new();

        match self.extract_pass(careers_url) {
            Ok(batch) => jobs.extend(batch),
            Err(e) => {
                warn!("Job extraction failed on {}: {}", careers_url, e);
                return jobs;
            }
        }
        info!("Extracted {} jobs from {}", jobs.len(), careers_url);

        for _ in 1..MAX_EXTRACTION_PASSES {
            match self.load_more() {
                Ok(true) => {}
                Ok(false) => break,
                Err(e) => {
                    debug!("pagination failed: {}", e);
                    break;
                }
            }
            match self.extract_pass(careers_url) {
                Ok(batch) => {
                    jobs.extend(batch);
                    info!("Total jobs after pagination: {}", jobs.len());
                }
                Err(e) => {
                    warn!("Extraction after pagination failed, keeping {} jobs: {}", jobs.len(), e);
                    break;
                }
            }
        }

        jobs
    }

    fn extract_pass(&mut self, careers_url: &str) -> Result<Vec<ExtractedJob>, PageError> {
        let page: RawJobPage = extract_as(&mut *self.page, JOBS_INSTRUCTION, &job_listings_schema())?;
        Ok(page
            .jobs
            .into_iter()
            .filter_map(|item| match serde_json::from_value::<RawJob>(item) {
                Ok(raw) => Some(raw),
                Err(e) => {
                    debug!("skipping malformed job entry: {}", e);
                    None
                }
            })
            .map(|raw| to_extracted(raw, careers_url))
            .collect())
    }

    fn load_more(&mut self) -> Result<bool, PageError> {
        let actions = self.page.observe(LOAD_MORE_INSTRUCTION)?;
        let Some(action) = actions.first() else {
            return Ok(false);
        };
        debug!("Found load more control: {}", action.description);
        self.page.act(ActTarget::Candidate(action))?;
        if let Err(e) = self.page.wait_for_load_state(LoadState::NetworkIdle, PAGINATION_SETTLE_TIMEOUT_MS) {
            debug!("page did not settle after load more: {}", e);
        }
        self.page.wait_for_timeout(PAGINATION_WAIT_MS);
        Ok(true)
    }
}
