use chrono::Utc;
use regex::Regex;
use std::collections::HashMap;
use std::fmt::Write as _;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::models::{ExtractedJob, JobListing, JobType, Language};

pub const MAX_DESCRIPTION_CHARS: usize = 5000;

// Checked top to bottom; the first group with a matching term wins.
const JOB_TYPE_SYNONYMS: &[(JobType, &[&str])] = &[
    (
        JobType::FullTime,
        &["full", "vollzeit", "festanstellung", "unbefristet", "permanent"],
    ),
    (JobType::PartTime, &["part", "teilzeit", "minijob", "geringfügig"]),
    (
        JobType::Contract,
        &[
            "contract",
            "freelance",
            "befristet",
            "zeitarbeit",
            "projektarbeit",
            "freiberuflich",
            "selbstständig",
        ],
    ),
    (
        JobType::Internship,
        &["intern", "praktikum", "praktikant", "trainee", "volontariat", "ausbildung"],
    ),
    (JobType::Remote, &["remote", "home", "homeoffice", "fernarbeit", "mobil"]),
    (JobType::Hybrid, &["hybrid", "flexibel", "mixed"]),
];

/// Trim and collapse runs of whitespace (including newlines and tabs) to one space.
pub fn clean_text(text: &str) -> String {
    static WHITESPACE: OnceLock<Regex> = OnceLock::new();
    let re = WHITESPACE.get_or_init(|| Regex::new(r"\s+").unwrap());
    re.replace_all(text.trim(), " ").into_owned()
}

fn truncate_chars(text: String, max: usize) -> String {
    match text.char_indices().nth(max) {
        Some((idx, _)) => text[..idx].to_string(),
        None => text,
    }
}

fn non_empty(text: String) -> Option<String> {
    if text.is_empty() { None } else { Some(text) }
}

pub fn normalize_job_type(raw: &str) -> JobType {
    let lowered = raw.trim().to_lowercase();
    JOB_TYPE_SYNONYMS
        .iter()
        .find(|(_, terms)| terms.iter().any(|t| lowered.contains(t)))
        .map(|(job_type, _)| job_type.clone())
        .unwrap_or_else(|| JobType::Unmapped(raw.trim().to_string()))
}

pub fn normalize_language(raw: &str) -> Option<Language> {
    match raw.trim().to_lowercase().as_str() {
        "de" | "deutsch" | "german" => Some(Language::German),
        "en" | "englisch" | "english" => Some(Language::English),
        _ => None,
    }
}

/// Turns one extracted record into a listing. `None` when title or company is blank.
pub fn clean(raw: ExtractedJob, company: &str, run_id: Uuid) -> Option<JobListing> {
    let title = clean_text(&raw.title);
    let company = clean_text(company);
    if title.is_empty() || company.is_empty() {
        return None;
    }

    let description = non_empty(truncate_chars(clean_text(&raw.description), MAX_DESCRIPTION_CHARS));
    let location = raw.location.map(|l| clean_text(&l)).and_then(non_empty);
    let job_type = raw
        .job_type
        .filter(|t| !t.trim().is_empty())
        .map(|t| normalize_job_type(&t));
    let url = raw.url.map(|u| u.trim().to_string()).and_then(non_empty);
    let language_of_listing = raw.language_of_listing.as_deref().and_then(normalize_language);

    Some(JobListing {
        id: Uuid::new_v4(),
        company,
        title,
        description,
        location,
        job_type,
        url,
        language_of_listing,
        scrape_timestamp: Utc::now().to_rfc3339(),
        scrape_run_id: run_id,
    })
}

fn description_len(job: &JobListing) -> usize {
    job.description.as_deref().map(|d| d.chars().count()).unwrap_or(0)
}

/// Collapses listings sharing (title, company), case-insensitively. The record with
/// the longer description wins; first-seen order is kept.
pub fn dedupe(jobs: Vec<JobListing>) -> Vec<JobListing> {
    let mut index: HashMap<(String, String), usize> = HashMap::new();
    let mut kept: Vec<JobListing> = Vec::with_capacity(jobs.len());

    for job in jobs {
        let key = (job.title.to_lowercase(), job.company.to_lowercase());
        match index.get(&key) {
            Some(&i) => {
                if description_len(&job) > description_len(&kept[i]) {
                    kept[i] = job;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(job);
            }
        }
    }

    kept
}

/// Cleans and dedupes everything extracted for one company.
pub fn clean_batch(raw: Vec<ExtractedJob>, company: &str, run_id: Uuid) -> Vec<JobListing> {
    let cleaned = raw
        .into_iter()
        .filter_map(|job| clean(job, company, run_id))
        .collect();
    dedupe(cleaned)
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CleaningReport {
    pub original_count: usize,
    pub invalid_removed: usize,
    pub duplicates_removed: usize,
    pub final_count: usize,
    pub with_location: usize,
    pub with_type: usize,
    pub with_url: usize,
    pub avg_title_len: usize,
    pub avg_description_len: usize,
}

impl CleaningReport {
    pub fn render(&self) -> String {
        let success_rate = if self.original_count == 0 {
            0.0
        } else {
            self.final_count as f64 / self.original_count as f64 * 100.0
        };

        let mut out = String::new();
        let _ = writeln!(out, "Job Processing Quality Report");
        let _ = writeln!(out, "================================");
        let _ = writeln!(out, "Original jobs: {}", self.original_count);
        let _ = writeln!(out, "Invalid jobs removed: {}", self.invalid_removed);
        let _ = writeln!(out, "Duplicates removed: {}", self.duplicates_removed);
        let _ = writeln!(out, "Final job count: {}", self.final_count);
        let _ = writeln!(out);
        let _ = writeln!(out, "Quality Metrics:");
        let _ = writeln!(out, "- Success rate: {:.1}%", success_rate);
        let _ = writeln!(out, "- Average title length: {}", self.avg_title_len);
        let _ = writeln!(out, "- Average description length: {}", self.avg_description_len);
        let _ = writeln!(out, "- Jobs with location: {}", self.with_location);
        let _ = writeln!(out, "- Jobs with type: {}", self.with_type);
        let _ = write!(out, "- Jobs with URL: {}", self.with_url);
        out
    }
}

/// Re-validates and dedupes an existing batch of listings, e.g. a previous run's output.
pub fn process_jobs(jobs: Vec<JobListing>) -> (Vec<JobListing>, CleaningReport) {
    let original_count = jobs.len();

    let valid: Vec<JobListing> = jobs
        .into_iter()
        .filter(|job| !job.title.trim().is_empty() && !job.company.trim().is_empty())
        .map(|mut job| {
            job.title = clean_text(&job.title);
            job.company = clean_text(&job.company);
            job.description = job
                .description
                .map(|d| truncate_chars(clean_text(&d), MAX_DESCRIPTION_CHARS))
                .and_then(non_empty);
            job.location = job.location.map(|l| clean_text(&l)).and_then(non_empty);
            job
        })
        .collect();
    let valid_count = valid.len();

    let processed = dedupe(valid);
    let final_count = processed.len();

    let avg = |total: usize| if final_count == 0 { 0 } else { total / final_count };
    let report = CleaningReport {
        original_count,
        invalid_removed: original_count - valid_count,
        duplicates_removed: valid_count - final_count,
        final_count,
        with_location: processed.iter().filter(|j| j.location.is_some()).count(),
        with_type: processed.iter().filter(|j| j.job_type.is_some()).count(),
        with_url: processed.iter().filter(|j| j.url.is_some()).count(),
        avg_title_len: avg(processed.iter().map(|j| j.title.chars().count()).sum()),
        avg_description_len: avg(processed.iter().map(description_len).sum()),
    };

    (processed, report)
}
