use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::Serialize;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::cleaner::clean_batch;
use crate::config::clamp_delay;
use crate::discovery::{CareerPageDiscoverer, DiscoveryOptions};
use crate::extractor::JobListingExtractor;
use crate::models::{CompanyInput, Confidence, JobListing, ScrapingMetadata};
use crate::page::{dismiss_cookie_banner, LoadState, PageActions, PageError};
use crate::validator::normalize_url;

const PROGRESS_WIDTH: usize = 20;
const REPORT_WIDTH: usize = 76;
const CAREERS_LOAD_TIMEOUT_MS: u64 = 15_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Find careers URLs only.
    Discover,
    /// Extract jobs from companies that already have a careers URL.
    Extract,
    /// Discover, then extract.
    Full,
}

impl RunMode {
    pub fn label(&self) -> &'static str {
        match self {
            RunMode::Discover => "discover",
            RunMode::Extract => "extract",
            RunMode::Full => "full",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DelayPolicy {
    Random { min_ms: u64, max_ms: u64 },
    #[cfg(test)]
    Fixed(u64),
}

impl DelayPolicy {
    pub fn random(min_ms: u64, max_ms: u64) -> Self {
        let (min_ms, max_ms) = clamp_delay(min_ms, max_ms);
        DelayPolicy::Random { min_ms, max_ms }
    }

    pub fn next_ms(&self) -> u64 {
        match *self {
            DelayPolicy::Random { min_ms, max_ms } => rand::thread_rng().gen_range(min_ms..=max_ms),
            #[cfg(test)]
            DelayPolicy::Fixed(ms) => ms,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchOptions {
    pub mode: RunMode,
    /// Ignore cached careers URLs and rediscover.
    pub force_reprocess: bool,
    pub delay: DelayPolicy,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum CompanyStatus {
    Success,
    Failed,
    Skipped,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompanyOutcome {
    pub company: String,
    pub website: String,
    pub status: CompanyStatus,
    pub careers_url: Option<String>,
    pub discovered: bool,
    pub confidence: Option<Confidence>,
    pub notes: Vec<String>,
    pub jobs: Vec<JobListing>,
    pub error: Option<String>,
    pub processing_ms: u64,
}

impl CompanyOutcome {
    fn start(company: &CompanyInput) -> Self {
        Self {
            company: company.name.clone(),
            website: company.website.clone(),
            status: CompanyStatus::Failed,
            careers_url: company.careers_url.clone(),
            discovered: false,
            confidence: None,
            notes: Vec::new(),
            jobs: Vec::new(),
            error: None,
            processing_ms: 0,
        }
    }

    fn succeed(mut self) -> Self {
        self.status = CompanyStatus::Success;
        self
    }

    fn fail(mut self, reason: impl Into<String>) -> Self {
        self.status = CompanyStatus::Failed;
        self.error = Some(reason.into());
        self
    }

    fn skip(mut self, reason: impl Into<String>) -> Self {
        self.status = CompanyStatus::Skipped;
        self.error = Some(reason.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct BatchRun {
    pub run_id: Uuid,
    pub mode: RunMode,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total_companies: usize,
    pub outcomes: Vec<CompanyOutcome>,
    pub interrupted: bool,
    /// Company whose in-flight result was discarded by the interrupt.
    pub interrupted_during: Option<String>,
}

impl BatchRun {
    fn count(&self, status: CompanyStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    pub fn jobs(&self) -> Vec<JobListing> {
        self.outcomes.iter().flat_map(|o| o.jobs.iter().cloned()).collect()
    }

    pub fn metadata(&self) -> ScrapingMetadata {
        ScrapingMetadata {
            run_id: self.run_id,
            run_timestamp: self.started_at.to_rfc3339(),
            total_jobs: self.outcomes.iter().map(|o| o.jobs.len()).sum(),
            companies_processed: self.outcomes.len(),
            companies_successful: self.count(CompanyStatus::Success),
            companies_failed: self.count(CompanyStatus::Failed),
        }
    }

    pub fn report(&self) -> BatchReport {
        let successful = self.count(CompanyStatus::Success);
        let total_jobs: usize = self.outcomes.iter().map(|o| o.jobs.len()).sum();

        let mut ranked: Vec<(String, usize)> = self
            .outcomes
            .iter()
            .filter(|o| o.status == CompanyStatus::Success && !o.jobs.is_empty())
            .map(|o| (o.company.clone(), o.jobs.len()))
            .collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1));
        ranked.truncate(3);

        BatchReport {
            mode: self.mode,
            total_companies: self.total_companies,
            processed: self.outcomes.len(),
            successful,
            failed: self.count(CompanyStatus::Failed),
            skipped: self.count(CompanyStatus::Skipped),
            total_jobs,
            avg_jobs_per_success: if successful == 0 { 0 } else { total_jobs / successful },
            avg_processing_ms: if self.outcomes.is_empty() {
                0
            } else {
                self.outcomes.iter().map(|o| o.processing_ms).sum::<u64>() / self.outcomes.len() as u64
            },
            top_companies: ranked,
            problematic: self
                .outcomes
                .iter()
                .filter(|o| o.status == CompanyStatus::Failed)
                .map(|o| (o.website.clone(), o.error.clone().unwrap_or_default()))
                .collect(),
            interrupted: self.interrupted,
            interrupted_during: self.interrupted_during.clone(),
            elapsed_secs: (self.finished_at - self.started_at).num_seconds().max(0) as u64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchReport {
    pub mode: RunMode,
    pub total_companies: usize,
    pub processed: usize,
    pub successful: usize,
    pub failed: usize,
    pub skipped: usize,
    pub total_jobs: usize,
    pub avg_jobs_per_success: usize,
    pub avg_processing_ms: u64,
    pub top_companies: Vec<(String, usize)>,
    /// (website, reason)
    pub problematic: Vec<(String, String)>,
    pub interrupted: bool,
    pub interrupted_during: Option<String>,
    pub elapsed_secs: u64,
}

impl BatchReport {
    pub fn render(&self) -> String {
        let indent = textwrap::Options::new(REPORT_WIDTH)
            .initial_indent("      ")
            .subsequent_indent("      ");

        let mut out = String::new();
        let title = if self.interrupted { "INTERRUPTED - PARTIAL RESULTS" } else { "BATCH COMPLETE" };
        let _ = writeln!(out, "{} ({} mode)", title, self.mode.label());
        let _ = writeln!(out, "{}", "=".repeat(60));
        let _ = writeln!(out, "Processed:   {}/{} companies", self.processed, self.total_companies);
        let _ = writeln!(
            out,
            "Successful:  {} | Failed: {} | Skipped: {}",
            self.successful, self.failed, self.skipped
        );
        if let Some(company) = &self.interrupted_during {
            let _ = writeln!(out, "Interrupted during: {} (result discarded)", company);
        }
        let _ = writeln!(out, "Jobs found:  {} (avg {} per successful company)", self.total_jobs, self.avg_jobs_per_success);
        let _ = writeln!(
            out,
            "Time:        {} total, {:.1}s avg per company",
            format_duration(self.elapsed_secs),
            self.avg_processing_ms as f64 / 1000.0
        );

        if !self.top_companies.is_empty() {
            let _ = writeln!(out, "\nTop companies:");
            for (i, (company, jobs)) in self.top_companies.iter().enumerate() {
                let _ = writeln!(out, "  {}. {} ({} jobs)", i + 1, company, jobs);
            }
        }

        if !self.problematic.is_empty() {
            let _ = writeln!(out, "\nProblematic websites:");
            for (website, reason) in &self.problematic {
                let _ = writeln!(out, "  - {}", website);
                if !reason.is_empty() {
                    let _ = writeln!(out, "{}", textwrap::fill(reason, &indent));
                }
            }
        }

        out.trim_end().to_string()
    }
}

pub fn format_duration(total_secs: u64) -> String {
    let minutes = total_secs / 60;
    let seconds = total_secs % 60;
    if minutes > 0 {
        format!("{}m {}s", minutes, seconds)
    } else {
        format!("{}s", seconds)
    }
}

pub fn progress_bar(done: usize, total: usize) -> String {
    let ratio = if total == 0 { 1.0 } else { done as f64 / total as f64 };
    let filled = ((ratio * PROGRESS_WIDTH as f64).round() as usize).min(PROGRESS_WIDTH);
    format!(
        "{}{} {}%",
        "█".repeat(filled),
        "░".repeat(PROGRESS_WIDTH - filled),
        (ratio * 100.0).round() as u32
    )
}

/// Remaining time from the mean duration of the finished companies. `None` before the first finishes.
pub fn estimate_remaining(elapsed: Duration, done: usize, total: usize) -> Option<Duration> {
    if done == 0 {
        return None;
    }
    let per_company = elapsed / done as u32;
    Some(per_company * total.saturating_sub(done) as u32)
}

/// Installs the Ctrl+C handler. The first interrupt raises the flag so the batch stops
/// between companies; a second one exits the process immediately.
pub fn install_interrupt_handler() -> Result<Arc<AtomicBool>> {
    let flag = Arc::new(AtomicBool::new(false));
    let handler_flag = Arc::clone(&flag);
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("Failed to start signal runtime")?;

    thread::Builder::new()
        .name("interrupt".to_string())
        .spawn(move || {
            runtime.block_on(async {
                while tokio::signal::ctrl_c().await.is_ok() {
                    if handler_flag.swap(true, Ordering::SeqCst) {
                        error!("Second interrupt received, exiting now");
                        std::process::exit(130);
                    }
                    warn!("Interrupt received, stopping after the current company (Ctrl+C again to quit)");
                }
            })
        })
        .context("Failed to spawn interrupt handler")?;

    Ok(flag)
}

/// Writes newly discovered careers URLs into the company records. Returns how many changed.
pub fn apply_discoveries(companies: &mut [CompanyInput], outcomes: &[CompanyOutcome]) -> usize {
    let mut updated = 0;
    for outcome in outcomes.iter().filter(|o| o.discovered) {
        let Some(url) = &outcome.careers_url else { continue };
        if let Some(company) = companies
            .iter_mut()
            .find(|c| c.name == outcome.company && c.website == outcome.website)
        {
            if company.careers_url.as_deref() != Some(url.as_str()) {
                company.careers_url = Some(url.clone());
                updated += 1;
            }
        }
    }
    updated
}

/// Processes companies strictly one after another on a single page.
pub struct BatchScraper<'a, P: PageActions + ?Sized> {
    page: &'a mut P,
    options: BatchOptions,
    run_id: Uuid,
    interrupt: Arc<AtomicBool>,
}

impl<'a, P: PageActions + ?Sized> BatchScraper<'a, P> {
    pub fn new(page: &'a mut P, options: BatchOptions, interrupt: Arc<AtomicBool>) -> Self {
        Self {
            page,
            options,
            run_id: Uuid::new_v4(),
            interrupt,
        }
    }

    fn interrupted(&self) -> bool {
        self.interrupt.load(Ordering::SeqCst)
    }

    pub fn run(&mut self, companies: &[CompanyInput]) -> BatchRun {
        let started_at = Utc::now();
        let clock = Instant::now();
        let total = companies.len();
        let mut outcomes: Vec<CompanyOutcome> = Vec::with_capacity(total);
        let mut interrupted_during = None;

        info!(
            "Starting {} run {} over {} companies",
            self.options.mode.label(),
            self.run_id,
            total
        );

        for (i, company) in companies.iter().enumerate() {
            if self.interrupted() {
                warn!("Processing interrupted, stopping before {}", company.name);
                break;
            }

            info!("[{}/{}] Processing: {}", i + 1, total, company.name);
            let outcome = self.process_company(company);

            if self.interrupted() {
                warn!("Discarding in-flight result for {}", company.name);
                interrupted_during = Some(company.name.clone());
                break;
            }

            match outcome.status {
                CompanyStatus::Success => info!(
                    "Success: {} ({} jobs, {})",
                    company.name,
                    outcome.jobs.len(),
                    outcome.careers_url.as_deref().unwrap_or("-")
                ),
                CompanyStatus::Failed => error!(
                    "Failed: {}: {}",
                    company.name,
                    outcome.error.as_deref().unwrap_or("unknown error")
                ),
                CompanyStatus::Skipped => warn!(
                    "Skipped: {}: {}",
                    company.name,
                    outcome.error.as_deref().unwrap_or("")
                ),
            }
            outcomes.push(outcome);

            let done = outcomes.len();
            let succeeded = outcomes.iter().filter(|o| o.status == CompanyStatus::Success).count();
            let eta = estimate_remaining(clock.elapsed(), done, total)
                .map(|d| format_duration(d.as_secs()))
                .unwrap_or_else(|| "calculating...".to_string());
            info!(
                "Progress: {} [{}/{}] Success: {} | Failed: {} | ETA: {}",
                progress_bar(done, total),
                done,
                total,
                succeeded,
                done - succeeded,
                eta
            );

            if i + 1 < total {
                let delay = self.options.delay.next_ms();
                info!("Waiting {:.1}s before next company", delay as f64 / 1000.0);
                self.pause(delay);
            }
        }

        BatchRun {
            run_id: self.run_id,
            mode: self.options.mode,
            started_at,
            finished_at: Utc::now(),
            total_companies: total,
            interrupted: self.interrupted(),
            interrupted_during,
            outcomes,
        }
    }

    // Sleeps in short slices so an interrupt does not wait out the whole delay.
    fn pause(&self, ms: u64) {
        let deadline = Instant::now() + Duration::from_millis(ms);
        while !self.interrupted() {
            let now = Instant::now();
            if now >= deadline {
                break;
            }
            thread::sleep((deadline - now).min(Duration::from_millis(100)));
        }
    }

    fn process_company(&mut self, company: &CompanyInput) -> CompanyOutcome {
        let started = Instant::now();
        let mut outcome = match self.options.mode {
            RunMode::Extract => self.extract_known(company),
            RunMode::Discover | RunMode::Full => self.discover_then_extract(company),
        };
        outcome.processing_ms = started.elapsed().as_millis() as u64;
        outcome
    }

    fn discover_then_extract(&mut self, company: &CompanyInput) -> CompanyOutcome {
        let mut outcome = CompanyOutcome::start(company);
        let force = self.options.force_reprocess;

        if company.careers_url.is_none() || force {
            info!("Navigating to {}", company.website);
            if let Err(e) = self.page.goto(&company.website) {
                return outcome.fail(format!("Website unreachable: {}", e));
            }
            dismiss_cookie_banner(&mut *self.page);
        }

        let discovery = CareerPageDiscoverer::new(&mut *self.page, DiscoveryOptions { force_rediscover: force })
            .discover(company);
        outcome.discovered = discovery.discovered;
        outcome.confidence = Some(discovery.confidence);
        outcome.notes = discovery.notes;

        let Some(careers_url) = discovery.url else {
            return outcome.fail("Could not find careers page");
        };
        outcome.careers_url = Some(careers_url.clone());

        if self.options.mode == RunMode::Discover {
            return outcome.succeed();
        }

        // Drill-down or a failed deeper probe may have left the page elsewhere.
        if let Err(e) = self.ensure_on(&careers_url) {
            return outcome.fail(format!("Careers page unreachable: {}", e));
        }
        self.extract_jobs(company, &careers_url, outcome)
    }

    fn extract_known(&mut self, company: &CompanyInput) -> CompanyOutcome {
        let outcome = CompanyOutcome::start(company);
        let Some(careers_url) = company.careers_url.clone() else {
            return outcome.skip("No careers URL known, run discover first");
        };

        if let Err(e) = self.open_careers_page(&careers_url) {
            return outcome.fail(format!("Careers page unreachable: {}", e));
        }
        dismiss_cookie_banner(&mut *self.page);
        self.extract_jobs(company, &careers_url, outcome)
    }

    fn extract_jobs(&mut self, company: &CompanyInput, careers_url: &str, mut outcome: CompanyOutcome) -> CompanyOutcome {
        let raw = JobListingExtractor::new(&mut *self.page).extract_all(careers_url);
        let extracted = raw.len();
        outcome.jobs = clean_batch(raw, &company.name, self.run_id);
        info!(
            "{}: {} extracted, {} after cleaning",
            company.name,
            extracted,
            outcome.jobs.len()
        );

        if outcome.jobs.is_empty() {
            return outcome.fail("No job listings found");
        }
        outcome.succeed()
    }

    fn ensure_on(&mut self, url: &str) -> Result<(), PageError> {
        let here = self.page.url().map(|u| normalize_url(&u)).unwrap_or_default();
        if here != normalize_url(url) {
            self.open_careers_page(url)?;
        }
        Ok(())
    }

    // Listings are often rendered late, so wait for the full load rather than the DOM.
    fn open_careers_page(&mut self, url: &str) -> Result<(), PageError> {
        self.page.goto(url)?;
        if let Err(e) = self.page.wait_for_load_state(LoadState::Load, CAREERS_LOAD_TIMEOUT_MS) {
            warn!("{} did not finish loading: {}", url, e);
        }
        Ok(())
    }
}
