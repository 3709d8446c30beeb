use tracing::{debug, info, warn};

use crate::models::{CareerDiscoveryResult, CompanyInput, Confidence, ValidationResult};
use crate::page::{dismiss_cookie_banner, ActTarget, LoadState, PageActions, PageError};
use crate::validator::{normalize_url, CareerPageValidator};

/// Hosted applicant tracking systems, matched as substrings of the host.
pub const ATS_DOMAINS: &[&str] = &[
    "workday.com",
    "workdayjobs.com",
    "myworkdayjobs.com",
    "bamboohr.com",
    "lever.co",
    "greenhouse.io",
    "smartrecruiters.com",
    "jobvite.com",
    "icims.com",
    "taleo.net",
    "successfactors.com",
    "successfactors.eu",
];

const STRONG_HREF_TOKENS: &[&str] = &["stellen"];
const CAREER_HREF_TOKENS: &[&str] = &["karriere", "jobs", "career"];

const NAVIGATION_INSTRUCTION: &str = "Gehe zur Seite für Stellenangebote, Bewerbung, Karriere, \
    Arbeitsplätze, Careers, Jobs. Der Link zu der Seite kann auch ein Unterpunkt in einem Menü sein. \
    (Go to the careers or jobs page; the link may be an item in a submenu.)";

const DRILL_DOWN_INSTRUCTION: &str = "Finde die Seite für 'Alle Stellen', 'Offene Stellen', \
    'Aktuelle Stellen', 'Jobs anzeigen', 'Stellenangebote', 'Alle Jobs' oder 'Vakanzen' \
    (the overview page that lists all open positions)";

const ATS_RENDER_WAIT_MS: u64 = 2000;
const NAVIGATION_WAIT_MS: u64 = 1000;
const DRILL_DOWN_WAIT_MS: u64 = 2000;

/// The named strategies, tried in this order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    KnownUrl,
    HrefScan,
    NaturalLanguage,
}

impl Strategy {
    pub fn label(&self) -> &'static str {
        match self {
            Strategy::KnownUrl => "known careers URL",
            Strategy::HrefScan => "href scan",
            Strategy::NaturalLanguage => "navigation instruction",
        }
    }
}

/// How a strategy ended.
#[derive(Debug)]
enum Attempt {
    Found(CareerDiscoveryResult),
    Exhausted(Vec<String>),
}

/// A page that was visited and scored.
#[derive(Debug, Clone)]
struct ScoredPage {
    url: String,
    validation: ValidationResult,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct DiscoveryOptions {
    /// Ignore a cached careers URL and search from scratch.
    pub force_rediscover: bool,
}

pub fn is_external_ats(url: &str) -> bool {
    let host = url::Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_lowercase()));
    match host {
        Some(host) => ATS_DOMAINS.iter().any(|domain| host.contains(domain)),
        None => false,
    }
}

/// Picks the first href with a strong listing token, else the first with a career token.
pub fn pick_career_href(hrefs: &[String]) -> Option<String> {
    let mut unique: Vec<&String> = Vec::new();
    for href in hrefs {
        let lower = href.to_lowercase();
        if !(lower.starts_with("http://") || lower.starts_with("https://")) {
            continue;
        }
        if !unique.contains(&href) {
            unique.push(href);
        }
    }

    let has_token = |href: &str, tokens: &[&str]| {
        let lower = href.to_lowercase();
        tokens.iter().any(|t| lower.contains(t))
    };

    unique
        .iter()
        .find(|h| has_token(h, STRONG_HREF_TOKENS))
        .or_else(|| unique.iter().find(|h| has_token(h, CAREER_HREF_TOKENS)))
        .map(|h| h.to_string())
}

pub struct CareerPageDiscoverer<'a, P: PageActions + ?Sized> {
    page: &'a mut P,
    options: DiscoveryOptions,
}

impl<'a, P: PageActions + ?Sized> CareerPageDiscoverer<'a, P> {
    pub fn new(page: &'a mut P, options: DiscoveryOptions) -> Self {
        Self { page, options }
    }

    /// Runs the strategies in order. Without a usable cached URL the page is
    /// expected to be on the company homepage with cookies handled.
    pub fn discover(&mut self, company: &CompanyInput) -> CareerDiscoveryResult {
        let mut notes = Vec::new();

        let strategies: &[Strategy] = if company.careers_url.is_some() && !self.options.force_rediscover {
            &[Strategy::KnownUrl, Strategy::HrefScan, Strategy::NaturalLanguage]
        } else {
            &[Strategy::HrefScan, Strategy::NaturalLanguage]
        };

        for strategy in strategies {
            debug!(company = %company.name, strategy = strategy.label(), "trying strategy");
            let attempt = match strategy {
                Strategy::KnownUrl => self.known_url(company),
                Strategy::HrefScan => self.href_scan(company),
                Strategy::NaturalLanguage => self.natural_language(company),
            };
            match attempt {
                Attempt::Found(mut result) => {
                    info!(
                        company = %company.name,
                        strategy = strategy.label(),
                        url = result.url.as_deref().unwrap_or(""),
                        confidence = %result.confidence,
                        "careers page found"
                    );
                    notes.append(&mut result.notes);
                    result.notes = notes;
                    return result;
                }
                Attempt::Exhausted(mut attempt_notes) => {
                    notes.append(&mut attempt_notes);
                }
            }
        }

        info!(company = %company.name, "no careers page found");
        CareerDiscoveryResult::not_found(notes)
    }

    fn known_url(&mut self, company: &CompanyInput) -> Attempt {
        let Some(careers_url) = company.careers_url.as_deref() else {
            return Attempt::Exhausted(Vec::new());
        };
        info!("Using known careers URL: {}", careers_url);

        match self.navigate(careers_url) {
            Ok(()) => {
                let validation = CareerPageValidator::validate(&mut *self.page, careers_url, &company.website);
                Attempt::Found(CareerDiscoveryResult {
                    url: Some(careers_url.to_string()),
                    discovered: false,
                    confidence: validation.confidence,
                    notes: validation.notes,
                })
            }
            Err(e) => {
                warn!("Known careers URL unreachable, falling back to discovery: {}", e);
                let mut notes = vec![format!("Known careers URL failed: {}", e)];
                if let Err(e) = self.return_home(company) {
                    notes.push(format!("Homepage unreachable: {}", e));
                }
                Attempt::Exhausted(notes)
            }
        }
    }

    fn href_scan(&mut self, company: &CompanyInput) -> Attempt {
        let hrefs = match self.page.anchor_hrefs() {
            Ok(hrefs) => hrefs,
            Err(e) => return Attempt::Exhausted(vec![format!("Could not read page links: {}", e)]),
        };

        let Some(href) = pick_career_href(&hrefs) else {
            debug!("no career hrefs among {} links", hrefs.len());
            return Attempt::Exhausted(vec!["No career links found on homepage".to_string()]);
        };
        info!("Navigating to discovered href: {}", href);

        if let Err(e) = self.navigate(&href) {
            warn!("Href navigation failed: {}", e);
            return Attempt::Exhausted(vec![format!("Href navigation failed: {}", e)]);
        }

        let attempt = self.evaluate_arrival(company);
        if matches!(attempt, Attempt::Exhausted(_)) {
            if let Err(e) = self.return_home(company) {
                debug!("could not return to homepage: {}", e);
            }
        }
        attempt
    }

    fn natural_language(&mut self, company: &CompanyInput) -> Attempt {
        let actions = match self.page.observe(NAVIGATION_INSTRUCTION) {
            Ok(actions) => actions,
            Err(e) => {
                return Attempt::Exhausted(vec![format!("Navigation observe failed: {}", e)]);
            }
        };
        let Some(action) = actions.first() else {
            return Attempt::Exhausted(vec!["No careers navigation elements detected".to_string()]);
        };
        info!("Acting on navigation candidate: {}", action.description);

        if let Err(e) = self.page.act(ActTarget::Candidate(action)) {
            warn!("Navigation action failed: {}", e);
            return Attempt::Exhausted(vec![format!("Navigation action failed: {}", e)]);
        }
        self.page.wait_for_timeout(NAVIGATION_WAIT_MS);

        match self.evaluate_arrival(company) {
            Attempt::Exhausted(mut notes) => {
                notes.insert(0, "No careers navigation found".to_string());
                Attempt::Exhausted(notes)
            }
            found => found,
        }
    }

    /// ATS check, validation and drill-down for the page we just arrived on.
    fn evaluate_arrival(&mut self, company: &CompanyInput) -> Attempt {
        let url = match self.page.url() {
            Ok(url) => url,
            Err(e) => return Attempt::Exhausted(vec![format!("Could not read current URL: {}", e)]),
        };

        if is_external_ats(&url) {
            return self.evaluate_ats(&url, company);
        }

        let validation = CareerPageValidator::validate(&mut *self.page, &url, &company.website);
        match validation.confidence {
            Confidence::High => Attempt::Found(found(ScoredPage { url, validation })),
            Confidence::Medium => {
                let best = self.drill_down(ScoredPage { url, validation }, company);
                Attempt::Found(found(best))
            }
            Confidence::Low => {
                debug!("candidate {} rejected: {}", url, validation.notes.join(", "));
                Attempt::Exhausted(validation.notes)
            }
        }
    }

    fn evaluate_ats(&mut self, url: &str, company: &CompanyInput) -> Attempt {
        info!("Detected external career system: {}", url);
        self.page.wait_for_timeout(ATS_RENDER_WAIT_MS);
        dismiss_cookie_banner(&mut *self.page);

        let mut validation = CareerPageValidator::validate(&mut *self.page, url, &company.website);
        validation
            .notes
            .insert(0, "External career system detected".to_string());

        match validation.confidence {
            Confidence::High | Confidence::Medium => Attempt::Found(found(ScoredPage {
                url: url.to_string(),
                validation,
            })),
            Confidence::Low => Attempt::Exhausted(validation.notes),
        }
    }

    /// One step deeper from a medium-confidence hub page. Returns whichever page
    /// scored higher; ties go to the deeper page.
    fn drill_down(&mut self, mut hub: ScoredPage, company: &CompanyInput) -> ScoredPage {
        info!("Medium confidence at {}, trying deeper navigation", hub.url);

        let overview = hub
            .validation
            .job_listings_page_link
            .as_deref()
            .and_then(|link| resolve_link(link, &hub.url))
            .filter(|link| normalize_url(link) != normalize_url(&hub.url));

        let moved = match overview {
            Some(link) => match self.navigate(&link) {
                Ok(()) => Ok(()),
                Err(e) => {
                    debug!("overview link {} failed, falling back to instruction: {}", link, e);
                    hub.validation
                        .notes
                        .push(format!("Overview link {} failed: {}", link, e));
                    self.back_to(&hub.url)
                        .map_err(|e| e.to_string())
                        .and_then(|()| self.drill_down_by_instruction())
                }
            },
            None => self.drill_down_by_instruction(),
        };
        if let Err(reason) = moved {
            debug!("drill-down failed: {}", reason);
            return with_note(hub, format!("Deeper navigation failed: {}", reason));
        }

        let deeper_url = match self.page.url() {
            Ok(url) => url,
            Err(e) => return with_note(hub, format!("Deeper navigation failed: {}", e)),
        };
        if deeper_url == hub.url {
            return with_note(hub, "Deeper navigation stayed on same page".to_string());
        }
        info!("Navigated deeper to: {}", deeper_url);

        let validation = CareerPageValidator::validate(&mut *self.page, &deeper_url, &company.website);
        if validation.confidence >= hub.validation.confidence {
            ScoredPage {
                url: deeper_url,
                validation,
            }
        } else {
            with_note(
                hub,
                format!("Deeper page {} scored {}, kept hub page", deeper_url, validation.confidence),
            )
        }
    }

    fn drill_down_by_instruction(&mut self) -> Result<(), String> {
        let actions = self.page.observe(DRILL_DOWN_INSTRUCTION).map_err(|e| e.to_string())?;
        let action = actions
            .first()
            .ok_or_else(|| "no listing overview link found".to_string())?;
        self.page
            .act(ActTarget::Candidate(action))
            .map_err(|e| e.to_string())?;
        self.page.wait_for_timeout(DRILL_DOWN_WAIT_MS);
        Ok(())
    }

    fn navigate(&mut self, url: &str) -> Result<(), PageError> {
        self.page.goto(url)?;
        if let Err(e) = self.page.wait_for_load_state(LoadState::DomContentLoaded, 10_000) {
            debug!("load state wait on {} ended early: {}", url, e);
        }
        self.page.wait_for_timeout(NAVIGATION_WAIT_MS);
        Ok(())
    }

    fn back_to(&mut self, url: &str) -> Result<(), PageError> {
        if self.page.url().map(|u| u == url).unwrap_or(false) {
            return Ok(());
        }
        self.navigate(url)
    }

    fn return_home(&mut self, company: &CompanyInput) -> Result<(), PageError> {
        if self.page.url().map(|u| u == company.website).unwrap_or(false) {
            return Ok(());
        }
        self.navigate(&company.website)?;
        dismiss_cookie_banner(&mut *self.page);
        Ok(())
    }
}

/// Absolute form of an overview link, which may be relative to the hub page.
fn resolve_link(link: &str, base: &str) -> Option<String> {
    let link = link.trim();
    if link.is_empty() {
        return None;
    }
    url::Url::parse(base)
        .and_then(|base| base.join(link))
        .map(|u| u.to_string())
        .ok()
}

fn found(page: ScoredPage) -> CareerDiscoveryResult {
    CareerDiscoveryResult {
        url: Some(page.url),
        discovered: true,
        confidence: page.validation.confidence,
        notes: page.validation.notes,
    }
}

fn with_note(mut page: ScoredPage, note: String) -> ScoredPage {
    page.validation.notes.push(note);
    page
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page::fake::{FakePage, FakeSite};
    use serde_json::json;

    const HOME: &str = "https://acme.example/";

    fn company() -> CompanyInput {
        CompanyInput::new("Acme GmbH", HOME)
    }

    fn plain() -> serde_json::Value {
        json!({"title": "Willkommen", "hasJobListings": false, "hasApplicationForm": false})
    }

    fn listings() -> serde_json::Value {
        json!({"title": "Offene Positionen", "hasJobListings": true, "hasApplicationForm": false})
    }

    fn hub() -> serde_json::Value {
        json!({"title": "Karriere", "content": "Arbeiten bei Acme", "hasJobListings": false, "hasApplicationForm": false})
    }

    #[test]
    fn test_pick_career_href_prefers_listing_tokens() {
        let hrefs = vec![
            "https://acme.example/karriere".to_string(),
            "https://acme.example/karriere".to_string(),
            "mailto:jobs@acme.example".to_string(),
            "https://acme.example/karriere/stellenangebote".to_string(),
        ];
        assert_eq!(
            pick_career_href(&hrefs).as_deref(),
            Some("https://acme.example/karriere/stellenangebote")
        );

        let hrefs = vec!["https://acme.example/about".to_string(), "https://acme.example/Jobs".to_string()];
        assert_eq!(pick_career_href(&hrefs).as_deref(), Some("https://acme.example/Jobs"));

        assert_eq!(pick_career_href(&["https://acme.example/news".to_string()]), None);
    }

    #[test]
    fn test_is_external_ats() {
        assert!(is_external_ats("https://acme.wd3.myworkdayjobs.com/de-DE/careers"));
        assert!(is_external_ats("https://boards.greenhouse.io/acme"));
        assert!(is_external_ats("https://jobs.lever.co/acme"));
        assert!(!is_external_ats("https://acme.example/lever.co"));
        assert!(!is_external_ats("not a url"));
    }

    #[test]
    fn test_href_with_stellenangebote_is_accepted() {
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/stellenangebote"]))
            .page("https://acme.example/stellenangebote", FakePage::new().with_signals(plain()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some("https://acme.example/stellenangebote"));
        assert!(result.discovered);
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_no_links_and_no_candidates_fails() {
        let mut site = FakeSite::new(HOME).page(HOME, FakePage::new());

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url, None);
        assert!(!result.discovered);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result
            .notes
            .contains(&"No careers navigation elements detected".to_string()));
    }

    #[test]
    fn test_known_url_skips_discovery() {
        let careers = "https://acme.example/karriere/stellen";
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/jobs"]))
            .page(careers, FakePage::new().with_signals(listings()));
        let mut known = company();
        known.careers_url = Some(careers.to_string());

        for _ in 0..2 {
            let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&known);
            assert_eq!(result.url.as_deref(), Some(careers));
            assert!(!result.discovered);
            assert_eq!(result.confidence, Confidence::High);
        }
        assert!(!site.visits.contains(&"https://acme.example/jobs".to_string()));
    }

    #[test]
    fn test_unreachable_known_url_falls_back_to_discovery() {
        let mut site = FakeSite::new(HOME)
            .unreachable("https://old.acme.example/jobs")
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/stellenangebote"]))
            .page("https://acme.example/stellenangebote", FakePage::new().with_signals(listings()));
        let mut known = company();
        known.careers_url = Some("https://old.acme.example/jobs".to_string());

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&known);
        assert_eq!(result.url.as_deref(), Some("https://acme.example/stellenangebote"));
        assert!(result.discovered);
        assert!(result.notes[0].starts_with("Known careers URL failed"));
    }

    #[test]
    fn test_force_rediscover_ignores_known_url() {
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/stellenangebote"]))
            .page("https://acme.example/stellenangebote", FakePage::new().with_signals(listings()));
        let mut known = company();
        known.careers_url = Some("https://acme.example/karriere".to_string());

        let options = DiscoveryOptions { force_rediscover: true };
        let result = CareerPageDiscoverer::new(&mut site, options).discover(&known);
        assert!(result.discovered);
        assert!(!site.visits.contains(&"https://acme.example/karriere".to_string()));
    }

    #[test]
    fn test_low_href_candidate_falls_back_to_observe() {
        let mut site = FakeSite::new(HOME)
            .page(
                HOME,
                FakePage::new()
                    .with_hrefs(&["https://acme.example/jobs-news"])
                    .on_observe("Karriere", &["https://acme.example/team/offene-positionen"]),
            )
            // no signals scripted: validation extraction times out
            .page("https://acme.example/jobs-news", FakePage::new())
            .page("https://acme.example/team/offene-positionen", FakePage::new().with_signals(listings()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some("https://acme.example/team/offene-positionen"));
        assert_eq!(result.confidence, Confidence::High);
        assert!(site.visits.contains(&HOME.to_string()));
        assert!(site.observe_calls.iter().any(|i| i.contains("Karriere")));
    }

    #[test]
    fn test_low_observe_result_fails_with_notes() {
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().on_observe("Karriere", &["https://acme.example/produkte"]))
            .page("https://acme.example/produkte", FakePage::new().with_signals(plain()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url, None);
        assert!(result.notes.contains(&"No careers navigation found".to_string()));
    }

    #[test]
    fn test_medium_page_drills_down_to_listing_overview() {
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/karriere"]))
            .page(
                "https://acme.example/karriere",
                FakePage::new()
                    .with_signals(hub())
                    .on_observe("Alle Stellen", &["https://acme.example/karriere/alle-jobs"]),
            )
            .page("https://acme.example/karriere/alle-jobs", FakePage::new().with_signals(listings()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some("https://acme.example/karriere/alle-jobs"));
        assert_eq!(result.confidence, Confidence::High);
    }

    #[test]
    fn test_drill_down_follows_overview_link_first() {
        let mut hub_signals = hub();
        hub_signals["linkToJobListingOverview"] = json!("https://acme.example/karriere/offene-jobs");
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/karriere"]))
            .page("https://acme.example/karriere", FakePage::new().with_signals(hub_signals))
            .page("https://acme.example/karriere/offene-jobs", FakePage::new().with_signals(listings()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some("https://acme.example/karriere/offene-jobs"));
        assert!(site.observe_calls.is_empty());
    }

    #[test]
    fn test_relative_overview_link_is_resolved_against_hub() {
        let mut hub_signals = hub();
        hub_signals["linkToJobListingOverview"] = json!("/karriere/offene-jobs");
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/karriere"]))
            .page("https://acme.example/karriere", FakePage::new().with_signals(hub_signals))
            .page("https://acme.example/karriere/offene-jobs", FakePage::new().with_signals(listings()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some("https://acme.example/karriere/offene-jobs"));
        assert_eq!(result.confidence, Confidence::High);
        assert!(site.observe_calls.is_empty());
    }

    #[test]
    fn test_broken_overview_link_falls_back_to_instruction() {
        let mut hub_signals = hub();
        hub_signals["linkToJobListingOverview"] = json!("https://acme.example/karriere/archiv");
        let mut site = FakeSite::new(HOME)
            .unreachable("https://acme.example/karriere/archiv")
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/karriere"]))
            .page(
                "https://acme.example/karriere",
                FakePage::new()
                    .with_signals(hub_signals)
                    .on_observe("Alle Stellen", &["https://acme.example/karriere/alle-jobs"]),
            )
            .page("https://acme.example/karriere/alle-jobs", FakePage::new().with_signals(listings()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some("https://acme.example/karriere/alle-jobs"));
        assert_eq!(result.confidence, Confidence::High);
        assert!(site.observe_calls.iter().any(|i| i.contains("Alle Stellen")));
    }

    #[test]
    fn test_resolve_link() {
        assert_eq!(
            resolve_link("/karriere/alle-jobs", "https://acme.example/karriere").as_deref(),
            Some("https://acme.example/karriere/alle-jobs")
        );
        assert_eq!(
            resolve_link("https://jobs.lever.co/acme", "https://acme.example/karriere").as_deref(),
            Some("https://jobs.lever.co/acme")
        );
        assert_eq!(resolve_link("  ", "https://acme.example/karriere"), None);
    }

    #[test]
    fn test_drill_down_on_same_page_keeps_medium() {
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/karriere"]))
            .page(
                "https://acme.example/karriere",
                FakePage::new()
                    .with_signals(hub())
                    .on_observe("Alle Stellen", &["https://acme.example/karriere"]),
            );

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some("https://acme.example/karriere"));
        assert_eq!(result.confidence, Confidence::Medium);
        assert!(result
            .notes
            .contains(&"Deeper navigation stayed on same page".to_string()));
    }

    #[test]
    fn test_drill_down_keeps_hub_when_deeper_page_is_worse() {
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().with_hrefs(&["https://acme.example/karriere"]))
            .page(
                "https://acme.example/karriere",
                FakePage::new()
                    .with_signals(hub())
                    .on_observe("Alle Stellen", &["https://acme.example/impressum"]),
            )
            .page("https://acme.example/impressum", FakePage::new().with_signals(plain()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some("https://acme.example/karriere"));
        assert_eq!(result.confidence, Confidence::Medium);
    }

    #[test]
    fn test_ats_page_accepted_at_medium_without_drill_down() {
        let ats = "https://acme.wd3.myworkdayjobs.com/careers";
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().on_observe("Karriere", &[ats]))
            .page(ats, FakePage::new().with_signals(plain()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some(ats));
        assert_eq!(result.confidence, Confidence::Medium);
        assert!(result
            .notes
            .contains(&"External career system detected".to_string()));
        assert!(!site.observe_calls.iter().any(|i| i.contains("Alle Stellen")));
    }

    #[test]
    fn test_high_scoring_ats_page_is_accepted() {
        let ats = "https://boards.greenhouse.io/acme/jobs";
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().with_hrefs(&[ats]))
            .page(ats, FakePage::new().with_signals(listings()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url.as_deref(), Some(ats));
        assert!(result.discovered);
        assert_eq!(result.confidence, Confidence::High);
        assert!(result
            .notes
            .contains(&"External career system detected".to_string()));
    }

    #[test]
    fn test_low_scoring_ats_page_is_rejected() {
        let ats = "https://boards.greenhouse.io/acme";
        let mut site = FakeSite::new(HOME)
            .page(HOME, FakePage::new().on_observe("Karriere", &[ats]))
            .page(ats, FakePage::new().with_signals(plain()));

        let result = CareerPageDiscoverer::new(&mut site, DiscoveryOptions::default()).discover(&company());
        assert_eq!(result.url, None);
        assert!(!result.discovered);
        assert_eq!(result.confidence, Confidence::Low);
        assert!(result
            .notes
            .contains(&"External career system detected".to_string()));
        assert!(result.notes.contains(&"No careers navigation found".to_string()));
    }
}
