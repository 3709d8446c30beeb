use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

// --- Errors ---

#[derive(Debug, Error)]
pub enum PageError {
    #[error("navigation to {url} failed: {reason}")]
    Navigation { url: String, reason: String },

    #[error("action failed: {0}")]
    Action(String),

    #[error("extraction failed: {0}")]
    Extraction(String),

    #[error("{operation} timed out after {ms}ms")]
    Timeout { operation: &'static str, ms: u64 },

    #[error("browser session error: {0}")]
    Session(String),
}

impl PageError {
    pub fn navigation(url: &str, reason: impl ToString) -> Self {
        Self::Navigation {
            url: url.to_string(),
            reason: reason.to_string(),
        }
    }
}

// --- Engine payloads ---

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionCandidate {
    pub selector: String,
    pub description: String,
    pub method: String,
}

impl ActionCandidate {
    pub fn click(selector: &str, description: &str) -> Self {
        Self {
            selector: selector.to_string(),
            description: description.to_string(),
            method: "click".to_string(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub enum ActTarget<'a> {
    Candidate(&'a ActionCandidate),
    Instruction(&'a str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActResult {
    pub success: bool,
    pub message: String,
    pub action: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    DomContentLoaded,
    Load,
    NetworkIdle,
}

/// JSON schema handed to `extract`. `name` identifies the payload kind.
#[derive(Debug, Clone)]
pub struct ExtractSchema {
    pub name: &'static str,
    pub schema: Value,
}

// --- Capability trait ---

/// The browser-automation capability the scraper core is written against.
/// One implementation drives a real browser, another replays scripted pages in tests.
pub trait PageActions {
    fn goto(&mut self, url: &str) -> Result<(), PageError>;

    fn url(&mut self) -> Result<String, PageError>;

    /// Resolved `href` of every anchor on the page, in document order.
    fn anchor_hrefs(&mut self) -> Result<Vec<String>, PageError>;

    fn observe(&mut self, instruction: &str) -> Result<Vec<ActionCandidate>, PageError>;

    fn act(&mut self, target: ActTarget<'_>) -> Result<ActResult, PageError>;

    fn extract(&mut self, instruction: &str, schema: &ExtractSchema) -> Result<Value, PageError>;

    fn wait_for_timeout(&mut self, ms: u64);

    fn wait_for_load_state(&mut self, state: LoadState, timeout_ms: u64) -> Result<(), PageError>;
}

/// Extract and deserialize leniently. A shape serde cannot map is an extraction error.
pub fn extract_as<T, P>(page: &mut P, instruction: &str, schema: &ExtractSchema) -> Result<T, PageError>
where
    T: DeserializeOwned,
    P: PageActions + ?Sized,
{
    let value = page.extract(instruction, schema)?;
    debug!(schema = schema.name, payload = %value, "extraction payload");
    serde_json::from_value(value)
        .map_err(|e| PageError::Extraction(format!("unusable {} payload: {}", schema.name, e)))
}

/// `deserialize_with` helper: an explicit `null` reads as the type's default, like a missing key.
pub fn null_as_default<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

const COOKIE_OBSERVE_INSTRUCTION: &str =
    "Click the 'Accept All', 'Alle akzeptieren', 'Akzeptieren', or 'Cookies annehmen' button";
const COOKIE_ACT_INSTRUCTION: &str = "Click the 'Accept All' button or 'Alle akzeptieren' button";

/// Best-effort cookie banner dismissal. Never fails.
pub fn dismiss_cookie_banner<P: PageActions + ?Sized>(page: &mut P) {
    page.wait_for_timeout(1000);

    match page.observe(COOKIE_OBSERVE_INSTRUCTION) {
        Ok(actions) if !actions.is_empty() => {
            debug!(action = %actions[0].description, "accepting cookies");
            if let Err(e) = page.act(ActTarget::Candidate(&actions[0])) {
                debug!("cookie action failed: {}", e);
            }
        }
        Ok(_) => {
            if let Err(e) = page.act(ActTarget::Instruction(COOKIE_ACT_INSTRUCTION)) {
                debug!("no cookie banner handled: {}", e);
            }
        }
        Err(e) => debug!("cookie observe failed: {}", e),
    }

    page.wait_for_timeout(1000);
}
