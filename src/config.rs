use anyhow::{anyhow, Result};
use std::env;
use std::path::PathBuf;

pub const DEFAULT_WEBDRIVER_URL: &str = "http://localhost:9515";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_OUTPUT: &str = "public/jobs.json";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;
pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 10_000;

/// Bounds of the randomized pause between companies. Configured values are clamped into this range.
pub const MIN_DELAY_MS: u64 = 2_000;
pub const MAX_DELAY_MS: u64 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub default_ms: u64,
    pub navigation_ms: u64,
    pub action_ms: u64,
    pub observe_ms: u64,
    pub extraction_ms: u64,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            default_ms: DEFAULT_TIMEOUT_MS,
            navigation_ms: DEFAULT_TIMEOUT_MS,
            action_ms: DEFAULT_ACTION_TIMEOUT_MS,
            observe_ms: DEFAULT_TIMEOUT_MS,
            extraction_ms: DEFAULT_TIMEOUT_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    pub webdriver_url: String,
    pub model: String,
    pub headless: bool,
    pub timeouts: Timeouts,
    pub delay_min_ms: u64,
    pub delay_max_ms: u64,
    pub output: PathBuf,
    pub log_dir: PathBuf,
}

/// Entry point: `.env` (if present), then the process environment.
pub fn load() -> Result<Settings> {
    let _ = dotenvy::dotenv();
    Settings::from_lookup(|key| env::var(key).ok())
}

fn default_log_dir() -> PathBuf {
    directories::ProjectDirs::from("", "", "jobscout")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("logs"))
}

fn parse_ms(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: u64) -> Result<u64> {
    match lookup(key).filter(|v| !v.trim().is_empty()) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| anyhow!("{} must be a whole number of milliseconds, got '{}'", key, raw)),
        None => Ok(default),
    }
}

fn parse_bool(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<bool> {
    match lookup(key).map(|v| v.trim().to_lowercase()).as_deref() {
        None | Some("") => Ok(false),
        Some("1" | "true" | "yes" | "on") => Ok(true),
        Some("0" | "false" | "no" | "off") => Ok(false),
        Some(other) => Err(anyhow!("{} must be true or false, got '{}'", key, other)),
    }
}

/// Clamp a configured delay range into [MIN_DELAY_MS, MAX_DELAY_MS], keeping min <= max.
pub fn clamp_delay(min_ms: u64, max_ms: u64) -> (u64, u64) {
    let min = min_ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS);
    let max = max_ms.clamp(MIN_DELAY_MS, MAX_DELAY_MS).max(min);
    (min, max)
}

impl Settings {
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let default_ms = parse_ms(&lookup, "JOBSCOUT_TIMEOUT_MS", DEFAULT_TIMEOUT_MS)?;
        let timeouts = Timeouts {
            default_ms,
            navigation_ms: parse_ms(&lookup, "JOBSCOUT_NAVIGATION_TIMEOUT_MS", default_ms)?,
            action_ms: parse_ms(&lookup, "JOBSCOUT_ACTION_TIMEOUT_MS", DEFAULT_ACTION_TIMEOUT_MS)?,
            observe_ms: parse_ms(&lookup, "JOBSCOUT_OBSERVE_TIMEOUT_MS", default_ms)?,
            extraction_ms: parse_ms(&lookup, "JOBSCOUT_EXTRACTION_TIMEOUT_MS", default_ms)?,
        };

        let (delay_min_ms, delay_max_ms) = clamp_delay(
            parse_ms(&lookup, "JOBSCOUT_DELAY_MIN_MS", MIN_DELAY_MS)?,
            parse_ms(&lookup, "JOBSCOUT_DELAY_MAX_MS", MAX_DELAY_MS)?,
        );

        Ok(Self {
            webdriver_url: non_empty("JOBSCOUT_WEBDRIVER_URL")
                .unwrap_or_else(|| DEFAULT_WEBDRIVER_URL.to_string()),
            model: non_empty("JOBSCOUT_MODEL").unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            headless: parse_bool(&lookup, "JOBSCOUT_HEADLESS")?,
            timeouts,
            delay_min_ms,
            delay_max_ms,
            output: non_empty("JOBSCOUT_OUTPUT")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT)),
            log_dir: non_empty("JOBSCOUT_LOG_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(default_log_dir),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn settings(vars: &[(&str, &str)]) -> Result<Settings> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Settings::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults() {
        let s = settings(&[]).unwrap();
        assert_eq!(s.webdriver_url, DEFAULT_WEBDRIVER_URL);
        assert_eq!(s.model, "gpt-4o-mini");
        assert!(!s.headless);
        assert_eq!(s.timeouts, Timeouts::default());
        assert_eq!((s.delay_min_ms, s.delay_max_ms), (2000, 5000));
        assert_eq!(s.output, PathBuf::from("public/jobs.json"));
    }

    #[test]
    fn test_timeouts_follow_default_unless_set() {
        let s = settings(&[
            ("JOBSCOUT_TIMEOUT_MS", "45000"),
            ("JOBSCOUT_EXTRACTION_TIMEOUT_MS", "60000"),
        ])
        .unwrap();
        assert_eq!(s.timeouts.navigation_ms, 45000);
        assert_eq!(s.timeouts.observe_ms, 45000);
        assert_eq!(s.timeouts.extraction_ms, 60000);
        assert_eq!(s.timeouts.action_ms, DEFAULT_ACTION_TIMEOUT_MS);
    }

    #[test]
    fn test_invalid_number_names_the_variable() {
        let err = settings(&[("JOBSCOUT_ACTION_TIMEOUT_MS", "zehn")]).unwrap_err();
        assert!(err.to_string().contains("JOBSCOUT_ACTION_TIMEOUT_MS"));
    }

    #[test]
    fn test_headless_flag_parsing() {
        assert!(settings(&[("JOBSCOUT_HEADLESS", "TRUE")]).unwrap().headless);
        assert!(!settings(&[("JOBSCOUT_HEADLESS", "0")]).unwrap().headless);
        assert!(settings(&[("JOBSCOUT_HEADLESS", "vielleicht")]).is_err());
    }

    #[test]
    fn test_delay_is_clamped() {
        assert_eq!(clamp_delay(0, 60_000), (2000, 5000));
        assert_eq!(clamp_delay(4000, 3000), (4000, 4000));
        assert_eq!(clamp_delay(2500, 3500), (2500, 3500));

        let s = settings(&[("JOBSCOUT_DELAY_MIN_MS", "100"), ("JOBSCOUT_DELAY_MAX_MS", "100")]).unwrap();
        assert_eq!((s.delay_min_ms, s.delay_max_ms), (2000, 2000));
    }

    #[test]
    fn test_blank_values_fall_back_to_defaults() {
        let s = settings(&[("JOBSCOUT_MODEL", "  "), ("JOBSCOUT_LOG_DIR", "/tmp/jobscout-logs")]).unwrap();
        assert_eq!(s.model, DEFAULT_MODEL);
        assert_eq!(s.log_dir, PathBuf::from("/tmp/jobscout-logs"));
    }
}
