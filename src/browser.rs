use anyhow::{anyhow, Context, Result};
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};
use std::future::Future;
use std::sync::{Arc, OnceLock};
use std::thread;
use std::time::Duration;
use thirtyfour::error::WebDriverError;
use thirtyfour::prelude::*;
use thirtyfour::ChromiumLikeCapabilities;
use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::ai::{parse_id_list, parse_json_reply, AIProvider, ReplyFormat};
use crate::cleaner::clean_text;
use crate::config::Timeouts;
use crate::page::{ActResult, ActTarget, ActionCandidate, ExtractSchema, LoadState, PageActions, PageError};

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 \
    (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36";

const ID_ATTR: &str = "data-jobscout-id";
const MAX_OBSERVED_ELEMENTS: usize = 300;
const MAX_PAGE_TEXT_CHARS: usize = 12_000;
const MAX_LINKS: usize = 150;

const ANCHOR_HREFS_SCRIPT: &str =
    "return Array.from(document.querySelectorAll('a[href]')).map(a => a.href);";

const TAG_ELEMENTS_SCRIPT: &str = r#"
const limit = arguments[0];
const nodes = document.querySelectorAll(
  'a, button, [role=button], [role=menuitem], summary, input[type=submit], input[type=button]'
);
const out = [];
for (const el of nodes) {
  el.removeAttribute('data-jobscout-id');
  if (out.length >= limit) continue;
  const r = el.getBoundingClientRect();
  const style = window.getComputedStyle(el);
  if (r.width === 0 || r.height === 0 || style.visibility === 'hidden' || style.display === 'none') continue;
  const id = out.length;
  el.setAttribute('data-jobscout-id', String(id));
  const text = (el.innerText || el.value || el.getAttribute('aria-label') || el.title || '')
    .replace(/\s+/g, ' ').trim().slice(0, 120);
  out.push({ id, tag: el.tagName.toLowerCase(), text, href: el.href || null });
}
return out;
"#;

#[derive(Debug, Clone, Deserialize)]
struct TaggedElement {
    id: usize,
    tag: String,
    #[serde(default)]
    text: String,
    #[serde(default)]
    href: Option<String>,
}

impl TaggedElement {
    fn describe(&self) -> String {
        match &self.href {
            Some(href) => format!("[{}] <{}> {} ({})", self.id, self.tag, self.text, href),
            None => format!("[{}] <{}> {}", self.id, self.tag, self.text),
        }
    }

    fn to_candidate(&self) -> ActionCandidate {
        let label = if self.text.is_empty() {
            self.href.clone().unwrap_or_else(|| self.tag.clone())
        } else {
            self.text.clone()
        };
        ActionCandidate::click(&format!("[{}=\"{}\"]", ID_ATTR, self.id), &label)
    }
}

/// Condensed view of a page handed to the model for extraction.
#[derive(Debug, Default)]
struct PageDigest {
    title: String,
    headings: Vec<String>,
    links: Vec<(String, String)>,
    text: String,
}

fn digest_html(source: &str, base_url: &str) -> PageDigest {
    static TITLE: OnceLock<Selector> = OnceLock::new();
    static HEADINGS: OnceLock<Selector> = OnceLock::new();
    static LINKS: OnceLock<Selector> = OnceLock::new();
    static BODY: OnceLock<Selector> = OnceLock::new();
    let title_sel = TITLE.get_or_init(|| Selector::parse("title").unwrap());
    let headings_sel = HEADINGS.get_or_init(|| Selector::parse("h1, h2, h3").unwrap());
    let links_sel = LINKS.get_or_init(|| Selector::parse("a[href]").unwrap());
    let body_sel = BODY.get_or_init(|| Selector::parse("body").unwrap());

    let html = Html::parse_document(source);
    let base = url::Url::parse(base_url).ok();

    let title = html
        .select(title_sel)
        .next()
        .map(|el| clean_text(&el.text().collect::<String>()))
        .unwrap_or_default();

    let headings = html
        .select(headings_sel)
        .map(|el| clean_text(&el.text().collect::<String>()))
        .filter(|h| !h.is_empty())
        .collect();

    let links = html
        .select(links_sel)
        .filter_map(|el| {
            let href = el.value().attr("href")?;
            let resolved = match &base {
                Some(base) => base.join(href).ok()?.to_string(),
                None => href.to_string(),
            };
            Some((clean_text(&el.text().collect::<String>()), resolved))
        })
        .filter(|(_, href)| href.starts_with("http"))
        .take(MAX_LINKS)
        .collect();

    let mut raw_text = String::new();
    if let Some(body) = html.select(body_sel).next() {
        for node in body.descendants() {
            let Some(text) = node.value().as_text() else { continue };
            let hidden = node
                .parent()
                .and_then(|p| p.value().as_element())
                .is_some_and(|el| matches!(el.name(), "script" | "style" | "noscript" | "template"));
            if !hidden {
                raw_text.push_str(text);
                raw_text.push(' ');
            }
        }
    }
    let text = clean_text(&raw_text).chars().take(MAX_PAGE_TEXT_CHARS).collect();

    PageDigest { title, headings, links, text }
}

fn observe_prompt(instruction: &str, elements: &[TaggedElement]) -> String {
    let listing = elements
        .iter()
        .map(TaggedElement::describe)
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "You are operating a web browser. Below is a numbered list of the interactive elements \
        visible on the current page.\n\n\
        Task: {instruction}\n\n\
        Return the ids of the elements that accomplish the task, best match first, as a \
        comma-separated list (for example: 4, 17). Return NONE if no element fits. \
        Reply with nothing else.\n\n\
        Elements:\n{listing}"
    )
}

fn extract_prompt(instruction: &str, schema: &ExtractSchema, url: &str, digest: &PageDigest) -> String {
    let headings = digest
        .headings
        .iter()
        .map(|h| format!("- {}", h))
        .collect::<Vec<_>>()
        .join("\n");
    let links = digest
        .links
        .iter()
        .map(|(text, href)| format!("- {} -> {}", text, href))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "Extract structured data from the web page below.\n\
        Instruction: {instruction}\n\n\
        Return ONLY a JSON value matching this JSON schema ({name}). Use null for values the page \
        does not contain. Do not invent data.\n{schema}\n\n\
        Page URL: {url}\n\
        Title: {title}\n\n\
        Headings:\n{headings}\n\n\
        Links:\n{links}\n\n\
        Page text:\n{text}",
        name = schema.name,
        schema = schema.schema,
        title = digest.title,
        text = digest.text,
    )
}

async fn run_script(driver: &WebDriver, script: &str, args: Vec<Value>) -> WebDriverResult<Value> {
    let ret = driver.execute(script, args).await?;
    Ok(ret.json().clone())
}

async fn source_and_url(driver: &WebDriver) -> WebDriverResult<(String, String)> {
    let source = driver.source().await?;
    let url = driver.current_url().await?;
    Ok((source, url.to_string()))
}

/// `Ok(None)` when the click landed, `Ok(Some(href))` when it was intercepted on a link.
async fn click_or_href(driver: &WebDriver, selector: &str) -> WebDriverResult<Option<String>> {
    let elem = driver.find(By::Css(selector)).await?;
    let _ = elem.scroll_into_view().await;
    match elem.click().await {
        Ok(()) => Ok(None),
        Err(click_err) => match elem.attr("href").await {
            Ok(Some(href)) => Ok(Some(href)),
            _ => Err(click_err),
        },
    }
}

async fn wait_ready(driver: &WebDriver, accepted: &[&str], settle_ms: u64) -> WebDriverResult<()> {
    loop {
        let state = run_script(driver, "return document.readyState;", Vec::new()).await?;
        if state.as_str().is_some_and(|s| accepted.contains(&s)) {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    if settle_ms > 0 {
        tokio::time::sleep(Duration::from_millis(settle_ms)).await;
    }
    Ok(())
}

/// Chrome over WebDriver, with a language model grounding `observe` and `extract`.
pub struct WebDriverPage {
    runtime: Runtime,
    driver: Option<WebDriver>,
    llm: Arc<dyn AIProvider>,
    timeouts: Timeouts,
}

impl WebDriverPage {
    pub fn launch(
        webdriver_url: &str,
        headless: bool,
        timeouts: Timeouts,
        llm: Arc<dyn AIProvider>,
    ) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .context("Failed to start async runtime")?;

        let mut caps = DesiredCapabilities::chrome();
        caps.add_arg("--lang=de-DE")?;
        caps.add_arg("--window-size=1280,720")?;
        caps.add_arg("--disable-blink-features=AutomationControlled")?;
        caps.add_arg(&format!("--user-agent={}", USER_AGENT))?;
        caps.add_experimental_option("prefs", json!({ "intl.accept_languages": "de-DE,de,en" }))?;
        if headless {
            caps.add_arg("--headless=new")?;
        }

        let connect = tokio::time::timeout(
            Duration::from_millis(timeouts.navigation_ms),
            WebDriver::new(webdriver_url, caps),
        );
        let driver = runtime
            .block_on(connect)
            .map_err(|_| anyhow!("Timed out connecting to WebDriver at {}", webdriver_url))?
            .with_context(|| {
                format!(
                    "Failed to start a browser session at {}. Is chromedriver running?",
                    webdriver_url
                )
            })?;

        info!(
            "Browser session started ({}, model {})",
            if headless { "headless" } else { "headed" },
            llm.model_name()
        );
        Ok(Self {
            runtime,
            driver: Some(driver),
            llm,
            timeouts,
        })
    }

    pub fn close(mut self) -> Result<()> {
        if let Some(driver) = self.driver.take() {
            self.runtime
                .block_on(driver.quit())
                .context("Failed to close browser session")?;
            debug!("Browser session closed");
        }
        Ok(())
    }

    fn driver(&self) -> Result<&WebDriver, PageError> {
        self.driver
            .as_ref()
            .ok_or_else(|| PageError::Session("browser session already closed".to_string()))
    }

    fn run<T>(
        &self,
        operation: &'static str,
        ms: u64,
        fut: impl Future<Output = WebDriverResult<T>>,
        on_error: impl FnOnce(WebDriverError) -> PageError,
    ) -> Result<T, PageError> {
        match self.runtime.block_on(tokio::time::timeout(Duration::from_millis(ms), fut)) {
            Ok(Ok(value)) => Ok(value),
            Ok(Err(e)) => Err(on_error(e)),
            Err(_) => Err(PageError::Timeout { operation, ms }),
        }
    }

    /// Model round trip on the blocking pool so the same timeout applies to it.
    fn ask(
        &self,
        operation: &'static str,
        ms: u64,
        prompt: String,
        max_tokens: u32,
        format: ReplyFormat,
    ) -> Result<String, PageError> {
        let llm = Arc::clone(&self.llm);
        let outcome = self.runtime.block_on(async move {
            let task = tokio::task::spawn_blocking(move || llm.complete(&prompt, max_tokens, format));
            tokio::time::timeout(Duration::from_millis(ms), task).await
        });
        match outcome {
            Ok(Ok(Ok(reply))) => {
                debug!(operation, reply = %reply, "model reply");
                Ok(reply)
            }
            Ok(Ok(Err(e))) => Err(PageError::Extraction(format!("{} model call failed: {:#}", operation, e))),
            Ok(Err(join)) => Err(PageError::Session(join.to_string())),
            Err(_) => Err(PageError::Timeout { operation, ms }),
        }
    }
}

impl PageActions for WebDriverPage {
    fn goto(&mut self, url: &str) -> Result<(), PageError> {
        debug!("goto {}", url);
        let driver = self.driver()?;
        self.run("goto", self.timeouts.navigation_ms, driver.goto(url), |e| {
            PageError::navigation(url, e)
        })
    }

    fn url(&mut self) -> Result<String, PageError> {
        let driver = self.driver()?;
        let url = self.run("url", self.timeouts.default_ms, driver.current_url(), |e| {
            PageError::Session(e.to_string())
        })?;
        Ok(url.to_string())
    }

    fn anchor_hrefs(&mut self) -> Result<Vec<String>, PageError> {
        let driver = self.driver()?;
        let value = self.run(
            "anchor_hrefs",
            self.timeouts.default_ms,
            run_script(driver, ANCHOR_HREFS_SCRIPT, Vec::new()),
            |e| PageError::Session(e.to_string()),
        )?;
        serde_json::from_value(value).map_err(|e| PageError::Extraction(format!("anchor list: {}", e)))
    }

    fn observe(&mut self, instruction: &str) -> Result<Vec<ActionCandidate>, PageError> {
        let ms = self.timeouts.observe_ms;
        let driver = self.driver()?;
        let value = self.run(
            "observe",
            ms,
            run_script(driver, TAG_ELEMENTS_SCRIPT, vec![json!(MAX_OBSERVED_ELEMENTS)]),
            |e| PageError::Session(e.to_string()),
        )?;
        let elements: Vec<TaggedElement> = serde_json::from_value(value)
            .map_err(|e| PageError::Extraction(format!("element list: {}", e)))?;
        if elements.is_empty() {
            return Ok(Vec::new());
        }

        let reply = self.ask("observe", ms, observe_prompt(instruction, &elements), 128, ReplyFormat::Text)?;
        let candidates: Vec<ActionCandidate> = parse_id_list(&reply)
            .into_iter()
            .filter_map(|id| elements.iter().find(|el| el.id == id))
            .map(TaggedElement::to_candidate)
            .collect();
        debug!(instruction, found = candidates.len(), "observe");
        Ok(candidates)
    }

    fn act(&mut self, target: ActTarget<'_>) -> Result<ActResult, PageError> {
        let candidate = match target {
            ActTarget::Candidate(candidate) => candidate.clone(),
            ActTarget::Instruction(instruction) => self
                .observe(instruction)?
                .into_iter()
                .next()
                .ok_or_else(|| PageError::Action(format!("no element matches '{}'", instruction)))?,
        };

        let driver = self.driver()?;
        let fallback = self.run(
            "act",
            self.timeouts.action_ms,
            click_or_href(driver, &candidate.selector),
            |e| PageError::Action(format!("{}: {}", candidate.description, e)),
        )?;

        let message = match fallback {
            None => format!("clicked {}", candidate.description),
            Some(href) => {
                warn!("Click on '{}' intercepted, following {}", candidate.description, href);
                self.goto(&href)
                    .map_err(|e| PageError::Action(e.to_string()))?;
                format!("navigated to {}", href)
            }
        };

        Ok(ActResult {
            success: true,
            message,
            action: candidate.description,
        })
    }

    fn extract(&mut self, instruction: &str, schema: &ExtractSchema) -> Result<Value, PageError> {
        let ms = self.timeouts.extraction_ms;
        let driver = self.driver()?;
        let (source, url) = self.run("extract", ms, source_and_url(driver), |e| {
            PageError::Extraction(e.to_string())
        })?;

        let digest = digest_html(&source, &url);
        let reply = self.ask("extract", ms, extract_prompt(instruction, schema, &url, &digest), 4096, ReplyFormat::Json)?;
        parse_json_reply(&reply).map_err(|e| PageError::Extraction(format!("{}: {:#}", schema.name, e)))
    }

    fn wait_for_timeout(&mut self, ms: u64) {
        thread::sleep(Duration::from_millis(ms));
    }

    fn wait_for_load_state(&mut self, state: LoadState, timeout_ms: u64) -> Result<(), PageError> {
        let (accepted, settle_ms): (&[&str], u64) = match state {
            LoadState::DomContentLoaded => (&["interactive", "complete"], 0),
            LoadState::Load => (&["complete"], 0),
            LoadState::NetworkIdle => (&["complete"], 500),
        };
        let driver = self.driver()?;
        self.run("wait_for_load_state", timeout_ms, wait_ready(driver, accepted, settle_ms), |e| {
            PageError::Session(e.to_string())
        })
    }
}

impl Drop for WebDriverPage {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            let _ = self.runtime.block_on(driver.quit());
        }
    }
}
