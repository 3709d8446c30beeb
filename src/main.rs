mod ai;
mod batch;
mod browser;
mod cleaner;
mod config;
mod discovery;
mod extractor;
mod logging;
mod models;
mod page;
mod store;
mod validator;

use anyhow::{Context, Result};
use batch::{BatchOptions, BatchRun, BatchScraper, CompanyStatus, DelayPolicy, RunMode};
use browser::WebDriverPage;
use clap::{Parser, Subcommand};
use config::Settings;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

#[derive(Parser)]
#[command(name = "jobscout")]
#[command(about = "Find company careers pages and collect their job listings")]
struct Cli {
    /// LLM used for page understanding (see `jobscout models`)
    #[arg(long, global = true)]
    model: Option<String>,

    /// WebDriver endpoint, e.g. a running chromedriver
    #[arg(long, global = true)]
    webdriver_url: Option<String>,

    /// Run the browser without a window
    #[arg(long, global = true)]
    headless: bool,

    /// Debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Find careers pages and write them back to the CSV
    Discover {
        /// Company CSV (Name, Website, optional CareersPage)
        #[arg(short, long)]
        csv: PathBuf,

        /// Rediscover even when a careers URL is already known
        #[arg(long)]
        force: bool,
    },

    /// Extract jobs from companies with a known careers URL
    Extract {
        /// Company CSV (Name, Website, CareersPage)
        #[arg(short, long)]
        csv: PathBuf,

        /// Job JSON output path
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Discover careers pages, then extract jobs
    Run {
        /// Company CSV (Name, Website, optional CareersPage)
        #[arg(short, long)]
        csv: PathBuf,

        /// Job JSON output path
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Rediscover even when a careers URL is already known
        #[arg(long)]
        force: bool,
    },

    /// Re-clean and dedupe an existing job JSON file
    Clean {
        /// Job JSON to process
        #[arg(short, long)]
        input: PathBuf,

        /// Where to write the cleaned file (defaults to overwriting the input)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List available models
    Models,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut settings = config::load()?;
    if let Some(model) = cli.model {
        settings.model = model;
    }
    if let Some(url) = cli.webdriver_url {
        settings.webdriver_url = url;
    }
    settings.headless |= cli.headless;

    if let Some(path) = logging::init(&settings.log_dir, cli.verbose) {
        info!("Logging to {}", path.display());
    }

    match cli.command {
        Commands::Discover { csv, force } => {
            run_batch(&settings, RunMode::Discover, &csv, None, force)?;
        }

        Commands::Extract { csv, output } => {
            run_batch(&settings, RunMode::Extract, &csv, output, false)?;
        }

        Commands::Run { csv, output, force } => {
            run_batch(&settings, RunMode::Full, &csv, output, force)?;
        }

        Commands::Clean { input, output } => {
            let existing = store::read_jobs_json(&input)?;
            let (jobs, report) = cleaner::process_jobs(existing.jobs);

            let mut metadata = existing.metadata;
            metadata.total_jobs = jobs.len();

            let output = output.unwrap_or(input);
            store::write_jobs_json(&output, &jobs, &metadata)?;
            println!("{}", report.render());
        }

        Commands::Models => {
            println!("{:<16} {}", "MODEL", "DESCRIPTION");
            println!("{}", "-".repeat(60));
            for (name, description) in ai::AVAILABLE_MODELS {
                println!("{:<16} {}", name, description);
            }
        }
    }

    Ok(())
}

fn run_batch(
    settings: &Settings,
    mode: RunMode,
    csv: &Path,
    output: Option<PathBuf>,
    force: bool,
) -> Result<()> {
    let mut companies = store::read_companies(csv)?;
    if companies.is_empty() {
        println!("No valid companies in {}.", csv.display());
        return Ok(());
    }

    let spec = ai::resolve_model(&settings.model)?;
    let llm = ai::create_provider(&spec)?;
    let interrupt = batch::install_interrupt_handler()?;

    let mut page = WebDriverPage::launch(&settings.webdriver_url, settings.headless, settings.timeouts, llm)
        .context("Could not start the browser")?;

    let options = BatchOptions {
        mode,
        force_reprocess: force,
        delay: DelayPolicy::random(settings.delay_min_ms, settings.delay_max_ms),
    };
    let run = BatchScraper::new(&mut page, options, interrupt).run(&companies);

    if let Err(e) = page.close() {
        warn!("{:#}", e);
    }

    if mode != RunMode::Extract {
        let updated = batch::apply_discoveries(&mut companies, &run.outcomes);
        if updated > 0 {
            store::write_companies(csv, &companies)?;
            info!("Saved {} new careers URLs to {}", updated, csv.display());
        }
    }

    if mode != RunMode::Discover {
        let output = output.unwrap_or_else(|| settings.output.clone());
        store::write_jobs_json(&output, &run.jobs(), &run.metadata())?;
    }

    print_outcomes(&run);
    println!("\n{}", run.report().render());
    Ok(())
}

fn print_outcomes(run: &BatchRun) {
    if run.outcomes.is_empty() {
        return;
    }
    println!("{:<28} {:<8} {:<7} {:>5}  {}", "COMPANY", "STATUS", "CONF", "JOBS", "CAREERS URL");
    println!("{}", "-".repeat(96));
    for outcome in &run.outcomes {
        let status = match outcome.status {
            CompanyStatus::Success => "ok",
            CompanyStatus::Failed => "failed",
            CompanyStatus::Skipped => "skipped",
        };
        println!(
            "{:<28} {:<8} {:<7} {:>5}  {}",
            truncate(&outcome.company, 26),
            status,
            outcome.confidence.map(|c| c.as_str()).unwrap_or("-"),
            outcome.jobs.len(),
            outcome.careers_url.as_deref().unwrap_or("-")
        );
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        format!("{}...", s.chars().take(max.saturating_sub(3)).collect::<String>())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_truncate_counts_chars() {
        assert_eq!(truncate("Acme GmbH", 26), "Acme GmbH");
        assert_eq!(truncate("Müller & Söhne Maschinenbau", 10), "Müller ...");
    }

    #[test]
    fn test_cli_parses_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from([
            "jobscout", "run", "--csv", "companies.csv", "--force", "--model", "haiku", "--headless",
        ])
        .unwrap();
        assert_eq!(cli.model.as_deref(), Some("haiku"));
        assert!(cli.headless);
        match cli.command {
            Commands::Run { csv, output, force } => {
                assert_eq!(csv, PathBuf::from("companies.csv"));
                assert_eq!(output, None);
                assert!(force);
            }
            _ => panic!("expected run"),
        }
    }
}
