mod adzuna;
mod ai;
mod ats;
mod browser;
mod companies;
mod config;
mod crawler;
mod error;
mod extract;
mod fetch;
mod locator;
mod models;
mod normalize;
mod remoteok;
mod scoring;
mod store;
mod vocabulary;

use ai::{DEFAULT_MODEL, LlmProfileAnalyzer, ProfileAnalyzer};
use anyhow::{Context, Result, anyhow};
use clap::{Parser, Subcommand};
use config::Config;
use crawler::{CrawlReport, Crawler};
use fetch::HttpPageFetcher;
use models::{CandidateProfile, JobPosting, Match};
use std::path::{Path, PathBuf};
use store::Store;
use tracing::warn;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(name = "scout")]
#[command(about = "Discover job postings on company career pages and rank them against your profile")]
struct Cli {
    /// Path to a TOML config file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl company career pages and merge new postings into the store
    Crawl {
        /// Company directory (file path or URL); defaults to the configured source
        #[arg(long)]
        companies: Option<String>,

        /// Only crawl the first N companies
        #[arg(short, long)]
        limit: Option<usize>,

        /// Render pages in a headless browser when static HTML yields nothing
        #[arg(long)]
        js: bool,

        /// Also pull postings from the RemoteOK feed
        #[arg(long)]
        remoteok: bool,

        /// Also search the Adzuna API (needs ADZUNA_APP_ID and ADZUNA_APP_KEY)
        #[arg(long)]
        adzuna: bool,

        /// Keyword for the RemoteOK filter and the Adzuna query (repeatable)
        #[arg(short, long = "keyword")]
        keywords: Vec<String>,
    },

    /// List companies from the directory
    Companies {
        /// Company directory (file path or URL)
        #[arg(long)]
        source: Option<String>,
    },

    /// Fetch a single page and show what would be extracted from it
    Probe {
        /// Page URL
        url: String,

        /// Render the page in a headless browser
        #[arg(long)]
        js: bool,
    },

    /// List stored postings
    List {
        /// Filter by company name (substring)
        #[arg(long)]
        company: Option<String>,

        /// Filter by detected skill
        #[arg(short, long)]
        skill: Option<String>,
    },

    /// Show posting details
    Show {
        /// Posting ID or link
        key: String,
    },

    /// Rank stored postings against a candidate profile
    Rank {
        /// Profile JSON file
        #[arg(short, long, conflicts_with = "resume", required_unless_present = "resume")]
        profile: Option<PathBuf>,

        /// Plain-text resume to analyze with an LLM
        #[arg(short, long)]
        resume: Option<PathBuf>,

        /// Model used for resume analysis
        #[arg(short, long, default_value = DEFAULT_MODEL)]
        model: String,

        /// Override the configured minimum score
        #[arg(long)]
        min_score: Option<f64>,

        /// Number of postings to show
        #[arg(short, long, default_value = "10")]
        limit: usize,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("scout=info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Commands::Crawl {
            companies: directory,
            limit,
            js,
            remoteok,
            adzuna,
            keywords,
        } => {
            let mut crawler_config = config.crawler.clone();
            crawler_config.js_fallback |= js;
            let source = directory.unwrap_or_else(|| crawler_config.companies_source.clone());
            let store = Store::open(config.store_path());

            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            let report = runtime.block_on(async {
                let fetcher = HttpPageFetcher::new(&crawler_config)?;
                let mut company_list = match companies::load_companies(
                    &source,
                    fetcher.static_fetcher(),
                    &config.companies_cache_path(),
                )
                .await
                {
                    Ok(list) => list,
                    Err(e) => {
                        warn!("No company directory available: {:#}", e);
                        Vec::new()
                    }
                };
                if let Some(limit) = limit {
                    company_list.truncate(limit);
                }
                println!("Crawling {} companies...", company_list.len());

                let crawler = Crawler::new(fetcher, crawler_config.clone(), config.vocabulary.clone());
                let today = chrono::Local::now().date_naive();
                let mut extra = Vec::new();
                if remoteok {
                    match remoteok::fetch_remoteok(
                        crawler.fetcher().static_fetcher(),
                        &config.vocabulary,
                        &keywords,
                        100,
                        today,
                    )
                    .await
                    {
                        Ok(postings) => extra.extend(postings),
                        Err(e) => warn!("RemoteOK feed unavailable: {}", e),
                    }
                }
                if adzuna {
                    match adzuna::fetch_adzuna(
                        crawler.fetcher().static_fetcher(),
                        &config.adzuna,
                        &config.vocabulary,
                        &keywords,
                        today,
                    )
                    .await
                    {
                        Ok(postings) => extra.extend(postings),
                        Err(e) => warn!("Adzuna search unavailable: {}", e),
                    }
                }

                let report = crawler.run_and_persist(&company_list, extra, &store).await?;
                anyhow::Ok(report)
            })?;

            print_report(&report, store.path());
        }

        Commands::Companies { source } => {
            let source = source.unwrap_or_else(|| config.crawler.companies_source.clone());
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            let list = runtime.block_on(async {
                let fetcher = fetch::StaticFetcher::new(&config.crawler)?;
                companies::load_companies(&source, &fetcher, &config.companies_cache_path()).await
            })?;

            if list.is_empty() {
                println!("No companies found.");
            } else {
                println!("{:<5} {:<30} {:<50}", "#", "NAME", "URL");
                println!("{}", "-".repeat(86));
                for (i, company) in list.iter().enumerate() {
                    println!(
                        "{:<5} {:<30} {:<50}",
                        i + 1,
                        truncate(&company.name, 28),
                        truncate(&company.url, 50)
                    );
                }
                println!("\n{} companies", list.len());
            }
        }

        Commands::Probe { url, js } => {
            let url = normalize::normalize_url(&url)?;
            let runtime = tokio::runtime::Runtime::new().context("Failed to start async runtime")?;
            let page = runtime.block_on(async {
                let fetcher = HttpPageFetcher::new(&config.crawler)?;
                let crawler = Crawler::new(fetcher, config.crawler.clone(), config.vocabulary.clone());
                anyhow::Ok(crawler.probe(&url, js).await?)
            })?;

            println!("URL: {}", url);
            println!("ATS: {}", page.ats.as_deref().unwrap_or("none detected"));
            if page.postings.is_empty() {
                println!("No postings found.");
            } else {
                print_postings(&page.postings);
            }
        }

        Commands::List { company, skill } => {
            let postings = Store::open(config.store_path()).load_or_recover()?;
            let filtered: Vec<JobPosting> = postings
                .into_iter()
                .filter(|p| {
                    company
                        .as_ref()
                        .is_none_or(|c| p.company.to_lowercase().contains(&c.to_lowercase()))
                })
                .filter(|p| {
                    skill
                        .as_ref()
                        .is_none_or(|s| p.detected_skills.iter().any(|d| d.eq_ignore_ascii_case(s)))
                })
                .collect();

            if filtered.is_empty() {
                println!("No postings found.");
            } else {
                print_postings(&filtered);
                println!("\n{} postings", filtered.len());
            }
        }

        Commands::Show { key } => {
            let postings = Store::open(config.store_path()).load_or_recover()?;
            match Store::find(&postings, &key) {
                Some(p) => {
                    println!("Posting {}", p.id);
                    println!("Title: {}", p.title);
                    println!("Company: {}", p.company);
                    if !p.company_url.is_empty() {
                        println!("Company URL: {}", p.company_url);
                    }
                    println!("Link: {}", p.link);
                    println!("Location: {}", p.location);
                    if let Some(seniority) = p.seniority {
                        println!("Seniority: {}", seniority);
                    }
                    if let Some(ats) = &p.ats {
                        println!("ATS: {}", ats);
                    }
                    match (p.salary_min, p.salary_max) {
                        (Some(min), Some(max)) => println!("Salary: {:.0} - {:.0}", min, max),
                        (Some(min), None) => println!("Salary: {:.0}+", min),
                        (None, Some(max)) => println!("Salary: up to {:.0}", max),
                        (None, None) => {}
                    }
                    if !p.detected_skills.is_empty() {
                        println!("Skills: {}", p.detected_skills.join(", "));
                    }
                    println!("Collected: {}", p.collected_date);
                    if !p.description.is_empty() {
                        println!("\n--- Description ---\n{}", textwrap::fill(&p.description, 80));
                    }
                }
                None => println!("Posting '{}' not found.", key),
            }
        }

        Commands::Rank {
            profile,
            resume,
            model,
            min_score,
            limit,
        } => {
            let candidate = match (profile, resume) {
                (Some(path), _) => load_profile(&path)?,
                (None, Some(path)) => {
                    let text = ai::read_resume(&path)?;
                    let spec = ai::resolve_model(&model)?;
                    let provider = ai::create_provider(&spec)
                        .context("Resume analysis needs an API key; pass --profile to skip it")?;
                    let analyzer = LlmProfileAnalyzer::new(provider);
                    println!(
                        "Analyzing resume with {} ({})...",
                        spec.short_name,
                        analyzer.model_name()
                    );
                    analyzer.analyze(&text)?
                }
                (None, None) => return Err(anyhow!("Pass --profile or --resume")),
            };

            let mut weights = config.scoring;
            if let Some(min) = min_score {
                weights.min_score = min;
                weights.validate()?;
            }

            let postings = Store::open(config.store_path()).load_or_recover()?;
            let ranked = scoring::rank(&candidate, &postings, &weights);

            if ranked.is_empty() {
                println!("No postings scored at or above {:.2}.", weights.min_score);
            } else {
                println!(
                    "{:<5} {:>6} {:<30} {:<20} {:<8}",
                    "RANK", "SCORE", "TITLE", "COMPANY", "LEVEL"
                );
                println!("{}", "-".repeat(73));
                for (i, m) in ranked.iter().take(limit).enumerate() {
                    for line in match_lines(i + 1, m) {
                        println!("{}", line);
                    }
                }
                println!("\n{} of {} postings matched", ranked.len(), postings.len());
            }
        }
    }

    Ok(())
}

fn load_profile(path: &Path) -> Result<CandidateProfile> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read profile: {}", path.display()))?;
    serde_json::from_str(&text).with_context(|| format!("Invalid profile JSON: {}", path.display()))
}

fn print_postings(postings: &[JobPosting]) {
    println!(
        "{:<10} {:<20} {:<32} {:<8} {:<12} {:<10}",
        "ID", "COMPANY", "TITLE", "LEVEL", "ATS", "COLLECTED"
    );
    println!("{}", "-".repeat(97));
    for p in postings {
        println!(
            "{:<10} {:<20} {:<32} {:<8} {:<12} {:<10}",
            truncate(&p.id, 8),
            truncate(&p.company, 18),
            truncate(&p.title, 30),
            p.seniority.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
            truncate(p.ats.as_deref().unwrap_or("-"), 12),
            p.collected_date
        );
    }
}

/// One rank table row plus its indented skills and rationale lines.
fn match_lines(rank: usize, m: &Match) -> Vec<String> {
    let mut lines = vec![format!(
        "{:<5} {:>6.2} {:<30} {:<20} {:<8}",
        rank,
        m.score,
        truncate(&m.posting.title, 28),
        truncate(&m.posting.company, 18),
        m.posting.seniority.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
    )];
    if !m.overlapping_skills.is_empty() {
        let skills = format!("Skills: {}", m.overlapping_skills.join(", "));
        lines.extend(textwrap::fill(&skills, 66).lines().map(|l| format!("{:>13}{}", "", l)));
    }
    lines.extend(
        textwrap::fill(&m.rationale, 66)
            .lines()
            .map(|l| format!("{:>13}{}", "", l)),
    );
    lines
}

fn print_report(report: &CrawlReport, store_path: &Path) {
    println!("\nResults:");
    println!("  Companies crawled:   {}", report.companies);
    println!("  With postings:       {}", report.companies_with_jobs);
    println!("  Pages tried:         {}", report.candidates_tried);
    if report.fetch_failures > 0 {
        println!("  Fetch failures:      {}", report.fetch_failures);
    }
    println!("  Postings extracted:  {}", report.extracted);
    println!("  New postings:        {}", report.new_postings);
    println!("  Total in store:      {}", report.total_postings);
    println!("  Store: {}", store_path.display());

    let found: Vec<_> = report.per_company.iter().filter(|(_, n)| *n > 0).collect();
    if !found.is_empty() {
        println!("\nPostings by company:");
        for (name, count) in found {
            println!("  {:<30} {:>4}", truncate(name, 28), count);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}
