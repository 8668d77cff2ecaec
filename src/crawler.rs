use chrono::NaiveDate;
use futures::stream::{self, StreamExt};
use tracing::{debug, info, warn};

use crate::ats::detect_ats;
use crate::config::CrawlerConfig;
use crate::error::{FetchError, StoreError};
use crate::extract::{Extractor, PageSource};
use crate::fetch::PageFetcher;
use crate::locator::careers_candidates;
use crate::models::{CompanyRef, JobPosting};
use crate::normalize::{host_of, normalize_url};
use crate::store::{Store, merge};
use crate::vocabulary::Vocabulary;

/// Progress notifications emitted while crawling.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlEvent {
    CompanyStarted { company: String, candidates: usize },
    /// The company URL could not be normalized; the company is skipped.
    CompanyInvalid { company: String, url: String },
    CandidateFailed { company: String, url: String, error: String },
    /// Fetched fine, no heuristic matched.
    CandidateEmpty { company: String, url: String },
    PageMatched {
        company: String,
        url: String,
        ats: Option<String>,
        postings: usize,
    },
    CompanyEmpty { company: String },
}

/// Receives crawl events. Keeps the crawl itself free of logging.
pub trait CrawlReporter: Send + Sync {
    fn report(&self, event: CrawlEvent);
}

/// Forwards crawl events to `tracing`.
pub struct TracingReporter;

impl CrawlReporter for TracingReporter {
    fn report(&self, event: CrawlEvent) {
        match event {
            CrawlEvent::CompanyStarted { company, candidates } => {
                info!("Probing {} ({} candidate pages)", company, candidates)
            }
            CrawlEvent::CompanyInvalid { company, url } => {
                warn!("Skipping {}: invalid URL '{}'", company, url)
            }
            CrawlEvent::CandidateFailed { company, url, error } => {
                debug!("{}: {} failed: {}", company, url, error)
            }
            CrawlEvent::CandidateEmpty { company, url } => {
                debug!("{}: no postings at {}", company, url)
            }
            CrawlEvent::PageMatched {
                company,
                url,
                ats,
                postings,
            } => info!(
                "{}: {} postings at {} (ATS: {})",
                company,
                postings,
                url,
                ats.as_deref().unwrap_or("none")
            ),
            CrawlEvent::CompanyEmpty { company } => info!("{}: 0 jobs found", company),
        }
    }
}

/// Summary of one crawl run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlReport {
    pub companies: usize,
    pub companies_with_jobs: usize,
    pub candidates_tried: usize,
    pub fetch_failures: usize,
    /// Postings gathered this run, before de-duplication.
    pub extracted: usize,
    pub new_postings: usize,
    pub total_postings: usize,
    pub per_company: Vec<(String, usize)>,
}

/// What a single page yielded.
#[derive(Debug, Clone)]
pub struct PageResult {
    pub ats: Option<String>,
    pub postings: Vec<JobPosting>,
}

#[derive(Debug, Default)]
struct CompanyOutcome {
    postings: Vec<JobPosting>,
    candidates_tried: usize,
    fetch_failures: usize,
}

pub struct Crawler<F: PageFetcher> {
    fetcher: F,
    reporter: Box<dyn CrawlReporter>,
    vocabulary: Vocabulary,
    config: CrawlerConfig,
    collected: NaiveDate,
}

impl<F: PageFetcher> Crawler<F> {
    pub fn new(fetcher: F, config: CrawlerConfig, vocabulary: Vocabulary) -> Self {
        Self {
            fetcher,
            reporter: Box::new(TracingReporter),
            vocabulary,
            config,
            collected: chrono::Local::now().date_naive(),
        }
    }

    #[allow(dead_code)]
    pub fn with_reporter(mut self, reporter: Box<dyn CrawlReporter>) -> Self {
        self.reporter = reporter;
        self
    }

    /// Pin the collection date stamped on postings.
    #[allow(dead_code)]
    pub fn collected_on(mut self, date: NaiveDate) -> Self {
        self.collected = date;
        self
    }

    pub fn fetcher(&self) -> &F {
        &self.fetcher
    }

    /// Crawl every company. Output order follows the company list even when
    /// several companies are probed at once.
    pub async fn collect(&self, companies: &[CompanyRef]) -> (Vec<JobPosting>, CrawlReport) {
        let outcomes: Vec<CompanyOutcome> = stream::iter(companies)
            .map(|company| self.crawl_company(company))
            .buffered(self.config.concurrency.max(1))
            .collect()
            .await;

        let mut report = CrawlReport {
            companies: companies.len(),
            ..CrawlReport::default()
        };
        let mut incoming = Vec::new();
        for (company, outcome) in companies.iter().zip(outcomes) {
            report.candidates_tried += outcome.candidates_tried;
            report.fetch_failures += outcome.fetch_failures;
            if !outcome.postings.is_empty() {
                report.companies_with_jobs += 1;
            }
            report
                .per_company
                .push((company.name.clone(), outcome.postings.len()));
            incoming.extend(outcome.postings);
        }
        report.extracted = incoming.len();
        (incoming, report)
    }

    /// Crawl and merge against `existing`. No I/O besides fetching.
    #[allow(dead_code)]
    pub async fn run(
        &self,
        companies: &[CompanyRef],
        existing: &[JobPosting],
    ) -> (Vec<JobPosting>, CrawlReport) {
        let (incoming, mut report) = self.collect(companies).await;
        let merged = merge_into(existing, &incoming, &mut report);
        (merged, report)
    }

    /// Full round trip: load the store, crawl, merge `extra` postings from
    /// other sources after the crawled ones, save.
    pub async fn run_and_persist(
        &self,
        companies: &[CompanyRef],
        extra: Vec<JobPosting>,
        store: &Store,
    ) -> Result<CrawlReport, StoreError> {
        let existing = store.load_or_recover()?;
        let (mut incoming, mut report) = self.collect(companies).await;
        incoming.extend(extra);
        report.extracted = incoming.len();

        let merged = merge_into(&existing, &incoming, &mut report);
        store.save(&merged)?;
        Ok(report)
    }

    /// Fetch one page and run detection and extraction on it.
    pub async fn probe(&self, url: &str, needs_js: bool) -> Result<PageResult, FetchError> {
        let html = self.fetcher.fetch(url, needs_js).await?;
        let company = host_of(url).unwrap_or_else(|| url.to_string());
        Ok(self.extract_page(&company, url, url, &html))
    }

    async fn crawl_company(&self, company: &CompanyRef) -> CompanyOutcome {
        let mut outcome = CompanyOutcome::default();

        let company_url = match normalize_url(&company.url) {
            Ok(url) => url,
            Err(_) => {
                self.reporter.report(CrawlEvent::CompanyInvalid {
                    company: company.name.clone(),
                    url: company.url.clone(),
                });
                return outcome;
            }
        };

        let candidates = careers_candidates(&company_url);
        self.reporter.report(CrawlEvent::CompanyStarted {
            company: company.name.clone(),
            candidates: candidates.len(),
        });

        for url in candidates {
            outcome.candidates_tried += 1;

            let html = match self.fetcher.fetch(&url, false).await {
                Ok(html) => html,
                Err(e) => {
                    outcome.fetch_failures += 1;
                    self.report_failure(company, &url, &e);
                    continue;
                }
            };

            let mut page = self.extract_page(&company.name, &company_url, &url, &html);
            if page.postings.is_empty() && self.config.js_fallback {
                match self.fetcher.fetch(&url, true).await {
                    Ok(rendered) => {
                        page = self.extract_page(&company.name, &company_url, &url, &rendered)
                    }
                    Err(e) => {
                        outcome.fetch_failures += 1;
                        self.report_failure(company, &url, &e);
                    }
                }
            }

            if page.postings.is_empty() {
                self.reporter.report(CrawlEvent::CandidateEmpty {
                    company: company.name.clone(),
                    url,
                });
                continue;
            }

            self.reporter.report(CrawlEvent::PageMatched {
                company: company.name.clone(),
                url,
                ats: page.ats,
                postings: page.postings.len(),
            });
            outcome.postings = page.postings;
            return outcome;
        }

        self.reporter.report(CrawlEvent::CompanyEmpty {
            company: company.name.clone(),
        });
        outcome
    }

    fn extract_page(&self, company: &str, company_url: &str, url: &str, html: &str) -> PageResult {
        let ats = detect_ats(html).map(str::to_string);
        let source = PageSource {
            company,
            company_url,
            source_url: url,
            collected: self.collected,
            location: &self.config.default_location,
        };
        let mut postings = Extractor::new(&self.vocabulary).extract(html, &source);
        for posting in &mut postings {
            posting.ats = ats.clone();
        }
        PageResult { ats, postings }
    }

    fn report_failure(&self, company: &CompanyRef, url: &str, error: &FetchError) {
        self.reporter.report(CrawlEvent::CandidateFailed {
            company: company.name.clone(),
            url: url.to_string(),
            error: error.to_string(),
        });
    }
}

fn merge_into(existing: &[JobPosting], incoming: &[JobPosting], report: &mut CrawlReport) -> Vec<JobPosting> {
    let merged = merge(existing, incoming);
    report.new_postings = merged.len() - existing.len();
    report.total_postings = merged.len();
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::sync::{Arc, Mutex};

    #[derive(Default)]
    struct RecordingReporter {
        events: Mutex<Vec<CrawlEvent>>,
    }

    impl RecordingReporter {
        fn events(&self) -> Vec<CrawlEvent> {
            self.events.lock().unwrap().clone()
        }
    }

    impl CrawlReporter for Arc<RecordingReporter> {
        fn report(&self, event: CrawlEvent) {
            self.events.lock().unwrap().push(event);
        }
    }

    /// Serves canned pages; anything else is a 404.
    #[derive(Default)]
    struct FakeFetcher {
        pages: HashMap<String, String>,
        rendered: HashMap<String, String>,
        calls: Mutex<Vec<(String, bool)>>,
    }

    impl FakeFetcher {
        fn page(mut self, url: &str, html: &str) -> Self {
            self.pages.insert(url.to_string(), html.to_string());
            self
        }

        fn rendered(mut self, url: &str, html: &str) -> Self {
            self.rendered.insert(url.to_string(), html.to_string());
            self
        }

        fn calls(&self) -> Vec<(String, bool)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageFetcher for FakeFetcher {
        async fn fetch(&self, url: &str, needs_js: bool) -> Result<String, FetchError> {
            self.calls.lock().unwrap().push((url.to_string(), needs_js));
            let pages = if needs_js { &self.rendered } else { &self.pages };
            pages.get(url).cloned().ok_or_else(|| FetchError::Status {
                url: url.to_string(),
                status: 404,
            })
        }
    }

    const JOBS_HTML: &str = r#"
        <script src="https://boards.greenhouse.io/embed/job_board/js"></script>
        <div class="job"><h2>Backend Developer</h2><p>Python and AWS, vaga pleno</p>
            <a href="/careers/backend?utm_source=site">Apply</a></div>
        <div class="job"><h2>Frontend Developer</h2><p>React</p>
            <a href="/careers/frontend">Apply</a></div>
    "#;

    fn acme() -> CompanyRef {
        CompanyRef {
            name: "Acme".to_string(),
            url: "https://acme.com".to_string(),
        }
    }

    fn globex() -> CompanyRef {
        CompanyRef {
            name: "Globex".to_string(),
            url: "https://globex.com".to_string(),
        }
    }

    fn crawler(fetcher: FakeFetcher, config: CrawlerConfig) -> (Crawler<FakeFetcher>, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::default());
        let crawler = Crawler::new(fetcher, config, Vocabulary::default())
            .with_reporter(Box::new(reporter.clone()))
            .collected_on(NaiveDate::from_ymd_opt(2026, 2, 22).unwrap());
        (crawler, reporter)
    }

    #[tokio::test]
    async fn test_stops_at_first_candidate_with_postings() {
        let fetcher = FakeFetcher::default()
            .page("https://acme.com/carreiras", JOBS_HTML)
            .page("https://acme.com/vagas", JOBS_HTML);
        let (crawler, _) = crawler(fetcher, CrawlerConfig::default());

        let (postings, report) = crawler.collect(&[acme()]).await;

        assert_eq!(postings.len(), 2);
        assert_eq!(report.candidates_tried, 2);
        assert_eq!(report.fetch_failures, 1);
        let urls: Vec<_> = crawler.fetcher().calls().into_iter().map(|(u, _)| u).collect();
        assert_eq!(urls, vec!["https://acme.com/careers", "https://acme.com/carreiras"]);
    }

    #[tokio::test]
    async fn test_postings_carry_page_metadata() {
        let fetcher = FakeFetcher::default().page("https://acme.com/careers", JOBS_HTML);
        let (crawler, _) = crawler(fetcher, CrawlerConfig::default());

        let (postings, _) = crawler.collect(&[acme()]).await;
        let first = &postings[0];
        assert_eq!(first.company, "Acme");
        assert_eq!(first.company_url, "https://acme.com");
        assert_eq!(first.ats.as_deref(), Some("Greenhouse"));
        assert_eq!(first.link, "https://acme.com/careers/backend");
        assert_eq!(first.location, "Remoto - Brasil");
        assert_eq!(first.collected_date, "2026-02-22");
    }

    #[tokio::test]
    async fn test_company_without_jobs_is_reported_not_failed() {
        let fetcher = FakeFetcher::default()
            .page("https://acme.com/careers", "<html><body>About us</body></html>")
            .page("https://globex.com/jobs", JOBS_HTML);
        let (crawler, reporter) = crawler(fetcher, CrawlerConfig::default());

        let (postings, report) = crawler.collect(&[acme(), globex()]).await;

        assert_eq!(postings.len(), 2);
        assert!(postings.iter().all(|p| p.company == "Globex"));
        assert_eq!(report.companies, 2);
        assert_eq!(report.companies_with_jobs, 1);
        assert_eq!(
            report.per_company,
            vec![("Acme".to_string(), 0), ("Globex".to_string(), 2)]
        );
        // Every Acme candidate was tried before giving up.
        assert!(report.candidates_tried >= careers_candidates("https://acme.com").len());
        assert!(reporter.events().contains(&CrawlEvent::CompanyEmpty {
            company: "Acme".to_string()
        }));
        assert!(reporter.events().contains(&CrawlEvent::CandidateEmpty {
            company: "Acme".to_string(),
            url: "https://acme.com/careers".to_string(),
        }));
    }

    #[tokio::test]
    async fn test_invalid_company_url_is_skipped() {
        let bad = CompanyRef {
            name: "Broken".to_string(),
            url: "   ".to_string(),
        };
        let fetcher = FakeFetcher::default().page("https://acme.com/careers", JOBS_HTML);
        let (crawler, reporter) = crawler(fetcher, CrawlerConfig::default());

        let (postings, report) = crawler.collect(&[bad, acme()]).await;
        assert_eq!(postings.len(), 2);
        assert_eq!(report.per_company[0], ("Broken".to_string(), 0));
        assert!(matches!(
            reporter.events()[0],
            CrawlEvent::CompanyInvalid { .. }
        ));
    }

    #[tokio::test]
    async fn test_js_fallback_is_opt_in() {
        let shell = "<html><div id=\"root\"></div></html>";
        let build = || {
            FakeFetcher::default()
                .page("https://acme.com/careers", shell)
                .rendered("https://acme.com/careers", JOBS_HTML)
        };

        let (plain, _) = crawler(build(), CrawlerConfig::default());
        let (postings, _) = plain.collect(&[acme()]).await;
        assert!(postings.is_empty());
        assert!(plain.fetcher().calls().iter().all(|(_, js)| !js));

        let config = CrawlerConfig {
            js_fallback: true,
            ..CrawlerConfig::default()
        };
        let (scripted, _) = crawler(build(), config);
        let (postings, _) = scripted.collect(&[acme()]).await;
        assert_eq!(postings.len(), 2);
        assert_eq!(
            scripted.fetcher().calls(),
            vec![
                ("https://acme.com/careers".to_string(), false),
                ("https://acme.com/careers".to_string(), true),
            ]
        );
    }

    #[tokio::test]
    async fn test_parallel_crawl_keeps_company_order() {
        let fetcher = FakeFetcher::default()
            .page("https://acme.com/careers", JOBS_HTML)
            .page("https://globex.com/careers", JOBS_HTML);
        let config = CrawlerConfig {
            concurrency: 4,
            ..CrawlerConfig::default()
        };
        let (crawler, _) = crawler(fetcher, config);

        let (postings, _) = crawler.collect(&[globex(), acme()]).await;
        let companies: Vec<_> = postings.iter().map(|p| p.company.as_str()).collect();
        assert_eq!(companies, vec!["Globex", "Globex", "Acme", "Acme"]);
    }

    #[tokio::test]
    async fn test_rerun_adds_nothing_new() {
        let fetcher = FakeFetcher::default().page("https://acme.com/careers", JOBS_HTML);
        let (crawler, _) = crawler(fetcher, CrawlerConfig::default());

        let (first, report) = crawler.run(&[acme()], &[]).await;
        assert_eq!(report.new_postings, 2);

        let (second, report) = crawler.run(&[acme()], &first).await;
        assert_eq!(report.new_postings, 0);
        assert_eq!(report.total_postings, 2);
        assert_eq!(second, first);
    }

    #[tokio::test]
    async fn test_run_and_persist_saves_merged_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("jobs.json"));
        let fetcher = FakeFetcher::default().page("https://acme.com/careers", JOBS_HTML);
        let (crawler, _) = crawler(fetcher, CrawlerConfig::default());

        let report = crawler.run_and_persist(&[acme()], Vec::new(), &store).await.unwrap();
        assert_eq!(report.new_postings, 2);
        assert_eq!(store.load().unwrap().len(), 2);

        let report = crawler.run_and_persist(&[acme()], Vec::new(), &store).await.unwrap();
        assert_eq!(report.new_postings, 0);
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_all_companies_failing_keeps_existing_store() {
        let dir = tempfile::tempdir().unwrap();
        let store = Store::open(dir.path().join("jobs.json"));
        let seeded = FakeFetcher::default().page("https://acme.com/careers", JOBS_HTML);
        let (crawler_ok, _) = crawler(seeded, CrawlerConfig::default());
        crawler_ok.run_and_persist(&[acme()], Vec::new(), &store).await.unwrap();

        let (crawler_down, _) = crawler(FakeFetcher::default(), CrawlerConfig::default());
        let report = crawler_down
            .run_and_persist(&[acme(), globex()], Vec::new(), &store)
            .await
            .unwrap();
        assert_eq!(report.new_postings, 0);
        assert_eq!(report.total_postings, 2);
        assert_eq!(report.companies_with_jobs, 0);
        assert_eq!(store.load().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_probe_reports_ats_and_postings() {
        let fetcher = FakeFetcher::default().page("https://acme.com/careers", JOBS_HTML);
        let (crawler, _) = crawler(fetcher, CrawlerConfig::default());

        let page = crawler.probe("https://acme.com/careers", false).await.unwrap();
        assert_eq!(page.ats.as_deref(), Some("Greenhouse"));
        assert_eq!(page.postings.len(), 2);
        assert!(crawler.probe("https://acme.com/nope", false).await.is_err());
    }
}
