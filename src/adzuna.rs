use chrono::NaiveDate;
use serde::Deserialize;
use tracing::{debug, info};
use url::Url;
use uuid::Uuid;

use crate::config::AdzunaConfig;
use crate::error::{FetchError, SourceError};
use crate::fetch::StaticFetcher;
use crate::models::JobPosting;
use crate::remoteok::{DESCRIPTION_LIMIT, truncate_chars};
use crate::vocabulary::Vocabulary;

pub const ADZUNA_API_BASE: &str = "https://api.adzuna.com/v1/api/jobs";
/// The API refuses larger pages.
const MAX_PAGE_SIZE: usize = 50;

#[derive(Debug, Default, Deserialize)]
pub struct AdzunaResponse {
    #[serde(default)]
    pub results: Vec<AdzunaJob>,
}

#[derive(Debug, Default, Deserialize)]
pub struct AdzunaJob {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub redirect_url: String,
    #[serde(default)]
    pub company: Option<DisplayName>,
    #[serde(default)]
    pub location: Option<DisplayName>,
    #[serde(default)]
    pub salary_min: Option<f64>,
    #[serde(default)]
    pub salary_max: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct DisplayName {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

/// Search Adzuna for any of `keywords` (the configured skills when empty).
/// Missing credentials fail this source only.
pub async fn fetch_adzuna(
    fetcher: &StaticFetcher,
    config: &AdzunaConfig,
    vocabulary: &Vocabulary,
    keywords: &[String],
    collected: NaiveDate,
) -> Result<Vec<JobPosting>, SourceError> {
    let (app_id, app_key) = config.credentials()?;
    let keywords = if keywords.is_empty() { &config.skills[..] } else { keywords };
    let url = search_url(config, keywords, &app_id, &app_key)?;

    debug!("Querying Adzuna for: {}", keywords.join(", "));
    let response: AdzunaResponse = fetcher.fetch_json(url.as_str()).await?;
    info!("Adzuna returned {} results", response.results.len());
    Ok(parse_results(response, vocabulary, collected))
}

/// First results page for `keywords` joined with OR.
pub fn search_url(
    config: &AdzunaConfig,
    keywords: &[String],
    app_id: &str,
    app_key: &str,
) -> Result<Url, FetchError> {
    let base = format!("{}/{}/search/1", ADZUNA_API_BASE, config.country);
    let page_size = config.max_results.clamp(1, MAX_PAGE_SIZE).to_string();
    Url::parse_with_params(
        &base,
        &[
            ("app_id", app_id),
            ("app_key", app_key),
            ("results_per_page", page_size.as_str()),
            ("what_or", keywords.join(" ").as_str()),
            ("where", config.location.as_str()),
            ("full_time", "1"),
        ],
    )
    .map_err(|e| FetchError::Connect {
        url: base.clone(),
        reason: e.to_string(),
    })
}

/// Map results to postings. Results without a redirect link cannot be
/// de-duplicated and are dropped.
pub fn parse_results(
    response: AdzunaResponse,
    vocabulary: &Vocabulary,
    collected: NaiveDate,
) -> Vec<JobPosting> {
    response
        .results
        .into_iter()
        .filter(|job| {
            let usable = !job.redirect_url.trim().is_empty() && !job.title.trim().is_empty();
            if !usable {
                debug!("Skipping Adzuna result without title or link");
            }
            usable
        })
        .map(|job| to_posting(job, vocabulary, collected))
        .collect()
}

fn to_posting(job: AdzunaJob, vocabulary: &Vocabulary, collected: NaiveDate) -> JobPosting {
    let full_text = format!("{} {}", job.title, job.description);
    let (company, company_url) = match job.company {
        Some(DisplayName { display_name, url }) => (display_name, url),
        None => (None, None),
    };
    let location = job.location.and_then(|l| l.display_name);

    JobPosting {
        id: Uuid::new_v4().to_string(),
        company: company
            .filter(|c| !c.trim().is_empty())
            .unwrap_or_else(|| "Unknown".to_string()),
        detected_skills: vocabulary.detect_skills(&full_text),
        seniority: vocabulary.detect_seniority(&full_text),
        title: job.title,
        description: truncate_chars(&job.description, DESCRIPTION_LIMIT),
        requirements: job.description,
        location: location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| "Remote".to_string()),
        link: job.redirect_url,
        collected_date: collected.format("%Y-%m-%d").to_string(),
        ats: Some("Adzuna".to_string()),
        company_url: company_url.unwrap_or_default(),
        salary_min: job.salary_min,
        salary_max: job.salary_max,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Seniority;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 2, 22).unwrap()
    }

    const PAYLOAD: &str = r#"{
        "count": 3,
        "results": [
            {
                "title": "Senior Data Engineer",
                "description": "Pipelines com Python, SQL e Docker.",
                "redirect_url": "https://www.adzuna.com.br/land/ad/101",
                "company": {"display_name": "Acme Dados"},
                "location": {"display_name": "São Paulo, SP", "area": ["Brasil", "SP"]},
                "salary_min": 12000,
                "salary_max": 15000.5
            },
            {
                "title": "Backend Developer",
                "description": "Go e PostgreSQL",
                "redirect_url": "https://www.adzuna.com.br/land/ad/102"
            },
            {
                "title": "No link here",
                "description": "Python"
            }
        ]
    }"#;

    #[test]
    fn test_parse_results_maps_fields() {
        let response: AdzunaResponse = serde_json::from_str(PAYLOAD).unwrap();
        let postings = parse_results(response, &Vocabulary::default(), today());
        assert_eq!(postings.len(), 2);

        let first = &postings[0];
        assert_eq!(first.company, "Acme Dados");
        assert_eq!(first.location, "São Paulo, SP");
        assert_eq!(first.link, "https://www.adzuna.com.br/land/ad/101");
        assert_eq!(first.ats.as_deref(), Some("Adzuna"));
        assert_eq!(first.seniority, Some(Seniority::Senior));
        assert_eq!(first.salary_min, Some(12000.0));
        assert_eq!(first.salary_max, Some(15000.5));
        assert!(first.detected_skills.contains(&"Python".to_string()));
        assert!(first.detected_skills.contains(&"Docker".to_string()));

        let second = &postings[1];
        assert_eq!(second.company, "Unknown");
        assert_eq!(second.location, "Remote");
        assert_eq!(second.salary_min, None);
    }

    #[test]
    fn test_description_is_truncated() {
        let response = AdzunaResponse {
            results: vec![AdzunaJob {
                title: "Backend".to_string(),
                description: "ç".repeat(700),
                redirect_url: "https://www.adzuna.com.br/land/ad/1".to_string(),
                ..AdzunaJob::default()
            }],
        };
        let postings = parse_results(response, &Vocabulary::default(), today());
        assert_eq!(postings[0].description.chars().count(), 500);
        assert_eq!(postings[0].requirements.chars().count(), 700);
    }

    #[test]
    fn test_search_url_caps_page_size_and_joins_keywords() {
        let config = AdzunaConfig::default();
        let keywords = vec!["Python".to_string(), "SQL".to_string()];
        let url = search_url(&config, &keywords, "id", "key").unwrap();

        assert_eq!(url.path(), "/v1/api/jobs/br/search/1");
        let pairs: Vec<(String, String)> = url.query_pairs().into_owned().collect();
        assert!(pairs.contains(&("results_per_page".to_string(), "50".to_string())));
        assert!(pairs.contains(&("what_or".to_string(), "Python SQL".to_string())));
        assert!(pairs.contains(&("where".to_string(), "Brazil".to_string())));
        assert!(pairs.contains(&("app_id".to_string(), "id".to_string())));
    }

    #[tokio::test]
    async fn test_missing_credentials_fail_before_any_request() {
        let config = AdzunaConfig {
            app_id: Some(String::new()),
            app_key: Some("key".to_string()),
            ..AdzunaConfig::default()
        };
        unsafe { std::env::remove_var("ADZUNA_APP_ID") };
        let fetcher = StaticFetcher::new(&crate::config::CrawlerConfig::default()).unwrap();
        let result = fetch_adzuna(&fetcher, &config, &Vocabulary::default(), &[], today()).await;
        assert!(matches!(
            result,
            Err(SourceError::Config(crate::error::ConfigError::Missing("ADZUNA_APP_ID")))
        ));
    }
}
