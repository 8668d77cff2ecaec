use chrono::NaiveDate;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::FetchError;
use crate::fetch::StaticFetcher;
use crate::models::JobPosting;
use crate::vocabulary::Vocabulary;

pub const REMOTEOK_API_URL: &str = "https://remoteok.io/api";
pub const DEFAULT_KEYWORDS: &[&str] = &["Python", "Data Engineer", "Backend"];
pub(crate) const DESCRIPTION_LIMIT: usize = 500;

#[derive(Debug, Deserialize)]
struct RemoteOkItem {
    #[serde(alias = "title")]
    position: String,
    #[serde(default)]
    company: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    location: Option<String>,
    url: String,
    #[serde(default)]
    company_url: Option<String>,
    #[serde(default)]
    salary_min: Option<f64>,
    #[serde(default)]
    salary_max: Option<f64>,
}

/// Query the public RemoteOK feed and keep items matching any keyword.
pub async fn fetch_remoteok(
    fetcher: &StaticFetcher,
    vocabulary: &Vocabulary,
    keywords: &[String],
    max_results: usize,
    collected: NaiveDate,
) -> Result<Vec<JobPosting>, FetchError> {
    let feed: Vec<Value> = fetcher.fetch_json(REMOTEOK_API_URL).await?;
    info!("RemoteOK returned {} entries", feed.len());
    let postings = parse_feed(feed, vocabulary, keywords, max_results, collected);
    info!("{} RemoteOK postings match the keywords", postings.len());
    Ok(postings)
}

/// Map feed entries to postings. The first entry of the feed is a legal
/// notice, and anything else that does not look like a job is skipped too.
pub fn parse_feed(
    feed: Vec<Value>,
    vocabulary: &Vocabulary,
    keywords: &[String],
    max_results: usize,
    collected: NaiveDate,
) -> Vec<JobPosting> {
    let keywords: Vec<String> = if keywords.is_empty() {
        DEFAULT_KEYWORDS.iter().map(|k| k.to_lowercase()).collect()
    } else {
        keywords.iter().map(|k| k.to_lowercase()).collect()
    };

    feed.into_iter()
        .filter(|entry| entry.get("legal").is_none())
        .filter_map(|entry| match serde_json::from_value::<RemoteOkItem>(entry) {
            Ok(item) => Some(item),
            Err(e) => {
                debug!("Skipping RemoteOK entry: {}", e);
                None
            }
        })
        .filter(|item| matches_keywords(item, &keywords))
        .map(|item| to_posting(item, vocabulary, collected))
        .take(max_results)
        .collect()
}

fn matches_keywords(item: &RemoteOkItem, keywords: &[String]) -> bool {
    let title = item.position.to_lowercase();
    let tags = item.tags.join(" ").to_lowercase();
    let description = item.description.as_deref().unwrap_or("").to_lowercase();
    keywords
        .iter()
        .any(|kw| title.contains(kw) || tags.contains(kw) || description.contains(kw))
}

fn to_posting(item: RemoteOkItem, vocabulary: &Vocabulary, collected: NaiveDate) -> JobPosting {
    let description = item.description.unwrap_or_default();
    let full_text = format!("{} {} {}", item.position, description, item.tags.join(" "));

    let company = match item.company.filter(|c| !c.trim().is_empty()) {
        Some(company) => company,
        None => item
            .position
            .rsplit_once(" at ")
            .map(|(_, company)| company.trim().to_string())
            .unwrap_or_else(|| "Unknown".to_string()),
    };

    JobPosting {
        id: Uuid::new_v4().to_string(),
        company,
        detected_skills: vocabulary.detect_skills(&full_text),
        seniority: vocabulary.detect_seniority(&full_text),
        title: item.position,
        description: truncate_chars(&description, DESCRIPTION_LIMIT),
        requirements: description,
        location: item
            .location
            .filter(|l| !l.trim().is_empty())
            .unwrap_or_else(|| "Remote".to_string()),
        link: item.url,
        collected_date: collected.format("%Y-%m-%d").to_string(),
        ats: Some("RemoteOK".to_string()),
        company_url: item.company_url.unwrap_or_default(),
        // The feed reports 0 for unknown salaries.
        salary_min: item.salary_min.filter(|s| *s > 0.0),
        salary_max: item.salary_max.filter(|s| *s > 0.0),
    }
}

pub(crate) fn truncate_chars(s: &str, max: usize) -> String {
    match s.char_indices().nth(max) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}
