use chrono::NaiveDate;
use scraper::{ElementRef, Html, Selector};
use url::Url;
use uuid::Uuid;

use crate::models::JobPosting;
use crate::vocabulary::Vocabulary;

/// One page shape: where postings live and where their title/description sit.
#[derive(Debug, Clone, Copy)]
pub struct Heuristic {
    pub container: &'static str,
    pub title: &'static str,
    pub description: &'static str,
}

/// Tried in order; the first container selector with any match is the only
/// one used for a page. New site shapes go at the end.
pub const HEURISTICS: &[Heuristic] = &[
    Heuristic { container: "div.job", title: "h2, h3", description: "p" },
    Heuristic { container: "article.job-posting", title: "h2", description: "p" },
    Heuristic { container: "div[data-job-id]", title: "h2", description: "p" },
    Heuristic { container: "li.job-listing", title: "h3", description: "span" },
    // Greenhouse hosted board
    Heuristic { container: "div.opening", title: "a", description: "span.location" },
    // Lever hosted board
    Heuristic { container: "div.posting", title: "h5", description: "div.posting-categories" },
    // Workable embedded widget
    Heuristic { container: "li[data-ui=\"job\"]", title: "h3", description: "span" },
];

/// Where the HTML came from and when.
#[derive(Debug, Clone)]
pub struct PageSource<'a> {
    pub company: &'a str,
    pub company_url: &'a str,
    pub source_url: &'a str,
    pub collected: NaiveDate,
    pub location: &'a str,
}

pub struct Extractor<'a> {
    heuristics: &'a [Heuristic],
    vocabulary: &'a Vocabulary,
}

impl<'a> Extractor<'a> {
    pub fn new(vocabulary: &'a Vocabulary) -> Self {
        Self::with_heuristics(HEURISTICS, vocabulary)
    }

    pub fn with_heuristics(heuristics: &'a [Heuristic], vocabulary: &'a Vocabulary) -> Self {
        Self { heuristics, vocabulary }
    }

    /// Pull postings out of `html`. An empty result means no heuristic
    /// matched and the caller should try its next candidate page.
    pub fn extract(&self, html: &str, page: &PageSource<'_>) -> Vec<JobPosting> {
        let document = Html::parse_document(html);

        for heuristic in self.heuristics {
            let Ok(container_sel) = Selector::parse(heuristic.container) else {
                continue;
            };
            let containers: Vec<ElementRef> = document.select(&container_sel).collect();
            if containers.is_empty() {
                continue;
            }

            let (Ok(title_sel), Ok(desc_sel)) = (
                Selector::parse(heuristic.title),
                Selector::parse(heuristic.description),
            ) else {
                continue;
            };

            return containers
                .into_iter()
                .filter_map(|container| self.posting_from(container, &title_sel, &desc_sel, page))
                .collect();
        }

        Vec::new()
    }

    fn posting_from(
        &self,
        container: ElementRef<'_>,
        title_sel: &Selector,
        desc_sel: &Selector,
        page: &PageSource<'_>,
    ) -> Option<JobPosting> {
        let title = container.select(title_sel).next().map(element_text)?;
        if title.is_empty() {
            return None;
        }
        let description = container
            .select(desc_sel)
            .next()
            .map(element_text)
            .unwrap_or_default();

        let link = posting_link(container, page.source_url)
            .unwrap_or_else(|| format!("{}#{}", page.source_url, slugify(&title)));

        Some(JobPosting {
            id: Uuid::new_v4().to_string(),
            company: page.company.to_string(),
            title,
            detected_skills: self.vocabulary.detect_skills(&description),
            seniority: self.vocabulary.detect_seniority(&description),
            requirements: description.clone(),
            description,
            location: page.location.to_string(),
            link,
            collected_date: page.collected.format("%Y-%m-%d").to_string(),
            ats: None,
            company_url: page.company_url.to_string(),
            salary_min: None,
            salary_max: None,
        })
    }
}

fn element_text(element: ElementRef<'_>) -> String {
    clean_text(&element.text().collect::<Vec<_>>().join(" "))
}

pub fn clean_text(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// First usable anchor inside the container, resolved against the page URL.
fn posting_link(container: ElementRef<'_>, source_url: &str) -> Option<String> {
    let anchor_sel = Selector::parse("a[href]").ok()?;
    let base = Url::parse(source_url).ok()?;

    let anchors = std::iter::once(container)
        .filter(|el| el.value().name() == "a")
        .chain(container.select(&anchor_sel));

    for anchor in anchors {
        let Some(href) = anchor.value().attr("href").map(str::trim) else {
            continue;
        };
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("javascript:")
        {
            continue;
        }
        if let Ok(resolved) = base.join(href) {
            return clean_tracking_url(resolved.as_str());
        }
    }
    None
}

const TRACKING_PARAMS: &[&str] = &["ref", "source", "gclid", "fbclid"];

fn is_tracking_param(key: &str) -> bool {
    let key = key.to_ascii_lowercase();
    key.starts_with("utm_") || key.starts_with("utf_") || TRACKING_PARAMS.contains(&key.as_str())
}

/// Drop the fragment and known tracking parameters. Other query parameters
/// stay: boards like `/careers?gh_jid=42` identify the posting by them.
pub fn clean_tracking_url(url: &str) -> Option<String> {
    let mut parsed = Url::parse(url).ok()?;
    parsed.set_fragment(None);

    if parsed.query().is_some() {
        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(key, _)| !is_tracking_param(key))
            .map(|(key, value)| (key.into_owned(), value.into_owned()))
            .collect();
        if kept.is_empty() {
            parsed.set_query(None);
        } else {
            let query = url::form_urlencoded::Serializer::new(String::new())
                .extend_pairs(kept)
                .finish();
            parsed.set_query(Some(&query));
        }
    }
    Some(parsed.to_string())
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    for c in title.to_lowercase().chars() {
        if c.is_alphanumeric() {
            slug.push(c);
        } else if !slug.ends_with('-') {
            slug.push('-');
        }
    }
    slug.trim_matches('-').to_string()
}
