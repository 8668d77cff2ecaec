use anyhow::{Context, Result, anyhow};
use regex::Regex;
use std::collections::HashSet;
use std::fs;
use std::path::Path;
use tracing::{info, warn};

use crate::fetch::StaticFetcher;
use crate::models::CompanyRef;
use crate::normalize::{host_of, normalize_url};

/// Companies listed in a markdown-like directory.
///
/// `[Name](URL)` links come first, then bare `http(s)://` URLs whose name is
/// derived from the host. URLs are normalized and de-duplicated; entries
/// with an unusable URL are skipped.
pub fn parse_companies(text: &str) -> Result<Vec<CompanyRef>> {
    let mut companies = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();

    let link_re = Regex::new(r"\[([^\]]+)\]\(([^)\s]+)\)")?;
    for cap in link_re.captures_iter(text) {
        let name = cap[1].trim();
        let Ok(url) = normalize_url(&cap[2]) else {
            continue;
        };
        if name.is_empty() || !seen.insert(url.clone()) {
            continue;
        }
        companies.push(CompanyRef {
            name: name.to_string(),
            url,
        });
    }

    // Bare URLs in list items, e.g. "- Site: https://example.com"
    let bare_re = Regex::new(r"(?m)(?:^|\s)(https?://[^\s\)\]]+)")?;
    for cap in bare_re.captures_iter(text) {
        let Ok(url) = normalize_url(&cap[1]) else {
            continue;
        };
        if seen.contains(&url) {
            continue;
        }
        let Some(name) = name_from_host(&url) else {
            continue;
        };
        seen.insert(url.clone());
        companies.push(CompanyRef { name, url });
    }

    Ok(companies)
}

fn name_from_host(url: &str) -> Option<String> {
    let host = host_of(url)?;
    let label = host.strip_prefix("www.").unwrap_or(&host).split('.').next()?;
    let mut chars = label.chars();
    let first = chars.next()?;
    Some(first.to_uppercase().chain(chars).collect())
}

/// Read the company directory from a file path or URL.
///
/// A remote directory is cached after every successful fetch; when the fetch
/// fails the cache is used instead.
pub async fn load_companies(
    source: &str,
    fetcher: &StaticFetcher,
    cache_path: &Path,
) -> Result<Vec<CompanyRef>> {
    if !source.starts_with("http://") && !source.starts_with("https://") {
        let text = fs::read_to_string(source)
            .with_context(|| format!("Failed to read company directory: {}", source))?;
        return parse_companies(&text);
    }

    match fetcher.fetch(source).await {
        Ok(text) => {
            let companies = parse_companies(&text)?;
            if let Err(e) = write_cache(cache_path, &companies) {
                warn!("Could not write company cache {}: {}", cache_path.display(), e);
            }
            Ok(companies)
        }
        Err(e) if cache_path.exists() => {
            warn!("Company directory fetch failed ({}); using cache", e);
            let text = fs::read_to_string(cache_path)
                .with_context(|| format!("Failed to read {}", cache_path.display()))?;
            let companies: Vec<CompanyRef> = serde_json::from_str(&text)
                .with_context(|| format!("Company cache {} is unreadable", cache_path.display()))?;
            info!("Loaded {} companies from cache", companies.len());
            Ok(companies)
        }
        Err(e) => Err(anyhow!("Failed to fetch company directory: {}", e)),
    }
}

fn write_cache(path: &Path, companies: &[CompanyRef]) -> Result<()> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(path, serde_json::to_string_pretty(companies)?)?;
    Ok(())
}
