use crate::normalize::host_of;

/// Path suffixes probed on the company's own host, in probe order.
pub const CAREER_PATHS: &[&str] = &[
    "/careers",
    "/carreiras",
    "/vagas",
    "/jobs",
    "/trabalhe-conosco",
    "/joinus",
];

/// Subdomains probed after the path suffixes.
pub const CAREER_SUBDOMAINS: &[&str] = &["careers", "jobs"];

/// Candidate careers-page URLs for a normalized company URL.
///
/// Pure generation: nothing here checks that a URL resolves. The order is
/// fixed so a retried run probes the same URLs in the same sequence.
pub fn careers_candidates(company_url: &str) -> Vec<String> {
    let Some(host) = host_of(company_url) else {
        return Vec::new();
    };
    let scheme = company_url.split("://").next().unwrap_or("https");
    let port_suffix = company_url
        .split("://")
        .nth(1)
        .and_then(|rest| rest.split('/').next())
        .and_then(|authority| authority.rsplit_once(':').map(|(_, port)| format!(":{}", port)))
        .unwrap_or_default();
    let base = format!("{}://{}{}", scheme, host, port_suffix);

    let mut candidates: Vec<String> = CAREER_PATHS
        .iter()
        .map(|path| format!("{}{}", base, path))
        .collect();

    let bare_host = host.strip_prefix("www.").unwrap_or(&host);
    for sub in CAREER_SUBDOMAINS {
        candidates.push(format!("https://{}.{}", sub, bare_host));
    }

    // Sites mounted under a path (e.g. a regional prefix) also get the
    // most common suffixes relative to that path.
    if company_url.trim_end_matches('/') != base {
        for path in &CAREER_PATHS[..3] {
            candidates.push(format!("{}{}", company_url.trim_end_matches('/'), path));
        }
    }

    let mut seen = std::collections::HashSet::new();
    candidates.retain(|c| seen.insert(c.clone()));
    candidates
}
