use url::Url;

use crate::error::UrlError;

/// Canonicalize a company root URL to `scheme://host[:port]/path`.
///
/// A missing scheme defaults to `https`, query and fragment are dropped and
/// trailing slashes are stripped. Normalizing an already normalized URL is a
/// no-op.
pub fn normalize_url(raw: &str) -> Result<String, UrlError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(UrlError::Invalid(raw.to_string()));
    }

    let with_scheme = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    };

    let parsed = Url::parse(&with_scheme).map_err(|_| UrlError::Invalid(raw.to_string()))?;
    let host = parsed
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| UrlError::Invalid(raw.to_string()))?;

    let mut out = format!("{}://{}", parsed.scheme(), host);
    if let Some(port) = parsed.port() {
        out.push_str(&format!(":{}", port));
    }
    out.push_str(parsed.path().trim_end_matches('/'));
    Ok(out)
}

/// Host part of an already normalized URL.
pub fn host_of(url: &str) -> Option<String> {
    Url::parse(url)
        .ok()
        .and_then(|u| u.host_str().map(|h| h.to_string()))
}
