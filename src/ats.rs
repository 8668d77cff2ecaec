/// Known applicant-tracking systems and the substrings that give them away.
/// Table order is priority order.
pub const ATS_SIGNATURES: &[(&str, &[&str])] = &[
    ("Greenhouse", &["boards.greenhouse.io", "greenhouse_config"]),
    ("Gupy", &["gupy", "gupy_config"]),
    ("Lever", &["lever.co", "lever_config"]),
    ("Workable", &["workable.com", "workable_config"]),
    ("Kenoby", &["kenoby", "kenoby_config"]),
];

/// Name of the first ATS whose signature appears in `html`.
///
/// Plain case-insensitive substring search; a page that merely links to an
/// ATS domain is reported as using it.
pub fn detect_ats(html: &str) -> Option<&'static str> {
    let lower = html.to_lowercase();
    ATS_SIGNATURES
        .iter()
        .find(|(_, signatures)| signatures.iter().any(|sig| lower.contains(sig)))
        .map(|(name, _)| *name)
}
