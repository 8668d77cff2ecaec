use std::cmp::Ordering;
use std::collections::HashSet;

use crate::config::ScoringConfig;
use crate::models::{CandidateProfile, JobPosting, Match, Seniority};

/// Score used for a component when one side carries no data.
const NEUTRAL: f64 = 0.5;

/// Weighted compatibility of one posting with a profile.
pub fn score(profile: &CandidateProfile, posting: &JobPosting, weights: &ScoringConfig) -> Match {
    let skills = skill_overlap(&profile.skills, &posting.detected_skills);
    let posting_lower: HashSet<String> = posting
        .detected_skills
        .iter()
        .map(|s| s.to_lowercase())
        .collect();
    let overlapping_skills: Vec<String> = profile
        .skills
        .iter()
        .filter(|s| posting_lower.contains(&s.to_lowercase()))
        .cloned()
        .collect();

    let seniority = posting
        .seniority
        .map(|level| seniority_score(profile_level(profile), level))
        .unwrap_or(NEUTRAL);
    let semantic = semantic_similarity(&profile.keywords, &posting.description);

    let total = weights.skills_weight * skills
        + weights.seniority_weight * seniority
        + weights.semantic_weight * semantic;

    let mut reasons = Vec::new();
    if !overlapping_skills.is_empty() {
        let shown: Vec<&str> = overlapping_skills.iter().take(3).map(String::as_str).collect();
        reasons.push(format!(
            "Match de {} skills: {}",
            overlapping_skills.len(),
            shown.join(", ")
        ));
    }
    if seniority > 0.7 {
        let posting_level = posting
            .seniority
            .map(|s| s.to_string())
            .unwrap_or_else(|| "?".to_string());
        reasons.push(format!(
            "Senioridade compativel ({} -> {})",
            profile_level(profile),
            posting_level
        ));
    }
    if semantic > 0.5 {
        reasons.push("Descricao alinhada com seu perfil".to_string());
    }
    let rationale = if reasons.is_empty() {
        "Perfil parcialmente alinhado".to_string()
    } else {
        reasons.join("; ")
    };

    Match {
        posting: posting.clone(),
        score: total.clamp(0.0, 1.0),
        overlapping_skills,
        rationale,
    }
}

/// Score every posting, keep those at or above `min_score`, best first.
/// Ties keep store order.
pub fn rank(profile: &CandidateProfile, postings: &[JobPosting], weights: &ScoringConfig) -> Vec<Match> {
    let mut matches: Vec<Match> = postings
        .iter()
        .map(|p| score(profile, p, weights))
        .filter(|m| m.score >= weights.min_score)
        .collect();
    matches.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    matches
}

/// Share of the posting's skills the profile has. Neutral when the posting
/// lists none.
pub fn skill_overlap(profile_skills: &[String], posting_skills: &[String]) -> f64 {
    let wanted: HashSet<String> = posting_skills.iter().map(|s| s.to_lowercase()).collect();
    if wanted.is_empty() {
        return NEUTRAL;
    }
    let have: HashSet<String> = profile_skills.iter().map(|s| s.to_lowercase()).collect();
    let common = wanted.intersection(&have).count();
    (common as f64 / wanted.len() as f64).min(1.0)
}

pub fn seniority_score(profile: Seniority, posting: Seniority) -> f64 {
    match (profile.ordinal() - posting.ordinal()).abs() {
        0 => 1.0,
        1 => 0.8,
        2 => 0.5,
        _ => 0.2,
    }
}

/// Fraction of profile keywords found in the description.
pub fn semantic_similarity(keywords: &[String], description: &str) -> f64 {
    if keywords.is_empty() || description.trim().is_empty() {
        return NEUTRAL;
    }
    let text = description.to_lowercase();
    let hits = keywords
        .iter()
        .filter(|kw| text.contains(&kw.to_lowercase()))
        .count();
    (hits as f64 / keywords.len() as f64).min(1.0)
}

// Profiles without a level are treated as mid-level.
fn profile_level(profile: &CandidateProfile) -> Seniority {
    profile.seniority.unwrap_or(Seniority::Pleno)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    fn posting(skills: &[&str], seniority: Option<Seniority>, description: &str) -> JobPosting {
        JobPosting {
            id: "1".to_string(),
            company: "Acme".to_string(),
            title: "Backend Developer".to_string(),
            description: description.to_string(),
            requirements: description.to_string(),
            detected_skills: strings(skills),
            seniority,
            location: "Remoto - Brasil".to_string(),
            link: "https://acme.com/jobs/1".to_string(),
            collected_date: "2026-02-22".to_string(),
            ats: None,
            company_url: "https://acme.com".to_string(),
            salary_min: None,
            salary_max: None,
        }
    }

    fn profile(skills: &[&str], seniority: Option<Seniority>, keywords: &[&str]) -> CandidateProfile {
        CandidateProfile {
            area: "Backend".to_string(),
            seniority,
            skills: strings(skills),
            keywords: strings(keywords),
            ..CandidateProfile::default()
        }
    }

    #[test]
    fn test_python_pleno_scenario() {
        let job = posting(
            &["Python", "Django", "AWS", "Docker"],
            Some(Seniority::Pleno),
            "Backend Python com Django em AWS",
        );
        let me = profile(
            &["Python", "Django", "AWS", "PostgreSQL"],
            Some(Seniority::Pleno),
            &["backend", "microservices"],
        );

        assert_eq!(skill_overlap(&me.skills, &job.detected_skills), 0.75);
        assert_eq!(seniority_score(Seniority::Pleno, Seniority::Pleno), 1.0);

        let m = score(&me, &job, &ScoringConfig::default());
        assert!(m.score >= 0.675);
        assert_eq!(m.overlapping_skills, vec!["Python", "Django", "AWS"]);
        assert!(m.rationale.starts_with("Match de 3 skills: Python, Django, AWS"));
        assert!(m.rationale.contains("Senioridade compativel (Pleno -> Pleno)"));
    }

    #[test]
    fn test_score_stays_within_bounds() {
        let levels = [
            None,
            Some(Seniority::Junior),
            Some(Seniority::Pleno),
            Some(Seniority::Senior),
            Some(Seniority::Lead),
        ];
        let skill_sets: [&[&str]; 3] = [&[], &["Rust"], &["Python", "AWS"]];
        for job_level in levels {
            for my_level in levels {
                for job_skills in skill_sets {
                    for my_skills in skill_sets {
                        let m = score(
                            &profile(my_skills, my_level, &["aws"]),
                            &posting(job_skills, job_level, "AWS heavy role"),
                            &ScoringConfig::default(),
                        );
                        assert!((0.0..=1.0).contains(&m.score), "score {} out of range", m.score);
                    }
                }
            }
        }
    }

    #[test]
    fn test_seniority_is_best_on_equal_level() {
        let all = [Seniority::Junior, Seniority::Pleno, Seniority::Senior, Seniority::Lead];
        for x in all {
            assert_eq!(seniority_score(x, x), 1.0);
            for y in all.iter().copied().filter(|y| *y != x) {
                assert!(seniority_score(x, y) < 1.0);
            }
        }
        assert_eq!(seniority_score(Seniority::Junior, Seniority::Senior), 0.5);
        assert_eq!(seniority_score(Seniority::Junior, Seniority::Lead), 0.2);
    }

    #[test]
    fn test_neutral_components_without_data() {
        assert_eq!(skill_overlap(&strings(&["Rust"]), &[]), 0.5);
        assert_eq!(semantic_similarity(&[], "anything"), 0.5);
        assert_eq!(semantic_similarity(&strings(&["rust"]), "  "), 0.5);

        let m = score(&profile(&[], None, &[]), &posting(&[], None, ""), &ScoringConfig::default());
        assert!((m.score - 0.5).abs() < 1e-9);
        assert_eq!(m.rationale, "Perfil parcialmente alinhado");
    }

    #[test]
    fn test_skill_overlap_is_case_insensitive() {
        let overlap = skill_overlap(&strings(&["python", "aws"]), &strings(&["Python", "AWS"]));
        assert_eq!(overlap, 1.0);
    }

    #[test]
    fn test_semantic_counts_keyword_substrings() {
        let keywords = strings(&["api", "Kafka", "terraform", "grpc"]);
        assert_eq!(semantic_similarity(&keywords, "REST APIs over Kafka"), 0.5);
    }

    #[test]
    fn test_rank_sorts_and_filters() {
        let me = profile(&["Python", "AWS"], Some(Seniority::Senior), &[]);
        let strong = posting(&["Python", "AWS"], Some(Seniority::Senior), "Python AWS");
        let weak = posting(&["Java", "Spring", "Oracle"], Some(Seniority::Junior), "Java");
        let mid = posting(&["Python", "Java"], Some(Seniority::Pleno), "Python Java");

        let ranked = rank(&me, &[weak, mid.clone(), strong.clone()], &ScoringConfig::default());
        let scores: Vec<f64> = ranked.iter().map(|m| m.score).collect();
        assert!(scores.windows(2).all(|w| w[0] >= w[1]));
        assert!(ranked.iter().all(|m| m.score >= 0.5));
        assert_eq!(ranked[0].posting.description, strong.description);
        assert_eq!(ranked.len(), 2);
        assert_eq!(ranked[1].posting.description, mid.description);
    }
}
