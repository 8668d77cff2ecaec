use serde::{Deserialize, Serialize};

use crate::models::Seniority;

/// Keyword tables used to tag postings with skills and a seniority level.
///
/// Both tables come from configuration so other locales can be added
/// without touching extraction code.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Vocabulary {
    pub skills: Vec<String>,
    /// Checked in order; the first level with any keyword present wins.
    pub seniority: Vec<SeniorityKeywords>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SeniorityKeywords {
    pub level: Seniority,
    pub keywords: Vec<String>,
}

const DEFAULT_SKILLS: &[&str] = &[
    "Python", "JavaScript", "TypeScript", "Java", "C#", "PHP",
    "Django", "FastAPI", "Flask", "Node.js", "React", "Vue",
    "AWS", "Docker", "Kubernetes", "PostgreSQL", "MongoDB",
    "Git", "REST API", "GraphQL", "SQL", "Linux",
    "Go", "Rust", "Ruby", "Rails", "Laravel",
];

impl Default for Vocabulary {
    fn default() -> Self {
        let words = |ws: &[&str]| ws.iter().map(|w| w.to_string()).collect::<Vec<_>>();
        Self {
            skills: words(DEFAULT_SKILLS),
            seniority: vec![
                SeniorityKeywords {
                    level: Seniority::Senior,
                    keywords: words(&["senior", "sênior", "staff", "lead", "principal", "sr."]),
                },
                SeniorityKeywords {
                    level: Seniority::Pleno,
                    keywords: words(&["mid-level", "pleno", "mid", "intermediate"]),
                },
                SeniorityKeywords {
                    level: Seniority::Junior,
                    keywords: words(&["junior", "júnior", "entry", "trainee", "jr.", "estagiário"]),
                },
            ],
        }
    }
}

impl Vocabulary {
    /// Skills whose name occurs in `text`, case-insensitively, in vocabulary order.
    pub fn detect_skills(&self, text: &str) -> Vec<String> {
        let lower = text.to_lowercase();
        let mut found: Vec<String> = Vec::new();
        for skill in &self.skills {
            if lower.contains(&skill.to_lowercase())
                && !found.iter().any(|f| f.eq_ignore_ascii_case(skill))
            {
                found.push(skill.clone());
            }
        }
        found
    }

    pub fn detect_seniority(&self, text: &str) -> Option<Seniority> {
        let lower = text.to_lowercase();
        self.seniority
            .iter()
            .find(|entry| entry.keywords.iter().any(|k| lower.contains(&k.to_lowercase())))
            .map(|entry| entry.level)
    }
}
