use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A company taken from the directory document, URL already normalized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompanyRef {
    pub name: String,
    pub url: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Seniority {
    Junior,
    #[serde(alias = "Mid")]
    Pleno,
    Senior,
    Lead,
}

impl Seniority {
    pub fn ordinal(self) -> i32 {
        match self {
            Seniority::Junior => 0,
            Seniority::Pleno => 1,
            Seniority::Senior => 2,
            Seniority::Lead => 3,
        }
    }
}

impl fmt::Display for Seniority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Seniority::Junior => "Junior",
            Seniority::Pleno => "Pleno",
            Seniority::Senior => "Senior",
            Seniority::Lead => "Lead",
        };
        f.write_str(label)
    }
}

impl FromStr for Seniority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "junior" | "jr" | "jr." => Ok(Seniority::Junior),
            "pleno" | "mid" | "mid-level" => Ok(Seniority::Pleno),
            "senior" | "sr" | "sr." => Ok(Seniority::Senior),
            "lead" => Ok(Seniority::Lead),
            other => Err(format!("unknown seniority '{}'", other)),
        }
    }
}

/// A normalized job posting as persisted in the store.
///
/// Field names on disk keep the store's historical Portuguese keys.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobPosting {
    pub id: String,
    #[serde(rename = "empresa")]
    pub company: String,
    #[serde(rename = "titulo")]
    pub title: String,
    #[serde(rename = "descricao")]
    pub description: String,
    #[serde(rename = "requisitos")]
    pub requirements: String,
    #[serde(rename = "skills_detectadas", default)]
    pub detected_skills: Vec<String>,
    #[serde(rename = "senioridade", default)]
    pub seniority: Option<Seniority>,
    #[serde(rename = "localizacao", default)]
    pub location: String,
    pub link: String,
    #[serde(rename = "data_coleta")]
    pub collected_date: String,
    #[serde(default)]
    pub ats: Option<String>,
    #[serde(rename = "url_empresa", default)]
    pub company_url: String,
    #[serde(rename = "salario_min", default)]
    pub salary_min: Option<f64>,
    #[serde(rename = "salario_max", default)]
    pub salary_max: Option<f64>,
}

/// Candidate profile produced outside the crawler (LLM analysis or a JSON file).
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CandidateProfile {
    #[serde(default)]
    pub area: String,
    #[serde(alias = "senioridade", default)]
    pub seniority: Option<Seniority>,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub soft_skills: Vec<String>,
    #[serde(alias = "anos_experiencia", default)]
    pub years_experience: u32,
    #[serde(default)]
    pub keywords: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Match {
    pub posting: JobPosting,
    pub score: f64,
    pub overlapping_skills: Vec<String>,
    pub rationale: String,
}
