use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Report configuration as stored by the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Report {
    pub id: i64,
    pub brand_name: String,
    #[serde(default)]
    pub competitor_names: Vec<String>,
    #[serde(default)]
    pub models: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub regions: Vec<String>,
    #[serde(default)]
    pub languages: Vec<String>,
    #[serde(default)]
    pub prompt_templates: Vec<String>,
    #[serde(default)]
    pub created_at: Option<String>,
    #[serde(default)]
    pub updated_at: Option<String>,
}

impl Report {
    pub fn created(&self) -> Option<DateTime<Utc>> {
        self.created_at.as_deref().and_then(parse_timestamp)
    }
}

/// Per-response mention flags
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResponseKpis {
    #[serde(default)]
    pub brand_mentioned: bool,
    #[serde(default)]
    pub brand_citation_with_link: bool,
    #[serde(default)]
    pub competitor_mentions: BTreeMap<String, bool>,
}

/// One LLM answer collected for a report
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LlmResponseRecord {
    pub id: i64,
    pub report_id: i64,
    pub prompt_template: String,
    pub region: String,
    pub language_code: String,
    pub keyword: String,
    pub model: String,
    #[serde(default)]
    pub prompt_text: String,
    #[serde(default)]
    pub response: String,
    #[serde(default)]
    pub kpis: ResponseKpis,
    #[serde(default)]
    pub created_at: Option<String>,
}

/// Body of `POST /api/analyze`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Validate)]
pub struct NewReport {
    #[validate(length(min = 1, message = "Brand name is required"))]
    pub brand_name: String,
    #[validate(length(min = 1, message = "Add at least one keyword"))]
    pub keywords: Vec<String>,
    pub competitor_names: Vec<String>,
    #[validate(length(min = 1, message = "Add at least one region"))]
    pub regions: Vec<String>,
    #[validate(length(min = 1, message = "Select at least one language"))]
    pub languages: Vec<String>,
    #[validate(length(min = 1, message = "Select at least one model"))]
    pub models: Vec<String>,
    #[validate(length(min = 1, message = "At least one prompt template is required"))]
    pub prompt_templates: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalyzeAccepted {
    pub report_id: i64,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponsesPage {
    #[serde(default)]
    pub responses: Vec<LlmResponseRecord>,
}

/// Identity traits exposed by the identity provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Traits {
    pub email: String,
    #[serde(rename = "firstName", default, skip_serializing_if = "Option::is_none")]
    pub first_name: Option<String>,
    #[serde(rename = "lastName", default, skip_serializing_if = "Option::is_none")]
    pub last_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub traits: Traits,
}

/// Result of `/sessions/whoami`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub identity: Identity,
}

impl Session {
    pub fn email(&self) -> &str {
        &self.identity.traits.email
    }

    /// Full name when the provider has one, otherwise the email.
    pub fn display_name(&self) -> String {
        let traits = &self.identity.traits;
        let name = [traits.first_name.as_deref(), traits.last_name.as_deref()]
            .into_iter()
            .flatten()
            .collect::<Vec<_>>()
            .join(" ");
        let name = name.trim();
        if name.is_empty() {
            traits.email.clone()
        } else {
            name.to_string()
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogoutFlow {
    pub logout_url: String,
}

/// Report row for the list page
#[derive(Debug, Clone, Serialize)]
pub struct ReportSummary {
    pub id: i64,
    pub brand_name: String,
    pub competitor_count: usize,
    pub keywords: Vec<String>,
    pub regions: Vec<String>,
    pub models: Vec<String>,
    pub created: Option<String>,
}

impl From<&Report> for ReportSummary {
    fn from(report: &Report) -> Self {
        Self {
            id: report.id,
            brand_name: report.brand_name.clone(),
            competitor_count: report.competitor_names.len(),
            keywords: report.keywords.clone(),
            regions: report.regions.clone(),
            models: report.models.iter().map(|m| display_model_name(m)).collect(),
            created: report
                .created()
                .map(|at| at.format("%d %b %Y %H:%M").to_string()),
        }
    }
}

/// Sort reports newest first; reports without a timestamp go last.
pub fn sort_newest_first(reports: &mut [Report]) {
    reports.sort_by(|a, b| b.created().cmp(&a.created()));
}

/// Short label for a model identifier such as `meta-llama/Llama-3.1-8B-Instruct`.
pub fn display_model_name(model: &str) -> String {
    if model.contains("Llama") {
        return "Llama 3.1".to_string();
    }
    if model.contains("gpt-oss-120b") {
        return "GPT OSS 120B".to_string();
    }
    if model.contains("gpt-oss-20b") {
        return "GPT OSS 20B".to_string();
    }
    match model.split('/').nth(1) {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => model.to_string(),
    }
}

/// Backend timestamps come either with an offset or as naive UTC.
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Some(at.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn report(id: i64, created_at: Option<&str>) -> Report {
        Report {
            id,
            brand_name: "Spotify".to_string(),
            competitor_names: vec![],
            models: vec![],
            keywords: vec![],
            regions: vec![],
            languages: vec![],
            prompt_templates: vec![],
            created_at: created_at.map(str::to_string),
            updated_at: None,
        }
    }

    #[test]
    fn model_names_are_shortened() {
        assert_eq!(display_model_name("meta-llama/Llama-3.1-8B-Instruct"), "Llama 3.1");
        assert_eq!(display_model_name("openai/gpt-oss-120b"), "GPT OSS 120B");
        assert_eq!(display_model_name("openai/gpt-oss-20b"), "GPT OSS 20B");
        assert_eq!(display_model_name("mistral/mistral-large"), "mistral-large");
        assert_eq!(display_model_name("phi-3"), "phi-3");
    }

    #[test]
    fn timestamps_with_and_without_offset_parse() {
        assert!(parse_timestamp("2025-01-02T10:00:00+00:00").is_some());
        assert!(parse_timestamp("2025-01-02T10:00:00.123456").is_some());
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn newest_reports_come_first() {
        let mut reports = vec![
            report(1, Some("2025-01-01T00:00:00")),
            report(2, None),
            report(3, Some("2025-03-01T00:00:00+00:00")),
        ];
        sort_newest_first(&mut reports);
        let ids: Vec<i64> = reports.iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![3, 1, 2]);
    }

    #[test]
    fn display_name_falls_back_to_email() {
        let mut session = Session {
            identity: Identity {
                id: None,
                traits: Traits {
                    email: "jane@example.com".to_string(),
                    first_name: None,
                    last_name: None,
                },
            },
        };
        assert_eq!(session.display_name(), "jane@example.com");

        session.identity.traits.first_name = Some("Jane".to_string());
        session.identity.traits.last_name = Some("Doe".to_string());
        assert_eq!(session.display_name(), "Jane Doe");
    }

    #[test]
    fn missing_analyze_fields_fail_validation() {
        let request = NewReport {
            brand_name: String::new(),
            keywords: vec![],
            competitor_names: vec![],
            regions: vec!["Global".to_string()],
            languages: vec!["default".to_string()],
            models: vec!["openai/gpt-oss-20b".to_string()],
            prompt_templates: vec!["{keyword}".to_string()],
        };
        let errors = request.validate().unwrap_err();
        let fields = errors.field_errors();
        assert!(fields.contains_key("brand_name"));
        assert!(fields.contains_key("keywords"));
        assert!(!fields.contains_key("regions"));
    }
}
