//! Report creation and contact forms.

use std::collections::BTreeMap;

use serde::Serialize;
use validator::{Validate, ValidationErrors};

use crate::models::NewReport;

pub const DEFAULT_REGION: &str = "Global";
pub const DEFAULT_LANGUAGE: &str = "default";
pub const DEFAULT_MODEL: &str = "meta-llama/Llama-3.1-8B-Instruct";
pub const DEFAULT_PROMPT_TEMPLATE: &str =
    "What do you know about {keyword}? What brands come to your mind when you think of {keyword}?";

#[derive(Debug, Clone, Copy, Serialize)]
pub struct LanguageOption {
    pub id: &'static str,
    pub label: &'static str,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct ModelOption {
    pub id: &'static str,
    pub label: &'static str,
    pub description: &'static str,
}

pub const LANGUAGES: &[LanguageOption] = &[
    LanguageOption { id: "default", label: "Default (original)" },
    LanguageOption { id: "fr", label: "French" },
    LanguageOption { id: "en", label: "English" },
    LanguageOption { id: "es", label: "Spanish" },
    LanguageOption { id: "de", label: "German" },
    LanguageOption { id: "it", label: "Italian" },
    LanguageOption { id: "pt", label: "Portuguese" },
    LanguageOption { id: "nl", label: "Dutch" },
    LanguageOption { id: "pl", label: "Polish" },
    LanguageOption { id: "ja", label: "Japanese" },
    LanguageOption { id: "zh", label: "Chinese (Mandarin)" },
    LanguageOption { id: "ar", label: "Arabic" },
];

pub const MODELS: &[ModelOption] = &[
    ModelOption { id: DEFAULT_MODEL, label: "Llama 3.1 8B", description: "Fast and efficient" },
    ModelOption { id: "openai/gpt-oss-120b", label: "GPT OSS 120B", description: "Large open-weight model" },
    ModelOption { id: "openai/gpt-oss-20b", label: "GPT OSS 20B", description: "Compact open-weight model" },
    ModelOption { id: "openai/gpt-4-turbo", label: "GPT-4 Turbo", description: "Premium and precise" },
    ModelOption { id: "anthropic/claude-3-opus", label: "Claude 3 Opus", description: "Natural writing" },
    ModelOption { id: "google/gemini-pro-1.5", label: "Gemini Pro 1.5", description: "Long context" },
    ModelOption { id: "mistral/mistral-large", label: "Mistral Large", description: "Top EU performance" },
];

/// First message per invalid field
pub type FieldErrors = BTreeMap<String, String>;

pub fn field_errors(errors: &ValidationErrors) -> FieldErrors {
    errors
        .field_errors()
        .into_iter()
        .filter_map(|(field, errs)| {
            let message = errs
                .first()?
                .message
                .as_ref()
                .map(|m| m.to_string())
                .unwrap_or_else(|| format!("Invalid {field}"));
            Some((field.to_string(), message))
        })
        .collect()
}

/// Split a comma-separated field, dropping blank entries.
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(str::to_string)
        .collect()
}

fn text(value: &Option<String>) -> String {
    value.as_deref().map(str::trim).unwrap_or_default().to_string()
}

/// Report creation form as posted by the browser
#[derive(Debug, Clone, FromForm, Serialize)]
pub struct CreateReportForm {
    pub brand_name: Option<String>,
    pub keywords: Option<String>,
    pub competitor_names: Option<String>,
    pub regions: Option<String>,
    pub languages: Vec<String>,
    pub models: Vec<String>,
}

impl Default for CreateReportForm {
    fn default() -> Self {
        Self {
            brand_name: None,
            keywords: None,
            competitor_names: None,
            regions: Some(DEFAULT_REGION.to_string()),
            languages: vec![DEFAULT_LANGUAGE.to_string()],
            models: vec![DEFAULT_MODEL.to_string()],
        }
    }
}

impl CreateReportForm {
    pub fn to_request(&self) -> NewReport {
        NewReport {
            brand_name: text(&self.brand_name),
            keywords: split_list(&text(&self.keywords)),
            competitor_names: split_list(&text(&self.competitor_names)),
            regions: split_list(&text(&self.regions)),
            languages: self.languages.clone(),
            models: self.models.clone(),
            prompt_templates: vec![DEFAULT_PROMPT_TEMPLATE.to_string()],
        }
    }

    /// The analyze request, or the inline errors to show instead of sending it.
    pub fn validated(&self) -> Result<NewReport, FieldErrors> {
        let request = self.to_request();
        request.validate().map_err(|e| field_errors(&e))?;
        Ok(request)
    }

    /// Keep the report settings but clear what identifies the last brand.
    pub fn reset_brand(&mut self) {
        self.brand_name = None;
        self.keywords = None;
        self.competitor_names = None;
    }
}

/// Contact form as posted by the browser
#[derive(Debug, Clone, Default, FromForm, Serialize)]
pub struct ContactForm {
    pub name: Option<String>,
    pub email: Option<String>,
    pub subject: Option<String>,
    pub message: Option<String>,
}

#[derive(Debug, Clone, Serialize, Validate)]
pub struct ContactMessage {
    #[validate(length(min = 1, message = "Name is required"))]
    pub name: String,
    #[validate(email(message = "Enter a valid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Subject is required"))]
    pub subject: String,
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,
}

impl ContactForm {
    pub fn validated(&self) -> Result<ContactMessage, FieldErrors> {
        let message = ContactMessage {
            name: text(&self.name),
            email: text(&self.email),
            subject: text(&self.subject),
            message: text(&self.message),
        };
        message.validate().map_err(|e| field_errors(&e))?;
        Ok(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_are_trimmed_and_blanks_dropped() {
        assert_eq!(
            split_list(" streaming music, ,sound ,"),
            vec!["streaming music".to_string(), "sound".to_string()]
        );
        assert!(split_list("   ").is_empty());
    }

    #[test]
    fn valid_form_builds_analyze_request() {
        let form = CreateReportForm {
            brand_name: Some("  Spotify ".to_string()),
            keywords: Some("music, sound".to_string()),
            competitor_names: Some("Deezer".to_string()),
            ..CreateReportForm::default()
        };

        let request = form.validated().unwrap();
        assert_eq!(request.brand_name, "Spotify");
        assert_eq!(request.keywords, vec!["music", "sound"]);
        assert_eq!(request.regions, vec!["Global"]);
        assert_eq!(request.languages, vec!["default"]);
        assert_eq!(request.models, vec![DEFAULT_MODEL]);
        assert_eq!(request.prompt_templates, vec![DEFAULT_PROMPT_TEMPLATE]);
    }

    #[test]
    fn blank_brand_and_regions_are_reported_inline() {
        let form = CreateReportForm {
            brand_name: Some("   ".to_string()),
            keywords: Some(" , ".to_string()),
            regions: Some("".to_string()),
            languages: vec![],
            ..CreateReportForm::default()
        };

        let errors = form.validated().unwrap_err();
        assert_eq!(errors["brand_name"], "Brand name is required");
        assert_eq!(errors["keywords"], "Add at least one keyword");
        assert_eq!(errors["regions"], "Add at least one region");
        assert_eq!(errors["languages"], "Select at least one language");
        assert!(!errors.contains_key("models"));
    }

    #[test]
    fn reset_keeps_targeting() {
        let mut form = CreateReportForm {
            brand_name: Some("Spotify".to_string()),
            keywords: Some("music".to_string()),
            regions: Some("France".to_string()),
            ..CreateReportForm::default()
        };
        form.reset_brand();
        assert!(form.brand_name.is_none());
        assert_eq!(form.regions.as_deref(), Some("France"));
    }

    #[test]
    fn contact_requires_every_field_and_a_real_email() {
        let form = ContactForm {
            name: Some("Jane".to_string()),
            email: Some("not-an-email".to_string()),
            subject: Some(" ".to_string()),
            message: Some("Hello".to_string()),
        };
        let errors = form.validated().unwrap_err();
        assert_eq!(errors.len(), 2);
        assert_eq!(errors["email"], "Enter a valid email address");
        assert_eq!(errors["subject"], "Subject is required");

        let form = ContactForm {
            email: Some("jane@example.com".to_string()),
            subject: Some("Pricing".to_string()),
            ..form
        };
        assert_eq!(form.validated().unwrap().email, "jane@example.com");
    }
}
