//! Dashboard filters and their translation into backend query strings.
//!
//! Every filter is an equality constraint on one tag of an LLM response.
//! "All" means no constraint and is left out of the query entirely.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use url::form_urlencoded;

use crate::error::{AppError, Result};
use crate::models::{LlmResponseRecord, Report};

/// Sentinel meaning "no constraint on this dimension".
pub const ALL: &str = "All";
/// `aggregate_by` value selecting the ungrouped summary.
pub const NO_AGGREGATION: &str = "none";

pub const KPI_PAGE_LIMIT: u32 = 1000;
pub const RESPONSES_PAGE_LIMIT: u32 = 100;

/// Tag dimensions of an LLM response
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dimension {
    Region,
    LanguageCode,
    Model,
    Keyword,
    PromptTemplate,
}

impl Dimension {
    pub const ALL: [Dimension; 5] = [
        Dimension::Region,
        Dimension::LanguageCode,
        Dimension::Model,
        Dimension::Keyword,
        Dimension::PromptTemplate,
    ];

    /// Query parameter name used by the backend.
    pub fn param(self) -> &'static str {
        match self {
            Dimension::Region => "region",
            Dimension::LanguageCode => "language_code",
            Dimension::Model => "model",
            Dimension::Keyword => "keyword",
            Dimension::PromptTemplate => "prompt_template",
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            Dimension::Region => "Region",
            Dimension::LanguageCode => "Language",
            Dimension::Model => "Model",
            Dimension::Keyword => "Keyword",
            Dimension::PromptTemplate => "Prompt Template",
        }
    }

    pub fn value_of(self, record: &LlmResponseRecord) -> &str {
        match self {
            Dimension::Region => &record.region,
            Dimension::LanguageCode => &record.language_code,
            Dimension::Model => &record.model,
            Dimension::Keyword => &record.keyword,
            Dimension::PromptTemplate => &record.prompt_template,
        }
    }

    /// Values configured on the report for this dimension.
    pub fn options(self, report: &Report) -> &[String] {
        match self {
            Dimension::Region => &report.regions,
            Dimension::LanguageCode => &report.languages,
            Dimension::Model => &report.models,
            Dimension::Keyword => &report.keywords,
            Dimension::PromptTemplate => &report.prompt_templates,
        }
    }
}

impl fmt::Display for Dimension {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.param())
    }
}

impl FromStr for Dimension {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "region" => Ok(Dimension::Region),
            "language_code" | "language" => Ok(Dimension::LanguageCode),
            "model" => Ok(Dimension::Model),
            "keyword" => Ok(Dimension::Keyword),
            "prompt_template" | "prompt_templates" => Ok(Dimension::PromptTemplate),
            other => Err(AppError::InvalidFilter(format!("unknown dimension `{other}`"))),
        }
    }
}

/// Which slice of responses a raw-response panel shows
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum GroupKey {
    /// Ungrouped view
    Main,
    Group(String),
}

impl GroupKey {
    pub const MAIN: &'static str = "main";

    /// Panel key as it appears in a URL. Under a grouping every key names a
    /// group, even one literally called `main`.
    pub fn parse(raw: &str, aggregate_by: Option<Dimension>) -> Self {
        match aggregate_by {
            Some(_) => GroupKey::Group(raw.to_string()),
            None => GroupKey::Main,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            GroupKey::Main => Self::MAIN,
            GroupKey::Group(key) => key,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct FilterState {
    pub region: Option<String>,
    pub language: Option<String>,
    pub model: Option<String>,
    pub keyword: Option<String>,
    pub prompt_template: Option<String>,
    pub aggregate_by: Option<Dimension>,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            region: None,
            language: None,
            model: None,
            keyword: None,
            prompt_template: None,
            aggregate_by: Some(Dimension::Keyword),
        }
    }
}

impl FilterState {
    /// No constraints and no grouping.
    pub fn ungrouped() -> Self {
        Self {
            aggregate_by: None,
            ..Self::default()
        }
    }

    fn slot(&self, dimension: Dimension) -> &Option<String> {
        match dimension {
            Dimension::Region => &self.region,
            Dimension::LanguageCode => &self.language,
            Dimension::Model => &self.model,
            Dimension::Keyword => &self.keyword,
            Dimension::PromptTemplate => &self.prompt_template,
        }
    }

    fn slot_mut(&mut self, dimension: Dimension) -> &mut Option<String> {
        match dimension {
            Dimension::Region => &mut self.region,
            Dimension::LanguageCode => &mut self.language,
            Dimension::Model => &mut self.model,
            Dimension::Keyword => &mut self.keyword,
            Dimension::PromptTemplate => &mut self.prompt_template,
        }
    }

    pub fn constraint(&self, dimension: Dimension) -> Option<&str> {
        self.slot(dimension).as_deref()
    }

    /// Set a constraint; `All` or an empty value clears it.
    pub fn set(&mut self, dimension: Dimension, value: &str) {
        let value = value.trim();
        *self.slot_mut(dimension) = if value.is_empty() || value == ALL {
            None
        } else {
            Some(value.to_string())
        };
    }

    pub fn with(mut self, dimension: Dimension, value: &str) -> Self {
        self.set(dimension, value);
        self
    }

    /// Filters used to fetch the raw responses behind one panel: the same
    /// constraints, plus the group's own value on the grouping dimension.
    pub fn for_group(&self, group: &GroupKey) -> Self {
        let mut scoped = self.clone();
        if let (GroupKey::Group(value), Some(dimension)) = (group, self.aggregate_by) {
            *scoped.slot_mut(dimension) = Some(value.clone());
        }
        scoped
    }

    /// Active equality constraints, in canonical dimension order.
    pub fn equality_params(&self) -> Vec<(&'static str, &str)> {
        Dimension::ALL
            .iter()
            .filter_map(|d| self.constraint(*d).map(|value| (d.param(), value)))
            .collect()
    }

    /// Query string for `GET /api/reports/:id/kpis`.
    pub fn kpi_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.extend_pairs(self.equality_params());
        if let Some(dimension) = self.aggregate_by {
            query.append_pair("aggregate_by", dimension.param());
        }
        query.append_pair("limit", &KPI_PAGE_LIMIT.to_string());
        query.append_pair("offset", "0");
        query.finish()
    }

    /// Query string for `GET /api/reports/:id/llm-responses`.
    pub fn responses_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.extend_pairs(self.equality_params());
        query.append_pair("limit", &RESPONSES_PAGE_LIMIT.to_string());
        query.append_pair("offset", "0");
        query.finish()
    }

    /// Query string reproducing this state on the dashboard page itself.
    pub fn page_query(&self) -> String {
        let mut query = form_urlencoded::Serializer::new(String::new());
        query.extend_pairs(self.equality_params());
        query.append_pair(
            "aggregate_by",
            self.aggregate_by.map(Dimension::param).unwrap_or(NO_AGGREGATION),
        );
        query.finish()
    }
}

/// Raw filter parameters as they arrive on a dashboard URL
#[derive(Debug, Clone, Default, FromForm)]
pub struct FilterForm {
    pub region: Option<String>,
    pub language_code: Option<String>,
    pub model: Option<String>,
    pub keyword: Option<String>,
    pub prompt_template: Option<String>,
    pub aggregate_by: Option<String>,
}

impl FilterForm {
    pub fn into_state(self) -> Result<FilterState> {
        let aggregate_by = match self.aggregate_by.as_deref().map(str::trim) {
            None | Some("") => Some(Dimension::Keyword),
            Some(NO_AGGREGATION) => None,
            Some(name) => Some(name.parse()?),
        };

        let mut state = FilterState {
            aggregate_by,
            ..FilterState::ungrouped()
        };
        let values = [
            (Dimension::Region, self.region),
            (Dimension::LanguageCode, self.language_code),
            (Dimension::Model, self.model),
            (Dimension::Keyword, self.keyword),
            (Dimension::PromptTemplate, self.prompt_template),
        ];
        for (dimension, value) in values {
            if let Some(value) = value {
                state.set(dimension, &value);
            }
        }
        Ok(state)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn all_filters_are_omitted_from_query() {
        let filters = FilterState::ungrouped()
            .with(Dimension::Region, ALL)
            .with(Dimension::Model, "openai/gpt-oss-20b");

        assert_eq!(filters.region, None);
        assert_eq!(
            filters.kpi_query(),
            "model=openai%2Fgpt-oss-20b&limit=1000&offset=0"
        );
    }

    #[test]
    fn concrete_values_appear_exactly_once() {
        let filters = FilterState::default()
            .with(Dimension::Region, "France")
            .with(Dimension::LanguageCode, "fr")
            .with(Dimension::Keyword, "music streaming");

        let query = filters.kpi_query();
        assert_eq!(
            query,
            "region=France&language_code=fr&keyword=music+streaming&aggregate_by=keyword&limit=1000&offset=0"
        );
        assert_eq!(query.matches("region=").count(), 1);
    }

    #[test]
    fn resetting_to_all_removes_the_parameter() {
        let mut filters = FilterState::ungrouped().with(Dimension::Region, "USA");
        assert!(filters.kpi_query().contains("region=USA"));

        filters.set(Dimension::Region, ALL);
        assert!(!filters.kpi_query().contains("region"));
    }

    #[test]
    fn group_fetch_adds_group_value_and_small_page() {
        let filters = FilterState {
            aggregate_by: Some(Dimension::Model),
            ..FilterState::ungrouped()
        }
        .with(Dimension::Region, "France");

        let scoped = filters.for_group(&GroupKey::Group("gpt-4".to_string()));
        assert_eq!(
            scoped.responses_query(),
            "region=France&model=gpt-4&limit=100&offset=0"
        );

        let main = filters.for_group(&GroupKey::Main);
        assert_eq!(main.responses_query(), "region=France&limit=100&offset=0");
    }

    #[test]
    fn form_defaults_to_keyword_grouping() {
        let state = FilterForm::default().into_state().unwrap();
        assert_eq!(state.aggregate_by, Some(Dimension::Keyword));

        let state = FilterForm {
            aggregate_by: Some("none".to_string()),
            region: Some("All".to_string()),
            ..FilterForm::default()
        }
        .into_state()
        .unwrap();
        assert_eq!(state, FilterState::ungrouped());
    }

    #[test]
    fn unknown_dimension_is_rejected() {
        let result = FilterForm {
            aggregate_by: Some("brand".to_string()),
            ..FilterForm::default()
        }
        .into_state();
        assert!(matches!(result, Err(AppError::InvalidFilter(_))));
    }

    #[test]
    fn page_query_keeps_explicit_no_aggregation() {
        let filters = FilterState::ungrouped().with(Dimension::Keyword, "sound");
        assert_eq!(filters.page_query(), "keyword=sound&aggregate_by=none");
    }

    #[test]
    fn group_scope_keeps_key_verbatim() {
        let filters = FilterState::default();
        for key in ["All", "", " padded "] {
            let scoped = filters.for_group(&GroupKey::Group(key.to_string()));
            assert_eq!(scoped.constraint(Dimension::Keyword), Some(key));
        }
    }

    #[test]
    fn group_keys_follow_aggregation() {
        assert_eq!(GroupKey::parse("main", None), GroupKey::Main);
        assert_eq!(GroupKey::parse("fr", Some(Dimension::Region)).as_str(), "fr");
        assert_eq!(
            GroupKey::parse("main", Some(Dimension::Keyword)),
            GroupKey::Group("main".to_string())
        );
    }
}
