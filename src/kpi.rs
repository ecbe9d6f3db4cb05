//! KPI summaries and the three percentage metrics derived from them.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::filters::Dimension;
use crate::models::LlmResponseRecord;

/// Group key (value of the aggregation dimension) to its summary.
pub type AggregatedKpis = BTreeMap<String, KpiSummary>;

/// Mention counts over a set of LLM responses
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiSummary {
    #[serde(default)]
    pub total_responses: u64,
    #[serde(default)]
    pub brand_mentioned: u64,
    #[serde(default)]
    pub brand_citation_with_link: u64,
    #[serde(default)]
    pub competitor_mentions: BTreeMap<String, u64>,
}

/// Integer percentages shown on a KPI card
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct KpiMetrics {
    pub visibility: u32,
    pub share_of_voice: u32,
    pub citation_rate: u32,
}

/// `part / whole * 100`, rounded half away from zero; 0 when `whole` is 0.
pub fn percentage(part: u64, whole: u64) -> u32 {
    if whole == 0 {
        return 0;
    }
    (part as f64 / whole as f64 * 100.0).round() as u32
}

impl KpiSummary {
    pub fn metrics(&self) -> KpiMetrics {
        let voice = self.brand_mentioned + self.competitor_total();
        KpiMetrics {
            visibility: percentage(self.brand_mentioned, self.total_responses),
            share_of_voice: percentage(self.brand_mentioned, voice),
            citation_rate: percentage(self.brand_citation_with_link, self.brand_mentioned),
        }
    }

    pub fn competitor_total(&self) -> u64 {
        self.competitor_mentions.values().sum()
    }

    /// Add another summary's counts into this one.
    pub fn absorb(&mut self, other: &KpiSummary) {
        self.total_responses += other.total_responses;
        self.brand_mentioned += other.brand_mentioned;
        self.brand_citation_with_link += other.brand_citation_with_link;
        for (name, count) in &other.competitor_mentions {
            *self.competitor_mentions.entry(name.clone()).or_default() += count;
        }
    }

    /// Sum of several summaries, competitor keys unioned.
    pub fn combine<'a, I>(summaries: I) -> KpiSummary
    where
        I: IntoIterator<Item = &'a KpiSummary>,
    {
        summaries.into_iter().fold(KpiSummary::default(), |mut acc, s| {
            acc.absorb(s);
            acc
        })
    }

    /// Count one raw response.
    pub fn record(&mut self, response: &LlmResponseRecord) {
        let kpis = &response.kpis;
        self.total_responses += 1;
        self.brand_mentioned += u64::from(kpis.brand_mentioned);
        self.brand_citation_with_link += u64::from(kpis.brand_citation_with_link);
        for (name, mentioned) in &kpis.competitor_mentions {
            *self.competitor_mentions.entry(name.clone()).or_default() += u64::from(*mentioned);
        }
    }

    pub fn from_records<'a, I>(records: I) -> KpiSummary
    where
        I: IntoIterator<Item = &'a LlmResponseRecord>,
    {
        let mut summary = KpiSummary::default();
        for record in records {
            summary.record(record);
        }
        summary
    }

    /// A citation with a link implies a mention.
    pub fn citations_consistent(&self) -> bool {
        self.brand_citation_with_link <= self.brand_mentioned
    }
}

/// Summaries of raw responses grouped on one dimension.
pub fn group_records<'a, I>(records: I, dimension: Dimension) -> AggregatedKpis
where
    I: IntoIterator<Item = &'a LlmResponseRecord>,
{
    let mut groups = AggregatedKpis::new();
    for record in records {
        groups
            .entry(dimension.value_of(record).to_string())
            .or_default()
            .record(record);
    }
    groups
}

/// KPI payload as returned by the backend for one filter state
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KpiView {
    Overall {
        summary: KpiSummary,
    },
    Grouped {
        dimension: Dimension,
        groups: AggregatedKpis,
    },
}

impl KpiView {
    /// Single summary across everything in the view.
    pub fn overall(&self) -> KpiSummary {
        match self {
            KpiView::Overall { summary } => summary.clone(),
            KpiView::Grouped { groups, .. } => KpiSummary::combine(groups.values()),
        }
    }

    pub fn dimension(&self) -> Option<Dimension> {
        match self {
            KpiView::Overall { .. } => None,
            KpiView::Grouped { dimension, .. } => Some(*dimension),
        }
    }
}
