//! Report dashboard state: the KPI view for the current filters and the
//! lazily fetched raw responses behind each card.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::api::ReportApi;
use crate::auth::Credentials;
use crate::error::Result;
use crate::filters::{Dimension, FilterState, GroupKey};
use crate::kpi::{KpiMetrics, KpiSummary, KpiView};
use crate::models::{LlmResponseRecord, Report};

/// One KPI card: a summary and its derived metrics
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct KpiCard {
    pub key: String,
    pub summary: KpiSummary,
    pub metrics: KpiMetrics,
}

impl KpiCard {
    fn new(key: &str, summary: KpiSummary) -> Self {
        let metrics = summary.metrics();
        Self {
            key: key.to_string(),
            summary,
            metrics,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PieSlice {
    pub label: String,
    pub value: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompetitorRow {
    pub name: String,
    pub mentions: u64,
}

/// Everything the dashboard renders for one filter state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DashboardView {
    pub report_id: i64,
    pub brand_name: String,
    pub aggregated_by: Option<Dimension>,
    pub overall: KpiCard,
    pub groups: Vec<KpiCard>,
    pub pie: Vec<PieSlice>,
    pub competitors: Vec<CompetitorRow>,
}

impl DashboardView {
    pub fn build(report: &Report, view: &KpiView) -> Self {
        let overall = view.overall();

        let groups: Vec<KpiCard> = match view {
            KpiView::Overall { .. } => Vec::new(),
            KpiView::Grouped { groups, .. } => groups
                .iter()
                .map(|(key, summary)| KpiCard::new(key, summary.clone()))
                .collect(),
        };

        let checked = groups
            .iter()
            .map(|card| (card.key.as_str(), &card.summary))
            .chain(std::iter::once((GroupKey::MAIN, &overall)));
        for (key, summary) in checked {
            if !summary.citations_consistent() {
                warn!(
                    report_id = report.id,
                    group = key,
                    mentioned = summary.brand_mentioned,
                    cited = summary.brand_citation_with_link,
                    "Backend reported more citations than mentions"
                );
            }
        }

        let mut pie = vec![PieSlice {
            label: report.brand_name.clone(),
            value: overall.brand_mentioned,
        }];
        pie.extend(overall.competitor_mentions.iter().map(|(name, count)| PieSlice {
            label: name.clone(),
            value: *count,
        }));

        let competitors = report
            .competitor_names
            .iter()
            .map(|name| CompetitorRow {
                name: name.clone(),
                mentions: overall.competitor_mentions.get(name).copied().unwrap_or(0),
            })
            .collect();

        Self {
            report_id: report.id,
            brand_name: report.brand_name.clone(),
            aggregated_by: view.dimension(),
            overall: KpiCard::new(GroupKey::MAIN, overall),
            groups,
            pie,
            competitors,
        }
    }
}

/// Latest KPI result, guarded by a request id so a slow, superseded
/// response cannot overwrite a newer one.
#[derive(Debug, Default)]
pub struct KpiSlot {
    issued: AtomicU64,
    latest: Mutex<Option<(FilterState, KpiView)>>,
}

impl KpiSlot {
    /// Reserve an id for a new fetch.
    pub fn begin(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Store the result of fetch `id`; returns false if a newer fetch was issued meanwhile.
    pub fn fulfil(&self, id: u64, filters: FilterState, view: KpiView) -> bool {
        let mut latest = self.latest.lock().unwrap_or_else(PoisonError::into_inner);
        if self.issued.load(Ordering::SeqCst) != id {
            debug!(request_id = id, "Discarding stale KPI response");
            return false;
        }
        *latest = Some((filters, view));
        true
    }

    pub fn current(&self) -> Option<(FilterState, KpiView)> {
        self.latest
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

/// A loaded report and the KPIs for its most recently requested filters
pub struct ReportDashboard {
    report: Report,
    kpis: KpiSlot,
}

impl ReportDashboard {
    /// Load the report metadata; KPI fetches are only possible afterwards.
    pub async fn open(api: &dyn ReportApi, creds: &Credentials, report_id: i64) -> Result<Self> {
        let report = api.report(creds, report_id).await?;
        info!(report_id, brand = %report.brand_name, "Loaded report");
        Ok(Self {
            report,
            kpis: KpiSlot::default(),
        })
    }

    pub fn report(&self) -> &Report {
        &self.report
    }

    /// Fetch KPIs for `filters`. Returns whether the result was kept.
    pub async fn apply_filters(
        &self,
        api: &dyn ReportApi,
        creds: &Credentials,
        filters: &FilterState,
    ) -> Result<bool> {
        let id = self.kpis.begin();
        debug!(report_id = self.report.id, request_id = id, query = %filters.kpi_query(), "Fetching KPIs");
        let view = api.kpis(creds, self.report.id, filters).await?;
        Ok(self.kpis.fulfil(id, filters.clone(), view))
    }

    pub fn filters(&self) -> Option<FilterState> {
        self.kpis.current().map(|(filters, _)| filters)
    }

    pub fn view(&self) -> Option<DashboardView> {
        self.kpis
            .current()
            .map(|(_, view)| DashboardView::build(&self.report, &view))
    }
}

/// Default number of response panels kept in memory
pub const RESPONSE_CACHE_CAPACITY: usize = 256;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    report_id: i64,
    query: String,
    group: GroupKey,
}

#[derive(Debug, Default)]
struct CacheEntries {
    records: HashMap<CacheKey, Arc<Vec<LlmResponseRecord>>>,
    access_order: VecDeque<CacheKey>,
}

impl CacheEntries {
    fn touch(&mut self, key: &CacheKey) {
        self.access_order.retain(|k| k != key);
        self.access_order.push_back(key.clone());
    }
}

/// Raw responses already fetched, keyed by the exact backend query behind
/// each panel. Least recently used panels are evicted past `max_size`.
///
/// Entries are shared between visitors: callers must check that the visitor
/// may read the report before asking for a panel.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<CacheEntries>,
    max_size: usize,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(RESPONSE_CACHE_CAPACITY)
    }
}

impl ResponseCache {
    pub fn new(max_size: usize) -> Self {
        Self {
            entries: Mutex::new(CacheEntries::default()),
            max_size: max_size.max(1),
        }
    }

    fn key(report_id: i64, filters: &FilterState, group: &GroupKey) -> CacheKey {
        CacheKey {
            report_id,
            query: filters.for_group(group).responses_query(),
            group: group.clone(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, CacheEntries> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn cached(
        &self,
        report_id: i64,
        filters: &FilterState,
        group: &GroupKey,
    ) -> Option<Arc<Vec<LlmResponseRecord>>> {
        let key = Self::key(report_id, filters, group);
        let mut entries = self.lock();
        let hit = entries.records.get(&key).cloned()?;
        entries.touch(&key);
        Some(hit)
    }

    fn insert(&self, key: CacheKey, records: Arc<Vec<LlmResponseRecord>>) {
        let mut entries = self.lock();
        if entries.records.insert(key.clone(), records).is_some() {
            entries.touch(&key);
            return;
        }
        while entries.records.len() > self.max_size {
            let Some(oldest) = entries.access_order.pop_front() else {
                break;
            };
            entries.records.remove(&oldest);
            debug!(report_id = oldest.report_id, group = oldest.group.as_str(), "Evicted cached responses");
        }
        entries.access_order.push_back(key);
    }

    /// Responses for one panel, fetched at most once per key.
    pub async fn load(
        &self,
        api: &dyn ReportApi,
        creds: &Credentials,
        report_id: i64,
        filters: &FilterState,
        group: &GroupKey,
    ) -> Result<Arc<Vec<LlmResponseRecord>>> {
        if let Some(hit) = self.cached(report_id, filters, group) {
            debug!(report_id, group = group.as_str(), "Responses served from cache");
            return Ok(hit);
        }

        let scoped = filters.for_group(group);
        let records = Arc::new(api.llm_responses(creds, report_id, &scoped).await?);
        info!(report_id, group = group.as_str(), count = records.len(), "Fetched responses");

        self.insert(Self::key(report_id, filters, group), Arc::clone(&records));
        Ok(records)
    }
}
