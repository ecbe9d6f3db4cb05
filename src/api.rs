use async_trait::async_trait;
use reqwest::{header, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::auth::Credentials;
use crate::error::{AppError, Result};
use crate::filters::{Dimension, FilterState};
use crate::kpi::{AggregatedKpis, KpiSummary, KpiView};
use crate::models::{AnalyzeAccepted, LlmResponseRecord, NewReport, Report, ResponsesPage};

const SERVICE: &str = "report API";

/// Backend REST contract for reports, KPIs and raw responses
#[async_trait]
pub trait ReportApi: Send + Sync {
    async fn list_reports(&self, creds: &Credentials) -> Result<Vec<Report>>;
    async fn report(&self, creds: &Credentials, report_id: i64) -> Result<Report>;
    async fn kpis(&self, creds: &Credentials, report_id: i64, filters: &FilterState) -> Result<KpiView>;
    async fn llm_responses(
        &self,
        creds: &Credentials,
        report_id: i64,
        filters: &FilterState,
    ) -> Result<Vec<LlmResponseRecord>>;
    async fn delete_report(&self, creds: &Credentials, report_id: i64) -> Result<()>;
    /// Starts report generation and returns the new report id.
    async fn analyze(&self, creds: &Credentials, request: &NewReport) -> Result<i64>;
}

#[derive(Debug, Default, Deserialize)]
struct KpiMetadata {
    #[serde(default)]
    aggregated_by: Option<String>,
}

#[derive(Debug, Deserialize)]
struct KpiEnvelope {
    #[serde(default)]
    metadata: KpiMetadata,
    kpis: serde_json::Value,
}

impl KpiEnvelope {
    fn into_view(self) -> Result<KpiView> {
        match self.metadata.aggregated_by.as_deref() {
            None | Some("") | Some("none") => Ok(KpiView::Overall {
                summary: serde_json::from_value::<KpiSummary>(self.kpis)?,
            }),
            Some(name) => {
                let dimension: Dimension = name
                    .parse()
                    .map_err(|_| AppError::Unexpected(format!("aggregated_by `{name}`")))?;
                Ok(KpiView::Grouped {
                    dimension,
                    groups: serde_json::from_value::<AggregatedKpis>(self.kpis)?,
                })
            }
        }
    }
}

/// Read the whole body, then decode it. A body that arrives but does not
/// parse is a `Decode` error, not a transport one.
pub(crate) async fn decode_json<T: DeserializeOwned>(response: Response, service: &'static str) -> Result<T> {
    let bytes = response.bytes().await.map_err(AppError::transport(service))?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// `ReportApi` over HTTP
pub struct HttpReportApi {
    client: reqwest::Client,
    base_url: String,
}

impl HttpReportApi {
    pub fn new(base_url: &str) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn with_credentials(builder: RequestBuilder, creds: &Credentials) -> RequestBuilder {
        match creds.cookie() {
            Some(cookie) => builder.header(header::COOKIE, cookie),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder, creds: &Credentials) -> Result<Response> {
        let response = Self::with_credentials(builder, creds)
            .send()
            .await
            .map_err(AppError::transport(SERVICE))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), body = %body, "Report API error");
            return Err(AppError::Backend {
                service: SERVICE,
                status: status.as_u16(),
                body,
            });
        }
        Ok(response)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str, creds: &Credentials) -> Result<T> {
        debug!(path, "GET report API");
        let response = self.send(self.client.get(self.url(path)), creds).await?;
        decode_json(response, SERVICE).await
    }
}

#[async_trait]
impl ReportApi for HttpReportApi {
    async fn list_reports(&self, creds: &Credentials) -> Result<Vec<Report>> {
        self.get_json("/api/reports", creds).await
    }

    async fn report(&self, creds: &Credentials, report_id: i64) -> Result<Report> {
        self.get_json(&format!("/api/reports/{report_id}"), creds).await
    }

    async fn kpis(&self, creds: &Credentials, report_id: i64, filters: &FilterState) -> Result<KpiView> {
        let path = format!("/api/reports/{report_id}/kpis?{}", filters.kpi_query());
        let envelope: KpiEnvelope = self.get_json(&path, creds).await?;
        envelope.into_view()
    }

    async fn llm_responses(
        &self,
        creds: &Credentials,
        report_id: i64,
        filters: &FilterState,
    ) -> Result<Vec<LlmResponseRecord>> {
        let path = format!(
            "/api/reports/{report_id}/llm-responses?{}",
            filters.responses_query()
        );
        let page: ResponsesPage = self.get_json(&path, creds).await?;
        Ok(page.responses)
    }

    async fn delete_report(&self, creds: &Credentials, report_id: i64) -> Result<()> {
        let url = self.url(&format!("/api/reports/{report_id}"));
        self.send(self.client.delete(url), creds).await?;
        Ok(())
    }

    async fn analyze(&self, creds: &Credentials, request: &NewReport) -> Result<i64> {
        let builder = self.client.post(self.url("/api/analyze")).json(request);
        let response = self.send(builder, creds).await?;
        let accepted: AnalyzeAccepted = decode_json(response, SERVICE).await?;
        Ok(accepted.report_id)
    }
}
