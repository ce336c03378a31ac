//! HTTP client for the remote stowage backend.
//!
//! Every computation (placement, search, waste rules, return plans) happens on
//! the backend. This client only shapes requests and decodes responses; it never
//! retries. A failed call is reported once and the user resubmits.

use reqwest::{RequestBuilder, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};
use utoipa::ToSchema;

use crate::config::BackendConfig;
use crate::model::{
    BatchPlacementRequest, ContainerDetails, ContainerSummary, LogEntry, LogQuery, OperationAck,
    PlacementPayload, PlacementRequest, PlacementResponse, RetrieveRequest, ReturnPlan,
    ReturnPlanRequest, StoredItem, WasteReport,
};

/// Message the backend sends once an item has no uses left (spelling is the backend's).
pub const EXHAUSTED_MESSAGE: &str = "Item Fully Retirieved or not found";

/// Longest backend error body kept for diagnostics.
const MAX_ERROR_BODY: usize = 512;

#[derive(Debug, Error)]
pub enum BackendError {
    #[error("Backend base URL is unusable: {0}")]
    Configuration(String),
    #[error("Backend unreachable: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("Backend answered {status}: {body}")]
    Status { status: u16, body: String },
    #[error("Backend has no record of {0}")]
    NotFound(String),
    #[error("Backend response could not be decoded: {0}")]
    Decode(String),
}

impl BackendError {
    /// Short status line shown to the user.
    pub fn status_line(&self) -> &'static str {
        match self {
            BackendError::Configuration(_) => "Backend is not configured correctly",
            BackendError::Transport(err) if err.is_timeout() => "Backend timed out",
            BackendError::Transport(_) => "Backend unreachable",
            BackendError::Status { .. } => "Backend rejected the request",
            BackendError::NotFound(_) => "Not found",
            BackendError::Decode(_) => "Backend sent an unexpected response",
        }
    }
}

/// Result of a retrieval: either the item as it left storage, or the
/// backend's notice that nothing is left to retrieve.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RetrieveOutcome {
    Retrieved { item: StoredItem },
    Exhausted { message: String },
}

#[derive(Deserialize)]
struct ContainerList {
    #[serde(default)]
    containers: Vec<ContainerSummary>,
}

#[derive(Deserialize)]
struct ContainerEnvelope {
    container: ContainerDetails,
}

#[derive(Deserialize)]
struct ItemEnvelope {
    item: Option<StoredItem>,
}

#[derive(Clone, Debug)]
pub struct BackendClient {
    http: reqwest::Client,
    base: Url,
}

impl BackendClient {
    pub fn new(config: &BackendConfig) -> Result<Self, BackendError> {
        let base = Url::parse(config.base_url())
            .map_err(|err| BackendError::Configuration(err.to_string()))?;
        if base.cannot_be_a_base() {
            return Err(BackendError::Configuration(config.base_url().to_string()));
        }

        let http = reqwest::Client::builder()
            .timeout(config.timeout())
            .user_agent(user_agent())
            .build()?;

        Ok(Self { http, base })
    }

    /// Joins path segments onto the base URL, percent-encoding each one.
    fn endpoint(&self, segments: &[&str]) -> Result<Url, BackendError> {
        let mut url = self.base.clone();
        url.path_segments_mut()
            .map_err(|_| BackendError::Configuration(self.base.to_string()))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends a write or query call. A 404 here means the backend route is
    /// missing, so it is reported like any other rejected request.
    async fn fetch<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        subject: &str,
    ) -> Result<T, BackendError> {
        self.send(request, subject, false).await
    }

    /// Sends a lookup by identifier. A 404 here means the record is unknown.
    async fn lookup<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        subject: &str,
    ) -> Result<T, BackendError> {
        self.send(request, subject, true).await
    }

    async fn send<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        subject: &str,
        missing_is_unknown: bool,
    ) -> Result<T, BackendError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;
        debug!(status = status.as_u16(), subject, "backend replied");

        if status == StatusCode::NOT_FOUND && missing_is_unknown {
            return Err(BackendError::NotFound(subject.to_string()));
        }
        if !status.is_success() {
            warn!(status = status.as_u16(), subject, "⚠️ Backend rejected request");
            return Err(BackendError::Status {
                status: status.as_u16(),
                body: truncate(&body),
            });
        }

        serde_json::from_str(&body).map_err(|err| BackendError::Decode(err.to_string()))
    }

    /// POST /placement: asks the engine to place the staged items.
    pub async fn submit_placement(
        &self,
        payload: &PlacementPayload,
    ) -> Result<PlacementResponse, BackendError> {
        let url = self.endpoint(&["placement"])?;
        self.fetch(self.http.post(url).json(payload), "placement").await
    }

    /// GET /containers
    pub async fn list_containers(&self) -> Result<Vec<ContainerSummary>, BackendError> {
        let url = self.endpoint(&["containers"])?;
        let list: ContainerList = self.fetch(self.http.get(url), "containers").await?;
        Ok(list.containers)
    }

    /// GET /containers/{id}
    pub async fn container_details(
        &self,
        container_id: &str,
    ) -> Result<ContainerDetails, BackendError> {
        let url = self.endpoint(&["containers", container_id])?;
        let subject = format!("container {container_id}");
        let envelope: ContainerEnvelope = self.lookup(self.http.get(url), &subject).await?;
        Ok(envelope.container)
    }

    /// POST /place: single placement with coordinates chosen by hand.
    pub async fn place_item(
        &self,
        request: &PlacementRequest,
    ) -> Result<OperationAck, BackendError> {
        let url = self.endpoint(&["place"])?;
        self.fetch(self.http.post(url).json(request), "place").await
    }

    /// POST /batch-place
    pub async fn batch_place(
        &self,
        items: Vec<PlacementRequest>,
    ) -> Result<OperationAck, BackendError> {
        let url = self.endpoint(&["batch-place"])?;
        let body = BatchPlacementRequest { items };
        self.fetch(self.http.post(url).json(&body), "batch placement").await
    }

    /// GET /items/{id}
    pub async fn search_item(&self, item_id: &str) -> Result<StoredItem, BackendError> {
        let url = self.endpoint(&["items", item_id])?;
        let subject = format!("item {item_id}");
        let envelope: ItemEnvelope = self.lookup(self.http.get(url), &subject).await?;
        envelope.item.ok_or(BackendError::NotFound(subject))
    }

    /// POST /retrieve
    pub async fn retrieve_item(&self, item_id: &str) -> Result<RetrieveOutcome, BackendError> {
        let url = self.endpoint(&["retrieve"])?;
        let body = RetrieveRequest {
            item_id: item_id.to_string(),
        };
        let subject = format!("item {item_id}");
        let value: serde_json::Value =
            self.fetch(self.http.post(url).json(&body), &subject).await?;
        retrieve_outcome(value)
    }

    /// GET /waste/identify
    pub async fn identify_waste(&self) -> Result<WasteReport, BackendError> {
        let url = self.endpoint(&["waste", "identify"])?;
        self.fetch(self.http.get(url), "waste report").await
    }

    /// POST /waste/return-plan
    pub async fn return_plan(
        &self,
        request: &ReturnPlanRequest,
    ) -> Result<ReturnPlan, BackendError> {
        let url = self.endpoint(&["waste", "return-plan"])?;
        let subject = format!("container {}", request.undocking_container_id);
        self.fetch(self.http.post(url).json(request), &subject).await
    }

    /// GET /logs
    pub async fn logs(&self, query: &LogQuery) -> Result<Vec<LogEntry>, BackendError> {
        let url = self.endpoint(&["logs"])?;
        self.fetch(self.http.get(url).query(query), "logs").await
    }
}

fn retrieve_outcome(value: serde_json::Value) -> Result<RetrieveOutcome, BackendError> {
    let message = value.get("message").and_then(|m| m.as_str());
    let used = value.get("used").and_then(|u| u.as_bool()).unwrap_or(false);
    if used || message == Some(EXHAUSTED_MESSAGE) {
        return Ok(RetrieveOutcome::Exhausted {
            message: EXHAUSTED_MESSAGE.to_string(),
        });
    }

    // Some backend versions wrap the item, others return it bare.
    let item_value = match value.get("item") {
        Some(item) => item.clone(),
        None => value,
    };
    let item: StoredItem =
        serde_json::from_value(item_value).map_err(|err| BackendError::Decode(err.to_string()))?;
    Ok(RetrieveOutcome::Retrieved { item })
}

fn truncate(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}

fn user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("stowage-console/{version}")
}
