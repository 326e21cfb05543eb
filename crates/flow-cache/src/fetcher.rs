//! Flow transport port and its HTTP implementation

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use tourguide_core_types::{Scope, TourData, TourId};
use tracing::debug;

use crate::errors::FetchError;

/// `loadFlows(ids, scope)`: one round trip for a whole batch.
#[async_trait]
pub trait FlowFetcher: Send + Sync {
    async fn load_flows(
        &self,
        ids: &[TourId],
        scope: &Scope,
    ) -> Result<HashMap<TourId, TourData>, FetchError>;
}

#[derive(Debug, Clone)]
pub struct HttpFetcherConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl HttpFetcherConfig {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            timeout: Duration::from_secs(10),
        }
    }
}

#[derive(Serialize)]
struct FlowRequest<'a> {
    ids: Vec<&'a str>,
    scope: &'a str,
}

/// POSTs `{"ids": [...], "scope": "..."}` and expects a JSON object keyed by
/// tour id.
#[derive(Debug, Clone)]
pub struct HttpFlowFetcher {
    config: HttpFetcherConfig,
    client: Client,
}

impl HttpFlowFetcher {
    pub fn new(config: HttpFetcherConfig) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| FetchError::Transport(err.to_string()))?;
        Ok(Self { config, client })
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }
}

#[async_trait]
impl FlowFetcher for HttpFlowFetcher {
    async fn load_flows(
        &self,
        ids: &[TourId],
        scope: &Scope,
    ) -> Result<HashMap<TourId, TourData>, FetchError> {
        let body = FlowRequest {
            ids: ids.iter().map(|id| id.0.as_str()).collect(),
            scope: &scope.0,
        };
        debug!(target: "flow-cache", endpoint = %self.config.endpoint, count = ids.len(), "fetching flows");

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|err| FetchError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(FetchError::Status {
                status: status.as_u16(),
                body,
            });
        }

        let flows: HashMap<String, TourData> = response
            .json()
            .await
            .map_err(|err| FetchError::Decode(err.to_string()))?;
        Ok(flows
            .into_iter()
            .map(|(id, data)| (TourId(id), data))
            .collect())
    }
}
