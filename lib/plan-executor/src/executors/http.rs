use std::sync::Arc;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use serde::Serialize;
use tracing::{instrument, trace};

use crate::executors::common::{LocationExecutor, LocationRequest, LocationResponse};
use crate::ExecutionError;

pub struct HttpLocationExecutor {
    endpoint: String,
    http_client: Arc<reqwest::Client>,
}

#[derive(Serialize)]
struct HttpRequestBody<'a> {
    query: &'a str,
    #[serde(skip_serializing_if = "serde_json::Map::is_empty")]
    variables: &'a serde_json::Map<String, serde_json::Value>,
}

impl HttpLocationExecutor {
    pub fn new(endpoint: &str, http_client: Arc<reqwest::Client>) -> Self {
        HttpLocationExecutor {
            endpoint: endpoint.to_string(),
            http_client,
        }
    }
}

#[async_trait]
impl LocationExecutor for HttpLocationExecutor {
    #[instrument(level = "trace", skip_all, name = "http_location_execute", fields(endpoint = %self.endpoint))]
    async fn execute(
        &self,
        request: LocationRequest<'_>,
    ) -> Result<LocationResponse, ExecutionError> {
        let body = HttpRequestBody {
            query: &request.query,
            variables: &request.variables,
        };
        let response = self
            .http_client
            .post(&self.endpoint)
            .header(CONTENT_TYPE, "application/json")
            .json(&body)
            .send()
            .await
            .map_err(|e| ExecutionError::Transport {
                location: request.location.to_string(),
                message: e.to_string(),
            })?;

        let bytes = response
            .bytes()
            .await
            .map_err(|e| ExecutionError::Transport {
                location: request.location.to_string(),
                message: e.to_string(),
            })?;
        trace!(bytes = bytes.len(), "location responded");

        serde_json::from_slice::<LocationResponse>(&bytes).map_err(|e| ExecutionError::Decode {
            location: request.location.to_string(),
            message: e.to_string(),
        })
    }
}
