use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use serde_json::Value;

use crate::executors::common::{LocationExecutor, LocationRequest, LocationResponse};
use crate::{ExecutionError, GraphQLError};

/// Test double for a location: answers by substring match on the incoming
/// document and records every call.
pub struct ScriptedLocation {
    label: String,
    rules: Vec<(String, LocationResponse)>,
    calls: Arc<Mutex<Vec<String>>>,
    order_log: Option<Arc<Mutex<Vec<String>>>>,
}

impl ScriptedLocation {
    pub fn new(label: &str) -> Self {
        ScriptedLocation {
            label: label.to_string(),
            rules: Vec::new(),
            calls: Arc::new(Mutex::new(Vec::new())),
            order_log: None,
        }
    }

    pub fn respond(mut self, needle: &str, response: LocationResponse) -> Self {
        self.rules.push((needle.to_string(), response));
        self
    }

    pub fn with_order_log(mut self, order_log: Arc<Mutex<Vec<String>>>) -> Self {
        self.order_log = Some(order_log);
        self
    }

    /// Handle onto the recorded documents; keep a clone before moving the
    /// fixture into an executor map.
    pub fn calls(&self) -> Arc<Mutex<Vec<String>>> {
        self.calls.clone()
    }
}

#[async_trait]
impl LocationExecutor for ScriptedLocation {
    async fn execute(
        &self,
        request: LocationRequest<'_>,
    ) -> Result<LocationResponse, ExecutionError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push(request.query.clone());
        if let Some(order_log) = &self.order_log {
            order_log
                .lock()
                .expect("order lock")
                .push(self.label.clone());
        }
        for (needle, response) in &self.rules {
            if request.query.contains(needle.as_str()) {
                return Ok(response.clone());
            }
        }
        Err(ExecutionError::Internal(format!(
            "location '{}' received an unexpected document: {}",
            self.label, request.query
        )))
    }
}

/// Always fails at the transport level.
pub struct BrokenLocation;

#[async_trait]
impl LocationExecutor for BrokenLocation {
    async fn execute(
        &self,
        request: LocationRequest<'_>,
    ) -> Result<LocationResponse, ExecutionError> {
        Err(ExecutionError::Transport {
            location: request.location.to_string(),
            message: "connection refused".to_string(),
        })
    }
}

pub fn data_response(data: Value) -> LocationResponse {
    LocationResponse {
        data: Some(data),
        errors: None,
    }
}

pub fn response_with_errors(data: Value, errors: Vec<GraphQLError>) -> LocationResponse {
    LocationResponse {
        data: Some(data),
        errors: Some(errors),
    }
}
