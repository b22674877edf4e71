use std::collections::HashMap;
use std::sync::Arc;

use tracing::instrument;

use crate::executors::common::{
    LocationExecutor, LocationExecutorBoxedArc, LocationRequest, LocationResponse,
};
use crate::executors::http::HttpLocationExecutor;
use crate::ExecutionError;

/// Registry of location executors, keyed by location name.
#[derive(Default)]
pub struct LocationExecutorMap {
    inner: HashMap<String, LocationExecutorBoxedArc>,
}

impl LocationExecutorMap {
    pub fn new() -> Self {
        LocationExecutorMap {
            inner: HashMap::new(),
        }
    }

    pub fn insert_boxed_arc(&mut self, location: String, executor: LocationExecutorBoxedArc) {
        self.inner.insert(location, executor);
    }

    #[instrument(level = "trace", name = "location_execute", skip_all, fields(location = %request.location))]
    pub async fn execute(
        &self,
        request: LocationRequest<'_>,
    ) -> Result<LocationResponse, ExecutionError> {
        match self.inner.get(request.location) {
            Some(executor) => executor.execute(request).await,
            None => Err(ExecutionError::UnknownLocation(
                request.location.to_string(),
            )),
        }
    }

    /// Builds an HTTP executor per endpoint, sharing one client.
    pub fn from_http_endpoint_map(endpoints: HashMap<String, String>) -> Self {
        let http_client = Arc::new(reqwest::Client::new());
        let inner = endpoints
            .into_iter()
            .map(|(location, endpoint)| {
                let executor =
                    HttpLocationExecutor::new(&endpoint, http_client.clone()).to_boxed_arc();
                (location, executor)
            })
            .collect::<HashMap<_, _>>();
        LocationExecutorMap { inner }
    }
}
