use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use stitch_router_query_planner::request::RequestContext;

use crate::{ExecutionError, GraphQLError};

/// One outbound call to a location.
pub struct LocationRequest<'a> {
    pub location: &'a str,
    pub query: String,
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub context: Option<&'a RequestContext>,
}

/// Raw response body from a location. GraphQL errors in `errors` are remote
/// results, not transport failures; those surface as `ExecutionError`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LocationResponse {
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

#[async_trait]
pub trait LocationExecutor {
    async fn execute(
        &self,
        request: LocationRequest<'_>,
    ) -> Result<LocationResponse, ExecutionError>;

    fn to_boxed_arc<'a>(self) -> Arc<Box<dyn LocationExecutor + Send + Sync + 'a>>
    where
        Self: Sized + Send + Sync + 'a,
    {
        Arc::new(Box::new(self))
    }
}

pub type LocationExecutorType = dyn LocationExecutor + Send + Sync;

pub type LocationExecutorBoxedArc = Arc<Box<LocationExecutorType>>;
