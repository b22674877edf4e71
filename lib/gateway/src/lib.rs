use std::sync::Arc;

use graphql_tools::validation::rules::default_rules_validation_plan;
use graphql_tools::validation::utils::ValidationError;
use graphql_tools::validation::validate::{validate, ValidationPlan};
use serde_json::{Map, Value};
use tracing::{instrument, trace, warn};

use stitch_router_plan_executor::executors::map::LocationExecutorMap;
use stitch_router_plan_executor::{
    ExecutionResult, Executor, GraphQLError, GraphQLErrorLocation,
};
use stitch_router_query_planner::plan::{Plan, PlanError, Planner};
use stitch_router_query_planner::request::{Request, RequestContext};
use stitch_router_query_planner::supergraph::Supergraph;

pub mod cache;

pub use cache::{InMemoryPlanCache, PlanCache};

/// Maps an otherwise-unhandled internal failure to the message the client
/// sees. Receives the caller context when one was attached.
pub type ErrorHook =
    dyn Fn(&dyn std::error::Error, Option<&RequestContext>) -> String + Send + Sync;

pub struct GatewayRequest {
    pub query: String,
    pub variables: Map<String, Value>,
    pub operation_name: Option<String>,
    pub context: Option<RequestContext>,
    pub validate: bool,
}

impl GatewayRequest {
    pub fn new(query: impl Into<String>) -> Self {
        GatewayRequest {
            query: query.into(),
            variables: Map::new(),
            operation_name: None,
            context: None,
            validate: false,
        }
    }
}

/// The user-facing entry point: parse, optionally validate, plan (with
/// cache hooks) and execute against the supergraph.
pub struct Gateway {
    supergraph: Arc<Supergraph>,
    executors: LocationExecutorMap,
    validation_plan: ValidationPlan,
    plan_cache: Option<Arc<dyn PlanCache>>,
    error_hook: Option<Box<ErrorHook>>,
}

impl Gateway {
    pub fn new(supergraph: Arc<Supergraph>, executors: LocationExecutorMap) -> Self {
        Gateway {
            supergraph,
            executors,
            validation_plan: default_rules_validation_plan(),
            plan_cache: None,
            error_hook: None,
        }
    }

    pub fn with_plan_cache(mut self, plan_cache: Arc<dyn PlanCache>) -> Self {
        self.plan_cache = Some(plan_cache);
        self
    }

    pub fn with_error_hook(mut self, error_hook: Box<ErrorHook>) -> Self {
        self.error_hook = Some(error_hook);
        self
    }

    #[instrument(level = "debug", skip_all)]
    pub async fn execute(&self, gateway_request: GatewayRequest) -> ExecutionResult {
        let mut request = match Request::parse(
            &gateway_request.query,
            gateway_request.operation_name,
            gateway_request.variables,
        ) {
            Ok(request) => request,
            Err(error) => {
                return ExecutionResult::from_error_message(format!(
                    "failed to parse query: {error}"
                ))
            }
        };
        if let Some(context) = gateway_request.context {
            request = request.with_context(context);
        }

        if gateway_request.validate {
            let validation_errors = validate(
                &self.supergraph.schema,
                &request.document,
                &self.validation_plan,
            );
            if !validation_errors.is_empty() {
                return ExecutionResult {
                    data: None,
                    errors: Some(
                        validation_errors
                            .iter()
                            .map(validation_error_to_graphql)
                            .collect(),
                    ),
                };
            }
        }

        if let Err(error) = request.prepare() {
            return plan_error_result(error);
        }
        let plan = match self.resolve_plan(&request) {
            Ok(plan) => plan,
            Err(error) => return plan_error_result(error),
        };

        match Executor::new(&self.supergraph, &self.executors)
            .execute(&request, &plan)
            .await
        {
            Ok(result) => result,
            Err(error) => {
                warn!(%error, "request aborted by execution failure");
                let message = match &self.error_hook {
                    Some(hook) => hook(&error, request.context.as_ref()),
                    None => "an unexpected error occurred".to_string(),
                };
                ExecutionResult::from_error_message(message)
            }
        }
    }

    fn resolve_plan(&self, request: &Request) -> Result<Plan, PlanError> {
        if let Some(plan_cache) = &self.plan_cache {
            if let Some(cached) = plan_cache.read(request.digest(), request.context.as_ref()) {
                match Plan::from_json(&cached) {
                    Ok(plan) => {
                        trace!(digest = %request.digest(), "plan cache hit");
                        return Ok(plan);
                    }
                    Err(error) => warn!(%error, "discarding unreadable cached plan"),
                }
            }
        }
        let plan = Planner::plan(&self.supergraph, request)?;
        if let Some(plan_cache) = &self.plan_cache {
            plan_cache.write(request.digest(), &plan.to_json(), request.context.as_ref());
        }
        Ok(plan)
    }
}

fn plan_error_result(error: PlanError) -> ExecutionResult {
    ExecutionResult::from_error_message(error.to_string())
}

fn validation_error_to_graphql(error: &ValidationError) -> GraphQLError {
    GraphQLError {
        message: error.message.to_string(),
        locations: Some(
            error
                .locations
                .iter()
                .map(|pos| GraphQLErrorLocation {
                    line: pos.line,
                    column: pos.column,
                })
                .collect(),
        ),
        path: None,
        extensions: Some(Map::from_iter([(
            "code".to_string(),
            Value::String(error.error_code.to_string()),
        )])),
    }
}
