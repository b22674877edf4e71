use std::collections::{BTreeMap, BTreeSet};

use futures::{future::BoxFuture, stream::FuturesUnordered, FutureExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::{instrument, trace};

use stitch_router_query_planner::plan::{Plan, PlanOperation};
use stitch_router_query_planner::request::Request;
use stitch_router_query_planner::supergraph::{
    BoundaryQuery, Supergraph, EXPORT_PREFIX, SUPERGRAPH_LOCATION,
};

use crate::deep_merge::{deep_merge, value_at_path_mut};
use crate::error_repath::ErrorScope;
use crate::executors::common::{LocationRequest, LocationResponse};
use crate::executors::map::LocationExecutorMap;

pub mod deep_merge;
pub mod error_repath;
pub mod executors;
pub mod introspection;

#[cfg(test)]
mod tests;

/// Final `{data, errors}` shape returned to the client.
#[derive(Serialize, Deserialize, Debug, Clone, Default, PartialEq)]
pub struct ExecutionResult {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<GraphQLError>>,
}

impl ExecutionResult {
    pub fn from_error_message(message: String) -> Self {
        ExecutionResult {
            data: None,
            errors: Some(vec![GraphQLError {
                message,
                locations: None,
                path: None,
                extensions: None,
            }]),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphQLError {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locations: Option<Vec<GraphQLErrorLocation>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Vec<Value>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extensions: Option<Map<String, Value>>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct GraphQLErrorLocation {
    pub line: usize,
    pub column: usize,
}

/// Transport-level failures. Remote GraphQL errors are not represented
/// here; they merge into the final result after repathing.
#[derive(Debug, thiserror::Error)]
pub enum ExecutionError {
    #[error("location '{0}' is not registered")]
    UnknownLocation(String),
    #[error("transport failure for location '{location}': {message}")]
    Transport { location: String, message: String },
    #[error("failed to decode response from location '{location}': {message}")]
    Decode { location: String, message: String },
    #[error("internal execution error: {0}")]
    Internal(String),
}

/// One partially-populated object in `data` that a boundary operation will
/// enrich, addressed by its concrete response path.
#[derive(Debug, Clone)]
pub struct Origin {
    pub json_path: Vec<Value>,
    pub key: Value,
    pub type_name: Option<String>,
}

/// Walks the plan in dependency order, batching boundary fetches per
/// location and merging responses into one result tree.
pub struct Executor<'a> {
    supergraph: &'a Supergraph,
    executors: &'a LocationExecutorMap,
}

struct OutboundCall {
    location: String,
    document: String,
    variables: Map<String, Value>,
}

struct BoundaryGroup<'p> {
    op: &'p PlanOperation,
    boundary: BoundaryQuery,
    batch_index: usize,
    origins: Vec<Origin>,
}

enum DispatchMeta<'p> {
    Root(&'p PlanOperation),
    Boundary(Vec<BoundaryGroup<'p>>),
}

impl<'a> Executor<'a> {
    pub fn new(supergraph: &'a Supergraph, executors: &'a LocationExecutorMap) -> Self {
        Executor {
            supergraph,
            executors,
        }
    }

    #[instrument(level = "debug", skip_all, fields(ops = plan.ops.len()))]
    pub async fn execute(
        &self,
        request: &Request,
        plan: &Plan,
    ) -> Result<ExecutionResult, ExecutionError> {
        let view = request
            .operation()
            .map_err(|e| ExecutionError::Internal(e.to_string()))?;
        let operation_name = view.name.map(str::to_string);
        let operation_directives = view.printed_directives();

        let mut data = Value::Object(Map::new());
        let mut errors: Vec<GraphQLError> = Vec::new();
        let mut completed: BTreeSet<usize> = BTreeSet::new();
        let mut pending: Vec<&PlanOperation> = plan.ops.iter().collect();
        let mut query_count = 0usize;

        while !pending.is_empty() {
            let (ready, rest): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|op| op.after == 0 || completed.contains(&op.after));
            pending = rest;
            if ready.is_empty() {
                return Err(ExecutionError::Internal(
                    "operation dependencies do not reach a completed step".to_string(),
                ));
            }

            let mut network_ready: Vec<&PlanOperation> = Vec::new();
            for op in ready {
                if op.location == SUPERGRAPH_LOCATION {
                    // Introspection resolves against the merged schema; no
                    // network call, no query_count.
                    let resolved = introspection::resolve(
                        self.supergraph,
                        &op.selection_set,
                        &request.variables,
                    );
                    deep_merge(&mut data, resolved);
                    completed.insert(op.step);
                } else {
                    network_ready.push(op);
                }
            }

            // Boundary operations on the same location sharing `after` go
            // out as one batched document.
            let mut dispatches: Vec<(OutboundCall, DispatchMeta<'_>)> = Vec::new();
            let mut boundary_groups: BTreeMap<(String, usize), Vec<&PlanOperation>> =
                BTreeMap::new();
            for op in network_ready {
                if op.boundary.is_some() {
                    boundary_groups
                        .entry((op.location.clone(), op.after))
                        .or_default()
                        .push(op);
                } else {
                    dispatches.push(self.build_root_dispatch(
                        op,
                        &operation_name,
                        &operation_directives,
                        request,
                    ));
                }
            }
            for ((location, _), ops) in boundary_groups {
                if let Some(dispatch) = self.build_boundary_dispatch(
                    &location,
                    ops,
                    &data,
                    &operation_name,
                    &operation_directives,
                    request,
                    &mut completed,
                ) {
                    dispatches.push(dispatch);
                }
            }

            let mut jobs: FuturesUnordered<
                BoxFuture<'_, (DispatchMeta<'_>, Result<LocationResponse, ExecutionError>)>,
            > = FuturesUnordered::new();
            for (call, meta) in dispatches {
                query_count += 1;
                let executors = self.executors;
                let context = request.context.as_ref();
                jobs.push(
                    async move {
                        let OutboundCall {
                            location,
                            document,
                            variables,
                        } = call;
                        let result = executors
                            .execute(LocationRequest {
                                location: &location,
                                query: document,
                                variables,
                                context,
                            })
                            .await;
                        (meta, result)
                    }
                    .boxed(),
                );
            }

            // Fetches overlap; merges are applied one at a time as results
            // arrive. A transport failure aborts the request once in-flight
            // work has been drained.
            let mut failure: Option<ExecutionError> = None;
            while let Some((meta, result)) = jobs.next().await {
                let response = match result {
                    Ok(response) => response,
                    Err(error) => {
                        failure.get_or_insert(error);
                        continue;
                    }
                };
                if failure.is_some() {
                    continue;
                }
                match meta {
                    DispatchMeta::Root(op) => {
                        if let Some(response_data @ Value::Object(_)) = response.data {
                            deep_merge(&mut data, response_data);
                        }
                        if let Some(remote_errors) = response.errors {
                            errors.extend(remote_errors);
                        }
                        completed.insert(op.step);
                    }
                    DispatchMeta::Boundary(groups) => {
                        let response_data = response.data.unwrap_or(Value::Null);
                        for group in &groups {
                            merge_boundary_group(&mut data, group, &response_data);
                            completed.insert(group.op.step);
                        }
                        if let Some(remote_errors) = response.errors {
                            let scopes: Vec<ErrorScope<'_>> = groups
                                .iter()
                                .map(|group| ErrorScope {
                                    batch_index: group.batch_index,
                                    list: group.boundary.list,
                                    origins: &group.origins,
                                    op_path: &group.op.path,
                                })
                                .collect();
                            errors.extend(error_repath::repath_errors(remote_errors, &scopes));
                        }
                    }
                }
            }
            if let Some(error) = failure {
                return Err(error);
            }
        }

        strip_exports(&mut data);
        trace!(query_count, "execution finished");
        Ok(ExecutionResult {
            data: Some(data),
            errors: (!errors.is_empty()).then_some(errors),
        })
    }

    fn build_root_dispatch<'p>(
        &self,
        op: &'p PlanOperation,
        operation_name: &Option<String>,
        operation_directives: &Option<String>,
        request: &Request,
    ) -> (OutboundCall, DispatchMeta<'p>) {
        let mut document = op.operation_type.to_string();
        if let Some(name) = operation_name {
            document.push(' ');
            document.push_str(name);
        }
        write_variable_definitions(&mut document, op.variables.iter());
        if let Some(directives) = operation_directives {
            document.push(' ');
            document.push_str(directives);
        }
        document.push_str(&op.selection_set);

        let variables = filter_variables(&request.variables, op.variables.keys());
        (
            OutboundCall {
                location: op.location.clone(),
                document,
                variables,
            },
            DispatchMeta::Root(op),
        )
    }

    /// Builds one outbound document for all ready boundary operations on a
    /// location. Operations whose origin set is empty complete without a
    /// call.
    #[allow(clippy::too_many_arguments)]
    fn build_boundary_dispatch<'p>(
        &self,
        location: &str,
        ops: Vec<&'p PlanOperation>,
        data: &Value,
        operation_name: &Option<String>,
        operation_directives: &Option<String>,
        request: &Request,
        completed: &mut BTreeSet<usize>,
    ) -> Option<(OutboundCall, DispatchMeta<'p>)> {
        let mut groups: Vec<BoundaryGroup<'p>> = Vec::new();
        for op in ops {
            let Some(boundary) = op.boundary.clone() else {
                continue;
            };
            let origins = resolve_origins(data, &op.path, op.if_type.as_deref(), &boundary.key);
            if origins.is_empty() {
                completed.insert(op.step);
                continue;
            }
            groups.push(BoundaryGroup {
                op,
                boundary,
                batch_index: groups.len(),
                origins,
            });
        }
        if groups.is_empty() {
            return None;
        }

        let mut field_strings: Vec<String> = Vec::new();
        for group in &groups {
            let boundary = &group.boundary;
            if boundary.list {
                let keys = group
                    .origins
                    .iter()
                    .map(|origin| encode_key(boundary, origin))
                    .collect::<Vec<_>>()
                    .join(", ");
                field_strings.push(format!(
                    "_{}_result: {}({}: [{}]){}",
                    group.batch_index, boundary.field, boundary.arg, keys, group.op.selection_set
                ));
            } else {
                for (object_index, origin) in group.origins.iter().enumerate() {
                    field_strings.push(format!(
                        "_{}_{}_result: {}({}: {}){}",
                        group.batch_index,
                        object_index,
                        boundary.field,
                        boundary.arg,
                        encode_key(boundary, origin),
                        group.op.selection_set
                    ));
                }
            }
        }

        let mut document = String::from("query");
        if let Some(name) = operation_name {
            document.push(' ');
            document.push_str(name);
            for group in &groups {
                document.push('_');
                document.push_str(&group.op.step.to_string());
            }
        }
        let mut variable_defs: BTreeMap<&String, &String> = BTreeMap::new();
        for group in &groups {
            for (name, ty) in &group.op.variables {
                variable_defs.insert(name, ty);
            }
        }
        write_variable_definitions(&mut document, variable_defs.iter().map(|(n, t)| (*n, *t)));
        if let Some(directives) = operation_directives {
            document.push(' ');
            document.push_str(directives);
        }
        document.push('{');
        document.push_str(&field_strings.join(" "));
        document.push('}');

        let variables = filter_variables(&request.variables, variable_defs.keys().copied());
        Some((
            OutboundCall {
                location: location.to_string(),
                document,
                variables,
            },
            DispatchMeta::Boundary(groups),
        ))
    }
}

fn write_variable_definitions<'v>(
    document: &mut String,
    definitions: impl Iterator<Item = (&'v String, &'v String)>,
) {
    let mut first = true;
    for (name, ty) in definitions {
        if first {
            document.push('(');
            first = false;
        } else {
            document.push_str(", ");
        }
        document.push('$');
        document.push_str(name);
        document.push_str(": ");
        document.push_str(ty);
    }
    if !first {
        document.push(')');
    }
}

fn filter_variables<'k>(
    variables: &Map<String, Value>,
    keys: impl Iterator<Item = &'k String>,
) -> Map<String, Value> {
    keys.filter_map(|key| variables.get(key).map(|value| (key.clone(), value.clone())))
        .collect()
}

/// Encodes one origin's key for the outbound document: a JSON scalar, or a
/// `{__typename, key}` representation for federation-style boundaries.
fn encode_key(boundary: &BoundaryQuery, origin: &Origin) -> String {
    if boundary.federation {
        let type_name = origin
            .type_name
            .clone()
            .unwrap_or_else(|| boundary.type_name.clone());
        format!(
            "{{__typename: {}, {}: {}}}",
            Value::String(type_name),
            boundary.key,
            origin.key
        )
    } else {
        origin.key.to_string()
    }
}

/// Resolves the origin set for a boundary operation: walk `data` along
/// `path`, flattening lists, then filter by exported `__typename` when the
/// operation is typed.
pub fn resolve_origins(
    data: &Value,
    path: &[String],
    if_type: Option<&str>,
    key_field: &str,
) -> Vec<Origin> {
    let key_alias = format!("{}{}", EXPORT_PREFIX, key_field);
    let typename_alias = format!("{}typename", EXPORT_PREFIX);
    let mut current = Vec::new();
    let mut origins = Vec::new();
    collect_origins(
        data,
        path,
        if_type,
        &key_alias,
        &typename_alias,
        &mut current,
        &mut origins,
    );
    origins
}

fn collect_origins(
    value: &Value,
    remaining: &[String],
    if_type: Option<&str>,
    key_alias: &str,
    typename_alias: &str,
    current: &mut Vec<Value>,
    origins: &mut Vec<Origin>,
) {
    match value {
        Value::Array(items) => {
            for (index, item) in items.iter().enumerate() {
                current.push(Value::from(index));
                collect_origins(
                    item,
                    remaining,
                    if_type,
                    key_alias,
                    typename_alias,
                    current,
                    origins,
                );
                current.pop();
            }
        }
        Value::Object(map) => {
            if remaining.is_empty() {
                let type_name = map
                    .get(typename_alias)
                    .and_then(Value::as_str)
                    .map(str::to_string);
                if let Some(required) = if_type {
                    if type_name.as_deref() != Some(required) {
                        return;
                    }
                }
                let Some(key) = map.get(key_alias) else {
                    return;
                };
                if key.is_null() {
                    return;
                }
                origins.push(Origin {
                    json_path: current.clone(),
                    key: key.clone(),
                    type_name,
                });
            } else if let Some(next) = map.get(&remaining[0]) {
                current.push(Value::String(remaining[0].clone()));
                collect_origins(
                    next,
                    &remaining[1..],
                    if_type,
                    key_alias,
                    typename_alias,
                    current,
                    origins,
                );
                current.pop();
            }
        }
        _ => {}
    }
}

fn merge_boundary_group(data: &mut Value, group: &BoundaryGroup<'_>, response_data: &Value) {
    if group.boundary.list {
        let alias = format!("_{}_result", group.batch_index);
        let Some(items) = response_data.get(&alias).and_then(Value::as_array) else {
            return;
        };
        for (index, origin) in group.origins.iter().enumerate() {
            merge_origin_result(data, origin, items.get(index));
        }
    } else {
        for (object_index, origin) in group.origins.iter().enumerate() {
            let alias = format!("_{}_{}_result", group.batch_index, object_index);
            merge_origin_result(data, origin, response_data.get(&alias));
        }
    }
}

/// An explicit `null` nulls the origin slot; an absent slot leaves the
/// fields already fetched from other locations intact.
fn merge_origin_result(data: &mut Value, origin: &Origin, result: Option<&Value>) {
    match result {
        None => {}
        Some(Value::Null) => {
            if let Some(slot) = value_at_path_mut(data, &origin.json_path) {
                *slot = Value::Null;
            }
        }
        Some(item) => {
            if let Some(slot) = value_at_path_mut(data, &origin.json_path) {
                deep_merge(slot, item.clone());
            }
        }
    }
}

/// Removes every planner-injected `_STITCH_` export from the result tree.
pub fn strip_exports(value: &mut Value) {
    match value {
        Value::Object(map) => {
            map.retain(|key, _| !key.starts_with(EXPORT_PREFIX));
            for nested in map.values_mut() {
                strip_exports(nested);
            }
        }
        Value::Array(items) => {
            for item in items {
                strip_exports(item);
            }
        }
        _ => {}
    }
}
