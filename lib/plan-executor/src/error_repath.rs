use serde_json::Value;

use crate::{GraphQLError, Origin};

/// One batched operation's slice of a location response, for error
/// dispatch: which batch alias it owns and the origins it was fetched for.
pub struct ErrorScope<'a> {
    pub batch_index: usize,
    pub list: bool,
    pub origins: &'a [Origin],
    /// The operation's static response path, used when an error cannot be
    /// tied to a concrete origin.
    pub op_path: &'a [String],
}

/// Rewrites error paths from the batched document's alias space into the
/// assembled result tree. `["_0_result", 1, ...rest]` becomes
/// `[<origin 1 response path>, ...rest]`.
pub fn repath_errors(errors: Vec<GraphQLError>, scopes: &[ErrorScope<'_>]) -> Vec<GraphQLError> {
    errors
        .into_iter()
        .map(|mut error| {
            let Some(path) = &error.path else {
                return error;
            };
            let Some((batch_index, object_index)) =
                path.first().and_then(Value::as_str).and_then(parse_batch_alias)
            else {
                return error;
            };
            let Some(scope) = scopes.iter().find(|s| s.batch_index == batch_index) else {
                return error;
            };

            let rewritten = if scope.list {
                match path.get(1).and_then(Value::as_u64) {
                    Some(index) => scope
                        .origins
                        .get(index as usize)
                        .map(|origin| join_paths(&origin.json_path, &path[2..])),
                    // No origin index: fall back to the operation's static
                    // path plus the remaining segments.
                    None => Some(join_static(scope.op_path, &path[1..])),
                }
            } else {
                object_index
                    .and_then(|index| scope.origins.get(index))
                    .map(|origin| join_paths(&origin.json_path, &path[1..]))
            };

            if let Some(new_path) = rewritten {
                error.path = Some(new_path);
            }
            error
        })
        .collect()
}

/// Parses `_<batch>_result` and `_<batch>_<object>_result` aliases.
fn parse_batch_alias(alias: &str) -> Option<(usize, Option<usize>)> {
    let rest = alias.strip_prefix('_')?.strip_suffix("_result")?;
    match rest.split_once('_') {
        Some((batch, object)) => Some((batch.parse().ok()?, Some(object.parse().ok()?))),
        None => Some((rest.parse().ok()?, None)),
    }
}

fn join_paths(origin_path: &[Value], rest: &[Value]) -> Vec<Value> {
    let mut joined = Vec::with_capacity(origin_path.len() + rest.len());
    joined.extend_from_slice(origin_path);
    joined.extend_from_slice(rest);
    joined
}

fn join_static(op_path: &[String], rest: &[Value]) -> Vec<Value> {
    let mut joined: Vec<Value> = op_path.iter().map(|s| Value::String(s.clone())).collect();
    joined.extend_from_slice(rest);
    joined
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn origin(path: Vec<Value>) -> Origin {
        Origin {
            json_path: path,
            key: json!("k"),
            type_name: None,
        }
    }

    #[test]
    fn rewrites_list_batch_errors_onto_origin_paths() {
        let origins = vec![
            origin(vec![json!("elementsA"), json!(0)]),
            origin(vec![json!("elementsA"), json!(1)]),
            origin(vec![json!("elementsA"), json!(2)]),
        ];
        let scopes = [ErrorScope {
            batch_index: 0,
            list: true,
            origins: &origins,
            op_path: &["elementsA".to_string()],
        }];
        let errors = vec![GraphQLError {
            message: "Not found".to_string(),
            locations: None,
            path: Some(vec![json!("_0_result"), json!(1)]),
            extensions: None,
        }];
        let repathed = repath_errors(errors, &scopes);
        assert_eq!(
            repathed[0].path,
            Some(vec![json!("elementsA"), json!(1)])
        );
    }

    #[test]
    fn rewrites_per_object_batch_errors_and_keeps_trailing_segments() {
        let origins = vec![origin(vec![json!("product")])];
        let scopes = [ErrorScope {
            batch_index: 2,
            list: false,
            origins: &origins,
            op_path: &["product".to_string()],
        }];
        let errors = vec![GraphQLError {
            message: "boom".to_string(),
            locations: None,
            path: Some(vec![json!("_2_0_result"), json!("shipping"), json!(3)]),
            extensions: None,
        }];
        let repathed = repath_errors(errors, &scopes);
        assert_eq!(
            repathed[0].path,
            Some(vec![json!("product"), json!("shipping"), json!(3)])
        );
    }

    #[test]
    fn falls_back_to_the_operation_path_for_mixed_scalar_tails() {
        let origins = vec![origin(vec![json!("a"), json!(0)])];
        let scopes = [ErrorScope {
            batch_index: 0,
            list: true,
            origins: &origins,
            op_path: &["a".to_string()],
        }];
        let errors = vec![GraphQLError {
            message: "odd path".to_string(),
            locations: None,
            path: Some(vec![json!("_0_result"), json!("name")]),
            extensions: None,
        }];
        let repathed = repath_errors(errors, &scopes);
        assert_eq!(repathed[0].path, Some(vec![json!("a"), json!("name")]));
    }

    #[test]
    fn leaves_unmatched_errors_untouched() {
        let scopes: [ErrorScope<'_>; 0] = [];
        let errors = vec![GraphQLError {
            message: "free-floating".to_string(),
            locations: None,
            path: None,
            extensions: None,
        }];
        let repathed = repath_errors(errors, &scopes);
        assert_eq!(repathed[0].path, None);
    }
}
