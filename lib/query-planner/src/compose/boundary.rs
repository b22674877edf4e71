use std::collections::{BTreeMap, BTreeSet};

use graphql_parser::schema::{Definition, Field, TypeDefinition, Value};
use tracing::trace;

use super::error::CompositionError;
use super::LocationRoots;
use crate::supergraph::{named_type, type_is_list, BoundaryQuery, SchemaDocument, SupergraphConfig};

type FieldsByTypeAndLocation = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

/// Scans every location's query root for stitch directives and builds the
/// boundary routing table.
pub(crate) fn discover_boundaries(
    schemas: &BTreeMap<String, SchemaDocument>,
    roots_by_location: &BTreeMap<String, LocationRoots>,
    config: &SupergraphConfig,
    fields_by_type_and_location: &FieldsByTypeAndLocation,
) -> Result<BTreeMap<String, Vec<BoundaryQuery>>, CompositionError> {
    let mut boundaries: BTreeMap<String, Vec<BoundaryQuery>> = BTreeMap::new();

    for (location, schema) in schemas {
        let roots = &roots_by_location[location];
        let Some(query_root) = find_object(schema, &roots.query) else {
            continue;
        };
        for field in query_root {
            for directive in field
                .directives
                .iter()
                .filter(|d| d.name == config.directive_name)
            {
                let key_spec = directive
                    .arguments
                    .iter()
                    .find_map(|(name, value)| match (name.as_str(), value) {
                        ("key", Value::String(s)) => Some(s.clone()),
                        _ => None,
                    })
                    .ok_or_else(|| CompositionError::InvalidBoundaryArgument {
                        field: field.name.clone(),
                        location: location.clone(),
                    })?;
                let boundary = build_boundary(location, field, &key_spec)?;
                let for_type = boundaries.entry(boundary.type_name.clone()).or_default();
                if for_type
                    .iter()
                    .any(|b| b.location == boundary.location && b.key == boundary.key)
                {
                    return Err(CompositionError::DuplicateBoundary {
                        type_name: boundary.type_name,
                        location: boundary.location,
                        key: boundary.key,
                    });
                }
                trace!(
                    type_name = %boundary.type_name,
                    location = %boundary.location,
                    field = %boundary.field,
                    "discovered boundary query"
                );
                for_type.push(boundary);
            }
        }
    }

    for queries in boundaries.values_mut() {
        queries.sort_by(|a, b| (&a.location, &a.field).cmp(&(&b.location, &b.field)));
    }

    // The key must be resolvable from every location that contributes fields
    // to the target type, otherwise the executor could never export it.
    for (type_name, queries) in &boundaries {
        if let Some(by_location) = fields_by_type_and_location.get(type_name) {
            for boundary in queries {
                for (location, fields) in by_location {
                    if !fields.contains(&boundary.key) {
                        return Err(CompositionError::InvalidBoundaryKey {
                            type_name: type_name.clone(),
                            key: boundary.key.clone(),
                            location: location.clone(),
                        });
                    }
                }
            }
        }
    }

    Ok(boundaries)
}

fn find_object<'a>(
    schema: &'a SchemaDocument,
    name: &str,
) -> Option<&'a [Field<'static, String>]> {
    schema.definitions.iter().find_map(|def| match def {
        Definition::TypeDefinition(TypeDefinition::Object(obj)) if obj.name == name => {
            Some(obj.fields.as_slice())
        }
        _ => None,
    })
}

/// Parses a `"[argName:]fieldName"` key spec against the entry point field.
fn build_boundary(
    location: &str,
    field: &Field<'static, String>,
    key_spec: &str,
) -> Result<BoundaryQuery, CompositionError> {
    let (arg_name, key_field) = match key_spec.split_once(':') {
        Some((arg, key)) => (Some(arg.trim().to_string()), key.trim().to_string()),
        None => (None, key_spec.trim().to_string()),
    };

    let argument = match &arg_name {
        Some(name) => field.arguments.iter().find(|a| &a.name == name),
        // With a single declared argument the mapping is unambiguous.
        None if field.arguments.len() == 1 => field.arguments.first(),
        None => None,
    }
    .ok_or_else(|| CompositionError::InvalidBoundaryArgument {
        field: field.name.clone(),
        location: location.to_string(),
    })?;

    let list = type_is_list(&argument.value_type);
    let federation = named_type(&argument.value_type) == "_Any" || field.name == "_entities";

    Ok(BoundaryQuery {
        type_name: named_type(&field.field_type).to_string(),
        location: location.to_string(),
        field: field.name.clone(),
        arg: argument.name.clone(),
        key: key_field,
        list,
        federation,
    })
}

/// Every merged object type must be re-fetchable from each location that
/// contributes fields no other location provides.
pub(crate) fn check_merged_type_coverage(
    boundaries: &BTreeMap<String, Vec<BoundaryQuery>>,
    fields_by_type_and_location: &FieldsByTypeAndLocation,
    config: &SupergraphConfig,
    merged_types: &[TypeDefinition<'static, String>],
) -> Result<(), CompositionError> {
    for (type_name, by_location) in fields_by_type_and_location {
        if by_location.len() < 2
            || *type_name == config.query_name
            || *type_name == config.mutation_name
        {
            continue;
        }
        let is_object = merged_types.iter().any(|t| {
            matches!(t, TypeDefinition::Object(obj) if obj.name == *type_name)
        });
        if !is_object {
            continue;
        }
        for (location, fields) in by_location {
            let has_unique_field = fields.iter().any(|field| {
                field != "__typename"
                    && !by_location
                        .iter()
                        .any(|(other, other_fields)| {
                            other != location && other_fields.contains(field)
                        })
            });
            if !has_unique_field {
                continue;
            }
            let covered = boundaries
                .get(type_name)
                .map(|queries| queries.iter().any(|b| &b.location == location))
                .unwrap_or(false);
            if !covered {
                return Err(CompositionError::MissingBoundary {
                    type_name: type_name.clone(),
                    location: location.clone(),
                });
            }
        }
    }
    Ok(())
}
