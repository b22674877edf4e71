use std::collections::{BTreeMap, BTreeSet};

use graphql_parser::schema::{Definition, SchemaDefinition, TypeDefinition};
use graphql_parser::Pos;
use tracing::instrument;

use crate::supergraph::{SchemaDocument, Supergraph, SupergraphConfig};

mod boundary;
mod error;
mod merge;

pub use error::CompositionError;

/// Options for a composition run. Root type renames are applied to the
/// merged schema; the directive name controls boundary discovery.
#[derive(Debug, Clone, Default)]
pub struct ComposerOptions {
    pub query_name: Option<String>,
    pub mutation_name: Option<String>,
    pub directive_name: Option<String>,
}

/// Root operation type names declared by one location.
#[derive(Debug, Clone)]
pub(crate) struct LocationRoots {
    pub query: String,
    pub mutation: Option<String>,
}

pub struct Composer {
    options: ComposerOptions,
}

/// Composes with default options.
pub fn compose(
    schemas: &BTreeMap<String, SchemaDocument>,
) -> Result<Supergraph, CompositionError> {
    Composer::new(ComposerOptions::default()).compose(schemas)
}

impl Composer {
    pub fn new(options: ComposerOptions) -> Self {
        Composer { options }
    }

    #[instrument(level = "debug", skip_all, fields(locations = schemas.len()))]
    pub fn compose(
        &self,
        schemas: &BTreeMap<String, SchemaDocument>,
    ) -> Result<Supergraph, CompositionError> {
        if schemas.is_empty() {
            return Err(CompositionError::EmptySchema);
        }

        let config = SupergraphConfig {
            directive_name: self
                .options
                .directive_name
                .clone()
                .unwrap_or_else(|| "stitch".to_string()),
            query_name: self
                .options
                .query_name
                .clone()
                .unwrap_or_else(|| "Query".to_string()),
            mutation_name: self
                .options
                .mutation_name
                .clone()
                .unwrap_or_else(|| "Mutation".to_string()),
        };

        let mut roots_by_location: BTreeMap<String, LocationRoots> = BTreeMap::new();
        for (location, schema) in schemas {
            let roots = location_roots(location, schema)?;
            check_rename_collision(location, schema, &roots, &config)?;
            roots_by_location.insert(location.clone(), roots);
        }

        // Group type definitions under their merged names. Root operation
        // types from every location collapse into the configured names.
        let mut groups: BTreeMap<String, Vec<(&str, &TypeDefinition<'static, String>)>> =
            BTreeMap::new();
        for (location, schema) in schemas {
            let roots = &roots_by_location[location];
            for definition in &schema.definitions {
                let Definition::TypeDefinition(type_def) = definition else {
                    continue;
                };
                let name = crate::supergraph::type_def_name(type_def);
                if name.starts_with("__") {
                    continue;
                }
                let merged_name = if name == roots.query {
                    config.query_name.clone()
                } else if roots.mutation.as_deref() == Some(name) {
                    config.mutation_name.clone()
                } else {
                    name.to_string()
                };
                groups
                    .entry(merged_name)
                    .or_default()
                    .push((location.as_str(), type_def));
            }
        }

        let mut fields_by_type_and_location: BTreeMap<
            String,
            BTreeMap<String, BTreeSet<String>>,
        > = BTreeMap::new();
        let mut merged_types: Vec<TypeDefinition<'static, String>> = Vec::new();
        for (merged_name, members) in &groups {
            let merged = merge::merge_type_group(
                merged_name,
                members,
                &config,
                &mut fields_by_type_and_location,
            )?;
            merged_types.push(merged);
        }

        let boundaries = boundary::discover_boundaries(
            schemas,
            &roots_by_location,
            &config,
            &fields_by_type_and_location,
        )?;
        boundary::check_merged_type_coverage(
            &boundaries,
            &fields_by_type_and_location,
            &config,
            &merged_types,
        )?;

        let has_mutations = merged_types
            .iter()
            .any(|t| crate::supergraph::type_def_name(t) == config.mutation_name);

        let schema = build_schema_document(merged_types, schemas, &config, has_mutations);

        Ok(Supergraph {
            schema,
            locations: schemas.keys().cloned().collect(),
            fields_by_type_and_location,
            boundaries,
            config,
            has_mutations,
        })
    }
}

fn location_roots(
    location: &str,
    schema: &SchemaDocument,
) -> Result<LocationRoots, CompositionError> {
    let mut query = None;
    let mut mutation = None;
    for definition in &schema.definitions {
        if let Definition::SchemaDefinition(schema_def) = definition {
            if schema_def.subscription.is_some() {
                return Err(CompositionError::SubscriptionUnsupported(
                    location.to_string(),
                ));
            }
            query = schema_def.query.clone();
            mutation = schema_def.mutation.clone();
        }
    }
    let has_type = |name: &str| {
        schema.definitions.iter().any(|d| {
            matches!(d, Definition::TypeDefinition(t) if crate::supergraph::type_def_name(t) == name)
        })
    };
    if query.is_none() && has_type("Subscription") {
        return Err(CompositionError::SubscriptionUnsupported(
            location.to_string(),
        ));
    }
    let query = query.unwrap_or_else(|| "Query".to_string());
    let mutation = mutation.or_else(|| has_type("Mutation").then(|| "Mutation".to_string()));
    Ok(LocationRoots { query, mutation })
}

fn check_rename_collision(
    location: &str,
    schema: &SchemaDocument,
    roots: &LocationRoots,
    config: &SupergraphConfig,
) -> Result<(), CompositionError> {
    let collides = |merged: &str, own_root: Option<&str>| {
        own_root != Some(merged)
            && schema.definitions.iter().any(|d| {
                matches!(d, Definition::TypeDefinition(t) if crate::supergraph::type_def_name(t) == merged)
            })
    };
    if collides(&config.query_name, Some(roots.query.as_str())) {
        return Err(CompositionError::RootNameCollision {
            name: config.query_name.clone(),
            location: location.to_string(),
        });
    }
    if collides(&config.mutation_name, roots.mutation.as_deref()) {
        return Err(CompositionError::RootNameCollision {
            name: config.mutation_name.clone(),
            location: location.to_string(),
        });
    }
    Ok(())
}

fn build_schema_document(
    merged_types: Vec<TypeDefinition<'static, String>>,
    schemas: &BTreeMap<String, SchemaDocument>,
    config: &SupergraphConfig,
    has_mutations: bool,
) -> SchemaDocument {
    let mut definitions = Vec::with_capacity(merged_types.len() + 2);
    definitions.push(Definition::SchemaDefinition(SchemaDefinition {
        position: Pos::default(),
        directives: vec![],
        query: Some(config.query_name.clone()),
        mutation: has_mutations.then(|| config.mutation_name.clone()),
        subscription: None,
    }));
    for type_def in merged_types {
        definitions.push(Definition::TypeDefinition(type_def));
    }

    // Carry over directive definitions, minus the stitch directive, which is
    // location-internal and never part of the client-facing schema.
    let mut seen_directives = BTreeSet::new();
    for schema in schemas.values() {
        for definition in &schema.definitions {
            if let Definition::DirectiveDefinition(directive_def) = definition {
                if directive_def.name == config.directive_name {
                    continue;
                }
                if seen_directives.insert(directive_def.name.clone()) {
                    definitions.push(Definition::DirectiveDefinition(directive_def.clone()));
                }
            }
        }
    }

    SchemaDocument { definitions }
}
