use std::collections::{BTreeMap, BTreeSet};

use graphql_parser::schema::{Definition, Type, TypeDefinition};
use serde::{Deserialize, Serialize};

pub type SchemaDocument = graphql_parser::schema::Document<'static, String>;

/// Synthetic location that resolves `__schema` / `__type` against the merged
/// schema without a network round-trip.
pub const SUPERGRAPH_LOCATION: &str = "__super";

/// Alias prefix the planner injects for join keys; stripped by the executor
/// before the result is returned.
pub const EXPORT_PREFIX: &str = "_STITCH_";

/// Alias prefix reserved for internal use; client documents may not use it.
pub const RESERVED_ALIAS_PREFIX: &str = "_export_";

pub const TYPENAME_FIELD: &str = "__typename";

/// A root query field on one location that re-fetches a merged type by key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BoundaryQuery {
    /// The merged type this boundary query resolves.
    pub type_name: String,
    /// Location that serves the query.
    pub location: String,
    /// Root query field name.
    pub field: String,
    /// Argument on `field` that carries the key value(s).
    pub arg: String,
    /// Field on the target type whose value feeds `arg`.
    pub key: String,
    /// Whether `field` accepts a list of keys and returns a list.
    pub list: bool,
    /// Federation-style entry point: keys are sent as
    /// `{__typename: "...", <key>: <value>}` representations instead of bare
    /// scalars.
    pub federation: bool,
}

/// Per-supergraph configuration. Held on the instance so multiple
/// supergraphs with different directive names can coexist in one process.
#[derive(Debug, Clone)]
pub struct SupergraphConfig {
    pub directive_name: String,
    pub query_name: String,
    pub mutation_name: String,
}

impl Default for SupergraphConfig {
    fn default() -> Self {
        SupergraphConfig {
            directive_name: "stitch".to_string(),
            query_name: "Query".to_string(),
            mutation_name: "Mutation".to_string(),
        }
    }
}

/// The merged schema plus the routing tables the planner and executor need.
/// Built once by the composer, then shared read-only across requests.
#[derive(Debug)]
pub struct Supergraph {
    pub schema: SchemaDocument,
    pub locations: BTreeSet<String>,
    /// `type name -> location -> fields resolvable at that location`.
    pub fields_by_type_and_location: BTreeMap<String, BTreeMap<String, BTreeSet<String>>>,
    /// `type name -> boundary queries`, ordered by location then key.
    pub boundaries: BTreeMap<String, Vec<BoundaryQuery>>,
    pub config: SupergraphConfig,
    /// Whether any location contributed mutation fields.
    pub has_mutations: bool,
}

impl Supergraph {
    pub fn type_definition(&self, name: &str) -> Option<&TypeDefinition<'static, String>> {
        self.schema.definitions.iter().find_map(|def| match def {
            Definition::TypeDefinition(type_def) if type_def_name(type_def) == name => {
                Some(type_def)
            }
            _ => None,
        })
    }

    /// Declared type of `field_name` on `type_name`, wrappers included.
    pub fn field_type(&self, type_name: &str, field_name: &str) -> Option<&Type<'static, String>> {
        match self.type_definition(type_name)? {
            TypeDefinition::Object(obj) => obj
                .fields
                .iter()
                .find(|f| f.name == field_name)
                .map(|f| &f.field_type),
            TypeDefinition::Interface(iface) => iface
                .fields
                .iter()
                .find(|f| f.name == field_name)
                .map(|f| &f.field_type),
            _ => None,
        }
    }

    pub fn is_composite_type(&self, name: &str) -> bool {
        matches!(
            self.type_definition(name),
            Some(TypeDefinition::Object(_))
                | Some(TypeDefinition::Interface(_))
                | Some(TypeDefinition::Union(_))
        )
    }

    pub fn is_abstract_type(&self, name: &str) -> bool {
        matches!(
            self.type_definition(name),
            Some(TypeDefinition::Interface(_)) | Some(TypeDefinition::Union(_))
        )
    }

    /// Concrete types an abstract type can resolve to. Objects resolve to
    /// themselves.
    pub fn possible_types(&self, name: &str) -> Vec<String> {
        match self.type_definition(name) {
            Some(TypeDefinition::Union(union_type)) => {
                union_type.types.iter().cloned().collect()
            }
            Some(TypeDefinition::Interface(_)) => {
                let mut types: Vec<String> = self
                    .schema
                    .definitions
                    .iter()
                    .filter_map(|def| match def {
                        Definition::TypeDefinition(TypeDefinition::Object(obj))
                            if obj.implements_interfaces.iter().any(|i| i == name) =>
                        {
                            Some(obj.name.clone())
                        }
                        _ => None,
                    })
                    .collect();
                types.sort();
                types
            }
            Some(TypeDefinition::Object(obj)) => vec![obj.name.clone()],
            _ => vec![],
        }
    }

    /// Locations able to resolve `field_name` on `type_name`, sorted by name.
    pub fn locations_for_field(&self, type_name: &str, field_name: &str) -> Vec<&str> {
        self.fields_by_type_and_location
            .get(type_name)
            .map(|by_location| {
                by_location
                    .iter()
                    .filter(|(_, fields)| fields.contains(field_name))
                    .map(|(location, _)| location.as_str())
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn location_provides_field(
        &self,
        type_name: &str,
        location: &str,
        field_name: &str,
    ) -> bool {
        self.fields_by_type_and_location
            .get(type_name)
            .and_then(|by_location| by_location.get(location))
            .map(|fields| fields.contains(field_name))
            .unwrap_or(false)
    }

    pub fn is_boundary_type(&self, name: &str) -> bool {
        self.boundaries.contains_key(name)
    }

    pub fn boundaries_for(&self, name: &str) -> &[BoundaryQuery] {
        self.boundaries
            .get(name)
            .map(|b| b.as_slice())
            .unwrap_or_default()
    }
}

pub fn type_def_name<'a>(type_def: &'a TypeDefinition<'static, String>) -> &'a str {
    match type_def {
        TypeDefinition::Scalar(t) => &t.name,
        TypeDefinition::Object(t) => &t.name,
        TypeDefinition::Interface(t) => &t.name,
        TypeDefinition::Union(t) => &t.name,
        TypeDefinition::Enum(t) => &t.name,
        TypeDefinition::InputObject(t) => &t.name,
    }
}

/// Innermost named type after stripping list / non-null wrappers.
pub fn named_type<'a>(ty: &'a Type<'static, String>) -> &'a str {
    match ty {
        Type::NamedType(name) => name,
        Type::ListType(inner) => named_type(inner),
        Type::NonNullType(inner) => named_type(inner),
    }
}

/// Whether the type has a list wrapper at any depth.
pub fn type_is_list(ty: &Type<'static, String>) -> bool {
    match ty {
        Type::NamedType(_) => false,
        Type::ListType(_) => true,
        Type::NonNullType(inner) => type_is_list(inner),
    }
}

pub fn is_introspection_field(name: &str) -> bool {
    name == "__schema" || name == "__type"
}
