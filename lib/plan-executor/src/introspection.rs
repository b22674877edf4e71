use graphql_parser::query::{
    Definition as QueryDefinition, OperationDefinition, Selection, Value as AstValue,
};
use graphql_parser::schema::{
    Definition, DirectiveDefinition, EnumValue, Field, InputValue, Type, TypeDefinition,
};
use serde_json::{Map, Value};
use tracing::warn;

use stitch_router_query_planner::ast::QuerySelection;
use stitch_router_query_planner::supergraph::{type_def_name, Supergraph, TYPENAME_FIELD};

const BUILTIN_SCALARS: [&str; 5] = ["Boolean", "Float", "ID", "Int", "String"];

struct Ctx<'a> {
    supergraph: &'a Supergraph,
    variables: &'a Map<String, Value>,
}

/// A type as introspection sees it: either declared in the merged schema or
/// one of the built-in scalars.
#[derive(Clone, Copy)]
enum TypeEntry<'a> {
    Def(&'a TypeDefinition<'static, String>),
    BuiltinScalar(&'a str),
}

/// Resolves a `"__super"` operation's selection set against the merged
/// schema. No network call is involved.
pub fn resolve(
    supergraph: &Supergraph,
    selection_set: &str,
    variables: &Map<String, Value>,
) -> Value {
    let document = match graphql_parser::parse_query::<String>(&format!("query {selection_set}")) {
        Ok(document) => document.into_static(),
        Err(error) => {
            warn!(%error, "introspection selection failed to parse");
            return Value::Object(Map::new());
        }
    };
    let items = document
        .definitions
        .into_iter()
        .find_map(|def| match def {
            QueryDefinition::Operation(OperationDefinition::Query(query)) => {
                Some(query.selection_set.items)
            }
            QueryDefinition::Operation(OperationDefinition::SelectionSet(set)) => Some(set.items),
            _ => None,
        })
        .unwrap_or_default();

    let ctx = Ctx {
        supergraph,
        variables,
    };
    let mut out = Map::new();
    resolve_root(&ctx, &items, &mut out);
    Value::Object(out)
}

fn resolve_root(ctx: &Ctx<'_>, items: &[QuerySelection], out: &mut Map<String, Value>) {
    for item in items {
        match item {
            Selection::Field(field) => {
                let value = match field.name.as_str() {
                    "__schema" => resolve_schema(ctx, &field.selection_set.items),
                    "__type" => match argument(ctx, field, "name").and_then(|v| match v {
                        Value::String(name) => ctx.find_type(&name),
                        _ => None,
                    }) {
                        Some(entry) => resolve_type_entry(ctx, entry, &field.selection_set.items),
                        None => Value::Null,
                    },
                    TYPENAME_FIELD => Value::String(ctx.supergraph.config.query_name.clone()),
                    _ => Value::Null,
                };
                out.insert(response_key(field), value);
            }
            Selection::InlineFragment(fragment) => {
                resolve_root(ctx, &fragment.selection_set.items, out)
            }
            Selection::FragmentSpread(_) => {}
        }
    }
}

fn resolve_schema(ctx: &Ctx<'_>, items: &[QuerySelection]) -> Value {
    let mut out = Map::new();
    for item in items {
        let Selection::Field(field) = item else {
            if let Selection::InlineFragment(fragment) = item {
                if let Value::Object(nested) = resolve_schema(ctx, &fragment.selection_set.items) {
                    out.extend(nested);
                }
            }
            continue;
        };
        let value = match field.name.as_str() {
            "queryType" => ctx
                .find_type(&ctx.supergraph.config.query_name)
                .map(|entry| resolve_type_entry(ctx, entry, &field.selection_set.items))
                .unwrap_or(Value::Null),
            "mutationType" => {
                if ctx.supergraph.has_mutations {
                    ctx.find_type(&ctx.supergraph.config.mutation_name)
                        .map(|entry| resolve_type_entry(ctx, entry, &field.selection_set.items))
                        .unwrap_or(Value::Null)
                } else {
                    Value::Null
                }
            }
            "subscriptionType" => Value::Null,
            "types" => {
                let mut types: Vec<Value> = ctx
                    .supergraph
                    .schema
                    .definitions
                    .iter()
                    .filter_map(|def| match def {
                        Definition::TypeDefinition(type_def) => Some(resolve_type_entry(
                            ctx,
                            TypeEntry::Def(type_def),
                            &field.selection_set.items,
                        )),
                        _ => None,
                    })
                    .collect();
                for scalar in BUILTIN_SCALARS {
                    types.push(resolve_type_entry(
                        ctx,
                        TypeEntry::BuiltinScalar(scalar),
                        &field.selection_set.items,
                    ));
                }
                Value::Array(types)
            }
            "directives" => Value::Array(
                ctx.supergraph
                    .schema
                    .definitions
                    .iter()
                    .filter_map(|def| match def {
                        Definition::DirectiveDefinition(directive) => {
                            Some(resolve_directive(ctx, directive, &field.selection_set.items))
                        }
                        _ => None,
                    })
                    .collect(),
            ),
            TYPENAME_FIELD => Value::String("__Schema".to_string()),
            _ => Value::Null,
        };
        out.insert(response_key(field), value);
    }
    Value::Object(out)
}

fn resolve_type_entry(ctx: &Ctx<'_>, entry: TypeEntry<'_>, items: &[QuerySelection]) -> Value {
    let mut out = Map::new();
    for item in items {
        let Selection::Field(field) = item else {
            if let Selection::InlineFragment(fragment) = item {
                if let Value::Object(nested) =
                    resolve_type_entry(ctx, entry, &fragment.selection_set.items)
                {
                    out.extend(nested);
                }
            }
            continue;
        };
        let value = match (field.name.as_str(), entry) {
            ("name", TypeEntry::Def(def)) => Value::String(type_def_name(def).to_string()),
            ("name", TypeEntry::BuiltinScalar(name)) => Value::String(name.to_string()),
            ("kind", TypeEntry::Def(def)) => Value::String(kind_of(def).to_string()),
            ("kind", TypeEntry::BuiltinScalar(_)) => Value::String("SCALAR".to_string()),
            ("description", TypeEntry::Def(def)) => description_of(def),
            ("fields", TypeEntry::Def(def)) => {
                let include_deprecated = bool_argument(ctx, field, "includeDeprecated");
                match def {
                    TypeDefinition::Object(obj) => {
                        resolve_fields(ctx, &obj.fields, include_deprecated, field)
                    }
                    TypeDefinition::Interface(iface) => {
                        resolve_fields(ctx, &iface.fields, include_deprecated, field)
                    }
                    _ => Value::Null,
                }
            }
            ("interfaces", TypeEntry::Def(def)) => match def {
                TypeDefinition::Object(obj) => Value::Array(
                    obj.implements_interfaces
                        .iter()
                        .filter_map(|name| ctx.find_type(name))
                        .map(|entry| resolve_type_entry(ctx, entry, &field.selection_set.items))
                        .collect(),
                ),
                TypeDefinition::Interface(iface) => Value::Array(
                    iface
                        .implements_interfaces
                        .iter()
                        .filter_map(|name| ctx.find_type(name))
                        .map(|entry| resolve_type_entry(ctx, entry, &field.selection_set.items))
                        .collect(),
                ),
                _ => Value::Null,
            },
            ("possibleTypes", TypeEntry::Def(def)) => match def {
                TypeDefinition::Union(_) | TypeDefinition::Interface(_) => Value::Array(
                    ctx.supergraph
                        .possible_types(type_def_name(def))
                        .iter()
                        .filter_map(|name| ctx.find_type(name))
                        .map(|entry| resolve_type_entry(ctx, entry, &field.selection_set.items))
                        .collect(),
                ),
                _ => Value::Null,
            },
            ("enumValues", TypeEntry::Def(TypeDefinition::Enum(enum_type))) => {
                let include_deprecated = bool_argument(ctx, field, "includeDeprecated");
                Value::Array(
                    enum_type
                        .values
                        .iter()
                        .filter(|value| include_deprecated || !is_deprecated_enum(value))
                        .map(|value| resolve_enum_value(value, &field.selection_set.items))
                        .collect(),
                )
            }
            ("inputFields", TypeEntry::Def(TypeDefinition::InputObject(input))) => Value::Array(
                input
                    .fields
                    .iter()
                    .map(|iv| resolve_input_value(ctx, iv, &field.selection_set.items))
                    .collect(),
            ),
            ("ofType", _) => Value::Null,
            (TYPENAME_FIELD, _) => Value::String("__Type".to_string()),
            _ => Value::Null,
        };
        out.insert(response_key(field), value);
    }
    Value::Object(out)
}

fn resolve_fields(
    ctx: &Ctx<'_>,
    fields: &[Field<'static, String>],
    include_deprecated: bool,
    selection: &graphql_parser::query::Field<'static, String>,
) -> Value {
    Value::Array(
        fields
            .iter()
            .filter(|f| include_deprecated || !is_deprecated(&f.directives))
            .map(|f| resolve_field_def(ctx, f, &selection.selection_set.items))
            .collect(),
    )
}

fn resolve_field_def(
    ctx: &Ctx<'_>,
    def: &Field<'static, String>,
    items: &[QuerySelection],
) -> Value {
    let mut out = Map::new();
    for item in items {
        let Selection::Field(field) = item else {
            continue;
        };
        let value = match field.name.as_str() {
            "name" => Value::String(def.name.clone()),
            "description" => def
                .description
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            "args" => Value::Array(
                def.arguments
                    .iter()
                    .map(|arg| resolve_input_value(ctx, arg, &field.selection_set.items))
                    .collect(),
            ),
            "type" => resolve_type_ref(ctx, &def.field_type, &field.selection_set.items),
            "isDeprecated" => Value::Bool(is_deprecated(&def.directives)),
            "deprecationReason" => deprecation_reason(&def.directives),
            TYPENAME_FIELD => Value::String("__Field".to_string()),
            _ => Value::Null,
        };
        out.insert(response_key(field), value);
    }
    Value::Object(out)
}

fn resolve_type_ref(ctx: &Ctx<'_>, ty: &Type<'static, String>, items: &[QuerySelection]) -> Value {
    match ty {
        Type::NamedType(name) => ctx
            .find_type(name)
            .map(|entry| resolve_type_entry(ctx, entry, items))
            .unwrap_or(Value::Null),
        Type::ListType(inner) => resolve_wrapper(ctx, "LIST", inner, items),
        Type::NonNullType(inner) => resolve_wrapper(ctx, "NON_NULL", inner, items),
    }
}

fn resolve_wrapper(
    ctx: &Ctx<'_>,
    kind: &str,
    inner: &Type<'static, String>,
    items: &[QuerySelection],
) -> Value {
    let mut out = Map::new();
    for item in items {
        let Selection::Field(field) = item else {
            continue;
        };
        let value = match field.name.as_str() {
            "kind" => Value::String(kind.to_string()),
            "name" => Value::Null,
            "ofType" => resolve_type_ref(ctx, inner, &field.selection_set.items),
            TYPENAME_FIELD => Value::String("__Type".to_string()),
            _ => Value::Null,
        };
        out.insert(response_key(field), value);
    }
    Value::Object(out)
}

fn resolve_input_value(
    ctx: &Ctx<'_>,
    input: &InputValue<'static, String>,
    items: &[QuerySelection],
) -> Value {
    let mut out = Map::new();
    for item in items {
        let Selection::Field(field) = item else {
            continue;
        };
        let value = match field.name.as_str() {
            "name" => Value::String(input.name.clone()),
            "description" => input
                .description
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            "type" => resolve_type_ref(ctx, &input.value_type, &field.selection_set.items),
            "defaultValue" => input
                .default_value
                .as_ref()
                .map(|value| Value::String(value.to_string()))
                .unwrap_or(Value::Null),
            TYPENAME_FIELD => Value::String("__InputValue".to_string()),
            _ => Value::Null,
        };
        out.insert(response_key(field), value);
    }
    Value::Object(out)
}

fn resolve_enum_value(value: &EnumValue<'static, String>, items: &[QuerySelection]) -> Value {
    let mut out = Map::new();
    for item in items {
        let Selection::Field(field) = item else {
            continue;
        };
        let resolved = match field.name.as_str() {
            "name" => Value::String(value.name.clone()),
            "description" => value
                .description
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            "isDeprecated" => Value::Bool(is_deprecated_enum(value)),
            "deprecationReason" => deprecation_reason(&value.directives),
            TYPENAME_FIELD => Value::String("__EnumValue".to_string()),
            _ => Value::Null,
        };
        out.insert(response_key(field), resolved);
    }
    Value::Object(out)
}

fn resolve_directive(
    ctx: &Ctx<'_>,
    directive: &DirectiveDefinition<'static, String>,
    items: &[QuerySelection],
) -> Value {
    let mut out = Map::new();
    for item in items {
        let Selection::Field(field) = item else {
            continue;
        };
        let value = match field.name.as_str() {
            "name" => Value::String(directive.name.clone()),
            "description" => directive
                .description
                .clone()
                .map(Value::String)
                .unwrap_or(Value::Null),
            "locations" => Value::Array(
                directive
                    .locations
                    .iter()
                    .map(|location| Value::String(location.as_str().to_string()))
                    .collect(),
            ),
            "args" => Value::Array(
                directive
                    .arguments
                    .iter()
                    .map(|arg| resolve_input_value(ctx, arg, &field.selection_set.items))
                    .collect(),
            ),
            "isRepeatable" => Value::Bool(directive.repeatable),
            TYPENAME_FIELD => Value::String("__Directive".to_string()),
            _ => Value::Null,
        };
        out.insert(response_key(field), value);
    }
    Value::Object(out)
}

impl<'a> Ctx<'a> {
    fn find_type(&self, name: &str) -> Option<TypeEntry<'a>> {
        if let Some(def) = self.supergraph.type_definition(name) {
            return Some(TypeEntry::Def(def));
        }
        BUILTIN_SCALARS
            .iter()
            .find(|scalar| **scalar == name)
            .map(|scalar| TypeEntry::BuiltinScalar(*scalar))
    }
}

fn argument(
    ctx: &Ctx<'_>,
    field: &graphql_parser::query::Field<'static, String>,
    name: &str,
) -> Option<Value> {
    field
        .arguments
        .iter()
        .find(|(arg_name, _)| arg_name == name)
        .and_then(|(_, value)| match value {
            AstValue::String(s) => Some(Value::String(s.clone())),
            AstValue::Boolean(b) => Some(Value::Bool(*b)),
            AstValue::Variable(var) => ctx.variables.get(var).cloned(),
            _ => None,
        })
}

fn bool_argument(
    ctx: &Ctx<'_>,
    field: &graphql_parser::query::Field<'static, String>,
    name: &str,
) -> bool {
    matches!(argument(ctx, field, name), Some(Value::Bool(true)))
}

fn response_key(field: &graphql_parser::query::Field<'static, String>) -> String {
    field.alias.clone().unwrap_or_else(|| field.name.clone())
}

fn kind_of(def: &TypeDefinition<'static, String>) -> &'static str {
    match def {
        TypeDefinition::Scalar(_) => "SCALAR",
        TypeDefinition::Object(_) => "OBJECT",
        TypeDefinition::Interface(_) => "INTERFACE",
        TypeDefinition::Union(_) => "UNION",
        TypeDefinition::Enum(_) => "ENUM",
        TypeDefinition::InputObject(_) => "INPUT_OBJECT",
    }
}

fn description_of(def: &TypeDefinition<'static, String>) -> Value {
    let description = match def {
        TypeDefinition::Scalar(t) => &t.description,
        TypeDefinition::Object(t) => &t.description,
        TypeDefinition::Interface(t) => &t.description,
        TypeDefinition::Union(t) => &t.description,
        TypeDefinition::Enum(t) => &t.description,
        TypeDefinition::InputObject(t) => &t.description,
    };
    description
        .clone()
        .map(Value::String)
        .unwrap_or(Value::Null)
}

fn is_deprecated(directives: &[graphql_parser::schema::Directive<'static, String>]) -> bool {
    directives.iter().any(|d| d.name == "deprecated")
}

fn is_deprecated_enum(value: &EnumValue<'static, String>) -> bool {
    is_deprecated(&value.directives)
}

fn deprecation_reason(
    directives: &[graphql_parser::schema::Directive<'static, String>],
) -> Value {
    directives
        .iter()
        .find(|d| d.name == "deprecated")
        .and_then(|d| {
            d.arguments
                .iter()
                .find(|(name, _)| name == "reason")
                .and_then(|(_, value)| match value {
                    AstValue::String(s) => Some(Value::String(s.clone())),
                    _ => None,
                })
        })
        .unwrap_or(Value::Null)
}
