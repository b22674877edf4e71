use std::collections::BTreeSet;

use graphql_parser::query::{
    Directive, Field, FragmentDefinition, InlineFragment, Selection, SelectionSet, TypeCondition,
    Value,
};
use graphql_parser::schema::Type;
use graphql_parser::Pos;

pub type QuerySelection = Selection<'static, String>;
pub type QuerySelectionSet = SelectionSet<'static, String>;
pub type QueryField = Field<'static, String>;
pub type QueryFragment = FragmentDefinition<'static, String>;
pub type QueryValue = Value<'static, String>;
pub type QueryDirective = Directive<'static, String>;

/// Compact single-line rendering of a selection set, braces included.
/// This is the textual form carried by plan operations and sent to
/// locations.
pub fn print_selection_set(items: &[QuerySelection]) -> String {
    let mut out = String::new();
    write_selection_set(&mut out, items);
    out
}

fn write_selection_set(out: &mut String, items: &[QuerySelection]) {
    out.push('{');
    for (index, item) in items.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        write_selection(out, item);
    }
    out.push('}');
}

fn write_selection(out: &mut String, selection: &QuerySelection) {
    match selection {
        Selection::Field(field) => {
            if let Some(alias) = &field.alias {
                out.push_str(alias);
                out.push_str(": ");
            }
            out.push_str(&field.name);
            if !field.arguments.is_empty() {
                out.push('(');
                for (index, (name, value)) in field.arguments.iter().enumerate() {
                    if index > 0 {
                        out.push_str(", ");
                    }
                    out.push_str(name);
                    out.push_str(": ");
                    write_value(out, value);
                }
                out.push(')');
            }
            for directive in &field.directives {
                out.push(' ');
                write_directive(out, directive);
            }
            if !field.selection_set.items.is_empty() {
                write_selection_set(out, &field.selection_set.items);
            }
        }
        Selection::InlineFragment(fragment) => {
            out.push_str("...");
            if let Some(TypeCondition::On(type_name)) = &fragment.type_condition {
                out.push_str(" on ");
                out.push_str(type_name);
            }
            for directive in &fragment.directives {
                out.push(' ');
                write_directive(out, directive);
            }
            write_selection_set(out, &fragment.selection_set.items);
        }
        Selection::FragmentSpread(spread) => {
            // Spreads are inlined before planning; this arm only matters for
            // printing raw client documents.
            out.push_str("...");
            out.push_str(&spread.fragment_name);
        }
    }
}

fn write_directive(out: &mut String, directive: &QueryDirective) {
    out.push('@');
    out.push_str(&directive.name);
    if !directive.arguments.is_empty() {
        out.push('(');
        for (index, (name, value)) in directive.arguments.iter().enumerate() {
            if index > 0 {
                out.push_str(", ");
            }
            out.push_str(name);
            out.push_str(": ");
            write_value(out, value);
        }
        out.push(')');
    }
}

fn write_value(out: &mut String, value: &QueryValue) {
    match value {
        Value::Variable(name) => {
            out.push('$');
            out.push_str(name);
        }
        Value::Int(number) => {
            if let Some(int) = number.as_i64() {
                out.push_str(&int.to_string());
            }
        }
        Value::Float(float) => out.push_str(&float.to_string()),
        Value::String(string) => {
            // JSON string escaping is a subset of GraphQL's.
            out.push_str(&serde_json::Value::String(string.clone()).to_string());
        }
        Value::Boolean(boolean) => out.push_str(if *boolean { "true" } else { "false" }),
        Value::Null => out.push_str("null"),
        Value::Enum(name) => out.push_str(name),
        Value::List(items) => {
            out.push('[');
            for (index, item) in items.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::Object(map) => {
            out.push('{');
            for (index, (key, item)) in map.iter().enumerate() {
                if index > 0 {
                    out.push_str(", ");
                }
                out.push_str(key);
                out.push_str(": ");
                write_value(out, item);
            }
            out.push('}');
        }
    }
}

pub fn print_directives(directives: &[QueryDirective]) -> String {
    let mut out = String::new();
    for (index, directive) in directives.iter().enumerate() {
        if index > 0 {
            out.push(' ');
        }
        write_directive(&mut out, directive);
    }
    out
}

pub fn print_type(ty: &Type<'static, String>) -> String {
    ty.to_string()
}

/// Response key of a field selection: its alias when present, its name
/// otherwise.
pub fn response_key(field: &QueryField) -> &str {
    field.alias.as_deref().unwrap_or(&field.name)
}

/// Collects `$variable` references from a value into `out`.
pub fn collect_value_variables(value: &QueryValue, out: &mut BTreeSet<String>) {
    match value {
        Value::Variable(name) => {
            out.insert(name.clone());
        }
        Value::List(items) => {
            for item in items {
                collect_value_variables(item, out);
            }
        }
        Value::Object(map) => {
            for item in map.values() {
                collect_value_variables(item, out);
            }
        }
        _ => {}
    }
}

/// Collects variable references from a field's arguments and directives.
pub fn collect_field_variables(field: &QueryField, out: &mut BTreeSet<String>) {
    for (_, value) in &field.arguments {
        collect_value_variables(value, out);
    }
    for directive in &field.directives {
        for (_, value) in &directive.arguments {
            collect_value_variables(value, out);
        }
    }
}

pub fn collect_directive_variables(directives: &[QueryDirective], out: &mut BTreeSet<String>) {
    for directive in directives {
        for (_, value) in &directive.arguments {
            collect_value_variables(value, out);
        }
    }
}

/// Collects variable references from an entire selection tree.
pub fn collect_tree_variables(items: &[QuerySelection], out: &mut BTreeSet<String>) {
    for item in items {
        match item {
            Selection::Field(field) => {
                collect_field_variables(field, out);
                collect_tree_variables(&field.selection_set.items, out);
            }
            Selection::InlineFragment(fragment) => {
                collect_directive_variables(&fragment.directives, out);
                collect_tree_variables(&fragment.selection_set.items, out);
            }
            Selection::FragmentSpread(spread) => {
                collect_directive_variables(&spread.directives, out);
            }
        }
    }
}

pub fn empty_selection_set() -> QuerySelectionSet {
    SelectionSet {
        span: (Pos::default(), Pos::default()),
        items: vec![],
    }
}

pub fn selection_set_of(items: Vec<QuerySelection>) -> QuerySelectionSet {
    SelectionSet {
        span: (Pos::default(), Pos::default()),
        items,
    }
}

/// Builds a plain field selection with no arguments, for injected exports.
pub fn synthetic_field(alias: Option<&str>, name: &str, items: Vec<QuerySelection>) -> QuerySelection {
    Selection::Field(Field {
        position: Pos::default(),
        alias: alias.map(|a| a.to_string()),
        name: name.to_string(),
        arguments: vec![],
        directives: vec![],
        selection_set: selection_set_of(items),
    })
}

pub fn inline_fragment_on(type_name: &str, items: Vec<QuerySelection>) -> QuerySelection {
    Selection::InlineFragment(InlineFragment {
        position: Pos::default(),
        type_condition: Some(TypeCondition::On(type_name.to_string())),
        directives: vec![],
        selection_set: selection_set_of(items),
    })
}
