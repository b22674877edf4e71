use std::collections::{BTreeMap, BTreeSet};

use graphql_parser::schema::{
    EnumType, Field, InputObjectType, InterfaceType, ObjectType, TypeDefinition, UnionType,
};

use super::error::CompositionError;
use crate::supergraph::SupergraphConfig;

type FieldsByTypeAndLocation = BTreeMap<String, BTreeMap<String, BTreeSet<String>>>;

pub(crate) fn merge_type_group(
    merged_name: &str,
    members: &[(&str, &TypeDefinition<'static, String>)],
    config: &SupergraphConfig,
    fields_by_type_and_location: &mut FieldsByTypeAndLocation,
) -> Result<TypeDefinition<'static, String>, CompositionError> {
    let first_kind = std::mem::discriminant(members[0].1);
    if members
        .iter()
        .any(|(_, def)| std::mem::discriminant(*def) != first_kind)
    {
        return Err(CompositionError::TypeKindConflict(merged_name.to_string()));
    }

    match members[0].1 {
        TypeDefinition::Object(_) => {
            let objects: Vec<(&str, &ObjectType<'static, String>)> = members
                .iter()
                .filter_map(|(loc, def)| match def {
                    TypeDefinition::Object(obj) => Some((*loc, obj)),
                    _ => None,
                })
                .collect();
            merge_objects(merged_name, &objects, config, fields_by_type_and_location)
                .map(TypeDefinition::Object)
        }
        TypeDefinition::Interface(_) => {
            let interfaces: Vec<(&str, &InterfaceType<'static, String>)> = members
                .iter()
                .filter_map(|(loc, def)| match def {
                    TypeDefinition::Interface(iface) => Some((*loc, iface)),
                    _ => None,
                })
                .collect();
            merge_interfaces(merged_name, &interfaces, config, fields_by_type_and_location)
                .map(TypeDefinition::Interface)
        }
        TypeDefinition::Union(_) => {
            let unions: Vec<&UnionType<'static, String>> = members
                .iter()
                .filter_map(|(_, def)| match def {
                    TypeDefinition::Union(u) => Some(u),
                    _ => None,
                })
                .collect();
            Ok(TypeDefinition::Union(merge_unions(merged_name, &unions)))
        }
        TypeDefinition::Enum(_) => {
            let enums: Vec<&EnumType<'static, String>> = members
                .iter()
                .filter_map(|(_, def)| match def {
                    TypeDefinition::Enum(e) => Some(e),
                    _ => None,
                })
                .collect();
            Ok(TypeDefinition::Enum(merge_enums(merged_name, &enums)))
        }
        TypeDefinition::InputObject(_) => {
            let inputs: Vec<&InputObjectType<'static, String>> = members
                .iter()
                .filter_map(|(_, def)| match def {
                    TypeDefinition::InputObject(i) => Some(i),
                    _ => None,
                })
                .collect();
            merge_inputs(merged_name, &inputs).map(TypeDefinition::InputObject)
        }
        TypeDefinition::Scalar(scalar) => {
            let mut merged = scalar.clone();
            merged.name = merged_name.to_string();
            Ok(TypeDefinition::Scalar(merged))
        }
    }
}

fn has_stitch_directive(field: &Field<'static, String>, config: &SupergraphConfig) -> bool {
    field
        .directives
        .iter()
        .any(|d| d.name == config.directive_name)
}

fn strip_stitch_directives(
    field: &Field<'static, String>,
    config: &SupergraphConfig,
) -> Field<'static, String> {
    let mut cloned = field.clone();
    cloned
        .directives
        .retain(|d| d.name != config.directive_name);
    cloned
}

fn arguments_match(a: &Field<'static, String>, b: &Field<'static, String>) -> bool {
    if a.arguments.len() != b.arguments.len() {
        return false;
    }
    a.arguments.iter().all(|arg| {
        b.arguments
            .iter()
            .any(|other| other.name == arg.name && other.value_type == arg.value_type)
    })
}

fn merge_field_lists(
    merged_name: &str,
    fields_per_location: &[(&str, &[Field<'static, String>])],
    config: &SupergraphConfig,
    fields_by_type_and_location: &mut FieldsByTypeAndLocation,
) -> Result<Vec<Field<'static, String>>, CompositionError> {
    let is_root = merged_name == config.query_name || merged_name == config.mutation_name;
    let mut merged: Vec<Field<'static, String>> = Vec::new();
    let mut stitch_entry_points: BTreeSet<String> = BTreeSet::new();

    for (location, fields) in fields_per_location {
        let location_fields = fields_by_type_and_location
            .entry(merged_name.to_string())
            .or_default()
            .entry(location.to_string())
            .or_default();
        for field in *fields {
            location_fields.insert(field.name.clone());
            if is_root && has_stitch_directive(field, config) {
                stitch_entry_points.insert(field.name.clone());
            }
            match merged.iter().find(|f| f.name == field.name) {
                None => merged.push(strip_stitch_directives(field, config)),
                Some(existing) => {
                    let identical = existing.field_type == field.field_type
                        && arguments_match(existing, field);
                    if identical {
                        continue;
                    }
                    if is_root && stitch_entry_points.contains(&field.name) {
                        // Boundary entry points may legitimately differ per
                        // location (scalar vs list lookup); the first
                        // declaration wins in the merged schema.
                        continue;
                    }
                    return Err(if is_root {
                        CompositionError::RootFieldConflict {
                            type_name: merged_name.to_string(),
                            field: field.name.clone(),
                        }
                    } else {
                        CompositionError::FieldTypeConflict {
                            type_name: merged_name.to_string(),
                            field: field.name.clone(),
                        }
                    });
                }
            }
        }
    }
    Ok(merged)
}

fn merge_objects(
    merged_name: &str,
    objects: &[(&str, &ObjectType<'static, String>)],
    config: &SupergraphConfig,
    fields_by_type_and_location: &mut FieldsByTypeAndLocation,
) -> Result<ObjectType<'static, String>, CompositionError> {
    let fields_per_location: Vec<(&str, &[Field<'static, String>])> = objects
        .iter()
        .map(|(loc, obj)| (*loc, obj.fields.as_slice()))
        .collect();
    let fields = merge_field_lists(
        merged_name,
        &fields_per_location,
        config,
        fields_by_type_and_location,
    )?;

    let mut implements: Vec<String> = Vec::new();
    for (_, obj) in objects {
        for interface in &obj.implements_interfaces {
            if !implements.contains(interface) {
                implements.push(interface.clone());
            }
        }
    }

    let mut merged = objects[0].1.clone();
    merged.name = merged_name.to_string();
    merged.description = objects.iter().find_map(|(_, o)| o.description.clone());
    merged.fields = fields;
    merged.implements_interfaces = implements;
    merged.directives = vec![];
    Ok(merged)
}

fn merge_interfaces(
    merged_name: &str,
    interfaces: &[(&str, &InterfaceType<'static, String>)],
    config: &SupergraphConfig,
    fields_by_type_and_location: &mut FieldsByTypeAndLocation,
) -> Result<InterfaceType<'static, String>, CompositionError> {
    let fields_per_location: Vec<(&str, &[Field<'static, String>])> = interfaces
        .iter()
        .map(|(loc, iface)| (*loc, iface.fields.as_slice()))
        .collect();
    let fields = merge_field_lists(
        merged_name,
        &fields_per_location,
        config,
        fields_by_type_and_location,
    )?;

    let mut merged = interfaces[0].1.clone();
    merged.name = merged_name.to_string();
    merged.description = interfaces.iter().find_map(|(_, i)| i.description.clone());
    merged.fields = fields;
    merged.directives = vec![];
    Ok(merged)
}

fn merge_unions(
    merged_name: &str,
    unions: &[&UnionType<'static, String>],
) -> UnionType<'static, String> {
    let mut members: Vec<String> = Vec::new();
    for union_type in unions {
        for member in &union_type.types {
            if !members.contains(member) {
                members.push(member.clone());
            }
        }
    }
    let mut merged = unions[0].clone();
    merged.name = merged_name.to_string();
    merged.types = members;
    merged.directives = vec![];
    merged
}

fn merge_enums(merged_name: &str, enums: &[&EnumType<'static, String>]) -> EnumType<'static, String> {
    let mut merged = enums[0].clone();
    merged.name = merged_name.to_string();
    merged.directives = vec![];
    for enum_type in &enums[1..] {
        for value in &enum_type.values {
            if !merged.values.iter().any(|v| v.name == value.name) {
                merged.values.push(value.clone());
            }
        }
    }
    merged
}

fn merge_inputs(
    merged_name: &str,
    inputs: &[&InputObjectType<'static, String>],
) -> Result<InputObjectType<'static, String>, CompositionError> {
    let first = inputs[0];
    for input in &inputs[1..] {
        let structurally_identical = first.fields.len() == input.fields.len()
            && first.fields.iter().all(|field| {
                input.fields.iter().any(|other| {
                    other.name == field.name
                        && other.value_type == field.value_type
                        && other.default_value == field.default_value
                })
            });
        if !structurally_identical {
            return Err(CompositionError::InputTypeMismatch(merged_name.to_string()));
        }
    }
    let mut merged = first.clone();
    merged.name = merged_name.to_string();
    merged.directives = vec![];
    Ok(merged)
}
