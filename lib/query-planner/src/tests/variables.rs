use std::collections::BTreeMap;

use crate::plan::Planner;
use crate::request::Request;
use crate::tests::testkit::{compose_locations, init_logger, PRODUCTS_SDL, SHIPPING_SDL};
use crate::utils::parsing::parse_operation;

#[test]
fn scopes_variables_to_the_operations_that_reference_them() {
    init_logger();
    let supergraph = compose_locations(&[("products", PRODUCTS_SDL), ("shipping", SHIPPING_SDL)]);
    let mut request = Request::new(
        parse_operation(
            "query Lookup($id: ID!, $unused: Int) { product(id: $id) { name weight } }",
        ),
        None,
        serde_json::Map::new(),
    );
    request.prepare().unwrap();
    let plan = Planner::plan(&supergraph, &request).unwrap();

    assert_eq!(plan.ops.len(), 2);
    let root = &plan.ops[0];
    assert_eq!(
        root.variables,
        BTreeMap::from([("id".to_string(), "ID!".to_string())])
    );
    assert_eq!(
        root.selection_set,
        "{product(id: $id){name _STITCH_id: id _STITCH_typename: __typename}}"
    );

    // The boundary op references no client variables at all.
    let boundary = &plan.ops[1];
    assert!(boundary.variables.is_empty());

    // Declared-variable scoping holds for every op.
    let declared = request.operation().unwrap().variable_types();
    for op in &plan.ops {
        for name in op.variables.keys() {
            assert!(declared.contains_key(name));
        }
    }
}

#[test]
fn forwards_operation_directives_verbatim() {
    init_logger();
    let supergraph = compose_locations(&[("products", PRODUCTS_SDL), ("shipping", SHIPPING_SDL)]);
    let mut request = Request::new(
        parse_operation(r#"query Tagged @tag(name: "checkout") { product(id: "1") { name } }"#),
        None,
        serde_json::Map::new(),
    );
    request.prepare().unwrap();
    let view = request.operation().unwrap();
    assert_eq!(
        view.printed_directives().as_deref(),
        Some(r#"@tag(name: "checkout")"#)
    );
}
