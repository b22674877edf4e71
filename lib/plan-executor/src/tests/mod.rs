use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use serde_json::json;

use stitch_router_query_planner::compose::compose;
use stitch_router_query_planner::plan::{Plan, Planner};
use stitch_router_query_planner::request::Request;
use stitch_router_query_planner::supergraph::Supergraph;
use stitch_router_query_planner::utils::parsing::{parse_operation, parse_schema};

use crate::executors::common::LocationExecutor;
use crate::executors::map::LocationExecutorMap;
use crate::{resolve_origins, ExecutionError, Executor, GraphQLError};

use fixtures::{data_response, response_with_errors, BrokenLocation, ScriptedLocation};

mod fixtures;

fn supergraph(locations: &[(&str, &str)]) -> Supergraph {
    let schemas: BTreeMap<String, _> = locations
        .iter()
        .map(|(name, sdl)| (name.to_string(), parse_schema(sdl)))
        .collect();
    compose(&schemas).expect("composition failed")
}

fn plan_for(supergraph: &Supergraph, query: &str) -> (Request, Plan) {
    let mut request = Request::new(parse_operation(query), None, serde_json::Map::new());
    request.prepare().expect("prepare failed");
    let plan = Planner::plan(supergraph, &request).expect("planning failed");
    (request, plan)
}

const WIDGETS_SDL: &str = r#"
type Widget { id: ID! }
type Query { widget: Widget }
type Mutation { makeWidget: Widget }
"#;

const SPROCKETS_SDL: &str = r#"
type Sprocket { id: ID! }
type Query { sprocket: Sprocket }
type Mutation { makeSprocket: Sprocket }
"#;

const PRODUCTS_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type Product { id: ID! name: String! }
type Query { product(id: ID!): Product @stitch(key: "id") }
"#;

const SHIPPING_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type Product { id: ID! weight: Int! }
type Query { products(ids: [ID!]!): [Product]! @stitch(key: "id") }
"#;

#[test]
fn merges_parallel_location_results() {
    let supergraph = supergraph(&[("widgets", WIDGETS_SDL), ("sprockets", SPROCKETS_SDL)]);
    let (request, plan) = plan_for(
        &supergraph,
        "{ a: widget { id } b: sprocket { id } c: widget { id } d: sprocket { id } }",
    );

    let widgets = ScriptedLocation::new("widgets").respond(
        "a: widget",
        data_response(json!({"a": {"id": "w1"}, "c": {"id": "w3"}})),
    );
    let sprockets = ScriptedLocation::new("sprockets").respond(
        "b: sprocket",
        data_response(json!({"b": {"id": "s2"}, "d": {"id": "s4"}})),
    );
    let widget_calls = widgets.calls();
    let sprocket_calls = sprockets.calls();

    let mut executors = LocationExecutorMap::new();
    executors.insert_boxed_arc("widgets".to_string(), widgets.to_boxed_arc());
    executors.insert_boxed_arc("sprockets".to_string(), sprockets.to_boxed_arc());

    let result = tokio_test::block_on(
        Executor::new(&supergraph, &executors).execute(&request, &plan),
    )
    .unwrap();

    assert_eq!(
        result.data,
        Some(json!({
            "a": {"id": "w1"},
            "b": {"id": "s2"},
            "c": {"id": "w3"},
            "d": {"id": "s4"}
        }))
    );
    assert_eq!(result.errors, None);
    assert_eq!(widget_calls.lock().unwrap().len(), 1);
    assert_eq!(sprocket_calls.lock().unwrap().len(), 1);
}

#[test]
fn fetches_boundary_fields_in_one_batched_call() {
    let supergraph = supergraph(&[("products", PRODUCTS_SDL), ("shipping", SHIPPING_SDL)]);
    let (request, plan) = plan_for(&supergraph, r#"{ product(id: "1") { name weight } }"#);

    let products = ScriptedLocation::new("products").respond(
        r#"product(id: "1")"#,
        data_response(json!({
            "product": {"name": "Widget", "_STITCH_id": "1", "_STITCH_typename": "Product"}
        })),
    );
    let shipping = ScriptedLocation::new("shipping").respond(
        "_0_result",
        data_response(json!({"_0_result": [{"weight": 2}]})),
    );
    let shipping_calls = shipping.calls();

    let mut executors = LocationExecutorMap::new();
    executors.insert_boxed_arc("products".to_string(), products.to_boxed_arc());
    executors.insert_boxed_arc("shipping".to_string(), shipping.to_boxed_arc());

    let result = tokio_test::block_on(
        Executor::new(&supergraph, &executors).execute(&request, &plan),
    )
    .unwrap();

    assert_eq!(
        result.data,
        Some(json!({"product": {"name": "Widget", "weight": 2}}))
    );
    assert_eq!(result.errors, None);

    // One batched call, list-keyed, with the exported key collected from
    // the products response.
    let calls = shipping_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(
        calls[0],
        r#"query{_0_result: products(ids: ["1"]){weight}}"#
    );
}

#[test]
fn runs_mutations_serially_in_plan_order() {
    let supergraph = supergraph(&[("widgets", WIDGETS_SDL), ("sprockets", SPROCKETS_SDL)]);
    let (request, plan) = plan_for(
        &supergraph,
        "mutation { a: makeWidget { id } b: makeSprocket { id } c: makeSprocket { id } d: makeWidget { id } e: makeWidget { id } }",
    );

    let order_log = Arc::new(Mutex::new(Vec::new()));
    let widgets = ScriptedLocation::new("widgets")
        .with_order_log(order_log.clone())
        .respond(
            "a: makeWidget",
            data_response(json!({"a": {"id": "1"}})),
        )
        .respond(
            "d: makeWidget",
            data_response(json!({"d": {"id": "4"}, "e": {"id": "5"}})),
        );
    let sprockets = ScriptedLocation::new("sprockets")
        .with_order_log(order_log.clone())
        .respond(
            "b: makeSprocket",
            data_response(json!({"b": {"id": "2"}, "c": {"id": "3"}})),
        );

    let mut executors = LocationExecutorMap::new();
    executors.insert_boxed_arc("widgets".to_string(), widgets.to_boxed_arc());
    executors.insert_boxed_arc("sprockets".to_string(), sprockets.to_boxed_arc());

    let result = tokio_test::block_on(
        Executor::new(&supergraph, &executors).execute(&request, &plan),
    )
    .unwrap();

    assert_eq!(
        result.data,
        Some(json!({
            "a": {"id": "1"},
            "b": {"id": "2"},
            "c": {"id": "3"},
            "d": {"id": "4"},
            "e": {"id": "5"}
        }))
    );
    assert_eq!(
        order_log.lock().unwrap().as_slice(),
        &["widgets", "sprockets", "widgets"]
    );
}

const FRUITS_BASE_SDL: &str = r#"
type Apple { id: ID! extensions: AppleExtension }
type Banana { id: ID! extensions: BananaExtension }
union Fruit = Apple | Banana
type AppleExtension { id: ID! }
type BananaExtension { id: ID! }
type Query { fruits(ids: [ID!]!): [Fruit]! }
"#;

const FRUITS_EXA_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type AppleExtension { id: ID! color: String }
type Query { appleExtension(id: ID!): AppleExtension @stitch(key: "id") }
"#;

const FRUITS_EXB_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type BananaExtension { id: ID! shape: String }
type Query { bananaExtension(id: ID!): BananaExtension @stitch(key: "id") }
"#;

#[test]
fn filters_abstract_origins_by_exported_typename() {
    let supergraph = supergraph(&[
        ("base", FRUITS_BASE_SDL),
        ("exa", FRUITS_EXA_SDL),
        ("exb", FRUITS_EXB_SDL),
    ]);
    let (request, plan) = plan_for(
        &supergraph,
        r#"
        {
          fruits(ids: ["1", "2"]) {
            ... on Apple { extensions { color } }
            ... on Banana { extensions { shape } }
          }
        }
        "#,
    );

    let base = ScriptedLocation::new("base").respond(
        "fruits",
        data_response(json!({
            "fruits": [
                {"extensions": {"_STITCH_id": "a1", "_STITCH_typename": "AppleExtension"}},
                {"extensions": {"_STITCH_id": "b1", "_STITCH_typename": "BananaExtension"}}
            ]
        })),
    );
    let exa = ScriptedLocation::new("exa").respond(
        r#"appleExtension(id: "a1")"#,
        data_response(json!({"_0_0_result": {"color": "red"}})),
    );
    let exb = ScriptedLocation::new("exb").respond(
        r#"bananaExtension(id: "b1")"#,
        data_response(json!({"_0_0_result": {"shape": "long"}})),
    );
    let exa_calls = exa.calls();

    let mut executors = LocationExecutorMap::new();
    executors.insert_boxed_arc("base".to_string(), base.to_boxed_arc());
    executors.insert_boxed_arc("exa".to_string(), exa.to_boxed_arc());
    executors.insert_boxed_arc("exb".to_string(), exb.to_boxed_arc());

    let result = tokio_test::block_on(
        Executor::new(&supergraph, &executors).execute(&request, &plan),
    )
    .unwrap();

    assert_eq!(
        result.data,
        Some(json!({
            "fruits": [
                {"extensions": {"color": "red"}},
                {"extensions": {"shape": "long"}}
            ]
        }))
    );

    // Only the apple origin reached exa.
    let calls = exa_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert!(!calls[0].contains("b1"));
}

const ELEMENTS_A_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type Element { id: ID! name: String! }
type Query { elementsA(ids: [ID!]!): [Element]! @stitch(key: "id") }
"#;

const ELEMENTS_B_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type Element { id: ID! code: String! year: Int! }
type Query { elementsB(ids: [ID!]!): [Element]! @stitch(key: "id") }
"#;

#[test]
fn repathes_remote_errors_onto_origin_paths() {
    let supergraph = supergraph(&[("a", ELEMENTS_A_SDL), ("b", ELEMENTS_B_SDL)]);
    let (request, plan) = plan_for(
        &supergraph,
        r#"{ elementsA(ids: ["10", "18", "36"]) { name code year } }"#,
    );

    let location_a = ScriptedLocation::new("a").respond(
        "elementsA",
        data_response(json!({
            "elementsA": [
                {"name": "Neon", "_STITCH_id": "10", "_STITCH_typename": "Element"},
                {"name": "Argon", "_STITCH_id": "18", "_STITCH_typename": "Element"},
                {"name": "Krypton", "_STITCH_id": "36", "_STITCH_typename": "Element"}
            ]
        })),
    );
    let location_b = ScriptedLocation::new("b").respond(
        "elementsB",
        response_with_errors(
            json!({"_0_result": [{"code": "Ne", "year": 1898}, null]}),
            vec![
                GraphQLError {
                    message: "Not found".to_string(),
                    locations: None,
                    path: Some(vec![json!("_0_result"), json!(1)]),
                    extensions: None,
                },
                GraphQLError {
                    message: "Not found".to_string(),
                    locations: None,
                    path: Some(vec![json!("_0_result"), json!(2)]),
                    extensions: None,
                },
            ],
        ),
    );

    let mut executors = LocationExecutorMap::new();
    executors.insert_boxed_arc("a".to_string(), location_a.to_boxed_arc());
    executors.insert_boxed_arc("b".to_string(), location_b.to_boxed_arc());

    let result = tokio_test::block_on(
        Executor::new(&supergraph, &executors).execute(&request, &plan),
    )
    .unwrap();

    let errors = result.errors.expect("remote errors merge into the result");
    assert_eq!(errors.len(), 2);
    assert_eq!(errors[0].path, Some(vec![json!("elementsA"), json!(1)]));
    assert_eq!(errors[1].path, Some(vec![json!("elementsA"), json!(2)]));

    // An explicit null slot nulls the origin; an absent slot keeps what the
    // first location already fetched.
    assert_eq!(
        result.data,
        Some(json!({
            "elementsA": [
                {"name": "Neon", "code": "Ne", "year": 1898},
                null,
                {"name": "Krypton"}
            ]
        }))
    );
}

const ALPHA_SDL: &str = r#"
type AThing { name: String }
type Query { a: AThing }
"#;

#[test]
fn resolves_introspection_locally() {
    let supergraph = supergraph(&[("a", ALPHA_SDL)]);
    let (request, plan) = plan_for(&supergraph, "{ __schema { queryType { name } } a { name } }");

    let alpha = ScriptedLocation::new("a").respond(
        "a{name}",
        data_response(json!({"a": {"name": "ay"}})),
    );
    let alpha_calls = alpha.calls();

    let mut executors = LocationExecutorMap::new();
    executors.insert_boxed_arc("a".to_string(), alpha.to_boxed_arc());

    let result = tokio_test::block_on(
        Executor::new(&supergraph, &executors).execute(&request, &plan),
    )
    .unwrap();

    assert_eq!(
        result.data,
        Some(json!({
            "__schema": {"queryType": {"name": "Query"}},
            "a": {"name": "ay"}
        }))
    );

    // Introspection never leaves the process.
    let calls = alpha_calls.lock().unwrap();
    assert_eq!(calls.len(), 1);
    assert_eq!(calls[0], "query{a{name}}");
}

#[test]
fn aborts_the_request_on_transport_failure() {
    let supergraph = supergraph(&[("widgets", WIDGETS_SDL), ("sprockets", SPROCKETS_SDL)]);
    let (request, plan) = plan_for(&supergraph, "{ a: widget { id } b: sprocket { id } }");

    let widgets = ScriptedLocation::new("widgets").respond(
        "a: widget",
        data_response(json!({"a": {"id": "w1"}})),
    );

    let mut executors = LocationExecutorMap::new();
    executors.insert_boxed_arc("widgets".to_string(), widgets.to_boxed_arc());
    executors.insert_boxed_arc("sprockets".to_string(), BrokenLocation.to_boxed_arc());

    let result = tokio_test::block_on(
        Executor::new(&supergraph, &executors).execute(&request, &plan),
    );
    assert!(matches!(
        result,
        Err(ExecutionError::Transport { location, .. }) if location == "sprockets"
    ));
}

#[test]
fn origin_sets_flatten_lists_and_filter_by_type() {
    let data = json!({
        "shelves": [
            {"books": [
                {"_STITCH_id": "1", "_STITCH_typename": "Book"},
                {"_STITCH_id": "2", "_STITCH_typename": "Magazine"},
                null
            ]},
            {"books": [
                {"_STITCH_id": "3", "_STITCH_typename": "Book"}
            ]}
        ]
    });
    let origins = resolve_origins(
        &data,
        &["shelves".to_string(), "books".to_string()],
        Some("Book"),
        "id",
    );
    assert_eq!(origins.len(), 2);
    assert_eq!(origins[0].key, json!("1"));
    assert_eq!(
        origins[0].json_path,
        vec![json!("shelves"), json!(0), json!("books"), json!(0)]
    );
    assert_eq!(origins[1].key, json!("3"));
    assert_eq!(
        origins[1].json_path,
        vec![json!("shelves"), json!(1), json!("books"), json!(0)]
    );
}

#[test]
fn skips_boundary_calls_when_the_origin_set_is_empty() {
    let supergraph = supergraph(&[("products", PRODUCTS_SDL), ("shipping", SHIPPING_SDL)]);
    let (request, plan) = plan_for(&supergraph, r#"{ product(id: "404") { name weight } }"#);

    // The product is missing entirely, so there is nothing to enrich.
    let products = ScriptedLocation::new("products")
        .respond(r#"product(id: "404")"#, data_response(json!({"product": null})));
    let shipping = ScriptedLocation::new("shipping");
    let shipping_calls = shipping.calls();

    let mut executors = LocationExecutorMap::new();
    executors.insert_boxed_arc("products".to_string(), products.to_boxed_arc());
    executors.insert_boxed_arc("shipping".to_string(), shipping.to_boxed_arc());

    let result = tokio_test::block_on(
        Executor::new(&supergraph, &executors).execute(&request, &plan),
    )
    .unwrap();

    assert_eq!(result.data, Some(json!({"product": null})));
    assert_eq!(shipping_calls.lock().unwrap().len(), 0);
}
