use std::collections::BTreeMap;
use std::sync::Once;

use lazy_static::lazy_static;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::compose::compose;
use crate::plan::{Plan, Planner};
use crate::request::Request;
use crate::supergraph::Supergraph;
use crate::utils::parsing::{parse_operation, parse_schema};

fn init_test_logger_internal() {
    let tree_layer = tracing_tree::HierarchicalLayer::new(2)
        .with_bracketed_fields(true)
        .with_indent_lines(true)
        .with_targets(false);

    tracing_subscriber::registry()
        .with(tree_layer)
        .with(EnvFilter::from_default_env())
        .init();
}

lazy_static! {
    static ref TRACING_INIT: Once = Once::new();
}

pub fn init_logger() {
    TRACING_INIT.call_once(init_test_logger_internal);
}

pub fn compose_locations(locations: &[(&str, &str)]) -> Supergraph {
    let schemas: BTreeMap<String, _> = locations
        .iter()
        .map(|(name, sdl)| (name.to_string(), parse_schema(sdl)))
        .collect();
    compose(&schemas).expect("composition failed")
}

pub fn plan_request(supergraph: &Supergraph, query: &str) -> Plan {
    let mut request = Request::new(parse_operation(query), None, serde_json::Map::new());
    request.prepare().expect("prepare failed");
    Planner::plan(supergraph, &request).expect("planning failed")
}

pub const WIDGETS_SDL: &str = r#"
type Widget { id: ID! }
type Query { widget: Widget }
type Mutation { makeWidget: Widget }
"#;

pub const SPROCKETS_SDL: &str = r#"
type Sprocket { id: ID! }
type Query { sprocket: Sprocket }
type Mutation { makeSprocket: Sprocket }
"#;

pub const PRODUCTS_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type Product { id: ID! name: String! }
type Query { product(id: ID!): Product @stitch(key: "id") }
"#;

pub const SHIPPING_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type Product { id: ID! weight: Int! }
type Query { products(ids: [ID!]!): [Product]! @stitch(key: "id") }
"#;

pub const FRUITS_BASE_SDL: &str = r#"
type Apple { id: ID! extensions: AppleExtension }
type Banana { id: ID! extensions: BananaExtension }
union Fruit = Apple | Banana
type AppleExtension { id: ID! }
type BananaExtension { id: ID! }
type Query { fruits(ids: [ID!]!): [Fruit]! }
"#;

pub const FRUITS_EXA_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type AppleExtension { id: ID! color: String }
type Query { appleExtension(id: ID!): AppleExtension @stitch(key: "id") }
"#;

pub const FRUITS_EXB_SDL: &str = r#"
directive @stitch(key: String!) repeatable on FIELD_DEFINITION
type BananaExtension { id: ID! shape: String }
type Query { bananaExtension(id: ID!): BananaExtension @stitch(key: "id") }
"#;

pub const ALPHA_SDL: &str = r#"
type AThing { name: String }
type Query { a: AThing }
"#;
