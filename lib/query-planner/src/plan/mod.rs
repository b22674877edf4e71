use std::collections::BTreeMap;
use std::fmt::{Display, Formatter, Result as FmtResult};

use serde::{Deserialize, Serialize};

use crate::supergraph::BoundaryQuery;

mod builder;
mod error;

pub use builder::Planner;
pub use error::PlanError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Query,
    Mutation,
}

impl Display for OperationKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            OperationKind::Query => write!(f, "query"),
            OperationKind::Mutation => write!(f, "mutation"),
        }
    }
}

/// One per-location operation within a plan. Root and boundary operations
/// share this shape; consumers branch on `boundary` and `if_type`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PlanOperation {
    /// 1-based unique id within the plan.
    pub step: usize,
    /// Step that must complete before this operation runs; 0 for roots.
    pub after: usize,
    pub location: String,
    pub operation_type: OperationKind,
    /// Textual selection set, braces included.
    pub selection_set: String,
    /// Declared variables referenced by this selection, `name -> type`.
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub variables: BTreeMap<String, String>,
    /// Response-key path into `data` at which this selection is rooted.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub path: Vec<String>,
    /// Concrete `__typename` required at `path` for this operation to run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub if_type: Option<String>,
    /// Present iff this operation fulfills a merged type via a boundary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boundary: Option<BoundaryQuery>,
}

/// An ordered DAG of per-location operations. Serializable so plans can
/// round-trip through an external cache keyed by request digest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    pub ops: Vec<PlanOperation>,
}

impl Plan {
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).expect("plan serialization is infallible")
    }

    pub fn from_json(json: &str) -> Result<Plan, serde_json::Error> {
        serde_json::from_str(json)
    }
}

impl Display for Plan {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        writeln!(f, "Plan {{")?;
        for op in &self.ops {
            write!(
                f,
                "  {} {}(location: \"{}\", after: {})",
                op.step, op.operation_type, op.location, op.after
            )?;
            if let Some(if_type) = &op.if_type {
                write!(f, " on {}", if_type)?;
            }
            if !op.path.is_empty() {
                write!(f, " at {}", op.path.join("."))?;
            }
            writeln!(f, " {}", op.selection_set)?;
        }
        write!(f, "}}")
    }
}
