use std::any::Any;
use std::collections::BTreeMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use graphql_parser::query::{
    Definition, Directive, FragmentDefinition, InlineFragment, OperationDefinition, ParseError,
    Selection, SelectionSet, TypeCondition, VariableDefinition,
};
use rustc_hash::FxHasher;

use crate::ast;
use crate::plan::{OperationKind, PlanError};

pub type QueryDocument = graphql_parser::query::Document<'static, String>;

/// Opaque caller context, threaded through planning into each location call.
pub type RequestContext = Arc<dyn Any + Send + Sync>;

/// A parsed, normalized client request. `prepare` inlines fragment spreads
/// so the planner and executor only ever see fields and inline fragments.
pub struct Request {
    pub document: QueryDocument,
    pub operation_name: Option<String>,
    pub variables: serde_json::Map<String, serde_json::Value>,
    pub context: Option<RequestContext>,
    digest: String,
    prepared: bool,
}

impl Request {
    pub fn new(
        document: QueryDocument,
        operation_name: Option<String>,
        variables: serde_json::Map<String, serde_json::Value>,
    ) -> Self {
        let digest = compute_digest(&document.to_string(), operation_name.as_deref());
        Request {
            document,
            operation_name,
            variables,
            context: None,
            digest,
            prepared: false,
        }
    }

    pub fn parse(
        query: &str,
        operation_name: Option<String>,
        variables: serde_json::Map<String, serde_json::Value>,
    ) -> Result<Self, ParseError> {
        let document = crate::utils::parsing::try_parse_operation(query)?;
        let digest = compute_digest(query, operation_name.as_deref());
        Ok(Request {
            document,
            operation_name,
            variables,
            context: None,
            digest,
            prepared: false,
        })
    }

    pub fn with_context(mut self, context: RequestContext) -> Self {
        self.context = Some(context);
        self
    }

    /// Stable cache key for the plan produced from this request.
    pub fn digest(&self) -> &str {
        &self.digest
    }

    /// Inlines named fragment spreads into inline fragments, in place.
    /// Idempotent; called once before planning.
    pub fn prepare(&mut self) -> Result<(), PlanError> {
        if self.prepared {
            return Ok(());
        }
        let fragments: BTreeMap<String, FragmentDefinition<'static, String>> = self
            .document
            .definitions
            .iter()
            .filter_map(|def| match def {
                Definition::Fragment(fragment) => {
                    Some((fragment.name.clone(), fragment.clone()))
                }
                _ => None,
            })
            .collect();

        for definition in &mut self.document.definitions {
            if let Definition::Operation(op) = definition {
                let selection_set = match op {
                    OperationDefinition::SelectionSet(set) => set,
                    OperationDefinition::Query(query) => &mut query.selection_set,
                    OperationDefinition::Mutation(mutation) => &mut mutation.selection_set,
                    OperationDefinition::Subscription(subscription) => {
                        &mut subscription.selection_set
                    }
                };
                inline_spreads(selection_set, &fragments, &mut Vec::new())?;
            }
        }
        self.prepared = true;
        Ok(())
    }

    /// Resolves the operation this request executes.
    pub fn operation(&self) -> Result<OperationView<'_>, PlanError> {
        let operations: Vec<&OperationDefinition<'static, String>> = self
            .document
            .definitions
            .iter()
            .filter_map(|def| match def {
                Definition::Operation(op) => Some(op),
                _ => None,
            })
            .collect();

        let chosen = match &self.operation_name {
            Some(name) => operations
                .iter()
                .find(|op| operation_name(op) == Some(name.as_str()))
                .ok_or_else(|| PlanError::OperationNotFound(name.clone()))?,
            None => match operations.len() {
                0 => return Err(PlanError::NoOperations),
                1 => &operations[0],
                _ => return Err(PlanError::OperationNameRequired),
            },
        };

        OperationView::try_from_definition(chosen)
    }
}

fn operation_name<'a>(op: &'a OperationDefinition<'static, String>) -> Option<&'a str> {
    match op {
        OperationDefinition::SelectionSet(_) => None,
        OperationDefinition::Query(query) => query.name.as_deref(),
        OperationDefinition::Mutation(mutation) => mutation.name.as_deref(),
        OperationDefinition::Subscription(subscription) => subscription.name.as_deref(),
    }
}

fn compute_digest(document_text: &str, operation_name: Option<&str>) -> String {
    let mut hasher = FxHasher::default();
    document_text.hash(&mut hasher);
    operation_name.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn inline_spreads(
    set: &mut SelectionSet<'static, String>,
    fragments: &BTreeMap<String, FragmentDefinition<'static, String>>,
    stack: &mut Vec<String>,
) -> Result<(), PlanError> {
    let items = std::mem::take(&mut set.items);
    let mut inlined = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Selection::FragmentSpread(spread) => {
                let fragment = fragments
                    .get(&spread.fragment_name)
                    .ok_or_else(|| PlanError::MissingFragment(spread.fragment_name.clone()))?;
                if stack.contains(&spread.fragment_name) {
                    return Err(PlanError::CyclicFragment(spread.fragment_name.clone()));
                }
                stack.push(spread.fragment_name.clone());
                let mut fragment_set = fragment.selection_set.clone();
                inline_spreads(&mut fragment_set, fragments, stack)?;
                stack.pop();
                let TypeCondition::On(condition) = fragment.type_condition.clone();
                inlined.push(Selection::InlineFragment(InlineFragment {
                    position: spread.position,
                    type_condition: Some(TypeCondition::On(condition)),
                    directives: spread.directives,
                    selection_set: fragment_set,
                }));
            }
            Selection::Field(mut field) => {
                inline_spreads(&mut field.selection_set, fragments, stack)?;
                inlined.push(Selection::Field(field));
            }
            Selection::InlineFragment(mut fragment) => {
                inline_spreads(&mut fragment.selection_set, fragments, stack)?;
                inlined.push(Selection::InlineFragment(fragment));
            }
        }
    }
    set.items = inlined;
    Ok(())
}

/// Borrowed view over the chosen operation, uniform across the parser's
/// operation shapes.
pub struct OperationView<'a> {
    pub kind: OperationKind,
    pub name: Option<&'a str>,
    pub variable_definitions: &'a [VariableDefinition<'static, String>],
    pub directives: &'a [Directive<'static, String>],
    pub selection_set: &'a SelectionSet<'static, String>,
}

impl<'a> OperationView<'a> {
    fn try_from_definition(
        op: &'a OperationDefinition<'static, String>,
    ) -> Result<Self, PlanError> {
        match op {
            OperationDefinition::SelectionSet(set) => Ok(OperationView {
                kind: OperationKind::Query,
                name: None,
                variable_definitions: &[],
                directives: &[],
                selection_set: set,
            }),
            OperationDefinition::Query(query) => Ok(OperationView {
                kind: OperationKind::Query,
                name: query.name.as_deref(),
                variable_definitions: &query.variable_definitions,
                directives: &query.directives,
                selection_set: &query.selection_set,
            }),
            OperationDefinition::Mutation(mutation) => Ok(OperationView {
                kind: OperationKind::Mutation,
                name: mutation.name.as_deref(),
                variable_definitions: &mutation.variable_definitions,
                directives: &mutation.directives,
                selection_set: &mutation.selection_set,
            }),
            OperationDefinition::Subscription(_) => Err(PlanError::SubscriptionUnsupported),
        }
    }

    /// Declared variables as `name -> printed type`.
    pub fn variable_types(&self) -> BTreeMap<String, String> {
        self.variable_definitions
            .iter()
            .map(|def| (def.name.clone(), ast::print_type(&def.var_type)))
            .collect()
    }

    /// Operation directives rendered verbatim, forwarded to sub-queries.
    pub fn printed_directives(&self) -> Option<String> {
        if self.directives.is_empty() {
            None
        } else {
            Some(ast::print_directives(self.directives))
        }
    }
}
