use std::collections::{BTreeMap, BTreeSet, VecDeque};

use graphql_parser::query::{Definition, OperationDefinition, Selection, TypeCondition};
use tracing::{instrument, trace};

use crate::ast::{self, QueryField, QuerySelection};
use crate::plan::{OperationKind, Plan, PlanError, PlanOperation};
use crate::request::Request;
use crate::supergraph::{
    is_introspection_field, named_type, type_is_list, BoundaryQuery, Supergraph, EXPORT_PREFIX,
    RESERVED_ALIAS_PREFIX, SUPERGRAPH_LOCATION, TYPENAME_FIELD,
};

/// Builds a plan for one request against a supergraph. Planning is pure:
/// the same `(supergraph, request)` pair always yields the same plan.
pub struct Planner<'a> {
    supergraph: &'a Supergraph,
    request: &'a Request,
    variable_types: BTreeMap<String, String>,
    ops: Vec<PlanOperation>,
}

impl<'a> Planner<'a> {
    #[instrument(level = "debug", skip_all, fields(digest = %request.digest()))]
    pub fn plan(supergraph: &'a Supergraph, request: &'a Request) -> Result<Plan, PlanError> {
        let view = request.operation()?;
        check_reserved_aliases(request)?;

        let mut planner = Planner {
            supergraph,
            request,
            variable_types: view.variable_types(),
            ops: Vec::new(),
        };
        let root_fields = planner.flatten_fields(view.selection_set.items.clone())?;
        match view.kind {
            OperationKind::Query => planner.plan_query(root_fields)?,
            OperationKind::Mutation => planner.plan_mutation(root_fields)?,
        }
        trace!(ops = planner.ops.len(), "plan built");
        Ok(Plan { ops: planner.ops })
    }

    fn plan_query(&mut self, root_fields: Vec<QueryField>) -> Result<(), PlanError> {
        let root_type = self.supergraph.config.query_name.clone();
        // Non-contiguous selections on the same location coalesce into one
        // operation; independent groups run in parallel.
        let mut groups: Vec<(String, Vec<QueryField>)> = Vec::new();
        let mut previous: Option<String> = None;
        for field in root_fields {
            let location = self.scope_root_field(&root_type, &field, previous.as_deref(), true)?;
            match groups.iter_mut().find(|(loc, _)| *loc == location) {
                Some((_, fields)) => fields.push(field),
                None => groups.push((location.clone(), vec![field])),
            }
            previous = Some(location);
        }
        for (location, fields) in groups {
            self.build_root_op(location, fields, OperationKind::Query, 0)?;
        }
        Ok(())
    }

    fn plan_mutation(&mut self, root_fields: Vec<QueryField>) -> Result<(), PlanError> {
        let root_type = self.supergraph.config.mutation_name.clone();
        // Mutations keep the client's textual order: one operation per
        // contiguous same-location run, chained by `after`.
        let mut groups: Vec<(String, Vec<QueryField>)> = Vec::new();
        for field in root_fields {
            let previous = groups.last().map(|(loc, _)| loc.clone());
            let location = self.scope_root_field(&root_type, &field, previous.as_deref(), false)?;
            match groups.last_mut() {
                Some((loc, fields)) if *loc == location => fields.push(field),
                _ => groups.push((location, vec![field])),
            }
        }
        let mut after = 0;
        for (location, fields) in groups {
            after = self.build_root_op(location, fields, OperationKind::Mutation, after)?;
        }
        Ok(())
    }

    fn scope_root_field(
        &self,
        root_type: &str,
        field: &QueryField,
        previous: Option<&str>,
        is_query: bool,
    ) -> Result<String, PlanError> {
        if is_query && (is_introspection_field(&field.name) || field.name == TYPENAME_FIELD) {
            return Ok(SUPERGRAPH_LOCATION.to_string());
        }
        let candidates = self.supergraph.locations_for_field(root_type, &field.name);
        if candidates.is_empty() {
            return Err(PlanError::FieldNotResolvable {
                type_name: root_type.to_string(),
                field: field.name.clone(),
            });
        }
        if let Some(previous) = previous {
            if candidates.contains(&previous) {
                return Ok(previous.to_string());
            }
        }
        Ok(candidates[0].to_string())
    }

    fn build_root_op(
        &mut self,
        location: String,
        fields: Vec<QueryField>,
        kind: OperationKind,
        after: usize,
    ) -> Result<usize, PlanError> {
        let is_super = location == SUPERGRAPH_LOCATION;
        let location_name = location.clone();
        let index = self.create_op(location, kind, Vec::new(), after, None, None);
        let step = self.ops[index].step;
        let mut vars = BTreeSet::new();
        let selections = if is_super {
            // Introspection selections resolve locally against the merged
            // schema; keep them verbatim.
            let items: Vec<QuerySelection> = fields.into_iter().map(Selection::Field).collect();
            ast::collect_tree_variables(&items, &mut vars);
            items
        } else {
            let root_type = match kind {
                OperationKind::Query => self.supergraph.config.query_name.clone(),
                OperationKind::Mutation => self.supergraph.config.mutation_name.clone(),
            };
            let items: Vec<QuerySelection> = fields.into_iter().map(Selection::Field).collect();
            let mut path = Vec::new();
            self.extract_locale_selections(
                &location_name,
                &root_type,
                items,
                &mut path,
                step,
                &mut vars,
                false,
                false,
            )?
        };
        self.finish_op(index, selections, vars);
        Ok(step)
    }

    fn create_op(
        &mut self,
        location: String,
        kind: OperationKind,
        path: Vec<String>,
        after: usize,
        if_type: Option<String>,
        boundary: Option<BoundaryQuery>,
    ) -> usize {
        let step = self.ops.len() + 1;
        self.ops.push(PlanOperation {
            step,
            after,
            location,
            operation_type: kind,
            selection_set: String::new(),
            variables: BTreeMap::new(),
            path,
            if_type,
            boundary,
        });
        self.ops.len() - 1
    }

    fn finish_op(
        &mut self,
        index: usize,
        selections: Vec<QuerySelection>,
        vars: BTreeSet<String>,
    ) {
        let coalesced = coalesce_selections(selections);
        let printed = ast::print_selection_set(&coalesced);
        let variables: BTreeMap<String, String> = vars
            .iter()
            .filter_map(|name| {
                self.variable_types
                    .get(name)
                    .map(|ty| (name.clone(), ty.clone()))
            })
            .collect();
        let op = &mut self.ops[index];
        op.selection_set = printed;
        op.variables = variables;
    }

    /// Rewrites `input` so everything resolvable at `location` stays inline
    /// and everything else becomes a dependent boundary operation.
    #[allow(clippy::too_many_arguments)]
    fn extract_locale_selections(
        &mut self,
        location: &str,
        parent_type: &str,
        input: Vec<QuerySelection>,
        path: &mut Vec<String>,
        step: usize,
        vars: &mut BTreeSet<String>,
        crosses_list: bool,
        ambiguous: bool,
    ) -> Result<Vec<QuerySelection>, PlanError> {
        if self.supergraph.is_abstract_type(parent_type) {
            return self.extract_abstract_selections(
                location,
                parent_type,
                input,
                path,
                step,
                vars,
                crosses_list,
            );
        }

        let (mut local, remote) = self.split_local_remote(
            location,
            parent_type,
            input,
            path,
            step,
            vars,
            crosses_list,
            ambiguous,
        )?;
        if !remote.is_empty() {
            let if_type = ambiguous.then(|| parent_type.to_string());
            self.delegate(
                location,
                parent_type,
                remote,
                path,
                step,
                &mut local,
                crosses_list,
                if_type,
            )?;
        }
        Ok(local)
    }

    /// Splits `input` (selections on object or interface `parent_type`) into
    /// recursed local selections and raw remote fields.
    #[allow(clippy::too_many_arguments)]
    fn split_local_remote(
        &mut self,
        location: &str,
        parent_type: &str,
        input: Vec<QuerySelection>,
        path: &mut Vec<String>,
        step: usize,
        vars: &mut BTreeSet<String>,
        crosses_list: bool,
        ambiguous: bool,
    ) -> Result<(Vec<QuerySelection>, Vec<QueryField>), PlanError> {
        let fields = self.flatten_fields(input)?;
        let mut local = Vec::new();
        let mut remote = Vec::new();
        for mut field in fields {
            let is_local = field.name == TYPENAME_FIELD
                || self
                    .supergraph
                    .location_provides_field(parent_type, location, &field.name);
            if !is_local {
                remote.push(field);
                continue;
            }
            ast::collect_field_variables(&field, vars);
            if let Some(field_type) = self.supergraph.field_type(parent_type, &field.name) {
                let child_type = named_type(field_type).to_string();
                if self.supergraph.is_composite_type(&child_type)
                    && !field.selection_set.items.is_empty()
                {
                    let child_crosses = crosses_list || type_is_list(field_type);
                    path.push(ast::response_key(&field).to_string());
                    let children = std::mem::take(&mut field.selection_set.items);
                    field.selection_set.items = self.extract_locale_selections(
                        location,
                        &child_type,
                        children,
                        path,
                        step,
                        vars,
                        child_crosses,
                        ambiguous,
                    )?;
                    path.pop();
                }
            }
            local.push(Selection::Field(field));
        }
        Ok((local, remote))
    }

    /// Selections on an abstract type: common fields stay at this level,
    /// per-concrete-type fragments are partitioned individually, and each
    /// concrete type needing off-location fields becomes a typed dependent
    /// operation.
    #[allow(clippy::too_many_arguments)]
    fn extract_abstract_selections(
        &mut self,
        location: &str,
        parent_type: &str,
        input: Vec<QuerySelection>,
        path: &mut Vec<String>,
        step: usize,
        vars: &mut BTreeSet<String>,
        crosses_list: bool,
    ) -> Result<Vec<QuerySelection>, PlanError> {
        let mut direct: Vec<QueryField> = Vec::new();
        let mut by_type: Vec<(String, Vec<QuerySelection>)> = Vec::new();
        self.partition_abstract(parent_type, input, &mut direct, &mut by_type)?;

        let mut out: Vec<QuerySelection> = Vec::new();
        let mut remote_direct: Vec<QueryField> = Vec::new();
        for mut field in direct {
            let is_local = field.name == TYPENAME_FIELD
                || self
                    .supergraph
                    .location_provides_field(parent_type, location, &field.name);
            if !is_local {
                remote_direct.push(field);
                continue;
            }
            ast::collect_field_variables(&field, vars);
            if let Some(field_type) = self.supergraph.field_type(parent_type, &field.name) {
                let child_type = named_type(field_type).to_string();
                if self.supergraph.is_composite_type(&child_type)
                    && !field.selection_set.items.is_empty()
                {
                    let child_crosses = crosses_list || type_is_list(field_type);
                    path.push(ast::response_key(&field).to_string());
                    let children = std::mem::take(&mut field.selection_set.items);
                    field.selection_set.items = self.extract_locale_selections(
                        location,
                        &child_type,
                        children,
                        path,
                        step,
                        vars,
                        child_crosses,
                        true,
                    )?;
                    path.pop();
                }
            }
            out.push(Selection::Field(field));
        }

        // Interface fields unavailable here resolve through each possible
        // concrete type's boundary instead.
        if !remote_direct.is_empty() {
            for type_name in self.supergraph.possible_types(parent_type) {
                let index = match by_type.iter().position(|(name, _)| *name == type_name) {
                    Some(index) => index,
                    None => {
                        by_type.push((type_name.clone(), Vec::new()));
                        by_type.len() - 1
                    }
                };
                by_type[index]
                    .1
                    .extend(remote_direct.iter().cloned().map(Selection::Field));
            }
        }

        for (type_name, selections) in by_type {
            if selections.is_empty() {
                continue;
            }
            let (mut fragment_items, remote) = self.split_local_remote(
                location,
                &type_name,
                selections,
                path,
                step,
                vars,
                crosses_list,
                true,
            )?;
            if !remote.is_empty() {
                self.delegate(
                    location,
                    &type_name,
                    remote,
                    path,
                    step,
                    &mut fragment_items,
                    crosses_list,
                    Some(type_name.clone()),
                )?;
            }
            if !fragment_items.is_empty() {
                out.push(ast::inline_fragment_on(&type_name, fragment_items));
            }
        }
        Ok(out)
    }

    fn partition_abstract(
        &self,
        parent_type: &str,
        input: Vec<QuerySelection>,
        direct: &mut Vec<QueryField>,
        by_type: &mut Vec<(String, Vec<QuerySelection>)>,
    ) -> Result<(), PlanError> {
        for item in input {
            match item {
                Selection::Field(field) => direct.push(field),
                Selection::InlineFragment(mut fragment) => {
                    let condition = match fragment.type_condition.take() {
                        Some(TypeCondition::On(name)) => name,
                        None => parent_type.to_string(),
                    };
                    if condition == parent_type {
                        self.partition_abstract(
                            parent_type,
                            fragment.selection_set.items,
                            direct,
                            by_type,
                        )?;
                    } else {
                        match by_type.iter_mut().find(|(name, _)| *name == condition) {
                            Some((_, selections)) => {
                                selections.extend(fragment.selection_set.items)
                            }
                            None => by_type.push((condition, fragment.selection_set.items)),
                        }
                    }
                }
                Selection::FragmentSpread(spread) => {
                    let (condition, items) = self.resolve_fragment(&spread.fragment_name)?;
                    self.partition_abstract(
                        parent_type,
                        vec![ast::inline_fragment_on(&condition, items)],
                        direct,
                        by_type,
                    )?;
                }
            }
        }
        Ok(())
    }

    /// Routes `remote` fields of `type_name` to other locations, appending
    /// dependent operations and injecting export keys into `out_local`.
    #[allow(clippy::too_many_arguments)]
    fn delegate(
        &mut self,
        current_location: &str,
        type_name: &str,
        remote: Vec<QueryField>,
        path: &[String],
        parent_step: usize,
        out_local: &mut Vec<QuerySelection>,
        crosses_list: bool,
        if_type: Option<String>,
    ) -> Result<(), PlanError> {
        let assignments = self.assign_remote_fields(current_location, type_name, remote)?;
        for (target_location, fields) in assignments {
            let chain =
                self.route_boundaries(type_name, current_location, &target_location, crosses_list)?;
            let first = &chain[0];
            push_export(out_local, &export_alias(&first.key), &first.key);
            push_export(out_local, &export_alias("typename"), TYPENAME_FIELD);

            let mut after = parent_step;
            for (hop_index, boundary) in chain.iter().enumerate() {
                let is_last = hop_index == chain.len() - 1;
                let op_index = self.create_op(
                    boundary.location.clone(),
                    OperationKind::Query,
                    path.to_vec(),
                    after,
                    if_type.clone(),
                    Some(boundary.clone()),
                );
                let hop_step = self.ops[op_index].step;
                let hop_location = boundary.location.clone();
                let mut hop_vars = BTreeSet::new();
                let selections = if is_last {
                    let input: Vec<QuerySelection> =
                        fields.iter().cloned().map(Selection::Field).collect();
                    let mut hop_path = path.to_vec();
                    self.extract_locale_selections(
                        &hop_location,
                        type_name,
                        input,
                        &mut hop_path,
                        hop_step,
                        &mut hop_vars,
                        crosses_list,
                        if_type.is_some(),
                    )?
                } else {
                    // Intermediate hop: only export the next hop's key.
                    let next = &chain[hop_index + 1];
                    vec![
                        ast::synthetic_field(Some(&export_alias(&next.key)), &next.key, vec![]),
                        ast::synthetic_field(
                            Some(&export_alias("typename")),
                            TYPENAME_FIELD,
                            vec![],
                        ),
                    ]
                };
                self.finish_op(op_index, selections, hop_vars);
                after = hop_step;
            }
        }
        Ok(())
    }

    /// Greedy assignment of remote fields to locations: the location serving
    /// the most remaining fields wins each round, ties broken alphabetically.
    fn assign_remote_fields(
        &self,
        current_location: &str,
        type_name: &str,
        remote: Vec<QueryField>,
    ) -> Result<Vec<(String, Vec<QueryField>)>, PlanError> {
        let mut remaining = remote;
        let mut assignments: Vec<(String, Vec<QueryField>)> = Vec::new();
        while !remaining.is_empty() {
            let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
            for field in &remaining {
                for location in self.supergraph.locations_for_field(type_name, &field.name) {
                    if location != current_location {
                        *counts.entry(location).or_default() += 1;
                    }
                }
            }
            let best = counts
                .iter()
                .fold(None::<(&str, usize)>, |best, (location, count)| {
                    match best {
                        Some((_, best_count)) if best_count >= *count => best,
                        _ => Some((*location, *count)),
                    }
                })
                .map(|(location, _)| location.to_string())
                .ok_or_else(|| PlanError::FieldNotResolvable {
                    type_name: type_name.to_string(),
                    field: remaining[0].name.clone(),
                })?;
            let (assigned, rest): (Vec<QueryField>, Vec<QueryField>) =
                remaining.into_iter().partition(|field| {
                    self.supergraph
                        .location_provides_field(type_name, &best, &field.name)
                });
            assignments.push((best, assigned));
            remaining = rest;
        }
        Ok(assignments)
    }

    /// Shortest boundary-query chain from `from` to `to` for `type_name`.
    /// Edges exist wherever the boundary's key is exportable from the
    /// current location.
    fn route_boundaries(
        &self,
        type_name: &str,
        from: &str,
        to: &str,
        prefer_list: bool,
    ) -> Result<Vec<BoundaryQuery>, PlanError> {
        let mut candidates: Vec<&BoundaryQuery> =
            self.supergraph.boundaries_for(type_name).iter().collect();
        if candidates.is_empty() {
            return Err(PlanError::NoBoundaryForType {
                type_name: type_name.to_string(),
                location: from.to_string(),
            });
        }
        candidates.sort_by_key(|b| {
            (
                b.location.clone(),
                if prefer_list { !b.list } else { b.list },
                b.field.clone(),
            )
        });

        let mut visited: BTreeMap<String, (String, BoundaryQuery)> = BTreeMap::new();
        let mut queue: VecDeque<String> = VecDeque::from([from.to_string()]);
        while let Some(at) = queue.pop_front() {
            for boundary in &candidates {
                if boundary.location == at
                    || visited.contains_key(&boundary.location)
                    || !self
                        .supergraph
                        .location_provides_field(type_name, &at, &boundary.key)
                {
                    continue;
                }
                visited.insert(boundary.location.clone(), (at.clone(), (*boundary).clone()));
                if boundary.location == to {
                    let mut chain = Vec::new();
                    let mut cursor = to.to_string();
                    while cursor != from {
                        let (previous, hop) = visited[&cursor].clone();
                        chain.push(hop);
                        cursor = previous;
                    }
                    chain.reverse();
                    return Ok(chain);
                }
                queue.push_back(boundary.location.clone());
            }
        }
        Err(PlanError::NoBoundaryForType {
            type_name: type_name.to_string(),
            location: to.to_string(),
        })
    }

    /// Flattens fields and same-type fragments into a plain field list.
    /// Fragment directives are carried onto each spliced field.
    fn flatten_fields(&self, input: Vec<QuerySelection>) -> Result<Vec<QueryField>, PlanError> {
        let mut out = Vec::new();
        self.flatten_fields_into(input, &[], &mut out)?;
        Ok(out)
    }

    fn flatten_fields_into(
        &self,
        input: Vec<QuerySelection>,
        inherited_directives: &[ast::QueryDirective],
        out: &mut Vec<QueryField>,
    ) -> Result<(), PlanError> {
        for item in input {
            match item {
                Selection::Field(mut field) => {
                    field
                        .directives
                        .extend(inherited_directives.iter().cloned());
                    out.push(field);
                }
                Selection::InlineFragment(fragment) => {
                    let mut directives = inherited_directives.to_vec();
                    directives.extend(fragment.directives);
                    self.flatten_fields_into(fragment.selection_set.items, &directives, out)?;
                }
                Selection::FragmentSpread(spread) => {
                    let (_, items) = self.resolve_fragment(&spread.fragment_name)?;
                    let mut directives = inherited_directives.to_vec();
                    directives.extend(spread.directives);
                    self.flatten_fields_into(items, &directives, out)?;
                }
            }
        }
        Ok(())
    }

    fn resolve_fragment(&self, name: &str) -> Result<(String, Vec<QuerySelection>), PlanError> {
        self.request
            .document
            .definitions
            .iter()
            .find_map(|def| match def {
                Definition::Fragment(fragment) if fragment.name == name => {
                    let TypeCondition::On(condition) = &fragment.type_condition;
                    Some((condition.clone(), fragment.selection_set.items.clone()))
                }
                _ => None,
            })
            .ok_or_else(|| PlanError::MissingFragment(name.to_string()))
    }
}

fn export_alias(suffix: &str) -> String {
    format!("{}{}", EXPORT_PREFIX, suffix)
}

fn push_export(out: &mut Vec<QuerySelection>, alias: &str, field_name: &str) {
    let exists = out.iter().any(|item| {
        matches!(item, Selection::Field(field) if field.alias.as_deref() == Some(alias))
    });
    if !exists {
        out.push(ast::synthetic_field(Some(alias), field_name, vec![]));
    }
}

/// Merges sibling selections that are identical after fragment inlining:
/// same response key, name, arguments and directives combine their child
/// selections.
fn coalesce_selections(items: Vec<QuerySelection>) -> Vec<QuerySelection> {
    let mut out: Vec<QuerySelection> = Vec::new();
    for item in items {
        match item {
            Selection::Field(field) => {
                let merged = out.iter_mut().find_map(|existing| match existing {
                    Selection::Field(e)
                        if ast::response_key(e) == ast::response_key(&field)
                            && e.name == field.name
                            && e.arguments == field.arguments
                            && e.directives == field.directives =>
                    {
                        Some(e)
                    }
                    _ => None,
                });
                match merged {
                    Some(existing) => existing
                        .selection_set
                        .items
                        .extend(field.selection_set.items),
                    None => out.push(Selection::Field(field)),
                }
            }
            Selection::InlineFragment(fragment) => {
                let merged = out.iter_mut().find_map(|existing| match existing {
                    Selection::InlineFragment(e)
                        if e.type_condition == fragment.type_condition
                            && e.directives == fragment.directives =>
                    {
                        Some(e)
                    }
                    _ => None,
                });
                match merged {
                    Some(existing) => existing
                        .selection_set
                        .items
                        .extend(fragment.selection_set.items),
                    None => out.push(Selection::InlineFragment(fragment)),
                }
            }
            other => out.push(other),
        }
    }
    for item in &mut out {
        match item {
            Selection::Field(field) if !field.selection_set.items.is_empty() => {
                let children = std::mem::take(&mut field.selection_set.items);
                field.selection_set.items = coalesce_selections(children);
            }
            Selection::InlineFragment(fragment) => {
                let children = std::mem::take(&mut fragment.selection_set.items);
                fragment.selection_set.items = coalesce_selections(children);
            }
            _ => {}
        }
    }
    out
}

/// Client documents may not use internal alias prefixes anywhere.
fn check_reserved_aliases(request: &Request) -> Result<(), PlanError> {
    fn walk(items: &[QuerySelection]) -> Result<(), PlanError> {
        for item in items {
            match item {
                Selection::Field(field) => {
                    if let Some(alias) = &field.alias {
                        if alias.starts_with(RESERVED_ALIAS_PREFIX)
                            || alias.starts_with(EXPORT_PREFIX)
                        {
                            return Err(PlanError::ReservedAlias(alias.clone()));
                        }
                    }
                    walk(&field.selection_set.items)?;
                }
                Selection::InlineFragment(fragment) => walk(&fragment.selection_set.items)?,
                Selection::FragmentSpread(_) => {}
            }
        }
        Ok(())
    }
    for definition in &request.document.definitions {
        match definition {
            Definition::Operation(op) => {
                let set = match op {
                    OperationDefinition::SelectionSet(set) => set,
                    OperationDefinition::Query(query) => &query.selection_set,
                    OperationDefinition::Mutation(mutation) => &mutation.selection_set,
                    OperationDefinition::Subscription(subscription) => {
                        &subscription.selection_set
                    }
                };
                walk(&set.items)?;
            }
            Definition::Fragment(fragment) => walk(&fragment.selection_set.items)?,
        }
    }
    Ok(())
}
