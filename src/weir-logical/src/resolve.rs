//! Field resolution.
//!
//! Walks the graph in topological order and fixes the fields on every edge,
//! along with the key, sort and comparator settings on edges feeding a
//! grouping or join. Any conflict is reported as a `FieldError` naming the
//! element.

use common_error::{WeirError, WeirResult};
use weir_core::{FieldComparator, Fields, KeyComparator};

use crate::element::{ElementId, ElementKind, GroupBySpec, JoinSpec, OutputSelector};
use crate::graph::ElementGraph;

/// Resolve fields on every edge of `graph`.
pub fn resolve_fields(graph: &mut ElementGraph) -> WeirResult<()> {
    for id in graph.topological_order()? {
        let output = resolve_element(graph, id)?;
        if let Some(fields) = output {
            let outgoing: Vec<_> = graph.outgoing(id).iter().map(|e| e.id).collect();
            for edge in outgoing {
                if let Some(edge) = graph.edge_mut(edge) {
                    edge.scope.fields = Some(fields.clone());
                }
            }
        }
    }
    Ok(())
}

/// Input fields per ordinal, all of which must already be resolved.
fn incoming_fields(graph: &ElementGraph, id: ElementId) -> WeirResult<Vec<Fields>> {
    let element = graph.require(id)?;
    graph
        .incoming(id)
        .into_iter()
        .map(|e| {
            e.scope
                .fields
                .clone()
                .ok_or_else(|| WeirError::field(format!("unresolved input to {element}")))
        })
        .collect()
}

fn resolve_element(graph: &mut ElementGraph, id: ElementId) -> WeirResult<Option<Fields>> {
    let element = graph.require(id)?.clone();
    let inputs = incoming_fields(graph, id)?;
    let context = |e: WeirError| WeirError::field(format!("{element}: {}", strip(&e)));

    let output = match &element.kind {
        ElementKind::Source(spec) => {
            spec.fields.check_unique().map_err(context)?;
            Some(spec.fields.clone())
        }
        ElementKind::Sink => None,
        ElementKind::Each(spec) => {
            let incoming = single(&inputs).map_err(context)?;
            let args = argument(incoming, spec.argument.as_ref()).map_err(context)?;
            let declared = spec.function.declared_fields();
            declared.check_unique().map_err(context)?;
            let fields = match spec.output {
                OutputSelector::All => incoming.append(declared),
                OutputSelector::Results => Ok(declared.clone()),
                OutputSelector::Replace => replace(incoming, &args, declared),
            };
            Some(fields.map_err(context)?)
        }
        ElementKind::Filter(spec) => {
            let incoming = single(&inputs).map_err(context)?;
            argument(incoming, spec.argument.as_ref()).map_err(context)?;
            Some(incoming.clone())
        }
        ElementKind::Boundary => Some(single(&inputs).map_err(context)?.clone()),
        ElementKind::Merge => Some(identical(&inputs).map_err(context)?.clone()),
        ElementKind::GroupBy(spec) => {
            let fields = identical(&inputs).map_err(context)?.clone();
            configure_group(graph, id, &fields, spec).map_err(context)?;
            Some(fields)
        }
        ElementKind::CoGroup(spec) | ElementKind::HashJoin(spec) => {
            Some(resolve_join(graph, id, &inputs, spec).map_err(context)?)
        }
        ElementKind::Every(spec) => {
            let incoming = single(&inputs).map_err(context)?;
            let (key, values) = group_context(graph, id).map_err(context)?;
            argument(&values, spec.argument.as_ref()).map_err(context)?;
            let declared = spec.function.declared_fields();
            declared.check_unique().map_err(context)?;
            let upstream_is_every = graph
                .predecessors(id)
                .first()
                .and_then(|p| graph.element(*p))
                .map(|p| matches!(p.kind, ElementKind::Every(_)))
                .unwrap_or(false);
            let base = if upstream_is_every { incoming.clone() } else { key };
            Some(base.append(declared).map_err(context)?)
        }
    };
    Ok(output)
}

/// Drop the `FieldError: ` prefix so wrapped messages read naturally.
fn strip(err: &WeirError) -> String {
    match err {
        WeirError::FieldError(msg) => msg.clone(),
        other => other.to_string(),
    }
}

fn single(inputs: &[Fields]) -> WeirResult<&Fields> {
    match inputs {
        [only] => Ok(only),
        _ => Err(WeirError::field(format!(
            "expected exactly one input, found {}",
            inputs.len()
        ))),
    }
}

fn identical(inputs: &[Fields]) -> WeirResult<&Fields> {
    let first = inputs
        .first()
        .ok_or_else(|| WeirError::field("no inputs"))?;
    if let Some(other) = inputs.iter().find(|f| *f != first) {
        return Err(WeirError::field(format!(
            "inputs must have identical fields, found {first} and {other}"
        )));
    }
    Ok(first)
}

/// Argument fields, defaulting to every incoming field.
fn argument(incoming: &Fields, argument: Option<&Fields>) -> WeirResult<Fields> {
    match argument {
        Some(args) => {
            incoming.positions(args)?;
            Ok(args.clone())
        }
        None => Ok(incoming.clone()),
    }
}

fn replace(incoming: &Fields, args: &Fields, declared: &Fields) -> WeirResult<Fields> {
    if args.len() != declared.len() {
        return Err(WeirError::field(format!(
            "replace needs as many results as arguments: {args} vs {declared}"
        )));
    }
    let positions = incoming.positions(args)?;
    let mut names: Vec<String> = incoming.names().to_vec();
    for (pos, name) in positions.into_iter().zip(declared.iter()) {
        names[pos] = name.to_string();
    }
    let fields = Fields::from(names);
    fields.check_unique()?;
    Ok(fields)
}

fn key_comparator(width: usize, reverse: bool, custom: &[FieldComparator]) -> KeyComparator {
    if !custom.is_empty() {
        KeyComparator::new(custom.to_vec())
    } else if reverse {
        KeyComparator::reverse(width)
    } else {
        KeyComparator::natural()
    }
}

fn configure_group(
    graph: &mut ElementGraph,
    id: ElementId,
    fields: &Fields,
    spec: &GroupBySpec,
) -> WeirResult<()> {
    if spec.group.is_empty() {
        return Err(WeirError::field("grouping needs at least one key field"));
    }
    fields.positions(&spec.group)?;
    if let Some(sort) = &spec.sort {
        fields.positions(sort)?;
    }
    let sort_width = spec.sort.as_ref().map_or(0, Fields::len);
    if spec.sort_comparators.len() > sort_width {
        return Err(WeirError::field(format!(
            "{} sort comparators for {sort_width} sort field(s)",
            spec.sort_comparators.len()
        )));
    }
    let comparator = key_comparator(spec.group.len(), spec.reverse, &spec.comparators);
    let edges: Vec<_> = graph.incoming(id).iter().map(|e| e.id).collect();
    for edge in edges {
        if let Some(edge) = graph.edge_mut(edge) {
            edge.scope.key_fields = Some(spec.group.clone());
            edge.scope.sort_fields = spec.sort.clone();
            edge.scope.comparator = comparator.clone();
        }
    }
    Ok(())
}

fn resolve_join(
    graph: &mut ElementGraph,
    id: ElementId,
    inputs: &[Fields],
    spec: &JoinSpec,
) -> WeirResult<Fields> {
    let ordinals = spec.ordinals(inputs.len());
    if let Some(times) = spec.self_joins {
        if inputs.len() != 1 {
            return Err(WeirError::field(format!(
                "self-join expects one input, found {}",
                inputs.len()
            )));
        }
        if times < 2 {
            return Err(WeirError::field("self-join needs at least two repeats"));
        }
        if spec.declared.is_none() {
            return Err(WeirError::field("self-join requires declared fields"));
        }
    } else if spec.keys.len() != inputs.len() {
        return Err(WeirError::field(format!(
            "{} key sets for {} inputs",
            spec.keys.len(),
            inputs.len()
        )));
    }
    if ordinals < 2 {
        return Err(WeirError::field("join needs at least two inputs"));
    }

    let width = spec.keys.first().map(Fields::len).unwrap_or(0);
    if width == 0 {
        return Err(WeirError::field("join needs at least one key field"));
    }
    for (ordinal, fields) in inputs.iter().enumerate() {
        let key = spec
            .key_for(ordinal)
            .ok_or_else(|| WeirError::field(format!("no key for ordinal {ordinal}")))?;
        if key.len() != width {
            return Err(WeirError::field(format!(
                "key {key} on ordinal {ordinal} differs in width from {}",
                spec.keys[0]
            )));
        }
        fields.positions(key)?;
    }

    let total: usize = (0..ordinals)
        .map(|ord| inputs[if spec.self_joins.is_some() { 0 } else { ord }].len())
        .sum();
    let output = match &spec.declared {
        Some(declared) => {
            if declared.len() != total {
                return Err(WeirError::field(format!(
                    "declared {declared} but inputs carry {total} fields"
                )));
            }
            declared.check_unique()?;
            declared.clone()
        }
        None => {
            let mut fields = Fields::empty();
            for input in inputs {
                fields = fields.append(input).map_err(|e| {
                    WeirError::field(format!("{}; declare output fields", strip(&e)))
                })?;
            }
            fields
        }
    };

    let comparator = key_comparator(width, false, &spec.comparators);
    let edges: Vec<_> = graph
        .incoming(id)
        .iter()
        .map(|e| (e.id, e.scope.ordinal))
        .collect();
    for (edge, ordinal) in edges {
        let key = spec.key_for(ordinal).cloned();
        if let Some(edge) = graph.edge_mut(edge) {
            edge.scope.key_fields = key;
            edge.scope.comparator = comparator.clone();
        }
    }
    Ok(output)
}

/// For an `Every`, the grouping key fields as they appear downstream of the
/// grouping element, and the value fields its arguments select from.
pub fn group_context(graph: &ElementGraph, every: ElementId) -> WeirResult<(Fields, Fields)> {
    let mut current = every;
    loop {
        let pred = graph
            .predecessors(current)
            .first()
            .copied()
            .ok_or_else(|| WeirError::field("Every must follow a grouping"))?;
        let element = graph.require(pred)?;
        match &element.kind {
            ElementKind::Every(_) => current = pred,
            ElementKind::GroupBy(spec) => {
                let values = graph
                    .output_fields(pred)
                    .cloned()
                    .ok_or_else(|| WeirError::field(format!("{element} is not resolved")))?;
                return Ok((spec.group.clone(), values));
            }
            ElementKind::CoGroup(spec) => {
                let values = graph
                    .output_fields(pred)
                    .cloned()
                    .ok_or_else(|| WeirError::field(format!("{element} is not resolved")))?;
                let first = graph
                    .input_fields(pred, 0)
                    .ok_or_else(|| WeirError::field(format!("{element} has no ordinal 0")))?;
                let key = spec
                    .key_for(0)
                    .ok_or_else(|| WeirError::field(format!("{element} has no key")))?;
                // Ordinal 0 leads the output, so its key positions carry over.
                let positions = first.positions(key)?;
                let names: Vec<String> = positions
                    .into_iter()
                    .filter_map(|p| values.get(p).map(str::to_string))
                    .collect();
                return Ok((Fields::from(names), values));
            }
            _ => {
                return Err(WeirError::field(format!(
                    "Every must follow GroupBy, CoGroup or Every, found {element}"
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use weir_core::operation::{FnFunction, Identity, InnerJoin, Sum};

    use super::*;
    use crate::builder::PipelineBuilder;

    #[test]
    fn test_each_selectors() {
        let mut b = PipelineBuilder::new();
        let src = b.source("in", ["k", "v"]);
        let all = b.each("all", src, Some(["v"].into()), Arc::new(Identity::new(["w"])), OutputSelector::All);
        let results = b.each("results", all, None, Arc::new(Identity::new(["a", "b", "c"])), OutputSelector::Results);
        let replaced = b.each("replace", results, Some(["b"].into()), Arc::new(Identity::new(["z"])), OutputSelector::Replace);
        b.sink("out", replaced);
        let mut g = b.build().unwrap();
        resolve_fields(&mut g).unwrap();

        let sink = g.find_by_name("out").unwrap().id;
        assert_eq!(g.input_fields(sink, 0).unwrap(), &Fields::from(["a", "z", "c"]));
        let all_id = g.find_by_name("all").unwrap().id;
        assert_eq!(g.output_fields(all_id).unwrap(), &Fields::from(["k", "v", "w"]));
    }

    #[test]
    fn test_each_collision_is_error() {
        let mut b = PipelineBuilder::new();
        let src = b.source("in", ["k", "v"]);
        let f = FnFunction::new("dup", ["v"], |_, _| Ok(()));
        let each = b.each("dup", src, None, Arc::new(f), OutputSelector::All);
        b.sink("out", each);
        let mut g = b.build().unwrap();
        let err = resolve_fields(&mut g).unwrap_err();
        assert!(err.to_string().contains("duplicate field 'v'"), "{err}");
        assert!(err.to_string().contains("'dup'"), "{err}");
    }

    #[test]
    fn test_group_every_chain() {
        let mut b = PipelineBuilder::new();
        let src = b.source("in", ["k", "v"]);
        let grouped = b.group_by("group", &[src], GroupBySpec::new(["k"]));
        let sum = b.every("sum", grouped, Some(["v"].into()), Arc::new(Sum::new("sum")));
        let count = b.every("count", sum, Some(["v"].into()), Arc::new(weir_core::operation::Count::new("n")));
        b.sink("out", count);
        let mut g = b.build().unwrap();
        resolve_fields(&mut g).unwrap();

        let group = g.find_by_name("group").unwrap().id;
        let scope = &g.incoming(group)[0].scope;
        assert_eq!(scope.key_fields, Some(Fields::from(["k"])));
        let sink = g.find_by_name("out").unwrap().id;
        assert_eq!(g.input_fields(sink, 0).unwrap(), &Fields::from(["k", "sum", "n"]));
    }

    #[test]
    fn test_unknown_group_field() {
        let mut b = PipelineBuilder::new();
        let src = b.source("in", ["k", "v"]);
        let grouped = b.group_by("group", &[src], GroupBySpec::new(["x"]));
        b.sink("out", grouped);
        let mut g = b.build().unwrap();
        let err = resolve_fields(&mut g).unwrap_err();
        assert!(err.to_string().contains("unknown field 'x'"));
    }

    #[test]
    fn test_join_requires_declared_on_collision() {
        let mut b = PipelineBuilder::new();
        let l = b.source("l", ["k", "v"]);
        let r = b.source("r", ["k", "v"]);
        let spec = JoinSpec::new(vec![["k"].into(), ["k"].into()], Arc::new(InnerJoin));
        let join = b.co_group("join", &[l, r], spec.clone());
        b.sink("out", join);
        let mut g = b.build().unwrap();
        assert!(resolve_fields(&mut g).unwrap_err().to_string().contains("declare output fields"));

        let mut b = PipelineBuilder::new();
        let l = b.source("l", ["k", "v"]);
        let r = b.source("r", ["k", "v"]);
        let join = b.co_group("join", &[l, r], spec.with_declared(["k1", "v1", "k2", "v2"]));
        b.sink("out", join);
        let mut g = b.build().unwrap();
        resolve_fields(&mut g).unwrap();
        let sink = g.find_by_name("out").unwrap().id;
        assert_eq!(g.input_fields(sink, 0).unwrap().len(), 4);
    }

    #[test]
    fn test_self_join_width() {
        let mut b = PipelineBuilder::new();
        let src = b.source("in", ["k", "v"]);
        let spec = JoinSpec::self_join(["k"], 3, Arc::new(InnerJoin))
            .with_declared(["k1", "v1", "k2", "v2", "k3", "v3"]);
        let join = b.co_group("self", &[src], spec);
        b.sink("out", join);
        let mut g = b.build().unwrap();
        resolve_fields(&mut g).unwrap();
    }

    #[test]
    fn test_merge_requires_identical_fields() {
        let mut b = PipelineBuilder::new();
        let l = b.source("l", ["k", "v"]);
        let r = b.source("r", ["k", "w"]);
        let merged = b.merge("merge", &[l, r]);
        b.sink("out", merged);
        let mut g = b.build().unwrap();
        assert!(resolve_fields(&mut g).unwrap_err().to_string().contains("identical"));
    }
}
