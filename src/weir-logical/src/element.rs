//! Elements: the typed nodes of an element graph.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use weir_core::{FieldComparator, Fields, Filter, Function, GroupFunction, Joiner, KeyComparator};

/// Annotation key attached to hash-join input legs.
pub const STREAM_MODE: &str = "stream-mode";
/// `stream-mode` value for the leg that is streamed through the join.
pub const STREAMED: &str = "streamed";
/// `stream-mode` value for legs buffered in memory before joining.
pub const ACCUMULATED: &str = "accumulated";

/// Unique identifier for an element in a graph.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u32);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "e{}", self.0)
    }
}

/// Fieldless discriminant of [`ElementKind`], used by pattern predicates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementType {
    Source,
    Sink,
    Each,
    Filter,
    Every,
    GroupBy,
    CoGroup,
    HashJoin,
    Merge,
    Boundary,
}

impl ElementType {
    pub const ALL: [ElementType; 10] = [
        Self::Source,
        Self::Sink,
        Self::Each,
        Self::Filter,
        Self::Every,
        Self::GroupBy,
        Self::CoGroup,
        Self::HashJoin,
        Self::Merge,
        Self::Boundary,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::Source => "Source",
            Self::Sink => "Sink",
            Self::Each => "Each",
            Self::Filter => "Filter",
            Self::Every => "Every",
            Self::GroupBy => "GroupBy",
            Self::CoGroup => "CoGroup",
            Self::HashJoin => "HashJoin",
            Self::Merge => "Merge",
            Self::Boundary => "Boundary",
        }
    }

    /// Capabilities checked when edges are added.
    pub fn capabilities(&self) -> Capabilities {
        match self {
            Self::Source => Capabilities {
                source: true,
                ..Capabilities::default()
            },
            Self::Sink => Capabilities {
                sink: true,
                ..Capabilities::default()
            },
            Self::GroupBy | Self::CoGroup => Capabilities {
                group: true,
                multi_input: true,
                blocking: true,
                ..Capabilities::default()
            },
            Self::HashJoin | Self::Merge => Capabilities {
                multi_input: true,
                ..Capabilities::default()
            },
            Self::Each | Self::Filter | Self::Every | Self::Boundary => Capabilities::default(),
        }
    }
}

impl fmt::Display for ElementType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// What an element may do structurally.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Capabilities {
    /// Produces records and accepts no inputs.
    pub source: bool,
    /// Consumes records and has no outputs.
    pub sink: bool,
    /// Groups records by key.
    pub group: bool,
    /// Accepts more than one incoming edge.
    pub multi_input: bool,
    /// Emits nothing until every input has completed.
    pub blocking: bool,
}

/// How an `Each` combines its input with the function results.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum OutputSelector {
    /// Incoming fields followed by the results.
    #[default]
    All,
    /// Only the results.
    Results,
    /// Incoming fields with the argument positions replaced by the results.
    Replace,
}

#[derive(Debug, Clone)]
pub struct SourceSpec {
    pub fields: Fields,
}

#[derive(Debug, Clone)]
pub struct EachSpec {
    /// Argument fields; `None` passes every incoming field.
    pub argument: Option<Fields>,
    pub function: Arc<dyn Function>,
    pub output: OutputSelector,
}

#[derive(Debug, Clone)]
pub struct FilterSpec {
    pub argument: Option<Fields>,
    pub filter: Arc<dyn Filter>,
}

#[derive(Debug, Clone)]
pub struct EverySpec {
    pub argument: Option<Fields>,
    pub function: Arc<dyn GroupFunction>,
}

/// Grouping over one or more inputs with identical fields.
#[derive(Debug, Clone, Default)]
pub struct GroupBySpec {
    pub group: Fields,
    /// Secondary sort within each group.
    pub sort: Option<Fields>,
    /// Emit keys in descending order.
    pub reverse: bool,
    /// Emit keys in first-seen order instead of sorting.
    pub unsorted: bool,
    /// Per-key-field comparators; missing positions use natural order.
    pub comparators: Vec<FieldComparator>,
    /// Per-sort-field comparators, overriding `reverse` for the secondary sort.
    pub sort_comparators: Vec<FieldComparator>,
}

impl GroupBySpec {
    pub fn new(group: impl Into<Fields>) -> Self {
        Self {
            group: group.into(),
            ..Self::default()
        }
    }

    pub fn with_sort(mut self, sort: impl Into<Fields>) -> Self {
        self.sort = Some(sort.into());
        self
    }

    pub fn reversed(mut self) -> Self {
        self.reverse = true;
        self
    }

    pub fn unsorted(mut self) -> Self {
        self.unsorted = true;
        self
    }

    pub fn with_comparators(mut self, comparators: Vec<FieldComparator>) -> Self {
        self.comparators = comparators;
        self
    }

    pub fn with_sort_comparators(mut self, comparators: Vec<FieldComparator>) -> Self {
        self.sort_comparators = comparators;
        self
    }

    /// Ordering of the secondary sort fields within a group.
    pub fn sort_comparator(&self) -> KeyComparator {
        let width = self.sort.as_ref().map_or(0, Fields::len);
        if !self.sort_comparators.is_empty() {
            KeyComparator::new(self.sort_comparators.clone())
        } else if self.reverse {
            KeyComparator::reverse(width)
        } else {
            KeyComparator::natural()
        }
    }
}

/// Keyed join over several inputs, shared by `CoGroup` and `HashJoin`.
#[derive(Debug, Clone)]
pub struct JoinSpec {
    /// Key fields per input ordinal. A self-join lists the key once.
    pub keys: Vec<Fields>,
    pub joiner: Arc<dyn Joiner>,
    /// Number of times a single input participates. `None` for normal joins.
    pub self_joins: Option<usize>,
    /// Output field names. Required when input names collide.
    pub declared: Option<Fields>,
    pub comparators: Vec<FieldComparator>,
}

impl JoinSpec {
    pub fn new(keys: Vec<Fields>, joiner: Arc<dyn Joiner>) -> Self {
        Self {
            keys,
            joiner,
            self_joins: None,
            declared: None,
            comparators: Vec::new(),
        }
    }

    pub fn self_join(key: impl Into<Fields>, times: usize, joiner: Arc<dyn Joiner>) -> Self {
        Self {
            keys: vec![key.into()],
            joiner,
            self_joins: Some(times),
            declared: None,
            comparators: Vec::new(),
        }
    }

    pub fn with_declared(mut self, declared: impl Into<Fields>) -> Self {
        self.declared = Some(declared.into());
        self
    }

    pub fn with_comparators(mut self, comparators: Vec<FieldComparator>) -> Self {
        self.comparators = comparators;
        self
    }

    /// Number of ordinals the joiner sees.
    pub fn ordinals(&self, incoming: usize) -> usize {
        self.self_joins.unwrap_or(incoming)
    }

    /// Key fields for an ordinal, repeating the sole key of a self-join.
    pub fn key_for(&self, ordinal: usize) -> Option<&Fields> {
        if self.self_joins.is_some() {
            self.keys.first()
        } else {
            self.keys.get(ordinal)
        }
    }
}

/// The closed set of element variants.
#[derive(Debug, Clone)]
pub enum ElementKind {
    Source(SourceSpec),
    Sink,
    Each(EachSpec),
    Filter(FilterSpec),
    Every(EverySpec),
    GroupBy(GroupBySpec),
    CoGroup(JoinSpec),
    HashJoin(JoinSpec),
    Merge,
    /// Partition marker, materialized as intermediate storage between steps.
    Boundary,
}

impl ElementKind {
    pub fn element_type(&self) -> ElementType {
        match self {
            Self::Source(_) => ElementType::Source,
            Self::Sink => ElementType::Sink,
            Self::Each(_) => ElementType::Each,
            Self::Filter(_) => ElementType::Filter,
            Self::Every(_) => ElementType::Every,
            Self::GroupBy(_) => ElementType::GroupBy,
            Self::CoGroup(_) => ElementType::CoGroup,
            Self::HashJoin(_) => ElementType::HashJoin,
            Self::Merge => ElementType::Merge,
            Self::Boundary => ElementType::Boundary,
        }
    }

    pub fn capabilities(&self) -> Capabilities {
        self.element_type().capabilities()
    }

    /// Short description of the element's operation, used in dumps.
    pub fn describe(&self) -> String {
        match self {
            Self::Source(spec) => format!("Source{}", spec.fields),
            Self::Each(spec) => format!("Each({})", spec.function.name()),
            Self::Filter(spec) => format!("Filter({})", spec.filter.name()),
            Self::Every(spec) => format!("Every({})", spec.function.name()),
            Self::GroupBy(spec) => format!("GroupBy{}", spec.group),
            Self::CoGroup(spec) => format!("CoGroup({})", spec.joiner.name()),
            Self::HashJoin(spec) => format!("HashJoin({})", spec.joiner.name()),
            other => other.element_type().name().to_string(),
        }
    }
}

/// A node of the element graph.
#[derive(Debug, Clone)]
pub struct Element {
    pub id: ElementId,
    pub name: String,
    pub kind: ElementKind,
    /// Name of the trap binding that absorbs this element's failed records.
    pub trap: Option<String>,
    pub annotations: BTreeMap<String, String>,
}

impl Element {
    pub fn new(id: ElementId, name: impl Into<String>, kind: ElementKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
            trap: None,
            annotations: BTreeMap::new(),
        }
    }

    pub fn element_type(&self) -> ElementType {
        self.kind.element_type()
    }

    pub fn annotation(&self, key: &str) -> Option<&str> {
        self.annotations.get(key).map(String::as_str)
    }

    pub fn has_annotation(&self, key: &str, value: &str) -> bool {
        self.annotation(key) == Some(value)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}] '{}'", self.element_type(), self.id, self.name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities() {
        assert!(ElementType::Source.capabilities().source);
        assert!(ElementType::Sink.capabilities().sink);
        let group = ElementType::GroupBy.capabilities();
        assert!(group.group && group.multi_input && group.blocking);
        let join = ElementType::HashJoin.capabilities();
        assert!(join.multi_input && !join.blocking && !join.group);
        assert_eq!(ElementType::Each.capabilities(), Capabilities::default());
    }

    #[test]
    fn test_join_spec_keys() {
        let spec = JoinSpec::self_join(["k"], 3, Arc::new(weir_core::operation::InnerJoin));
        assert_eq!(spec.ordinals(1), 3);
        assert_eq!(spec.key_for(2), Some(&Fields::from(["k"])));
    }

    #[test]
    fn test_element_display() {
        let e = Element::new(ElementId(3), "out", ElementKind::Sink);
        assert_eq!(e.to_string(), "Sink[e3] 'out'");
        assert!(e.annotation(STREAM_MODE).is_none());
    }
}
