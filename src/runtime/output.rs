//! Output tree with unresolved references
//!
//! Rendered output is kept as a sequence of literal text and references to
//! slots and stacks whose final content is not known yet. References are
//! resolved in one pass once rendering has finished, so no placeholder text
//! ever shares a namespace with document text.

use std::collections::{HashMap, HashSet, VecDeque};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Text(String),
    /// Content of a slot, with the fallback used if it is never defined
    Slot { name: String, default: Option<String> },
    /// Joined chunks of a stack
    Stack(String),
    /// Where an overriding capture of the named slot is substituted
    Parent(String),
}

/// A buffer of output nodes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Fragment {
    nodes: Vec<Node>,
}

impl Fragment {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn text(text: impl Into<String>) -> Self {
        let mut fragment = Self::new();
        fragment.push(Node::Text(text.into()));
        fragment
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Append literal text, merging with a trailing text node
    pub fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(Node::Text(last)) = self.nodes.last_mut() {
            last.push_str(text);
        } else {
            self.nodes.push(Node::Text(text.to_string()));
        }
    }

    pub fn push(&mut self, node: Node) {
        match node {
            Node::Text(text) => self.push_text(&text),
            other => self.nodes.push(other),
        }
    }

    pub fn extend(&mut self, other: Fragment) {
        for node in other.nodes {
            self.push(node);
        }
    }

    /// Replace each parent marker for `name` with `content`
    ///
    /// One pass: markers inside `content` are copied as they are.
    pub fn substitute_parent(&self, name: &str, content: &Fragment) -> Fragment {
        let mut result = Fragment::new();
        for node in &self.nodes {
            match node {
                Node::Parent(marker) if marker == name => result.extend(content.clone()),
                other => result.push(other.clone()),
            }
        }
        result
    }

    /// Strip leading and trailing whitespace from the literal text at each end
    pub fn trim(mut self) -> Fragment {
        while let Some(Node::Text(first)) = self.nodes.first_mut() {
            let start = first.len() - first.trim_start().len();
            if start == first.len() {
                self.nodes.remove(0);
                continue;
            }
            first.drain(..start);
            break;
        }
        while let Some(Node::Text(last)) = self.nodes.last_mut() {
            let end = last.trim_end().len();
            if end == 0 {
                self.nodes.pop();
                continue;
            }
            last.truncate(end);
            break;
        }
        self
    }

    /// Flatten to one string with a marker standing in for each reference
    ///
    /// Markers are bracketed by Unicode noncharacters so they cannot collide
    /// with document text. The returned nodes are indexed by marker number.
    pub(crate) fn to_marked(&self) -> (String, Vec<&Node>) {
        let mut text = String::new();
        let mut references = Vec::new();
        for node in &self.nodes {
            match node {
                Node::Text(literal) => text.push_str(literal),
                reference => {
                    text.push(MARKER_OPEN);
                    text.push_str(&references.len().to_string());
                    text.push(MARKER_CLOSE);
                    references.push(reference);
                }
            }
        }
        (text, references)
    }
}

const MARKER_OPEN: char = '\u{FDD0}';
const MARKER_CLOSE: char = '\u{FDD1}';

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
enum Reference<'a> {
    Slot(&'a str),
    Stack(&'a str),
}

/// Linearizes fragments against final slot and stack contents
pub(crate) struct Resolver<'a> {
    slots: &'a HashMap<String, Fragment>,
    stacks: &'a HashMap<String, VecDeque<Fragment>>,
    active: HashSet<Reference<'a>>,
}

impl<'a> Resolver<'a> {
    pub(crate) fn new(
        slots: &'a HashMap<String, Fragment>,
        stacks: &'a HashMap<String, VecDeque<Fragment>>,
    ) -> Self {
        Self {
            slots,
            stacks,
            active: HashSet::new(),
        }
    }

    pub(crate) fn resolve(&mut self, fragment: &'a Fragment) -> String {
        let mut out = String::new();
        self.write(fragment, &mut out);
        out
    }

    /// Resolve the markers of a string produced by [`Fragment::to_marked`]
    ///
    /// A marker that no longer parses, or names no reference, is kept as is.
    pub(crate) fn resolve_marked(&mut self, text: &str, references: &[&'a Node]) -> String {
        let mut out = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(start) = rest.find(MARKER_OPEN) {
            out.push_str(&rest[..start]);
            let after = &rest[start + MARKER_OPEN.len_utf8()..];
            let node = after.find(MARKER_CLOSE).and_then(|end| {
                let index: usize = after[..end].parse().ok()?;
                Some((references.get(index).copied()?, end))
            });
            match node {
                Some((node, end)) => {
                    self.write_node(node, &mut out);
                    rest = &after[end + MARKER_CLOSE.len_utf8()..];
                }
                None => {
                    out.push(MARKER_OPEN);
                    rest = after;
                }
            }
        }
        out.push_str(rest);
        out
    }

    fn write(&mut self, fragment: &'a Fragment, out: &mut String) {
        for node in &fragment.nodes {
            self.write_node(node, out);
        }
    }

    fn write_node(&mut self, node: &'a Node, out: &mut String) {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Slot { name, default } => match self.slots.get(name) {
                Some(value) => {
                    // A slot that refers to itself resolves to nothing the second time.
                    let reference = Reference::Slot(name);
                    if self.active.insert(reference.clone()) {
                        self.write(value, out);
                        self.active.remove(&reference);
                    }
                }
                None => out.push_str(default.as_deref().unwrap_or_default()),
            },
            Node::Stack(name) => {
                let Some(chunks) = self.stacks.get(name) else {
                    return;
                };
                let reference = Reference::Stack(name);
                if !self.active.insert(reference.clone()) {
                    return;
                }
                for (i, chunk) in chunks.iter().enumerate() {
                    if i > 0 {
                        out.push('\n');
                    }
                    self.write(chunk, out);
                }
                self.active.remove(&reference);
            }
            Node::Parent(_) => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slot(name: &str) -> Node {
        Node::Slot {
            name: name.to_string(),
            default: None,
        }
    }

    #[test]
    fn test_adjacent_text_merges() {
        let mut fragment = Fragment::new();
        fragment.push_text("a");
        fragment.push_text("");
        fragment.push(Node::Text("b".to_string()));
        assert_eq!(fragment.nodes(), &[Node::Text("ab".to_string())]);
    }

    #[test]
    fn test_substitute_parent_once() {
        let mut prior = Fragment::text("before ");
        prior.push(Node::Parent("content".to_string()));
        prior.push_text(" after");

        let mut capture = Fragment::text("base");
        capture.push(Node::Parent("content".to_string()));

        let merged = prior.substitute_parent("content", &capture);
        assert_eq!(
            merged.nodes(),
            &[
                Node::Text("before base".to_string()),
                Node::Parent("content".to_string()),
                Node::Text(" after".to_string()),
            ]
        );
    }

    #[test]
    fn test_trim_only_touches_outer_text() {
        let mut fragment = Fragment::text("  \n ");
        fragment.push_text("");
        fragment.push(slot("a"));
        fragment.push_text("  x  ");
        let trimmed = fragment.trim();
        assert_eq!(
            trimmed.nodes(),
            &[slot("a"), Node::Text("  x".to_string())]
        );
    }

    #[test]
    fn test_resolve_defaults_and_stacks() {
        let mut slots = HashMap::new();
        slots.insert("title".to_string(), Fragment::text("Home"));
        let mut stacks = HashMap::new();
        stacks.insert(
            "scripts".to_string(),
            VecDeque::from(vec![Fragment::text("a"), Fragment::text("b")]),
        );

        let mut fragment = Fragment::new();
        fragment.push(slot("title"));
        fragment.push_text("|");
        fragment.push(Node::Slot {
            name: "footer".to_string(),
            default: Some("(none)".to_string()),
        });
        fragment.push_text("|");
        fragment.push(Node::Stack("scripts".to_string()));
        fragment.push(Node::Stack("styles".to_string()));
        fragment.push(Node::Parent("title".to_string()));

        let output = Resolver::new(&slots, &stacks).resolve(&fragment);
        assert_eq!(output, "Home|(none)|a\nb");
    }

    #[test]
    fn test_nested_references_resolve() {
        let mut inner = Fragment::text("[");
        inner.push(Node::Stack("meta".to_string()));
        inner.push_text("]");

        let mut slots = HashMap::new();
        slots.insert("head".to_string(), inner);
        let mut stacks = HashMap::new();
        stacks.insert("meta".to_string(), VecDeque::from(vec![Fragment::text("m")]));

        let mut fragment = Fragment::new();
        fragment.push(slot("head"));
        assert_eq!(Resolver::new(&slots, &stacks).resolve(&fragment), "[m]");
    }

    #[test]
    fn test_reference_cycle_resolves_to_empty() {
        let mut looped = Fragment::text("x");
        looped.push(slot("a"));

        let mut slots = HashMap::new();
        slots.insert("a".to_string(), looped);
        let stacks = HashMap::new();

        let mut fragment = Fragment::new();
        fragment.push(slot("a"));
        assert_eq!(Resolver::new(&slots, &stacks).resolve(&fragment), "x");
    }

    #[test]
    fn test_marked_text_round_trips_references() {
        let mut slots = HashMap::new();
        slots.insert("s".to_string(), Fragment::text("X"));
        let stacks = HashMap::new();

        let mut fragment = Fragment::text("a");
        fragment.push(slot("s"));
        fragment.push_text("b");

        let (text, references) = fragment.to_marked();
        assert_eq!(references.len(), 1);
        assert!(!text.contains('X'));

        let wrapped = format!("<{}>", text);
        let output = Resolver::new(&slots, &stacks).resolve_marked(&wrapped, &references);
        assert_eq!(output, "<aXb>");
    }

    #[test]
    fn test_mangled_marker_is_kept() {
        let slots = HashMap::new();
        let stacks = HashMap::new();
        let text = format!("a{}9{}b", MARKER_OPEN, MARKER_CLOSE);
        let output = Resolver::new(&slots, &stacks).resolve_marked(&text, &[]);
        assert_eq!(output, text);
    }
}
