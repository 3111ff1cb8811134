//! Composition runtime
//!
//! One [`Runtime`] lives for the duration of a single render. Generated code
//! drives it through the host: text is written into the innermost open
//! capture (or the root buffer), slots and stacks collect captured content,
//! and `yield`/`stack` leave references in the output that
//! [`Runtime::terminate`] resolves once every template in the layout chain
//! has run.

pub mod output;

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use log::trace;
use thiserror::Error;

pub use output::{Fragment, Node};

use output::Resolver;

/// Callback applied to the root output before references are resolved
pub type PostProcessor = Arc<dyn Fn(&str) -> String + Send + Sync>;

/// Misuse of the runtime by generated code
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("cannot end a {expected} without first starting one")]
    NothingToClose { expected: &'static str },

    #[error("cannot end a {expected} while {open} is still open")]
    MismatchedClose { expected: &'static str, open: String },

    #[error("template finished with {open} still open")]
    Unclosed { open: String },
}

/// What an open capture will do with its content
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CaptureKind {
    Slot(String),
    Push(String),
    Prepend(String),
    Trim,
}

impl fmt::Display for CaptureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CaptureKind::Slot(name) => write!(f, "section '{}'", name),
            CaptureKind::Push(name) => write!(f, "push to stack '{}'", name),
            CaptureKind::Prepend(name) => write!(f, "prepend to stack '{}'", name),
            CaptureKind::Trim => write!(f, "trim block"),
        }
    }
}

#[derive(Debug)]
struct Capture {
    kind: CaptureKind,
    buffer: Fragment,
}

/// Per-render composition state
#[derive(Default)]
pub struct Runtime {
    root: Fragment,
    captures: Vec<Capture>,
    slots: HashMap<String, Fragment>,
    stacks: HashMap<String, VecDeque<Fragment>>,
    guards: HashSet<String>,
    layout: Option<String>,
    post_processors: Vec<PostProcessor>,
}

impl fmt::Debug for Runtime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Runtime")
            .field("root", &self.root)
            .field("captures", &self.captures)
            .field("slots", &self.slots)
            .field("stacks", &self.stacks)
            .field("guards", &self.guards)
            .field("layout", &self.layout)
            .field("post_processors", &self.post_processors.len())
            .finish()
    }
}

impl Runtime {
    pub fn new() -> Self {
        Self::default()
    }

    fn buffer(&mut self) -> &mut Fragment {
        match self.captures.last_mut() {
            Some(capture) => &mut capture.buffer,
            None => &mut self.root,
        }
    }

    /// Write literal text to the innermost open capture
    pub fn write(&mut self, text: &str) {
        self.buffer().push_text(text);
    }

    /// Name of the nearest slot being captured
    pub fn current_slot(&self) -> Option<&str> {
        self.captures.iter().rev().find_map(|capture| match &capture.kind {
            CaptureKind::Slot(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Define a slot from a literal, or start capturing it
    pub fn open_slot(&mut self, name: &str, default: Option<&str>) {
        match default {
            Some(value) => {
                self.slots.insert(name.to_string(), Fragment::text(value));
            }
            None => self.open(CaptureKind::Slot(name.to_string())),
        }
    }

    /// Finish the innermost slot capture
    ///
    /// An existing non-empty value for the slot takes precedence; its parent
    /// markers are replaced with the new capture. With `show`, the resulting
    /// value is also written out in place.
    pub fn close_slot(&mut self, show: bool) -> Result<(), RuntimeError> {
        let Capture { kind, buffer } =
            self.close("section", |kind| matches!(kind, CaptureKind::Slot(_)))?;
        let name = match kind {
            CaptureKind::Slot(name) => name,
            other => {
                return Err(RuntimeError::MismatchedClose {
                    expected: "section",
                    open: other.to_string(),
                })
            }
        };

        let value = match self.slots.get(&name) {
            Some(prior) if !prior.is_empty() => prior.substitute_parent(&name, &buffer),
            _ => buffer,
        };

        if show {
            self.buffer().extend(value.clone());
        }
        trace!("slot '{}' closed", name);
        self.slots.insert(name, value);
        Ok(())
    }

    /// Mark where an overriding capture of the current slot goes
    pub fn parent(&mut self) {
        if let Some(name) = self.current_slot().map(str::to_string) {
            self.buffer().push(Node::Parent(name));
        }
    }

    /// Write a slot's value, or a reference to it if it is not defined yet
    pub fn yield_slot(&mut self, name: &str, default: Option<&str>) {
        match self.slots.get(name).cloned() {
            Some(value) => self.buffer().extend(value),
            None => self.buffer().push(Node::Slot {
                name: name.to_string(),
                default: default.map(str::to_string),
            }),
        }
    }

    pub fn slot_exists(&self, name: &str) -> bool {
        self.slots.contains_key(name)
    }

    pub fn slot_missing(&self, name: &str) -> bool {
        !self.slot_exists(name)
    }

    pub fn slot(&self, name: &str) -> Option<&Fragment> {
        self.slots.get(name)
    }

    /// Append a literal chunk to a stack, or start capturing one
    pub fn push(&mut self, name: &str, value: Option<&str>) {
        match value {
            Some(value) => self.stack_mut(name).push_back(Fragment::text(value)),
            None => self.open(CaptureKind::Push(name.to_string())),
        }
    }

    /// Prepend a literal chunk to a stack, or start capturing one
    pub fn prepend(&mut self, name: &str, value: Option<&str>) {
        match value {
            Some(value) => self.stack_mut(name).push_front(Fragment::text(value)),
            None => self.open(CaptureKind::Prepend(name.to_string())),
        }
    }

    pub fn end_push(&mut self) -> Result<(), RuntimeError> {
        let capture = self.close("push", |kind| matches!(kind, CaptureKind::Push(_)))?;
        if let CaptureKind::Push(name) = capture.kind {
            self.stack_mut(&name).push_back(capture.buffer);
        }
        Ok(())
    }

    pub fn end_prepend(&mut self) -> Result<(), RuntimeError> {
        let capture = self.close("prepend", |kind| matches!(kind, CaptureKind::Prepend(_)))?;
        if let CaptureKind::Prepend(name) = capture.kind {
            self.stack_mut(&name).push_front(capture.buffer);
        }
        Ok(())
    }

    /// Reference a stack; it is joined after rendering, as it may still grow
    pub fn stack(&mut self, name: &str) {
        self.buffer().push(Node::Stack(name.to_string()));
    }

    pub fn stack_len(&self, name: &str) -> usize {
        self.stacks.get(name).map_or(0, VecDeque::len)
    }

    fn stack_mut(&mut self, name: &str) -> &mut VecDeque<Fragment> {
        self.stacks.entry(name.to_string()).or_default()
    }

    /// True the first time `key` is seen in this render
    pub fn once(&mut self, key: &str) -> bool {
        self.guards.insert(key.to_string())
    }

    pub fn start_trim(&mut self) {
        self.open(CaptureKind::Trim);
    }

    pub fn end_trim(&mut self) -> Result<(), RuntimeError> {
        let capture = self.close("trim block", |kind| matches!(kind, CaptureKind::Trim))?;
        let trimmed = capture.buffer.trim();
        self.buffer().extend(trimmed);
        Ok(())
    }

    /// Declare the layout to render once the current template finishes
    pub fn extends(&mut self, layout: &str) {
        self.layout = Some(layout.to_string());
    }

    pub fn take_layout(&mut self) -> Option<String> {
        self.layout.take()
    }

    /// Check that a template left no capture open
    pub fn finish_template(&self) -> Result<(), RuntimeError> {
        match self.captures.last() {
            Some(capture) => Err(RuntimeError::Unclosed {
                open: capture.kind.to_string(),
            }),
            None => Ok(()),
        }
    }

    /// Drop the root output of a template that handed over to its layout
    pub fn discard_output(&mut self) {
        self.root = Fragment::new();
    }

    pub fn add_post_processor(&mut self, processor: PostProcessor) {
        self.post_processors.push(processor);
    }

    /// Apply post-processors and resolve every reference in the root output
    ///
    /// Each post-processor runs once over the whole root buffer, with slot
    /// and stack references still standing as markers.
    pub fn terminate(&mut self) -> String {
        let root = std::mem::take(&mut self.root);
        let mut resolver = Resolver::new(&self.slots, &self.stacks);
        if self.post_processors.is_empty() {
            return resolver.resolve(&root);
        }

        let (mut text, references) = root.to_marked();
        for processor in &self.post_processors {
            text = (**processor)(&text);
        }
        resolver.resolve_marked(&text, &references)
    }

    fn open(&mut self, kind: CaptureKind) {
        trace!("open {}", kind);
        self.captures.push(Capture {
            kind,
            buffer: Fragment::new(),
        });
    }

    fn close<F>(&mut self, expected: &'static str, accepts: F) -> Result<Capture, RuntimeError>
    where
        F: Fn(&CaptureKind) -> bool,
    {
        let Some(top) = self.captures.last() else {
            return Err(RuntimeError::NothingToClose { expected });
        };
        if !accepts(&top.kind) {
            return Err(RuntimeError::MismatchedClose {
                expected,
                open: top.kind.to_string(),
            });
        }
        self.captures
            .pop()
            .ok_or(RuntimeError::NothingToClose { expected })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_show_writes_once_and_stores_value() {
        let mut runtime = Runtime::new();
        runtime.write("<main>");
        runtime.open_slot("content", None);
        runtime.write("hello");
        runtime.close_slot(true).expect("Should close slot");
        runtime.write("</main>");

        assert_eq!(runtime.slot("content"), Some(&Fragment::text("hello")));
        assert_eq!(runtime.terminate(), "<main>hello</main>");
    }

    #[test]
    fn test_parent_marker_substitution() {
        let mut runtime = Runtime::new();

        // Child defines the slot first and refers to the parent content.
        runtime.open_slot("content", None);
        runtime.write("before ");
        runtime.parent();
        runtime.write(" after");
        runtime.close_slot(false).expect("Should close slot");

        // Layout defines its own version later.
        runtime.open_slot("content", None);
        runtime.write("base");
        runtime.close_slot(true).expect("Should close slot");

        assert_eq!(runtime.terminate(), "before base after");
    }

    #[test]
    fn test_child_without_parent_replaces_layout() {
        let mut runtime = Runtime::new();
        runtime.open_slot("title", None);
        runtime.write("Child");
        runtime.close_slot(false).expect("Should close slot");

        runtime.open_slot("title", None);
        runtime.write("Layout");
        runtime.close_slot(true).expect("Should close slot");

        assert_eq!(runtime.terminate(), "Child");
    }

    #[test]
    fn test_yield_before_definition_is_deferred() {
        let mut runtime = Runtime::new();
        runtime.write("<title>");
        runtime.yield_slot("title", Some("Untitled"));
        runtime.write("</title>");
        runtime.yield_slot("missing", None);

        runtime.open_slot("title", Some("Home"));
        assert_eq!(runtime.terminate(), "<title>Home</title>");
    }

    #[test]
    fn test_yield_default_for_undefined_slot() {
        let mut runtime = Runtime::new();
        runtime.yield_slot("title", Some("Untitled"));
        assert!(runtime.slot_missing("title"));
        assert_eq!(runtime.terminate(), "Untitled");
    }

    #[test]
    fn test_stack_ordering() {
        let mut runtime = Runtime::new();
        runtime.stack("scripts");
        runtime.push("scripts", Some("a"));
        runtime.push("scripts", Some("b"));
        assert_eq!(runtime.clone_output_for_test(), "a\nb");

        runtime.prepend("scripts", Some("c"));
        assert_eq!(runtime.terminate(), "c\na\nb");
    }

    #[test]
    fn test_captured_push_and_prepend() {
        let mut runtime = Runtime::new();
        runtime.push("css", None);
        runtime.write("main.css");
        runtime.end_push().expect("Should end push");
        runtime.prepend("css", None);
        runtime.write("reset.css");
        runtime.end_prepend().expect("Should end prepend");

        assert_eq!(runtime.stack_len("css"), 2);
        runtime.stack("css");
        assert_eq!(runtime.terminate(), "reset.css\nmain.css");
    }

    #[test]
    fn test_undefined_stack_is_empty() {
        let mut runtime = Runtime::new();
        runtime.write("[");
        runtime.stack("nothing");
        runtime.write("]");
        assert_eq!(runtime.terminate(), "[]");
    }

    #[test]
    fn test_once_guards() {
        let mut runtime = Runtime::new();
        assert!(runtime.once("once_abc"));
        assert!(!runtime.once("once_abc"));
        assert!(runtime.once("once_def"));
    }

    #[test]
    fn test_trim() {
        let mut runtime = Runtime::new();
        runtime.write("[");
        runtime.start_trim();
        runtime.write("  \n padded \n ");
        runtime.end_trim().expect("Should end trim");
        runtime.write("]");
        assert_eq!(runtime.terminate(), "[padded]");
    }

    #[test]
    fn test_close_without_open() {
        let mut runtime = Runtime::new();
        assert_eq!(
            runtime.close_slot(false),
            Err(RuntimeError::NothingToClose {
                expected: "section"
            })
        );
    }

    #[test]
    fn test_close_wrong_kind() {
        let mut runtime = Runtime::new();
        runtime.push("scripts", None);
        let err = runtime.close_slot(false).unwrap_err();
        assert_eq!(
            err,
            RuntimeError::MismatchedClose {
                expected: "section",
                open: "push to stack 'scripts'".to_string()
            }
        );
    }

    #[test]
    fn test_unclosed_capture_is_reported() {
        let mut runtime = Runtime::new();
        runtime.open_slot("content", None);
        assert_eq!(
            runtime.finish_template(),
            Err(RuntimeError::Unclosed {
                open: "section 'content'".to_string()
            })
        );
    }

    #[test]
    fn test_layout_and_discard() {
        let mut runtime = Runtime::new();
        runtime.write("child output");
        runtime.extends("base");
        runtime.extends("other");
        assert_eq!(runtime.take_layout(), Some("other".to_string()));
        assert_eq!(runtime.take_layout(), None);

        runtime.discard_output();
        runtime.write("layout output");
        assert_eq!(runtime.terminate(), "layout output");
    }

    #[test]
    fn test_post_processors_run_in_order_before_resolution() {
        let mut runtime = Runtime::new();
        runtime.add_post_processor(Arc::new(|text: &str| text.replace("a", "b")));
        runtime.add_post_processor(Arc::new(|text: &str| text.to_uppercase()));

        runtime.write("a-");
        runtime.yield_slot("name", None);
        runtime.open_slot("name", Some("aaa"));

        // Slot content is substituted after processing, so it stays lowercase.
        assert_eq!(runtime.terminate(), "B-aaa");
    }

    #[test]
    fn test_post_processor_sees_whole_output_once() {
        let mut runtime = Runtime::new();
        runtime.add_post_processor(Arc::new(|text: &str| format!("<!--x-->{}", text)));

        runtime.write("a");
        runtime.yield_slot("s", None);
        runtime.write("b");
        runtime.open_slot("s", Some("X"));

        assert_eq!(runtime.terminate(), "<!--x-->aXb");
    }

    impl Runtime {
        fn clone_output_for_test(&self) -> String {
            Resolver::new(&self.slots, &self.stacks).resolve(&self.root)
        }
    }
}
