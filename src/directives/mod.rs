//! Directive handlers
//!
//! Every `@name` the compiler recognizes is a [`Directive`] stored in a
//! [`DirectiveRegistry`]. Built-ins are installed when the registry is
//! created; user directives are registered afterwards and may not reuse a
//! name that is already taken.

mod conditional;
mod loops;
mod other;
mod slots;
mod stacks;

use std::collections::HashMap;
use std::fmt;

use thiserror::Error;

use crate::compiler::Scope;
use crate::error::CompileErrorKind;

/// Errors from directive registration
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DirectiveError {
    #[error("directive '@{name}' is already registered")]
    Duplicate { name: String },
}

/// A compile-time handler for one `@name`
///
/// `expression` is `Some` for the `@name{...}` form (already trimmed) and
/// `None` for the bare `@name` form.
pub trait Directive: Send + Sync {
    fn compile(
        &self,
        scope: &mut Scope<'_>,
        expression: Option<&str>,
    ) -> Result<String, CompileErrorKind>;
}

type Builtin = fn(&mut Scope<'_>, Option<&str>) -> Result<String, CompileErrorKind>;

struct BuiltinDirective(Builtin);

impl Directive for BuiltinDirective {
    fn compile(
        &self,
        scope: &mut Scope<'_>,
        expression: Option<&str>,
    ) -> Result<String, CompileErrorKind> {
        (self.0)(scope, expression)
    }
}

/// A user directive backed by a plain closure
struct FnDirective<F>(F);

impl<F> Directive for FnDirective<F>
where
    F: Fn(Option<&str>) -> String + Send + Sync,
{
    fn compile(
        &self,
        _scope: &mut Scope<'_>,
        expression: Option<&str>,
    ) -> Result<String, CompileErrorKind> {
        Ok((self.0)(expression))
    }
}

/// Name to handler map, pre-populated with the built-in directives
pub struct DirectiveRegistry {
    directives: HashMap<String, Box<dyn Directive>>,
}

impl Default for DirectiveRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for DirectiveRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.names();
        names.sort_unstable();
        f.debug_struct("DirectiveRegistry")
            .field("directives", &names)
            .finish()
    }
}

impl DirectiveRegistry {
    /// Create a registry holding all built-in directives
    pub fn new() -> Self {
        let mut registry = Self::empty();
        conditional::install(&mut registry);
        loops::install(&mut registry);
        slots::install(&mut registry);
        stacks::install(&mut registry);
        other::install(&mut registry);
        registry
    }

    /// Create a registry with no directives at all
    pub fn empty() -> Self {
        Self {
            directives: HashMap::new(),
        }
    }

    /// Register a closure as a user directive
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> Result<(), DirectiveError>
    where
        F: Fn(Option<&str>) -> String + Send + Sync + 'static,
    {
        self.register_directive(name, Box::new(FnDirective(handler)))
    }

    /// Register a full directive implementation
    pub fn register_directive(
        &mut self,
        name: impl Into<String>,
        directive: Box<dyn Directive>,
    ) -> Result<(), DirectiveError> {
        let name = name.into();
        if self.directives.contains_key(&name) {
            return Err(DirectiveError::Duplicate { name });
        }
        self.directives.insert(name, directive);
        Ok(())
    }

    fn builtin(&mut self, name: &str, handler: Builtin) {
        debug_assert!(
            !self.directives.contains_key(name),
            "built-in directive installed twice: {name}"
        );
        self.directives
            .insert(name.to_string(), Box::new(BuiltinDirective(handler)));
    }

    pub fn contains(&self, name: &str) -> bool {
        self.directives.contains_key(name)
    }

    pub fn get(&self, name: &str) -> Option<&dyn Directive> {
        self.directives.get(name).map(|d| d.as_ref())
    }

    pub fn names(&self) -> Vec<&str> {
        self.directives.keys().map(String::as_str).collect()
    }
}

/// Reject the bare form of a directive that needs an expression
fn require<'e>(directive: &str, expression: Option<&'e str>) -> Result<&'e str, CompileErrorKind> {
    expression.ok_or_else(|| CompileErrorKind::MissingExpression {
        name: directive.to_string(),
    })
}
