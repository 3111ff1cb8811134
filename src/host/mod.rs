//! Execution of generated code
//!
//! The engine hands generated code to a [`Host`] together with a [`Frame`]:
//! the render's [`Runtime`], the variables in scope and the chain of
//! templates being included. [`ScriptHost`] is the built-in host; it runs the
//! statement forms the built-in directives emit.

pub mod ast;
pub mod grammar;
pub mod interpreter;
pub mod lexer;
pub mod value;

use std::path::Path;

use thiserror::Error;

pub use interpreter::ScriptHost;

use crate::engine::Engine;
use crate::error::ParseError;
use crate::runtime::{Runtime, RuntimeError};
use crate::template::ResolutionChain;
use crate::RenderError;

/// Variables visible to generated code
pub type Variables = serde_json::Map<String, serde_json::Value>;

/// Runs generated code against a render frame
pub trait Host: Send + Sync {
    fn execute(&self, code: &str, frame: &mut Frame<'_>) -> Result<(), HostError>;

    /// Called after the artifact at `path` has been overwritten
    fn invalidate(&self, _artifact: &Path) {}
}

/// Everything generated code can reach while one template executes
pub struct Frame<'r> {
    pub(crate) engine: &'r Engine,
    pub(crate) runtime: &'r mut Runtime,
    pub(crate) variables: Variables,
    pub(crate) chain: &'r mut ResolutionChain,
}

impl<'r> Frame<'r> {
    pub(crate) fn new(
        engine: &'r Engine,
        runtime: &'r mut Runtime,
        variables: Variables,
        chain: &'r mut ResolutionChain,
    ) -> Self {
        Self {
            engine,
            runtime,
            variables,
            chain,
        }
    }

    pub fn runtime(&mut self) -> &mut Runtime {
        self.runtime
    }

    pub fn variables(&self) -> &Variables {
        &self.variables
    }

    pub fn variables_mut(&mut self) -> &mut Variables {
        &mut self.variables
    }

    pub fn write(&mut self, text: &str) {
        self.runtime.write(text);
    }

    /// Render another template into the current output
    ///
    /// The included template sees the current variables overlaid with
    /// `variables`; its assignments do not leak back.
    pub fn include(&mut self, name: &str, variables: Variables) -> Result<(), HostError> {
        let engine = self.engine;
        let mut scope = self.variables.clone();
        scope.extend(variables);

        let mut frame = Frame {
            engine,
            runtime: &mut *self.runtime,
            variables: scope,
            chain: &mut *self.chain,
        };
        engine
            .include(name, &mut frame)
            .map_err(|err| HostError::Render(Box::new(err)))
    }

    pub fn extends(&mut self, layout: &str) {
        self.runtime.extends(layout);
    }
}

/// Failure while executing generated code
#[derive(Debug, Error)]
pub enum HostError {
    #[error("syntax error in generated code: {}", format_errors(.errors))]
    Parse { errors: Vec<ParseError>, code: String },

    #[error("malformed generated code: {0}")]
    Structure(String),

    #[error("call to undefined function {0}()")]
    UndefinedFunction(String),

    #[error("call to undefined method $this->{0}()")]
    UndefinedMethod(String),

    #[error("use of undefined constant {0}")]
    UndefinedConstant(String),

    #[error("{0}")]
    Eval(String),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Render(Box<RenderError>),
}

fn format_errors(errors: &[ParseError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl HostError {
    /// Render syntax errors against the generated code with ariadne
    pub fn format(&self) -> String {
        match self {
            HostError::Parse { errors, code } => errors
                .iter()
                .map(|err| err.format(code, "generated"))
                .collect::<Vec<_>>()
                .join("\n"),
            other => other.to_string(),
        }
    }
}
