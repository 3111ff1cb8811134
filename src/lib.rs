//! Sigil - a compiler and composition runtime for an `@`-directive template language
//!
//! Templates are compiled to generated code, cached on disk, and executed by
//! a [`host::Host`] against a per-render [`runtime::Runtime`] that collects
//! sections, stacks and layout declarations.
//!
//! # Example
//!
//! ```rust
//! let code = sigil::compile("Hello @{ $name }@if{$admin, ' (admin)'}").unwrap();
//! assert_eq!(
//!     code,
//!     "Hello <?php echo htmlentities($name) ?><?php if ($admin) : echo htmlentities( ' (admin)'); endif ?>"
//! );
//! ```

pub mod cache;
pub mod compiler;
pub mod config;
pub mod directives;
pub mod engine;
pub mod error;
pub mod host;
pub mod runtime;
pub mod template;

pub use cache::{CacheError, CacheManager, CacheOptions};
pub use compiler::{Compiler, CompilerOptions};
pub use config::{ConfigError, EngineConfig};
pub use directives::{Directive, DirectiveError};
pub use engine::Engine;
pub use error::{CompileError, CompileErrorKind, ParseError};
pub use host::{Host, HostError, ScriptHost, Variables};
pub use runtime::{Runtime, RuntimeError};
pub use template::{TemplateError, TemplateResolver};

use thiserror::Error;

/// Errors that can occur while compiling or rendering a template
#[derive(Debug, Error)]
pub enum RenderError {
    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Template(#[from] TemplateError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    Directive(#[from] DirectiveError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Host(HostError),
}

impl From<HostError> for RenderError {
    fn from(err: HostError) -> Self {
        match err {
            HostError::Render(inner) => *inner,
            HostError::Runtime(inner) => RenderError::Runtime(inner),
            other => RenderError::Host(other),
        }
    }
}

/// Compile template source with the built-in directives and default options
pub fn compile(source: &str) -> Result<String, CompileError> {
    Compiler::default().compile_str(source)
}
