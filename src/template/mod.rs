//! Template loading
//!
//! Templates are addressed by name. A plain name such as `pages/home` is
//! resolved against the root directory; a name with an alias prefix such as
//! `mail:welcome` is resolved against the directory registered for `mail`.
//! The configured extension (`.sigil` by default) is appended in both cases.

mod registry;
mod resolver;

pub use registry::{TemplateError, TemplateRegistry};
pub use resolver::{ResolutionChain, TemplateResolver, TemplateSource, DEFAULT_EXTENSION};
