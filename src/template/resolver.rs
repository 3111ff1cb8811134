//! Template resolution - turns template names into files and source text

use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use super::registry::{TemplateError, TemplateRegistry};

/// Default file extension appended to template names
pub const DEFAULT_EXTENSION: &str = ".sigil";

/// Source text of a loaded template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateSource {
    pub name: String,
    pub path: PathBuf,
    pub text: String,
}

/// Resolves template names against a root directory and an alias table
#[derive(Debug, Clone)]
pub struct TemplateResolver {
    root: PathBuf,
    extension: String,
    aliases: TemplateRegistry,
}

impl Default for TemplateResolver {
    fn default() -> Self {
        Self::new(".")
    }
}

impl TemplateResolver {
    /// Create a resolver rooted at `root`
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            extension: DEFAULT_EXTENSION.to_string(),
            aliases: TemplateRegistry::new(),
        }
    }

    /// Use a different file extension (including the leading dot)
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into();
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn aliases(&self) -> &TemplateRegistry {
        &self.aliases
    }

    /// Register an alias directory
    pub fn alias(
        &mut self,
        alias: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Result<(), TemplateError> {
        self.aliases.register(alias, directory)
    }

    /// Map a template name to its source path
    ///
    /// Text before the first `:` selects an alias directory. Leading slashes
    /// of the remaining path are ignored.
    pub fn resolve(&self, name: &str) -> Result<PathBuf, TemplateError> {
        let (base, path) = match name.split_once(':') {
            Some((alias, rest)) => {
                let dir = self
                    .aliases
                    .get(alias)
                    .ok_or_else(|| TemplateError::AliasNotFound {
                        alias: alias.to_string(),
                        name: name.to_string(),
                    })?;
                (dir, rest)
            }
            None => (self.root.as_path(), name),
        };

        let file = format!("{}{}", path.trim_start_matches('/'), self.extension);
        Ok(base.join(file))
    }

    /// Resolve and read a template
    pub fn load(&self, name: &str) -> Result<TemplateSource, TemplateError> {
        let path = self.resolve(name)?;
        let text = fs::read_to_string(&path).map_err(|err| {
            if err.kind() == std::io::ErrorKind::NotFound {
                TemplateError::NotFound {
                    name: name.to_string(),
                    path: path.clone(),
                }
            } else {
                TemplateError::FileReadError {
                    path: path.clone(),
                    message: err.to_string(),
                }
            }
        })?;

        Ok(TemplateSource {
            name: name.to_string(),
            path,
            text,
        })
    }

    /// Modification time of a template's source file, if it can be read
    pub fn modified(&self, name: &str) -> Option<SystemTime> {
        let path = self.resolve(name).ok()?;
        fs::metadata(path).and_then(|meta| meta.modified()).ok()
    }
}

/// Templates currently being rendered, for cycle detection
#[derive(Debug, Clone, Default)]
pub struct ResolutionChain {
    order: Vec<String>,
    resolving: HashSet<String>,
}

impl ResolutionChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// Check if a template is currently being resolved
    pub fn is_resolving(&self, name: &str) -> bool {
        self.resolving.contains(name)
    }

    /// Mark a template as being resolved, failing if it already is
    pub fn enter(&mut self, name: &str) -> Result<(), TemplateError> {
        if self.is_resolving(name) {
            let mut chain = self.order.clone();
            chain.push(name.to_string());
            return Err(TemplateError::CircularReference {
                chain: chain.join(" -> "),
            });
        }
        self.order.push(name.to_string());
        self.resolving.insert(name.to_string());
        Ok(())
    }

    /// Mark the most recently entered template as done
    pub fn leave(&mut self) {
        if let Some(name) = self.order.pop() {
            self.resolving.remove(&name);
        }
    }

    pub fn depth(&self) -> usize {
        self.order.len()
    }
}
