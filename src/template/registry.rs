//! Alias registry mapping short prefixes to template directories

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur during template operations
#[derive(Debug, Error)]
pub enum TemplateError {
    /// Name used an `alias:` prefix that was never registered
    #[error("alias not found: '{alias}' (in template name '{name}')")]
    AliasNotFound { alias: String, name: String },

    /// Alias registered twice
    #[error("duplicate alias definition: {alias}")]
    DuplicateAlias { alias: String },

    /// Template name resolves to nothing readable
    #[error("template not found: '{name}' (looked in {path})")]
    NotFound { name: String, path: PathBuf },

    /// Error reading template file
    #[error("error reading template file {path}: {message}")]
    FileReadError { path: PathBuf, message: String },

    /// Layout or include chain revisits a template
    #[error("circular template reference detected: {chain}")]
    CircularReference { chain: String },
}

/// Registry of template directory aliases
///
/// A name such as `mail:welcome` looks up `mail` here and resolves `welcome`
/// against the registered directory instead of the root.
#[derive(Debug, Default, Clone)]
pub struct TemplateRegistry {
    aliases: BTreeMap<String, PathBuf>,
}

impl TemplateRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a directory under `alias`
    pub fn register(
        &mut self,
        alias: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Result<(), TemplateError> {
        let alias = alias.into();
        if self.aliases.contains_key(&alias) {
            return Err(TemplateError::DuplicateAlias { alias });
        }
        self.aliases.insert(alias, directory.into());
        Ok(())
    }

    /// Get the directory registered for an alias
    pub fn get(&self, alias: &str) -> Option<&Path> {
        self.aliases.get(alias).map(PathBuf::as_path)
    }

    /// Check if an alias exists
    pub fn contains(&self, alias: &str) -> bool {
        self.aliases.contains_key(alias)
    }

    /// Iterate over registered aliases in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Path)> {
        self.aliases
            .iter()
            .map(|(alias, dir)| (alias.as_str(), dir.as_path()))
    }

    pub fn len(&self) -> usize {
        self.aliases.len()
    }

    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_and_lookup() {
        let mut registry = TemplateRegistry::new();
        registry
            .register("mail", "/srv/views/mail")
            .expect("Should register alias");

        assert!(registry.contains("mail"));
        assert_eq!(registry.get("mail"), Some(Path::new("/srv/views/mail")));
        assert_eq!(registry.get("admin"), None);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_duplicate_alias_rejected() {
        let mut registry = TemplateRegistry::new();
        registry.register("mail", "a").expect("Should register alias");

        let err = registry.register("mail", "b").unwrap_err();
        assert!(matches!(err, TemplateError::DuplicateAlias { alias } if alias == "mail"));
        assert_eq!(registry.get("mail"), Some(Path::new("a")));
    }

    #[test]
    fn test_iter_is_sorted() {
        let mut registry = TemplateRegistry::new();
        registry.register("zeta", "z").expect("Should register alias");
        registry.register("alpha", "a").expect("Should register alias");

        let names: Vec<_> = registry.iter().map(|(alias, _)| alias).collect();
        assert_eq!(names, vec!["alpha", "zeta"]);
    }
}
