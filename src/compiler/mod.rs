//! Template compiler
//!
//! Turns template source into generated code in a single left-to-right pass.
//! Text outside of `@` constructs is copied verbatim; `@{ ... }` becomes an
//! echo; `@name{...}` and `@name` are handed to the directive registry. An
//! `@word` that names no directive is left in the output untouched, so plain
//! text such as an email address survives compilation.

pub mod block;
mod scanner;

pub use block::Block;

use log::warn;

use crate::directives::{Directive, DirectiveError, DirectiveRegistry};
use crate::error::{CompileError, CompileErrorKind};
use crate::template::TemplateResolver;
use crate::RenderError;

/// Settings that change the generated code
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Debug mode keeps `@include` as a runtime call
    pub debug: bool,
    /// Host function used to escape `@{ ... }` output
    pub escape_function: String,
    /// Host function used by `@json`
    pub serialize_function: String,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        Self {
            debug: false,
            escape_function: "htmlentities".to_string(),
            serialize_function: "json_encode".to_string(),
        }
    }
}

/// Compiles template source into generated code
#[derive(Debug)]
pub struct Compiler {
    directives: DirectiveRegistry,
    templates: TemplateResolver,
    options: CompilerOptions,
}

impl Default for Compiler {
    fn default() -> Self {
        Self::new(TemplateResolver::default())
    }
}

impl Compiler {
    pub fn new(templates: TemplateResolver) -> Self {
        Self {
            directives: DirectiveRegistry::new(),
            templates,
            options: CompilerOptions::default(),
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    pub fn templates(&self) -> &TemplateResolver {
        &self.templates
    }

    pub fn templates_mut(&mut self) -> &mut TemplateResolver {
        &mut self.templates
    }

    pub fn directives(&self) -> &DirectiveRegistry {
        &self.directives
    }

    /// Register a closure as a user directive
    ///
    /// The closure receives the trimmed expression, or `None` for the bare
    /// form, and returns the code to emit.
    pub fn register<F>(&mut self, name: impl Into<String>, handler: F) -> Result<(), DirectiveError>
    where
        F: Fn(Option<&str>) -> String + Send + Sync + 'static,
    {
        self.directives.register(name, handler)
    }

    /// Register a directive that needs access to the compile scope
    pub fn register_directive(
        &mut self,
        name: impl Into<String>,
        directive: Box<dyn Directive>,
    ) -> Result<(), DirectiveError> {
        self.directives.register_directive(name, directive)
    }

    pub fn is_directive(&self, name: &str) -> bool {
        self.directives.contains(name)
    }

    /// Compile template source text
    pub fn compile_str(&self, source: &str) -> Result<String, CompileError> {
        self.compile_source(source, Vec::new())
    }

    /// Load a template by name and compile it
    pub fn compile(&self, name: &str) -> Result<String, RenderError> {
        let source = self.templates.load(name)?;
        let code = self
            .compile_source(&source.text, vec![name.to_string()])
            .map_err(|err| err.with_file(&source.path))?;
        Ok(code)
    }

    fn compile_source(&self, source: &str, includes: Vec<String>) -> Result<String, CompileError> {
        let mut scope = Scope::new(self, includes);
        let code = scanner::scan(source, &mut scope)?;

        if !scope.blocks.is_empty() {
            let open: Vec<String> = scope.blocks.iter().map(Block::to_string).collect();
            warn!(
                "template{} ends with unclosed directives: {}",
                scope
                    .includes
                    .last()
                    .map(|name| format!(" '{name}'"))
                    .unwrap_or_default(),
                open.join(", ")
            );
        }

        Ok(code)
    }

    /// Compile a template for splicing into the current one
    fn compile_included(&self, name: &str, chain: &[String]) -> Result<String, CompileErrorKind> {
        if chain.iter().any(|entry| entry == name) {
            let mut cycle = chain.to_vec();
            cycle.push(name.to_string());
            return Err(CompileErrorKind::Include {
                name: name.to_string(),
                reason: format!("circular include: {}", cycle.join(" -> ")),
            });
        }

        let source = self
            .templates
            .load(name)
            .map_err(|err| CompileErrorKind::Include {
                name: name.to_string(),
                reason: err.to_string(),
            })?;

        let mut chain = chain.to_vec();
        chain.push(name.to_string());
        self.compile_source(&source.text, chain)
            .map_err(|err| match err.kind {
                kind @ CompileErrorKind::Include { .. } => kind,
                _ => CompileErrorKind::Include {
                    name: name.to_string(),
                    reason: err.with_file(&source.path).to_string(),
                },
            })
    }
}

/// Per-compilation state handed to directive handlers
pub struct Scope<'c> {
    compiler: &'c Compiler,
    blocks: Vec<Block>,
    includes: Vec<String>,
}

impl<'c> Scope<'c> {
    fn new(compiler: &'c Compiler, includes: Vec<String>) -> Self {
        Self {
            compiler,
            blocks: Vec::new(),
            includes,
        }
    }

    pub fn compiler(&self) -> &'c Compiler {
        self.compiler
    }

    pub fn options(&self) -> &'c CompilerOptions {
        &self.compiler.options
    }

    /// Record a directive that waits for a closer
    pub fn open(&mut self, block: Block) {
        self.blocks.push(block);
    }

    pub fn top(&self) -> Option<Block> {
        self.blocks.last().copied()
    }

    pub fn pop(&mut self) -> Option<Block> {
        self.blocks.pop()
    }

    /// Pop the innermost block if it is one of `kinds`
    pub fn close(&mut self, kinds: &[Block]) -> Option<Block> {
        let top = self.top()?;
        if kinds.contains(&top) {
            self.blocks.pop()
        } else {
            None
        }
    }

    /// Change the kind of the innermost block
    pub fn retag(&mut self, block: Block) {
        if let Some(top) = self.blocks.last_mut() {
            *top = block;
        }
    }

    /// Wrap an expression in the configured escape function
    pub fn escape(&self, expression: &str) -> String {
        format!("{}({})", self.options().escape_function, expression)
    }

    /// Compile another template for inline splicing
    pub fn include(&mut self, name: &str) -> Result<String, CompileErrorKind> {
        self.compiler.compile_included(name, &self.includes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::fs;

    fn compile(source: &str) -> String {
        Compiler::default()
            .compile_str(source)
            .expect("Should compile")
    }

    #[test]
    fn test_plain_text_is_unchanged() {
        assert_eq!(compile("Hello there, john@doe.com"), "Hello there, john@doe.com");
    }

    #[test]
    fn test_user_directive() {
        let mut compiler = Compiler::default();
        compiler
            .register("test", |expression| {
                format!("var testing = <?php echo {} ?>", expression.unwrap_or_default())
            })
            .expect("Should register directive");

        assert!(compiler.is_directive("test"));
        assert_eq!(
            compiler.compile_str("@test{$test}").expect("Should compile"),
            "var testing = <?php echo $test ?>"
        );
    }

    #[test]
    fn test_custom_escape_function() {
        let compiler = Compiler::default().with_options(CompilerOptions {
            escape_function: "e".to_string(),
            ..CompilerOptions::default()
        });
        assert_eq!(
            compiler.compile_str("@{ $name }").expect("Should compile"),
            "<?php echo e($name) ?>"
        );
    }

    #[test]
    fn test_compile_by_name_annotates_file() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        fs::write(dir.path().join("broken.sigil"), "line one\n@{ $oops").expect("Should write");

        let compiler = Compiler::new(TemplateResolver::new(dir.path()));
        let err = compiler.compile("broken").unwrap_err();
        match err {
            RenderError::Compile(err) => {
                assert_eq!(err.line, 2);
                assert_eq!(err.file, Some(dir.path().join("broken.sigil")));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_inline_include_in_production() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        fs::write(dir.path().join("partial.sigil"), "<b>@{ $name }</b>").expect("Should write");

        let compiler = Compiler::new(TemplateResolver::new(dir.path()));
        assert_eq!(
            compiler
                .compile_str("before @include{'partial'} after")
                .expect("Should compile"),
            "before <b><?php echo htmlentities($name) ?></b> after"
        );
    }

    #[test]
    fn test_include_cycle_is_rejected() {
        let dir = tempfile::tempdir().expect("Should create temp dir");
        fs::write(dir.path().join("a.sigil"), "@include{'b'}").expect("Should write");
        fs::write(dir.path().join("b.sigil"), "@include{'a'}").expect("Should write");

        let compiler = Compiler::new(TemplateResolver::new(dir.path()));
        let err = compiler.compile("a").unwrap_err();
        match err {
            RenderError::Compile(err) => match err.kind {
                CompileErrorKind::Include { reason, .. } => {
                    assert!(reason.contains("a -> b -> a"), "reason was: {reason}");
                }
                other => panic!("unexpected kind: {other:?}"),
            },
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_unclosed_block_is_not_fatal() {
        assert_eq!(compile("@if{$a} open"), "<?php if ($a) : ?> open");
    }
}
