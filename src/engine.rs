//! Rendering: cache lookups, host execution and the layout chain

use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::debug;
use serde_json::Value;

use crate::cache::{Artifact, CacheError, CacheManager};
use crate::compiler::Compiler;
use crate::config::EngineConfig;
use crate::directives::DirectiveError;
use crate::error::CompileError;
use crate::host::{Frame, Host, ScriptHost, Variables};
use crate::runtime::{PostProcessor, Runtime};
use crate::template::{ResolutionChain, TemplateError, TemplateResolver};
use crate::RenderError;

/// Compiles, caches and renders templates
///
/// One engine serves concurrent renders: every render owns its [`Runtime`],
/// and the cache serializes rebuilds of the same artifact.
pub struct Engine {
    compiler: Compiler,
    cache: CacheManager,
    host: Box<dyn Host>,
    globals: Variables,
    post_processors: Vec<PostProcessor>,
}

impl Engine {
    /// Build an engine running generated code on [`ScriptHost`]
    pub fn new(config: EngineConfig) -> Result<Self, TemplateError> {
        let mut templates = TemplateResolver::new(&config.root).with_extension(&config.extension);
        for (alias, directory) in &config.aliases {
            templates.alias(alias, directory)?;
        }

        let options = config.compiler_options();
        let host = ScriptHost::new(&options);
        Ok(Self {
            compiler: Compiler::new(templates).with_options(options),
            cache: CacheManager::new(config.cache_options()),
            host: Box::new(host),
            globals: Variables::new(),
            post_processors: Vec::new(),
        })
    }

    /// Replace the host that executes generated code
    pub fn with_host(mut self, host: impl Host + 'static) -> Self {
        self.host = Box::new(host);
        self
    }

    pub fn alias(
        &mut self,
        alias: impl Into<String>,
        directory: impl Into<PathBuf>,
    ) -> Result<(), TemplateError> {
        self.compiler.templates_mut().alias(alias, directory)
    }

    /// Register a user directive; see [`Compiler::register`]
    pub fn register_directive<F>(
        &mut self,
        name: impl Into<String>,
        handler: F,
    ) -> Result<(), DirectiveError>
    where
        F: Fn(Option<&str>) -> String + Send + Sync + 'static,
    {
        self.compiler.register(name, handler)
    }

    pub fn compiler(&self) -> &Compiler {
        &self.compiler
    }

    pub fn compiler_mut(&mut self) -> &mut Compiler {
        &mut self.compiler
    }

    pub fn cache(&self) -> &CacheManager {
        &self.cache
    }

    /// Set one global variable, replacing any previous value
    pub fn set_global(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.globals.insert(name.into(), value.into());
    }

    /// Add globals; names that are already set keep their value
    pub fn set_globals(&mut self, variables: Variables) {
        for (name, value) in variables {
            self.globals.entry(name).or_insert(value);
        }
    }

    pub fn globals(&self) -> &Variables {
        &self.globals
    }

    /// Register a callback run over literal output text at the end of every render
    pub fn add_post_processor<F>(&mut self, processor: F)
    where
        F: Fn(&str) -> String + Send + Sync + 'static,
    {
        self.post_processors.push(Arc::new(processor));
    }

    /// Compile a template and store the artifact, fresh or not
    pub fn compile(&self, name: &str) -> Result<String, RenderError> {
        if !self.cache.options().enabled {
            return self.compiler.compile(name);
        }

        let _guard = self.cache.lock(name)?;
        let code = self.compiler.compile(name)?;
        let path = self.cache.store(name, &code)?;
        self.host.invalidate(&path);
        Ok(code)
    }

    pub fn compile_inline(&self, source: &str) -> Result<String, CompileError> {
        self.compiler.compile_str(source)
    }

    pub fn needs_rebuild(&self, name: &str) -> bool {
        self.cache
            .needs_rebuild(name, self.compiler.templates().modified(name))
    }

    pub fn artifact_path(&self, name: &str) -> PathBuf {
        self.cache.artifact_path(name)
    }

    /// Invalidate every cached artifact
    pub fn flush(&self) -> Result<(), CacheError> {
        self.cache.flush()
    }

    /// Compiled code for a template, from the cache when it is fresh
    pub fn load(&self, name: &str) -> Result<Artifact, RenderError> {
        let modified = self.compiler.templates().modified(name);
        let artifact = self
            .cache
            .load(name, modified, || self.compiler.compile(name))?;

        if artifact.rebuilt {
            if let Some(path) = &artifact.path {
                self.host.invalidate(path);
            }
        }
        Ok(artifact)
    }

    /// Render a template and every layout it extends
    ///
    /// Globals fill in names the caller did not pass. Each layout runs with
    /// the same variables and sees the slots and stacks its children left.
    pub fn render(&self, name: &str, variables: Variables) -> Result<String, RenderError> {
        let mut variables = variables;
        for (key, value) in &self.globals {
            variables
                .entry(key.clone())
                .or_insert_with(|| value.clone());
        }

        let mut runtime = Runtime::new();
        for processor in &self.post_processors {
            runtime.add_post_processor(Arc::clone(processor));
        }

        let mut layouts = ResolutionChain::new();
        let mut current = name.to_string();
        loop {
            layouts.enter(&current)?;
            self.execute(&current, &mut runtime, variables.clone())?;
            runtime.finish_template()?;

            match runtime.take_layout() {
                Some(layout) => {
                    debug!("'{}' extends '{}'", current, layout);
                    runtime.discard_output();
                    current = layout;
                }
                None => break,
            }
        }

        Ok(runtime.terminate())
    }

    fn execute(
        &self,
        name: &str,
        runtime: &mut Runtime,
        variables: Variables,
    ) -> Result<(), RenderError> {
        let mut includes = ResolutionChain::new();
        let mut frame = Frame::new(self, runtime, variables, &mut includes);
        self.include(name, &mut frame)
    }

    /// Run a template inside an existing frame
    pub(crate) fn include(&self, name: &str, frame: &mut Frame<'_>) -> Result<(), RenderError> {
        frame.chain.enter(name)?;
        let artifact = self.load(name)?;
        self.host.execute(&artifact.code, frame)?;
        frame.chain.leave();
        Ok(())
    }

    /// Path of the template source for `name`
    pub fn source_path(&self, name: &str) -> Result<PathBuf, TemplateError> {
        self.compiler.templates().resolve(name)
    }

    pub fn root(&self) -> &Path {
        self.compiler.templates().root()
    }
}
