//! Raw code, serialization, once-guards, trimming and template composition

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use sha2::{Digest, Sha256};

use super::{require, DirectiveRegistry};
use crate::compiler::{Block, Scope};
use crate::error::CompileErrorKind;

const DEFAULT_JSON_FLAGS: &str = "JSON_HEX_TAG | JSON_HEX_APOS | JSON_HEX_AMP | JSON_HEX_QUOT";
const DEFAULT_JSON_DEPTH: &str = "512";

pub(super) fn install(registry: &mut DirectiveRegistry) {
    registry.builtin("php", compile_php);
    registry.builtin("endphp", compile_endphp);
    registry.builtin("json", compile_json);
    registry.builtin("once", compile_once);
    registry.builtin("trim", compile_trim);
    registry.builtin("endtrim", compile_endtrim);
    registry.builtin("extends", compile_extends);
    registry.builtin("include", compile_include);
    registry.builtin("end", compile_end);
}

fn compile_php(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    match expression {
        Some(code) => Ok(format!("<?php {} ?>", code)),
        None => {
            scope.open(Block::Php);
            Ok("<?php".to_string())
        }
    }
}

fn compile_endphp(scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::Php]);
    Ok(Block::Php.closer().to_string())
}

/// `value[, flags[, depth]]`
fn compile_json(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("json", expression)?;
    let mut parts = expression.split(',').map(str::trim);
    let value = parts.next().unwrap_or_default();
    let flags = parts.next().unwrap_or(DEFAULT_JSON_FLAGS);
    let depth = parts.next().unwrap_or(DEFAULT_JSON_DEPTH);

    Ok(format!(
        "<?php echo {}({}, {}, {}) ?>",
        scope.options().serialize_function,
        value,
        flags,
        depth
    ))
}

/// Unique guard key, fixed at compile time
fn once_id() -> String {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let count = COUNTER.fetch_add(1, Ordering::Relaxed);
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_nanos())
        .unwrap_or_default();
    let digest = Sha256::digest(format!("{}:{}:{}", std::process::id(), nanos, count).as_bytes());
    let hex = format!("{:x}", digest);
    format!("once_{}", &hex[..13])
}

fn compile_once(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let id = once_id();
    match expression {
        Some(value) => Ok(format!(
            "<?php if ($this->once('{}')) : echo {}; endif ?>",
            id,
            scope.escape(value)
        )),
        None => {
            scope.open(Block::If);
            Ok(format!("<?php if ($this->once('{}')) : ?>", id))
        }
    }
}

fn compile_trim(scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    scope.open(Block::Trim);
    Ok("<?php $this->startTrim() ?>".to_string())
}

fn compile_endtrim(scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::Trim]);
    Ok(Block::Trim.closer().to_string())
}

fn compile_extends(_scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("extends", expression)?;
    Ok(format!("<?php $this->extends({}) ?>", expression))
}

/// A single- or double-quoted name with no other quotes inside
fn literal_name(expression: &str) -> Option<&str> {
    let quote = expression.chars().next().filter(|c| *c == '\'' || *c == '"')?;
    let inner = expression.strip_prefix(quote)?.strip_suffix(quote)?;
    if inner.contains(['\'', '"']) {
        return None;
    }
    Some(inner)
}

/// Production builds splice literal includes in at compile time
fn compile_include(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("include", expression)?;

    if !scope.options().debug {
        if let Some(name) = literal_name(expression) {
            return scope.include(name);
        }
    }
    Ok(format!("<?php $this->include({}) ?>", expression))
}

fn compile_end(scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let block = scope.pop().ok_or(CompileErrorKind::UnbalancedDirective)?;
    Ok(block.closer().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{Compiler, CompilerOptions};
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> String {
        Compiler::default()
            .compile_str(source)
            .expect("Should compile")
    }

    #[test]
    fn test_php_block() {
        assert_eq!(compile("@php $test = 1 + 1; @end"), "<?php $test = 1 + 1; ?>");
        assert_eq!(compile("@php $a = 2; @endphp"), "<?php $a = 2; ?>");
    }

    #[test]
    fn test_php_inline() {
        assert_eq!(compile("@php{$a = 1}"), "<?php $a = 1 ?>");
    }

    #[test]
    fn test_json_defaults() {
        assert_eq!(
            compile("@json{$products}"),
            "<?php echo json_encode($products, JSON_HEX_TAG | JSON_HEX_APOS | JSON_HEX_AMP | JSON_HEX_QUOT, 512) ?>"
        );
    }

    #[test]
    fn test_json_with_flags_and_depth() {
        assert_eq!(
            compile("@json{$a, JSON_PRETTY_PRINT, 8}"),
            "<?php echo json_encode($a, JSON_PRETTY_PRINT, 8) ?>"
        );
    }

    #[test]
    fn test_once_block() {
        let code = compile("@once<script></script>@end");
        assert!(code.starts_with("<?php if ($this->once('once_"));
        assert!(code.ends_with("')) : ?><script></script><?php endif ?>"));
    }

    #[test]
    fn test_once_ids_are_unique() {
        let first = once_id();
        let second = once_id();
        assert_ne!(first, second);
        assert_eq!(first.len(), "once_".len() + 13);
    }

    #[test]
    fn test_once_expression() {
        let code = compile("@once{$banner}");
        assert!(code.contains("echo htmlentities($banner); endif ?>"));
    }

    #[test]
    fn test_trim() {
        assert_eq!(
            compile("@trim  x  @end"),
            "<?php $this->startTrim() ?>  x  <?php $this->endTrim() ?>"
        );
        assert_eq!(
            compile("@trim x @endtrim"),
            "<?php $this->startTrim() ?> x <?php $this->endTrim() ?>"
        );
    }

    #[test]
    fn test_extends() {
        assert_eq!(compile("@extends{'base'}"), "<?php $this->extends('base') ?>");
    }

    #[test]
    fn test_include_in_debug_mode_stays_runtime() {
        let compiler = Compiler::default().with_options(CompilerOptions {
            debug: true,
            ..CompilerOptions::default()
        });
        assert_eq!(
            compiler.compile_str("@include{'partial'}").expect("Should compile"),
            "<?php $this->include('partial') ?>"
        );
    }

    #[test]
    fn test_include_with_dynamic_name_stays_runtime() {
        assert_eq!(
            compile("@include{$partial}"),
            "<?php $this->include($partial) ?>"
        );
    }

    #[test]
    fn test_literal_name() {
        assert_eq!(literal_name("'home'"), Some("home"));
        assert_eq!(literal_name("\"mail:welcome\""), Some("mail:welcome"));
        assert_eq!(literal_name("'a' . $b"), None);
        assert_eq!(literal_name("$name"), None);
        assert_eq!(literal_name("'"), None);
    }

    #[test]
    fn test_unbalanced_end() {
        let err = Compiler::default().compile_str("one\n@end").unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnbalancedDirective);
        assert_eq!(err.line, 2);
    }
}
