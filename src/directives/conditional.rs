//! `@if` and friends

use super::{require, DirectiveRegistry};
use crate::compiler::{Block, Scope};
use crate::error::CompileErrorKind;

pub(super) fn install(registry: &mut DirectiveRegistry) {
    registry.builtin("if", compile_if);
    registry.builtin("elseif", compile_elseif);
    registry.builtin("else", compile_else);
    registry.builtin("endif", compile_endif);
    registry.builtin("unless", compile_unless);
    registry.builtin("isset", compile_isset);
    registry.builtin("empty", compile_empty);
}

/// Block form, or the one-line `cond, then[, otherwise]` form
pub(super) fn conditional(scope: &mut Scope<'_>, expression: &str) -> String {
    let parts: Vec<&str> = expression.splitn(3, ',').collect();
    match parts.as_slice() {
        [condition, then] => format!(
            "<?php if ({}) : echo {}; endif ?>",
            condition,
            scope.escape(then)
        ),
        [condition, then, otherwise] => format!(
            "<?php if ({}) : echo {}; else : echo {}; endif ?>",
            condition,
            scope.escape(then),
            scope.escape(otherwise)
        ),
        _ => {
            scope.open(Block::If);
            format!("<?php if ({}) : ?>", expression)
        }
    }
}

fn compile_if(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("if", expression)?;
    Ok(conditional(scope, expression))
}

fn compile_elseif(
    _scope: &mut Scope<'_>,
    expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    let expression = require("elseif", expression)?;
    Ok(format!("<?php elseif ({}) : ?>", expression))
}

fn compile_else(scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    if scope.top() == Some(Block::Forelse) {
        scope.retag(Block::ForelseEmpty);
        return Ok("<?php endforeach; else : ?>".to_string());
    }
    Ok("<?php else : ?>".to_string())
}

fn compile_endif(scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::If]);
    Ok(Block::If.closer().to_string())
}

fn compile_unless(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("unless", expression)?;
    Ok(conditional(scope, &format!("!({})", expression)))
}

fn compile_isset(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("isset", expression)?;
    Ok(conditional(scope, &format!("isset({})", expression)))
}

fn compile_empty(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("empty", expression)?;
    Ok(conditional(scope, &format!("empty({})", expression)))
}

#[cfg(test)]
mod tests {
    use crate::compiler::Compiler;
    use crate::error::CompileErrorKind;
    use pretty_assertions::assert_eq;

    fn compile(source: &str) -> String {
        Compiler::default()
            .compile_str(source)
            .expect("Should compile")
    }

    #[test]
    fn test_if_one_line() {
        assert_eq!(
            compile("@if{true, 'ok'}"),
            "<?php if (true) : echo htmlentities( 'ok'); endif ?>"
        );
    }

    #[test]
    fn test_if_one_line_with_otherwise() {
        assert_eq!(
            compile("@if{true, 'ok', 'not ok'}"),
            "<?php if (true) : echo htmlentities( 'ok'); else : echo htmlentities( 'not ok'); endif ?>"
        );
    }

    #[test]
    fn test_if_block_with_generic_end() {
        assert_eq!(
            compile("@if{true} ok @end"),
            "<?php if (true) : ?> ok <?php endif ?>"
        );
    }

    #[test]
    fn test_if_elseif_else() {
        assert_eq!(
            compile("@if{$a}A@elseif{$b}B@else C@endif"),
            "<?php if ($a) : ?>A<?php elseif ($b) : ?>B<?php else : ?> C<?php endif ?>"
        );
    }

    #[test]
    fn test_explicit_endif_keeps_end_aligned() {
        assert_eq!(
            compile("@section{'a'}@if{$x}y@endif@end"),
            "<?php $this->section('a') ?><?php if ($x) : ?>y<?php endif ?><?php $this->endSection() ?>"
        );
    }

    #[test]
    fn test_unless() {
        assert_eq!(compile("@unless{$a}x@end"), "<?php if (!($a)) : ?>x<?php endif ?>");
    }

    #[test]
    fn test_isset_and_empty() {
        assert_eq!(
            compile("@isset{$user}u@end@empty{$list}e@end"),
            "<?php if (isset($user)) : ?>u<?php endif ?><?php if (empty($list)) : ?>e<?php endif ?>"
        );
    }

    #[test]
    fn test_bare_if_needs_expression() {
        let err = Compiler::default().compile_str("@if").unwrap_err();
        assert_eq!(
            err.kind,
            CompileErrorKind::MissingExpression {
                name: "if".to_string()
            }
        );
    }
}
