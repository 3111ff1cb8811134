//! Loop directives

use super::{require, DirectiveRegistry};
use crate::compiler::{Block, Scope};
use crate::error::CompileErrorKind;

pub(super) fn install(registry: &mut DirectiveRegistry) {
    registry.builtin("for", compile_for);
    registry.builtin("forelse", compile_forelse);
    registry.builtin("endfor", compile_endfor);
    registry.builtin("endforeach", compile_endforeach);
    registry.builtin("endwhile", compile_endwhile);
    registry.builtin("endforelse", compile_endforelse);
    registry.builtin("continue", compile_continue);
    registry.builtin("break", compile_break);
}

/// `a as b` iterates, `init; cond; step` counts, anything else loops while true
fn compile_for(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("for", expression)?;

    if expression.contains(" as ") {
        scope.open(Block::Foreach);
        return Ok(format!("<?php foreach ({}) : ?>", expression));
    }
    if expression.contains(';') {
        scope.open(Block::For);
        return Ok(format!("<?php for ({}) : ?>", expression));
    }
    scope.open(Block::While);
    Ok(format!("<?php while ({}) : ?>", expression))
}

fn compile_forelse(
    scope: &mut Scope<'_>,
    expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    let expression = require("forelse", expression)?;
    let subject = expression
        .split_once(' ')
        .map_or(expression, |(subject, _)| subject);

    scope.open(Block::Forelse);
    Ok(format!(
        "<?php if (!empty({})) : foreach({}) : ?>",
        subject, expression
    ))
}

fn compile_endfor(scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::For]);
    Ok(Block::For.closer().to_string())
}

fn compile_endforeach(
    scope: &mut Scope<'_>,
    _expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::Foreach]);
    Ok(Block::Foreach.closer().to_string())
}

fn compile_endwhile(
    scope: &mut Scope<'_>,
    _expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::While]);
    Ok(Block::While.closer().to_string())
}

fn compile_endforelse(
    scope: &mut Scope<'_>,
    _expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    let block = scope
        .close(&[Block::Forelse, Block::ForelseEmpty])
        .unwrap_or(Block::Forelse);
    Ok(block.closer().to_string())
}

fn compile_continue(
    _scope: &mut Scope<'_>,
    expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    Ok(match expression {
        Some(condition) => format!("<?php if ({}) : continue; endif ?>", condition),
        None => "<?php continue ?>".to_string(),
    })
}

fn compile_break(_scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    Ok(match expression {
        Some(condition) => format!("<?php if ({}) : break; endif ?>", condition),
        None => "<?php break ?>".to_string(),
    })
}
