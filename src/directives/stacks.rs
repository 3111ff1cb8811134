//! Ordered content stacks

use super::{require, DirectiveRegistry};
use crate::compiler::{Block, Scope};
use crate::error::CompileErrorKind;

pub(super) fn install(registry: &mut DirectiveRegistry) {
    registry.builtin("push", compile_push);
    registry.builtin("prepend", compile_prepend);
    registry.builtin("endpush", compile_endpush);
    registry.builtin("endprepend", compile_endprepend);
    registry.builtin("stack", compile_stack);
}

fn compile_push(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("push", expression)?;
    if !expression.contains(',') {
        scope.open(Block::Push);
    }
    Ok(format!("<?php $this->push({}) ?>", expression))
}

fn compile_prepend(
    scope: &mut Scope<'_>,
    expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    let expression = require("prepend", expression)?;
    if !expression.contains(',') {
        scope.open(Block::Prepend);
    }
    Ok(format!("<?php $this->prepend({}) ?>", expression))
}

fn compile_endpush(scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::Push]);
    Ok(Block::Push.closer().to_string())
}

fn compile_endprepend(
    scope: &mut Scope<'_>,
    _expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::Prepend]);
    Ok(Block::Prepend.closer().to_string())
}

fn compile_stack(_scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("stack", expression)?;
    Ok(format!("<?php $this->stack({}) ?>", expression))
}
