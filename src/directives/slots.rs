//! Named slots: `@section`, `@block`, `@yield` and `@parent`

use super::{require, DirectiveRegistry};
use crate::compiler::{Block, Scope};
use crate::error::CompileErrorKind;

pub(super) fn install(registry: &mut DirectiveRegistry) {
    registry.builtin("section", compile_section);
    registry.builtin("block", compile_block);
    registry.builtin("endsection", compile_endsection);
    registry.builtin("endblock", compile_endsection);
    registry.builtin("show", compile_show);
    registry.builtin("yield", compile_yield);
    registry.builtin("parent", compile_parent);
    registry.builtin("sectionExists", compile_exists);
    registry.builtin("blockExists", compile_exists);
    registry.builtin("sectionMissing", compile_missing);
    registry.builtin("blockMissing", compile_missing);
}

fn open_slot(scope: &mut Scope<'_>, kind: Block, expression: &str) -> String {
    // `name, default` stores a literal value and opens nothing
    if !expression.contains(',') {
        scope.open(kind);
    }
    format!("<?php $this->section({}) ?>", expression)
}

fn compile_section(
    scope: &mut Scope<'_>,
    expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    let expression = require("section", expression)?;
    Ok(open_slot(scope, Block::Section, expression))
}

fn compile_block(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("block", expression)?;
    Ok(open_slot(scope, Block::Block, expression))
}

fn compile_endsection(
    scope: &mut Scope<'_>,
    _expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::Section, Block::Block]);
    Ok(Block::Section.closer().to_string())
}

fn compile_show(scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    scope.close(&[Block::Section, Block::Block]);
    Ok("<?php $this->endSection(true) ?>".to_string())
}

fn compile_yield(_scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("yield", expression)?;
    Ok(format!("<?php $this->yieldSection({}) ?>", expression))
}

fn compile_parent(_scope: &mut Scope<'_>, _expression: Option<&str>) -> Result<String, CompileErrorKind> {
    Ok("<?php $this->parent() ?>".to_string())
}

fn compile_exists(scope: &mut Scope<'_>, expression: Option<&str>) -> Result<String, CompileErrorKind> {
    let expression = require("sectionExists", expression)?;
    scope.open(Block::If);
    Ok(format!("<?php if ($this->sectionExists({})) : ?>", expression))
}

fn compile_missing(
    scope: &mut Scope<'_>,
    expression: Option<&str>,
) -> Result<String, CompileErrorKind> {
    let expression = require("sectionMissing", expression)?;
    scope.open(Block::If);
    Ok(format!("<?php if ($this->sectionMissing({})) : ?>", expression))
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
    fn test_section_block_form() {
        assert_eq!(
            compile("@section{'content'}<p>hi</p>@end"),
            "<?php $this->section('content') ?><p>hi</p><?php $this->endSection() ?>"
        );
    }

    #[test]
    fn test_section_with_default_opens_nothing() {
        // The trailing @end has nothing to close.
        let err = Compiler::default()
            .compile_str("@section{'title', 'Welcome'}@end")
            .unwrap_err();
        assert_eq!(err.kind, CompileErrorKind::UnbalancedDirective);
        assert_eq!(err.line, 1);
    }

    #[test]
    fn test_block_and_show() {
        assert_eq!(
            compile("@block{'sidebar'}links@show"),
            "<?php $this->section('sidebar') ?>links<?php $this->endSection(true) ?>"
        );
    }

    #[test]
    fn test_endblock_pops_block() {
        assert_eq!(
            compile("@if{$a}@block{'x'}y@endblock@end"),
            "<?php if ($a) : ?><?php $this->section('x') ?>y<?php $this->endSection() ?><?php endif ?>"
        );
    }

    #[test]
    fn test_yield_and_parent() {
        assert_eq!(
            compile("@yield{'title', 'Home'}"),
            "<?php $this->yieldSection('title', 'Home') ?>"
        );
        assert_eq!(compile("@parent"), "<?php $this->parent() ?>");
    }

    #[test]
    fn test_exists_and_missing_open_conditionals() {
        assert_eq!(
            compile("@sectionExists{'nav'}n@end@blockMissing{'nav'}m@end"),
            "<?php if ($this->sectionExists('nav')) : ?>n<?php endif ?><?php if ($this->sectionMissing('nav')) : ?>m<?php endif ?>"
        );
    }
}
