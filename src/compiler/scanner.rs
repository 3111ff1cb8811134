//! Single-pass scanner over template source

use super::Scope;
use crate::error::{CompileError, CompileErrorKind};

/// Compile `source`, dispatching directives through `scope`
pub(super) fn scan(source: &str, scope: &mut Scope<'_>) -> Result<String, CompileError> {
    let mut out = String::with_capacity(source.len());
    let mut cursor = 0;

    while let Some(found) = source[cursor..].find('@') {
        let at = cursor + found;
        out.push_str(&source[cursor..at]);

        // A lone trailing `@` is plain text.
        if at + 1 == source.len() {
            cursor = at;
            break;
        }

        cursor = if source.as_bytes()[at + 1] == b'{' {
            interpolation(source, at, scope, &mut out)?
        } else {
            directive(source, at, scope, &mut out)?
        };
    }

    out.push_str(&source[cursor..]);
    Ok(out)
}

/// `@{- comment -}`, `@{! raw }` or `@{ escaped }`; returns the offset after it
fn interpolation(
    source: &str,
    at: usize,
    scope: &Scope<'_>,
    out: &mut String,
) -> Result<usize, CompileError> {
    let body = at + 2;
    let rest = &source[body..];

    if rest.starts_with('-') {
        let end = rest
            .find("-}")
            .ok_or_else(|| CompileError::at(CompileErrorKind::UnterminatedComment, source, at))?;
        return Ok(body + end + 2);
    }

    let (raw, start) = if rest.starts_with('!') {
        (true, body + 1)
    } else {
        (false, body)
    };

    let close = source[start..]
        .find('}')
        .map(|i| start + i)
        .ok_or_else(|| CompileError::at(CompileErrorKind::UnterminatedExpression, source, at))?;

    let expression = source[start..close].trim();
    if raw {
        out.push_str(&format!("<?php echo {} ?>", expression));
    } else {
        out.push_str(&format!("<?php echo {} ?>", scope.escape(expression)));
    }
    Ok(close + 1)
}

/// `@name{expression}` or bare `@name`; returns the offset after it
fn directive(
    source: &str,
    at: usize,
    scope: &mut Scope<'_>,
    out: &mut String,
) -> Result<usize, CompileError> {
    let directives = scope.compiler().directives();
    let name_start = at + 1;

    if let Some(brace) = source[name_start..].find('{').map(|i| name_start + i) {
        let name = source[name_start..brace].trim();
        if let Some(handler) = directives.get(name) {
            let close = source[brace + 1..]
                .find('}')
                .map(|i| brace + 1 + i)
                .ok_or_else(|| {
                    CompileError::at(
                        CompileErrorKind::UnterminatedDirective {
                            name: name.to_string(),
                        },
                        source,
                        at,
                    )
                })?;

            let expression = source[brace + 1..close].trim();
            let code = handler
                .compile(scope, Some(expression))
                .map_err(|kind| CompileError::at(kind, source, at))?;
            out.push_str(&code);
            return Ok(close + 1);
        }
    }

    let name_end = source[name_start..]
        .find(|c: char| !c.is_ascii_alphanumeric())
        .map_or(source.len(), |i| name_start + i);
    let name = &source[name_start..name_end];

    match directives.get(name) {
        Some(handler) => {
            let code = handler
                .compile(scope, None)
                .map_err(|kind| CompileError::at(kind, source, at))?;
            out.push_str(&code);
        }
        None => out.push_str(&source[at..name_end]),
    }
    Ok(name_end)
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

    fn compile_err(source: &str) -> crate::error::CompileError {
        Compiler::default()
            .compile_str(source)
            .expect_err("Should fail to compile")
    }

    #[test]
    fn test_escaped_expression() {
        assert_eq!(
            compile("Good Morning @{ $name }!"),
            "Good Morning <?php echo htmlentities($name) ?>!"
        );
    }

    #[test]
    fn test_raw_expression() {
        assert_eq!(
            compile("Good Morning @{! $name }!"),
            "Good Morning <?php echo $name ?>!"
        );
    }

    #[test]
    fn test_comment_is_removed() {
        assert_eq!(compile("a@{-- hidden @{ $x } --}b"), "ab");
        assert_eq!(compile("a@{-}b"), "ab");
    }

    #[test]
    fn test_email_passes_through() {
        assert_eq!(compile("write to john@doe.com"), "write to john@doe.com");
    }

    #[test]
    fn test_trailing_at_is_literal() {
        assert_eq!(compile("price@"), "price@");
        assert_eq!(compile("@"), "@");
    }

    #[test]
    fn test_at_followed_by_symbol() {
        assert_eq!(compile("@ @@ @."), "@ @@ @.");
    }

    #[test]
    fn test_unknown_directive_with_braces() {
        assert_eq!(compile("@media{ color: red }"), "@media{ color: red }");
    }

    #[test]
    fn test_bare_directive_stops_at_non_alphanumeric() {
        assert_eq!(compile("@else!"), "<?php else : ?>!");
    }

    #[test]
    fn test_unterminated_comment() {
        let err = compile_err("line\n@{- never closed");
        assert_eq!(err.kind, CompileErrorKind::UnterminatedComment);
        assert_eq!(err.line, 2);
    }

    #[test]
    fn test_unterminated_expression() {
        let err = compile_err("@{ $name");
        assert_eq!(err.kind, CompileErrorKind::UnterminatedExpression);
        assert_eq!(err.line, 1);

        let err = compile_err("text @{");
        assert_eq!(err.kind, CompileErrorKind::UnterminatedExpression);
    }

    #[test]
    fn test_unterminated_directive() {
        let err = compile_err("a\nb\n@if{ $x");
        assert_eq!(
            err.kind,
            CompileErrorKind::UnterminatedDirective {
                name: "if".to_string()
            }
        );
        assert_eq!(err.line, 3);
    }

    #[test]
    fn test_directive_name_is_trimmed() {
        assert_eq!(compile("@if {$a}x@end"), "<?php if ($a) : ?>x<?php endif ?>");
    }

    #[test]
    fn test_unicode_text_is_preserved() {
        assert_eq!(
            compile("héllo @{ $ñ } wörld"),
            "héllo <?php echo htmlentities($ñ) ?> wörld"
        );
    }
}
