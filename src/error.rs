//! Error types for template compilation and generated-code parsing

use std::path::PathBuf;

use ariadne::{Color, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

/// What went wrong while compiling a template
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CompileErrorKind {
    #[error("unexpected end of file, expecting `-}}` to close the comment")]
    UnterminatedComment,

    #[error("unexpected end of file, expecting `}}` to close the expression")]
    UnterminatedExpression,

    #[error("unexpected end of file, expecting `}}` to close directive `@{name}`")]
    UnterminatedDirective { name: String },

    #[error("`@end` found but no directive is open")]
    UnbalancedDirective,

    #[error("directive `@{name}` requires an expression")]
    MissingExpression { name: String },

    #[error("cannot include template '{name}': {reason}")]
    Include { name: String, reason: String },

    /// Raised by user directives that implement [`crate::directives::Directive`] directly
    #[error("{0}")]
    Custom(String),
}

/// A fatal compile-time error, located by line and byte span
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{}line {line}: {kind}", location(.file))]
pub struct CompileError {
    pub kind: CompileErrorKind,
    /// 1-based line of the construct that failed
    pub line: usize,
    pub span: Span,
    /// Template file, when compiling by name
    pub file: Option<PathBuf>,
}

fn location(file: &Option<PathBuf>) -> String {
    match file {
        Some(path) => format!("{}: ", path.display()),
        None => String::new(),
    }
}

impl CompileError {
    /// Build an error for the construct starting at `offset`
    pub fn at(kind: CompileErrorKind, source: &str, offset: usize) -> Self {
        let line = source[..offset].matches('\n').count() + 1;
        let end = source[offset..]
            .find('\n')
            .map_or(source.len(), |i| offset + i)
            .max(offset + 1)
            .min(source.len().max(offset));
        Self {
            kind,
            line,
            span: offset..end,
            file: None,
        }
    }

    /// Attach the template file this error came from
    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    /// Human-readable message without the location prefix
    pub fn message(&self) -> String {
        self.kind.to_string()
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        let result = Report::build(ReportKind::Error, filename, self.span.start)
            .with_message(self.message())
            .with_label(
                Label::new((filename, self.span.clone()))
                    .with_message(self.message())
                    .with_color(Color::Red),
            )
            .finish()
            .write((filename, Source::from(source)), &mut buf);
        match result {
            Ok(()) => String::from_utf8_lossy(&buf).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

/// Error while parsing generated code inside the reference host
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("Parse error at {span:?}: {message}")]
    Syntax {
        span: Span,
        message: String,
        expected: Vec<String>,
    },
}

impl ParseError {
    /// Shift the span so it points into the enclosing generated code
    pub fn offset(self, by: usize) -> Self {
        match self {
            ParseError::Syntax {
                span,
                message,
                expected,
            } => ParseError::Syntax {
                span: span.start + by..span.end + by,
                message,
                expected,
            },
        }
    }

    /// Format the error with source context using ariadne
    pub fn format(&self, source: &str, filename: &str) -> String {
        let mut buf = Vec::new();
        match self {
            ParseError::Syntax {
                span,
                message,
                expected,
            } => {
                let expected_str = if expected.is_empty() {
                    String::new()
                } else {
                    format!("\nExpected: {}", expected.join(", "))
                };

                let result = Report::build(ReportKind::Error, filename, span.start)
                    .with_message(message)
                    .with_label(
                        Label::new((filename, span.clone()))
                            .with_message(format!("{}{}", message, expected_str))
                            .with_color(Color::Red),
                    )
                    .finish()
                    .write((filename, Source::from(source)), &mut buf);
                if result.is_err() {
                    return self.to_string();
                }
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }
}

impl<'a> From<chumsky::error::Rich<'a, crate::host::lexer::Token>> for ParseError {
    fn from(err: chumsky::error::Rich<'a, crate::host::lexer::Token>) -> Self {
        use chumsky::error::RichReason;

        let message = match err.reason() {
            RichReason::ExpectedFound { found, .. } => {
                let found_str = match found {
                    Some(tok) => format_token(tok),
                    None => "end of input".to_string(),
                };
                format!("Unexpected {}", found_str)
            }
            RichReason::Custom(msg) => msg.to_string(),
        };

        let expected: Vec<String> = err
            .expected()
            .filter_map(|e| match e {
                chumsky::error::RichPattern::Token(tok) => Some(format_token(tok)),
                chumsky::error::RichPattern::Label(label) => Some(label.to_string()),
                chumsky::error::RichPattern::EndOfInput => Some("end of input".to_string()),
                chumsky::error::RichPattern::Identifier(s) => Some(format!("identifier '{}'", s)),
                chumsky::error::RichPattern::Any => Some("any token".to_string()),
                chumsky::error::RichPattern::SomethingElse => None,
            })
            .collect();

        ParseError::Syntax {
            span: err.span().into_range(),
            message,
            expected,
        }
    }
}

/// Format a token for human-readable error messages
fn format_token(tok: &crate::host::lexer::Token) -> String {
    use crate::host::lexer::Token;
    match tok {
        Token::Ident(s) => format!("identifier '{}'", s),
        Token::Variable(s) => format!("variable '${}'", s),
        Token::String(s) => format!("string \"{}\"", s),
        Token::Number(n) => format!("number {}", n),
        Token::This => "'$this'".to_string(),
        Token::Arrow => "'->'".to_string(),
        Token::FatArrow => "'=>'".to_string(),
        Token::ParenOpen => "'('".to_string(),
        Token::ParenClose => "')'".to_string(),
        Token::BracketOpen => "'['".to_string(),
        Token::BracketClose => "']'".to_string(),
        Token::Comma => "','".to_string(),
        Token::Semicolon => "';'".to_string(),
        Token::Colon => "':'".to_string(),
        Token::Echo => "keyword 'echo'".to_string(),
        Token::If => "keyword 'if'".to_string(),
        Token::ElseIf => "keyword 'elseif'".to_string(),
        Token::Else => "keyword 'else'".to_string(),
        Token::EndIf => "keyword 'endif'".to_string(),
        Token::Foreach => "keyword 'foreach'".to_string(),
        Token::EndForeach => "keyword 'endforeach'".to_string(),
        Token::While => "keyword 'while'".to_string(),
        Token::EndWhile => "keyword 'endwhile'".to_string(),
        Token::As => "keyword 'as'".to_string(),
        _ => format!("{:?}", tok),
    }
}
