//! Lexer for generated code using logos

use logos::{Lexer, Logos};

use crate::error::ParseError;

/// Byte range in source text
pub type Span = std::ops::Range<usize>;

#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\n\r]+")]
pub enum Token {
    // Statement keywords
    #[token("echo")]
    Echo,
    #[token("if")]
    If,
    #[token("elseif")]
    ElseIf,
    #[token("else")]
    Else,
    #[token("endif")]
    EndIf,
    #[token("foreach")]
    Foreach,
    #[token("endforeach")]
    EndForeach,
    #[token("for")]
    For,
    #[token("endfor")]
    EndFor,
    #[token("while")]
    While,
    #[token("endwhile")]
    EndWhile,
    #[token("as")]
    As,
    #[token("continue")]
    Continue,
    #[token("break")]
    Break,

    // Literal keywords
    #[token("true")]
    True,
    #[token("false")]
    False,
    #[token("null")]
    Null,

    #[token("$this")]
    This,

    // Operators
    #[token("->")]
    Arrow,
    #[token("=>")]
    FatArrow,
    #[token("==")]
    #[token("===")]
    EqEq,
    #[token("!=")]
    #[token("!==")]
    NotEq,
    #[token("<=")]
    LessOrEqual,
    #[token(">=")]
    GreaterOrEqual,
    #[token("<")]
    Less,
    #[token(">")]
    Greater,
    #[token("&&")]
    AndAnd,
    #[token("||")]
    OrOr,
    #[token("!")]
    Bang,
    #[token("=")]
    Assign,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token(".")]
    Dot,
    #[token("|")]
    Pipe,
    #[token("?")]
    Question,

    // Delimiters
    #[token("(")]
    ParenOpen,
    #[token(")")]
    ParenClose,
    #[token("[")]
    BracketOpen,
    #[token("]")]
    BracketClose,
    #[token(",")]
    Comma,
    #[token(";")]
    Semicolon,
    #[token(":")]
    Colon,

    // Values
    #[regex(r"\$[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice()[1..].to_string())]
    Variable(String),

    #[regex(r"[a-zA-Z_][a-zA-Z0-9_]*", |lex| lex.slice().to_string(), priority = 1)]
    Ident(String),

    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    #[regex(r"'([^'\\]|\\.)*'", unquote)]
    String(String),

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    // Comments (skipped)
    #[regex(r"//[^\n]*", logos::skip)]
    LineComment,

    #[regex(r"/\*([^*]|\*[^/])*\*/", logos::skip)]
    BlockComment,
}

/// Strip the quotes from a string literal and resolve its escapes
///
/// Single-quoted strings only unescape `\'` and `\\`.
fn unquote(lex: &mut Lexer<Token>) -> String {
    let raw = lex.slice();
    let double = raw.starts_with('"');
    let inner = &raw[1..raw.len() - 1];

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') if double => out.push('\n'),
            Some('t') if double => out.push('\t'),
            Some('r') if double => out.push('\r'),
            Some('$') if double => out.push('$'),
            Some('"') if double => out.push('"'),
            Some('\'') if !double => out.push('\''),
            Some('\\') => out.push('\\'),
            Some(other) => {
                out.push('\\');
                out.push(other);
            }
            None => out.push('\\'),
        }
    }
    out
}

/// Tokenize generated code, failing on the first unrecognized character
pub fn lex(input: &str) -> Result<Vec<(Token, Span)>, ParseError> {
    Token::lexer(input)
        .spanned()
        .map(|(tok, span)| match tok {
            Ok(tok) => Ok((tok, span)),
            Err(()) => Err(ParseError::Syntax {
                message: format!("Unexpected character '{}'", &input[span.clone()]),
                span,
                expected: vec![],
            }),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(input: &str) -> Vec<Token> {
        lex(input)
            .expect("Should lex")
            .into_iter()
            .map(|(t, _)| t)
            .collect()
    }

    #[test]
    fn test_keywords_and_identifiers() {
        assert_eq!(
            tokens("if elseif else endif iffy"),
            vec![
                Token::If,
                Token::ElseIf,
                Token::Else,
                Token::EndIf,
                Token::Ident("iffy".to_string())
            ]
        );
    }

    #[test]
    fn test_variables_and_this() {
        assert_eq!(
            tokens("$this->section($name)"),
            vec![
                Token::This,
                Token::Arrow,
                Token::Ident("section".to_string()),
                Token::ParenOpen,
                Token::Variable("name".to_string()),
                Token::ParenClose,
            ]
        );
        assert_eq!(tokens("$thisOne"), vec![Token::Variable("thisOne".to_string())]);
    }

    #[test]
    fn test_strings() {
        assert_eq!(
            tokens(r#"'it\'s' "a\n\"b\"""#),
            vec![
                Token::String("it's".to_string()),
                Token::String("a\n\"b\"".to_string()),
            ]
        );
        assert_eq!(tokens(r"'a\nb'"), vec![Token::String("a\\nb".to_string())]);
    }

    #[test]
    fn test_operators() {
        assert_eq!(
            tokens("== === != !== <= >= => -> && || ."),
            vec![
                Token::EqEq,
                Token::EqEq,
                Token::NotEq,
                Token::NotEq,
                Token::LessOrEqual,
                Token::GreaterOrEqual,
                Token::FatArrow,
                Token::Arrow,
                Token::AndAnd,
                Token::OrOr,
                Token::Dot,
            ]
        );
    }

    #[test]
    fn test_numbers_and_comments() {
        assert_eq!(
            tokens("1 2.5 // trailing\n/* block */ 3"),
            vec![Token::Number(1.0), Token::Number(2.5), Token::Number(3.0)]
        );
    }

    #[test]
    fn test_unknown_character_is_an_error() {
        let err = lex("echo `x`").unwrap_err();
        let ParseError::Syntax { span, message, .. } = err;
        assert_eq!(span, 5..6);
        assert!(message.contains('`'));
    }
}
