//! Parser for generated code using chumsky

use chumsky::input::{Stream, ValueInput};
use chumsky::prelude::*;

use super::ast::*;
use super::lexer::{self, Token};
use crate::error::ParseError;

/// Postfix operations on an atom
#[derive(Debug, Clone)]
enum Access {
    Index(Expr),
    Property(String),
    Method(String, Vec<Expr>),
}

/// Parse the body of a `<?php ... ?>` tag
pub fn parse(input: &str) -> Result<Vec<Spanned<Stmt>>, Vec<ParseError>> {
    let len = input.len();
    let tokens = lexer::lex(input).map_err(|e| vec![e])?;

    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));
    let token_stream = Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    statements_parser()
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Parse the body of a `<?= ... ?>` tag
pub fn parse_echo(input: &str) -> Result<Vec<Spanned<Stmt>>, Vec<ParseError>> {
    let len = input.len();
    let tokens = lexer::lex(input).map_err(|e| vec![e])?;

    let token_iter = tokens.into_iter().map(|(tok, span)| (tok, span.into()));
    let token_stream = Stream::from_iter(token_iter).map((len..len).into(), |(t, s): (_, _)| (t, s));

    expr_parser()
        .separated_by(just(Token::Comma))
        .at_least(1)
        .collect::<Vec<_>>()
        .then_ignore(just(Token::Semicolon).repeated())
        .then_ignore(end())
        .map_with(|exprs, e| vec![Spanned::new(Stmt::Echo(exprs), span_range(&e.span()))])
        .parse(token_stream)
        .into_result()
        .map_err(|errs| errs.into_iter().map(|e| e.into()).collect())
}

/// Helper to extract span range from chumsky's MapExtra
fn span_range(e: &impl chumsky::span::Span<Offset = usize>) -> std::ops::Range<usize> {
    e.start()..e.end()
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary(op, Box::new(lhs), Box::new(rhs))
}

fn expr_parser<'a, I>() -> impl Parser<'a, I, Expr, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    recursive(|expr| {
        let args = expr
            .clone()
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));

        let name = select! {
            Token::Ident(name) => name,
        };

        let literal = select! {
            Token::Null => Expr::Null,
            Token::True => Expr::Bool(true),
            Token::False => Expr::Bool(false),
            Token::Number(n) => Expr::Number(n),
            Token::String(s) => Expr::String(s),
            Token::Variable(name) => Expr::Variable(name),
            Token::This => Expr::This,
        };

        // `name(args)` calls a function, a bare `name` is a constant
        let call_or_constant = name
            .clone()
            .then(args.clone().or_not())
            .map(|(name, args)| match args {
                Some(args) => Expr::Call { name, args },
                None => Expr::Constant(name),
            });

        let entry = expr
            .clone()
            .then(just(Token::FatArrow).ignore_then(expr.clone()).or_not())
            .map(|(first, second)| match second {
                Some(value) => (Some(first), value),
                None => (None, first),
            });

        let array = entry
            .separated_by(just(Token::Comma))
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
            .map(Expr::Array);

        let atom = choice((
            literal,
            call_or_constant,
            array,
            expr.clone()
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        ));

        let access = choice((
            expr.clone()
                .delimited_by(just(Token::BracketOpen), just(Token::BracketClose))
                .map(Access::Index),
            just(Token::Arrow)
                .ignore_then(name)
                .then(args.or_not())
                .map(|(name, args)| match args {
                    Some(args) => Access::Method(name, args),
                    None => Access::Property(name),
                }),
        ));

        let postfix = atom.foldl(access.repeated(), |target, access| match access {
            Access::Index(index) => Expr::Index(Box::new(target), Box::new(index)),
            Access::Property(name) => Expr::Property(Box::new(target), name),
            Access::Method(method, args) => Expr::MethodCall {
                target: Box::new(target),
                method,
                args,
            },
        });

        let unary = choice((
            just(Token::Bang).to(UnaryOp::Not),
            just(Token::Minus).to(UnaryOp::Neg),
        ))
        .repeated()
        .foldr(postfix, |op, rhs| Expr::Unary(op, Box::new(rhs)))
        .boxed();

        let product = unary.clone().foldl(
            choice((
                just(Token::Star).to(BinaryOp::Mul),
                just(Token::Slash).to(BinaryOp::Div),
                just(Token::Percent).to(BinaryOp::Rem),
            ))
            .then(unary)
            .repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let sum = product.clone().foldl(
            choice((
                just(Token::Plus).to(BinaryOp::Add),
                just(Token::Minus).to(BinaryOp::Sub),
                just(Token::Dot).to(BinaryOp::Concat),
            ))
            .then(product)
            .repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let comparison = sum
            .clone()
            .foldl(
                choice((
                    just(Token::LessOrEqual).to(BinaryOp::LessOrEqual),
                    just(Token::GreaterOrEqual).to(BinaryOp::GreaterOrEqual),
                    just(Token::Less).to(BinaryOp::Less),
                    just(Token::Greater).to(BinaryOp::Greater),
                ))
                .then(sum)
                .repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        let equality = comparison.clone().foldl(
            choice((
                just(Token::EqEq).to(BinaryOp::Eq),
                just(Token::NotEq).to(BinaryOp::NotEq),
            ))
            .then(comparison)
            .repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let bit_or = equality.clone().foldl(
            just(Token::Pipe).to(BinaryOp::BitOr).then(equality).repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let and = bit_or.clone().foldl(
            just(Token::AndAnd).to(BinaryOp::And).then(bit_or).repeated(),
            |lhs, (op, rhs)| binary(op, lhs, rhs),
        );

        let or = and
            .clone()
            .foldl(
                just(Token::OrOr).to(BinaryOp::Or).then(and).repeated(),
                |lhs, (op, rhs)| binary(op, lhs, rhs),
            )
            .boxed();

        or.then(
            just(Token::Question)
                .ignore_then(expr.clone())
                .then_ignore(just(Token::Colon))
                .then(expr)
                .or_not(),
        )
        .map(|(condition, branches)| match branches {
            Some((then, otherwise)) => {
                Expr::Ternary(Box::new(condition), Box::new(then), Box::new(otherwise))
            }
            None => condition,
        })
    })
}

fn statements_parser<'a, I>(
) -> impl Parser<'a, I, Vec<Spanned<Stmt>>, extra::Err<Rich<'a, Token>>> + Clone
where
    I: ValueInput<'a, Token = Token, Span = SimpleSpan>,
{
    let expr = expr_parser();
    let condition = expr
        .clone()
        .delimited_by(just(Token::ParenOpen), just(Token::ParenClose));
    let variable = select! {
        Token::Variable(name) => name,
    };

    // foreach ($items as $item) / foreach ($items as $key => $item)
    let foreach = just(Token::Foreach)
        .ignore_then(
            expr.clone()
                .then_ignore(just(Token::As))
                .then(
                    variable
                        .clone()
                        .then(just(Token::FatArrow).ignore_then(variable.clone()).or_not()),
                )
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        )
        .map(|(subject, (first, second))| match second {
            Some(value) => Stmt::Foreach {
                subject,
                key: Some(first),
                value,
            },
            None => Stmt::Foreach {
                subject,
                key: None,
                value: first,
            },
        });

    let clause = variable
        .clone()
        .then_ignore(just(Token::Assign))
        .then(expr.clone())
        .map(|(name, value)| Stmt::Assign(name, value))
        .or(expr.clone().map(Stmt::Expr));

    // for ($i = 0; $i < 3; $i = $i + 1)
    let counting = just(Token::For)
        .ignore_then(
            clause
                .clone()
                .or_not()
                .then_ignore(just(Token::Semicolon))
                .then(expr.clone().or_not())
                .then_ignore(just(Token::Semicolon))
                .then(clause.clone().or_not())
                .delimited_by(just(Token::ParenOpen), just(Token::ParenClose)),
        )
        .map(|((init, condition), step)| Stmt::For {
            init: init.map(Box::new),
            condition,
            step: step.map(Box::new),
        });

    // Openers of alternative-syntax blocks end with `:`
    let opener = choice((
        just(Token::If).ignore_then(condition.clone()).map(Stmt::If),
        just(Token::ElseIf)
            .ignore_then(condition.clone())
            .map(Stmt::ElseIf),
        just(Token::Else).to(Stmt::Else),
        foreach,
        counting,
        just(Token::While).ignore_then(condition).map(Stmt::While),
    ))
    .then_ignore(just(Token::Colon));

    let simple = choice((
        just(Token::Echo)
            .ignore_then(
                expr.clone()
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>(),
            )
            .map(Stmt::Echo),
        just(Token::EndIf).to(Stmt::EndIf),
        just(Token::EndForeach).to(Stmt::EndForeach),
        just(Token::EndFor).to(Stmt::EndFor),
        just(Token::EndWhile).to(Stmt::EndWhile),
        just(Token::Continue).to(Stmt::Continue),
        just(Token::Break).to(Stmt::Break),
        clause,
    ))
    .then_ignore(just(Token::Semicolon).repeated());

    just(Token::Semicolon)
        .repeated()
        .ignore_then(
            choice((opener, simple))
                .map_with(|s, e| Spanned::new(s, span_range(&e.span())))
                .repeated()
                .collect(),
        )
        .then_ignore(end())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stmts(input: &str) -> Vec<Stmt> {
        parse(input)
            .expect("Should parse")
            .into_iter()
            .map(|s| s.node)
            .collect()
    }

    fn var(name: &str) -> Expr {
        Expr::Variable(name.to_string())
    }

    #[test]
    fn test_parse_echo_call() {
        assert_eq!(
            stmts("echo htmlentities($name)"),
            vec![Stmt::Echo(vec![Expr::Call {
                name: "htmlentities".to_string(),
                args: vec![var("name")],
            }])]
        );
    }

    #[test]
    fn test_parse_one_line_if() {
        assert_eq!(
            stmts("if (true) : echo htmlentities( 'ok'); else : echo 'no'; endif"),
            vec![
                Stmt::If(Expr::Bool(true)),
                Stmt::Echo(vec![Expr::Call {
                    name: "htmlentities".to_string(),
                    args: vec![Expr::String("ok".to_string())],
                }]),
                Stmt::Else,
                Stmt::Echo(vec![Expr::String("no".to_string())]),
                Stmt::EndIf,
            ]
        );
    }

    #[test]
    fn test_parse_forelse_opener() {
        assert_eq!(
            stmts("if (!empty($items)) : foreach($items as $k => $item) :"),
            vec![
                Stmt::If(Expr::Unary(
                    UnaryOp::Not,
                    Box::new(Expr::Call {
                        name: "empty".to_string(),
                        args: vec![var("items")],
                    })
                )),
                Stmt::Foreach {
                    subject: var("items"),
                    key: Some("k".to_string()),
                    value: "item".to_string(),
                },
            ]
        );
    }

    #[test]
    fn test_parse_closers_with_semicolons() {
        assert_eq!(
            stmts("endforeach; else :"),
            vec![Stmt::EndForeach, Stmt::Else]
        );
        assert_eq!(stmts("endforeach; endif;"), vec![Stmt::EndForeach, Stmt::EndIf]);
    }

    #[test]
    fn test_parse_counting_for() {
        assert_eq!(
            stmts("for ($i = 0; $i < 2; $i = $i + 1) :"),
            vec![Stmt::For {
                init: Some(Box::new(Stmt::Assign("i".to_string(), Expr::Number(0.0)))),
                condition: Some(Expr::Binary(
                    BinaryOp::Less,
                    Box::new(var("i")),
                    Box::new(Expr::Number(2.0)),
                )),
                step: Some(Box::new(Stmt::Assign(
                    "i".to_string(),
                    Expr::Binary(BinaryOp::Add, Box::new(var("i")), Box::new(Expr::Number(1.0))),
                ))),
            }]
        );
        assert_eq!(
            stmts("for (;;) : endfor"),
            vec![
                Stmt::For {
                    init: None,
                    condition: None,
                    step: None,
                },
                Stmt::EndFor,
            ]
        );
    }

    #[test]
    fn test_parse_method_call() {
        assert_eq!(
            stmts("$this->section('title', 'Home')"),
            vec![Stmt::Expr(Expr::MethodCall {
                target: Box::new(Expr::This),
                method: "section".to_string(),
                args: vec![
                    Expr::String("title".to_string()),
                    Expr::String("Home".to_string())
                ],
            })]
        );
    }

    #[test]
    fn test_parse_assignment_and_precedence() {
        assert_eq!(
            stmts("$test = 1 + 2 * 3;"),
            vec![Stmt::Assign(
                "test".to_string(),
                binary(
                    BinaryOp::Add,
                    Expr::Number(1.0),
                    binary(BinaryOp::Mul, Expr::Number(2.0), Expr::Number(3.0))
                )
            )]
        );
    }

    #[test]
    fn test_parse_bit_or_binds_looser_than_equality() {
        assert_eq!(
            stmts("JSON_HEX_TAG | JSON_HEX_AMP"),
            vec![Stmt::Expr(binary(
                BinaryOp::BitOr,
                Expr::Constant("JSON_HEX_TAG".to_string()),
                Expr::Constant("JSON_HEX_AMP".to_string())
            ))]
        );
    }

    #[test]
    fn test_parse_ternary_and_access() {
        assert_eq!(
            stmts("echo $user->name ? $items[0] : 'none'"),
            vec![Stmt::Echo(vec![Expr::Ternary(
                Box::new(Expr::Property(Box::new(var("user")), "name".to_string())),
                Box::new(Expr::Index(Box::new(var("items")), Box::new(Expr::Number(0.0)))),
                Box::new(Expr::String("none".to_string())),
            )])]
        );
    }

    #[test]
    fn test_parse_array_literal() {
        assert_eq!(
            stmts("$a = ['x' => 1, 2]"),
            vec![Stmt::Assign(
                "a".to_string(),
                Expr::Array(vec![
                    (Some(Expr::String("x".to_string())), Expr::Number(1.0)),
                    (None, Expr::Number(2.0)),
                ])
            )]
        );
    }

    #[test]
    fn test_parse_echo_tag() {
        let parsed = parse_echo("$a, 'b';").expect("Should parse");
        assert_eq!(
            parsed[0].node,
            Stmt::Echo(vec![var("a"), Expr::String("b".to_string())])
        );
    }

    #[test]
    fn test_parse_empty_body() {
        assert_eq!(stmts(""), vec![]);
        assert_eq!(stmts("  ;  "), vec![]);
    }

    #[test]
    fn test_parse_error() {
        let errors = parse("if ($a :").unwrap_err();
        assert!(!errors.is_empty());
    }
}
