use std::collections::HashSet;

use graphflow_primitives::ScalarValue;

use crate::ast::{CompareOp, CompiledQuery, Predicate, ReturnItem};
use crate::error::EvalError;
use crate::lexer::{Lexer, Token};

/// Recursive-descent parser for the MVP query fragment (§4.5):
///
/// ```text
/// MATCH (var:Label) [WHERE predicate] RETURN item [, item]*
/// predicate := comparison (AND comparison)*
/// comparison := var.property op literal | NOT EXISTS(var.property)
/// item := var.property [AS alias]
/// ```
pub struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
    variable: Option<String>,
}

pub fn compile(text: &str) -> Result<CompiledQuery, EvalError> {
    if text.trim().is_empty() {
        return Err(EvalError::EmptyQuery);
    }
    let tokens = Lexer::new(text).tokenize()?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        variable: None,
    };
    parser.parse_query()
}

impl Parser {
    fn peek(&self) -> &Token {
        &self.tokens[self.pos].0
    }

    fn peek_pos(&self) -> usize {
        self.tokens[self.pos].1
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].0.clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn expect(&mut self, expected: &Token, what: &str) -> Result<(), EvalError> {
        if self.peek() == expected {
            self.advance();
            Ok(())
        } else if matches!(self.peek(), Token::Eof) {
            Err(EvalError::UnexpectedEof {
                expected: what.to_string(),
            })
        } else {
            Err(EvalError::UnexpectedToken {
                expected: what.to_string(),
                found: self.peek().describe(),
                pos: self.peek_pos(),
            })
        }
    }

    fn expect_ident(&mut self, what: &str) -> Result<String, EvalError> {
        match self.peek().clone() {
            Token::Ident(s) => {
                self.advance();
                Ok(s)
            }
            Token::Eof => Err(EvalError::UnexpectedEof {
                expected: what.to_string(),
            }),
            other => Err(EvalError::UnexpectedToken {
                expected: what.to_string(),
                found: other.describe(),
                pos: self.peek_pos(),
            }),
        }
    }

    fn parse_query(&mut self) -> Result<CompiledQuery, EvalError> {
        self.expect(&Token::Match, "MATCH")?;
        self.expect(&Token::LParen, "'('")?;
        let variable = self.expect_ident("a pattern variable")?;
        self.variable = Some(variable.clone());
        self.expect(&Token::Colon, "':'")?;
        let label = self.expect_ident("a node label")?;
        self.expect(&Token::RParen, "')'")?;

        let predicate = if *self.peek() == Token::Where {
            self.advance();
            Some(self.parse_predicate()?)
        } else {
            None
        };

        self.expect(&Token::Return, "RETURN")?;
        let projection = self.parse_projection()?;

        if *self.peek() != Token::Eof {
            return Err(EvalError::TrailingInput(self.peek().describe()));
        }

        Ok(CompiledQuery {
            variable,
            label,
            predicate,
            projection,
        })
    }

    fn parse_predicate(&mut self) -> Result<Predicate, EvalError> {
        let mut terms = vec![self.parse_comparison()?];
        while *self.peek() == Token::And {
            self.advance();
            terms.push(self.parse_comparison()?);
        }
        Ok(if terms.len() == 1 {
            terms.pop().unwrap()
        } else {
            Predicate::And(terms)
        })
    }

    fn parse_comparison(&mut self) -> Result<Predicate, EvalError> {
        if *self.peek() == Token::Not {
            self.advance();
            self.expect(&Token::Exists, "EXISTS")?;
            self.expect(&Token::LParen, "'('")?;
            let property = self.parse_var_property()?;
            self.expect(&Token::RParen, "')'")?;
            return Ok(Predicate::NotExists { property });
        }

        let property = self.parse_var_property()?;
        let op = match self.advance() {
            Token::Eq => CompareOp::Eq,
            Token::Neq => CompareOp::Neq,
            Token::Lt => CompareOp::Lt,
            Token::Lte => CompareOp::Lte,
            Token::Gt => CompareOp::Gt,
            Token::Gte => CompareOp::Gte,
            other => {
                return Err(EvalError::UnexpectedToken {
                    expected: "a comparison operator".to_string(),
                    found: other.describe(),
                    pos: self.peek_pos(),
                })
            }
        };
        let literal = self.parse_literal()?;
        Ok(Predicate::Comparison { property, op, literal })
    }

    fn parse_var_property(&mut self) -> Result<String, EvalError> {
        let var = self.expect_ident("a variable reference")?;
        if self.variable.as_deref() != Some(var.as_str()) {
            return Err(EvalError::UnknownVariable(var));
        }
        self.expect(&Token::Dot, "'.'")?;
        self.expect_ident("a property name")
    }

    fn parse_literal(&mut self) -> Result<ScalarValue, EvalError> {
        match self.advance() {
            Token::Int(n) => Ok(ScalarValue::Int(n)),
            Token::Float(n) => Ok(ScalarValue::float(n)),
            Token::Str(s) => Ok(ScalarValue::Str(s)),
            Token::True => Ok(ScalarValue::Bool(true)),
            Token::False => Ok(ScalarValue::Bool(false)),
            other => Err(EvalError::UnexpectedToken {
                expected: "a literal".to_string(),
                found: other.describe(),
                pos: self.peek_pos(),
            }),
        }
    }

    fn parse_projection(&mut self) -> Result<Vec<ReturnItem>, EvalError> {
        let mut items = Vec::new();
        let mut seen_keys = HashSet::new();
        loop {
            let property = self.parse_var_property()?;
            let alias = if *self.peek() == Token::As {
                self.advance();
                self.expect_ident("an alias")?
            } else {
                property.clone()
            };
            // "duplicate property names are deduplicated in the output data
            // mapping" (§4.5) — first occurrence wins, later ones are
            // dropped rather than overwriting it.
            if seen_keys.insert(alias.clone()) {
                items.push(ReturnItem { property, alias });
            }
            if *self.peek() == Token::Comma {
                self.advance();
            } else {
                break;
            }
        }
        Ok(items)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::CompareOp;

    #[test]
    fn parses_s1_order_query() {
        let q = compile("MATCH (o:Order) WHERE o.status = 'READY_FOR_PICKUP' RETURN o.id, o.customer").unwrap();
        assert_eq!(q.variable, "o");
        assert_eq!(q.label, "Order");
        assert_eq!(
            q.predicate,
            Some(Predicate::Comparison {
                property: "status".into(),
                op: CompareOp::Eq,
                literal: ScalarValue::from("READY_FOR_PICKUP"),
            })
        );
        assert_eq!(q.projection.len(), 2);
    }

    #[test]
    fn parses_conjunction_and_not_exists() {
        let q = compile(
            "MATCH (o:Order) WHERE o.total >= 10 AND NOT EXISTS(o.cancelled) RETURN o.id",
        )
        .unwrap();
        match q.predicate.unwrap() {
            Predicate::And(terms) => assert_eq!(terms.len(), 2),
            other => panic!("expected conjunction, got {other:?}"),
        }
    }

    #[test]
    fn dedups_projection_by_output_key() {
        let q = compile("MATCH (o:Order) RETURN o.id, o.id, o.customer AS id").unwrap();
        // o.id kept once; o.customer AS id collides with the existing `id`
        // key and is dropped.
        assert_eq!(q.projection.len(), 1);
    }

    #[test]
    fn parses_signed_integer_literal() {
        let q = compile("MATCH (o:Order) WHERE o.balance = -42 RETURN o.id").unwrap();
        assert_eq!(
            q.predicate,
            Some(Predicate::Comparison {
                property: "balance".into(),
                op: CompareOp::Eq,
                literal: ScalarValue::Int(-42),
            })
        );
    }

    #[test]
    fn rejects_unbound_variable() {
        let err = compile("MATCH (o:Order) WHERE x.status = 'A' RETURN o.id").unwrap_err();
        assert_eq!(err, EvalError::UnknownVariable("x".into()));
    }

    #[test]
    fn is_case_insensitive_for_keywords_only() {
        let q = compile("match (O:Order) where O.Status = 1 return O.Status").unwrap();
        assert_eq!(q.variable, "O");
        // property name `Status` stays case-sensitive.
        match q.predicate.unwrap() {
            Predicate::Comparison { property, .. } => assert_eq!(property, "Status"),
            other => panic!("unexpected predicate {other:?}"),
        }
    }
}
