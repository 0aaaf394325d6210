//! Tokenizer for matcher expressions.

use crate::errors::{AuthzError, AuthzResult};

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Ident(String),
    Str(String),
    Num(f64),
    AndAnd,
    OrOr,
    Not,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    LParen,
    RParen,
    Comma,
}

fn is_ident_start(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_'
}

fn is_ident_continue(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_'
}

/// Tokenize a matcher expression.
///
/// Dotted request/policy references (`r.sub`, `p.obj`) are normalized to the
/// underscore form (`r_sub`, `p_obj`) so embedded model text and evaluator
/// bindings agree on one spelling.
pub(crate) fn tokenize(source: &str) -> AuthzResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '&' => {
                chars.next();
                if chars.next_if_eq(&'&').is_none() {
                    return Err(AuthzError::MalformedMatcher(
                        "expected '&&'".to_string(),
                    ));
                }
                tokens.push(Token::AndAnd);
            }
            '|' => {
                chars.next();
                if chars.next_if_eq(&'|').is_none() {
                    return Err(AuthzError::MalformedMatcher(
                        "expected '||'".to_string(),
                    ));
                }
                tokens.push(Token::OrOr);
            }
            '!' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ne);
                } else {
                    tokens.push(Token::Not);
                }
            }
            '=' => {
                chars.next();
                if chars.next_if_eq(&'=').is_none() {
                    return Err(AuthzError::MalformedMatcher(
                        "expected '==', assignment is not supported".to_string(),
                    ));
                }
                tokens.push(Token::Eq);
            }
            '<' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.next_if_eq(&'=').is_some() {
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '\'' | '"' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some('\\') => match chars.next() {
                            Some(escaped @ ('\\' | '\'' | '"')) => literal.push(escaped),
                            Some(other) => {
                                return Err(AuthzError::MalformedMatcher(format!(
                                    "unsupported escape '\\{other}'"
                                )));
                            }
                            None => {
                                return Err(AuthzError::MalformedMatcher(
                                    "unterminated string literal".to_string(),
                                ));
                            }
                        },
                        Some(ch) => literal.push(ch),
                        None => {
                            return Err(AuthzError::MalformedMatcher(
                                "unterminated string literal".to_string(),
                            ));
                        }
                    }
                }
                tokens.push(Token::Str(literal));
            }
            '0'..='9' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value: f64 = literal.parse().map_err(|_| {
                    AuthzError::MalformedMatcher(format!("invalid number '{literal}'"))
                })?;
                tokens.push(Token::Num(value));
            }
            c if is_ident_start(c) => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if is_ident_continue(ch) {
                        ident.push(ch);
                        chars.next();
                    } else if ch == '.' {
                        // `r.sub` style reference: fold the dot into '_'.
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        match lookahead.peek() {
                            Some(&next) if is_ident_start(next) => {
                                ident.push('_');
                                chars.next();
                            }
                            _ => break,
                        }
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(AuthzError::MalformedMatcher(format!(
                    "unexpected character '{other}'"
                )));
            }
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tokenizes_a_typical_matcher() {
        let tokens =
            tokenize("g(r.sub, p.sub) && keyMatch(r.obj, p.obj)").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("g".to_string()),
                Token::LParen,
                Token::Ident("r_sub".to_string()),
                Token::Comma,
                Token::Ident("p_sub".to_string()),
                Token::RParen,
                Token::AndAnd,
                Token::Ident("keyMatch".to_string()),
                Token::LParen,
                Token::Ident("r_obj".to_string()),
                Token::Comma,
                Token::Ident("p_obj".to_string()),
                Token::RParen,
            ]
        );
    }

    #[test]
    fn underscore_spelling_passes_through() {
        let tokens = tokenize("r_sub == p_sub").expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("r_sub".to_string()),
                Token::Eq,
                Token::Ident("p_sub".to_string()),
            ]
        );
    }

    #[test]
    fn string_literals_in_both_quote_styles() {
        let tokens = tokenize(r#"r_act == "get" || r_act == 'list'"#).expect("tokenize");
        assert_eq!(
            tokens,
            vec![
                Token::Ident("r_act".to_string()),
                Token::Eq,
                Token::Str("get".to_string()),
                Token::OrOr,
                Token::Ident("r_act".to_string()),
                Token::Eq,
                Token::Str("list".to_string()),
            ]
        );
    }

    #[test]
    fn numbers_and_comparisons() {
        let tokens = tokenize("1.5 >= 0").expect("tokenize");
        assert_eq!(
            tokens,
            vec![Token::Num(1.5), Token::Ge, Token::Num(0.0)]
        );
    }

    #[test]
    fn rejects_single_ampersand() {
        let err = tokenize("a & b").expect_err("malformed");
        assert!(matches!(err, AuthzError::MalformedMatcher(_)));
    }

    #[test]
    fn rejects_unterminated_string() {
        let err = tokenize("r_obj == 'open").expect_err("malformed");
        assert!(matches!(err, AuthzError::MalformedMatcher(_)));
    }
}
