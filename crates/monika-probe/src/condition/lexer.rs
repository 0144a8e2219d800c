//! Tokenizer for alert expressions.

use super::ConditionError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Token {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
    DotDot,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    AndAnd,
    OrOr,
    Bang,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
}

/// A token and the byte offset where it starts.
pub(crate) type Spanned = (Token, usize);

pub(crate) fn tokenize(src: &str) -> Result<Vec<Spanned>, ConditionError> {
    let chars: Vec<(usize, char)> = src.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let (pos, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].1.is_ascii_digit() {
                i += 1;
            }
            // `1.5` is a float, `1..5` is a range.
            let is_float = i + 1 < chars.len()
                && chars[i].1 == '.'
                && chars[i + 1].1.is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].1.is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().map(|&(_, c)| c).collect();
            let token = if is_float {
                Token::Float(text.parse().map_err(|_| parse_err(pos, "invalid number"))?)
            } else {
                Token::Int(text.parse().map_err(|_| parse_err(pos, "integer out of range"))?)
            };
            tokens.push((token, pos));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|&(_, c)| c).collect();
            tokens.push((Token::Ident(text), pos));
            continue;
        }

        if c == '"' || c == '\'' {
            let quote = c;
            let mut value = String::new();
            i += 1;
            loop {
                let Some(&(_, c)) = chars.get(i) else {
                    return Err(parse_err(pos, "unterminated string"));
                };
                i += 1;
                match c {
                    c if c == quote => break,
                    '\\' => {
                        let Some(&(_, escaped)) = chars.get(i) else {
                            return Err(parse_err(pos, "unterminated string"));
                        };
                        i += 1;
                        value.push(match escaped {
                            'n' => '\n',
                            't' => '\t',
                            'r' => '\r',
                            other => other,
                        });
                    }
                    other => value.push(other),
                }
            }
            tokens.push((Token::Str(value), pos));
            continue;
        }

        let (token, width) = match (c, next) {
            ('=', Some('=')) => (Token::Eq, 2),
            ('!', Some('=')) => (Token::Ne, 2),
            ('<', Some('=')) => (Token::Le, 2),
            ('>', Some('=')) => (Token::Ge, 2),
            ('&', Some('&')) => (Token::AndAnd, 2),
            ('|', Some('|')) => (Token::OrOr, 2),
            ('.', Some('.')) => (Token::DotDot, 2),
            ('<', _) => (Token::Lt, 1),
            ('>', _) => (Token::Gt, 1),
            ('!', _) => (Token::Bang, 1),
            ('(', _) => (Token::LParen, 1),
            (')', _) => (Token::RParen, 1),
            ('[', _) => (Token::LBracket, 1),
            (']', _) => (Token::RBracket, 1),
            (',', _) => (Token::Comma, 1),
            ('.', _) => (Token::Dot, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('%', _) => (Token::Percent, 1),
            _ => return Err(parse_err(pos, &format!("unexpected character {c:?}"))),
        };
        tokens.push((token, pos));
        i += width;
    }

    Ok(tokens)
}

fn parse_err(pos: usize, message: &str) -> ConditionError {
    ConditionError::Parse {
        pos,
        message: message.to_string(),
    }
}
