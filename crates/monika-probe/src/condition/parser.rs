//! Recursive-descent parser producing the expression tree.
//!
//! Precedence, loosest first: `||`, `&&`, `!`, comparison, `..`,
//! `+ -`, `* / %`, unary `-`, member/index access.

use super::lexer::{Spanned, Token};
use super::ConditionError;

/// Deepest expression tree the parser will build. Nesting, unary
/// operators and operator chains all count toward it.
pub(crate) const MAX_DEPTH: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Expr {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    List(Vec<Expr>),
    Member(Box<Expr>, String),
    Index(Box<Expr>, Box<Expr>),
    Call(String, Vec<Expr>),
    Range(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Neg(Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    NotIn,
    Contains,
    StartsWith,
    EndsWith,
    Matches,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    pub(crate) fn symbol(self) -> &'static str {
        match self {
            BinaryOp::Or => "||",
            BinaryOp::And => "&&",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::In => "in",
            BinaryOp::NotIn => "not in",
            BinaryOp::Contains => "contains",
            BinaryOp::StartsWith => "startsWith",
            BinaryOp::EndsWith => "endsWith",
            BinaryOp::Matches => "matches",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

pub(crate) fn parse(tokens: Vec<Spanned>, src_len: usize) -> Result<Expr, ConditionError> {
    let mut parser = Parser {
        tokens,
        pos: 0,
        src_len,
        depth: 0,
    };
    let expr = parser.or()?;
    if parser.pos < parser.tokens.len() {
        return Err(parser.error("unexpected trailing input"));
    }
    Ok(expr)
}

struct Parser {
    tokens: Vec<Spanned>,
    pos: usize,
    src_len: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|(t, _)| t)
    }

    fn peek_at(&self, offset: usize) -> Option<&Token> {
        self.tokens.get(self.pos + offset).map(|(t, _)| t)
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word == keyword)
    }

    fn advance(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).map(|(t, _)| t.clone());
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, what: &str) -> Result<(), ConditionError> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(self.error(&format!("expected {what}")))
        }
    }

    fn error(&self, message: &str) -> ConditionError {
        let pos = self
            .tokens
            .get(self.pos)
            .map(|&(_, pos)| pos)
            .unwrap_or(self.src_len);
        ConditionError::Parse {
            pos,
            message: message.to_string(),
        }
    }

    /// One level deeper into the tree. Callers reset `depth` when the
    /// subtree is done.
    fn descend(&mut self) -> Result<(), ConditionError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(self.error("expression nested too deeply"));
        }
        Ok(())
    }

    fn or(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        self.descend()?;
        let mut lhs = self.and()?;
        while self.peek() == Some(&Token::OrOr) || self.peek_keyword("or") {
            self.pos += 1;
            self.descend()?;
            let rhs = self.and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut lhs = self.not()?;
        while self.peek() == Some(&Token::AndAnd) || self.peek_keyword("and") {
            self.pos += 1;
            self.descend()?;
            let rhs = self.not()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        self.depth = base;
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Bang) || self.peek_keyword("not") {
            self.pos += 1;
            let base = self.depth;
            self.descend()?;
            let inner = self.not()?;
            self.depth = base;
            return Ok(Expr::Not(Box::new(inner)));
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ConditionError> {
        let lhs = self.range()?;

        let op = match self.peek() {
            Some(Token::Eq) => Some((BinaryOp::Eq, 1)),
            Some(Token::Ne) => Some((BinaryOp::Ne, 1)),
            Some(Token::Lt) => Some((BinaryOp::Lt, 1)),
            Some(Token::Le) => Some((BinaryOp::Le, 1)),
            Some(Token::Gt) => Some((BinaryOp::Gt, 1)),
            Some(Token::Ge) => Some((BinaryOp::Ge, 1)),
            Some(Token::Ident(word)) => match word.as_str() {
                "in" => Some((BinaryOp::In, 1)),
                "contains" => Some((BinaryOp::Contains, 1)),
                "startsWith" => Some((BinaryOp::StartsWith, 1)),
                "endsWith" => Some((BinaryOp::EndsWith, 1)),
                "matches" => Some((BinaryOp::Matches, 1)),
                "not" if matches!(self.peek_at(1), Some(Token::Ident(w)) if w == "in") => {
                    Some((BinaryOp::NotIn, 2))
                }
                _ => None,
            },
            _ => None,
        };

        match op {
            Some((op, width)) => {
                self.pos += width;
                let rhs = self.range()?;
                Ok(Expr::Binary(op, Box::new(lhs), Box::new(rhs)))
            }
            None => Ok(lhs),
        }
    }

    fn range(&mut self) -> Result<Expr, ConditionError> {
        let lhs = self.additive()?;
        if self.peek() == Some(&Token::DotDot) {
            self.pos += 1;
            let rhs = self.additive()?;
            return Ok(Expr::Range(Box::new(lhs), Box::new(rhs)));
        }
        Ok(lhs)
    }

    fn additive(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut lhs = self.multiplicative()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => BinaryOp::Add,
                Some(Token::Minus) => BinaryOp::Sub,
                _ => {
                    self.depth = base;
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.multiplicative()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut lhs = self.unary()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => BinaryOp::Mul,
                Some(Token::Slash) => BinaryOp::Div,
                Some(Token::Percent) => BinaryOp::Rem,
                _ => {
                    self.depth = base;
                    return Ok(lhs);
                }
            };
            self.pos += 1;
            self.descend()?;
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn unary(&mut self) -> Result<Expr, ConditionError> {
        if self.peek() == Some(&Token::Minus) {
            self.pos += 1;
            let base = self.depth;
            self.descend()?;
            let inner = self.unary()?;
            self.depth = base;
            return Ok(Expr::Neg(Box::new(inner)));
        }
        self.postfix()
    }

    fn postfix(&mut self) -> Result<Expr, ConditionError> {
        let base = self.depth;
        let mut expr = self.primary()?;
        loop {
            match self.peek() {
                Some(Token::Dot) => {
                    self.pos += 1;
                    self.descend()?;
                    match self.advance() {
                        Some(Token::Ident(field)) => {
                            expr = Expr::Member(Box::new(expr), field);
                        }
                        _ => {
                            self.pos = self.pos.saturating_sub(1);
                            return Err(self.error("expected field name after '.'"));
                        }
                    }
                }
                Some(Token::LBracket) => {
                    self.pos += 1;
                    self.descend()?;
                    let index = self.or()?;
                    self.expect(Token::RBracket, "']'")?;
                    expr = Expr::Index(Box::new(expr), Box::new(index));
                }
                _ => {
                    self.depth = base;
                    return Ok(expr);
                }
            }
        }
    }

    fn primary(&mut self) -> Result<Expr, ConditionError> {
        let Some(token) = self.advance() else {
            return Err(self.error("unexpected end of expression"));
        };

        match token {
            Token::Int(n) => Ok(Expr::Int(n)),
            Token::Float(n) => Ok(Expr::Float(n)),
            Token::Str(s) => Ok(Expr::Str(s)),
            Token::LParen => {
                let inner = self.or()?;
                self.expect(Token::RParen, "')'")?;
                Ok(inner)
            }
            Token::LBracket => {
                let mut items = Vec::new();
                if self.peek() != Some(&Token::RBracket) {
                    loop {
                        items.push(self.or()?);
                        if self.peek() == Some(&Token::Comma) {
                            self.pos += 1;
                            continue;
                        }
                        break;
                    }
                }
                self.expect(Token::RBracket, "']'")?;
                Ok(Expr::List(items))
            }
            Token::Ident(word) => match word.as_str() {
                "true" => Ok(Expr::Bool(true)),
                "false" => Ok(Expr::Bool(false)),
                "nil" | "null" => Ok(Expr::Nil),
                _ if self.peek() == Some(&Token::LParen) => {
                    self.pos += 1;
                    let mut args = Vec::new();
                    if self.peek() != Some(&Token::RParen) {
                        loop {
                            args.push(self.or()?);
                            if self.peek() == Some(&Token::Comma) {
                                self.pos += 1;
                                continue;
                            }
                            break;
                        }
                    }
                    self.expect(Token::RParen, "')'")?;
                    Ok(Expr::Call(word, args))
                }
                _ => Ok(Expr::Ident(word)),
            },
            _ => {
                self.pos -= 1;
                Err(self.error("unexpected token"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::lexer::tokenize;

    fn parse_str(src: &str) -> Result<Expr, ConditionError> {
        parse(tokenize(src)?, src.len())
    }

    fn member(root: &str, field: &str) -> Expr {
        Expr::Member(Box::new(Expr::Ident(root.to_string())), field.to_string())
    }

    #[test]
    fn or_binds_looser_than_comparison() {
        let expr = parse_str("response.status < 200 || response.status >= 300").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Or,
                Box::new(Expr::Binary(
                    BinaryOp::Lt,
                    Box::new(member("response", "status")),
                    Box::new(Expr::Int(200)),
                )),
                Box::new(Expr::Binary(
                    BinaryOp::Ge,
                    Box::new(member("response", "status")),
                    Box::new(Expr::Int(300)),
                )),
            )
        );
    }

    #[test]
    fn not_in_range() {
        let expr = parse_str("response.status not in 200..299").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::NotIn,
                Box::new(member("response", "status")),
                Box::new(Expr::Range(Box::new(Expr::Int(200)), Box::new(Expr::Int(299)))),
            )
        );
    }

    #[test]
    fn arithmetic_precedence() {
        let expr = parse_str("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary(
                BinaryOp::Add,
                Box::new(Expr::Int(1)),
                Box::new(Expr::Binary(
                    BinaryOp::Mul,
                    Box::new(Expr::Int(2)),
                    Box::new(Expr::Int(3))
                )),
            )
        );
    }

    #[test]
    fn index_and_call() {
        let expr = parse_str(r#"lower(response.headers["Content-Type"])"#).unwrap();
        assert_eq!(
            expr,
            Expr::Call(
                "lower".to_string(),
                vec![Expr::Index(
                    Box::new(member("response", "headers")),
                    Box::new(Expr::Str("Content-Type".to_string())),
                )]
            )
        );
    }

    #[test]
    fn keyword_connectives() {
        let expr = parse_str("not true and false or true").unwrap();
        assert!(matches!(expr, Expr::Binary(BinaryOp::Or, _, _)));
    }

    #[test]
    fn errors() {
        assert!(parse_str("").is_err());
        assert!(parse_str("response.status >").is_err());
        assert!(parse_str("(1 + 2").is_err());
        assert!(parse_str("1 2").is_err());
        assert!(parse_str("response.").is_err());
        assert!(parse_str("[1, 2").is_err());
    }

    fn nested(open: &str, inner: &str, close: &str, depth: usize) -> String {
        format!("{}{inner}{}", open.repeat(depth), close.repeat(depth))
    }

    fn too_deep(src: &str) -> bool {
        matches!(
            parse_str(src),
            Err(ConditionError::Parse { ref message, .. }) if message.contains("too deeply")
        )
    }

    #[test]
    fn moderate_nesting_parses() {
        assert!(parse_str(&nested("(", "true", ")", 20)).is_ok());
        assert!(parse_str(&nested("!", "true", "", 20)).is_ok());
        assert!(parse_str(&nested("[", "1", "]", 20)).is_ok());
        assert!(parse_str(&vec!["true"; 20].join(" || ")).is_ok());
    }

    #[test]
    fn deep_nesting_is_rejected() {
        assert!(too_deep(&nested("(", "true", ")", 100_000)));
        assert!(too_deep(&nested("[", "1", "]", 100_000)));
        assert!(too_deep(&nested("!", "true", "", 100_000)));
        assert!(too_deep(&nested("not ", "true", "", 100_000)));
        assert!(too_deep(&nested("-", "1", "", 100_000)));
        assert!(too_deep(&nested("len(", "1", ")", 100_000)));
        assert!(too_deep(&format!("x{}", "[0]".repeat(100_000))));
    }

    #[test]
    fn long_operator_chains_are_rejected() {
        assert!(too_deep(&vec!["true"; 100_000].join(" || ")));
        assert!(too_deep(&vec!["true"; 100_000].join(" && ")));
        assert!(too_deep(&vec!["1"; 100_000].join(" + ")));
        assert!(too_deep(&vec!["1"; 100_000].join(" * ")));
        assert!(too_deep(&format!("response{}", ".status".repeat(100_000))));
    }

    #[test]
    fn sibling_groups_do_not_accumulate_depth() {
        let group = nested("(", "true", ")", MAX_DEPTH / 2);
        let src = vec![group.as_str(); 2].join(" == ");
        assert!(parse_str(&src).is_ok());
    }
}
