//! Alert condition language.
//!
//! A small expression language evaluated against one HTTP response:
//!
//! ```text
//! response.status < 200 || response.status >= 300
//! response.time > 2000
//! response.status not in 200..299
//! response.body contains "error" and response.size > 0
//! response.headers["content-type"] startsWith "text/html"
//! ```
//!
//! Evaluation is fail-safe: [`evaluate`] and [`Condition::matches`]
//! return `false` for syntax errors, runtime errors, and non-boolean
//! results, so a broken alert never fires and never aborts a cycle.

mod eval;
mod lexer;
mod parser;

use std::collections::HashMap;

use thiserror::Error;

use self::eval::Value;
use self::parser::Expr;

/// Errors from compiling or evaluating a condition.
#[derive(Debug, Error)]
pub enum ConditionError {
    #[error("syntax error at offset {pos}: {message}")]
    Parse { pos: usize, message: String },

    #[error("unknown identifier: {0}")]
    UnknownIdentifier(String),

    #[error("unknown field: {0}")]
    UnknownField(String),

    #[error("unknown function: {0}")]
    UnknownFunction(String),

    #[error("cannot apply {op} to {lhs} and {rhs}")]
    TypeMismatch {
        op: &'static str,
        lhs: &'static str,
        rhs: &'static str,
    },

    #[error("invalid regex: {0}")]
    Regex(#[from] regex::Error),

    #[error("condition evaluated to {0}, expected bool")]
    NotBoolean(&'static str),

    #[error("{0}")]
    Invalid(String),
}

/// The `response` object exposed to conditions.
#[derive(Debug, Clone, Copy)]
pub struct ResponseContext<'a> {
    pub status: u16,
    /// Latency in milliseconds.
    pub time_ms: f64,
    pub body: &'a str,
    pub headers: &'a HashMap<String, String>,
    /// Body length in bytes.
    pub size: usize,
}

impl<'a> ResponseContext<'a> {
    /// Case-insensitive header lookup.
    pub fn header(&self, name: &str) -> Option<&'a str> {
        let headers: &'a HashMap<String, String> = self.headers;
        headers
            .get(name)
            .or_else(|| {
                headers
                    .iter()
                    .find(|(key, _)| key.eq_ignore_ascii_case(name))
                    .map(|(_, value)| value)
            })
            .map(String::as_str)
    }
}

/// A compiled condition.
#[derive(Debug, Clone)]
pub struct Condition {
    source: String,
    expr: Expr,
}

impl Condition {
    pub fn compile(source: &str) -> Result<Self, ConditionError> {
        let tokens = lexer::tokenize(source)?;
        let expr = parser::parse(tokens, source.len())?;
        Ok(Self {
            source: source.to_string(),
            expr,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Evaluate, surfacing every failure.
    pub fn eval(&self, ctx: &ResponseContext<'_>) -> Result<bool, ConditionError> {
        match eval::eval(&self.expr, ctx)? {
            Value::Bool(b) => Ok(b),
            other => Err(ConditionError::NotBoolean(other.type_name())),
        }
    }

    /// Evaluate, treating any failure as "not triggered".
    pub fn matches(&self, ctx: &ResponseContext<'_>) -> bool {
        self.eval(ctx).unwrap_or(false)
    }
}

/// Compile and evaluate `expression` in one step. Never fails: any
/// error yields `false`.
pub fn evaluate(expression: &str, ctx: &ResponseContext<'_>) -> bool {
    Condition::compile(expression)
        .map(|condition| condition.matches(ctx))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    use monika_config::Alert;

    struct Fixture {
        status: u16,
        time_ms: f64,
        body: String,
        headers: HashMap<String, String>,
    }

    impl Fixture {
        fn new(status: u16, time_ms: f64) -> Self {
            let mut headers = HashMap::new();
            headers.insert("content-type".to_string(), "application/json".to_string());
            headers.insert("set-cookie".to_string(), "a=1, b=2".to_string());
            Self {
                status,
                time_ms,
                body: r#"{"ok":true}"#.to_string(),
                headers,
            }
        }

        fn ctx(&self) -> ResponseContext<'_> {
            ResponseContext {
                status: self.status,
                time_ms: self.time_ms,
                body: &self.body,
                headers: &self.headers,
                size: self.body.len(),
            }
        }
    }

    fn default_alert_fires(index: usize, fixture: &Fixture) -> bool {
        evaluate(&Alert::default_set()[index].query, &fixture.ctx())
    }

    #[test]
    fn default_status_alert() {
        assert!(default_alert_fires(0, &Fixture::new(404, 10.0)));
        assert!(default_alert_fires(0, &Fixture::new(199, 10.0)));
        assert!(!default_alert_fires(0, &Fixture::new(204, 10.0)));
        assert!(!default_alert_fires(0, &Fixture::new(200, 10.0)));
    }

    #[test]
    fn default_latency_alert() {
        assert!(default_alert_fires(1, &Fixture::new(200, 2500.0)));
        assert!(!default_alert_fires(1, &Fixture::new(200, 1500.0)));
        assert!(!default_alert_fires(1, &Fixture::new(200, 2000.0)));
    }

    #[test]
    fn malformed_expression_is_not_triggered() {
        let f = Fixture::new(500, 10.0);
        assert!(!evaluate("response.status >", &f.ctx()));
        assert!(!evaluate("response.status === 500", &f.ctx()));
        assert!(!evaluate("", &f.ctx()));
    }

    #[test]
    fn runtime_errors_are_not_triggered() {
        let f = Fixture::new(500, 10.0);
        assert!(!evaluate("request.status == 500", &f.ctx()));
        assert!(!evaluate("response.latency > 1", &f.ctx()));
        assert!(!evaluate("response.body > 3", &f.ctx()));
        assert!(!evaluate("response.status / 0 > 1", &f.ctx()));
        assert!(!evaluate(r#"response.body matches "(""#, &f.ctx()));
    }

    #[test]
    fn deeply_nested_expression_is_not_triggered() {
        let f = Fixture::new(500, 10.0);
        let parens = format!("{}true{}", "(".repeat(100_000), ")".repeat(100_000));
        assert!(!evaluate(&parens, &f.ctx()));
        assert!(!evaluate(&format!("{}true", "!".repeat(100_000)), &f.ctx()));
        assert!(!evaluate(&vec!["true"; 100_000].join(" || "), &f.ctx()));
        assert!(matches!(
            Condition::compile(&parens),
            Err(ConditionError::Parse { .. })
        ));

        // Shallow nesting still works.
        let shallow = format!("{}response.status == 500{}", "(".repeat(10), ")".repeat(10));
        assert!(evaluate(&shallow, &f.ctx()));
    }

    #[test]
    fn non_boolean_result_is_not_triggered() {
        let f = Fixture::new(500, 10.0);
        assert!(!evaluate("response.status", &f.ctx()));
        let err = Condition::compile("response.status + 1")
            .unwrap()
            .eval(&f.ctx())
            .unwrap_err();
        assert!(matches!(err, ConditionError::NotBoolean("int")));
    }

    #[test]
    fn ranges_and_lists() {
        let f = Fixture::new(503, 10.0);
        assert!(evaluate("response.status not in 200..299", &f.ctx()));
        assert!(evaluate("response.status in [500, 502, 503]", &f.ctx()));
        assert!(!evaluate("response.status in 200..299", &f.ctx()));
    }

    #[test]
    fn string_operators() {
        let f = Fixture::new(200, 10.0);
        assert!(evaluate(r#"response.body contains "ok""#, &f.ctx()));
        assert!(evaluate(r#"response.body startsWith "{""#, &f.ctx()));
        assert!(evaluate(r#"response.body endsWith "}""#, &f.ctx()));
        assert!(evaluate(r#"response.body matches "\"ok\":\\s*true""#, &f.ctx()));
        assert!(evaluate(r#"response.body == '{"ok":true}'"#, &f.ctx()));
    }

    #[test]
    fn headers_are_case_insensitive() {
        let f = Fixture::new(200, 10.0);
        assert!(evaluate(
            r#"response.headers["Content-Type"] == "application/json""#,
            &f.ctx()
        ));
        assert!(evaluate(r#"response.headers["set-cookie"] contains "b=2""#, &f.ctx()));
        assert!(evaluate(r#""content-type" in response.headers"#, &f.ctx()));
        assert!(evaluate(r#"response.headers["x-missing"] == nil"#, &f.ctx()));
    }

    #[test]
    fn size_and_arithmetic() {
        let f = Fixture::new(200, 1234.5);
        assert!(evaluate("response.size == 11", &f.ctx()));
        assert!(evaluate("response.time / 1000 > 1.2", &f.ctx()));
        assert!(evaluate("response.status % 100 == 0", &f.ctx()));
        assert!(evaluate("-response.status < 0", &f.ctx()));
        assert!(evaluate("len(response.body) == response.size", &f.ctx()));
    }

    #[test]
    fn connectives_short_circuit() {
        let f = Fixture::new(200, 10.0);
        // The right side would be a type error if evaluated.
        assert!(evaluate("response.status == 200 || response.body > 1", &f.ctx()));
        assert!(!evaluate("response.status != 200 && response.body > 1", &f.ctx()));
        assert!(evaluate("not (response.status == 500) and true", &f.ctx()));
    }

    #[test]
    fn compiled_condition_is_reusable() {
        let condition = Condition::compile("response.status >= 500").unwrap();
        assert_eq!(condition.source(), "response.status >= 500");
        assert!(condition.matches(&Fixture::new(502, 1.0).ctx()));
        assert!(!condition.matches(&Fixture::new(200, 1.0).ctx()));
    }
}
