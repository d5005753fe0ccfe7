//! Condition evaluation for IAM policies
//!
//! Conditions restrict when a statement applies, based on request context:
//! - String operations (Equals, NotEquals, Like, NotLike)
//! - Numeric operations (Equals, LessThan, GreaterThan and their -Equals forms)
//! - Date operations (LessThan, GreaterThan; RFC 3339, `YYYY-MM-DD` or epoch seconds)
//! - Bool
//!
//! A condition listing several values is satisfied when any of them matches.
//! The negated string operators are satisfied only when none of them match.

use super::pattern::Pattern;
use crate::error::{IamError, Result};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

/// Condition operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ConditionOperator {
    /// String equals (case-sensitive)
    StringEquals,
    /// String not equals
    StringNotEquals,
    /// String matches pattern (supports * wildcard)
    StringLike,
    /// String does not match pattern
    StringNotLike,
    NumericEquals,
    NumericLessThan,
    NumericLessThanEquals,
    NumericGreaterThan,
    NumericGreaterThanEquals,
    DateLessThan,
    DateGreaterThan,
    Bool,
}

impl ConditionOperator {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConditionOperator::StringEquals => "StringEquals",
            ConditionOperator::StringNotEquals => "StringNotEquals",
            ConditionOperator::StringLike => "StringLike",
            ConditionOperator::StringNotLike => "StringNotLike",
            ConditionOperator::NumericEquals => "NumericEquals",
            ConditionOperator::NumericLessThan => "NumericLessThan",
            ConditionOperator::NumericLessThanEquals => "NumericLessThanEquals",
            ConditionOperator::NumericGreaterThan => "NumericGreaterThan",
            ConditionOperator::NumericGreaterThanEquals => "NumericGreaterThanEquals",
            ConditionOperator::DateLessThan => "DateLessThan",
            ConditionOperator::DateGreaterThan => "DateGreaterThan",
            ConditionOperator::Bool => "Bool",
        }
    }

    fn is_negated(&self) -> bool {
        matches!(
            self,
            ConditionOperator::StringNotEquals | ConditionOperator::StringNotLike
        )
    }
}

impl FromStr for ConditionOperator {
    type Err = IamError;

    fn from_str(s: &str) -> Result<Self> {
        let op = match s {
            "StringEquals" => ConditionOperator::StringEquals,
            "StringNotEquals" => ConditionOperator::StringNotEquals,
            "StringLike" => ConditionOperator::StringLike,
            "StringNotLike" => ConditionOperator::StringNotLike,
            "NumericEquals" => ConditionOperator::NumericEquals,
            "NumericLessThan" => ConditionOperator::NumericLessThan,
            "NumericLessThanEquals" => ConditionOperator::NumericLessThanEquals,
            "NumericGreaterThan" => ConditionOperator::NumericGreaterThan,
            "NumericGreaterThanEquals" => ConditionOperator::NumericGreaterThanEquals,
            "DateLessThan" => ConditionOperator::DateLessThan,
            "DateGreaterThan" => ConditionOperator::DateGreaterThan,
            "Bool" => ConditionOperator::Bool,
            other => return Err(IamError::UnknownConditionOperator(other.to_string())),
        };
        Ok(op)
    }
}

impl fmt::Display for ConditionOperator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Condition value (can be string, number, or bool)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ConditionValue {
    String(String),
    Number(f64),
    Bool(bool),
}

impl ConditionValue {
    fn as_string(&self) -> Option<&str> {
        match self {
            ConditionValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Policy documents usually quote numbers, so strings are parsed too
    fn as_number(&self) -> Option<f64> {
        match self {
            ConditionValue::Number(n) => Some(*n),
            ConditionValue::String(s) => s.trim().parse().ok(),
            ConditionValue::Bool(_) => None,
        }
    }

    fn as_bool(&self) -> Option<bool> {
        match self {
            ConditionValue::Bool(b) => Some(*b),
            ConditionValue::String(s) if s.eq_ignore_ascii_case("true") => Some(true),
            ConditionValue::String(s) if s.eq_ignore_ascii_case("false") => Some(false),
            _ => None,
        }
    }

    fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            ConditionValue::String(s) => {
                if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
                    return Some(dt.with_timezone(&Utc));
                }
                NaiveDate::parse_from_str(s, "%Y-%m-%d")
                    .ok()
                    .and_then(|d| d.and_hms_opt(0, 0, 0))
                    .map(|dt| dt.and_utc())
            }
            ConditionValue::Number(n) => DateTime::from_timestamp(*n as i64, 0),
            ConditionValue::Bool(_) => None,
        }
    }
}

impl fmt::Display for ConditionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConditionValue::String(s) => f.write_str(s),
            ConditionValue::Number(n) => write!(f, "{}", n),
            ConditionValue::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<&str> for ConditionValue {
    fn from(value: &str) -> Self {
        ConditionValue::String(value.to_string())
    }
}

impl From<String> for ConditionValue {
    fn from(value: String) -> Self {
        ConditionValue::String(value)
    }
}

impl From<f64> for ConditionValue {
    fn from(value: f64) -> Self {
        ConditionValue::Number(value)
    }
}

impl From<bool> for ConditionValue {
    fn from(value: bool) -> Self {
        ConditionValue::Bool(value)
    }
}

/// Key/value facts about a request, consulted by statement conditions.
///
/// Keys are case-insensitive (`aws:SourceIp` and `aws:sourceip` are the same key).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RequestContext {
    values: HashMap<String, ConditionValue>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: &str, value: impl Into<ConditionValue>) {
        self.values.insert(key.to_ascii_lowercase(), value.into());
    }

    pub fn with(mut self, key: &str, value: impl Into<ConditionValue>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&ConditionValue> {
        self.values.get(&key.to_ascii_lowercase())
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

/// A single condition
#[derive(Debug, Clone, PartialEq)]
pub struct Condition {
    pub operator: ConditionOperator,
    pub key: String,
    pub values: Vec<ConditionValue>,
}

impl Condition {
    /// Create a new condition, checking that every value fits the operator
    pub fn new(
        operator: ConditionOperator,
        key: &str,
        values: Vec<ConditionValue>,
    ) -> Result<Self> {
        for value in &values {
            let valid = match operator {
                ConditionOperator::StringEquals
                | ConditionOperator::StringNotEquals
                | ConditionOperator::StringLike
                | ConditionOperator::StringNotLike => value.as_string().is_some(),
                ConditionOperator::NumericEquals
                | ConditionOperator::NumericLessThan
                | ConditionOperator::NumericLessThanEquals
                | ConditionOperator::NumericGreaterThan
                | ConditionOperator::NumericGreaterThanEquals => value.as_number().is_some(),
                ConditionOperator::DateLessThan | ConditionOperator::DateGreaterThan => {
                    value.as_date().is_some()
                }
                ConditionOperator::Bool => value.as_bool().is_some(),
            };
            if !valid {
                return Err(IamError::InvalidConditionValue {
                    operator: operator.to_string(),
                    key: key.to_string(),
                    value: value.to_string(),
                });
            }
        }

        Ok(Condition {
            operator,
            key: key.to_ascii_lowercase(),
            values,
        })
    }

    /// Evaluate this condition against a context
    pub fn evaluate(&self, context: &RequestContext) -> bool {
        let actual = match context.get(&self.key) {
            Some(v) => v,
            None => return false, // Key not in context - condition fails
        };

        if self.operator.is_negated() {
            !self.values.iter().any(|expected| self.compare(expected, actual))
        } else {
            self.values.iter().any(|expected| self.compare(expected, actual))
        }
    }

    /// Positive comparison of one expected value; negation happens in `evaluate`
    fn compare(&self, expected: &ConditionValue, actual: &ConditionValue) -> bool {
        match self.operator {
            ConditionOperator::StringEquals | ConditionOperator::StringNotEquals => {
                match (expected.as_string(), actual.as_string()) {
                    (Some(expected), Some(actual)) => expected == actual,
                    _ => false,
                }
            }
            ConditionOperator::StringLike | ConditionOperator::StringNotLike => {
                match (expected.as_string(), actual.as_string()) {
                    (Some(pattern), Some(actual)) => Pattern::literal_glob(pattern).matches(actual),
                    _ => false,
                }
            }
            ConditionOperator::NumericEquals => Self::numeric(expected, actual, |e, a| a == e),
            ConditionOperator::NumericLessThan => Self::numeric(expected, actual, |e, a| a < e),
            ConditionOperator::NumericLessThanEquals => {
                Self::numeric(expected, actual, |e, a| a <= e)
            }
            ConditionOperator::NumericGreaterThan => Self::numeric(expected, actual, |e, a| a > e),
            ConditionOperator::NumericGreaterThanEquals => {
                Self::numeric(expected, actual, |e, a| a >= e)
            }
            ConditionOperator::DateLessThan => match (expected.as_date(), actual.as_date()) {
                (Some(expected), Some(actual)) => actual < expected,
                _ => false,
            },
            ConditionOperator::DateGreaterThan => match (expected.as_date(), actual.as_date()) {
                (Some(expected), Some(actual)) => actual > expected,
                _ => false,
            },
            ConditionOperator::Bool => match (expected.as_bool(), actual.as_bool()) {
                (Some(expected), Some(actual)) => expected == actual,
                _ => false,
            },
        }
    }

    fn numeric(
        expected: &ConditionValue,
        actual: &ConditionValue,
        cmp: impl Fn(f64, f64) -> bool,
    ) -> bool {
        match (expected.as_number(), actual.as_number()) {
            (Some(expected), Some(actual)) => cmp(expected, actual),
            _ => false,
        }
    }
}

/// Check that every condition holds. A statement with conditions never
/// applies to a request that carries no context.
pub(crate) fn all_hold(conditions: &[Condition], context: Option<&RequestContext>) -> bool {
    if conditions.is_empty() {
        return true;
    }
    match context {
        Some(ctx) => conditions.iter().all(|c| c.evaluate(ctx)),
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cond(operator: ConditionOperator, key: &str, value: impl Into<ConditionValue>) -> Condition {
        Condition::new(operator, key, vec![value.into()]).unwrap()
    }

    #[test]
    fn test_string_equals() {
        let c = cond(ConditionOperator::StringEquals, "aws:username", "alice");

        assert!(c.evaluate(&RequestContext::new().with("aws:username", "alice")));
        assert!(!c.evaluate(&RequestContext::new().with("aws:username", "bob")));
    }

    #[test]
    fn test_context_keys_case_insensitive() {
        let c = cond(ConditionOperator::StringEquals, "aws:RequestedRegion", "us-east-1");
        let ctx = RequestContext::new().with("AWS:requestedregion", "us-east-1");
        assert!(c.evaluate(&ctx));
    }

    #[test]
    fn test_string_like() {
        let c = cond(ConditionOperator::StringLike, "s3:prefix", "home/alice/*");

        assert!(c.evaluate(&RequestContext::new().with("s3:prefix", "home/alice/docs")));
        assert!(!c.evaluate(&RequestContext::new().with("s3:prefix", "home/bob/docs")));
    }

    #[test]
    fn test_any_of_values() {
        let c = Condition::new(
            ConditionOperator::StringEquals,
            "aws:RequestedRegion",
            vec!["us-east-1".into(), "us-west-2".into()],
        )
        .unwrap();

        assert!(c.evaluate(&RequestContext::new().with("aws:RequestedRegion", "us-west-2")));
        assert!(!c.evaluate(&RequestContext::new().with("aws:RequestedRegion", "eu-west-1")));
    }

    #[test]
    fn test_negated_operators_require_no_match() {
        let c = Condition::new(
            ConditionOperator::StringNotEquals,
            "aws:RequestedRegion",
            vec!["us-east-1".into(), "us-west-2".into()],
        )
        .unwrap();

        assert!(c.evaluate(&RequestContext::new().with("aws:RequestedRegion", "eu-west-1")));
        assert!(!c.evaluate(&RequestContext::new().with("aws:RequestedRegion", "us-west-2")));

        let c = cond(ConditionOperator::StringNotLike, "s3:prefix", "tmp/*");
        assert!(c.evaluate(&RequestContext::new().with("s3:prefix", "data/x")));
        assert!(!c.evaluate(&RequestContext::new().with("s3:prefix", "tmp/x")));
    }

    #[test]
    fn test_numeric_comparisons() {
        let lt = cond(ConditionOperator::NumericLessThan, "s3:max-keys", "10");
        assert!(lt.evaluate(&RequestContext::new().with("s3:max-keys", 5.0)));
        assert!(!lt.evaluate(&RequestContext::new().with("s3:max-keys", "10")));

        let eq = cond(ConditionOperator::NumericEquals, "tiny", 1e-20);
        assert!(eq.evaluate(&RequestContext::new().with("tiny", "1e-20")));
        assert!(!eq.evaluate(&RequestContext::new().with("tiny", 5e-20)));

        let eq = cond(ConditionOperator::NumericEquals, "big", 9_007_199_254_740_992.0);
        assert!(!eq.evaluate(&RequestContext::new().with("big", 9_007_199_254_740_994.0)));

        let ge = cond(ConditionOperator::NumericGreaterThanEquals, "score", 100.0);
        assert!(ge.evaluate(&RequestContext::new().with("score", 100.0)));
        assert!(!ge.evaluate(&RequestContext::new().with("score", 99.0)));
    }

    #[test]
    fn test_date_comparison() {
        let c = cond(
            ConditionOperator::DateLessThan,
            "aws:CurrentTime",
            "2026-12-31T00:00:00Z",
        );

        assert!(c.evaluate(&RequestContext::new().with("aws:CurrentTime", "2026-01-01T12:00:00Z")));
        assert!(!c.evaluate(&RequestContext::new().with("aws:CurrentTime", "2027-01-01")));

        let after = cond(ConditionOperator::DateGreaterThan, "aws:CurrentTime", "2024-01-01");
        // 2024-06-01T00:00:00Z as epoch seconds
        assert!(after.evaluate(&RequestContext::new().with("aws:CurrentTime", 1_717_200_000.0)));
    }

    #[test]
    fn test_bool() {
        let c = cond(ConditionOperator::Bool, "aws:MultiFactorAuthPresent", "true");
        assert!(c.evaluate(&RequestContext::new().with("aws:MultiFactorAuthPresent", true)));
        assert!(!c.evaluate(&RequestContext::new().with("aws:MultiFactorAuthPresent", "false")));
    }

    #[test]
    fn test_missing_context_key() {
        let c = cond(ConditionOperator::StringEquals, "aws:username", "alice");
        assert!(!c.evaluate(&RequestContext::new()));

        // Negated operators fail closed on a missing key as well
        let c = cond(ConditionOperator::StringNotEquals, "aws:username", "alice");
        assert!(!c.evaluate(&RequestContext::new()));
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(Condition::new(ConditionOperator::NumericLessThan, "n", vec!["ten".into()]).is_err());
        assert!(Condition::new(ConditionOperator::DateLessThan, "d", vec!["soon".into()]).is_err());
        assert!(Condition::new(ConditionOperator::Bool, "b", vec!["yes".into()]).is_err());
        assert!(Condition::new(ConditionOperator::StringEquals, "s", vec![1.0.into()]).is_err());
    }

    #[test]
    fn test_unknown_operator() {
        assert!("StringEqualsIgnoreCase".parse::<ConditionOperator>().is_err());
        assert_eq!(
            "NumericLessThan".parse::<ConditionOperator>().unwrap(),
            ConditionOperator::NumericLessThan
        );
    }

    #[test]
    fn test_all_hold_without_context() {
        let c = cond(ConditionOperator::StringEquals, "aws:username", "alice");
        assert!(all_hold(&[], None));
        assert!(!all_hold(&[c.clone()], None));
        assert!(all_hold(&[c], Some(&RequestContext::new().with("aws:username", "alice"))));
    }
}
