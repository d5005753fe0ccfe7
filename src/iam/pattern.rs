//! Pattern matching for IAM actions and resources
//!
//! Patterns are compiled once, when a policy is loaded, into a literal
//! prefix plus a wildcard flag:
//! - `s3:GetObject` - exact match (no wildcard)
//! - `s3:*` - prefix match, anything starting with `s3:`
//! - `*` - empty prefix with a wildcard, matches anything
//! - `arn:aws:s3:::logs-*/2024/*` - prefix followed by further literal
//!   pieces that must appear in order
//!
//! Action patterns are case-insensitive, resource patterns are not.

use crate::error::{IamError, Result};
use serde::{Serialize, Serializer};
use std::fmt;

/// A compiled wildcard pattern
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pattern {
    raw: String,
    prefix: String,
    has_wildcard: bool,
    /// Literal pieces between and after the remaining wildcards.
    /// The last piece must be a suffix of the matched value.
    tail: Vec<String>,
    fold_case: bool,
}

impl Pattern {
    /// Compile an action pattern (`service:action`, `service:*` or `*`)
    ///
    /// # Examples
    /// ```
    /// use boundary_iam::iam::Pattern;
    ///
    /// let pattern = Pattern::action("s3:Get*").unwrap();
    /// assert!(pattern.matches("s3:GetObject"));
    /// assert!(pattern.matches("S3:getobject"));
    /// assert!(!pattern.matches("s3:PutObject"));
    /// ```
    pub fn action(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(IamError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "action must not be empty".to_string(),
            });
        }
        if raw != "*" && !raw.contains(':') {
            return Err(IamError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "action must have the form service:action".to_string(),
            });
        }
        Ok(Self::compile(raw, true))
    }

    /// Compile a resource pattern (an ARN, an ARN with wildcards, or `*`)
    pub fn resource(raw: &str) -> Result<Self> {
        if raw.is_empty() {
            return Err(IamError::InvalidPattern {
                pattern: raw.to_string(),
                reason: "resource must not be empty".to_string(),
            });
        }
        Ok(Self::compile(raw, false))
    }

    /// Compile without validation. Used for condition values, where an
    /// empty string is a legitimate pattern.
    pub(crate) fn literal_glob(raw: &str) -> Self {
        Self::compile(raw, false)
    }

    fn compile(raw: &str, fold_case: bool) -> Self {
        let normalized = if fold_case {
            raw.to_ascii_lowercase()
        } else {
            raw.to_string()
        };

        let mut pieces = normalized.split('*');
        let prefix = pieces.next().unwrap_or_default().to_string();
        let tail: Vec<String> = pieces.map(str::to_string).collect();

        Pattern {
            raw: raw.to_string(),
            prefix,
            has_wildcard: !tail.is_empty(),
            tail,
            fold_case,
        }
    }

    /// The pattern as written in the policy document
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Literal text before the first wildcard
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn has_wildcard(&self) -> bool {
        self.has_wildcard
    }

    /// Check if a value matches this pattern
    pub fn matches(&self, value: &str) -> bool {
        let value = value.as_bytes();
        let prefix = self.prefix.as_bytes();

        if !self.has_wildcard {
            return self.eq_bytes(value, prefix);
        }

        if value.len() < prefix.len() || !self.eq_bytes(&value[..prefix.len()], prefix) {
            return false;
        }

        self.match_tail(&value[prefix.len()..])
    }

    /// Match the pieces following the first wildcard.
    ///
    /// Middle pieces must appear in order; the last piece anchors at the end.
    fn match_tail(&self, rest: &[u8]) -> bool {
        let Some((last, middle)) = self.tail.split_last() else {
            return true;
        };

        let mut pos = 0;
        for piece in middle {
            if piece.is_empty() {
                continue;
            }
            match self.find(&rest[pos..], piece.as_bytes()) {
                Some(found) => pos += found + piece.len(),
                None => return false,
            }
        }

        let last = last.as_bytes();
        rest.len() >= pos + last.len() && self.eq_bytes(&rest[rest.len() - last.len()..], last)
    }

    /// ASCII case-insensitive for action patterns
    fn eq_bytes(&self, value: &[u8], pattern: &[u8]) -> bool {
        if self.fold_case {
            value.eq_ignore_ascii_case(pattern)
        } else {
            value == pattern
        }
    }

    fn find(&self, haystack: &[u8], needle: &[u8]) -> Option<usize> {
        haystack
            .windows(needle.len())
            .position(|window| self.eq_bytes(window, needle))
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl Serialize for Pattern {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.raw)
    }
}
