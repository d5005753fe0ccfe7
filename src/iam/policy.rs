//! IAM policy documents
//!
//! Documents are accepted in the AWS JSON shape:
//!
//! ```json
//! {
//!   "Version": "2012-10-17",
//!   "Statement": [
//!     { "Sid": "ReadLogs", "Effect": "Allow", "Action": "logs:*", "Resource": "*" }
//!   ]
//! }
//! ```
//!
//! `Statement`, `Action`, `Resource` and condition values may each be a single
//! value or a list. Every document is fully validated when it is loaded; a
//! document that fails validation is rejected as a whole.

use super::condition::{self, Condition, ConditionOperator, ConditionValue, RequestContext};
use super::pattern::Pattern;
use super::principal::PrincipalSet;
use crate::error::{IamError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Policy language versions accepted at load time
pub const SUPPORTED_VERSIONS: [&str; 2] = ["2012-10-17", "2008-10-17"];

/// Version used for policies built in code
pub const DEFAULT_VERSION: &str = "2012-10-17";

/// Effect of a policy statement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Effect {
    /// Allow the action
    Allow,
    /// Deny the action (takes precedence over Allow)
    Deny,
}

/// A value that may be written either alone or as a list
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub(crate) enum OneOrMany<T> {
    One(T),
    Many(Vec<T>),
}

impl<T> OneOrMany<T> {
    pub(crate) fn into_vec(self) -> Vec<T> {
        match self {
            OneOrMany::One(value) => vec![value],
            OneOrMany::Many(values) => values,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct RawDocument {
    version: Option<String>,
    id: Option<String>,
    statement: Option<OneOrMany<RawStatement>>,
}

pub(crate) type RawConditionBlock = BTreeMap<String, BTreeMap<String, OneOrMany<ConditionValue>>>;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase", deny_unknown_fields)]
pub(crate) struct RawStatement {
    pub(crate) sid: Option<String>,
    pub(crate) effect: Option<Effect>,
    pub(crate) principal: Option<serde_json::Value>,
    pub(crate) action: Option<OneOrMany<String>>,
    pub(crate) resource: Option<OneOrMany<String>>,
    pub(crate) condition: Option<RawConditionBlock>,
}

/// Which part of the authorization model a document is loaded as
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DocumentKind {
    /// Identity, role or boundary policy: needs `Resource`, forbids `Principal`
    Permission,
    /// Role trust policy: needs `Principal`, ignores `Resource`
    Trust,
}

/// A validated document, shared by permission and trust policies
pub(crate) struct ParsedDocument {
    pub(crate) id: Option<String>,
    pub(crate) version: String,
    pub(crate) statements: Vec<ParsedStatement>,
}

pub(crate) struct ParsedStatement {
    pub(crate) sid: Option<String>,
    pub(crate) effect: Effect,
    pub(crate) principals: Option<PrincipalSet>,
    pub(crate) action: Vec<Pattern>,
    pub(crate) resource: Vec<Pattern>,
    pub(crate) condition: Vec<Condition>,
}

fn malformed(policy: &str, reason: impl Into<String>) -> IamError {
    IamError::MalformedPolicy {
        policy: policy.to_string(),
        reason: reason.into(),
    }
}

/// Parse and validate a JSON document. `label` names the document in errors.
pub(crate) fn parse_document(label: &str, json: &str, kind: DocumentKind) -> Result<ParsedDocument> {
    let raw: RawDocument =
        serde_json::from_str(json).map_err(|e| malformed(label, e.to_string()))?;

    let version = raw
        .version
        .ok_or_else(|| malformed(label, "missing Version"))?;
    if !SUPPORTED_VERSIONS.contains(&version.as_str()) {
        return Err(IamError::UnsupportedVersion {
            policy: label.to_string(),
            version,
        });
    }

    let statements = raw
        .statement
        .ok_or_else(|| malformed(label, "missing Statement"))?
        .into_vec();
    if statements.is_empty() {
        return Err(malformed(label, "Statement must not be empty"));
    }

    let statements = statements
        .into_iter()
        .enumerate()
        .map(|(i, stmt)| parse_statement(label, i, stmt, kind))
        .collect::<Result<Vec<_>>>()?;

    Ok(ParsedDocument {
        id: raw.id,
        version,
        statements,
    })
}

fn parse_statement(
    label: &str,
    index: usize,
    raw: RawStatement,
    kind: DocumentKind,
) -> Result<ParsedStatement> {
    let at = |reason: &str| malformed(label, format!("statement {}: {}", index, reason));

    let effect = raw.effect.ok_or_else(|| at("missing Effect"))?;

    let action = raw
        .action
        .ok_or_else(|| at("missing Action"))?
        .into_vec();
    if action.is_empty() {
        return Err(at("Action must not be empty"));
    }
    let action = action
        .iter()
        .map(|a| Pattern::action(a))
        .collect::<Result<Vec<_>>>()?;

    let resource = match (kind, raw.resource) {
        (DocumentKind::Permission, None) => return Err(at("missing Resource")),
        (DocumentKind::Permission, Some(resource)) => {
            let resource = resource.into_vec();
            if resource.is_empty() {
                return Err(at("Resource must not be empty"));
            }
            resource
                .iter()
                .map(|r| Pattern::resource(r))
                .collect::<Result<Vec<_>>>()?
        }
        (DocumentKind::Trust, _) => Vec::new(),
    };

    let principals = match (kind, raw.principal) {
        (DocumentKind::Permission, Some(_)) => {
            return Err(at("Principal is only allowed in trust policies"))
        }
        (DocumentKind::Permission, None) => None,
        (DocumentKind::Trust, None) => return Err(at("missing Principal")),
        (DocumentKind::Trust, Some(value)) => {
            Some(PrincipalSet::from_json(&value).map_err(|reason| at(&reason))?)
        }
    };

    let condition = match raw.condition {
        Some(block) => parse_conditions(block)?,
        None => Vec::new(),
    };

    Ok(ParsedStatement {
        sid: raw.sid,
        effect,
        principals,
        action,
        resource,
        condition,
    })
}

fn parse_conditions(block: RawConditionBlock) -> Result<Vec<Condition>> {
    let mut conditions = Vec::new();
    for (operator, entries) in block {
        let operator: ConditionOperator = operator.parse()?;
        for (key, values) in entries {
            conditions.push(Condition::new(operator, &key, values.into_vec())?);
        }
    }
    Ok(conditions)
}

/// A single policy statement
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Statement {
    /// Statement ID, for diagnostics only
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sid: Option<String>,

    /// Effect of this statement
    pub effect: Effect,

    /// Actions this statement applies to (supports wildcards)
    pub action: Vec<Pattern>,

    /// Resources this statement applies to (supports wildcards)
    pub resource: Vec<Pattern>,

    /// Conditions that must all hold for the statement to apply
    #[serde(skip)]
    pub condition: Vec<Condition>,
}

impl Statement {
    /// Create a new statement from action and resource patterns
    pub fn new<A, R>(effect: Effect, actions: A, resources: R) -> Result<Self>
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        let action = actions
            .into_iter()
            .map(|a| Pattern::action(a.as_ref()))
            .collect::<Result<Vec<_>>>()?;
        let resource = resources
            .into_iter()
            .map(|r| Pattern::resource(r.as_ref()))
            .collect::<Result<Vec<_>>>()?;

        Ok(Statement {
            sid: None,
            effect,
            action,
            resource,
            condition: Vec::new(),
        })
    }

    pub fn allow<A, R>(actions: A, resources: R) -> Result<Self>
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        Self::new(Effect::Allow, actions, resources)
    }

    pub fn deny<A, R>(actions: A, resources: R) -> Result<Self>
    where
        A: IntoIterator,
        A::Item: AsRef<str>,
        R: IntoIterator,
        R::Item: AsRef<str>,
    {
        Self::new(Effect::Deny, actions, resources)
    }

    pub fn with_sid(mut self, sid: &str) -> Self {
        self.sid = Some(sid.to_string());
        self
    }

    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.condition.push(condition);
        self
    }

    /// Check if this statement applies to the given action and resource
    pub fn applies_to(&self, action: &str, resource: &str, context: Option<&RequestContext>) -> bool {
        self.action.iter().any(|a| a.matches(action))
            && self.resource.iter().any(|r| r.matches(resource))
            && condition::all_hold(&self.condition, context)
    }
}

/// Complete IAM permission policy: identity, role, or permissions boundary
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "PascalCase")]
pub struct Policy {
    /// Name the policy was registered under, for diagnostics
    #[serde(skip)]
    pub name: Option<String>,

    /// Policy format version
    pub version: String,

    /// List of policy statements
    pub statement: Vec<Statement>,
}

impl Policy {
    /// Create a new empty policy
    pub fn new() -> Self {
        Policy {
            name: None,
            version: DEFAULT_VERSION.to_string(),
            statement: Vec::new(),
        }
    }

    pub fn named(name: &str) -> Self {
        Policy {
            name: Some(name.to_string()),
            ..Self::new()
        }
    }

    /// Add a statement to this policy
    pub fn add_statement(&mut self, statement: Statement) {
        self.statement.push(statement);
    }

    pub fn with_statement(mut self, statement: Statement) -> Self {
        self.add_statement(statement);
        self
    }

    /// Parse and validate a policy from a JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        Self::load(None, json)
    }

    /// Parse and validate a policy, recording the name it is registered under
    pub fn from_json_named(name: &str, json: &str) -> Result<Self> {
        Self::load(Some(name), json)
    }

    /// Parse and validate a policy from an already-decoded JSON value
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        Self::from_json(&value.to_string())
    }

    fn load(name: Option<&str>, json: &str) -> Result<Self> {
        let parsed = parse_document(name.unwrap_or("<inline>"), json, DocumentKind::Permission)?;
        let name = name.map(str::to_string).or(parsed.id);

        let statement = parsed
            .statements
            .into_iter()
            .map(|s| Statement {
                sid: s.sid,
                effect: s.effect,
                action: s.action,
                resource: s.resource,
                condition: s.condition,
            })
            .collect();

        Ok(Policy {
            name,
            version: parsed.version,
            statement,
        })
    }

    /// Serialize policy to JSON string (conditions are not included)
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Label used in logs and evaluation diagnostics
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or("<inline>")
    }
}

impl Default for Policy {
    fn default() -> Self {
        Self::new()
    }
}
