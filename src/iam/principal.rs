//! Principals, roles and role assumption
//!
//! Assuming a role takes two independent grants:
//! 1. the role's trust policy allows `sts:AssumeRole` for the caller, and
//! 2. the caller's own identity policies allow `sts:AssumeRole` on the role ARN.
//!
//! The trust check runs first. A failure on either side is reported with its
//! own reason so callers can tell which half is missing.

use super::condition::{self, RequestContext};
use super::engine::{self, Decision, Evaluation, MatchedStatement, Reason, Request, Source};
use super::pattern::Pattern;
use super::policy::{parse_document, DocumentKind, Effect, Policy};
use crate::error::Result;
use std::sync::Arc;
use tracing::{debug, warn};

pub const ASSUME_ROLE_ACTION: &str = "sts:AssumeRole";

/// Account id segment of an IAM ARN (`arn:aws:iam::<account>:user/<name>`)
pub fn account_of(arn: &str) -> Option<&str> {
    let mut parts = arn.splitn(6, ':');
    if parts.next()? != "arn" {
        return None;
    }
    let account = parts.nth(3)?;
    if account.is_empty() {
        None
    } else {
        Some(account)
    }
}

fn is_account_id(value: &str) -> bool {
    value.len() == 12 && value.bytes().all(|b| b.is_ascii_digit())
}

/// Identity making an `sts:AssumeRole` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Caller<'a> {
    /// A user or role, identified by ARN
    Aws(&'a str),
    /// A service principal such as `ec2.amazonaws.com`
    Service(&'a str),
}

/// The `Principal` element of a trust statement
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PrincipalSet {
    /// `"Principal": "*"` or `{"AWS": "*"}`
    any: bool,
    /// ARN patterns of trusted users and roles
    aws: Vec<Pattern>,
    /// Accounts whose principals are all trusted (`:root` ARNs or bare ids)
    accounts: Vec<String>,
    services: Vec<String>,
}

impl PrincipalSet {
    pub fn any() -> Self {
        PrincipalSet {
            any: true,
            ..Default::default()
        }
    }

    /// Trust a user or role ARN, an account root ARN, or a bare account id
    pub fn with_aws(mut self, entry: &str) -> Self {
        self.push_aws(entry);
        self
    }

    pub fn with_service(mut self, service: &str) -> Self {
        self.services.push(service.to_string());
        self
    }

    fn push_aws(&mut self, entry: &str) {
        if entry == "*" {
            self.any = true;
        } else if is_account_id(entry) {
            self.accounts.push(entry.to_string());
        } else if let Some(account) = entry
            .strip_suffix(":root")
            .and_then(|prefix| account_of(&format!("{}:", prefix)).map(str::to_string))
        {
            self.accounts.push(account);
        } else {
            self.aws.push(Pattern::literal_glob(entry));
        }
    }

    /// Decode the JSON `Principal` element
    pub(crate) fn from_json(value: &serde_json::Value) -> std::result::Result<Self, String> {
        use serde_json::Value;

        let mut set = PrincipalSet::default();
        match value {
            Value::String(s) if s == "*" => set.any = true,
            Value::String(s) => return Err(format!("unsupported Principal '{}'", s)),
            Value::Object(map) => {
                if map.is_empty() {
                    return Err("Principal must not be empty".to_string());
                }
                for (kind, entries) in map {
                    let entries: Vec<&str> = match entries {
                        Value::String(s) => vec![s.as_str()],
                        Value::Array(items) => items
                            .iter()
                            .map(|item| item.as_str().ok_or("Principal entries must be strings"))
                            .collect::<std::result::Result<_, _>>()?,
                        _ => return Err("Principal entries must be strings".to_string()),
                    };
                    match kind.as_str() {
                        "AWS" => entries.into_iter().for_each(|e| set.push_aws(e)),
                        "Service" => set
                            .services
                            .extend(entries.into_iter().map(str::to_string)),
                        other => return Err(format!("unsupported Principal type '{}'", other)),
                    }
                }
            }
            _ => return Err("Principal must be \"*\" or an object".to_string()),
        }
        Ok(set)
    }

    pub fn contains(&self, caller: Caller<'_>) -> bool {
        if self.any {
            return true;
        }
        match caller {
            Caller::Aws(arn) => {
                self.aws.iter().any(|p| p.matches(arn))
                    || account_of(arn).is_some_and(|acct| self.accounts.iter().any(|a| a == acct))
            }
            Caller::Service(service) => self.services.iter().any(|s| s == service),
        }
    }
}

/// A statement in a role trust policy
#[derive(Debug, Clone, PartialEq)]
pub struct TrustStatement {
    pub sid: Option<String>,
    pub effect: Effect,
    pub principals: PrincipalSet,
    pub action: Vec<Pattern>,
    pub condition: Vec<condition::Condition>,
}

impl TrustStatement {
    /// Allow the given principals to call `sts:AssumeRole`
    pub fn allow(principals: PrincipalSet) -> Self {
        Self::new(Effect::Allow, principals)
    }

    pub fn deny(principals: PrincipalSet) -> Self {
        Self::new(Effect::Deny, principals)
    }

    fn new(effect: Effect, principals: PrincipalSet) -> Self {
        TrustStatement {
            sid: None,
            effect,
            principals,
            action: vec![Pattern::literal_glob(ASSUME_ROLE_ACTION)],
            condition: Vec::new(),
        }
    }

    pub fn with_sid(mut self, sid: &str) -> Self {
        self.sid = Some(sid.to_string());
        self
    }

    fn applies_to(&self, caller: Caller<'_>, context: Option<&RequestContext>) -> bool {
        self.action.iter().any(|a| a.matches(ASSUME_ROLE_ACTION))
            && self.principals.contains(caller)
            && condition::all_hold(&self.condition, context)
    }
}

/// A role's trust policy: who may assume it
#[derive(Debug, Clone, PartialEq)]
pub struct TrustPolicy {
    pub name: Option<String>,
    pub version: String,
    pub statement: Vec<TrustStatement>,
}

impl TrustPolicy {
    pub fn new(statement: Vec<TrustStatement>) -> Self {
        TrustPolicy {
            name: None,
            version: super::policy::DEFAULT_VERSION.to_string(),
            statement,
        }
    }

    /// Parse and validate a trust policy document
    pub fn from_json(json: &str) -> Result<Self> {
        Self::load(None, json)
    }

    pub fn from_json_named(name: &str, json: &str) -> Result<Self> {
        Self::load(Some(name), json)
    }

    fn load(name: Option<&str>, json: &str) -> Result<Self> {
        let parsed = parse_document(name.unwrap_or("<inline>"), json, DocumentKind::Trust)?;
        let statement = parsed
            .statements
            .into_iter()
            .map(|s| TrustStatement {
                sid: s.sid,
                effect: s.effect,
                principals: s.principals.unwrap_or_default(),
                action: s.action,
                condition: s.condition,
            })
            .collect();

        Ok(TrustPolicy {
            name: name.map(str::to_string).or(parsed.id),
            version: parsed.version,
            statement,
        })
    }

    /// Decide whether `caller` is trusted. Deny statements win; no match denies.
    pub fn evaluate(&self, caller: Caller<'_>, context: Option<&RequestContext>) -> Evaluation {
        let mut allowed = None;
        for stmt in &self.statement {
            if !stmt.applies_to(caller, context) {
                continue;
            }
            match stmt.effect {
                Effect::Deny => {
                    return Evaluation::deny(Reason::NotTrusted, Some(self.matched(stmt)));
                }
                Effect::Allow => {
                    allowed.get_or_insert_with(|| self.matched(stmt));
                }
            }
        }

        match allowed {
            Some(matched) => Evaluation::allow(matched),
            None => Evaluation::deny(Reason::NotTrusted, None),
        }
    }

    fn matched(&self, stmt: &TrustStatement) -> MatchedStatement {
        MatchedStatement {
            source: Source::Trust,
            policy: self.name.clone(),
            sid: stmt.sid.clone(),
        }
    }
}

/// A user identity with directly attached policies
#[derive(Debug, Clone, PartialEq)]
pub struct Principal {
    pub name: String,
    pub arn: String,
    pub policies: Vec<Arc<Policy>>,
}

impl Principal {
    pub fn new(name: &str, arn: &str) -> Self {
        Principal {
            name: name.to_string(),
            arn: arn.to_string(),
            policies: Vec::new(),
        }
    }

    pub fn attach(&mut self, policy: impl Into<Arc<Policy>>) {
        self.policies.push(policy.into());
    }

    pub fn with_policy(mut self, policy: impl Into<Arc<Policy>>) -> Self {
        self.attach(policy);
        self
    }

    /// Evaluate a request made with this principal's own credentials
    pub fn evaluate(&self, request: &Request<'_>) -> Evaluation {
        engine::evaluate(request, self.policies.iter().map(Arc::as_ref), None)
    }
}

/// An assumable identity with a trust policy, attached policies and an
/// optional permissions boundary
#[derive(Debug, Clone, PartialEq)]
pub struct Role {
    pub name: String,
    pub arn: String,
    pub trust: TrustPolicy,
    pub policies: Vec<Arc<Policy>>,
    pub boundary: Option<Arc<Policy>>,
}

impl Role {
    pub fn new(name: &str, arn: &str, trust: TrustPolicy) -> Self {
        Role {
            name: name.to_string(),
            arn: arn.to_string(),
            trust,
            policies: Vec::new(),
            boundary: None,
        }
    }

    pub fn attach(&mut self, policy: impl Into<Arc<Policy>>) {
        self.policies.push(policy.into());
    }

    pub fn with_policy(mut self, policy: impl Into<Arc<Policy>>) -> Self {
        self.attach(policy);
        self
    }

    pub fn set_boundary(&mut self, boundary: impl Into<Arc<Policy>>) {
        self.boundary = Some(boundary.into());
    }

    pub fn with_boundary(mut self, boundary: impl Into<Arc<Policy>>) -> Self {
        self.set_boundary(boundary);
        self
    }

    /// Decide whether `principal` may assume this role
    pub fn authorize_assume(
        &self,
        principal: &Principal,
        context: Option<&RequestContext>,
    ) -> Evaluation {
        let trust = self.trust.evaluate(Caller::Aws(&principal.arn), context);
        if trust.decision == Decision::Deny {
            warn!(
                principal = %principal.arn,
                role = %self.arn,
                "role trust policy does not trust principal"
            );
            return trust;
        }

        let mut request = Request::new(ASSUME_ROLE_ACTION, &self.arn);
        if let Some(ctx) = context {
            request = request.with_context(ctx);
        }
        let identity = principal.evaluate(&request);
        if identity.decision == Decision::Deny {
            warn!(
                principal = %principal.arn,
                role = %self.arn,
                reason = ?identity.reason,
                "principal is not authorized to assume role"
            );
            return Evaluation::deny(Reason::NotAuthorizedToAssume, identity.matched);
        }

        debug!(principal = %principal.arn, role = %self.arn, "role assumption allowed");
        identity
    }

    /// Assume this role, returning a session that evaluates requests with the
    /// combined policies of the principal and the role, capped by the boundary
    pub fn assume<'a>(
        &'a self,
        principal: &'a Principal,
        context: Option<&RequestContext>,
    ) -> std::result::Result<AssumedRole<'a>, Evaluation> {
        let evaluation = self.authorize_assume(principal, context);
        match evaluation.decision {
            Decision::Allow => Ok(AssumedRole {
                principal,
                role: self,
            }),
            Decision::Deny => Err(evaluation),
        }
    }

    /// Decide whether a service (e.g. `ec2.amazonaws.com` for an instance
    /// profile) may assume this role. Services have no identity policies.
    pub fn authorize_service(&self, service: &str, context: Option<&RequestContext>) -> Evaluation {
        self.trust.evaluate(Caller::Service(service), context)
    }

    /// Evaluate a request made by the role itself (e.g. from a service session)
    pub fn evaluate(&self, request: &Request<'_>) -> Evaluation {
        engine::evaluate(
            request,
            self.policies.iter().map(Arc::as_ref),
            self.boundary.as_deref(),
        )
    }
}

/// A principal acting through an assumed role
#[derive(Debug, Clone, Copy)]
pub struct AssumedRole<'a> {
    principal: &'a Principal,
    role: &'a Role,
}

impl<'a> AssumedRole<'a> {
    pub fn principal(&self) -> &'a Principal {
        self.principal
    }

    pub fn role(&self) -> &'a Role {
        self.role
    }

    /// (principal policies ∪ role policies) ∩ role boundary, deny overrides
    pub fn evaluate(&self, request: &Request<'_>) -> Evaluation {
        let attached = self
            .principal
            .policies
            .iter()
            .chain(self.role.policies.iter())
            .map(Arc::as_ref);
        engine::evaluate(request, attached, self.role.boundary.as_deref())
    }
}
