//! Policy evaluation engine with deny precedence and permissions boundaries
//!
//! Evaluates a request against the attached policies and an optional
//! boundary. Key features:
//! - Explicit deny, in an attached policy or the boundary, overrides every allow
//! - A boundary only caps permissions: a request must be allowed both by an
//!   attached policy and by the boundary
//! - No match anywhere is an implicit deny
//!
//! Evaluation is a pure function of its inputs. Nothing is cached between
//! calls, so callers may hand in a fresh policy snapshot every time.

use super::condition::RequestContext;
use super::policy::{Effect, Policy, Statement};
use serde::Serialize;
use std::fmt;
use tracing::debug;

/// Final outcome of an authorization check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Decision {
    Allow,
    Deny,
}

/// Why a decision was reached
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Reason {
    /// An attached policy allowed the request and the boundary (if any) agreed
    ExplicitAllow,
    /// A matching Deny statement in an attached policy or the boundary
    ExplicitDeny,
    /// No attached policy allowed the request
    ImplicitDenyNoMatch,
    /// Attached policies allowed the request but the boundary does not cover it
    ImplicitDenyBoundaryMismatch,
    /// The role's trust policy does not allow the caller
    NotTrusted,
    /// The caller's identity policies do not grant `sts:AssumeRole` on the role
    NotAuthorizedToAssume,
}

impl Reason {
    pub fn decision(&self) -> Decision {
        match self {
            Reason::ExplicitAllow => Decision::Allow,
            _ => Decision::Deny,
        }
    }
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Allow => f.write_str("Allow"),
            Decision::Deny => f.write_str("Deny"),
        }
    }
}

impl fmt::Display for Reason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// Where a deciding statement came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Source {
    Attached,
    Boundary,
    Trust,
}

/// The statement that decided an evaluation, for diagnostics
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MatchedStatement {
    pub source: Source,
    pub policy: Option<String>,
    pub sid: Option<String>,
}

impl MatchedStatement {
    fn new(source: Source, policy: &Policy, statement: &Statement) -> Self {
        MatchedStatement {
            source,
            policy: policy.name.clone(),
            sid: statement.sid.clone(),
        }
    }
}

/// Result of evaluating one request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Evaluation {
    pub decision: Decision,
    pub reason: Reason,
    /// Deciding statement, when one exists (implicit denies have none)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<MatchedStatement>,
}

impl Evaluation {
    pub(crate) fn allow(matched: MatchedStatement) -> Self {
        Evaluation {
            decision: Decision::Allow,
            reason: Reason::ExplicitAllow,
            matched: Some(matched),
        }
    }

    pub(crate) fn deny(reason: Reason, matched: Option<MatchedStatement>) -> Self {
        Evaluation {
            decision: Reason::decision(&reason),
            reason,
            matched,
        }
    }

    pub fn is_allowed(&self) -> bool {
        self.decision == Decision::Allow
    }
}

/// A requested action on a resource
#[derive(Debug, Clone, Copy)]
pub struct Request<'a> {
    pub action: &'a str,
    pub resource: &'a str,
    pub context: Option<&'a RequestContext>,
}

impl<'a> Request<'a> {
    pub fn new(action: &'a str, resource: &'a str) -> Self {
        Request {
            action,
            resource,
            context: None,
        }
    }

    pub fn with_context(mut self, context: &'a RequestContext) -> Self {
        self.context = Some(context);
        self
    }
}

/// Scan one group of policies for the first matching Deny and Allow
enum Scan {
    Denied(MatchedStatement),
    Allowed(MatchedStatement),
    NoMatch,
}

fn scan<'p>(
    request: &Request<'_>,
    policies: impl IntoIterator<Item = &'p Policy>,
    source: Source,
) -> Scan {
    let mut first_allow = None;

    for policy in policies {
        for statement in &policy.statement {
            if !statement.applies_to(request.action, request.resource, request.context) {
                continue;
            }
            match statement.effect {
                Effect::Deny => {
                    // Explicit deny - nothing else in this group can change the outcome
                    return Scan::Denied(MatchedStatement::new(source, policy, statement));
                }
                Effect::Allow => {
                    first_allow
                        .get_or_insert_with(|| MatchedStatement::new(source, policy, statement));
                }
            }
        }
    }

    match first_allow {
        Some(matched) => Scan::Allowed(matched),
        None => Scan::NoMatch,
    }
}

/// Evaluate `request` against the attached policies and an optional boundary
///
/// # Examples
///
/// ```
/// use boundary_iam::iam::{evaluate, Policy, Reason, Request, Statement};
///
/// let attached = Policy::new()
///     .with_statement(Statement::allow(["s3:*", "lambda:InvokeFunction"], ["*"]).unwrap());
/// let boundary = Policy::new()
///     .with_statement(Statement::allow(["s3:*", "logs:*"], ["*"]).unwrap());
///
/// let read = evaluate(&Request::new("s3:GetObject", "*"), [&attached], Some(&boundary));
/// assert_eq!(read.reason, Reason::ExplicitAllow);
///
/// let invoke = evaluate(&Request::new("lambda:InvokeFunction", "*"), [&attached], Some(&boundary));
/// assert_eq!(invoke.reason, Reason::ImplicitDenyBoundaryMismatch);
/// ```
pub fn evaluate<'p, I>(request: &Request<'_>, policies: I, boundary: Option<&Policy>) -> Evaluation
where
    I: IntoIterator<Item = &'p Policy>,
{
    let evaluation = evaluate_inner(request, policies, boundary);
    debug!(
        action = request.action,
        resource = request.resource,
        bounded = boundary.is_some(),
        decision = %evaluation.decision,
        reason = %evaluation.reason,
        "evaluated request"
    );
    evaluation
}

fn evaluate_inner<'p, I>(request: &Request<'_>, policies: I, boundary: Option<&Policy>) -> Evaluation
where
    I: IntoIterator<Item = &'p Policy>,
{
    let granted = match scan(request, policies, Source::Attached) {
        Scan::Denied(matched) => return Evaluation::deny(Reason::ExplicitDeny, Some(matched)),
        Scan::Allowed(matched) => Some(matched),
        Scan::NoMatch => None,
    };

    // The boundary is scanned even without a grant so its explicit denies surface
    let boundary_allows = match boundary {
        None => true,
        Some(boundary) => match scan(request, [boundary], Source::Boundary) {
            Scan::Denied(matched) => return Evaluation::deny(Reason::ExplicitDeny, Some(matched)),
            Scan::Allowed(_) => true,
            Scan::NoMatch => false,
        },
    };

    match granted {
        None => Evaluation::deny(Reason::ImplicitDenyNoMatch, None),
        Some(_) if !boundary_allows => {
            Evaluation::deny(Reason::ImplicitDenyBoundaryMismatch, None)
        }
        Some(matched) => Evaluation::allow(matched),
    }
}
