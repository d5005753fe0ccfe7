//! Identity and Access Management (IAM) evaluation
//!
//! Provides AWS-style access control with:
//! - JSON policy documents with single-value-or-list normalization
//! - Allow/Deny statements with explicit deny precedence
//! - Permissions boundaries that cap, but never grant, permissions
//! - Role trust policies and two-sided `sts:AssumeRole` checks
//! - Wildcard pattern matching for actions and resources
//! - Condition evaluation (String, Numeric, Date, Bool operations)

mod condition;
mod engine;
mod pattern;
mod policy;
mod principal;

pub use condition::{Condition, ConditionOperator, ConditionValue, RequestContext};
pub use engine::{evaluate, Decision, Evaluation, MatchedStatement, Reason, Request, Source};
pub use pattern::Pattern;
pub use policy::{Effect, Policy, Statement, DEFAULT_VERSION, SUPPORTED_VERSIONS};
pub use principal::{
    account_of, AssumedRole, Caller, Principal, PrincipalSet, Role, TrustPolicy, TrustStatement,
    ASSUME_ROLE_ACTION,
};

#[cfg(test)]
mod tests;
