//! # boundary-iam - IAM policy evaluation with permissions boundaries
//!
//! `boundary-iam` decides whether a request is allowed under AWS-style IAM
//! policies:
//!
//! - **Deny overrides**: any matching `Deny`, in an attached policy or a
//!   boundary, defeats every `Allow`
//! - **Permissions boundaries**: a role's effective permissions are the
//!   intersection of what its policies grant and what its boundary allows
//! - **Role assumption**: both the role's trust policy and the caller's own
//!   identity policies must allow `sts:AssumeRole`
//! - **Reason codes**: every decision says why it was reached
//!
//! ## Quick Start
//!
//! ```rust
//! use boundary_iam::iam::{evaluate, Decision, Policy, Reason, Request};
//!
//! # fn main() -> boundary_iam::Result<()> {
//! let attached = Policy::from_json(r#"{
//!     "Version": "2012-10-17",
//!     "Statement": [{ "Effect": "Allow", "Action": "s3:*", "Resource": "*" }]
//! }"#)?;
//!
//! let boundary = Policy::from_json(r#"{
//!     "Version": "2012-10-17",
//!     "Statement": [
//!         { "Effect": "Allow", "Action": ["s3:*", "logs:*"], "Resource": "*" },
//!         { "Effect": "Deny", "Action": ["iam:*", "billing:*"], "Resource": "*" }
//!     ]
//! }"#)?;
//!
//! let read = evaluate(&Request::new("s3:GetObject", "*"), [&attached], Some(&boundary));
//! assert_eq!(read.decision, Decision::Allow);
//!
//! let escalate = evaluate(&Request::new("iam:CreateUser", "*"), [&attached], Some(&boundary));
//! assert_eq!(escalate.reason, Reason::ExplicitDeny);
//! # Ok(())
//! # }
//! ```
//!
//! Accounts (users, roles, trust policies and boundaries) can be loaded from
//! a TOML file with [`Account::load`] and shared between threads through a
//! [`PolicyDirectory`].

pub mod account;
pub mod error;
pub mod iam;

pub use account::{Account, AccountConfig, PolicyDirectory};
pub use error::{IamError, Result};
