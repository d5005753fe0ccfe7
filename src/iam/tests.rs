//! Integration tests for the IAM evaluator

use super::*;
use serde_json::json;

const ACCOUNT: &str = "123456789012";
const DEVELOPER: &str = "arn:aws:iam::123456789012:user/developer";
const ROLE: &str = "arn:aws:iam::123456789012:role/developer-bounded";

fn policy(name: &str, doc: serde_json::Value) -> Policy {
    Policy::from_json_named(name, &doc.to_string()).unwrap()
}

/// Boundary that keeps a developer inside S3, CloudWatch Logs and EC2 reads
fn developer_boundary() -> Policy {
    policy(
        "developer-boundary",
        json!({
            "Version": "2012-10-17",
            "Statement": [
                {
                    "Sid": "AllowedServices",
                    "Effect": "Allow",
                    "Action": ["s3:*", "logs:*", "ec2:Describe*"],
                    "Resource": "*"
                },
                {
                    "Sid": "NoPrivilegeEscalation",
                    "Effect": "Deny",
                    "Action": ["iam:*", "organizations:*", "billing:*"],
                    "Resource": "*"
                }
            ]
        }),
    )
}

fn developer_role() -> Role {
    let trust = TrustPolicy::from_json_named(
        "developer-trust",
        &json!({
            "Version": "2012-10-17",
            "Statement": {
                "Effect": "Allow",
                "Principal": { "AWS": format!("arn:aws:iam::{}:root", ACCOUNT) },
                "Action": "sts:AssumeRole",
                "Condition": { "Bool": { "aws:MultiFactorAuthPresent": "true" } }
            }
        })
        .to_string(),
    )
    .unwrap();

    Role::new("developer-bounded", ROLE, trust)
        .with_policy(policy(
            "power-user",
            json!({
                "Version": "2012-10-17",
                "Statement": [{ "Effect": "Allow", "Action": "*", "Resource": "*" }]
            }),
        ))
        .with_boundary(developer_boundary())
}

fn developer() -> Principal {
    Principal::new("developer", DEVELOPER).with_policy(policy(
        "assume-developer-role",
        json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Sid": "AssumeBounded",
                "Effect": "Allow",
                "Action": "sts:AssumeRole",
                "Resource": ROLE
            }]
        }),
    ))
}

fn mfa() -> RequestContext {
    RequestContext::new().with("aws:MultiFactorAuthPresent", true)
}

#[test]
fn test_bounded_power_user_scenario() {
    let role = developer_role();
    let user = developer();
    let ctx = mfa();

    let session = role.assume(&user, Some(&ctx)).unwrap();

    // Inside the boundary
    assert!(session.evaluate(&Request::new("s3:PutObject", "arn:aws:s3:::app/x")).is_allowed());
    assert!(session.evaluate(&Request::new("logs:PutLogEvents", "*")).is_allowed());
    assert!(session.evaluate(&Request::new("ec2:DescribeInstances", "*")).is_allowed());

    // The attached "*" grant is capped by the boundary
    let eval = session.evaluate(&Request::new("ec2:RunInstances", "*"));
    assert_eq!(eval.reason, Reason::ImplicitDenyBoundaryMismatch);

    // Escalation attempts hit the boundary's explicit deny
    let eval = session.evaluate(&Request::new("iam:AttachRolePolicy", ROLE));
    assert_eq!(eval.reason, Reason::ExplicitDeny);
    let matched = eval.matched.unwrap();
    assert_eq!(matched.source, Source::Boundary);
    assert_eq!(matched.policy.as_deref(), Some("developer-boundary"));
    assert_eq!(matched.sid.as_deref(), Some("NoPrivilegeEscalation"));
}

#[test]
fn test_trust_condition_enforced() {
    let role = developer_role();
    let user = developer();

    // No MFA in context - the trust statement's condition fails
    let denied = role.assume(&user, None).unwrap_err();
    assert_eq!(denied.reason, Reason::NotTrusted);

    let no_mfa = RequestContext::new().with("aws:MultiFactorAuthPresent", false);
    let denied = role.assume(&user, Some(&no_mfa)).unwrap_err();
    assert_eq!(denied.reason, Reason::NotTrusted);
}

#[test]
fn test_principal_policies_apply_inside_session() {
    let role = developer_role();
    let mut user = developer();
    user.attach(policy(
        "no-deletes",
        json!({
            "Version": "2012-10-17",
            "Statement": [{ "Effect": "Deny", "Action": "s3:DeleteObject", "Resource": "*" }]
        }),
    ));
    let ctx = mfa();

    let session = role.assume(&user, Some(&ctx)).unwrap();
    let eval = session.evaluate(&Request::new("s3:DeleteObject", "arn:aws:s3:::app/x"));
    assert_eq!(eval.reason, Reason::ExplicitDeny);
    assert_eq!(eval.matched.unwrap().policy.as_deref(), Some("no-deletes"));
}

#[test]
fn test_role_evaluates_without_principal() {
    let role = developer_role();

    assert!(role.evaluate(&Request::new("s3:GetObject", "*")).is_allowed());
    assert_eq!(
        role.evaluate(&Request::new("lambda:InvokeFunction", "*")).reason,
        Reason::ImplicitDenyBoundaryMismatch
    );
}

#[test]
fn test_principal_without_boundary() {
    let user = developer();

    // Own credentials: only the AssumeRole grant, no boundary involved
    assert!(user.evaluate(&Request::new("sts:AssumeRole", ROLE)).is_allowed());
    assert_eq!(
        user.evaluate(&Request::new("s3:GetObject", "*")).reason,
        Reason::ImplicitDenyNoMatch
    );
}

#[test]
fn test_instance_profile_role() {
    let trust = TrustPolicy::from_json(
        &json!({
            "Version": "2012-10-17",
            "Statement": [{
                "Effect": "Allow",
                "Principal": { "Service": "ec2.amazonaws.com" },
                "Action": "sts:AssumeRole"
            }]
        })
        .to_string(),
    )
    .unwrap();
    let role = Role::new("web", "arn:aws:iam::123456789012:role/web", trust).with_policy(policy(
        "ssm-core",
        json!({
            "Version": "2012-10-17",
            "Statement": [{ "Effect": "Allow", "Action": ["ssm:*", "ec2messages:*"], "Resource": "*" }]
        }),
    ));

    assert!(role.authorize_service("ec2.amazonaws.com", None).is_allowed());
    assert!(role.evaluate(&Request::new("ssm:UpdateInstanceInformation", "*")).is_allowed());

    // A user is not a service principal
    let denied = role.assume(&developer(), None).unwrap_err();
    assert_eq!(denied.reason, Reason::NotTrusted);
}

#[test]
fn test_resource_patterns_in_documents() {
    let policy = policy(
        "bucket-scoped",
        json!({
            "Version": "2012-10-17",
            "Statement": [
                {
                    "Effect": "Allow",
                    "Action": ["s3:GetObject", "s3:PutObject"],
                    "Resource": ["arn:aws:s3:::app-data/*", "arn:aws:s3:::app-logs-*/*"]
                },
                {
                    "Effect": "Allow",
                    "Action": "s3:ListBucket",
                    "Resource": "arn:aws:s3:::app-data"
                }
            ]
        }),
    );

    let check = |action, resource| evaluate(&Request::new(action, resource), [&policy], None).reason;

    assert_eq!(check("s3:GetObject", "arn:aws:s3:::app-data/a/b.txt"), Reason::ExplicitAllow);
    assert_eq!(check("s3:PutObject", "arn:aws:s3:::app-logs-prod/2026/x"), Reason::ExplicitAllow);
    assert_eq!(check("s3:ListBucket", "arn:aws:s3:::app-data"), Reason::ExplicitAllow);
    assert_eq!(check("s3:ListBucket", "arn:aws:s3:::app-data/x"), Reason::ImplicitDenyNoMatch);
    assert_eq!(check("s3:GetObject", "arn:aws:s3:::other/x"), Reason::ImplicitDenyNoMatch);
}

#[test]
fn test_action_names_case_insensitive() {
    let policy = policy(
        "mixed-case",
        json!({
            "Version": "2012-10-17",
            "Statement": [{ "Effect": "Allow", "Action": "S3:getobject", "Resource": "*" }]
        }),
    );

    assert!(evaluate(&Request::new("s3:GetObject", "*"), [&policy], None).is_allowed());
}

#[test]
fn test_statement_ordering_irrelevant() {
    let allow_first = policy(
        "allow-first",
        json!({
            "Version": "2012-10-17",
            "Statement": [
                { "Effect": "Allow", "Action": "s3:*", "Resource": "*" },
                { "Effect": "Deny", "Action": "s3:*", "Resource": "arn:aws:s3:::secret/*" }
            ]
        }),
    );
    let deny_first = policy(
        "deny-first",
        json!({
            "Version": "2012-10-17",
            "Statement": [
                { "Effect": "Deny", "Action": "s3:*", "Resource": "arn:aws:s3:::secret/*" },
                { "Effect": "Allow", "Action": "s3:*", "Resource": "*" }
            ]
        }),
    );

    let request = Request::new("s3:GetObject", "arn:aws:s3:::secret/key");
    assert_eq!(evaluate(&request, [&allow_first], None).reason, Reason::ExplicitDeny);
    assert_eq!(evaluate(&request, [&deny_first], None).reason, Reason::ExplicitDeny);
}
