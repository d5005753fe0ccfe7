//! IAM policy evaluator CLI
//!
//! Evaluates requests against an account configuration file.
//! Exit codes: 0 allowed / valid, 3 denied, 1 error.

use anyhow::Context;
use boundary_iam::iam::{Evaluation, Pattern, Request, RequestContext};
use boundary_iam::Account;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::info;

const EXIT_DENIED: u8 = 3;

#[derive(Parser, Debug)]
#[command(name = "iam-eval")]
#[command(about = "Evaluate IAM requests against users, roles and permissions boundaries")]
struct Args {
    /// Path to the account configuration (TOML)
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// Print results as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Check whether a request is allowed, optionally through an assumed role
    Check {
        /// User making the request
        #[arg(short = 'u', long)]
        user: String,

        /// Role to assume before making the request
        #[arg(short = 'r', long)]
        role: Option<String>,

        /// Action, e.g. s3:GetObject
        #[arg(short = 'a', long)]
        action: String,

        /// Resource ARN
        #[arg(short = 'R', long, default_value = "*")]
        resource: String,

        /// Condition context entries (key=value), repeatable
        #[arg(long = "context", value_parser = parse_context_entry)]
        context: Vec<(String, String)>,
    },

    /// Check whether a user may assume a role
    Assume {
        #[arg(short = 'u', long)]
        user: String,

        #[arg(short = 'r', long)]
        role: String,

        /// Condition context entries (key=value), repeatable
        #[arg(long = "context", value_parser = parse_context_entry)]
        context: Vec<(String, String)>,
    },

    /// Load and validate the configuration without evaluating anything
    Validate,
}

/// Parse a `key=value` context entry from the CLI
fn parse_context_entry(s: &str) -> Result<(String, String), String> {
    match s.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("Invalid context entry '{}'. Expected key=value", s)),
    }
}

fn build_context(entries: &[(String, String)]) -> Option<RequestContext> {
    if entries.is_empty() {
        return None;
    }
    let mut context = RequestContext::new();
    for (key, value) in entries {
        context.insert(key, value.as_str());
    }
    Some(context)
}

fn report(evaluation: &Evaluation, json: bool) -> anyhow::Result<ExitCode> {
    if json {
        println!("{}", serde_json::to_string_pretty(evaluation)?);
    } else {
        let detail = match &evaluation.matched {
            Some(m) => format!(
                " (policy={} sid={} source={:?})",
                m.policy.as_deref().unwrap_or("-"),
                m.sid.as_deref().unwrap_or("-"),
                m.source
            ),
            None => String::new(),
        };
        println!("{} {}{}", evaluation.decision, evaluation.reason, detail);
    }

    Ok(ExitCode::from(exit_status(evaluation)))
}

fn exit_status(evaluation: &Evaluation) -> u8 {
    if evaluation.is_allowed() {
        0
    } else {
        EXIT_DENIED
    }
}

/// Requested actions follow the same `service:action` rule as policy actions
fn validate_action(action: &str) -> anyhow::Result<()> {
    Pattern::action(action).with_context(|| format!("invalid --action '{}'", action))?;
    Ok(())
}

fn run(args: Args) -> anyhow::Result<ExitCode> {
    let account = Account::load(&args.config)
        .with_context(|| format!("failed to load {}", args.config.display()))?;
    info!("Loaded account {} from {:?}", account.account_id(), args.config);

    match args.command {
        Command::Validate => {
            let users = account.users().count();
            let roles = account.roles().count();
            if args.json {
                println!(
                    "{}",
                    serde_json::json!({
                        "account_id": account.account_id(),
                        "users": users,
                        "roles": roles,
                    })
                );
            } else {
                println!(
                    "[OK] account {}: {} user(s), {} role(s)",
                    account.account_id(),
                    users,
                    roles
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::Assume {
            user,
            role,
            context,
        } => {
            let principal = account.user(&user)?;
            let role = account.role(&role)?;
            let context = build_context(&context);
            report(&role.authorize_assume(principal, context.as_ref()), args.json)
        }
        Command::Check {
            user,
            role,
            action,
            resource,
            context,
        } => {
            validate_action(&action)?;
            let principal = account.user(&user)?;
            let context = build_context(&context);
            let mut request = Request::new(&action, &resource);
            if let Some(ctx) = &context {
                request = request.with_context(ctx);
            }

            let evaluation = match role {
                Some(role) => {
                    let role = account.role(&role)?;
                    match role.assume(principal, context.as_ref()) {
                        Ok(session) => session.evaluate(&request),
                        Err(denied) => denied,
                    }
                }
                None => principal.evaluate(&request),
            };
            report(&evaluation, args.json)
        }
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Args::parse()) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}
