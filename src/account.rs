//! Account configuration: users, roles and the policies attached to them
//!
//! An account is described by a TOML file:
//!
//! ```toml
//! account_id = "123456789012"
//!
//! [policies.developer-boundary]
//! file = "policies/developer-boundary.json"
//!
//! [policies.assume-developer]
//! document = '''
//! { "Version": "2012-10-17",
//!   "Statement": { "Effect": "Allow", "Action": "sts:AssumeRole",
//!                  "Resource": "arn:aws:iam::123456789012:role/developer" } }
//! '''
//!
//! [[users]]
//! name = "alice"
//! policies = ["assume-developer"]
//!
//! [[roles]]
//! name = "developer"
//! trust = "developer-trust"
//! policies = ["power-user"]
//! boundary = "developer-boundary"
//! ```
//!
//! Loading validates every referenced document and every cross-reference.
//! The result is an immutable [`Account`] snapshot. Changes are made by
//! loading a new snapshot and applying it to a [`PolicyDirectory`].

use crate::error::{IamError, Result};
use crate::iam::{Policy, Principal, Role, TrustPolicy};
use parking_lot::RwLock;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Where a policy document comes from
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicySource {
    /// Path to a JSON document, relative to the configuration file
    pub file: Option<PathBuf>,
    /// Inline JSON document
    pub document: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UserConfig {
    pub name: String,
    #[serde(default)]
    pub policies: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RoleConfig {
    pub name: String,
    /// Name of the trust policy document
    pub trust: String,
    #[serde(default)]
    pub policies: Vec<String>,
    pub boundary: Option<String>,
}

/// Raw account configuration as written in TOML
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AccountConfig {
    pub account_id: String,
    #[serde(default)]
    pub policies: BTreeMap<String, PolicySource>,
    #[serde(default)]
    pub users: Vec<UserConfig>,
    #[serde(default)]
    pub roles: Vec<RoleConfig>,
}

impl AccountConfig {
    pub fn from_toml(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }
}

/// Resolves policy names to parsed documents, parsing each one once
struct PolicyResolver<'a> {
    config: &'a AccountConfig,
    base_dir: &'a Path,
    documents: HashMap<&'a str, String>,
    permissions: HashMap<&'a str, Arc<Policy>>,
}

impl<'a> PolicyResolver<'a> {
    fn new(config: &'a AccountConfig, base_dir: &'a Path) -> Self {
        PolicyResolver {
            config,
            base_dir,
            documents: HashMap::new(),
            permissions: HashMap::new(),
        }
    }

    fn document(&mut self, name: &'a str) -> Result<&str> {
        if !self.documents.contains_key(name) {
            let source = self
                .config
                .policies
                .get(name)
                .ok_or_else(|| IamError::UnknownPolicy(name.to_string()))?;

            let text = match (&source.file, &source.document) {
                (Some(file), None) => {
                    let path = self.base_dir.join(file);
                    debug!(policy = name, path = %path.display(), "reading policy document");
                    std::fs::read_to_string(path)?
                }
                (None, Some(document)) => document.clone(),
                _ => return Err(IamError::PolicySource(name.to_string())),
            };
            self.documents.insert(name, text);
        }
        Ok(self.documents[name].as_str())
    }

    fn permission(&mut self, name: &'a str) -> Result<Arc<Policy>> {
        if let Some(policy) = self.permissions.get(name) {
            return Ok(Arc::clone(policy));
        }
        let policy = Arc::new(Policy::from_json_named(name, self.document(name)?)?);
        self.permissions.insert(name, Arc::clone(&policy));
        Ok(policy)
    }

    fn trust(&mut self, name: &'a str) -> Result<TrustPolicy> {
        TrustPolicy::from_json_named(name, self.document(name)?)
    }

    /// Parse every policy that nothing refers to, so a broken document still
    /// fails the load. Unattached documents may be either permission or trust
    /// policies.
    fn check_unused(&mut self) -> Result<()> {
        let unused: Vec<&'a str> = self.unused().collect();
        for name in unused {
            warn!(policy = name, "policy is defined but not attached anywhere");
            if let Err(err) = self.permission(name) {
                if self.trust(name).is_err() {
                    return Err(err);
                }
            }
        }
        Ok(())
    }

    fn unused(&self) -> impl Iterator<Item = &'a str> + '_ {
        self.config
            .policies
            .keys()
            .map(String::as_str)
            .filter(move |name| !self.documents.contains_key(name))
    }
}

/// Immutable snapshot of an account's users and roles
#[derive(Debug, Clone, PartialEq)]
pub struct Account {
    account_id: String,
    users: BTreeMap<String, Principal>,
    roles: BTreeMap<String, Role>,
}

impl Account {
    /// Load an account from a TOML file; policy files resolve relative to it
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_toml(&text, base_dir)
    }

    pub fn from_toml(text: &str, base_dir: &Path) -> Result<Self> {
        Self::from_config(&AccountConfig::from_toml(text)?, base_dir)
    }

    pub fn from_config(config: &AccountConfig, base_dir: &Path) -> Result<Self> {
        let account_id = config.account_id.trim();
        if account_id.len() != 12 || !account_id.bytes().all(|b| b.is_ascii_digit()) {
            return Err(IamError::InvalidAccountId(config.account_id.clone()));
        }

        let mut resolver = PolicyResolver::new(config, base_dir);

        let mut users = BTreeMap::new();
        for user in &config.users {
            let arn = format!("arn:aws:iam::{}:user/{}", account_id, user.name);
            let mut principal = Principal::new(&user.name, &arn);
            for name in &user.policies {
                principal.attach(resolver.permission(name)?);
            }
            if users.insert(user.name.clone(), principal).is_some() {
                return Err(IamError::DuplicateName {
                    kind: "user",
                    name: user.name.clone(),
                });
            }
        }

        let mut roles = BTreeMap::new();
        for role_config in &config.roles {
            let arn = format!("arn:aws:iam::{}:role/{}", account_id, role_config.name);
            let mut role = Role::new(&role_config.name, &arn, resolver.trust(&role_config.trust)?);
            for name in &role_config.policies {
                role.attach(resolver.permission(name)?);
            }
            if let Some(boundary) = &role_config.boundary {
                role.set_boundary(resolver.permission(boundary)?);
            }
            if roles.insert(role_config.name.clone(), role).is_some() {
                return Err(IamError::DuplicateName {
                    kind: "role",
                    name: role_config.name.clone(),
                });
            }
        }

        resolver.check_unused()?;

        Ok(Account {
            account_id: account_id.to_string(),
            users,
            roles,
        })
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn user(&self, name: &str) -> Result<&Principal> {
        self.users
            .get(name)
            .ok_or_else(|| IamError::UnknownPrincipal(name.to_string()))
    }

    pub fn role(&self, name: &str) -> Result<&Role> {
        self.roles
            .get(name)
            .ok_or_else(|| IamError::UnknownRole(name.to_string()))
    }

    pub fn users(&self) -> impl Iterator<Item = &Principal> {
        self.users.values()
    }

    pub fn roles(&self) -> impl Iterator<Item = &Role> {
        self.roles.values()
    }
}

struct Current {
    account: Arc<Account>,
    generation: u64,
}

/// Holder of the current account snapshot.
///
/// Readers take an `Arc<Account>` and evaluate against it for as long as
/// they need; applying a new configuration never changes a snapshot that
/// has already been handed out.
pub struct PolicyDirectory {
    current: RwLock<Current>,
}

impl PolicyDirectory {
    pub fn new(account: Account) -> Self {
        PolicyDirectory {
            current: RwLock::new(Current {
                account: Arc::new(account),
                generation: 1,
            }),
        }
    }

    /// Replace the current snapshot, returning the new generation number
    pub fn apply(&self, account: Account) -> u64 {
        let mut current = self.current.write();
        current.account = Arc::new(account);
        current.generation += 1;
        info!(
            generation = current.generation,
            account = %current.account.account_id,
            users = current.account.users.len(),
            roles = current.account.roles.len(),
            "applied account configuration"
        );
        current.generation
    }

    pub fn snapshot(&self) -> Arc<Account> {
        Arc::clone(&self.current.read().account)
    }

    pub fn generation(&self) -> u64 {
        self.current.read().generation
    }
}
