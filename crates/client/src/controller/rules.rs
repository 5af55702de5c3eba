//! Local serve rules.
//!
//! A rule tells the host to fulfil requests for one exact URL from local
//! content instead of the network. Identifiers come from the store's
//! allocator table so they are unique across restarts and never reused.

use std::collections::HashMap;

use async_trait::async_trait;
use parking_lot::Mutex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use cachet_core::{CacheDb, Error};

/// Scheme of local serve targets.
pub const TARGET_PREFIX: &str = "cachet://asset/";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServeRule {
    pub id: i64,
    /// Exact normalized URL the rule matches.
    pub url: String,
    /// Local content the request is redirected to.
    pub target: String,
}

/// Host capability for installing and removing serve rules.
#[async_trait]
pub trait RuleInstaller: Send + Sync {
    /// Install (or keep) the rule for `url`.
    async fn install(&self, url: &str) -> Result<ServeRule, Error>;

    /// Remove the rule for `url`. Idempotent; returns whether one existed.
    async fn remove(&self, url: &str) -> Result<bool, Error>;

    /// Remove every rule, returning how many were dropped.
    async fn clear(&self) -> Result<usize, Error>;
}

/// In-process rule table backed by the durable id allocator.
#[derive(Debug)]
pub struct LocalRuleTable {
    db: CacheDb,
    rules: Mutex<HashMap<String, ServeRule>>,
}

impl LocalRuleTable {
    pub fn new(db: CacheDb) -> Self {
        Self { db, rules: Mutex::new(HashMap::new()) }
    }

    pub fn get(&self, url: &str) -> Option<ServeRule> {
        self.rules.lock().get(url).cloned()
    }

    pub fn len(&self) -> usize {
        self.rules.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.rules.lock().is_empty()
    }
}

#[async_trait]
impl RuleInstaller for LocalRuleTable {
    async fn install(&self, url: &str) -> Result<ServeRule, Error> {
        if let Some(rule) = self.get(url) {
            return Ok(rule);
        }
        let id = self.db.allocate_rule_id(url).await?;
        let rule = ServeRule { id, url: url.to_string(), target: format!("{TARGET_PREFIX}{id}") };
        self.rules.lock().insert(url.to_string(), rule.clone());
        tracing::debug!(url = %url, id, "serve rule installed");
        Ok(rule)
    }

    async fn remove(&self, url: &str) -> Result<bool, Error> {
        Ok(self.rules.lock().remove(url).is_some())
    }

    async fn clear(&self) -> Result<usize, Error> {
        let mut rules = self.rules.lock();
        let count = rules.len();
        rules.clear();
        Ok(count)
    }
}
