//! Core data types for the balance sync engine
//!
//! Defines resource types, cache keys, balance values and the
//! runtime polling configuration.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

/// One of the balance categories tracked for an account
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResourceType {
    /// Fungible grove token balances, one per grove
    Token,
    /// Stable-coin balance
    Usdc,
    /// Liquidity-pool token balances
    LpToken,
    /// Revenue available to the account
    Revenue,
    /// Revenue distributions not yet paid out
    PendingDistribution,
}

impl ResourceType {
    /// Every resource type, in poll order
    pub const ALL: [ResourceType; 5] = [
        ResourceType::Token,
        ResourceType::Usdc,
        ResourceType::LpToken,
        ResourceType::Revenue,
        ResourceType::PendingDistribution,
    ];

    /// Short name used in cache keys and logs
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceType::Token => "token",
            ResourceType::Usdc => "usdc",
            ResourceType::LpToken => "lp_token",
            ResourceType::Revenue => "revenue",
            ResourceType::PendingDistribution => "pending_distribution",
        }
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResourceType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "token" | "tokens" => Ok(ResourceType::Token),
            "usdc" => Ok(ResourceType::Usdc),
            "lp_token" | "lp" | "lp_tokens" => Ok(ResourceType::LpToken),
            "revenue" => Ok(ResourceType::Revenue),
            "pending_distribution" | "pending" => Ok(ResourceType::PendingDistribution),
            _ => Err(format!("Unknown resource type: {}", s)),
        }
    }
}

/// Cache key: resource type scoped to an account
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceKey {
    pub resource: ResourceType,
    pub account_id: String,
}

impl ResourceKey {
    pub fn new(resource: ResourceType, account_id: impl Into<String>) -> Self {
        Self {
            resource,
            account_id: account_id.into(),
        }
    }
}

impl fmt::Display for ResourceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.resource, self.account_id)
    }
}

/// A fetched balance
///
/// Amounts are in the smallest unit of the asset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum BalanceValue {
    /// Token balance per grove id
    Groves(BTreeMap<String, u64>),
    /// Balance per LP token id
    LpTokens(BTreeMap<String, u64>),
    /// A single amount
    Amount(u64),
}

impl BalanceValue {
    /// Sum of all amounts held in this value
    pub fn total(&self) -> u64 {
        match self {
            BalanceValue::Groves(map) | BalanceValue::LpTokens(map) => {
                map.values().fold(0u64, |acc, v| acc.saturating_add(*v))
            }
            BalanceValue::Amount(v) => *v,
        }
    }

    /// Scalar amount, if this is a single-amount value
    pub fn as_amount(&self) -> Option<u64> {
        match self {
            BalanceValue::Amount(v) => Some(*v),
            _ => None,
        }
    }

    /// Per-grove map, if this is a token balance
    pub fn as_groves(&self) -> Option<&BTreeMap<String, u64>> {
        match self {
            BalanceValue::Groves(map) => Some(map),
            _ => None,
        }
    }
}

/// Event published on the update stream whenever a fetch succeeds
#[derive(Debug, Clone, Serialize)]
pub struct BalanceUpdate {
    pub resource: ResourceType,
    pub account_id: String,
    pub value: BalanceValue,
    pub fetched_at: chrono::DateTime<chrono::Utc>,
}

/// Runtime polling configuration, fixed for the lifetime of an engine
#[derive(Debug, Clone)]
pub struct PollConfig {
    /// Time between poll cycles
    pub interval: Duration,
    /// Age after which a cached value is stale
    pub cache_ttl: Duration,
    /// Total attempts per fetch, including the first
    pub max_retries: u32,
    /// Delay before the second attempt; doubles on each further attempt
    pub base_retry_delay: Duration,
    /// Upper bound on a single retry delay
    pub max_retry_delay: Option<Duration>,
    /// Retry errors that are not classified as transient
    pub retry_permanent_errors: bool,
    /// Longest wait for a transaction confirmation before resyncing anyway
    pub confirmation_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(30),
            cache_ttl: Duration::from_secs(30),
            max_retries: 3,
            base_retry_delay: Duration::from_secs(1),
            max_retry_delay: None,
            retry_permanent_errors: false,
            confirmation_timeout: Duration::from_secs(30),
        }
    }
}

impl From<&crate::config::Config> for PollConfig {
    fn from(config: &crate::config::Config) -> Self {
        let polling = &config.polling;
        Self {
            interval: Duration::from_millis(polling.interval_ms),
            cache_ttl: Duration::from_millis(polling.cache_ttl_ms),
            max_retries: polling.max_retries.max(1),
            base_retry_delay: Duration::from_millis(polling.base_retry_delay_ms),
            max_retry_delay: polling.max_retry_delay_ms.map(Duration::from_millis),
            retry_permanent_errors: polling.retry_permanent_errors,
            confirmation_timeout: Duration::from_millis(config.resync.confirmation_timeout_ms),
        }
    }
}
