use std::fmt;

use serde::Serialize;
use thiserror::Error;

use crate::metrics::ShardMetrics;

/// One of the two backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ShardId {
    First,
    Second,
}

impl ShardId {
    pub const ALL: [ShardId; 2] = [ShardId::First, ShardId::Second];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShardId::First => "first",
            ShardId::Second => "second",
        }
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RouteError {
    #[error("routing key is empty")]
    EmptyKey,
}

/// Maps a routing key to its shard.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShardRouter;

impl ShardRouter {
    pub fn new() -> Self {
        Self
    }

    /// Route by the first character of `key`, ASCII case-folded.
    ///
    /// `a`..=`m` goes to [`ShardId::First`]; any other character, including
    /// digits, punctuation and non-ASCII letters, goes to [`ShardId::Second`].
    pub fn route(&self, key: &str) -> Result<ShardId, RouteError> {
        let Some(first) = key.chars().next() else {
            ShardMetrics::record_rejected("empty_key");
            return Err(RouteError::EmptyKey);
        };

        let shard = match first.to_ascii_lowercase() {
            'a'..='m' => ShardId::First,
            _ => ShardId::Second,
        };

        ShardMetrics::record_routed(shard.as_str());
        tracing::debug!(key = %key, shard = %shard, "Routed key to shard");
        Ok(shard)
    }
}
