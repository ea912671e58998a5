//! Publish-log records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::market::MarketType;

/// Append-only record of one publish attempt, posted or not.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PublishRecord {
    pub publish_id: String,
    pub signal_id: String,
    pub event_id: String,
    pub market_type: MarketType,
    pub template_id: String,
    pub rendered_hash: String,
    /// At-most-once key: (signal_id, template_id, rendered_hash)
    pub dedupe_key: String,
    pub posted: bool,
    /// Copy-validator failure or drop reason when posted = false
    pub failure_reason: Option<String>,
    /// Message id returned by the outbound channel
    pub message_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Dedupe key protecting idempotent re-send on one channel.
pub fn publish_dedupe_key(signal_id: &str, template_id: &str, rendered_hash: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(signal_id.as_bytes());
    hasher.update(b"|");
    hasher.update(template_id.as_bytes());
    hasher.update(b"|");
    hasher.update(rendered_hash.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}

/// Hash of a rendered message body.
pub fn rendered_hash(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(&hasher.finalize()[..16])
}
