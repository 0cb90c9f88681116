//! Parsing and de-duplicating retrieved messages.

use std::collections::HashSet;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::Value;

/// A message pulled out of a swarm, still in its envelope.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ReceivedMessage {
    /// Decoded message envelope.
    pub envelope: Vec<u8>,
    /// Server assigned hash, used for paging and de-duplication.
    pub hash: String,
}

/// Parse a `retrieve` response body. Malformed entries are skipped rather
/// than failing the whole page.
pub fn parse_messages(json: &Value) -> Vec<ReceivedMessage> {
    let raw_messages = match json.get("messages").and_then(Value::as_array) {
        Some(raw_messages) => raw_messages,
        None => return Vec::new(),
    };
    raw_messages
        .iter()
        .filter_map(|raw| {
            let data = raw.get("data").and_then(Value::as_str)?;
            let hash = raw.get("hash").and_then(Value::as_str)?;
            let envelope = match BASE64.decode(data) {
                Ok(envelope) => envelope,
                Err(_) => {
                    warn!("Failed to decode data for message with hash: {}.", hash);
                    return None;
                }
            };
            Some(ReceivedMessage {
                envelope,
                hash: hash.to_owned(),
            })
        })
        .collect()
}

/// Drop messages whose hashes were seen before. Returns the unseen
/// messages, in their original order, together with the updated seen set.
pub fn dedup_messages(
    seen: &HashSet<String>,
    messages: Vec<ReceivedMessage>,
) -> (Vec<ReceivedMessage>, HashSet<String>) {
    let mut updated = seen.clone();
    let unseen = messages
        .into_iter()
        .filter(|message| updated.insert(message.hash.clone()))
        .collect();
    (unseen, updated)
}
