//! Storage RPC request construction: parameter maps, signed verification
//! data, and response signature checks.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::{json, Map, Value};
use snode_crypto::{verify_detached, IdentityKeys};

use crate::error::Error;
use crate::snode::{decode_key, Method};

/// The namespace messages land in when none is given.
pub const DEFAULT_NAMESPACE: i32 = 0;

/// A message headed for someone's swarm.
#[derive(Clone, Debug)]
pub struct SnodeMessage {
    /// Account id of the recipient.
    pub recipient: String,
    /// Base64 encoded message envelope.
    pub data: String,
    /// Time to live in milliseconds.
    pub ttl: u64,
    /// Sender timestamp in milliseconds.
    pub timestamp: u64,
}

impl SnodeMessage {
    pub fn to_params(&self) -> Value {
        json!({
            "pubKey": self.recipient,
            "data": self.data,
            "ttl": self.ttl.to_string(),
            "timestamp": self.timestamp.to_string(),
        })
    }
}

/// One sub-request of a `batch` or `sequence` call.
#[derive(Clone, Debug)]
pub struct SnodeBatchRequestInfo {
    pub method: Method,
    pub params: Value,
    /// Namespace the sub-request operates on, for callers that need to
    /// route the sub-responses. Not part of the wire format.
    pub namespace: Option<i32>,
}

impl SnodeBatchRequestInfo {
    pub fn to_wire(&self) -> Value {
        json!({
            "method": self.method.as_str(),
            "params": self.params,
        })
    }
}

// Verification data layouts the storage server expects signatures over.
// The namespace is omitted where it is zero, except for `store` which
// always spells it out.

pub(crate) fn retrieve_verification_data(namespace: i32, timestamp: u64) -> Vec<u8> {
    if namespace == DEFAULT_NAMESPACE {
        format!("retrieve{}", timestamp).into_bytes()
    } else {
        format!("retrieve{}{}", namespace, timestamp).into_bytes()
    }
}

pub(crate) fn store_verification_data(namespace: i32, timestamp: u64) -> Vec<u8> {
    format!("store{}{}", namespace, timestamp).into_bytes()
}

pub(crate) fn delete_verification_data(hashes: &[String]) -> Vec<u8> {
    format!("delete{}", hashes.concat()).into_bytes()
}

pub(crate) fn delete_all_verification_data(timestamp: u64) -> Vec<u8> {
    format!("delete_allall{}", timestamp).into_bytes()
}

pub(crate) fn expire_verification_data(
    shorten: bool,
    extend: bool,
    expiry: u64,
    hashes: &[String],
) -> Vec<u8> {
    let qualifier = if shorten {
        "shorten"
    } else if extend {
        "extend"
    } else {
        ""
    };
    format!("expire{}{}{}", qualifier, expiry, hashes.concat()).into_bytes()
}

pub(crate) fn get_expiries_verification_data(timestamp: u64, hashes: &[String]) -> Vec<u8> {
    format!("get_expiries{}{}", timestamp, hashes.concat()).into_bytes()
}

/// Add the authentication trio to `params`: the signer's ed25519 key and a
/// base64 signature over `verification_data`.
pub(crate) fn attach_signature(
    params: &mut Map<String, Value>,
    keys: &IdentityKeys,
    verification_data: &[u8],
) {
    let signature = keys.sign(verification_data);
    params.insert(
        "pubkey_ed25519".into(),
        Value::from(keys.ed25519_public_key_hex()),
    );
    params.insert("signature".into(), Value::from(BASE64.encode(signature)));
}

/// Verify one swarm member's response signature. `snode_ed25519_hex` is the
/// key the member is listed under in the `swarm` response map.
pub(crate) fn verify_swarm_member_signature(
    snode_ed25519_hex: &str,
    message: &[u8],
    base64_signature: &str,
) -> bool {
    let public_key = match decode_key(snode_ed25519_hex) {
        Some(key) => key,
        None => return false,
    };
    let signature = match BASE64.decode(base64_signature) {
        Ok(signature) => signature,
        Err(_) => return false,
    };
    verify_detached(&public_key, message, &signature)
}

/// Collect string arrays out of swarm member responses.
pub(crate) fn string_array(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|values| {
            values
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_owned)
                .collect()
        })
        .unwrap_or_default()
}

/// Pull the object params back out of a `Value` built with `json!`.
pub(crate) fn as_object(params: Value) -> Result<Map<String, Value>, Error> {
    match params {
        Value::Object(map) => Ok(map),
        _ => Err(Error::Generic),
    }
}
