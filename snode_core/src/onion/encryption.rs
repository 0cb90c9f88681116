//! Layered onion encryption.
//!
//! Every layer wraps the previous one in a frame of the form
//! `| 4 byte little endian ciphertext length | ciphertext | json metadata |`
//! and encrypts the frame for the hop that has to peel it. The metadata
//! tells the hop where to forward the ciphertext and which ephemeral key to
//! run the key agreement against.

use cookie_factory::bytes::le_u32;
use cookie_factory::combinator::slice;
use cookie_factory::sequence::tuple;
use cookie_factory::gen_simple;
use serde_json::{json, Value};
use snode_crypto::{encrypt_for_recipient, EncryptionResult, KEY_SIZE};

use crate::error::Error;
use crate::onion::path::OnionPath;
use crate::snode::{Destination, Version};

/// A fully built onion, ready to be posted to the guard.
pub struct BuiltOnion {
    /// Outermost layer, encrypted to the guard's x25519 key.
    pub guard_layer: EncryptionResult,
    /// Key the destination layer was encrypted with. The response comes
    /// back encrypted under this key only, the relays just pass it along.
    pub destination_symmetric_key: [u8; KEY_SIZE],
}

/// Serialize one onion frame.
pub fn encode_onion_frame(ciphertext: &[u8], metadata: &Value) -> Result<Vec<u8>, Error> {
    let json = serde_json::to_vec(metadata)
        .map_err(|error| Error::InvalidResponse(error.to_string()))?;
    gen_simple(
        tuple((le_u32(ciphertext.len() as u32), slice(ciphertext), slice(&json))),
        Vec::new(),
    )
    .map_err(|_| Error::Generic)
}

/// Encrypt the innermost layer, the one only the destination can read.
pub fn encrypt_payload_for_destination(
    payload: &[u8],
    destination: &Destination,
    version: Version,
) -> Result<EncryptionResult, Error> {
    // Wrapping isn't needed for V4, the payload already carries its own
    // framing. Legacy snode requests wrap the RPC body with empty headers.
    let plaintext = match (version, destination) {
        (Version::V4, _) | (_, Destination::Server { .. }) => payload.to_vec(),
        (_, Destination::Snode(_)) => encode_onion_frame(payload, &json!({ "headers": "" }))?,
    };
    let recipient = destination
        .x25519_key_bytes()
        .ok_or(Error::Crypto(snode_crypto::CryptoError::InvalidKey))?;
    Ok(encrypt_for_recipient(&plaintext, &recipient)?)
}

/// Encrypt one intermediate layer: the previous layer's ciphertext plus the
/// routing metadata for `inner`, encrypted to `hop`'s x25519 key.
pub fn encrypt_hop(
    hop: &Destination,
    inner: &Destination,
    previous: &EncryptionResult,
) -> Result<EncryptionResult, Error> {
    let mut metadata = match inner {
        Destination::Snode(snode) => json!({ "destination": snode.ed25519_key }),
        Destination::Server { host, target, scheme, port, .. } => json!({
            "host": host,
            "target": target,
            "method": "POST",
            "protocol": scheme,
            "port": port,
        }),
    };
    metadata["ephemeral_key"] = Value::from(hex::encode(previous.ephemeral_public_key));
    let plaintext = encode_onion_frame(&previous.ciphertext, &metadata)?;
    let recipient = hop
        .x25519_key_bytes()
        .ok_or(Error::Crypto(snode_crypto::CryptoError::InvalidKey))?;
    Ok(encrypt_for_recipient(&plaintext, &recipient)?)
}

/// Build the full onion for `payload` travelling over `path` to
/// `destination`. Layers are encrypted destination first, guard last.
pub fn build_onion(
    payload: &[u8],
    path: &OnionPath,
    destination: &Destination,
    version: Version,
) -> Result<BuiltOnion, Error> {
    let destination_layer = encrypt_payload_for_destination(payload, destination, version)?;
    let destination_symmetric_key = destination_layer.symmetric_key;
    let mut layer = destination_layer;
    let mut inner = destination.clone();
    for node in path.nodes().iter().rev() {
        let hop = Destination::Snode(node.clone());
        layer = encrypt_hop(&hop, &inner, &layer)?;
        inner = hop;
    }
    Ok(BuiltOnion {
        guard_layer: layer,
        destination_symmetric_key,
    })
}
