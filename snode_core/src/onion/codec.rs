//! Response decoding for the onion request protocol versions.
//!
//! V4 responses are a bencode flavoured list `l<len>:<json>[<len>:<body>]e`
//! encrypted as a whole. The legacy V2/V3 envelope is a JSON object whose
//! `result` field holds the base64 of `iv || ciphertext`; the decrypted
//! plaintext is JSON again. Both end up in the same [`DecodedResponse`] so
//! the dispatcher doesn't care which version a request went out as.

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use cookie_factory::combinator::{slice, string};
use cookie_factory::gen_simple;
use cookie_factory::sequence::tuple;
use nom::bytes::complete::take;
use nom::character::complete::{char, digit1};
use nom::combinator::{map_res, opt};
use nom::IResult;
use serde_json::Value;
use snode_crypto::{decrypt_with_key, KEY_SIZE};

use crate::error::Error;
use crate::snode::{Destination, Version};
use crate::store::ForkInfo;
use crate::time::system_time_ms;

const BLINDING_REQUIRED_MESSAGE: &str =
    "Invalid authentication: this server requires the use of blinded ids";

/// A decrypted destination response.
#[derive(Clone, Debug)]
pub struct OnionResponse {
    /// Response metadata. For V4 this is the info frame; for legacy
    /// versions the whole decrypted JSON object.
    pub info: Value,
    /// Raw response body, when the destination sent one.
    pub body: Option<Vec<u8>>,
}

/// Response plus the network health signals piggybacked on it.
#[derive(Clone, Debug)]
pub struct DecodedResponse {
    pub response: OnionResponse,
    /// Hardfork info, when the snode reported one (legacy envelope only).
    pub fork_info: Option<ForkInfo>,
    /// Clock offset learned from the snode's timestamp, in milliseconds.
    pub clock_offset_ms: Option<i64>,
}

/// Decodes guard responses for one protocol version.
pub trait ResponseCodec: Send + Sync {
    /// Decrypt and parse `raw` with the destination layer's symmetric key.
    fn decode(
        &self,
        raw: &[u8],
        key: &[u8; KEY_SIZE],
        destination: &Destination,
    ) -> Result<DecodedResponse, Error>;
}

/// The codec for `version`.
pub fn codec_for(version: Version) -> &'static dyn ResponseCodec {
    match version {
        Version::V4 => &V4Codec,
        Version::V2 | Version::V3 => &LegacyCodec,
    }
}

/// Serialize a V4 request payload: the request metadata JSON, optionally
/// followed by a binary body, in the same framing responses use.
pub fn encode_v4_payload(metadata: &Value, body: Option<&[u8]>) -> Result<Vec<u8>, Error> {
    let json = serde_json::to_vec(metadata)
        .map_err(|error| Error::InvalidResponse(error.to_string()))?;
    let frame = match body {
        Some(body) => gen_simple(
            tuple((
                string("l"),
                string(json.len().to_string()),
                string(":"),
                slice(&json),
                string(body.len().to_string()),
                string(":"),
                slice(body),
                string("e"),
            )),
            Vec::new(),
        ),
        None => gen_simple(
            tuple((
                string("l"),
                string(json.len().to_string()),
                string(":"),
                slice(&json),
                string("e"),
            )),
            Vec::new(),
        ),
    };
    frame.map_err(|_| Error::Generic)
}

fn bencoded_bytes(input: &[u8]) -> IResult<&[u8], &[u8]> {
    let (input, length) =
        map_res(map_res(digit1, std::str::from_utf8), str::parse::<usize>)(input)?;
    let (input, _) = char(':')(input)?;
    take(length)(input)
}

fn v4_envelope(input: &[u8]) -> IResult<&[u8], (&[u8], Option<&[u8]>)> {
    let (input, _) = char('l')(input)?;
    let (input, info) = bencoded_bytes(input)?;
    let (input, body) = opt(bencoded_bytes)(input)?;
    let (input, _) = char('e')(input)?;
    Ok((input, (info, body)))
}

/// Map a destination status code to an error, or pass 2xx through.
fn classify_status(
    code: u16,
    info: &Value,
    body: Option<&[u8]>,
    destination: &Destination,
) -> Result<(), Error> {
    if code == 406 || code == 425 {
        return Err(Error::ClockOutOfSync);
    }
    if code == 400 {
        if let Destination::Server { .. } = destination {
            let blinding_required = body
                .map(|body| String::from_utf8_lossy(body).contains(BLINDING_REQUIRED_MESSAGE))
                .unwrap_or(false);
            if blinding_required {
                return Err(Error::BlindingRequired {
                    destination: destination.description(),
                });
            }
        }
    }
    if !(200..300).contains(&code) {
        return Err(Error::HttpRequestFailedAtDestination {
            code,
            info: info.clone(),
            destination: destination.description(),
        });
    }
    Ok(())
}

/// V4 codec.
pub struct V4Codec;

impl ResponseCodec for V4Codec {
    fn decode(
        &self,
        raw: &[u8],
        key: &[u8; KEY_SIZE],
        destination: &Destination,
    ) -> Result<DecodedResponse, Error> {
        let plaintext = decrypt_with_key(raw, key)?;
        let (_, (info_bytes, body)) = v4_envelope(&plaintext)
            .map_err(|_| Error::InvalidResponse("Malformed response envelope".into()))?;
        let info: Value = serde_json::from_slice(info_bytes)
            .map_err(|error| Error::InvalidResponse(error.to_string()))?;
        let code = info
            .get("code")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::InvalidResponse("Missing status code".into()))?
            as u16;
        classify_status(code, &info, body, destination)?;
        Ok(DecodedResponse {
            response: OnionResponse {
                info,
                body: body.map(<[u8]>::to_vec),
            },
            fork_info: None,
            clock_offset_ms: None,
        })
    }
}

/// V2/V3 codec.
pub struct LegacyCodec;

impl ResponseCodec for LegacyCodec {
    fn decode(
        &self,
        raw: &[u8],
        key: &[u8; KEY_SIZE],
        destination: &Destination,
    ) -> Result<DecodedResponse, Error> {
        let envelope: Value = serde_json::from_slice(raw)
            .map_err(|error| Error::InvalidResponse(error.to_string()))?;
        let iv_and_ciphertext = envelope
            .get("result")
            .and_then(Value::as_str)
            .map(|result| BASE64.decode(result))
            .transpose()
            .map_err(|error| Error::InvalidResponse(error.to_string()))?
            .ok_or_else(|| Error::InvalidResponse("Missing result field".into()))?;
        let plaintext = decrypt_with_key(&iv_and_ciphertext, key)?;
        let envelope: Value = serde_json::from_slice(&plaintext)
            .map_err(|error| Error::InvalidResponse(error.to_string()))?;

        let code = envelope
            .get("status_code")
            .or_else(|| envelope.get("status"))
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::InvalidResponse("Missing status code".into()))?
            as u16;
        // Clock desync is decided before the body is touched; such
        // responses don't necessarily carry a well formed one.
        if code == 406 || code == 425 {
            return Err(Error::ClockOutOfSync);
        }

        // The actual payload is nested in `body`, either as a JSON object
        // or as a string of JSON. The clock and fork signals ride inside
        // it; only the status code lives at the envelope level.
        let (info, body) = match envelope.get("body") {
            Some(Value::String(raw)) => {
                let parsed: Value = serde_json::from_str(raw)
                    .map_err(|error| Error::InvalidResponse(error.to_string()))?;
                (parsed, Some(raw.as_bytes().to_vec()))
            }
            Some(body @ Value::Object(_)) => {
                let bytes = serde_json::to_vec(body)
                    .map_err(|error| Error::InvalidResponse(error.to_string()))?;
                (body.clone(), Some(bytes))
            }
            _ => (envelope, None),
        };

        let clock_offset_ms = info
            .get("t")
            .and_then(Value::as_i64)
            .map(|timestamp| timestamp - system_time_ms() as i64);
        let fork_info = info.get("hf").and_then(Value::as_array).and_then(|hf| {
            Some(ForkInfo {
                hard: hf.first()?.as_u64()? as u32,
                soft: hf.get(1)?.as_u64()? as u32,
            })
        });

        classify_status(code, &info, body.as_deref(), destination)?;

        Ok(DecodedResponse {
            response: OnionResponse { info, body },
            fork_info,
            clock_offset_ms,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onion::path::tests::test_snode;
    use serde_json::json;
    use snode_crypto::encrypt_with_key;

    fn snode_destination() -> Destination {
        Destination::Snode(test_snode(1))
    }

    fn server_destination() -> Destination {
        Destination::Server {
            host: "open.getsession.org".into(),
            target: Version::V4.path().into(),
            x25519_public_key: "aa".repeat(32),
            scheme: "https".into(),
            port: 443,
        }
    }

    fn encrypt_v4(plaintext: &[u8], key: &[u8; KEY_SIZE]) -> Vec<u8> {
        encrypt_with_key(plaintext, key).unwrap()
    }

    #[test]
    fn v4_payload_framing() {
        let payload = encode_v4_payload(&json!({ "code": 200 }), None).unwrap();
        assert_eq!(payload, br#"l12:{"code":200}e"#.to_vec());

        let with_body = encode_v4_payload(&json!({ "code": 200 }), Some(b"abc")).unwrap();
        assert_eq!(with_body, br#"l12:{"code":200}3:abce"#.to_vec());
    }

    #[test]
    fn v4_success_with_body() {
        let key = [7; KEY_SIZE];
        let frame = encode_v4_payload(&json!({ "code": 200, "headers": {} }), Some(b"hello"))
            .unwrap();
        let raw = encrypt_v4(&frame, &key);
        let decoded = V4Codec.decode(&raw, &key, &snode_destination()).unwrap();
        assert_eq!(decoded.response.info["code"], 200);
        assert_eq!(decoded.response.body.as_deref(), Some(&b"hello"[..]));
        assert!(decoded.fork_info.is_none());
    }

    #[test]
    fn v4_success_without_body() {
        let key = [7; KEY_SIZE];
        let raw = encrypt_v4(br#"l12:{"code":200}e"#, &key);
        let decoded = V4Codec.decode(&raw, &key, &snode_destination()).unwrap();
        assert!(decoded.response.body.is_none());
    }

    #[test]
    fn v4_destination_error_passes_through() {
        let key = [7; KEY_SIZE];
        let frame = encode_v4_payload(&json!({ "code": 404 }), None).unwrap();
        let raw = encrypt_v4(&frame, &key);
        let error = V4Codec.decode(&raw, &key, &snode_destination()).unwrap_err();
        match error {
            Error::HttpRequestFailedAtDestination { code, .. } => assert_eq!(code, 404),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn v4_clock_desync_statuses() {
        let key = [7; KEY_SIZE];
        for code in [406, 425] {
            let frame = encode_v4_payload(&json!({ "code": code }), None).unwrap();
            let raw = encrypt_v4(&frame, &key);
            let error = V4Codec.decode(&raw, &key, &snode_destination()).unwrap_err();
            assert!(matches!(error, Error::ClockOutOfSync));
        }
    }

    #[test]
    fn v4_blinding_requirement_is_detected() {
        let key = [7; KEY_SIZE];
        let frame = encode_v4_payload(
            &json!({ "code": 400 }),
            Some(BLINDING_REQUIRED_MESSAGE.as_bytes()),
        )
        .unwrap();
        let raw = encrypt_v4(&frame, &key);
        let error = V4Codec.decode(&raw, &key, &server_destination()).unwrap_err();
        assert!(matches!(error, Error::BlindingRequired { .. }));

        // A snode destination never maps 400 to a blinding error.
        let raw = encrypt_v4(&frame, &key);
        let error = V4Codec.decode(&raw, &key, &snode_destination()).unwrap_err();
        assert!(matches!(error, Error::HttpRequestFailedAtDestination { code: 400, .. }));
    }

    #[test]
    fn v4_garbage_is_invalid_not_a_panic() {
        let key = [7; KEY_SIZE];
        let raw = encrypt_v4(b"x12:{\"code\":200}e", &key);
        assert!(matches!(
            V4Codec.decode(&raw, &key, &snode_destination()),
            Err(Error::InvalidResponse(_))
        ));
        // Wrong key fails authentication before parsing.
        let raw = encrypt_v4(br#"l12:{"code":200}e"#, &key);
        assert!(matches!(
            V4Codec.decode(&raw, &[8; KEY_SIZE], &snode_destination()),
            Err(Error::Crypto(_))
        ));
    }

    fn legacy_envelope(inner: &Value, key: &[u8; KEY_SIZE]) -> Vec<u8> {
        let ciphertext = encrypt_with_key(inner.to_string().as_bytes(), key).unwrap();
        json!({ "result": BASE64.encode(ciphertext) }).to_string().into_bytes()
    }

    #[test]
    fn legacy_string_body_carries_health_signals() {
        let key = [9; KEY_SIZE];
        let now = system_time_ms() as i64;
        let inner = json!({ "messages": [], "t": now + 7_000, "hf": [19, 3] });
        let raw = legacy_envelope(
            &json!({ "status": 200, "body": inner.to_string() }),
            &key,
        );
        let decoded = LegacyCodec.decode(&raw, &key, &snode_destination()).unwrap();
        assert_eq!(decoded.fork_info, Some(ForkInfo { hard: 19, soft: 3 }));
        let offset = decoded.clock_offset_ms.unwrap();
        assert!((6_000..8_000).contains(&offset), "offset was {}", offset);
        assert_eq!(
            decoded.response.body.as_deref(),
            Some(inner.to_string().as_bytes())
        );
    }

    #[test]
    fn legacy_map_body_carries_health_signals() {
        let key = [9; KEY_SIZE];
        let now = system_time_ms() as i64;
        let raw = legacy_envelope(
            &json!({
                "status": 200,
                "body": { "messages": [], "t": now + 7_000, "hf": [19, 3] },
            }),
            &key,
        );
        let decoded = LegacyCodec.decode(&raw, &key, &snode_destination()).unwrap();
        assert_eq!(decoded.fork_info, Some(ForkInfo { hard: 19, soft: 3 }));
        let offset = decoded.clock_offset_ms.unwrap();
        assert!((6_000..8_000).contains(&offset), "offset was {}", offset);
        // The map form comes back serialized so callers see one body shape.
        let body: Value =
            serde_json::from_slice(decoded.response.body.as_deref().unwrap()).unwrap();
        assert_eq!(body["messages"], json!([]));
        assert_eq!(decoded.response.info["hf"], json!([19, 3]));
    }

    #[test]
    fn legacy_status_code_field_variants() {
        let key = [9; KEY_SIZE];
        let raw = legacy_envelope(&json!({ "status_code": 200 }), &key);
        assert!(LegacyCodec.decode(&raw, &key, &snode_destination()).is_ok());

        let raw = legacy_envelope(&json!({ "status_code": 500 }), &key);
        assert!(matches!(
            LegacyCodec.decode(&raw, &key, &snode_destination()),
            Err(Error::HttpRequestFailedAtDestination { code: 500, .. })
        ));
    }

    #[test]
    fn legacy_clock_desync_ignores_the_body() {
        let key = [9; KEY_SIZE];
        let raw = legacy_envelope(&json!({ "status": 406, "body": "not json" }), &key);
        assert!(matches!(
            LegacyCodec.decode(&raw, &key, &snode_destination()),
            Err(Error::ClockOutOfSync)
        ));
    }

    #[test]
    fn legacy_missing_result_field() {
        let key = [9; KEY_SIZE];
        assert!(matches!(
            LegacyCodec.decode(b"{}", &key, &snode_destination()),
            Err(Error::InvalidResponse(_))
        ));
    }
}
