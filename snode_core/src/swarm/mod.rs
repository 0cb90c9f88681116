//! Swarm storage RPCs: retrieving, storing, deleting and re-expiring
//! messages in the swarm responsible for an account.

pub mod messages;
pub mod request;

use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use rand::seq::IteratorRandom;
use rand::thread_rng;
use serde_json::{json, Value};
use snode_crypto::IdentityKeys;

use crate::directory::{parse_swarm_snodes, SnodeDirectory, MIN_SWARM_SNODE_COUNT};
use crate::error::Error;
use crate::onion::dispatcher::OnionRequester;
use crate::snode::{Method, Snode};
use crate::store::NetworkTopologyStore;
use crate::swarm::messages::{dedup_messages, parse_messages, ReceivedMessage};
use crate::swarm::request::{
    as_object, attach_signature, delete_all_verification_data, delete_verification_data,
    expire_verification_data, get_expiries_verification_data, retrieve_verification_data,
    store_verification_data, string_array, verify_swarm_member_signature, SnodeBatchRequestInfo,
    SnodeMessage, DEFAULT_NAMESPACE,
};
use crate::time::now_with_offset_ms;

/// Attempts per RPC before the last error is surfaced.
pub const MAX_RETRY_COUNT: usize = 6;
const RETRY_INTERVAL: Duration = Duration::from_secs(1);

/// The storage server rejects `get_expiries` signatures over a single
/// hash, so single requests get padded with a hash that can't exist.
const GET_EXPIRIES_FILLER_HASH: &str = "///////////////////////////////////////////";

/// Client for the storage RPCs, everything routed over onion paths.
pub struct SwarmRpcClient {
    store: Arc<NetworkTopologyStore>,
    directory: Arc<SnodeDirectory>,
    requester: Arc<OnionRequester>,
    user_keys: Option<IdentityKeys>,
}

impl SwarmRpcClient {
    pub fn new(
        store: Arc<NetworkTopologyStore>,
        directory: Arc<SnodeDirectory>,
        requester: Arc<OnionRequester>,
        user_keys: Option<IdentityKeys>,
    ) -> Self {
        SwarmRpcClient { store, directory, requester, user_keys }
    }

    fn user_keys(&self) -> Result<&IdentityKeys, Error> {
        self.user_keys.as_ref().ok_or(Error::NoKeyPair)
    }

    async fn with_retries<T, F, Fut>(&self, mut operation: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut last_error = Error::Generic;
        for attempt in 0..MAX_RETRY_COUNT {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(error) => {
                    if !error.is_retryable() {
                        return Err(error);
                    }
                    debug!("Attempt {} failed: {}.", attempt + 1, error);
                    last_error = error;
                    if attempt + 1 < MAX_RETRY_COUNT {
                        tokio::time::sleep(RETRY_INTERVAL).await;
                    }
                }
            }
        }
        Err(last_error)
    }

    /// Send `method` to `snode` and unwrap the RPC response body.
    async fn invoke(
        &self,
        method: Method,
        snode: &Snode,
        params: Value,
        public_key: Option<&str>,
    ) -> Result<Value, Error> {
        let payload = json!({ "method": method.as_str(), "params": params });
        let response = self.requester.send_to_snode(snode, &payload, public_key).await?;
        match response.body {
            Some(body) => serde_json::from_slice(&body)
                .map_err(|error| Error::InvalidResponse(error.to_string())),
            None => Ok(response.info),
        }
    }

    /// The swarm responsible for `public_key`, from cache when it still
    /// holds enough members.
    pub async fn get_swarm(&self, public_key: &str) -> Result<HashSet<Snode>, Error> {
        if let Some(cached) = self.store.swarm(public_key).await {
            if cached.len() >= MIN_SWARM_SNODE_COUNT {
                return Ok(cached);
            }
        }
        debug!("Getting swarm for: {}.", public_key);
        self.with_retries(|| self.fetch_swarm(public_key)).await
    }

    async fn fetch_swarm(&self, public_key: &str) -> Result<HashSet<Snode>, Error> {
        let snode = self.directory.random_snode().await?;
        let json = self
            .invoke(Method::GetSwarm, &snode, json!({ "pubKey": public_key }), Some(public_key))
            .await?;
        let swarm: HashSet<Snode> = parse_swarm_snodes(&json).into_iter().collect();
        if swarm.is_empty() {
            return Err(Error::Generic);
        }
        self.store.set_swarm(public_key, swarm.clone()).await;
        Ok(swarm)
    }

    /// A random member of the swarm for `public_key`.
    pub async fn single_target_snode(&self, public_key: &str) -> Result<Snode, Error> {
        let swarm = self.get_swarm(public_key).await?;
        swarm
            .into_iter()
            .choose(&mut thread_rng())
            .ok_or(Error::InsufficientSnodes)
    }

    /// Retrieve the messages stored for `public_key` in `namespace` that
    /// haven't been seen before. Advances the paging cursor for the snode
    /// that answered.
    pub async fn get_messages(
        &self,
        public_key: &str,
        namespace: i32,
    ) -> Result<Vec<ReceivedMessage>, Error> {
        self.with_retries(|| self.get_messages_once(public_key, namespace)).await
    }

    async fn get_messages_once(
        &self,
        public_key: &str,
        namespace: i32,
    ) -> Result<Vec<ReceivedMessage>, Error> {
        let snode = self.single_target_snode(public_key).await?;
        let json = self.get_raw_messages(&snode, public_key, namespace).await?;
        let messages = parse_messages(&json);
        if let Some(last) = messages.last() {
            self.store
                .set_last_message_hash(&snode, public_key, namespace, last.hash.clone())
                .await;
        }
        let seen = self.store.received_message_hashes(public_key, namespace).await;
        let (unseen, updated) = dedup_messages(&seen, messages);
        self.store
            .set_received_message_hashes(public_key, namespace, updated)
            .await;
        Ok(unseen)
    }

    /// Raw signed `retrieve` against a specific snode, paged from the last
    /// hash that snode gave us.
    pub async fn get_raw_messages(
        &self,
        snode: &Snode,
        public_key: &str,
        namespace: i32,
    ) -> Result<Value, Error> {
        let last_hash = self
            .store
            .last_message_hash(snode, public_key, namespace)
            .await
            .unwrap_or_default();
        let timestamp = now_with_offset_ms();
        let mut params = as_object(json!({
            "pubKey": public_key,
            "last_hash": last_hash,
            "timestamp": timestamp,
        }))?;
        if namespace != DEFAULT_NAMESPACE {
            params.insert("namespace".into(), namespace.into());
        }
        attach_signature(
            &mut params,
            self.user_keys()?,
            &retrieve_verification_data(namespace, timestamp),
        );
        self.invoke(Method::Retrieve, snode, Value::Object(params), Some(public_key))
            .await
    }

    /// Store a message in the recipient's swarm.
    pub async fn send_message(
        &self,
        message: &SnodeMessage,
        namespace: i32,
    ) -> Result<Value, Error> {
        self.with_retries(|| self.send_message_once(message, namespace)).await
    }

    async fn send_message_once(
        &self,
        message: &SnodeMessage,
        namespace: i32,
    ) -> Result<Value, Error> {
        let snode = self.single_target_snode(&message.recipient).await?;
        let mut params = as_object(message.to_params())?;
        // The default namespace accepts unsigned stores so that anyone can
        // message anyone; other namespaces require the owner's signature.
        if namespace != DEFAULT_NAMESPACE {
            let timestamp = now_with_offset_ms();
            params.insert("namespace".into(), namespace.into());
            params.insert("sig_timestamp".into(), timestamp.into());
            attach_signature(
                &mut params,
                self.user_keys()?,
                &store_verification_data(namespace, timestamp),
            );
        }
        self.invoke(
            Method::Store,
            &snode,
            Value::Object(params),
            Some(&message.recipient),
        )
        .await
    }

    /// Delete specific messages from the user's own swarm. Returns, per
    /// swarm member, whether the member confirmed the deletion with a valid
    /// signature.
    pub async fn delete_messages(
        &self,
        hashes: Vec<String>,
    ) -> Result<HashMap<String, bool>, Error> {
        let account_id = self.user_keys()?.account_id();
        self.with_retries(|| self.delete_messages_once(&account_id, &hashes)).await
    }

    async fn delete_messages_once(
        &self,
        account_id: &str,
        hashes: &[String],
    ) -> Result<HashMap<String, bool>, Error> {
        let snode = self.single_target_snode(account_id).await?;
        let mut params = as_object(json!({ "pubkey": account_id, "messages": hashes }))?;
        attach_signature(&mut params, self.user_keys()?, &delete_verification_data(hashes));
        let json = self
            .invoke(Method::Delete, &snode, Value::Object(params), Some(account_id))
            .await?;
        Ok(verify_member_results(&json, |member| {
            let deleted = string_array(member.get("deleted"));
            Some(format!("{}{}{}", account_id, hashes.concat(), deleted.concat()).into_bytes())
        }))
    }

    /// Wipe everything stored for the user's account.
    pub async fn delete_all_messages(&self) -> Result<HashMap<String, bool>, Error> {
        let account_id = self.user_keys()?.account_id();
        self.with_retries(|| self.delete_all_once(&account_id)).await
    }

    async fn delete_all_once(&self, account_id: &str) -> Result<HashMap<String, bool>, Error> {
        let snode = self.single_target_snode(account_id).await?;
        // The server compares the timestamp against its own clock, so ask
        // it for the time first instead of trusting ours.
        let timestamp = self.get_network_time(&snode).await?;
        let mut params = as_object(json!({
            "pubkey": account_id,
            "namespace": "all",
            "timestamp": timestamp,
        }))?;
        attach_signature(
            &mut params,
            self.user_keys()?,
            &delete_all_verification_data(timestamp),
        );
        let json = self
            .invoke(Method::DeleteAll, &snode, Value::Object(params), Some(account_id))
            .await?;
        Ok(verify_member_results(&json, |member| {
            let deleted = flattened_hashes(member.get("deleted"));
            Some(format!("{}{}{}", account_id, timestamp, deleted.concat()).into_bytes())
        }))
    }

    /// Change the expiry of stored messages. `shorten` and `extend` make
    /// the change one-directional; with neither set the expiry is forced.
    pub async fn update_expiry(
        &self,
        hashes: Vec<String>,
        expiry_ms: u64,
        shorten: bool,
        extend: bool,
    ) -> Result<HashMap<String, bool>, Error> {
        let account_id = self.user_keys()?.account_id();
        self.with_retries(|| self.update_expiry_once(&account_id, &hashes, expiry_ms, shorten, extend))
            .await
    }

    async fn update_expiry_once(
        &self,
        account_id: &str,
        hashes: &[String],
        expiry_ms: u64,
        shorten: bool,
        extend: bool,
    ) -> Result<HashMap<String, bool>, Error> {
        let snode = self.single_target_snode(account_id).await?;
        let mut params = as_object(json!({
            "pubkey": account_id,
            "messages": hashes,
            "expiry": expiry_ms,
        }))?;
        if shorten {
            params.insert("shorten".into(), true.into());
        }
        if extend {
            params.insert("extend".into(), true.into());
        }
        attach_signature(
            &mut params,
            self.user_keys()?,
            &expire_verification_data(shorten, extend, expiry_ms, hashes),
        );
        let json = self
            .invoke(Method::Expire, &snode, Value::Object(params), Some(account_id))
            .await?;
        Ok(verify_member_results(&json, |member| {
            let updated = string_array(member.get("updated"));
            Some(format!("{}{}{}", account_id, hashes.concat(), updated.concat()).into_bytes())
        }))
    }

    /// Look up the expiry timestamps of stored messages, keyed by hash.
    pub async fn get_expiries(&self, hashes: Vec<String>) -> Result<HashMap<String, u64>, Error> {
        let account_id = self.user_keys()?.account_id();
        let mut hashes = hashes;
        if hashes.len() == 1 {
            hashes.push(GET_EXPIRIES_FILLER_HASH.to_owned());
        }
        self.with_retries(|| self.get_expiries_once(&account_id, &hashes)).await
    }

    async fn get_expiries_once(
        &self,
        account_id: &str,
        hashes: &[String],
    ) -> Result<HashMap<String, u64>, Error> {
        let snode = self.single_target_snode(account_id).await?;
        let timestamp = now_with_offset_ms();
        let mut params = as_object(json!({
            "pubkey": account_id,
            "messages": hashes,
            "timestamp": timestamp,
        }))?;
        attach_signature(
            &mut params,
            self.user_keys()?,
            &get_expiries_verification_data(timestamp, hashes),
        );
        let json = self
            .invoke(Method::GetExpiries, &snode, Value::Object(params), Some(account_id))
            .await?;
        let expiries = json
            .get("expiries")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::InvalidResponse("Missing expiries".into()))?;
        Ok(expiries
            .iter()
            .filter_map(|(hash, expiry)| Some((hash.clone(), expiry.as_u64()?)))
            .collect())
    }

    /// The snode's idea of the current time, in milliseconds.
    pub async fn get_network_time(&self, snode: &Snode) -> Result<u64, Error> {
        let json = self.invoke(Method::Info, snode, json!({}), None).await?;
        json.get("timestamp")
            .and_then(Value::as_u64)
            .ok_or_else(|| Error::InvalidResponse("Missing timestamp".into()))
    }

    /// Forward an RPC to the oxen daemon behind `snode`.
    pub async fn oxen_daemon_rpc(
        &self,
        snode: &Snode,
        endpoint: &str,
        params: Value,
    ) -> Result<Value, Error> {
        self.invoke(
            Method::OxenDaemonRpcCall,
            snode,
            json!({ "endpoint": endpoint, "params": params }),
            None,
        )
        .await
    }

    /// Run several sub-requests in one round trip. With `sequence` the
    /// snode stops at the first failing sub-request and the remaining ones
    /// are never executed.
    pub async fn batch(
        &self,
        snode: &Snode,
        public_key: &str,
        requests: &[SnodeBatchRequestInfo],
        sequence: bool,
    ) -> Result<Value, Error> {
        let method = if sequence { Method::Sequence } else { Method::Batch };
        let wire: Vec<Value> = requests.iter().map(SnodeBatchRequestInfo::to_wire).collect();
        let json = self
            .invoke(method, snode, json!({ "requests": wire }), Some(public_key))
            .await?;
        self.handle_batch_response(snode, public_key, &json).await;
        Ok(json)
    }

    /// Sub-responses carry their own status codes; failed ones feed the
    /// same snode error classification a direct request would.
    async fn handle_batch_response(&self, snode: &Snode, public_key: &str, json: &Value) {
        let results = match json.get("results").and_then(Value::as_array) {
            Some(results) => results,
            None => return,
        };
        for result in results {
            let code = result.get("code").and_then(Value::as_u64).unwrap_or(200) as u16;
            if !(200..300).contains(&code) {
                debug!("Batch sub-request failed with status {}.", code);
                self.directory
                    .handle_snode_error(code, result.get("body"), snode, Some(public_key))
                    .await;
            }
        }
    }
}

/// One sub-response of a `batch` or `sequence` call.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BatchSubResponse {
    pub code: u16,
    pub body: Value,
}

/// Split a batch response into its sub-responses, in request order. A
/// `sequence` stops executing at the first failing sub-request, so
/// anything listed past a failure was never executed and is dropped.
pub fn parse_batch_results(json: &Value, sequence: bool) -> Vec<BatchSubResponse> {
    let results = match json.get("results").and_then(Value::as_array) {
        Some(results) => results,
        None => return Vec::new(),
    };
    let mut parsed = Vec::with_capacity(results.len());
    for result in results {
        let code = result.get("code").and_then(Value::as_u64).unwrap_or(200) as u16;
        let body = result.get("body").cloned().unwrap_or(Value::Null);
        let failed = !(200..300).contains(&code);
        parsed.push(BatchSubResponse { code, body });
        if sequence && failed {
            break;
        }
    }
    parsed
}

/// Hashes deleted across all namespaces, sorted. A `delete_all` groups
/// them per namespace; members sign over the flattened sorted list.
fn flattened_hashes(value: Option<&Value>) -> Vec<String> {
    let mut hashes = match value {
        Some(Value::Object(namespaces)) => namespaces
            .values()
            .flat_map(|hashes| string_array(Some(hashes)))
            .collect(),
        other => string_array(other),
    };
    hashes.sort();
    hashes
}

/// Check each swarm member's confirmation signature in a `swarm` response
/// map. `message_for` builds the signed message from the member's entry.
fn verify_member_results(
    json: &Value,
    message_for: impl Fn(&Value) -> Option<Vec<u8>>,
) -> HashMap<String, bool> {
    let swarm = match json.get("swarm").and_then(Value::as_object) {
        Some(swarm) => swarm,
        None => return HashMap::new(),
    };
    swarm
        .iter()
        .map(|(snode_key, member)| {
            let failed = member.get("failed").and_then(Value::as_bool).unwrap_or(false);
            let valid = if failed {
                warn!(
                    "Swarm member {} failed with code {:?}: {:?}.",
                    snode_key,
                    member.get("code"),
                    member.get("reason"),
                );
                false
            } else {
                match (
                    message_for(member),
                    member.get("signature").and_then(Value::as_str),
                ) {
                    (Some(message), Some(signature)) => {
                        verify_swarm_member_signature(snode_key, &message, signature)
                    }
                    _ => false,
                }
            };
            (snode_key.clone(), valid)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::onion::path_manager::PathManager;
    use base64::engine::general_purpose::STANDARD as BASE64;
    use base64::Engine;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn client(store: Arc<NetworkTopologyStore>, keys: Option<IdentityKeys>) -> SwarmRpcClient {
        let http = reqwest::Client::new();
        let directory = Arc::new(SnodeDirectory::new(store.clone(), http.clone(), false));
        let paths = Arc::new(PathManager::new(store.clone(), directory.clone()));
        let requester = Arc::new(OnionRequester::new(
            store.clone(),
            directory.clone(),
            paths,
            http,
        ));
        SwarmRpcClient::new(store, directory, requester, keys)
    }

    fn in_memory_client() -> SwarmRpcClient {
        client(Arc::new(NetworkTopologyStore::in_memory()), Some(IdentityKeys::generate()))
    }

    #[tokio::test(start_paused = true)]
    async fn retries_exhaust_and_rethrow_last_error() {
        let client = in_memory_client();
        let attempts = AtomicUsize::new(0);
        let result: Result<(), Error> = client
            .with_retries(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::Transport { status: 502, info: None }) }
            })
            .await;
        assert_eq!(attempts.load(Ordering::SeqCst), MAX_RETRY_COUNT);
        assert!(matches!(result, Err(Error::Transport { status: 502, .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn non_retryable_errors_stop_immediately() {
        let client = in_memory_client();
        let attempts = AtomicUsize::new(0);
        let result: Result<(), Error> = client
            .with_retries(|| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Err(Error::ClockOutOfSync) }
            })
            .await;
        assert_eq!(attempts.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(Error::ClockOutOfSync)));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_pass_success_through() {
        let client = in_memory_client();
        let attempts = AtomicUsize::new(0);
        let result = client
            .with_retries(|| {
                let attempt = attempts.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(Error::Generic)
                    } else {
                        Ok(42)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(attempts.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn signed_ops_need_a_key_pair() {
        let client = client(Arc::new(NetworkTopologyStore::in_memory()), None);
        assert!(matches!(
            client.delete_all_messages().await,
            Err(Error::NoKeyPair)
        ));
        assert!(matches!(
            client.delete_messages(vec!["h1".into()]).await,
            Err(Error::NoKeyPair)
        ));
    }

    #[tokio::test]
    async fn batch_sub_response_421_updates_swarm() {
        let store = Arc::new(NetworkTopologyStore::in_memory());
        let client = client(store.clone(), Some(IdentityKeys::generate()));
        let member = crate::onion::path::tests::test_snode(1);
        store.set_swarm("05aa", [member.clone()].into()).await;

        let json = json!({
            "results": [
                { "code": 200, "body": {} },
                {
                    "code": 421,
                    "body": {
                        "snodes": [{
                            "ip": "9.9.9.9",
                            "port": "22021",
                            "pubkey_ed25519": "ee".repeat(32),
                            "pubkey_x25519": "ff".repeat(32),
                        }],
                    },
                },
            ],
        });
        client.handle_batch_response(&member, "05aa", &json).await;
        let swarm = store.swarm("05aa").await.unwrap();
        assert!(!swarm.contains(&member));
        assert_eq!(swarm.len(), 1);
    }

    #[test]
    fn member_signatures_verify_against_member_key() {
        let member_keys = IdentityKeys::generate();
        let member_hex = member_keys.ed25519_public_key_hex();
        let account_id = "05aa";
        let request_hashes = vec!["h1".to_owned(), "h2".to_owned()];
        let deleted = vec!["h1".to_owned()];
        let message = format!("{}{}{}", account_id, request_hashes.concat(), deleted.concat());
        let signature = BASE64.encode(member_keys.sign(message.as_bytes()));

        let json = json!({
            "swarm": {
                (member_hex.clone()): { "deleted": deleted, "signature": signature.clone() },
                ("aa".repeat(32)): { "failed": true, "code": 500, "reason": "overloaded" },
            },
        });
        let results = verify_member_results(&json, |member| {
            let deleted = string_array(member.get("deleted"));
            Some(format!("{}{}{}", account_id, request_hashes.concat(), deleted.concat()).into_bytes())
        });
        assert_eq!(results.get(&member_hex), Some(&true));
        assert_eq!(results.get(&"aa".repeat(32)), Some(&false));

        // A forged deletion list fails verification.
        let forged = json!({
            "swarm": {
                (member_hex.clone()): { "deleted": ["h2"], "signature": signature },
            },
        });
        let results = verify_member_results(&forged, |member| {
            let deleted = string_array(member.get("deleted"));
            Some(format!("{}{}{}", account_id, request_hashes.concat(), deleted.concat()).into_bytes())
        });
        assert_eq!(results.get(&member_hex), Some(&false));
    }

    #[test]
    fn delete_all_confirmation_flattens_namespaced_hashes() {
        let member_keys = IdentityKeys::generate();
        let member_hex = member_keys.ed25519_public_key_hex();
        let account_id = "05aa";
        let timestamp: u64 = 1_700_000_000_000;
        // Members sign over the per-namespace hashes flattened and sorted.
        let signed = format!("{}{}{}", account_id, timestamp, "h1h2h3");
        let signature = BASE64.encode(member_keys.sign(signed.as_bytes()));

        let json = json!({
            "swarm": {
                (member_hex.clone()): {
                    "deleted": { "0": ["h3", "h1"], "5": ["h2"] },
                    "signature": signature,
                },
            },
        });
        let results = verify_member_results(&json, |member| {
            let deleted = flattened_hashes(member.get("deleted"));
            Some(format!("{}{}{}", account_id, timestamp, deleted.concat()).into_bytes())
        });
        assert_eq!(results.get(&member_hex), Some(&true));

        // The plain list form still verifies.
        assert_eq!(
            flattened_hashes(Some(&json!(["h3", "h1", "h2"]))),
            vec!["h1".to_owned(), "h2".to_owned(), "h3".to_owned()]
        );
    }

    #[test]
    fn sequence_results_stop_at_the_first_failure() {
        let json = json!({
            "results": [
                { "code": 401, "body": { "reason": "bad signature" } },
                { "code": 200, "body": {} },
            ],
        });
        let sequence = parse_batch_results(&json, true);
        assert_eq!(sequence.len(), 1);
        assert_eq!(sequence[0].code, 401);

        // A plain batch runs everything regardless of failures.
        let batch = parse_batch_results(&json, false);
        assert_eq!(batch.len(), 2);
        assert_eq!(batch[1].code, 200);
    }

    #[test]
    fn single_hash_expiry_lookup_gets_padded() {
        // The padding hash is the documented workaround length.
        assert_eq!(GET_EXPIRIES_FILLER_HASH.len(), 43);
    }
}
