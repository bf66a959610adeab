//! Hash-chained status event log: append and verify
//!
//! The ledger owns no domain data. It is a pure append/verify service over a
//! case's event chain: every event carries a sha256 content hash over its
//! CBOR encoding and a link to the previous event's hash, so any later edit
//! to a stored event breaks verification.
use crate::error::ValidationError;
use crate::types::{CaseStatus, GeoPoint, TimeStamp};
use chrono::Utc;

/// Sentinel `previous_hash` for the first event of every case.
pub const GENESIS_HASH: &str = "0000000000000000000000000000000000000000000000000000000000000000";

/// Produces opaque signature blobs over event content hashes. The ledger
/// stores signatures but never creates them itself.
///
/// Implementations must bound the call (the caller's timeout applies here).
/// Append signs before staging anything, so a signer failure or timeout
/// leaves no partial event behind.
pub trait Signer: Send + Sync {
    fn sign(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>>;
}

/// Deterministic stand-in signer keyed by a shared secret. Suitable for
/// tests and single-node deployments; swap in a real key store otherwise.
pub struct DigestSigner {
    secret: Vec<u8>,
}

impl DigestSigner {
    pub fn new(secret: impl Into<Vec<u8>>) -> Self {
        Self {
            secret: secret.into(),
        }
    }
}

impl Signer for DigestSigner {
    fn sign(&self, payload: &[u8]) -> anyhow::Result<Vec<u8>> {
        let mut input = self.secret.clone();
        input.extend_from_slice(payload);
        Ok(sha256::digest(input.as_slice()).into_bytes())
    }
}

/// One link in a case's audit chain.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct StatusEvent {
    #[n(0)]
    pub seq: u64,
    #[n(1)]
    pub status: CaseStatus,
    #[n(2)]
    pub timestamp: TimeStamp<Utc>,
    #[n(3)]
    pub actor: String,
    #[n(4)]
    pub notes: String,
    #[n(5)]
    pub location: Option<GeoPoint>,
    #[n(6)]
    pub content_hash: String,
    #[n(7)]
    pub previous_hash: String,
    #[n(8)]
    pub signatures: Vec<Vec<u8>>,
}

// The digest deliberately excludes content_hash, previous_hash and
// signatures so verification can recompute it from stored fields alone.
#[derive(minicbor::Encode)]
struct EventDigest<'a> {
    #[n(0)]
    case_id: &'a str,
    #[n(1)]
    seq: u64,
    #[n(2)]
    status: CaseStatus,
    #[n(3)]
    timestamp: &'a TimeStamp<Utc>,
    #[n(4)]
    actor: &'a str,
    #[n(5)]
    notes: &'a str,
    #[n(6)]
    location: Option<&'a GeoPoint>,
}

fn content_hash(
    case_id: &str,
    seq: u64,
    status: CaseStatus,
    timestamp: &TimeStamp<Utc>,
    actor: &str,
    notes: &str,
    location: Option<&GeoPoint>,
) -> anyhow::Result<String> {
    let digest = EventDigest {
        case_id,
        seq,
        status,
        timestamp,
        actor,
        notes,
        location,
    };
    let cbor = minicbor::to_vec(&digest)?;
    Ok(sha256::digest(cbor.as_slice()))
}

/// Append a new event to `chain`. Sequence numbers are 0-based and
/// contiguous; the link points at the prior event's content hash or
/// [`GENESIS_HASH`] for the first event. Sole mutator of chain state.
pub fn append(
    case_id: &str,
    chain: &mut Vec<StatusEvent>,
    status: CaseStatus,
    actor: &str,
    notes: &str,
    location: Option<GeoPoint>,
    signer: &dyn Signer,
) -> anyhow::Result<StatusEvent> {
    if actor.trim().is_empty() {
        return Err(ValidationError::EmptyActor.into());
    }

    let seq = chain.len() as u64;
    let previous_hash = chain
        .last()
        .map(|event| event.content_hash.clone())
        .unwrap_or_else(|| GENESIS_HASH.to_string());

    let timestamp = TimeStamp::new();
    let content_hash = content_hash(
        case_id,
        seq,
        status,
        &timestamp,
        actor,
        notes,
        location.as_ref(),
    )?;

    // Sign before anything is staged: all-or-nothing append.
    let signature = signer.sign(content_hash.as_bytes())?;

    let event = StatusEvent {
        seq,
        status,
        timestamp,
        actor: actor.to_string(),
        notes: notes.to_string(),
        location,
        content_hash,
        previous_hash,
        signatures: vec![signature],
    };

    chain.push(event.clone());
    Ok(event)
}

/// Walk the chain and recompute every content hash and link. Fails closed on
/// the first mismatch and never repairs a broken chain.
pub fn verify(case_id: &str, chain: &[StatusEvent]) -> bool {
    let mut expected_previous = GENESIS_HASH.to_string();

    for (index, event) in chain.iter().enumerate() {
        if event.seq != index as u64 {
            return false;
        }
        if event.previous_hash != expected_previous {
            return false;
        }

        let recomputed = match content_hash(
            case_id,
            event.seq,
            event.status,
            &event.timestamp,
            &event.actor,
            &event.notes,
            event.location.as_ref(),
        ) {
            Ok(hash) => hash,
            Err(_) => return false,
        };

        if recomputed != event.content_hash {
            return false;
        }

        expected_previous = event.content_hash.clone();
    }

    true
}
