//! Property-based tests for the hash-chained status log
//!
//! This module uses proptest to verify that the append/verify pair in the
//! ledger holds its integrity invariants across arbitrary event sequences.
//! The chain logic is critical - bugs here make the audit trail worthless.
//!
//! These tests cover:
//!
//! 1. Append then verify - a chain built through the sole mutator verifies
//! 2. Link contiguity - previous_hash always points at the prior event
//! 3. Tamper evidence - editing any stored field breaks verification
//! 4. Serialization correctness - critical for persistence
//!
//! What these tests DON'T cover (deliberately):
//!
//! - Database persistence (requires tempfile, covered in integration tests)
//! - Transition legality (enforced by the case state machine, not the chain)

use proptest::prelude::*;
use organtrace::{
    ledger::{self, DigestSigner, StatusEvent, GENESIS_HASH},
    types::{CaseStatus, GeoPoint},
};

/// Strategy to generate a status label. The ledger records whatever the
/// state machine hands it, so all four labels appear.
fn status_strategy() -> impl Strategy<Value = CaseStatus> {
    prop_oneof![
        Just(CaseStatus::Initiated),
        Just(CaseStatus::RecoveryCompleted),
        Just(CaseStatus::Completed),
        Just(CaseStatus::Cancelled),
    ]
}

/// Strategy to generate an optional geolocation
fn location_strategy() -> impl Strategy<Value = Option<GeoPoint>> {
    prop::option::of((-90.0f64..=90.0, -180.0f64..=180.0).prop_map(|(lat, lng)| GeoPoint { lat, lng }))
}

/// Strategy to generate the inputs of one append call
fn entry_strategy() -> impl Strategy<Value = (CaseStatus, String, String, Option<GeoPoint>)> {
    (
        status_strategy(),
        1u32..=9999,
        ".{0,40}",
        location_strategy(),
    )
        .prop_map(|(status, actor_num, notes, location)| {
            (status, format!("user_{actor_num}"), notes, location)
        })
}

/// Strategy to generate a chain of 1 to 10 appended events
fn chain_strategy() -> impl Strategy<Value = Vec<StatusEvent>> {
    prop::collection::vec(entry_strategy(), 1..=10).prop_map(|entries| {
        let signer = DigestSigner::new(b"prop-secret".to_vec());
        let mut chain = vec![];
        for (status, actor, notes, location) in entries {
            ledger::append(
                "case_prop",
                &mut chain,
                status,
                &actor,
                &notes,
                location,
                &signer,
            )
            .expect("append of valid input must succeed");
        }
        chain
    })
}

// PROPERTY TESTS
proptest! {
    /// Property: any chain built through append verifies, and verification
    /// is idempotent.
    #[test]
    fn prop_appended_chain_verifies(chain in chain_strategy()) {
        prop_assert!(ledger::verify("case_prop", &chain));
        prop_assert!(ledger::verify("case_prop", &chain));
    }

    /// Property: sequence numbers are 0-based and contiguous, and every link
    /// points at the prior event's content hash (genesis for the first).
    #[test]
    fn prop_links_are_contiguous(chain in chain_strategy()) {
        prop_assert_eq!(chain[0].seq, 0);
        prop_assert_eq!(&chain[0].previous_hash, GENESIS_HASH);

        for i in 1..chain.len() {
            prop_assert_eq!(chain[i].seq, i as u64);
            prop_assert_eq!(&chain[i].previous_hash, &chain[i - 1].content_hash);
        }
    }

    /// Property: mutating the notes of any stored event breaks verification.
    #[test]
    fn prop_tampered_notes_break_verification(
        chain in chain_strategy(),
        victim in any::<prop::sample::Index>(),
    ) {
        let mut tampered = chain.clone();
        let index = victim.index(tampered.len());
        tampered[index].notes.push_str("altered");

        prop_assert!(!ledger::verify("case_prop", &tampered));
    }

    /// Property: flipping the status of any stored event breaks verification.
    #[test]
    fn prop_tampered_status_breaks_verification(
        chain in chain_strategy(),
        victim in any::<prop::sample::Index>(),
    ) {
        let mut tampered = chain.clone();
        let index = victim.index(tampered.len());
        tampered[index].status = if tampered[index].status == CaseStatus::Cancelled {
            CaseStatus::Completed
        } else {
            CaseStatus::Cancelled
        };

        prop_assert!(!ledger::verify("case_prop", &tampered));
    }

    /// Property: dropping an interior event breaks the chain.
    #[test]
    fn prop_removed_event_breaks_verification(chain in chain_strategy()) {
        if chain.len() < 2 {
            return Ok(());
        }

        let mut truncated = chain.clone();
        truncated.remove(0);

        prop_assert!(!ledger::verify("case_prop", &truncated));
    }

    /// Property: CBOR round-trip preserves the chain and its verdict.
    #[test]
    fn prop_cbor_roundtrip_preserves_chain(chain in chain_strategy()) {
        let encoded = minicbor::to_vec(&chain).expect("encoding must succeed");
        let decoded: Vec<StatusEvent> =
            minicbor::decode(&encoded).expect("decoding must succeed");

        prop_assert_eq!(&chain, &decoded);
        prop_assert!(ledger::verify("case_prop", &decoded));
    }
}
