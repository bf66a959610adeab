//! Transplant case state machine over a hash-chained event history
use crate::error::TransitionError;
use crate::ledger::{self, Signer, StatusEvent};
use crate::types::{CaseStatus, GeoPoint, TimeStamp};
use crate::utils::new_uuid_to_bech32;
use chrono::Utc;
use sled::Db;

/// One transplant lifecycle instance. The case owns its event sequence
/// exclusively; every transition appends through the ledger so the chain and
/// the state can never diverge. Terminal cases stay queryable but immutable.
// key is "case/" followed by the bech32 tracking id
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct TransplantCase {
    #[n(0)]
    pub tracking_id: String,
    #[n(1)]
    pub request_id: String,
    #[n(2)]
    pub donor_id: String,
    #[n(3)]
    pub created_at: TimeStamp<Utc>,
    // appended to only through the transition methods below
    #[n(4)]
    pub(crate) events: Vec<StatusEvent>,
    #[n(5)]
    pub integrity_compromised: bool,
}

impl TransplantCase {
    /// Case creation, reachable only through `CaseRegistry::allocate` which
    /// holds the donor and request reservations.
    pub(crate) fn initiate(
        request_id: String,
        donor_id: String,
        actor: &str,
        signer: &dyn Signer,
    ) -> anyhow::Result<Self> {
        let tracking_id = new_uuid_to_bech32("case_")?;
        let mut events = vec![];

        ledger::append(
            &tracking_id,
            &mut events,
            CaseStatus::Initiated,
            actor,
            "Transplant case initiated",
            None,
            signer,
        )?;

        Ok(Self {
            tracking_id,
            request_id,
            donor_id,
            created_at: TimeStamp::new(),
            events,
            integrity_compromised: false,
        })
    }

    /// The recorded event sequence, oldest first.
    pub fn events(&self) -> &[StatusEvent] {
        &self.events
    }

    /// Derive the current status by walking the chain. The first terminal
    /// event wins; anything recorded after it is ignored.
    pub fn current_status(&self) -> CaseStatus {
        let mut status = CaseStatus::Initiated;

        for event in &self.events {
            status = event.status;
            if status.is_terminal() {
                break;
            }
        }

        status
    }

    fn guard(&self, legal_from: &[CaseStatus], action: &'static str) -> Result<(), TransitionError> {
        if self.integrity_compromised {
            return Err(TransitionError::IntegrityCompromised(
                self.tracking_id.clone(),
            ));
        }

        let current = self.current_status();
        if !legal_from.contains(&current) {
            return Err(TransitionError::InvalidTransition {
                from: current,
                action,
            });
        }
        Ok(())
    }

    /// Organ recovery done; legal only from `Initiated`.
    pub fn record_recovery(
        &mut self,
        actor: &str,
        notes: &str,
        location: Option<GeoPoint>,
        signer: &dyn Signer,
    ) -> anyhow::Result<StatusEvent> {
        self.guard(&[CaseStatus::Initiated], "record_recovery")?;

        ledger::append(
            &self.tracking_id,
            &mut self.events,
            CaseStatus::RecoveryCompleted,
            actor,
            notes,
            location,
            signer,
        )
    }

    /// Transplant completed; legal only from `RecoveryCompleted`. Terminal.
    pub fn record_completion(
        &mut self,
        actor: &str,
        notes: &str,
        location: Option<GeoPoint>,
        signer: &dyn Signer,
    ) -> anyhow::Result<StatusEvent> {
        self.guard(&[CaseStatus::RecoveryCompleted], "record_completion")?;

        ledger::append(
            &self.tracking_id,
            &mut self.events,
            CaseStatus::Completed,
            actor,
            notes,
            location,
            signer,
        )
    }

    /// Abort the case; legal from `Initiated` or `RecoveryCompleted`, never
    /// from `Completed`. Terminal.
    pub fn cancel(
        &mut self,
        actor: &str,
        reason: &str,
        signer: &dyn Signer,
    ) -> anyhow::Result<StatusEvent> {
        self.guard(
            &[CaseStatus::Initiated, CaseStatus::RecoveryCompleted],
            "cancel",
        )?;

        ledger::append(
            &self.tracking_id,
            &mut self.events,
            CaseStatus::Cancelled,
            actor,
            reason,
            None,
            signer,
        )
    }

    /// Recompute every hash and link in the chain.
    pub fn verify(&self) -> bool {
        ledger::verify(&self.tracking_id, &self.events)
    }

    pub fn db_key(tracking_id: &str) -> Vec<u8> {
        format!("case/{tracking_id}").into_bytes()
    }

    pub fn serialize_with_hash(&self) -> anyhow::Result<(String, Vec<u8>)> {
        let cbor = minicbor::to_vec(self)?;
        let hash = sha256::digest(cbor.as_slice());
        Ok((hash, cbor))
    }

    pub fn save_to_db(&self, db: &Db) -> anyhow::Result<()> {
        db.insert(Self::db_key(&self.tracking_id), minicbor::to_vec(self)?)?;
        Ok(())
    }

    pub fn load_from_db(db: &Db, tracking_id: &str) -> anyhow::Result<Self> {
        let bytes = db
            .get(Self::db_key(tracking_id))?
            .ok_or_else(|| TransitionError::UnknownCase(tracking_id.to_string()))?;
        Ok(minicbor::decode(&bytes)?)
    }

}

/// Renders the audit trail, signatures hex-encoded. Callers decide where the
/// text goes; the library itself never writes to stdout.
impl std::fmt::Display for TransplantCase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "Case {} ({} events)", self.tracking_id, self.events.len())?;
        for event in &self.events {
            writeln!(
                f,
                "  #{} {} by {} at {:?}",
                event.seq,
                event.status.label(),
                event.actor,
                event.timestamp
            )?;
            if !event.notes.is_empty() {
                writeln!(f, "     notes: {}", event.notes)?;
            }
            if let Some(location) = &event.location {
                writeln!(f, "     location: {}, {}", location.lat, location.lng)?;
            }
            writeln!(f, "     hash: {}", event.content_hash)?;
            writeln!(f, "     prev: {}", event.previous_hash)?;
            for signature in &event.signatures {
                writeln!(f, "     sig:  {}", hex::encode(signature))?;
            }
        }
        Ok(())
    }
}
