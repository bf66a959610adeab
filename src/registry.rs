//! Service layer API for the transplant workflow
//!
//! The registry is the sole arbiter of "a donor participates in at most one
//! open case" and "a request has at most one open case". Both are enforced
//! with a single compare-and-swap on a reservation key per id; losers of a
//! race get a conflict back and are expected to retry with refreshed match
//! data. Transitions of one case are serialized through a per-case lock
//! while unrelated cases proceed concurrently.
use crate::case::TransplantCase;
use crate::donor::{DonorCandidate, DonorCandidateDraft};
use crate::error::TransitionError;
use crate::ledger::{Signer, StatusEvent};
use crate::matching::{self, MatchResult, MatchWeights};
use crate::request::{OrganRequest, OrganRequestDraft};
use crate::types::{BloodType, GeoPoint, OrganType, RequestStatus};
use sled::Batch;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

pub struct CaseRegistry {
    instance: Arc<sled::Db>,
    weights: MatchWeights,
    signer: Arc<dyn Signer>,
    case_locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

fn donor_reservation_key(donor_id: &str) -> Vec<u8> {
    format!("reserve/donor/{donor_id}").into_bytes()
}

fn request_reservation_key(request_id: &str) -> Vec<u8> {
    format!("reserve/request/{request_id}").into_bytes()
}

impl CaseRegistry {
    pub fn new(instance: Arc<sled::Db>, weights: MatchWeights, signer: Arc<dyn Signer>) -> Self {
        Self {
            instance,
            weights,
            signer,
            case_locks: Mutex::new(HashMap::new()),
        }
    }

    fn case_lock(&self, tracking_id: &str) -> Arc<Mutex<()>> {
        let mut table = self
            .case_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.entry(tracking_id.to_string()).or_default().clone()
    }

    // Terminal cases never transition again, so their lock entries are
    // dropped instead of accumulating for the life of the registry.
    fn release_case_lock(&self, tracking_id: &str) {
        let mut table = self
            .case_locks
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        table.remove(tracking_id);
    }

    /// Validate and store a new organ request. Enters the pool as Pending.
    pub fn submit_request(&self, draft: OrganRequestDraft) -> anyhow::Result<OrganRequest> {
        let request = draft.finalise()?;
        request.save_to_db(&self.instance)?;
        Ok(request)
    }

    /// Validate and store a new donor pledge. Enters the pool as available.
    pub fn register_donor(&self, draft: DonorCandidateDraft) -> anyhow::Result<DonorCandidate> {
        let donor = draft.finalise()?;
        donor.save_to_db(&self.instance)?;
        Ok(donor)
    }

    pub fn lookup_request(&self, request_id: &str) -> anyhow::Result<OrganRequest> {
        OrganRequest::load_from_db(&self.instance, request_id)
    }

    pub fn lookup_donor(&self, donor_id: &str) -> anyhow::Result<DonorCandidate> {
        DonorCandidate::load_from_db(&self.instance, donor_id)
    }

    pub fn lookup_case(&self, tracking_id: &str) -> anyhow::Result<TransplantCase> {
        TransplantCase::load_from_db(&self.instance, tracking_id)
    }

    /// All requests currently in `status`, ordered by request id.
    pub fn requests_by_status(&self, status: RequestStatus) -> anyhow::Result<Vec<OrganRequest>> {
        let mut requests: Vec<OrganRequest> = self
            .scan_requests()?
            .into_iter()
            .filter(|request| request.status == status)
            .collect();
        requests.sort_by(|a, b| a.request_id.cmp(&b.request_id));
        Ok(requests)
    }

    fn scan_requests(&self) -> anyhow::Result<Vec<OrganRequest>> {
        let mut requests = vec![];
        for entry in self.instance.scan_prefix(b"request/") {
            let (_key, value) = entry?;
            requests.push(minicbor::decode(&value)?);
        }
        Ok(requests)
    }

    /// Donors currently available, pledging `organ` and blood-compatible
    /// with `blood`, ordered by donor id.
    pub fn eligible_donors(
        &self,
        organ: OrganType,
        blood: BloodType,
    ) -> anyhow::Result<Vec<DonorCandidate>> {
        let mut donors: Vec<DonorCandidate> = self
            .scan_donors()?
            .into_iter()
            .filter(|donor| donor.is_eligible_for(organ, blood))
            .collect();
        donors.sort_by(|a, b| a.donor_id.cmp(&b.donor_id));
        Ok(donors)
    }

    fn scan_donors(&self) -> anyhow::Result<Vec<DonorCandidate>> {
        let mut donors = vec![];
        for entry in self.instance.scan_prefix(b"donor/") {
            let (_key, value) = entry?;
            donors.push(minicbor::decode(&value)?);
        }
        Ok(donors)
    }

    /// Rank the currently-available pool against a request. A Pending
    /// request moves to Matched the first time candidates exist. Results are
    /// computed fresh on every call, never cached.
    pub fn matched_candidates(&self, request_id: &str) -> anyhow::Result<Vec<MatchResult>> {
        let key = OrganRequest::db_key(request_id);
        let stored = self
            .instance
            .get(&key)?
            .ok_or_else(|| TransitionError::UnknownRequest(request_id.to_string()))?;
        let mut request: OrganRequest = minicbor::decode(&stored)?;
        let pool = self.scan_donors()?;

        let results = matching::rank(&request, &pool, &self.weights);

        if request.status == RequestStatus::Pending && !results.is_empty() {
            request.advance(RequestStatus::Matched)?;
            // A concurrent allocate can move the record on while the pool is
            // being ranked; the swap only lands on the snapshot it ranked
            // against, so a stale Matched never overwrites a later status.
            let _ = self.instance.compare_and_swap(
                &key,
                Some(&stored),
                Some(minicbor::to_vec(&request)?),
            )?;
        }

        Ok(results)
    }

    /// Atomically reserve a donor for a request and open a case.
    ///
    /// Reservation order is donor first, then request; if the second
    /// compare-and-swap loses, the first is rolled back before the conflict
    /// is surfaced, so a failed allocate never leaves an orphaned
    /// reservation. The winner's case record, request status and donor
    /// availability land in one batch.
    pub fn allocate(
        &self,
        request_id: &str,
        donor_id: &str,
        actor: &str,
    ) -> anyhow::Result<TransplantCase> {
        let donor_key = donor_reservation_key(donor_id);
        let request_key = request_reservation_key(request_id);

        if self
            .instance
            .compare_and_swap(
                &donor_key,
                None as Option<&[u8]>,
                Some(request_id.as_bytes()),
            )?
            .is_err()
        {
            return Err(TransitionError::Conflict(donor_id.to_string()).into());
        }

        if self
            .instance
            .compare_and_swap(
                &request_key,
                None as Option<&[u8]>,
                Some(donor_id.as_bytes()),
            )?
            .is_err()
        {
            self.instance.remove(&donor_key)?;
            return Err(TransitionError::Conflict(request_id.to_string()).into());
        }

        // Both reservations held; everything below runs exclusively for this
        // (request, donor) pair. Any failure must hand the reservations back.
        match self.allocate_reserved(request_id, donor_id, actor) {
            Ok(case) => Ok(case),
            Err(err) => {
                self.instance.remove(&donor_key)?;
                self.instance.remove(&request_key)?;
                Err(err)
            }
        }
    }

    fn allocate_reserved(
        &self,
        request_id: &str,
        donor_id: &str,
        actor: &str,
    ) -> anyhow::Result<TransplantCase> {
        let mut request = self.lookup_request(request_id)?;
        let mut donor = self.lookup_donor(donor_id)?;

        if !donor.is_eligible_for(request.organ, request.blood_type) {
            return Err(TransitionError::Conflict(donor_id.to_string()).into());
        }

        // requires Matched status
        request.advance(RequestStatus::Allocated)?;
        donor.available = false;

        let case = TransplantCase::initiate(
            request_id.to_string(),
            donor_id.to_string(),
            actor,
            self.signer.as_ref(),
        )?;

        let mut batch = Batch::default();
        batch.insert(
            TransplantCase::db_key(&case.tracking_id),
            minicbor::to_vec(&case)?,
        );
        batch.insert(OrganRequest::db_key(request_id), minicbor::to_vec(&request)?);
        batch.insert(DonorCandidate::db_key(donor_id), minicbor::to_vec(&donor)?);
        self.instance.apply_batch(batch)?;

        Ok(case)
    }

    /// Record organ recovery on an open case.
    pub fn record_recovery(
        &self,
        tracking_id: &str,
        actor: &str,
        notes: &str,
        location: Option<GeoPoint>,
    ) -> anyhow::Result<TransplantCase> {
        let lock = self.case_lock(tracking_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut case = self.lookup_case(tracking_id)?;
        case.record_recovery(actor, notes, location, self.signer.as_ref())?;
        case.save_to_db(&self.instance)?;

        Ok(case)
    }

    /// Record transplant completion. Closes the request and releases the
    /// donor reservation permanently; the donor stays unavailable until a
    /// future pledge cycle.
    pub fn record_completion(
        &self,
        tracking_id: &str,
        actor: &str,
        notes: &str,
        location: Option<GeoPoint>,
    ) -> anyhow::Result<TransplantCase> {
        let lock = self.case_lock(tracking_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut case = self.lookup_case(tracking_id)?;
        case.record_completion(actor, notes, location, self.signer.as_ref())?;

        let mut request = self.lookup_request(&case.request_id)?;
        request.advance(RequestStatus::Closed)?;

        let mut batch = Batch::default();
        batch.insert(TransplantCase::db_key(tracking_id), minicbor::to_vec(&case)?);
        batch.insert(
            OrganRequest::db_key(&case.request_id),
            minicbor::to_vec(&request)?,
        );
        batch.remove(donor_reservation_key(&case.donor_id));
        batch.remove(request_reservation_key(&case.request_id));
        self.instance.apply_batch(batch)?;

        self.release_case_lock(tracking_id);
        Ok(case)
    }

    /// Cancel an open case. The donor returns to the available pool; the
    /// request reopens to Matched when another eligible candidate remains,
    /// otherwise to Pending.
    pub fn cancel(
        &self,
        tracking_id: &str,
        actor: &str,
        reason: &str,
    ) -> anyhow::Result<TransplantCase> {
        let lock = self.case_lock(tracking_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut case = self.lookup_case(tracking_id)?;
        case.cancel(actor, reason, self.signer.as_ref())?;

        let mut donor = self.lookup_donor(&case.donor_id)?;
        donor.available = true;

        let mut request = self.lookup_request(&case.request_id)?;
        let other_candidate_remains = self.scan_donors()?.iter().any(|candidate| {
            candidate.donor_id != donor.donor_id
                && candidate.is_eligible_for(request.organ, request.blood_type)
        });
        let reopened = if other_candidate_remains {
            RequestStatus::Matched
        } else {
            RequestStatus::Pending
        };
        request.reopen(reopened)?;

        let mut batch = Batch::default();
        batch.insert(TransplantCase::db_key(tracking_id), minicbor::to_vec(&case)?);
        batch.insert(
            DonorCandidate::db_key(&case.donor_id),
            minicbor::to_vec(&donor)?,
        );
        batch.insert(
            OrganRequest::db_key(&case.request_id),
            minicbor::to_vec(&request)?,
        );
        batch.remove(donor_reservation_key(&case.donor_id));
        batch.remove(request_reservation_key(&case.request_id));
        self.instance.apply_batch(batch)?;

        self.release_case_lock(tracking_id);
        Ok(case)
    }

    /// Full event sequence plus the ledger verdict. A failed verification
    /// flags the case as compromised; from then on every mutating operation
    /// is refused while reads stay open for forensic inspection.
    pub fn audit_trail(&self, tracking_id: &str) -> anyhow::Result<(Vec<StatusEvent>, bool)> {
        let lock = self.case_lock(tracking_id);
        let _guard = lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut case = self.lookup_case(tracking_id)?;
        let verified = case.verify();

        if !verified && !case.integrity_compromised {
            case.integrity_compromised = true;
            case.save_to_db(&self.instance)?;
        }

        Ok((case.events, verified))
    }
}
