//! Organ request record and boundary validation
use crate::error::{TransitionError, ValidationError};
use crate::types::{BloodType, OrganType, RequestStatus, TimeStamp};
use crate::utils::new_uuid_to_bech32;
use chrono::Utc;
use sled::Db;

/// Draft used to construct a request. Fields are validated once on
/// [`OrganRequestDraft::finalise`]; the resulting [`OrganRequest`] is never
/// re-validated internally.
#[derive(Debug, Default)]
pub struct OrganRequestDraft {
    patient_id: Option<String>,
    organ: Option<OrganType>,
    blood_type: Option<BloodType>,
    criticality: u8,
}

impl OrganRequestDraft {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_patient_id(mut self, patient_id: String) -> Self {
        self.patient_id = Some(patient_id);
        self
    }
    pub fn set_organ(mut self, organ: OrganType) -> Self {
        self.organ = Some(organ);
        self
    }
    pub fn set_blood_type(mut self, blood_type: BloodType) -> Self {
        self.blood_type = Some(blood_type);
        self
    }
    pub fn set_criticality(mut self, criticality: u8) -> Self {
        self.criticality = criticality;
        self
    }

    /// Checks every field and mints a request id. Rejects before any state
    /// change on bad input.
    pub fn finalise(self) -> anyhow::Result<OrganRequest> {
        let patient_id = self
            .patient_id
            .ok_or(ValidationError::MissingField("patient_id"))?;
        let organ = self.organ.ok_or(ValidationError::MissingField("organ"))?;
        let blood_type = self
            .blood_type
            .ok_or(ValidationError::MissingField("blood_type"))?;

        if !(1..=10).contains(&self.criticality) {
            return Err(ValidationError::CriticalityOutOfRange(self.criticality).into());
        }

        Ok(OrganRequest {
            request_id: new_uuid_to_bech32("req_")?,
            patient_id,
            organ,
            blood_type,
            criticality: self.criticality,
            status: RequestStatus::Pending,
            created_at: TimeStamp::new(),
        })
    }
}

// key is "request/" followed by the bech32 request id
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq)]
pub struct OrganRequest {
    #[n(0)]
    pub request_id: String,
    #[n(1)]
    pub patient_id: String,
    #[n(2)]
    pub organ: OrganType,
    #[n(3)]
    pub blood_type: BloodType,
    #[n(4)]
    pub criticality: u8,
    #[n(5)]
    pub status: RequestStatus,
    #[n(6)]
    pub created_at: TimeStamp<Utc>,
}

impl OrganRequest {
    pub fn db_key(request_id: &str) -> Vec<u8> {
        format!("request/{request_id}").into_bytes()
    }

    /// Step the status strictly forward. Reopening after a cancelled case is
    /// the registry's exception and goes through [`OrganRequest::reopen`].
    pub fn advance(&mut self, to: RequestStatus) -> Result<(), TransitionError> {
        let legal = matches!(
            (self.status, to),
            (RequestStatus::Pending, RequestStatus::Matched)
                | (RequestStatus::Matched, RequestStatus::Allocated)
                | (RequestStatus::Allocated, RequestStatus::Closed)
        );
        if !legal {
            return Err(TransitionError::InvalidRequestTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Cancellation path: an allocated request goes back into the matching
    /// pool, to Matched or Pending per registry policy.
    pub fn reopen(&mut self, to: RequestStatus) -> Result<(), TransitionError> {
        let legal = self.status == RequestStatus::Allocated
            && matches!(to, RequestStatus::Matched | RequestStatus::Pending);
        if !legal {
            return Err(TransitionError::InvalidRequestTransition {
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    pub fn save_to_db(&self, db: &Db) -> anyhow::Result<()> {
        db.insert(Self::db_key(&self.request_id), minicbor::to_vec(self)?)?;
        Ok(())
    }

    pub fn load_from_db(db: &Db, request_id: &str) -> anyhow::Result<Self> {
        let bytes = db
            .get(Self::db_key(request_id))?
            .ok_or_else(|| TransitionError::UnknownRequest(request_id.to_string()))?;
        Ok(minicbor::decode(&bytes)?)
    }
}
