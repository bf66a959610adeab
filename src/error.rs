use crate::types::{CaseStatus, RequestStatus};

/// Input rejected before any state change.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum ValidationError {
    #[error("Criticality score {0} is outside the accepted range 1-10")]
    CriticalityOutOfRange(u8),
    #[error("Health score {0} is outside the accepted range 0-100")]
    HealthScoreOutOfRange(u8),
    #[error("Donor age {0} is not a plausible age")]
    ImplausibleAge(u8),
    #[error("Donor has pledged no organs")]
    EmptyPledge,
    #[error("{0} is not set")]
    MissingField(&'static str),
    #[error("Actor identity is empty")]
    EmptyActor,
}

/// Rejected workflow moves and allocation races.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum TransitionError {
    #[error("'{action}' is not legal from case status {from:?}")]
    InvalidTransition { from: CaseStatus, action: &'static str },
    #[error("Request cannot move from {from:?} to {to:?}")]
    InvalidRequestTransition { from: RequestStatus, to: RequestStatus },
    #[error("Allocation conflict: {0} is already reserved")]
    Conflict(String),
    #[error("Case {0} failed ledger verification and refuses further updates")]
    IntegrityCompromised(String),
    #[error("No request found under id {0}")]
    UnknownRequest(String),
    #[error("No donor found under id {0}")]
    UnknownDonor(String),
    #[error("No case found under tracking id {0}")]
    UnknownCase(String),
}
