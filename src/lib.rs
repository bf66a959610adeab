//! Core of an organ-transplant tracking service: request intake, ranked
//! donor matching, case lifecycle and a hash-chained audit trail.

pub mod case;
pub mod donor;
pub mod error;
pub mod ledger;
pub mod matching;
pub mod registry;
pub mod request;
pub mod types;
pub mod utils;
