//! Monthly loan-cycle ledger
//!
//! `calculator` holds the roll-forward arithmetic, `model` the record type and
//! its draft/finalized state machine, and `service` the month initializer,
//! record editing, finalization and period-wide refreshes.

pub mod calculator;
pub mod model;
pub mod service;

use thiserror::Error;

pub use calculator::{available_loan_amount, LedgerInputs, LedgerTotals, DEFAULT_CREDIT_CEILING};
pub use model::*;
pub use service::LedgerService;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LedgerError {
    #[error("{field} must not be negative")]
    NegativeAmount { field: &'static str },

    #[error("Amount out of range")]
    Overflow,

    #[error("Record is finalized and can no longer be changed")]
    Finalized,

    #[error("Record was modified by another session (expected version {expected}, found {actual}); reload and retry")]
    StaleVersion { expected: i32, actual: i32 },
}
