//! Monthly roll-forward arithmetic
//!
//! Pure functions: an opening balance plus the month's events produce the
//! closing balance, income figures and remaining credit. Nothing here touches
//! the database.

use serde::{Deserialize, Serialize};

use super::LedgerError;

/// Ceiling used when no system setting overrides it.
pub const DEFAULT_CREDIT_CEILING: i64 = 400_000;

/// Events recorded against one member for one period.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerInputs {
    pub opening_outstanding: i64,
    pub monthly_subscription: i64,
    pub interest_paid: i64,
    pub principal_paid: i64,
    pub new_loan_taken: i64,
    pub penalty: i64,
    pub additional_principal: i64,
}

/// Derived fields written back onto the monthly record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LedgerTotals {
    pub closing_outstanding: i64,
    pub total_monthly_income: i64,
    pub installment_income: i64,
    pub available_loan_amount: i64,
}

impl LedgerInputs {
    /// Reject negative event amounts, naming the first offending field.
    ///
    /// The opening balance is not an event: it carries the previous closing,
    /// which goes negative when a member overpays.
    pub fn validate(&self) -> Result<(), LedgerError> {
        let fields = [
            ("monthly_subscription", self.monthly_subscription),
            ("interest_paid", self.interest_paid),
            ("principal_paid", self.principal_paid),
            ("new_loan_taken", self.new_loan_taken),
            ("penalty", self.penalty),
            ("additional_principal", self.additional_principal),
        ];
        match fields.iter().find(|(_, amount)| *amount < 0) {
            Some((field, _)) => Err(LedgerError::NegativeAmount { field }),
            None => Ok(()),
        }
    }

    /// closing = opening + new loan - principal - additional principal
    pub fn closing_outstanding(&self) -> Result<i64, LedgerError> {
        self.opening_outstanding
            .checked_add(self.new_loan_taken)
            .and_then(|v| v.checked_sub(self.principal_paid))
            .and_then(|v| v.checked_sub(self.additional_principal))
            .ok_or(LedgerError::Overflow)
    }

    /// income = subscription + interest + principal + penalty
    pub fn total_monthly_income(&self) -> Result<i64, LedgerError> {
        self.monthly_subscription
            .checked_add(self.interest_paid)
            .and_then(|v| v.checked_add(self.principal_paid))
            .and_then(|v| v.checked_add(self.penalty))
            .ok_or(LedgerError::Overflow)
    }

    pub fn installment_income(&self) -> Result<i64, LedgerError> {
        self.interest_paid
            .checked_add(self.principal_paid)
            .ok_or(LedgerError::Overflow)
    }

    /// Roll the period forward against `credit_limit`.
    pub fn roll_forward(&self, credit_limit: i64) -> Result<LedgerTotals, LedgerError> {
        self.validate()?;

        let closing_outstanding = self.closing_outstanding()?;
        Ok(LedgerTotals {
            closing_outstanding,
            total_monthly_income: self.total_monthly_income()?,
            installment_income: self.installment_income()?,
            available_loan_amount: available_loan_amount(credit_limit, closing_outstanding)?,
        })
    }
}

/// Credit still open to a member: `limit - outstanding`, never below zero.
///
/// This is the single definition used by ledger records and cash bills. An
/// overpaid member (negative outstanding) can exceed the limit.
pub fn available_loan_amount(credit_limit: i64, outstanding: i64) -> Result<i64, LedgerError> {
    credit_limit
        .checked_sub(outstanding)
        .map(|v| v.max(0))
        .ok_or(LedgerError::Overflow)
}
