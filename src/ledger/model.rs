use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use super::calculator::{LedgerInputs, LedgerTotals};
use super::LedgerError;
use crate::period::PeriodKey;

/// Lifecycle of a monthly ledger line. `Finalized` is terminal.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "record_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Draft,
    Finalized,
}

impl RecordStatus {
    pub fn is_editable(&self) -> bool {
        matches!(self, RecordStatus::Draft)
    }

    /// `draft -> finalized`; every other transition is refused.
    pub fn finalize(self) -> Result<RecordStatus, LedgerError> {
        match self {
            RecordStatus::Draft => Ok(RecordStatus::Finalized),
            RecordStatus::Finalized => Err(LedgerError::Finalized),
        }
    }
}

/// Ledger line for one member for one period
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct MonthlyLoanRecord {
    pub id: Uuid,
    pub member_id: Uuid,
    pub period_key: String,
    pub opening_outstanding: i64,
    pub monthly_subscription: i64,
    pub new_loan_taken: i64,
    pub principal_paid: i64,
    pub interest_paid: i64,
    pub penalty: i64,
    pub additional_principal: i64,
    pub closing_outstanding: i64,
    pub total_monthly_income: i64,
    pub installment_income: i64,
    pub credit_limit: i64,
    pub available_loan_amount: i64,
    pub status: RecordStatus,
    pub version: i32,
    pub created_by: Option<Uuid>,
    pub finalized_by: Option<Uuid>,
    pub finalized_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonthlyLoanRecord {
    pub fn inputs(&self) -> LedgerInputs {
        LedgerInputs {
            opening_outstanding: self.opening_outstanding,
            monthly_subscription: self.monthly_subscription,
            interest_paid: self.interest_paid,
            principal_paid: self.principal_paid,
            new_loan_taken: self.new_loan_taken,
            penalty: self.penalty,
            additional_principal: self.additional_principal,
        }
    }

    pub fn ensure_editable(&self) -> Result<(), LedgerError> {
        if self.status.is_editable() {
            Ok(())
        } else {
            Err(LedgerError::Finalized)
        }
    }

    /// Check a caller's version against the stored one before writing.
    pub fn ensure_version(&self, expected: i32) -> Result<(), LedgerError> {
        if self.version == expected {
            Ok(())
        } else {
            Err(LedgerError::StaleVersion {
                expected,
                actual: self.version,
            })
        }
    }

    /// Merge a patch into this record's events and recompute. Fails on a
    /// finalized record so callers never build a write for one.
    pub fn recompute(
        &self,
        patch: &RecordPatch,
        credit_limit: i64,
    ) -> Result<(LedgerInputs, LedgerTotals), LedgerError> {
        self.ensure_editable()?;
        let inputs = patch.apply(self.inputs());
        let totals = inputs.roll_forward(credit_limit)?;
        Ok((inputs, totals))
    }
}

/// Record joined with the owning member's display fields
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct RecordWithMember {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub record: MonthlyLoanRecord,
    pub member_code: String,
    pub full_name: String,
}

/// Editable event fields. Opening balance and derived fields are not
/// client-settable.
#[derive(Debug, Clone, Default, Deserialize, Validate)]
pub struct RecordPatch {
    #[validate(range(min = 0))]
    pub monthly_subscription: Option<i64>,
    #[validate(range(min = 0))]
    pub interest_paid: Option<i64>,
    #[validate(range(min = 0))]
    pub principal_paid: Option<i64>,
    #[validate(range(min = 0))]
    pub new_loan_taken: Option<i64>,
    #[validate(range(min = 0))]
    pub penalty: Option<i64>,
    #[validate(range(min = 0))]
    pub additional_principal: Option<i64>,
}

impl RecordPatch {
    pub fn apply(&self, base: LedgerInputs) -> LedgerInputs {
        LedgerInputs {
            opening_outstanding: base.opening_outstanding,
            monthly_subscription: self.monthly_subscription.unwrap_or(base.monthly_subscription),
            interest_paid: self.interest_paid.unwrap_or(base.interest_paid),
            principal_paid: self.principal_paid.unwrap_or(base.principal_paid),
            new_loan_taken: self.new_loan_taken.unwrap_or(base.new_loan_taken),
            penalty: self.penalty.unwrap_or(base.penalty),
            additional_principal: self.additional_principal.unwrap_or(base.additional_principal),
        }
    }
}

/// PATCH /api/records/:id body
#[derive(Debug, Deserialize, Validate)]
pub struct UpdateRecordRequest {
    pub expected_version: i32,
    #[serde(flatten)]
    #[validate]
    pub changes: RecordPatch,
}

#[derive(Debug, Deserialize)]
pub struct InitializeMonthRequest {
    pub period_key: PeriodKey,
}

#[derive(Debug, Serialize)]
pub struct InitializeMonthResponse {
    pub success: bool,
    pub period_key: PeriodKey,
    pub records_created: u64,
}

#[derive(Debug, Serialize)]
pub struct RefreshResponse {
    pub period_key: PeriodKey,
    pub records_refreshed: u64,
}

/// POST /api/admin/bulk-update-settings body
#[derive(Debug, Deserialize, Validate)]
pub struct BulkUpdateRequest {
    pub period_key: PeriodKey,
    pub member_ids: Option<Vec<Uuid>>,
    #[validate(range(min = 0))]
    pub monthly_subscription: Option<i64>,
    #[validate(range(min = 0))]
    pub credit_limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct BulkUpdateResponse {
    pub period_key: PeriodKey,
    pub records_updated: u64,
    pub records_skipped_finalized: u64,
}

#[derive(Debug, Deserialize)]
pub struct RecordFilter {
    pub member_id: Option<Uuid>,
    pub status: Option<RecordStatus>,
}

/// Row of the `monthly_cycle_summary` view
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct PeriodSummary {
    pub period_key: String,
    pub record_count: i64,
    pub draft_count: i64,
    pub finalized_count: i64,
    pub total_opening_outstanding: i64,
    pub total_closing_outstanding: i64,
    pub total_subscription: i64,
    pub total_interest: i64,
    pub total_principal: i64,
    pub total_penalty: i64,
    pub total_new_loans: i64,
    pub total_income: i64,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::DEFAULT_CREDIT_CEILING;

    fn draft_record() -> MonthlyLoanRecord {
        MonthlyLoanRecord {
            id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            period_key: "2024-02".to_string(),
            opening_outstanding: 10_000,
            monthly_subscription: 1_000,
            new_loan_taken: 0,
            principal_paid: 0,
            interest_paid: 0,
            penalty: 0,
            additional_principal: 0,
            closing_outstanding: 10_000,
            total_monthly_income: 1_000,
            installment_income: 0,
            credit_limit: DEFAULT_CREDIT_CEILING,
            available_loan_amount: 390_000,
            status: RecordStatus::Draft,
            version: 0,
            created_by: None,
            finalized_by: None,
            finalized_at: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_status_transitions() {
        assert_eq!(RecordStatus::Draft.finalize(), Ok(RecordStatus::Finalized));
        assert_eq!(RecordStatus::Finalized.finalize(), Err(LedgerError::Finalized));
        assert!(RecordStatus::Draft.is_editable());
        assert!(!RecordStatus::Finalized.is_editable());
    }

    #[test]
    fn test_patch_keeps_unspecified_fields_and_opening() {
        let record = draft_record();
        let patch = RecordPatch {
            principal_paid: Some(2_000),
            ..Default::default()
        };
        let (inputs, totals) = record.recompute(&patch, record.credit_limit).unwrap();
        assert_eq!(inputs.opening_outstanding, 10_000);
        assert_eq!(inputs.monthly_subscription, 1_000);
        assert_eq!(totals.closing_outstanding, 8_000);
        assert_eq!(totals.total_monthly_income, 3_000);
    }

    #[test]
    fn test_finalized_record_refuses_recompute() {
        let mut record = draft_record();
        record.status = RecordStatus::Finalized;
        let before = record.clone();
        let patch = RecordPatch {
            penalty: Some(500),
            ..Default::default()
        };
        assert_eq!(
            record.recompute(&patch, DEFAULT_CREDIT_CEILING),
            Err(LedgerError::Finalized)
        );
        assert_eq!(record, before);
    }

    #[test]
    fn test_version_check() {
        let record = draft_record();
        assert!(record.ensure_version(0).is_ok());
        assert_eq!(
            record.ensure_version(3),
            Err(LedgerError::StaleVersion {
                expected: 3,
                actual: 0
            })
        );
    }

    #[test]
    fn test_negative_patch_fails_validation() {
        let request: UpdateRecordRequest = serde_json::from_value(serde_json::json!({
            "expected_version": 0,
            "penalty": -5
        }))
        .unwrap();
        assert!(request.validate().is_err());
    }
}
