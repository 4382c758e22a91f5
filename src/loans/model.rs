//! Loan, disbursement and payment models

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::period::PeriodKey;

/// Loan status enum
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanStatus {
    Pending,
    Approved,
    Active,
    Completed,
    Rejected,
}

impl LoanStatus {
    /// Whether the loan can still receive payments or top-ups
    pub fn is_open(&self) -> bool {
        matches!(self, LoanStatus::Approved | LoanStatus::Active)
    }
}

/// Loan model
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Loan {
    pub id: Uuid,
    pub member_id: Uuid,
    pub request_id: Option<Uuid>,
    pub principal_amount: i64,
    pub interest_rate: i32, // basis points
    pub emi_amount: i64,
    pub remaining_balance: i64,
    pub status: LoanStatus,
    pub disbursed_on: NaiveDate,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Loan {
    /// Principal installment due this month, capped at what is left
    pub fn installment_due(&self) -> i64 {
        if self.status.is_open() {
            self.emi_amount.min(self.remaining_balance).max(0)
        } else {
            0
        }
    }
}

/// Loan joined with the borrower's display fields
#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LoanWithMember {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub loan: Loan,
    pub member_code: String,
    pub full_name: String,
}

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "disbursement_kind", rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum DisbursementKind {
    Initial,
    TopUp,
}

/// Money handed to a member, either when a loan starts or as a top-up
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanDisbursement {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub member_id: Uuid,
    pub amount: i64,
    pub kind: DisbursementKind,
    pub period_key: String,
    pub disbursed_on: NaiveDate,
    pub created_by: Option<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Payment model; one per loan per period
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanPayment {
    pub id: Uuid,
    pub loan_id: Uuid,
    pub member_id: Uuid,
    pub amount: i64,
    pub principal_component: i64,
    pub interest_component: i64,
    pub penalty_component: i64,
    pub subscription_component: i64,
    pub payment_date: NaiveDate,
    pub period_key: String,
    pub recorded_by: Option<Uuid>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields needed to open a loan, shared by direct creation and request approval
#[derive(Debug, Clone)]
pub struct NewLoan {
    pub member_id: Uuid,
    pub request_id: Option<Uuid>,
    pub principal_amount: i64,
    pub interest_rate: i32,
    pub emi_amount: i64,
    pub disbursed_on: NaiveDate,
    pub created_by: Uuid,
}

/// Request to create a new loan
#[derive(Debug, Deserialize, Validate)]
pub struct CreateLoanRequest {
    pub member_id: Uuid,
    #[validate(range(min = 1))]
    pub principal_amount: i64,
    #[validate(range(min = 0, max = 10000))]
    pub interest_rate: i32,
    #[validate(range(min = 0))]
    pub emi_amount: i64,
    pub disbursed_on: Option<NaiveDate>,
}

/// Additional disbursement on an open loan
#[derive(Debug, Deserialize, Validate)]
pub struct TopUpRequest {
    #[validate(range(min = 1))]
    pub amount: i64,
    #[validate(range(min = 0))]
    pub emi_amount: Option<i64>,
    pub disbursed_on: Option<NaiveDate>,
}

/// Request to record a payment
#[derive(Debug, Deserialize, Validate)]
pub struct RecordPaymentRequest {
    pub loan_id: Uuid,
    #[validate(range(min = 1))]
    pub amount: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub principal_component: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub interest_component: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub penalty_component: i64,
    #[serde(default)]
    #[validate(range(min = 0))]
    pub subscription_component: i64,
    pub payment_date: NaiveDate,
    #[validate(length(max = 500))]
    pub notes: Option<String>,
}

impl RecordPaymentRequest {
    /// The period a payment belongs to is the month of its payment date
    pub fn period_key(&self) -> PeriodKey {
        PeriodKey::from_date(self.payment_date)
    }

    /// The amount must be exactly the sum of its components.
    pub fn check_components(&self) -> Result<(), String> {
        let sum = [
            self.principal_component,
            self.interest_component,
            self.penalty_component,
            self.subscription_component,
        ]
        .iter()
        .try_fold(0i64, |acc, v| acc.checked_add(*v))
        .ok_or_else(|| "Payment components are out of range".to_string())?;

        if sum != self.amount {
            return Err(format!(
                "Payment amount {} does not match the sum of its components ({})",
                self.amount, sum
            ));
        }
        Ok(())
    }
}

/// A loan with every disbursement and payment posted against it
#[derive(Debug, Serialize)]
pub struct LoanDetail {
    #[serde(flatten)]
    pub loan: Loan,
    pub disbursements: Vec<LoanDisbursement>,
    pub payments: Vec<LoanPayment>,
}

/// Query for listing loans
#[derive(Debug, Deserialize)]
pub struct ListLoansQuery {
    pub member_id: Option<Uuid>,
    pub status: Option<LoanStatus>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

/// Query for listing payments
#[derive(Debug, Default, Deserialize)]
pub struct PaymentFilter {
    pub loan_id: Option<Uuid>,
    pub member_id: Option<Uuid>,
    pub period_key: Option<PeriodKey>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn payment(amount: i64, principal: i64, interest: i64) -> RecordPaymentRequest {
        RecordPaymentRequest {
            loan_id: Uuid::new_v4(),
            amount,
            principal_component: principal,
            interest_component: interest,
            penalty_component: 0,
            subscription_component: 0,
            payment_date: NaiveDate::from_ymd_opt(2024, 2, 29).unwrap(),
            notes: None,
        }
    }

    #[test]
    fn test_period_key_is_derived_from_payment_date() {
        assert_eq!(payment(100, 100, 0).period_key().to_string(), "2024-02");
    }

    #[test]
    fn test_components_must_sum_to_amount() {
        assert!(payment(2_750, 2_000, 750).check_components().is_ok());
        let err = payment(3_000, 2_000, 750).check_components().unwrap_err();
        assert!(err.contains("2750"));
    }

    #[test]
    fn test_component_overflow_is_an_error() {
        assert!(payment(1, i64::MAX, 1).check_components().is_err());
    }

    #[test]
    fn test_negative_component_fails_validation() {
        let mut request = payment(100, 100, 0);
        request.penalty_component = -10;
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_installment_due_is_capped() {
        let now = Utc::now();
        let mut loan = Loan {
            id: Uuid::new_v4(),
            member_id: Uuid::new_v4(),
            request_id: None,
            principal_amount: 50_000,
            interest_rate: 150,
            emi_amount: 5_000,
            remaining_balance: 3_000,
            status: LoanStatus::Active,
            disbursed_on: NaiveDate::from_ymd_opt(2024, 1, 5).unwrap(),
            created_by: None,
            created_at: now,
            updated_at: now,
        };
        assert_eq!(loan.installment_due(), 3_000);

        loan.remaining_balance = 20_000;
        assert_eq!(loan.installment_due(), 5_000);

        loan.status = LoanStatus::Completed;
        assert_eq!(loan.installment_due(), 0);
    }
}
