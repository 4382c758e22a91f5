use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::loans::Loan;

/// Smallest amount a member may ask for
pub const MIN_REQUEST_AMOUNT: i64 = 1_000;

#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "loan_request_status", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum LoanRequestStatus {
    Pending,
    Approved,
    Rejected,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct LoanRequest {
    pub id: Uuid,
    pub member_id: Uuid,
    pub amount: i64,
    pub purpose: String,
    pub status: LoanRequestStatus,
    pub admin_remark: Option<String>,
    pub approved_amount: Option<i64>,
    pub loan_id: Option<Uuid>,
    pub reviewed_by: Option<Uuid>,
    pub reviewed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl LoanRequest {
    pub fn ensure_pending(&self) -> Result<(), String> {
        match self.status {
            LoanRequestStatus::Pending => Ok(()),
            other => Err(format!(
                "Loan request has already been {}",
                match other {
                    LoanRequestStatus::Approved => "approved",
                    _ => "rejected",
                }
            )),
        }
    }

    /// Amount to lend: the requested amount unless the admin reduced it.
    pub fn amount_to_approve(&self, approved_amount: Option<i64>) -> Result<i64, String> {
        match approved_amount {
            None => Ok(self.amount),
            Some(amount) if amount <= 0 => Err("Approved amount must be positive".to_string()),
            Some(amount) if amount > self.amount => Err(format!(
                "Approved amount {} exceeds the requested amount {}",
                amount, self.amount
            )),
            Some(amount) => Ok(amount),
        }
    }
}

#[derive(Debug, Serialize, sqlx::FromRow)]
pub struct LoanRequestWithMember {
    #[serde(flatten)]
    #[sqlx(flatten)]
    pub request: LoanRequest,
    pub member_code: String,
    pub full_name: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SubmitLoanRequest {
    #[validate(range(min = 1000, message = "Requested amount is below the minimum of 1000"))]
    pub amount: i64,
    #[validate(length(min = 1, max = 500))]
    pub purpose: String,
}

#[derive(Debug, Deserialize, Validate)]
pub struct ApproveLoanRequest {
    #[validate(range(min = 1))]
    pub approved_amount: Option<i64>,
    #[validate(range(min = 0, max = 10000))]
    pub interest_rate: i32,
    #[validate(range(min = 0))]
    pub emi_amount: i64,
    #[validate(length(max = 500))]
    pub admin_remark: Option<String>,
    pub disbursed_on: Option<NaiveDate>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct RejectLoanRequest {
    #[validate(length(max = 500))]
    pub admin_remark: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LoanRequestFilter {
    pub member_id: Option<Uuid>,
    pub status: Option<LoanRequestStatus>,
}

#[derive(Debug, Serialize)]
pub struct ApprovedLoanRequest {
    pub request: LoanRequest,
    pub loan: Loan,
}
