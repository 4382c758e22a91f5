use serde::{Deserialize, Serialize};
use sqlx::types::chrono::{DateTime, Utc};
use uuid::Uuid;
use validator::Validate;

use crate::ledger::MonthlyLoanRecord;
use crate::loans::{Loan, LoanPayment};
use crate::period::PeriodKey;

/// Member roles. `inactive` members keep their history but are skipped when
/// a new month is initialized.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq)]
#[sqlx(type_name = "member_role", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum MemberRole {
    Member,
    Admin,
    Inactive,
}

impl MemberRole {
    pub fn is_active(&self) -> bool {
        !matches!(self, MemberRole::Inactive)
    }

    pub fn is_admin(&self) -> bool {
        matches!(self, MemberRole::Admin)
    }
}

/// Member profile (`profiles` table); `id` is the identity provider's user id
#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Member {
    pub id: Uuid,
    pub full_name: String,
    pub email: Option<String>,
    pub phone: Option<String>,
    pub role: MemberRole,
    pub member_code: String,
    pub monthly_subscription: i64,
    pub outstanding_fine: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Self-registration after signing up with the identity provider
#[derive(Debug, Deserialize, Validate)]
pub struct RegisterProfileRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 5, max = 20))]
    pub phone: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateMemberRequest {
    pub id: Uuid,
    #[validate(length(min = 1, max = 120))]
    pub full_name: String,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 5, max = 20))]
    pub phone: Option<String>,
    pub role: Option<MemberRole>,
    #[validate(length(min = 1, max = 16))]
    pub member_code: Option<String>,
    #[validate(range(min = 0))]
    pub monthly_subscription: Option<i64>,
    #[validate(range(min = 0))]
    pub outstanding_fine: Option<i64>,
}

#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateMemberRequest {
    #[validate(length(min = 1, max = 120))]
    pub full_name: Option<String>,
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 5, max = 20))]
    pub phone: Option<String>,
    pub role: Option<MemberRole>,
    #[validate(length(min = 1, max = 16))]
    pub member_code: Option<String>,
    #[validate(range(min = 0))]
    pub monthly_subscription: Option<i64>,
    #[validate(range(min = 0))]
    pub outstanding_fine: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct MemberFilter {
    pub role: Option<MemberRole>,
    pub search: Option<String>,
    pub page: Option<i32>,
    pub limit: Option<i32>,
}

#[derive(Debug, Deserialize)]
pub struct StatementQuery {
    pub period_key: PeriodKey,
}

/// One member's view of a period: the ledger line and the payments behind it
#[derive(Debug, Serialize)]
pub struct MemberStatement {
    pub member: Member,
    pub period_key: PeriodKey,
    pub record: Option<MonthlyLoanRecord>,
    pub payments: Vec<LoanPayment>,
    pub open_loans: Vec<Loan>,
}
