use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::model::{
    ApproveLoanRequest, ApprovedLoanRequest, LoanRequest, LoanRequestFilter, LoanRequestStatus,
    LoanRequestWithMember, RejectLoanRequest, SubmitLoanRequest,
};
use crate::db::is_unique_violation;
use crate::error::ApiError;
use crate::loans::{LoanService, NewLoan};

const ONE_PENDING_CONSTRAINT: &str = "loan_requests_one_pending_per_member";

#[derive(Clone)]
pub struct LoanRequestService {
    db_pool: PgPool,
}

impl LoanRequestService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// A member asks for a loan. Only one request may be pending at a time.
    pub async fn submit(
        &self,
        member_id: Uuid,
        request: SubmitLoanRequest,
    ) -> Result<LoanRequest, ApiError> {
        request.validate()?;

        let now = Utc::now();
        let loan_request = sqlx::query_as::<_, LoanRequest>(
            r#"
            INSERT INTO loan_requests (member_id, amount, purpose, status, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $5)
            RETURNING *
            "#,
        )
        .bind(member_id)
        .bind(request.amount)
        .bind(request.purpose.trim())
        .bind(LoanRequestStatus::Pending)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, ONE_PENDING_CONSTRAINT) {
                ApiError::Conflict("You already have a pending loan request".to_string())
            } else {
                e.into()
            }
        })?;

        tracing::info!(
            request_id = %loan_request.id,
            member_id = %member_id,
            amount = loan_request.amount,
            "Loan request submitted"
        );

        Ok(loan_request)
    }

    pub async fn get(&self, id: Uuid) -> Result<LoanRequest, ApiError> {
        sqlx::query_as::<_, LoanRequest>("SELECT * FROM loan_requests WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Loan request not found".to_string()))
    }

    pub async fn list(
        &self,
        filter: &LoanRequestFilter,
    ) -> Result<Vec<LoanRequestWithMember>, ApiError> {
        let mut query_builder = sqlx::QueryBuilder::new(
            r#"
            SELECT r.*, p.member_code, p.full_name
            FROM loan_requests r
            JOIN profiles p ON p.id = r.member_id
            WHERE 1=1"#,
        );

        if let Some(member_id) = filter.member_id {
            query_builder.push(" AND r.member_id = ");
            query_builder.push_bind(member_id);
        }
        if let Some(status) = filter.status {
            query_builder.push(" AND r.status = ");
            query_builder.push_bind(status);
        }
        query_builder.push(" ORDER BY r.created_at DESC");

        let requests = query_builder
            .build_query_as::<LoanRequestWithMember>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(requests)
    }

    /// Approve a pending request, opening a loan for the (possibly reduced)
    /// amount in the same transaction.
    pub async fn approve(
        &self,
        id: Uuid,
        body: ApproveLoanRequest,
        admin_id: Uuid,
    ) -> Result<ApprovedLoanRequest, ApiError> {
        body.validate()?;

        let mut tx = self.db_pool.begin().await?;

        let pending =
            sqlx::query_as::<_, LoanRequest>("SELECT * FROM loan_requests WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?
                .ok_or_else(|| ApiError::NotFound("Loan request not found".to_string()))?;

        pending.ensure_pending().map_err(ApiError::Conflict)?;
        let amount = pending
            .amount_to_approve(body.approved_amount)
            .map_err(ApiError::ValidationError)?;

        let loan = LoanService::open_loan(
            &mut tx,
            NewLoan {
                member_id: pending.member_id,
                request_id: Some(pending.id),
                principal_amount: amount,
                interest_rate: body.interest_rate,
                emi_amount: body.emi_amount,
                disbursed_on: body.disbursed_on.unwrap_or_else(|| Utc::now().date_naive()),
                created_by: admin_id,
            },
        )
        .await?;

        let now = Utc::now();
        let request = sqlx::query_as::<_, LoanRequest>(
            r#"
            UPDATE loan_requests
            SET status = $1, approved_amount = $2, admin_remark = $3, loan_id = $4,
                reviewed_by = $5, reviewed_at = $6, updated_at = $6
            WHERE id = $7
            RETURNING *
            "#,
        )
        .bind(LoanRequestStatus::Approved)
        .bind(amount)
        .bind(body.admin_remark.as_deref())
        .bind(loan.id)
        .bind(admin_id)
        .bind(now)
        .bind(id)
        .fetch_one(&mut *tx)
        .await?;

        tx.commit().await?;

        tracing::info!(
            request_id = %id,
            loan_id = %loan.id,
            requested = pending.amount,
            approved = amount,
            admin_id = %admin_id,
            "Loan request approved"
        );

        Ok(ApprovedLoanRequest { request, loan })
    }

    pub async fn reject(
        &self,
        id: Uuid,
        body: RejectLoanRequest,
        admin_id: Uuid,
    ) -> Result<LoanRequest, ApiError> {
        body.validate()?;

        let now = Utc::now();
        let rejected = sqlx::query_as::<_, LoanRequest>(
            r#"
            UPDATE loan_requests
            SET status = $1, admin_remark = $2, reviewed_by = $3, reviewed_at = $4, updated_at = $4
            WHERE id = $5 AND status = $6
            RETURNING *
            "#,
        )
        .bind(LoanRequestStatus::Rejected)
        .bind(body.admin_remark.as_deref())
        .bind(admin_id)
        .bind(now)
        .bind(id)
        .bind(LoanRequestStatus::Pending)
        .fetch_optional(&self.db_pool)
        .await?;

        match rejected {
            Some(request) => {
                tracing::info!(request_id = %id, admin_id = %admin_id, "Loan request rejected");
                Ok(request)
            }
            None => {
                let existing = self.get(id).await?;
                existing.ensure_pending().map_err(ApiError::Conflict)?;
                Err(ApiError::Conflict("Loan request changed during review".to_string()))
            }
        }
    }
}
