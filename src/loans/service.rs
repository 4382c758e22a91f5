//! Loan service layer - loans, top-ups and payments

use chrono::Utc;
use sqlx::{PgConnection, PgPool};
use uuid::Uuid;
use validator::Validate;

use super::model::{
    CreateLoanRequest, DisbursementKind, ListLoansQuery, Loan, LoanDisbursement, LoanPayment,
    LoanStatus, LoanWithMember, NewLoan, PaymentFilter, RecordPaymentRequest, TopUpRequest,
};
use crate::db::is_unique_violation;
use crate::error::ApiError;
use crate::ledger::RecordStatus;
use crate::models::{PaginatedResponse, PaginationParams};
use crate::period::PeriodKey;

const PAYMENT_PERIOD_CONSTRAINT: &str = "loan_payments_loan_id_period_key_key";

/// Loan service for managing the loan lifecycle
#[derive(Clone)]
pub struct LoanService {
    db_pool: PgPool,
}

impl LoanService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    /// Open a loan directly (admin) and record its initial disbursement
    pub async fn issue_loan(
        &self,
        request: CreateLoanRequest,
        admin_id: Uuid,
    ) -> Result<Loan, ApiError> {
        request.validate()?;

        let mut tx = self.db_pool.begin().await?;
        let loan = Self::open_loan(
            &mut tx,
            NewLoan {
                member_id: request.member_id,
                request_id: None,
                principal_amount: request.principal_amount,
                interest_rate: request.interest_rate,
                emi_amount: request.emi_amount,
                disbursed_on: request
                    .disbursed_on
                    .unwrap_or_else(|| Utc::now().date_naive()),
                created_by: admin_id,
            },
        )
        .await?;
        tx.commit().await?;

        Ok(loan)
    }

    /// Insert an active loan plus its `initial` disbursement on an open
    /// connection, so callers can include it in a larger transaction.
    pub async fn open_loan(conn: &mut PgConnection, new_loan: NewLoan) -> Result<Loan, ApiError> {
        let member_exists: Option<bool> = sqlx::query_scalar(
            "SELECT role <> 'inactive' FROM profiles WHERE id = $1",
        )
        .bind(new_loan.member_id)
        .fetch_optional(&mut *conn)
        .await?;

        match member_exists {
            None => return Err(ApiError::NotFound("Member not found".to_string())),
            Some(false) => {
                return Err(ApiError::BadRequest(
                    "Cannot issue a loan to an inactive member".to_string(),
                ))
            }
            Some(true) => {}
        }

        let now = Utc::now();
        let loan = sqlx::query_as::<_, Loan>(
            r#"
            INSERT INTO loans (
                member_id, request_id, principal_amount, interest_rate, emi_amount,
                remaining_balance, status, disbursed_on, created_by, created_at, updated_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $10)
            RETURNING *
            "#,
        )
        .bind(new_loan.member_id)
        .bind(new_loan.request_id)
        .bind(new_loan.principal_amount)
        .bind(new_loan.interest_rate)
        .bind(new_loan.emi_amount)
        .bind(new_loan.principal_amount) // Initial balance is principal
        .bind(LoanStatus::Active)
        .bind(new_loan.disbursed_on)
        .bind(new_loan.created_by)
        .bind(now)
        .fetch_one(&mut *conn)
        .await?;

        insert_disbursement(
            conn,
            &loan,
            loan.principal_amount,
            DisbursementKind::Initial,
            new_loan.disbursed_on,
            new_loan.created_by,
        )
        .await?;

        tracing::info!(
            loan_id = %loan.id,
            member_id = %loan.member_id,
            principal = loan.principal_amount,
            request_id = ?loan.request_id,
            "Loan issued"
        );

        Ok(loan)
    }

    /// Add an incremental disbursement to an open loan
    pub async fn top_up(
        &self,
        loan_id: Uuid,
        request: TopUpRequest,
        admin_id: Uuid,
    ) -> Result<Loan, ApiError> {
        request.validate()?;

        let mut tx = self.db_pool.begin().await?;
        let loan = lock_loan(&mut tx, loan_id).await?;
        if !loan.status.is_open() {
            return Err(ApiError::BadRequest(format!(
                "Loan is {:?} and cannot be topped up",
                loan.status
            )));
        }

        let loan = sqlx::query_as::<_, Loan>(
            r#"
            UPDATE loans
            SET principal_amount = principal_amount + $1,
                remaining_balance = remaining_balance + $1,
                emi_amount = COALESCE($2, emi_amount),
                status = $3,
                updated_at = $4
            WHERE id = $5
            RETURNING *
            "#,
        )
        .bind(request.amount)
        .bind(request.emi_amount)
        .bind(LoanStatus::Active)
        .bind(Utc::now())
        .bind(loan_id)
        .fetch_one(&mut *tx)
        .await?;

        insert_disbursement(
            &mut tx,
            &loan,
            request.amount,
            DisbursementKind::TopUp,
            request.disbursed_on.unwrap_or_else(|| Utc::now().date_naive()),
            admin_id,
        )
        .await?;

        tx.commit().await?;

        tracing::info!(
            loan_id = %loan_id,
            amount = request.amount,
            remaining_balance = loan.remaining_balance,
            "Loan topped up"
        );

        Ok(loan)
    }

    /// Record a payment and update the loan balance and member fine.
    ///
    /// All three writes share one transaction. A second payment for the same
    /// loan in the same period is refused.
    pub async fn record_payment(
        &self,
        request: RecordPaymentRequest,
        admin_id: Uuid,
    ) -> Result<LoanPayment, ApiError> {
        request.validate()?;
        request.check_components().map_err(ApiError::ValidationError)?;
        if request.payment_date > Utc::now().date_naive() {
            return Err(ApiError::ValidationError(
                "Payment date cannot be in the future".to_string(),
            ));
        }

        let period = request.period_key();
        let mut tx = self.db_pool.begin().await?;

        let loan = lock_loan(&mut tx, request.loan_id).await?;
        if !loan.status.is_open() {
            return Err(ApiError::BadRequest(format!(
                "Loan is {:?} and does not accept payments",
                loan.status
            )));
        }
        ensure_period_open(&mut tx, loan.member_id, period).await?;
        if request.principal_component > loan.remaining_balance {
            return Err(ApiError::ValidationError(format!(
                "Principal {} exceeds the remaining balance {}",
                request.principal_component, loan.remaining_balance
            )));
        }

        let payment = sqlx::query_as::<_, LoanPayment>(
            r#"
            INSERT INTO loan_payments (
                loan_id, member_id, amount, principal_component, interest_component,
                penalty_component, subscription_component, payment_date, period_key,
                recorded_by, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            RETURNING *
            "#,
        )
        .bind(loan.id)
        .bind(loan.member_id)
        .bind(request.amount)
        .bind(request.principal_component)
        .bind(request.interest_component)
        .bind(request.penalty_component)
        .bind(request.subscription_component)
        .bind(request.payment_date)
        .bind(period.to_string())
        .bind(admin_id)
        .bind(request.notes.as_deref())
        .bind(Utc::now())
        .fetch_one(&mut *tx)
        .await
        .map_err(|e| {
            if is_unique_violation(&e, PAYMENT_PERIOD_CONSTRAINT) {
                tracing::warn!(loan_id = %loan.id, period_key = %period, "Duplicate payment rejected");
                duplicate_payment_error(period)
            } else {
                e.into()
            }
        })?;

        let new_balance = loan.remaining_balance - request.principal_component;
        let new_status = if new_balance == 0 {
            LoanStatus::Completed
        } else {
            loan.status
        };

        sqlx::query(
            "UPDATE loans SET remaining_balance = $1, status = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(new_balance)
        .bind(new_status)
        .bind(Utc::now())
        .bind(loan.id)
        .execute(&mut *tx)
        .await?;

        if request.penalty_component > 0 {
            sqlx::query(
                r#"
                UPDATE profiles
                SET outstanding_fine = GREATEST(outstanding_fine - $1, 0), updated_at = $2
                WHERE id = $3
                "#,
            )
            .bind(request.penalty_component)
            .bind(Utc::now())
            .bind(loan.member_id)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;

        tracing::info!(
            payment_id = %payment.id,
            loan_id = %loan.id,
            period_key = %period,
            amount = payment.amount,
            remaining_balance = new_balance,
            "Payment recorded"
        );
        if new_status == LoanStatus::Completed {
            tracing::info!(loan_id = %loan.id, "Loan completed");
        }

        Ok(payment)
    }

    pub async fn get_loan(&self, id: Uuid) -> Result<Loan, ApiError> {
        sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Loan not found".to_string()))
    }

    /// Open loans of one member, oldest first
    pub async fn open_loans_for(&self, member_id: Uuid) -> Result<Vec<Loan>, ApiError> {
        let loans = sqlx::query_as::<_, Loan>(
            r#"
            SELECT * FROM loans
            WHERE member_id = $1 AND status IN ('approved', 'active')
            ORDER BY disbursed_on
            "#,
        )
        .bind(member_id)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(loans)
    }

    /// List loans with filters
    pub async fn list_loans(
        &self,
        query: ListLoansQuery,
    ) -> Result<PaginatedResponse<LoanWithMember>, ApiError> {
        let (page, limit, offset) = PaginationParams {
            page: query.page,
            limit: query.limit,
        }
        .resolve();

        let mut query_builder = sqlx::QueryBuilder::new(
            r#"
            SELECT l.*, p.member_code, p.full_name
            FROM loans l
            JOIN profiles p ON p.id = l.member_id
            WHERE 1=1"#,
        );
        let mut count_builder = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM loans l WHERE 1=1");

        if let Some(member_id) = query.member_id {
            query_builder.push(" AND l.member_id = ");
            query_builder.push_bind(member_id);
            count_builder.push(" AND l.member_id = ");
            count_builder.push_bind(member_id);
        }
        if let Some(status) = query.status {
            query_builder.push(" AND l.status = ");
            query_builder.push_bind(status);
            count_builder.push(" AND l.status = ");
            count_builder.push_bind(status);
        }

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        query_builder.push(" ORDER BY l.created_at DESC LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let loans = query_builder
            .build_query_as::<LoanWithMember>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(PaginatedResponse {
            data: loans,
            total,
            page,
            limit,
        })
    }

    pub async fn list_payments(&self, filter: &PaymentFilter) -> Result<Vec<LoanPayment>, ApiError> {
        let mut query_builder = sqlx::QueryBuilder::new("SELECT * FROM loan_payments WHERE 1=1");

        if let Some(loan_id) = filter.loan_id {
            query_builder.push(" AND loan_id = ");
            query_builder.push_bind(loan_id);
        }
        if let Some(member_id) = filter.member_id {
            query_builder.push(" AND member_id = ");
            query_builder.push_bind(member_id);
        }
        if let Some(period) = filter.period_key {
            query_builder.push(" AND period_key = ");
            query_builder.push_bind(period.to_string());
        }
        query_builder.push(" ORDER BY payment_date DESC, created_at DESC");

        let payments = query_builder
            .build_query_as::<LoanPayment>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(payments)
    }

    pub async fn list_disbursements(&self, loan_id: Uuid) -> Result<Vec<LoanDisbursement>, ApiError> {
        let disbursements = sqlx::query_as::<_, LoanDisbursement>(
            "SELECT * FROM loan_disbursements WHERE loan_id = $1 ORDER BY disbursed_on, created_at",
        )
        .bind(loan_id)
        .fetch_all(&self.db_pool)
        .await?;
        Ok(disbursements)
    }
}

pub fn finalized_period_error(period: PeriodKey) -> ApiError {
    ApiError::Conflict(format!("Period {} is finalized", period))
}

/// Refuse money movements dated in a month whose ledger line is already
/// finalized for the member. The row is share-locked until the caller commits
/// so finalization cannot slip in between.
async fn ensure_period_open(
    conn: &mut PgConnection,
    member_id: Uuid,
    period: PeriodKey,
) -> Result<(), ApiError> {
    let status: Option<RecordStatus> = sqlx::query_scalar(
        r#"
        SELECT status FROM monthly_loan_records
        WHERE member_id = $1 AND period_key = $2
        FOR SHARE
        "#,
    )
    .bind(member_id)
    .bind(period.to_string())
    .fetch_optional(conn)
    .await?;

    if status == Some(RecordStatus::Finalized) {
        tracing::warn!(member_id = %member_id, period_key = %period, "Write into finalized period rejected");
        return Err(finalized_period_error(period));
    }
    Ok(())
}

pub fn duplicate_payment_error(period: PeriodKey) -> ApiError {
    ApiError::Conflict(format!(
        "A payment has already been recorded for this loan for period {}; payments are accepted once per month",
        period
    ))
}

async fn lock_loan(conn: &mut PgConnection, loan_id: Uuid) -> Result<Loan, ApiError> {
    sqlx::query_as::<_, Loan>("SELECT * FROM loans WHERE id = $1 FOR UPDATE")
        .bind(loan_id)
        .fetch_optional(conn)
        .await?
        .ok_or_else(|| ApiError::NotFound("Loan not found".to_string()))
}

async fn insert_disbursement(
    conn: &mut PgConnection,
    loan: &Loan,
    amount: i64,
    kind: DisbursementKind,
    disbursed_on: chrono::NaiveDate,
    created_by: Uuid,
) -> Result<LoanDisbursement, ApiError> {
    let period = PeriodKey::from_date(disbursed_on);
    ensure_period_open(&mut *conn, loan.member_id, period).await?;

    let disbursement = sqlx::query_as::<_, LoanDisbursement>(
        r#"
        INSERT INTO loan_disbursements (
            loan_id, member_id, amount, kind, period_key, disbursed_on, created_by, created_at
        )
        VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
        RETURNING *
        "#,
    )
    .bind(loan.id)
    .bind(loan.member_id)
    .bind(amount)
    .bind(kind)
    .bind(period.to_string())
    .bind(disbursed_on)
    .bind(created_by)
    .bind(Utc::now())
    .fetch_one(conn)
    .await?;
    Ok(disbursement)
}
