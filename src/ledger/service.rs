//! Ledger service layer - month initialization, record edits and finalization

use chrono::Utc;
use sqlx::{PgPool, Postgres};
use std::collections::HashMap;
use uuid::Uuid;
use validator::Validate;

use super::calculator::{LedgerInputs, LedgerTotals};
use super::model::{
    BulkUpdateRequest, BulkUpdateResponse, InitializeMonthResponse, MonthlyLoanRecord,
    PeriodSummary, RecordFilter, RecordPatch, RecordStatus, RecordWithMember, RefreshResponse,
    UpdateRecordRequest,
};
use crate::error::ApiError;
use crate::period::PeriodKey;
use crate::settings::SettingsService;

/// Opening values for a member that has no record in the target period yet
#[derive(Debug, sqlx::FromRow)]
struct SeedRow {
    member_id: Uuid,
    monthly_subscription: i64,
    opening_outstanding: i64,
    prior_period: Option<String>,
    prior_status: Option<RecordStatus>,
}

/// Per-member sums of a period's payments
#[derive(Debug, Default, Clone, Copy)]
struct PeriodActivity {
    principal: i64,
    interest: i64,
    penalty: i64,
}

#[derive(Clone)]
pub struct LedgerService {
    db_pool: PgPool,
    settings: SettingsService,
}

impl LedgerService {
    pub fn new(db_pool: PgPool, settings: SettingsService) -> Self {
        Self { db_pool, settings }
    }

    /// Create one draft record per active member for `period`.
    ///
    /// Opening balance is the member's most recent earlier closing balance, or
    /// zero. Members that already have a record for the period are skipped, so
    /// calling this twice creates nothing the second time.
    pub async fn initialize_month(
        &self,
        period: PeriodKey,
        admin_id: Uuid,
    ) -> Result<InitializeMonthResponse, ApiError> {
        let settings = self.settings.get().await?;
        let period_key = period.to_string();

        let mut tx = self.db_pool.begin().await?;

        let seeds = sqlx::query_as::<_, SeedRow>(
            r#"
            SELECT p.id AS member_id,
                   p.monthly_subscription,
                   COALESCE(prev.closing_outstanding, 0) AS opening_outstanding,
                   prev.period_key AS prior_period,
                   prev.status AS prior_status
            FROM profiles p
            LEFT JOIN LATERAL (
                SELECT r.period_key, r.closing_outstanding, r.status
                FROM monthly_loan_records r
                WHERE r.member_id = p.id AND r.period_key < $1
                ORDER BY r.period_key DESC
                LIMIT 1
            ) prev ON TRUE
            WHERE p.role IN ('member', 'admin')
              AND NOT EXISTS (
                  SELECT 1 FROM monthly_loan_records x
                  WHERE x.member_id = p.id AND x.period_key = $1
              )
            ORDER BY p.member_code
            "#,
        )
        .bind(&period_key)
        .fetch_all(&mut *tx)
        .await?;

        let carried_from_draft = seeds
            .iter()
            .filter(|s| s.prior_status == Some(RecordStatus::Draft))
            .count();
        if carried_from_draft > 0 {
            tracing::warn!(
                period_key = %period,
                members = carried_from_draft,
                "Opening balances carried forward from records that are not finalized"
            );
        }

        let previous = period.previous().to_string();
        let carried_across_gap = seeds
            .iter()
            .filter(|s| s.prior_period.as_deref().is_some_and(|p| p != previous))
            .count();
        if carried_across_gap > 0 {
            tracing::warn!(
                period_key = %period,
                previous_period = %previous,
                members = carried_across_gap,
                "Opening balances carried forward from a month before the previous one"
            );
        }

        let now = Utc::now();
        let mut records_created = 0u64;

        for seed in &seeds {
            let inputs = LedgerInputs {
                opening_outstanding: seed.opening_outstanding,
                monthly_subscription: seed.monthly_subscription,
                ..Default::default()
            };
            let totals = inputs.roll_forward(settings.credit_ceiling)?;

            let result = sqlx::query(
                r#"
                INSERT INTO monthly_loan_records (
                    member_id, period_key, opening_outstanding, monthly_subscription,
                    new_loan_taken, principal_paid, interest_paid, penalty, additional_principal,
                    closing_outstanding, total_monthly_income, installment_income,
                    credit_limit, available_loan_amount, status, version, created_by,
                    created_at, updated_at
                )
                VALUES ($1, $2, $3, $4, 0, 0, 0, 0, 0, $5, $6, $7, $8, $9, $10, 0, $11, $12, $12)
                ON CONFLICT (member_id, period_key) DO NOTHING
                "#,
            )
            .bind(seed.member_id)
            .bind(&period_key)
            .bind(inputs.opening_outstanding)
            .bind(inputs.monthly_subscription)
            .bind(totals.closing_outstanding)
            .bind(totals.total_monthly_income)
            .bind(totals.installment_income)
            .bind(settings.credit_ceiling)
            .bind(totals.available_loan_amount)
            .bind(RecordStatus::Draft)
            .bind(admin_id)
            .bind(now)
            .execute(&mut *tx)
            .await?;

            records_created += result.rows_affected();
        }

        tx.commit().await?;

        tracing::info!(
            period_key = %period,
            admin_id = %admin_id,
            records_created,
            "Month initialized"
        );

        Ok(InitializeMonthResponse {
            success: true,
            period_key: period,
            records_created,
        })
    }

    pub async fn get_record(&self, id: Uuid) -> Result<MonthlyLoanRecord, ApiError> {
        sqlx::query_as::<_, MonthlyLoanRecord>("SELECT * FROM monthly_loan_records WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?
            .ok_or_else(|| ApiError::NotFound("Monthly record not found".to_string()))
    }

    pub async fn find_member_record(
        &self,
        member_id: Uuid,
        period: PeriodKey,
    ) -> Result<Option<MonthlyLoanRecord>, ApiError> {
        let record = sqlx::query_as::<_, MonthlyLoanRecord>(
            "SELECT * FROM monthly_loan_records WHERE member_id = $1 AND period_key = $2",
        )
        .bind(member_id)
        .bind(period.to_string())
        .fetch_optional(&self.db_pool)
        .await?;
        Ok(record)
    }

    pub async fn list_records(
        &self,
        period: PeriodKey,
        filter: &RecordFilter,
    ) -> Result<Vec<RecordWithMember>, ApiError> {
        let mut query_builder = sqlx::QueryBuilder::new(
            r#"
            SELECT r.*, p.member_code, p.full_name
            FROM monthly_loan_records r
            JOIN profiles p ON p.id = r.member_id
            WHERE r.period_key = "#,
        );
        query_builder.push_bind(period.to_string());

        if let Some(member_id) = filter.member_id {
            query_builder.push(" AND r.member_id = ");
            query_builder.push_bind(member_id);
        }

        if let Some(status) = filter.status {
            query_builder.push(" AND r.status = ");
            query_builder.push_bind(status);
        }

        query_builder.push(" ORDER BY p.member_code");

        let records = query_builder
            .build_query_as::<RecordWithMember>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(records)
    }

    /// Apply an admin edit to a draft record.
    ///
    /// The write only lands if the record is still a draft at the version the
    /// caller read; otherwise the caller gets a conflict naming the reason.
    pub async fn update_record(
        &self,
        id: Uuid,
        request: UpdateRecordRequest,
        admin_id: Uuid,
    ) -> Result<MonthlyLoanRecord, ApiError> {
        request.validate()?;

        let record = self.get_record(id).await?;
        record.ensure_editable()?;
        record.ensure_version(request.expected_version)?;

        let (inputs, totals) = record.recompute(&request.changes, record.credit_limit)?;

        let updated = write_totals(
            &self.db_pool,
            id,
            &inputs,
            &totals,
            record.credit_limit,
            Some(request.expected_version),
        )
        .await?;

        match updated {
            Some(updated) => {
                tracing::info!(
                    record_id = %id,
                    admin_id = %admin_id,
                    version = updated.version,
                    closing_outstanding = updated.closing_outstanding,
                    "Monthly record updated"
                );
                Ok(updated)
            }
            // Lost a race between the read and the write; report why.
            None => Err(self.write_conflict(id, request.expected_version).await),
        }
    }

    /// Lock a record. Finalized records seed the next period's opening balance
    /// and can no longer change.
    pub async fn finalize_record(
        &self,
        id: Uuid,
        admin_id: Uuid,
    ) -> Result<MonthlyLoanRecord, ApiError> {
        let now = Utc::now();
        let finalized = sqlx::query_as::<_, MonthlyLoanRecord>(
            r#"
            UPDATE monthly_loan_records
            SET status = $1, finalized_by = $2, finalized_at = $3,
                version = version + 1, updated_at = $3
            WHERE id = $4 AND status = $5
            RETURNING *
            "#,
        )
        .bind(RecordStatus::Finalized)
        .bind(admin_id)
        .bind(now)
        .bind(id)
        .bind(RecordStatus::Draft)
        .fetch_optional(&self.db_pool)
        .await?;

        match finalized {
            Some(record) => {
                tracing::info!(
                    record_id = %id,
                    member_id = %record.member_id,
                    period_key = %record.period_key,
                    closing_outstanding = record.closing_outstanding,
                    admin_id = %admin_id,
                    "Monthly record finalized"
                );
                Ok(record)
            }
            None => {
                let record = self.get_record(id).await?;
                record.status.finalize()?;
                Err(ApiError::Conflict(format!(
                    "Record {} could not be finalized",
                    id
                )))
            }
        }
    }

    /// Re-derive a period's draft records from recorded payments and
    /// disbursements. Subscription and additional principal are left as
    /// entered; finalized records are not touched.
    pub async fn refresh_period(&self, period: PeriodKey) -> Result<RefreshResponse, ApiError> {
        let period_key = period.to_string();
        let mut tx = self.db_pool.begin().await?;

        let drafts = sqlx::query_as::<_, MonthlyLoanRecord>(
            r#"
            SELECT * FROM monthly_loan_records
            WHERE period_key = $1 AND status = $2
            FOR UPDATE
            "#,
        )
        .bind(&period_key)
        .bind(RecordStatus::Draft)
        .fetch_all(&mut *tx)
        .await?;

        let payments: HashMap<Uuid, PeriodActivity> = sqlx::query_as::<_, (Uuid, i64, i64, i64)>(
            r#"
            SELECT member_id,
                   COALESCE(SUM(principal_component), 0)::BIGINT,
                   COALESCE(SUM(interest_component), 0)::BIGINT,
                   COALESCE(SUM(penalty_component), 0)::BIGINT
            FROM loan_payments
            WHERE period_key = $1
            GROUP BY member_id
            "#,
        )
        .bind(&period_key)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .map(|(member_id, principal, interest, penalty)| {
            (
                member_id,
                PeriodActivity {
                    principal,
                    interest,
                    penalty,
                },
            )
        })
        .collect();

        let disbursed: HashMap<Uuid, i64> = sqlx::query_as::<_, (Uuid, i64)>(
            r#"
            SELECT member_id, COALESCE(SUM(amount), 0)::BIGINT
            FROM loan_disbursements
            WHERE period_key = $1
            GROUP BY member_id
            "#,
        )
        .bind(&period_key)
        .fetch_all(&mut *tx)
        .await?
        .into_iter()
        .collect();

        let mut records_refreshed = 0u64;
        for record in &drafts {
            let activity = payments.get(&record.member_id).copied().unwrap_or_default();
            let patch = RecordPatch {
                principal_paid: Some(activity.principal),
                interest_paid: Some(activity.interest),
                penalty: Some(activity.penalty),
                new_loan_taken: Some(disbursed.get(&record.member_id).copied().unwrap_or(0)),
                ..Default::default()
            };
            let (inputs, totals) = record.recompute(&patch, record.credit_limit)?;
            if write_totals(&mut *tx, record.id, &inputs, &totals, record.credit_limit, None)
                .await?
                .is_some()
            {
                records_refreshed += 1;
            }
        }

        tx.commit().await?;

        tracing::info!(period_key = %period, records_refreshed, "Period refreshed from events");

        Ok(RefreshResponse {
            period_key: period,
            records_refreshed,
        })
    }

    /// Mass-update subscription and/or credit limit on a period's records.
    pub async fn bulk_update(
        &self,
        request: BulkUpdateRequest,
        admin_id: Uuid,
    ) -> Result<BulkUpdateResponse, ApiError> {
        request.validate()?;
        if request.monthly_subscription.is_none() && request.credit_limit.is_none() {
            return Err(ApiError::BadRequest(
                "Nothing to update: provide monthly_subscription and/or credit_limit".to_string(),
            ));
        }

        let mut tx = self.db_pool.begin().await?;

        let mut query_builder = sqlx::QueryBuilder::<Postgres>::new(
            "SELECT * FROM monthly_loan_records WHERE period_key = ",
        );
        query_builder.push_bind(request.period_key.to_string());
        if let Some(member_ids) = &request.member_ids {
            query_builder.push(" AND member_id = ANY(");
            query_builder.push_bind(member_ids.clone());
            query_builder.push(")");
        }
        query_builder.push(" FOR UPDATE");

        let records = query_builder
            .build_query_as::<MonthlyLoanRecord>()
            .fetch_all(&mut *tx)
            .await?;

        let patch = RecordPatch {
            monthly_subscription: request.monthly_subscription,
            ..Default::default()
        };

        let mut records_updated = 0u64;
        let mut records_skipped_finalized = 0u64;
        for record in &records {
            if !record.status.is_editable() {
                records_skipped_finalized += 1;
                continue;
            }
            let credit_limit = request.credit_limit.unwrap_or(record.credit_limit);
            let (inputs, totals) = record.recompute(&patch, credit_limit)?;
            if write_totals(&mut *tx, record.id, &inputs, &totals, credit_limit, None)
                .await?
                .is_some()
            {
                records_updated += 1;
            }
        }

        tx.commit().await?;

        tracing::info!(
            period_key = %request.period_key,
            admin_id = %admin_id,
            records_updated,
            records_skipped_finalized,
            "Bulk record update applied"
        );

        Ok(BulkUpdateResponse {
            period_key: request.period_key,
            records_updated,
            records_skipped_finalized,
        })
    }

    pub async fn list_periods(&self) -> Result<Vec<PeriodSummary>, ApiError> {
        let periods = sqlx::query_as::<_, PeriodSummary>(
            "SELECT * FROM monthly_cycle_summary ORDER BY period_key DESC",
        )
        .fetch_all(&self.db_pool)
        .await?;
        Ok(periods)
    }

    pub async fn period_summary(&self, period: PeriodKey) -> Result<PeriodSummary, ApiError> {
        sqlx::query_as::<_, PeriodSummary>(
            "SELECT * FROM monthly_cycle_summary WHERE period_key = $1",
        )
        .bind(period.to_string())
        .fetch_optional(&self.db_pool)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("Period {} has not been initialized", period)))
    }

    async fn write_conflict(&self, id: Uuid, expected_version: i32) -> ApiError {
        let record = match self.get_record(id).await {
            Ok(record) => record,
            Err(e) => return e,
        };
        let reason = record
            .ensure_editable()
            .and_then(|_| record.ensure_version(expected_version));
        match reason {
            Err(e) => e.into(),
            Ok(()) => ApiError::Conflict(format!("Record {} changed during update", id)),
        }
    }
}

/// Persist recomputed fields on a draft record, bumping its version.
///
/// With `expected_version` the update is a compare-and-swap; `None` means the
/// caller already holds the row lock. Returns `None` when no draft row matched.
async fn write_totals<'e, E>(
    executor: E,
    id: Uuid,
    inputs: &LedgerInputs,
    totals: &LedgerTotals,
    credit_limit: i64,
    expected_version: Option<i32>,
) -> Result<Option<MonthlyLoanRecord>, sqlx::Error>
where
    E: sqlx::Executor<'e, Database = Postgres>,
{
    sqlx::query_as::<_, MonthlyLoanRecord>(
        r#"
        UPDATE monthly_loan_records
        SET monthly_subscription = $1,
            interest_paid = $2,
            principal_paid = $3,
            new_loan_taken = $4,
            penalty = $5,
            additional_principal = $6,
            closing_outstanding = $7,
            total_monthly_income = $8,
            installment_income = $9,
            credit_limit = $10,
            available_loan_amount = $11,
            version = version + 1,
            updated_at = $12
        WHERE id = $13
          AND status = $14
          AND ($15::INTEGER IS NULL OR version = $15)
        RETURNING *
        "#,
    )
    .bind(inputs.monthly_subscription)
    .bind(inputs.interest_paid)
    .bind(inputs.principal_paid)
    .bind(inputs.new_loan_taken)
    .bind(inputs.penalty)
    .bind(inputs.additional_principal)
    .bind(totals.closing_outstanding)
    .bind(totals.total_monthly_income)
    .bind(totals.installment_income)
    .bind(credit_limit)
    .bind(totals.available_loan_amount)
    .bind(Utc::now())
    .bind(id)
    .bind(RecordStatus::Draft)
    .bind(expected_version)
    .fetch_optional(executor)
    .await
}
