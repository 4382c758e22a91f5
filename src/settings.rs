//! Circle-wide settings (`system_settings` singleton row)

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::DateTime;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;

/// Cash-bill interest: 1.5% of the outstanding balance
pub const DEFAULT_CASH_BILL_INTEREST_BPS: i32 = 150;

pub const DEFAULT_MONTHLY_SUBSCRIPTION: i64 = 1_000;

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone, PartialEq)]
pub struct SystemSettings {
    pub credit_ceiling: i64,
    pub cash_bill_interest_bps: i32,
    pub default_monthly_subscription: i64,
    pub updated_by: Option<Uuid>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl SystemSettings {
    pub fn with_ceiling(credit_ceiling: i64) -> Self {
        Self {
            credit_ceiling,
            cash_bill_interest_bps: DEFAULT_CASH_BILL_INTEREST_BPS,
            default_monthly_subscription: DEFAULT_MONTHLY_SUBSCRIPTION,
            updated_by: None,
            updated_at: None,
        }
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct UpdateSettingsRequest {
    #[validate(range(min = 0))]
    pub credit_ceiling: Option<i64>,
    #[validate(range(min = 0, max = 10000))]
    pub cash_bill_interest_bps: Option<i32>,
    #[validate(range(min = 0))]
    pub default_monthly_subscription: Option<i64>,
}

#[derive(Clone)]
pub struct SettingsService {
    db_pool: PgPool,
    defaults: SystemSettings,
}

impl SettingsService {
    pub fn new(db_pool: PgPool, default_credit_ceiling: i64) -> Self {
        Self {
            db_pool,
            defaults: SystemSettings::with_ceiling(default_credit_ceiling),
        }
    }

    /// Current settings, falling back to configured defaults before the
    /// first admin write.
    pub async fn get(&self) -> Result<SystemSettings, ApiError> {
        let stored = sqlx::query_as::<_, SystemSettings>(
            r#"
            SELECT credit_ceiling, cash_bill_interest_bps, default_monthly_subscription,
                   updated_by, updated_at
            FROM system_settings
            WHERE id = 1
            "#,
        )
        .fetch_optional(&self.db_pool)
        .await?;

        Ok(stored.unwrap_or_else(|| self.defaults.clone()))
    }

    pub async fn update(
        &self,
        request: UpdateSettingsRequest,
        admin_id: Uuid,
    ) -> Result<SystemSettings, ApiError> {
        request.validate()?;
        let current = self.get().await?;

        let settings = sqlx::query_as::<_, SystemSettings>(
            r#"
            INSERT INTO system_settings (
                id, credit_ceiling, cash_bill_interest_bps, default_monthly_subscription,
                updated_by, updated_at
            )
            VALUES (1, $1, $2, $3, $4, $5)
            ON CONFLICT (id) DO UPDATE SET
                credit_ceiling = EXCLUDED.credit_ceiling,
                cash_bill_interest_bps = EXCLUDED.cash_bill_interest_bps,
                default_monthly_subscription = EXCLUDED.default_monthly_subscription,
                updated_by = EXCLUDED.updated_by,
                updated_at = EXCLUDED.updated_at
            RETURNING credit_ceiling, cash_bill_interest_bps, default_monthly_subscription,
                      updated_by, updated_at
            "#,
        )
        .bind(request.credit_ceiling.unwrap_or(current.credit_ceiling))
        .bind(
            request
                .cash_bill_interest_bps
                .unwrap_or(current.cash_bill_interest_bps),
        )
        .bind(
            request
                .default_monthly_subscription
                .unwrap_or(current.default_monthly_subscription),
        )
        .bind(admin_id)
        .bind(Utc::now())
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(
            admin_id = %admin_id,
            credit_ceiling = settings.credit_ceiling,
            cash_bill_interest_bps = settings.cash_bill_interest_bps,
            "System settings updated"
        );

        Ok(settings)
    }
}
