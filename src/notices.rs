//! Admin announcements

use chrono::Utc;
use serde::{Deserialize, Serialize};
use sqlx::types::chrono::DateTime;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use crate::error::ApiError;

/// Ordered lowest to highest; listing shows the most urgent first.
#[derive(Debug, Serialize, Deserialize, sqlx::Type, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[sqlx(type_name = "notice_priority", rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NoticePriority {
    Low,
    Normal,
    High,
    Urgent,
}

#[derive(Debug, Serialize, Deserialize, sqlx::FromRow, Clone)]
pub struct Notice {
    pub id: Uuid,
    pub title: String,
    pub body: String,
    pub priority: NoticePriority,
    pub created_by: Uuid,
    pub expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct CreateNoticeRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 5000))]
    pub body: String,
    pub priority: Option<NoticePriority>,
    pub expires_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
pub struct NoticeFilter {
    #[serde(default)]
    pub include_expired: bool,
}

#[derive(Clone)]
pub struct NoticeService {
    db_pool: PgPool,
}

impl NoticeService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn create(
        &self,
        request: CreateNoticeRequest,
        admin_id: Uuid,
    ) -> Result<Notice, ApiError> {
        request.validate()?;
        let now = Utc::now();
        if matches!(request.expires_at, Some(expires_at) if expires_at <= now) {
            return Err(ApiError::ValidationError(
                "expires_at must be in the future".to_string(),
            ));
        }

        let notice = sqlx::query_as::<_, Notice>(
            r#"
            INSERT INTO notices (title, body, priority, created_by, expires_at, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $6)
            RETURNING *
            "#,
        )
        .bind(request.title.trim())
        .bind(&request.body)
        .bind(request.priority.unwrap_or(NoticePriority::Normal))
        .bind(admin_id)
        .bind(request.expires_at)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await?;

        tracing::info!(notice_id = %notice.id, priority = ?notice.priority, "Notice published");
        Ok(notice)
    }

    pub async fn list(&self, filter: &NoticeFilter) -> Result<Vec<Notice>, ApiError> {
        let notices = sqlx::query_as::<_, Notice>(
            r#"
            SELECT * FROM notices
            WHERE $1 OR expires_at IS NULL OR expires_at > $2
            ORDER BY priority DESC, created_at DESC
            "#,
        )
        .bind(filter.include_expired)
        .bind(Utc::now())
        .fetch_all(&self.db_pool)
        .await?;
        Ok(notices)
    }

    pub async fn delete(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM notices WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Notice not found".to_string()));
        }
        Ok(())
    }
}
