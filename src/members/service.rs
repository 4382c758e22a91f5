use chrono::Utc;
use sqlx::PgPool;
use uuid::Uuid;
use validator::Validate;

use super::model::{
    CreateMemberRequest, Member, MemberFilter, MemberRole, RegisterProfileRequest,
    UpdateMemberRequest,
};
use crate::db::{is_foreign_key_violation, is_unique_violation};
use crate::error::ApiError;
use crate::models::{PaginatedResponse, PaginationParams};

const MEMBER_CODE_CONSTRAINT: &str = "profiles_member_code_key";
const PROFILE_PKEY_CONSTRAINT: &str = "profiles_pkey";

#[derive(Clone)]
pub struct MemberService {
    db_pool: PgPool,
}

impl MemberService {
    pub fn new(db_pool: PgPool) -> Self {
        Self { db_pool }
    }

    pub async fn find_member(&self, id: Uuid) -> Result<Option<Member>, ApiError> {
        let member = sqlx::query_as::<_, Member>("SELECT * FROM profiles WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.db_pool)
            .await?;
        Ok(member)
    }

    pub async fn get_member(&self, id: Uuid) -> Result<Member, ApiError> {
        self.find_member(id)
            .await?
            .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))
    }

    pub async fn list_members(
        &self,
        filter: MemberFilter,
    ) -> Result<PaginatedResponse<Member>, ApiError> {
        let (page, limit, offset) = PaginationParams {
            page: filter.page,
            limit: filter.limit,
        }
        .resolve();

        let mut query_builder = sqlx::QueryBuilder::new("SELECT * FROM profiles WHERE 1=1");
        let mut count_builder = sqlx::QueryBuilder::new("SELECT COUNT(*) FROM profiles WHERE 1=1");

        if let Some(role) = filter.role {
            query_builder.push(" AND role = ");
            query_builder.push_bind(role);
            count_builder.push(" AND role = ");
            count_builder.push_bind(role);
        }

        if let Some(search) = filter.search.as_deref().map(str::trim).filter(|s| !s.is_empty()) {
            let pattern = format!("%{}%", search);
            query_builder.push(" AND (full_name ILIKE ");
            query_builder.push_bind(pattern.clone());
            query_builder.push(" OR member_code ILIKE ");
            query_builder.push_bind(pattern.clone());
            query_builder.push(")");
            count_builder.push(" AND (full_name ILIKE ");
            count_builder.push_bind(pattern.clone());
            count_builder.push(" OR member_code ILIKE ");
            count_builder.push_bind(pattern);
            count_builder.push(")");
        }

        let total: i64 = count_builder
            .build_query_scalar()
            .fetch_one(&self.db_pool)
            .await?;

        query_builder.push(" ORDER BY member_code LIMIT ");
        query_builder.push_bind(limit);
        query_builder.push(" OFFSET ");
        query_builder.push_bind(offset);

        let members = query_builder
            .build_query_as::<Member>()
            .fetch_all(&self.db_pool)
            .await?;

        Ok(PaginatedResponse {
            data: members,
            total,
            page,
            limit,
        })
    }

    /// Create the caller's own profile with the `member` role.
    pub async fn register_profile(
        &self,
        user_id: Uuid,
        request: RegisterProfileRequest,
        default_subscription: i64,
    ) -> Result<Member, ApiError> {
        request.validate()?;

        let member = self
            .insert_member(
                user_id,
                &request.full_name,
                request.email.as_deref(),
                request.phone.as_deref(),
                MemberRole::Member,
                None,
                default_subscription,
                0,
            )
            .await?;

        tracing::info!(member_id = %member.id, member_code = %member.member_code, "Profile registered");
        Ok(member)
    }

    pub async fn create_member(
        &self,
        request: CreateMemberRequest,
        default_subscription: i64,
    ) -> Result<Member, ApiError> {
        request.validate()?;

        let member = self
            .insert_member(
                request.id,
                &request.full_name,
                request.email.as_deref(),
                request.phone.as_deref(),
                request.role.unwrap_or(MemberRole::Member),
                request.member_code.as_deref(),
                request.monthly_subscription.unwrap_or(default_subscription),
                request.outstanding_fine.unwrap_or(0),
            )
            .await?;

        tracing::info!(member_id = %member.id, member_code = %member.member_code, "Member created");
        Ok(member)
    }

    #[allow(clippy::too_many_arguments)]
    async fn insert_member(
        &self,
        id: Uuid,
        full_name: &str,
        email: Option<&str>,
        phone: Option<&str>,
        role: MemberRole,
        member_code: Option<&str>,
        monthly_subscription: i64,
        outstanding_fine: i64,
    ) -> Result<Member, ApiError> {
        let now = Utc::now();
        sqlx::query_as::<_, Member>(
            r#"
            INSERT INTO profiles (
                id, full_name, email, phone, role, member_code,
                monthly_subscription, outstanding_fine, created_at, updated_at
            )
            VALUES (
                $1, $2, $3, $4, $5,
                COALESCE($6, 'M' || LPAD(nextval('member_code_seq')::TEXT, 4, '0')),
                $7, $8, $9, $9
            )
            RETURNING *
            "#,
        )
        .bind(id)
        .bind(full_name.trim())
        .bind(email)
        .bind(phone)
        .bind(role)
        .bind(member_code)
        .bind(monthly_subscription)
        .bind(outstanding_fine)
        .bind(now)
        .fetch_one(&self.db_pool)
        .await
        .map_err(map_profile_write_error)
    }

    pub async fn update_member(
        &self,
        id: Uuid,
        request: UpdateMemberRequest,
    ) -> Result<Member, ApiError> {
        request.validate()?;

        let member = sqlx::query_as::<_, Member>(
            r#"
            UPDATE profiles
            SET full_name = COALESCE($1, full_name),
                email = COALESCE($2, email),
                phone = COALESCE($3, phone),
                role = COALESCE($4, role),
                member_code = COALESCE($5, member_code),
                monthly_subscription = COALESCE($6, monthly_subscription),
                outstanding_fine = COALESCE($7, outstanding_fine),
                updated_at = $8
            WHERE id = $9
            RETURNING *
            "#,
        )
        .bind(request.full_name.as_deref().map(str::trim))
        .bind(request.email)
        .bind(request.phone)
        .bind(request.role)
        .bind(request.member_code)
        .bind(request.monthly_subscription)
        .bind(request.outstanding_fine)
        .bind(Utc::now())
        .bind(id)
        .fetch_optional(&self.db_pool)
        .await
        .map_err(map_profile_write_error)?
        .ok_or_else(|| ApiError::NotFound("Member not found".to_string()))?;

        tracing::info!(member_id = %id, role = ?member.role, "Member updated");
        Ok(member)
    }

    /// Hard delete. Members with loans or ledger history cannot be removed;
    /// set their role to `inactive` instead.
    pub async fn delete_member(&self, id: Uuid) -> Result<(), ApiError> {
        let result = sqlx::query("DELETE FROM profiles WHERE id = $1")
            .bind(id)
            .execute(&self.db_pool)
            .await
            .map_err(|e| {
                if is_foreign_key_violation(&e) {
                    ApiError::Conflict(
                        "Member has loans or ledger history; set the role to inactive instead"
                            .to_string(),
                    )
                } else {
                    e.into()
                }
            })?;

        if result.rows_affected() == 0 {
            return Err(ApiError::NotFound("Member not found".to_string()));
        }

        tracing::warn!(member_id = %id, "Member deleted");
        Ok(())
    }
}

fn map_profile_write_error(err: sqlx::Error) -> ApiError {
    if is_unique_violation(&err, MEMBER_CODE_CONSTRAINT) {
        ApiError::Conflict("Member code is already in use".to_string())
    } else if is_unique_violation(&err, PROFILE_PKEY_CONSTRAINT) {
        ApiError::Conflict("A profile already exists for this user".to_string())
    } else {
        err.into()
    }
}
