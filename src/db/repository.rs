use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use crate::{
    access::{SubscriptionRecord, SubscriptionStatus, Tier, UsageEvent, UsageWindow},
    db::models::{InvitationRow, StudentFeeRow, StudentRow, SubscriptionRow},
    fees::{FeeStore, Student, StudentFee},
    invitations::{InvitationCode, InvitationStore, InviteRole},
    store::{StoreError, SubscriptionSource, UsageEventLog},
};

pub struct Repository {
    pool: Arc<PgPool>,
}

impl Repository {
    pub fn new(pool: Arc<PgPool>) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn set_subscription(
        &self,
        actor_id: &str,
        tier: Tier,
        status: SubscriptionStatus,
    ) -> Result<SubscriptionRecord, StoreError> {
        sqlx::query(
            r#"
            INSERT INTO subscriptions (actor_id, tier, status)
            VALUES ($1, $2, $3)
            ON CONFLICT (actor_id) DO UPDATE
            SET tier = EXCLUDED.tier, status = EXCLUDED.status, updated_at = NOW()
            "#,
        )
        .bind(actor_id)
        .bind(tier.to_string())
        .bind(status.to_string())
        .execute(self.pool())
        .await?;

        self.fetch_subscription(actor_id).await
    }
}

#[async_trait]
impl SubscriptionSource for Repository {
    async fn fetch_subscription(&self, actor_id: &str) -> Result<SubscriptionRecord, StoreError> {
        let row = sqlx::query_as::<_, SubscriptionRow>(
            r#"
            SELECT p.role, s.tier, s.status
            FROM profiles p
            LEFT JOIN subscriptions s ON s.actor_id = p.id
            WHERE p.id = $1
            "#,
        )
        .bind(actor_id)
        .fetch_optional(self.pool())
        .await?;

        row.map(SubscriptionRecord::from)
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", actor_id)))
    }
}

#[async_trait]
impl UsageEventLog for Repository {
    async fn append(&self, event: &UsageEvent) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO ai_usage_logs (actor_id, feature_id, created_at)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(&event.actor_id)
        .bind(&event.feature_id)
        .bind(event.occurred_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn count(&self, actor_id: &str, window: &UsageWindow) -> Result<u64, StoreError> {
        let count: i64 = sqlx::query_scalar(
            r#"
            SELECT COUNT(*) FROM ai_usage_logs
            WHERE actor_id = $1 AND created_at >= $2 AND created_at < $3
            "#,
        )
        .bind(actor_id)
        .bind(window.start)
        .bind(window.end)
        .fetch_one(self.pool())
        .await?;

        Ok(u64::try_from(count).unwrap_or(0))
    }
}

#[async_trait]
impl InvitationStore for Repository {
    async fn insert_invitation(&self, invitation: &InvitationCode) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO invitation_codes
            (code, preschool_id, invited_by, role, email, max_uses, uses, expires_at, revoked, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(&invitation.code)
        .bind(&invitation.preschool_id)
        .bind(&invitation.invited_by)
        .bind(invitation.role.to_string())
        .bind(&invitation.email)
        .bind(i32::try_from(invitation.max_uses).unwrap_or(i32::MAX))
        .bind(i32::try_from(invitation.uses).unwrap_or(i32::MAX))
        .bind(invitation.expires_at)
        .bind(invitation.revoked)
        .bind(invitation.created_at)
        .execute(self.pool())
        .await?;

        Ok(())
    }

    async fn get_invitation(&self, code: &str) -> Result<Option<InvitationCode>, StoreError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            "SELECT * FROM invitation_codes WHERE code = $1",
        )
        .bind(code)
        .fetch_optional(self.pool())
        .await?;

        row.map(InvitationCode::try_from).transpose()
    }

    async fn find_open_invitation(
        &self,
        preschool_id: &str,
        role: InviteRole,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InvitationCode>, StoreError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r#"
            SELECT * FROM invitation_codes
            WHERE preschool_id = $1 AND role = $2 AND email = $3
              AND NOT revoked AND uses < max_uses AND expires_at > $4
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(preschool_id)
        .bind(role.to_string())
        .bind(email)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(InvitationCode::try_from).transpose()
    }

    async fn consume_invitation(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InvitationCode>, StoreError> {
        let row = sqlx::query_as::<_, InvitationRow>(
            r#"
            UPDATE invitation_codes
            SET uses = uses + 1
            WHERE code = $1 AND NOT revoked AND uses < max_uses AND expires_at > $2
            RETURNING *
            "#,
        )
        .bind(code)
        .bind(now)
        .fetch_optional(self.pool())
        .await?;

        row.map(InvitationCode::try_from).transpose()
    }

    async fn revoke_invitation(&self, code: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("UPDATE invitation_codes SET revoked = TRUE WHERE code = $1")
            .bind(code)
            .execute(self.pool())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl FeeStore for Repository {
    async fn active_students(&self, preschool_id: &str) -> Result<Vec<Student>, StoreError> {
        let rows = sqlx::query_as::<_, StudentRow>(
            r#"
            SELECT * FROM students
            WHERE preschool_id = $1 AND is_active = true
            ORDER BY last_name, first_name
            "#,
        )
        .bind(preschool_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(Student::from).collect())
    }

    async fn insert_fee_if_absent(&self, fee: &StudentFee) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            INSERT INTO student_fees
            (id, student_id, preschool_id, billing_month, amount_cents, due_date, paid_at, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ON CONFLICT (student_id, billing_month) DO NOTHING
            "#,
        )
        .bind(&fee.id)
        .bind(&fee.student_id)
        .bind(&fee.preschool_id)
        .bind(fee.billing_month)
        .bind(fee.amount_cents)
        .bind(fee.due_date)
        .bind(fee.paid_at)
        .bind(fee.created_at)
        .execute(self.pool())
        .await?;

        Ok(result.rows_affected() == 1)
    }

    async fn unpaid_fees(&self, preschool_id: &str) -> Result<Vec<StudentFee>, StoreError> {
        let rows = sqlx::query_as::<_, StudentFeeRow>(
            r#"
            SELECT * FROM student_fees
            WHERE preschool_id = $1 AND paid_at IS NULL
            ORDER BY due_date ASC
            "#,
        )
        .bind(preschool_id)
        .fetch_all(self.pool())
        .await?;

        Ok(rows.into_iter().map(StudentFee::from).collect())
    }

    async fn mark_fee_paid(
        &self,
        fee_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<StudentFee>, StoreError> {
        let row = sqlx::query_as::<_, StudentFeeRow>(
            r#"
            UPDATE student_fees
            SET paid_at = COALESCE(paid_at, $2)
            WHERE id = $1
            RETURNING *
            "#,
        )
        .bind(fee_id)
        .bind(paid_at)
        .fetch_optional(self.pool())
        .await?;

        Ok(row.map(StudentFee::from))
    }
}
