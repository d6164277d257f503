use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::{
    access::SubscriptionRecord,
    fees::{Student, StudentFee},
    invitations::InvitationCode,
    store::StoreError,
};

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct SubscriptionRow {
    pub role: Option<String>,
    pub tier: Option<String>,
    pub status: Option<String>,
}

impl From<SubscriptionRow> for SubscriptionRecord {
    fn from(row: SubscriptionRow) -> Self {
        Self {
            tier: row.tier,
            status: row.status,
            role: row.role,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct InvitationRow {
    pub code: String,
    pub preschool_id: String,
    pub invited_by: String,
    pub role: String,
    pub email: Option<String>,
    pub max_uses: i32,
    pub uses: i32,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl TryFrom<InvitationRow> for InvitationCode {
    type Error = StoreError;

    fn try_from(row: InvitationRow) -> Result<Self, Self::Error> {
        Ok(Self {
            role: row.role.parse().map_err(StoreError::Malformed)?,
            max_uses: u32::try_from(row.max_uses)
                .map_err(|_| StoreError::Malformed(format!("max_uses {}", row.max_uses)))?,
            uses: u32::try_from(row.uses)
                .map_err(|_| StoreError::Malformed(format!("uses {}", row.uses)))?,
            code: row.code,
            preschool_id: row.preschool_id,
            invited_by: row.invited_by,
            email: row.email,
            expires_at: row.expires_at,
            revoked: row.revoked,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentRow {
    pub id: String,
    pub preschool_id: String,
    pub first_name: String,
    pub last_name: String,
    pub date_of_birth: NaiveDate,
    pub is_active: bool,
}

impl From<StudentRow> for Student {
    fn from(row: StudentRow) -> Self {
        Self {
            id: row.id,
            preschool_id: row.preschool_id,
            first_name: row.first_name,
            last_name: row.last_name,
            date_of_birth: row.date_of_birth,
            active: row.is_active,
        }
    }
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct StudentFeeRow {
    pub id: String,
    pub student_id: String,
    pub preschool_id: String,
    pub billing_month: NaiveDate,
    pub amount_cents: i64,
    pub due_date: NaiveDate,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl From<StudentFeeRow> for StudentFee {
    fn from(row: StudentFeeRow) -> Self {
        Self {
            id: row.id,
            student_id: row.student_id,
            preschool_id: row.preschool_id,
            billing_month: row.billing_month,
            amount_cents: row.amount_cents,
            due_date: row.due_date,
            paid_at: row.paid_at,
            created_at: row.created_at,
        }
    }
}
