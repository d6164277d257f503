use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use crate::{
    access::{SubscriptionRecord, UsageEvent, UsageWindow},
    fees::{FeeStore, Student, StudentFee},
    invitations::{InvitationCode, InvitationStore, InviteRole},
    store::{StoreError, SubscriptionSource, UsageEventLog},
};

/// Process-local store backing every boundary trait. Used by tests and by
/// the server when no database is configured.
#[derive(Debug, Default)]
pub struct MemoryStore {
    subscriptions: RwLock<HashMap<String, SubscriptionRecord>>,
    usage: RwLock<Vec<UsageEvent>>,
    invitations: RwLock<HashMap<String, InvitationCode>>,
    students: RwLock<Vec<Student>>,
    fees: RwLock<Vec<StudentFee>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_subscription(&self, actor_id: &str, record: SubscriptionRecord) {
        self.subscriptions
            .write()
            .await
            .insert(actor_id.to_string(), record);
    }

    pub async fn add_student(&self, student: Student) {
        self.students.write().await.push(student);
    }

    pub async fn usage_events(&self) -> Vec<UsageEvent> {
        self.usage.read().await.clone()
    }

    pub async fn fees(&self) -> Vec<StudentFee> {
        self.fees.read().await.clone()
    }

    /// Makes every read fail with `Unavailable` until switched off.
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    fn check_read(&self) -> Result<(), StoreError> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store reads disabled".into()));
        }
        Ok(())
    }

    fn check_write(&self) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("memory store writes disabled".into()));
        }
        Ok(())
    }
}

#[async_trait]
impl SubscriptionSource for MemoryStore {
    async fn fetch_subscription(&self, actor_id: &str) -> Result<SubscriptionRecord, StoreError> {
        self.check_read()?;
        self.subscriptions
            .read()
            .await
            .get(actor_id)
            .cloned()
            .ok_or_else(|| StoreError::NotFound(format!("profile {}", actor_id)))
    }
}

#[async_trait]
impl UsageEventLog for MemoryStore {
    async fn append(&self, event: &UsageEvent) -> Result<(), StoreError> {
        self.check_write()?;
        self.usage.write().await.push(event.clone());
        Ok(())
    }

    async fn count(&self, actor_id: &str, window: &UsageWindow) -> Result<u64, StoreError> {
        self.check_read()?;
        let count = self
            .usage
            .read()
            .await
            .iter()
            .filter(|e| e.actor_id == actor_id && window.contains(e.occurred_at))
            .count();
        Ok(count as u64)
    }
}

#[async_trait]
impl InvitationStore for MemoryStore {
    async fn insert_invitation(&self, invitation: &InvitationCode) -> Result<(), StoreError> {
        self.check_write()?;
        let mut invitations = self.invitations.write().await;
        if invitations.contains_key(&invitation.code) {
            return Err(StoreError::Conflict(format!(
                "invitation code {}",
                invitation.code
            )));
        }
        invitations.insert(invitation.code.clone(), invitation.clone());
        Ok(())
    }

    async fn get_invitation(&self, code: &str) -> Result<Option<InvitationCode>, StoreError> {
        self.check_read()?;
        Ok(self.invitations.read().await.get(code).cloned())
    }

    async fn find_open_invitation(
        &self,
        preschool_id: &str,
        role: InviteRole,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InvitationCode>, StoreError> {
        self.check_read()?;
        Ok(self
            .invitations
            .read()
            .await
            .values()
            .filter(|i| {
                i.preschool_id == preschool_id
                    && i.role == role
                    && i.email.as_deref() == Some(email)
                    && i.check(now).is_ok()
            })
            .max_by_key(|i| i.created_at)
            .cloned())
    }

    async fn consume_invitation(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InvitationCode>, StoreError> {
        self.check_write()?;
        let mut invitations = self.invitations.write().await;
        match invitations.get_mut(code) {
            Some(invitation) if invitation.check(now).is_ok() => {
                invitation.uses += 1;
                Ok(Some(invitation.clone()))
            }
            _ => Ok(None),
        }
    }

    async fn revoke_invitation(&self, code: &str) -> Result<bool, StoreError> {
        self.check_write()?;
        match self.invitations.write().await.get_mut(code) {
            Some(invitation) => {
                invitation.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[async_trait]
impl FeeStore for MemoryStore {
    async fn active_students(&self, preschool_id: &str) -> Result<Vec<Student>, StoreError> {
        self.check_read()?;
        Ok(self
            .students
            .read()
            .await
            .iter()
            .filter(|s| s.preschool_id == preschool_id && s.active)
            .cloned()
            .collect())
    }

    async fn insert_fee_if_absent(&self, fee: &StudentFee) -> Result<bool, StoreError> {
        self.check_write()?;
        let mut fees = self.fees.write().await;
        if fees
            .iter()
            .any(|f| f.student_id == fee.student_id && f.billing_month == fee.billing_month)
        {
            return Ok(false);
        }
        fees.push(fee.clone());
        Ok(true)
    }

    async fn unpaid_fees(&self, preschool_id: &str) -> Result<Vec<StudentFee>, StoreError> {
        self.check_read()?;
        let mut unpaid: Vec<StudentFee> = self
            .fees
            .read()
            .await
            .iter()
            .filter(|f| f.preschool_id == preschool_id && f.paid_at.is_none())
            .cloned()
            .collect();
        unpaid.sort_by_key(|f| f.due_date);
        Ok(unpaid)
    }

    async fn mark_fee_paid(
        &self,
        fee_id: &str,
        paid_at: DateTime<Utc>,
    ) -> Result<Option<StudentFee>, StoreError> {
        self.check_write()?;
        let mut fees = self.fees.write().await;
        Ok(fees.iter_mut().find(|f| f.id == fee_id).map(|fee| {
            fee.paid_at.get_or_insert(paid_at);
            fee.clone()
        }))
    }
}
