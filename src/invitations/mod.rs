//! Invitation codes that let teachers and parents join a preschool.
//!
//! Codes live in exactly one store; there is no device-local copy to keep
//! in sync.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{clock::Clock, store::StoreError};

pub const CODE_LENGTH: usize = 8;
const CODE_ALPHABET: &[u8; 32] = b"ABCDEFGHJKLMNPQRSTUVWXYZ23456789";
const MAX_CODE_ATTEMPTS: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteRole {
    Teacher,
    Parent,
}

impl fmt::Display for InviteRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InviteRole::Teacher => write!(f, "teacher"),
            InviteRole::Parent => write!(f, "parent"),
        }
    }
}

impl FromStr for InviteRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "teacher" => Ok(InviteRole::Teacher),
            "parent" => Ok(InviteRole::Parent),
            other => Err(format!("unknown invitation role: {}", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvitationCode {
    pub code: String,
    pub preschool_id: String,
    pub invited_by: String,
    pub role: InviteRole,
    pub email: Option<String>,
    pub max_uses: u32,
    pub uses: u32,
    pub expires_at: DateTime<Utc>,
    pub revoked: bool,
    pub created_at: DateTime<Utc>,
}

impl InvitationCode {
    pub fn check(&self, now: DateTime<Utc>) -> Result<(), InvitationError> {
        if self.revoked {
            return Err(InvitationError::Revoked(self.code.clone()));
        }
        if now >= self.expires_at {
            return Err(InvitationError::Expired(self.code.clone()));
        }
        if self.uses >= self.max_uses {
            return Err(InvitationError::Exhausted(self.code.clone()));
        }
        Ok(())
    }

    pub fn remaining_uses(&self) -> u32 {
        self.max_uses.saturating_sub(self.uses)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NewInvitation {
    pub preschool_id: String,
    pub invited_by: String,
    pub role: InviteRole,
    pub email: Option<String>,
    pub max_uses: Option<u32>,
    pub expires_in_days: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InvitationError {
    #[error("Invitation code not found: {0}")]
    NotFound(String),
    #[error("Invitation code revoked: {0}")]
    Revoked(String),
    #[error("Invitation code expired: {0}")]
    Expired(String),
    #[error("Invitation code has no uses left: {0}")]
    Exhausted(String),
    #[error("Invalid invitation: {0}")]
    Invalid(String),
    #[error("Could not allocate a unique code after {0} attempts")]
    CodeSpaceExhausted(usize),
    #[error(transparent)]
    Store(#[from] StoreError),
}

#[async_trait]
pub trait InvitationStore: Send + Sync {
    /// `Conflict` when the code is already taken.
    async fn insert_invitation(&self, invitation: &InvitationCode) -> Result<(), StoreError>;

    async fn get_invitation(&self, code: &str) -> Result<Option<InvitationCode>, StoreError>;

    /// Newest code for the same preschool, role and email that can still be redeemed.
    async fn find_open_invitation(
        &self,
        preschool_id: &str,
        role: InviteRole,
        email: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InvitationCode>, StoreError>;

    /// Increments `uses` only if the code is unrevoked, unexpired and has
    /// uses left. `None` when the condition did not hold.
    async fn consume_invitation(
        &self,
        code: &str,
        now: DateTime<Utc>,
    ) -> Result<Option<InvitationCode>, StoreError>;

    async fn revoke_invitation(&self, code: &str) -> Result<bool, StoreError>;
}

/// Eight symbols from an alphabet without 0/O and 1/I look-alikes.
pub fn generate_code() -> String {
    let bytes = uuid::Uuid::new_v4().into_bytes();
    // bytes 6 and 8 carry the version and variant bits
    bytes
        .iter()
        .enumerate()
        .filter(|(i, _)| *i != 6 && *i != 8)
        .map(|(_, b)| b)
        .take(CODE_LENGTH)
        .map(|b| CODE_ALPHABET[usize::from(*b) % CODE_ALPHABET.len()] as char)
        .collect()
}

pub fn normalize_code(raw: &str) -> String {
    raw.trim().to_uppercase()
}

fn normalize_email(raw: &str) -> Option<String> {
    let email = raw.trim().to_lowercase();
    if email.is_empty() { None } else { Some(email) }
}

pub struct InvitationService {
    store: Arc<dyn InvitationStore>,
    clock: Arc<dyn Clock>,
    default_expiry_days: i64,
    default_max_uses: u32,
}

impl InvitationService {
    pub fn new(
        store: Arc<dyn InvitationStore>,
        clock: Arc<dyn Clock>,
        default_expiry_days: i64,
        default_max_uses: u32,
    ) -> Self {
        Self {
            store,
            clock,
            default_expiry_days,
            default_max_uses,
        }
    }

    /// Creates a code, or returns the open one already issued to the same
    /// email for the same preschool and role.
    pub async fn create(&self, request: NewInvitation) -> Result<InvitationCode, InvitationError> {
        let now = self.clock.now();

        if request.preschool_id.trim().is_empty() {
            return Err(InvitationError::Invalid("preschool_id is required".into()));
        }
        let max_uses = request.max_uses.unwrap_or(self.default_max_uses);
        if max_uses == 0 {
            return Err(InvitationError::Invalid("max_uses must be > 0".into()));
        }
        let expires_in_days = request.expires_in_days.unwrap_or(self.default_expiry_days);
        if expires_in_days <= 0 {
            return Err(InvitationError::Invalid("expiry must be in the future".into()));
        }

        let email = request.email.as_deref().and_then(normalize_email);

        if let Some(email) = &email {
            if let Some(existing) = self
                .store
                .find_open_invitation(&request.preschool_id, request.role, email, now)
                .await?
            {
                info!(
                    code = %existing.code,
                    preschool = %existing.preschool_id,
                    "Reusing open invitation"
                );
                return Ok(existing);
            }
        }

        for attempt in 1..=MAX_CODE_ATTEMPTS {
            let invitation = InvitationCode {
                code: generate_code(),
                preschool_id: request.preschool_id.clone(),
                invited_by: request.invited_by.clone(),
                role: request.role,
                email: email.clone(),
                max_uses,
                uses: 0,
                expires_at: now + Duration::days(expires_in_days),
                revoked: false,
                created_at: now,
            };

            match self.store.insert_invitation(&invitation).await {
                Ok(()) => {
                    info!(
                        code = %invitation.code,
                        preschool = %invitation.preschool_id,
                        role = %invitation.role,
                        "Invitation created"
                    );
                    return Ok(invitation);
                }
                Err(StoreError::Conflict(_)) => {
                    warn!(attempt, "Invitation code collision, retrying");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(InvitationError::CodeSpaceExhausted(MAX_CODE_ATTEMPTS))
    }

    pub async fn lookup(&self, code: &str) -> Result<InvitationCode, InvitationError> {
        let code = normalize_code(code);
        self.store
            .get_invitation(&code)
            .await?
            .ok_or(InvitationError::NotFound(code))
    }

    /// Like `lookup`, but also fails when the code can no longer be redeemed.
    pub async fn validate(&self, code: &str) -> Result<InvitationCode, InvitationError> {
        let invitation = self.lookup(code).await?;
        invitation.check(self.clock.now())?;
        Ok(invitation)
    }

    pub async fn redeem(&self, code: &str) -> Result<InvitationCode, InvitationError> {
        let code = normalize_code(code);
        let now = self.clock.now();

        match self.store.consume_invitation(&code, now).await? {
            Some(invitation) => {
                info!(
                    code = %invitation.code,
                    uses = invitation.uses,
                    max_uses = invitation.max_uses,
                    "Invitation redeemed"
                );
                Ok(invitation)
            }
            None => {
                // report why the conditional update did not match
                let invitation = self.lookup(&code).await?;
                invitation.check(now)?;
                Err(InvitationError::Exhausted(code))
            }
        }
    }

    pub async fn revoke(&self, code: &str) -> Result<(), InvitationError> {
        let code = normalize_code(code);
        if self.store.revoke_invitation(&code).await? {
            info!(code = %code, "Invitation revoked");
            Ok(())
        } else {
            Err(InvitationError::NotFound(code))
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::{clock::FixedClock, store::MemoryStore};

    fn service(store: &Arc<MemoryStore>, clock: &Arc<FixedClock>) -> InvitationService {
        InvitationService::new(store.clone(), clock.clone(), 7, 1)
    }

    fn request(email: Option<&str>) -> NewInvitation {
        NewInvitation {
            preschool_id: "school-1".into(),
            invited_by: "principal-1".into(),
            role: InviteRole::Teacher,
            email: email.map(String::from),
            max_uses: None,
            expires_in_days: None,
        }
    }

    fn setup() -> (Arc<MemoryStore>, Arc<FixedClock>) {
        (
            Arc::new(MemoryStore::new()),
            Arc::new(FixedClock::new(Utc.with_ymd_and_hms(2026, 10, 19, 8, 0, 0).unwrap())),
        )
    }

    #[test]
    fn generated_codes_use_the_unambiguous_alphabet() {
        for _ in 0..100 {
            let code = generate_code();
            assert_eq!(code.len(), CODE_LENGTH);
            assert!(code.bytes().all(|b| CODE_ALPHABET.contains(&b)));
            assert!(!code.contains('O') && !code.contains('0') && !code.contains('I'));
        }
    }

    #[test]
    fn every_position_draws_from_the_whole_alphabet() {
        let mut seen = vec![std::collections::HashSet::new(); CODE_LENGTH];
        for _ in 0..4000 {
            for (i, b) in generate_code().bytes().enumerate() {
                seen[i].insert(b);
            }
        }
        for symbols in &seen {
            assert_eq!(symbols.len(), CODE_ALPHABET.len());
        }
    }

    #[tokio::test]
    async fn create_applies_defaults() {
        let (store, clock) = setup();
        let invitations = service(&store, &clock);

        let invite = invitations.create(request(None)).await.unwrap();
        assert_eq!(invite.max_uses, 1);
        assert_eq!(invite.uses, 0);
        assert_eq!(invite.expires_at, clock.now() + Duration::days(7));
        assert_eq!(invitations.validate(&invite.code.to_lowercase()).await.unwrap(), invite);
    }

    #[tokio::test]
    async fn same_email_reuses_open_code() {
        let (store, clock) = setup();
        let invitations = service(&store, &clock);

        let first = invitations.create(request(Some("Thandi@Example.com"))).await.unwrap();
        let second = invitations.create(request(Some(" thandi@example.com "))).await.unwrap();
        assert_eq!(first.code, second.code);
        assert_eq!(first.email.as_deref(), Some("thandi@example.com"));

        // without an email every request is a new code
        let a = invitations.create(request(None)).await.unwrap();
        let b = invitations.create(request(None)).await.unwrap();
        assert_ne!(a.code, b.code);
    }

    #[tokio::test]
    async fn redeem_enforces_max_uses() {
        let (store, clock) = setup();
        let invitations = service(&store, &clock);

        let mut req = request(None);
        req.max_uses = Some(2);
        let invite = invitations.create(req).await.unwrap();

        assert_eq!(invitations.redeem(&invite.code).await.unwrap().uses, 1);
        assert_eq!(invitations.redeem(&invite.code).await.unwrap().uses, 2);
        assert!(matches!(
            invitations.redeem(&invite.code).await,
            Err(InvitationError::Exhausted(_))
        ));
    }

    #[tokio::test]
    async fn expired_codes_cannot_be_redeemed_or_reused() {
        let (store, clock) = setup();
        let invitations = service(&store, &clock);

        let invite = invitations.create(request(Some("a@b.co"))).await.unwrap();
        clock.advance(Duration::days(7));

        assert!(matches!(
            invitations.redeem(&invite.code).await,
            Err(InvitationError::Expired(_))
        ));

        let fresh = invitations.create(request(Some("a@b.co"))).await.unwrap();
        assert_ne!(fresh.code, invite.code);
    }

    #[tokio::test]
    async fn revoked_codes_are_rejected() {
        let (store, clock) = setup();
        let invitations = service(&store, &clock);

        let invite = invitations.create(request(None)).await.unwrap();
        invitations.revoke(&invite.code).await.unwrap();

        assert!(matches!(
            invitations.redeem(&invite.code).await,
            Err(InvitationError::Revoked(_))
        ));
        assert!(matches!(
            invitations.revoke("NOPE2345").await,
            Err(InvitationError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn rejects_bad_requests() {
        let (store, clock) = setup();
        let invitations = service(&store, &clock);

        let mut req = request(None);
        req.max_uses = Some(0);
        assert!(matches!(invitations.create(req).await, Err(InvitationError::Invalid(_))));

        let mut req = request(None);
        req.expires_in_days = Some(-1);
        assert!(matches!(invitations.create(req).await, Err(InvitationError::Invalid(_))));
    }

    #[tokio::test]
    async fn unknown_code_is_not_found() {
        let (store, clock) = setup();
        let invitations = service(&store, &clock);
        assert!(matches!(
            invitations.redeem("zzzz2222").await,
            Err(InvitationError::NotFound(code)) if code == "ZZZZ2222"
        ));
    }
}
