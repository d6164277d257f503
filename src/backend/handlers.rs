use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::{
    access::{
        AccessDecision, FeatureDescriptor, Role, Snapshot, SubscriptionStatus, Tier, TrackOutcome,
        UsageReport,
    },
    backend::{error::ApiError, state::AppState},
    db,
    fees::{BillingMonth, FeeGenerationReport, OverdueFee, StudentFee},
    invitations::{InvitationCode, NewInvitation},
    metrics::METRICS,
    utils::logs_fmt::abbrev,
};

#[derive(Debug, Deserialize)]
pub struct FeatureRequest {
    pub actor_id: String,
    pub feature_id: String,
}

/// Subscription plus usage as the API reports it.
#[derive(Debug, Serialize)]
pub struct SnapshotView {
    pub tier: Tier,
    pub status: SubscriptionStatus,
    pub role: Role,
    pub usage: UsageReport,
    pub degraded: bool,
}

impl From<&Snapshot> for SnapshotView {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            tier: snapshot.subscription.tier,
            status: snapshot.subscription.status,
            role: snapshot.subscription.role,
            usage: UsageReport::from(&snapshot.usage),
            degraded: snapshot.degraded,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CheckResponse {
    #[serde(flatten)]
    pub decision: AccessDecision,
    pub subscription: Option<SnapshotView>,
}

#[derive(Debug, Serialize)]
pub struct TrackResponse {
    pub actor_id: String,
    pub feature_id: String,
    pub outcome: TrackOutcome,
    pub recorded: bool,
    pub subscription: Option<SnapshotView>,
}

pub fn track_status(outcome: TrackOutcome) -> StatusCode {
    match outcome {
        TrackOutcome::Recorded | TrackOutcome::NotMetered | TrackOutcome::Bypassed => {
            StatusCode::OK
        }
        TrackOutcome::Denied => StatusCode::FORBIDDEN,
        TrackOutcome::UnknownActor => StatusCode::NOT_FOUND,
        TrackOutcome::QuotaExhausted => StatusCode::TOO_MANY_REQUESTS,
        TrackOutcome::WriteFailed => StatusCode::SERVICE_UNAVAILABLE,
    }
}

fn require_non_empty(field: &str, value: &str) -> Result<(), ApiError> {
    if value.trim().is_empty() {
        return Err(ApiError::InvalidRequest(format!("{} must not be empty", field)));
    }
    Ok(())
}

pub async fn health_handler(State(state): State<AppState>) -> impl IntoResponse {
    let database_ok = match &state.pool {
        Some(pool) => db::health_check(pool).await.is_ok(),
        None => true,
    };
    let status = if database_ok { "ok" } else { "degraded" };
    Json(serde_json::json!({
        "status": status,
        "database": database_ok,
        "pubsub": state.publisher.is_some(),
        "service": "edudash-access"
    }))
}

pub async fn check_access_handler(
    State(state): State<AppState>,
    Json(payload): Json<FeatureRequest>,
) -> Result<Json<CheckResponse>, ApiError> {
    let _timer = METRICS.request_duration.start_timer();
    require_non_empty("actor_id", &payload.actor_id)?;

    let session = state.access.open_session(&payload.actor_id).await;
    let decision = session.decide(&payload.feature_id);

    if decision.can_use {
        METRICS.checks_allowed.inc();
    } else {
        METRICS.checks_denied.inc();
    }

    info!(
        actor = %abbrev(&payload.actor_id),
        feature = %payload.feature_id,
        can_use = decision.can_use,
        reason = ?decision.reason,
        "Access check"
    );

    Ok(Json(CheckResponse {
        decision,
        subscription: session.snapshot().map(SnapshotView::from),
    }))
}

pub async fn track_usage_handler(
    State(state): State<AppState>,
    Json(payload): Json<FeatureRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let _timer = METRICS.request_duration.start_timer();
    require_non_empty("actor_id", &payload.actor_id)?;

    let mut session = state.access.open_session(&payload.actor_id).await;
    let outcome = session.track(&payload.feature_id).await;

    match outcome {
        TrackOutcome::Recorded => {
            METRICS.usage_tracked.inc();
            state.access.save(&session).await;
            if let Some(publisher) = &state.publisher {
                if let Err(e) = publisher.publish_invalidate(&payload.actor_id).await {
                    warn!(error = %e, "Failed to broadcast usage invalidation");
                }
            }
        }
        TrackOutcome::NotMetered | TrackOutcome::Bypassed => {}
        TrackOutcome::Denied
        | TrackOutcome::QuotaExhausted
        | TrackOutcome::UnknownActor
        | TrackOutcome::WriteFailed => {
            METRICS.usage_refused.inc();
        }
    }

    let body = TrackResponse {
        actor_id: payload.actor_id,
        feature_id: payload.feature_id,
        outcome,
        recorded: outcome == TrackOutcome::Recorded,
        subscription: session.snapshot().map(SnapshotView::from),
    };

    Ok((track_status(outcome), Json(body)))
}

pub async fn usage_handler(
    State(state): State<AppState>,
    Path(actor_id): Path<String>,
) -> Result<Json<SnapshotView>, ApiError> {
    let session = state.access.open_session(&actor_id).await;
    session
        .snapshot()
        .map(|s| Json(SnapshotView::from(s)))
        .ok_or_else(|| ApiError::ServiceUnavailable("subscription not loaded".to_string()))
}

pub async fn refresh_subscription_handler(
    State(state): State<AppState>,
    Path(actor_id): Path<String>,
) -> Result<Json<SnapshotView>, ApiError> {
    let session = state.access.refresh(&actor_id).await;

    if let Some(publisher) = &state.publisher {
        if let Err(e) = publisher.publish_invalidate(&actor_id).await {
            warn!(actor = %abbrev(&actor_id), error = %e, "Failed to broadcast refresh");
        }
    }

    session
        .snapshot()
        .map(|s| Json(SnapshotView::from(s)))
        .ok_or_else(|| ApiError::ServiceUnavailable("subscription not loaded".to_string()))
}

#[derive(Debug, Deserialize)]
pub struct FeaturesQuery {
    pub tier: Option<Tier>,
}

pub async fn features_handler(
    State(state): State<AppState>,
    Query(query): Query<FeaturesQuery>,
) -> Json<Vec<FeatureDescriptor>> {
    let catalog = state.access.catalog();
    let features = catalog
        .iter()
        .filter(|f| query.tier.is_none_or(|tier| catalog.grants(tier, f.id)))
        .copied()
        .collect();
    Json(features)
}

pub async fn create_invitation_handler(
    State(state): State<AppState>,
    Json(payload): Json<NewInvitation>,
) -> Result<impl IntoResponse, ApiError> {
    let invitation = state.invitations.create(payload).await?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

#[derive(Debug, Serialize)]
pub struct InvitationView {
    #[serde(flatten)]
    pub invitation: InvitationCode,
    pub valid: bool,
    pub remaining_uses: u32,
    pub reason: Option<String>,
}

pub async fn get_invitation_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<Json<InvitationView>, ApiError> {
    let invitation = state.invitations.lookup(&code).await?;
    let check = invitation.check(state.clock.now());

    Ok(Json(InvitationView {
        valid: check.is_ok(),
        remaining_uses: invitation.remaining_uses(),
        reason: check.err().map(|e| e.to_string()),
        invitation,
    }))
}

#[derive(Debug, Deserialize)]
pub struct RedeemRequest {
    pub code: String,
}

pub async fn redeem_invitation_handler(
    State(state): State<AppState>,
    Json(payload): Json<RedeemRequest>,
) -> Result<Json<InvitationCode>, ApiError> {
    Ok(Json(state.invitations.redeem(&payload.code).await?))
}

pub async fn revoke_invitation_handler(
    State(state): State<AppState>,
    Path(code): Path<String>,
) -> Result<StatusCode, ApiError> {
    state.invitations.revoke(&code).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
pub struct GenerateFeesRequest {
    pub preschool_id: String,
    /// `YYYY-MM`; defaults to the current month
    pub billing_month: Option<String>,
}

pub async fn generate_fees_handler(
    State(state): State<AppState>,
    Json(payload): Json<GenerateFeesRequest>,
) -> Result<Json<FeeGenerationReport>, ApiError> {
    require_non_empty("preschool_id", &payload.preschool_id)?;

    let month = match payload.billing_month.as_deref() {
        Some(raw) => raw.parse::<BillingMonth>()?,
        None => BillingMonth::containing(state.clock.now().date_naive()),
    };

    let report = state
        .fees
        .generate_monthly_fees(&payload.preschool_id, month)
        .await?;
    Ok(Json(report))
}

#[derive(Debug, Deserialize)]
pub struct OverdueQuery {
    pub preschool_id: String,
}

pub async fn overdue_fees_handler(
    State(state): State<AppState>,
    Query(query): Query<OverdueQuery>,
) -> Result<Json<Vec<OverdueFee>>, ApiError> {
    Ok(Json(state.fees.overdue_fees(&query.preschool_id).await?))
}

pub async fn mark_fee_paid_handler(
    State(state): State<AppState>,
    Path(fee_id): Path<String>,
) -> Result<Json<StudentFee>, ApiError> {
    Ok(Json(state.fees.mark_paid(&fee_id).await?))
}
