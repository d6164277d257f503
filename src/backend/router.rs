use axum::{
    Router,
    middleware::{self},
    routing::{get, post},
};

use crate::{
    backend::{handlers, middleware::api_key_auth, state::AppState},
    metrics::metrics_handler,
};

pub fn build_router(state: AppState) -> Router {
    let api = Router::new()
        .route("/access/check", post(handlers::check_access_handler))
        .route("/access/track", post(handlers::track_usage_handler))
        .route("/usage/:actor_id", get(handlers::usage_handler))
        .route(
            "/subscriptions/:actor_id/refresh",
            post(handlers::refresh_subscription_handler),
        )
        .route("/features", get(handlers::features_handler))
        .route("/invitations", post(handlers::create_invitation_handler))
        .route(
            "/invitations/redeem",
            post(handlers::redeem_invitation_handler),
        )
        .route(
            "/invitations/:code",
            get(handlers::get_invitation_handler).delete(handlers::revoke_invitation_handler),
        )
        .route("/fees/generate", post(handlers::generate_fees_handler))
        .route("/fees/overdue", get(handlers::overdue_fees_handler))
        .route("/fees/:fee_id/paid", post(handlers::mark_fee_paid_handler))
        .route_layer(middleware::from_fn_with_state(state.clone(), api_key_auth));

    Router::new()
        .route("/healthz", get(handlers::health_handler))
        .route("/metrics", get(metrics_handler))
        .merge(api)
        .with_state(state)
}
