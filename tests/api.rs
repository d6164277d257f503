use std::sync::Arc;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode},
};
use chrono::{NaiveDate, TimeZone, Utc};
use edudash::{
    access::{Role, SubscriptionRecord, SubscriptionStatus, Tier},
    backend::{AppState, Stores, build_router},
    clock::FixedClock,
    fees::Student,
    store::MemoryStore,
    utils::config::AppConfig,
};
use serde_json::{Value, json};
use tower::ServiceExt;

const KEY: &str = "test-key";

struct Harness {
    app: Router,
    store: Arc<MemoryStore>,
}

async fn harness() -> Harness {
    let store = Arc::new(MemoryStore::new());
    store
        .put_subscription(
            "teacher-free",
            SubscriptionRecord::new(Tier::Free, SubscriptionStatus::Active, Role::Teacher),
        )
        .await;
    store
        .put_subscription(
            "principal-premium",
            SubscriptionRecord::new(Tier::Premium, SubscriptionStatus::Active, Role::Principal),
        )
        .await;

    let clock = Arc::new(FixedClock::new(
        Utc.with_ymd_and_hms(2026, 10, 19, 9, 0, 0).unwrap(),
    ));
    let cfg = AppConfig {
        api_key: KEY.to_string(),
        ..AppConfig::default()
    };
    let state = AppState::new(&cfg, Stores::shared(store.clone()), clock);

    Harness {
        app: build_router(state),
        store,
    }
}

async fn send(app: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("Authorization", format!("Bearer {}", KEY));
    let body = match body {
        Some(value) => {
            builder = builder.header("Content-Type", "application/json");
            Body::from(value.to_string())
        }
        None => Body::empty(),
    };

    let response = app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn feature(actor_id: &str, feature_id: &str) -> Option<Value> {
    Some(json!({ "actor_id": actor_id, "feature_id": feature_id }))
}

#[tokio::test]
async fn health_and_metrics_are_public() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn api_requires_bearer_key() {
    let h = harness().await;

    let response = h
        .app
        .clone()
        .oneshot(Request::get("/features").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let response = h
        .app
        .clone()
        .oneshot(
            Request::get("/features")
                .header("Authorization", "Bearer wrong")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn free_quota_runs_out_after_five_uses() {
    let h = harness().await;

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/access/check",
        feature("teacher-free", "ai_lesson_generator"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["can_use"], json!(true));
    assert_eq!(body["subscription"]["usage"]["monthly_limit"], json!(5));

    for used in 1..=5 {
        let (status, body) = send(
            &h.app,
            Method::POST,
            "/access/track",
            feature("teacher-free", "ai_lesson_generator"),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["outcome"], json!("recorded"));
        assert_eq!(body["subscription"]["usage"]["current_usage"], json!(used));
    }

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/access/track",
        feature("teacher-free", "ai_lesson_generator"),
    )
    .await;
    assert_eq!(status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(body["outcome"], json!("quota_exhausted"));
    assert_eq!(h.store.usage_events().await.len(), 5);

    let (_, body) = send(
        &h.app,
        Method::POST,
        "/access/check",
        feature("teacher-free", "ai_lesson_generator"),
    )
    .await;
    assert_eq!(body["has_access"], json!(true));
    assert_eq!(body["can_use"], json!(false));
    assert_eq!(body["reason"], json!("quota_exhausted"));

    let (_, body) = send(&h.app, Method::GET, "/usage/teacher-free", None).await;
    assert_eq!(body["usage"]["remaining_usage"], json!(0));
}

#[tokio::test]
async fn tier_gates_and_unknown_features() {
    let h = harness().await;

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/access/track",
        feature("teacher-free", "homework_grader"),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["outcome"], json!("denied"));

    let (_, body) = send(
        &h.app,
        Method::POST,
        "/access/check",
        feature("teacher-free", "homework_grader"),
    )
    .await;
    assert_eq!(body["needs_upgrade"], json!(true));
    assert_eq!(body["required_tier"], json!("premium"));

    let (_, body) = send(
        &h.app,
        Method::POST,
        "/access/check",
        feature("principal-premium", "homework_grader"),
    )
    .await;
    assert_eq!(body["can_use"], json!(true));
    assert_eq!(body["subscription"]["usage"]["monthly_limit"], json!(100));

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/access/check",
        feature("teacher-free", "holographic_classroom"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_access"], json!(true));
    assert_eq!(body["needs_upgrade"], json!(false));

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/access/track",
        feature("teacher-free", "holographic_classroom"),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["outcome"], json!("not_metered"));
}

#[tokio::test]
async fn unknown_actor_reads_as_free_but_cannot_track() {
    let h = harness().await;

    let (status, body) = send(&h.app, Method::GET, "/usage/nobody", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier"], json!("free"));
    assert_eq!(body["degraded"], json!(false));

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/access/track",
        feature("nobody", "ai_lesson_generator"),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["outcome"], json!("unknown_actor"));
    assert_eq!(body["recorded"], json!(false));
    assert!(h.store.usage_events().await.is_empty());
}

#[tokio::test]
async fn failed_usage_write_is_reported() {
    let h = harness().await;
    h.store.set_fail_writes(true);

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/access/track",
        feature("teacher-free", "ai_lesson_generator"),
    )
    .await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert_eq!(body["recorded"], json!(false));
    assert_eq!(body["subscription"]["usage"]["current_usage"], json!(0));
}

#[tokio::test]
async fn refresh_picks_up_upgrades() {
    let h = harness().await;

    let (_, body) = send(
        &h.app,
        Method::POST,
        "/access/check",
        feature("teacher-free", "custom_reports"),
    )
    .await;
    assert_eq!(body["has_access"], json!(false));

    h.store
        .put_subscription(
            "teacher-free",
            SubscriptionRecord::new(Tier::Premium, SubscriptionStatus::Active, Role::Teacher),
        )
        .await;

    let (status, body) = send(&h.app, Method::POST, "/subscriptions/teacher-free/refresh", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tier"], json!("premium"));

    let (_, body) = send(
        &h.app,
        Method::POST,
        "/access/check",
        feature("teacher-free", "custom_reports"),
    )
    .await;
    assert_eq!(body["has_access"], json!(true));
}

#[tokio::test]
async fn features_filter_by_tier() {
    let h = harness().await;

    let (_, all) = send(&h.app, Method::GET, "/features", None).await;
    let (_, free) = send(&h.app, Method::GET, "/features?tier=free", None).await;

    let all = all.as_array().unwrap();
    let free = free.as_array().unwrap();
    assert!(free.len() < all.len());
    assert!(free.iter().all(|f| f["required_tier"] == json!("free")));
}

#[tokio::test]
async fn invitation_lifecycle() {
    let h = harness().await;

    let (status, created) = send(
        &h.app,
        Method::POST,
        "/invitations",
        Some(json!({
            "preschool_id": "school-1",
            "invited_by": "principal-premium",
            "role": "teacher",
            "email": "new.teacher@example.org"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let code = created["code"].as_str().unwrap().to_string();
    assert_eq!(code.len(), 8);

    let (status, shown) = send(&h.app, Method::GET, &format!("/invitations/{}", code), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(shown["valid"], json!(true));
    assert_eq!(shown["remaining_uses"], json!(1));

    let (status, redeemed) = send(
        &h.app,
        Method::POST,
        "/invitations/redeem",
        Some(json!({ "code": code.to_lowercase() })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(redeemed["uses"], json!(1));

    let (status, body) = send(
        &h.app,
        Method::POST,
        "/invitations/redeem",
        Some(json!({ "code": code })),
    )
    .await;
    assert_eq!(status, StatusCode::GONE);
    assert_eq!(body["status"], json!(410));

    let (status, _) = send(&h.app, Method::DELETE, &format!("/invitations/{}", code), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&h.app, Method::GET, "/invitations/ZZZZ9999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn fee_generation_is_idempotent() {
    let h = harness().await;
    for (id, dob) in [("stu-1", (2024, 3, 1)), ("stu-2", (2021, 5, 5))] {
        h.store
            .add_student(Student {
                id: id.to_string(),
                preschool_id: "school-1".to_string(),
                first_name: "Kid".to_string(),
                last_name: id.to_string(),
                date_of_birth: NaiveDate::from_ymd_opt(dob.0, dob.1, dob.2).unwrap(),
                active: true,
            })
            .await;
    }

    let request = Some(json!({ "preschool_id": "school-1", "billing_month": "2026-10" }));

    let (status, report) = send(&h.app, Method::POST, "/fees/generate", request.clone()).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(report["created"], json!(2));

    let (_, report) = send(&h.app, Method::POST, "/fees/generate", request).await;
    assert_eq!(report["created"], json!(0));
    assert_eq!(report["skipped"], json!(2));

    let (status, _) = send(
        &h.app,
        Method::POST,
        "/fees/generate",
        Some(json!({ "preschool_id": "school-1", "billing_month": "2026-13" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // due on the 7th, clock sits on the 19th
    let (_, overdue) = send(&h.app, Method::GET, "/fees/overdue?preschool_id=school-1", None).await;
    let overdue = overdue.as_array().unwrap();
    assert_eq!(overdue.len(), 2);
    assert!(overdue.iter().all(|f| f["days_overdue"] == json!(12)));

    let fee_id = h.store.fees().await[0].id.clone();
    let (status, paid) = send(&h.app, Method::POST, &format!("/fees/{}/paid", fee_id), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(paid["paid_at"].is_string());

    let (_, overdue) = send(&h.app, Method::GET, "/fees/overdue?preschool_id=school-1", None).await;
    assert_eq!(overdue.as_array().unwrap().len(), 1);

    let (status, _) = send(&h.app, Method::POST, "/fees/missing/paid", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
