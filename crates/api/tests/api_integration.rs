//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use api::AppState;
use api::config::Config;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use auth::roles;
use common::{Money, ProductId, UserId};
use metrics_exporter_prometheus::PrometheusHandle;
use serde_json::{Value, json};
use store::{
    EntityKind, InMemoryStore, NewProduct, NewUser, SoftDeleteInterceptor, Store, StoreExt,
};
use tower::ServiceExt;

static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();

fn get_metrics_handle() -> PrometheusHandle {
    METRICS_HANDLE
        .get_or_init(|| {
            let builder = metrics_exporter_prometheus::PrometheusBuilder::new();
            builder
                .install_recorder()
                .expect("failed to install Prometheus recorder")
        })
        .clone()
}

type TestState = Arc<AppState<SoftDeleteInterceptor<InMemoryStore>>>;

/// Requests go out with `token`, the seller's unless switched with `as_admin`.
#[derive(Clone)]
struct TestApp {
    app: axum::Router,
    state: TestState,
    token: String,
    admin_token: String,
    admin_id: UserId,
}

impl TestApp {
    fn as_admin(&self) -> TestApp {
        TestApp {
            token: self.admin_token.clone(),
            ..self.clone()
        }
    }
}

async fn user(state: &TestState, email: &str, role: &str) -> (UserId, String) {
    let user = state
        .store
        .create_user(NewUser::new(email, auth::hash_password("secret").unwrap(), role))
        .await
        .unwrap();
    let pair = state.auth.login(email, "secret").await.unwrap();
    (user.id, pair.access_token)
}

async fn setup() -> TestApp {
    let state = api::create_state(InMemoryStore::new(), "memory", &Config::default());
    let (_, token) = user(&state, "caja@example.com", roles::SELLER).await;
    let (admin_id, admin_token) = user(&state, "jefe@example.com", roles::ADMIN).await;
    let app = api::create_app(state.clone(), get_metrics_handle());

    TestApp {
        app,
        state,
        token,
        admin_token,
        admin_id,
    }
}

async fn product(t: &TestApp, price: i64, stock: i64) -> ProductId {
    t.state
        .store
        .create_product(NewProduct::new("Item", Money::from_cents(price), stock))
        .await
        .unwrap()
        .id
}

async fn send(t: &TestApp, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("authorization", format!("Bearer {}", t.token));
    let body = match body {
        Some(json) => {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_string(&json).unwrap())
        }
        None => Body::empty(),
    };

    let response = t
        .app
        .clone()
        .oneshot(builder.body(body).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, json)
}

#[tokio::test]
async fn test_health_check() {
    let t = setup().await;
    let (status, json) = send(&t, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["store"], "memory");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = setup().await;
    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert!(
        response.headers()["content-type"]
            .to_str()
            .unwrap()
            .starts_with("text/plain")
    );
}

#[tokio::test]
async fn test_create_and_get_sale() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;
    let r = product(&t, 750, 3).await;

    let (status, json) = send(
        &t,
        "POST",
        "/sales",
        Some(json!({
            "lines": [
                { "product_id": p, "quantity": 2 },
                { "product_id": r, "quantity": 1 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["total"], 2750);
    assert_eq!(json["lines"].as_array().unwrap().len(), 2);
    assert_eq!(json["actor"]["email"], "caja@example.com");

    let sale_id = json["sale_id"].as_i64().unwrap();
    let (status, loaded) = send(&t, "GET", &format!("/sales/{sale_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(loaded["total"], 2750);
}

#[tokio::test]
async fn test_insufficient_stock_is_conflict() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;
    let q = product(&t, 500, 2).await;

    let (status, json) = send(
        &t,
        "POST",
        "/sales",
        Some(json!({
            "lines": [
                { "product_id": p, "quantity": 3 },
                { "product_id": q, "quantity": 10 }
            ]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(json["status"], 409);
    assert_eq!(json["code"], "insufficient_stock");
    assert!(json["message"].as_str().unwrap().contains(&q.to_string()));
    assert!(json["detail"].as_str().unwrap().contains("2 in stock"));

    let p = t.state.store.find_product(p).await.unwrap().unwrap();
    assert_eq!(p.stock, Some(5));
}

#[tokio::test]
async fn test_invalid_line_is_bad_request() {
    let t = setup().await;
    let (status, json) = send(
        &t,
        "POST",
        "/sales",
        Some(json!({ "lines": [{ "quantity": 1 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_line");
}

#[tokio::test]
async fn test_malformed_body_is_structured() {
    let t = setup().await;
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sales")
                .header("authorization", format!("Bearer {}", t.token))
                .header("content-type", "application/json")
                .body(Body::from("{not json"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json: Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["code"], "bad_request");
}

#[tokio::test]
async fn test_sales_require_a_bearer_token() {
    let t = setup().await;
    let response = t
        .app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/sales")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"lines":[]}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let forged = TestApp {
        token: "not-a-token".to_string(),
        ..t.clone()
    };
    let (status, json) = send(&forged, "GET", "/sales/1", None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "invalid_access_token");
}

#[tokio::test]
async fn test_unknown_sale_is_not_found() {
    let t = setup().await;
    let (status, json) = send(&t, "GET", "/sales/999", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "sale_not_found");
}

#[tokio::test]
async fn test_manual_movement_and_reconciliation() {
    let t = setup().await;
    let admin = t.as_admin();
    let p = product(&t, 1000, 5).await;

    let (status, json) = send(
        &admin,
        "POST",
        "/movements",
        Some(json!({
            "kind": "Entrada",
            "quantity": 4,
            "product_id": p,
            "reference": "OC-12"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(json["kind"], "Entrada");
    let movement_id = json["movement_id"].as_i64().unwrap();

    let (status, json) = send(&admin, "GET", &format!("/movements/{movement_id}"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["quantity"], 4);

    let (status, json) = send(
        &t,
        "POST",
        "/sales",
        Some(json!({ "lines": [{ "product_id": p, "quantity": 3 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");

    let (status, json) = send(&admin, "GET", &format!("/products/{p}/reconciliation"), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["expected"], 6);
    assert_eq!(json["actual"], 6);
}

#[tokio::test]
async fn test_manual_exit_is_rejected() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;

    let (status, json) = send(
        &t.as_admin(),
        "POST",
        "/movements",
        Some(json!({
            "kind": "Salida",
            "quantity": 1,
            "product_id": p,
            "reference": "X-1"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "kind_not_allowed");
}

#[tokio::test]
async fn test_delete_product_is_soft() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;

    let admin = t.as_admin();
    let (status, _) = send(&admin, "DELETE", &format!("/products/{p}"), None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&admin, "DELETE", &format!("/products/{p}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = send(
        &t,
        "POST",
        "/sales",
        Some(json!({ "lines": [{ "product_id": p, "quantity": 1 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["code"], "product_not_found");

    let row = t.state.store.inner().find_product(p).await.unwrap().unwrap();
    assert!(row.is_deleted);
}

#[tokio::test]
async fn test_login_and_refresh_rotation() {
    let t = setup().await;

    let (status, pair) = send(
        &t,
        "POST",
        "/auth/login",
        Some(json!({ "email": "caja@example.com", "password": "secret" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let refresh = pair["refresh_token"].as_str().unwrap().to_string();

    let (status, rotated) = send(
        &t,
        "POST",
        "/auth/refresh",
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_ne!(rotated["refresh_token"], pair["refresh_token"]);

    let (status, json) = send(
        &t,
        "POST",
        "/auth/refresh",
        Some(json!({ "refresh_token": refresh })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "invalid_refresh_token");
}

#[tokio::test]
async fn test_bad_password_is_unauthorized() {
    let t = setup().await;
    let (status, json) = send(
        &t,
        "POST",
        "/auth/login",
        Some(json!({ "email": "caja@example.com", "password": "nope" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "invalid_credentials");
}

#[tokio::test]
async fn test_seller_cannot_record_movements() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;

    let (status, json) = send(
        &t,
        "POST",
        "/movements",
        Some(json!({
            "kind": "Entrada",
            "quantity": 4,
            "product_id": p,
            "reference": "OC-13"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["status"], 403);
    assert_eq!(json["code"], "forbidden");

    let p = t.state.store.find_product(p).await.unwrap().unwrap();
    assert_eq!(p.stock, Some(5));
    assert_eq!(t.state.store.inner().movement_count().await, 0);
}

#[tokio::test]
async fn test_seller_cannot_delete_or_reconcile_products() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;

    let (status, json) = send(&t, "DELETE", &format!("/products/{p}"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json["code"], "forbidden");
    assert!(t.state.store.find_product(p).await.unwrap().is_some());

    let (status, _) = send(&t, "GET", &format!("/products/{p}/reconciliation"), None).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn test_admin_can_also_sell() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;

    let (status, json) = send(
        &t.as_admin(),
        "POST",
        "/sales",
        Some(json!({ "lines": [{ "product_id": p, "quantity": 1 }] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{json}");
    assert_eq!(json["actor"]["email"], "jefe@example.com");
}

#[tokio::test]
async fn test_token_of_deleted_user_is_rejected() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;

    t.state
        .store
        .delete(EntityKind::User, t.admin_id.as_i64())
        .await
        .unwrap();

    let (status, json) = send(&t.as_admin(), "DELETE", &format!("/products/{p}"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json["code"], "unauthorized");
    assert!(t.state.store.find_product(p).await.unwrap().is_some());
}

#[tokio::test]
async fn test_oversized_entry_is_bad_request() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;

    let (status, json) = send(
        &t.as_admin(),
        "POST",
        "/movements",
        Some(json!({
            "kind": "Entrada",
            "quantity": i64::MAX,
            "product_id": p,
            "reference": "OC-14"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "stock_overflow");

    let p = t.state.store.find_product(p).await.unwrap().unwrap();
    assert_eq!(p.stock, Some(5));
}

#[tokio::test]
async fn test_overflowing_unit_price_is_bad_request() {
    let t = setup().await;
    let p = product(&t, 1000, 5).await;

    let (status, json) = send(
        &t,
        "POST",
        "/sales",
        Some(json!({
            "lines": [{ "product_id": p, "quantity": 2, "unit_price": i64::MAX / 2 + 1 }]
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["code"], "invalid_line");
    assert_eq!(json["detail"], "line 0");
}
