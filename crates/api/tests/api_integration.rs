//! Integration tests for the API server.

use std::sync::{Arc, OnceLock};

use axum::body::Body;
use axum::http::{Request, StatusCode};
use common::SellerId;
use domain::{Cart, LineItem};
use event_store::InMemoryEventStore;
use metrics_exporter_prometheus::PrometheusHandle;
use rust_decimal_macros::dec;
use saga::{Collaborators, InMemoryCartService};
use serde_json::{Value, json};
use tower::ServiceExt;

use api::config::Config;

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

struct TestApp {
    app: axum::Router,
    carts: InMemoryCartService,
}

impl TestApp {
    fn new() -> Self {
        let carts = InMemoryCartService::new();
        let deps = Collaborators {
            carts: Arc::new(carts.clone()),
            ..Collaborators::in_memory()
        };
        let config = Config {
            saga_retry_backoff_ms: 1,
            ..Config::default()
        };
        let state = api::create_state(InMemoryEventStore::new(), deps, &config);
        let app = api::create_app(state, get_metrics_handle());
        Self { app, carts }
    }

    async fn send(&self, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let builder = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json");
        let body = match body {
            Some(json) => Body::from(serde_json::to_string(&json).unwrap()),
            None => Body::empty(),
        };
        let response = self
            .app
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap();

        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let json = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, json)
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send("GET", uri, None).await
    }

    async fn post(&self, uri: &str, body: Value) -> (StatusCode, Value) {
        self.send("POST", uri, Some(body)).await
    }

    async fn site_rule(&self, percentage: &str) -> Value {
        let (status, rule) = self
            .post(
                "/commission-rules",
                json!({
                    "name": "Default",
                    "reference": "site",
                    "rate": { "type": "percentage", "percentage_rate": percentage }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "{rule}");
        rule
    }

    async fn active_account(&self, seller_id: SellerId) -> String {
        let (status, account) = self
            .post("/payout-accounts", json!({ "seller_id": seller_id }))
            .await;
        assert_eq!(status, StatusCode::CREATED, "{account}");
        let reference_id = account["reference_id"].as_str().unwrap().to_string();

        let (status, _) = self
            .post(
                "/events",
                json!({
                    "name": "payout_account.webhook",
                    "data": { "action": "account_authorized", "account_id": reference_id }
                }),
            )
            .await;
        assert_eq!(status, StatusCode::ACCEPTED);
        reference_id
    }
}

fn two_seller_cart(a: SellerId, b: SellerId) -> Cart {
    Cart::new("usd")
        .with_item(LineItem::new(a, "lamp", "Lamp", 1, dec!(100)))
        .with_item(LineItem::new(b, "rug", "Rug", 1, dec!(50)))
}

fn decimal(value: &Value) -> rust_decimal::Decimal {
    value.as_str().unwrap().parse().unwrap()
}

#[tokio::test]
async fn test_health_check() {
    let t = TestApp::new();
    let (status, json) = t.get("/health").await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["status"], "ok");
    assert_eq!(json["subscriptions"].as_array().unwrap().len(), 5);
}

#[tokio::test]
async fn test_checkout_event_places_order_set() {
    let t = TestApp::new();
    t.site_rule("10").await;
    let cart = two_seller_cart(SellerId::new(), SellerId::new());
    t.carts.insert(cart.clone());

    let (status, json) = t
        .post(
            "/events",
            json!({ "name": "checkout.completed", "data": { "cart_id": cart.id } }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{json}");

    let published = json["published"].as_array().unwrap();
    assert_eq!(published.len(), 4);
    assert_eq!(published[1]["name"], "order_set.placed");
    let order_set_id = published[1]["data"]["order_set_id"].as_str().unwrap();

    let (status, order_set) = t.get(&format!("/order-sets/{order_set_id}")).await;
    assert_eq!(status, StatusCode::OK);
    let orders = order_set["orders"].as_array().unwrap();
    assert_eq!(orders.len(), 2);
    assert_eq!(order_set["cart_id"], json!(cart.id));

    let order_id = orders[0]["id"].as_str().unwrap();
    let (status, lines) = t.get(&format!("/orders/{order_id}/commission-lines")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(lines.as_array().unwrap().len(), 1);
    assert_eq!(decimal(&lines[0]["value"]), dec!(10));

    let (status, payment) = t.get(&format!("/orders/{order_id}/split-payment")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(payment["status"], "pending");
    assert_eq!(decimal(&payment["authorized"]["amount"]), dec!(100));

    // Redelivery is answered from the stored run
    let (status, again) = t
        .post(
            "/events",
            json!({ "name": "checkout.completed", "data": { "cart_id": cart.id } }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);
    assert_eq!(again["published"][1]["data"]["order_set_id"], order_set_id);

    let (status, saga) = t
        .get(&format!("/sagas/place_order_set/{}", cart.id))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(saga["state"], "Completed");
    assert_eq!(saga["attempt"], 1);
}

#[tokio::test]
async fn test_capture_and_refund_over_http() {
    let t = TestApp::new();
    let a = SellerId::new();
    let b = SellerId::new();
    t.site_rule("10").await;
    t.active_account(a).await;
    let cart = two_seller_cart(a, b);
    t.carts.insert(cart.clone());

    let (_, placed) = t
        .post(
            "/events",
            json!({ "name": "checkout.completed", "data": { "cart_id": cart.id } }),
        )
        .await;
    let order_set_id = placed["published"][1]["data"]["order_set_id"]
        .as_str()
        .unwrap()
        .to_string();
    let (_, order_set) = t.get(&format!("/order-sets/{order_set_id}")).await;
    let order_a = order_set["orders"]
        .as_array()
        .unwrap()
        .iter()
        .find(|o| o["seller_id"] == json!(a))
        .unwrap()["id"]
        .as_str()
        .unwrap()
        .to_string();

    let (status, _) = t
        .post(
            "/events",
            json!({
                "name": "payment.captured",
                "data": { "payment_id": "pay_1", "payment_collection_id": cart.payment_collection_id }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED);

    let (_, account) = t.get(&format!("/payout-accounts/{a}")).await;
    assert_eq!(decimal(&account["balances"][0]["total"]), dec!(90));

    let (status, payout) = t
        .post(
            &format!("/payout-accounts/{a}/payouts"),
            json!({ "order_id": order_a, "amount": { "amount": "90", "currency": "usd" } }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED, "{payout}");

    let (_, payment) = t.get(&format!("/orders/{order_a}/split-payment")).await;
    let split_payment_id = payment["id"].as_str().unwrap().to_string();
    let (status, refunded) = t
        .post(
            "/events",
            json!({
                "name": "payment.refund_requested",
                "data": {
                    "split_payment_id": split_payment_id,
                    "refund_id": "ref_1",
                    "amount": { "amount": "20", "currency": "usd" }
                }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::ACCEPTED, "{refunded}");
    assert_eq!(refunded["published"][1]["name"], "payout.reversal_created");
    assert_eq!(
        refunded["published"][1]["data"]["payout_id"],
        payout["payout_id"]
    );

    let (_, payment) = t.get(&format!("/split-payments/{split_payment_id}")).await;
    assert_eq!(decimal(&payment["refunded"]["amount"]), dec!(20));
    assert_eq!(decimal(&payment["captured"]["amount"]), dec!(100));

    let (_, account) = t.get(&format!("/payout-accounts/{a}")).await;
    assert_eq!(decimal(&account["balances"][0]["total"]), dec!(70));
}

#[tokio::test]
async fn test_refund_above_captured_is_bad_request() {
    let t = TestApp::new();
    let a = SellerId::new();
    let cart = Cart::new("usd").with_item(LineItem::new(a, "lamp", "Lamp", 1, dec!(100)));
    t.carts.insert(cart.clone());
    t.site_rule("10").await;
    let (_, placed) = t
        .post(
            "/events",
            json!({ "name": "checkout.completed", "data": { "cart_id": cart.id } }),
        )
        .await;
    let order_id = placed["published"][1]["data"]["order_ids"][0]
        .as_str()
        .unwrap()
        .to_string();
    t.post(
        "/events",
        json!({
            "name": "payment.captured",
            "data": { "payment_id": "pay_1", "payment_collection_id": cart.payment_collection_id }
        }),
    )
    .await;
    let (_, payment) = t.get(&format!("/orders/{order_id}/split-payment")).await;

    let (status, json) = t
        .post(
            "/events",
            json!({
                "name": "payment.refund_requested",
                "data": {
                    "split_payment_id": payment["id"],
                    "amount": { "amount": "150", "currency": "usd" }
                }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(json["kind"], "validation");
}

#[tokio::test]
async fn test_unknown_cart_is_not_found() {
    let t = TestApp::new();
    let (status, json) = t
        .post(
            "/events",
            json!({
                "name": "checkout.completed",
                "data": { "cart_id": "0b6c1a33-54f5-4d07-9f8e-6f3f0cf1a2b1" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(json["kind"], "not_found");
}

#[tokio::test]
async fn test_failed_workflow_reports_step() {
    let t = TestApp::new();
    // No commission rule, so finalizing commission fails after the split
    let cart = two_seller_cart(SellerId::new(), SellerId::new());
    t.carts.insert(cart.clone());

    let (status, json) = t
        .post(
            "/events",
            json!({ "name": "checkout.completed", "data": { "cart_id": cart.id } }),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND, "{json}");
    assert_eq!(json["workflow"], "finalize_commission");
    assert_eq!(json["step"], "create_commission_lines");
}

#[tokio::test]
async fn test_commission_rule_admin() {
    let t = TestApp::new();
    let rule = t.site_rule("12.5").await;
    let id = rule["id"].as_str().unwrap();

    let (status, duplicate) = t
        .post(
            "/commission-rules",
            json!({
                "name": "Other",
                "reference": "site",
                "rate": { "type": "percentage", "percentage_rate": "5" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT, "{duplicate}");

    let (status, invalid) = t
        .post(
            "/commission-rules",
            json!({
                "name": "Too much",
                "reference": "seller",
                "reference_id": "seller_1",
                "rate": { "type": "percentage", "percentage_rate": "150" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{invalid}");

    let (status, deactivated) = t
        .post(&format!("/commission-rules/{id}/deactivate"), json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(deactivated["is_active"], false);

    let (status, fetched) = t.get(&format!("/commission-rules/{id}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched["name"], "Default");

    let (_, rules) = t.get("/commission-rules").await;
    assert_eq!(rules.as_array().unwrap().len(), 1);

    let (status, _) = t
        .get("/commission-rules/5b1f0f5e-7d1c-4a1e-9c39-0f7e9c1d2a11")
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_payout_account_admin() {
    let t = TestApp::new();
    let seller = SellerId::new();

    let (status, account) = t
        .post(
            "/payout-accounts",
            json!({ "seller_id": seller, "context": { "country": "US" } }),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(account["status"], "pending");

    let (status, _) = t
        .post("/payout-accounts", json!({ "seller_id": seller }))
        .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, onboarding) = t
        .post(
            &format!("/payout-accounts/{seller}/onboarding"),
            json!({ "context": { "return_url": "https://shop.example" } }),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert!(onboarding["session"]["url"].is_string());

    let (status, json) = t
        .post(
            &format!("/payout-accounts/{seller}/payouts"),
            json!({
                "order_id": "3d0c7a0e-8a8f-4a43-a1a5-4a3c5b6e7f80",
                "amount": { "amount": "10", "currency": "usd" }
            }),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{json}");

    let (status, _) = t.get(&format!("/payout-accounts/{}", SellerId::new())).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_invalid_id_format() {
    let t = TestApp::new();
    let (status, _) = t.get("/orders/not-a-uuid").await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_unknown_saga_is_not_found() {
    let t = TestApp::new();
    let (status, _) = t.get("/sagas/place_order_set/missing").await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, json) = t
        .post("/sagas/place_order_set/missing/recover", json!({}))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(json["state"], "NotStarted");
}

#[tokio::test]
async fn test_metrics_endpoint() {
    let t = TestApp::new();
    t.get("/health").await;

    let response = t
        .app
        .clone()
        .oneshot(Request::builder().uri("/metrics").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}
