//! Uninstall webhook handling.

use axum::http::StatusCode;
use howheard_app::db::AccountStore;
use howheard_core::BillingStatus;
use howheard_integration_tests::{SHOP, TestApp, json_body, location, order_payload, shop};
use serde_json::json;

fn uninstall_payload(shop: &str) -> serde_json::Value {
    json!({
        "id": 548_380_009,
        "name": "Cool Store",
        "myshopify_domain": shop,
        "domain": "coolstore.example"
    })
}

#[tokio::test]
async fn test_uninstall_clears_installation_and_is_idempotent() {
    let app = TestApp::new();
    app.onboard_with_choices(SHOP, &["Podcast"]).await;

    for _ in 0..2 {
        let response = app
            .post_webhook("/webhooks/app/uninstalled", SHOP, &uninstall_payload(SHOP))
            .await;
        assert_eq!(response.status(), StatusCode::OK);

        let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
        assert!(account.access_token.is_none());
        assert_eq!(account.billing_status, BillingStatus::None);
        assert!(account.billing_kind.is_none());
        assert!(account.charge_id.is_none());
        assert!(account.orders_webhook_id.is_none());
        assert!(account.choice_list_id.is_none());
        assert!(account.uninstalled_at.is_some());
    }
}

#[tokio::test]
async fn test_uninstalled_shop_is_gated() {
    let app = TestApp::new();
    app.onboard_with_choices(SHOP, &["Podcast"]).await;

    app.post_webhook("/webhooks/app/uninstalled", SHOP, &uninstall_payload(SHOP))
        .await;

    let response = app.get(&format!("/app?shop={SHOP}")).await;
    assert_eq!(location(&response), "/error?reason=billing_inactive");
    let response = app.get(&format!("/widget/choices?shop={SHOP}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_order_history_survives_uninstall() {
    let app = TestApp::new();
    app.onboard(SHOP).await;
    app.deliver_order(SHOP, &order_payload(1001, 42, 1)).await;

    app.post_webhook("/webhooks/app/uninstalled", SHOP, &uninstall_payload(SHOP))
        .await;

    assert_eq!(app.store.order_count(&shop(SHOP)).await, 1);
}

#[tokio::test]
async fn test_reinstall_after_uninstall() {
    let app = TestApp::new();
    app.onboard(SHOP).await;
    app.post_webhook("/webhooks/app/uninstalled", SHOP, &uninstall_payload(SHOP))
        .await;

    app.onboard(SHOP).await;

    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    assert_eq!(account.billing_status, BillingStatus::Activated);
    assert!(account.access_token.is_some());
}

#[tokio::test]
async fn test_uninstall_for_unknown_shop_is_unresolvable() {
    let app = TestApp::new();

    let response = app
        .post_webhook(
            "/webhooks/app/uninstalled",
            "ghost.myshopify.com",
            &uninstall_payload("ghost.myshopify.com"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_unsigned_uninstall_is_rejected() {
    let app = TestApp::new();
    app.onboard(SHOP).await;

    let response = app
        .post_json("/webhooks/app/uninstalled", &uninstall_payload(SHOP))
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    assert_eq!(account.billing_status, BillingStatus::Activated);
}

#[tokio::test]
async fn test_reinstall_starts_with_unlinked_choices() {
    let app = TestApp::new();
    app.onboard_with_choices(SHOP, &["Podcast"]).await;
    app.post_webhook("/webhooks/app/uninstalled", SHOP, &uninstall_payload(SHOP))
        .await;
    app.onboard(SHOP).await;

    // Merchant screens and widget agree: nothing linked yet
    let response = app.get(&format!("/app?shop={SHOP}")).await;
    assert_eq!(json_body(response).await["choices"], json!([]));
    let response = app.get(&format!("/app/choices?shop={SHOP}")).await;
    assert_eq!(json_body(response).await["choices"], json!([]));
    let response = app.get(&format!("/widget/choices?shop={SHOP}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);

    // Submitting again relinks the kept list
    let response = app
        .post_form(&format!("/app/choices?shop={SHOP}"), "choices=Instagram")
        .await;
    assert_eq!(
        json_body(response).await["choices"],
        json!(["Podcast", "From A Friend", "Other", "Instagram"])
    );
    let response = app.get(&format!("/widget/choices?shop={SHOP}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["choices"],
        json!(["Podcast", "From A Friend", "Other", "Instagram"])
    );
}
