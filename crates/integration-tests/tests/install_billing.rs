//! Install, OAuth callback, charge activation and the billing gate.

use axum::http::StatusCode;
use howheard_app::db::AccountStore;
use howheard_app::shopify::fake::Call;
use howheard_app::shopify::{ChargeStatus, WebhookTopic};
use howheard_core::{BillingKind, BillingStatus};
use howheard_integration_tests::{SHOP, TestApp, callback_uri, json_body, location, shop};

// =============================================================================
// Install / OAuth
// =============================================================================

#[tokio::test]
async fn test_install_redirects_to_authorization() {
    let app = TestApp::new();

    let response = app.get(&format!("/install?shop={SHOP}")).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);

    let target = location(&response);
    assert!(target.starts_with("https://cool-store.myshopify.com/admin/oauth/authorize?"));
    assert!(target.contains("client_id=test-api-key"));
    assert!(target.contains(&urlencoding::encode("https://howheard.test/auth/callback").into_owned()));

    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    assert_eq!(account.billing_status, BillingStatus::None);
    assert!(account.access_token.is_none());
}

#[tokio::test]
async fn test_install_rejects_foreign_domain() {
    let app = TestApp::new();

    let response = app.get("/install?shop=evil.example.com").await;
    assert_eq!(location(&response), "/error?reason=bad_request");
}

#[tokio::test]
async fn test_install_twice_keeps_one_account() {
    let app = TestApp::new();

    app.get(&format!("/install?shop={SHOP}")).await;
    app.get(&format!("/install?shop={SHOP}")).await;

    assert!(app.store.find_account(&shop(SHOP)).await.unwrap().is_some());
}

#[tokio::test]
async fn test_callback_rejects_bad_signature() {
    let app = TestApp::new();
    app.get(&format!("/install?shop={SHOP}")).await;

    let tampered = callback_uri(SHOP, "auth-code").replace("code=auth-code", "code=stolen");
    let response = app.get(&tampered).await;

    assert_eq!(location(&response), "/error?reason=invalid_hmac");
    assert!(app.shopify.calls().is_empty());
}

#[tokio::test]
async fn test_callback_registers_webhooks_and_creates_charge() {
    let app = TestApp::new();

    let response = app.authorize(SHOP).await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(location(&response).ends_with("/confirm_recurring_application_charge"));

    let calls = app.shopify.calls();
    assert!(calls.contains(&Call::RegisterWebhook {
        shop: SHOP.to_string(),
        topic: WebhookTopic::OrdersCreate,
        address: format!("https://howheard.test/webhooks/orders/create/{SHOP}"),
    }));
    assert!(calls.contains(&Call::RegisterWebhook {
        shop: SHOP.to_string(),
        topic: WebhookTopic::AppUninstalled,
        address: "https://howheard.test/webhooks/app/uninstalled".to_string(),
    }));
    assert!(calls.contains(&Call::CreateCharge {
        shop: SHOP.to_string(),
        test: false,
    }));

    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    assert_eq!(account.billing_status, BillingStatus::Pending);
    assert!(account.access_token.is_some());
    assert!(account.charge_id.is_some());
    assert!(account.orders_webhook_id.is_some());
    assert!(account.uninstall_webhook_id.is_some());
    assert_eq!(account.profile.name.as_deref(), Some("cool-store"));
}

#[tokio::test]
async fn test_affiliate_shop_gets_test_charge() {
    let app = TestApp::new();
    app.shopify.set_plan_name(Some("affiliate"));

    app.authorize(SHOP).await;

    assert!(app.shopify.calls().contains(&Call::CreateCharge {
        shop: SHOP.to_string(),
        test: true,
    }));
}

#[tokio::test]
async fn test_repeated_authorize_reuses_webhooks() {
    let app = TestApp::new();

    app.authorize(SHOP).await;
    let first = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    app.authorize(SHOP).await;
    let second = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();

    assert_eq!(first.orders_webhook_id, second.orders_webhook_id);
    assert_eq!(first.uninstall_webhook_id, second.uninstall_webhook_id);
    assert_eq!(second.billing_status, BillingStatus::Pending);
}

// =============================================================================
// Activation
// =============================================================================

#[tokio::test]
async fn test_accepted_charge_activates_with_trial() {
    let app = TestApp::new();

    app.onboard(SHOP).await;

    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    assert_eq!(account.billing_status, BillingStatus::Activated);
    assert_eq!(account.billing_kind, Some(BillingKind::Trial));
    assert!(account.billing_activated_on.is_some());
    assert!(account.trial_ends_on.is_some());
    assert_eq!(app.shopify.activation_count(), 1);
}

#[tokio::test]
async fn test_already_active_charge_is_not_reactivated() {
    let app = TestApp::new();
    app.authorize(SHOP).await;
    app.shopify.set_charge_status(ChargeStatus::Active);

    let response = app.get(&format!("/billing/activate?shop={SHOP}")).await;

    assert_eq!(location(&response), format!("/app?shop={SHOP}"));
    assert_eq!(app.shopify.activation_count(), 0);
    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    assert_eq!(account.billing_status, BillingStatus::Activated);
}

#[tokio::test]
async fn test_declined_charge_halts_activation() {
    let app = TestApp::new();
    app.authorize(SHOP).await;
    app.shopify.set_charge_status(ChargeStatus::Declined);

    let response = app.get(&format!("/billing/activate?shop={SHOP}")).await;

    assert_eq!(location(&response), "/error?reason=charge_declined");
    assert_eq!(app.shopify.activation_count(), 0);
    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    assert_ne!(account.billing_status, BillingStatus::Activated);
    assert!(account.billing_kind.is_none());

    let response = app.get(&format!("/app?shop={SHOP}")).await;
    assert_eq!(location(&response), "/error?reason=billing_inactive");
}

#[tokio::test]
async fn test_pending_charge_leaves_billing_unchanged() {
    let app = TestApp::new();
    app.authorize(SHOP).await;
    app.shopify.set_charge_status(ChargeStatus::Pending);

    let response = app.get(&format!("/billing/activate?shop={SHOP}")).await;

    assert_eq!(location(&response), "/error?reason=charge_not_accepted");
    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    assert_eq!(account.billing_status, BillingStatus::Pending);
}

#[tokio::test]
async fn test_failed_activation_call_leaves_account_accepted() {
    let app = TestApp::new();
    app.authorize(SHOP).await;
    app.shopify.fail_activation(true);

    let response = app.get(&format!("/billing/activate?shop={SHOP}")).await;

    assert_eq!(location(&response), "/error?reason=external_call_failed");
    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    assert_eq!(account.billing_status, BillingStatus::Accepted);
}

#[tokio::test]
async fn test_activate_unknown_shop_fails() {
    let app = TestApp::new();

    let response = app
        .get("/billing/activate?shop=ghost.myshopify.com")
        .await;
    assert_eq!(location(&response), "/error?reason=not_found");
}

// =============================================================================
// Billing gate
// =============================================================================

#[tokio::test]
async fn test_billing_gate_covers_every_inactive_status() {
    let app = TestApp::new();
    app.onboard_with_choices(SHOP, &["Podcast"]).await;

    for status in BillingStatus::ALL {
        app.store.force_billing_status(&shop(SHOP), status).await;

        let merchant = app.get(&format!("/app?shop={SHOP}")).await;
        let widget = app.get(&format!("/widget/choices?shop={SHOP}")).await;

        if status == BillingStatus::Activated {
            assert_eq!(merchant.status(), StatusCode::OK, "{status}");
            assert_eq!(widget.status(), StatusCode::OK, "{status}");
        } else {
            assert_eq!(
                location(&merchant),
                "/error?reason=billing_inactive",
                "{status}"
            );
            assert_eq!(widget.status(), StatusCode::NOT_FOUND, "{status}");
        }
    }
}

#[tokio::test]
async fn test_billing_gate_on_unknown_shop() {
    let app = TestApp::new();

    let response = app.get("/app/orders?shop=ghost.myshopify.com").await;
    assert_eq!(location(&response), "/error?reason=billing_inactive");

    let response = app.get("/app/orders").await;
    assert_eq!(location(&response), "/error?reason=bad_request");
}

#[tokio::test]
async fn test_account_summary() {
    let app = TestApp::new();
    app.onboard_with_choices(SHOP, &["Podcast"]).await;

    let response = app.get(&format!("/app?shop={SHOP}")).await;
    assert_eq!(response.status(), StatusCode::OK);

    let body = json_body(response).await;
    assert_eq!(body["shop"], SHOP);
    assert_eq!(body["billing_status"], "activated");
    assert_eq!(body["billing_kind"], "trial");
    assert_eq!(
        body["choices"],
        serde_json::json!(["Podcast", "From A Friend", "Other"])
    );
}

// =============================================================================
// Health
// =============================================================================

#[tokio::test]
async fn test_health_endpoints() {
    let app = TestApp::new();

    assert_eq!(app.get("/health").await.status(), StatusCode::OK);
    assert_eq!(app.get("/health/ready").await.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_error_page_names_reason() {
    let app = TestApp::new();

    let response = app.get("/error?reason=billing_inactive").await;
    assert_eq!(response.status(), StatusCode::OK);
}
