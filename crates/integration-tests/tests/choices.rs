//! Merchant choice list management.

use axum::http::StatusCode;
use howheard_app::db::AccountStore;
use howheard_integration_tests::{SHOP, TestApp, json_body, shop};
use serde_json::json;

fn form(choices: &str) -> String {
    format!("choices={}", urlencoding::encode(choices))
}

#[tokio::test]
async fn test_first_submission_adds_fallbacks() {
    let app = TestApp::new();
    app.onboard(SHOP).await;

    let response = app
        .post_form(
            &format!("/app/choices?shop={SHOP}"),
            &form("Podcast\nInstagram\n\nPodcast\nOther"),
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["choices"],
        json!(["Podcast", "Instagram", "Other", "From A Friend"])
    );

    let account = app.store.find_account(&shop(SHOP)).await.unwrap().unwrap();
    let list = app.store.find_choice_list(&shop(SHOP)).await.unwrap().unwrap();
    assert_eq!(account.choice_list_id, Some(list.id));
}

#[tokio::test]
async fn test_later_submission_is_a_union() {
    let app = TestApp::new();
    app.onboard_with_choices(SHOP, &["Podcast"]).await;

    let response = app
        .post_form(
            &format!("/app/choices?shop={SHOP}"),
            &form("Instagram\nPodcast\nFrom A Friend"),
        )
        .await;

    assert_eq!(
        json_body(response).await["choices"],
        json!(["Podcast", "From A Friend", "Other", "Instagram"])
    );
}

#[tokio::test]
async fn test_remove_choice() {
    let app = TestApp::new();
    app.onboard_with_choices(SHOP, &["Podcast", "Instagram"]).await;

    let response = app
        .post_form(
            &format!("/app/choices/remove?shop={SHOP}"),
            "choice=Instagram",
        )
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        json_body(response).await["choices"],
        json!(["Podcast", "From A Friend", "Other"])
    );

    let response = app.get(&format!("/widget/choices?shop={SHOP}")).await;
    assert_eq!(
        json_body(response).await["choices"],
        json!(["Podcast", "From A Friend", "Other"])
    );
}

#[tokio::test]
async fn test_remove_without_list_is_not_found() {
    let app = TestApp::new();
    app.onboard(SHOP).await;

    let response = app
        .post_form(&format!("/app/choices/remove?shop={SHOP}"), "choice=Other")
        .await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_list_choices_empty_before_submission() {
    let app = TestApp::new();
    app.onboard(SHOP).await;

    let response = app.get(&format!("/app/choices?shop={SHOP}")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await["choices"], json!([]));

    // The widget has nothing to show until a list is linked
    let response = app.get(&format!("/widget/choices?shop={SHOP}")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_over_long_choice_is_rejected() {
    let app = TestApp::new();
    app.onboard(SHOP).await;

    let response = app
        .post_form(&format!("/app/choices?shop={SHOP}"), &form(&"x".repeat(256)))
        .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(app.store.find_choice_list(&shop(SHOP)).await.unwrap().is_none());
}

#[tokio::test]
async fn test_choices_require_active_billing() {
    let app = TestApp::new();
    app.authorize(SHOP).await;

    let response = app
        .post_form(&format!("/app/choices?shop={SHOP}"), &form("Podcast"))
        .await;
    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert!(app.store.find_choice_list(&shop(SHOP)).await.unwrap().is_none());
}
