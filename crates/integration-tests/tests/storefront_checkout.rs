//! Hosted checkout and order recording.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use green_basket_integration_tests::{Browser, TestApp};

const EMAIL: &str = "jane@example.com";
const PASSWORD: &str = "secret1!";

async fn signed_in(app: &TestApp) -> Browser {
    app.identity.with_user(EMAIL, PASSWORD);
    let browser = app.browser();
    browser.sign_in(EMAIL, PASSWORD).await;
    browser
}

async fn add(browser: &Browser, product_id: &str, quantity: u32) {
    let response = browser
        .post_json(
            "/cart/add",
            &json!({"product_id": product_id, "quantity": quantity}),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK, "{}", response.text());
}

#[tokio::test]
async fn test_checkout_requires_sign_in() {
    let app = TestApp::new();
    let browser = app.browser();
    add(&browser, "prod_kale", 1).await;

    let response = browser.post("/checkout").await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(response.location(), Some("/login"));
    assert!(app.catalog.checkouts().is_empty());
}

#[tokio::test]
async fn test_checkout_page_shows_user_and_cart() {
    let app = TestApp::new();
    let browser = signed_in(&app).await;
    add(&browser, "prod_carrots", 2).await;

    let page = browser.get("/checkout").await;

    assert_eq!(page.status, StatusCode::OK);
    let page = page.json();
    assert_eq!(page["user"]["email"], EMAIL);
    assert_eq!(page["cart"]["total"], 398);
}

#[tokio::test]
async fn test_empty_cart_cannot_check_out() {
    let app = TestApp::new();
    let browser = signed_in(&app).await;

    let response = browser.post("/checkout").await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert!(app.catalog.checkouts().is_empty());
}

#[tokio::test]
async fn test_checkout_redirects_to_hosted_page() {
    let app = TestApp::new();
    let browser = signed_in(&app).await;
    add(&browser, "prod_kale", 2).await;
    add(&browser, "prod_carrots", 1).await;

    let response = browser.post("/checkout").await;

    assert_eq!(response.status, StatusCode::SEE_OTHER);
    assert_eq!(
        response.location(),
        Some("https://checkout.stripe.test/c/pay/cs_test_1")
    );

    let requests = app.catalog.checkouts();
    assert_eq!(requests.len(), 1);
    let request = &requests[0];
    assert_eq!(request.success_url, "http://shop.test/success");
    assert_eq!(request.cancel_url, "http://shop.test/checkout");
    assert_eq!(request.customer_email.as_deref(), Some(EMAIL));
    let lines: Vec<_> = request
        .items
        .iter()
        .map(|item| (item.id.as_str().to_owned(), item.quantity))
        .collect();
    assert_eq!(
        lines,
        [("prod_kale".to_owned(), 2), ("prod_carrots".to_owned(), 1)]
    );

    // The cart is kept until the payment succeeds.
    assert_eq!(browser.get("/cart").await.json()["item_count"], 3);
}

#[tokio::test]
async fn test_success_records_order_and_clears_cart() {
    let app = TestApp::new();
    let browser = signed_in(&app).await;
    add(&browser, "prod_kale", 2).await;

    let response = browser.get("/success").await;

    assert_eq!(response.status, StatusCode::OK);
    let page = response.json();
    assert_eq!(page["order"]["total"], 700);
    assert_eq!(page["order"]["items"][0]["id"], "prod_kale");
    assert_eq!(page["cart"]["items"], json!([]));
    assert_eq!(browser.get("/cart").await.json()["item_count"], 0);

    // Reloading the page does not record a second order.
    let again = browser.get("/success").await.json();
    assert_eq!(again["order"], serde_json::Value::Null);

    let dashboard = browser.get("/dashboard").await.json();
    assert_eq!(dashboard["orders"].as_array().unwrap().len(), 1);
}

#[tokio::test]
async fn test_dashboard_lists_orders_newest_first() {
    let app = TestApp::new();
    let browser = signed_in(&app).await;

    add(&browser, "prod_kale", 1).await;
    browser.get("/success").await;
    tokio::time::sleep(std::time::Duration::from_millis(5)).await;
    add(&browser, "prod_carrots", 1).await;
    browser.get("/success").await;

    let orders = browser.get("/dashboard").await.json()["orders"].clone();

    assert_eq!(orders.as_array().unwrap().len(), 2);
    assert_eq!(orders[0]["total"], 199);
    assert_eq!(orders[1]["total"], 350);
}

#[tokio::test]
async fn test_orders_are_private_to_their_owner() {
    let app = TestApp::new();
    let jane = signed_in(&app).await;
    add(&jane, "prod_kale", 1).await;
    jane.get("/success").await;

    app.identity.with_user("bob@example.com", PASSWORD);
    let bob = app.browser();
    bob.sign_in("bob@example.com", PASSWORD).await;

    assert_eq!(bob.get("/dashboard").await.json()["orders"], json!([]));
}

#[tokio::test]
async fn test_anonymous_success_keeps_cart() {
    let app = TestApp::new();
    let browser = app.browser();
    add(&browser, "prod_kale", 2).await;

    let page = browser.get("/success").await;

    assert_eq!(page.status, StatusCode::OK);
    let page = page.json();
    assert_eq!(page["order"], serde_json::Value::Null);
    assert_eq!(page["cart"]["items"][0]["quantity"], 2);
    assert_eq!(browser.get("/cart").await.json()["item_count"], 2);
}

#[tokio::test]
async fn test_success_with_lost_session_keeps_cart() {
    let app = TestApp::new();
    let browser = signed_in(&app).await;
    add(&browser, "prod_carrots", 3).await;

    // The stored session can no longer be confirmed with the provider.
    app.identity.revoke_all();
    let page = browser.get("/success").await.json();

    assert_eq!(page["order"], serde_json::Value::Null);
    assert_eq!(page["cart"]["item_count"], 3);
    assert_eq!(browser.get("/cart").await.json()["item_count"], 3);
}
