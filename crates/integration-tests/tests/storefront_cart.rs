//! Cart endpoints: mutations, per-device isolation and write-through
//! persistence.

#![allow(clippy::unwrap_used)]

use axum::http::StatusCode;
use serde_json::json;

use green_basket_integration_tests::{FakeCatalog, TestApp, product};

#[tokio::test]
async fn test_new_visitor_sees_empty_hydrated_cart() {
    let app = TestApp::new();
    let browser = app.browser();

    let response = browser.get("/cart").await;

    assert_eq!(response.status, StatusCode::OK);
    let cart = response.json();
    assert_eq!(cart["items"], json!([]));
    assert_eq!(cart["total"], 0);
    assert_eq!(cart["item_count"], 0);
    assert_eq!(cart["hydrated"], true);
    assert!(browser.session_cookie().is_some());
}

#[tokio::test]
async fn test_adding_same_product_merges_quantities() {
    let app = TestApp::new();
    let browser = app.browser();

    browser
        .post_json("/cart/add", &json!({"product_id": "prod_kale", "quantity": 2}))
        .await;
    browser
        .post_json("/cart/add", &json!({"product_id": "prod_carrots"}))
        .await;
    let response = browser
        .post_json("/cart/add", &json!({"product_id": "prod_kale", "quantity": 3}))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let cart = response.json();
    let items = cart["items"].as_array().unwrap();
    assert_eq!(items.len(), 2);
    assert_eq!(items[0]["id"], "prod_kale");
    assert_eq!(items[0]["quantity"], 5);
    assert_eq!(items[0]["price"], 350);
    assert_eq!(items[1]["id"], "prod_carrots");
    assert_eq!(items[1]["quantity"], 1);
    assert_eq!(cart["item_count"], 6);
    assert_eq!(cart["total"], 5 * 350 + 199);
}

#[tokio::test]
async fn test_remove_takes_one_unit_then_drops_line() {
    let app = TestApp::new();
    let browser = app.browser();
    browser
        .post_json("/cart/add", &json!({"product_id": "prod_kale", "quantity": 2}))
        .await;

    let cart = browser
        .post_json("/cart/remove", &json!({"id": "prod_kale"}))
        .await
        .json();
    assert_eq!(cart["items"][0]["quantity"], 1);

    let cart = browser
        .post_json("/cart/remove", &json!({"id": "prod_kale"}))
        .await
        .json();
    assert_eq!(cart["items"], json!([]));

    // Removing something that is not there changes nothing.
    let response = browser
        .post_json("/cart/remove", &json!({"id": "prod_kale"}))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["items"], json!([]));
}

#[tokio::test]
async fn test_clear_empties_cart() {
    let app = TestApp::new();
    let browser = app.browser();
    browser
        .post_json("/cart/add", &json!({"product_id": "prod_kale"}))
        .await;
    browser
        .post_json("/cart/add", &json!({"product_id": "prod_carrots"}))
        .await;

    let cart = browser.post("/cart/clear").await.json();

    assert_eq!(cart["items"], json!([]));
    assert_eq!(cart["total"], 0);
    assert_eq!(browser.get("/cart").await.json()["item_count"], 0);
}

#[tokio::test]
async fn test_zero_quantity_is_ignored() {
    let app = TestApp::new();
    let browser = app.browser();

    let response = browser
        .post_json("/cart/add", &json!({"product_id": "prod_kale", "quantity": 0}))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["items"], json!([]));
}

#[tokio::test]
async fn test_unknown_product_is_not_found() {
    let app = TestApp::new();
    let browser = app.browser();

    let response = browser
        .post_json("/cart/add", &json!({"product_id": "prod_missing"}))
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"], "Product not found");
}

#[tokio::test]
async fn test_unpriced_product_is_rejected() {
    let app = TestApp::new();
    let browser = app.browser();

    let response = browser
        .post_json("/cart/add", &json!({"product_id": "prod_giftbox"}))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(browser.get("/cart").await.json()["items"], json!([]));
}

#[tokio::test]
async fn test_each_browser_has_its_own_cart() {
    let app = TestApp::new();
    let alice = app.browser();
    let bob = app.browser();

    alice
        .post_json("/cart/add", &json!({"product_id": "prod_kale"}))
        .await;

    assert_eq!(alice.get("/cart").await.json()["item_count"], 1);
    assert_eq!(bob.get("/cart").await.json()["item_count"], 0);
}

#[tokio::test]
async fn test_cart_is_written_through_and_survives_restart() {
    let app = TestApp::new();
    let browser = app.browser();
    browser
        .post_json("/cart/add", &json!({"product_id": "prod_kale", "quantity": 3}))
        .await;

    let payload = app
        .persisted_cart(|payload| payload.contains("\"quantity\":3"))
        .await
        .expect("cart snapshot was never written");
    assert!(payload.contains("prod_kale"));
    assert!(payload.contains("\"version\":0"));

    let restarted = app.restart();
    let browser = browser.switch_to(&restarted);
    let cart = browser.get("/cart").await.json();

    assert_eq!(cart["hydrated"], true);
    assert_eq!(cart["items"][0]["id"], "prod_kale");
    assert_eq!(cart["items"][0]["quantity"], 3);
}

#[tokio::test]
async fn test_cleared_cart_is_persisted_empty() {
    let app = TestApp::new();
    let browser = app.browser();
    browser
        .post_json("/cart/add", &json!({"product_id": "prod_kale"}))
        .await;
    browser.post("/cart/clear").await;

    let payload = app
        .persisted_cart(|payload| payload.contains("\"products\":[]"))
        .await;
    assert!(payload.is_some());

    let browser = browser.switch_to(&app.restart());
    assert_eq!(browser.get("/cart").await.json()["items"], json!([]));
}

#[tokio::test]
async fn test_cart_survives_sign_in() {
    let app = TestApp::new();
    app.identity.with_user("jane@example.com", "secret1!");
    let browser = app.browser();
    browser
        .post_json("/cart/add", &json!({"product_id": "prod_carrots"}))
        .await;
    let before = browser.session_cookie();

    browser.sign_in("jane@example.com", "secret1!").await;

    assert_ne!(browser.session_cookie(), before, "session id should rotate");
    assert_eq!(browser.get("/cart").await.json()["items"][0]["id"], "prod_carrots");
}

#[tokio::test]
async fn test_catalog_listing_and_search() {
    let app = TestApp::builder()
        .catalog(FakeCatalog::with_products(vec![
            product("prod_kale", "Curly Kale", "Greens", Some(350)),
            product("prod_chard", "Rainbow Chard", " greens ", Some(420)),
            product("prod_beet", "Beetroot", "Roots", Some(180)),
        ]))
        .build();
    let browser = app.browser();

    let products = browser.get("/products").await.json();
    assert_eq!(products.as_array().unwrap().len(), 3);

    let kale = browser.get("/products/prod_kale").await;
    assert_eq!(kale.status, StatusCode::OK);
    assert_eq!(kale.json()["name"], "Curly Kale");
    assert_eq!(
        browser.get("/products/prod_nope").await.status,
        StatusCode::NOT_FOUND
    );

    let categories = browser.get("/categories").await.json();
    assert_eq!(categories, json!(["Greens", "Roots", "greens"]));

    let greens = browser.get("/categories/GREENS").await.json();
    assert_eq!(greens.as_array().unwrap().len(), 2);

    let hits = browser.get("/search?query=chard").await.json();
    assert_eq!(hits.as_array().unwrap().len(), 1);
    assert_eq!(hits[0]["id"], "prod_chard");
}
