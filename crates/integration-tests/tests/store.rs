//! Cart, checkout URL, product variations and address lookup. None of these
//! need a portal session.

#![allow(clippy::unwrap_used)]

use std::time::Duration;

use axum::http::StatusCode;
use patient_portal::services::woocommerce::variation_cache;
use patient_portal_core::ProductId;
use patient_portal_integration_tests::{TestRequest, app, app_with_variation_cache};
use serde_json::json;
use wiremock::matchers::{body_json, header, method, path, query_param};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_cart_round_trips_nonce() {
    let store = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/store/v1/cart"))
        .and(header("Nonce", "old-nonce"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"items": [], "totals": {"total_price": "0"}}))
                .insert_header("Nonce", "new-nonce"),
        )
        .expect(1)
        .mount(&store)
        .await;
    let uri = store.uri();

    let response = TestRequest::get("/api/cart")
        .cookie("cart-nonce", "old-nonce")
        .send(app(&[("NEXT_PUBLIC_ROCKY_API_URL", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({"success": true, "cart": {"items": [], "totals": {"total_price": "0"}}})
    );
    let nonce = response.set_cookie("cart-nonce").unwrap();
    assert_eq!(nonce.value(), "new-nonce");
    assert_eq!(nonce.http_only(), Some(true));
}

#[tokio::test]
async fn test_add_item_with_variation() {
    let store = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/wp-json/wc/store/v1/cart/add-item"))
        .and(body_json(json!({"id": 8, "quantity": 2})))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"items_count": 2})))
        .expect(1)
        .mount(&store)
        .await;
    let uri = store.uri();

    let response = TestRequest::post("/api/cart/add-item")
        .json(&json!({"productId": 5, "variationId": 8, "quantity": 2}))
        .send(app(&[("NEXT_PUBLIC_ROCKY_API_URL", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["cart"], json!({"items_count": 2}));
    // No nonce came back, so none is set
    assert!(response.set_cookie("cart-nonce").is_none());
}

#[tokio::test]
async fn test_add_item_rejects_zero_quantity() {
    let store = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&store)
        .await;
    let uri = store.uri();

    let response = TestRequest::post("/api/cart/add-item")
        .json(&json!({"productId": 5, "quantity": 0}))
        .send(app(&[("NEXT_PUBLIC_ROCKY_API_URL", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_checkout_url() {
    let response = TestRequest::get(
        "/api/cart/checkout-url?items=%5B%7B%22productId%22%3A5%2C%22variationId%22%3A8%2C%22quantity%22%3A3%7D%5D",
    )
    .send(app(&[("NEXT_PUBLIC_ROCKY_API_URL", "https://shop.example.com")]))
    .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({
            "success": true,
            "url": "https://shop.example.com/checkout/?add-to-cart=8&quantity=3",
        })
    );

    let response = TestRequest::get("/api/cart/checkout-url")
        .send(app(&[("NEXT_PUBLIC_ROCKY_API_URL", "https://shop.example.com")]))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
}

fn rest_vars(uri: &str) -> [(&'static str, &str); 3] {
    [
        ("NEXT_PUBLIC_ROCKY_API_URL", uri),
        ("CONSUMER_KEY", "ck"),
        ("CONSUMER_SECRET", "cs"),
    ]
}

#[tokio::test]
async fn test_variations_are_cached() {
    let store = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/wp-json/wc/v3/products/10/variations"))
        .and(query_param("consumer_key", "ck"))
        .and(query_param("consumer_secret", "cs"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([{"id": 11, "price": "30"}])))
        .expect(2)
        .mount(&store)
        .await;
    let uri = store.uri();
    let cache = variation_cache(Duration::from_secs(60));

    // Separate routers sharing one cache: only the first request goes out
    for _ in 0..2 {
        let response = TestRequest::get("/api/products/10/variations")
            .send(app_with_variation_cache(&rest_vars(&uri), cache.clone()))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.json(), json!([{"id": 11, "price": "30"}]));
    }

    cache.invalidate(&ProductId::from(10)).await;
    let response = TestRequest::get("/api/products/10/variations")
        .send(app_with_variation_cache(&rest_vars(&uri), cache))
        .await;
    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_variation_errors_are_not_cached() {
    let store = MockServer::start().await;
    Mock::given(path("/wp-json/wc/v3/products/10/variations"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "Invalid ID."})))
        .expect(2)
        .mount(&store)
        .await;
    let uri = store.uri();
    let router = app(&rest_vars(&uri));

    for _ in 0..2 {
        let response = TestRequest::get("/api/products/10/variations")
            .send(router.clone())
            .await;
        assert_eq!(response.status, StatusCode::NOT_FOUND);
        assert_eq!(response.json()["error"], "Invalid ID.");
    }
}

#[tokio::test]
async fn test_address_find() {
    let postcanada = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Find/v2.10/json3.ws"))
        .and(query_param("Key", "pc-key"))
        .and(query_param("SearchTerm", "1 Main"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"Id": "CA|CP|1", "Text": "1 Main St"}]
        })))
        .expect(1)
        .mount(&postcanada)
        .await;
    let uri = postcanada.uri();

    let response = TestRequest::post("/api/postcanada/address-details")
        .json(&json!({"searchTerm": "1 Main"}))
        .send(app(&[("POSTCANADA_BASE_URL", &uri), ("POSTCANADA_API_KEY", "pc-key")]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({"success": true, "data": [{"Id": "CA|CP|1", "Text": "1 Main St"}]})
    );
}

#[tokio::test]
async fn test_address_retrieve_error_item() {
    let postcanada = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/Retrieve/v2.11/json3.ws"))
        .and(query_param("Id", "CA|CP|1"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "Items": [{"Error": "1001", "Description": "Id Invalid", "Cause": "The Id parameter was not valid."}]
        })))
        .expect(1)
        .mount(&postcanada)
        .await;
    let uri = postcanada.uri();

    let response = TestRequest::post("/api/postcanada/address-details")
        .json(&json!({"addressId": "CA|CP|1", "searchTerm": "ignored"}))
        .send(app(&[("POSTCANADA_BASE_URL", &uri), ("POSTCANADA_API_KEY", "pc-key")]))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Id Invalid");
}

#[tokio::test]
async fn test_address_lookup_needs_input() {
    let response = TestRequest::post("/api/postcanada/address-details")
        .json(&json!({"addressId": " ", "searchTerm": ""}))
        .send(app(&[("POSTCANADA_API_KEY", "pc-key")]))
        .await;

    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "addressId or searchTerm is required");
}
