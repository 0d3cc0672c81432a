//! CRM proxying: envelope normalization, error mirroring, invoice streaming,
//! multipart forwarding and the two-step billing update.

#![allow(clippy::unwrap_used)]

use axum::http::{Method, StatusCode, header};
use patient_portal_integration_tests::{MultipartBody, TestRequest, app};
use serde_json::json;
use wiremock::matchers::{
    body_json, body_string_contains, header as header_eq, method, path, query_param,
};
use wiremock::{Mock, MockServer, ResponseTemplate};

#[tokio::test]
async fn test_orders_are_unwrapped() {
    let crm = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/crm-orders/list"))
        .and(header_eq("authorization", "Bearer abc"))
        .and(header_eq("is-patient-portal", "true"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": {"orders": {"data": [{"id": 1}]}}
        })))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::get("/api/orders")
        .logged_in("42", "abc")
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({"success": true, "orders": [{"id": 1}]}));
}

#[tokio::test]
async fn test_paged_orders_carry_pagination() {
    let crm = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/crm-orders/list"))
        .and(query_param("page", "2"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": {"orders": {"data": [{"id": 11}], "current_page": 2, "last_page": 3}}
        })))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::get("/api/user/orders?page=2")
        .logged_in("42", "abc")
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    let body = response.json();
    assert_eq!(body["orders"], json!([{"id": 11}]));
    assert_eq!(body["pagination"]["current_page"], 2);
}

#[tokio::test]
async fn test_subscription_reads_are_idempotent() {
    let crm = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/subscriptions/list"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "subscriptions": [{"id": 3, "status": "active"}]
        })))
        .expect(2)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let mut bodies = Vec::new();
    for _ in 0..2 {
        let response = TestRequest::get("/api/user/subscriptions")
            .logged_in("42", "abc")
            .send(app(&[("CRM_HOST", &uri)]))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        bodies.push(response.json());
    }

    assert_eq!(bodies[0], bodies[1]);
    assert_eq!(
        bodies[0],
        json!({"success": true, "subscriptions": [{"id": 3, "status": "active"}]})
    );
}

#[tokio::test]
async fn test_upstream_errors_are_mirrored() {
    let crm = MockServer::start().await;
    Mock::given(path("/api/subscriptions/3"))
        .respond_with(
            ResponseTemplate::new(404).set_body_json(json!({"message": "Subscription not found"})),
        )
        .mount(&crm)
        .await;
    Mock::given(path("/api/subscriptions/4"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": false, "message": "Subscription is locked"})),
        )
        .mount(&crm)
        .await;
    Mock::given(path("/api/subscriptions/5"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::get("/api/user/subscription/3")
        .logged_in("42", "abc")
        .send(app(&[("CRM_HOST", &uri)]))
        .await;
    assert_eq!(response.status, StatusCode::NOT_FOUND);
    let body = response.json();
    assert_eq!(body["success"], false);
    assert_eq!(body["error"], "Subscription not found");
    assert_eq!(body["details"], json!({"message": "Subscription not found"}));

    // A 2xx that flags failure in the body
    let response = TestRequest::get("/api/user/subscription/4")
        .logged_in("42", "abc")
        .send(app(&[("CRM_HOST", &uri)]))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.json()["error"], "Subscription is locked");

    let response = TestRequest::get("/api/user/subscription/5")
        .logged_in("42", "abc")
        .send(app(&[("CRM_HOST", &uri)]))
        .await;
    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(response.json()["error"], "Failed to reach crm");
}

#[tokio::test]
async fn test_unreachable_crm() {
    // Nothing listens on port 9 on the loopback interface
    let response = TestRequest::get("/api/user/profile")
        .logged_in("42", "abc")
        .send(app(&[("CRM_HOST", "http://127.0.0.1:9")]))
        .await;

    assert_eq!(response.status, StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(
        response.json(),
        json!({"success": false, "error": "Failed to reach crm"})
    );
}

#[tokio::test]
async fn test_quantity_update_forwards_body() {
    let crm = MockServer::start().await;
    Mock::given(method("PUT"))
        .and(path("/api/subscriptions/3/quantity"))
        .and(body_json(json!({"line_item_id": 9, "quantity": 2})))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"status": true, "data": {"id": 3, "quantity": 2}})),
        )
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::new(Method::PUT, "/api/user/subscription/update/quantity/3")
        .logged_in("42", "abc")
        .json(&json!({"lineItemId": "9", "quantity": 2}))
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({"success": true, "data": {"id": 3, "quantity": 2}})
    );
}

#[tokio::test]
async fn test_pause_is_the_default_action() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/subscriptions/3/pause"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": true, "data": {"status": "on-hold"}})),
        )
        .expect(1)
        .mount(&crm)
        .await;
    Mock::given(method("POST"))
        .and(path("/api/subscriptions/3/cancel"))
        .and(body_json(json!({"reason": "moving"})))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({"status": true, "data": {"status": "cancelled"}})),
        )
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::post("/api/user/pause-cancel-subscription")
        .logged_in("42", "abc")
        .json(&json!({"subscriptionId": 3}))
        .send(app(&[("CRM_HOST", &uri)]))
        .await;
    assert_eq!(response.json()["data"]["status"], "on-hold");

    let response = TestRequest::post("/api/user/pause-cancel-subscription")
        .logged_in("42", "abc")
        .json(&json!({"subscription_id": 3, "action": "cancel", "reason": "moving"}))
        .send(app(&[("CRM_HOST", &uri)]))
        .await;
    assert_eq!(response.json()["data"]["status"], "cancelled");
}

#[tokio::test]
async fn test_refill_date_is_forwarded() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/subscriptions/change-refill-date"))
        .and(body_json(json!({"subscription_id": 3, "refill_date": "2025-12-27"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": true, "data": {}})))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::post("/api/user/change-refill-date")
        .logged_in("42", "abc")
        .json(&json!({"subscription_id": 3, "refillDate": "2025-12-27"}))
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
}

#[tokio::test]
async fn test_invoice_is_streamed_with_headers() {
    let pdf = b"%PDF-1.4 fake invoice".to_vec();
    let crm = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/crm-orders/12/invoice"))
        .and(header_eq("accept", "application/pdf"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(pdf.clone(), "application/pdf")
                .insert_header("content-disposition", "attachment; filename=\"invoice-12.pdf\"")
                .insert_header("x-internal", "hidden"),
        )
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::get("/api/user/order/invoice/download/12")
        .logged_in("42", "abc")
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.headers[header::CONTENT_TYPE], "application/pdf");
    assert_eq!(
        response.headers[header::CONTENT_DISPOSITION],
        "attachment; filename=\"invoice-12.pdf\""
    );
    assert!(response.headers.get("x-internal").is_none());
    assert_eq!(response.body, pdf);
}

#[tokio::test]
async fn test_missing_invoice_is_json_error() {
    let crm = MockServer::start().await;
    Mock::given(path("/api/crm-orders/12/invoice"))
        .respond_with(ResponseTemplate::new(404).set_body_json(json!({"message": "No invoice"})))
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::get("/api/user/order/invoice/download/12")
        .logged_in("42", "abc")
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::NOT_FOUND);
    assert_eq!(response.json()["error"], "No invoice");
}

#[tokio::test]
async fn test_billing_with_shipping_copy() {
    let crm = MockServer::start().await;
    let address = json!({"address_1": "1 Main St", "city": "Ottawa", "postcode": "K1A 0B1", "country": "CA"});
    Mock::given(method("PATCH"))
        .and(path("/api/user/billing-address"))
        .and(body_json(&address))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": true, "data": {"kind": "billing"}})))
        .expect(1)
        .mount(&crm)
        .await;
    Mock::given(method("PATCH"))
        .and(path("/api/user/shipping-address"))
        .and(body_json(&address))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": true, "data": {"kind": "shipping"}})))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let mut body = address.clone();
    body["same_as_shipping"] = json!(true);
    let response = TestRequest::new(Method::PATCH, "/api/user/billing/address/update")
        .logged_in("42", "abc")
        .json(&body)
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(
        response.json(),
        json!({"success": true, "data": {"billing": {"kind": "billing"}, "shipping": {"kind": "shipping"}}})
    );
}

#[tokio::test]
async fn test_billing_saved_but_shipping_failed() {
    let crm = MockServer::start().await;
    Mock::given(path("/api/user/billing-address"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": true, "data": {"id": 1}})))
        .expect(1)
        .mount(&crm)
        .await;
    Mock::given(path("/api/user/shipping-address"))
        .respond_with(ResponseTemplate::new(422).set_body_json(json!({"message": "Invalid postcode"})))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::new(Method::PATCH, "/api/user/billing/address/update")
        .logged_in("42", "abc")
        .json(&json!({
            "address_1": "1 Main St",
            "city": "Ottawa",
            "postcode": "K1A 0B1",
            "country": "CA",
            "same_as_shipping": "true"
        }))
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json();
    assert_eq!(
        body["error"],
        "billing address updated but shipping address update failed: Invalid postcode"
    );
    assert_eq!(body["details"]["completed"], "billing address");
    assert_eq!(body["details"]["data"], json!({"id": 1}));
    assert_eq!(body["details"]["upstream"], json!({"message": "Invalid postcode"}));
}

#[tokio::test]
async fn test_shipping_outage_after_billing_is_still_422() {
    let crm = MockServer::start().await;
    Mock::given(path("/api/user/billing-address"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": true, "data": {"id": 1}})))
        .expect(1)
        .mount(&crm)
        .await;
    Mock::given(path("/api/user/shipping-address"))
        .respond_with(ResponseTemplate::new(503).set_body_string("maintenance"))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::new(Method::PATCH, "/api/user/billing/address/update")
        .logged_in("42", "abc")
        .json(&json!({
            "address_1": "1 Main St",
            "city": "Ottawa",
            "postcode": "K1A 0B1",
            "country": "CA",
            "same_as_shipping": true
        }))
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::UNPROCESSABLE_ENTITY);
    let body = response.json();
    assert_eq!(
        body["error"],
        "billing address updated but shipping address update failed: maintenance"
    );
    assert_eq!(body["details"]["data"], json!({"id": 1}));
}

#[tokio::test]
async fn test_profile_json_update() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/profile/update"))
        .and(body_json(json!({"first_name": "Pat"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": {"user": {"id": 42, "first_name": "Pat"}}
        })))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::post("/api/user/profile")
        .logged_in("42", "abc")
        .json(&json!({"first_name": "Pat"}))
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["user"]["first_name"], "Pat");
}

#[tokio::test]
async fn test_profile_multipart_is_forwarded() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/profile/upload"))
        .and(body_string_contains("name=\"phone_number\""))
        .and(body_string_contains("555-0100"))
        .and(body_string_contains("filename=\"card.png\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": {"user": {"id": 42, "phone_number": "555-0100"}}
        })))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let (content_type, body) = MultipartBody::default()
        .text("phone_number", "555-0100")
        .file("insurance_card_image", "card.png", "image/png", b"\x89PNG")
        .finish();
    let response = TestRequest::post("/api/user/profile")
        .logged_in("42", "abc")
        .raw(&content_type, body)
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["user"]["phone_number"], "555-0100");
}

#[tokio::test]
async fn test_profile_photo_over_two_megabytes_is_forwarded() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/user/profile/upload"))
        .and(body_string_contains("filename=\"id.jpg\""))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "status": true,
            "data": {"user": {"id": 42, "photo_id": "id.jpg"}}
        })))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let photo = vec![b'x'; 3 * 1024 * 1024];
    let (content_type, body) = MultipartBody::default()
        .file("photo_id", "id.jpg", "image/jpeg", &photo)
        .finish();
    let response = TestRequest::post("/api/user/profile")
        .logged_in("42", "abc")
        .raw(&content_type, body)
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["user"]["photo_id"], "id.jpg");
    let forwarded = &crm.received_requests().await.unwrap()[0];
    assert!(forwarded.body.len() > photo.len());
}

#[tokio::test]
async fn test_large_document_upload_is_forwarded() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/42/documents"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": true, "data": {"id": 901}})))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let scan = vec![b'%'; 5 * 1024 * 1024];
    let (content_type, body) = MultipartBody::default()
        .file("file", "scan.pdf", "application/pdf", &scan)
        .finish();
    let response = TestRequest::post("/api/user/42/documents")
        .logged_in("42", "abc")
        .raw(&content_type, body)
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json()["data"]["id"], 901);
}

#[tokio::test]
async fn test_upload_over_limit_is_413() {
    let crm = MockServer::start().await;
    Mock::given(wiremock::matchers::any())
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let photo = vec![0_u8; 21 * 1024 * 1024];
    let (content_type, body) = MultipartBody::default()
        .file("photo_id", "huge.jpg", "image/jpeg", &photo)
        .finish();
    let response = TestRequest::post("/api/user/profile")
        .logged_in("42", "abc")
        .raw(&content_type, body)
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::PAYLOAD_TOO_LARGE);
    assert_eq!(
        response.json(),
        json!({"success": false, "error": "File too large: uploads are limited to 20 MB"})
    );
}

#[tokio::test]
async fn test_prescriptions_default_to_cookie_user() {
    let crm = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/api/prescriptions/list"))
        .and(query_param("crm_user_id", "42"))
        .and(query_param("per_page", "10"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": true, "data": [{"id": 5}]})))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let response = TestRequest::get("/api/user/prescriptions")
        .logged_in("42", "abc")
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({"success": true, "data": [{"id": 5}]}));
}

#[tokio::test]
async fn test_own_documents_upload() {
    let crm = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/users/42/documents"))
        .and(body_string_contains("filename=\"lab.pdf\""))
        .and(body_string_contains("lab-result"))
        .respond_with(ResponseTemplate::new(201).set_body_json(json!({"status": true, "data": {"id": 900}})))
        .expect(1)
        .mount(&crm)
        .await;
    let uri = crm.uri();

    let (content_type, body) = MultipartBody::default()
        .text("document_type", "lab-result")
        .file("file", "lab.pdf", "application/pdf", b"%PDF")
        .finish();
    let response = TestRequest::post("/api/user/42/documents")
        .logged_in("42", "abc")
        .raw(&content_type, body)
        .send(app(&[("CRM_HOST", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({"success": true, "data": {"id": 900}}));
}

#[tokio::test]
async fn test_appointments_use_email_cookie() {
    let calendly = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/meetings"))
        .and(query_param("email", "pat@example.com"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"collection": [{"uri": "m1"}]})))
        .expect(1)
        .mount(&calendly)
        .await;
    let uri = calendly.uri();

    let response = TestRequest::get("/api/user/appointments")
        .logged_in("42", "abc")
        .cookie("userEmail", "pat%40example.com")
        .send(app(&[("CALENDLY_BASE_URL", &uri)]))
        .await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.json(), json!({"success": true, "meetings": [{"uri": "m1"}]}));
}
