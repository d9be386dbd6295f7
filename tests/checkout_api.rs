mod common;

use std::sync::atomic::Ordering;
use std::time::Duration;

use axum::http::StatusCode;
use serde_json::json;

use common::*;
use opensase_storefront::domain::value_objects::{Money, PushToken};
use opensase_storefront::store::{OrderStore, PushRecipientStore};

#[tokio::test]
async fn cod_order_with_correct_total_is_persisted() {
    let h = harness();
    let (status, body) = post_json(&h.app, "/api/checkout/cash-on-delivery", cod_body(22560)).await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], true);
    assert_eq!(body["emailSent"], true);
    assert!(body["orderNumber"].as_str().unwrap().starts_with("ORD-"));

    let orders = h.orders.list_all().await.unwrap();
    assert_eq!(orders.len(), 1);
    assert_eq!(orders[0].total(), Money::new(22560));
    assert_eq!(orders[0].id().to_string(), body["orderId"].as_str().unwrap());
    assert_eq!(h.email.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn cod_amount_mismatch_is_rejected_without_persisting() {
    let h = harness();
    for amount in [22000, 22559] {
        let (status, body) = post_json(&h.app, "/api/checkout/cash-on-delivery", cod_body(amount)).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["code"], "AMOUNT_MISMATCH");
    }
    assert!(h.orders.is_empty().await);
    assert!(h.email.sent.lock().unwrap().is_empty());
}

#[tokio::test]
async fn tampered_cod_fee_is_rejected() {
    let h = harness();
    let mut body = cod_body(21970);
    body["cashOnDeliveryFee"] = json!(0);
    let (status, _) = post_json(&h.app, "/api/checkout/cash-on-delivery", body).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
    assert!(h.orders.is_empty().await);
}

#[tokio::test]
async fn cod_email_failure_still_reports_success() {
    let h = harness_with_email(RecordingEmail { fail: true, ..Default::default() });
    let (status, body) = post_json(&h.app, "/api/checkout/cash-on-delivery", cod_body(22560)).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["emailSent"], false);
    assert_eq!(h.orders.len().await, 1);
}

#[tokio::test]
async fn cod_rejects_invalid_email_and_empty_cart() {
    let h = harness();
    let mut bad_email = cod_body(22560);
    bad_email["email"] = json!("not-an-email");
    let (status, _) = post_json(&h.app, "/api/checkout/cash-on-delivery", bad_email).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let mut empty = cod_body(22560);
    empty["items"] = json!([]);
    let (status, body) = post_json(&h.app, "/api/checkout/cash-on-delivery", empty).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(h.orders.is_empty().await);
}

#[tokio::test]
async fn malformed_json_bodies_get_the_error_envelope() {
    let h = harness();
    let mut missing_amount = cod_body(22560);
    missing_amount.as_object_mut().unwrap().remove("amount");
    let (status, body) = post_json(&h.app, "/api/checkout/cash-on-delivery", missing_amount).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(body["error"].as_str().unwrap().contains("amount"), "{body}");

    let (status, body) = post_json(&h.app, "/api/admin/order-status", json!({ "orderId": "not-a-uuid", "status": "sent" })).await;
    assert!(status.is_client_error());
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(h.orders.is_empty().await);
}

#[tokio::test]
async fn cod_order_triggers_push_to_registered_devices() {
    let h = harness();
    h.recipients.upsert(PushToken::new("ExponentPushToken[abc123]")).await.unwrap();
    h.recipients.upsert(PushToken::new("not-a-push-token")).await.unwrap();

    let (status, _) = post_json(&h.app, "/api/checkout/cash-on-delivery", cod_body(22560)).await;
    assert_eq!(status, StatusCode::OK);

    // The push batch runs detached from the request.
    for _ in 0..50 {
        if h.push.sent.load(Ordering::SeqCst) > 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(h.push.sent.load(Ordering::SeqCst), 1);
}

fn card_item(price: i64, quantity: u32) -> serde_json::Value {
    json!({ "id": "p1", "name": "BreathGuard", "price": price, "size": "M", "quantity": quantity })
}

#[tokio::test]
async fn checkout_session_sends_priced_request_to_gateway() {
    let h = harness();
    let (status, body) = post_json(
        &h.app,
        "/api/checkout-session",
        json!({ "items": [card_item(9990, 2)], "promoCode": "welcome10" }),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["sessionId"], "cs_test_1");
    assert_eq!(body["url"], "https://checkout.example/pay");
    assert!(h.orders.is_empty().await, "card orders are only created by the webhook");

    let requests = h.gateway.requests.lock().unwrap();
    let request = &requests[0];
    assert_eq!(request.line_items[0].unit_amount, Money::new(9990));
    assert_eq!(request.line_items[0].name, "BreathGuard (M)");
    assert_eq!(request.shipping_options[0].amount, Money::new(1990));
    assert_eq!(request.shipping_options[1].amount, Money::new(3990));
    assert_eq!(request.coupon.as_deref(), Some("coupon_welcome"));
    assert_eq!(request.metadata["freeShipping"], "false");
    assert_eq!(request.success_url, "https://shop.example/success?session_id={CHECKOUT_SESSION_ID}");
    assert_eq!(request.cancel_url, "https://shop.example/cart");
}

#[tokio::test]
async fn checkout_session_applies_free_shipping_over_threshold() {
    let h = harness();
    let (status, _) = post_json(&h.app, "/api/checkout-session", json!({ "items": [card_item(15000, 2)] })).await;
    assert_eq!(status, StatusCode::OK);

    let requests = h.gateway.requests.lock().unwrap();
    assert_eq!(requests[0].shipping_options[0].amount, Money::ZERO);
    assert_eq!(requests[0].metadata["freeShipping"], "true");
    assert!(requests[0].coupon.is_none());
}

#[tokio::test]
async fn checkout_session_prices_fractional_units_as_charged() {
    let h = harness();
    let item = json!({ "id": "p1", "name": "BreathGuard", "price": 14999.6, "size": "M", "quantity": 2 });
    let (status, body) = post_json(&h.app, "/api/checkout-session", json!({ "items": [item] })).await;
    assert_eq!(status, StatusCode::OK, "{body}");

    let requests = h.gateway.requests.lock().unwrap();
    assert_eq!(requests[0].line_items[0].unit_amount, Money::new(15_000));
    assert_eq!(requests[0].shipping_options[0].amount, Money::ZERO);
    assert_eq!(requests[0].metadata["freeShipping"], "true");
}

#[tokio::test]
async fn checkout_session_enforces_card_minimum() {
    let h = harness();
    let (status, body) = post_json(&h.app, "/api/checkout-session", json!({ "items": [card_item(174, 1)] })).await;
    assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY, "{body}");
    assert_eq!(body["code"], "BELOW_MINIMUM");
    assert!(h.gateway.requests.lock().unwrap().is_empty());

    let (status, _) = post_json(&h.app, "/api/checkout-session", json!({ "items": [card_item(175, 1)] })).await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn checkout_session_lifts_free_items_to_price_floor() {
    let h = harness();
    let (status, _) = post_json(&h.app, "/api/checkout-session", json!({ "items": [card_item(0, 1)] })).await;
    assert_eq!(status, StatusCode::OK);
    let requests = h.gateway.requests.lock().unwrap();
    assert_eq!(requests[0].line_items[0].unit_amount, Money::new(200));
}

#[tokio::test]
async fn checkout_session_rejects_empty_cart() {
    let h = harness();
    let (status, body) = post_json(&h.app, "/api/checkout-session", json!({ "items": [] })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["code"], "VALIDATION_ERROR");
    assert!(h.gateway.requests.lock().unwrap().is_empty());
}

#[tokio::test]
async fn push_token_registration_is_an_upsert() {
    let h = harness();
    for _ in 0..2 {
        let (status, body) = post_json(&h.app, "/api/push-tokens", json!({ "token": "ExponentPushToken[abc123]" })).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["success"], true);
    }
    assert_eq!(h.recipients.list().await.unwrap().len(), 1);

    let (status, _) = post_json(&h.app, "/api/push-tokens", json!({ "token": "   " })).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_service() {
    let h = harness();
    let (status, body) = get(&h.app, "/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
}
