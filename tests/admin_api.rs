mod common;

use axum::http::StatusCode;
use serde_json::json;
use uuid::Uuid;

use common::*;
use opensase_storefront::domain::aggregates::OrderStatus;
use opensase_storefront::store::OrderStore;

async fn place_cod_order(h: &Harness) -> String {
    let (status, body) = post_json(&h.app, "/api/checkout/cash-on-delivery", cod_body(22560)).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["orderId"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn status_walks_the_table_and_sets_fulfilled() {
    let h = harness();
    let id = place_cod_order(&h).await;

    for status in ["sent", "success"] {
        let (code, body) = post_json(&h.app, "/api/admin/order-status", json!({ "orderId": id, "status": status })).await;
        assert_eq!(code, StatusCode::OK, "{body}");
        assert_eq!(body["success"], true);
    }

    let order = h.orders.find_by_id(id.parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Success);
    assert!(order.is_fulfilled());
}

#[tokio::test]
async fn legacy_sent_back_spelling_is_accepted() {
    let h = harness();
    let id = place_cod_order(&h).await;
    post_json(&h.app, "/api/admin/order-status", json!({ "orderId": id, "status": "sent" })).await;
    let (code, _) = post_json(&h.app, "/api/admin/order-status", json!({ "orderId": id, "status": "sent back" })).await;
    assert_eq!(code, StatusCode::OK);
    let order = h.orders.find_by_id(id.parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::SentBack);
}

#[tokio::test]
async fn invalid_transition_is_a_conflict() {
    let h = harness();
    let id = place_cod_order(&h).await;
    let (code, body) = post_json(&h.app, "/api/admin/order-status", json!({ "orderId": id, "status": "success" })).await;
    assert_eq!(code, StatusCode::CONFLICT);
    assert_eq!(body["code"], "INVALID_TRANSITION");
    let order = h.orders.find_by_id(id.parse().unwrap()).await.unwrap().unwrap();
    assert_eq!(order.status(), OrderStatus::Pending);
}

#[tokio::test]
async fn unknown_status_and_order_are_rejected() {
    let h = harness();
    let id = place_cod_order(&h).await;
    let (code, _) = post_json(&h.app, "/api/admin/order-status", json!({ "orderId": id, "status": "shipped" })).await;
    assert_eq!(code, StatusCode::BAD_REQUEST);

    let (code, body) =
        post_json(&h.app, "/api/admin/order-status", json!({ "orderId": Uuid::now_v7(), "status": "sent" })).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
    assert_eq!(body["code"], "NOT_FOUND");
}

#[tokio::test]
async fn orders_can_be_read_back() {
    let h = harness();
    let first = place_cod_order(&h).await;
    let second = place_cod_order(&h).await;

    let (code, body) = get(&h.app, "/api/orders").await;
    assert_eq!(code, StatusCode::OK);
    let ids: Vec<&str> = body.as_array().unwrap().iter().map(|o| o["id"].as_str().unwrap()).collect();
    assert_eq!(ids.len(), 2);
    assert!(ids.contains(&first.as_str()) && ids.contains(&second.as_str()));

    let (code, body) = get(&h.app, &format!("/api/orders/{first}")).await;
    assert_eq!(code, StatusCode::OK);
    assert_eq!(body["total"], 22560);
    assert_eq!(body["codFee"], 590);
    assert_eq!(body["status"], "pending");

    let (code, _) = get(&h.app, &format!("/api/orders/{}", Uuid::now_v7())).await;
    assert_eq!(code, StatusCode::NOT_FOUND);
}
