#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::Value;
use tower::ServiceExt;

use opensase_storefront::admin::AdminStatusController;
use opensase_storefront::api::{self, AppState};
use opensase_storefront::notify::{EmailError, EmailSender, NotificationDispatcher, OutgoingEmail, PushError, PushMessage, PushSender};
use opensase_storefront::payment::{CheckoutSessionRequest, GatewayError, PaymentGateway, SessionHandle};
use opensase_storefront::publisher::EventPublisher;
use opensase_storefront::reconciler::{CheckoutSettings, OrderReconciler, PromoCode};
use opensase_storefront::store::{MemoryOrderStore, MemoryPushRecipientStore};

pub const WEBHOOK_SECRET: &str = "whsec_integration";

#[derive(Default)]
pub struct RecordingGateway {
    pub requests: Mutex<Vec<CheckoutSessionRequest>>,
}

#[async_trait]
impl PaymentGateway for RecordingGateway {
    async fn create_session(&self, request: &CheckoutSessionRequest) -> Result<SessionHandle, GatewayError> {
        let mut requests = self.requests.lock().unwrap();
        requests.push(request.clone());
        Ok(SessionHandle {
            session_id: format!("cs_test_{}", requests.len()),
            url: Some("https://checkout.example/pay".into()),
        })
    }
}

#[derive(Default)]
pub struct CountingPush {
    pub sent: AtomicUsize,
}

#[async_trait]
impl PushSender for CountingPush {
    async fn send(&self, _message: &PushMessage) -> Result<(), PushError> {
        self.sent.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingEmail {
    pub fail: bool,
    pub sent: Mutex<Vec<OutgoingEmail>>,
}

#[async_trait]
impl EmailSender for RecordingEmail {
    async fn send(&self, email: &OutgoingEmail) -> Result<(), EmailError> {
        if self.fail {
            return Err(EmailError::Build("smtp relay refused".into()));
        }
        self.sent.lock().unwrap().push(email.clone());
        Ok(())
    }
}

pub struct Harness {
    pub app: Router,
    pub orders: Arc<MemoryOrderStore>,
    pub recipients: Arc<MemoryPushRecipientStore>,
    pub gateway: Arc<RecordingGateway>,
    pub push: Arc<CountingPush>,
    pub email: Arc<RecordingEmail>,
}

pub fn settings() -> CheckoutSettings {
    CheckoutSettings {
        public_base_url: "https://shop.example".into(),
        allowed_countries: vec!["HU".into()],
        promo: Some(PromoCode { code: "WELCOME10".into(), coupon_id: "coupon_welcome".into() }),
        order_number_prefix: "ORD".into(),
        gateway_timeout: Duration::from_secs(5),
    }
}

pub fn harness() -> Harness {
    harness_with_email(RecordingEmail::default())
}

pub fn harness_with_email(email: RecordingEmail) -> Harness {
    let orders = Arc::new(MemoryOrderStore::new());
    let recipients = Arc::new(MemoryPushRecipientStore::new());
    let gateway = Arc::new(RecordingGateway::default());
    let push = Arc::new(CountingPush::default());
    let email = Arc::new(email);

    let notifier = Arc::new(NotificationDispatcher::new(recipients.clone(), push.clone(), Some(email.clone() as Arc<dyn EmailSender>)));
    let reconciler = OrderReconciler::new(orders.clone(), gateway.clone(), notifier, EventPublisher::disabled(), settings());
    let state = AppState {
        reconciler: Arc::new(reconciler),
        admin: Arc::new(AdminStatusController::new(orders.clone(), EventPublisher::disabled())),
        push_recipients: recipients.clone(),
        webhook_secret: Arc::from(WEBHOOK_SECRET),
    };
    Harness { app: api::router(state), orders, recipients, gateway, push, email }
}

pub async fn send(app: &Router, request: Request<Body>) -> (StatusCode, Value) {
    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let body = if bytes.is_empty() { Value::Null } else { serde_json::from_slice(&bytes).unwrap() };
    (status, body)
}

pub async fn post_json(app: &Router, uri: &str, body: Value) -> (StatusCode, Value) {
    let request = Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap();
    send(app, request).await
}

pub async fn get(app: &Router, uri: &str) -> (StatusCode, Value) {
    send(app, Request::builder().uri(uri).body(Body::empty()).unwrap()).await
}

pub fn cod_body(amount: i64) -> Value {
    serde_json::json!({
        "items": [{ "n": "BreathGuard", "s": "M", "q": 2, "p": 9990 }],
        "shippingDetails": {
            "name": "Kiss Anna",
            "phone": "+36301234567",
            "address": { "line1": "Fő utca 1.", "city": "Budapest", "postalCode": "1011", "country": "HU" }
        },
        "billingDetails": { "name": "Kiss Anna" },
        "amount": amount,
        "currency": "HUF",
        "shippingType": "standard",
        "cashOnDeliveryFee": 590,
        "email": "anna@example.hu"
    })
}
