//! Shared fixtures: a scripted gateway double and an app on in-memory stores.

#![allow(dead_code)]

use async_trait::async_trait;
use axum::{body::Body, Router};
use chama_donations::api::{build_router, AppDependencies, AppState};
use chama_donations::config::{AdminConfig, ReconciliationConfig};
use chama_donations::database::memory::{MemoryDonationStore, MemoryReceiptStore};
use chama_donations::payments::error::GatewayError;
use chama_donations::payments::provider::PaymentGateway;
use chama_donations::payments::types::{
    CreatePaymentRequest, GatewayPayment, PaymentMethod, QrCode, WebhookNotification,
    WebhookRequest,
};
use chama_donations::workers::reconciliation_poller::PollerRegistry;
use http::{Request, Response};
use serde_json::Value as JsonValue;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tower::util::ServiceExt;

pub const ADMIN_TOKEN: &str = "admin-test-token";
pub const RECEIPTS_BASE_URL: &str = "https://cdn.example.com/receipts";
pub const VALID_SIGNATURE: &str = "ts=1,v1=valid";

/// In-process gateway answering from a script.
///
/// `get_payment` pops the next scripted status for the id; the last one is
/// repeated forever, and an unscripted id reads as `pending`. Forgotten ids
/// answer with a 404.
pub struct ScriptedGateway {
    next_id: AtomicU64,
    create_status: Mutex<String>,
    statuses: Mutex<HashMap<String, VecDeque<String>>>,
    created: Mutex<Vec<CreatePaymentRequest>>,
    fail_create: AtomicBool,
    forgotten: Mutex<HashSet<String>>,
    lookups: AtomicUsize,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1000),
            create_status: Mutex::new("pending".to_string()),
            statuses: Mutex::new(HashMap::new()),
            created: Mutex::new(Vec::new()),
            fail_create: AtomicBool::new(false),
            forgotten: Mutex::new(HashSet::new()),
            lookups: AtomicUsize::new(0),
        }
    }

    pub fn set_create_status(&self, status: &str) {
        *self.create_status.lock().unwrap() = status.to_string();
    }

    pub fn script(&self, payment_id: &str, statuses: &[&str]) {
        self.statuses.lock().unwrap().insert(
            payment_id.to_string(),
            statuses.iter().map(|s| s.to_string()).collect(),
        );
    }

    pub fn fail_creates(&self) {
        self.fail_create.store(true, Ordering::SeqCst);
    }

    pub fn forget(&self, payment_id: &str) {
        self.forgotten.lock().unwrap().insert(payment_id.to_string());
    }

    pub fn created(&self) -> Vec<CreatePaymentRequest> {
        self.created.lock().unwrap().clone()
    }

    pub fn lookups(&self) -> usize {
        self.lookups.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for ScriptedGateway {
    async fn create_payment(
        &self,
        request: CreatePaymentRequest,
    ) -> Result<GatewayPayment, GatewayError> {
        if self.fail_create.load(Ordering::SeqCst) {
            return Err(GatewayError::provider("mercadopago", "internal_error"));
        }

        let id = self.next_id.fetch_add(1, Ordering::SeqCst).to_string();
        let status = self.create_status.lock().unwrap().clone();
        let qr_code = (request.method == PaymentMethod::Pix).then(|| QrCode {
            text: format!("00020126pix-{}", id),
            image_base64: Some("iVBORw0KGgo=".to_string()),
            image_url: None,
        });
        let reference_id = Some(request.external_reference.clone());
        self.created.lock().unwrap().push(request);

        Ok(GatewayPayment {
            id,
            status,
            status_detail: Some("scripted".to_string()),
            reference_id,
            qr_code,
            raw: JsonValue::Null,
        })
    }

    async fn get_payment(&self, payment_id: &str) -> Result<GatewayPayment, GatewayError> {
        self.lookups.fetch_add(1, Ordering::SeqCst);
        if self.forgotten.lock().unwrap().contains(payment_id) {
            return Err(GatewayError::Provider {
                gateway: "mercadopago".to_string(),
                message: "resource not found".to_string(),
                status: Some(404),
                payload: None,
                retryable: false,
            });
        }
        let status = {
            let mut statuses = self.statuses.lock().unwrap();
            match statuses.get_mut(payment_id) {
                Some(queue) if queue.len() > 1 => queue.pop_front().unwrap_or_default(),
                Some(queue) => queue.front().cloned().unwrap_or_default(),
                None => "pending".to_string(),
            }
        };

        Ok(GatewayPayment {
            id: payment_id.to_string(),
            status,
            status_detail: None,
            reference_id: None,
            qr_code: None,
            raw: JsonValue::Null,
        })
    }

    fn name(&self) -> &'static str {
        "mercadopago"
    }

    fn verify_webhook(
        &self,
        request: &WebhookRequest,
    ) -> Result<WebhookNotification, GatewayError> {
        if request.header("x-signature") != Some(VALID_SIGNATURE) {
            return Err(GatewayError::WebhookVerification {
                message: "signature mismatch".to_string(),
            });
        }
        let body: JsonValue = serde_json::from_slice(&request.payload).unwrap_or_default();
        let payment_id = request
            .data_id
            .clone()
            .or_else(|| {
                body.pointer("/data/id")
                    .and_then(|v| v.as_str())
                    .map(str::to_string)
            })
            .ok_or_else(|| GatewayError::WebhookVerification {
                message: "missing data.id".to_string(),
            })?;
        Ok(WebhookNotification {
            payment_id,
            event_type: body
                .get("type")
                .and_then(|v| v.as_str())
                .map(str::to_string),
        })
    }
}

pub struct TestApp {
    pub router: Router,
    pub gateway: Arc<ScriptedGateway>,
    pub store: Arc<MemoryDonationStore>,
    pub receipts: Arc<MemoryReceiptStore>,
    pub poller: Arc<PollerRegistry>,
    pub shutdown_tx: watch::Sender<bool>,
}

pub struct TestAppOptions {
    pub auto_start: bool,
    pub max_watch: Option<Duration>,
    pub admin_token: Option<String>,
}

impl Default for TestAppOptions {
    fn default() -> Self {
        Self {
            auto_start: false,
            max_watch: None,
            admin_token: Some(ADMIN_TOKEN.to_string()),
        }
    }
}

pub fn test_app() -> TestApp {
    test_app_with(TestAppOptions::default())
}

pub fn test_app_with(options: TestAppOptions) -> TestApp {
    let gateway = Arc::new(ScriptedGateway::new());
    let store = Arc::new(MemoryDonationStore::new());
    let receipts = Arc::new(MemoryReceiptStore::new());
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let state = AppState::new(AppDependencies {
        gateway: gateway.clone(),
        store: store.clone(),
        receipts: receipts.clone(),
        reconciliation: ReconciliationConfig {
            poll_interval: Duration::from_millis(20),
            max_watch: options.max_watch,
            auto_start: options.auto_start,
        },
        admin: AdminConfig {
            api_token: options.admin_token,
            utc_offset_hours: -3,
            page_size: 10,
        },
        receipts_base_url: Some(RECEIPTS_BASE_URL.to_string()),
        shutdown_rx,
    })
    .expect("app state");
    let poller = state.poller.clone();

    TestApp {
        router: build_router(state, &["*".to_string()]),
        gateway,
        store,
        receipts,
        poller,
        shutdown_tx,
    }
}

impl TestApp {
    pub async fn send(&self, request: Request<Body>) -> Response<Body> {
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router is infallible")
    }

    pub async fn post_json(&self, uri: &str, body: &JsonValue) -> Response<Body> {
        self.send(
            Request::builder()
                .method("POST")
                .uri(uri)
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    pub async fn get(&self, uri: &str) -> Response<Body> {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

pub async fn json_body(response: Response<Body>) -> JsonValue {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

pub async fn text_body(response: Response<Body>) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

/// A PIX donation of R$ 100,00 from a payer with a valid CPF.
pub fn pix_donation() -> JsonValue {
    serde_json::json!({
        "amount": "100.00",
        "description": "Dízimo",
        "churchLocation": "sede",
        "paymentMethod": "pix",
        "customer": {
            "name": "Maria da Silva",
            "email": "maria@example.com",
            "cpf": "123.456.789-09",
            "phone": "(11) 98765-4321"
        }
    })
}

/// Poll `condition` every few milliseconds for up to two seconds.
pub async fn eventually<F, Fut>(mut condition: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..200 {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
