//! HTTP surface tests: router driven with `oneshot`, Daraja faked with wiremock.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tower::ServiceExt;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use stk_checkout::build_router;
use stk_checkout::config::AppConfig;
use stk_checkout::database::MemoryStore;
use stk_checkout::services::mpesa_service::MpesaService;
use stk_checkout::state::AppState;

async fn create_test_app(server: &MockServer) -> Router {
    let vars: HashMap<&str, String> = HashMap::from([
        ("MPESA_CONSUMER_KEY", "consumer-key".to_string()),
        ("MPESA_CONSUMER_SECRET", "consumer-secret".to_string()),
        ("MPESA_SHORT_CODE", "174379".to_string()),
        ("MPESA_PASSKEY", "test-passkey".to_string()),
        ("MPESA_CALLBACK_URL", "https://shop.example.com/api/mpesa/callback".to_string()),
        ("MPESA_BASE_URL", server.uri()),
    ]);
    let config = AppConfig::from_source(|key| vars.get(key).cloned()).unwrap();

    Mock::given(method("GET"))
        .and(path("/oauth/v1/generate"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(json!({"access_token": "tok-1", "expires_in": "3599"})),
        )
        .mount(server)
        .await;

    let mpesa_service = Arc::new(MpesaService::new(&config).unwrap());
    let store = Arc::new(MemoryStore::new());
    build_router(AppState::new(mpesa_service, store.clone(), store))
}

fn post_json(uri: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&body).unwrap()
}

async fn read_text(response: axum::response::Response) -> String {
    let body = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    String::from_utf8(body.to_vec()).unwrap()
}

fn callback(checkout_request_id: &str, result_code: i64, desc: &str) -> Value {
    let mut stk_callback = json!({
        "MerchantRequestID": "29115-34620561-1",
        "CheckoutRequestID": checkout_request_id,
        "ResultCode": result_code,
        "ResultDesc": desc,
    });
    if result_code == 0 {
        stk_callback["CallbackMetadata"] = json!({
            "Item": [
                {"Name": "Amount", "Value": 500},
                {"Name": "MpesaReceiptNumber", "Value": "ABC123"},
                {"Name": "TransactionDate", "Value": 20240105070309u64},
                {"Name": "PhoneNumber", "Value": 254712345678u64}
            ]
        });
    }
    json!({"Body": {"stkCallback": stk_callback}})
}

async fn mount_stk_accepted(server: &MockServer, checkout_request_id: &str) {
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpush/v1/processrequest"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "MerchantRequestID": "29115-34620561-1",
            "CheckoutRequestID": checkout_request_id,
            "ResponseCode": "0",
            "ResponseDescription": "Success. Request accepted for processing",
            "CustomerMessage": "Success. Request accepted for processing"
        })))
        .mount(server)
        .await;
}

#[tokio::test]
async fn stk_push_requires_phone_and_amount() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;

    let response = app
        .oneshot(post_json("/api/mpesa/stkpush", &json!({"phoneNumber": "0712345678"})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let json = read_json(response).await;
    assert_eq!(json["success"], false);
    assert_eq!(json["error"], "Phone number and amount are required");
}

#[tokio::test]
async fn stk_push_rejects_unparseable_body() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;

    let request = Request::builder()
        .method("POST")
        .uri("/api/mpesa/stkpush")
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn push_then_callback_confirms_payment_once() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;
    mount_stk_accepted(&server, "ws_CO_900").await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/mpesa/stkpush",
            &json!({"phoneNumber": "+254712345678", "amount": 500, "accountReference": "ORDER-42"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["success"], true);
    assert_eq!(json["checkoutRequestID"], "ws_CO_900");
    assert_eq!(json["data"]["CheckoutRequestID"], "ws_CO_900");

    let outcome = read_json(
        app.clone()
            .oneshot(get("/api/payment/outcome/ws_CO_900"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(outcome["outcome"]["status"], "pending");
    assert_eq!(outcome["accountReference"], "ORDER-42");

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/mpesa/callback",
            &callback("ws_CO_900", 0, "The service request is processed successfully."),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_text(response).await, "Callback received successfully");

    // A late failure for the same push must not undo the confirmation.
    let response = app
        .clone()
        .oneshot(post_json(
            "/api/mpesa/callback",
            &callback("ws_CO_900", 1032, "Request cancelled by user"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let record = read_json(
        app.oneshot(get("/api/payment/outcome/ws_CO_900"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(record["outcome"]["status"], "confirmed");
    assert_eq!(record["outcome"]["amount"], 500);
    assert_eq!(record["outcome"]["receiptNumber"], "ABC123");
    assert_eq!(record["outcome"]["payerPhone"], "254712345678");
    assert_eq!(record["outcome"]["transactionDate"], "20240105070309");
    assert_eq!(record["merchantRequestID"], "29115-34620561-1");
    assert_eq!(record["accountReference"], "ORDER-42");
}

#[tokio::test]
async fn failed_callback_records_reason() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/mpesa/callback",
            &callback("ws_CO_901", 1032, "Request cancelled by user"),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let record = read_json(
        app.oneshot(get("/api/payment/outcome/ws_CO_901"))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(record["outcome"]["status"], "failed");
    assert_eq!(record["outcome"]["failureReason"], "Request cancelled by user");
}

#[tokio::test]
async fn malformed_callback_gets_server_error() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;

    let response = app
        .oneshot(post_json("/api/mpesa/callback", &json!({"unexpected": true})))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(read_text(response).await, "Error processing callback");
}

#[tokio::test]
async fn status_query_is_a_pass_through() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;
    let gateway_response = json!({
        "ResponseCode": "0",
        "CheckoutRequestID": "ws_CO_902",
        "ResultCode": "0",
        "ResultDesc": "The service request is processed successfully."
    });
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpushquery/v1/query"))
        .respond_with(ResponseTemplate::new(200).set_body_json(gateway_response.clone()))
        .mount(&server)
        .await;

    let response = app
        .oneshot(get("/api/payment/status/ws_CO_902"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, gateway_response);
}

#[tokio::test]
async fn status_query_failure_forwards_gateway_body() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;
    let gateway_error = json!({
        "requestId": "1101-2201-1",
        "errorCode": "500.001.1001",
        "errorMessage": "The transaction is being processed"
    });
    Mock::given(method("POST"))
        .and(path("/mpesa/stkpushquery/v1/query"))
        .respond_with(ResponseTemplate::new(500).set_body_json(gateway_error.clone()))
        .mount(&server)
        .await;

    let response = app
        .oneshot(get("/api/payment/status/ws_CO_unknown"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let json = read_json(response).await;
    assert_eq!(json["error"], "Failed to query payment status");
    assert_eq!(json["details"], gateway_error);
}

#[tokio::test]
async fn orders_are_created_and_fetched() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;

    let response = app
        .clone()
        .oneshot(post_json(
            "/api/orders",
            &json!({
                "customerInfo": {"name": "Wanjiku", "phone": "0712345678"},
                "cartItems": [{"id": "p-1", "name": "Pilau", "price": 350.0, "quantity": 2}],
                "total": 700.0,
                "deliveryAddress": "Moi Avenue, Nairobi",
                "paymentMethod": "mpesa"
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let json = read_json(response).await;
    assert_eq!(json["success"], true);
    let order_id = json["orderId"].as_str().unwrap().to_string();

    let order = read_json(
        app.oneshot(get(&format!("/api/orders/{}", order_id)))
            .await
            .unwrap(),
    )
    .await;
    assert_eq!(order["status"], "pending");
    assert_eq!(order["cartItems"][0]["name"], "Pilau");
}

#[tokio::test]
async fn empty_cart_is_rejected() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;

    let response = app
        .oneshot(post_json(
            "/api/orders",
            &json!({
                "customerInfo": {"name": "Wanjiku", "phone": "0712345678"},
                "cartItems": [],
                "total": 700.0,
                "deliveryAddress": "Moi Avenue, Nairobi",
                "paymentMethod": "mpesa"
            }),
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_order_is_not_found() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;

    let response = app.oneshot(get("/api/orders/missing")).await.unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn health_reports_storage_backend() {
    let server = MockServer::start().await;
    let app = create_test_app(&server).await;

    let json = read_json(app.oneshot(get("/health")).await.unwrap()).await;
    assert_eq!(json["status"], "healthy");
    assert_eq!(json["storage"], "memory");
    assert_eq!(json["environment"], "sandbox");
}
