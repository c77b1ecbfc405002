//! Order Gateway Integration Tests
//!
//! Exercises the HTTP adapter against a mock order API, and the reconciler
//! flows that sit on top of it.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde_json::json;
use tokio::net::TcpListener;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use terminal_stream::{
    GatewayError, HistoryQuery, HttpOrderGateway, OrderGateway, OrderReconciler, OrderRequest,
    OrderStatus, Side,
};

async fn setup() -> (MockServer, HttpOrderGateway) {
    let server = MockServer::start().await;
    let gateway = HttpOrderGateway::new(&server.uri(), Duration::from_secs(2)).unwrap();
    (server, gateway)
}

fn week_of_march() -> HistoryQuery {
    HistoryQuery {
        start: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
        end: NaiveDate::from_ymd_opt(2024, 3, 7).unwrap(),
    }
}

#[tokio::test]
async fn history_posts_date_range_and_reads_orders_field() {
    let (server, gateway) = setup().await;
    Mock::given(method("POST"))
        .and(path("/orders/history"))
        .and(body_json(json!({"start": "2024-03-01", "end": "2024-03-07"})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "orders": [
                {"order_id": "1", "code": "US.AAPL", "order_status": "SUBMITTED", "qty": 100},
                {"order_id": "2", "code": "US.MSFT", "order_status": "FILLED_ALL", "qty": "50"}
            ]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let orders = gateway.fetch_history(&week_of_march()).await.unwrap();

    assert_eq!(orders.len(), 2);
    assert_eq!(orders[0].qty, Some(Decimal::from(100)));
    assert_eq!(orders[1].order_status, OrderStatus::FilledAll);
}

#[tokio::test]
async fn root_array_responses_are_accepted() {
    let (server, gateway) = setup().await;
    Mock::given(method("DELETE"))
        .and(path("/orders/42"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"order_id": 42, "order_status": "CANCELLED_ALL"}
        ])))
        .mount(&server)
        .await;

    let orders = gateway.cancel_order("42").await.unwrap();
    assert_eq!(orders[0].order_id, "42");
    assert!(orders[0].is_terminal());
}

#[tokio::test]
async fn empty_body_yields_no_orders() {
    let (server, gateway) = setup().await;
    Mock::given(method("DELETE"))
        .and(path("/orders/7"))
        .respond_with(ResponseTemplate::new(204))
        .mount(&server)
        .await;

    assert!(gateway.cancel_order("7").await.unwrap().is_empty());
}

#[tokio::test]
async fn non_success_status_is_reported_with_body() {
    let (server, gateway) = setup().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(422).set_body_string("insufficient buying power"))
        .mount(&server)
        .await;

    let request = OrderRequest::limit("US.AAPL", Side::Buy, Decimal::from(10), Decimal::from(150));
    let err = gateway.submit_order(&request).await.unwrap_err();

    match err {
        GatewayError::Status { status, body } => {
            assert_eq!(status, 422);
            assert_eq!(body, "insufficient buying power");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn invalid_json_is_a_decode_error() {
    let (server, gateway) = setup().await;
    Mock::given(method("POST"))
        .and(path("/orders/history"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>oops</html>"))
        .mount(&server)
        .await;

    let err = gateway.fetch_history(&week_of_march()).await.unwrap_err();
    assert!(matches!(err, GatewayError::Decode(_)));
}

#[tokio::test]
async fn unreachable_server_is_a_network_error() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let gateway = HttpOrderGateway::new(&format!("http://{addr}"), Duration::from_millis(500)).unwrap();
    let err = gateway.cancel_order("1").await.unwrap_err();
    assert!(matches!(err, GatewayError::Network(_)));
}

#[tokio::test]
async fn submit_through_reconciler_promotes_pending_order() {
    let (server, gateway) = setup().await;
    Mock::given(method("POST"))
        .and(path("/orders"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "order_id": "5001",
            "order_status": "SUBMITTED",
            "create_time": "2024-03-07 09:30:00"
        })))
        .expect(1)
        .mount(&server)
        .await;

    let reconciler = OrderReconciler::default();
    let request = OrderRequest::limit("US.NVDA", Side::Sell, Decimal::from(5), Decimal::new(90050, 2));
    reconciler.submit(&gateway, request).await.unwrap();

    assert!(reconciler.pending().is_empty());
    let active = reconciler.active();
    assert_eq!(active.len(), 1);
    assert_eq!(active[0].order_id, "5001");
    assert_eq!(active[0].code.as_deref(), Some("US.NVDA"));
    assert_eq!(active[0].create_time.as_deref(), Some("2024-03-07 09:30:00"));
}

#[tokio::test]
async fn bootstrap_partitions_history() {
    let (server, gateway) = setup().await;
    Mock::given(method("POST"))
        .and(path("/orders/history"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!([
            {"order_id": "1", "order_status": "SUBMITTED"},
            {"order_id": "2", "order_status": "FILLED_PART"},
            {"order_id": "3", "order_status": "CANCELLED_ALL"},
            {"order_id": "4"}
        ])))
        .mount(&server)
        .await;

    let reconciler = OrderReconciler::default();
    let summary = reconciler.bootstrap(&gateway, &week_of_march()).await.unwrap();

    assert_eq!(summary.active, 2);
    assert_eq!(summary.historical, 1);
    assert_eq!(reconciler.active().len(), 2);
    assert_eq!(reconciler.historical()[0].order_id, "3");
}
