//! Operator endpoints: auth guard, ticket listing, CSV export and audit log.

mod common;

use std::time::Duration;

use axum::http::{header, StatusCode};
use common::{fixtures, TestConfig, TestFixture, ADMIN_KEY};
use ticketline_core::{AuditFilter, AuditStore};

/// Wait for the background writer to persist `count` events of a type.
async fn wait_for_events(fixture: &TestFixture, event_type: &str, count: i64) {
    let filter = AuditFilter::new().with_event_type(event_type);
    for _ in 0..50 {
        if fixture.audit_store.count(&filter).unwrap() >= count {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {count} {event_type} events");
}

#[tokio::test]
async fn test_admin_routes_require_key() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    for path in [
        "/api/v1/admin/tickets",
        "/api/v1/admin/tickets/export",
        "/api/v1/admin/audit",
    ] {
        let anonymous = fixture.get(path).await;
        assert_status!(anonymous, StatusCode::UNAUTHORIZED);

        let wrong = fixture
            .get_with_headers(path, &[("X-API-Key", "nope")])
            .await;
        assert_status!(wrong, StatusCode::UNAUTHORIZED);

        let ok = fixture.get_with_headers(path, &[("X-API-Key", ADMIN_KEY)]).await;
        assert_status!(ok, StatusCode::OK);
    }

    // Buyer routes stay open
    let schemes = fixture.get("/api/v1/schemes").await;
    assert_status!(schemes, StatusCode::OK);
}

#[tokio::test]
async fn test_admin_ticket_listing_paginates_and_sorts() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    for number in [10_070, 10_050, 10_060] {
        fixture.buy(1, number, fixtures::buyer()).await;
    }
    fixture.buy(2, 20_050, fixtures::other_buyer()).await;

    let page = fixture
        .admin_get("/api/v1/admin/tickets?schemeId=1&limit=2&page=1&sort=ticketNumber&order=asc")
        .await;
    assert_status!(page, StatusCode::OK);
    assert_eq!(page.body["total"], 3);
    assert_eq!(page.body["totalPages"], 2);
    let numbers: Vec<u64> = page.body["tickets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["ticketNumber"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, vec![10_050, 10_060]);

    let second = fixture
        .admin_get("/api/v1/admin/tickets?schemeId=1&limit=2&page=2&sort=ticketNumber&order=asc")
        .await;
    let numbers: Vec<u64> = second.body["tickets"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["ticketNumber"].as_u64().unwrap())
        .collect();
    assert_eq!(numbers, vec![10_070]);

    let everything = fixture.admin_get("/api/v1/admin/tickets").await;
    assert_eq!(everything.body["total"], 4);
    assert_eq!(everything.body["page"], 1);
}

#[tokio::test]
async fn test_admin_ticket_listing_rejects_unknown_sort() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    let response = fixture
        .admin_get("/api/v1/admin/tickets?sort=favouriteColour")
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_admin_ticket_listing_rejects_page_past_range() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;
    fixture.buy(1, 10_050, fixtures::buyer()).await;

    let response = fixture
        .admin_get("/api/v1/admin/tickets?page=9223372036854775807&limit=500")
        .await;
    assert_status!(response, StatusCode::BAD_REQUEST);

    // Far but representable pages are just empty
    let far = fixture
        .admin_get("/api/v1/admin/tickets?page=1000000&limit=500")
        .await;
    assert_status!(far, StatusCode::OK);
    assert_eq!(far.body["total"], 1);
    assert_eq!(far.body["tickets"].as_array().unwrap().len(), 0);
}

#[tokio::test]
async fn test_admin_export_csv() {
    let fixture = TestFixture::with_config(TestConfig::with_api_key()).await;

    let mut buyer = fixtures::other_buyer();
    buyer.full_name = "Verma, Asha".to_string();
    fixture.buy(1, 10_050, buyer).await;
    fixture.buy(2, 20_050, fixtures::buyer()).await;

    let response = fixture
        .admin_get("/api/v1/admin/tickets/export?schemeId=1")
        .await;
    assert_status!(response, StatusCode::OK);
    assert!(response.headers[header::CONTENT_TYPE]
        .to_str()
        .unwrap()
        .starts_with("text/csv"));
    let disposition = response.headers[header::CONTENT_DISPOSITION]
        .to_str()
        .unwrap()
        .to_string();
    assert!(disposition.starts_with("attachment; filename=\"tickets-"));
    assert!(disposition.ends_with(".csv\""));

    let lines: Vec<&str> = response.text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].starts_with("Ticket,Scheme,Number"));
    assert!(lines[1].starts_with("AB10050A,Golden Chance,10050,\"Verma, Asha\",9123456780"));
}

#[tokio::test]
async fn test_audit_log_records_checkout() {
    let fixture = TestFixture::new().await;

    let bought = fixture.buy(1, 10_050, fixtures::buyer()).await;
    let order_id = bought.body["ticket"]["gatewayOrderId"]
        .as_str()
        .unwrap()
        .to_string();

    wait_for_events(&fixture, "ticket_finalized", 1).await;

    let response = fixture
        .get(&format!("/api/v1/admin/audit?order_id={order_id}"))
        .await;
    assert_status!(response, StatusCode::OK);

    let types: Vec<&str> = response.body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["event_type"].as_str().unwrap())
        .collect();
    assert!(types.contains(&"order_created"));
    assert!(types.contains(&"ticket_finalized"));

    let claims = fixture
        .get("/api/v1/admin/audit?event_type=claim_created&scheme_id=1")
        .await;
    assert_eq!(claims.body["total"], 1);
}

#[tokio::test]
async fn test_audit_log_records_signature_rejection() {
    let fixture = TestFixture::new().await;

    let order = fixture.create_order(1, 10_050, fixtures::buyer()).await;
    let order_id = order.body["order"]["gatewayOrderId"].as_str().unwrap();
    let (payment_id, _) = fixture.pay(order_id);
    fixture
        .verify(order_id, &payment_id, "deadbeef", 1, 10_050, fixtures::buyer())
        .await;

    wait_for_events(&fixture, "signature_rejected", 1).await;

    let response = fixture
        .get("/api/v1/admin/audit?event_type=signature_rejected")
        .await;
    assert_eq!(response.body["total"], 1);
    assert_eq!(response.body["events"][0]["order_id"], order_id);
}

#[tokio::test]
async fn test_audit_limit_is_capped() {
    let fixture = TestFixture::new().await;

    let response = fixture.get("/api/v1/admin/audit?limit=5000").await;
    assert_status!(response, StatusCode::OK);
    assert_eq!(response.body["limit"], 1000);
}
