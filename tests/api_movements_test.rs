mod common;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;
use uuid::Uuid;

use common::{actor, TestApp};

async fn body_json(response: axum::response::Response) -> Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("read body");
    serde_json::from_slice(&bytes).expect("parse body as JSON")
}

fn post_json(uri: &str, actor: Uuid, payload: &Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-user-id", actor.to_string())
        .body(Body::from(payload.to_string()))
        .unwrap()
}

#[tokio::test]
async fn movement_round_trip_over_http() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 3).await;
    let router = app.router();
    let creator = actor();

    // Create a DRAFT receipt
    let payload = json!({
        "movement_type": "IN",
        "reference": "GRN-1001",
        "items": [
            {"product_id": widget.id, "quantity": 20, "unit_of_measure": "pcs"}
        ]
    });
    let response = router
        .clone()
        .oneshot(post_json("/api/v1/movements", creator, &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert_eq!(created["status"], "DRAFT");
    assert_eq!(created["created_by"], creator.to_string());
    assert!(created["posted_at"].is_null());
    let movement_id = created["id"].as_str().unwrap().to_string();

    // Post it
    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/movements/{}/post", movement_id),
            creator,
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let posted = body_json(response).await;
    assert_eq!(posted["status"], "POSTED");
    assert!(!posted["posted_at"].is_null());
    assert_eq!(app.reload_product(widget.id).await.stock, 23);

    // Cancelling a POSTED movement is rejected with a stable error code
    let response = router
        .clone()
        .oneshot(post_json(
            &format!("/api/v1/movements/{}/cancel", movement_id),
            creator,
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error = body_json(response).await;
    assert_eq!(error["code"], "INVALID_STATE_TRANSITION");
}

#[tokio::test]
async fn create_requires_the_actor_header() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 0).await;
    let router = app.router();

    let payload = json!({
        "movement_type": "IN",
        "items": [
            {"product_id": widget.id, "quantity": 1, "unit_of_measure": "pcs"}
        ]
    });
    let request = Request::builder()
        .method("POST")
        .uri("/api/v1/movements")
        .header("content-type", "application/json")
        .body(Body::from(payload.to_string()))
        .unwrap();

    let response = router.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = body_json(response).await;
    assert_eq!(error["code"], "VALIDATION_ERROR");
}

#[tokio::test]
async fn unit_mismatch_surfaces_code_and_details() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 0).await;
    let router = app.router();

    let payload = json!({
        "movement_type": "IN",
        "items": [
            {"product_id": widget.id, "quantity": 5, "unit_of_measure": "kg"}
        ]
    });
    let response = router
        .oneshot(post_json("/api/v1/movements", actor(), &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error = body_json(response).await;
    assert_eq!(error["code"], "UNIT_MISMATCH");
    assert_eq!(error["details"]["sku"], "WIDGET-01");
    assert_eq!(error["details"]["expected"], "pcs");
    assert_eq!(error["details"]["got"], "kg");
}

#[tokio::test]
async fn underflow_surfaces_diagnostic_details() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 10).await;
    let router = app.router();
    let creator = actor();

    let payload = json!({
        "movement_type": "OUT",
        "items": [
            {"product_id": widget.id, "quantity": 15, "unit_of_measure": "pcs"}
        ]
    });
    let response = router
        .clone()
        .oneshot(post_json("/api/v1/movements", creator, &payload))
        .await
        .unwrap();
    let movement_id = body_json(response).await["id"].as_str().unwrap().to_string();

    let response = router
        .oneshot(post_json(
            &format!("/api/v1/movements/{}/post", movement_id),
            creator,
            &json!({}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    let error = body_json(response).await;
    assert_eq!(error["code"], "STOCK_UNDERFLOW");
    assert_eq!(error["details"]["sku"], "WIDGET-01");
    assert_eq!(error["details"]["current_stock"], 10);
    assert_eq!(error["details"]["requested_change"], -15);
    assert_eq!(error["details"]["resulting_stock"], -5);

    assert_eq!(app.reload_product(widget.id).await.stock, 10);
}

#[tokio::test]
async fn dashboard_reflects_catalog_and_ledger() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 25).await;
    let _gadget = app.seed_product("GADGET-01", "kg", 4).await;
    let router = app.router();
    let creator = actor();

    let payload = json!({
        "movement_type": "OUT",
        "items": [
            {"product_id": widget.id, "quantity": 5, "unit_of_measure": "pcs"}
        ]
    });
    let response = router
        .clone()
        .oneshot(post_json("/api/v1/movements", creator, &payload))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let response = router
        .oneshot(
            Request::builder()
                .uri("/api/v1/dashboard/summary")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let summary = body_json(response).await;
    assert_eq!(summary["total_products"], 2);
    assert_eq!(summary["active_products"], 2);
    assert_eq!(summary["total_stock"], 29);
    assert_eq!(summary["low_stock_count"], 1);
    assert_eq!(summary["recent_movements"].as_array().unwrap().len(), 1);
    assert_eq!(summary["recent_movements"][0]["item_count"], 1);
}
