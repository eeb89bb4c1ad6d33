mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use tokio::sync::mpsc;

use common::{actor, item_for, TestApp};
use stockledger_api::entities::inventory_movement::{MovementStatus, MovementType};
use stockledger_api::errors::ServiceError;
use stockledger_api::events::{Event, EventSender};
use stockledger_api::services::movements::{CreateMovementInput, MovementService};

#[tokio::test]
async fn underflow_rolls_back_the_whole_batch() {
    let app = TestApp::new().await;
    let product_a = app.seed_product("PROD-A", "pcs", 50).await;
    let product_b = app.seed_product("PROD-B", "pcs", 10).await;

    let detail = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Out,
                reference: None,
                notes: None,
                items: vec![item_for(&product_a, 5), item_for(&product_b, 9999)],
            },
            actor(),
        )
        .await
        .unwrap();

    let err = app.movements().post(detail.movement.id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::StockUnderflow {
            ref sku,
            current_stock: 10,
            requested_change: -9999,
            resulting_stock: -9989,
            ..
        } if sku == "PROD-B"
    );

    // Rollback covers the whole batch, not just the offending item
    assert_eq!(app.reload_product(product_a.id).await.stock, 50);
    assert_eq!(app.reload_product(product_b.id).await.stock, 10);

    // The movement is untouched and can be corrected and posted again
    let reloaded = app.movements().find_by_id(detail.movement.id).await.unwrap();
    assert_eq!(reloaded.movement.status, MovementStatus::Draft.as_str());
    assert!(reloaded.movement.posted_at.is_none());
}

#[tokio::test]
async fn repeated_product_references_accumulate_before_the_bound_check() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 10).await;

    // 6 + 5 = 11 > 10: each item alone fits, together they underflow
    let over = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Out,
                reference: None,
                notes: None,
                items: vec![item_for(&widget, 6), item_for(&widget, 5)],
            },
            actor(),
        )
        .await
        .unwrap();
    let err = app.movements().post(over.movement.id).await.unwrap_err();
    assert_matches!(
        err,
        ServiceError::StockUnderflow {
            current_stock: 10,
            requested_change: -11,
            resulting_stock: -1,
            ..
        }
    );
    assert_eq!(app.reload_product(widget.id).await.stock, 10);

    // 6 + 4 = 10 drains the stock exactly
    let exact = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Out,
                reference: None,
                notes: None,
                items: vec![item_for(&widget, 6), item_for(&widget, 4)],
            },
            actor(),
        )
        .await
        .unwrap();
    app.movements().post(exact.movement.id).await.unwrap();
    assert_eq!(app.reload_product(widget.id).await.stock, 0);
}

#[tokio::test]
async fn adjust_applies_signed_deltas() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 10).await;

    let shrink = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Adjust,
                reference: Some("CYCLE-COUNT".to_string()),
                notes: None,
                items: vec![item_for(&widget, -4)],
            },
            actor(),
        )
        .await
        .unwrap();
    app.movements().post(shrink.movement.id).await.unwrap();
    assert_eq!(app.reload_product(widget.id).await.stock, 6);

    let too_far = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Adjust,
                reference: None,
                notes: None,
                items: vec![item_for(&widget, -7)],
            },
            actor(),
        )
        .await
        .unwrap();
    let err = app.movements().post(too_far.movement.id).await.unwrap_err();
    assert_matches!(err, ServiceError::StockUnderflow { .. });
    assert_eq!(app.reload_product(widget.id).await.stock, 6);
}

#[tokio::test]
async fn transfer_posts_without_stock_effect() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 8).await;

    let transfer = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Transfer,
                reference: None,
                notes: None,
                items: vec![item_for(&widget, 8)],
            },
            actor(),
        )
        .await
        .unwrap();

    let posted = app.movements().post(transfer.movement.id).await.unwrap();
    assert_eq!(posted.movement.status, MovementStatus::Posted.as_str());
    assert_eq!(app.reload_product(widget.id).await.stock, 8);
}

#[tokio::test]
async fn posting_bumps_the_version_of_touched_products() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 0).await;
    let before = app.reload_product(widget.id).await.version;

    let receipt = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::In,
                reference: None,
                notes: None,
                items: vec![item_for(&widget, 12)],
            },
            actor(),
        )
        .await
        .unwrap();
    app.movements().post(receipt.movement.id).await.unwrap();

    let after = app.reload_product(widget.id).await;
    assert_eq!(after.stock, 12);
    assert_eq!(after.version, before + 1);
}

#[tokio::test]
async fn posting_emits_movement_and_stock_events() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 0).await;

    let (tx, mut rx) = mpsc::channel(16);
    let svc = MovementService::new(app.state.db.clone(), Arc::new(EventSender::new(tx)));

    let receipt = svc
        .create(
            CreateMovementInput {
                movement_type: MovementType::In,
                reference: None,
                notes: None,
                items: vec![item_for(&widget, 12)],
            },
            actor(),
        )
        .await
        .unwrap();
    svc.post(receipt.movement.id).await.unwrap();

    let mut saw_posted = false;
    let mut saw_stock_change = false;
    while let Ok(event) = rx.try_recv() {
        match event {
            Event::MovementPosted { movement_id, .. } => {
                assert_eq!(movement_id, receipt.movement.id);
                saw_posted = true;
            }
            Event::StockLevelChanged {
                product_id,
                previous_stock,
                new_stock,
                ..
            } => {
                assert_eq!(product_id, widget.id);
                assert_eq!(previous_stock, 0);
                assert_eq!(new_stock, 12);
                saw_stock_change = true;
            }
            _ => {}
        }
    }
    assert!(saw_posted, "MovementPosted event not emitted");
    assert!(saw_stock_change, "StockLevelChanged event not emitted");
}
