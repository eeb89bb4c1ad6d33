mod common;

use common::{actor, item_for, TestApp};
use stockledger_api::entities::inventory_movement::MovementType;
use stockledger_api::errors::ServiceError;
use stockledger_api::services::movements::CreateMovementInput;

// Two postings sharing one product serialize on that product's row; the
// loser of the race re-evaluates its underflow check against post-commit
// stock. With 10 in stock, OUT 10 and OUT 5 can never both commit.
#[tokio::test]
async fn contending_posts_serialize_and_one_underflows() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 10).await;

    let big = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Out,
                reference: None,
                notes: None,
                items: vec![item_for(&widget, 10)],
            },
            actor(),
        )
        .await
        .unwrap();
    let small = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Out,
                reference: None,
                notes: None,
                items: vec![item_for(&widget, 5)],
            },
            actor(),
        )
        .await
        .unwrap();

    let svc_a = app.movements();
    let svc_b = app.movements();
    let (big_id, small_id) = (big.movement.id, small.movement.id);

    let task_a = tokio::spawn(async move { svc_a.post(big_id).await });
    let task_b = tokio::spawn(async move { svc_b.post(small_id).await });

    let result_a = task_a.await.expect("task a join");
    let result_b = task_b.await.expect("task b join");

    let successes = [result_a.is_ok(), result_b.is_ok()]
        .iter()
        .filter(|ok| **ok)
        .count();
    assert_eq!(successes, 1, "exactly one contending post must commit");

    let remaining = app.reload_product(widget.id).await.stock;
    match (&result_a, &result_b) {
        (Ok(_), Err(err)) => {
            assert!(matches!(err, ServiceError::StockUnderflow { .. }));
            assert_eq!(remaining, 0);
        }
        (Err(err), Ok(_)) => {
            assert!(matches!(err, ServiceError::StockUnderflow { .. }));
            assert_eq!(remaining, 5);
        }
        other => panic!("unexpected outcome: {:?}", other),
    }
}

// The net effect of N concurrent postings over one product is equivalent to
// some serial order of them: with 10 in stock, exactly 10 single-unit
// issues commit and stock lands on zero, never below.
#[tokio::test]
async fn twenty_unit_issues_against_ten_in_stock() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 10).await;

    let mut movement_ids = Vec::new();
    for _ in 0..20 {
        let detail = app
            .movements()
            .create(
                CreateMovementInput {
                    movement_type: MovementType::Out,
                    reference: None,
                    notes: None,
                    items: vec![item_for(&widget, 1)],
                },
                actor(),
            )
            .await
            .unwrap();
        movement_ids.push(detail.movement.id);
    }

    let mut tasks = Vec::new();
    for movement_id in movement_ids {
        let svc = app.movements();
        tasks.push(tokio::spawn(async move {
            svc.post(movement_id).await.is_ok()
        }));
    }

    let mut successes = 0;
    for task in tasks {
        if task.await.unwrap_or(false) {
            successes += 1;
        }
    }

    assert_eq!(
        successes, 10,
        "exactly 10 issues should succeed; got {}",
        successes
    );
    assert_eq!(app.reload_product(widget.id).await.stock, 0);
}

// Postings over disjoint product sets do not interfere with each other.
#[tokio::test]
async fn disjoint_product_sets_post_independently() {
    let app = TestApp::new().await;
    let widget = app.seed_product("WIDGET-01", "pcs", 4).await;
    let gadget = app.seed_product("GADGET-01", "kg", 9).await;

    let out_widget = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Out,
                reference: None,
                notes: None,
                items: vec![item_for(&widget, 4)],
            },
            actor(),
        )
        .await
        .unwrap();
    let out_gadget = app
        .movements()
        .create(
            CreateMovementInput {
                movement_type: MovementType::Out,
                reference: None,
                notes: None,
                items: vec![item_for(&gadget, 3)],
            },
            actor(),
        )
        .await
        .unwrap();

    let svc_a = app.movements();
    let svc_b = app.movements();
    let (widget_move, gadget_move) = (out_widget.movement.id, out_gadget.movement.id);

    let task_a = tokio::spawn(async move { svc_a.post(widget_move).await });
    let task_b = tokio::spawn(async move { svc_b.post(gadget_move).await });

    assert!(task_a.await.expect("join").is_ok());
    assert!(task_b.await.expect("join").is_ok());

    assert_eq!(app.reload_product(widget.id).await.stock, 0);
    assert_eq!(app.reload_product(gadget.id).await.stock, 6);
}
