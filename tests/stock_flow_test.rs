//! Ledger, reservation, allocation and reversal flows end-to-end.

mod common;

use assert_matches::assert_matches;
use rust_decimal_macros::dec;
use uuid::Uuid;

use bookflow_api::{
    errors::ServiceError,
    services::{allocation::AllocateStock, receiving::ReceiveStock, SourceRef},
};
use common::TestApp;

fn sale_ref() -> (String, Uuid) {
    ("sale".to_string(), Uuid::new_v4())
}

#[tokio::test]
async fn fifo_consumes_oldest_batch_first() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();

    let (b1, _) = app.receive_batch(item, 5, dec!(10)).await;
    let (b2, _) = app.receive_batch(item, 10, dec!(12)).await;

    let (ref_type, ref_id) = sale_ref();
    let outcome = app
        .services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 8,
            reference_type: ref_type,
            reference_id: ref_id,
            scope: None,
        })
        .await
        .unwrap();

    assert!(outcome.fully_allocated());
    assert_eq!(outcome.issued_qty, 8);
    assert_eq!(outcome.draws.len(), 2);
    assert_eq!(outcome.draws[0].batch_id, b1);
    assert_eq!(outcome.draws[0].quantity, 5);
    assert_eq!(outcome.draws[1].batch_id, b2);
    assert_eq!(outcome.draws[1].quantity, 3);

    assert_eq!(app.batch_available(b1).await, 0);
    assert_eq!(app.batch_available(b2).await, 7);
}

#[tokio::test]
async fn newer_batch_is_untouched_while_older_has_stock() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();

    let (b1, _) = app.receive_batch(item, 5, dec!(10)).await;
    let (b2, _) = app.receive_batch(item, 10, dec!(12)).await;

    let (ref_type, ref_id) = sale_ref();
    let outcome = app
        .services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 3,
            reference_type: ref_type,
            reference_id: ref_id,
            scope: None,
        })
        .await
        .unwrap();

    assert_eq!(outcome.draws.len(), 1);
    assert_eq!(outcome.draws[0].batch_id, b1);
    assert_eq!(app.batch_available(b1).await, 2);
    assert_eq!(app.batch_available(b2).await, 10);
}

#[tokio::test]
async fn unscoped_allocation_goes_short_instead_of_failing() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();

    let (b1, _) = app.receive_batch(item, 20, dec!(9)).await;

    let (ref_type, ref_id) = sale_ref();
    let outcome = app
        .services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 30,
            reference_type: ref_type,
            reference_id: ref_id,
            scope: None,
        })
        .await
        .unwrap();

    assert!(!outcome.fully_allocated());
    assert_eq!(outcome.issued_qty, 20);
    assert_eq!(outcome.short_qty, 10);
    assert_eq!(app.batch_available(b1).await, 0);
}

#[tokio::test]
async fn scoped_allocation_is_all_or_nothing() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();

    let (b1, receipt1) = app.receive_batch(item, 30, dec!(10)).await;
    let (b2, _) = app.receive_batch(item, 50, dec!(10)).await;

    let (ref_type, ref_id) = sale_ref();
    let err = app
        .services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 40,
            reference_type: ref_type.clone(),
            reference_id: ref_id,
            scope: Some(receipt1.clone()),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientStock(_));

    // The failed scoped call must leave every batch untouched, including
    // the ones inside the scope.
    assert_eq!(app.batch_available(b1).await, 30);
    assert_eq!(app.batch_available(b2).await, 50);

    // Within capacity it succeeds and draws only from the scoped receipt.
    let outcome = app
        .services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 25,
            reference_type: ref_type,
            reference_id: ref_id,
            scope: Some(receipt1),
        })
        .await
        .unwrap();
    assert!(outcome.fully_allocated());
    assert_eq!(outcome.draws.len(), 1);
    assert_eq!(outcome.draws[0].batch_id, b1);
    assert_eq!(app.batch_available(b1).await, 5);
    assert_eq!(app.batch_available(b2).await, 50);
}

#[tokio::test]
async fn duplicate_allocation_reference_is_a_conflict() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();
    app.receive_batch(item, 50, dec!(10)).await;

    let (ref_type, ref_id) = sale_ref();
    app.services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 10,
            reference_type: ref_type.clone(),
            reference_id: ref_id,
            scope: None,
        })
        .await
        .unwrap();

    let err = app
        .services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 5,
            reference_type: ref_type,
            reference_id: ref_id,
            scope: None,
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn reservation_rejects_overcommit_and_releases() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();
    app.receive_batch(item, 100, dec!(10)).await;

    let services = app.services();
    let bundle = Uuid::new_v4();

    services
        .reservations
        .reserve(item, 60, "bundle", bundle)
        .await
        .unwrap();
    assert_eq!(services.stock.free_stock(item).await.unwrap(), 40);

    // Second reservation would overcommit the pool.
    let err = services
        .reservations
        .reserve(item, 50, "bundle", Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::InsufficientFreeStock(_));

    services
        .reservations
        .unreserve(item, 60, "bundle", bundle)
        .await
        .unwrap();
    assert_eq!(services.stock.free_stock(item).await.unwrap(), 100);

    services
        .reservations
        .reserve(item, 50, "bundle", Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(services.reservations.reserved(item).await.unwrap(), 50);
}

#[tokio::test]
async fn releasing_more_than_reserved_is_rejected() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();
    app.receive_batch(item, 10, dec!(10)).await;

    let services = app.services();
    services
        .reservations
        .reserve(item, 4, "bundle", Uuid::new_v4())
        .await
        .unwrap();

    let err = services
        .reservations
        .unreserve(item, 5, "bundle", Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
    assert_eq!(services.reservations.reserved(item).await.unwrap(), 4);
}

#[tokio::test]
async fn reservation_never_touches_batch_rows() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();
    let (batch, _) = app.receive_batch(item, 100, dec!(10)).await;

    app.services()
        .reservations
        .reserve(item, 70, "bundle", Uuid::new_v4())
        .await
        .unwrap();

    assert_eq!(app.batch_available(batch).await, 100);
    let summary = app.services().stock.summary(item).await.unwrap();
    assert_eq!(summary.available, 100);
    assert_eq!(summary.reserved, 70);
    assert_eq!(summary.free, 30);
}

#[tokio::test]
async fn reverse_allocation_restores_batches_and_is_idempotent() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();
    let (b1, _) = app.receive_batch(item, 5, dec!(10)).await;
    let (b2, _) = app.receive_batch(item, 10, dec!(10)).await;

    let (ref_type, ref_id) = sale_ref();
    app.services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 8,
            reference_type: ref_type.clone(),
            reference_id: ref_id,
            scope: None,
        })
        .await
        .unwrap();

    let restored = app
        .services()
        .allocation
        .reverse_allocation(&ref_type, ref_id)
        .await
        .unwrap();
    assert_eq!(restored, 8);
    assert_eq!(app.batch_available(b1).await, 5);
    assert_eq!(app.batch_available(b2).await, 10);

    // Second reversal must not double-restore.
    let err = app
        .services()
        .allocation
        .reverse_allocation(&ref_type, ref_id)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
    assert_eq!(app.batch_available(b1).await, 5);
    assert_eq!(app.batch_available(b2).await, 10);
}

#[tokio::test]
async fn reverse_allocation_of_unknown_reference_is_not_found() {
    let app = TestApp::new().await;
    let err = app
        .services()
        .allocation
        .reverse_allocation("sale", Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::NotFound(_));
}

#[tokio::test]
async fn receipt_reversal_blocked_once_stock_is_consumed() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();
    let (batch, receipt) = app.receive_batch(item, 100, dec!(10)).await;

    let (ref_type, ref_id) = sale_ref();
    app.services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 10,
            reference_type: ref_type.clone(),
            reference_id: ref_id,
            scope: None,
        })
        .await
        .unwrap();

    let err = app
        .services()
        .receiving
        .reverse_receipt(&receipt)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::StockAlreadyConsumed(_));
    assert_eq!(app.batch_available(batch).await, 90);

    // Once the draw is undone the receipt is whole again and reversible.
    app.services()
        .allocation
        .reverse_allocation(&ref_type, ref_id)
        .await
        .unwrap();
    app.services()
        .receiving
        .reverse_receipt(&receipt)
        .await
        .unwrap();
    assert_eq!(app.batch_available(batch).await, 0);
    assert_eq!(app.services().stock.available_stock(item).await.unwrap(), 0);

    // Reversing the same receipt twice is a duplicate, not consumption.
    let err = app
        .services()
        .receiving
        .reverse_receipt(&receipt)
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));
}

#[tokio::test]
async fn duplicate_receipt_reference_is_a_conflict() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();
    let source = SourceRef::new("receipt", Uuid::new_v4());

    let input = ReceiveStock {
        item_id: item,
        quantity: 10,
        unit_cost: dec!(15),
        party_id: Uuid::new_v4(),
        source_type: source.source_type.clone(),
        source_id: source.source_id,
    };

    app.services().receiving.receive(input.clone()).await.unwrap();
    let err = app.services().receiving.receive(input).await.unwrap_err();
    assert_matches!(err, ServiceError::Conflict(_));

    // Only the first receipt landed.
    assert_eq!(app.services().stock.available_stock(item).await.unwrap(), 10);
}

#[tokio::test]
async fn rejects_nonpositive_quantities() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();

    let err = app
        .services()
        .receiving
        .receive(ReceiveStock {
            item_id: item,
            quantity: 0,
            unit_cost: dec!(10),
            party_id: Uuid::new_v4(),
            source_type: "receipt".into(),
            source_id: Uuid::new_v4(),
        })
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));

    let err = app
        .services()
        .reservations
        .reserve(item, -5, "bundle", Uuid::new_v4())
        .await
        .unwrap_err();
    assert_matches!(err, ServiceError::ValidationError(_));
}

#[tokio::test]
async fn end_to_end_receive_reserve_allocate() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();
    let services = app.services();

    // Receive 100 units.
    let (batch, _) = app.receive_batch(item, 100, dec!(25)).await;
    assert_eq!(app.batch_available(batch).await, 100);

    // Reserve 40 for a bundle: free shrinks, batches untouched.
    services
        .reservations
        .reserve(item, 40, "bundle", Uuid::new_v4())
        .await
        .unwrap();
    assert_eq!(services.stock.free_stock(item).await.unwrap(), 60);

    // Allocate 70 to a sale. Issuance checks physical availability, not
    // free stock, so it succeeds past the reservation.
    let (ref_type, ref_id) = sale_ref();
    let outcome = services
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 70,
            reference_type: ref_type,
            reference_id: ref_id,
            scope: None,
        })
        .await
        .unwrap();
    assert!(outcome.fully_allocated());
    assert_eq!(outcome.cost(), dec!(1750));

    let summary = services.stock.summary(item).await.unwrap();
    assert_eq!(summary.available, 30);
    assert_eq!(summary.reserved, 40);
    assert_eq!(summary.free, -10);
}

#[tokio::test]
async fn available_stock_never_exceeds_received_across_a_cycle() {
    let app = TestApp::new().await;
    let item = Uuid::new_v4();
    let (batch, _) = app.receive_batch(item, 50, dec!(10)).await;

    let (ref_type, ref_id) = sale_ref();
    app.services()
        .allocation
        .allocate(AllocateStock {
            item_id: item,
            quantity: 50,
            reference_type: ref_type.clone(),
            reference_id: ref_id,
            scope: None,
        })
        .await
        .unwrap();
    app.services()
        .allocation
        .reverse_allocation(&ref_type, ref_id)
        .await
        .unwrap();

    // A full issue/undo cycle lands exactly back on the received quantity.
    assert_eq!(app.batch_available(batch).await, 50);
    assert_eq!(app.services().stock.available_stock(item).await.unwrap(), 50);
}
