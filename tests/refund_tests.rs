mod common;

use common::*;
use paygate::application::INTERNAL_ERROR_REASON;
use paygate::application::refund::REFUND_DECLINED_REASON;
use paygate::domain::ledger::EntryType;
use paygate::domain::policy::{FixedGate, Policies};
use paygate::domain::refund::RefundStatus;
use paygate::domain::transaction::PaymentStatus;
use paygate::error::PaymentError;
use rust_decimal_macros::dec;
use std::sync::Arc;

#[tokio::test]
async fn test_partial_then_full_refund() {
    let (gateway, _store, transport) = gateway().await;
    let initiated = gateway.create_payment(payment("ORD_1", dec!(1000))).await.unwrap();
    gateway.wait_idle().await;
    let txn = initiated.transaction_id;

    let first = gateway
        .initiate_refund(&txn, dec!(400), Some("damaged".to_string()))
        .await
        .unwrap();
    assert_eq!(first.status, RefundStatus::Processing);
    assert!(first.refund_id.starts_with("RFD_"));
    assert_eq!(first.message, "Refund initiated successfully");
    gateway.wait_idle().await;

    let tx = gateway.get_transaction(&txn).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::PartialRefunded);
    assert_eq!(tx.refunded_amount, dec!(400));
    assert_eq!(gateway.get_refund(&first.refund_id).await.unwrap().status, RefundStatus::Success);

    let second = gateway.initiate_refund(&txn, dec!(600), None).await.unwrap();
    gateway.wait_idle().await;

    let tx = gateway.get_transaction(&txn).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Refunded);
    assert_eq!(tx.refunded_amount, dec!(1000));

    let entries = gateway.ledger().entries_for_merchant(MERCHANT).await.unwrap();
    let debits: Vec<_> = entries
        .iter()
        .filter(|e| e.entry_type == EntryType::Debit)
        .collect();
    assert_eq!(debits.len(), 2);
    assert_eq!(debits[0].reference_id, first.refund_id);
    assert_eq!(debits[1].reference_id, second.refund_id);
    assert_eq!(debits[1].balance_after.value(), dec!(0));
    assert!(debits[0].description.contains(&txn));

    let for_payment = gateway.ledger().entries_for_transaction(&txn).await.unwrap();
    assert_eq!(for_payment.len(), 3);
    assert_eq!(for_payment[0].entry_type, EntryType::Credit);
    assert!(for_payment.iter().all(|e| e.transaction_id == txn));

    let statement = gateway.ledger().statement(MERCHANT).await.unwrap();
    assert_eq!(statement.balance.value(), dec!(0));
    assert_eq!(statement.credits, dec!(1000));
    assert_eq!(statement.debits, dec!(1000));
    assert_eq!(statement.entries, 3);
    assert!(gateway.ledger().verify_merchant(MERCHANT).await.unwrap().is_empty());

    let refunds = gateway.list_refunds(&txn).await.unwrap();
    assert_eq!(refunds.len(), 2);
    assert_eq!(refunds[0].refund_id, first.refund_id);

    // Settlement plus one per completed refund.
    let statuses: Vec<_> = transport.bodies().iter().map(|b| b["status"].clone()).collect();
    assert_eq!(statuses, vec!["SUCCESS", "PARTIAL_REFUNDED", "REFUNDED"]);

    let err = gateway.initiate_refund(&txn, dec!(1), None).await.unwrap_err();
    assert!(matches!(err, PaymentError::InvalidState(_)));
}

#[tokio::test]
async fn test_refund_over_available_rejected() {
    let (gateway, _store, _transport) = gateway().await;
    let initiated = gateway.create_payment(payment("ORD_1", dec!(1000))).await.unwrap();
    gateway.wait_idle().await;

    let err = gateway
        .initiate_refund(&initiated.transaction_id, dec!(1200), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidArgument(_)));
    assert!(err.to_string().contains("Available: 1000"));

    let err = gateway
        .initiate_refund(&initiated.transaction_id, dec!(0), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidArgument(_)));

    gateway.wait_idle().await;
    assert!(gateway.list_refunds(&initiated.transaction_id).await.unwrap().is_empty());
    assert_eq!(gateway.ledger().entries_for_merchant(MERCHANT).await.unwrap().len(), 1);
    let tx = gateway.get_transaction(&initiated.transaction_id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Success);
}

#[tokio::test]
async fn test_refund_requires_settled_payment() {
    let store = store_with_merchant(CALLBACK).await;
    let mut policies = Policies::deterministic();
    policies.settlement = Arc::new(FixedGate(false));
    let gateway = builder(&store, RecordingTransport::ok()).policies(policies).start().unwrap();

    let initiated = gateway.create_payment(payment("ORD_1", dec!(500))).await.unwrap();
    gateway.wait_idle().await;

    let err = gateway
        .initiate_refund(&initiated.transaction_id, dec!(100), None)
        .await
        .unwrap_err();
    assert!(matches!(err, PaymentError::InvalidState(_)));
    assert_eq!(err.status_code(), 409);

    let err = gateway.initiate_refund("TXN_missing", dec!(100), None).await.unwrap_err();
    assert!(matches!(err, PaymentError::NotFound(_)));
}

#[tokio::test]
async fn test_declined_refund_leaves_payment_untouched() {
    let store = store_with_merchant(CALLBACK).await;
    let transport = RecordingTransport::ok();
    let mut policies = Policies::deterministic();
    policies.refund = Arc::new(FixedGate(false));
    let gateway = builder(&store, transport.clone()).policies(policies).start().unwrap();

    let initiated = gateway.create_payment(payment("ORD_1", dec!(1000))).await.unwrap();
    gateway.wait_idle().await;
    let refund = gateway
        .initiate_refund(&initiated.transaction_id, dec!(400), None)
        .await
        .unwrap();
    gateway.wait_idle().await;

    let refund = gateway.get_refund(&refund.refund_id).await.unwrap();
    assert_eq!(refund.status, RefundStatus::Failed);
    assert_eq!(refund.message, REFUND_DECLINED_REASON);

    let tx = gateway.get_transaction(&initiated.transaction_id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Success);
    assert_eq!(tx.refunded_amount, dec!(0));
    assert_eq!(gateway.ledger().statement(MERCHANT).await.unwrap().balance.value(), dec!(1000));
    // Only the settlement webhook.
    assert_eq!(transport.count(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_refunds_never_exceed_amount() {
    let (gateway, _store, _transport) = gateway().await;
    let gateway = Arc::new(gateway);
    let initiated = gateway.create_payment(payment("ORD_1", dec!(1000))).await.unwrap();
    gateway.wait_idle().await;

    let mut handles = Vec::new();
    for _ in 0..6 {
        let gateway = gateway.clone();
        let txn = initiated.transaction_id.clone();
        handles.push(tokio::spawn(async move {
            gateway.initiate_refund(&txn, dec!(300), None).await
        }));
    }
    let mut accepted = Vec::new();
    for handle in handles {
        if let Ok(view) = handle.await.unwrap() {
            accepted.push(view.refund_id);
        }
    }
    gateway.wait_idle().await;

    let mut succeeded = 0;
    for refund_id in &accepted {
        if gateway.get_refund(refund_id).await.unwrap().status == RefundStatus::Success {
            succeeded += 1;
        }
    }
    // Three fit; the rest are declined at initiation or at completion.
    assert_eq!(succeeded, 3);

    let tx = gateway.get_transaction(&initiated.transaction_id).await.unwrap();
    assert_eq!(tx.refunded_amount, dec!(900));
    assert_eq!(tx.status, PaymentStatus::PartialRefunded);
    assert_eq!(
        gateway.ledger().statement(MERCHANT).await.unwrap().balance.value(),
        dec!(100)
    );
    assert!(gateway.ledger().verify_merchant(MERCHANT).await.unwrap().is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 8)]
async fn test_contended_refunds_within_amount_all_succeed() {
    let (gateway, _store, transport) = gateway().await;
    let gateway = Arc::new(gateway);
    let initiated = gateway.create_payment(payment("ORD_1", dec!(10000))).await.unwrap();
    gateway.wait_idle().await;

    for round in 0..5 {
        let mut handles = Vec::new();
        for _ in 0..32 {
            let gateway = gateway.clone();
            let txn = initiated.transaction_id.clone();
            handles.push(tokio::spawn(async move {
                gateway.initiate_refund(&txn, dec!(10), None).await
            }));
        }
        let mut refund_ids = Vec::new();
        for handle in handles {
            refund_ids.push(handle.await.unwrap().unwrap().refund_id);
        }
        gateway.wait_idle().await;

        for refund_id in &refund_ids {
            let refund = gateway.get_refund(refund_id).await.unwrap();
            assert_eq!(
                refund.status,
                RefundStatus::Success,
                "round {round}: {refund_id} {}",
                refund.message
            );
        }
    }

    let tx = gateway.get_transaction(&initiated.transaction_id).await.unwrap();
    assert_eq!(tx.refunded_amount, dec!(1600));
    assert_eq!(tx.status, PaymentStatus::PartialRefunded);
    let statement = gateway.ledger().statement(MERCHANT).await.unwrap();
    assert_eq!(statement.balance.value(), dec!(8400));
    assert_eq!(statement.entries, 161);
    assert!(gateway.ledger().verify_merchant(MERCHANT).await.unwrap().is_empty());
    assert_eq!(transport.count(), 161);
}

#[tokio::test]
async fn test_ledger_fault_fails_refund() {
    let store = store_with_merchant(CALLBACK).await;
    let transport = RecordingTransport::ok();
    let gateway = builder(&store, transport.clone())
        .ledger_store(BrokenLedger::only(&store, EntryType::Debit))
        .start()
        .unwrap();

    let initiated = gateway.create_payment(payment("ORD_1", dec!(1000))).await.unwrap();
    gateway.wait_idle().await;
    let tx = gateway.get_transaction(&initiated.transaction_id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Success);

    let refund = gateway
        .initiate_refund(&initiated.transaction_id, dec!(400), None)
        .await
        .unwrap();
    gateway.wait_idle().await;

    let refund = gateway.get_refund(&refund.refund_id).await.unwrap();
    assert_eq!(refund.status, RefundStatus::Failed);
    assert_eq!(refund.message, INTERNAL_ERROR_REASON);

    let tx = gateway.get_transaction(&initiated.transaction_id).await.unwrap();
    assert_eq!(tx.status, PaymentStatus::Success);
    assert_eq!(tx.refunded_amount, dec!(0));
    let entries = gateway.ledger().entries_for_merchant(MERCHANT).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert!(entries.iter().all(|e| e.entry_type == EntryType::Credit));
    assert_eq!(gateway.ledger().statement(MERCHANT).await.unwrap().balance.value(), dec!(1000));
    // Only the settlement webhook.
    assert_eq!(transport.count(), 1);
}
