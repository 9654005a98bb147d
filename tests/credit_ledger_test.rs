mod common;

use common::{Cluster, amount, customer_with_limit, fast_config};
use lending_core::application::retry::{Backoff, RetryPolicy};
use lending_core::domain::customer::CreditLimit;
use lending_core::domain::money::Money;
use lending_core::domain::ports::RecordStore;
use lending_core::error::LendingError;
use rust_decimal_macros::dec;

fn patient_policy() -> RetryPolicy {
    RetryPolicy::new(
        64,
        Backoff::Exponential {
            base_ms: 1,
            max_ms: 4,
            jitter: true,
        },
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_reservations_within_limit_all_succeed() {
    let cluster = Cluster::new(4, &fast_config());
    let (customer, limit) =
        customer_with_limit(&cluster.node(0), "1", 12, dec!(1000000)).await;

    let customer_id = customer.id;
    let mut handles = Vec::new();
    for i in 0..10 {
        let node = cluster.node(i);
        handles.push(tokio::spawn(async move {
            node.ledger
                .reserve_with_retry(customer_id, 12, amount(dec!(100000)), &patient_policy())
                .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let stored = RecordStore::<CreditLimit>::get(&cluster.store, limit.id)
        .await
        .unwrap();
    assert_eq!(stored.used_amount, Money::new(dec!(1000000)));
    assert_eq!(stored.available(), Money::ZERO);
    // One committed write per reservation.
    assert_eq!(stored.version, 11);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_oversubscribed_limit_never_overdraws() {
    let cluster = Cluster::new(3, &fast_config());
    let (customer, limit) =
        customer_with_limit(&cluster.node(0), "1", 6, dec!(1000000)).await;

    let customer_id = customer.id;
    let mut handles = Vec::new();
    for i in 0..15 {
        let node = cluster.node(i);
        handles.push(tokio::spawn(async move {
            node.ledger
                .reserve_with_retry(customer_id, 6, amount(dec!(100000)), &patient_policy())
                .await
        }));
    }

    let mut succeeded = 0;
    let mut insufficient = 0;
    for handle in handles {
        match handle.await.unwrap() {
            Ok(_) => succeeded += 1,
            Err(LendingError::InsufficientLimit { .. }) => insufficient += 1,
            Err(other) => panic!("unexpected error: {other}"),
        }
    }
    assert_eq!(succeeded, 10);
    assert_eq!(insufficient, 5);

    let stored = RecordStore::<CreditLimit>::get(&cluster.store, limit.id)
        .await
        .unwrap();
    assert_eq!(stored.used_amount, stored.amount);
}

#[tokio::test]
async fn test_check_is_advisory_and_reserve_is_authoritative() {
    let cluster = Cluster::new(2, &fast_config());
    let (customer, _) = customer_with_limit(&cluster.node(0), "1", 12, dec!(2000000)).await;
    let a = cluster.node(0);
    let b = cluster.node(1);
    let request = amount(dec!(1500000));

    // Both nodes see enough headroom before either reserves.
    assert!(a.ledger.check_available(customer.id, 12, request).await.unwrap());
    assert!(b.ledger.check_available(customer.id, 12, request).await.unwrap());

    a.ledger.reserve(customer.id, 12, request).await.unwrap();
    let err = b.ledger.reserve(customer.id, 12, request).await.unwrap_err();
    assert!(matches!(err, LendingError::InsufficientLimit { .. }));
}

#[tokio::test]
async fn test_limits_are_independent_per_tenor() {
    let cluster = Cluster::new(1, &fast_config());
    let node = cluster.node(0);
    let (customer, _) = customer_with_limit(&node, "1", 3, dec!(500000)).await;
    node.customers
        .grant_limit(customer.id, 6, amount(dec!(700000)))
        .await
        .unwrap();

    node.ledger
        .reserve(customer.id, 3, amount(dec!(500000)))
        .await
        .unwrap();
    assert!(
        node.ledger
            .check_available(customer.id, 6, amount(dec!(700000)))
            .await
            .unwrap()
    );
    assert!(matches!(
        node.ledger.limit_for(customer.id, 9).await,
        Err(LendingError::NoLimitForTenor { tenor: 9, .. })
    ));
}
