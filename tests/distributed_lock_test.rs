use lending_core::application::lock::DistributedLock;
use lending_core::domain::ports::CoordinationStore;
use lending_core::error::LendingError;
use lending_core::infrastructure::coordination::InMemoryCoordinationStore;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

fn lock_over(store: &InMemoryCoordinationStore) -> DistributedLock {
    DistributedLock::new(Arc::new(store.clone()), Duration::from_millis(5))
}

#[tokio::test]
async fn test_lock_lifecycle() {
    let store = InMemoryCoordinationStore::new();
    let node_a = lock_over(&store);
    let node_b = lock_over(&store);
    let key = DistributedLock::key_for("installment:1");
    assert_eq!(key, "lock:installment:1");

    let guard = node_a.acquire(&key, Duration::from_secs(30)).await.unwrap();
    let token = guard.token().cloned().unwrap();
    assert_eq!(
        store.get(&key).await.unwrap().as_deref(),
        Some(token.as_str())
    );

    assert!(matches!(
        node_b.acquire(&key, Duration::from_secs(30)).await,
        Err(LendingError::LockHeld { .. })
    ));

    guard.release().await.unwrap();
    assert!(store.get(&key).await.unwrap().is_none());
    assert!(node_b.acquire(&key, Duration::from_secs(30)).await.is_ok());
}

#[tokio::test]
async fn test_release_requires_matching_token() {
    let store = InMemoryCoordinationStore::new();
    let lock = lock_over(&store);
    let key = DistributedLock::key_for("contract:7");

    let guard = lock.acquire(&key, Duration::from_secs(30)).await.unwrap();
    let other = lock
        .acquire(&DistributedLock::key_for("contract:8"), Duration::from_secs(30))
        .await
        .unwrap();

    let wrong = other.token().cloned().unwrap();
    assert!(matches!(
        lock.release(&key, &wrong).await,
        Err(LendingError::LockNotHeld { .. })
    ));
    // The rightful holder is unaffected.
    assert!(store.get(&key).await.unwrap().is_some());
    guard.release().await.unwrap();
}

#[tokio::test(start_paused = true)]
async fn test_expired_lease_is_taken_over() {
    let store = InMemoryCoordinationStore::new();
    let stale_node = lock_over(&store);
    let fresh_node = lock_over(&store);
    let key = DistributedLock::key_for("installment:9");

    let stale = stale_node
        .acquire(&key, Duration::from_millis(100))
        .await
        .unwrap();
    let stale_token = stale.token().cloned().unwrap();
    std::mem::forget(stale);

    let fresh = fresh_node
        .acquire_with_retry(&key, Duration::from_secs(30), Duration::from_secs(1))
        .await
        .unwrap();

    // The stale holder can no longer release what it lost.
    assert!(matches!(
        stale_node.release(&key, &stale_token).await,
        Err(LendingError::LockNotHeld { .. })
    ));
    assert_eq!(
        store.get(&key).await.unwrap().as_deref(),
        fresh.token().map(|t| t.as_str())
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_with_lock_excludes_across_nodes() {
    let store = InMemoryCoordinationStore::new();
    let inside = Arc::new(AtomicU32::new(0));
    let overlaps = Arc::new(AtomicU32::new(0));

    let mut handles = Vec::new();
    for _ in 0..8 {
        let lock = lock_over(&store);
        let inside = inside.clone();
        let overlaps = overlaps.clone();
        handles.push(tokio::spawn(async move {
            lock.with_lock(
                "lock:shared",
                Duration::from_secs(30),
                Duration::from_secs(5),
                || async {
                    if inside.fetch_add(1, Ordering::SeqCst) > 0 {
                        overlaps.fetch_add(1, Ordering::SeqCst);
                    }
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    inside.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                },
            )
            .await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    assert_eq!(overlaps.load(Ordering::SeqCst), 0);
    assert!(store.get("lock:shared").await.unwrap().is_none());
}
