use crate::domain::ports::CoordinationStoreRef;
use crate::error::{LendingError, Result};
use std::fmt;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, warn};
use uuid::Uuid;

/// Ownership proof for one successful acquisition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LockToken(String);

impl LockToken {
    fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Cross-process mutual exclusion over named resources, arbitrated by a
/// shared coordination store.
///
/// Possession is leased, not permanent: a holder that dies without releasing
/// loses the lock once the lease elapses, so the lease must outlast the
/// longest critical section it protects.
#[derive(Clone)]
pub struct DistributedLock {
    store: CoordinationStoreRef,
    poll_interval: Duration,
}

impl DistributedLock {
    pub fn new(store: CoordinationStoreRef, poll_interval: Duration) -> Self {
        Self {
            store,
            poll_interval,
        }
    }

    /// Namespaced store key for a resource, e.g. `lock:installment:42`.
    pub fn key_for(resource: &str) -> String {
        format!("lock:{resource}")
    }

    /// Single set-if-absent attempt. Fails with `LockHeld` if someone else
    /// holds a live lease on `key`.
    pub async fn acquire(&self, key: &str, lease: Duration) -> Result<LockGuard> {
        let token = LockToken::generate();
        if self.store.set_if_absent(key, token.as_str(), lease).await? {
            debug!(key, %token, ?lease, "lock acquired");
            Ok(LockGuard {
                lock: self.clone(),
                key: key.to_string(),
                token: Some(token),
            })
        } else {
            Err(LendingError::LockHeld {
                key: key.to_string(),
            })
        }
    }

    /// Compare-and-delete of `key`. Fails with `LockNotHeld` if the key is
    /// gone or now belongs to another token, typically because the lease ran
    /// out and someone else acquired it.
    pub async fn release(&self, key: &str, token: &LockToken) -> Result<()> {
        if self.store.compare_and_delete(key, token.as_str()).await? {
            debug!(key, %token, "lock released");
            Ok(())
        } else {
            Err(LendingError::LockNotHeld {
                key: key.to_string(),
            })
        }
    }

    /// Polls [`DistributedLock::acquire`] every poll interval until it
    /// succeeds or `timeout` has elapsed.
    pub async fn acquire_with_retry(
        &self,
        key: &str,
        lease: Duration,
        timeout: Duration,
    ) -> Result<LockGuard> {
        let started = Instant::now();
        let deadline = started + timeout;
        loop {
            match self.acquire(key, lease).await {
                Err(LendingError::LockHeld { .. }) => {
                    let now = Instant::now();
                    if now >= deadline {
                        return Err(LendingError::LockTimeout {
                            key: key.to_string(),
                            waited: now - started,
                        });
                    }
                    tokio::time::sleep(self.poll_interval.min(deadline - now)).await;
                }
                result => return result,
            }
        }
    }

    /// Runs `critical_section` while holding `key`, releasing the lock on
    /// every exit path.
    pub async fn with_lock<T, F, Fut>(
        &self,
        key: &str,
        lease: Duration,
        timeout: Duration,
        critical_section: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let guard = self.acquire_with_retry(key, lease, timeout).await?;
        let result = critical_section().await;
        guard.release_quietly().await;
        result
    }
}

/// A held lock. Release it with [`LockGuard::release`]; a guard dropped while
/// still holding the lock (for example when its task is cancelled) schedules
/// the release on the current runtime instead.
pub struct LockGuard {
    lock: DistributedLock,
    key: String,
    token: Option<LockToken>,
}

impl LockGuard {
    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn token(&self) -> Option<&LockToken> {
        self.token.as_ref()
    }

    pub async fn release(mut self) -> Result<()> {
        match self.token.take() {
            Some(token) => self.lock.release(&self.key, &token).await,
            None => Ok(()),
        }
    }

    /// Releases and logs instead of failing. A lease that expired under us
    /// is not an error for the critical section, whose writes are version
    /// checked anyway.
    pub async fn release_quietly(self) {
        let key = self.key.clone();
        if let Err(e) = self.release().await {
            warn!(key = %key, error = %e, "lock was lost before release");
        }
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        let Some(token) = self.token.take() else {
            return;
        };
        let lock = self.lock.clone();
        let key = std::mem::take(&mut self.key);
        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                handle.spawn(async move {
                    if let Err(e) = lock.release(&key, &token).await {
                        warn!(key = %key, error = %e, "deferred lock release failed");
                    }
                });
            }
            Err(_) => {
                warn!(key = %key, "lock guard dropped outside a runtime; lease will expire");
            }
        }
    }
}
