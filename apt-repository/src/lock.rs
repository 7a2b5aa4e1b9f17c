// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Best effort repository lock.

Concurrent publishes would race on the read-modify-write of index and
manifest files, so writers serialize through a lock object in the
store itself. The protocol is advisory: acquisition polls for absence
of the lock key and then writes it, which leaves a small window where
two writers both observe the key missing and both proceed. Object
stores offer no compare-and-swap, and for the low publish rates this
tool serves the window is acceptable.

A crashed publisher leaves the lock behind; there is no expiry. Waiters
eventually fail with [RepoError::LockTimeout] and the stale lock has to
be deleted by hand.
*/

use {
    crate::{
        error::{RepoError, Result},
        store::ObjectStore,
    },
    chrono::Utc,
    log::{debug, info},
    std::{
        sync::Arc,
        time::{Duration, Instant},
    },
};

/// Object key marking the repository as locked.
pub const LOCK_KEY: &str = "apt-repo.lock";

/// How often waiters re-check the lock.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);

/// How long waiters poll before giving up.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(60 * 60);

/// Advisory writer lock over a repository in an [ObjectStore].
pub struct RepoLock {
    store: Arc<dyn ObjectStore>,
    key: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl RepoLock {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self::with_timing(store, LOCK_KEY, DEFAULT_POLL_INTERVAL, DEFAULT_MAX_WAIT)
    }

    pub fn with_timing(
        store: Arc<dyn ObjectStore>,
        key: impl ToString,
        poll_interval: Duration,
        max_wait: Duration,
    ) -> Self {
        Self {
            store,
            key: key.to_string(),
            poll_interval,
            max_wait,
        }
    }

    /// Acquire the lock, waiting for another holder to release it.
    ///
    /// Errors with [RepoError::LockTimeout] if the lock is still held
    /// after the configured maximum wait.
    pub async fn acquire(&self) -> Result<()> {
        if !self.store.head(&self.key).await? {
            return self.write_lock().await;
        }

        info!("repository lock {} is held; waiting", self.key);

        let deadline = Instant::now() + self.max_wait;

        while Instant::now() < deadline {
            tokio::time::sleep(self.poll_interval).await;

            if !self.store.head(&self.key).await? {
                return self.write_lock().await;
            }

            debug!("repository lock {} still held", self.key);
        }

        Err(RepoError::LockTimeout(self.max_wait))
    }

    /// Release the lock. Releasing an already absent lock is not an
    /// error, so release can run unconditionally on cleanup paths.
    pub async fn release(&self) -> Result<()> {
        if self.store.head(&self.key).await? {
            self.store.delete(&self.key).await?;
            info!("released repository lock {}", self.key);
        }

        Ok(())
    }

    async fn write_lock(&self) -> Result<()> {
        // Diagnostic content only; nothing parses this.
        let content = format!(
            "locked by pid {} at {}",
            std::process::id(),
            Utc::now().to_rfc3339()
        );

        self.store.put(&self.key, content.into_bytes()).await?;
        info!("acquired repository lock {}", self.key);

        Ok(())
    }
}
