//! Credential cache
//!
//! Caches resolved [`CredentialBundle`]s per kubeconfig path. Keys are SHA-256
//! digests of the path so raw paths never become map keys. Entries live for the
//! bundle TTL (1 hour); an expired entry is scrubbed and dropped on the next
//! lookup. Each insertion also schedules a sweep on the cache's own sweeper
//! thread (2 hours later by default) that removes the entry if it has expired
//! by then. Dropping the cache or calling [`CredentialCache::shutdown`] cancels
//! pending sweeps, joins the thread and scrubs what is left.
//!
//! Scrubbing zeroes the buffers owned by the cache entry. Callers receive
//! clones, which scrub themselves when dropped but are otherwise out of reach.

use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::path::Path;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::{Condvar, Mutex};
use sha2::{Digest, Sha256};

use super::auth::{self, CredentialBundle, KubeConfigError, DEFAULT_TTL};

/// Delay before the sweeper revisits an inserted entry
pub const DEFAULT_SWEEP_DELAY: Duration = Duration::from_secs(2 * 60 * 60);

/// Key material used when no explicit path is given
const DEFAULT_KEY: &str = "default";

/// Cache tuning
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheSettings {
    /// Lifetime of a resolved bundle
    pub ttl: Duration,
    /// Delay between insertion and the background sweep of that entry
    pub sweep_delay: Duration,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            ttl: DEFAULT_TTL,
            sweep_delay: DEFAULT_SWEEP_DELAY,
        }
    }
}

/// Derive the cache key for a kubeconfig path
pub fn cache_key(path: Option<&Path>) -> String {
    let material = match path {
        Some(p) => p.to_string_lossy().into_owned(),
        None => DEFAULT_KEY.to_string(),
    };
    format!("{:x}", Sha256::digest(material.as_bytes()))
}

type Entries = Arc<Mutex<HashMap<String, CredentialBundle>>>;

/// Cache of resolved credentials with TTL expiry and a background sweeper
pub struct CredentialCache {
    entries: Entries,
    settings: CacheSettings,
    sweeper: Sweeper,
}

impl CredentialCache {
    pub fn new() -> Self {
        Self::with_settings(CacheSettings::default())
    }

    pub fn with_settings(settings: CacheSettings) -> Self {
        let entries: Entries = Arc::new(Mutex::new(HashMap::new()));
        let sweeper = Sweeper::start(Arc::clone(&entries));
        Self {
            entries,
            settings,
            sweeper,
        }
    }

    pub fn settings(&self) -> CacheSettings {
        self.settings
    }

    /// Return the live bundle for `path`, resolving and caching it on a miss
    pub fn get_or_resolve(&self, path: Option<&Path>) -> Result<CredentialBundle, KubeConfigError> {
        let key = cache_key(path);

        if let Some(bundle) = self.lookup(&key) {
            return Ok(bundle);
        }

        tracing::debug!("credential cache MISS for {}", &key[..12]);
        let bundle = auth::resolve_with_ttl(path, self.settings.ttl)?;
        self.insert(key, bundle.clone());
        Ok(bundle)
    }

    /// Live entry for `key`, touching its access time. An expired entry is
    /// scrubbed and removed.
    fn lookup(&self, key: &str) -> Option<CredentialBundle> {
        let mut entries = self.entries.lock();
        let now = Utc::now();

        let expired = match entries.get_mut(key) {
            Some(bundle) if !bundle.is_expired_at(now) => {
                bundle.last_accessed = bundle.last_accessed.max(now);
                tracing::debug!("credential cache HIT for {}", &key[..12]);
                return Some(bundle.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            tracing::debug!("credential cache entry {} expired", &key[..12]);
            scrub_and_remove(&mut entries, key);
        }
        None
    }

    fn insert(&self, key: String, bundle: CredentialBundle) {
        let replaced = self.entries.lock().insert(key.clone(), bundle);
        if let Some(mut old) = replaced {
            old.scrub();
        }
        self.sweeper.schedule(key, self.settings.sweep_delay);
    }

    /// Scrub and remove every expired entry now. Returns the number removed.
    pub fn evict_expired(&self) -> usize {
        let mut entries = self.entries.lock();
        let now = Utc::now();
        let expired: Vec<String> = entries
            .iter()
            .filter(|(_, b)| b.is_expired_at(now))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &expired {
            scrub_and_remove(&mut entries, key);
        }
        expired.len()
    }

    /// Scrub and remove every entry
    pub fn clear(&self) {
        let mut entries = self.entries.lock();
        for (_, mut bundle) in entries.drain() {
            bundle.scrub();
        }
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }

    pub fn contains(&self, path: Option<&Path>) -> bool {
        self.entries.lock().contains_key(&cache_key(path))
    }

    /// Number of sweeps still waiting to run
    pub fn pending_sweeps(&self) -> usize {
        self.sweeper.pending()
    }

    /// Cancel pending sweeps, stop the sweeper thread and scrub all entries
    pub fn shutdown(&self) {
        self.sweeper.stop();
        self.clear();
    }
}

impl Default for CredentialCache {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for CredentialCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Scrub the entry for `key` in place and take it out of the map. The returned
/// bundle holds zeroed buffers only.
fn scrub_and_remove(
    entries: &mut HashMap<String, CredentialBundle>,
    key: &str,
) -> Option<CredentialBundle> {
    let bundle = entries.get_mut(key)?;
    bundle.scrub();
    entries.remove(key)
}

struct SweepQueue {
    pending: BinaryHeap<Reverse<(Instant, String)>>,
    stopped: bool,
}

struct SweepShared {
    queue: Mutex<SweepQueue>,
    wakeup: Condvar,
}

/// Delayed sweeps on a dedicated thread, ordered by deadline
struct Sweeper {
    shared: Arc<SweepShared>,
    handle: Mutex<Option<JoinHandle<()>>>,
}

impl Sweeper {
    fn start(entries: Entries) -> Self {
        let shared = Arc::new(SweepShared {
            queue: Mutex::new(SweepQueue {
                pending: BinaryHeap::new(),
                stopped: false,
            }),
            wakeup: Condvar::new(),
        });

        let thread_shared = Arc::clone(&shared);
        let handle = thread::Builder::new()
            .name("credential-sweeper".into())
            .spawn(move || Self::run(thread_shared, entries));

        let handle = match handle {
            Ok(handle) => Some(handle),
            Err(e) => {
                // Lazy expiry on lookup still applies without the sweeper.
                tracing::warn!("Failed to start credential sweeper: {}", e);
                shared.queue.lock().stopped = true;
                None
            }
        };

        Self {
            shared,
            handle: Mutex::new(handle),
        }
    }

    fn schedule(&self, key: String, delay: Duration) {
        let mut queue = self.shared.queue.lock();
        if queue.stopped {
            return;
        }
        let deadline = Instant::now().checked_add(delay);
        let Some(deadline) = deadline else {
            // Unrepresentable deadline, the sweep would never fire.
            return;
        };
        queue.pending.push(Reverse((deadline, key)));
        self.shared.wakeup.notify_one();
    }

    fn pending(&self) -> usize {
        self.shared.queue.lock().pending.len()
    }

    fn stop(&self) {
        {
            let mut queue = self.shared.queue.lock();
            queue.stopped = true;
            queue.pending.clear();
        }
        self.shared.wakeup.notify_all();

        if let Some(handle) = self.handle.lock().take() {
            if handle.join().is_err() {
                tracing::warn!("credential sweeper panicked");
            }
        }
    }

    fn run(shared: Arc<SweepShared>, entries: Entries) {
        tracing::debug!("credential sweeper started");
        loop {
            let key = {
                let mut queue = shared.queue.lock();
                loop {
                    if queue.stopped {
                        tracing::debug!("credential sweeper exiting");
                        return;
                    }
                    let next = queue.pending.peek().map(|Reverse((deadline, _))| *deadline);
                    match next {
                        Some(deadline) if deadline <= Instant::now() => {
                            if let Some(Reverse((_, key))) = queue.pending.pop() {
                                break key;
                            }
                        }
                        Some(deadline) => {
                            let _ = shared.wakeup.wait_until(&mut queue, deadline);
                        }
                        None => shared.wakeup.wait(&mut queue),
                    }
                }
            };

            let mut entries = entries.lock();
            if entries.get(&key).is_some_and(CredentialBundle::is_expired) {
                scrub_and_remove(&mut entries, &key);
                tracing::debug!("credential sweeper removed expired entry {}", &key[..12]);
            }
        }
    }
}
