//! Leased-segment key generator.
//!
//! Reserves a block of `step` keys for a namespace from a coordination
//! service and hands them out locally. A block is persisted by the
//! coordinator before any key from it is returned, so a crash loses the
//! rest of the block but never hands out a key twice.
//!
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shardgate_config::Props;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use super::Error;

const DEFAULT_TIMEOUT_MS: u64 = 3_000;
const RETRY_INITIAL_BACKOFF_MS: u64 = 10;
const RETRY_MAX_BACKOFF_MS: u64 = 200;
const STALE_LOCK: Duration = Duration::from_secs(10);

/// Contiguous range of keys `[start, start + step)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Block {
    pub start: i64,
    pub step: i64,
}

/// Hands out key blocks. Implementations must never return
/// overlapping blocks for the same namespace.
#[async_trait]
pub trait Coordinator: Send + Sync + std::fmt::Debug {
    async fn allocate_block(&self, namespace: &str) -> Result<Block, Error>;
}

/// Block parameters shared by the built-in coordinators.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Lease {
    pub initial_value: i64,
    pub step: i64,
}

impl Lease {
    /// Read `initialValue` and `step`.
    pub fn new(props: &Props) -> Result<Self, Error> {
        let initial_value = props.parse_or("initialValue", 1i64)?;
        let step = props.parse_or("step", 10_000i64)?;

        if initial_value < 0 {
            return Err(Error::InvalidInitialValue(initial_value));
        }

        if step <= 0 {
            return Err(Error::InvalidStep(step));
        }

        Ok(Self {
            initial_value,
            step,
        })
    }

    // Next counter value after handing out a block at `start`.
    fn advance(&self, start: i64, namespace: &str) -> Result<i64, Error> {
        start
            .checked_add(self.step)
            .ok_or_else(|| Error::SequenceExhausted(namespace.to_string()))
    }
}

/// In-process coordinator. Blocks are unique for the lifetime
/// of this object only, so keys repeat after a restart.
/// Only used when `serverList` is `memory`.
#[derive(Debug)]
pub struct MemoryCoordinator {
    lease: Lease,
    counters: Mutex<HashMap<String, i64>>,
}

impl MemoryCoordinator {
    pub fn new(lease: Lease) -> Self {
        Self {
            lease,
            counters: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl Coordinator for MemoryCoordinator {
    async fn allocate_block(&self, namespace: &str) -> Result<Block, Error> {
        let mut counters = self.counters.lock();
        let next = counters
            .entry(namespace.to_string())
            .or_insert(self.lease.initial_value);
        let start = *next;
        *next = self.lease.advance(start, namespace)?;

        Ok(Block {
            start,
            step: self.lease.step,
        })
    }
}

/// Counter file contents.
#[derive(Debug, Serialize, Deserialize)]
struct Counter {
    namespace: String,
    /// Start of the next block.
    next: i64,
}

/// Coordinator persisting counters as files in a directory shared by
/// every process using the namespace. A lock file serializes allocations
/// across processes.
#[derive(Debug)]
pub struct FileCoordinator {
    lease: Lease,
    directory: PathBuf,
}

impl FileCoordinator {
    pub fn new(lease: Lease, directory: impl AsRef<Path>) -> Self {
        Self {
            lease,
            directory: directory.as_ref().to_owned(),
        }
    }

    fn path(&self, namespace: &str, extension: &str) -> PathBuf {
        let name: String = namespace
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
            .collect();
        self.directory.join(format!("{}.{}", name, extension))
    }

    // Try to take the lock once. A lock left behind by a crashed
    // process is removed once it's older than `STALE_LOCK`.
    fn try_lock(&self, lock: &Path) -> Result<bool, Error> {
        match fs::OpenOptions::new().write(true).create_new(true).open(lock) {
            Ok(_) => Ok(true),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => {
                let stale = fs::metadata(lock)
                    .and_then(|meta| meta.modified())
                    .ok()
                    .and_then(|modified| SystemTime::now().duration_since(modified).ok())
                    .map(|age| age > STALE_LOCK)
                    .unwrap_or(false);
                if stale {
                    warn!("removing stale lock \"{}\"", lock.display());
                    let _ = fs::remove_file(lock);
                }
                Ok(false)
            }
            Err(err) => Err(Error::Coordination(err.to_string())),
        }
    }

    fn allocate_locked(&self, namespace: &str) -> Result<Block, Error> {
        let counter = self.path(namespace, "counter");
        let start = match fs::read_to_string(&counter) {
            Ok(value) => {
                serde_json::from_str::<Counter>(&value)
                    .map_err(|err| {
                        Error::Coordination(format!(
                            "corrupted counter \"{}\": {}",
                            counter.display(),
                            err
                        ))
                    })?
                    .next
            }
            Err(err) if err.kind() == ErrorKind::NotFound => self.lease.initial_value,
            Err(err) => return Err(Error::Coordination(err.to_string())),
        };
        let next = self.lease.advance(start, namespace)?;

        // Persist before handing out the block.
        let tmp = self.path(namespace, "tmp");
        let contents = serde_json::to_string(&Counter {
            namespace: namespace.to_string(),
            next,
        })
        .map_err(|err| Error::Coordination(err.to_string()))?;
        fs::write(&tmp, contents).map_err(|err| Error::Coordination(err.to_string()))?;
        fs::rename(&tmp, &counter).map_err(|err| Error::Coordination(err.to_string()))?;

        Ok(Block {
            start,
            step: self.lease.step,
        })
    }
}

#[async_trait]
impl Coordinator for FileCoordinator {
    async fn allocate_block(&self, namespace: &str) -> Result<Block, Error> {
        fs::create_dir_all(&self.directory).map_err(|err| Error::Coordination(err.to_string()))?;
        let lock = self.path(namespace, "lock");

        let mut backoff = RETRY_INITIAL_BACKOFF_MS;
        while !self.try_lock(&lock)? {
            sleep(Duration::from_millis(backoff)).await;
            backoff = (backoff * 2).min(RETRY_MAX_BACKOFF_MS);
        }

        let result = self.allocate_locked(namespace);
        let _ = fs::remove_file(&lock);
        result
    }
}

/// Build a coordinator from `serverList`: `file:///path/to/directory`,
/// or `memory` for keys that don't need to survive a restart.
pub fn coordinator(props: &Props) -> Result<Arc<dyn Coordinator>, Error> {
    let lease = Lease::new(props)?;
    let server_list = props
        .get("serverList")
        .ok_or(Error::MissingProperty("serverList"))?;

    if server_list == "memory" {
        Ok(Arc::new(MemoryCoordinator::new(lease)))
    } else if let Some(directory) = server_list.strip_prefix("file://") {
        Ok(Arc::new(FileCoordinator::new(lease, directory)))
    } else {
        Err(Error::UnsupportedEndpoint(server_list))
    }
}

#[derive(Debug, Default)]
struct Cursor {
    next: i64,
    end: i64,
}

impl Cursor {
    fn take(&mut self) -> Option<i64> {
        if self.next < self.end {
            let id = self.next;
            self.next += 1;
            Some(id)
        } else {
            None
        }
    }
}

/// Leased-segment key generator for one namespace.
#[derive(Debug)]
pub struct Segment {
    namespace: String,
    coordinator: Arc<dyn Coordinator>,
    timeout: Duration,
    cursor: Mutex<Cursor>,
    refill: tokio::sync::Mutex<()>,
}

impl Segment {
    pub fn new(namespace: impl ToString, coordinator: Arc<dyn Coordinator>) -> Self {
        Self {
            namespace: namespace.to_string(),
            coordinator,
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
            cursor: Mutex::new(Cursor::default()),
            refill: tokio::sync::Mutex::new(()),
        }
    }

    /// Create from `serverList`, `step`, `initialValue`, `leaf.key`
    /// and `registry.timeout.milliseconds`.
    pub fn from_props(namespace: &str, props: &Props) -> Result<Self, Error> {
        let namespace = props.get("leaf.key").unwrap_or_else(|| namespace.to_string());
        let timeout = props.parse_or("registry.timeout.milliseconds", DEFAULT_TIMEOUT_MS)?;
        Ok(Self::new(namespace, coordinator(props)?).with_timeout(Duration::from_millis(timeout)))
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    /// Get the next key.
    ///
    /// Fast path: take from the current block.
    /// Slow path: one caller fetches a new block, the others wait for it.
    pub async fn next_id(&self) -> Result<i64, Error> {
        loop {
            let id = self.cursor.lock().take();
            if let Some(id) = id {
                return Ok(id);
            }

            let _refill = self.refill.lock().await;

            // Someone else refilled while we waited.
            let id = self.cursor.lock().take();
            if let Some(id) = id {
                return Ok(id);
            }

            let block = self.fetch().await?;
            let end = block
                .start
                .checked_add(block.step)
                .ok_or_else(|| Error::SequenceExhausted(self.namespace.clone()))?;

            debug!(
                namespace = %self.namespace,
                start = block.start,
                end,
                "leased new key block"
            );

            *self.cursor.lock() = Cursor {
                next: block.start,
                end,
            };
        }
    }

    // Fetch a block, retrying with backoff until the timeout expires.
    async fn fetch(&self) -> Result<Block, Error> {
        let started = Instant::now();
        let mut attempts = 0;
        let mut backoff = RETRY_INITIAL_BACKOFF_MS;

        loop {
            attempts += 1;
            let remaining = self.timeout.saturating_sub(started.elapsed());

            match timeout(remaining, self.coordinator.allocate_block(&self.namespace)).await {
                Ok(Ok(block)) if block.step > 0 && block.start >= 0 => return Ok(block),
                Ok(Ok(block)) => {
                    return Err(Error::Coordination(format!(
                        "invalid block {:?} for \"{}\"",
                        block, self.namespace
                    )))
                }
                Ok(Err(err)) if !err.is_retryable() && !matches!(err, Error::Coordination(_)) => {
                    return Err(err)
                }
                Ok(Err(err)) => warn!(
                    "key block for \"{}\" not allocated (attempt {}): {}",
                    self.namespace, attempts, err
                ),
                Err(_) => warn!(
                    "key block for \"{}\" timed out (attempt {})",
                    self.namespace, attempts
                ),
            }

            let elapsed = started.elapsed();
            if elapsed + Duration::from_millis(backoff) >= self.timeout {
                return Err(Error::CoordinationUnavailable {
                    namespace: self.namespace.clone(),
                    attempts,
                    elapsed,
                });
            }

            sleep(Duration::from_millis(backoff)).await;
            backoff = (backoff * 2).min(RETRY_MAX_BACKOFF_MS);
        }
    }
}
