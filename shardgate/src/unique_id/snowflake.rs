//! Time-based 64-bit (i64) key generator.
//!
//! Layout, from the most significant bit:
//!
//! | sign (1) | timestamp (41) | worker id (10) | sequence (12) |
//!
//! Relies on 2 invariants:
//!
//! 1. Each generator sharing a key namespace has a unique `worker.id`,
//!    not exceeding 1023.
//! 2. Each host has a reasonably accurate clock. Small backward jumps
//!    are waited out, larger ones fail the call.
//!
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand::Rng;
use shardgate_config::Props;
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use super::Error;

const WORKER_ID_BITS: u64 = 10; // Max 1023 workers
const SEQUENCE_BITS: u64 = 12;
const TIMESTAMP_BITS: u64 = 41; // 41 bits = ~69 years, keeps i64 sign bit clear
pub const MAX_WORKER_ID: u64 = (1 << WORKER_ID_BITS) - 1; // 1023
pub const MAX_SEQUENCE: u64 = (1 << SEQUENCE_BITS) - 1; // 4095
const MAX_TIMESTAMP: u64 = (1 << TIMESTAMP_BITS) - 1;
pub const EPOCH: u64 = 1477958400000; // Tuesday, November 1, 2016 00:00:00 UTC
const WORKER_ID_SHIFT: u8 = SEQUENCE_BITS as u8; // 12
const TIMESTAMP_SHIFT: u8 = (SEQUENCE_BITS + WORKER_ID_BITS) as u8; // 22

/// Busy-wait iterations before falling back to sleeping
/// while waiting for the clock to advance.
const SPIN_LIMIT: usize = 128;

const DEFAULT_MAX_TOLERATE_MS: u64 = 10;

/// Source of milliseconds since the Unix epoch.
pub trait Clock: Send + Sync + std::fmt::Debug {
    fn now_ms(&self) -> u64;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Settings {
    worker_id: u64,
    max_vibration_offset: u64,
    max_tolerate_ms: u64,
}

#[derive(Debug, Default)]
struct State {
    last_timestamp_ms: u64,
    sequence: u64,
}

impl State {
    // Generate next key. Must be called with the generator lock held.
    async fn next_id(&mut self, clock: &dyn Clock, settings: &Settings) -> Result<u64, Error> {
        let mut now = clock.now_ms();

        if now < self.last_timestamp_ms {
            now = self.tolerate(clock, now, settings).await?;
        }

        if now == self.last_timestamp_ms {
            self.sequence = (self.sequence + 1) & MAX_SEQUENCE;
            // Wraparound.
            if self.sequence == 0 {
                now = wait_until(clock, now + 1).await;
                self.sequence = vibrate(settings.max_vibration_offset);
            }
        } else {
            self.sequence = vibrate(settings.max_vibration_offset);
        }

        self.last_timestamp_ms = now;

        let elapsed = now
            .checked_sub(EPOCH)
            .filter(|elapsed| *elapsed <= MAX_TIMESTAMP)
            .ok_or(Error::TimestampOutOfRange(now))?;

        Ok((elapsed << TIMESTAMP_SHIFT)
            | (settings.worker_id << WORKER_ID_SHIFT)
            | self.sequence)
    }

    // Clock moved backwards. Wait it out if the jump is small enough.
    async fn tolerate(
        &self,
        clock: &dyn Clock,
        now: u64,
        settings: &Settings,
    ) -> Result<u64, Error> {
        let difference = self.last_timestamp_ms - now;
        if difference > settings.max_tolerate_ms {
            return Err(Error::ClockRegression {
                last_ms: self.last_timestamp_ms,
                now_ms: now,
            });
        }

        warn!(
            "clock moved backwards by {}ms, waiting for it to catch up",
            difference
        );

        Ok(wait_until(clock, self.last_timestamp_ms).await)
    }
}

// Starting sequence for a new millisecond. Randomizing the low bits
// keeps keys from being trivially guessable and spreads
// `key % n` sharding when traffic is low.
fn vibrate(max_vibration_offset: u64) -> u64 {
    if max_vibration_offset == 0 {
        0
    } else {
        rand::rng().random_range(0..=max_vibration_offset)
    }
}

// Wait until the clock reaches `target_ms`.
// Spins for a little while, then yields to the runtime.
async fn wait_until(clock: &dyn Clock, target_ms: u64) -> u64 {
    let mut spins = 0;
    loop {
        let now = clock.now_ms();
        if now >= target_ms {
            return now;
        }
        if spins < SPIN_LIMIT {
            spins += 1;
            std::hint::spin_loop();
        } else {
            sleep(Duration::from_millis(1)).await;
        }
    }
}

/// Snowflake key generator.
#[derive(Debug)]
pub struct Snowflake {
    settings: Settings,
    clock: Arc<dyn Clock>,
    state: Mutex<State>,
}

impl Snowflake {
    /// Create generator from `worker.id`, `max.vibration.offset` and
    /// `max.tolerate.time.difference.milliseconds`.
    pub fn new(props: &Props) -> Result<Self, Error> {
        let worker_id = props.parse_or("worker.id", 0i64)?;
        if worker_id < 0 || worker_id as u64 > MAX_WORKER_ID {
            return Err(Error::InvalidWorkerId {
                value: worker_id,
                max: MAX_WORKER_ID,
            });
        }

        let max_vibration_offset = props.parse_or("max.vibration.offset", 1i64)?;
        if max_vibration_offset < 0 || max_vibration_offset as u64 > MAX_SEQUENCE {
            return Err(Error::InvalidVibrationOffset {
                value: max_vibration_offset,
                max: MAX_SEQUENCE,
            });
        }

        let max_tolerate_ms = props.parse_or(
            "max.tolerate.time.difference.milliseconds",
            DEFAULT_MAX_TOLERATE_MS,
        )?;

        Ok(Self {
            settings: Settings {
                worker_id: worker_id as u64,
                max_vibration_offset: max_vibration_offset as u64,
                max_tolerate_ms,
            },
            clock: Arc::new(SystemClock),
            state: Mutex::new(State::default()),
        })
    }

    /// Replace the clock, e.g. with a fixed one in tests.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn worker_id(&self) -> u64 {
        self.settings.worker_id
    }

    /// Generate a unique, monotonically increasing key.
    pub async fn next_id(&self) -> Result<i64, Error> {
        let mut state = self.state.lock().await;
        Ok(state.next_id(self.clock.as_ref(), &self.settings).await? as i64)
    }
}

/// Split a key into (milliseconds since [`EPOCH`], worker id, sequence).
pub fn decompose(id: i64) -> (u64, u64, u64) {
    let id = id as u64;
    (
        id >> TIMESTAMP_SHIFT,
        (id >> WORKER_ID_SHIFT) & MAX_WORKER_ID,
        id & MAX_SEQUENCE,
    )
}
