// src/core/cooldown.rs

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// A source of wall-clock time in epoch milliseconds.
pub trait Clock: Send + Sync + fmt::Debug {
    fn now_ms(&self) -> u64;
}

/// The real system clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_ms(&self) -> u64 {
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or_default()
    }
}

/// A clock that only moves when told to.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_ms: u64) -> Self {
        Self {
            now: AtomicU64::new(start_ms),
        }
    }

    pub fn set(&self, now_ms: u64) {
        self.now.store(now_ms, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.now.fetch_add(by.as_millis() as u64, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now_ms(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

/// Per-user, per-command cooldown expiries.
///
/// Entries are keyed by user first so that a lookup never depends on how many commands
/// exist. Expired entries are not swept; they simply read as expired until overwritten.
#[derive(Debug)]
pub struct CooldownLedger {
    entries: Mutex<HashMap<String, HashMap<String, u64>>>,
    clock: Arc<dyn Clock>,
}

impl CooldownLedger {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            clock,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, HashMap<String, u64>>> {
        self.entries.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.clock
    }

    pub fn now_ms(&self) -> u64 {
        self.clock.now_ms()
    }

    /// Returns the expiry (epoch ms) recorded for `user` and `command`, if any.
    pub fn get(&self, user: &str, command: &str) -> Option<u64> {
        self.lock()
            .get(user)
            .and_then(|commands| commands.get(command))
            .copied()
    }

    /// `true` if there is no entry, or the clock has passed the recorded expiry.
    pub fn expired(&self, user: &str, command: &str) -> bool {
        match self.get(user, command) {
            Some(expiry) => self.now_ms() > expiry,
            None => true,
        }
    }

    /// Time left before `user` may run `command` again, or `None` if the cooldown has expired.
    pub fn remaining(&self, user: &str, command: &str) -> Option<Duration> {
        let expiry = self.get(user, command)?;
        let now = self.now_ms();
        if now > expiry {
            None
        } else {
            Some(Duration::from_millis(expiry - now))
        }
    }

    /// Records a new expiry, replacing any previous entry for the pair.
    pub fn set(&self, user: &str, expiry: u64, command: &str) {
        let mut entries = self.lock();
        // Drop the stale entry first so rescheduling never leaves a dangling user map.
        remove_entry(&mut entries, user, command);
        entries
            .entry(user.to_string())
            .or_default()
            .insert(command.to_string(), expiry);
    }

    /// Removes the entry for the pair. Returns `true` if one existed.
    pub fn clear(&self, user: &str, command: &str) -> bool {
        remove_entry(&mut self.lock(), user, command)
    }

    /// Atomically records `expiry` only if the pair is currently expired.
    ///
    /// Used to claim a cooldown slot at validation time so that two in-flight invocations
    /// cannot both pass the cooldown check.
    pub fn try_reserve(&self, user: &str, command: &str, expiry: u64) -> bool {
        let now = self.now_ms();
        let mut entries = self.lock();
        let live = entries
            .get(user)
            .and_then(|commands| commands.get(command))
            .is_some_and(|current| now <= *current);
        if live {
            return false;
        }
        remove_entry(&mut entries, user, command);
        entries
            .entry(user.to_string())
            .or_default()
            .insert(command.to_string(), expiry);
        true
    }

    /// Number of (user, command) entries currently stored, expired or not.
    pub fn len(&self) -> usize {
        self.lock().values().map(HashMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

fn remove_entry(entries: &mut HashMap<String, HashMap<String, u64>>, user: &str, command: &str) -> bool {
    let Some(commands) = entries.get_mut(user) else {
        return false;
    };
    let removed = commands.remove(command).is_some();
    if commands.is_empty() {
        entries.remove(user);
    }
    removed
}
