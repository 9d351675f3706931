//! In-memory idempotency cache for exactly-once write semantics.
//!
//! Deduplicates retried writes under a client-supplied `Idempotency-Key`:
//! within the TTL window, at most one caller per key performs the external
//! write, and every duplicate replays the winner's response byte-for-byte.
//!
//! ## Protocol
//!
//! 1. [`IdempotencyCache::try_begin`] atomically reserves the key. The single
//!    caller that wins the reservation gets [`Begin::Proceed`] with a
//!    [`Ticket`] and performs the write.
//! 2. On success the winner calls [`IdempotencyCache::complete`] to store the
//!    replay response; on failure it calls [`IdempotencyCache::release`] so
//!    retries are not stuck behind a dead reservation.
//! 3. Duplicates arriving while the write is in flight get
//!    [`Begin::InFlight`] — an explicit "retry later" signal, never an empty
//!    replay payload.
//! 4. Duplicates arriving after completion get [`Begin::Replay`] with the
//!    stored response until the entry expires.
//!
//! A naive check-then-set would let two concurrent callers both observe
//! "absent" and both write. The reservation is inserted under the map's
//! per-key entry guard, so exactly one caller wins regardless of how many
//! race; the slow external write then happens outside any lock.
//!
//! Expiry is lazy: entries are checked on access and swept only when an
//! insert finds the map at capacity. Tickets carry a generation so a slow
//! loser can never complete or release a reservation it no longer owns.

use chrono::{DateTime, Duration, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};

/// Default time-to-live for cached responses (5 minutes).
///
/// Measured from the time a response is registered, not from last access.
pub const DEFAULT_TTL: Duration = Duration::minutes(5);

/// Default maximum number of cache entries before lazy eviction kicks in.
pub const DEFAULT_MAX_ENTRIES: usize = 10_000;

/// Maximum accepted idempotency key length, in bytes.
pub const MAX_KEY_LENGTH: usize = 256;

#[derive(Debug, Clone)]
enum Slot {
    /// Reservation claimed; the winner's write has not completed yet.
    InFlight,
    /// The winner's response, replayed to duplicates until expiry.
    Ready(String),
}

#[derive(Debug, Clone)]
struct CacheEntry {
    slot: Slot,
    created_at: DateTime<Utc>,
    generation: u64,
}

impl CacheEntry {
    fn in_flight(now: DateTime<Utc>, generation: u64) -> Self {
        Self {
            slot: Slot::InFlight,
            created_at: now,
            generation,
        }
    }

    fn is_expired(&self, ttl: Duration, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(self.created_at) > ttl
    }
}

/// Proof of reservation ownership, returned by [`Begin::Proceed`].
///
/// The generation ties the ticket to one specific reservation: if a stale
/// reservation is taken over by a later caller, the original winner's ticket
/// silently stops matching and its `complete`/`release` become no-ops.
#[derive(Debug)]
pub struct Ticket {
    key: String,
    generation: u64,
}

/// Outcome of [`IdempotencyCache::try_begin`].
#[derive(Debug)]
pub enum Begin {
    /// No deduplication requested (missing or empty key); nothing is stored.
    Bypass,
    /// This caller won the reservation and must call
    /// [`IdempotencyCache::complete`] or [`IdempotencyCache::release`].
    Proceed(Ticket),
    /// A completed response exists within the TTL window; return it as-is.
    Replay(String),
    /// Another caller's write is still in flight for this key.
    InFlight {
        /// When the in-flight reservation was claimed (for Retry-After).
        started_at: DateTime<Utc>,
    },
}

/// Concurrency-safe map from idempotency key to the winning response.
///
/// Constructed once by the composition root and shared by all request
/// handlers; never a process-wide global.
#[derive(Debug)]
pub struct IdempotencyCache {
    entries: DashMap<String, CacheEntry>,
    ttl: Duration,
    max_entries: usize,
    next_generation: AtomicU64,
}

impl IdempotencyCache {
    /// Creates a cache with the given TTL and entry bound.
    #[must_use]
    pub fn new(ttl: Duration, max_entries: usize) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
            max_entries: max_entries.max(1),
            next_generation: AtomicU64::new(1),
        }
    }

    /// Creates a cache with [`DEFAULT_TTL`] and [`DEFAULT_MAX_ENTRIES`].
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(DEFAULT_TTL, DEFAULT_MAX_ENTRIES)
    }

    /// Returns the configured TTL.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the number of live (possibly expired but unswept) entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns whether the cache holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Attempts to begin a deduplicated write for `key`.
    ///
    /// Missing or empty keys opt out of deduplication and always yield
    /// [`Begin::Bypass`]. Otherwise the reservation protocol from the module
    /// docs decides between `Proceed`, `Replay`, and `InFlight`.
    pub fn try_begin(&self, key: Option<&str>) -> Begin {
        let Some(key) = key.map(str::trim).filter(|k| !k.is_empty()) else {
            return Begin::Bypass;
        };

        if self.entries.len() >= self.max_entries {
            self.evict();
        }

        let now = Utc::now();
        let generation = self.next_generation.fetch_add(1, Ordering::Relaxed);

        // The entry guard makes the insert-if-absent and the expired-entry
        // takeover atomic per key: exactly one concurrent caller proceeds.
        match self.entries.entry(key.to_string()) {
            Entry::Vacant(vacant) => {
                vacant.insert(CacheEntry::in_flight(now, generation));
                Begin::Proceed(Ticket {
                    key: key.to_string(),
                    generation,
                })
            }
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(self.ttl, now) {
                    occupied.insert(CacheEntry::in_flight(now, generation));
                    return Begin::Proceed(Ticket {
                        key: key.to_string(),
                        generation,
                    });
                }
                match &occupied.get().slot {
                    Slot::Ready(response) => Begin::Replay(response.clone()),
                    Slot::InFlight => Begin::InFlight {
                        started_at: occupied.get().created_at,
                    },
                }
            }
        }
    }

    /// Stores the winner's response for replay to future duplicates.
    ///
    /// The TTL window runs from this registration. A no-op if the reservation
    /// was taken over since the ticket was issued.
    pub fn complete(&self, ticket: Ticket, response: impl Into<String>) {
        if let Some(mut entry) = self.entries.get_mut(&ticket.key) {
            if entry.generation == ticket.generation {
                entry.slot = Slot::Ready(response.into());
                entry.created_at = Utc::now();
            }
        }
    }

    /// Removes the reservation after the winner's write failed.
    ///
    /// Retries with the same key can then win a fresh reservation instead of
    /// hanging behind a dead one. A no-op if the reservation was taken over.
    pub fn release(&self, ticket: Ticket) {
        self.entries
            .remove_if(&ticket.key, |_, entry| entry.generation == ticket.generation);
    }

    /// Seconds until an in-flight reservation claimed at `started_at` goes
    /// stale, clamped to `[1, ttl]`. Used for the `Retry-After` header.
    #[must_use]
    pub fn retry_after_secs(&self, started_at: DateTime<Utc>) -> u64 {
        let elapsed = Utc::now().signed_duration_since(started_at);
        let remaining = (self.ttl - elapsed).num_seconds().max(0);
        let ttl_secs = self.ttl.num_seconds().max(1);
        remaining.clamp(1, ttl_secs).unsigned_abs()
    }

    /// Sweeps expired entries; if the map is still full, evicts the oldest
    /// entry to make room for one insert.
    fn evict(&self) {
        let now = Utc::now();
        self.entries
            .retain(|_, entry| !entry.is_expired(self.ttl, now));

        if self.entries.len() < self.max_entries {
            return;
        }

        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.created_at)
            .map(|entry| entry.key().clone());
        if let Some(key) = oldest {
            tracing::warn!(key = %key, "idempotency cache full; evicting oldest entry");
            self.entries.remove(&key);
        }
    }

    /// Backdates an entry's creation time. Test hook for expiry paths.
    #[cfg(test)]
    fn backdate(&self, key: &str, by: Duration) {
        if let Some(mut entry) = self.entries.get_mut(key) {
            entry.created_at -= by;
        }
    }
}
