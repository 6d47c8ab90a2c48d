//! Hierarchical timing wheel.
//!
//! Based on Varghese and Lauck's paper
//! "Hashed and Hierarchical Timing Wheels: Efficient Data Structures for
//! Implementing a Timer Facility".

use crate::list::Arena;
use thiserror::Error;
use tracing::{debug, trace};

/// Rejected wheel geometries. See [`WheelConfig::validate`].
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    #[error("wheel needs at least one level")]
    NoLevels,
    #[error("buckets_per_level_log2 must be greater than zero")]
    NoBuckets,
    #[error("granularity step of {granularity_log2} bits exceeds the {bucket_log2} bucket bits")]
    GranularityTooCoarse { granularity_log2: u32, bucket_log2: u32 },
    #[error("wheel range does not fit the 64-bit tick counter")]
    RangeTooWide,
}

/// Wheel geometry. Immutable once the wheel is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WheelConfig {
    /// Number of levels.
    pub levels: usize,
    /// log2 of the bucket count per level.
    pub buckets_per_level_log2: u32,
    /// log2 of the granularity step between adjacent levels: one slot on
    /// level `lvl` spans `1 << (lvl * granularity_per_level_log2)` ticks.
    pub granularity_per_level_log2: u32,
}

impl Default for WheelConfig {
    /// 4 levels of 64 buckets with a full 6-bit step, reaching 64^4 ticks.
    fn default() -> Self {
        Self {
            levels: 4,
            buckets_per_level_log2: 6,
            granularity_per_level_log2: 6,
        }
    }
}

impl WheelConfig {
    /// Checks the construction preconditions: at least one level, at least
    /// two buckets per level, a granularity step no coarser than the bucket
    /// bits (or a level could not cover the range of the level below it),
    /// and a total range that fits the 64-bit tick counter.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.levels == 0 {
            return Err(ConfigError::NoLevels);
        }
        if self.buckets_per_level_log2 == 0 {
            return Err(ConfigError::NoBuckets);
        }
        if self.granularity_per_level_log2 > self.buckets_per_level_log2 {
            return Err(ConfigError::GranularityTooCoarse {
                granularity_log2: self.granularity_per_level_log2,
                bucket_log2: self.buckets_per_level_log2,
            });
        }
        let top_bits = (self.levels as u64 - 1)
            .saturating_mul(self.granularity_per_level_log2 as u64)
            + self.buckets_per_level_log2 as u64;
        if top_bits >= 64 {
            return Err(ConfigError::RangeTooWide);
        }
        Ok(())
    }
}

/// Handle to a timer registered with a [`TimingWheel`].
///
/// Stays valid until the timer is removed; a handle kept across a `remove`
/// is stale and every operation on it is inert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(usize);

/// A hierarchical timing wheel.
///
/// Timers are registered once and then scheduled any number of times with a
/// relative lifetime in ticks. Each level of the wheel is a ring of buckets
/// one granularity step coarser than the level below, so a timer lands in
/// the lowest level whose reach covers its lifetime. Scheduling,
/// rescheduling and cancellation are all a constant number of link splices;
/// driving [`TimingWheel::tick`] once per time unit expires the current
/// bucket of every level whose boundary the tick crosses.
///
/// Timers on level `lvl` fire no earlier than scheduled and at most
/// `2^(lvl * granularity_per_level_log2) - 1` ticks late. Lifetimes beyond
/// [`TimingWheel::max_lifetime`] are silently clamped to the furthest
/// representable slot, which suits long-lived keepalives better than an
/// error; callers wanting longer waits reschedule when the clamped timer
/// fires.
pub struct TimingWheel<T> {
    current_tick: u64,
    levels: usize,
    bucket_bits: u32,
    bucket_mask: u64,
    granularity_bits: u32,
    granularity_mask: u64,
    max_lifetime: u64,
    /// Drain list used while expiring a bucket. Empty between ticks.
    pending: usize,
    arena: Arena<T>,
}

impl<T> TimingWheel<T> {
    /// Creates a wheel with the default geometry.
    pub fn new() -> Self {
        Self::with_config(WheelConfig::default())
    }

    /// Creates a wheel with the given geometry. The bucket array is the
    /// only allocation the wheel makes on its own behalf.
    ///
    /// # Panics
    ///
    /// Panics if the configuration is invalid; see [`WheelConfig::validate`].
    pub fn with_config(config: WheelConfig) -> Self {
        if let Err(err) = config.validate() {
            panic!("invalid wheel configuration: {err}");
        }
        let bucket_bits = config.buckets_per_level_log2;
        let buckets = 1usize << bucket_bits;
        let granularity_bits = config.granularity_per_level_log2;
        let top_shift = (config.levels as u32 - 1) * granularity_bits;
        // One granularity unit short of the top level's reach.
        let max_lifetime = ((buckets as u64 - 1) << top_shift) - (1u64 << top_shift);
        let heads = config.levels * buckets;
        debug!(
            levels = config.levels,
            buckets_per_level = buckets,
            max_lifetime,
            "created timing wheel"
        );
        Self {
            current_tick: 0,
            levels: config.levels,
            bucket_bits,
            bucket_mask: buckets as u64 - 1,
            granularity_bits,
            granularity_mask: (1u64 << granularity_bits) - 1,
            max_lifetime,
            // The drain sentinel sits right after the bucket heads
            pending: heads,
            arena: Arena::with_heads(heads + 1),
        }
    }

    /// Number of ticks driven so far. Starts at zero.
    pub fn ticks(&self) -> u64 {
        self.current_tick
    }

    /// Largest schedulable lifetime; anything longer is clamped to it.
    pub fn max_lifetime(&self) -> u64 {
        self.max_lifetime
    }

    /// Number of registered timers, scheduled or not.
    pub fn len(&self) -> usize {
        self.arena.timers()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Registers a timer without scheduling it.
    pub fn register(&mut self, data: T) -> TimerId {
        TimerId(self.arena.alloc(data))
    }

    /// Registers and schedules in one step.
    pub fn insert(&mut self, lifetime: u64, data: T) -> TimerId {
        let id = self.register(data);
        self.schedule(lifetime, id);
        id
    }

    /// Cancels the timer if it is scheduled and unregisters it, returning
    /// its payload. `None` on a stale handle.
    pub fn remove(&mut self, id: TimerId) -> Option<T> {
        if !self.arena.is_timer(id.0) {
            return None;
        }
        self.arena.unlink(id.0);
        self.arena.free(id.0)
    }

    /// Payload of a registered timer.
    pub fn get(&self, id: TimerId) -> Option<&T> {
        self.arena.get(id.0)
    }

    pub fn get_mut(&mut self, id: TimerId) -> Option<&mut T> {
        self.arena.get_mut(id.0)
    }

    /// Whether the timer currently sits in a bucket.
    pub fn is_scheduled(&self, id: TimerId) -> bool {
        self.arena.is_timer(id.0) && self.arena.is_linked(id.0)
    }

    /// Schedules `id` to expire `lifetime` ticks from now.
    ///
    /// A timer that is already scheduled is moved, so this is also how a
    /// timer is rescheduled. Lifetimes of 0 and 1 both fire on the next
    /// tick; lifetimes beyond [`TimingWheel::max_lifetime`] are clamped.
    /// Scheduling a stale handle is a no-op.
    pub fn schedule(&mut self, lifetime: u64, id: TimerId) {
        debug_assert!(self.arena.is_timer(id.0), "scheduled a stale timer handle");
        if !self.arena.is_timer(id.0) {
            return;
        }

        // Work on a zero-based offset; oversize lifetimes clamp to the
        // furthest slot of the top level instead of erroring.
        let mut delta = lifetime.saturating_sub(1);
        if delta > self.max_lifetime {
            delta = self.max_lifetime;
        }

        // 1. Lowest level whose reach covers the offset
        let mut level = 0usize;
        while delta >= (self.bucket_mask << (level as u32 * self.granularity_bits)) {
            level += 1;
        }

        // 2. Slot on that level. The +1 keeps the timer out of the slot
        //    being expired this very tick.
        let shift = level as u32 * self.granularity_bits;
        let abs_index = ((self.current_tick + delta) >> shift) + 1;
        let slot = abs_index & self.bucket_mask;
        let bucket = self.bucket_index(level, slot);

        // 3. Unlink first, so rescheduling just moves the node
        self.arena.unlink(id.0);
        self.arena.insert_before(id.0, bucket);
        trace!(timer = id.0, lifetime, level, slot, "scheduled");
    }

    /// Unlinks the timer from its bucket; the registration stays. Returns
    /// whether it was scheduled. Cancelling an unscheduled or stale timer
    /// is a no-op, including from inside an expiry callback.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        if !self.arena.is_timer(id.0) || !self.arena.is_linked(id.0) {
            return false;
        }
        self.arena.unlink(id.0);
        trace!(timer = id.0, "cancelled");
        true
    }

    /// Advances time by one tick, firing every timer that comes due.
    /// Returns the number fired.
    pub fn tick<F>(&mut self, on_expire: F) -> usize
    where
        F: FnMut(&mut Self, TimerId),
    {
        self.tick_with_limit(usize::MAX, on_expire)
    }

    /// Core tick algorithm: one time step, at most `limit` expirations.
    ///
    /// The counter advances first, then the current bucket of level 0 is
    /// drained into a private list and fired in insertion order. While the
    /// tick sits on a rollover boundary the walk climbs a level and expires
    /// that level's current bucket too; slot selection already encoded each
    /// timer's target tick, so cascaded timers fire right here instead of
    /// being re-homed into lower levels. Draining before firing is what
    /// lets a callback reschedule its timer anywhere, including the bucket
    /// it just came from.
    ///
    /// When the limit cuts expiry short, the leftovers are spliced onto the
    /// bucket the next tick expires, so they fire first thing next tick.
    ///
    /// The callback runs with the wheel in a consistent state: the counter
    /// already advanced and the fired timer unlinked. It may schedule,
    /// cancel, register and remove timers freely, itself included. It must
    /// not drive the wheel recursively.
    pub fn tick_with_limit<F>(&mut self, limit: usize, mut on_expire: F) -> usize
    where
        F: FnMut(&mut Self, TimerId),
    {
        debug_assert!(
            self.arena.is_empty_list(self.pending),
            "tick re-entered from an expiry callback"
        );
        let cur = self.current_tick;
        // Advance up front: callbacks that reschedule see the new now
        self.current_tick += 1;

        let mut fired = 0;
        let mut level = 0usize;
        let mut shifted = cur;
        loop {
            let bucket = self.bucket_index(level, shifted & self.bucket_mask);

            // Steal the whole bucket before firing anything from it
            self.arena.splice_before(bucket, self.pending);

            while fired < limit {
                let Some(idx) = self.arena.pop_front(self.pending) else {
                    break;
                };
                fired += 1;
                on_expire(self, TimerId(idx));
            }

            if !self.arena.is_empty_list(self.pending) {
                // Limit hit: everything left fires first on the next tick
                let carry = self.bucket_index(0, self.current_tick & self.bucket_mask);
                trace!(level, "expiry limit reached, carrying leftovers");
                self.arena.splice_after(self.pending, carry);
            }

            // Climb while this level just rolled over
            if shifted & self.granularity_mask != 0 {
                break;
            }
            shifted >>= self.granularity_bits;
            level += 1;
            if level == self.levels {
                break;
            }
        }
        fired
    }

    /// Runs `n` consecutive ticks. Returns the total number fired.
    pub fn tick_many<F>(&mut self, n: u64, mut on_expire: F) -> usize
    where
        F: FnMut(&mut Self, TimerId),
    {
        let mut fired = 0;
        for _ in 0..n {
            fired += self.tick_with_limit(usize::MAX, &mut on_expire);
        }
        fired
    }

    /// Runs up to `n` ticks with a cumulative cap on expirations. Stops
    /// ticking early once the cap is spent; anything left over stays
    /// carried for later ticks.
    pub fn tick_many_with_limit<F>(&mut self, n: u64, limit: usize, mut on_expire: F) -> usize
    where
        F: FnMut(&mut Self, TimerId),
    {
        let mut fired = 0;
        for _ in 0..n {
            if fired >= limit {
                break;
            }
            fired += self.tick_with_limit(limit - fired, &mut on_expire);
        }
        fired
    }

    fn bucket_index(&self, level: usize, slot: u64) -> usize {
        (level << self.bucket_bits) | slot as usize
    }

    /// Checks every bucket ring plus the drain sentinel.
    #[cfg(test)]
    fn check_rings(&self) {
        for head in 0..(self.levels << self.bucket_bits) {
            self.arena.assert_ring(head);
        }
        assert_eq!(self.arena.assert_ring(self.pending), 0);
    }
}

impl<T> Default for TimingWheel<T> {
    fn default() -> Self {
        Self::new()
    }
}
