//! Scalar Lamport clock.

use lamport_proto::Timestamp;

/// Lamport clock for a single node.
///
/// Not synchronised internally; the owning engine is always accessed behind
/// one lock, which makes every tick and observe atomic.
///
/// The counter saturates at [`Timestamp::MAX`]. The wire decoder rejects
/// frames carrying that value and the engine drops such messages, so
/// `observe` stays strictly increasing for every accepted input.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LamportClock {
    value: Timestamp,
}

impl LamportClock {
    /// Clock at zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Current value.
    pub fn value(&self) -> Timestamp {
        self.value
    }

    /// Local event: advance by one and return the new value.
    pub fn tick(&mut self) -> Timestamp {
        self.value = self.value.next();
        self.value
    }

    /// Receive event: `max(local, remote) + 1`.
    ///
    /// The result is strictly greater than both the prior local value and
    /// `remote` as long as neither is [`Timestamp::MAX`].
    pub fn observe(&mut self, remote: Timestamp) -> Timestamp {
        self.value = self.value.max(remote).next();
        self.value
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn starts_at_zero() {
        assert_eq!(LamportClock::new().value(), Timestamp::ZERO);
    }

    #[test]
    fn tick_increments() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.tick(), Timestamp::new(1));
        assert_eq!(clock.tick(), Timestamp::new(2));
        assert_eq!(clock.value(), Timestamp::new(2));
    }

    #[test]
    fn observe_jumps_past_remote() {
        let mut clock = LamportClock::new();
        assert_eq!(clock.observe(Timestamp::new(10)), Timestamp::new(11));
    }

    #[test]
    fn observe_of_stale_remote_still_advances() {
        let mut clock = LamportClock::new();
        clock.observe(Timestamp::new(10));
        assert_eq!(clock.observe(Timestamp::new(3)), Timestamp::new(12));
    }

    #[derive(Debug, Clone)]
    enum ClockOp {
        Tick,
        Observe(u64),
    }

    fn clock_op() -> impl Strategy<Value = ClockOp> {
        prop_oneof![Just(ClockOp::Tick), (0u64..1_000).prop_map(ClockOp::Observe)]
    }

    proptest! {
        #[test]
        fn clock_is_strictly_monotonic(ops in proptest::collection::vec(clock_op(), 1..200)) {
            let mut clock = LamportClock::new();
            for op in ops {
                let before = clock.value();
                let after = match op {
                    ClockOp::Tick => clock.tick(),
                    ClockOp::Observe(remote) => {
                        let after = clock.observe(Timestamp::new(remote));
                        prop_assert!(after > Timestamp::new(remote));
                        after
                    },
                };
                prop_assert!(after > before);
                prop_assert_eq!(after, clock.value());
            }
        }
    }
}
