//! The clock and the single event queue.
//!
//! Wake-ups are processed in non-decreasing time order; ties are broken by
//! insertion order through a monotone sequence number. All engine behavior
//! hangs off the closed [`Wake`] continuation set, which keeps dispatch
//! deterministic and replayable.

use crate::sim::{ExecId, PortIx, ProductId, ResIx, SinkIx, SrcIx, StateIx};
use hifitime::Duration;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A continuation target. Every suspension point in the engine resumes by
/// scheduling one of these.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub(crate) enum Wake {
    /// A source's next arrival (or a retry after a blocked put).
    SourceTick(SrcIx),
    /// An order source releasing one order.
    OrderRelease { source: SrcIx, order: usize },
    /// Re-evaluate a controller's pending list.
    ControllerPoll(ResIx),
    /// An execution's current phase elapsed. Stale generations are ignored.
    ExecAdvance { exec: ExecId, generation: u32 },
    /// A breakdown or process-breakdown fires on a resource.
    BreakdownOnset { resource: ResIx, state: StateIx },
    /// Repair of a (process-)breakdown completes.
    BreakdownRepair { resource: ResIx, state: StateIx },
    /// Shift calendar boundary.
    ShiftToggle {
        resource: ResIx,
        state: StateIx,
        to_available: bool,
    },
    /// Battery charging completes.
    ChargingDone { resource: ResIx, state: StateIx },
    /// The router plans the next step of a product.
    RouterPlan(ProductId),
    /// A pinned schedule entry fires.
    ScheduleFire(usize),
    /// A sink drains its input queue.
    SinkTake(SinkIx, PortIx),
}

#[derive(Debug)]
struct Scheduled {
    time: Duration,
    seq: u64,
    wake: Wake,
}

impl PartialEq for Scheduled {
    fn eq(&self, other: &Self) -> bool {
        self.time == other.time && self.seq == other.seq
    }
}

impl Eq for Scheduled {}

impl PartialOrd for Scheduled {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Scheduled {
    // Inverted so the std max-heap pops the earliest (time, seq) first.
    fn cmp(&self, other: &Self) -> Ordering {
        (other.time, other.seq).cmp(&(self.time, self.seq))
    }
}

/// Current simulated time plus the ordered queue of scheduled wake-ups.
#[derive(Debug, Default)]
pub(crate) struct Clock {
    now: Duration,
    heap: BinaryHeap<Scheduled>,
    seq: u64,
}

impl Clock {
    pub fn now(&self) -> Duration {
        self.now
    }

    /// Monotone insertion counter; doubles as the arrival stamp on requests.
    pub fn next_seq(&mut self) -> u64 {
        let seq = self.seq;
        self.seq += 1;
        seq
    }

    pub fn schedule_at(&mut self, time: Duration, wake: Wake) {
        debug_assert!(time >= self.now);
        let seq = self.next_seq();
        self.heap.push(Scheduled { time, seq, wake });
    }

    pub fn schedule_in(&mut self, delta: Duration, wake: Wake) {
        self.schedule_at(self.now + delta, wake);
    }

    /// Schedule at the current instant, behind everything already queued
    /// for this instant.
    pub fn schedule_now(&mut self, wake: Wake) {
        self.schedule_at(self.now, wake);
    }

    /// Pops the next wake-up at or before `deadline`, advancing the clock.
    /// `None` means the run segment is over: either the queue is empty or
    /// only events beyond the deadline remain (the clock then rests at the
    /// deadline).
    pub fn pop_next(&mut self, deadline: Duration) -> Option<Wake> {
        match self.heap.peek().map(|s| s.time) {
            Some(time) if time <= deadline => {
                let scheduled = self.heap.pop().unwrap();
                self.now = scheduled.time;
                Some(scheduled.wake)
            }
            Some(_) => {
                self.now = deadline;
                None
            }
            None => None,
        }
    }

    /// Whether any wake-up (at any time) is still pending.
    pub fn has_pending(&self) -> bool {
        !self.heap.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::seconds;

    #[test]
    fn pops_in_time_order() {
        let mut clock = Clock::default();
        clock.schedule_at(seconds(2.0), Wake::SourceTick(SrcIx(2)));
        clock.schedule_at(seconds(1.0), Wake::SourceTick(SrcIx(1)));
        clock.schedule_at(seconds(3.0), Wake::SourceTick(SrcIx(3)));

        assert_eq!(clock.pop_next(seconds(10.0)), Some(Wake::SourceTick(SrcIx(1))));
        assert_eq!(clock.now(), seconds(1.0));
        assert_eq!(clock.pop_next(seconds(10.0)), Some(Wake::SourceTick(SrcIx(2))));
        assert_eq!(clock.pop_next(seconds(10.0)), Some(Wake::SourceTick(SrcIx(3))));
        assert_eq!(clock.pop_next(seconds(10.0)), None);
    }

    #[test]
    fn ties_break_by_insertion_order() {
        let mut clock = Clock::default();
        for i in 0..4 {
            clock.schedule_at(seconds(5.0), Wake::SourceTick(SrcIx(i)));
        }
        for i in 0..4 {
            assert_eq!(clock.pop_next(seconds(10.0)), Some(Wake::SourceTick(SrcIx(i))));
        }
    }

    #[test]
    fn deadline_halts_before_future_events() {
        let mut clock = Clock::default();
        clock.schedule_at(seconds(100.0), Wake::SourceTick(SrcIx(0)));
        assert_eq!(clock.pop_next(seconds(50.0)), None);
        assert_eq!(clock.now(), seconds(50.0));
        assert!(clock.has_pending());
    }
}
