use std::cmp::Ordering;

use qnet_abstract::{Message, RuleId};

use crate::entity::EntityId;
use crate::photon::Photon;

/// Priority assigned when the caller does not care; sorts after every
/// explicit priority.
pub const DEFAULT_PRIORITY: u64 = u64::MAX;

/// Identifier handed back by `schedule`, usable for lazy cancellation via
/// `remove_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EventId(pub(crate) u64);

/// The finite set of operations that can be deferred onto an entity.
#[derive(Debug)]
pub enum Op {
    ReceiveQubit { src: String, qubit: Photon },
    ReceiveMessage { src: String, message: Message },
    SendQubit { dst: String, qubit: Photon },
    ExpireRule { rule: RuleId },
}

/// A deferred invocation of an operation on an owning entity.
#[derive(Debug)]
pub struct Process {
    pub target: EntityId,
    pub op: Op,
}

impl Process {
    pub fn new(target: EntityId, op: Op) -> Self {
        Self { target, op }
    }
}

/// A process bound to a firing time and a priority. `seq` is assigned at
/// schedule time and preserves insertion order for equal `(time, priority)`.
#[derive(Debug)]
pub struct Event {
    pub time: u64,
    pub priority: u64,
    pub(crate) seq: u64,
    pub process: Process,
}

impl Event {
    pub fn new(time: u64, process: Process) -> Self {
        Self {
            time,
            priority: DEFAULT_PRIORITY,
            seq: 0,
            process,
        }
    }

    pub fn with_priority(time: u64, priority: u64, process: Process) -> Self {
        Self {
            time,
            priority,
            seq: 0,
            process,
        }
    }

    fn key(&self) -> (u64, u64, u64) {
        (self.time, self.priority, self.seq)
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.key() == other.key()
    }
}

impl Eq for Event {}

impl PartialOrd for Event {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Event {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reverse comparison: the smallest (time, priority, seq) is the
        // greatest in the BinaryHeap.
        other.key().cmp(&self.key())
    }
}
