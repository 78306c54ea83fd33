use std::cell::RefCell;
use std::ops::Index;
use std::rc::Rc;

use crate::protocol::{ProtocolRef, protocol_eq};

/// Identity of the remote half of an entangled pair.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntangledInfo {
    pub node_id: Option<String>,
    pub memo_id: Option<String>,
}

/// Subscriber to a memory's state-change notifications.
#[derive(Clone)]
pub enum Observer {
    /// The owning memory array.
    Array,
    Protocol(ProtocolRef),
}

/// A quantum memory as the simulator sees it: a name, the fidelity and
/// remote identity written by whichever protocol entangled it, and a
/// subscription set. Physics (decoherence curves, gate application) lives
/// outside the simulator.
pub struct Memory {
    name: String,
    pub fidelity: f64,
    pub entangled_memory: EntangledInfo,
    observers: Vec<Observer>,
}

pub type MemoryRef = Rc<RefCell<Memory>>;

impl Memory {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fidelity: 0.0,
            entangled_memory: EntangledInfo::default(),
            observers: vec![Observer::Array],
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Subscribe a protocol; attaching twice is a no-op.
    pub fn attach(&mut self, protocol: ProtocolRef) {
        let present = self
            .observers
            .iter()
            .any(|o| matches!(o, Observer::Protocol(p) if protocol_eq(p, &protocol)));
        if !present {
            self.observers.push(Observer::Protocol(protocol));
        }
    }

    pub fn detach(&mut self, protocol: &ProtocolRef) {
        self.observers
            .retain(|o| !matches!(o, Observer::Protocol(p) if protocol_eq(p, protocol)));
    }

    pub fn attach_array(&mut self) {
        if !self.observers.iter().any(|o| matches!(o, Observer::Array)) {
            self.observers.push(Observer::Array);
        }
    }

    pub fn detach_array(&mut self) {
        self.observers.retain(|o| !matches!(o, Observer::Array));
    }

    pub fn observers(&self) -> &[Observer] {
        &self.observers
    }

    pub fn clear_entanglement(&mut self) {
        self.entangled_memory = EntangledInfo::default();
    }
}

/// Named, indexable pool of shared memory handles. Memory `i` is named
/// `"{array}[{i}]"`.
pub struct MemoryArray {
    name: String,
    memories: Vec<MemoryRef>,
}

impl MemoryArray {
    pub fn new(name: impl Into<String>, count: usize) -> Self {
        let name = name.into();
        let memories = (0..count)
            .map(|i| Rc::new(RefCell::new(Memory::new(format!("{name}[{i}]")))))
            .collect();
        Self { name, memories }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn len(&self) -> usize {
        self.memories.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memories.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryRef> {
        self.memories.iter()
    }
}

impl Index<usize> for MemoryArray {
    type Output = MemoryRef;

    fn index(&self, index: usize) -> &MemoryRef {
        &self.memories[index]
    }
}
