use std::ops::Index;
use std::rc::Rc;

use qnet_abstract::{MemoryArray, MemoryRef};

/// A memory's state from the resource manager's perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryState {
    Raw,
    Occupied,
    Entangled,
}

/// The resource manager's view of one quantum memory.
#[derive(Clone)]
pub struct MemoryInfo {
    pub memory: MemoryRef,
    pub index: usize,
    pub state: MemoryState,
    pub remote_node: Option<String>,
    pub remote_memo: Option<String>,
    pub fidelity: f64,
}

/// State view over a node's memory array, indexable by position or name.
pub struct MemoryManager {
    infos: Vec<MemoryInfo>,
}

impl MemoryManager {
    pub(crate) fn new(array: &MemoryArray) -> Self {
        let infos = array
            .iter()
            .enumerate()
            .map(|(index, memory)| MemoryInfo {
                memory: memory.clone(),
                index,
                state: MemoryState::Raw,
                remote_node: None,
                remote_memo: None,
                fidelity: 0.0,
            })
            .collect();
        Self { infos }
    }

    pub fn len(&self) -> usize {
        self.infos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    pub fn get_by_name(&self, name: &str) -> Option<&MemoryInfo> {
        self.infos.iter().find(|i| i.memory.borrow().name() == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &MemoryInfo> {
        self.infos.iter()
    }

    pub(crate) fn index_of(&self, memory: &MemoryRef) -> Option<usize> {
        self.infos.iter().position(|i| Rc::ptr_eq(&i.memory, memory))
    }

    /// Apply a state change reported for `memory`.
    pub(crate) fn update(&mut self, memory: &MemoryRef, state: MemoryState) {
        let index = self.index_of(memory).unwrap_or_else(|| {
            panic!("memory `{}` is not managed here", memory.borrow().name())
        });
        match state {
            MemoryState::Raw => self.to_raw(index),
            MemoryState::Occupied => self.to_occupied(index),
            MemoryState::Entangled => self.to_entangled(index),
        }
    }

    pub(crate) fn to_raw(&mut self, index: usize) {
        let info = &mut self.infos[index];
        info.state = MemoryState::Raw;
        info.fidelity = 0.0;
        info.remote_node = None;
        info.remote_memo = None;
        info.memory.borrow_mut().clear_entanglement();
    }

    pub(crate) fn to_occupied(&mut self, index: usize) {
        self.infos[index].state = MemoryState::Occupied;
    }

    pub(crate) fn to_entangled(&mut self, index: usize) {
        let (fidelity, node_id, memo_id) = {
            let memory = self.infos[index].memory.borrow();
            assert!(
                memory.entangled_memory.node_id.is_some() && memory.fidelity > 0.0,
                "memory `{}` marked entangled without a remote pair",
                memory.name()
            );
            (
                memory.fidelity,
                memory.entangled_memory.node_id.clone(),
                memory.entangled_memory.memo_id.clone(),
            )
        };
        let info = &mut self.infos[index];
        info.state = MemoryState::Entangled;
        info.fidelity = fidelity;
        info.remote_node = node_id;
        info.remote_memo = memo_id;
    }
}

impl Index<usize> for MemoryManager {
    type Output = MemoryInfo;

    fn index(&self, index: usize) -> &MemoryInfo {
        &self.infos[index]
    }
}
