use std::any::Any;
use std::collections::HashMap;

use tracing::{debug, warn};

use qnet_abstract::{MemoryArray, MemoryRef, Message, MessageBody, ProtocolRef, RESOURCE_MANAGER};

use crate::entity::{Entity, EntityId};
use crate::event::Op;
use crate::photon::Photon;
use crate::resource::{MemoryInfo, MemoryState, ResourceManager, Rule};
use crate::timeline::SimContext;

use qnet_abstract::RuleId;

type IdleMemoryHook = Box<dyn FnMut(&MemoryInfo)>;

/// A network node: a pool of quantum memories, the resource manager that
/// coordinates them, the protocols currently running, and the channels wired
/// to peers.
pub struct Node {
    name: String,
    qchannels: HashMap<String, EntityId>,
    cchannels: HashMap<String, EntityId>,
    pub memory_array: MemoryArray,
    pub resource_manager: ResourceManager,
    pub protocols: Vec<ProtocolRef>,
    received_qubits: Vec<(u64, String, Photon)>,
    idle_memory_hook: Option<IdleMemoryHook>,
}

impl Node {
    pub fn new(name: impl Into<String>, num_memories: usize) -> Self {
        let name = name.into();
        let memory_array = MemoryArray::new(format!("{name}.memory_array"), num_memories);
        let resource_manager = ResourceManager::new(&memory_array);
        Self {
            name,
            qchannels: HashMap::new(),
            cchannels: HashMap::new(),
            memory_array,
            resource_manager,
            protocols: Vec::new(),
            received_qubits: Vec::new(),
            idle_memory_hook: None,
        }
    }

    pub fn assign_qchannel(&mut self, channel: EntityId, peer: &str) {
        self.qchannels.insert(peer.to_string(), channel);
    }

    pub fn assign_cchannel(&mut self, channel: EntityId, peer: &str) {
        self.cchannels.insert(peer.to_string(), channel);
    }

    pub(crate) fn qchannel(&self, peer: &str) -> Option<EntityId> {
        self.qchannels.get(peer).copied()
    }

    pub(crate) fn cchannel(&self, peer: &str) -> Option<EntityId> {
        self.cchannels.get(peer).copied()
    }

    /// Hook invoked when a memory returns to RAW with no rule claiming it.
    pub fn set_idle_memory_hook(&mut self, hook: impl FnMut(&MemoryInfo) + 'static) {
        self.idle_memory_hook = Some(Box::new(hook));
    }

    /// Qubit arrivals as `(time, source node, photon)`.
    pub fn received_qubits(&self) -> &[(u64, String, Photon)] {
        &self.received_qubits
    }

    /// Install a rule and evaluate it against the whole memory pool.
    pub fn load_rule(&mut self, rule: Rule, ctx: &mut SimContext<'_>) -> RuleId {
        self.resource_manager.load(rule, &self.name, ctx)
    }

    /// Report a memory state change, e.g. from a protocol that just
    /// entangled or released it.
    pub fn update_memory(
        &mut self,
        protocol: Option<&ProtocolRef>,
        memory: &MemoryRef,
        state: MemoryState,
        ctx: &mut SimContext<'_>,
    ) {
        let idle = {
            let Node {
                name,
                resource_manager,
                protocols,
                ..
            } = self;
            resource_manager.update(protocol, memory, state, name, protocols, ctx)
        };
        if let Some(info) = idle {
            self.get_idle_memory(&info);
        }
    }

    /// Hand a message to the classical channel toward `dst`.
    pub fn send_message(
        &self,
        ctx: &mut SimContext<'_>,
        dst: impl Into<String>,
        message: Message,
        priority: u64,
    ) {
        ctx.send_message(dst, message, priority);
    }

    /// Hand a qubit to the quantum channel toward `dst`.
    pub fn send_qubit(&self, ctx: &mut SimContext<'_>, dst: impl Into<String>, qubit: Photon) {
        ctx.send_qubit(dst, qubit);
    }

    fn get_idle_memory(&mut self, info: &MemoryInfo) {
        debug!(
            "node `{}`: memory `{}` is idle",
            self.name,
            info.memory.borrow().name()
        );
        if let Some(hook) = self.idle_memory_hook.as_mut() {
            hook(info);
        }
    }

    fn receive_qubit(&mut self, src: &str, qubit: Photon, now: u64) {
        debug!("node `{}`: qubit from `{src}` at {now} ps", self.name);
        self.received_qubits.push((now, src.to_string(), qubit));
    }

    fn receive_message(&mut self, src: &str, message: Message, ctx: &mut SimContext<'_>) {
        match message.receiver.as_deref() {
            Some(RESOURCE_MANAGER) => {
                let MessageBody::ResourceManager(payload) = message.body else {
                    warn!(
                        "node `{}`: resource-manager message with a protocol payload",
                        self.name
                    );
                    return;
                };
                let idle = {
                    let Node {
                        name,
                        resource_manager,
                        protocols,
                        ..
                    } = self;
                    resource_manager.received_message(src, payload, name, protocols, ctx)
                };
                for info in idle {
                    self.get_idle_memory(&info);
                }
            }
            Some(receiver) => {
                let target = self
                    .protocols
                    .iter()
                    .find(|p| p.borrow().name() == receiver)
                    .cloned();
                match target {
                    Some(protocol) => protocol.borrow_mut().received_message(src, message),
                    None => debug!("node `{}`: no protocol named `{receiver}`", self.name),
                }
            }
            None => {
                let kind = message.protocol_kind.clone().unwrap_or_default();
                let matching: Vec<ProtocolRef> = self
                    .protocols
                    .iter()
                    .filter(|p| p.borrow().kind() == kind)
                    .cloned()
                    .collect();
                if matching.is_empty() {
                    debug!("node `{}`: no `{kind}` protocol for broadcast", self.name);
                }
                for protocol in matching {
                    protocol.borrow_mut().received_message(src, message.clone());
                }
            }
        }
    }
}

impl Entity for Node {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&mut self, op: Op, ctx: &mut SimContext<'_>) {
        match op {
            Op::ReceiveQubit { src, qubit } => self.receive_qubit(&src, qubit, ctx.now()),
            Op::ReceiveMessage { src, message } => self.receive_message(&src, message, ctx),
            Op::SendQubit { dst, qubit } => self.send_qubit(ctx, dst, qubit),
            Op::ExpireRule { rule } => {
                let idle = {
                    let Node {
                        name,
                        resource_manager,
                        protocols,
                        ..
                    } = self;
                    resource_manager.expire(rule, name, protocols, ctx)
                };
                for info in idle {
                    self.get_idle_memory(&info);
                }
            }
        }
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
