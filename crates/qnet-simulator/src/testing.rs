//! Test doubles shared across kernel and resource-management tests.

use std::any::Any;
use std::cell::RefCell;
use std::rc::Rc;

use qnet_abstract::{MemoryRef, Message, MessageBody, Protocol, ProtocolRef, RuleId};

use crate::entity::Entity;
use crate::event::Op;
use crate::timeline::SimContext;

/// Probe message carrying a string tag, addressed to a protocol named
/// `probe` (which usually does not exist; routing tests only need delivery).
pub(crate) fn probe(tag: &str) -> Message {
    Message::to_protocol("probe", Rc::new(tag.to_string()))
}

/// Minimal protocol that records everything done to it.
pub(crate) struct FakeProtocol {
    name: String,
    owner: Option<String>,
    rule: Option<RuleId>,
    pub memories: Vec<MemoryRef>,
    pub others: Vec<ProtocolRef>,
    pub started: bool,
    pub released: bool,
    pub inbox: Vec<(String, String)>,
}

impl FakeProtocol {
    pub fn new(name: &str) -> Rc<RefCell<Self>> {
        Self::with_memories(name, Vec::new())
    }

    pub fn with_memories(name: &str, memories: Vec<MemoryRef>) -> Rc<RefCell<Self>> {
        Rc::new(RefCell::new(Self {
            name: name.to_string(),
            owner: None,
            rule: None,
            memories,
            others: Vec::new(),
            started: false,
            released: false,
            inbox: Vec::new(),
        }))
    }

    pub fn owner_name(&self) -> Option<&str> {
        self.owner.as_deref()
    }
}

/// Unsize a concrete fake into the shared protocol handle.
pub(crate) fn as_protocol(protocol: &Rc<RefCell<FakeProtocol>>) -> ProtocolRef {
    protocol.clone()
}

impl Protocol for FakeProtocol {
    fn name(&self) -> &str {
        &self.name
    }

    fn kind(&self) -> &'static str {
        "fake"
    }

    fn owner(&self) -> Option<&str> {
        self.owner.as_deref()
    }

    fn set_owner(&mut self, node: &str) {
        self.owner = Some(node.to_string());
    }

    fn rule_id(&self) -> Option<RuleId> {
        self.rule
    }

    fn set_rule_id(&mut self, rule: Option<RuleId>) {
        self.rule = rule;
    }

    fn memories(&self) -> Vec<MemoryRef> {
        self.memories.clone()
    }

    fn is_ready(&self) -> bool {
        !self.others.is_empty()
    }

    fn set_others(&mut self, other: ProtocolRef) {
        self.others.push(other);
    }

    fn others(&self) -> Vec<ProtocolRef> {
        self.others.clone()
    }

    fn start(&mut self) {
        self.started = true;
    }

    fn received_message(&mut self, src: &str, message: Message) {
        let tag = match &message.body {
            MessageBody::Protocol(payload) => payload
                .downcast_ref::<String>()
                .cloned()
                .unwrap_or_default(),
            MessageBody::ResourceManager(_) => String::new(),
        };
        self.inbox.push((src.to_string(), tag));
    }

    fn release(&mut self) {
        self.released = true;
    }
}

/// Entity that records every operation dispatched to it as `(time, tag)`.
pub(crate) struct Recorder {
    name: String,
    pub log: Rc<RefCell<Vec<(u64, String)>>>,
    pub stop_on: Option<String>,
}

impl Recorder {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            log: Rc::new(RefCell::new(Vec::new())),
            stop_on: None,
        }
    }
}

impl Entity for Recorder {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, ctx: &mut SimContext<'_>) {
        self.log.borrow_mut().push((ctx.now(), "init".to_string()));
    }

    fn handle(&mut self, op: Op, ctx: &mut SimContext<'_>) {
        let tag = match op {
            Op::ReceiveMessage { src, .. } => src,
            Op::ReceiveQubit { src, .. } => src,
            Op::SendQubit { dst, .. } => dst,
            Op::ExpireRule { rule } => format!("expire:{}", rule.0),
        };
        if self.stop_on.as_deref() == Some(tag.as_str()) {
            ctx.stop();
        }
        self.log.borrow_mut().push((ctx.now(), tag));
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}
