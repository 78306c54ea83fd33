use std::cell::RefCell;
use std::rc::Rc;

use crate::memory::MemoryRef;
use crate::message::Message;

/// Stable identity of a rule installed in a rule manager.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RuleId(pub u64);

/// The capability set the simulator expects from a protocol instance.
///
/// Concrete protocols (entanglement generation, purification, swapping, QKD
/// stacks) live outside the simulator; the resource manager drives them only
/// through this trait. Handles are shared, so the same instance can sit in a
/// rule's protocol list and travel inside REQUEST/RESPONSE messages.
pub trait Protocol {
    fn name(&self) -> &str;

    /// Type tag used to route broadcast messages (`receiver = None`).
    fn kind(&self) -> &'static str;

    fn owner(&self) -> Option<&str>;
    fn set_owner(&mut self, node: &str);

    fn rule_id(&self) -> Option<RuleId>;
    fn set_rule_id(&mut self, rule: Option<RuleId>);

    /// Memories this protocol holds while it is alive.
    fn memories(&self) -> Vec<MemoryRef>;

    /// True once the protocol has everything it needs to start.
    fn is_ready(&self) -> bool;

    /// Bind a remote counterpart handle.
    fn set_others(&mut self, other: ProtocolRef);

    /// Counterparts bound so far.
    fn others(&self) -> Vec<ProtocolRef>;

    fn start(&mut self);

    fn received_message(&mut self, src: &str, message: Message);

    /// Tear down a running instance when its rule expires.
    fn release(&mut self);
}

pub type ProtocolRef = Rc<RefCell<dyn Protocol>>;

/// Pointer identity for protocol handles. Compares data addresses only,
/// ignoring vtables.
pub fn protocol_eq(a: &ProtocolRef, b: &ProtocolRef) -> bool {
    std::ptr::addr_eq(Rc::as_ptr(a), Rc::as_ptr(b))
}
