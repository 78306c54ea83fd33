use std::any::Any;

use crate::event::Op;
use crate::timeline::SimContext;

/// Handle to an entity registered with a [`crate::Timeline`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntityId(pub(crate) usize);

impl EntityId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A named simulated object registered with a Timeline. Entities are the
/// only legal targets of scheduled processes; cross-entity interaction from
/// inside a handler goes through the context's buffered sends.
pub trait Entity: Any {
    fn name(&self) -> &str;

    /// Invoked exactly once by `Timeline::init`, in registration order.
    fn init(&mut self, _ctx: &mut SimContext<'_>) {}

    /// Execute a deferred operation at its scheduled time.
    fn handle(&mut self, op: Op, ctx: &mut SimContext<'_>);

    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}
