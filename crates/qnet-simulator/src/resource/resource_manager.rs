use tracing::{debug, info, warn};

use qnet_abstract::{
    MemoryArray, MemoryRef, Message, ProtocolRef, ReqConditionFn, ResourceManagerMessage, RuleId,
    protocol_eq,
};

use super::memory_manager::{MemoryInfo, MemoryManager, MemoryState};
use super::rule_manager::{Rule, RuleManager};
use crate::event::DEFAULT_PRIORITY;
use crate::timeline::SimContext;

/// A protocol awaiting the remote peer's RESPONSE, with the destinations its
/// REQUESTs went to.
struct PendingRequest {
    protocol: ProtocolRef,
    req_dsts: Vec<String>,
}

/// Per-node coordinator between rules, protocols and the memory pool.
///
/// A protocol created by a rule action lives in exactly one place: the
/// waiting list (no remote counterpart yet), the pending list (REQUEST sent,
/// RESPONSE outstanding) or the node's running list. Its memories stay
/// OCCUPIED for as long as it lives and return to RAW when it is released.
pub struct ResourceManager {
    memory_manager: MemoryManager,
    rule_manager: RuleManager,
    pending: Vec<PendingRequest>,
    waiting: Vec<ProtocolRef>,
}

impl ResourceManager {
    pub fn new(memory_array: &MemoryArray) -> Self {
        Self {
            memory_manager: MemoryManager::new(memory_array),
            rule_manager: RuleManager::new(),
            pending: Vec::new(),
            waiting: Vec::new(),
        }
    }

    pub fn memory_manager(&self) -> &MemoryManager {
        &self.memory_manager
    }

    pub fn rule_manager(&self) -> &RuleManager {
        &self.rule_manager
    }

    pub fn waiting_protocols(&self) -> &[ProtocolRef] {
        &self.waiting
    }

    pub fn pending_protocols(&self) -> impl Iterator<Item = &ProtocolRef> {
        self.pending.iter().map(|entry| &entry.protocol)
    }

    pub(crate) fn memory_manager_mut(&mut self) -> &mut MemoryManager {
        &mut self.memory_manager
    }

    pub(crate) fn rule_manager_mut(&mut self) -> &mut RuleManager {
        &mut self.rule_manager
    }

    /// Install a rule and evaluate it against every memory.
    pub fn load(&mut self, rule: Rule, node: &str, ctx: &mut SimContext<'_>) -> RuleId {
        let id = self.rule_manager.load(rule);
        info!("node `{node}`: loaded rule {id:?}");
        for index in 0..self.memory_manager.len() {
            let matches = self.evaluate(id, index);
            if !matches.is_empty() {
                self.bind(id, &matches, node, ctx);
            }
        }
        id
    }

    fn evaluate(&self, rule: RuleId, index: usize) -> Vec<MemoryInfo> {
        let rule = self.rule_manager.get(rule).expect("loaded rule");
        (rule.condition)(&self.memory_manager[index], &self.memory_manager)
    }

    /// Run a matched rule's action and bind the protocol it creates.
    fn bind(&mut self, rule: RuleId, matches: &[MemoryInfo], node: &str, ctx: &mut SimContext<'_>) {
        let action = {
            let rule = self.rule_manager.get(rule).expect("loaded rule");
            (rule.action)(matches)
        };
        {
            let mut protocol = action.protocol.borrow_mut();
            protocol.set_rule_id(Some(rule));
            protocol.set_owner(node);
        }
        self.rule_manager
            .get_mut(rule)
            .expect("loaded rule")
            .protocols
            .push(action.protocol.clone());
        for matched in matches {
            matched.memory.borrow_mut().attach(action.protocol.clone());
            self.memory_manager.to_occupied(matched.index);
        }
        for (dst, condition) in action.req_dsts.into_iter().zip(action.req_conditions) {
            self.send_request(action.protocol.clone(), dst.as_deref(), condition, node, ctx);
        }
    }

    /// Queue the protocol locally or request a remote counterpart.
    pub fn send_request(
        &mut self,
        protocol: ProtocolRef,
        req_dst: Option<&str>,
        req_condition: Option<ReqConditionFn>,
        node: &str,
        ctx: &mut SimContext<'_>,
    ) {
        protocol.borrow_mut().set_owner(node);
        let Some(dst) = req_dst else {
            if !self.waiting.iter().any(|p| protocol_eq(p, &protocol)) {
                self.waiting.push(protocol);
            }
            return;
        };
        let condition = req_condition.unwrap_or_else(|| {
            panic!("remote request from `{node}` to `{dst}` without a pairing condition")
        });
        match self
            .pending
            .iter_mut()
            .find(|entry| protocol_eq(&entry.protocol, &protocol))
        {
            Some(entry) => entry.req_dsts.push(dst.to_string()),
            None => self.pending.push(PendingRequest {
                protocol: protocol.clone(),
                req_dsts: vec![dst.to_string()],
            }),
        }
        debug!("node `{node}`: requesting a counterpart on `{dst}`");
        ctx.send_message(dst, Message::request(protocol, condition), DEFAULT_PRIORITY);
    }

    /// Handle the pairing handshake. Returns the memories that went idle so
    /// the node can run its idle-memory hook.
    pub fn received_message(
        &mut self,
        src: &str,
        msg: ResourceManagerMessage,
        node: &str,
        node_protocols: &mut Vec<ProtocolRef>,
        ctx: &mut SimContext<'_>,
    ) -> Vec<MemoryInfo> {
        match msg {
            ResourceManagerMessage::Request {
                protocol,
                req_condition,
            } => {
                self.handle_request(src, protocol, req_condition, node, node_protocols, ctx);
                Vec::new()
            }
            ResourceManagerMessage::Response {
                protocol,
                is_approved,
                paired_protocol,
            } => self.handle_response(
                src,
                protocol,
                is_approved,
                paired_protocol,
                node,
                node_protocols,
                ctx,
            ),
        }
    }

    fn handle_request(
        &mut self,
        src: &str,
        ini_protocol: ProtocolRef,
        req_condition: ReqConditionFn,
        node: &str,
        node_protocols: &mut Vec<ProtocolRef>,
        ctx: &mut SimContext<'_>,
    ) {
        let Some(paired) = (req_condition)(&self.waiting) else {
            debug!("node `{node}`: no waiting counterpart for `{src}`");
            ctx.send_message(src, Message::response(ini_protocol, false, None), DEFAULT_PRIORITY);
            return;
        };
        let position = self
            .waiting
            .iter()
            .position(|p| protocol_eq(p, &paired))
            .unwrap_or_else(|| {
                panic!("pairing condition from `{src}` chose a protocol that is not waiting on `{node}`")
            });
        self.waiting.remove(position);
        node_protocols.push(paired.clone());
        {
            let mut p = paired.borrow_mut();
            p.set_others(ini_protocol.clone());
            if p.is_ready() {
                p.start();
            }
        }
        info!(
            "node `{node}`: paired `{}` with a counterpart on `{src}`",
            paired.borrow().name()
        );
        ctx.send_message(
            src,
            Message::response(ini_protocol, true, Some(paired)),
            DEFAULT_PRIORITY,
        );
    }

    #[allow(clippy::too_many_arguments)]
    fn handle_response(
        &mut self,
        src: &str,
        protocol: ProtocolRef,
        is_approved: bool,
        paired_protocol: Option<ProtocolRef>,
        node: &str,
        node_protocols: &mut Vec<ProtocolRef>,
        ctx: &mut SimContext<'_>,
    ) -> Vec<MemoryInfo> {
        let position = self
            .pending
            .iter()
            .position(|entry| protocol_eq(&entry.protocol, &protocol));
        let Some(position) = position else {
            return if is_approved {
                warn!("node `{node}`: stale approval from `{src}` for an expired request");
                Vec::new()
            } else {
                self.handle_cancellation(src, &protocol, node, node_protocols, ctx)
            };
        };
        let entry = self.pending.remove(position);
        if is_approved {
            node_protocols.push(entry.protocol.clone());
            let mut p = entry.protocol.borrow_mut();
            if let Some(paired) = paired_protocol {
                p.set_others(paired);
            }
            if p.is_ready() {
                p.start();
            }
            info!(
                "node `{node}`: request to `{src}` approved, `{}` is running",
                p.name()
            );
            Vec::new()
        } else {
            debug!(
                "node `{node}`: request to `{src}` rejected, releasing `{}`",
                entry.protocol.borrow().name()
            );
            self.drop_protocol(&entry.protocol, node, node_protocols, ctx)
        }
    }

    /// The remote side expired a request this node already approved: tear
    /// down the protocol paired with it.
    fn handle_cancellation(
        &mut self,
        src: &str,
        ini_protocol: &ProtocolRef,
        node: &str,
        node_protocols: &mut Vec<ProtocolRef>,
        ctx: &mut SimContext<'_>,
    ) -> Vec<MemoryInfo> {
        let position = node_protocols.iter().position(|p| {
            p.borrow()
                .others()
                .iter()
                .any(|other| protocol_eq(other, ini_protocol))
        });
        let Some(position) = position else {
            debug!("node `{node}`: cancellation from `{src}` matched nothing");
            return Vec::new();
        };
        let protocol = node_protocols.remove(position);
        info!(
            "node `{node}`: `{src}` cancelled its request, releasing `{}`",
            protocol.borrow().name()
        );
        protocol.borrow_mut().release();
        self.drop_protocol(&protocol, node, node_protocols, ctx)
    }

    /// Unbind a protocol from its rule and drive its memories back to RAW,
    /// letting other rules rebind them.
    fn drop_protocol(
        &mut self,
        protocol: &ProtocolRef,
        node: &str,
        node_protocols: &mut Vec<ProtocolRef>,
        ctx: &mut SimContext<'_>,
    ) -> Vec<MemoryInfo> {
        let rule_id = protocol.borrow().rule_id();
        if let Some(rule_id) = rule_id
            && let Some(rule) = self.rule_manager.get_mut(rule_id)
        {
            rule.protocols.retain(|p| !protocol_eq(p, protocol));
        }
        let memories = protocol.borrow().memories();
        let mut idle = Vec::new();
        for memory in memories {
            memory.borrow_mut().detach(protocol);
            memory.borrow_mut().attach_array();
            if let Some(info) = self.update(None, &memory, MemoryState::Raw, node, node_protocols, ctx)
            {
                idle.push(info);
            }
        }
        idle
    }

    /// Apply a memory state change and re-evaluate the rules against it in
    /// priority order; the first match wins. Returns the idle `MemoryInfo`
    /// when no rule claims the memory.
    pub fn update(
        &mut self,
        protocol: Option<&ProtocolRef>,
        memory: &MemoryRef,
        state: MemoryState,
        node: &str,
        node_protocols: &mut Vec<ProtocolRef>,
        ctx: &mut SimContext<'_>,
    ) -> Option<MemoryInfo> {
        self.memory_manager.update(memory, state);
        if let Some(protocol) = protocol {
            memory.borrow_mut().detach(protocol);
            memory.borrow_mut().attach_array();
            let rule_id = protocol.borrow().rule_id();
            if let Some(rule_id) = rule_id
                && let Some(rule) = self.rule_manager.get_mut(rule_id)
            {
                rule.protocols.retain(|p| !protocol_eq(p, protocol));
            }
            node_protocols.retain(|p| !protocol_eq(p, protocol));
        }
        let index = self.memory_manager.index_of(memory).expect("managed memory");
        let rule_ids: Vec<RuleId> = self.rule_manager.iter().map(|r| r.id()).collect();
        for rule in rule_ids {
            let matches = self.evaluate(rule, index);
            if !matches.is_empty() {
                self.bind(rule, &matches, node, ctx);
                return None;
            }
        }
        Some(self.memory_manager[index].clone())
    }

    /// Dismantle a rule: its protocols leave whichever list they are in and
    /// their memories return to RAW. The rule is removed first so nothing
    /// rebinds to it; a pending protocol's destinations get a cancellation
    /// RESPONSE so their side is unpinned too.
    pub fn expire(
        &mut self,
        rule: RuleId,
        node: &str,
        node_protocols: &mut Vec<ProtocolRef>,
        ctx: &mut SimContext<'_>,
    ) -> Vec<MemoryInfo> {
        info!("node `{node}`: expiring rule {rule:?}");
        let protocols = self.rule_manager.expire(rule);
        let mut idle = Vec::new();
        for protocol in protocols {
            if let Some(position) = node_protocols.iter().position(|p| protocol_eq(p, &protocol)) {
                node_protocols.remove(position);
                protocol.borrow_mut().release();
            } else if let Some(position) =
                self.waiting.iter().position(|p| protocol_eq(p, &protocol))
            {
                self.waiting.remove(position);
            } else if let Some(position) = self
                .pending
                .iter()
                .position(|entry| protocol_eq(&entry.protocol, &protocol))
            {
                let entry = self.pending.remove(position);
                for dst in entry.req_dsts {
                    ctx.send_message(
                        dst,
                        Message::response(protocol.clone(), false, None),
                        DEFAULT_PRIORITY,
                    );
                }
            }
            let memories = protocol.borrow().memories();
            for memory in memories {
                memory.borrow_mut().detach(&protocol);
                memory.borrow_mut().attach_array();
                if let Some(info) =
                    self.update(None, &memory, MemoryState::Raw, node, node_protocols, ctx)
                {
                    idle.push(info);
                }
            }
        }
        idle
    }
}
