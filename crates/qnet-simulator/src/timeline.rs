use std::collections::{BinaryHeap, HashMap, HashSet};

use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::debug;

use qnet_abstract::{Message, SimConfig};

use crate::channel::{ClassicalChannel, QuantumChannel};
use crate::entity::{Entity, EntityId};
use crate::event::{Event, EventId, Op, Process};
use crate::node::Node;
use crate::photon::Photon;

/// Queue, clock and RNG, split from the entity store so event handlers can
/// reach them while their entity is mutably borrowed.
pub(crate) struct Scheduler {
    now: u64,
    horizon: u64,
    queue: BinaryHeap<Event>,
    next_seq: u64,
    executed: u64,
    removed: HashSet<EventId>,
    pub(crate) rng: StdRng,
}

impl Scheduler {
    fn new(seed: u64, horizon: u64) -> Self {
        Self {
            now: 0,
            horizon,
            queue: BinaryHeap::new(),
            next_seq: 0,
            executed: 0,
            removed: HashSet::new(),
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub(crate) fn now(&self) -> u64 {
        self.now
    }

    pub(crate) fn schedule(&mut self, mut event: Event) -> EventId {
        assert!(
            event.time >= self.now,
            "cannot schedule an event at {} ps: simulation time is already {} ps",
            event.time,
            self.now
        );
        event.seq = self.next_seq;
        self.next_seq += 1;
        let id = EventId(event.seq);
        self.queue.push(event);
        id
    }

    fn remove_event(&mut self, id: EventId) {
        self.removed.insert(id);
    }

    /// Next live event before the horizon, with the clock advanced onto it.
    fn pop_next(&mut self) -> Option<Event> {
        loop {
            let next_time = self.queue.peek()?.time;
            if next_time >= self.horizon {
                return None;
            }
            let event = self.queue.pop().expect("peeked event");
            if self.removed.remove(&EventId(event.seq)) {
                continue;
            }
            debug_assert!(event.time >= self.now);
            self.now = event.time;
            self.executed += 1;
            return Some(event);
        }
    }
}

/// Cross-entity side effects buffered during one handler invocation and
/// applied by the Timeline afterwards.
enum Effect {
    Message {
        from: EntityId,
        dst: String,
        message: Message,
        priority: u64,
    },
    Qubit {
        from: EntityId,
        dst: String,
        qubit: Photon,
    },
}

/// What an event handler can reach while it runs: the clock, the queue, and
/// buffered sends that the Timeline routes through the sender's channels
/// once the handler returns.
pub struct SimContext<'a> {
    sched: &'a mut Scheduler,
    current: EntityId,
    effects: &'a mut Vec<Effect>,
}

impl SimContext<'_> {
    pub fn now(&self) -> u64 {
        self.sched.now()
    }

    pub fn schedule(&mut self, event: Event) -> EventId {
        self.sched.schedule(event)
    }

    pub fn remove_event(&mut self, id: EventId) {
        self.sched.remove_event(id);
    }

    /// Pull the horizon down to `now`; the run loop exits after the current
    /// event.
    pub fn stop(&mut self) {
        self.sched.horizon = self.sched.now;
    }

    /// Queue a message for the current entity's classical channel to `dst`.
    pub fn send_message(&mut self, dst: impl Into<String>, message: Message, priority: u64) {
        self.effects.push(Effect::Message {
            from: self.current,
            dst: dst.into(),
            message,
            priority,
        });
    }

    /// Queue a qubit for the current entity's quantum channel to `dst`.
    pub fn send_qubit(&mut self, dst: impl Into<String>, qubit: Photon) {
        self.effects.push(Effect::Qubit {
            from: self.current,
            dst: dst.into(),
            qubit,
        });
    }
}

/// The discrete-event scheduler: a min-priority queue of events, the current
/// simulated time, a stop horizon, and the registry of entities.
pub struct Timeline {
    sched: Scheduler,
    entities: Vec<Box<dyn Entity>>,
    names: HashMap<String, EntityId>,
    initialized: bool,
}

impl Default for Timeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Timeline {
    pub fn new() -> Self {
        Self::with_config(&SimConfig::default())
    }

    pub fn with_config(config: &SimConfig) -> Self {
        Self {
            sched: Scheduler::new(config.seed, config.runtime_ps),
            entities: Vec::new(),
            names: HashMap::new(),
            initialized: false,
        }
    }

    /// Register an entity. Names are unique within a timeline.
    pub fn add<T: Entity>(&mut self, entity: T) -> EntityId {
        let name = entity.name().to_string();
        let id = EntityId(self.entities.len());
        let previous = self.names.insert(name.clone(), id);
        assert!(previous.is_none(), "duplicate entity name `{name}`");
        self.entities.push(Box::new(entity));
        id
    }

    pub fn id_of(&self, name: &str) -> Option<EntityId> {
        self.names.get(name).copied()
    }

    pub fn get<T: Entity>(&self, id: EntityId) -> &T {
        self.entities[id.0]
            .as_any()
            .downcast_ref::<T>()
            .unwrap_or_else(|| {
                panic!(
                    "entity `{}` is not a {}",
                    self.entities[id.0].name(),
                    std::any::type_name::<T>()
                )
            })
    }

    pub fn get_mut<T: Entity>(&mut self, id: EntityId) -> &mut T {
        let name = self.entities[id.0].name().to_string();
        self.entities[id.0]
            .as_any_mut()
            .downcast_mut::<T>()
            .unwrap_or_else(|| panic!("entity `{name}` is not a {}", std::any::type_name::<T>()))
    }

    pub fn now(&self) -> u64 {
        self.sched.now()
    }

    pub fn events_executed(&self) -> u64 {
        self.sched.executed
    }

    pub fn pending_events(&self) -> usize {
        self.sched.queue.len()
    }

    pub fn schedule(&mut self, event: Event) -> EventId {
        self.sched.schedule(event)
    }

    /// Lazy deletion: the event stays queued and is skipped at pop time.
    pub fn remove_event(&mut self, id: EventId) {
        self.sched.remove_event(id);
    }

    pub fn stop(&mut self) {
        self.sched.horizon = self.sched.now;
    }

    /// Run `init` exactly once on every registered entity, in registration
    /// order.
    pub fn init(&mut self) {
        assert!(!self.initialized, "timeline already initialized");
        self.initialized = true;
        for index in 0..self.entities.len() {
            let mut effects = Vec::new();
            {
                let Timeline {
                    sched, entities, ..
                } = self;
                let mut ctx = SimContext {
                    sched,
                    current: EntityId(index),
                    effects: &mut effects,
                };
                entities[index].init(&mut ctx);
            }
            self.apply_effects(effects);
        }
    }

    /// Drain the queue in `(time, priority, seq)` order until it is empty or
    /// the next event reaches the horizon.
    pub fn run(&mut self) {
        while let Some(event) = self.sched.pop_next() {
            debug!(
                "executing event at {} ps: {:?}",
                event.time, event.process.op
            );
            let Process { target, op } = event.process;
            self.dispatch(target, op);
        }
    }

    /// Run a closure against one entity with a live context; used by setup
    /// code and tests to invoke operations outside event dispatch.
    pub fn with_entity<T: Entity, R>(
        &mut self,
        id: EntityId,
        f: impl FnOnce(&mut T, &mut SimContext<'_>) -> R,
    ) -> R {
        let mut effects = Vec::new();
        let result = {
            let Timeline {
                sched, entities, ..
            } = self;
            let entity = entities[id.0]
                .as_any_mut()
                .downcast_mut::<T>()
                .unwrap_or_else(|| panic!("entity is not a {}", std::any::type_name::<T>()));
            let mut ctx = SimContext {
                sched,
                current: id,
                effects: &mut effects,
            };
            f(entity, &mut ctx)
        };
        self.apply_effects(effects);
        result
    }

    fn dispatch(&mut self, target: EntityId, op: Op) {
        let mut effects = Vec::new();
        {
            let Timeline {
                sched, entities, ..
            } = self;
            let mut ctx = SimContext {
                sched,
                current: target,
                effects: &mut effects,
            };
            entities[target.0].handle(op, &mut ctx);
        }
        self.apply_effects(effects);
    }

    fn apply_effects(&mut self, effects: Vec<Effect>) {
        for effect in effects {
            match effect {
                Effect::Message {
                    from,
                    dst,
                    message,
                    priority,
                } => {
                    let channel = self.get::<Node>(from).cchannel(&dst).unwrap_or_else(|| {
                        panic!(
                            "`{}` has no classical channel to `{dst}`",
                            self.entities[from.0].name()
                        )
                    });
                    let Timeline {
                        sched, entities, ..
                    } = self;
                    let channel = entities[channel.0]
                        .as_any_mut()
                        .downcast_mut::<ClassicalChannel>()
                        .expect("classical channel");
                    channel.transmit(message, from, priority, sched);
                }
                Effect::Qubit { from, dst, qubit } => {
                    let channel = self.get::<Node>(from).qchannel(&dst).unwrap_or_else(|| {
                        panic!(
                            "`{}` has no quantum channel to `{dst}`",
                            self.entities[from.0].name()
                        )
                    });
                    let Timeline {
                        sched, entities, ..
                    } = self;
                    let channel = entities[channel.0]
                        .as_any_mut()
                        .downcast_mut::<QuantumChannel>()
                        .expect("quantum channel");
                    channel.transmit(qubit, from, sched);
                }
            }
        }
    }
}
