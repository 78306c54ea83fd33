use std::any::Any;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use rand::Rng;
use tracing::debug;

use qnet_abstract::{ClassicalChannelSpec, EncodingKind, Message, QuantumChannelSpec};

use crate::entity::{Entity, EntityId};
use crate::event::{Event, Op, Process};
use crate::node::Node;
use crate::photon::Photon;
use crate::timeline::{Scheduler, SimContext, Timeline};

/// Both endpoints of a point-to-point link, fixed by `set_ends`.
struct Ends {
    left: (EntityId, String),
    right: (EntityId, String),
}

impl Ends {
    /// The source's own name and the peer's id, or `None` if `source` is not
    /// an endpoint.
    fn resolve(&self, source: EntityId) -> Option<(&str, EntityId)> {
        if self.left.0 == source {
            Some((&self.left.1, self.right.0))
        } else if self.right.0 == source {
            Some((&self.right.1, self.left.0))
        } else {
            None
        }
    }
}

/// Lossy, time-bin arbitrated single-photon link between two nodes.
pub struct QuantumChannel {
    name: String,
    ends: Option<Ends>,
    /// dB per meter.
    attenuation: f64,
    /// Meters.
    distance: u64,
    /// Meters per picosecond.
    light_speed: f64,
    /// Maximum qubit emission frequency, Hz.
    frequency: f64,
    polarization_fidelity: f64,
    delay: u64,
    loss: f64,
    send_bins: BinaryHeap<Reverse<u64>>,
    initialized: bool,
}

impl QuantumChannel {
    pub fn new(name: impl Into<String>, spec: &QuantumChannelSpec) -> Self {
        Self {
            name: name.into(),
            ends: None,
            attenuation: spec.attenuation,
            distance: spec.distance_m,
            light_speed: spec.light_speed_m_per_ps,
            frequency: spec.frequency_hz,
            polarization_fidelity: spec.polarization_fidelity,
            delay: 0,
            loss: 1.0,
            send_bins: BinaryHeap::new(),
            initialized: false,
        }
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    pub fn loss(&self) -> f64 {
        self.loss
    }

    /// Wire both endpoints and tell each node about its peer.
    pub fn set_ends(timeline: &mut Timeline, channel: EntityId, end1: EntityId, end2: EntityId) {
        let name1 = timeline.get::<Node>(end1).name().to_string();
        let name2 = timeline.get::<Node>(end2).name().to_string();
        timeline.get_mut::<QuantumChannel>(channel).ends = Some(Ends {
            left: (end1, name1.clone()),
            right: (end2, name2.clone()),
        });
        timeline.get_mut::<Node>(end1).assign_qchannel(channel, &name2);
        timeline.get_mut::<Node>(end2).assign_qchannel(channel, &name1);
    }

    /// Earliest emission time no earlier than `min_time`, rounded onto the
    /// channel's time-bin grid. One reservation per bin; bins grow
    /// monotonically for a caller re-requesting from its last grant.
    pub fn schedule_transmit(&mut self, min_time: u64, now: u64) -> u64 {
        let start = min_time.max(now);
        let exact = start as f64 * self.frequency / 1e12;
        // Ceiling with epsilon tolerance against float drift.
        let mut bin = if exact - exact.floor() > 1e-5 {
            exact.floor() as u64 + 1
        } else {
            exact.floor() as u64
        };
        while self.send_bins.iter().any(|Reverse(b)| *b == bin) {
            bin += 1;
        }
        self.send_bins.push(Reverse(bin));
        self.bin_time(bin)
    }

    fn bin_time(&self, bin: u64) -> u64 {
        (bin as f64 * (1e12 / self.frequency)) as u64
    }

    pub(crate) fn transmit(&mut self, mut qubit: Photon, source: EntityId, sched: &mut Scheduler) {
        assert!(
            self.initialized,
            "quantum channel `{}` used before Timeline::init",
            self.name
        );

        // Consume the caller's reservation, discarding stale bins.
        if !self.send_bins.is_empty() {
            let mut time = None;
            while time.is_none_or(|t| t < sched.now()) {
                let Reverse(bin) = self.send_bins.pop().unwrap_or_else(|| {
                    panic!(
                        "quantum channel `{}`: transmit at {} ps without a reservation",
                        self.name,
                        sched.now()
                    )
                });
                time = Some(self.bin_time(bin));
            }
            assert_eq!(
                time,
                Some(sched.now()),
                "quantum channel `{}`: transmit at an unreserved time",
                self.name
            );
        }

        let (source_name, receiver) = self
            .ends
            .as_ref()
            .and_then(|ends| ends.resolve(source))
            .unwrap_or_else(|| {
                panic!("transmit source is not an endpoint of quantum channel `{}`", self.name)
            });
        let src = source_name.to_string();

        let kept = sched.rng.random::<f64>() > self.loss || qubit.is_null;
        if !kept {
            debug!(
                "quantum channel `{}`: photon lost at {} ps",
                self.name,
                sched.now()
            );
            return;
        }

        if qubit.encoding == EncodingKind::Polarization
            && sched.rng.random::<f64>() > self.polarization_fidelity
        {
            qubit.random_noise(&mut sched.rng);
        }

        let arrival = sched.now() + self.delay;
        sched.schedule(Event::new(
            arrival,
            Process::new(receiver, Op::ReceiveQubit { src, qubit }),
        ));
    }
}

impl Entity for QuantumChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn init(&mut self, _ctx: &mut SimContext<'_>) {
        self.delay = (self.distance as f64 / self.light_speed).round() as u64;
        self.loss = 1.0 - 10f64.powf(-(self.attenuation * self.distance as f64) / 10.0);
        self.initialized = true;
        debug!(
            "quantum channel `{}`: delay {} ps, loss {:.4}",
            self.name, self.delay, self.loss
        );
    }

    fn handle(&mut self, op: Op, _ctx: &mut SimContext<'_>) {
        panic!("quantum channel `{}` cannot execute {op:?}", self.name);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

/// Lossless, delay-only message link between two nodes.
pub struct ClassicalChannel {
    name: String,
    ends: Option<Ends>,
    delay: u64,
}

impl ClassicalChannel {
    pub fn new(name: impl Into<String>, spec: &ClassicalChannelSpec) -> Self {
        let delay = spec
            .delay_ps
            .unwrap_or((spec.distance_m as f64 / spec.light_speed_m_per_ps) as u64);
        Self {
            name: name.into(),
            ends: None,
            delay,
        }
    }

    pub fn delay(&self) -> u64 {
        self.delay
    }

    /// Wire both endpoints and tell each node about its peer.
    pub fn set_ends(timeline: &mut Timeline, channel: EntityId, end1: EntityId, end2: EntityId) {
        let name1 = timeline.get::<Node>(end1).name().to_string();
        let name2 = timeline.get::<Node>(end2).name().to_string();
        timeline.get_mut::<ClassicalChannel>(channel).ends = Some(Ends {
            left: (end1, name1.clone()),
            right: (end2, name2.clone()),
        });
        timeline.get_mut::<Node>(end1).assign_cchannel(channel, &name2);
        timeline.get_mut::<Node>(end2).assign_cchannel(channel, &name1);
    }

    pub(crate) fn transmit(
        &mut self,
        message: Message,
        source: EntityId,
        priority: u64,
        sched: &mut Scheduler,
    ) {
        let (source_name, receiver) = self
            .ends
            .as_ref()
            .and_then(|ends| ends.resolve(source))
            .unwrap_or_else(|| {
                panic!("transmit source is not an endpoint of classical channel `{}`", self.name)
            });
        let src = source_name.to_string();

        let arrival = sched.now() + self.delay;
        sched.schedule(Event::with_priority(
            arrival,
            priority,
            Process::new(receiver, Op::ReceiveMessage { src, message }),
        ));
    }
}

impl Entity for ClassicalChannel {
    fn name(&self) -> &str {
        &self.name
    }

    fn handle(&mut self, op: Op, _ctx: &mut SimContext<'_>) {
        panic!("classical channel `{}` cannot execute {op:?}", self.name);
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeProtocol, probe};

    fn two_nodes_with_cc(delay_ps: u64) -> (Timeline, EntityId, EntityId) {
        let mut tl = Timeline::new();
        let alice = tl.add(Node::new("alice", 0));
        let bob = tl.add(Node::new("bob", 0));
        let spec = ClassicalChannelSpec {
            distance_m: 1_000,
            delay_ps: Some(delay_ps),
            ..Default::default()
        };
        let cc = tl.add(ClassicalChannel::new("cc.alice.bob", &spec));
        ClassicalChannel::set_ends(&mut tl, cc, alice, bob);
        (tl, alice, bob)
    }

    fn two_nodes_with_qc(spec: &QuantumChannelSpec) -> (Timeline, EntityId, EntityId, EntityId) {
        let mut tl = Timeline::new();
        let alice = tl.add(Node::new("alice", 0));
        let bob = tl.add(Node::new("bob", 0));
        let qc = tl.add(QuantumChannel::new("qc.alice.bob", spec));
        QuantumChannel::set_ends(&mut tl, qc, alice, bob);
        (tl, alice, bob, qc)
    }

    #[test]
    fn classical_delivery_arrives_after_exactly_the_delay() {
        let (mut tl, alice, bob) = two_nodes_with_cc(100);
        let receiver = FakeProtocol::new("sink");
        tl.get_mut::<Node>(bob).protocols.push(receiver.clone());

        tl.with_entity::<Node, _>(alice, |node, ctx| {
            node.send_message(ctx, "bob", Message::to_protocol("sink", std::rc::Rc::new("ping".to_string())), 0);
        });
        tl.run();

        assert_eq!(tl.now(), 100);
        let inbox = receiver.borrow().inbox.clone();
        assert_eq!(inbox, vec![("alice".to_string(), "ping".to_string())]);
    }

    #[test]
    fn classical_delivery_is_fifo_for_equal_priority() {
        let (mut tl, alice, bob) = two_nodes_with_cc(50);
        let receiver = FakeProtocol::new("sink");
        tl.get_mut::<Node>(bob).protocols.push(receiver.clone());

        tl.with_entity::<Node, _>(alice, |node, ctx| {
            for tag in ["m1", "m2", "m3"] {
                node.send_message(
                    ctx,
                    "bob",
                    Message::to_protocol("sink", std::rc::Rc::new(tag.to_string())),
                    0,
                );
            }
        });
        tl.run();

        let tags: Vec<String> = receiver.borrow().inbox.iter().map(|(_, t)| t.clone()).collect();
        assert_eq!(tags, vec!["m1", "m2", "m3"]);
    }

    #[test]
    #[should_panic(expected = "not an endpoint")]
    fn classical_transmit_from_non_endpoint_panics() {
        let (mut tl, _alice, _bob) = two_nodes_with_cc(10);
        let carol = tl.add(Node::new("carol", 0));
        let cc = tl.id_of("cc.alice.bob").unwrap();
        tl.get_mut::<Node>(carol).assign_cchannel(cc, "bob");

        tl.with_entity::<Node, _>(carol, |node, ctx| {
            node.send_message(ctx, "bob", probe("x"), 0);
        });
    }

    #[test]
    fn quantum_init_derives_delay_and_loss() {
        let spec = QuantumChannelSpec {
            attenuation: 0.0002,
            distance_m: 1_000,
            ..Default::default()
        };
        let (mut tl, _alice, _bob, qc) = two_nodes_with_qc(&spec);
        tl.init();

        let channel = tl.get::<QuantumChannel>(qc);
        assert_eq!(channel.delay(), 5_000_000);
        let expected_loss = 1.0 - 10f64.powf(-0.02);
        assert!((channel.loss() - expected_loss).abs() < 1e-12);
    }

    #[test]
    fn time_bins_are_distinct_and_increasing() {
        let spec = QuantumChannelSpec {
            frequency_hz: 2e6,
            ..Default::default()
        };
        let (mut tl, _alice, _bob, qc) = two_nodes_with_qc(&spec);

        let times: Vec<u64> = (0..3)
            .map(|_| {
                tl.with_entity::<QuantumChannel, _>(qc, |channel, ctx| {
                    channel.schedule_transmit(0, ctx.now())
                })
            })
            .collect();
        assert_eq!(times, vec![0, 500_000, 1_000_000]);
    }

    #[test]
    fn reservation_skips_occupied_bins_after_min_time() {
        let spec = QuantumChannelSpec {
            frequency_hz: 2e6,
            ..Default::default()
        };
        let (mut tl, _alice, _bob, qc) = two_nodes_with_qc(&spec);

        let first = tl.with_entity::<QuantumChannel, _>(qc, |channel, ctx| {
            channel.schedule_transmit(300_000, ctx.now())
        });
        assert_eq!(first, 500_000);
        let second = tl.with_entity::<QuantumChannel, _>(qc, |channel, ctx| {
            channel.schedule_transmit(300_000, ctx.now())
        });
        assert_eq!(second, 1_000_000);
    }

    #[test]
    fn reserved_transmit_delivers_at_bin_time_plus_delay() {
        let spec = QuantumChannelSpec {
            attenuation: 0.0,
            distance_m: 1_000,
            frequency_hz: 2e6,
            ..Default::default()
        };
        let (mut tl, alice, bob, qc) = two_nodes_with_qc(&spec);
        tl.init();

        let time = tl.with_entity::<QuantumChannel, _>(qc, |channel, ctx| {
            channel.schedule_transmit(0, ctx.now())
        });
        tl.schedule(Event::new(
            time,
            Process::new(
                alice,
                Op::SendQubit {
                    dst: "bob".to_string(),
                    qubit: Photon::new(EncodingKind::Polarization),
                },
            ),
        ));
        tl.run();

        let received = tl.get::<Node>(bob).received_qubits();
        assert_eq!(received.len(), 1);
        assert_eq!(received[0].0, time + 5_000_000);
        assert_eq!(received[0].1, "alice");
    }

    #[test]
    fn loss_statistics_match_the_derived_loss() {
        // 100 km at 0.0002 dB/m: loss = 1 - 10^-2 = 0.99.
        let spec = QuantumChannelSpec {
            attenuation: 0.0002,
            distance_m: 100_000,
            ..Default::default()
        };
        let (mut tl, alice, bob, qc) = two_nodes_with_qc(&spec);
        tl.init();
        assert!((tl.get::<QuantumChannel>(qc).loss() - 0.99).abs() < 1e-9);

        let sent: u64 = 1_000_000;
        for _ in 0..sent {
            tl.schedule(Event::new(
                0,
                Process::new(
                    alice,
                    Op::SendQubit {
                        dst: "bob".to_string(),
                        qubit: Photon::new(EncodingKind::Polarization),
                    },
                ),
            ));
        }
        tl.run();

        let delivered = tl.get::<Node>(bob).received_qubits().len() as f64;
        let fraction = delivered / sent as f64;
        assert!(
            (fraction - 0.01).abs() < 0.005,
            "delivered fraction {fraction} too far from 0.01"
        );
    }

    #[test]
    fn null_photons_bypass_loss() {
        // Attenuation high enough that loss rounds to 1.0 in f64.
        let spec = QuantumChannelSpec {
            attenuation: 1.0,
            distance_m: 1_000,
            ..Default::default()
        };
        let (mut tl, alice, bob, _qc) = two_nodes_with_qc(&spec);
        tl.init();

        tl.schedule(Event::new(
            0,
            Process::new(
                alice,
                Op::SendQubit {
                    dst: "bob".to_string(),
                    qubit: Photon::new(EncodingKind::Polarization),
                },
            ),
        ));
        tl.schedule(Event::new(
            0,
            Process::new(
                alice,
                Op::SendQubit {
                    dst: "bob".to_string(),
                    qubit: Photon::null(EncodingKind::Polarization),
                },
            ),
        ));
        tl.run();

        let received = tl.get::<Node>(bob).received_qubits();
        assert_eq!(received.len(), 1);
        assert!(received[0].2.is_null);
    }

    #[test]
    fn polarization_noise_rewrites_the_angle() {
        let spec = QuantumChannelSpec {
            attenuation: 0.0,
            distance_m: 1_000,
            polarization_fidelity: 0.0,
            ..Default::default()
        };
        let (mut tl, alice, bob, _qc) = two_nodes_with_qc(&spec);
        tl.init();

        tl.schedule(Event::new(
            0,
            Process::new(
                alice,
                Op::SendQubit {
                    dst: "bob".to_string(),
                    qubit: Photon::new(EncodingKind::Polarization),
                },
            ),
        ));
        tl.run();

        let received = tl.get::<Node>(bob).received_qubits();
        assert_eq!(received.len(), 1);
        assert_ne!(received[0].2.polarization_angle, 0.0);
    }

    #[test]
    fn time_bin_photons_skip_polarization_noise() {
        let spec = QuantumChannelSpec {
            attenuation: 0.0,
            distance_m: 1_000,
            polarization_fidelity: 0.0,
            ..Default::default()
        };
        let (mut tl, alice, bob, _qc) = two_nodes_with_qc(&spec);
        tl.init();

        tl.schedule(Event::new(
            0,
            Process::new(
                alice,
                Op::SendQubit {
                    dst: "bob".to_string(),
                    qubit: Photon::new(EncodingKind::TimeBin),
                },
            ),
        ));
        tl.run();

        let received = tl.get::<Node>(bob).received_qubits();
        assert_eq!(received[0].2.polarization_angle, 0.0);
    }

    #[test]
    #[should_panic(expected = "before Timeline::init")]
    fn transmit_on_uninitialized_channel_panics() {
        let spec = QuantumChannelSpec::default();
        let (mut tl, alice, _bob, _qc) = two_nodes_with_qc(&spec);

        tl.schedule(Event::new(
            0,
            Process::new(
                alice,
                Op::SendQubit {
                    dst: "bob".to_string(),
                    qubit: Photon::new(EncodingKind::Polarization),
                },
            ),
        ));
        tl.run();
    }

    #[test]
    #[should_panic(expected = "unreserved time")]
    fn transmit_outside_a_reservation_panics() {
        let spec = QuantumChannelSpec {
            attenuation: 0.0,
            distance_m: 1_000,
            frequency_hz: 2e6,
            ..Default::default()
        };
        let (mut tl, alice, _bob, qc) = two_nodes_with_qc(&spec);
        tl.init();

        // Reserve bin 1 (500_000 ps) but emit at bin 0.
        tl.with_entity::<QuantumChannel, _>(qc, |channel, ctx| {
            channel.schedule_transmit(300_000, ctx.now())
        });
        tl.schedule(Event::new(
            0,
            Process::new(
                alice,
                Op::SendQubit {
                    dst: "bob".to_string(),
                    qubit: Photon::new(EncodingKind::Polarization),
                },
            ),
        ));
        tl.run();
    }
}
