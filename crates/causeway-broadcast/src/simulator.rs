//! Deterministic network simulation for replicator clusters.
//!
//! Peer messages go through a [`NetworkSimulator`] that can lose, duplicate
//! and reorder them. Time is simulated too: [`BroadcastCluster::advance`]
//! moves the cluster clock forward and fires the resend timers, which is
//! the only way lost messages are recovered.

use crate::protocol::PeerMessage;
use crate::replicator::{Effect, Replicator};
use crate::settings::ReplicatorSettings;
use causeway_core::{ReplicaId, Versioned};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// A peer message addressed to a replica.
#[derive(Debug, Clone)]
pub struct Envelope<T> {
    pub to: ReplicaId,
    pub message: PeerMessage<T>,
}

/// Fault probabilities of a simulated network, each in `0.0..=1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Faults {
    pub loss: f64,
    pub duplication: f64,
    /// Chance that a message overtakes some of those already in flight.
    pub reordering: f64,
    pub seed: u64,
}

impl Faults {
    /// A network that delivers everything once, in order.
    pub fn none() -> Self {
        Self::default()
    }

    pub fn with_loss(self, loss: f64) -> Self {
        Self { loss, ..self }
    }

    pub fn with_duplication(self, duplication: f64) -> Self {
        Self {
            duplication,
            ..self
        }
    }

    pub fn with_reordering(self, reordering: f64) -> Self {
        Self { reordering, ..self }
    }

    pub fn with_seed(self, seed: u64) -> Self {
        Self { seed, ..self }
    }
}

/// An unreliable network between replicas.
#[derive(Debug)]
pub struct NetworkSimulator<T> {
    in_flight: VecDeque<Envelope<T>>,
    lost: usize,
    faults: Faults,
    rng: StdRng,
}

impl<T: Clone> NetworkSimulator<T> {
    pub fn new(faults: Faults) -> Self {
        Self {
            in_flight: VecDeque::new(),
            lost: 0,
            rng: StdRng::seed_from_u64(faults.seed),
            faults,
        }
    }

    fn happens(&mut self, probability: f64) -> bool {
        probability > 0.0 && self.rng.gen::<f64>() < probability
    }

    pub fn send(&mut self, envelope: Envelope<T>) {
        if self.happens(self.faults.loss) {
            self.lost += 1;
            return;
        }
        if self.happens(self.faults.duplication) {
            self.in_flight.push_back(envelope.clone());
        }
        if self.happens(self.faults.reordering) {
            let at = self.rng.gen_range(0..=self.in_flight.len());
            self.in_flight.insert(at, envelope);
        } else {
            self.in_flight.push_back(envelope);
        }
    }

    /// Next message in flight, if any.
    pub fn receive(&mut self) -> Option<Envelope<T>> {
        self.in_flight.pop_front()
    }

    pub fn is_empty(&self) -> bool {
        self.in_flight.is_empty()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.len()
    }

    pub fn lost_count(&self) -> usize {
        self.lost
    }
}

/// A fully meshed cluster of replicators over a simulated network.
#[derive(Debug)]
pub struct BroadcastCluster<T> {
    replicas: Vec<Replicator<T>>,
    delivered: Vec<Vec<Versioned<T>>>,
    network: NetworkSimulator<T>,
    now: Instant,
}

impl<T: Clone> BroadcastCluster<T> {
    /// A cluster of `n` replicas named `replica_0..n`.
    pub fn new(n: usize, settings: ReplicatorSettings, faults: Faults) -> Self {
        let ids: Vec<ReplicaId> = (0..n).map(|i| format!("replica_{}", i).into()).collect();
        let replicas = ids
            .iter()
            .map(|id| {
                let mut replica = Replicator::new(id.clone(), settings.clone());
                for peer in &ids {
                    replica.add_member(peer.clone());
                }
                replica
            })
            .collect();

        Self {
            replicas,
            delivered: vec![Vec::new(); n],
            network: NetworkSimulator::new(faults),
            now: Instant::now(),
        }
    }

    pub fn replica(&self, idx: usize) -> &Replicator<T> {
        &self.replicas[idx]
    }

    pub fn replica_mut(&mut self, idx: usize) -> &mut Replicator<T> {
        &mut self.replicas[idx]
    }

    /// Payloads handed to replica `idx`'s subscribers, in delivery order.
    pub fn delivered(&self, idx: usize) -> &[Versioned<T>] {
        &self.delivered[idx]
    }

    pub fn network(&self) -> &NetworkSimulator<T> {
        &self.network
    }

    pub fn now(&self) -> Instant {
        self.now
    }

    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    fn apply(&mut self, idx: usize, effects: Vec<Effect<T>>) {
        for effect in effects {
            match effect {
                Effect::Peer { to, message } => self.network.send(Envelope { to, message }),
                Effect::Delivered(deliver) => self.delivered[idx].push(deliver.versioned),
            }
        }
    }

    fn index_of(&self, id: &ReplicaId) -> Option<usize> {
        self.replicas.iter().position(|r| r.id() == id)
    }

    /// Broadcast a message from replica `idx`
    pub fn broadcast(&mut self, idx: usize, message: T) {
        let effects = self.replicas[idx].broadcast(message, self.now);
        self.apply(idx, effects);
    }

    /// Inject a message directly into the network.
    pub fn inject(&mut self, envelope: Envelope<T>) {
        self.network.send(envelope);
    }

    /// Process one network message
    pub fn process_one(&mut self) -> bool {
        let Some(Envelope { to, message }) = self.network.receive() else {
            return false;
        };
        if let Some(idx) = self.index_of(&to) {
            let effects = self.replicas[idx].handle(message, self.now);
            self.apply(idx, effects);
        }
        true
    }

    /// Run until network is empty
    pub fn drain_network(&mut self) {
        while self.process_one() {}
    }

    /// Move simulated time forward and let every replica resend what is overdue.
    pub fn advance(&mut self, by: Duration) {
        self.now += by;
        for idx in 0..self.replicas.len() {
            let effects = self.replicas[idx].resend(self.now);
            self.apply(idx, effects);
        }
    }

    /// Drain the network, then keep firing retry timers until nothing is
    /// left unacknowledged or `max_rounds` is exhausted.
    pub fn settle(&mut self, max_rounds: usize) -> bool {
        for _ in 0..max_rounds {
            self.drain_network();
            if self.is_quiescent() {
                return true;
            }
            let timeout = self.replicas.first().map(|r| r.settings().retry_timeout);
            self.advance(timeout.unwrap_or_default());
        }
        self.drain_network();
        self.is_quiescent()
    }

    /// No messages in flight, nothing pending delivery or acknowledgement.
    pub fn is_quiescent(&self) -> bool {
        self.network.is_empty()
            && self.replicas.iter().all(|r| {
                r.state().pending_deliveries().is_empty() && r.state().pending_acks().count() == 0
            })
    }

    /// Check if all replicas have delivered the same set of events
    pub fn is_converged(&self) -> bool {
        match self.replicas.split_first() {
            None => true,
            Some((first, rest)) => rest.iter().all(|r| r.local_version() == first.local_version()),
        }
    }
}
