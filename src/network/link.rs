use log::debug;
use rand::Rng;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc;

use crate::config::DeliveryConfig;
use crate::protocol::{Advertisement, Inbound};
use crate::{InterfaceId, NetworkId, RouterId};

/// Sending half of a router's inbound queue.
#[derive(Debug, Clone)]
pub struct Mailbox {
    owner: RouterId,
    tx: mpsc::UnboundedSender<Inbound>,
    conditions: DeliveryConfig,
}

impl Mailbox {
    pub fn new(owner: RouterId, tx: mpsc::UnboundedSender<Inbound>, conditions: DeliveryConfig) -> Self {
        Self { owner, tx, conditions }
    }

    pub fn owner(&self) -> RouterId {
        self.owner
    }

    /// Queues the advertisement for the owner and returns immediately.
    /// Must be called from within a tokio runtime when a delay is configured.
    pub fn deliver(&self, advertisement: Advertisement) {
        if self.conditions.is_perfect() {
            self.push(advertisement);
            return;
        }

        if rand::thread_rng().gen_bool(self.conditions.loss_probability.clamp(0.0, 1.0)) {
            debug!("Dropped advertisement from R{} to R{}", advertisement.sender, self.owner);
            return;
        }

        if self.conditions.delay_ms == 0 {
            self.push(advertisement);
            return;
        }

        let mailbox = self.clone();
        let delay = self.conditions.delay();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            mailbox.push(advertisement);
        });
    }

    fn push(&self, advertisement: Advertisement) {
        let sender = advertisement.sender;
        if self.tx.send(Inbound::Advertisement(advertisement)).is_err() {
            debug!("R{} is stopped, discarding advertisement from R{}", self.owner, sender);
        }
    }
}

/// One side of a link: the router and the slot the link occupies there.
#[derive(Debug, Clone)]
pub struct Endpoint {
    pub router: RouterId,
    pub interface: InterfaceId,
    pub mailbox: Mailbox,
}

/// Point-to-point link between two routers, shared by both of them.
#[derive(Debug)]
pub struct Link {
    network_id: NetworkId,
    endpoints: [Endpoint; 2],
    up: AtomicBool,
}

impl Link {
    pub fn new(network_id: NetworkId, a: Endpoint, b: Endpoint) -> Self {
        Self {
            network_id,
            endpoints: [a, b],
            up: AtomicBool::new(true),
        }
    }

    pub fn network_id(&self) -> NetworkId {
        self.network_id
    }

    pub fn is_up(&self) -> bool {
        self.up.load(Ordering::Acquire)
    }

    /// Marks the link down for good. Returns `false` if it already was.
    pub fn bring_down(&self) -> bool {
        self.up.swap(false, Ordering::AcqRel)
    }

    pub fn connects(&self, a: RouterId, b: RouterId) -> bool {
        let [first, second] = &self.endpoints;
        (first.router == a && second.router == b) || (first.router == b && second.router == a)
    }

    pub fn endpoint(&self, router: RouterId) -> &Endpoint {
        &self.endpoints[self.index_of(router)]
    }

    /// # Panics
    /// If `router` is not one of the two endpoints.
    pub fn other_endpoint(&self, router: RouterId) -> &Endpoint {
        &self.endpoints[1 - self.index_of(router)]
    }

    /// Slot occupied by this link on `router`.
    pub fn endpoint_interface(&self, router: RouterId) -> InterfaceId {
        self.endpoint(router).interface
    }

    /// Slot occupied by this link on the router that is not `router`.
    pub fn other_endpoint_interface(&self, router: RouterId) -> InterfaceId {
        self.other_endpoint(router).interface
    }

    fn index_of(&self, router: RouterId) -> usize {
        match self.endpoints.iter().position(|e| e.router == router) {
            Some(index) => index,
            None => panic!(
                "router {} is not an endpoint of network {} (R{} <-> R{})",
                router, self.network_id, self.endpoints[0].router, self.endpoints[1].router
            ),
        }
    }
}
