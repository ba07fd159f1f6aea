use log::{debug, info};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex, MutexGuard};

use crate::config::ProtocolConfig;
use crate::error::RoutingError;
use crate::network::{InterfaceTable, Link, Mailbox};
use crate::protocol::task_manager::{self, TaskSet};
use crate::protocol::{
    AdvertisedRoute, Advertisement, AdvertisementKind, Inbound, RoutingTable, RoutingTableSnapshot,
    UpdateOutcome,
};
use crate::{InterfaceId, NetworkId, RouterId, SharedRouterState};

/// An advertisement addressed to a neighbor, built under the lock and sent after it is released.
#[derive(Debug, Clone)]
pub struct Outbound {
    pub mailbox: Mailbox,
    pub advertisement: Advertisement,
}

impl Outbound {
    pub fn send(self) {
        self.mailbox.deliver(self.advertisement);
    }
}

fn send_all(outbound: Vec<Outbound>) {
    for message in outbound {
        message.send();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterfaceInfo {
    pub interface: InterfaceId,
    pub network_id: NetworkId,
    pub neighbor: RouterId,
    pub up: bool,
}

/// Everything guarded by a router's lock.
#[derive(Debug)]
pub struct RouterState {
    pub id: RouterId,
    pub interfaces: InterfaceTable,
    pub routing_table: RoutingTable,
    invalid_after_checks: u32,
}

impl RouterState {
    pub fn new(id: RouterId, config: &ProtocolConfig) -> Self {
        Self {
            id,
            interfaces: InterfaceTable::new(id, config.max_interfaces),
            routing_table: RoutingTable::new(),
            invalid_after_checks: config.invalid_after_checks,
        }
    }

    /// Binds `link` into the slot it was allocated on this router and adds the direct route.
    pub fn add_connection(&mut self, link: Arc<Link>) -> Result<InterfaceId, RoutingError> {
        let interface = link.endpoint_interface(self.id);
        let network_id = link.network_id();
        self.interfaces.bind(interface, link)?;
        self.routing_table.add_direct(network_id, interface);
        Ok(interface)
    }

    pub fn periodic_advertisements(&self) -> Vec<Outbound> {
        self.advertisements(AdvertisementKind::Periodic, |neighbor| {
            self.routing_table.split_horizon_for(neighbor)
        })
    }

    pub fn triggered_updates(&self) -> Vec<Outbound> {
        let unreachable = self.routing_table.unreachable_routes();
        self.advertisements(AdvertisementKind::Triggered, |_| unreachable.clone())
    }

    fn advertisements<F>(&self, kind: AdvertisementKind, routes_for: F) -> Vec<Outbound>
    where
        F: Fn(RouterId) -> Vec<AdvertisedRoute>,
    {
        self.interfaces
            .active()
            .filter_map(|(_, link)| {
                let neighbor = link.other_endpoint(self.id);
                let routes = routes_for(neighbor.router);
                if routes.is_empty() {
                    return None;
                }
                Some(Outbound {
                    mailbox: neighbor.mailbox.clone(),
                    advertisement: Advertisement {
                        sender: self.id,
                        receiving_interface: link.other_endpoint_interface(self.id),
                        kind,
                        routes,
                    },
                })
            })
            .collect()
    }

    /// Applies a neighbor's advertisement; the returned messages are the triggered update, if any.
    pub fn update_routing_table(
        &mut self,
        receiving_interface: InterfaceId,
        sender: RouterId,
        routes: &[AdvertisedRoute],
    ) -> (UpdateOutcome, Vec<Outbound>) {
        if !self.is_live_adjacency(receiving_interface, sender) {
            debug!("R{}: discarding advertisement from R{} on interface {}, link is gone",
                   self.id, sender, receiving_interface);
            return (UpdateOutcome::default(), Vec::new());
        }

        let outcome = self
            .routing_table
            .apply_advertisement(receiving_interface, sender, routes);

        if outcome.changed() {
            debug!("R{}: {} routes adopted, {} invalidated after update from R{}",
                   self.id, outcome.adopted, outcome.invalidated, sender);
        }

        let outbound = if outcome.needs_triggered_update {
            self.triggered_updates()
        } else {
            Vec::new()
        };
        (outcome, outbound)
    }

    /// Whether `interface` is bound to an up link whose other end is `sender`.
    /// Advertisements still queued or delayed when a link went down fail this.
    fn is_live_adjacency(&self, interface: InterfaceId, sender: RouterId) -> bool {
        self.interfaces
            .get(interface)
            .is_some_and(|link| link.is_up() && link.connects(self.id, sender))
    }

    pub fn poison(&mut self, interface: InterfaceId) -> usize {
        self.routing_table.poison_interface(interface)
    }

    /// Frees the link's slot and drops the direct route for its network.
    pub fn remove_link(&mut self, link: &Link) {
        self.interfaces.unbind(link);
        self.routing_table.remove_direct(link.network_id());
    }

    /// Poison, triggered update and detach under a single hold of the lock.
    /// The link must already be down so the update does not travel over it.
    pub fn take_down(&mut self, link: &Link) -> Vec<Outbound> {
        let interface = link.endpoint_interface(self.id);
        let poisoned = self.poison(interface);
        let outbound = self.triggered_updates();
        self.remove_link(link);
        info!("R{}: network {} down on interface {}, {} routes poisoned",
              self.id, link.network_id(), interface, poisoned);
        outbound
    }

    pub fn invalidation_check(&mut self) -> Vec<NetworkId> {
        let expired = self.routing_table.age(self.invalid_after_checks);
        if !expired.is_empty() {
            debug!("R{}: expired routes to {:?}", self.id, expired);
        }
        expired
    }

    pub fn snapshot(&self) -> RoutingTableSnapshot {
        RoutingTableSnapshot::new(self.id, &self.routing_table)
    }
}

/// Handle to a running router. Cloning it is cheap; all clones drive the same router.
#[derive(Debug, Clone)]
pub struct Router {
    id: RouterId,
    state: SharedRouterState,
    mailbox: Mailbox,
    config: Arc<ProtocolConfig>,
    tasks: Arc<TaskSet>,
}

impl Router {
    /// Creates the router and starts its periodic activities on the current tokio runtime.
    pub fn spawn(id: RouterId, config: Arc<ProtocolConfig>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let router = Self {
            id,
            state: Arc::new(Mutex::new(RouterState::new(id, &config))),
            mailbox: Mailbox::new(id, tx, config.delivery),
            config,
            tasks: Arc::new(TaskSet::new()),
        };
        task_manager::start_tasks(&router, rx);
        info!("Router R{} started", id);
        router
    }

    pub fn id(&self) -> RouterId {
        self.id
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    pub(crate) fn tasks(&self) -> &TaskSet {
        &self.tasks
    }

    pub(crate) async fn lock(&self) -> MutexGuard<'_, RouterState> {
        self.state.lock().await
    }

    pub async fn add_connection(&self, link: Arc<Link>) -> Result<InterfaceId, RoutingError> {
        self.lock().await.add_connection(link)
    }

    /// One round of the advertise timer.
    pub async fn advertise(&self) {
        let outbound = self.lock().await.periodic_advertisements();
        debug!("R{}: periodic advertisement to {} neighbors", self.id, outbound.len());
        send_all(outbound);
    }

    pub async fn triggered_update(&self) {
        let outbound = self.lock().await.triggered_updates();
        send_all(outbound);
    }

    pub async fn update_routing_table(
        &self,
        receiving_interface: InterfaceId,
        sender: RouterId,
        routes: &[AdvertisedRoute],
    ) -> UpdateOutcome {
        let (outcome, outbound) = self
            .lock()
            .await
            .update_routing_table(receiving_interface, sender, routes);
        send_all(outbound);
        outcome
    }

    pub async fn handle(&self, message: Inbound) {
        match message {
            Inbound::Advertisement(ad) => {
                debug!("R{}: {:?} advertisement from R{} with {} routes",
                       self.id, ad.kind, ad.sender, ad.routes.len());
                self.update_routing_table(ad.receiving_interface, ad.sender, &ad.routes)
                    .await;
            }
        }
    }

    pub async fn poison(&self, interface: InterfaceId) -> usize {
        self.lock().await.poison(interface)
    }

    pub async fn remove_link(&self, link: &Link) {
        self.lock().await.remove_link(link);
    }

    pub async fn take_down(&self, link: &Link) {
        let outbound = self.lock().await.take_down(link);
        send_all(outbound);
    }

    /// One round of the invalidation timer.
    pub async fn invalidation_check(&self) -> Vec<NetworkId> {
        self.lock().await.invalidation_check()
    }

    pub async fn routing_table(&self) -> RoutingTableSnapshot {
        self.lock().await.snapshot()
    }

    pub async fn first_free_interface(&self) -> Option<InterfaceId> {
        self.lock().await.interfaces.first_free()
    }

    pub async fn link_to(&self, neighbor: RouterId) -> Option<Arc<Link>> {
        self.lock().await.interfaces.link_to(neighbor)
    }

    pub async fn links(&self) -> Vec<Arc<Link>> {
        self.lock()
            .await
            .interfaces
            .bound()
            .map(|(_, link)| link.clone())
            .collect()
    }

    pub async fn active_interfaces(&self) -> Vec<InterfaceInfo> {
        let state = self.lock().await;
        state
            .interfaces
            .bound()
            .map(|(interface, link)| InterfaceInfo {
                interface,
                network_id: link.network_id(),
                neighbor: link.other_endpoint(self.id).router,
                up: link.is_up(),
            })
            .collect()
    }

    pub fn is_running(&self) -> bool {
        self.tasks.is_running()
    }

    /// Cancels the periodic activities and the inbox. Safe to call more than once.
    pub fn stop(&self) {
        if self.tasks.stop() {
            info!("Router R{} stopped", self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::network::Endpoint;
    use crate::protocol::INFINITY;

    fn config() -> Arc<ProtocolConfig> {
        Arc::new(ProtocolConfig::default())
    }

    fn wire(a: &Router, ia: InterfaceId, b: &Router, ib: InterfaceId, network_id: NetworkId) -> Arc<Link> {
        Arc::new(Link::new(
            network_id,
            Endpoint { router: a.id(), interface: ia, mailbox: a.mailbox().clone() },
            Endpoint { router: b.id(), interface: ib, mailbox: b.mailbox().clone() },
        ))
    }

    #[tokio::test]
    async fn add_connection_creates_direct_route() {
        let a = Router::spawn(101, config());
        let b = Router::spawn(102, config());
        let link = wire(&a, 0, &b, 0, 1);

        assert_eq!(a.add_connection(link.clone()).await, Ok(0));
        assert_eq!(b.add_connection(link).await, Ok(0));

        let table = a.routing_table().await;
        let entry = table.get(1).unwrap();
        assert!(entry.is_direct());
        assert_eq!(entry.hop_count, 0);
        assert_eq!(a.first_free_interface().await, Some(1));

        a.stop();
        b.stop();
    }

    #[tokio::test]
    async fn periodic_advertisement_respects_split_horizon() {
        let a = Router::spawn(101, config());
        let b = Router::spawn(102, config());
        let link = wire(&a, 0, &b, 2, 1);
        a.add_connection(link.clone()).await.unwrap();
        b.add_connection(link).await.unwrap();

        a.update_routing_table(0, 102, &[AdvertisedRoute { network_id: 9, hop_count: 0 }])
            .await;

        let state = a.lock().await;
        let outbound = state.periodic_advertisements();
        assert_eq!(outbound.len(), 1);
        let ad = &outbound[0].advertisement;
        assert_eq!(ad.sender, 101);
        assert_eq!(ad.receiving_interface, 2);
        assert_eq!(ad.kind, AdvertisementKind::Periodic);
        assert_eq!(ad.routes, vec![AdvertisedRoute { network_id: 1, hop_count: 0 }]);
        drop(state);

        a.stop();
        b.stop();
    }

    #[tokio::test]
    async fn take_down_sends_poison_and_detaches() {
        let a = Router::spawn(101, config());
        let b = Router::spawn(102, config());
        let c = Router::spawn(103, config());
        let ab = wire(&a, 0, &b, 0, 1);
        let ac = wire(&a, 1, &c, 0, 2);
        for link in [&ab, &ac] {
            a.add_connection(link.clone()).await.unwrap();
        }
        b.add_connection(ab.clone()).await.unwrap();
        c.add_connection(ac.clone()).await.unwrap();
        a.update_routing_table(0, 102, &[AdvertisedRoute { network_id: 9, hop_count: 1 }])
            .await;

        ab.bring_down();
        let outbound = a.lock().await.take_down(&ab);

        // only C is still reachable, and it hears about both lost networks
        assert_eq!(outbound.len(), 1);
        assert_eq!(outbound[0].mailbox.owner(), 103);
        assert_eq!(
            outbound[0].advertisement.routes,
            vec![
                AdvertisedRoute { network_id: 1, hop_count: INFINITY },
                AdvertisedRoute { network_id: 9, hop_count: INFINITY },
            ]
        );

        let table = a.routing_table().await;
        assert!(table.get(1).is_none());
        assert_eq!(table.hop_count(9), Some(INFINITY));
        assert_eq!(a.first_free_interface().await, Some(0));

        for router in [&a, &b, &c] {
            router.stop();
        }
    }

    #[tokio::test]
    async fn advertisement_without_live_adjacency_is_ignored() {
        let a = Router::spawn(101, config());
        let b = Router::spawn(102, config());
        let link = wire(&a, 0, &b, 0, 1);
        a.add_connection(link.clone()).await.unwrap();
        b.add_connection(link.clone()).await.unwrap();
        let route = [AdvertisedRoute { network_id: 9, hop_count: 0 }];

        // wrong sender, then an empty slot
        assert_eq!(a.update_routing_table(0, 103, &route).await, UpdateOutcome::default());
        assert_eq!(a.update_routing_table(1, 102, &route).await, UpdateOutcome::default());

        link.bring_down();
        assert_eq!(a.update_routing_table(0, 102, &route).await, UpdateOutcome::default());
        assert!(a.routing_table().await.get(9).is_none());

        a.stop();
        b.stop();
    }

    #[tokio::test]
    async fn stop_is_idempotent() {
        let a = Router::spawn(101, config());
        assert!(a.is_running());
        a.stop();
        a.stop();
        assert!(!a.is_running());
    }
}
