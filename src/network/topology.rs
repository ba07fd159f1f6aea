use log::{info, warn};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

use super::link::{Endpoint, Link};
use crate::config::ProtocolConfig;
use crate::error::RoutingError;
use crate::router::Router;
use crate::{NetworkId, RouterId};

/// A simulated network: owns the id allocators and a registry of its routers.
/// Independent `Network`s share nothing, so several can run side by side.
#[derive(Debug)]
pub struct Network {
    config: Arc<ProtocolConfig>,
    next_router_id: AtomicU32,
    next_network_id: AtomicU32,
    routers: RwLock<BTreeMap<RouterId, Router>>,
}

impl Network {
    pub fn new(config: ProtocolConfig) -> Self {
        Self {
            next_router_id: AtomicU32::new(config.first_router_id),
            next_network_id: AtomicU32::new(config.first_network_id),
            config: Arc::new(config),
            routers: RwLock::new(BTreeMap::new()),
        }
    }

    pub fn config(&self) -> &ProtocolConfig {
        &self.config
    }

    /// Creates a router with a fresh id and starts its periodic activities.
    pub async fn add_router(&self) -> Router {
        let id = self.next_router_id.fetch_add(1, Ordering::Relaxed);
        let router = Router::spawn(id, self.config.clone());
        self.routers.write().await.insert(id, router.clone());
        router
    }

    pub async fn router(&self, id: RouterId) -> Option<Router> {
        self.routers.read().await.get(&id).cloned()
    }

    /// All registered routers, ordered by id.
    pub async fn routers(&self) -> Vec<Router> {
        self.routers.read().await.values().cloned().collect()
    }

    /// Links `a` and `b` through the first free slot on each.
    ///
    /// Both routers are locked together (lower id first) so the slots are
    /// claimed atomically. On error neither router is modified.
    pub async fn connect(&self, a: &Router, b: &Router) -> Result<NetworkId, RoutingError> {
        if a.id() == b.id() {
            return Err(RoutingError::SelfLink(a.id()));
        }

        let a_first = a.id() < b.id();
        let (first, second) = if a_first { (a, b) } else { (b, a) };
        let mut first_guard = first.lock().await;
        let mut second_guard = second.lock().await;
        let (a_state, b_state) = if a_first {
            (&mut *first_guard, &mut *second_guard)
        } else {
            (&mut *second_guard, &mut *first_guard)
        };

        let (Some(a_interface), Some(b_interface)) =
            (a_state.interfaces.first_free(), b_state.interfaces.first_free())
        else {
            let full = if a_state.interfaces.first_free().is_none() { a.id() } else { b.id() };
            warn!("Cannot link R{} and R{}: R{} has no free interface", a.id(), b.id(), full);
            return Err(RoutingError::NoFreeInterface { router: full });
        };

        let network_id = self.next_network_id.fetch_add(1, Ordering::Relaxed);
        let link = Arc::new(Link::new(
            network_id,
            Endpoint { router: a.id(), interface: a_interface, mailbox: a.mailbox().clone() },
            Endpoint { router: b.id(), interface: b_interface, mailbox: b.mailbox().clone() },
        ));
        a_state.add_connection(link.clone())?;
        b_state.add_connection(link)?;

        info!("Network {} up: R{} (if {}) <-> R{} (if {})",
              network_id, a.id(), a_interface, b.id(), b_interface);
        Ok(network_id)
    }

    /// First link found on `a` whose other end is `b`.
    pub async fn find_link(&self, a: &Router, b: &Router) -> Option<Arc<Link>> {
        a.link_to(b.id()).await
    }

    /// Brings the link between `a` and `b` down and tells everyone about it.
    pub async fn shutdown_link(&self, a: &Router, b: &Router) -> Result<NetworkId, RoutingError> {
        let Some(link) = self.find_link(a, b).await else {
            warn!("No link between R{} and R{}", a.id(), b.id());
            return Err(RoutingError::NoLink { a: a.id(), b: b.id() });
        };

        link.bring_down();
        a.take_down(&link).await;
        b.take_down(&link).await;
        Ok(link.network_id())
    }

    /// Takes down every link of `router`, then stops its periodic activities.
    /// Returns the networks that went down.
    pub async fn shutdown_router(&self, router: &Router) -> Vec<NetworkId> {
        let mut downed = Vec::new();

        for link in router.links().await {
            link.bring_down();
            router.take_down(&link).await;

            let neighbor_id = link.other_endpoint(router.id()).router;
            match self.router(neighbor_id).await {
                Some(neighbor) => neighbor.take_down(&link).await,
                None => warn!("R{} is not registered, network {} only detached on R{}",
                              neighbor_id, link.network_id(), router.id()),
            }
            downed.push(link.network_id());
        }

        router.stop();
        info!("Router R{} shut down, {} networks lost", router.id(), downed.len());
        downed
    }

    /// Stops every router in the network.
    pub async fn shutdown(&self) {
        for router in self.routers.read().await.values() {
            router.stop();
        }
    }
}
