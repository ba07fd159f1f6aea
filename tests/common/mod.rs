#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use rip_sim::network::{Endpoint, Link, Mailbox};
use rip_sim::protocol::{Advertisement, Inbound, INFINITY};
use rip_sim::{DeliveryConfig, Network, NetworkId, ProtocolConfig, Router, RouterId};
use tokio::sync::mpsc;

pub fn config() -> ProtocolConfig {
    ProtocolConfig::default()
}

pub async fn settle(secs: u64) {
    tokio::time::sleep(Duration::from_secs(secs)).await;
}

/// Lets queued advertisements be processed without crossing any timer boundary.
pub async fn drain() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}

/// Routers plus the (router, router, network) edges they were wired with.
pub struct Topology {
    pub network: Network,
    pub routers: Vec<Router>,
    pub edges: Vec<(usize, usize, NetworkId)>,
}

impl Topology {
    pub async fn build(config: ProtocolConfig, count: usize, edges: &[(usize, usize)]) -> Self {
        let network = Network::new(config);
        let mut routers = Vec::new();
        for _ in 0..count {
            routers.push(network.add_router().await);
        }

        let mut wired = Vec::new();
        for &(a, b) in edges {
            let network_id = network
                .connect(&routers[a], &routers[b])
                .await
                .expect("free interfaces");
            wired.push((a, b, network_id));
        }

        Self { network, routers, edges: wired }
    }

    pub fn network_between(&self, a: usize, b: usize) -> NetworkId {
        self.edges
            .iter()
            .find(|(x, y, _)| (*x == a && *y == b) || (*x == b && *y == a))
            .map(|(_, _, n)| *n)
            .expect("edge exists")
    }

    /// Expected hop count from every router to every network over the live edges.
    pub fn shortest_paths(&self) -> Vec<BTreeMap<NetworkId, u8>> {
        let mut adjacency: HashMap<usize, Vec<usize>> = HashMap::new();
        for &(a, b, _) in &self.edges {
            adjacency.entry(a).or_default().push(b);
            adjacency.entry(b).or_default().push(a);
        }

        (0..self.routers.len())
            .map(|source| {
                let distances = bfs(source, &adjacency);
                let mut expected = BTreeMap::new();
                for &(a, b, network_id) in &self.edges {
                    let best = [a, b].iter().filter_map(|e| distances.get(e)).min().copied();
                    if let Some(hops) = best {
                        expected.insert(network_id, hops.min(INFINITY as usize) as u8);
                    }
                }
                expected
            })
            .collect()
    }

    pub fn forget_edge(&mut self, network_id: NetworkId) {
        self.edges.retain(|(_, _, n)| *n != network_id);
    }

    pub async fn hop_counts(&self, router: usize) -> BTreeMap<NetworkId, u8> {
        self.routers[router]
            .routing_table()
            .await
            .entries
            .into_iter()
            .map(|e| (e.network_id, e.hop_count))
            .collect()
    }
}

fn bfs(source: usize, adjacency: &HashMap<usize, Vec<usize>>) -> HashMap<usize, usize> {
    let mut distances = HashMap::from([(source, 0)]);
    let mut queue = VecDeque::from([source]);
    while let Some(node) = queue.pop_front() {
        let next = distances[&node] + 1;
        for &neighbor in adjacency.get(&node).into_iter().flatten() {
            if !distances.contains_key(&neighbor) {
                distances.insert(neighbor, next);
                queue.push_back(neighbor);
            }
        }
    }
    distances
}

/// A fake neighbor whose inbound queue is owned by the test.
pub struct Probe {
    pub id: RouterId,
    pub link: Arc<Link>,
    pub inbox: mpsc::UnboundedReceiver<Inbound>,
}

impl Probe {
    pub async fn attach(router: &Router, id: RouterId, network_id: NetworkId) -> Self {
        let (tx, inbox) = mpsc::unbounded_channel();
        let interface = router.first_free_interface().await.expect("free interface");
        let link = Arc::new(Link::new(
            network_id,
            Endpoint { router: router.id(), interface, mailbox: router.mailbox().clone() },
            Endpoint { router: id, interface: 0, mailbox: Mailbox::new(id, tx, DeliveryConfig::default()) },
        ));
        router.add_connection(link.clone()).await.expect("slot is free");
        Self { id, link, inbox }
    }

    pub fn received(&mut self) -> Vec<Advertisement> {
        let mut received = Vec::new();
        while let Ok(Inbound::Advertisement(ad)) = self.inbox.try_recv() {
            received.push(ad);
        }
        received
    }
}
