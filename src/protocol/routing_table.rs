use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

use super::messages::AdvertisedRoute;
use crate::{HopCount, InterfaceId, NetworkId, RouterId};

/// Hop count meaning "unreachable".
pub const INFINITY: HopCount = 16;

/// Metric of a route one hop further than `advertised`, saturating at [`INFINITY`].
pub fn hop_after(advertised: HopCount) -> HopCount {
    if advertised >= INFINITY {
        INFINITY
    } else {
        advertised + 1
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingEntry {
    pub network_id: NetworkId,
    pub interface_id: InterfaceId,
    pub hop_count: HopCount,
    /// `None` for directly connected networks.
    pub learned_from: Option<RouterId>,
    /// Invalidation checks since the entry was last refreshed.
    pub not_updated_for: u32,
}

impl RoutingEntry {
    pub fn direct(network_id: NetworkId, interface_id: InterfaceId) -> Self {
        Self {
            network_id,
            interface_id,
            hop_count: 0,
            learned_from: None,
            not_updated_for: 0,
        }
    }

    pub fn learned(
        network_id: NetworkId,
        interface_id: InterfaceId,
        hop_count: HopCount,
        learned_from: RouterId,
    ) -> Self {
        Self {
            network_id,
            interface_id,
            hop_count: hop_count.min(INFINITY),
            learned_from: Some(learned_from),
            not_updated_for: 0,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.learned_from.is_none()
    }

    pub fn is_reachable(&self) -> bool {
        self.hop_count < INFINITY
    }

    fn advertised(&self) -> AdvertisedRoute {
        AdvertisedRoute {
            network_id: self.network_id,
            hop_count: self.hop_count,
        }
    }
}

/// What a single received advertisement changed.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub adopted: usize,
    pub refreshed: usize,
    pub invalidated: usize,
    /// A reachable route became unreachable; neighbors must hear about it now.
    pub needs_triggered_update: bool,
}

impl UpdateOutcome {
    pub fn changed(&self) -> bool {
        self.adopted > 0 || self.invalidated > 0
    }
}

/// One entry per destination network.
#[derive(Debug, Clone, Default)]
pub struct RoutingTable {
    entries: BTreeMap<NetworkId, RoutingEntry>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Direct knowledge replaces whatever was learned about the network.
    pub fn add_direct(&mut self, network_id: NetworkId, interface_id: InterfaceId) {
        self.entries
            .insert(network_id, RoutingEntry::direct(network_id, interface_id));
    }

    /// Removes the directly connected entry for `network_id`, leaving learned ones alone.
    pub fn remove_direct(&mut self, network_id: NetworkId) -> bool {
        match self.entries.get(&network_id) {
            Some(entry) if entry.is_direct() => {
                self.entries.remove(&network_id);
                true
            }
            _ => false,
        }
    }

    /// Bellman-Ford relaxation of one neighbor advertisement.
    pub fn apply_advertisement(
        &mut self,
        receiving_interface: InterfaceId,
        sender: RouterId,
        routes: &[AdvertisedRoute],
    ) -> UpdateOutcome {
        let mut outcome = UpdateOutcome::default();

        for route in routes {
            let advertised = route.hop_count.min(INFINITY);
            let candidate = hop_after(advertised);

            let Some(existing) = self.entries.get_mut(&route.network_id) else {
                self.entries.insert(
                    route.network_id,
                    RoutingEntry::learned(route.network_id, receiving_interface, candidate, sender),
                );
                outcome.adopted += 1;
                continue;
            };

            if existing.is_direct() {
                continue;
            }

            if advertised == INFINITY && existing.is_reachable() {
                existing.interface_id = receiving_interface;
                existing.hop_count = INFINITY;
                existing.learned_from = Some(sender);
                existing.not_updated_for = 0;
                outcome.invalidated += 1 + self.invalidate_learned_from(sender);
                outcome.needs_triggered_update = true;
            } else if candidate < existing.hop_count {
                existing.interface_id = receiving_interface;
                existing.hop_count = candidate;
                existing.learned_from = Some(sender);
                existing.not_updated_for = 0;
                outcome.adopted += 1;
            } else if existing.learned_from == Some(sender)
                && existing.is_reachable()
                && candidate == existing.hop_count
            {
                existing.not_updated_for = 0;
                outcome.refreshed += 1;
            }
        }

        outcome
    }

    /// Marks every reachable route learned from `router` unreachable.
    pub fn invalidate_learned_from(&mut self, router: RouterId) -> usize {
        let mut count = 0;
        for entry in self.entries.values_mut() {
            if entry.learned_from == Some(router) && entry.is_reachable() {
                entry.hop_count = INFINITY;
                count += 1;
            }
        }
        count
    }

    /// Marks every route leaving through `interface_id` unreachable, direct ones included.
    pub fn poison_interface(&mut self, interface_id: InterfaceId) -> usize {
        let mut count = 0;
        for entry in self.entries.values_mut() {
            if entry.interface_id == interface_id && entry.is_reachable() {
                entry.hop_count = INFINITY;
                count += 1;
            }
        }
        count
    }

    /// Ages every learned entry by one check and drops those that reached `threshold`.
    pub fn age(&mut self, threshold: u32) -> Vec<NetworkId> {
        let mut expired = Vec::new();
        for entry in self.entries.values_mut().filter(|e| !e.is_direct()) {
            entry.not_updated_for += 1;
            if entry.not_updated_for >= threshold {
                expired.push(entry.network_id);
            }
        }
        for network_id in &expired {
            self.entries.remove(network_id);
        }
        expired
    }

    /// Reachable routes that may be told to `neighbor` (split horizon).
    pub fn split_horizon_for(&self, neighbor: RouterId) -> Vec<AdvertisedRoute> {
        self.entries
            .values()
            .filter(|e| e.learned_from != Some(neighbor) && e.is_reachable())
            .map(RoutingEntry::advertised)
            .collect()
    }

    pub fn unreachable_routes(&self) -> Vec<AdvertisedRoute> {
        self.entries
            .values()
            .filter(|e| !e.is_reachable())
            .map(RoutingEntry::advertised)
            .collect()
    }

    pub fn get(&self, network_id: NetworkId) -> Option<&RoutingEntry> {
        self.entries.get(&network_id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &RoutingEntry> {
        self.entries.values()
    }

    /// Independent copy of every entry, ordered by network id.
    pub fn entries(&self) -> Vec<RoutingEntry> {
        self.entries.values().cloned().collect()
    }
}

/// Point-in-time copy of a router's table, detached from the live state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RoutingTableSnapshot {
    pub router_id: RouterId,
    pub taken_at: DateTime<Utc>,
    pub entries: Vec<RoutingEntry>,
}

impl RoutingTableSnapshot {
    pub fn new(router_id: RouterId, table: &RoutingTable) -> Self {
        Self {
            router_id,
            taken_at: Utc::now(),
            entries: table.entries(),
        }
    }

    pub fn get(&self, network_id: NetworkId) -> Option<&RoutingEntry> {
        self.entries.iter().find(|e| e.network_id == network_id)
    }

    pub fn hop_count(&self, network_id: NetworkId) -> Option<HopCount> {
        self.get(network_id).map(|e| e.hop_count)
    }
}

impl fmt::Display for RoutingTableSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "=== R{} ({}) ===", self.router_id, self.taken_at.format("%H:%M:%S%.3f"))?;
        writeln!(f, "{:<10} {:<10} {:<6} {:<12} {:<8}",
                 "Network", "Interface", "Hops", "Learned from", "Age")?;
        writeln!(f, "{}", "-".repeat(50))?;

        if self.entries.is_empty() {
            return writeln!(f, "No routes");
        }

        for entry in &self.entries {
            let source = match entry.learned_from {
                Some(router) => format!("R{}", router),
                None => "direct".to_string(),
            };
            let hops = if entry.is_reachable() {
                entry.hop_count.to_string()
            } else {
                "inf".to_string()
            };
            writeln!(f, "{:<10} {:<10} {:<6} {:<12} {:<8}",
                     entry.network_id,
                     entry.interface_id,
                     hops,
                     source,
                     entry.not_updated_for)?;
        }
        Ok(())
    }
}
