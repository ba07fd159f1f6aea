use serde::{Deserialize, Serialize};
use crate::{HopCount, InterfaceId, NetworkId, RouterId};

/// One route as it travels between neighbors. Attribution is implied by the
/// advertisement's sender.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdvertisedRoute {
    pub network_id: NetworkId,
    pub hop_count: HopCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AdvertisementKind {
    /// Full split-horizon table, sent on the advertise timer.
    Periodic,
    /// Only unreachable routes, sent right after a failure.
    Triggered,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Advertisement {
    pub sender: RouterId,
    /// Slot on the receiving router that the advertisement arrives on.
    pub receiving_interface: InterfaceId,
    pub kind: AdvertisementKind,
    pub routes: Vec<AdvertisedRoute>,
}

/// Messages drained by a router's inbox task.
#[derive(Debug, Clone)]
pub enum Inbound {
    Advertisement(Advertisement),
}
