pub mod config;
pub mod error;
pub mod network;
pub mod protocol;
pub mod router;

use std::sync::Arc;
use tokio::sync::Mutex;

pub use config::{DeliveryConfig, ProtocolConfig};
pub use error::RoutingError;
pub use network::{Link, Network};
pub use protocol::{RoutingEntry, RoutingTableSnapshot, INFINITY};
pub use router::Router;

pub type RouterId = u32;
pub type NetworkId = u32;
/// Index of a slot in a router's interface table.
pub type InterfaceId = usize;
pub type HopCount = u8;

pub type SharedRouterState = Arc<Mutex<router::RouterState>>;
