use thiserror::Error;

use crate::{InterfaceId, RouterId};

/// Rejected topology operations. Every variant leaves the routers involved unmodified.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RoutingError {
    #[error("router {router} has no free interface slot")]
    NoFreeInterface { router: RouterId },

    #[error("interface {interface} on router {router} is already bound")]
    InterfaceOccupied { router: RouterId, interface: InterfaceId },

    #[error("router {0} cannot be linked to itself")]
    SelfLink(RouterId),

    #[error("no link between routers {a} and {b}")]
    NoLink { a: RouterId, b: RouterId },
}
