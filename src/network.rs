pub mod interface;
pub mod link;
pub mod topology;

pub use interface::InterfaceTable;
pub use link::{Endpoint, Link, Mailbox};
pub use topology::Network;
