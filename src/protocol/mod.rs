pub mod messages;
pub mod routing_table;
pub mod task_manager;

pub use messages::*;
pub use routing_table::*;
