pub mod connection;
pub mod hub;
pub mod reader;
pub mod writer;

pub use connection::Connection;
pub use hub::{Hub, HubHandle};
