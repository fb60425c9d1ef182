pub mod health;
pub mod diagnostics;
pub mod error;
pub mod messages;
pub mod session;
pub mod session_api;

pub use health::*;
pub use diagnostics::*;
pub use error::*;
pub use messages::*;
pub use session::*;
pub use session_api::*;
