//! Session lifecycle: state machine, driver and manager

pub mod manager;
#[allow(clippy::module_inception)]
pub mod session;
pub mod state;

pub use manager::SessionManager;
pub use session::{SessionHandle, SessionId, SessionSnapshot};
pub use state::{SessionEvent, SessionState};
