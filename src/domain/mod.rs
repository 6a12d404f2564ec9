//! Domain layer: identifiers, commands, sessions and the session registry.
//!
//! Everything here is transport- and bus-agnostic. The bridge layer wires
//! these types into the per-session control loop.

pub mod command;
pub mod robot_id;
pub mod session;
pub mod session_id;
pub mod session_registry;

pub use command::{ControlCommand, DrivePayload};
pub use robot_id::RobotId;
pub use session::{Session, SessionState};
pub use session_id::SessionId;
pub use session_registry::{SessionInfo, SessionLease, SessionRegistry};
