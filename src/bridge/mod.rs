//! Control bridge: codec, rate limiter, watchdog, publisher and the
//! session loop that wires them together.
//!
//! ```text
//! frame ──▶ CommandCodec ──▶ RateLimiter ──tick──▶ CommandPublisher ──▶ bus
//!                │                                        ▲
//!                └── reset ──▶ Watchdog ──expired: STOP───┘
//! ```

pub mod codec;
pub mod publisher;
pub mod rate_limiter;
pub mod session_manager;
pub mod watchdog;

pub use codec::CommandCodec;
pub use publisher::CommandPublisher;
pub use rate_limiter::RateLimiter;
pub use session_manager::{
    CloseReason, SessionHandle, SessionManager, SessionOutcome, SessionSettings, TransportEvent,
};
pub use watchdog::Watchdog;
