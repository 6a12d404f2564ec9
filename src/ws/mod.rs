//! WebSocket layer: handshake/admission, transport adaptation, wire types.
//!
//! The operator connects to `GET /ws?robot_id=<id>` with a token in the
//! `token` query parameter or an `Authorization: Bearer` header. Admission
//! happens before the upgrade, so rejections are plain HTTP errors.

pub mod connection;
pub mod gateway;
pub mod handler;
pub mod messages;

pub use gateway::{ConnectionGateway, Handshake, SocketHandler};
