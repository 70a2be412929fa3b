//! Network collaborators of the supervisor.
//!
//! * `port_mapper` - opening and closing external port forwards
//! * `players` - asking a running server for its player count
mod players;
mod port_mapper;

pub use players::{LegacyPing, PlayerCount, PlayerCounter, parse_reply};
pub use port_mapper::{NoopPortMapper, PortMapper};
