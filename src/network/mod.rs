//! Network module - secure transport, message catalog, protocol connection,
//! handshake, status exchange and the request/serve loop.

pub mod codec;
pub mod connection;
pub mod enode;
pub mod handshake;
pub mod message;
pub mod secure;
pub mod serve;
pub mod status;
pub mod transport;

pub use codec::{Frame, FrameCodec};
pub use connection::{dial, dial_with_newest_generation, Connection, DeadlineGuard, ETH_64, ETH_65, ETH_66};
pub use enode::NodeRecord;
pub use message::{Capability, GetBlockHeaders, Hello, LocalError, Message, Status};
pub use serve::{RequestMode, ServeLoop};
pub use transport::{FramedChannel, SecureChannel};
