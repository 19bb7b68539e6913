mod notifier;
mod policy;
mod transport;

pub use notifier::{Connection, ConnectionState, ListenerId, Notifier};
pub use policy::ReconnectPolicy;
pub use transport::{RealtimeError, SocketStream, SocketTransport, WsTransport};
