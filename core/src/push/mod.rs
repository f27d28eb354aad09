pub mod machine;
pub mod manager;
/// Push channel modules
pub mod protocol;
pub mod transport;

pub use machine::{ConnectionAction, ConnectionEvent, ConnectionMachine, ConnectionState, ConnectionStats};
pub use manager::ConnectionManager;
pub use protocol::{AuthFrame, LiveNotification, PushEvent};
pub use transport::{PushChannel, PushTransport, WsTransport};
