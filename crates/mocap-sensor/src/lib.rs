pub mod protocol;
pub mod session;
pub mod transport;

pub use protocol::{decode, ProtocolError, SensorEvent};
pub use session::{SessionEvent, SessionHub, CMD_CALIBRATE, CMD_START};
pub use transport::{Connection, Dialer, LinkEvent, MockDialer, MockPeer, WsDialer};
