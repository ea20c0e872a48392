// apsim-api: wire protocol and WebSocket transport for the placement simulator

pub mod error;
pub mod protocol;
pub mod websocket;

pub use error::Error;
pub use protocol::{
    EntityAdded, EntityKind, EntityRemoved, InboundFrame, Outbound, Position, PositionUpdate,
    RssiUpdate, ServerId,
};
pub use websocket::{Connection, Connector, Peer, SocketEvent, WebSocketConnector};
