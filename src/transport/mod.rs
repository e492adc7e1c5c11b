// Transport layer
// - codec.rs: Content-Length framing
// - message.rs: JSON-RPC message shapes
// - connection.rs: I/O task, request correlation, notification queue

pub mod codec;
pub mod connection;
pub mod message;

pub use connection::Connection;
pub use message::{AnyNotification, AnyRequest, AnyResponse, RequestId, ResponseError};
