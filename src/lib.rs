//! Client for the HPQ historical market-data query service.
//!
//! The service is exposed over a secure WebSocket: JSON requests go out as
//! text frames, multi-frame JSON responses come back as a run of binary
//! frames terminated by a FIN bit. [`ProtocolClient`] drives the
//! request/response state machine; [`Page`]/[`PageSet`] layer pagination
//! with resume-after-position semantics on top of it.

pub mod body_reader;
pub mod credentials;
pub mod error;
pub mod page;
pub mod position;
pub mod protocol;
pub mod record;
pub mod record_stream;
pub mod timestamp;
pub mod transport;
pub mod util;

#[cfg(any(test, feature = "test-support"))]
pub mod testing;

pub use body_reader::StreamingBodyReader;
pub use credentials::{Credentials, Environment, select_environment};
pub use error::Error;
pub use page::{Page, PageSet};
pub use position::ContinuationPosition;
pub use protocol::{ProtocolClient, QueryState};
pub use record::{ControlMessage, Frame, QueryStatus, Record};
pub use transport::{Transport, WsTransport};
