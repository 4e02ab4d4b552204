//! Error taxonomy for the HPQ client.

use crate::record::ControlMessage;

/// Errors raised while driving the query state machine.
///
/// `Reject` and `MidStream` are expected server-side outcomes and carry the
/// control message that produced them; `Protocol` indicates a contract
/// break (the connection should be considered corrupt); `Transport` is any
/// underlying I/O failure, fatal to the connection.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Server returned `error` before any body frame was observed.
    #[error("query rejected: {control:?}")]
    Reject { control: ControlMessage },

    /// Server returned `error` at the `complete` slot, i.e. after at least
    /// one body frame. Carries the previously cached `accepted` descriptor.
    #[error("query failed mid-stream: {control:?} (accepted was {accepted:?})")]
    MidStream {
        accepted: ControlMessage,
        control: ControlMessage,
    },

    /// A control message lacked `query_status`, or carried an unexpected
    /// status for the current state.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Underlying transport I/O failure.
    #[error("transport error: {0}")]
    Transport(String),
}
