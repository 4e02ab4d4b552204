//! The request/response state machine driven on top of a [`Transport`].

use tracing::{debug, instrument, warn};

use crate::body_reader::StreamingBodyReader;
use crate::error::Error;
use crate::record::{ControlMessage, QueryStatus};
use crate::transport::Transport;

/// Query lifecycle state. See `spec.md` section 3 for the invariants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    Idle,
    RequestSent,
    Scheduled,
    Accepted,
    AfterResponse,
}

/// Drives one HPQ query at a time over a [`Transport`].
///
/// Exactly one query may be outstanding per client; every state-changing
/// method takes `&mut self`, so the borrow checker enforces the
/// single-outstanding-query precondition at compile time for any call site
/// holding the client exclusively.
pub struct ProtocolClient<T: Transport> {
    transport: Option<T>,
    state: QueryState,
    /// The parsed `accepted` message, retained to report mid-stream failures.
    accepted: Option<ControlMessage>,
    last_frame_fin: bool,
}

impl<T: Transport> ProtocolClient<T> {
    pub fn new(transport: T) -> Self {
        Self {
            transport: Some(transport),
            state: QueryState::Idle,
            accepted: None,
            last_frame_fin: false,
        }
    }

    pub fn state(&self) -> QueryState {
        self.state
    }

    /// Drop the transport. The next call must supply a new one via
    /// [`ProtocolClient::reconnect`].
    pub fn disconnect(&mut self) {
        self.transport = None;
        self.state = QueryState::Idle;
        self.accepted = None;
        self.last_frame_fin = false;
    }

    /// Replace the transport after a [`ProtocolClient::disconnect`].
    pub fn reconnect(&mut self, transport: T) {
        self.transport = Some(transport);
    }

    fn transport_mut(&mut self) -> Result<&mut T, Error> {
        self.transport
            .as_mut()
            .ok_or_else(|| Error::Transport("no transport; call reconnect first".to_owned()))
    }

    /// Encode `obj` as JSON and transmit as a text frame.
    #[instrument(skip(self, obj))]
    pub async fn send_request(&mut self, obj: &serde_json::Value) -> Result<(), Error> {
        let text = serde_json::to_string(obj)
            .map_err(|e| Error::Protocol(format!("serializing request: {e}")))?;
        self.send_request_raw(&text).await
    }

    /// Transmit `text` as-is as a text frame (no JSON encoding).
    pub async fn send_request_raw(&mut self, text: &str) -> Result<(), Error> {
        if self.state != QueryState::Idle {
            return Err(Error::Protocol(format!(
                "send_request called while a query is already outstanding (state {:?})",
                self.state
            )));
        }
        self.transport_mut()?.send_text(text).await?;
        self.state = QueryState::RequestSent;
        Ok(())
    }

    async fn recv_control(&mut self) -> Result<ControlMessage, Error> {
        let text = self.transport_mut()?.recv_text().await?;
        ControlMessage::parse(&text)
    }

    fn reject(&mut self, control: ControlMessage) -> Error {
        self.state = QueryState::Idle;
        Error::Reject { control }
    }

    /// Receive `scheduled` then `accepted`. Returns the parsed `accepted`.
    #[instrument(skip(self))]
    pub async fn begin_response(&mut self) -> Result<ControlMessage, Error> {
        if self.state != QueryState::RequestSent {
            return Err(Error::Protocol(format!(
                "begin_response called in state {:?}, expected RequestSent",
                self.state
            )));
        }

        let scheduled = self.recv_control().await?;
        match scheduled.query_status {
            QueryStatus::Scheduled => self.state = QueryState::Scheduled,
            QueryStatus::Error => return Err(self.reject(scheduled)),
            other => {
                return Err(Error::Protocol(format!(
                    "expected scheduled, got {other:?}"
                )));
            }
        }

        let accepted = self.recv_control().await?;
        match accepted.query_status {
            QueryStatus::Accepted => {
                self.state = QueryState::Accepted;
                self.accepted = Some(accepted.clone());
                debug!("query accepted");
                Ok(accepted)
            }
            QueryStatus::Error => Err(self.reject(accepted)),
            other => Err(Error::Protocol(format!(
                "expected accepted, got {other:?}"
            ))),
        }
    }

    /// Receive and return the next body frame's payload bytes.
    pub async fn next_frame_of_response(&mut self) -> Result<Vec<u8>, Error> {
        let frame = self.transport_mut()?.recv_frame().await?;
        self.last_frame_fin = frame.fin;
        if frame.fin {
            self.state = QueryState::AfterResponse;
        }
        Ok(frame.data)
    }

    /// Whether the most recently received frame had FIN set.
    pub fn finished_response(&self) -> bool {
        self.last_frame_fin
    }

    /// Receive `complete`, returning to IDLE. A mid-stream `error` is
    /// surfaced as [`Error::MidStream`] carrying the cached `accepted`.
    #[instrument(skip(self))]
    pub async fn end_response(&mut self) -> Result<(), Error> {
        if self.state != QueryState::AfterResponse {
            return Err(Error::Protocol(format!(
                "end_response called in state {:?}, expected AfterResponse",
                self.state
            )));
        }
        let control = self.recv_control().await?;
        match control.query_status {
            QueryStatus::Complete => {
                self.state = QueryState::Idle;
                Ok(())
            }
            QueryStatus::Error => {
                self.state = QueryState::Idle;
                let accepted = self
                    .accepted
                    .clone()
                    .expect("accepted is always cached before a body frame can exist");
                Err(Error::MidStream { accepted, control })
            }
            other => Err(Error::Protocol(format!(
                "expected complete, got {other:?}"
            ))),
        }
    }

    /// Convenience: send, begin, drain all frames as UTF-8 JSON, end, and
    /// return the parsed body.
    pub async fn request(&mut self, obj: &serde_json::Value) -> Result<serde_json::Value, Error> {
        self.send_request(obj).await?;
        self.begin_response().await?;
        let mut body = Vec::new();
        loop {
            let chunk = self.next_frame_of_response().await?;
            body.extend_from_slice(&chunk);
            if self.finished_response() {
                break;
            }
        }
        self.end_response().await?;
        serde_json::from_slice(&body)
            .map_err(|e| Error::Protocol(format!("response body is not valid JSON: {e}")))
    }

    /// Convenience: send, begin, and return a streaming reader over the body.
    pub async fn stream(&mut self, obj: &serde_json::Value) -> Result<StreamingBodyReader<'_, T>, Error> {
        self.send_request(obj).await?;
        self.begin_response().await?;
        Ok(StreamingBodyReader::new(self))
    }

    /// Receive one control message; `Canceled` fully cancels (state IDLE,
    /// returns `true`); `expected` advances to `on_match` (returns `false`);
    /// anything else is a protocol error.
    async fn try_consume(
        &mut self,
        expected: QueryStatus,
        on_match: QueryState,
    ) -> Result<bool, Error> {
        let control = self.recv_control().await?;
        if control.query_status == QueryStatus::Canceled {
            self.state = QueryState::Idle;
            return Ok(true);
        }
        if control.query_status == expected {
            self.state = on_match;
            return Ok(false);
        }
        self.state = QueryState::Idle;
        Err(Error::Protocol(format!(
            "cancel: expected {expected:?} or canceled, got {:?}",
            control.query_status
        )))
    }

    /// Bring the connection back to IDLE without losing frame sync,
    /// absorbing every place the cancel token can race a control boundary.
    #[instrument(skip(self))]
    pub async fn cancel(&mut self) -> Result<(), Error> {
        match self.state {
            QueryState::Idle => return Ok(()),
            QueryState::AfterResponse => return self.end_response().await,
            _ => {}
        }

        self.transport_mut()?.send_text("cancel\n").await?;

        if self.state == QueryState::RequestSent
            && self
                .try_consume(QueryStatus::Scheduled, QueryState::Scheduled)
                .await?
        {
            return Ok(());
        }
        if self.state == QueryState::Scheduled
            && self
                .try_consume(QueryStatus::Accepted, QueryState::Accepted)
                .await?
        {
            return Ok(());
        }

        // state is now Accepted: drain the body, watching for a FIN frame
        // whose payload is itself a `canceled` sentinel (the server
        // suppresses the body entirely when the cancel beats the first
        // chunk out the door).
        loop {
            let frame = self.transport_mut()?.recv_frame().await?;
            if frame.fin {
                let canceled = String::from_utf8(frame.data)
                    .ok()
                    .and_then(|text| ControlMessage::try_parse(&text))
                    .is_some_and(|c| c.query_status == QueryStatus::Canceled);
                if canceled {
                    self.state = QueryState::Idle;
                    return Ok(());
                }
                break;
            }
        }

        // Terminal control message: normally `complete`, but a cancel that
        // arrives with no in-flight request races the server into treating
        // the "cancel\n" text itself as an unparseable new request, so
        // `error` is an equally valid terminus here.
        let control = self.recv_control().await?;
        self.state = QueryState::Idle;
        match control.query_status {
            QueryStatus::Canceled | QueryStatus::Complete | QueryStatus::Error => Ok(()),
            other => {
                warn!(?other, "unexpected control message terminating cancel");
                Err(Error::Protocol(format!(
                    "cancel: expected complete/error/canceled, got {other:?}"
                )))
            }
        }
    }
}
