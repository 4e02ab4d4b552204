//! In-memory scripted [`Transport`] for state-machine tests.
//!
//! Modeled on `rt_test_utils::MockWsClient`, minus the real socket: a test
//! scripts the exact sequence of control messages and body frames the
//! "server" will hand back, then drives a [`crate::protocol::ProtocolClient`]
//! against it.

use std::collections::VecDeque;

use crate::error::Error;
use crate::record::Frame;
use crate::transport::Transport;

enum Event {
    Control(String),
    Frame(Vec<u8>, bool),
}

/// Scripted transport. Push expected server events with [`MockTransport::control`]
/// and [`MockTransport::frame`], then hand it to [`crate::protocol::ProtocolClient::new`].
#[derive(Default)]
pub struct MockTransport {
    incoming: VecDeque<Event>,
    /// Every text frame the client sent, in order.
    pub sent: Vec<String>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a control message the mock server will hand back on the next
    /// `recv_text`.
    pub fn control(mut self, query_status: &str) -> Self {
        self.incoming
            .push_back(Event::Control(format!(r#"{{"query_status":"{query_status}"}}"#)));
        self
    }

    /// Queue a control message with extra opaque fields.
    pub fn control_json(mut self, json: impl Into<String>) -> Self {
        self.incoming.push_back(Event::Control(json.into()));
        self
    }

    /// Queue a body frame.
    pub fn frame(mut self, data: impl Into<Vec<u8>>, fin: bool) -> Self {
        self.incoming.push_back(Event::Frame(data.into(), fin));
        self
    }
}

impl Transport for MockTransport {
    async fn send_text(&mut self, text: &str) -> Result<(), Error> {
        self.sent.push(text.to_owned());
        Ok(())
    }

    async fn recv_text(&mut self) -> Result<String, Error> {
        match self.incoming.pop_front() {
            Some(Event::Control(text)) => Ok(text),
            Some(Event::Frame(..)) => Err(Error::Protocol(
                "mock transport: expected control message, next queued event is a frame"
                    .to_owned(),
            )),
            None => Err(Error::Transport("mock transport: exhausted".to_owned())),
        }
    }

    async fn recv_frame(&mut self) -> Result<Frame, Error> {
        match self.incoming.pop_front() {
            Some(Event::Frame(data, fin)) => Ok(Frame { data, fin }),
            Some(Event::Control(text)) => Err(Error::Protocol(format!(
                "mock transport: expected frame, next queued event is control message {text}"
            ))),
            None => Err(Error::Transport("mock transport: exhausted".to_owned())),
        }
    }
}
