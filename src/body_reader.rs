//! Byte-oriented reader over a query's body frames.

use crate::error::Error;
use crate::protocol::ProtocolClient;
use crate::transport::Transport;

/// Exposes the concatenation of a response's body frames as a single byte
/// stream. Borrows the client for its lifetime; dropping it mid-stream
/// leaves the client in `AFTER_RESPONSE` or `ACCEPTED` — callers that
/// abandon a stream early must call [`ProtocolClient::cancel`] themselves.
pub struct StreamingBodyReader<'a, T: Transport> {
    client: &'a mut ProtocolClient<T>,
    /// Tail of a frame that didn't fit into the caller's last buffer.
    carry: Vec<u8>,
    fin_observed: bool,
    end_response_called: bool,
}

impl<'a, T: Transport> StreamingBodyReader<'a, T> {
    pub(crate) fn new(client: &'a mut ProtocolClient<T>) -> Self {
        Self {
            client,
            carry: Vec::new(),
            fin_observed: false,
            end_response_called: false,
        }
    }

    /// Fill `buf` with as many body bytes as are immediately available,
    /// returning the number of bytes written. Returns `0` only at true
    /// end-of-stream; any `MidStream` failure from the trailing
    /// `end_response` surfaces on the read call that observes FIN.
    pub async fn read_into(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        if !self.carry.is_empty() {
            let n = self.carry.len().min(buf.len());
            buf[..n].copy_from_slice(&self.carry[..n]);
            self.carry.drain(..n);
            return Ok(n);
        }

        while !self.fin_observed {
            let frame = self.client.next_frame_of_response().await?;
            self.fin_observed = self.client.finished_response();
            if frame.is_empty() {
                continue;
            }
            if frame.len() <= buf.len() {
                buf[..frame.len()].copy_from_slice(&frame);
                return Ok(frame.len());
            }
            let n = buf.len();
            buf.copy_from_slice(&frame[..n]);
            self.carry = frame[n..].to_vec();
            return Ok(n);
        }

        if !self.end_response_called {
            self.end_response_called = true;
            self.client.end_response().await?;
        }
        Ok(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::QueryState;
    use crate::testing::MockTransport;

    async fn drain(reader: &mut StreamingBodyReader<'_, MockTransport>, buf_len: usize) -> Vec<u8> {
        let mut out = Vec::new();
        let mut buf = vec![0u8; buf_len];
        loop {
            let n = reader.read_into(&mut buf).await.unwrap();
            if n == 0 {
                break;
            }
            out.extend_from_slice(&buf[..n]);
        }
        out
    }

    #[tokio::test]
    async fn s2_streaming_split_with_four_byte_buffer() {
        let transport = MockTransport::new()
            .control("scheduled")
            .control("accepted")
            .frame(br#"[{"a":1},"#.to_vec(), false)
            .frame(br#"{"a":2}]"#.to_vec(), true)
            .control("complete");
        let mut client = ProtocolClient::new(transport);
        client.send_request(&serde_json::json!({"q": "x"})).await.unwrap();
        client.begin_response().await.unwrap();

        let mut reader = StreamingBodyReader::new(&mut client);
        let body = drain(&mut reader, 4).await;
        assert_eq!(body, br#"[{"a":1},{"a":2}]"#.to_vec());
        assert_eq!(client.state(), QueryState::Idle);
    }

    #[tokio::test]
    async fn body_preserved_with_one_byte_buffer() {
        let transport = MockTransport::new()
            .control("scheduled")
            .control("accepted")
            .frame(b"hello ".to_vec(), false)
            .frame(b"world".to_vec(), true)
            .control("complete");
        let mut client = ProtocolClient::new(transport);
        client.send_request(&serde_json::json!({"q": "x"})).await.unwrap();
        client.begin_response().await.unwrap();

        let mut reader = StreamingBodyReader::new(&mut client);
        let body = drain(&mut reader, 1).await;
        assert_eq!(body, b"hello world".to_vec());
    }

    #[tokio::test]
    async fn empty_frames_are_skipped_not_surfaced_as_eof() {
        let transport = MockTransport::new()
            .control("scheduled")
            .control("accepted")
            .frame(Vec::new(), false)
            .frame(b"x".to_vec(), true)
            .control("complete");
        let mut client = ProtocolClient::new(transport);
        client.send_request(&serde_json::json!({"q": "x"})).await.unwrap();
        client.begin_response().await.unwrap();

        let mut reader = StreamingBodyReader::new(&mut client);
        let mut buf = [0u8; 8];
        let n = reader.read_into(&mut buf).await.unwrap();
        assert_eq!(&buf[..n], b"x");
    }

    #[tokio::test]
    async fn eof_is_sticky_and_does_not_recall_end_response() {
        let transport = MockTransport::new()
            .control("scheduled")
            .control("accepted")
            .frame(b"x".to_vec(), true)
            .control("complete");
        let mut client = ProtocolClient::new(transport);
        client.send_request(&serde_json::json!({"q": "x"})).await.unwrap();
        client.begin_response().await.unwrap();

        let mut reader = StreamingBodyReader::new(&mut client);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read_into(&mut buf).await.unwrap(), 1);
        assert_eq!(reader.read_into(&mut buf).await.unwrap(), 0);
        // Second EOF read must not attempt another end_response recv.
        assert_eq!(reader.read_into(&mut buf).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn mid_stream_error_surfaces_on_terminating_read() {
        let transport = MockTransport::new()
            .control("scheduled")
            .control("accepted")
            .frame(b"x".to_vec(), true)
            .control_json(r#"{"query_status":"error"}"#);
        let mut client = ProtocolClient::new(transport);
        client.send_request(&serde_json::json!({"q": "x"})).await.unwrap();
        client.begin_response().await.unwrap();

        let mut reader = StreamingBodyReader::new(&mut client);
        let mut buf = [0u8; 8];
        assert_eq!(reader.read_into(&mut buf).await.unwrap(), 1);
        let err = reader.read_into(&mut buf).await.unwrap_err();
        assert!(matches!(err, Error::MidStream { .. }));
    }
}
