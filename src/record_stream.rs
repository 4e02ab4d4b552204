//! Pull-based streaming extraction of JSON array items from a body.
//!
//! No crate in reach offers an `ijson`-style streaming path extractor, so
//! this is a small hand-rolled byte scanner: it tracks bracket depth and
//! string-escape state across `StreamingBodyReader` chunks and hands each
//! top-level array element to `serde_json` only once its bytes are
//! complete. The body is never buffered in full.

use crate::body_reader::StreamingBodyReader;
use crate::error::Error;
use crate::record::Record;
use crate::transport::Transport;

enum Next {
    Value,
    End,
}

/// Extracts records one at a time from a body that is a JSON array (path
/// `item`, in `ijson` terms).
pub struct RecordStream<'a, T: Transport> {
    reader: StreamingBodyReader<'a, T>,
    buf: Vec<u8>,
    cursor: usize,
    seen_open_bracket: bool,
    done: bool,
}

impl<'a, T: Transport> RecordStream<'a, T> {
    pub fn new(reader: StreamingBodyReader<'a, T>) -> Self {
        Self {
            reader,
            buf: Vec::new(),
            cursor: 0,
            seen_open_bracket: false,
            done: false,
        }
    }

    /// Pull the next record's raw JSON as a [`serde_json::Value`]. `Ok(None)`
    /// on the array's closing `]`.
    pub async fn next_item(&mut self) -> Result<Option<serde_json::Value>, Error> {
        if self.done {
            return Ok(None);
        }
        match self.skip_to_value_or_end().await? {
            Next::End => {
                self.done = true;
                // Nothing follows the closing bracket; pull the body
                // reader to its own EOF so it runs `end_response` now
                // rather than leaving the client stuck in AFTER_RESPONSE.
                self.drain_to_eof().await?;
                Ok(None)
            }
            Next::Value => {
                let bytes = self.take_value_bytes().await?;
                let value = serde_json::from_slice(&bytes)
                    .map_err(|e| Error::Protocol(format!("invalid record JSON: {e}")))?;
                Ok(Some(value))
            }
        }
    }

    /// Pull the next record as a typed [`Record`].
    pub async fn next_record(&mut self) -> Result<Option<Record>, Error> {
        match self.next_item().await? {
            None => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| Error::Protocol(format!("record missing required fields: {e}"))),
        }
    }

    async fn drain_to_eof(&mut self) -> Result<(), Error> {
        let mut scratch = [0u8; 256];
        while self.reader.read_into(&mut scratch).await? != 0 {}
        Ok(())
    }

    async fn fill(&mut self) -> Result<bool, Error> {
        if self.cursor > 0 {
            self.buf.drain(..self.cursor);
            self.cursor = 0;
        }
        let mut chunk = [0u8; 4096];
        let n = self.reader.read_into(&mut chunk).await?;
        if n == 0 {
            return Ok(false);
        }
        self.buf.extend_from_slice(&chunk[..n]);
        Ok(true)
    }

    /// Consume whitespace, the opening `[`, and item-separating commas.
    /// Stops right before the next value, or past the closing `]`.
    async fn skip_to_value_or_end(&mut self) -> Result<Next, Error> {
        loop {
            while self.cursor < self.buf.len() {
                let b = self.buf[self.cursor];
                match b {
                    b' ' | b'\t' | b'\n' | b'\r' => self.cursor += 1,
                    b'[' if !self.seen_open_bracket => {
                        self.seen_open_bracket = true;
                        self.cursor += 1;
                    }
                    b',' if self.seen_open_bracket => self.cursor += 1,
                    b']' if self.seen_open_bracket => {
                        self.cursor += 1;
                        return Ok(Next::End);
                    }
                    _ if self.seen_open_bracket => return Ok(Next::Value),
                    other => {
                        return Err(Error::Protocol(format!(
                            "expected '[' at body start, got byte {other:#x}"
                        )));
                    }
                }
            }
            if !self.fill().await? {
                return Err(Error::Protocol(
                    "body ended before the array was closed".to_owned(),
                ));
            }
        }
    }

    /// Scan one complete JSON value (object, array, string, or bare token)
    /// starting at `cursor`, pulling more bytes as needed.
    async fn take_value_bytes(&mut self) -> Result<Vec<u8>, Error> {
        let mut depth: i32 = 0;
        let mut in_string = false;
        let mut escape = false;
        let mut started = false;
        let start = self.cursor;

        loop {
            while self.cursor < self.buf.len() {
                let b = self.buf[self.cursor];

                if in_string {
                    self.cursor += 1;
                    if escape {
                        escape = false;
                    } else if b == b'\\' {
                        escape = true;
                    } else if b == b'"' {
                        in_string = false;
                        if depth == 0 {
                            return Ok(self.buf[start..self.cursor].to_vec());
                        }
                    }
                    continue;
                }

                match b {
                    b'"' => {
                        in_string = true;
                        started = true;
                        self.cursor += 1;
                    }
                    b'{' | b'[' => {
                        depth += 1;
                        started = true;
                        self.cursor += 1;
                    }
                    b'}' | b']' => {
                        if depth == 0 {
                            // Terminator of a bare scalar value: don't consume it.
                            return Ok(self.buf[start..self.cursor].to_vec());
                        }
                        depth -= 1;
                        self.cursor += 1;
                        if depth == 0 {
                            return Ok(self.buf[start..self.cursor].to_vec());
                        }
                    }
                    b',' if depth == 0 && started => {
                        return Ok(self.buf[start..self.cursor].to_vec());
                    }
                    b' ' | b'\t' | b'\n' | b'\r' if depth == 0 && started => {
                        return Ok(self.buf[start..self.cursor].to_vec());
                    }
                    _ => {
                        started = true;
                        self.cursor += 1;
                    }
                }
            }
            if !self.fill().await? {
                if started && depth == 0 {
                    return Ok(self.buf[start..self.cursor].to_vec());
                }
                return Err(Error::Protocol("body truncated mid-value".to_owned()));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::ProtocolClient;
    use crate::testing::MockTransport;

    async fn records(body_frames: Vec<(&[u8], bool)>) -> Vec<Record> {
        let mut transport = MockTransport::new().control("scheduled").control("accepted");
        for (data, fin) in body_frames {
            transport = transport.frame(data.to_vec(), fin);
        }
        let transport = transport.control("complete");
        let mut client = ProtocolClient::new(transport);
        client.send_request(&serde_json::json!({"q": "x"})).await.unwrap();
        client.begin_response().await.unwrap();

        let reader = StreamingBodyReader::new(&mut client);
        let mut stream = RecordStream::new(reader);
        let mut out = Vec::new();
        while let Some(record) = stream.next_record().await.unwrap() {
            out.push(record);
        }
        out
    }

    #[tokio::test]
    async fn extracts_items_split_arbitrarily_across_frames() {
        let whole = br#"[{"receipt_timestamp":1,"sequence_number":1},{"receipt_timestamp":2,"sequence_number":1}]"#;
        let (a, b) = whole.split_at(30);
        let out = records(vec![(a, false), (b, true)]).await;
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].receipt_timestamp, 1);
        assert_eq!(out[1].receipt_timestamp, 2);
    }

    #[tokio::test]
    async fn handles_strings_containing_brackets_and_commas() {
        let whole = br#"[{"receipt_timestamp":1,"sequence_number":1,"note":"a, b] c"}]"#;
        let out = records(vec![(whole, true)]).await;
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].extra.get("note").unwrap(), "a, b] c");
    }

    #[tokio::test]
    async fn empty_array_yields_no_records() {
        let out = records(vec![(b"[]", true)]).await;
        assert!(out.is_empty());
    }
}
