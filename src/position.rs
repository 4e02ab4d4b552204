//! Continuation positions: "resume strictly after record R".

use chrono::Timelike;

use crate::error::Error;
use crate::record::Record;
use crate::record_stream::RecordStream;
use crate::transport::Transport;

/// Immutable snapshot of one record's ordering key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinuationPosition {
    pub receipt_timestamp: i64,
    pub sequence_number: i64,
    pub message_number: Option<i64>,
}

impl ContinuationPosition {
    pub fn from_record(record: &Record) -> Self {
        Self {
            receipt_timestamp: record.receipt_timestamp,
            sequence_number: record.sequence_number,
            message_number: record.message_number,
        }
    }

    /// Shallow-copy `template`, rename `date` to `end_date`, force UTC, and
    /// set `start_date`/`start_time` to this position's wall-clock instant.
    /// Never mutates `template`.
    pub fn rewrite(&self, template: &serde_json::Value) -> serde_json::Value {
        let mut obj = match template {
            serde_json::Value::Object(map) => map.clone(),
            _ => serde_json::Map::new(),
        };
        if let Some(date) = obj.remove("date") {
            obj.insert("end_date".to_owned(), date);
        }
        obj.insert(
            "time_zone".to_owned(),
            serde_json::Value::String("UTC".to_owned()),
        );
        let (start_date, start_time) = decompose_utc(self.receipt_timestamp);
        obj.insert(
            "start_date".to_owned(),
            serde_json::Value::String(start_date),
        );
        obj.insert(
            "start_time".to_owned(),
            serde_json::Value::String(start_time),
        );
        serde_json::Value::Object(obj)
    }

    /// Whether `item` falls strictly after this position on the ordering
    /// key `(receipt_timestamp, sequence_number, message_number?)`.
    pub fn predicate(&self, item: &Record) -> bool {
        if item.receipt_timestamp > self.receipt_timestamp {
            return true;
        }
        if item.sequence_number != self.sequence_number {
            return item.sequence_number > self.sequence_number;
        }
        match (item.message_number, self.message_number) {
            (Some(m), Some(r)) if m <= r => false,
            _ => true,
        }
    }
}

fn decompose_utc(ts_ns: i64) -> (String, String) {
    let secs = ts_ns.div_euclid(1_000_000_000);
    let nanos = ts_ns.rem_euclid(1_000_000_000) as u32;
    let dt = chrono::DateTime::from_timestamp(secs, nanos)
        .expect("receipt_timestamp must be representable as a Unix timestamp");
    let date = dt.format("%Y-%m-%d").to_string();
    let time = format!(
        "{:02}:{:02}:{:02}.{:09}",
        dt.hour(),
        dt.minute(),
        dt.second(),
        nanos
    );
    (date, time)
}

/// Sticky filter over a [`RecordStream`]: skips records until the
/// predicate first holds, then emits every subsequent record
/// unconditionally. A `None` position passes everything through.
pub struct PositionFilter<'a, T: Transport> {
    stream: RecordStream<'a, T>,
    position: Option<ContinuationPosition>,
    matched: bool,
}

impl<'a, T: Transport> PositionFilter<'a, T> {
    pub fn new(stream: RecordStream<'a, T>, position: Option<ContinuationPosition>) -> Self {
        let matched = position.is_none();
        Self {
            stream,
            position,
            matched,
        }
    }

    pub async fn next_record(&mut self) -> Result<Option<Record>, Error> {
        loop {
            let Some(record) = self.stream.next_record().await? else {
                return Ok(None);
            };
            if self.matched {
                return Ok(Some(record));
            }
            let Some(position) = &self.position else {
                return Ok(Some(record));
            };
            if position.predicate(&record) {
                self.matched = true;
                return Ok(Some(record));
            }
        }
    }
}
