//! Bounded, filtered views over a request's record stream, and their
//! ordered composition into a full-result iteration.

use std::marker::PhantomData;
use std::sync::Arc;

use crate::error::Error;
use crate::position::{ContinuationPosition, PositionFilter};
use crate::protocol::ProtocolClient;
use crate::record::Record;
use crate::record_stream::RecordStream;
use crate::transport::Transport;

type RecordFilter = Arc<dyn Fn(&Record) -> bool + Send + Sync>;

/// A single page's request template, limit, and optional user filter. Does
/// not itself hold a connection; [`Page::open`] binds it to a client for
/// one query's worth of iteration.
pub struct Page<T: Transport> {
    template: serde_json::Value,
    per_page: usize,
    filter: Option<RecordFilter>,
    inbound: Option<ContinuationPosition>,
    outbound: Option<ContinuationPosition>,
    _marker: PhantomData<fn(T)>,
}

impl<T: Transport> Page<T> {
    pub fn new(template: serde_json::Value, per_page: usize) -> Self {
        Self {
            template,
            per_page,
            filter: None,
            inbound: None,
            outbound: None,
            _marker: PhantomData,
        }
    }

    /// Attach a user filter applied after any inbound position's sticky
    /// filter. Only records passing it count toward the per-page limit.
    pub fn with_filter(mut self, filter: impl Fn(&Record) -> bool + Send + Sync + 'static) -> Self {
        self.filter = Some(Arc::new(filter));
        self
    }

    /// The continuation position captured once this page has emitted its
    /// limit and observed one record past it. `None` until that happens (or
    /// permanently, if the underlying stream exhausted first).
    pub fn outbound_position(&self) -> Option<ContinuationPosition> {
        self.outbound
    }

    /// Open this page's query on `client` and return a pull-based iterator
    /// over its records.
    pub async fn open<'p, 'c>(
        &'p mut self,
        client: &'c mut ProtocolClient<T>,
    ) -> Result<PageRecords<'p, 'c, T>, Error> {
        let request = match &self.inbound {
            Some(position) => position.rewrite(&self.template),
            None => self.template.clone(),
        };
        let reader = client.stream(&request).await?;
        let record_stream = RecordStream::new(reader);
        let filtered = PositionFilter::new(record_stream, self.inbound);
        Ok(PageRecords {
            page: self,
            inner: filtered,
            emitted: 0,
        })
    }

    /// Build the next page sharing this page's template, limit, and filter,
    /// resuming at this page's outbound position. `None` if this page never
    /// recorded one (its stream exhausted before the limit).
    pub fn next_page(&self) -> Option<Self> {
        let inbound = self.outbound?;
        Some(Self {
            template: self.template.clone(),
            per_page: self.per_page,
            filter: self.filter.clone(),
            inbound: Some(inbound),
            outbound: None,
            _marker: PhantomData,
        })
    }
}

/// Pull-based iterator over one opened page's records.
pub struct PageRecords<'p, 'c, T: Transport> {
    page: &'p mut Page<T>,
    inner: PositionFilter<'c, T>,
    emitted: usize,
}

impl<T: Transport> PageRecords<'_, '_, T> {
    /// Next record, or `None` once the page's limit is reached (or the
    /// underlying stream is exhausted).
    pub async fn next_record(&mut self) -> Result<Option<Record>, Error> {
        if self.emitted >= self.page.per_page {
            if self.page.outbound.is_none() {
                if let Some(record) = self.next_filtered().await? {
                    self.page.outbound = Some(ContinuationPosition::from_record(&record));
                }
            }
            return Ok(None);
        }
        let Some(record) = self.next_filtered().await? else {
            return Ok(None);
        };
        self.emitted += 1;
        Ok(Some(record))
    }

    async fn next_filtered(&mut self) -> Result<Option<Record>, Error> {
        loop {
            let Some(record) = self.inner.next_record().await? else {
                return Ok(None);
            };
            if let Some(filter) = &self.page.filter {
                if !filter(&record) {
                    continue;
                }
            }
            return Ok(Some(record));
        }
    }
}

/// Drives an ordered sequence of pages off one request template. Each
/// transition cancels the prior page's in-flight query before opening the
/// next, so a caller never needs to cancel manually between pages.
pub struct PageSet<T: Transport> {
    current: Option<Page<T>>,
    started: bool,
}

impl<T: Transport> PageSet<T> {
    pub fn new(first_page: Page<T>) -> Self {
        Self {
            current: Some(first_page),
            started: false,
        }
    }

    /// Advance to the next page, or `None` once the set is exhausted.
    pub async fn next_page<'s, 'c>(
        &'s mut self,
        client: &'c mut ProtocolClient<T>,
    ) -> Result<Option<PageRecords<'s, 'c, T>>, Error> {
        if self.started {
            client.cancel().await?;
            let finished = self
                .current
                .take()
                .expect("a page set with `started` set always holds its current page");
            self.current = finished.next_page();
        }
        self.started = true;

        let Some(page) = self.current.as_mut() else {
            return Ok(None);
        };
        let records = page.open(client).await?;
        Ok(Some(records))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockTransport;

    fn record_body(pairs: &[(i64, i64)]) -> Vec<u8> {
        let items: Vec<_> = pairs
            .iter()
            .map(|(t, s)| serde_json::json!({"receipt_timestamp": t, "sequence_number": s}))
            .collect();
        serde_json::to_vec(&serde_json::Value::Array(items)).unwrap()
    }

    fn scripted(pairs: &[(i64, i64)]) -> MockTransport {
        MockTransport::new()
            .control("scheduled")
            .control("accepted")
            .frame(record_body(pairs), true)
            .control("complete")
    }

    #[tokio::test]
    async fn s6_pagination_across_three_pages() {
        // One connection throughout: page transitions are driven entirely
        // by `PageSet::next_page`'s internal cancel, never a reconnect.
        let transport = MockTransport::new()
            .control("scheduled")
            .control("accepted")
            .frame(record_body(&[(1, 1), (1, 2), (2, 1), (2, 2), (3, 1)]), true)
            .control("complete")
            .control("scheduled")
            .control("accepted")
            .frame(record_body(&[(2, 1), (2, 2), (3, 1)]), true)
            .control("complete")
            .control("scheduled")
            .control("accepted")
            .frame(record_body(&[(3, 1)]), true)
            .control("complete");
        let mut client = ProtocolClient::new(transport);
        let mut set = PageSet::new(Page::new(serde_json::json!({}), 2));

        let mut page1 = set.next_page(&mut client).await.unwrap().unwrap();
        let mut seen = Vec::new();
        while let Some(r) = page1.next_record().await.unwrap() {
            seen.push((r.receipt_timestamp, r.sequence_number));
        }
        assert_eq!(seen, vec![(1, 1), (1, 2)]);
        drop(page1);
        assert_eq!(
            set.current.as_ref().unwrap().outbound_position(),
            Some(ContinuationPosition {
                receipt_timestamp: 2,
                sequence_number: 1,
                message_number: None,
            })
        );

        let mut page2 = set.next_page(&mut client).await.unwrap().unwrap();
        let mut seen = Vec::new();
        while let Some(r) = page2.next_record().await.unwrap() {
            seen.push((r.receipt_timestamp, r.sequence_number));
        }
        assert_eq!(seen, vec![(2, 1), (2, 2)]);
        drop(page2);

        let mut page3 = set.next_page(&mut client).await.unwrap().unwrap();
        let mut seen = Vec::new();
        while let Some(r) = page3.next_record().await.unwrap() {
            seen.push((r.receipt_timestamp, r.sequence_number));
        }
        assert_eq!(seen, vec![(3, 1)]);
        drop(page3);

        assert!(set.next_page(&mut client).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn page_records_exactly_n_when_stream_has_more() {
        let mut client = ProtocolClient::new(scripted(&[(1, 1), (1, 2), (1, 3)]));
        let mut page = Page::new(serde_json::json!({}), 2);
        let mut records = page.open(&mut client).await.unwrap();
        let mut out = Vec::new();
        while let Some(r) = records.next_record().await.unwrap() {
            out.push(r.sequence_number);
        }
        assert_eq!(out, vec![1, 2]);
        drop(records);
        assert_eq!(page.outbound_position().unwrap().sequence_number, 3);
    }

    #[tokio::test]
    async fn no_outbound_position_when_stream_exhausts_before_limit() {
        let mut client = ProtocolClient::new(scripted(&[(1, 1)]));
        let mut page = Page::new(serde_json::json!({}), 5);
        let mut records = page.open(&mut client).await.unwrap();
        let mut out = Vec::new();
        while let Some(r) = records.next_record().await.unwrap() {
            out.push(r.sequence_number);
        }
        assert_eq!(out, vec![1]);
        drop(records);
        assert!(page.outbound_position().is_none());
    }
}
