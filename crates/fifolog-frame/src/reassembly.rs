use std::collections::HashMap;
use std::time::{Duration, Instant};

use bytes::{Bytes, BytesMut};
use tracing::{debug, warn};

use crate::codec::{parse_record, CorrelationId, Marker, Record, HEADER_LEN};

/// Reader-side store of lines that arrived as fragments.
///
/// One entry per correlation id, created by the first CONTINUATION fragment
/// and removed by the matching FINAL. An id whose writer died mid-line keeps
/// its entry until [`Reassembler::evict_stale`] drops it.
#[derive(Debug, Default)]
pub struct Reassembler {
    pending: HashMap<CorrelationId, Partial>,
}

#[derive(Debug)]
struct Partial {
    data: BytesMut,
    updated: Instant,
}

impl Reassembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed one record (terminator stripped).
    ///
    /// Returns the complete line when `record` is an unframed line or the
    /// FINAL fragment of its id; `None` while fragments are still accumulating.
    pub fn push(&mut self, record: Bytes) -> Option<Bytes> {
        self.push_at(record, Instant::now())
    }

    pub(crate) fn push_at(&mut self, record: Bytes, now: Instant) -> Option<Bytes> {
        let (id, marker) = match parse_record(&record) {
            Record::Line(_) => return Some(record),
            Record::Fragment { id, marker, .. } => (id, marker),
        };

        match marker {
            Marker::Continuation => {
                let partial = self.pending.entry(id).or_insert_with(|| Partial {
                    data: BytesMut::new(),
                    updated: now,
                });
                partial.data.extend_from_slice(&record[HEADER_LEN..]);
                partial.updated = now;
                debug!(%id, buffered = partial.data.len(), "buffered continuation fragment");
                None
            }
            Marker::Final => match self.pending.remove(&id) {
                Some(mut partial) => {
                    partial.data.extend_from_slice(&record[HEADER_LEN..]);
                    Some(partial.data.freeze())
                }
                None => Some(record.slice(HEADER_LEN..)),
            },
        }
    }

    /// Drop entries not extended within `max_age`. Returns how many were dropped.
    pub fn evict_stale(&mut self, max_age: Duration) -> usize {
        self.evict_stale_at(Instant::now(), max_age)
    }

    pub(crate) fn evict_stale_at(&mut self, now: Instant, max_age: Duration) -> usize {
        let before = self.pending.len();
        self.pending.retain(|id, partial| {
            let fresh = now.saturating_duration_since(partial.updated) <= max_age;
            if !fresh {
                warn!(%id, dropped_bytes = partial.data.len(), "evicting stale partial line");
            }
            fresh
        });
        before - self.pending.len()
    }

    /// Number of ids with a partial line in flight.
    pub fn pending(&self) -> usize {
        self.pending.len()
    }

    /// Whether `id` has a partial line in flight.
    pub fn contains(&self, id: &CorrelationId) -> bool {
        self.pending.contains_key(id)
    }

    /// Bytes accumulated so far for `id`.
    pub fn buffered(&self, id: &CorrelationId) -> Option<usize> {
        self.pending.get(id).map(|partial| partial.data.len())
    }
}
