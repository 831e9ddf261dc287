use std::collections::VecDeque;
use std::io::{ErrorKind, Write};
use std::path::Path;

use bytes::{Bytes, BytesMut};
use fifolog_transport::{is_transient, Channel, WriteEnd};
use tracing::{debug, warn};

use crate::codec::{
    encode_fragment, encode_line, find_subslice, fragments, CorrelationId,
    DEFAULT_LINE_TERMINATOR, HEADER_LEN,
};
use crate::error::{FrameError, Result};

/// Default number of records a non-blocking writer keeps while no reader is attached.
pub const DEFAULT_CACHE_CAPACITY: usize = 500;

/// Writer behavior.
#[derive(Debug, Clone)]
pub struct WriterConfig {
    /// Block on open until a reader is attached, and propagate write failures.
    pub blocking: bool,
    /// Record terminator. Lines must not contain it.
    pub line_terminator: String,
    /// Records kept for later delivery in non-blocking mode.
    pub cache_capacity: usize,
    /// Override for the platform's atomic pipe write size.
    pub atomic_write_limit: Option<usize>,
    /// Override for the platform's pipe capacity (used for the oversize warning).
    pub pipe_capacity: Option<usize>,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            blocking: false,
            line_terminator: DEFAULT_LINE_TERMINATOR.to_string(),
            cache_capacity: DEFAULT_CACHE_CAPACITY,
            atomic_write_limit: None,
            pipe_capacity: None,
        }
    }
}

/// What happened to a line handed to [`Writer::write`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    /// Every record, including this line, reached the pipe.
    Sent,
    /// Some records are still cached for a later attempt.
    Cached { pending: usize },
}

/// Result of one pass over the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainStatus {
    /// The cache is empty.
    Drained,
    /// The pipe accepted only part of the head record; the rest stays cached.
    Partial,
    /// No reader attached, pipe broken, or pipe full.
    Unavailable,
    /// An unexpected OS error; reported and left for the next attempt.
    Failed,
}

/// Per-process client for a shared channel.
///
/// In non-blocking mode every line goes through a bounded cache: oversized
/// lines are split into framed fragments that each fit one atomic pipe write,
/// and the cache is drained head-first with non-blocking writes. A missing
/// reader never blocks the caller; records wait in the cache instead.
pub struct Writer<E = Channel> {
    end: E,
    config: WriterConfig,
    id: CorrelationId,
    atomic_budget: usize,
    pipe_capacity: usize,
    cache: VecDeque<Bytes>,
    scratch: BytesMut,
    evicted: u64,
}

impl Writer<Channel> {
    /// Open a writer against an existing channel.
    pub fn open(path: impl AsRef<Path>, config: WriterConfig) -> Result<Self> {
        let channel = Channel::open(path)?;
        Self::with_end(channel, config)
    }
}

impl<E: WriteEnd> Writer<E> {
    /// Create a writer over an arbitrary write end.
    pub fn with_end(end: E, config: WriterConfig) -> Result<Self> {
        if config.line_terminator.is_empty() {
            return Err(FrameError::EmptyTerminator);
        }
        if config.cache_capacity == 0 {
            return Err(FrameError::InvalidCacheCapacity(config.cache_capacity));
        }

        let limit = config
            .atomic_write_limit
            .unwrap_or_else(fifolog_transport::atomic_write_limit);
        let overhead = HEADER_LEN + config.line_terminator.len();
        let atomic_budget = limit
            .checked_sub(overhead)
            .filter(|budget| *budget > 0)
            .ok_or(FrameError::BudgetExhausted { limit, overhead })?;
        let pipe_capacity = config
            .pipe_capacity
            .unwrap_or_else(fifolog_transport::pipe_capacity);

        let id = CorrelationId::generate();
        debug!(path = ?end.path(), %id, atomic_budget, blocking = config.blocking, "opened writer");

        Ok(Self {
            end,
            cache: VecDeque::with_capacity(config.cache_capacity.min(DEFAULT_CACHE_CAPACITY)),
            config,
            id,
            atomic_budget,
            pipe_capacity,
            scratch: BytesMut::new(),
            evicted: 0,
        })
    }

    /// Send one line.
    ///
    /// Blocking mode propagates open and write failures as
    /// [`FrameError::ChannelWrite`]. Non-blocking mode never fails on transport
    /// conditions; undelivered records stay cached and the outcome says so.
    pub fn write(&mut self, line: &str) -> Result<WriteOutcome> {
        let line = line.as_bytes();
        if find_subslice(line, self.config.line_terminator.as_bytes()).is_some() {
            return Err(FrameError::LineContainsTerminator);
        }

        if line.len() > self.pipe_capacity {
            warn!(
                len = line.len(),
                pipe_capacity = self.pipe_capacity,
                "line exceeds pipe capacity; write is not atomic and may be corrupted"
            );
        }

        if self.config.blocking {
            self.scratch.clear();
            encode_line(line, self.config.line_terminator.as_bytes(), &mut self.scratch);
            let record = self.scratch.split().freeze();
            self.write_record_blocking(&record)?;
            return Ok(WriteOutcome::Sent);
        }

        if self.cache.len() >= self.config.cache_capacity {
            self.evict_half();
        }
        self.enqueue(line);
        self.enforce_capacity();

        match self.drain() {
            DrainStatus::Drained => Ok(WriteOutcome::Sent),
            _ => Ok(WriteOutcome::Cached {
                pending: self.cache.len(),
            }),
        }
    }

    /// Try to deliver cached records without blocking.
    pub fn drain(&mut self) -> DrainStatus {
        while let Some(head) = self.cache.front().cloned() {
            let mut stream = match self.end.open_write_nonblocking() {
                Ok(stream) => stream,
                Err(err) => return self.report_failure(err),
            };

            let written = match write_once(&mut stream, &head) {
                Ok(n) => n,
                Err(err) => return self.report_failure(err),
            };
            drop(stream);

            if written == head.len() {
                self.cache.pop_front();
                continue;
            }

            debug!(written, remaining = head.len() - written, "partial write; caching remainder");
            if let Some(front) = self.cache.front_mut() {
                *front = head.slice(written..);
            }
            return DrainStatus::Partial;
        }
        DrainStatus::Drained
    }

    /// Deliver every cached record with blocking writes, in order.
    ///
    /// Each record is written only while a reader is attached; a channel with
    /// no reader fails the open with `ENXIO` instead of waiting for one.
    /// Failures are swallowed: at shutdown the reader may already be gone.
    /// The first failure discards whatever is still cached. Returns how many
    /// records were delivered.
    pub fn flush(&mut self) -> usize {
        let mut delivered = 0usize;
        while let Some(record) = self.cache.pop_front() {
            if let Err(err) = self.write_record_attached(&record) {
                debug!(error = %err, discarded = self.cache.len() + 1, "flush abandoned");
                self.cache.clear();
                break;
            }
            delivered += 1;
        }
        delivered
    }

    fn write_record_blocking(&self, record: &[u8]) -> Result<()> {
        self.write_record_to(self.end.open_write(), record)
    }

    fn write_record_attached(&self, record: &[u8]) -> Result<()> {
        self.write_record_to(self.end.open_write_attached(), record)
    }

    fn write_record_to(&self, opened: std::io::Result<E::Stream>, record: &[u8]) -> Result<()> {
        let write_err = |source| FrameError::ChannelWrite {
            path: self.end.path().to_path_buf(),
            source,
        };
        let mut stream = opened.map_err(write_err)?;
        stream.write_all(record).map_err(write_err)?;
        stream.flush().map_err(write_err)
    }

    fn enqueue(&mut self, line: &[u8]) {
        let terminator = self.config.line_terminator.as_bytes();
        self.scratch.clear();

        if line.len() <= self.atomic_budget {
            encode_line(line, terminator, &mut self.scratch);
            self.cache.push_back(self.scratch.split().freeze());
            return;
        }

        for (marker, body) in fragments(line, self.atomic_budget) {
            encode_fragment(self.id, marker, body, terminator, &mut self.scratch);
            self.cache.push_back(self.scratch.split().freeze());
        }
        debug!(
            id = %self.id,
            len = line.len(),
            fragments = line.len().div_ceil(self.atomic_budget),
            "split oversized line"
        );
    }

    /// Keep every second record, preserving order.
    fn evict_half(&mut self) {
        let before = self.cache.len();
        let mut index = 0usize;
        self.cache.retain(|_| {
            let keep = index % 2 == 0;
            index += 1;
            keep
        });
        let dropped = before - self.cache.len();
        self.evicted += dropped as u64;
        warn!(dropped, kept = self.cache.len(), "writer cache full; sampled half");
    }

    fn enforce_capacity(&mut self) {
        while self.cache.len() > self.config.cache_capacity {
            self.cache.pop_front();
            self.evicted += 1;
        }
    }

    fn report_failure(&self, err: std::io::Error) -> DrainStatus {
        if is_transient(&err) {
            debug!(error = %err, pending = self.cache.len(), "reader unavailable; records stay cached");
            DrainStatus::Unavailable
        } else {
            warn!(path = ?self.end.path(), error = %err, "channel write failed");
            DrainStatus::Failed
        }
    }

    /// This writer's correlation id.
    pub fn correlation_id(&self) -> CorrelationId {
        self.id
    }

    /// Largest line payload sent without fragmentation.
    pub fn atomic_budget(&self) -> usize {
        self.atomic_budget
    }

    /// Records waiting in the cache.
    pub fn pending(&self) -> usize {
        self.cache.len()
    }

    /// Records dropped by cache eviction so far.
    pub fn evicted(&self) -> u64 {
        self.evicted
    }

    /// Cached records in delivery order, terminator stripped.
    pub fn cached(&self) -> impl Iterator<Item = &[u8]> + '_ {
        let terminator = self.config.line_terminator.as_bytes();
        self.cache
            .iter()
            .map(move |record| record.strip_suffix(terminator).unwrap_or(&record[..]))
    }

    /// Whether this writer blocks.
    pub fn is_blocking(&self) -> bool {
        self.config.blocking
    }

    /// Current writer configuration.
    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    /// Channel path.
    pub fn path(&self) -> &Path {
        self.end.path()
    }

    /// Borrow the write end.
    pub fn get_ref(&self) -> &E {
        &self.end
    }
}

fn write_once<W: Write>(stream: &mut W, buf: &[u8]) -> std::io::Result<usize> {
    loop {
        match stream.write(buf) {
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}
