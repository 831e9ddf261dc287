use std::borrow::Cow;
use std::io::Read;

use bytes::Bytes;
use fifolog_frame::{Reassembler, RecordReader};
use tracing::{debug, info, warn};

use crate::config::ReaderConfig;
use crate::error::Result;
use crate::handler::Dispatcher;

/// Where the reader loop currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReaderState {
    Starting,
    Reading,
    IdleWait,
    Stopped,
}

/// Counters reported when the loop ends.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct ReaderStats {
    /// Non-empty records read off the channel.
    pub records: u64,
    /// Complete lines the handler accepted.
    pub dispatched: u64,
    /// Complete lines the handler rejected or panicked on.
    pub failures: u64,
    /// Partial lines dropped by staleness eviction.
    pub evicted_partials: u64,
    /// Partial lines still buffered when the loop stopped.
    pub leftover_partials: usize,
}

/// Reads records, reassembles fragments and dispatches complete lines.
///
/// The loop has no notion of processes; it runs over any `Read` source. A
/// read that yields nothing (end-of-file with no writer attached, or a bare
/// terminator) counts as idle. Once `idle_threshold` idle reads happen in a
/// row and termination has been requested, the loop ends.
pub struct ReaderLoop<R> {
    records: RecordReader<R>,
    reassembler: Reassembler,
    config: ReaderConfig,
    state: ReaderState,
    stats: ReaderStats,
    idle: u32,
    termination_seen: bool,
}

impl<R: Read> ReaderLoop<R> {
    pub fn new(inner: R, terminator: &str, config: ReaderConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            records: RecordReader::new(inner, terminator)?,
            reassembler: Reassembler::new(),
            config,
            state: ReaderState::Starting,
            stats: ReaderStats::default(),
            idle: 0,
            termination_seen: false,
        })
    }

    /// Run until idle with termination requested.
    ///
    /// `termination_requested` is polled after every record and at each idle
    /// read past the threshold. A request seen while records are flowing is
    /// remembered; the loop still only stops once the idle threshold is
    /// reached. Read errors other than interrupts end the loop with an error.
    pub fn run<C, F>(
        &mut self,
        dispatcher: &mut Dispatcher<C>,
        ctx: &mut C,
        mut termination_requested: F,
    ) -> Result<ReaderStats>
    where
        F: FnMut() -> bool,
    {
        self.transition(ReaderState::Reading);

        loop {
            let record = match self.records.read_record() {
                Ok(record) => record,
                Err(err) => {
                    self.transition(ReaderState::Stopped);
                    return Err(err.into());
                }
            };

            match record {
                Some(record) if !record.is_empty() => {
                    self.idle = 0;
                    self.transition(ReaderState::Reading);
                    self.stats.records += 1;
                    if let Some(line) = self.reassembler.push(record) {
                        self.dispatch(dispatcher, ctx, line);
                    }
                    if !self.termination_seen {
                        self.termination_seen = termination_requested();
                    }
                }
                _ => {
                    self.idle = self.idle.saturating_add(1);
                    if let Some(max_age) = self.config.stale_fragment_timeout {
                        let evicted = self.reassembler.evict_stale(max_age);
                        self.stats.evicted_partials += evicted as u64;
                    }
                    if self.idle >= self.config.idle_threshold
                        && (self.termination_seen || termination_requested())
                    {
                        break;
                    }
                    self.transition(ReaderState::IdleWait);
                    std::thread::sleep(self.config.idle_sleep);
                }
            }
        }

        self.transition(ReaderState::Stopped);
        self.stats.leftover_partials = self.reassembler.pending();
        if self.stats.leftover_partials > 0 {
            warn!(
                partials = self.stats.leftover_partials,
                "reader stopped with incomplete lines"
            );
        }
        info!(
            records = self.stats.records,
            dispatched = self.stats.dispatched,
            failures = self.stats.failures,
            evicted = self.stats.evicted_partials,
            "reader loop finished"
        );
        Ok(self.stats)
    }

    fn dispatch<C>(&mut self, dispatcher: &mut Dispatcher<C>, ctx: &mut C, line: Bytes) {
        let text = String::from_utf8_lossy(&line);
        if let Cow::Owned(_) = text {
            warn!(len = line.len(), "line is not valid UTF-8; invalid bytes replaced");
        }

        match dispatcher.dispatch(&text, ctx) {
            Ok(()) => self.stats.dispatched += 1,
            Err(err) => {
                self.stats.failures += 1;
                warn!(line = %err.line, reason = %err.reason, "line handler failed");
            }
        }
    }

    fn transition(&mut self, next: ReaderState) {
        if self.state != next {
            debug!(from = ?self.state, to = ?next, idle = self.idle, "reader state");
            self.state = next;
        }
    }

    pub fn state(&self) -> ReaderState {
        self.state
    }

    pub fn stats(&self) -> ReaderStats {
        self.stats
    }

    /// Partial lines currently buffered.
    pub fn pending_partials(&self) -> usize {
        self.reassembler.pending()
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;
    use std::io::ErrorKind;
    use std::time::Duration;

    use bytes::BytesMut;
    use fifolog_frame::{encode_fragment, fragments, CorrelationId};

    use super::*;
    use crate::error::ServerError;

    /// Replays chunks; an empty chunk (or an exhausted script) reads as EOF.
    struct ScriptedPipe {
        chunks: VecDeque<Vec<u8>>,
        reads: usize,
    }

    impl ScriptedPipe {
        fn new<I, T>(chunks: I) -> Self
        where
            I: IntoIterator<Item = T>,
            T: AsRef<[u8]>,
        {
            Self {
                chunks: chunks.into_iter().map(|c| c.as_ref().to_vec()).collect(),
                reads: 0,
            }
        }
    }

    impl Read for ScriptedPipe {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            self.reads += 1;
            let Some(chunk) = self.chunks.pop_front() else {
                return Ok(0);
            };
            buf[..chunk.len()].copy_from_slice(&chunk);
            Ok(chunk.len())
        }
    }

    struct BrokenPipe;

    impl Read for BrokenPipe {
        fn read(&mut self, _buf: &mut [u8]) -> std::io::Result<usize> {
            Err(std::io::Error::from(ErrorKind::PermissionDenied))
        }
    }

    fn fast_config() -> ReaderConfig {
        ReaderConfig {
            idle_sleep: Duration::ZERO,
            ..ReaderConfig::default()
        }
    }

    fn collecting() -> Dispatcher<Vec<String>> {
        Dispatcher::new(Vec::new).on_line(|line: &str, seen: &mut Vec<String>| {
            seen.push(line.to_string());
            Ok(())
        })
    }

    fn run(pipe: ScriptedPipe, config: ReaderConfig) -> (ReaderLoop<ScriptedPipe>, Vec<String>) {
        let mut reader = ReaderLoop::new(pipe, "\x1e", config).unwrap();
        let mut dispatcher = collecting();
        let mut seen = dispatcher.initialize();
        reader.run(&mut dispatcher, &mut seen, || true).unwrap();
        (reader, seen)
    }

    fn framed(id: &str, line: &[u8], budget: usize) -> Vec<u8> {
        let id = CorrelationId::from_prefix(id.as_bytes()).unwrap();
        let mut wire = BytesMut::new();
        for (marker, body) in fragments(line, budget) {
            encode_fragment(id, marker, body, b"\x1e", &mut wire);
        }
        wire.to_vec()
    }

    #[test]
    fn stops_after_threshold_idle_reads() {
        let (reader, seen) = run(ScriptedPipe::new(["a\x1e"]), fast_config());

        assert_eq!(seen, vec!["a"]);
        // One read with data, then three empty reads.
        assert_eq!(reader.records.get_ref().reads, 4);
        assert_eq!(reader.state(), ReaderState::Stopped);
    }

    #[test]
    fn data_resets_idle_counter() {
        let chunks: Vec<&[u8]> = vec![b"a\x1e", b"", b"", b"b\x1e"];
        let (reader, seen) = run(ScriptedPipe::new(chunks), fast_config());

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(reader.records.get_ref().reads, 4 + 3);
    }

    #[test]
    fn bare_terminator_counts_as_idle() {
        let (reader, seen) = run(ScriptedPipe::new(["\x1e\x1e\x1e"]), fast_config());

        assert!(seen.is_empty());
        assert_eq!(reader.stats().records, 0);
        assert_eq!(reader.records.get_ref().reads, 1);
    }

    #[test]
    fn keeps_reading_until_termination_requested() {
        let mut reader = ReaderLoop::new(ScriptedPipe::new(["x\x1e"]), "\x1e", fast_config()).unwrap();
        let mut dispatcher = collecting();
        let mut seen = Vec::new();
        let mut polls = 0;

        reader
            .run(&mut dispatcher, &mut seen, || {
                polls += 1;
                polls > 5
            })
            .unwrap();

        // Once after the record, then from the third idle read on.
        assert_eq!(polls, 6);
        assert_eq!(reader.records.get_ref().reads, 1 + 2 + 5);
    }

    #[test]
    fn request_seen_during_traffic_stops_at_next_idle() {
        let chunks: Vec<&[u8]> = vec![b"a\x1e", b"b\x1e"];
        let mut reader = ReaderLoop::new(ScriptedPipe::new(chunks), "\x1e", fast_config()).unwrap();
        let mut dispatcher = collecting();
        let mut seen = Vec::new();
        let mut polls = 0;

        // Reports the request exactly once, the way a taken signal does.
        reader
            .run(&mut dispatcher, &mut seen, || {
                polls += 1;
                polls == 1
            })
            .unwrap();

        assert_eq!(seen, vec!["a", "b"]);
        assert_eq!(polls, 1);
        assert_eq!(reader.records.get_ref().reads, 2 + 3);
    }

    #[test]
    fn handler_failures_do_not_stop_the_loop() {
        let mut reader = ReaderLoop::new(
            ScriptedPipe::new(["bad\x1eboom\x1egood\x1e"]),
            "\x1e",
            fast_config(),
        )
        .unwrap();
        let mut dispatcher = Dispatcher::new(Vec::new).on_line(|line: &str, seen: &mut Vec<String>| {
            match line {
                "bad" => Err("rejected".into()),
                "boom" => panic!("handler exploded"),
                _ => {
                    seen.push(line.to_string());
                    Ok(())
                }
            }
        });
        let mut seen = Vec::new();

        let stats = reader.run(&mut dispatcher, &mut seen, || true).unwrap();

        assert_eq!(seen, vec!["good"]);
        assert_eq!(stats.failures, 2);
        assert_eq!(stats.dispatched, 1);
        assert_eq!(stats.records, 3);
    }

    #[test]
    fn fragmented_line_dispatched_once() {
        let budget = 8;
        let line = "x".repeat(3 * budget + 10);
        let mut wire = framed("beef", line.as_bytes(), budget);
        wire.extend_from_slice(b"after\x1e");

        let (reader, seen) = run(ScriptedPipe::new([wire]), fast_config());

        assert_eq!(seen, vec![line, "after".to_string()]);
        assert_eq!(reader.stats().records, 5 + 1);
        assert_eq!(reader.stats().leftover_partials, 0);
    }

    #[test]
    fn interleaved_writers_reassemble_separately() {
        let first = framed("aaaa", b"0123456789", 4);
        let second = framed("bbbb", b"abcdefghij", 4);
        // Records split on terminators so they can be interleaved one by one.
        let split = |wire: &[u8]| -> Vec<Vec<u8>> {
            wire.split_inclusive(|b| *b == 0x1e).map(<[u8]>::to_vec).collect()
        };
        let mut chunks = Vec::new();
        for (a, b) in split(&first).into_iter().zip(split(&second)) {
            chunks.push(a);
            chunks.push(b);
        }

        let (_, seen) = run(ScriptedPipe::new(chunks), fast_config());

        assert_eq!(seen, vec!["0123456789", "abcdefghij"]);
    }

    #[test]
    fn unfinished_line_reported_as_leftover() {
        let id = CorrelationId::from_prefix(b"dead").unwrap();
        let mut wire = BytesMut::new();
        encode_fragment(id, fifolog_frame::Marker::Continuation, b"half", b"\x1e", &mut wire);

        let (reader, seen) = run(ScriptedPipe::new([wire.to_vec()]), fast_config());

        assert!(seen.is_empty());
        assert_eq!(reader.stats().leftover_partials, 1);
        assert_eq!(reader.pending_partials(), 1);
    }

    #[test]
    fn stale_partials_evicted_on_idle() {
        let id = CorrelationId::from_prefix(b"dead").unwrap();
        let mut wire = BytesMut::new();
        encode_fragment(id, fifolog_frame::Marker::Continuation, b"half", b"\x1e", &mut wire);
        let config = ReaderConfig {
            idle_sleep: Duration::from_millis(5),
            stale_fragment_timeout: Some(Duration::from_millis(1)),
            ..ReaderConfig::default()
        };

        let (reader, _) = run(ScriptedPipe::new([wire.to_vec()]), config);

        assert_eq!(reader.stats().evicted_partials, 1);
        assert_eq!(reader.stats().leftover_partials, 0);
    }

    #[test]
    fn invalid_utf8_dispatched_lossily() {
        let (_, seen) = run(ScriptedPipe::new([&b"caf\xe9\x1e"[..]]), fast_config());
        assert_eq!(seen, vec!["caf\u{fffd}"]);
    }

    #[test]
    fn read_errors_end_the_loop() {
        let mut reader = ReaderLoop::new(BrokenPipe, "\x1e", fast_config()).unwrap();
        let mut dispatcher = collecting();
        let mut seen = Vec::new();

        let err = reader.run(&mut dispatcher, &mut seen, || true).unwrap_err();
        assert!(matches!(err, ServerError::Frame(_)));
        assert_eq!(reader.state(), ReaderState::Stopped);
    }

    #[test]
    fn invalid_config_rejected() {
        let config = ReaderConfig {
            idle_threshold: 0,
            ..ReaderConfig::default()
        };
        assert!(ReaderLoop::new(ScriptedPipe::new(Vec::<Vec<u8>>::new()), "\x1e", config).is_err());
    }
}
