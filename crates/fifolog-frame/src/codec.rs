use std::fmt;

use bytes::{BufMut, BytesMut};

/// Width of a correlation id in bytes.
pub const ID_LEN: usize = 4;

/// Width of a fragment marker in bytes.
pub const MARKER_LEN: usize = 1;

/// Fragment header: correlation id (4) + marker (1) = 5 bytes.
pub const HEADER_LEN: usize = ID_LEN + MARKER_LEN;

/// Default record terminator: ASCII record separator.
pub const DEFAULT_LINE_TERMINATOR: &str = "\x1e";

const CONTINUATION_BYTE: u8 = 0x11;
const FINAL_BYTE: u8 = 0x12;

/// Per-writer token tagging every fragment that writer emits.
///
/// Four lowercase hex characters. Collisions between live writers are
/// possible but unlikely (1 in 65536 per pair).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CorrelationId([u8; ID_LEN]);

impl CorrelationId {
    /// Generate a fresh id from a random v4 UUID.
    pub fn generate() -> Self {
        let uuid = uuid::Uuid::new_v4();
        let mut hex = [0u8; 32];
        let encoded = uuid.simple().encode_lower(&mut hex);
        let tail = &encoded.as_bytes()[encoded.len() - ID_LEN..];
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(tail);
        Self(id)
    }

    /// Parse an id from the first [`ID_LEN`] bytes of `bytes`.
    ///
    /// Returns `None` unless all of them are ASCII hex digits.
    pub fn from_prefix(bytes: &[u8]) -> Option<Self> {
        let prefix = bytes.get(..ID_LEN)?;
        if !prefix.iter().all(u8::is_ascii_hexdigit) {
            return None;
        }
        let mut id = [0u8; ID_LEN];
        id.copy_from_slice(prefix);
        Some(Self(id))
    }

    /// Raw id bytes.
    pub fn as_bytes(&self) -> &[u8; ID_LEN] {
        &self.0
    }

    /// Id as text.
    pub fn as_str(&self) -> &str {
        // Constructors only admit ASCII hex digits.
        std::str::from_utf8(&self.0).unwrap_or("????")
    }
}

impl fmt::Display for CorrelationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of a fragment within its line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Marker {
    /// More fragments follow for this correlation id.
    Continuation,
    /// Last fragment; the line is complete.
    Final,
}

impl Marker {
    /// Wire byte for this marker.
    pub fn as_byte(self) -> u8 {
        match self {
            Marker::Continuation => CONTINUATION_BYTE,
            Marker::Final => FINAL_BYTE,
        }
    }

    /// Decode a wire byte.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            CONTINUATION_BYTE => Some(Marker::Continuation),
            FINAL_BYTE => Some(Marker::Final),
            _ => None,
        }
    }
}

/// A record read off the channel, terminator already stripped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    /// An unframed line, delivered as is.
    Line(&'a [u8]),
    /// One fragment of a line that exceeded the writer's atomic budget.
    Fragment {
        id: CorrelationId,
        marker: Marker,
        body: &'a [u8],
    },
}

/// Classify a record.
///
/// A record is a fragment only when it starts with a hex correlation id
/// followed by a marker byte; anything else is an unframed line.
pub fn parse_record(record: &[u8]) -> Record<'_> {
    if record.len() >= HEADER_LEN {
        if let (Some(id), Some(marker)) = (
            CorrelationId::from_prefix(record),
            Marker::from_byte(record[ID_LEN]),
        ) {
            return Record::Fragment {
                id,
                marker,
                body: &record[HEADER_LEN..],
            };
        }
    }
    Record::Line(record)
}

/// Split `line` into consecutive `budget`-sized slices.
///
/// Every slice but the last is marked [`Marker::Continuation`]; the last is
/// [`Marker::Final`]. An empty line yields nothing.
///
/// # Panics
///
/// Panics if `budget` is zero.
pub fn fragments(line: &[u8], budget: usize) -> impl Iterator<Item = (Marker, &[u8])> {
    assert!(budget > 0, "fragment budget must be positive");
    let count = line.len().div_ceil(budget);
    line.chunks(budget).enumerate().map(move |(index, chunk)| {
        let marker = if index + 1 == count {
            Marker::Final
        } else {
            Marker::Continuation
        };
        (marker, chunk)
    })
}

/// Encode one fragment record into `dst`.
///
/// Wire format:
/// ```text
/// ┌──────────────┬──────────┬─────────────────┬────────────┐
/// │ Id (4B hex)  │ Marker   │ Body            │ Terminator │
/// │ e.g. "9f3a"  │ 0x11/12  │ (≤ budget)      │ (default   │
/// │              │          │                 │  0x1E)     │
/// └──────────────┴──────────┴─────────────────┴────────────┘
/// ```
pub fn encode_fragment(
    id: CorrelationId,
    marker: Marker,
    body: &[u8],
    terminator: &[u8],
    dst: &mut BytesMut,
) {
    dst.reserve(HEADER_LEN + body.len() + terminator.len());
    dst.put_slice(id.as_bytes());
    dst.put_u8(marker.as_byte());
    dst.put_slice(body);
    dst.put_slice(terminator);
}

/// Encode an unframed line record into `dst`.
pub fn encode_line(line: &[u8], terminator: &[u8], dst: &mut BytesMut) {
    dst.reserve(line.len() + terminator.len());
    dst.put_slice(line);
    dst.put_slice(terminator);
}

/// Position of the first occurrence of `needle` in `haystack`.
pub(crate) fn find_subslice(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    match needle {
        [] => None,
        [byte] => haystack.iter().position(|b| b == byte),
        _ => haystack
            .windows(needle.len())
            .position(|window| window == needle),
    }
}
