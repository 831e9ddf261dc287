//! Line framing over a shared named pipe.
//!
//! Lines travel as records terminated by a configurable terminator
//! (default `0x1E`, ASCII record separator). A line longer than the writer's
//! atomic budget is split into fragments, each prefixed with:
//! - a 4-character hex correlation id, fixed per writer
//! - a 1-byte marker: `CONTINUATION` (0x11) or `FINAL` (0x12)
//!
//! Every record fits in one atomic pipe write, so records from concurrent
//! writers never interleave byte-wise; fragments are stitched back together
//! per correlation id on the reading side.

pub mod codec;
pub mod error;
pub mod reader;
pub mod reassembly;
pub mod writer;

pub use codec::{
    encode_fragment, encode_line, fragments, parse_record, CorrelationId, Marker, Record,
    DEFAULT_LINE_TERMINATOR, HEADER_LEN, ID_LEN, MARKER_LEN,
};
pub use error::{FrameError, Result};
pub use reader::RecordReader;
pub use reassembly::Reassembler;
pub use writer::{DrainStatus, WriteOutcome, Writer, WriterConfig, DEFAULT_CACHE_CAPACITY};
