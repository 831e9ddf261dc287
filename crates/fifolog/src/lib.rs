//! Many-writer, single-reader log transport over a named pipe.
//!
//! Independent processes write text lines into one FIFO; a dedicated reader
//! process reassembles them and hands each complete line to a caller-supplied
//! handler. Writers never block on a missing reader: undelivered lines wait in
//! a bounded cache.
//!
//! # Crate Structure
//!
//! - [`transport`]: FIFO creation, open modes, pipe limits
//! - [`frame`]: line framing, reassembly, the caching writer
//! - [`server`]: reader loop, reader process, supervisor lifecycle
//!
//! # Example
//!
//! ```no_run
//! use fifolog::{Dispatcher, Supervisor, SupervisorConfig};
//!
//! let dispatcher = Dispatcher::new(|| ()).on_line(|line: &str, _: &mut ()| {
//!     println!("{line}");
//!     Ok(())
//! });
//! let mut supervisor =
//!     Supervisor::acquire("/tmp/app.fifo", SupervisorConfig::default(), dispatcher)?;
//! supervisor.writer_mut().write("service started")?;
//! supervisor.release();
//! # Ok::<(), fifolog::server::ServerError>(())
//! ```

/// Re-export transport types.
pub mod transport {
    pub use fifolog_transport::*;
}

/// Re-export frame types.
pub mod frame {
    pub use fifolog_frame::*;
}

/// Re-export server types.
pub mod server {
    pub use fifolog_server::*;
}

pub use fifolog_frame::{WriteOutcome, Writer, WriterConfig};
pub use fifolog_server::{Dispatcher, ReaderConfig, SupervisorConfig};

#[cfg(unix)]
pub use fifolog_server::{ReaderExit, Supervisor};
#[cfg(unix)]
pub use fifolog_transport::Channel;
