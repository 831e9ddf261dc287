use std::ffi::CString;
use std::fs::{File, OpenOptions};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::{FileTypeExt, MetadataExt, OpenOptionsExt, PermissionsExt};
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::error::{Result, TransportError};
use crate::traits::WriteEnd;

/// A named pipe at a filesystem path.
///
/// One process holds the read end; any number of processes open the write end
/// for short bursts. Opening either end in blocking mode waits for the other
/// side, which is what the supervisor relies on during start-up.
#[derive(Debug, Clone)]
pub struct Channel {
    path: PathBuf,
    /// Identity of the FIFO this handle created, if any.
    created_inode: Option<(u64, u64)>,
}

impl Channel {
    /// Default permission mode for created FIFOs.
    pub const DEFAULT_FIFO_MODE: u32 = 0o600;

    /// Create a fresh FIFO at `path`, replacing whatever entry is there.
    pub fn ensure(path: impl AsRef<Path>) -> Result<Self> {
        Self::ensure_with_mode(path, Self::DEFAULT_FIFO_MODE)
    }

    /// Create a fresh FIFO at `path` with an explicit permission mode.
    ///
    /// An existing FIFO, stale socket, or regular file at `path` is removed
    /// first. Directories are never removed.
    pub fn ensure_with_mode(path: impl AsRef<Path>, mode: u32) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let create_err = |source| TransportError::Create {
            path: path.clone(),
            source,
        };

        match std::fs::symlink_metadata(&path) {
            Ok(metadata) if metadata.is_dir() => {
                return Err(create_err(std::io::Error::new(
                    std::io::ErrorKind::AlreadyExists,
                    "existing path is a directory",
                )));
            }
            Ok(_) => {
                debug!(?path, "removing existing channel entry");
                std::fs::remove_file(&path).map_err(create_err)?;
            }
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(err) => return Err(create_err(err)),
        }

        mkfifo(&path, mode).map_err(create_err)?;

        // mkfifo is subject to the umask; pin the requested mode.
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(mode))
            .map_err(create_err)?;
        let created = std::fs::symlink_metadata(&path).map_err(create_err)?;

        info!(?path, "created channel");

        Ok(Self {
            created_inode: Some((created.dev(), created.ino())),
            path,
        })
    }

    /// Bind to an existing FIFO without taking ownership of it.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let metadata = match std::fs::metadata(&path) {
            Ok(metadata) => metadata,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
                return Err(TransportError::NotFound(path));
            }
            Err(err) => {
                return Err(TransportError::Open { path, source: err });
            }
        };

        if !metadata.file_type().is_fifo() {
            return Err(TransportError::NotAFifo(path));
        }

        Ok(Self {
            path,
            created_inode: None,
        })
    }

    /// Open the read end. Blocks until some process opens the write end.
    pub fn open_read(&self) -> Result<File> {
        let file = OpenOptions::new()
            .read(true)
            .open(&self.path)
            .map_err(|source| TransportError::Open {
                path: self.path.clone(),
                source,
            })?;
        debug!(path = ?self.path, "opened channel for reading");
        Ok(file)
    }

    /// Whether a FIFO currently exists at this channel's path.
    pub fn exists(&self) -> bool {
        std::fs::symlink_metadata(&self.path)
            .map(|metadata| metadata.file_type().is_fifo())
            .unwrap_or(false)
    }

    /// Remove the FIFO.
    ///
    /// A channel created by [`Channel::ensure`] only removes the path if it
    /// still refers to the FIFO it created.
    pub fn try_remove(&self) -> Result<()> {
        if let Some((expected_dev, expected_ino)) = self.created_inode {
            match std::fs::symlink_metadata(&self.path) {
                Ok(metadata)
                    if metadata.dev() == expected_dev && metadata.ino() == expected_ino => {}
                Ok(_) => {
                    debug!(path = ?self.path, "channel path identity changed; skipping removal");
                    return Ok(());
                }
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(()),
                Err(source) => {
                    return Err(TransportError::Remove {
                        path: self.path.clone(),
                        source,
                    });
                }
            }
        }

        std::fs::remove_file(&self.path).map_err(|source| TransportError::Remove {
            path: self.path.clone(),
            source,
        })?;
        info!(path = ?self.path, "removed channel");
        Ok(())
    }

    /// Remove the FIFO, logging instead of failing.
    pub fn remove(&self) {
        if let Err(err) = self.try_remove() {
            warn!(path = ?self.path, error = %err, "channel removal failed");
        }
    }

    /// The path this channel lives at.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl WriteEnd for Channel {
    type Stream = File;

    fn open_write(&self) -> std::io::Result<File> {
        OpenOptions::new().write(true).open(&self.path)
    }

    fn open_write_nonblocking(&self) -> std::io::Result<File> {
        OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(&self.path)
    }

    fn open_write_attached(&self) -> std::io::Result<File> {
        let file = self.open_write_nonblocking()?;
        clear_nonblocking(&file)?;
        Ok(file)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

fn clear_nonblocking(file: &File) -> std::io::Result<()> {
    let fd = file.as_raw_fd();
    // SAFETY: `fd` is an open descriptor owned by `file` for the whole call.
    let flags = unsafe { libc::fcntl(fd, libc::F_GETFL) };
    if flags == -1 {
        return Err(std::io::Error::last_os_error());
    }
    // SAFETY: same descriptor; only the status flags change.
    if unsafe { libc::fcntl(fd, libc::F_SETFL, flags & !libc::O_NONBLOCK) } == -1 {
        return Err(std::io::Error::last_os_error());
    }
    Ok(())
}

fn mkfifo(path: &Path, mode: u32) -> std::io::Result<()> {
    let c_path = CString::new(path.as_os_str().as_bytes()).map_err(|_| {
        std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            "path contains an interior NUL byte",
        )
    })?;

    // SAFETY: `c_path` is a valid NUL-terminated string that outlives the call.
    let rc = unsafe { libc::mkfifo(c_path.as_ptr(), mode as libc::mode_t) };
    if rc == 0 {
        Ok(())
    } else {
        Err(std::io::Error::last_os_error())
    }
}
