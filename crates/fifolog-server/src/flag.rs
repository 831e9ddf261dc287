use std::ptr::NonNull;
use std::sync::atomic::{AtomicBool, Ordering};

/// A boolean shared between the supervisor and the reader process it forks.
///
/// Backed by an anonymous `MAP_SHARED` mapping, so a child forked after
/// construction observes stores made by the parent and vice versa. The flag
/// only ever goes from unset to set.
pub struct TerminationFlag {
    ptr: NonNull<AtomicBool>,
}

// SAFETY: the mapping holds a single AtomicBool and is only accessed through it.
unsafe impl Send for TerminationFlag {}
// SAFETY: as above; all access is atomic.
unsafe impl Sync for TerminationFlag {}

impl TerminationFlag {
    /// Map a fresh, unset flag.
    pub fn new() -> std::io::Result<Self> {
        let size = std::mem::size_of::<AtomicBool>();
        // SAFETY: anonymous mapping with no fd or fixed address; the result is
        // checked against MAP_FAILED before use.
        let raw = unsafe {
            libc::mmap(
                std::ptr::null_mut(),
                size,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_SHARED | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        if raw == libc::MAP_FAILED {
            return Err(std::io::Error::last_os_error());
        }

        let ptr = NonNull::new(raw.cast::<AtomicBool>())
            .ok_or_else(|| std::io::Error::other("mmap returned a null mapping"))?;
        // SAFETY: the mapping is page aligned, writable, and at least one byte long.
        unsafe { ptr.as_ptr().write(AtomicBool::new(false)) };
        Ok(Self { ptr })
    }

    /// Request termination. Idempotent.
    pub fn request(&self) {
        self.atomic().store(true, Ordering::SeqCst);
    }

    /// Whether termination has been requested.
    pub fn is_requested(&self) -> bool {
        self.atomic().load(Ordering::SeqCst)
    }

    fn atomic(&self) -> &AtomicBool {
        // SAFETY: `ptr` was initialized in `new` and stays mapped until drop.
        unsafe { self.ptr.as_ref() }
    }
}

impl Drop for TerminationFlag {
    fn drop(&mut self) {
        // SAFETY: unmaps exactly the region mapped in `new`; no references outlive self.
        let rc = unsafe {
            libc::munmap(
                self.ptr.as_ptr().cast::<libc::c_void>(),
                std::mem::size_of::<AtomicBool>(),
            )
        };
        if rc != 0 {
            tracing::debug!(error = %std::io::Error::last_os_error(), "munmap of termination flag failed");
        }
    }
}

impl std::fmt::Debug for TerminationFlag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TerminationFlag")
            .field("requested", &self.is_requested())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_unset_and_latches() {
        let flag = TerminationFlag::new().unwrap();
        assert!(!flag.is_requested());
        flag.request();
        assert!(flag.is_requested());
        flag.request();
        assert!(flag.is_requested());
    }

    #[test]
    fn visible_across_threads() {
        let flag = std::sync::Arc::new(TerminationFlag::new().unwrap());
        let remote = std::sync::Arc::clone(&flag);
        std::thread::spawn(move || remote.request()).join().unwrap();
        assert!(flag.is_requested());
    }
}
