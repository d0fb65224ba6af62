//! Allocator hints.

/// Asks the allocator to return freed heap pages to the operating system.
///
/// Called after sessions are torn down; on platforms without such a hook
/// this is a no-op.
pub fn release_unused() {
    #[cfg(all(target_os = "linux", target_env = "gnu"))]
    {
        // SAFETY: malloc_trim only walks allocator-internal free lists.
        let released = unsafe { libc::malloc_trim(0) };
        tracing::trace!(released = released != 0, "malloc_trim");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_release_unused_is_callable_repeatedly() {
        let buffers: Vec<Vec<u8>> = (0..64).map(|_| vec![0u8; 64 * 1024]).collect();
        drop(buffers);

        release_unused();
        release_unused();
    }
}
