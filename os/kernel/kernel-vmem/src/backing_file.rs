/// Positioned read from the file behind a VMA failed.
#[derive(Debug, Copy, Clone, Eq, PartialEq, thiserror::Error)]
pub enum FileReadError {
    #[error("I/O error reading at offset {offset}")]
    Io { offset: u64 },
}

/// An open file that can back a virtual memory area.
///
/// The content lock is a sleeping lock: taking it may suspend the caller
/// while another context reads or writes the file.
pub trait BackingFile: Sync {
    /// Acquire the content lock.
    fn lock(&self);

    /// Release the content lock.
    ///
    /// # Safety
    /// The caller must hold the lock taken with [`lock`](Self::lock).
    unsafe fn unlock(&self);

    /// Read up to `dest.len()` bytes starting at `offset`. Returns the number
    /// of bytes read, which is short at end of file. Requires the content lock.
    ///
    /// # Errors
    /// The underlying storage could not be read.
    fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<usize, FileReadError>;
}

/// Holds a [`BackingFile`]'s content lock until dropped.
pub struct ContentGuard<'f> {
    file: &'f dyn BackingFile,
}

impl<'f> ContentGuard<'f> {
    pub fn lock(file: &'f dyn BackingFile) -> Self {
        file.lock();
        Self { file }
    }

    /// See [`BackingFile::read_at`].
    ///
    /// # Errors
    /// The underlying storage could not be read.
    pub fn read_at(&self, offset: u64, dest: &mut [u8]) -> Result<usize, FileReadError> {
        self.file.read_at(offset, dest)
    }
}

impl Drop for ContentGuard<'_> {
    fn drop(&mut self) {
        // SAFETY: Taken in `ContentGuard::lock`.
        unsafe { self.file.unlock() };
    }
}
