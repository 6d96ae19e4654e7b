/// Append-only byte arena for inserted text.
///
/// Capacity is fixed at allocation time and never exceeded, so a stored byte
/// range keeps its offset for the lifetime of the table. The only in-place
/// mutation allowed is through `insert_at`/`remove_at`, which the cache layer
/// restricts to bytes owned by the most recently created piece at the tail.
#[derive(Debug)]
pub struct AppendBuffer {
    data: Vec<u8>,
}

impl AppendBuffer {
    /// # Errors
    ///
    /// - `EditorError::OutOfMemory` if the reservation fails.
    pub fn with_capacity(capacity: usize) -> crate::errors::EditorResult<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(capacity)?;
        Ok(Self { data })
    }

    /// Bytes filled so far.
    #[inline]
    #[must_use]
    pub fn used(&self) -> usize {
        self.data.len()
    }

    /// Whether `len` more bytes fit without growing past the reservation.
    #[inline]
    #[must_use]
    pub fn fits(&self, len: usize) -> bool {
        self.data.capacity() - self.data.len() >= len
    }

    /// Appends `bytes` and returns the offset the copy starts at.
    /// The caller must have checked [`fits`](Self::fits).
    pub fn append(&mut self, bytes: &[u8]) -> usize {
        debug_assert!(self.fits(bytes.len()));
        let off = self.data.len();
        self.data.extend_from_slice(bytes);
        off
    }

    /// Writes `bytes` at `off`, shifting the tail right in place.
    #[must_use]
    pub fn insert_at(&mut self, off: usize, bytes: &[u8]) -> bool {
        if off > self.data.len() || !self.fits(bytes.len()) {
            return false;
        }
        self.data.splice(off..off, bytes.iter().copied());
        true
    }

    /// Removes `len` bytes at `off`, shifting the tail left in place.
    #[must_use]
    pub fn remove_at(&mut self, off: usize, len: usize) -> bool {
        match off.checked_add(len) {
            Some(end) if end <= self.data.len() => {
                self.data.drain(off..end);
                true
            }
            _ => false,
        }
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }
}
