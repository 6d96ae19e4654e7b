/// A file mapped read-only for the lifetime of this handle.
///
/// The loaded document keeps one of these around as its immutable backing
/// store; pieces reference byte ranges inside it.
#[derive(Debug)]
pub struct MmapFile {
    _file: std::fs::File,
    mmap: memmap2::Mmap,
}

impl MmapFile {
    /// # Errors
    ///
    /// - `std::io::Error` if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<std::path::Path>) -> std::io::Result<Self> {
        let file = std::fs::File::open(path)?;

        // SAFETY:
        // - File is opened read-only
        // - We keep the file handle alive in struct
        // - Caller only gets immutable &[u8]
        let mmap = unsafe { memmap2::Mmap::map(&file)? };

        Ok(Self { _file: file, mmap })
    }

    #[inline]
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.mmap
    }

    /// File length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.mmap.len()
    }

    /// Whether file is empty.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A freshly created file mapped shared and writable, sized up front.
///
/// Used by the save path: the document is streamed into the mapping and the
/// file is then renamed over its destination. A zero-byte file is not mapped
/// at all (the kernel rejects empty mappings); `as_mut_slice` is just empty.
#[derive(Debug)]
pub struct MmapFileMut {
    file: std::fs::File,
    mmap: Option<memmap2::MmapMut>,
}

impl MmapFileMut {
    /// Creates (or truncates) `path` with mode 0600, extends it to `size`
    /// bytes and maps it shared.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` if the file cannot be created, resized or mapped.
    pub fn create(path: impl AsRef<std::path::Path>, size: usize) -> std::io::Result<Self> {
        use std::os::unix::fs::OpenOptionsExt;

        let file = std::fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)?;

        file.set_len(size as u64)?;

        let mmap = if size > 0 {
            // SAFETY:
            // - The mapping is private to this process until the rename
            // - We keep the file handle alive in struct
            // - The file was just truncated to exactly `size` bytes
            Some(unsafe { memmap2::MmapMut::map_mut(&file)? })
        } else {
            None
        };

        Ok(Self { file, mmap })
    }

    #[inline]
    #[must_use]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        self.mmap.as_mut().map_or(&mut [], |m| &mut m[..])
    }

    /// Flushes the mapping and the file itself to disk.
    ///
    /// # Errors
    ///
    /// - `std::io::Error` if either flush fails.
    pub fn sync(&self) -> std::io::Result<()> {
        if let Some(mmap) = &self.mmap {
            mmap.flush()?;
        }
        self.file.sync_all()
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    #[test]
    fn open_maps_file_contents() {
        let mut tmp = tempfile::NamedTempFile::new().unwrap();
        tmp.write_all(b"mapped bytes").unwrap();
        tmp.as_file().sync_all().unwrap();

        let mapped = super::MmapFile::open(tmp.path()).unwrap();
        assert_eq!(mapped.as_slice(), b"mapped bytes");
        assert_eq!(mapped.len(), 12);
        assert!(!mapped.is_empty());
    }

    #[test]
    fn create_mut_roundtrips_through_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out");

        let mut out = super::MmapFileMut::create(&path, 5).unwrap();
        out.as_mut_slice().copy_from_slice(b"hello");
        out.sync().unwrap();
        drop(out);

        assert_eq!(std::fs::read(&path).unwrap(), b"hello");
    }

    #[test]
    fn create_mut_empty_file_has_no_mapping() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("empty");

        let mut out = super::MmapFileMut::create(&path, 0).unwrap();
        assert!(out.as_mut_slice().is_empty());
        out.sync().unwrap();
        drop(out);

        assert_eq!(std::fs::read(&path).unwrap().len(), 0);
    }
}
