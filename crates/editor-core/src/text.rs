use crate::errors::{EditorError, EditorResult};
use crate::piece_table::table::{Cursor, PieceTable};

/// # The Core Philosophies of This API
///
/// - Byte-Addressed: callers speak absolute byte offsets; the editor knows
///   nothing about lines, characters or encodings.
/// - Immutability for Reads: query paths (`iterate`, `cursor`, `bytes_at`)
///   take `&self` and never observe partial mutations, because `span_swap`
///   is the single commit point for every edit.
/// - Ownership of State: the `Editor` owns the piece table, the file
///   identity and the saved-document marker so they never drift apart.
#[derive(Debug)]
pub struct Editor {
    table: PieceTable,

    /// The file path this document was loaded from, if any.
    path: Option<std::path::PathBuf>,

    /// Identity of the undo-stack top at the last successful save; compared
    /// against the current top to answer [`is_modified`](Self::is_modified).
    saved_action: Option<u64>,
}

/*

==================================
===== CREATION, OPEN, & SAVE =====
==================================

*/

impl Editor {
    /// Creates an editor over an empty document with no backing file.
    #[must_use]
    pub fn new() -> Self {
        Self {
            table: PieceTable::new(None),
            path: None,
            saved_action: None,
        }
    }

    /// Opens a file read-only via a memory mapping and makes it the
    /// document's original content. The mapping stays alive until the
    /// editor is dropped; edits never touch it.
    ///
    /// # Errors
    ///
    /// - `EditorError::NotRegularFile` if `path` is not a regular file.
    /// - `EditorError::Io` if the file cannot be opened or mapped.
    pub fn open(path: impl AsRef<std::path::Path>) -> EditorResult<Self> {
        let path_buf = path.as_ref().to_path_buf();

        let info = std::fs::metadata(&path_buf)?;
        if !info.is_file() {
            return Err(EditorError::NotRegularFile(path_buf));
        }

        let mapped = io::mmap::MmapFile::open(&path_buf)?;
        tracing::debug!(path = %path_buf.display(), bytes = mapped.len(), "opened document");

        Ok(Self {
            table: PieceTable::new(Some(mapped)),
            path: Some(path_buf),
            saved_action: None,
        })
    }

    /// Safely flushes the document to `path`.
    ///
    /// The content is first written into a sibling temp file
    /// (`.<basename>.tmp`, mode 0600) through a shared writable mapping and
    /// then atomically renamed over the destination, so a crash mid-save
    /// never corrupts an existing file. A successful save records the
    /// saved-document marker and takes a snapshot.
    ///
    /// # Errors
    ///
    /// - `EditorError::Io` if the temp file cannot be written or renamed;
    ///   the destination is left untouched and the temp file is removed
    ///   best-effort.
    pub fn save(&mut self, path: impl AsRef<std::path::Path>) -> EditorResult<()> {
        let path = path.as_ref();
        let tmp = tmp_path(path);

        if let Err(err) = self.write_and_rename(&tmp, path) {
            let _ = std::fs::remove_file(&tmp);
            return Err(err);
        }

        self.saved_action = self.table.top_action_id();
        self.table.snapshot();
        tracing::debug!(path = %path.display(), bytes = self.table.len(), "saved document");
        Ok(())
    }

    fn write_and_rename(&self, tmp: &std::path::Path, dst: &std::path::Path) -> EditorResult<()> {
        let size = self.table.len();
        let mut out = io::mmap::MmapFileMut::create(tmp, size)?;

        if size > 0 {
            let dest = out.as_mut_slice();
            let mut at = 0;
            self.table.iterate(0, |_, bytes| {
                dest[at..at + bytes.len()].copy_from_slice(bytes);
                at += bytes.len();
                true
            })?;
        }

        out.sync()?;
        drop(out);
        std::fs::rename(tmp, dst)?;
        Ok(())
    }
}

impl Default for Editor {
    fn default() -> Self {
        Self::new()
    }
}

/*

==================================
========== MUTATION ==============
==================================

*/

impl Editor {
    /// Inserts `bytes` at byte offset `pos`.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if `pos` lies past the end.
    /// - `EditorError::OutOfMemory` if an append buffer cannot grow.
    pub fn insert(&mut self, pos: usize, bytes: &[u8]) -> EditorResult<()> {
        self.table.insert(pos, bytes)
    }

    /// Deletes `len` bytes starting at byte offset `pos`.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if `pos + len` lies past the end.
    pub fn delete(&mut self, pos: usize, len: usize) -> EditorResult<()> {
        self.table.delete(pos, len)
    }

    /// Replaces the `bytes.len()` bytes at `pos` with `bytes`, both halves
    /// in the same action. The insert still runs when the delete fails
    /// (e.g. the replaced range sticks out past the end); the result then
    /// reports the failure.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` from either half.
    /// - `EditorError::OutOfMemory` if an append buffer cannot grow.
    pub fn replace(&mut self, pos: usize, bytes: &[u8]) -> EditorResult<()> {
        let deleted = self.table.delete(pos, bytes.len());
        self.table.insert(pos, bytes)?;
        deleted
    }

    /// Undoes all changes of the last action. Returns whether one existed.
    pub fn undo(&mut self) -> bool {
        self.table.undo()
    }

    /// Redoes all changes of the last undone action. Returns whether one
    /// existed.
    pub fn redo(&mut self) -> bool {
        self.table.redo()
    }

    /// Preserves the current content as one undo unit: edits before this
    /// call undo together, edits after it start a fresh action.
    pub fn snapshot(&mut self) {
        self.table.snapshot();
    }
}

/*

==================================
=========== QUERIES ==============
==================================

*/

impl Editor {
    /// Document length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.table.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    /// Whether the document differs from its last saved (or freshly loaded)
    /// state, judged by undo-stack position rather than content comparison.
    #[must_use]
    pub fn is_modified(&self) -> bool {
        self.table.top_action_id() != self.saved_action
    }

    /// Number of pieces in the active sequence; a diagnostic, mostly
    /// interesting to observe edit coalescing.
    #[must_use]
    pub fn piece_count(&self) -> usize {
        self.table.piece_count()
    }

    /// When the most recent action was started, if any edit happened.
    #[must_use]
    pub fn last_change_time(&self) -> Option<std::time::SystemTime> {
        self.table.last_change_time()
    }

    /// The path the document was loaded from, if any.
    #[must_use]
    pub fn path(&self) -> Option<&std::path::Path> {
        self.path.as_deref()
    }

    /// Calls `f` with `(absolute_pos, bytes)` for each piece from `pos`
    /// until `f` returns `false` or the document ends.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if `pos` lies past the end.
    pub fn iterate<F>(&self, pos: usize, f: F) -> EditorResult<()>
    where
        F: FnMut(usize, &[u8]) -> bool,
    {
        self.table.iterate(pos, f)
    }

    /// A piece-granular cursor positioned at `pos`.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if `pos` lies past the end.
    pub fn cursor(&self, pos: usize) -> EditorResult<Cursor<'_>> {
        self.table.cursor(pos)
    }

    /// Copies `len` bytes starting at `pos` out of the document.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if the range sticks out past the end.
    pub fn bytes_at(&self, pos: usize, len: usize) -> EditorResult<Vec<u8>> {
        self.table.bytes_at(pos, len)
    }

    /// The full document content as one owned byte vector.
    #[must_use]
    pub fn content(&self) -> Vec<u8> {
        self.table.bytes_at(0, self.table.len()).unwrap_or_default()
    }
}

/// Sibling temp file used by the atomic save: `.<basename>.tmp` next to the
/// destination, so the final rename never crosses a filesystem.
fn tmp_path(path: &std::path::Path) -> std::path::PathBuf {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    path.with_file_name(format!(".{name}.tmp"))
}

/*

==================================
============ TESTS ===============
==================================

*/
