use crate::errors::{EditorError, EditorResult};
use crate::history::{Action, Change, Span};
use crate::piece_table::BUFFER_MIN;
use crate::piece_table::buffer::AppendBuffer;
use crate::piece_table::piece::{BufferKind, Piece, PieceId};

/// Fixed arena slots of the sentinel pieces. The sentinels carry no bytes,
/// permanently bracket the sequence, and link to themselves at the outer
/// ends so stepping past them parks rather than wraps.
pub const BEGIN: PieceId = PieceId(0);
pub const END: PieceId = PieceId(1);

#[derive(Debug)]
pub struct PieceTable {
    /// Original unchanged file content (shared, zero-copy); absent for
    /// documents started empty.
    original: Option<io::mmap::MmapFile>,
    /// Append-only buffers holding inserted text, in allocation order. The
    /// last one is the store target and the only buffer the cache touches.
    buffers: Vec<AppendBuffer>,
    /// Piece arena. Slots 0 and 1 are the sentinels; slots freed by a
    /// discarded redo action are recycled through `free`.
    pieces: Vec<Piece>,
    free: Vec<PieceId>,
    /// Most recently produced piece, if its bytes sit at the tail of the
    /// newest append buffer.
    cache: Option<PieceId>,

    undo_stack: Vec<Action>,
    redo_stack: Vec<Action>,
    /// Whether the top of the undo stack still accepts changes.
    action_open: bool,
    next_action_id: u64,

    /// Document size in bytes; always the sum of the active piece lengths.
    size: usize,
}

/*

====================================
========= CREATION METHOD ==========
====================================

*/

impl PieceTable {
    pub fn new(original: Option<io::mmap::MmapFile>) -> Self {
        let sentinel = |prev, next| Piece {
            prev,
            next,
            buf_kind: BufferKind::Original,
            off: 0,
            len: 0,
        };

        let mut table = Self {
            original: None,
            buffers: Vec::new(),
            pieces: vec![sentinel(BEGIN, END), sentinel(BEGIN, END)],
            free: Vec::new(),
            cache: None,
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            action_open: false,
            next_action_id: 0,
            size: 0,
        };

        if let Some(mapped) = original {
            if !mapped.is_empty() {
                let len = mapped.len();
                let first = table.alloc_piece();
                table.init_piece(first, BEGIN, END, BufferKind::Original, 0, len);
                table.pieces[BEGIN.0].next = first;
                table.pieces[END.0].prev = first;
                table.size = len;
            }
            table.original = Some(mapped);
        }

        table
    }
}

/*

====================================
========= INLINE METHODS  ==========
====================================

*/

impl PieceTable {
    /// Total document length in bytes.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.size
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Number of pieces in the active sequence, sentinels excluded.
    #[must_use]
    pub fn piece_count(&self) -> usize {
        let mut count = 0;
        let mut id = self.pieces[BEGIN.0].next;
        while id != END {
            count += 1;
            id = self.pieces[id.0].next;
        }
        count
    }

    #[inline]
    #[must_use]
    pub fn undo_depth(&self) -> usize {
        self.undo_stack.len()
    }

    #[inline]
    #[must_use]
    pub fn redo_depth(&self) -> usize {
        self.redo_stack.len()
    }

    /// Identity of the action on top of the undo stack, if any. The save
    /// path records this as the saved-document marker.
    #[inline]
    #[must_use]
    pub fn top_action_id(&self) -> Option<u64> {
        self.undo_stack.last().map(|action| action.id)
    }

    /// When the most recent action was started.
    #[inline]
    #[must_use]
    pub fn last_change_time(&self) -> Option<std::time::SystemTime> {
        self.undo_stack.last().map(|action| action.time)
    }

    /// The bytes a piece references. Zero-length pieces (the sentinels)
    /// yield an empty slice without touching any backing store.
    fn piece_bytes(&self, id: PieceId) -> &[u8] {
        let p = &self.pieces[id.0];
        if p.len == 0 {
            return &[];
        }
        match p.buf_kind {
            BufferKind::Original => match &self.original {
                Some(mapped) => &mapped.as_slice()[p.off..p.off + p.len],
                None => unreachable!("piece references an original mapping that was never loaded"),
            },
            BufferKind::Add(i) => &self.buffers[i].as_slice()[p.off..p.off + p.len],
        }
    }

    /// Resolves `pos` to the piece containing it plus the offset inside
    /// that piece. A position on a piece boundary resolves to the *earlier*
    /// piece with `off == piece.len`; position 0 resolves to the begin
    /// sentinel.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if `pos` lies past the end of the
    ///   document.
    pub fn locate(&self, pos: usize) -> EditorResult<(PieceId, usize)> {
        let mut cur = 0;
        let mut id = BEGIN;
        loop {
            let piece_len = self.pieces[id.0].len;
            if pos <= cur + piece_len {
                return Ok((id, pos - cur));
            }
            cur += piece_len;
            id = self.pieces[id.0].next;
            if id == END {
                break;
            }
        }
        Err(EditorError::OutOfRange {
            pos,
            size: self.size,
        })
    }
}

/*

====================================
========== PIECES & SPANS ==========
====================================

*/

impl PieceTable {
    fn alloc_piece(&mut self) -> PieceId {
        if let Some(id) = self.free.pop() {
            return id;
        }
        self.pieces.push(Piece {
            prev: BEGIN,
            next: END,
            buf_kind: BufferKind::Original,
            off: 0,
            len: 0,
        });
        PieceId(self.pieces.len() - 1)
    }

    fn init_piece(
        &mut self,
        id: PieceId,
        prev: PieceId,
        next: PieceId,
        buf_kind: BufferKind,
        off: usize,
        len: usize,
    ) {
        self.pieces[id.0] = Piece {
            prev,
            next,
            buf_kind,
            off,
            len,
        };
    }

    /// Builds the span `start..=end`, accumulating piece lengths along the
    /// sequence links.
    fn span(&self, start: PieceId, end: PieceId) -> Span {
        let mut len = 0;
        let mut cur = start;
        loop {
            len += self.pieces[cur.0].len;
            if cur == end {
                break;
            }
            cur = self.pieces[cur.0].next;
        }
        Span {
            start: Some(start),
            end: Some(end),
            len,
        }
    }

    /// Swaps `old` out of the linked sequence for `new` and adjusts the
    /// document size. Both spans attach to the same neighbors, so only the
    /// two boundary links are rewritten; the operation inverts itself when
    /// called with the arguments exchanged.
    fn span_swap(&mut self, old: &Span, new: &Span) {
        match (old.start.zip(old.end), new.start.zip(new.end)) {
            (None, None) => return,
            (None, Some((new_start, new_end))) => {
                // insert the new span; its pieces already link to the
                // surrounding neighbors
                let prev = self.pieces[new_start.0].prev;
                let next = self.pieces[new_end.0].next;
                self.pieces[prev.0].next = new_start;
                self.pieces[next.0].prev = new_end;
            }
            (Some((old_start, old_end)), None) => {
                // unlink the old span
                let prev = self.pieces[old_start.0].prev;
                let next = self.pieces[old_end.0].next;
                self.pieces[prev.0].next = next;
                self.pieces[next.0].prev = prev;
            }
            (Some((old_start, old_end)), Some((new_start, new_end))) => {
                let prev = self.pieces[old_start.0].prev;
                let next = self.pieces[old_end.0].next;
                self.pieces[prev.0].next = new_start;
                self.pieces[next.0].prev = new_end;
            }
        }
        self.size -= old.len;
        self.size += new.len;
    }

    /// Returns the pieces of a discarded `new` span to the free list. Only
    /// called when the owning action leaves the redo stack, at which point
    /// nothing reachable references these pieces.
    fn free_span(&mut self, span: &Span) {
        let (Some(start), Some(end)) = (span.start, span.end) else {
            return;
        };
        let mut cur = start;
        loop {
            let next = self.pieces[cur.0].next;
            if self.cache == Some(cur) {
                self.cache = None;
            }
            self.free.push(cur);
            if cur == end {
                break;
            }
            cur = next;
        }
    }
}

/*

====================================
======== CHANGES & ACTIONS =========
====================================

*/

impl PieceTable {
    /// Drops every redone action and frees the pieces its changes had
    /// introduced; the `old` sides stay alive in surviving history.
    fn purge_redo(&mut self) {
        for action in std::mem::take(&mut self.redo_stack) {
            for change in &action.changes {
                self.free_span(&change.new);
            }
        }
    }

    /// Records a change on the current action, starting a fresh action (and
    /// discarding the redo stack) when none is in progress.
    fn push_change(&mut self, old: Span, new: Span) {
        if !self.action_open {
            self.purge_redo();
            let id = self.next_action_id;
            self.next_action_id += 1;
            self.undo_stack.push(Action {
                changes: Vec::new(),
                time: std::time::SystemTime::now(),
                id,
            });
            self.action_open = true;
            tracing::trace!(action = id, "opened action");
        }
        if let Some(action) = self.undo_stack.last_mut() {
            action.changes.push(Change { old, new });
        }
    }

    /// Ends the current action and disables the append cache: the next edit
    /// starts a fresh undo unit and a fresh piece. Idempotent.
    pub fn snapshot(&mut self) {
        self.action_open = false;
        self.cache = None;
    }

    /// Undoes all changes of the last action. Returns whether one existed.
    pub fn undo(&mut self) -> bool {
        self.snapshot();
        let Some(action) = self.undo_stack.pop() else {
            return false;
        };
        for change in action.changes.iter().rev() {
            self.span_swap(&change.new, &change.old);
        }
        tracing::trace!(action = action.id, "undid action");
        self.redo_stack.push(action);
        true
    }

    /// Redoes all changes of the last undone action. Returns whether one
    /// existed.
    pub fn redo(&mut self) -> bool {
        self.snapshot();
        let Some(action) = self.redo_stack.pop() else {
            return false;
        };
        for change in action.changes.iter().rev() {
            self.span_swap(&change.old, &change.new);
        }
        tracing::trace!(action = action.id, "redid action");
        self.undo_stack.push(action);
        true
    }
}

/*

====================================
========== APPEND CACHE  ===========
====================================

*/

impl PieceTable {
    /// Copies `bytes` into the newest append buffer, allocating a fresh one
    /// when the remaining capacity is too small. Returns the buffer index
    /// and the offset of the copy.
    fn store(&mut self, bytes: &[u8]) -> EditorResult<(usize, usize)> {
        if self.buffers.last().is_none_or(|buf| !buf.fits(bytes.len())) {
            let capacity = bytes.len().max(BUFFER_MIN);
            tracing::debug!(capacity, "allocating append buffer");
            self.buffers.push(AppendBuffer::with_capacity(capacity)?);
        }
        let idx = self.buffers.len() - 1;
        let off = self.buffers[idx].append(bytes);
        Ok((idx, off))
    }

    /// Remembers `id` as the in-place append target if its bytes sit at the
    /// tail of the newest append buffer.
    fn cache_piece(&mut self, id: PieceId) {
        let Some(buf_idx) = self.buffers.len().checked_sub(1) else {
            return;
        };
        let p = &self.pieces[id.0];
        if p.buf_kind == BufferKind::Add(buf_idx) && p.off + p.len == self.buffers[buf_idx].used() {
            self.cache = Some(id);
        }
    }

    /// A piece may be edited in place iff it is the cached piece, it heads
    /// the current change's new span, and its bytes still occupy the tail
    /// of the newest append buffer.
    fn cache_contains(&self, id: PieceId) -> bool {
        let Some(buf_idx) = self.buffers.len().checked_sub(1) else {
            return false;
        };
        if self.cache != Some(id) || !self.action_open {
            return false;
        }
        let Some(change) = self.undo_stack.last().and_then(|a| a.changes.last()) else {
            return false;
        };
        if change.new.start != Some(id) {
            return false;
        }
        let p = &self.pieces[id.0];
        p.buf_kind == BufferKind::Add(buf_idx) && p.off + p.len == self.buffers[buf_idx].used()
    }

    /// Fast path: extend the cached piece in place instead of allocating
    /// pieces and a change. The piece, its containing change and the
    /// document size all grow by `bytes.len()`.
    fn cache_insert(&mut self, id: PieceId, off: usize, bytes: &[u8]) -> bool {
        if !self.cache_contains(id) {
            return false;
        }
        let bufpos = self.pieces[id.0].off + off;
        let buf_idx = self.buffers.len() - 1;
        if !self.buffers[buf_idx].insert_at(bufpos, bytes) {
            return false;
        }
        self.pieces[id.0].len += bytes.len();
        if let Some(change) = self.undo_stack.last_mut().and_then(|a| a.changes.last_mut()) {
            change.new.len += bytes.len();
        }
        self.size += bytes.len();
        true
    }

    /// Fast path: shrink the cached piece in place. Only applies when the
    /// whole removed range lies inside the cached piece.
    fn cache_delete(&mut self, id: PieceId, off: usize, len: usize) -> bool {
        if !self.cache_contains(id) {
            return false;
        }
        let p = &self.pieces[id.0];
        if off + len > p.len {
            return false;
        }
        let bufpos = p.off + off;
        let buf_idx = self.buffers.len() - 1;
        if !self.buffers[buf_idx].remove_at(bufpos, len) {
            return false;
        }
        self.pieces[id.0].len -= len;
        if let Some(change) = self.undo_stack.last_mut().and_then(|a| a.changes.last_mut()) {
            change.new.len -= len;
        }
        self.size -= len;
        true
    }
}

/*

=====================================
========= INSERT / DELETE  ==========
=====================================

*/

impl PieceTable {
    /// Inserts `bytes` at byte offset `pos`.
    ///
    /// A boundary insertion adds a single piece between two existing ones;
    /// an insertion into the middle of a piece replaces it with three new
    /// pieces (prefix, inserted text, suffix). Sequential insertions at the
    /// tail of the newest piece coalesce through the cache instead.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if `pos` lies past the end.
    /// - `EditorError::OutOfMemory` if an append buffer cannot grow.
    pub fn insert(&mut self, pos: usize, bytes: &[u8]) -> EditorResult<()> {
        if bytes.is_empty() {
            return Ok(());
        }
        let (p, off) = self.locate(pos)?;
        if self.cache_insert(p, off, bytes) {
            return Ok(());
        }

        let (buf_idx, buf_off) = self.store(bytes)?;
        let kind = BufferKind::Add(buf_idx);

        let (old, new, fresh) = if off == self.pieces[p.0].len {
            // Insert between two existing pieces: nothing to remove, one
            // new piece holding the extra text.
            let next = self.pieces[p.0].next;
            let fresh = self.alloc_piece();
            self.init_piece(fresh, p, next, kind, buf_off, bytes.len());
            (Span::EMPTY, self.span(fresh, fresh), fresh)
        } else {
            // Split the existing piece: prefix, inserted text, suffix.
            let split = self.pieces[p.0];
            let before = self.alloc_piece();
            let fresh = self.alloc_piece();
            let after = self.alloc_piece();
            self.init_piece(before, split.prev, fresh, split.buf_kind, split.off, off);
            self.init_piece(fresh, before, after, kind, buf_off, bytes.len());
            self.init_piece(
                after,
                fresh,
                split.next,
                split.buf_kind,
                split.off + off,
                split.len - off,
            );
            (self.span(p, p), self.span(before, after), fresh)
        };

        self.push_change(old, new);
        self.cache_piece(fresh);
        self.span_swap(&old, &new);
        Ok(())
    }

    /// Deletes `len` bytes starting at byte offset `pos`.
    ///
    /// The removed range is a whole span of pieces; when it starts or stops
    /// midway through a piece, a replacement piece covering the surviving
    /// prefix/suffix is allocated. Deletions inside the cached piece shrink
    /// it in place instead.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if `pos + len` lies past the end.
    pub fn delete(&mut self, pos: usize, len: usize) -> EditorResult<()> {
        if len == 0 {
            return Ok(());
        }
        if pos.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(EditorError::OutOfRange {
                pos,
                size: self.size,
            });
        }
        let (p, off) = self.locate(pos)?;
        if self.cache_delete(p, off, len) {
            return Ok(());
        }

        let midway_start = off != self.pieces[p.0].len;
        let mut cur; // bytes of the removed span walked so far
        let start;
        let before; // surviving predecessor, or the new prefix piece
        if midway_start {
            cur = self.pieces[p.0].len - off;
            start = p;
            before = self.alloc_piece(); // initialized once `after` is known
        } else {
            cur = 0;
            start = self.pieces[p.0].next;
            before = p;
        }

        // skip all pieces which fall into the removed range
        let mut walk = p;
        while cur < len {
            walk = self.pieces[walk.0].next;
            cur += self.pieces[walk.0].len;
        }

        let midway_end = cur != len;
        let end = walk;
        let after = if midway_end {
            let last = self.pieces[walk.0];
            let excess = cur - len;
            let after = self.alloc_piece();
            self.init_piece(
                after,
                before,
                last.next,
                last.buf_kind,
                last.off + last.len - excess,
                excess,
            );
            after
        } else {
            self.pieces[walk.0].next
        };

        if midway_start {
            let first = self.pieces[start.0];
            self.init_piece(before, first.prev, after, first.buf_kind, first.off, off);
        }

        let new = match (midway_start, midway_end) {
            (true, true) => self.span(before, after),
            (true, false) => self.span(before, before),
            (false, true) => self.span(after, after),
            (false, false) => Span::EMPTY,
        };
        let old = self.span(start, end);

        self.push_change(old, new);
        self.span_swap(&old, &new);
        Ok(())
    }
}

/*

====================================
=========== ITERATION  =============
====================================

*/

impl PieceTable {
    /// Calls `f` with `(absolute_pos, bytes)` for the (possibly partial)
    /// piece at `pos` and every following piece, until `f` returns `false`
    /// or the sequence ends. Zero-length chunks are skipped.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if `pos` lies past the end.
    pub fn iterate<F>(&self, pos: usize, mut f: F) -> EditorResult<()>
    where
        F: FnMut(usize, &[u8]) -> bool,
    {
        let (p, off) = self.locate(pos)?;
        let mut id = if p == BEGIN { self.pieces[BEGIN.0].next } else { p };
        let mut off = if p == BEGIN { 0 } else { off };
        let mut pos = pos;
        while id != END {
            let bytes = &self.piece_bytes(id)[off..];
            if !bytes.is_empty() {
                if !f(pos, bytes) {
                    return Ok(());
                }
                pos += bytes.len();
            }
            off = 0;
            id = self.pieces[id.0].next;
        }
        Ok(())
    }

    /// Copies `len` bytes starting at `pos` out of the document.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if the range sticks out past the end.
    pub fn bytes_at(&self, pos: usize, len: usize) -> EditorResult<Vec<u8>> {
        if pos.checked_add(len).is_none_or(|end| end > self.size) {
            return Err(EditorError::OutOfRange {
                pos,
                size: self.size,
            });
        }
        let mut out = Vec::with_capacity(len);
        let mut remaining = len;
        self.iterate(pos, |_, bytes| {
            let take = bytes.len().min(remaining);
            out.extend_from_slice(&bytes[..take]);
            remaining -= take;
            remaining > 0
        })?;
        Ok(out)
    }

    /// A piece-granular cursor positioned at `pos`.
    ///
    /// # Errors
    ///
    /// - `EditorError::OutOfRange` if `pos` lies past the end.
    pub fn cursor(&self, pos: usize) -> EditorResult<Cursor<'_>> {
        let (p, off) = self.locate(pos)?;
        let piece = if p == BEGIN { self.pieces[BEGIN.0].next } else { p };
        Ok(Cursor {
            table: self,
            piece,
            off,
        })
    }
}

/// A piece-granular cursor over the document sequence.
///
/// `bytes` exposes the current piece from the cursor's offset to the
/// piece's end; `next`/`prev` step whole pieces. On the sentinels the
/// cursor reports invalid and stays parked when stepped further.
#[derive(Debug)]
pub struct Cursor<'a> {
    table: &'a PieceTable,
    piece: PieceId,
    off: usize,
}

impl<'a> Cursor<'a> {
    #[must_use]
    pub fn bytes(&self) -> &'a [u8] {
        &self.table.piece_bytes(self.piece)[self.off..]
    }

    pub fn next(&mut self) {
        self.piece = self.table.pieces[self.piece.0].next;
        self.off = 0;
    }

    pub fn prev(&mut self) {
        self.piece = self.table.pieces[self.piece.0].prev;
        self.off = 0;
    }

    #[must_use]
    pub fn is_valid(&self) -> bool {
        self.piece != BEGIN && self.piece != END
    }
}

/*

====================================
============== TESTS ===============
====================================

*/

#[cfg(test)]
mod piece_table_tests {
    use std::io::Write;

    use super::PieceTable;

    fn pt_from_str(s: &str) -> PieceTable {
        let mut temp_file = tempfile::NamedTempFile::new().expect("could not create temp file");

        write!(temp_file, "{s}").expect("could not write");
        temp_file.as_file().sync_all().expect("could not sync");

        PieceTable::new(Some(
            io::mmap::MmapFile::open(temp_file.path()).expect("could not map"),
        ))
    }

    fn text(pt: &PieceTable) -> String {
        String::from_utf8(pt.bytes_at(0, pt.len()).unwrap()).unwrap()
    }

    #[test]
    fn new_len_matches_original() {
        let pt = pt_from_str("hello");

        assert_eq!(pt.len(), 5);
        assert_eq!(pt.piece_count(), 1);
        assert!(!pt.is_empty());
    }

    #[test]
    fn new_empty_document() {
        let pt = PieceTable::new(None);

        assert_eq!(pt.len(), 0);
        assert!(pt.is_empty());
        assert_eq!(pt.piece_count(), 0);
        assert_eq!(text(&pt), "");
    }

    #[test]
    fn insert_middle_splits_piece() {
        let mut pt = pt_from_str("helo");

        pt.insert(3, b"l").unwrap();
        assert_eq!(text(&pt), "hello");
        assert_eq!(pt.piece_count(), 3);
    }

    #[test]
    fn insert_start_end() {
        let mut pt = pt_from_str("world");

        pt.insert(0, b"hello ").unwrap();
        pt.insert(pt.len(), b"!").unwrap();
        assert_eq!(text(&pt), "hello world!");
    }

    #[test]
    fn insert_past_end_is_rejected() {
        let mut pt = pt_from_str("abc");

        assert!(pt.insert(4, b"x").is_err());
        assert_eq!(text(&pt), "abc");
    }

    #[test]
    fn empty_insert_and_delete_are_noops() {
        let mut pt = pt_from_str("abc");

        pt.insert(1, b"").unwrap();
        pt.delete(1, 0).unwrap();
        assert_eq!(text(&pt), "abc");
        assert_eq!(pt.undo_depth(), 0);
    }

    #[test]
    fn sequential_inserts_coalesce_into_one_piece() {
        let mut pt = PieceTable::new(None);

        pt.insert(0, b"hello").unwrap();
        pt.insert(5, b" world").unwrap();
        assert_eq!(text(&pt), "hello world");
        // The cache absorbed the second insert: one piece, one action.
        assert_eq!(pt.piece_count(), 1);
        assert_eq!(pt.undo_depth(), 1);

        assert!(pt.undo());
        assert_eq!(text(&pt), "");
    }

    #[test]
    fn cache_insert_into_piece_interior() {
        let mut pt = PieceTable::new(None);

        pt.insert(0, b"held").unwrap();
        // Still inside the cached piece: shifts the buffer tail in place.
        pt.insert(3, b"lo wor").unwrap();
        assert_eq!(text(&pt), "hello word");
        assert_eq!(pt.piece_count(), 1);
        assert_eq!(pt.undo_depth(), 1);
    }

    #[test]
    fn cache_delete_shrinks_piece_in_place() {
        let mut pt = PieceTable::new(None);

        pt.insert(0, b"abcd").unwrap();
        pt.delete(3, 1).unwrap();
        pt.delete(2, 1).unwrap();
        assert_eq!(text(&pt), "ab");
        assert_eq!(pt.piece_count(), 1);
        assert_eq!(pt.undo_depth(), 1);

        assert!(pt.undo());
        assert_eq!(text(&pt), "");
    }

    #[test]
    fn snapshot_disables_cache() {
        let mut pt = PieceTable::new(None);

        pt.insert(0, b"abc").unwrap();
        pt.snapshot();
        pt.insert(3, b"def").unwrap();
        assert_eq!(text(&pt), "abcdef");
        assert_eq!(pt.undo_depth(), 2);

        assert!(pt.undo());
        assert_eq!(text(&pt), "abc");
        assert!(pt.undo());
        assert_eq!(text(&pt), "");
        assert!(!pt.undo());
    }

    #[test]
    fn snapshot_is_idempotent() {
        let mut pt = PieceTable::new(None);

        pt.insert(0, b"abc").unwrap();
        pt.snapshot();
        pt.snapshot();
        pt.insert(3, b"d").unwrap();
        assert_eq!(pt.undo_depth(), 2);
    }

    #[test]
    fn delete_middle() {
        let mut pt = pt_from_str("hello cruel world");

        pt.delete(5, 6).unwrap();
        assert_eq!(text(&pt), "hello world");
    }

    #[test]
    fn delete_across_piece_boundaries() {
        let mut pt = pt_from_str("abc");

        pt.snapshot();
        pt.insert(3, b"def").unwrap();
        pt.snapshot();
        pt.insert(6, b"ghi").unwrap();
        pt.snapshot();
        assert_eq!(pt.piece_count(), 3);

        // Removes the tail of the first piece, all of the second and the
        // head of the third.
        pt.delete(1, 7).unwrap();
        assert_eq!(text(&pt), "ai");

        assert!(pt.undo());
        assert_eq!(text(&pt), "abcdefghi");
        assert!(pt.redo());
        assert_eq!(text(&pt), "ai");
    }

    #[test]
    fn delete_whole_document() {
        let mut pt = pt_from_str("abcdef");

        pt.delete(0, 6).unwrap();
        assert_eq!(text(&pt), "");
        assert_eq!(pt.piece_count(), 0);

        assert!(pt.undo());
        assert_eq!(text(&pt), "abcdef");
    }

    #[test]
    fn delete_past_end_is_rejected() {
        let mut pt = pt_from_str("abc");

        assert!(pt.delete(2, 2).is_err());
        assert!(pt.delete(4, 1).is_err());
        assert_eq!(text(&pt), "abc");
    }

    #[test]
    fn undo_redo_insert() {
        let mut pt = pt_from_str("abc");

        pt.insert(1, b"X").unwrap();
        assert!(pt.undo());
        assert_eq!(text(&pt), "abc");
        assert!(pt.redo());
        assert_eq!(text(&pt), "aXbc");
    }

    #[test]
    fn undo_redo_delete() {
        let mut pt = pt_from_str("abcdef");

        pt.delete(2, 2).unwrap();
        assert_eq!(text(&pt), "abef");
        assert!(pt.undo());
        assert_eq!(text(&pt), "abcdef");
        assert!(pt.redo());
        assert_eq!(text(&pt), "abef");
    }

    #[test]
    fn undo_redo_round_trip_over_multiple_actions() {
        let mut pt = PieceTable::new(None);

        pt.insert(0, b"Hello").unwrap();
        pt.snapshot();
        pt.insert(5, b"World").unwrap();
        assert_eq!(text(&pt), "HelloWorld");

        assert!(pt.undo());
        assert_eq!(text(&pt), "Hello");
        assert!(pt.undo());
        assert_eq!(text(&pt), "");
        assert!(!pt.undo());

        assert!(pt.redo());
        assert_eq!(text(&pt), "Hello");
        assert!(pt.redo());
        assert_eq!(text(&pt), "HelloWorld");
        assert!(!pt.redo());
    }

    #[test]
    fn grouped_changes_undo_as_one_action() {
        let mut pt = pt_from_str("abcdef");

        pt.snapshot();
        pt.delete(1, 4).unwrap();
        pt.insert(1, b"XY").unwrap();
        assert_eq!(text(&pt), "aXYf");
        assert_eq!(pt.undo_depth(), 1);

        assert!(pt.undo());
        assert_eq!(text(&pt), "abcdef");
        assert!(pt.redo());
        assert_eq!(text(&pt), "aXYf");
    }

    #[test]
    fn new_edit_discards_redo_history() {
        let mut pt = PieceTable::new(None);

        pt.insert(0, b"one").unwrap();
        pt.snapshot();
        pt.insert(3, b" two").unwrap();
        assert!(pt.undo());
        assert_eq!(pt.redo_depth(), 1);

        pt.insert(3, b" three").unwrap();
        assert_eq!(pt.redo_depth(), 0);
        assert!(!pt.redo());
        assert_eq!(text(&pt), "one three");
    }

    #[test]
    fn delete_then_insert_round_trip() {
        let mut pt = pt_from_str("abcdef");

        pt.insert(3, b"XYZ").unwrap();
        pt.delete(3, 3).unwrap();
        assert_eq!(text(&pt), "abcdef");
    }

    #[test]
    fn insert_composition() {
        let mut split = PieceTable::new(None);
        split.insert(0, b"ab").unwrap();
        split.insert(2, b"cd").unwrap();

        let mut whole = PieceTable::new(None);
        whole.insert(0, b"abcd").unwrap();

        assert_eq!(text(&split), text(&whole));
    }

    #[test]
    fn size_matches_active_piece_lengths() {
        let mut pt = pt_from_str("abcdef");

        pt.insert(2, b"XY").unwrap();
        pt.delete(5, 2).unwrap();
        pt.snapshot();
        pt.insert(0, b"Z").unwrap();

        let mut total = 0;
        pt.iterate(0, |_, bytes| {
            total += bytes.len();
            true
        })
        .unwrap();
        assert_eq!(total, pt.len());
    }

    #[test]
    fn iterate_from_position() {
        let mut pt = pt_from_str("hello world");

        pt.insert(5, b" cruel").unwrap();

        let mut collected = Vec::new();
        pt.iterate(6, |_, bytes| {
            collected.extend_from_slice(bytes);
            true
        })
        .unwrap();
        assert_eq!(collected, b"cruel world");
    }

    #[test]
    fn iterate_positions_are_absolute() {
        let mut pt = pt_from_str("abc");

        pt.snapshot();
        pt.insert(3, b"def").unwrap();

        let mut positions = Vec::new();
        pt.iterate(0, |pos, _| {
            positions.push(pos);
            true
        })
        .unwrap();
        assert_eq!(positions, vec![0, 3]);
    }

    #[test]
    fn iterate_stops_when_callback_declines() {
        let mut pt = pt_from_str("abc");

        pt.snapshot();
        pt.insert(3, b"def").unwrap();

        let mut chunks = 0;
        pt.iterate(0, |_, _| {
            chunks += 1;
            false
        })
        .unwrap();
        assert_eq!(chunks, 1);
    }

    #[test]
    fn cursor_walks_pieces_both_ways() {
        let mut pt = pt_from_str("abc");

        pt.snapshot();
        pt.insert(3, b"def").unwrap();

        let mut cursor = pt.cursor(0).unwrap();
        assert!(cursor.is_valid());
        assert_eq!(cursor.bytes(), b"abc");

        cursor.next();
        assert!(cursor.is_valid());
        assert_eq!(cursor.bytes(), b"def");

        cursor.next();
        assert!(!cursor.is_valid());

        cursor.prev();
        cursor.prev();
        assert!(cursor.is_valid());
        assert_eq!(cursor.bytes(), b"abc");

        cursor.prev();
        assert!(!cursor.is_valid());
    }

    #[test]
    fn cursor_starts_mid_piece() {
        let pt = pt_from_str("hello world");

        let cursor = pt.cursor(6).unwrap();
        assert_eq!(cursor.bytes(), b"world");
        assert!(pt.cursor(12).is_err());
    }

    #[test]
    fn bytes_at_spans_pieces() {
        let mut pt = pt_from_str("Hello world");

        pt.insert(6, b"beautiful ").unwrap();
        pt.insert(pt.len(), b"!").unwrap();

        assert_eq!(text(&pt), "Hello beautiful world!");
        assert_eq!(pt.bytes_at(6, 9).unwrap(), b"beautiful");
        assert!(pt.bytes_at(20, 5).is_err());
    }

    #[test]
    fn action_ids_survive_history_divergence() {
        let mut pt = PieceTable::new(None);

        pt.insert(0, b"a").unwrap();
        pt.snapshot();
        let first = pt.top_action_id();

        assert!(pt.undo());
        pt.insert(0, b"b").unwrap();

        // Same undo depth as before, different action.
        assert_eq!(pt.undo_depth(), 1);
        assert_ne!(pt.top_action_id(), first);
    }
}
