//! Host-side view into guest linear memory.
//!
//! The boundary only carries numbers, so variable-length data crosses it as
//! a [`ByteRange`] that is rebuilt from the raw `(ptr, len)` arguments on
//! every host call.  Ranges must never be cached: the guest may reuse the
//! region, and growth can move the backing buffer.

use std::borrow::Cow;

use wasmtime::{AsContext, AsContextMut, Memory, StoreContext};

use crate::abi::WASM_PAGE_SIZE;
use crate::error::{BridgeError, Result};

/// A transient `(offset, length)` span inside linear memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByteRange {
    /// Start offset in bytes.
    pub offset: u64,
    /// Length in bytes.
    pub len: u64,
}

impl ByteRange {
    /// Create a range from host-side values.
    pub fn new(offset: u64, len: u64) -> Self {
        Self { offset, len }
    }

    /// Reinterpret raw wasm32 arguments.
    ///
    /// Guest pointers and lengths are unsigned 32-bit values that arrive as
    /// `i32` on the host side.
    pub fn from_raw(ptr: i32, len: i32) -> Self {
        Self {
            offset: u64::from(ptr as u32),
            len: u64::from(len as u32),
        }
    }

    /// Returns `true` for a zero-length range.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Slice `data` by this range, or fail with [`BridgeError::OutOfBounds`].
    pub fn slice<'a>(&self, data: &'a [u8]) -> Result<&'a [u8]> {
        let size = data.len() as u64;
        let out_of_bounds = || BridgeError::OutOfBounds {
            offset: self.offset,
            len: self.len,
            size,
        };
        let end = self.offset.checked_add(self.len).ok_or_else(out_of_bounds)?;
        if end > size {
            return Err(out_of_bounds());
        }
        Ok(&data[self.offset as usize..end as usize])
    }
}

/// Decode bytes as UTF-8, substituting invalid sequences.
pub fn decode_text(bytes: &[u8]) -> Cow<'_, str> {
    String::from_utf8_lossy(bytes)
}

/// Bounded read and growth access to one linear memory.
///
/// The view is a thin copyable wrapper around the live [`Memory`] handle; it
/// never snapshots the buffer.
#[derive(Debug, Clone, Copy)]
pub struct MemoryView {
    memory: Memory,
}

impl MemoryView {
    /// Wrap a live memory handle.
    pub fn new(memory: Memory) -> Self {
        Self { memory }
    }

    /// The underlying wasmtime handle.
    pub fn memory(&self) -> Memory {
        self.memory
    }

    /// Current size in bytes.
    pub fn size_bytes(&self, store: impl AsContext) -> u64 {
        self.memory.data_size(&store) as u64
    }

    /// Current size in pages.
    pub fn page_count(&self, store: impl AsContext) -> u64 {
        self.memory.size(&store)
    }

    /// Borrow the bytes named by `range`.
    pub fn read_bytes<'a, T: 'a>(
        &self,
        store: impl Into<StoreContext<'a, T>>,
        range: ByteRange,
    ) -> Result<&'a [u8]> {
        range.slice(self.memory.data(store))
    }

    /// Decode the bytes named by `range` as (lossy) UTF-8 text.
    pub fn read_text<'a, T: 'a>(
        &self,
        store: impl Into<StoreContext<'a, T>>,
        range: ByteRange,
    ) -> Result<String> {
        self.read_bytes(store, range)
            .map(|bytes| decode_text(bytes).into_owned())
    }

    /// Grow memory by `pages`, returning the page count before growth.
    ///
    /// Failure (store limit or platform allocation) leaves the memory
    /// untouched and is reported as [`BridgeError::MemoryGrowth`].
    pub fn grow(&self, mut store: impl AsContextMut, pages: u64) -> Result<u64> {
        let current = self.memory.size(&store);
        let previous = self
            .memory
            .grow(&mut store, pages)
            .map_err(|e| BridgeError::MemoryGrowth {
                requested: pages,
                current,
                reason: e.to_string(),
            })?;
        debug_assert_eq!(self.memory.data_size(&store) as u64 % WASM_PAGE_SIZE, 0);
        tracing::debug!(previous, pages, "grew guest memory");
        Ok(previous)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wasmtime::{Engine, MemoryType, Store};

    fn store_with_memory(pages: u32, max: Option<u32>) -> (Store<()>, MemoryView) {
        let engine = Engine::default();
        let mut store = Store::new(&engine, ());
        let memory = Memory::new(&mut store, MemoryType::new(pages, max))
            .expect("memory creation must succeed in tests");
        (store, MemoryView::new(memory))
    }

    #[test]
    fn from_raw_treats_arguments_as_unsigned() {
        let range = ByteRange::from_raw(-1, 4);
        assert_eq!(range.offset, u64::from(u32::MAX));
        assert_eq!(range.len, 4);
    }

    #[test]
    fn slice_within_bounds() {
        let data = b"hello world";
        let range = ByteRange::new(6, 5);
        assert_eq!(range.slice(data).unwrap(), b"world");
    }

    #[test]
    fn slice_touching_end_is_allowed() {
        let data = [1u8, 2, 3];
        assert_eq!(ByteRange::new(3, 0).slice(&data).unwrap(), &[] as &[u8]);
        assert_eq!(ByteRange::new(0, 3).slice(&data).unwrap(), &[1, 2, 3]);
    }

    #[test]
    fn slice_past_end_fails() {
        let data = [0u8; 8];
        match ByteRange::new(6, 3).slice(&data) {
            Err(BridgeError::OutOfBounds { offset, len, size }) => {
                assert_eq!((offset, len, size), (6, 3, 8));
            }
            other => panic!("expected OutOfBounds, got: {other:?}"),
        }
    }

    #[test]
    fn slice_with_overflowing_end_fails() {
        let data = [0u8; 8];
        let range = ByteRange::new(u64::MAX, 2);
        assert!(matches!(
            range.slice(&data),
            Err(BridgeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn decode_text_substitutes_invalid_utf8() {
        let text = decode_text(&[b'o', b'k', 0xFF, b'!']);
        assert_eq!(text, "ok\u{FFFD}!");
    }

    #[test]
    fn written_text_reads_back_identically() {
        let (mut store, view) = store_with_memory(1, None);
        let text = "héllo, wörld ✓";
        let offset = 1024;
        view.memory()
            .write(&mut store, offset, text.as_bytes())
            .unwrap();

        let range = ByteRange::new(offset as u64, text.len() as u64);
        assert_eq!(view.read_text(&store, range).unwrap(), text);
    }

    #[test]
    fn read_past_memory_end_fails() {
        let (store, view) = store_with_memory(1, None);
        let range = ByteRange::new(WASM_PAGE_SIZE - 2, 4);
        assert!(matches!(
            view.read_bytes(&store, range),
            Err(BridgeError::OutOfBounds { size, .. }) if size == WASM_PAGE_SIZE
        ));
    }

    #[test]
    fn grow_adds_pages() {
        let (mut store, view) = store_with_memory(1, None);
        let before = view.page_count(&store);
        let previous = view.grow(&mut store, 2).unwrap();
        assert_eq!(previous, before);
        assert_eq!(view.page_count(&store), before + 2);
        assert_eq!(view.size_bytes(&store), (before + 2) * WASM_PAGE_SIZE);
    }

    #[test]
    fn grow_by_zero_is_a_noop() {
        let (mut store, view) = store_with_memory(3, None);
        assert_eq!(view.grow(&mut store, 0).unwrap(), 3);
        assert_eq!(view.page_count(&store), 3);
    }

    #[test]
    fn grow_past_maximum_fails_without_shrinking() {
        let (mut store, view) = store_with_memory(1, Some(2));
        match view.grow(&mut store, 5) {
            Err(BridgeError::MemoryGrowth {
                requested, current, ..
            }) => {
                assert_eq!(requested, 5);
                assert_eq!(current, 1);
            }
            other => panic!("expected MemoryGrowth, got: {other:?}"),
        }
        assert_eq!(view.page_count(&store), 1);
    }

    #[test]
    fn newly_grown_region_is_readable() {
        let (mut store, view) = store_with_memory(1, None);
        let range = ByteRange::new(WASM_PAGE_SIZE + 10, 16);
        assert!(view.read_bytes(&store, range).is_err());
        view.grow(&mut store, 1).unwrap();
        assert_eq!(view.read_bytes(&store, range).unwrap(), &[0u8; 16]);
    }
}
