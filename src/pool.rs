// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2025-2026 natyamatsya contributors
//
// Reference-counted shared buffer pool. Generalizes the free-list allocator
// pattern (spin-lock-guarded cursor + next-pointer array) used for cross-
// process chunk storage to a single in-process `Vec` of fixed-size elements.
// Child pointers hold a strong reference into the same per-element refcount
// table as the parent, so `offset/length` views never outlive their backing
// element.

use std::cell::UnsafeCell;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use crate::spin_lock::SpinLock;

struct PoolInner {
    element_size: usize,
    storage: Vec<UnsafeCell<Box<[u8]>>>,
    refcount: Vec<AtomicUsize>,
    free_lock: SpinLock,
    free: UnsafeCell<Vec<usize>>,
}

// SAFETY: element bytes are exposed through `as_slice`/`as_mut_slice` only;
// the pool makes no attempt to serialize concurrent access to one element's
// contents (callers coordinate externally, per the single-writer/single-
// reader handoff this pool is designed for). Bookkeeping (refcount, free
// list) is fully synchronized.
unsafe impl Send for PoolInner {}
unsafe impl Sync for PoolInner {}

/// A fixed-size-element, reference-counted buffer pool.
///
/// `allocate` hands out a zero-initialized element; the element returns to
/// the free list once every `SharedBufferPointer`/`SharedChildPointer`
/// derived from it has been dropped.
#[derive(Clone)]
pub struct SharedBufferPool {
    inner: Arc<PoolInner>,
}

impl SharedBufferPool {
    /// Create a pool of `count` elements, each `element_size` bytes.
    pub fn new(count: usize, element_size: usize) -> Self {
        let storage = (0..count)
            .map(|_| UnsafeCell::new(vec![0u8; element_size].into_boxed_slice()))
            .collect();
        let refcount = (0..count).map(|_| AtomicUsize::new(0)).collect();
        Self {
            inner: Arc::new(PoolInner {
                element_size,
                storage,
                refcount,
                free_lock: SpinLock::new(),
                free: UnsafeCell::new((0..count).rev().collect()),
            }),
        }
    }

    /// Size in bytes of every element in this pool.
    pub fn element_size(&self) -> usize {
        self.inner.element_size
    }

    /// Total number of elements (free + in-use).
    pub fn capacity(&self) -> usize {
        self.inner.storage.len()
    }

    /// Number of elements currently free.
    pub fn num_free(&self) -> usize {
        self.inner.free_lock.lock();
        let n = unsafe { (*self.inner.free.get()).len() };
        self.inner.free_lock.unlock();
        n
    }

    /// Acquire a zero-initialized element, or `None` if the pool is empty.
    pub fn allocate(&self) -> Option<SharedBufferPointer> {
        let index = self.inner.pop_free()?;
        // SAFETY: index was just removed from the free list, so it cannot be
        // concurrently handed out again; refcount is 0 until we set it below.
        let slice = unsafe { &mut *self.inner.storage[index].get() };
        slice.fill(0);
        self.inner.refcount[index].store(1, Ordering::Release);
        Some(SharedBufferPointer {
            pool: self.inner.clone(),
            index,
        })
    }
}

impl PoolInner {
    fn pop_free(&self) -> Option<usize> {
        self.free_lock.lock();
        let popped = unsafe { (*self.free.get()).pop() };
        self.free_lock.unlock();
        popped
    }

    fn push_free(&self, index: usize) {
        self.free_lock.lock();
        unsafe { (*self.free.get()).push(index) };
        self.free_lock.unlock();
    }

    fn retain(&self, index: usize) {
        self.refcount[index].fetch_add(1, Ordering::Relaxed);
    }

    fn release(&self, index: usize) {
        if self.refcount[index].fetch_sub(1, Ordering::AcqRel) == 1 {
            self.push_free(index);
        }
    }
}

/// Owning handle to a pool element. Cloning shares the same element and
/// increments its reference count; the element returns to its pool when the
/// last clone (and every derived child pointer) is dropped.
pub struct SharedBufferPointer {
    pool: Arc<PoolInner>,
    index: usize,
}

impl SharedBufferPointer {
    /// Read-only view of the whole element.
    pub fn as_slice(&self) -> &[u8] {
        unsafe { &*self.pool.storage[self.index].get() }
    }

    /// Mutable view of the whole element.
    ///
    /// The pool does not itself serialize writers; this mirrors the
    /// single-producer/single-consumer handoff the pool is designed for.
    #[allow(clippy::mut_from_ref)]
    pub fn as_mut_slice(&self) -> &mut [u8] {
        unsafe { &mut *self.pool.storage[self.index].get() }
    }

    pub fn len(&self) -> usize {
        self.pool.element_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Create a child pointer over `[offset, offset + length)` of this
    /// element, tagged with `tag` for the caller's own bookkeeping. Returns
    /// `None` if the requested range does not fit.
    pub fn get_child(&self, tag: u32, offset: usize, length: usize) -> Option<SharedChildPointer> {
        if offset.checked_add(length)? > self.pool.element_size {
            return None;
        }
        self.pool.retain(self.index);
        Some(SharedChildPointer {
            pool: self.pool.clone(),
            index: self.index,
            offset,
            length,
            tag,
        })
    }

    /// Downgrade to a read-only, clonable handle for fan-out distribution.
    pub fn into_const(self) -> ConstSharedBufferPointer {
        let c = ConstSharedBufferPointer {
            pool: self.pool.clone(),
            index: self.index,
        };
        std::mem::forget(self); // ownership (and the retained refcount) moves into `c`
        c
    }
}

impl Clone for SharedBufferPointer {
    fn clone(&self) -> Self {
        self.pool.retain(self.index);
        Self {
            pool: self.pool.clone(),
            index: self.index,
        }
    }
}

impl Drop for SharedBufferPointer {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl fmt::Debug for SharedBufferPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedBufferPointer")
            .field("index", &self.index)
            .field("len", &self.len())
            .finish()
    }
}

/// Read-only, `Clone`-able handle to a pool element, used once a buffer is
/// ready to be fanned out to multiple readers (dispatcher listeners, bus
/// channels).
#[derive(Clone)]
pub struct ConstSharedBufferPointer {
    pool: Arc<PoolInner>,
    index: usize,
}

impl ConstSharedBufferPointer {
    pub fn as_slice(&self) -> &[u8] {
        unsafe { &*self.pool.storage[self.index].get() }
    }

    pub fn len(&self) -> usize {
        self.pool.element_size
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for ConstSharedBufferPointer {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl fmt::Debug for ConstSharedBufferPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConstSharedBufferPointer")
            .field("index", &self.index)
            .field("len", &self.len())
            .finish()
    }
}

/// A sub-slice view `[offset, offset+length)` into a parent pool element.
/// Holds a strong reference to the parent: the parent cannot return to the
/// pool while any child (or grandchild) is alive.
pub struct SharedChildPointer {
    pool: Arc<PoolInner>,
    index: usize,
    offset: usize,
    length: usize,
    tag: u32,
}

impl SharedChildPointer {
    pub fn as_slice(&self) -> &[u8] {
        let parent = unsafe { &*self.pool.storage[self.index].get() };
        &parent[self.offset..self.offset + self.length]
    }

    #[allow(clippy::mut_from_ref)]
    pub fn as_mut_slice(&self) -> &mut [u8] {
        let parent = unsafe { &mut *self.pool.storage[self.index].get() };
        &mut parent[self.offset..self.offset + self.length]
    }

    pub fn len(&self) -> usize {
        self.length
    }

    pub fn is_empty(&self) -> bool {
        self.length == 0
    }

    pub fn tag(&self) -> u32 {
        self.tag
    }

    /// Children of children share the root parent: deriving a further child
    /// offsets relative to this child's own window.
    pub fn get_child(&self, tag: u32, offset: usize, length: usize) -> Option<SharedChildPointer> {
        if offset.checked_add(length)? > self.length {
            return None;
        }
        self.pool.retain(self.index);
        Some(SharedChildPointer {
            pool: self.pool.clone(),
            index: self.index,
            offset: self.offset + offset,
            length,
            tag,
        })
    }
}

impl Clone for SharedChildPointer {
    fn clone(&self) -> Self {
        self.pool.retain(self.index);
        Self {
            pool: self.pool.clone(),
            index: self.index,
            offset: self.offset,
            length: self.length,
            tag: self.tag,
        }
    }
}

impl Drop for SharedChildPointer {
    fn drop(&mut self) {
        self.pool.release(self.index);
    }
}

impl PartialEq for SharedChildPointer {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.pool, &other.pool)
            && self.index == other.index
            && self.offset == other.offset
            && self.length == other.length
            && self.tag == other.tag
    }
}

impl fmt::Debug for SharedChildPointer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedChildPointer")
            .field("index", &self.index)
            .field("offset", &self.offset)
            .field("length", &self.length)
            .field("tag", &self.tag)
            .finish()
    }
}
