use std::ptr;

use crate::{
  HeapError,
  align::checked_align,
  block::{HEADER_SIZE, Header},
  grow::HeapGrower,
};

/// A first-fit free-list allocator over a single forward-growing region.
///
/// The region starts with a zero-sized sentinel block. Every block after it
/// is a [`Header`] followed by its payload, chained in address order through
/// `next`. Free blocks are additionally threaded through `next_free`, which
/// forms the free registry searched by [`allocate`](Heap::allocate).
///
/// A `Heap` holds raw pointers into its region and is neither `Send` nor
/// `Sync`. Wrap it in a lock to share it between threads.
pub struct Heap<G: HeapGrower> {
  pub(crate) grower: G,
  /// Sentinel header at the base of the region.
  pub(crate) base: *mut Header,
  /// Last block of the address-ordered chain.
  pub(crate) tail: *mut Header,
  /// First entry of the free registry.
  pub(crate) free_head: *mut Header,
  /// High-water mark: one past the last byte of the tail block.
  pub(crate) end: *mut u8,
}

impl<G: HeapGrower> Heap<G> {
  /// Takes ownership of `grower` and places the sentinel block at its break.
  pub fn new(mut grower: G) -> Result<Self, HeapError> {
    let address = unsafe { grower.extend(HEADER_SIZE)? };

    let sentinel = address.cast::<Header>();
    unsafe { sentinel.write(Header::new(0, true)) };

    log::debug!("heap created, sentinel at {:?}", sentinel);

    Ok(Self {
      grower,
      base: sentinel,
      tail: sentinel,
      free_head: ptr::null_mut(),
      end: address.wrapping_add(HEADER_SIZE),
    })
  }

  /// Address of the sentinel header, where the heap begins.
  pub fn base(&self) -> *const u8 {
    self.base.cast()
  }

  /// Bytes between the base and the high-water mark, headers included.
  pub fn heap_size(&self) -> usize {
    self.end as usize - self.base as usize
  }

  /// The grower this heap extends itself with.
  pub fn grower(&self) -> &G {
    &self.grower
  }

  /// Returns a pointer to at least `size` bytes, or null.
  ///
  /// A zero `size` yields null. So does a request the grower cannot satisfy;
  /// the heap is left unchanged in that case.
  pub fn allocate(
    &mut self,
    size: usize,
  ) -> *mut u8 {
    if size == 0 {
      return ptr::null_mut();
    }

    let result = checked_align(size)
      .ok_or(HeapError::Overflow)
      .and_then(|size| unsafe { self.allocate_aligned(size) });

    match result {
      Ok(payload) => payload,
      Err(err) => {
        log::warn!("allocate({}) failed: {}", size, err);
        ptr::null_mut()
      }
    }
  }

  /// Like [`allocate`](Heap::allocate) for `count * elem_size` bytes, with
  /// the whole block zeroed. Null if the product overflows.
  pub fn allocate_zeroed(
    &mut self,
    count: usize,
    elem_size: usize,
  ) -> *mut u8 {
    let Some(size) = count.checked_mul(elem_size) else {
      log::warn!("allocate_zeroed({}, {}) overflows", count, elem_size);
      return ptr::null_mut();
    };

    let payload = self.allocate(size);

    if !payload.is_null() {
      unsafe {
        let header = Header::from_payload(payload);
        ptr::write_bytes(payload, 0, (*header).size);
      }
    }

    payload
  }

  /// Makes the block behind `payload` available again.
  ///
  /// Null and already-free blocks are ignored, and so is a pointer whose
  /// header is not on this heap's chain. The block is merged with free
  /// neighbours, so no two adjacent blocks are free once this returns.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a pointer returned by this heap.
  pub unsafe fn release(
    &mut self,
    payload: *mut u8,
  ) {
    if payload.is_null() {
      return;
    }

    unsafe {
      let header = Header::from_payload(payload);

      if !(*header).in_use {
        log::trace!("release({:?}): already free", payload);
        return;
      }

      let Some((prev, prev_free)) = self.locate(header) else {
        log::warn!("release({:?}): not a block of this heap", payload);
        return;
      };

      if self.free_head.is_null() {
        (*header).in_use = false;
        (*header).next_free = ptr::null_mut();
        self.free_head = header;
        log::trace!("release({:?}): sole free block", payload);
        return;
      }

      self.coalesce(header, prev, prev_free);
    }
  }

  /// Resizes the block behind `payload` to hold at least `new_size` bytes.
  ///
  /// A null `payload` allocates; a zero `new_size` releases and returns null.
  /// Blocks never shrink: if the current block is large enough it is
  /// returned as is. Otherwise the contents move to a new block and the old
  /// one is released. On failure null is returned and the old block is left
  /// untouched.
  ///
  /// # Safety
  ///
  /// `payload` must be null or a pointer returned by this heap that has not
  /// been released.
  pub unsafe fn resize(
    &mut self,
    payload: *mut u8,
    new_size: usize,
  ) -> *mut u8 {
    if payload.is_null() {
      return self.allocate(new_size);
    }

    if new_size == 0 {
      unsafe { self.release(payload) };
      return ptr::null_mut();
    }

    unsafe {
      let old_size = (*Header::from_payload(payload)).size;

      if old_size >= new_size {
        return payload;
      }

      let moved = self.allocate(new_size);
      if moved.is_null() {
        return ptr::null_mut();
      }

      ptr::copy_nonoverlapping(payload, moved, old_size.min(new_size));
      self.release(payload);

      log::trace!("resize({:?}, {}) moved to {:?}", payload, new_size, moved);

      moved
    }
  }

  unsafe fn allocate_aligned(
    &mut self,
    size: usize,
  ) -> Result<*mut u8, HeapError> {
    unsafe {
      if self.free_head.is_null() {
        return self.append_block(size);
      }

      let mut prev: *mut Header = ptr::null_mut();
      let mut prev_free: *mut Header = ptr::null_mut();
      let mut current = self.free_head;

      while !current.is_null() {
        if (*current).size >= size {
          return Ok(self.take_free(current, prev, size));
        }

        prev_free = prev;
        prev = current;
        current = (*current).next_free;
      }

      if prev.is_null() {
        return Err(HeapError::Corrupt {
          header: self.free_head as usize,
          reason: "free registry walk visited no block",
        });
      }

      self.grow_last_free(prev, prev_free, size)
    }
  }

  /// Hands out the free block `found`, splitting off the surplus when it can
  /// hold a header of its own. `registry_prev` is the registry entry in
  /// front of `found`, or null if `found` is the head.
  unsafe fn take_free(
    &mut self,
    found: *mut Header,
    registry_prev: *mut Header,
    size: usize,
  ) -> *mut u8 {
    unsafe {
      let surplus = (*found).size - size;

      let successor = if surplus > HEADER_SIZE {
        let remainder = Header::payload(found).add(size).cast::<Header>();
        remainder.write(Header {
          size: surplus - HEADER_SIZE,
          in_use: false,
          next: (*found).next,
          next_free: (*found).next_free,
        });

        (*found).next = remainder;
        (*found).size = size;

        if self.tail == found {
          self.tail = remainder;
        }

        log::trace!(
          "split {:?}: {} bytes used, {} bytes left free at {:?}",
          found,
          size,
          surplus - HEADER_SIZE,
          remainder
        );

        remainder
      } else {
        log::trace!("reuse {:?} whole ({} bytes for {})", found, (*found).size, size);
        (*found).next_free
      };

      if registry_prev.is_null() {
        self.free_head = successor;
      } else {
        (*registry_prev).next_free = successor;
      }

      (*found).in_use = true;
      (*found).next_free = ptr::null_mut();

      Header::payload(found)
    }
  }

  /// Nothing in the registry fits. `last` is the final registry entry and
  /// `last_prev` the one before it. When `last` also ends the heap it is
  /// grown in place by the shortfall; otherwise a new block is appended.
  unsafe fn grow_last_free(
    &mut self,
    last: *mut Header,
    last_prev: *mut Header,
    size: usize,
  ) -> Result<*mut u8, HeapError> {
    unsafe {
      if last != self.tail {
        return self.append_block(size);
      }

      let shortfall = size - (*last).size;
      self.extend(shortfall)?;

      log::trace!(
        "grow tail {:?} from {} to {} bytes",
        last,
        (*last).size,
        size
      );

      (*last).size = size;
      (*last).in_use = true;
      (*last).next_free = ptr::null_mut();

      if last_prev.is_null() {
        self.free_head = ptr::null_mut();
      } else {
        (*last_prev).next_free = ptr::null_mut();
      }

      Ok(Header::payload(last))
    }
  }

  /// Extends the heap by a header plus `size` bytes and chains a new used
  /// block at the tail.
  unsafe fn append_block(
    &mut self,
    size: usize,
  ) -> Result<*mut u8, HeapError> {
    let total = HEADER_SIZE.checked_add(size).ok_or(HeapError::Overflow)?;

    unsafe {
      let header = self.extend(total)?.cast::<Header>();
      header.write(Header::new(size, true));

      (*self.tail).next = header;
      self.tail = header;

      log::trace!("append {:?} with {} bytes", header, size);

      Ok(Header::payload(header))
    }
  }

  /// Moves the high-water mark by `increment`, refusing memory that does not
  /// start exactly at the current mark.
  unsafe fn extend(
    &mut self,
    increment: usize,
  ) -> Result<*mut u8, HeapError> {
    let address = unsafe { self.grower.extend(increment)? };

    if address != self.end {
      return Err(HeapError::Discontiguous {
        expected: self.end as usize,
        found: address as usize,
      });
    }

    self.end = address.wrapping_add(increment);
    Ok(address)
  }

  /// Walks the chain up to `target`. Returns its chain predecessor and the
  /// last free block before it, or `None` if `target` is not on the chain.
  unsafe fn locate(
    &self,
    target: *mut Header,
  ) -> Option<(*mut Header, *mut Header)> {
    unsafe {
      let mut prev = self.base;
      let mut prev_free: *mut Header = ptr::null_mut();
      let mut current = (*self.base).next;

      while !current.is_null() {
        if current == target {
          return Some((prev, prev_free));
        }
        if !(*current).in_use {
          prev_free = current;
        }

        prev = current;
        current = (*current).next;
      }

      None
    }
  }

  /// Frees `target` and merges it with whichever chain neighbours are free.
  /// `prev` and `prev_free` come from [`locate`](Heap::locate).
  unsafe fn coalesce(
    &mut self,
    target: *mut Header,
    prev: *mut Header,
    prev_free: *mut Header,
  ) {
    unsafe {
      (*target).in_use = false;

      let survivor = if !(*prev).in_use {
        self.absorb(prev, target);
        log::trace!("merged {:?} into previous block {:?}", target, prev);
        prev
      } else {
        target
      };

      let next = (*survivor).next;
      if !next.is_null() && !(*next).in_use {
        self.unlink_free(next);
        self.absorb(survivor, next);
        log::trace!("merged next block {:?} into {:?}", next, survivor);
      }

      if survivor != target {
        return;
      }

      if prev_free.is_null() {
        (*target).next_free = self.free_head;
        self.free_head = target;
      } else {
        (*target).next_free = (*prev_free).next_free;
        (*prev_free).next_free = target;
      }
    }
  }

  /// Folds `second`, the chain successor of `first`, into `first`.
  unsafe fn absorb(
    &mut self,
    first: *mut Header,
    second: *mut Header,
  ) {
    unsafe {
      (*first).size += HEADER_SIZE + (*second).size;
      (*first).next = (*second).next;
    }

    if self.tail == second {
      self.tail = first;
    }
  }

  /// Removes `block` from the free registry, wherever it sits.
  unsafe fn unlink_free(
    &mut self,
    block: *mut Header,
  ) {
    unsafe {
      if self.free_head == block {
        self.free_head = (*block).next_free;
      } else {
        let mut current = self.free_head;
        while !current.is_null() {
          if (*current).next_free == block {
            (*current).next_free = (*block).next_free;
            break;
          }
          current = (*current).next_free;
        }
      }

      (*block).next_free = ptr::null_mut();
    }
  }
}
