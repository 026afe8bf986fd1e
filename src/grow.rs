//! Heap-extension primitives.
//!
//! A [`HeapGrower`] is the only source of raw memory for a [`Heap`]: it moves
//! a break forward and reports where the break was before the move.
//!
//! [`Heap`]: crate::Heap

use std::{io, ptr};

use libc::{c_void, intptr_t, sbrk};

use crate::HeapError;

/// Moves a high-water mark forward on request.
///
/// # Safety
///
/// Implementors must hand out writable memory, and successive successful
/// calls to [`extend`](HeapGrower::extend) must return monotonically
/// increasing, non-overlapping ranges that stay valid while the grower lives.
pub unsafe trait HeapGrower {
  /// Moves the break forward by `increment` bytes and returns the previous
  /// break.
  ///
  /// # Safety
  ///
  /// The returned range must only be used by the caller that requested it.
  unsafe fn extend(
    &mut self,
    increment: usize,
  ) -> Result<*mut u8, HeapError>;

  /// Current break, without moving it.
  fn current_break(&self) -> *mut u8;
}

/// The process data segment, grown with `sbrk(2)`.
///
/// The program break is process-wide. Anything else moving it (another
/// `ProgramBreak` heap, or the system allocator) makes the next extension
/// discontiguous, which the heap detects and refuses.
#[derive(Debug, Default)]
pub struct ProgramBreak;

impl ProgramBreak {
  pub fn new() -> Self {
    Self
  }
}

unsafe impl HeapGrower for ProgramBreak {
  unsafe fn extend(
    &mut self,
    increment: usize,
  ) -> Result<*mut u8, HeapError> {
    let delta = intptr_t::try_from(increment).map_err(|_| HeapError::Overflow)?;

    let address = unsafe { sbrk(delta) };

    if address == usize::MAX as *mut c_void {
      return Err(HeapError::Exhausted {
        requested: increment,
      });
    }

    log::debug!(
      "sbrk({}) -> {:?}, program break = {:?}",
      increment,
      address,
      self.current_break()
    );

    Ok(address.cast())
  }

  fn current_break(&self) -> *mut u8 {
    unsafe { sbrk(0) }.cast()
  }
}

/// A private region reserved up front with `mmap(2)`, with its own break.
///
/// Each arena is independent of the program break and of every other arena,
/// so any number of heaps can live side by side. The region is unmapped when
/// the arena is dropped.
#[derive(Debug)]
pub struct Arena {
  base: *mut u8,
  brk: usize,
  capacity: usize,
}

impl Arena {
  /// Reserves `capacity` bytes of zeroed, private memory.
  pub fn with_capacity(capacity: usize) -> Result<Self, HeapError> {
    if capacity == 0 {
      return Err(HeapError::Exhausted { requested: 0 });
    }

    let base = unsafe {
      libc::mmap(
        ptr::null_mut(),
        capacity,
        libc::PROT_READ | libc::PROT_WRITE,
        libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
        -1,
        0,
      )
    };

    if base == libc::MAP_FAILED {
      return Err(io::Error::last_os_error().into());
    }

    log::debug!("reserved arena of {} bytes at {:?}", capacity, base);

    Ok(Self {
      base: base.cast(),
      brk: 0,
      capacity,
    })
  }

  pub fn capacity(&self) -> usize {
    self.capacity
  }

  /// Bytes left between the break and the end of the region.
  pub fn remaining(&self) -> usize {
    self.capacity - self.brk
  }
}

unsafe impl HeapGrower for Arena {
  unsafe fn extend(
    &mut self,
    increment: usize,
  ) -> Result<*mut u8, HeapError> {
    if increment > self.remaining() {
      return Err(HeapError::Exhausted {
        requested: increment,
      });
    }

    let previous = self.current_break();
    self.brk += increment;

    log::debug!(
      "arena extend({}) -> {:?}, {} bytes left",
      increment,
      previous,
      self.remaining()
    );

    Ok(previous)
  }

  fn current_break(&self) -> *mut u8 {
    self.base.wrapping_add(self.brk)
  }
}

impl Drop for Arena {
  fn drop(&mut self) {
    let rc = unsafe { libc::munmap(self.base.cast(), self.capacity) };
    if rc != 0 {
      log::warn!(
        "munmap of arena at {:?} failed: {}",
        self.base,
        io::Error::last_os_error()
      );
    }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn arena_returns_previous_break() {
    let mut arena = Arena::with_capacity(4096).unwrap();
    let start = arena.current_break();

    unsafe {
      let first = arena.extend(32).unwrap();
      let second = arena.extend(64).unwrap();

      assert_eq!(first, start);
      assert_eq!(second, start.add(32));
      assert_eq!(arena.current_break(), start.add(96));

      // Freshly mapped memory is writable.
      ptr::write_bytes(second, 0xAB, 64);
      assert_eq!(*second.add(63), 0xAB);
    }

    assert_eq!(arena.remaining(), 4096 - 96);
  }

  #[test]
  fn arena_refuses_to_grow_past_capacity() {
    let mut arena = Arena::with_capacity(128).unwrap();

    unsafe {
      arena.extend(100).unwrap();

      let err = arena.extend(29).unwrap_err();
      assert!(matches!(err, HeapError::Exhausted { requested: 29 }));

      // A failed extension leaves the break where it was.
      assert_eq!(arena.remaining(), 28);
      assert!(arena.extend(28).is_ok());
    }
  }

  #[test]
  fn zero_sized_arena_is_rejected() {
    assert!(Arena::with_capacity(0).is_err());
  }

  #[test]
  fn arenas_do_not_overlap() {
    let mut a = Arena::with_capacity(4096).unwrap();
    let mut b = Arena::with_capacity(4096).unwrap();

    let (a_start, b_start) = unsafe { (a.extend(4096).unwrap(), b.extend(4096).unwrap()) };
    let (a_start, b_start) = (a_start as usize, b_start as usize);

    assert!(a_start + 4096 <= b_start || b_start + 4096 <= a_start);
  }

  #[test]
  fn program_break_query_does_not_move_it() {
    let grower = ProgramBreak::new();

    assert!(!grower.current_break().is_null());
    assert_ne!(grower.current_break(), usize::MAX as *mut u8);
  }
}
