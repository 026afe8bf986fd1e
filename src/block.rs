use std::{fmt, mem, ptr};

use crate::align;

/// Metadata placed immediately before every payload, used or free.
#[repr(C)]
pub struct Header {
  /// Payload bytes, header excluded.
  pub size: usize,
  pub in_use: bool,
  /// Next block in address order, null for the last block.
  pub next: *mut Header,
  /// Next entry of the free registry. Only meaningful while `!in_use`.
  pub next_free: *mut Header,
}

/// Bytes between a header and its payload.
pub const HEADER_SIZE: usize = align!(mem::size_of::<Header>());

impl Header {
  pub fn new(
    size: usize,
    in_use: bool,
  ) -> Self {
    Self {
      size,
      in_use,
      next: ptr::null_mut(),
      next_free: ptr::null_mut(),
    }
  }

  /// Payload address for the header at `header`.
  pub fn payload(header: *mut Header) -> *mut u8 {
    header.cast::<u8>().wrapping_add(HEADER_SIZE)
  }

  /// Header address for a payload pointer handed out by the heap.
  pub fn from_payload(payload: *mut u8) -> *mut Header {
    payload.wrapping_sub(HEADER_SIZE).cast::<Header>()
  }

  /// Address right past this block's payload.
  ///
  /// # Safety
  ///
  /// `header` must point at an initialized header.
  pub unsafe fn end(header: *mut Header) -> *mut u8 {
    unsafe { Self::payload(header).wrapping_add((*header).size) }
  }
}

/// Read-only snapshot of one block, as reported by the heap walkers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
  pub payload: *const u8,
  pub header: *const u8,
  pub size: usize,
  pub in_use: bool,
}

impl BlockInfo {
  /// # Safety
  ///
  /// `header` must point at an initialized header.
  pub(crate) unsafe fn read(header: *const Header) -> Self {
    unsafe {
      Self {
        payload: Header::payload(header.cast_mut()),
        header: header.cast(),
        size: (*header).size,
        in_use: (*header).in_use,
      }
    }
  }
}

impl fmt::Display for BlockInfo {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    write!(
      f,
      "metadata for memory {:?}: ({:?}, size={}, in_use={})",
      self.payload, self.header, self.size, self.in_use as u8
    )
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn header_size_is_word_aligned() {
    assert_eq!(HEADER_SIZE % mem::size_of::<usize>(), 0);
    assert!(HEADER_SIZE >= mem::size_of::<Header>());
  }

  #[test]
  fn payload_and_header_are_a_fixed_offset_apart() {
    let mut header = Header::new(24, true);
    let raw: *mut Header = &mut header;

    let payload = Header::payload(raw);

    assert_eq!(payload as usize - raw as usize, HEADER_SIZE);
    assert_eq!(Header::from_payload(payload), raw);
    assert_eq!(unsafe { Header::end(raw) } as usize, raw as usize + HEADER_SIZE + 24);
  }

  #[test]
  fn block_info_display() {
    let mut header = Header::new(8, false);
    let raw: *mut Header = &mut header;

    let info = unsafe { BlockInfo::read(raw) };
    let line = info.to_string();

    assert_eq!(info.size, 8);
    assert!(!info.in_use);
    assert!(line.starts_with("metadata for memory "));
    assert!(line.ends_with("size=8, in_use=0)"));
  }
}
