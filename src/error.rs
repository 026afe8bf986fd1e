//! Error type shared by the heap and its growers.
//!
//! The allocation entry points keep the null-or-pointer convention of a C
//! allocator; a [`HeapError`] is what the internals propagate until that
//! boundary, where it gets logged and turned into a null pointer.

use std::{fmt, io};

#[derive(Debug)]
pub enum HeapError {
  /// The grower cannot move its break forward by `requested` bytes.
  Exhausted { requested: usize },

  /// Reserving the backing region for an arena failed.
  Reserve(io::Error),

  /// The grower handed back memory that does not continue the heap.
  Discontiguous { expected: usize, found: usize },

  /// A size computation does not fit in `usize`.
  Overflow,

  /// A heap invariant does not hold at the given header.
  Corrupt { header: usize, reason: &'static str },
}

impl fmt::Display for HeapError {
  fn fmt(
    &self,
    f: &mut fmt::Formatter<'_>,
  ) -> fmt::Result {
    match self {
      HeapError::Exhausted { requested } => {
        write!(f, "cannot extend the heap by {} bytes", requested)
      }
      HeapError::Reserve(err) => write!(f, "cannot reserve arena: {}", err),
      HeapError::Discontiguous { expected, found } => write!(
        f,
        "heap extension at {:#x} does not continue the heap ending at {:#x}",
        found, expected
      ),
      HeapError::Overflow => write!(f, "requested size overflows usize"),
      HeapError::Corrupt { header, reason } => {
        write!(f, "corrupt block at {:#x}: {}", header, reason)
      }
    }
  }
}

impl std::error::Error for HeapError {
  fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
    match self {
      HeapError::Reserve(err) => Some(err),
      _ => None,
    }
  }
}

impl From<io::Error> for HeapError {
  fn from(err: io::Error) -> Self {
    HeapError::Reserve(err)
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn display_messages() {
    let err = HeapError::Discontiguous {
      expected: 0x1000,
      found: 0x2000,
    };
    assert_eq!(
      err.to_string(),
      "heap extension at 0x2000 does not continue the heap ending at 0x1000"
    );
    assert_eq!(
      HeapError::Exhausted { requested: 64 }.to_string(),
      "cannot extend the heap by 64 bytes"
    );
  }

  #[test]
  fn reserve_keeps_its_source() {
    use std::error::Error;

    let err = HeapError::from(io::Error::from(io::ErrorKind::OutOfMemory));
    assert!(err.source().is_some());
    assert!(HeapError::Overflow.source().is_none());
  }
}
