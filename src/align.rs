/// Rounds `value` up to the next multiple of the machine word.
///
/// Every block size handed to the heap goes through this macro, which keeps
/// each header on a word boundary no matter how requests are mixed.
///
/// # Examples
///
/// ```rust
/// use fitalloc::align;
///
/// match std::mem::size_of::<usize>() {
///     8 => assert_eq!(align!(13), 16), // 64 bit machine.
///     4 => assert_eq!(align!(11), 12), // 32 bit machine.
///     _ => {},
/// };
/// ```
#[macro_export]
macro_rules! align {
  ($value:expr) => {
    ($value + ::core::mem::size_of::<usize>() - 1) & !(::core::mem::size_of::<usize>() - 1)
  };
}

/// Checked variant of [`align!`]: `None` when rounding would overflow `usize`.
pub fn checked_align(value: usize) -> Option<usize> {
  let word = core::mem::size_of::<usize>();
  value.checked_add(word - 1).map(|v| v & !(word - 1))
}

#[cfg(test)]
mod tests {
  use std::mem;

  use super::checked_align;

  #[test]
  fn test_align() {
    let ptr_size = mem::size_of::<usize>();

    let mut alignments = Vec::new();

    for i in 0..10 {
      let sizes = (ptr_size * i + 1)..=(ptr_size * (i + 1));

      let expected_alignment = ptr_size * (i + 1);

      alignments.push((sizes, expected_alignment));
    }

    for (sizes, expected) in alignments {
      for size in sizes {
        assert_eq!(expected, align!(size));
        assert_eq!(Some(expected), checked_align(size));
      }
    }
  }

  #[test]
  fn test_checked_align_overflow() {
    assert_eq!(checked_align(0), Some(0));
    assert_eq!(checked_align(usize::MAX), None);
    assert_eq!(checked_align(usize::MAX - mem::size_of::<usize>() + 2), None);
  }
}
