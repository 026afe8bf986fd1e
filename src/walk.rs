//! Read-only views of a heap.
//!
//! The same blocks can be reached three ways: by address arithmetic from the
//! base ([`Heap::raw_blocks`]), through the `next` chain ([`Heap::blocks`]),
//! and, for free blocks, through the registry ([`Heap::free_blocks`]).
//! Comparing them is how [`Heap::validate`] and the dumps catch corruption.

use std::{
  collections::HashSet,
  io::{self, Write},
  marker::PhantomData,
};

use crate::{
  Heap, HeapError,
  block::{BlockInfo, Header},
  grow::HeapGrower,
};

/// Blocks found by stepping from header to header with `size` alone.
pub struct RawBlocks<'a> {
  cursor: *mut u8,
  end: *mut u8,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for RawBlocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.cursor >= self.end {
      return None;
    }

    let header = self.cursor.cast::<Header>();
    unsafe {
      self.cursor = Header::end(header);
      Some(BlockInfo::read(header))
    }
  }
}

/// Blocks linked through `next`, sentinel first.
pub struct Blocks<'a> {
  current: *mut Header,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for Blocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.current.is_null() {
      return None;
    }

    unsafe {
      let info = BlockInfo::read(self.current);
      self.current = (*self.current).next;
      Some(info)
    }
  }
}

/// Blocks linked through `next_free`, in registry order.
pub struct FreeBlocks<'a> {
  current: *mut Header,
  _heap: PhantomData<&'a ()>,
}

impl Iterator for FreeBlocks<'_> {
  type Item = BlockInfo;

  fn next(&mut self) -> Option<BlockInfo> {
    if self.current.is_null() {
      return None;
    }

    unsafe {
      let info = BlockInfo::read(self.current);
      self.current = (*self.current).next_free;
      Some(info)
    }
  }
}

/// Totals over the address-ordered chain. The sentinel is not counted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HeapStats {
  pub used_blocks: usize,
  pub free_blocks: usize,
  pub used_bytes: usize,
  pub free_bytes: usize,
  pub heap_size: usize,
}

impl<G: HeapGrower> Heap<G> {
  pub fn raw_blocks(&self) -> RawBlocks<'_> {
    RawBlocks {
      cursor: self.base.cast(),
      end: self.end,
      _heap: PhantomData,
    }
  }

  pub fn blocks(&self) -> Blocks<'_> {
    Blocks {
      current: self.base,
      _heap: PhantomData,
    }
  }

  pub fn free_blocks(&self) -> FreeBlocks<'_> {
    FreeBlocks {
      current: self.free_head,
      _heap: PhantomData,
    }
  }

  pub fn stats(&self) -> HeapStats {
    let mut stats = HeapStats {
      heap_size: self.heap_size(),
      ..HeapStats::default()
    };

    for block in self.blocks().skip(1) {
      if block.in_use {
        stats.used_blocks += 1;
        stats.used_bytes += block.size;
      } else {
        stats.free_blocks += 1;
        stats.free_bytes += block.size;
      }
    }

    stats
  }

  /// Cross-checks the three views of the heap.
  pub fn validate(&self) -> Result<(), HeapError> {
    let corrupt = |info: &BlockInfo, reason| HeapError::Corrupt {
      header: info.header as usize,
      reason,
    };

    let mut chain = self.blocks();
    let mut last = None;
    let mut free = HashSet::new();

    for raw in self.raw_blocks() {
      let Some(linked) = chain.next() else {
        return Err(corrupt(&raw, "block missing from the chain"));
      };
      if linked != raw {
        return Err(corrupt(&raw, "chain and raw walk disagree"));
      }

      match last {
        None if raw.size != 0 || !raw.in_use => {
          return Err(corrupt(&raw, "sentinel is not a used empty block"));
        }
        Some(BlockInfo { in_use: false, .. }) if !raw.in_use => {
          return Err(corrupt(&raw, "adjacent free blocks"));
        }
        _ => {}
      }

      if !raw.in_use {
        free.insert(raw.header);
      }
      last = Some(raw);
    }

    if let Some(extra) = chain.next() {
      return Err(corrupt(&extra, "chain runs past the high-water mark"));
    }

    if let Some(last) = last {
      if last.header != self.tail.cast_const().cast() {
        return Err(corrupt(&last, "tail pointer is stale"));
      }
      if last.payload.wrapping_add(last.size) != self.end.cast_const() {
        return Err(corrupt(&last, "last block does not end at the high-water mark"));
      }
    }

    for entry in self.free_blocks() {
      if entry.in_use {
        return Err(corrupt(&entry, "used block in the free registry"));
      }
      if !free.remove(&entry.header) {
        return Err(corrupt(&entry, "registry entry listed twice or off the chain"));
      }
    }

    if let Some(&header) = free.iter().next() {
      return Err(HeapError::Corrupt {
        header: header as usize,
        reason: "free block missing from the registry",
      });
    }

    Ok(())
  }

  pub fn write_raw<W: Write>(
    &self,
    out: &mut W,
  ) -> io::Result<()> {
    writeln!(out, "-- Start of Heap ({:?}) --", self.base)?;
    for block in self.raw_blocks() {
      writeln!(out, "{}", block)?;
    }
    writeln!(out, "-- End of Heap ({:?}) --\n", self.end)
  }

  pub fn write_chain<W: Write>(
    &self,
    out: &mut W,
  ) -> io::Result<()> {
    writeln!(out, "-- Start of Chain ({:?}) --", self.base)?;
    for block in self.blocks() {
      writeln!(out, "{}", block)?;
    }
    writeln!(out, "-- End of Chain ({:?}) --\n", self.end)
  }

  pub fn write_registry<W: Write>(
    &self,
    out: &mut W,
  ) -> io::Result<()> {
    writeln!(out, "-- Start of Free List ({:?}) --", self.free_head)?;
    let mut last = std::ptr::null();
    for block in self.free_blocks() {
      writeln!(out, "{}", block)?;
      last = block.header;
    }
    writeln!(out, "-- End of Free List ({:?}) --\n", last)
  }

  /// Prints every block from the base to the high-water mark.
  pub fn dump_raw(&self) -> io::Result<()> {
    self.write_raw(&mut io::stdout().lock())
  }

  /// Prints the address-ordered chain.
  pub fn dump_chain(&self) -> io::Result<()> {
    self.write_chain(&mut io::stdout().lock())
  }

  /// Prints the free registry.
  pub fn dump_registry(&self) -> io::Result<()> {
    self.write_registry(&mut io::stdout().lock())
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::{block::HEADER_SIZE, grow::Arena};

  fn heap() -> Heap<Arena> {
    Heap::new(Arena::with_capacity(64 * 1024).unwrap()).unwrap()
  }

  #[test]
  fn fresh_heap_holds_only_the_sentinel() {
    let heap = heap();

    let blocks: Vec<_> = heap.blocks().collect();

    assert_eq!(blocks.len(), 1);
    assert_eq!(blocks[0].header, heap.base());
    assert_eq!(blocks[0].size, 0);
    assert!(blocks[0].in_use);
    assert_eq!(heap.raw_blocks().count(), 1);
    assert_eq!(heap.free_blocks().count(), 0);
    heap.validate().unwrap();
  }

  #[test]
  fn views_agree_after_mixed_calls() {
    let mut heap = heap();

    let a = heap.allocate(40);
    let b = heap.allocate(8);
    let c = heap.allocate(120);
    let _d = heap.allocate(16);

    unsafe {
      heap.release(c);
      heap.release(a);
      let b = heap.resize(b, 200);
      heap.allocate(24);
      heap.release(b);
    }

    let raw: Vec<_> = heap.raw_blocks().collect();
    let chain: Vec<_> = heap.blocks().collect();
    assert_eq!(raw, chain);

    let free: Vec<_> = heap.free_blocks().collect();
    assert!(free.iter().all(|block| !block.in_use));
    assert_eq!(free.len(), chain.iter().filter(|block| !block.in_use).count());
    heap.validate().unwrap();
  }

  #[test]
  fn stats_count_blocks_and_bytes() {
    let mut heap = heap();

    let a = heap.allocate(32);
    let _b = heap.allocate(64);
    unsafe { heap.release(a) };

    let stats = heap.stats();

    assert_eq!(stats.used_blocks, 1);
    assert_eq!(stats.free_blocks, 1);
    assert_eq!(stats.used_bytes, 64);
    assert_eq!(stats.free_bytes, 32);
    assert_eq!(stats.heap_size, 3 * HEADER_SIZE + 96);
  }

  #[test]
  fn validate_reports_adjacent_free_blocks() {
    let mut heap = heap();

    let a = heap.allocate(16);
    let b = heap.allocate(16);
    unsafe {
      heap.release(a);
      // Flip the neighbour by hand, skipping the coalescing path.
      (*Header::from_payload(b)).in_use = false;
    }

    let err = heap.validate().unwrap_err();
    assert!(matches!(
      err,
      HeapError::Corrupt {
        reason: "adjacent free blocks",
        ..
      }
    ));
  }

  #[test]
  fn dumps_list_every_block() {
    let mut heap = heap();

    let a = heap.allocate(16);
    let _b = heap.allocate(16);
    unsafe { heap.release(a) };

    let mut raw = Vec::new();
    let mut chain = Vec::new();
    let mut registry = Vec::new();
    heap.write_raw(&mut raw).unwrap();
    heap.write_chain(&mut chain).unwrap();
    heap.write_registry(&mut registry).unwrap();

    let raw = String::from_utf8(raw).unwrap();
    let chain = String::from_utf8(chain).unwrap();
    let registry = String::from_utf8(registry).unwrap();

    let entries = |text: &str| {
      text
        .lines()
        .filter(|line| line.starts_with("metadata"))
        .map(str::to_owned)
        .collect::<Vec<_>>()
    };

    assert_eq!(entries(&raw).len(), 3);
    assert_eq!(entries(&raw), entries(&chain));
    assert_eq!(entries(&registry), vec![entries(&raw)[1].clone()]);
    assert!(raw.starts_with("-- Start of Heap"));
    assert!(registry.contains("size=16, in_use=0)"));
  }
}
