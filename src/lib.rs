//! # fitalloc - A First-Fit Free-List Allocator
//!
//! This crate provides a **first-fit free-list allocator** that manages a
//! single, forward-growing region of memory. It services allocation,
//! zero-initialized allocation, resizing, and release requests entirely from
//! that region, extending it on demand.
//!
//! ## Overview
//!
//! Every block, used or free, is a header followed by its payload. Blocks are
//! chained in address order, and free blocks are also threaded through a
//! separate free registry:
//!
//! ```text
//!   Heap Layout:
//!
//!   base                                                       high-water mark
//!   │                                                                       │
//!   ▼                                                                       ▼
//!   ┌──────┬──────┬──────────┬──────┬──────────────┬──────┬─────────────────┐
//!   │ Sent │ Hdr  │ Payload  │ Hdr  │   Payload    │ Hdr  │    Payload      │
//!   │ size │ used │          │ free │              │ used │                 │
//!   │  =0  │      │          │      │              │      │                 │
//!   └──────┴──────┴──────────┴──────┴──────────────┴──────┴─────────────────┘
//!      │     ▲ │               ▲ │                   ▲
//!      └─────┘ └───────────────┘ └───────────────────┘     next (address order)
//!
//!   free_head ──► free ──► ... ──► null                    next_free (registry)
//! ```
//!
//! ## Crate Structure
//!
//! ```text
//!   fitalloc
//!   ├── align      - Word alignment (align!, checked_align)
//!   ├── block      - Block header and BlockInfo view
//!   ├── error      - HeapError
//!   ├── grow       - HeapGrower trait, ProgramBreak (sbrk) and Arena (mmap)
//!   ├── heap       - Heap: allocate, allocate_zeroed, resize, release
//!   └── walk       - Raw/chain/registry walkers, dumps, stats, validate
//! ```
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use fitalloc::{Arena, Heap};
//!
//! fn main() {
//!     let mut heap = Heap::new(Arena::with_capacity(1 << 20).unwrap()).unwrap();
//!
//!     let ptr = heap.allocate(8) as *mut u64;
//!
//!     unsafe {
//!         *ptr = 42;
//!         println!("Value: {}", *ptr);
//!
//!         heap.release(ptr as *mut u8);
//!     }
//!
//!     heap.dump_chain().unwrap();
//! }
//! ```
//!
//! ## How It Works
//!
//! Allocation walks the free registry and takes the first block large
//! enough. A block with room to spare for another header is split:
//!
//! ```text
//!   Splitting a free block for a 32 byte request:
//!
//!   ┌─────┬──────────────────────────────────┐
//!   │ Hdr │          free, 256 bytes         │
//!   └─────┴──────────────────────────────────┘
//!                      │
//!                      ▼
//!   ┌─────┬──────────┬─────┬─────────────────┐
//!   │ Hdr │ used, 32 │ Hdr │ free, remainder │
//!   └─────┴──────────┴─────┴─────────────────┘
//! ```
//!
//! When nothing fits, a free block at the end of the heap grows in place;
//! otherwise a fresh block is appended past the high-water mark.
//!
//! Releasing a block merges it with any free neighbour, so two adjacent
//! blocks are never both free:
//!
//! ```text
//!   ┌─────┬──────┬─────┬──────┬─────┬──────┐       ┌─────┬──────────────────────┐
//!   │ Hdr │ free │ Hdr │ rel. │ Hdr │ free │  ──►  │ Hdr │  free, all three     │
//!   └─────┴──────┴─────┴──────┴─────┴──────┘       └─────┴──────────────────────┘
//! ```
//!
//! ## Limitations
//!
//! - **Single-threaded only**: `Heap` is neither `Send` nor `Sync`
//! - **Word alignment only**: no larger alignment can be requested
//! - **No shrinking**: `resize` to a smaller size keeps the block as is
//! - **No return to the OS**: the heap never shrinks
//!
//! ## Logging
//!
//! Allocation decisions are reported through the [`log`] facade at `trace`
//! level, heap extension at `debug`, failed requests at `warn`. Install any
//! logger to see them.

pub mod align;
mod block;
mod error;
mod grow;
mod heap;
mod walk;

pub use block::{BlockInfo, HEADER_SIZE, Header};
pub use error::HeapError;
pub use grow::{Arena, HeapGrower, ProgramBreak};
pub use heap::Heap;
pub use walk::{Blocks, FreeBlocks, HeapStats, RawBlocks};
