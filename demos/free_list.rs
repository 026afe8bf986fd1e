use std::{io::Read, ptr};

use fitalloc::{Heap, HeapGrower, ProgramBreak};

/// Waits until the user presses ENTER.
/// Useful when you want to inspect memory state with tools like `pmap`, `htop`,
/// `gdb`, or just visually track how allocations change the program break.
fn block_until_enter_pressed() {
  println!("\n>>> Press ENTER to continue...");
  let _ = std::io::stdin().bytes().next();
}

/// Prints the current program break and the heap's three views.
fn print_heap(
  heap: &Heap<ProgramBreak>,
  label: &str,
) {
  println!(
    "[{}] PID = {}, program break = {:?}, heap size = {}",
    label,
    std::process::id(),
    heap.grower().current_break(),
    heap.heap_size(),
  );

  let dumped = heap
    .dump_raw()
    .and_then(|_| heap.dump_chain())
    .and_then(|_| heap.dump_registry());
  if let Err(err) = dumped {
    eprintln!("dump failed: {}", err);
  }

  if let Err(err) = heap.validate() {
    eprintln!("heap is inconsistent: {}", err);
  }
}

fn report(
  label: &str,
  address: *mut u8,
) {
  if address.is_null() {
    // Someone else (usually the system allocator) moved the program break.
    println!("{} -> null (see RUST_LOG=warn for the reason)", label);
  } else {
    println!("{} -> {:?}", label, address);
  }
}

fn main() {
  env_logger::init();

  let mut heap = match Heap::new(ProgramBreak::new()) {
    Ok(heap) => heap,
    Err(err) => {
      eprintln!("cannot create heap: {}", err);
      return;
    }
  };

  print_heap(&heap, "start");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 1) Three neighbouring blocks, appended at the high-water mark.
  // --------------------------------------------------------------------
  let a = heap.allocate(24);
  let b = heap.allocate(24);
  let c = heap.allocate(24);
  report("\n[1] allocate(24) A", a);
  report("[1] allocate(24) B", b);
  report("[1] allocate(24) C", c);
  print_heap(&heap, "after A, B, C");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 2) Release B then A: the two merge into one free block.
  // --------------------------------------------------------------------
  unsafe {
    heap.release(b);
    heap.release(a);
  }
  println!("\n[2] released B then A");
  print_heap(&heap, "after release");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 3) A small request splits the merged block.
  // --------------------------------------------------------------------
  let d = heap.allocate(8);
  report("\n[3] allocate(8) D (reuses A)", d);
  print_heap(&heap, "after split");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 4) Grow D past its block: its contents move.
  // --------------------------------------------------------------------
  unsafe {
    if !d.is_null() {
      ptr::write_bytes(d, 0xAB, 8);
    }
    let moved = heap.resize(d, 128);
    report("\n[4] resize(D, 128)", moved);
    if !moved.is_null() {
      println!("[4] first byte after move = 0x{:X}", moved.read());
    }
  }
  print_heap(&heap, "after resize");
  block_until_enter_pressed();

  // --------------------------------------------------------------------
  // 5) A zeroed 64 KiB block to observe heap growth.
  // --------------------------------------------------------------------
  let big = heap.allocate_zeroed(64, 1024);
  report("\n[5] allocate_zeroed(64, 1024)", big);
  print_heap(&heap, "after large alloc");

  let stats = heap.stats();
  println!(
    "\n[6] {} used blocks ({} bytes), {} free blocks ({} bytes), {} bytes of heap",
    stats.used_blocks, stats.used_bytes, stats.free_blocks, stats.free_bytes, stats.heap_size
  );
  println!("[6] End of example. The heap never shrinks; the OS reclaims it at exit.");
}
