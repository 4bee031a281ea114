use std::alloc::{Layout, alloc, dealloc, handle_alloc_error};
use std::ptr::NonNull;
use std::thread;

use tracing::trace;

/// The smallest number of cells the allocator adds when it runs out of free cells.
pub(crate) const MIN_BATCH: usize = 64;

/// A fixed-layout cell allocator that carves cells out of growable memory blocks.
///
/// Every cell handed out by the allocator has the same size and alignment, determined at
/// creation time from the layout of the items the caller intends to store. Free cells form an
/// intrusive singly-linked list: the link to the next free cell is stored inside the free cell
/// itself, so tracking free cells costs no memory beyond the cells themselves.
///
/// When the free list runs dry, the allocator grows by allocating one new block that at least
/// doubles the total capacity (but is never smaller than a minimum batch). Blocks are never
/// returned to the system before the allocator is dropped - deallocated cells only go back onto
/// the free list.
///
/// # Out of band access
///
/// The allocator never creates references to cell contents. Callers own the memory of a cell
/// from [`allocate()`][1] until they hand it back via [`deallocate()`][2] and may access it via
/// raw pointers in whatever way they see fit.
///
/// # Resource usage
///
/// Dropping the allocator releases all blocks. Any cells still allocated at that point are
/// released without any destructor running; higher layers such as
/// [`ObjectPool`][crate::ObjectPool] are responsible for destroying their contents first.
///
/// [1]: Self::allocate
/// [2]: Self::deallocate
#[derive(Debug)]
pub struct PoolAllocator {
    /// Layout of a single cell, large enough and aligned enough for both the item layout and the
    /// free list link. The size is always a multiple of the alignment, so it doubles as stride.
    cell_layout: Layout,

    /// Every block we have ever allocated, released only when the allocator is dropped.
    blocks: Vec<Block>,

    /// Head of the intrusive free list. `None` means every cell in every block is allocated.
    first_free: Option<NonNull<FreeCell>>,

    /// Number of cells currently handed out to callers.
    allocated: usize,

    /// Total number of cells across all blocks.
    capacity: usize,
}

#[derive(Debug)]
struct Block {
    ptr: NonNull<u8>,
    layout: Layout,
}

/// What a cell contains while it is on the free list.
#[derive(Debug)]
#[repr(C)]
struct FreeCell {
    next: Option<NonNull<FreeCell>>,
}

impl PoolAllocator {
    /// Creates an allocator for cells that can each hold one item of `item_layout`.
    ///
    /// No memory is allocated until the first cell is requested.
    #[must_use]
    pub fn new(item_layout: Layout) -> Self {
        Self {
            cell_layout: cell_layout_for(item_layout),
            blocks: Vec::new(),
            first_free: None,
            allocated: 0,
            capacity: 0,
        }
    }

    /// Creates an allocator with room for `cells` items of `item_layout` preallocated in a
    /// single block.
    #[must_use]
    pub fn with_capacity(item_layout: Layout, cells: usize) -> Self {
        let mut allocator = Self::new(item_layout);
        allocator.expand(cells);
        allocator
    }

    /// The layout of each cell. This is at least as large and as aligned as the item layout the
    /// allocator was created for.
    #[must_use]
    pub fn cell_layout(&self) -> Layout {
        self.cell_layout
    }

    /// The number of cells currently handed out.
    #[must_use]
    #[cfg_attr(test, mutants::skip)] // Can be mutated to infinitely growing memory use.
    pub fn len(&self) -> usize {
        self.allocated
    }

    /// Whether no cells are currently handed out.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocated == 0
    }

    /// The total number of cells across all blocks, allocated or not.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// The number of memory blocks the allocator has obtained from the system.
    #[must_use]
    pub fn block_count(&self) -> usize {
        self.blocks.len()
    }

    /// Ensures that at least `additional` more cells can be allocated without growing.
    pub fn reserve(&mut self, additional: usize) {
        let free = self
            .capacity
            .checked_sub(self.allocated)
            .expect("allocated count can never exceed capacity");

        if free < additional {
            self.expand(
                additional
                    .checked_sub(free)
                    .expect("guarded by comparison above"),
            );
        }
    }

    /// Adds one new block of exactly `cells` cells to the allocator and puts all of them on the
    /// free list. Does nothing if `cells` is zero.
    ///
    /// # Panics
    ///
    /// Allocation failure is not treated as a recoverable condition and is reported via
    /// [`handle_alloc_error`], which by default aborts the process.
    pub fn expand(&mut self, cells: usize) {
        if cells == 0 {
            return;
        }

        let block_layout = self.block_layout(cells);

        // The bookkeeping must be able to record the block before we obtain it. Once the block
        // exists, nothing below can fail, so we never end up with a block we cannot release.
        self.blocks.reserve(1);

        // SAFETY: The layout is non-zero-sized because cells are at least as large as a pointer
        // and we have at least one of them.
        let Some(ptr) = NonNull::new(unsafe { alloc(block_layout) }) else {
            handle_alloc_error(block_layout)
        };

        let stride = self.cell_layout.size();

        // We link the cells back to front so the lowest address ends up at the head of the free
        // list. The last cell of the new block links to whatever was free before.
        let mut next = self.first_free;

        for index in (0..cells).rev() {
            let offset = index
                .checked_mul(stride)
                .expect("guarded by successful block layout calculation");

            // SAFETY: The offset is within the block because index < cells and the block spans
            // exactly cells * stride bytes.
            let cell = unsafe { ptr.add(offset) }.cast::<FreeCell>();

            // SAFETY: The block is aligned to the cell alignment and the stride is a multiple of
            // it, so every cell is aligned for FreeCell (which the cell alignment includes). The
            // memory is freshly allocated and owned by us, so it is valid for writes.
            unsafe {
                cell.write(FreeCell { next });
            }

            next = Some(cell);
        }

        self.first_free = next;
        self.blocks.push(Block {
            ptr,
            layout: block_layout,
        });
        self.capacity = self
            .capacity
            .checked_add(cells)
            .expect("capacity cannot overflow because each cell occupies at least one byte");

        trace!(
            cells,
            capacity = self.capacity,
            blocks = self.blocks.len(),
            "pool allocator added a block"
        );
    }

    /// Hands out one free cell, growing the allocator if no free cell is available.
    ///
    /// The returned pointer is aligned to [`cell_layout()`][1] and valid for reads and writes of
    /// [`cell_layout().size()`][1] bytes until it is passed back to [`deallocate()`][2] or the
    /// allocator is dropped. The contents are uninitialized.
    ///
    /// [1]: Self::cell_layout
    /// [2]: Self::deallocate
    #[must_use]
    pub fn allocate(&mut self) -> NonNull<u8> {
        if self.first_free.is_none() {
            // Doubles the capacity, starting from a minimum batch.
            self.expand(self.capacity.max(MIN_BATCH));
        }

        let cell = self
            .first_free
            .expect("we just expanded the allocator so there must be a free cell");

        // SAFETY: Every cell on the free list holds a FreeCell written by expand() or
        // deallocate(), and the cell is owned by us until we hand it out right now.
        self.first_free = unsafe { cell.read() }.next;

        self.allocated = self
            .allocated
            .checked_add(1)
            .expect("guarded by allocated <= capacity");

        cell.cast()
    }

    /// Returns a cell to the free list.
    ///
    /// # Safety
    ///
    /// The cell must have been returned by [`allocate()`][1] on this same allocator and must not
    /// have been deallocated since. Whatever the cell contains is abandoned without running any
    /// destructor; the caller must not access the cell after this call.
    ///
    /// [1]: Self::allocate
    pub unsafe fn deallocate(&mut self, cell: NonNull<u8>) {
        debug_assert!(
            self.owns(cell),
            "deallocated a cell that does not belong to this pool allocator"
        );

        let cell = cell.cast::<FreeCell>();

        // SAFETY: The caller guarantees the cell came from us, so it is aligned and large enough
        // for a FreeCell, and that nobody else is using it anymore.
        unsafe {
            cell.write(FreeCell {
                next: self.first_free,
            });
        }

        self.first_free = Some(cell);

        self.allocated = self
            .allocated
            .checked_sub(1)
            .expect("deallocated more cells than were allocated");
    }

    /// Whether the pointer points at the start of a cell in one of our blocks.
    #[must_use]
    fn owns(&self, cell: NonNull<u8>) -> bool {
        let address = cell.addr().get();
        let stride = self.cell_layout.size();

        self.blocks.iter().any(|block| {
            let start = block.ptr.addr().get();

            address
                .checked_sub(start)
                .is_some_and(|offset| offset < block.layout.size() && offset.checked_rem(stride) == Some(0))
        })
    }

    fn block_layout(&self, cells: usize) -> Layout {
        let size = self
            .cell_layout
            .size()
            .checked_mul(cells)
            .expect("block size overflow would mean more cells than virtual memory can fit");

        Layout::from_size_align(size, self.cell_layout.align())
            .expect("block layout must be valid because the cell layout is valid")
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let mut observed_free: usize = 0;
        let mut cursor = self.first_free;

        while let Some(cell) = cursor {
            assert!(
                self.owns(cell.cast()),
                "free list contains a cell that does not belong to any block"
            );

            observed_free = observed_free
                .checked_add(1)
                .expect("free list is longer than the address space - it must contain a cycle");

            assert!(
                observed_free <= self.capacity,
                "free list has more entries than the allocator has cells - it must contain a cycle"
            );

            // SAFETY: Cells on the free list always hold an initialized FreeCell.
            cursor = unsafe { cell.read() }.next;
        }

        assert_eq!(
            observed_free.checked_add(self.allocated),
            Some(self.capacity),
            "free cells {observed_free} plus allocated cells {} do not add up to capacity {}",
            self.allocated,
            self.capacity
        );

        let observed_capacity: usize = self
            .blocks
            .iter()
            .map(|block| {
                block
                    .layout
                    .size()
                    .checked_div(self.cell_layout.size())
                    .expect("cell size is never zero")
            })
            .sum();

        assert_eq!(
            observed_capacity, self.capacity,
            "blocks hold {observed_capacity} cells but capacity says {}",
            self.capacity
        );
    }
}

impl Drop for PoolAllocator {
    fn drop(&mut self) {
        let leaked = self.allocated;

        for block in self.blocks.drain(..) {
            // SAFETY: The layout is the same one we allocated the block with.
            unsafe {
                dealloc(block.ptr.as_ptr(), block.layout);
            }
        }

        // We do this check at the end so we clean up the memory first. If we are already
        // panicking, we do not want to panic again and obscure the original panic.
        if !thread::panicking() {
            debug_assert!(
                leaked == 0,
                "dropped a pool allocator with {leaked} cells still allocated"
            );
        }
    }
}

// SAFETY: The allocator only owns raw memory with no thread affinity. What is stored in the cells
// is the business of the layers above, which carry their own Send requirements.
unsafe impl Send for PoolAllocator {}

fn cell_layout_for(item_layout: Layout) -> Layout {
    let link_layout = Layout::new::<FreeCell>();

    Layout::from_size_align(
        item_layout.size().max(link_layout.size()),
        item_layout.align().max(link_layout.align()),
    )
    .expect("combining two valid layouts by maximum always yields a valid layout")
    .pad_to_align()
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::collections::HashSet;

    use static_assertions::assert_impl_all;

    use super::*;

    assert_impl_all!(PoolAllocator: Send);

    #[test]
    fn smoke_test() {
        let mut allocator = PoolAllocator::new(Layout::new::<u64>());

        assert_eq!(allocator.capacity(), 0);
        assert_eq!(allocator.block_count(), 0);

        let a = allocator.allocate();
        let b = allocator.allocate();

        assert_ne!(a, b);
        assert_eq!(allocator.len(), 2);
        assert_eq!(allocator.capacity(), MIN_BATCH);
        assert_eq!(allocator.block_count(), 1);

        // SAFETY: Both cells came from this allocator and are deallocated once.
        unsafe {
            allocator.deallocate(a);
            allocator.deallocate(b);
        }

        assert!(allocator.is_empty());
        allocator.integrity_check();
    }

    #[test]
    fn cells_are_aligned_and_distinct() {
        #[repr(align(64))]
        struct Aligned([u8; 3]);

        let mut allocator = PoolAllocator::new(Layout::new::<Aligned>());
        assert_eq!(allocator.cell_layout().align(), 64);
        assert_eq!(allocator.cell_layout().size(), 64);

        let cells = (0..200).map(|_| allocator.allocate()).collect::<Vec<_>>();

        let unique = cells.iter().copied().collect::<HashSet<_>>();
        assert_eq!(unique.len(), cells.len());

        for cell in &cells {
            assert_eq!(cell.addr().get() % 64, 0);
        }

        for cell in cells {
            // SAFETY: Every cell came from this allocator and is deallocated once.
            unsafe {
                allocator.deallocate(cell);
            }
        }

        allocator.integrity_check();
    }

    #[test]
    fn tiny_items_still_fit_a_link() {
        let allocator = PoolAllocator::new(Layout::new::<u8>());

        assert!(allocator.cell_layout().size() >= size_of::<usize>());
        assert!(allocator.cell_layout().align() >= align_of::<usize>());
    }

    #[test]
    fn zero_sized_items_get_real_cells() {
        let mut allocator = PoolAllocator::new(Layout::new::<()>());

        let a = allocator.allocate();
        let b = allocator.allocate();
        assert_ne!(a, b);

        // SAFETY: Both cells came from this allocator and are deallocated once.
        unsafe {
            allocator.deallocate(a);
            allocator.deallocate(b);
        }
    }

    #[test]
    fn deallocated_cell_is_reused_first() {
        let mut allocator = PoolAllocator::new(Layout::new::<u32>());

        let a = allocator.allocate();
        let b = allocator.allocate();
        let c = allocator.allocate();

        // SAFETY: The cell came from this allocator and is deallocated once.
        unsafe {
            allocator.deallocate(b);
        }

        let d = allocator.allocate();
        assert_eq!(d, b);
        assert_eq!(allocator.len(), 3);

        // SAFETY: Every live cell came from this allocator and is deallocated once.
        unsafe {
            allocator.deallocate(a);
            allocator.deallocate(c);
            allocator.deallocate(d);
        }
    }

    #[test]
    fn growth_doubles_capacity() {
        let mut allocator = PoolAllocator::new(Layout::new::<u64>());

        let mut cells = Vec::new();

        for _ in 0..MIN_BATCH {
            cells.push(allocator.allocate());
        }

        assert_eq!(allocator.capacity(), MIN_BATCH);
        assert_eq!(allocator.block_count(), 1);

        cells.push(allocator.allocate());

        assert_eq!(allocator.capacity(), MIN_BATCH * 2);
        assert_eq!(allocator.block_count(), 2);

        while cells.len() < MIN_BATCH * 2 + 1 {
            cells.push(allocator.allocate());
        }

        assert_eq!(allocator.capacity(), MIN_BATCH * 4);
        assert_eq!(allocator.block_count(), 3);

        allocator.integrity_check();

        for cell in cells {
            // SAFETY: Every cell came from this allocator and is deallocated once.
            unsafe {
                allocator.deallocate(cell);
            }
        }

        // Memory is never given back before the allocator is dropped.
        assert_eq!(allocator.capacity(), MIN_BATCH * 4);
        allocator.integrity_check();
    }

    #[test]
    fn with_capacity_preallocates_single_block() {
        let mut allocator = PoolAllocator::with_capacity(Layout::new::<u16>(), 10);

        assert_eq!(allocator.capacity(), 10);
        assert_eq!(allocator.block_count(), 1);

        let cells = (0..10).map(|_| allocator.allocate()).collect::<Vec<_>>();
        assert_eq!(allocator.block_count(), 1);

        for cell in cells {
            // SAFETY: Every cell came from this allocator and is deallocated once.
            unsafe {
                allocator.deallocate(cell);
            }
        }
    }

    #[test]
    fn reserve_only_adds_missing_cells() {
        let mut allocator = PoolAllocator::new(Layout::new::<u32>());

        allocator.reserve(5);
        assert_eq!(allocator.capacity(), 5);

        allocator.reserve(3);
        assert_eq!(allocator.capacity(), 5);

        let a = allocator.allocate();
        allocator.reserve(5);
        assert_eq!(allocator.capacity(), 6);
        assert_eq!(allocator.block_count(), 2);

        // SAFETY: The cell came from this allocator and is deallocated once.
        unsafe {
            allocator.deallocate(a);
        }

        allocator.integrity_check();
    }

    #[test]
    fn expand_by_zero_is_noop() {
        let mut allocator = PoolAllocator::new(Layout::new::<u32>());

        allocator.expand(0);

        assert_eq!(allocator.capacity(), 0);
        assert_eq!(allocator.block_count(), 0);
    }

    #[test]
    fn cells_hold_written_values() {
        let mut allocator = PoolAllocator::new(Layout::new::<u64>());

        let cells = (0..100_u64)
            .map(|value| {
                let cell = allocator.allocate().cast::<u64>();
                // SAFETY: The cell is ours, aligned and large enough for a u64.
                unsafe {
                    cell.write(value);
                }
                cell
            })
            .collect::<Vec<_>>();

        for (expected, cell) in (0..100_u64).zip(&cells) {
            // SAFETY: We wrote a u64 into every cell above.
            assert_eq!(unsafe { cell.read() }, expected);
        }

        for cell in cells {
            // SAFETY: Every cell came from this allocator and is deallocated once.
            unsafe {
                allocator.deallocate(cell.cast());
            }
        }
    }
}
