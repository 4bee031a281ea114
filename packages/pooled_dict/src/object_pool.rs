use std::alloc::Layout;
use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;
use std::ptr::NonNull;

use scopeguard::ScopeGuard;

use crate::PoolAllocator;

/// A typed object pool that places values of `T` into cells of a [`PoolAllocator`].
///
/// The pool hands out raw pointers to the created objects and does not track which cells are
/// occupied, so it cannot drop objects on its own. Owners are expected to [`destroy()`][1] every
/// object they [`create()`][2] before dropping the pool; objects still alive when the pool is
/// dropped have their memory released without their destructor running.
///
/// # Out of band access
///
/// The pool never creates references to the objects it holds. Pointers returned by the create
/// methods remain valid until the object is destroyed or the pool is dropped, and callers may
/// create shared or exclusive references from them as long as they uphold the usual aliasing
/// rules themselves. Objects never move while they are in the pool.
///
/// [1]: Self::destroy
/// [2]: Self::create
pub struct ObjectPool<T> {
    allocator: PoolAllocator,

    _item: PhantomData<T>,
}

impl<T> fmt::Debug for ObjectPool<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectPool")
            .field("item_type", &format_args!("{}", type_name::<T>()))
            .field("allocator", &self.allocator)
            .finish()
    }
}

impl<T> Default for ObjectPool<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> ObjectPool<T> {
    /// Creates an empty pool. No memory is allocated until the first object is created.
    #[must_use]
    pub fn new() -> Self {
        Self {
            allocator: PoolAllocator::new(Layout::new::<T>()),
            _item: PhantomData,
        }
    }

    /// Creates an empty pool with room for `capacity` objects preallocated.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            allocator: PoolAllocator::with_capacity(Layout::new::<T>(), capacity),
            _item: PhantomData,
        }
    }

    /// The number of objects currently alive in the pool.
    #[must_use]
    pub fn len(&self) -> usize {
        self.allocator.len()
    }

    /// Whether the pool holds no live objects.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allocator.is_empty()
    }

    /// The number of objects the pool can hold without obtaining more memory.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.allocator.capacity()
    }

    /// Ensures that at least `additional` more objects can be created without obtaining more
    /// memory.
    pub fn reserve(&mut self, additional: usize) {
        self.allocator.reserve(additional);
    }

    /// Moves `value` into a pool cell and returns a pointer to it.
    #[must_use]
    pub fn create(&mut self, value: T) -> NonNull<T> {
        let cell = self.allocator.allocate().cast::<T>();

        // SAFETY: The allocator was created for the layout of T, so the cell is aligned and
        // large enough, and it is ours alone until we hand it back.
        unsafe {
            cell.write(value);
        }

        cell
    }

    /// Obtains a pool cell and constructs the object in it with `factory`.
    ///
    /// If `factory` panics, the cell is returned to the allocator before the panic continues,
    /// leaving the pool as it was.
    #[must_use]
    pub fn create_with<F>(&mut self, factory: F) -> NonNull<T>
    where
        F: FnOnce() -> T,
    {
        let cell = self.allocator.allocate().cast::<T>();

        let allocator = scopeguard::guard(&mut self.allocator, |allocator| {
            // SAFETY: The cell came from this allocator moments ago and nothing was written
            // into it, so there is nothing to drop.
            unsafe {
                allocator.deallocate(cell.cast());
            }
        });

        let value = factory();

        ScopeGuard::into_inner(allocator);

        // SAFETY: See create().
        unsafe {
            cell.write(value);
        }

        cell
    }

    /// Obtains a pool cell and constructs the object in it with a fallible `factory`.
    ///
    /// If `factory` fails or panics, the cell is returned to the allocator before the error or
    /// panic propagates, leaving the pool as it was.
    pub fn try_create_with<F, E>(&mut self, factory: F) -> Result<NonNull<T>, E>
    where
        F: FnOnce() -> Result<T, E>,
    {
        let cell = self.allocator.allocate().cast::<T>();

        let allocator = scopeguard::guard(&mut self.allocator, |allocator| {
            // SAFETY: The cell came from this allocator moments ago and nothing was written
            // into it, so there is nothing to drop.
            unsafe {
                allocator.deallocate(cell.cast());
            }
        });

        // Returning early drops the guard, which hands the cell back.
        let value = factory()?;

        ScopeGuard::into_inner(allocator);

        // SAFETY: See create().
        unsafe {
            cell.write(value);
        }

        Ok(cell)
    }

    /// Moves the object out of its cell and returns the cell to the allocator.
    ///
    /// The caller receives ownership of the value and decides when it is dropped. A panicking
    /// destructor therefore cannot leave the pool in an inconsistent state.
    ///
    /// # Safety
    ///
    /// The pointer must have been returned by one of the create methods of this pool and must
    /// not have been destroyed since. No references derived from the pointer may be used after
    /// this call.
    #[must_use]
    pub unsafe fn destroy(&mut self, object: NonNull<T>) -> T {
        // SAFETY: The caller guarantees the object is alive in this pool, so the cell holds an
        // initialized T that nobody else will read again.
        let value = unsafe { object.read() };

        // SAFETY: The cell came from our allocator and the value has been moved out of it.
        unsafe {
            self.allocator.deallocate(object.cast());
        }

        value
    }

    /// Drops the object and returns its cell to the allocator.
    ///
    /// # Safety
    ///
    /// Same as [`destroy()`][Self::destroy].
    pub unsafe fn destroy_in_place(&mut self, object: NonNull<T>) {
        // SAFETY: Forwarding the caller's guarantees.
        drop(unsafe { self.destroy(object) });
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        self.allocator.integrity_check();
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(ObjectPool<String>: Send);
    assert_not_impl_any!(ObjectPool<Rc<u8>>: Send);

    struct Droppable {
        dropped: Rc<Cell<bool>>,
    }

    impl Drop for Droppable {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    #[test]
    fn create_and_destroy() {
        let mut pool = ObjectPool::<String>::new();

        let hello = pool.create("hello".to_string());
        let world = pool.create("world".to_string());

        assert_eq!(pool.len(), 2);

        // SAFETY: Both objects are alive and nobody else references them.
        unsafe {
            assert_eq!(hello.as_ref(), "hello");
            assert_eq!(world.as_ref(), "world");
        }

        // SAFETY: The object is alive in this pool and destroyed once.
        let value = unsafe { pool.destroy(hello) };
        assert_eq!(value, "hello");
        assert_eq!(pool.len(), 1);

        // SAFETY: The object is alive in this pool and destroyed once.
        unsafe {
            pool.destroy_in_place(world);
        }

        assert!(pool.is_empty());
        pool.integrity_check();
    }

    #[test]
    fn destroy_in_place_runs_drop() {
        let dropped = Rc::new(Cell::new(false));
        let mut pool = ObjectPool::<Droppable>::new();

        let object = pool.create(Droppable {
            dropped: Rc::clone(&dropped),
        });

        assert!(!dropped.get());

        // SAFETY: The object is alive in this pool and destroyed once.
        unsafe {
            pool.destroy_in_place(object);
        }

        assert!(dropped.get());
    }

    #[test]
    fn destroy_hands_ownership_to_caller() {
        let dropped = Rc::new(Cell::new(false));
        let mut pool = ObjectPool::<Droppable>::new();

        let object = pool.create(Droppable {
            dropped: Rc::clone(&dropped),
        });

        // SAFETY: The object is alive in this pool and destroyed once.
        let value = unsafe { pool.destroy(object) };

        assert!(!dropped.get());
        assert!(pool.is_empty());

        drop(value);
        assert!(dropped.get());
    }

    #[test]
    fn panicking_factory_returns_cell() {
        let mut pool = ObjectPool::<u64>::new();

        let result = catch_unwind(AssertUnwindSafe(|| {
            _ = pool.create_with(|| panic!("factory failed"));
        }));

        assert!(result.is_err());
        assert!(pool.is_empty());
        pool.integrity_check();

        // The returned cell is the first to be reused.
        let object = pool.create_with(|| 42);

        // SAFETY: The object is alive and nobody else references it.
        assert_eq!(unsafe { *object.as_ref() }, 42);

        // SAFETY: The object is alive in this pool and destroyed once.
        unsafe {
            pool.destroy_in_place(object);
        }
    }

    #[test]
    fn failing_factory_returns_cell() {
        let mut pool = ObjectPool::<u64>::new();

        let result = pool.try_create_with(|| Err::<u64, _>("nope"));

        assert_eq!(result, Err("nope"));
        assert!(pool.is_empty());
        pool.integrity_check();

        let object = pool
            .try_create_with(|| Ok::<_, &str>(7))
            .expect("factory does not fail");

        // SAFETY: The object is alive and nobody else references it.
        assert_eq!(unsafe { *object.as_ref() }, 7);

        // SAFETY: The object is alive in this pool and destroyed once.
        unsafe {
            pool.destroy_in_place(object);
        }
    }

    #[test]
    fn objects_do_not_move_as_pool_grows() {
        let mut pool = ObjectPool::<usize>::with_capacity(1);

        let first = pool.create(0);
        let others = (1..500).map(|i| pool.create(i)).collect::<Vec<_>>();

        assert!(pool.capacity() >= 500);

        // SAFETY: The object is alive and nobody else references it.
        assert_eq!(unsafe { *first.as_ref() }, 0);

        for (expected, object) in (1..500).zip(&others) {
            // SAFETY: The object is alive and nobody else references it.
            assert_eq!(unsafe { *object.as_ref() }, expected);
        }

        // SAFETY: Every object is alive in this pool and destroyed once.
        unsafe {
            pool.destroy_in_place(first);

            for object in others {
                pool.destroy_in_place(object);
            }
        }

        pool.integrity_check();
    }
}
