use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use scopeguard::ScopeGuard;
use tracing::trace;

use crate::{
    Axis, Error, HashIndex, IndexAdapter, IndexPairHasher, Links, List, ListAdapter, ListIter,
    ObjectPool, Result,
};

struct Item<V> {
    coordinates: (usize, usize),
    value: V,
    row_links: Links<Item<V>>,
    column_links: Links<Item<V>>,
}

enum ByRow {}

// SAFETY: Always points at the `row_links` field.
unsafe impl<V> ListAdapter<Item<V>> for ByRow {
    unsafe fn links(node: NonNull<Item<V>>) -> NonNull<Links<Item<V>>> {
        // SAFETY: The caller guarantees the node is live.
        let links = unsafe { &raw mut (*node.as_ptr()).row_links };

        // SAFETY: A field of a non-null node is itself non-null.
        unsafe { NonNull::new_unchecked(links) }
    }
}

enum ByColumn {}

// SAFETY: Always points at the `column_links` field.
unsafe impl<V> ListAdapter<Item<V>> for ByColumn {
    unsafe fn links(node: NonNull<Item<V>>) -> NonNull<Links<Item<V>>> {
        // SAFETY: The caller guarantees the node is live.
        let links = unsafe { &raw mut (*node.as_ptr()).column_links };

        // SAFETY: A field of a non-null node is itself non-null.
        unsafe { NonNull::new_unchecked(links) }
    }
}

enum ByCoordinates {}

// SAFETY: Always points at the `coordinates` field, which never changes after creation.
unsafe impl<V> IndexAdapter<Item<V>> for ByCoordinates {
    type Key = (usize, usize);

    unsafe fn key<'a>(node: NonNull<Item<V>>) -> &'a (usize, usize) {
        // SAFETY: The caller guarantees the node is live.
        unsafe { &(*node.as_ptr()).coordinates }
    }
}

type RowList<V> = List<Item<V>, ByRow>;
type ColumnList<V> = List<Item<V>, ByColumn>;

/// A two-dimensional array that only stores the cells that have been assigned a value.
///
/// Every item is linked into a list for its row and a list for its column, so walking one row
/// or one column costs time proportional to the number of items in it rather than to the size
/// of the array. Items within a row or column are visited in the order they were inserted.
/// Lookup by `(row, column)` goes through a hash index.
///
/// The array has a fixed number of rows and columns, which can be changed with
/// [`resize_rows()`][Self::resize_rows] and [`resize_columns()`][Self::resize_columns].
/// Coordinates outside of these bounds cause a panic, as with slice indexing.
///
/// # Examples
///
/// ```
/// use pooled_dict::Sparse2D;
///
/// let mut matrix = Sparse2D::new(1000, 1000);
///
/// matrix.insert(3, 500, 1.5);
/// matrix.insert(3, 7, 2.5);
/// matrix.insert(999, 7, -1.0);
///
/// assert_eq!(matrix.get(3, 500), Some(&1.5));
/// assert_eq!(matrix.get_or(4, 4, &0.0), &0.0);
///
/// let row_3 = matrix.row(3).map(|(_, column, value)| (column, *value)).collect::<Vec<_>>();
/// assert_eq!(row_3, vec![(500, 1.5), (7, 2.5)]);
///
/// assert_eq!(matrix.column_len(7), 2);
/// ```
pub struct Sparse2D<V> {
    pool: ObjectPool<Item<V>>,
    index: HashIndex<Item<V>, ByCoordinates, IndexPairHasher>,
    rows: Vec<RowList<V>>,
    columns: Vec<ColumnList<V>>,
}

impl<V> Sparse2D<V> {
    /// Creates an empty array with the given number of rows and columns.
    #[must_use]
    pub fn new(rows: usize, columns: usize) -> Self {
        let mut result = Self {
            pool: ObjectPool::new(),
            index: HashIndex::new(IndexPairHasher),
            rows: Vec::new(),
            columns: Vec::new(),
        };

        result.rows.resize_with(rows, List::new);
        result.columns.resize_with(columns, List::new);

        result
    }

    /// The number of rows.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// The number of columns.
    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    /// The number of items stored in the array.
    #[must_use]
    pub fn len(&self) -> usize {
        self.pool.len()
    }

    /// Whether no items are stored in the array.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pool.is_empty()
    }

    /// Changes the number of rows.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineNotEmpty`] if shrinking would remove a row that still holds items.
    /// The array is not modified in that case.
    pub fn resize_rows(&mut self, rows: usize) -> Result<()> {
        resize_lines(&mut self.rows, rows, Axis::Row)
    }

    /// Changes the number of columns.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LineNotEmpty`] if shrinking would remove a column that still holds
    /// items. The array is not modified in that case.
    pub fn resize_columns(&mut self, columns: usize) -> Result<()> {
        resize_lines(&mut self.columns, columns, Axis::Column)
    }

    /// Stores `value` at `(row, column)`.
    ///
    /// If the cell already holds a value, it is replaced and the old value is returned. The item
    /// keeps its position in its row and column. Otherwise the new item is appended to the end
    /// of its row and column.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn insert(&mut self, row: usize, column: usize, value: V) -> Option<V> {
        self.assert_in_bounds(row, column);

        if let Some(node) = self.index.get(&(row, column)) {
            // SAFETY: Indexed items are live and we hold an exclusive borrow of the array.
            return Some(mem::replace(unsafe { &mut (*node.as_ptr()).value }, value));
        }

        let node = self.pool.create(Item {
            coordinates: (row, column),
            value,
            row_links: Links::new(),
            column_links: Links::new(),
        });

        let row_list = self
            .rows
            .get_mut(row)
            .expect("bounds were checked above");
        let column_list = self
            .columns
            .get_mut(column)
            .expect("bounds were checked above");

        // SAFETY: The item was created above and has never been linked.
        unsafe {
            row_list.push_back(node);
        }
        // SAFETY: As above.
        unsafe {
            column_list.push_back(node);
        }

        // Until the item is indexed, any failure must undo the linking and creation.
        let undo = scopeguard::guard(
            (&mut self.pool, row_list, column_list),
            |(pool, row_list, column_list)| {
                // SAFETY: The item was linked into both lists above and is not indexed.
                unsafe {
                    column_list.erase(node);
                }
                // SAFETY: As above.
                unsafe {
                    row_list.erase(node);
                }
                // SAFETY: The item is no longer referenced by anything and came from this pool.
                unsafe {
                    pool.destroy_in_place(node);
                }
            },
        );

        // SAFETY: The item stays in the pool until it has been removed from the index.
        unsafe { self.index.insert(node) }.expect("the cell was checked to be vacant");

        ScopeGuard::into_inner(undo);

        None
    }

    /// The value at `(row, column)`, or `None` if the cell is vacant.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[must_use]
    pub fn get(&self, row: usize, column: usize) -> Option<&V> {
        self.assert_in_bounds(row, column);

        let node = self.index.get(&(row, column))?;

        // SAFETY: Indexed items are live and we hold a shared borrow of the array.
        Some(unsafe { &node.as_ref().value })
    }

    /// The value at `(row, column)` with exclusive access, or `None` if the cell is vacant.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[must_use]
    pub fn get_mut(&mut self, row: usize, column: usize) -> Option<&mut V> {
        self.assert_in_bounds(row, column);

        let node = self.index.get(&(row, column))?;

        // SAFETY: Indexed items are live and we hold an exclusive borrow of the array.
        Some(unsafe { &mut (*node.as_ptr()).value })
    }

    /// The value at `(row, column)`, or `default` if the cell is vacant.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[must_use]
    pub fn get_or<'a>(&'a self, row: usize, column: usize, default: &'a V) -> &'a V {
        self.get(row, column).unwrap_or(default)
    }

    /// Whether the cell at `(row, column)` holds a value.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    #[must_use]
    pub fn contains(&self, row: usize, column: usize) -> bool {
        self.get(row, column).is_some()
    }

    /// Removes the value at `(row, column)` and returns it, or returns `None` if the cell is
    /// vacant.
    ///
    /// # Panics
    ///
    /// Panics if the coordinates are out of bounds.
    pub fn remove(&mut self, row: usize, column: usize) -> Option<V> {
        self.assert_in_bounds(row, column);

        let node = self.index.get(&(row, column))?;

        // SAFETY: Indexed items are live items of this array.
        Some(unsafe { self.take_item(node) })
    }

    /// Iterates over the items of a row in the order they were inserted, as
    /// `(row, column, value)`.
    ///
    /// # Panics
    ///
    /// Panics if the row is out of bounds.
    pub fn row(&self, row: usize) -> LineIter<'_, V> {
        LineIter {
            inner: Line::Row(self.row_list(row).iter()),
        }
    }

    /// Iterates over the items of a column in the order they were inserted, as
    /// `(row, column, value)`.
    ///
    /// # Panics
    ///
    /// Panics if the column is out of bounds.
    pub fn column(&self, column: usize) -> LineIter<'_, V> {
        LineIter {
            inner: Line::Column(self.column_list(column).iter()),
        }
    }

    /// Iterates over the items of a row in the order they were inserted, as
    /// `(row, column, value)`, with exclusive access to the values.
    ///
    /// # Panics
    ///
    /// Panics if the row is out of bounds.
    pub fn row_mut(&mut self, row: usize) -> LineIterMut<'_, V> {
        LineIterMut {
            inner: Line::Row(self.row_list(row).iter()),
            _values: PhantomData,
        }
    }

    /// Iterates over the items of a column in the order they were inserted, as
    /// `(row, column, value)`, with exclusive access to the values.
    ///
    /// # Panics
    ///
    /// Panics if the column is out of bounds.
    pub fn column_mut(&mut self, column: usize) -> LineIterMut<'_, V> {
        LineIterMut {
            inner: Line::Column(self.column_list(column).iter()),
            _values: PhantomData,
        }
    }

    /// Iterates over all items, row by row, as `(row, column, value)`.
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &V)> {
        (0..self.rows.len()).flat_map(move |row| self.row(row))
    }

    /// The number of items in a row.
    ///
    /// # Panics
    ///
    /// Panics if the row is out of bounds.
    #[must_use]
    pub fn row_len(&self, row: usize) -> usize {
        self.row_list(row).len()
    }

    /// The number of items in a column.
    ///
    /// # Panics
    ///
    /// Panics if the column is out of bounds.
    #[must_use]
    pub fn column_len(&self, column: usize) -> usize {
        self.column_list(column).len()
    }

    /// Removes every item in a row.
    ///
    /// # Panics
    ///
    /// Panics if the row is out of bounds.
    pub fn clear_row(&mut self, row: usize) {
        while let Some(node) = self.row_list(row).back() {
            // SAFETY: Linked items are live items of this array.
            drop(unsafe { self.take_item(node) });
        }
    }

    /// Removes every item in a column.
    ///
    /// # Panics
    ///
    /// Panics if the column is out of bounds.
    pub fn clear_column(&mut self, column: usize) {
        while let Some(node) = self.column_list(column).back() {
            // SAFETY: Linked items are live items of this array.
            drop(unsafe { self.take_item(node) });
        }
    }

    /// Removes every item. The dimensions are unchanged.
    pub fn clear(&mut self) {
        for row in (0..self.rows.len()).rev() {
            self.clear_row(row);
        }
    }

    /// Unlinks, unindexes and destroys an item, returning its value.
    ///
    /// The array is consistent again before the caller gets to drop the value.
    ///
    /// # Safety
    ///
    /// `node` must be a live item of this array.
    unsafe fn take_item(&mut self, node: NonNull<Item<V>>) -> V {
        // SAFETY: Forwarding the caller's guarantees.
        let (row, column) = unsafe { node.as_ref() }.coordinates;

        let row_list = self
            .rows
            .get_mut(row)
            .expect("items are always within bounds");
        let column_list = self
            .columns
            .get_mut(column)
            .expect("items are always within bounds");

        // SAFETY: Every item is linked into the row and column lists named by its coordinates.
        unsafe {
            row_list.erase(node);
        }
        // SAFETY: As above.
        unsafe {
            column_list.erase(node);
        }

        // SAFETY: The item is live.
        let removed = unsafe { self.index.remove(node) };
        debug_assert!(removed, "item at ({row}, {column}) was not indexed");

        // SAFETY: The item came from our pool and nothing references it anymore.
        let Item { value, .. } = unsafe { self.pool.destroy(node) };

        value
    }

    fn assert_in_bounds(&self, row: usize, column: usize) {
        assert!(
            row < self.rows.len() && column < self.columns.len(),
            "coordinates ({row}, {column}) out of bounds for a Sparse2D of {} rows and {} columns",
            self.rows.len(),
            self.columns.len()
        );
    }

    fn row_list(&self, row: usize) -> &RowList<V> {
        self.rows.get(row).unwrap_or_else(|| {
            panic!(
                "row {row} out of bounds for a Sparse2D of {} rows",
                self.rows.len()
            )
        })
    }

    fn column_list(&self, column: usize) -> &ColumnList<V> {
        self.columns.get(column).unwrap_or_else(|| {
            panic!(
                "column {column} out of bounds for a Sparse2D of {} columns",
                self.columns.len()
            )
        })
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        self.pool.integrity_check();
        self.index.integrity_check();

        let mut linked_by_row: usize = 0;

        for (row, list) in self.rows.iter().enumerate() {
            list.integrity_check();

            for node in list {
                // SAFETY: Linked items are live.
                let coordinates = unsafe { node.as_ref() }.coordinates;
                assert_eq!(coordinates.0, row, "item linked into the wrong row");
            }

            linked_by_row = linked_by_row.wrapping_add(list.len());
        }

        let mut linked_by_column: usize = 0;

        for (column, list) in self.columns.iter().enumerate() {
            list.integrity_check();

            for node in list {
                // SAFETY: Linked items are live.
                let coordinates = unsafe { node.as_ref() }.coordinates;
                assert_eq!(coordinates.1, column, "item linked into the wrong column");
            }

            linked_by_column = linked_by_column.wrapping_add(list.len());
        }

        assert_eq!(linked_by_row, self.pool.len());
        assert_eq!(linked_by_column, self.pool.len());
        assert_eq!(self.index.len(), self.pool.len());
    }
}

fn resize_lines<V, A: ListAdapter<Item<V>>>(
    lines: &mut Vec<List<Item<V>, A>>,
    new_len: usize,
    axis: Axis,
) -> Result<()> {
    if let Some((index, _)) = lines
        .iter()
        .enumerate()
        .skip(new_len)
        .find(|(_, line)| !line.is_empty())
    {
        return Err(Error::LineNotEmpty { axis, index });
    }

    let old_len = lines.len();
    lines.resize_with(new_len, List::new);

    trace!(%axis, old_len, new_len, "sparse 2D lines resized");

    Ok(())
}

impl<V> Drop for Sparse2D<V> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<V: Clone> Clone for Sparse2D<V> {
    /// Clones by inserting every item into a new array, row by row.
    ///
    /// Within each row the order is preserved. Within each column the order follows the rows.
    fn clone(&self) -> Self {
        let mut clone = Self::new(self.rows.len(), self.columns.len());
        clone.pool.reserve(self.len());
        clone.index.reserve(self.len());

        for (row, column, value) in self.iter() {
            clone.insert(row, column, value.clone());
        }

        clone
    }
}

impl<V: fmt::Debug> fmt::Debug for Sparse2D<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Sparse2D")
            .field("rows", &self.rows.len())
            .field("columns", &self.columns.len())
            .field("items", &Items(self))
            .finish()
    }
}

struct Items<'a, V>(&'a Sparse2D<V>);

impl<V: fmt::Debug> fmt::Debug for Items<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map()
            .entries(self.0.iter().map(|(row, column, value)| ((row, column), value)))
            .finish()
    }
}

// SAFETY: The array exclusively owns its items and the raw pointers never escape it.
unsafe impl<V: Send> Send for Sparse2D<V> {}

// SAFETY: Shared access only ever hands out shared references to values.
unsafe impl<V: Sync> Sync for Sparse2D<V> {}

/// Iterator over the items of one row or one column of a [`Sparse2D`], in insertion order.
pub struct LineIter<'a, V> {
    inner: Line<'a, V>,
}

enum Line<'a, V> {
    Row(ListIter<'a, Item<V>, ByRow>),
    Column(ListIter<'a, Item<V>, ByColumn>),
}

impl<V> Line<'_, V> {
    fn next(&mut self) -> Option<NonNull<Item<V>>> {
        match self {
            Line::Row(iter) => iter.next(),
            Line::Column(iter) => iter.next(),
        }
    }

    fn next_back(&mut self) -> Option<NonNull<Item<V>>> {
        match self {
            Line::Row(iter) => iter.next_back(),
            Line::Column(iter) => iter.next_back(),
        }
    }

    fn axis(&self) -> Axis {
        match self {
            Line::Row(_) => Axis::Row,
            Line::Column(_) => Axis::Column,
        }
    }

    fn len(&self) -> usize {
        match self {
            Line::Row(iter) => iter.len(),
            Line::Column(iter) => iter.len(),
        }
    }
}

/// # Safety
///
/// `node` must be live for `'a` and must not be mutated during `'a`.
unsafe fn item_triple<'a, V>(node: NonNull<Item<V>>) -> (usize, usize, &'a V) {
    // SAFETY: Forwarding the caller's guarantees.
    let item = unsafe { node.as_ref() };

    (item.coordinates.0, item.coordinates.1, &item.value)
}

impl<'a, V> Iterator for LineIter<'a, V> {
    type Item = (usize, usize, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: The iterator borrows the array, so linked items stay live and unchanged.
        self.inner.next().map(|node| unsafe { item_triple(node) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.inner.len(), Some(self.inner.len()))
    }
}

impl<V> DoubleEndedIterator for LineIter<'_, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        // SAFETY: See next().
        self.inner.next_back().map(|node| unsafe { item_triple(node) })
    }
}

impl<V> ExactSizeIterator for LineIter<'_, V> {}

impl<V> FusedIterator for LineIter<'_, V> {}

impl<V> fmt::Debug for LineIter<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineIter")
            .field("axis", &self.inner.axis())
            .field("remaining", &self.inner.len())
            .finish()
    }
}

// SAFETY: The iterator only hands out shared references to values.
unsafe impl<V: Sync> Send for LineIter<'_, V> {}

// SAFETY: As above.
unsafe impl<V: Sync> Sync for LineIter<'_, V> {}

/// Iterator over the items of one row or one column of a [`Sparse2D`], in insertion order,
/// with exclusive access to the values.
///
/// The links of the other axis are never touched, so the values can be changed freely while
/// walking the line.
pub struct LineIterMut<'a, V> {
    inner: Line<'a, V>,

    _values: PhantomData<&'a mut V>,
}

/// # Safety
///
/// `node` must be a linked item of the exclusively borrowed array, and must be yielded at most
/// once.
unsafe fn item_triple_mut<'a, V>(node: NonNull<Item<V>>) -> (usize, usize, &'a mut V) {
    let item = node.as_ptr();

    // SAFETY: Coordinates of a linked item are never modified.
    let (row, column) = unsafe { (*item).coordinates };

    // SAFETY: The value is handed out only once and is a separate field from the links that the
    // iterator keeps reading.
    let value = unsafe { &mut (*item).value };

    (row, column, value)
}

impl<'a, V> Iterator for LineIterMut<'a, V> {
    type Item = (usize, usize, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: The list iterator yields every item at most once, across both ends.
        self.inner.next().map(|node| unsafe { item_triple_mut(node) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.inner.len(), Some(self.inner.len()))
    }
}

impl<V> DoubleEndedIterator for LineIterMut<'_, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        // SAFETY: See next().
        self.inner
            .next_back()
            .map(|node| unsafe { item_triple_mut(node) })
    }
}

impl<V> ExactSizeIterator for LineIterMut<'_, V> {}

impl<V> FusedIterator for LineIterMut<'_, V> {}

impl<V> fmt::Debug for LineIterMut<'_, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LineIterMut")
            .field("axis", &self.inner.axis())
            .field("remaining", &self.inner.len())
            .finish()
    }
}

// SAFETY: The iterator hands out exclusive references to values, like `&mut V`.
unsafe impl<V: Send> Send for LineIterMut<'_, V> {}

// SAFETY: As above.
unsafe impl<V: Sync> Sync for LineIterMut<'_, V> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::Cell;
    use std::rc::Rc;

    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;

    assert_impl_all!(Sparse2D<String>: Send, Sync, fmt::Debug, Clone);
    assert_impl_all!(LineIter<'static, String>: Send, Sync);
    assert_impl_all!(LineIterMut<'static, String>: Send, Sync);
    assert_not_impl_any!(LineIterMut<'static, Cell<u8>>: Sync);
    assert_not_impl_any!(Sparse2D<Rc<u8>>: Send, Sync);

    struct Counted {
        alive: Rc<Cell<usize>>,
    }

    impl Counted {
        fn new(alive: &Rc<Cell<usize>>) -> Self {
            alive.set(alive.get() + 1);

            Self {
                alive: Rc::clone(alive),
            }
        }
    }

    impl Drop for Counted {
        fn drop(&mut self) {
            self.alive.set(self.alive.get() - 1);
        }
    }

    fn columns_of_row<V>(matrix: &Sparse2D<V>, row: usize) -> Vec<usize> {
        matrix.row(row).map(|(_, column, _)| column).collect()
    }

    fn rows_of_column<V>(matrix: &Sparse2D<V>, column: usize) -> Vec<usize> {
        matrix.column(column).map(|(row, _, _)| row).collect()
    }

    #[test]
    fn new_is_empty_with_dimensions() {
        let matrix = Sparse2D::<u32>::new(3, 5);

        assert_eq!(matrix.row_count(), 3);
        assert_eq!(matrix.column_count(), 5);
        assert_eq!(matrix.len(), 0);
        assert!(matrix.is_empty());
        assert_eq!(matrix.row(2).count(), 0);
        matrix.integrity_check();
    }

    #[test]
    fn insert_get_and_overwrite() {
        let mut matrix = Sparse2D::new(4, 4);

        assert_eq!(matrix.insert(1, 2, "a"), None);
        assert_eq!(matrix.insert(3, 0, "b"), None);

        assert_eq!(matrix.get(1, 2), Some(&"a"));
        assert_eq!(matrix.get(3, 0), Some(&"b"));
        assert_eq!(matrix.get(2, 1), None);
        assert!(matrix.contains(1, 2));
        assert!(!matrix.contains(2, 1));

        assert_eq!(matrix.insert(1, 2, "c"), Some("a"));
        assert_eq!(matrix.get(1, 2), Some(&"c"));
        assert_eq!(matrix.len(), 2);

        *matrix.get_mut(3, 0).unwrap() = "d";
        assert_eq!(matrix.get(3, 0), Some(&"d"));
        assert_eq!(matrix.get_mut(0, 0), None);

        matrix.integrity_check();
    }

    #[test]
    fn row_mut_and_column_mut_modify_values_in_order() {
        let mut matrix = Sparse2D::new(3, 3);

        matrix.insert(1, 2, 10);
        matrix.insert(0, 2, 20);
        matrix.insert(1, 0, 30);
        matrix.insert(2, 2, 40);

        let visited = matrix
            .row_mut(1)
            .map(|(row, column, value)| {
                *value += 1;
                (row, column)
            })
            .collect::<Vec<_>>();
        assert_eq!(visited, vec![(1, 2), (1, 0)]);

        for (_, _, value) in matrix.column_mut(2).rev() {
            *value *= 2;
        }

        assert_eq!(
            matrix.iter().collect::<Vec<_>>(),
            vec![(0, 2, &40), (1, 2, &22), (1, 0, &31), (2, 2, &80)]
        );
        assert_eq!(matrix.column_mut(1).len(), 0);

        // Both ends can be used on the same iterator without handing out a value twice.
        let mut line = matrix.column_mut(2);
        let (_, _, first) = line.next().unwrap();
        let (_, _, last) = line.next_back().unwrap();
        mem::swap(first, last);
        assert_eq!(line.len(), 1);

        assert_eq!(
            matrix.column(2).collect::<Vec<_>>(),
            vec![(1, 2, &80), (0, 2, &40), (2, 2, &22)]
        );

        matrix.integrity_check();
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_column_mut_panics() {
        let mut matrix = Sparse2D::<u8>::new(2, 2);
        _ = matrix.column_mut(2);
    }

    #[test]
    fn get_or_falls_back_to_default() {
        let mut matrix = Sparse2D::new(2, 2);
        matrix.insert(0, 1, 5);

        assert_eq!(*matrix.get_or(0, 1, &0), 5);
        assert_eq!(*matrix.get_or(1, 1, &0), 0);
    }

    #[test]
    fn lines_iterate_in_insertion_order() {
        let mut matrix = Sparse2D::new(3, 3);

        matrix.insert(1, 2, 'a');
        matrix.insert(0, 0, 'b');
        matrix.insert(1, 0, 'c');
        matrix.insert(2, 0, 'd');
        matrix.insert(1, 1, 'e');

        assert_eq!(columns_of_row(&matrix, 1), vec![2, 0, 1]);
        assert_eq!(rows_of_column(&matrix, 0), vec![0, 1, 2]);
        assert_eq!(
            matrix.row(1).map(|(_, _, value)| *value).collect::<String>(),
            "ace"
        );
        assert_eq!(
            matrix.column(0).rev().collect::<Vec<_>>(),
            vec![(2, 0, &'d'), (1, 0, &'c'), (0, 0, &'b')]
        );

        assert_eq!(matrix.row_len(1), 3);
        assert_eq!(matrix.column_len(0), 3);
        assert_eq!(matrix.column_len(2), 1);
        assert_eq!(matrix.row(1).len(), 3);

        // Overwriting keeps the position.
        matrix.insert(1, 2, 'z');
        assert_eq!(columns_of_row(&matrix, 1), vec![2, 0, 1]);

        matrix.integrity_check();
    }

    #[test]
    fn remove_unlinks_from_both_lines() {
        let mut matrix = Sparse2D::new(3, 3);

        matrix.insert(0, 0, 1);
        matrix.insert(0, 1, 2);
        matrix.insert(1, 1, 3);

        assert_eq!(matrix.remove(0, 1), Some(2));
        assert_eq!(matrix.remove(0, 1), None);

        assert_eq!(columns_of_row(&matrix, 0), vec![0]);
        assert_eq!(rows_of_column(&matrix, 1), vec![1]);
        assert_eq!(matrix.len(), 2);
        matrix.integrity_check();

        // The cell can be reused.
        matrix.insert(0, 1, 4);
        assert_eq!(columns_of_row(&matrix, 0), vec![0, 1]);
        matrix.integrity_check();
    }

    #[test]
    fn clear_row_and_column() {
        let mut matrix = Sparse2D::new(3, 3);

        for row in 0..3 {
            for column in 0..3 {
                matrix.insert(row, column, row * 10 + column);
            }
        }

        matrix.clear_row(1);

        assert_eq!(matrix.len(), 6);
        assert_eq!(matrix.row_len(1), 0);
        assert_eq!(rows_of_column(&matrix, 2), vec![0, 2]);
        matrix.integrity_check();

        matrix.clear_column(0);

        assert_eq!(matrix.len(), 4);
        assert_eq!(columns_of_row(&matrix, 2), vec![1, 2]);
        assert_eq!(matrix.get(2, 2), Some(&22));
        matrix.integrity_check();

        matrix.clear();

        assert!(matrix.is_empty());
        assert_eq!(matrix.row_count(), 3);
        assert_eq!(matrix.get(2, 2), None);
        matrix.integrity_check();
    }

    #[test]
    fn resize_grows_and_shrinks_empty_lines() {
        let mut matrix = Sparse2D::new(2, 2);
        matrix.insert(1, 1, ());

        matrix.resize_rows(5).unwrap();
        matrix.resize_columns(4).unwrap();

        assert_eq!(matrix.row_count(), 5);
        assert_eq!(matrix.column_count(), 4);

        matrix.insert(4, 3, ());
        assert_eq!(matrix.len(), 2);

        matrix.remove(4, 3);
        matrix.resize_rows(2).unwrap();
        matrix.resize_columns(2).unwrap();

        assert_eq!(matrix.row_count(), 2);
        assert_eq!(matrix.column_count(), 2);
        assert!(matrix.contains(1, 1));
        matrix.integrity_check();
    }

    #[test]
    fn shrinking_non_empty_line_is_rejected() {
        let mut matrix = Sparse2D::new(4, 4);
        matrix.insert(2, 3, 'x');

        assert_eq!(
            matrix.resize_rows(1),
            Err(Error::LineNotEmpty {
                axis: Axis::Row,
                index: 2
            })
        );
        assert_eq!(
            matrix.resize_columns(3),
            Err(Error::LineNotEmpty {
                axis: Axis::Column,
                index: 3
            })
        );

        // Nothing changed.
        assert_eq!(matrix.row_count(), 4);
        assert_eq!(matrix.column_count(), 4);
        assert_eq!(matrix.get(2, 3), Some(&'x'));

        // Shrinking down to the occupied line is fine.
        matrix.resize_rows(3).unwrap();
        assert_eq!(matrix.row_count(), 3);
        matrix.integrity_check();
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_insert_panics() {
        let mut matrix = Sparse2D::new(2, 2);
        matrix.insert(2, 0, 1);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_get_panics() {
        let matrix = Sparse2D::<u8>::new(2, 2);
        _ = matrix.get(0, 2);
    }

    #[test]
    #[should_panic]
    fn out_of_bounds_row_panics() {
        let matrix = Sparse2D::<u8>::new(2, 2);
        _ = matrix.row(7);
    }

    #[test]
    fn values_are_dropped() {
        let alive = Rc::new(Cell::new(0));
        let mut matrix = Sparse2D::new(10, 10);

        for i in 0..10 {
            matrix.insert(i, 9 - i, Counted::new(&alive));
        }

        matrix.insert(0, 9, Counted::new(&alive));
        assert_eq!(alive.get(), 10);

        drop(matrix.remove(5, 4));
        assert_eq!(alive.get(), 9);

        matrix.clear_row(0);
        assert_eq!(alive.get(), 8);

        drop(matrix);
        assert_eq!(alive.get(), 0);
    }

    #[test]
    fn clone_is_independent() {
        let mut matrix = Sparse2D::new(3, 3);

        matrix.insert(2, 0, "x".to_string());
        matrix.insert(0, 1, "y".to_string());

        let mut clone = matrix.clone();

        assert_eq!(clone.get(2, 0), Some(&"x".to_string()));
        assert_eq!(clone.get(0, 1), Some(&"y".to_string()));
        assert_eq!(clone.len(), 2);
        clone.integrity_check();

        clone.remove(2, 0);
        assert!(matrix.contains(2, 0));
    }

    #[test]
    fn iter_and_debug_walk_rows_in_order() {
        let mut matrix = Sparse2D::new(2, 3);

        matrix.insert(1, 0, 'b');
        matrix.insert(0, 2, 'a');

        assert_eq!(
            matrix.iter().collect::<Vec<_>>(),
            vec![(0, 2, &'a'), (1, 0, &'b')]
        );
        assert_eq!(
            format!("{matrix:?}"),
            "Sparse2D { rows: 2, columns: 3, items: {(0, 2): 'a', (1, 0): 'b'} }"
        );
    }

    #[test]
    fn many_items_survive_index_growth() {
        let mut matrix = Sparse2D::new(100, 100);

        for row in 0..100 {
            for column in (row % 7..100).step_by(7) {
                matrix.insert(row, column, row * 1000 + column);
            }
        }

        for row in 0..100 {
            for column in 0..100 {
                let expected = (column % 7 == row % 7).then_some(row * 1000 + column);
                assert_eq!(matrix.get(row, column).copied(), expected);
            }
        }

        matrix.integrity_check();
    }
}
