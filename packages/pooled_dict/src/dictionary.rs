use std::borrow::Borrow;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::mem;
use std::ops::Index;
use std::ptr::NonNull;

use scopeguard::ScopeGuard;

use crate::{
    DefaultKeyHasher, DictionaryBuilder, Error, HashIndex, IndexAdapter, KeyHasher, Links, List,
    ListAdapter, ListIter, ObjectPool, Result,
};

/// The record stored in the pool for every key-value pair.
struct Entry<K, V> {
    key: K,
    value: V,
    links: Links<Entry<K, V>>,
}

enum InsertionOrder {}

// SAFETY: Always points at the `links` field.
unsafe impl<K, V> ListAdapter<Entry<K, V>> for InsertionOrder {
    unsafe fn links(node: NonNull<Entry<K, V>>) -> NonNull<Links<Entry<K, V>>> {
        // SAFETY: The caller guarantees the node is live.
        let links = unsafe { &raw mut (*node.as_ptr()).links };

        // SAFETY: A field of a non-null node is itself non-null.
        unsafe { NonNull::new_unchecked(links) }
    }
}

enum ByKey {}

// SAFETY: Always points at the `key` field, which the dictionary never hands out mutably.
unsafe impl<K, V> IndexAdapter<Entry<K, V>> for ByKey {
    type Key = K;

    unsafe fn key<'a>(node: NonNull<Entry<K, V>>) -> &'a K {
        // SAFETY: The caller guarantees the node is live.
        unsafe { &(*node.as_ptr()).key }
    }
}

type EntryList<K, V> = List<Entry<K, V>, InsertionOrder>;

/// An associative container that remembers the order in which keys were added.
///
/// Every entry lives in a cell of an [`ObjectPool`] and is reachable two ways: through a
/// [`HashIndex`] for lookup by key and through an intrusive [`List`] that records insertion
/// order. Iteration always follows insertion order, and erasing an entry unlinks it in O(1)
/// without disturbing the order of the others.
///
/// Entries never move once added, so growing the dictionary never invalidates the internal
/// links. The pool, the index and the list are kept consistent even if a user-supplied hasher,
/// key comparison or destructor panics.
///
/// # Examples
///
/// ```
/// use pooled_dict::Dictionary;
///
/// let mut dict = Dictionary::new();
///
/// dict.add("a", 1).unwrap();
/// dict.add("b", 2).unwrap();
/// dict.add("c", 3).unwrap();
///
/// assert_eq!(dict.erase("b"), Ok(2));
///
/// let pairs = dict.iter().collect::<Vec<_>>();
/// assert_eq!(pairs, vec![(&"a", &1), (&"c", &3)]);
/// ```
///
/// Keys are hashed with [`DefaultKeyHasher`] unless you configure another hasher via
/// [`builder()`][Self::builder].
pub struct Dictionary<K, V, H = DefaultKeyHasher> {
    pool: ObjectPool<Entry<K, V>>,
    index: HashIndex<Entry<K, V>, ByKey, H>,
    order: EntryList<K, V>,
}

impl<K, V> Dictionary<K, V> {
    /// Creates an empty dictionary that uses [`DefaultKeyHasher`].
    ///
    /// No memory is allocated until the first entry is added.
    #[must_use]
    pub fn new() -> Self {
        Self::with_hasher(DefaultKeyHasher)
    }

    /// Creates an empty dictionary with room for `capacity` entries.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        Self::with_capacity_and_hasher(capacity, DefaultKeyHasher)
    }

    /// Starts configuring a dictionary with a custom hasher or initial capacity.
    ///
    /// # Examples
    ///
    /// ```
    /// use pooled_dict::Dictionary;
    ///
    /// let dict = Dictionary::<u32, String>::builder().capacity(100).build();
    /// assert!(dict.capacity() >= 100);
    /// ```
    pub fn builder() -> DictionaryBuilder<K, V> {
        DictionaryBuilder::new()
    }
}

impl<K, V, H> Dictionary<K, V, H> {
    /// Creates an empty dictionary that hashes keys with `hasher`.
    #[must_use]
    pub fn with_hasher(hasher: H) -> Self {
        Self {
            pool: ObjectPool::new(),
            index: HashIndex::new(hasher),
            order: List::new(),
        }
    }

    /// Creates an empty dictionary that hashes keys with `hasher` and has room for `capacity`
    /// entries.
    #[must_use]
    pub fn with_capacity_and_hasher(capacity: usize, hasher: H) -> Self {
        Self {
            pool: ObjectPool::with_capacity(capacity),
            index: HashIndex::with_capacity(capacity, hasher),
            order: List::new(),
        }
    }

    /// The hasher used to place keys in the index.
    #[must_use]
    pub fn hasher(&self) -> &H {
        self.index.hasher()
    }

    /// The number of entries in the dictionary.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Whether the dictionary has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// The number of entries the dictionary can hold before its storage has to grow.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.pool.capacity()
    }

    /// Ensures that `additional` more entries can be added without growing the entry storage or
    /// rebuilding the index.
    pub fn reserve(&mut self, additional: usize) {
        self.pool.reserve(additional);
        self.index.reserve(additional);
    }

    /// Adds a new entry at the end of the insertion order and returns a reference to its value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicateKey`] if the dictionary already contains an equal key. The
    /// dictionary is unchanged and the rejected key and value are dropped.
    ///
    /// # Panics
    ///
    /// If the hasher or the key's equality panics, the dictionary is left unchanged and the
    /// panic continues.
    pub fn add(&mut self, key: K, value: V) -> Result<&mut V>
    where
        K: Eq,
        H: KeyHasher<K>,
    {
        // Rejected before the pool or the index can grow.
        if self.index.find(&key).is_some() {
            return Err(Error::DuplicateKey);
        }

        let node = self.pool.create(Entry {
            key,
            value,
            links: Links::new(),
        });

        // Until the entry is indexed, any failure must return it to the pool.
        let pool = scopeguard::guard(&mut self.pool, |pool| {
            // SAFETY: The entry was created above and nothing else refers to it yet.
            unsafe {
                pool.destroy_in_place(node);
            }
        });

        // SAFETY: The entry stays in the pool until it has been removed from the index.
        unsafe { self.index.insert(node) }?;

        ScopeGuard::into_inner(pool);

        // SAFETY: The entry is live and has never been linked.
        unsafe {
            self.order.push_back(node);
        }

        // SAFETY: The entry is live and we hold an exclusive borrow of the dictionary, which
        // owns it.
        Ok(unsafe { &mut (*node.as_ptr()).value })
    }

    /// Removes the entry with a key equal to `key` and returns its value.
    ///
    /// The relative order of the remaining entries is preserved.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if there is no such entry.
    pub fn erase<Q>(&mut self, key: &Q) -> Result<V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        H: KeyHasher<Q>,
    {
        let (position, node) = self.index.find(key).ok_or(Error::KeyNotFound)?;

        self.index.remove_at(position);

        // SAFETY: Every indexed entry is also linked into the order list.
        unsafe {
            self.order.erase(node);
        }

        // SAFETY: The entry came from our pool and is no longer referenced by the index or the
        // list.
        let Entry { value, .. } = unsafe { self.pool.destroy(node) };

        Ok(value)
    }

    /// Returns a reference to the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if there is no such entry.
    pub fn get<Q>(&self, key: &Q) -> Result<&V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        H: KeyHasher<Q>,
    {
        self.get_key_value(key).map(|(_, value)| value)
    }

    /// Returns an exclusive reference to the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if there is no such entry.
    pub fn get_mut<Q>(&mut self, key: &Q) -> Result<&mut V>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        H: KeyHasher<Q>,
    {
        let node = self.index.get(key).ok_or(Error::KeyNotFound)?;

        // SAFETY: Indexed entries are live and we hold an exclusive borrow of the dictionary.
        Ok(unsafe { &mut (*node.as_ptr()).value })
    }

    /// Returns the stored key equal to `key` together with its value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::KeyNotFound`] if there is no such entry.
    pub fn get_key_value<Q>(&self, key: &Q) -> Result<(&K, &V)>
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        H: KeyHasher<Q>,
    {
        let node = self.index.get(key).ok_or(Error::KeyNotFound)?;

        // SAFETY: Indexed entries are live and we hold a shared borrow of the dictionary.
        Ok(unsafe { entry_pair(node) })
    }

    /// Whether the dictionary contains an entry with a key equal to `key`.
    #[must_use]
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: ?Sized + Eq,
        H: KeyHasher<Q>,
    {
        self.index.get(key).is_some()
    }

    /// The oldest entry, or `None` if the dictionary is empty.
    #[must_use]
    pub fn first(&self) -> Option<(&K, &V)> {
        // SAFETY: Linked entries are live and we hold a shared borrow of the dictionary.
        self.order.front().map(|node| unsafe { entry_pair(node) })
    }

    /// The newest entry, or `None` if the dictionary is empty.
    #[must_use]
    pub fn last(&self) -> Option<(&K, &V)> {
        // SAFETY: Linked entries are live and we hold a shared borrow of the dictionary.
        self.order.back().map(|node| unsafe { entry_pair(node) })
    }

    /// Removes every entry. The storage is kept for reuse.
    ///
    /// Entries are dropped in insertion order. If dropping one of them panics, the rest are still
    /// dropped and the dictionary is empty when the panic reaches the caller.
    pub fn clear(&mut self) {
        self.index.clear();
        destroy_all(&mut self.order, &mut self.pool);
    }

    /// Iterates over the entries in insertion order.
    pub fn iter(&self) -> Iter<'_, K, V> {
        Iter {
            inner: self.order.iter(),
        }
    }

    /// Iterates over the entries in insertion order, with exclusive access to the values.
    pub fn iter_mut(&mut self) -> IterMut<'_, K, V> {
        IterMut {
            inner: self.order.iter(),
            _values: PhantomData,
        }
    }

    /// Iterates over the keys in insertion order.
    pub fn keys(&self) -> Keys<'_, K, V> {
        Keys { inner: self.iter() }
    }

    /// Iterates over the values in insertion order.
    pub fn values(&self) -> Values<'_, K, V> {
        Values { inner: self.iter() }
    }

    /// Iterates over the values in insertion order, with exclusive access.
    pub fn values_mut(&mut self) -> ValuesMut<'_, K, V> {
        ValuesMut {
            inner: self.iter_mut(),
        }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        self.pool.integrity_check();
        self.index.integrity_check();
        self.order.integrity_check();

        assert_eq!(
            self.pool.len(),
            self.order.len(),
            "every pooled entry must be linked exactly once"
        );
        assert_eq!(
            self.index.len(),
            self.order.len(),
            "every linked entry must be indexed exactly once"
        );
    }
}

/// # Safety
///
/// `node` must be live for `'a` and must not be mutated during `'a`.
unsafe fn entry_pair<'a, K, V>(node: NonNull<Entry<K, V>>) -> (&'a K, &'a V) {
    // SAFETY: Forwarding the caller's guarantees.
    let entry = unsafe { node.as_ref() };

    (&entry.key, &entry.value)
}

/// Destroys every entry in `order`, front to back, after the caller has already emptied the
/// index.
///
/// If dropping an entry panics, the remaining entries are destroyed while the panic unwinds.
fn destroy_all<K, V>(order: &mut EntryList<K, V>, pool: &mut ObjectPool<Entry<K, V>>) {
    while let Some(node) = order.pop_front() {
        // SAFETY: Every linked entry lives in the pool and is no longer referenced by the index
        // or, now that it has been popped, the list.
        let entry = unsafe { pool.destroy(node) };

        let rest = scopeguard::guard((&mut *order, &mut *pool), |(order, pool)| {
            destroy_all(order, pool);
        });

        drop(entry);

        ScopeGuard::into_inner(rest);
    }
}

impl<K, V, H> Drop for Dictionary<K, V, H> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<K, V, H: Default> Default for Dictionary<K, V, H> {
    fn default() -> Self {
        Self::with_hasher(H::default())
    }
}

impl<K: fmt::Debug, V: fmt::Debug, H> fmt::Debug for Dictionary<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.iter()).finish()
    }
}

/// Two dictionaries are equal if they hold equal entries in the same order.
impl<K: PartialEq, V: PartialEq, H> PartialEq for Dictionary<K, V, H> {
    fn eq(&self, other: &Self) -> bool {
        self.len() == other.len() && self.iter().eq(other.iter())
    }
}

impl<K: Eq, V: Eq, H> Eq for Dictionary<K, V, H> {}

/// Clones by adding every entry to a new dictionary in insertion order.
impl<K, V, H> Clone for Dictionary<K, V, H>
where
    K: Clone + Eq,
    V: Clone,
    H: Clone + KeyHasher<K>,
{
    fn clone(&self) -> Self {
        let mut clone = Self::with_capacity_and_hasher(self.len(), self.hasher().clone());

        for (key, value) in self {
            clone
                .add(key.clone(), value.clone())
                .expect("keys of the original dictionary are unique");
        }

        clone
    }
}

/// Adds entries in iteration order. If a key is already present, its value is replaced and the
/// entry keeps its original position.
impl<K, V, H> Extend<(K, V)> for Dictionary<K, V, H>
where
    K: Eq,
    H: KeyHasher<K>,
{
    fn extend<I: IntoIterator<Item = (K, V)>>(&mut self, iter: I) {
        for (key, value) in iter {
            if let Ok(existing) = self.get_mut(&key) {
                *existing = value;
            } else {
                self.add(key, value)
                    .expect("we just checked that the key is not present");
            }
        }
    }
}

impl<K, V, H> FromIterator<(K, V)> for Dictionary<K, V, H>
where
    K: Eq,
    H: Default + KeyHasher<K>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        let mut dict = Self::default();
        dict.extend(iter);
        dict
    }
}

impl<K, V, H, Q> Index<&Q> for Dictionary<K, V, H>
where
    K: Borrow<Q>,
    Q: ?Sized + Eq,
    H: KeyHasher<Q>,
{
    type Output = V;

    /// # Panics
    ///
    /// Panics if the key is not present.
    fn index(&self, key: &Q) -> &V {
        self.get(key).expect("key not found in dictionary")
    }
}

// SAFETY: The dictionary exclusively owns its entries and the raw pointers never escape it, so
// it can move to another thread whenever the keys, values and hasher can.
unsafe impl<K: Send, V: Send, H: Send> Send for Dictionary<K, V, H> {}

// SAFETY: Shared access only ever hands out shared references to keys, values and the hasher.
unsafe impl<K: Sync, V: Sync, H: Sync> Sync for Dictionary<K, V, H> {}

impl<'a, K, V, H> IntoIterator for &'a Dictionary<K, V, H> {
    type Item = (&'a K, &'a V);
    type IntoIter = Iter<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

impl<'a, K, V, H> IntoIterator for &'a mut Dictionary<K, V, H> {
    type Item = (&'a K, &'a mut V);
    type IntoIter = IterMut<'a, K, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter_mut()
    }
}

impl<K, V, H> IntoIterator for Dictionary<K, V, H> {
    type Item = (K, V);
    type IntoIter = IntoIter<K, V>;

    fn into_iter(mut self) -> Self::IntoIter {
        // The iterator takes over the entries and releases them without hashing, so the index
        // is simply forgotten.
        self.index.clear();

        IntoIter {
            pool: mem::take(&mut self.pool),
            order: mem::take(&mut self.order),
        }
    }
}

/// Iterator over the entries of a [`Dictionary`] in insertion order.
pub struct Iter<'a, K, V> {
    inner: ListIter<'a, Entry<K, V>, InsertionOrder>,
}

impl<'a, K, V> Iterator for Iter<'a, K, V> {
    type Item = (&'a K, &'a V);

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: The iterator borrows the dictionary, so linked entries stay live and unchanged.
        self.inner.next().map(|node| unsafe { entry_pair(node) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Iter<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        // SAFETY: See next().
        self.inner.next_back().map(|node| unsafe { entry_pair(node) })
    }
}

impl<K, V> ExactSizeIterator for Iter<'_, K, V> {}

impl<K, V> FusedIterator for Iter<'_, K, V> {}

impl<K, V> Clone for Iter<'_, K, V> {
    fn clone(&self) -> Self {
        Self {
            inner: self.inner.clone(),
        }
    }
}

impl<K, V> fmt::Debug for Iter<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Iter")
            .field("remaining", &self.inner.len())
            .finish()
    }
}

// SAFETY: The iterator only hands out shared references to keys and values.
unsafe impl<K: Sync, V: Sync> Send for Iter<'_, K, V> {}

// SAFETY: As above.
unsafe impl<K: Sync, V: Sync> Sync for Iter<'_, K, V> {}

/// Iterator over the entries of a [`Dictionary`] in insertion order, with exclusive access to
/// the values.
pub struct IterMut<'a, K, V> {
    inner: ListIter<'a, Entry<K, V>, InsertionOrder>,

    _values: PhantomData<&'a mut V>,
}

impl<K, V> IterMut<'_, K, V> {
    /// # Safety
    ///
    /// `node` must be a linked entry of the exclusively borrowed dictionary, and must be yielded
    /// at most once.
    unsafe fn pair<'a>(node: NonNull<Entry<K, V>>) -> (&'a K, &'a mut V) {
        let entry = node.as_ptr();

        // SAFETY: The key is never mutated while the dictionary is borrowed.
        let key = unsafe { &(*entry).key };

        // SAFETY: The value is a separate field from the key and is handed out only once.
        let value = unsafe { &mut (*entry).value };

        (key, value)
    }
}

impl<'a, K, V> Iterator for IterMut<'a, K, V> {
    type Item = (&'a K, &'a mut V);

    fn next(&mut self) -> Option<Self::Item> {
        // SAFETY: The list iterator yields every entry at most once, across both ends.
        self.inner.next().map(|node| unsafe { Self::pair(node) })
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for IterMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        // SAFETY: See next().
        self.inner.next_back().map(|node| unsafe { Self::pair(node) })
    }
}

impl<K, V> ExactSizeIterator for IterMut<'_, K, V> {}

impl<K, V> FusedIterator for IterMut<'_, K, V> {}

impl<K, V> fmt::Debug for IterMut<'_, K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IterMut")
            .field("remaining", &self.inner.len())
            .finish()
    }
}

// SAFETY: The iterator hands out shared references to keys and exclusive references to values.
unsafe impl<K: Sync, V: Send> Send for IterMut<'_, K, V> {}

// SAFETY: Sharing the iterator itself gives no access to the entries.
unsafe impl<K: Sync, V: Sync> Sync for IterMut<'_, K, V> {}

/// Iterator over the keys of a [`Dictionary`] in insertion order.
#[derive(Clone, Debug)]
pub struct Keys<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Keys<'a, K, V> {
    type Item = &'a K;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(key, _)| key)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Keys<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(key, _)| key)
    }
}

impl<K, V> ExactSizeIterator for Keys<'_, K, V> {}

impl<K, V> FusedIterator for Keys<'_, K, V> {}

/// Iterator over the values of a [`Dictionary`] in insertion order.
#[derive(Clone, Debug)]
pub struct Values<'a, K, V> {
    inner: Iter<'a, K, V>,
}

impl<'a, K, V> Iterator for Values<'a, K, V> {
    type Item = &'a V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for Values<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, value)| value)
    }
}

impl<K, V> ExactSizeIterator for Values<'_, K, V> {}

impl<K, V> FusedIterator for Values<'_, K, V> {}

/// Iterator over the values of a [`Dictionary`] in insertion order, with exclusive access.
#[derive(Debug)]
pub struct ValuesMut<'a, K, V> {
    inner: IterMut<'a, K, V>,
}

impl<'a, K, V> Iterator for ValuesMut<'a, K, V> {
    type Item = &'a mut V;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|(_, value)| value)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.inner.size_hint()
    }
}

impl<K, V> DoubleEndedIterator for ValuesMut<'_, K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        self.inner.next_back().map(|(_, value)| value)
    }
}

impl<K, V> ExactSizeIterator for ValuesMut<'_, K, V> {}

impl<K, V> FusedIterator for ValuesMut<'_, K, V> {}

/// Consuming iterator over the entries of a [`Dictionary`] in insertion order.
///
/// Entries that are not consumed are dropped together with the iterator.
pub struct IntoIter<K, V> {
    pool: ObjectPool<Entry<K, V>>,
    order: EntryList<K, V>,
}

impl<K, V> IntoIter<K, V> {
    fn take_entry(&mut self, node: NonNull<Entry<K, V>>) -> (K, V) {
        // SAFETY: The node was just unlinked from our list, the index that referenced it is
        // gone and the entry lives in our pool.
        let Entry { key, value, .. } = unsafe { self.pool.destroy(node) };

        (key, value)
    }
}

impl<K, V> Iterator for IntoIter<K, V> {
    type Item = (K, V);

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.order.pop_front()?;
        Some(self.take_entry(node))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.order.len(), Some(self.order.len()))
    }
}

impl<K, V> DoubleEndedIterator for IntoIter<K, V> {
    fn next_back(&mut self) -> Option<Self::Item> {
        let node = self.order.pop_back()?;
        Some(self.take_entry(node))
    }
}

impl<K, V> ExactSizeIterator for IntoIter<K, V> {}

impl<K, V> FusedIterator for IntoIter<K, V> {}

impl<K, V> Drop for IntoIter<K, V> {
    fn drop(&mut self) {
        destroy_all(&mut self.order, &mut self.pool);
    }
}

impl<K, V> fmt::Debug for IntoIter<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IntoIter")
            .field("remaining", &self.order.len())
            .finish()
    }
}

// SAFETY: The iterator exclusively owns the remaining entries.
unsafe impl<K: Send, V: Send> Send for IntoIter<K, V> {}

// SAFETY: Shared access to the iterator gives no access to the entries.
unsafe impl<K: Sync, V: Sync> Sync for IntoIter<K, V> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::panic::{AssertUnwindSafe, catch_unwind};
    use std::rc::Rc;
    use std::thread;

    use foldhash::fast::RandomState;
    use static_assertions::{assert_impl_all, assert_not_impl_any};

    use super::*;
    use crate::BuildKeyHasher;

    assert_impl_all!(Dictionary<String, u32>: Send, Sync, Default, fmt::Debug);
    assert_impl_all!(Iter<'static, String, u32>: Send, Sync);
    assert_impl_all!(IntoIter<String, u32>: Send);
    assert_not_impl_any!(Dictionary<Rc<u32>, u32>: Send, Sync);
    assert_not_impl_any!(Dictionary<u32, Cell<u32>>: Sync);

    /// Hashes every key the same way so that all of them share one probe sequence.
    #[derive(Clone, Debug, Default)]
    struct CollidingHasher;

    impl KeyHasher<u32> for CollidingHasher {
        fn hash_key(&self, _key: &u32) -> u64 {
            0
        }
    }

    #[derive(Clone, Debug, Default)]
    struct PanickingHasher;

    impl KeyHasher<u32> for PanickingHasher {
        fn hash_key(&self, key: &u32) -> u64 {
            assert_ne!(*key, 13, "refusing to hash 13");
            u64::from(*key)
        }
    }

    /// Records the order in which values are dropped.
    struct DropRecorder {
        id: u32,
        log: Rc<RefCell<Vec<u32>>>,
    }

    impl Drop for DropRecorder {
        fn drop(&mut self) {
            self.log.borrow_mut().push(self.id);
        }
    }

    struct PanicOnDrop;

    impl Drop for PanicOnDrop {
        fn drop(&mut self) {
            panic!("dropping this value panics");
        }
    }

    fn keys_of<H>(dict: &Dictionary<u32, u32, H>) -> Vec<u32> {
        dict.keys().copied().collect()
    }

    #[test]
    fn iteration_follows_insertion_order() {
        let mut dict = Dictionary::new();

        dict.add("a", 1).unwrap();
        dict.add("b", 2).unwrap();
        dict.add("c", 3).unwrap();

        let pairs = dict.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>();
        assert_eq!(pairs, vec![("a", 1), ("b", 2), ("c", 3)]);

        dict.integrity_check();
    }

    #[test]
    fn erased_key_is_gone() {
        let mut dict = Dictionary::new();

        dict.add("a", 1).unwrap();
        assert_eq!(dict.erase("a"), Ok(1));

        assert!(!dict.contains("a"));
        assert_eq!(dict.len(), 0);
        assert!(dict.is_empty());
        dict.integrity_check();
    }

    #[test]
    fn erasing_even_keys_keeps_odd_keys_in_order() {
        let mut dict = Dictionary::new();

        for key in 0..1000_u32 {
            dict.add(key, key * 10).unwrap();
        }

        for key in (0..1000_u32).step_by(2) {
            assert_eq!(dict.erase(&key), Ok(key * 10));
        }

        assert_eq!(dict.len(), 500);
        assert_eq!(keys_of(&dict), (1..1000).step_by(2).collect::<Vec<_>>());
        dict.integrity_check();
    }

    #[test]
    fn key_probing_into_tombstone_is_found() {
        let mut dict = Dictionary::new();

        dict.add(3_u32, "three").unwrap();
        assert_eq!(dict.index.table_len(), 8);
        assert_eq!(dict.erase(&3), Ok("three"));

        // 11 & 7 == 3, so the new key starts probing at the tombstone left by 3.
        dict.add(11, "eleven").unwrap();

        assert_eq!(dict.get(&11), Ok(&"eleven"));
        assert_eq!(dict.get(&3), Err(Error::KeyNotFound));
        dict.integrity_check();
    }

    #[test]
    fn entries_survive_index_resizes() {
        let mut dict = Dictionary::new();
        let mut resizes = 0;
        let mut table_len = dict.index.table_len();

        for key in 0..200_u32 {
            dict.add(key, key.wrapping_mul(7)).unwrap();

            if dict.index.table_len() != table_len {
                table_len = dict.index.table_len();
                resizes += 1;

                for earlier in 0..=key {
                    assert_eq!(dict.get(&earlier), Ok(&earlier.wrapping_mul(7)));
                }
            }
        }

        assert!(resizes >= 3);
        dict.integrity_check();
    }

    #[test]
    fn duplicate_add_is_rejected_and_changes_nothing() {
        let mut dict = Dictionary::new();

        dict.add("a".to_string(), 1).unwrap();
        dict.add("b".to_string(), 2).unwrap();

        assert_eq!(dict.add("a".to_string(), 100), Err(Error::DuplicateKey));

        assert_eq!(dict.len(), 2);
        assert_eq!(dict.get("a"), Ok(&1));
        assert_eq!(
            dict.keys().map(String::as_str).collect::<Vec<_>>(),
            vec!["a", "b"]
        );
        dict.integrity_check();
    }

    #[test]
    fn duplicate_add_at_growth_threshold_keeps_capacity() {
        let mut dict = Dictionary::with_capacity(4);

        for key in 0..4_u32 {
            dict.add(key, key).unwrap();
        }

        let capacity = dict.capacity();
        let table_len = dict.index.table_len();
        assert_eq!(capacity, 4);

        assert_eq!(dict.add(2, 200), Err(Error::DuplicateKey));

        assert_eq!(dict.capacity(), capacity);
        assert_eq!(dict.index.table_len(), table_len);
        assert_eq!(dict.get(&2), Ok(&2));
        dict.integrity_check();
    }

    #[test]
    fn add_returns_reference_to_new_value() {
        let mut dict = Dictionary::new();

        let value = dict.add(1_u32, 10_u32).unwrap();
        *value += 5;

        assert_eq!(dict[&1], 15);
    }

    #[test]
    fn missing_key_is_reported() {
        let mut dict = Dictionary::<u32, u32>::new();

        assert_eq!(dict.get(&1), Err(Error::KeyNotFound));
        assert_eq!(dict.get_mut(&1), Err(Error::KeyNotFound));
        assert_eq!(dict.get_key_value(&1), Err(Error::KeyNotFound));
        assert_eq!(dict.erase(&1), Err(Error::KeyNotFound));
        assert!(!dict.contains(&1));

        // Lookups never insert.
        assert!(dict.is_empty());
    }

    #[test]
    #[should_panic]
    fn indexing_missing_key_panics() {
        let dict = Dictionary::<u32, u32>::new();
        _ = dict[&1];
    }

    #[test]
    fn borrowed_lookups() {
        let mut dict = Dictionary::new();

        dict.add("hello".to_string(), 1).unwrap();

        assert!(dict.contains("hello"));
        assert_eq!(dict["hello"], 1);

        let (key, value) = dict.get_key_value("hello").unwrap();
        assert_eq!(key, "hello");
        assert_eq!(*value, 1);

        *dict.get_mut("hello").unwrap() = 2;
        assert_eq!(dict.erase("hello"), Ok(2));
    }

    #[test]
    fn first_and_last() {
        let mut dict = Dictionary::new();

        assert_eq!(dict.first(), None);
        assert_eq!(dict.last(), None);

        dict.add(1_u32, 'a').unwrap();
        dict.add(2, 'b').unwrap();
        dict.add(3, 'c').unwrap();

        assert_eq!(dict.first(), Some((&1, &'a')));
        assert_eq!(dict.last(), Some((&3, &'c')));

        dict.erase(&1).unwrap();
        dict.erase(&3).unwrap();

        assert_eq!(dict.first(), Some((&2, &'b')));
        assert_eq!(dict.last(), Some((&2, &'b')));
    }

    #[test]
    fn readding_erased_key_moves_it_to_the_end() {
        let mut dict = Dictionary::new();

        for key in 1..=3_u32 {
            dict.add(key, key).unwrap();
        }

        dict.erase(&1).unwrap();
        dict.add(1, 100).unwrap();

        assert_eq!(keys_of(&dict), vec![2, 3, 1]);
        assert_eq!(dict[&1], 100);
    }

    #[test]
    fn iterators_are_double_ended_and_exact_size() {
        let mut dict = Dictionary::new();

        for key in 1..=4_u32 {
            dict.add(key, key * 10).unwrap();
        }

        let mut iter = dict.iter();
        assert_eq!(iter.len(), 4);
        assert_eq!(iter.next(), Some((&1, &10)));
        assert_eq!(iter.next_back(), Some((&4, &40)));
        assert_eq!(iter.len(), 2);
        assert_eq!(iter.next(), Some((&2, &20)));
        assert_eq!(iter.next_back(), Some((&3, &30)));
        assert_eq!(iter.next(), None);
        assert_eq!(iter.next_back(), None);

        assert_eq!(dict.keys().rev().copied().collect::<Vec<_>>(), vec![4, 3, 2, 1]);
        assert_eq!(dict.values().copied().collect::<Vec<_>>(), vec![10, 20, 30, 40]);
        assert_eq!(dict.values().len(), 4);
    }

    #[test]
    fn mutable_iteration() {
        let mut dict = Dictionary::new();

        for key in 1..=3_u32 {
            dict.add(key, key).unwrap();
        }

        for (key, value) in &mut dict {
            *value += key * 100;
        }

        for value in dict.values_mut().rev() {
            *value += 1;
        }

        assert_eq!(
            dict.values().copied().collect::<Vec<_>>(),
            vec![102, 203, 304]
        );
        dict.integrity_check();
    }

    #[test]
    fn into_iter_consumes_in_order() {
        let mut dict = Dictionary::new();

        for key in 1..=5_u32 {
            dict.add(key, key.to_string()).unwrap();
        }

        let mut iter = dict.into_iter();
        assert_eq!(iter.len(), 5);
        assert_eq!(iter.next(), Some((1, "1".to_string())));
        assert_eq!(iter.next_back(), Some((5, "5".to_string())));

        let rest = iter.collect::<Vec<_>>();
        assert_eq!(
            rest,
            vec![(2, "2".to_string()), (3, "3".to_string()), (4, "4".to_string())]
        );
    }

    #[test]
    fn partially_consumed_into_iter_drops_the_rest() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dict = Dictionary::new();

        for id in 1..=4_u32 {
            dict.add(
                id,
                DropRecorder {
                    id,
                    log: Rc::clone(&log),
                },
            )
            .unwrap();
        }

        let mut iter = dict.into_iter();
        let (_, first) = iter.next().unwrap();
        drop(first);
        drop(iter);

        assert_eq!(*RefCell::borrow(&log), vec![1, 2, 3, 4]);
    }

    #[test]
    fn clear_drops_entries_in_order_and_keeps_working() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dict = Dictionary::new();

        for id in [3_u32, 1, 2] {
            dict.add(
                id,
                DropRecorder {
                    id,
                    log: Rc::clone(&log),
                },
            )
            .unwrap();
        }

        dict.clear();

        assert_eq!(*RefCell::borrow(&log), vec![3, 1, 2]);
        assert!(dict.is_empty());
        assert!(!dict.contains(&1));
        dict.integrity_check();

        dict.add(
            7,
            DropRecorder {
                id: 7,
                log: Rc::clone(&log),
            },
        )
        .unwrap();
        assert_eq!(dict.len(), 1);

        drop(dict);
        assert_eq!(*RefCell::borrow(&log), vec![3, 1, 2, 7]);
    }

    #[test]
    fn erase_returns_value_without_dropping_it() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dict = Dictionary::new();

        dict.add(
            1_u32,
            DropRecorder {
                id: 1,
                log: Rc::clone(&log),
            },
        )
        .unwrap();

        let value = dict.erase(&1).unwrap();
        assert!(RefCell::borrow(&log).is_empty());

        drop(value);
        assert_eq!(*RefCell::borrow(&log), vec![1]);
    }

    #[test]
    fn panicking_hasher_leaves_dictionary_unchanged() {
        let mut dict = Dictionary::<u32, String, _>::with_hasher(PanickingHasher);

        dict.add(1, "one".to_string()).unwrap();
        dict.add(2, "two".to_string()).unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| {
            _ = dict.add(13, "thirteen".to_string());
        }));

        assert!(result.is_err());
        assert_eq!(dict.len(), 2);
        assert_eq!(keys_of_strings(&dict), vec![1, 2]);
        dict.integrity_check();

        dict.add(3, "three".to_string()).unwrap();
        assert_eq!(keys_of_strings(&dict), vec![1, 2, 3]);
        dict.integrity_check();
    }

    fn keys_of_strings<H>(dict: &Dictionary<u32, String, H>) -> Vec<u32> {
        dict.keys().copied().collect()
    }

    #[test]
    fn panicking_drop_during_clear_still_empties_dictionary() {
        let log = Rc::new(RefCell::new(Vec::new()));
        let mut dict = Dictionary::new();

        dict.add(
            1_u32,
            (
                Some(DropRecorder {
                    id: 1,
                    log: Rc::clone(&log),
                }),
                None,
            ),
        )
        .unwrap();
        dict.add(2, (None, Some(PanicOnDrop))).unwrap();
        dict.add(
            3,
            (
                Some(DropRecorder {
                    id: 3,
                    log: Rc::clone(&log),
                }),
                None,
            ),
        )
        .unwrap();

        let result = catch_unwind(AssertUnwindSafe(|| dict.clear()));

        assert!(result.is_err());
        assert!(dict.is_empty());
        assert_eq!(*RefCell::borrow(&log), vec![1, 3]);
        dict.integrity_check();
    }

    #[test]
    fn colliding_keys_work() {
        let mut dict = Dictionary::<u32, u32, _>::with_hasher(CollidingHasher);

        for key in 0..50 {
            dict.add(key, key).unwrap();
        }

        for key in (0..50).step_by(3) {
            dict.erase(&key).unwrap();
        }

        for key in 0..50 {
            assert_eq!(dict.contains(&key), key % 3 != 0);
        }

        dict.integrity_check();
    }

    #[test]
    fn clone_preserves_order_and_is_independent() {
        let mut dict = Dictionary::new();

        for key in [5_u32, 3, 9, 1] {
            dict.add(key, key.to_string()).unwrap();
        }

        let mut clone = dict.clone();
        assert_eq!(clone, dict);

        clone.erase(&3).unwrap();
        *clone.get_mut(&5).unwrap() = "five".to_string();

        assert_ne!(clone, dict);
        assert_eq!(dict.get(&3), Ok(&"3".to_string()));
        assert_eq!(dict.get(&5), Ok(&"5".to_string()));
        clone.integrity_check();
    }

    #[test]
    fn equality_depends_on_order() {
        let forward = [(1_u32, 1_u32), (2, 2)].into_iter().collect::<Dictionary<_, _>>();
        let backward = [(2_u32, 2_u32), (1, 1)].into_iter().collect::<Dictionary<_, _>>();

        assert_ne!(forward, backward);
        assert_eq!(forward, forward.clone());
    }

    #[test]
    fn extend_replaces_existing_values_in_place() {
        let mut dict = Dictionary::new();

        dict.add(1_u32, "one").unwrap();
        dict.add(2, "two").unwrap();

        dict.extend([(3, "three"), (1, "uno")]);

        assert_eq!(
            dict.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>(),
            vec![(1, "uno"), (2, "two"), (3, "three")]
        );
    }

    #[test]
    fn debug_output_is_a_map() {
        let mut dict = Dictionary::new();

        dict.add(1_u32, "a").unwrap();
        dict.add(2, "b").unwrap();

        assert_eq!(format!("{dict:?}"), r#"{1: "a", 2: "b"}"#);
    }

    #[test]
    fn take_leaves_empty_dictionary() {
        let mut dict = Dictionary::new();
        dict.add(1_u32, 1_u32).unwrap();

        let taken = mem::take(&mut dict);

        assert!(dict.is_empty());
        assert_eq!(taken.len(), 1);

        // Both remain fully usable.
        dict.add(2, 2).unwrap();
        assert_eq!(dict[&2], 2);
        assert_eq!(taken[&1], 1);
    }

    #[test]
    fn reserve_avoids_growth() {
        let mut dict = Dictionary::new();
        dict.reserve(300);

        let capacity = dict.capacity();
        let table_len = dict.index.table_len();
        assert!(capacity >= 300);

        for key in 0..300_u32 {
            dict.add(key, ()).unwrap();
        }

        assert_eq!(dict.capacity(), capacity);
        assert_eq!(dict.index.table_len(), table_len);
    }

    #[test]
    fn custom_build_hasher() {
        let mut dict = Dictionary::with_hasher(BuildKeyHasher::new(RandomState::default()));

        dict.add(vec![1_u8, 2], "a").unwrap();
        dict.add(vec![3_u8], "b").unwrap();

        assert_eq!(dict.get(&vec![1_u8, 2]), Ok(&"a"));
        assert_eq!(dict.get([3_u8].as_slice()), Ok(&"b"));
    }

    #[test]
    fn moves_to_another_thread() {
        let mut dict = Dictionary::new();
        dict.add("key".to_string(), 42_u64).unwrap();

        let dict = thread::spawn(move || {
            assert_eq!(dict["key"], 42);
            dict
        })
        .join()
        .unwrap();

        assert_eq!(dict.len(), 1);
    }
}
