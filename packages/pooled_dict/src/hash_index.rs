use std::any::type_name;
use std::borrow::Borrow;
use std::fmt;
use std::marker::PhantomData;
use std::mem;
use std::ptr::NonNull;

use tracing::trace;

use crate::{DefaultKeyHasher, Error, KeyHasher, Result};

/// The smallest table a [`HashIndex`] allocates once it holds anything at all.
pub(crate) const MIN_TABLE_SIZE: usize = 8;

/// Tells a [`HashIndex`] how to read the key of a node of type `N`.
///
/// # Safety
///
/// [`key()`][IndexAdapter::key] must return a reference into the node it is given, and the key
/// must not change for as long as the node is in an index.
pub unsafe trait IndexAdapter<N> {
    /// The key type that the index compares.
    type Key: ?Sized;

    /// Reads the key of `node`.
    ///
    /// # Safety
    ///
    /// `node` must point to a live node and the returned reference must not outlive it.
    unsafe fn key<'a>(node: NonNull<N>) -> &'a Self::Key;
}

/// Identifies an occupied slot found by [`HashIndex::find()`].
///
/// A position is only meaningful until the next mutation of the index it came from.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct SlotPosition(usize);

enum Slot<N> {
    Empty,

    /// A removed entry. Lookups probe past it; insertions may take it over.
    Tombstone,

    Occupied {
        hash: u64,
        node: NonNull<N>,
    },
}

impl<N> Clone for Slot<N> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<N> Copy for Slot<N> {}

/// An open-addressing hash table that maps keys to nodes owned by someone else.
///
/// The index stores a pointer and the cached hash of every node, never the node itself. Keys are
/// read through the [`IndexAdapter`] when a lookup needs to compare them. Collisions are resolved
/// by perturbed probing over a power-of-two table; removed entries leave tombstones behind that
/// are only cleaned up when the table is rebuilt.
///
/// # Growth
///
/// Before an insertion, if occupied slots and tombstones together fill half of the table, the
/// table is rebuilt to the next power of two that is at least four times the number of entries
/// (and at least [`MIN_TABLE_SIZE`]). Rebuilding only uses the cached hashes, so it never calls
/// into the hasher or the key's equality.
pub struct HashIndex<N, A, H = DefaultKeyHasher> {
    hasher: H,
    table: Vec<Slot<N>>,

    // Number of occupied slots.
    len: usize,
    tombstones: usize,

    _adapter: PhantomData<A>,
}

impl<N, A, H> HashIndex<N, A, H> {
    /// Creates an empty index. No memory is allocated until the first insertion.
    #[must_use]
    pub fn new(hasher: H) -> Self {
        Self {
            hasher,
            table: Vec::new(),
            len: 0,
            tombstones: 0,
            _adapter: PhantomData,
        }
    }

    /// Creates an empty index that can take `capacity` insertions without rebuilding.
    #[must_use]
    pub fn with_capacity(capacity: usize, hasher: H) -> Self {
        let mut index = Self::new(hasher);
        index.reserve(capacity);
        index
    }

    /// The hasher the index was created with.
    #[must_use]
    pub fn hasher(&self) -> &H {
        &self.hasher
    }

    /// The number of nodes in the index.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the index holds no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The number of slots that held a node that has since been removed.
    #[must_use]
    pub fn tombstones(&self) -> usize {
        self.tombstones
    }

    /// The number of slots in the table, occupied or not.
    #[must_use]
    pub fn table_len(&self) -> usize {
        self.table.len()
    }

    /// Removes the node stored at `position` and returns it.
    ///
    /// # Panics
    ///
    /// Panics if `position` does not hold a node, which means it did not come from
    /// [`find()`][Self::find] or the index has been modified since.
    pub fn remove_at(&mut self, position: SlotPosition) -> NonNull<N> {
        let Slot::Occupied { node, .. } = mem::replace(self.slot_mut(position.0), Slot::Tombstone)
        else {
            panic!(
                "slot {} in index of {} is not occupied - stale position",
                position.0,
                type_name::<N>()
            );
        };

        self.len = self
            .len
            .checked_sub(1)
            .expect("removed a node from an index that claims to be empty");
        self.tombstones = self
            .tombstones
            .checked_add(1)
            .expect("tombstones never exceed the table length");

        node
    }

    /// Ensures that `additional` more nodes can be inserted without rebuilding the table.
    pub fn reserve(&mut self, additional: usize) {
        let required = self
            .len
            .checked_add(self.tombstones)
            .and_then(|used| used.checked_add(additional))
            .expect("capacity overflow");

        if required <= half(self.table.len()) {
            return;
        }

        let entries = self
            .len
            .checked_add(additional)
            .expect("capacity overflow");

        self.rebuild(table_len_for(
            entries.checked_mul(2).expect("capacity overflow"),
        ));
    }

    /// Removes every node from the index. The table keeps its size.
    pub fn clear(&mut self) {
        self.table.fill(Slot::Empty);
        self.len = 0;
        self.tombstones = 0;
    }

    fn grow_for_insert(&mut self) {
        let used = self
            .len
            .checked_add(self.tombstones)
            .expect("slot counts never exceed the table length");

        if used < half(self.table.len()) {
            return;
        }

        self.rebuild(table_len_for(
            self.len.checked_mul(4).expect("capacity overflow"),
        ));
    }

    /// Moves every node into a fresh table of `new_len` slots, dropping all tombstones.
    fn rebuild(&mut self, new_len: usize) {
        debug_assert!(new_len.is_power_of_two());
        debug_assert!(self.len < half(new_len));

        // The whole table is allocated before any slot moves. Nothing below calls user code.
        let mut table = Vec::with_capacity(new_len);
        table.resize(new_len, Slot::Empty);

        for slot in &self.table {
            let Slot::Occupied { hash, node } = *slot else {
                continue;
            };

            let mut probe = Probe::new(hash, new_len);

            while !matches!(table.get(probe.position()), Some(Slot::Empty)) {
                probe.advance();
            }

            *table
                .get_mut(probe.position())
                .expect("probe positions are masked to the table length") =
                Slot::Occupied { hash, node };
        }

        trace!(
            node_type = type_name::<N>(),
            len = self.len,
            dropped_tombstones = self.tombstones,
            old_table_len = self.table.len(),
            new_table_len = new_len,
            "hash index rebuilt"
        );

        self.table = table;
        self.tombstones = 0;
    }

    fn slot(&self, position: usize) -> Slot<N> {
        *self
            .table
            .get(position)
            .expect("probe positions are masked to the table length")
    }

    fn slot_mut(&mut self, position: usize) -> &mut Slot<N> {
        self.table
            .get_mut(position)
            .expect("probe positions are masked to the table length")
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        if self.table.is_empty() {
            assert_eq!(self.len, 0);
            assert_eq!(self.tombstones, 0);
            return;
        }

        assert!(
            self.table.len().is_power_of_two(),
            "index of {} has a table of {} slots, which is not a power of two",
            type_name::<N>(),
            self.table.len()
        );

        let mut observed_len: usize = 0;
        let mut observed_tombstones: usize = 0;

        for (position, slot) in self.table.iter().enumerate() {
            match *slot {
                Slot::Empty => {}
                Slot::Tombstone => observed_tombstones = observed_tombstones.wrapping_add(1),
                Slot::Occupied { hash, node } => {
                    observed_len = observed_len.wrapping_add(1);

                    // Every node must be reachable from the start of its probe sequence without
                    // crossing an empty slot.
                    let mut probe = Probe::new(hash, self.table.len());

                    while probe.position() != position {
                        assert!(
                            !matches!(self.slot(probe.position()), Slot::Empty),
                            "node {node:?} in index of {} is unreachable from its hash",
                            type_name::<N>()
                        );

                        probe.advance();
                    }
                }
            }
        }

        assert_eq!(observed_len, self.len);
        assert_eq!(observed_tombstones, self.tombstones);
        assert!(
            self.len.wrapping_add(self.tombstones) < self.table.len(),
            "index of {} has no empty slot left to terminate probing",
            type_name::<N>()
        );
    }
}

impl<N, A: IndexAdapter<N>, H> HashIndex<N, A, H> {
    /// Looks up the node with a key equal to `key`.
    #[must_use]
    pub fn get<Q>(&self, key: &Q) -> Option<NonNull<N>>
    where
        A::Key: Borrow<Q>,
        Q: ?Sized + Eq,
        H: KeyHasher<Q>,
    {
        self.find(key).map(|(_, node)| node)
    }

    /// Looks up the node with a key equal to `key`, also returning where it is stored so that it
    /// can be removed with [`remove_at()`][Self::remove_at] without probing a second time.
    #[must_use]
    pub fn find<Q>(&self, key: &Q) -> Option<(SlotPosition, NonNull<N>)>
    where
        A::Key: Borrow<Q>,
        Q: ?Sized + Eq,
        H: KeyHasher<Q>,
    {
        let hash = self.hasher.hash_key(key);

        self.lookup(hash, key)
            .map(|(position, node)| (SlotPosition(position), node))
    }

    /// Walks the probe sequence of `hash` until it reaches a node with an equal key or an empty
    /// slot.
    fn lookup<Q>(&self, hash: u64, key: &Q) -> Option<(usize, NonNull<N>)>
    where
        A::Key: Borrow<Q>,
        Q: ?Sized + Eq,
    {
        if self.table.is_empty() {
            return None;
        }

        let mut probe = Probe::new(hash, self.table.len());

        loop {
            match self.slot(probe.position()) {
                Slot::Empty => return None,
                Slot::Tombstone => {}
                Slot::Occupied {
                    hash: slot_hash,
                    node,
                } => {
                    // SAFETY: Nodes stay live for as long as they are in the index, which the
                    // caller of insert() guaranteed.
                    let stored = unsafe { A::key(node) };

                    if slot_hash == hash && <A::Key as Borrow<Q>>::borrow(stored) == key {
                        return Some((probe.position(), node));
                    }
                }
            }

            probe.advance();
        }
    }

    /// Adds `node` to the index under its current key.
    ///
    /// Returns [`Error::DuplicateKey`] if a node with an equal key is already present, in which
    /// case the index is left unchanged and does not grow. If the hasher or the key's equality
    /// panics, the index is likewise left unchanged.
    ///
    /// # Safety
    ///
    /// `node` must be live and must stay live, with its key unchanged, until it is removed from
    /// the index or the index is cleared or dropped.
    pub unsafe fn insert(&mut self, node: NonNull<N>) -> Result<()>
    where
        A::Key: Eq,
        H: KeyHasher<A::Key>,
    {
        // SAFETY: The caller guarantees the node is live.
        let key = unsafe { A::key(node) };
        let hash = self.hasher.hash_key(key);

        // Duplicates are rejected before the table is touched, so a failed insert never grows it.
        if self.lookup(hash, key).is_some() {
            return Err(Error::DuplicateKey);
        }

        self.grow_for_insert();

        // The first slot on the probe sequence that holds no node, which may be a tombstone.
        let mut probe = Probe::new(hash, self.table.len());

        while matches!(self.slot(probe.position()), Slot::Occupied { .. }) {
            probe.advance();
        }

        let position = probe.position();

        let previous = mem::replace(self.slot_mut(position), Slot::Occupied { hash, node });

        if matches!(previous, Slot::Tombstone) {
            self.tombstones = self
                .tombstones
                .checked_sub(1)
                .expect("reused a tombstone that was not counted");
        }

        self.len = self
            .len
            .checked_add(1)
            .expect("an index cannot hold more nodes than fit in memory");

        Ok(())
    }

    /// Removes `node` from the index, returning whether it was present.
    ///
    /// The node is matched by identity, so another node with an equal key is never removed in its
    /// place. The key's equality is not called.
    ///
    /// # Safety
    ///
    /// `node` must be live.
    pub unsafe fn remove(&mut self, node: NonNull<N>) -> bool
    where
        H: KeyHasher<A::Key>,
    {
        if self.table.is_empty() {
            return false;
        }

        // SAFETY: The caller guarantees the node is live.
        let hash = self.hasher.hash_key(unsafe { A::key(node) });
        let mut probe = Probe::new(hash, self.table.len());

        loop {
            match self.slot(probe.position()) {
                Slot::Empty => return false,
                Slot::Occupied {
                    node: candidate, ..
                } if candidate == node => {
                    self.remove_at(SlotPosition(probe.position()));
                    return true;
                }
                Slot::Tombstone | Slot::Occupied { .. } => {}
            }

            probe.advance();
        }
    }
}

impl<N, A, H> fmt::Debug for HashIndex<N, A, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HashIndex")
            .field("node_type", &format_args!("{}", type_name::<N>()))
            .field("hasher_type", &format_args!("{}", type_name::<H>()))
            .field("len", &self.len)
            .field("tombstones", &self.tombstones)
            .field("table_len", &self.table.len())
            .finish()
    }
}

impl<N, A, H: Default> Default for HashIndex<N, A, H> {
    fn default() -> Self {
        Self::new(H::default())
    }
}

/// Walks the slots of a power-of-two table in the order determined by a hash.
///
/// The higher bits of the hash are folded in a few at a time, after which the sequence settles
/// into `position * 5 + 1`, which visits every slot of a power-of-two table.
#[derive(Debug)]
struct Probe {
    position: u64,
    perturb: u64,
    mask: u64,
}

impl Probe {
    fn new(hash: u64, table_len: usize) -> Self {
        debug_assert!(table_len.is_power_of_two());

        let mask = (table_len as u64).wrapping_sub(1);

        Self {
            position: hash & mask,
            perturb: hash,
            mask,
        }
    }

    #[expect(
        clippy::cast_possible_truncation,
        reason = "the position is masked to the table length, which is a usize"
    )]
    fn position(&self) -> usize {
        self.position as usize
    }

    fn advance(&mut self) {
        self.perturb >>= 5;
        self.position = self
            .position
            .wrapping_mul(5)
            .wrapping_add(self.perturb)
            .wrapping_add(1)
            & self.mask;
    }
}

fn half(table_len: usize) -> usize {
    table_len >> 1
}

fn table_len_for(min_len: usize) -> usize {
    min_len
        .max(MIN_TABLE_SIZE)
        .checked_next_power_of_two()
        .expect("capacity overflow")
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use std::panic::{AssertUnwindSafe, catch_unwind};

    use static_assertions::assert_not_impl_any;

    use super::*;

    struct TestNode {
        key: u64,
    }

    enum ByKey {}

    // SAFETY: Always points at the `key` field, which tests never modify.
    unsafe impl IndexAdapter<TestNode> for ByKey {
        type Key = u64;

        unsafe fn key<'a>(node: NonNull<TestNode>) -> &'a u64 {
            // SAFETY: The caller guarantees the node is live.
            unsafe { &(*node.as_ptr()).key }
        }
    }

    /// Sends every key down the same probe sequence.
    #[derive(Debug, Default)]
    struct CollidingHasher;

    impl KeyHasher<u64> for CollidingHasher {
        fn hash_key(&self, _key: &u64) -> u64 {
            0
        }
    }

    #[derive(Debug)]
    struct PanickingHasher {
        poisoned_key: u64,
    }

    impl KeyHasher<u64> for PanickingHasher {
        fn hash_key(&self, key: &u64) -> u64 {
            assert_ne!(*key, self.poisoned_key, "refusing to hash the poisoned key");
            *key
        }
    }

    type TestIndex<H = DefaultKeyHasher> = HashIndex<TestNode, ByKey, H>;

    assert_not_impl_any!(TestIndex: Send, Sync);

    fn new_nodes(keys: impl IntoIterator<Item = u64>) -> Vec<NonNull<TestNode>> {
        keys.into_iter()
            .map(|key| NonNull::from(Box::leak(Box::new(TestNode { key }))))
            .collect()
    }

    fn free_nodes(nodes: impl IntoIterator<Item = NonNull<TestNode>>) {
        for node in nodes {
            // SAFETY: Every test node was created by new_nodes() and is not used afterwards.
            drop(unsafe { Box::from_raw(node.as_ptr()) });
        }
    }

    fn insert_all<H: KeyHasher<u64>>(index: &mut TestIndex<H>, nodes: &[NonNull<TestNode>]) {
        for &node in nodes {
            // SAFETY: Test nodes outlive the index.
            unsafe { index.insert(node) }.expect("test keys are unique");
        }
    }

    #[test]
    fn probe_sequence_is_exact() {
        let mut probe = Probe::new(0, 8);
        let mut visited = vec![probe.position()];

        for _ in 0..7 {
            probe.advance();
            visited.push(probe.position());
        }

        assert_eq!(visited, vec![0, 1, 6, 7, 4, 5, 2, 3]);

        // High bits of the hash are folded into the first steps.
        let mut probe = Probe::new(32, 8);
        assert_eq!(probe.position(), 0);
        probe.advance();
        assert_eq!(probe.position(), 2);
        probe.advance();
        assert_eq!(probe.position(), 3);
    }

    #[test]
    fn empty_index_does_not_allocate() {
        let index = TestIndex::new(DefaultKeyHasher);

        assert_eq!(index.table_len(), 0);
        assert!(index.is_empty());
        assert_eq!(index.get(&5), None);
        assert_eq!(index.find(&5), None);
        index.integrity_check();
    }

    #[test]
    fn insert_and_get() {
        let nodes = new_nodes([10, 20, 30]);
        let mut index = TestIndex::new(DefaultKeyHasher);

        insert_all(&mut index, &nodes);

        assert_eq!(index.len(), 3);
        assert_eq!(index.table_len(), MIN_TABLE_SIZE);
        assert_eq!(index.get(&10), Some(nodes[0]));
        assert_eq!(index.get(&20), Some(nodes[1]));
        assert_eq!(index.get(&30), Some(nodes[2]));
        assert_eq!(index.get(&40), None);
        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn duplicate_key_is_rejected() {
        let nodes = new_nodes([7, 7]);
        let mut index = TestIndex::new(DefaultKeyHasher);

        // SAFETY: Test nodes outlive the index.
        unsafe {
            index.insert(nodes[0]).expect("first insert succeeds");
            assert_eq!(index.insert(nodes[1]), Err(Error::DuplicateKey));
        }

        assert_eq!(index.len(), 1);
        assert_eq!(index.get(&7), Some(nodes[0]));
        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn grows_when_half_full() {
        let nodes = new_nodes(0..5);
        let mut index = TestIndex::new(DefaultKeyHasher);

        insert_all(&mut index, &nodes[..4]);
        assert_eq!(index.table_len(), 8);

        // 4 of 8 slots used, so the next insert rebuilds to 4 * 4 = 16 slots.
        insert_all(&mut index, &nodes[4..]);
        assert_eq!(index.table_len(), 16);

        for (key, &node) in (0..5).zip(&nodes) {
            assert_eq!(index.get(&key), Some(node));
        }

        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn duplicate_key_at_growth_threshold_does_not_grow() {
        let nodes = new_nodes([0, 1, 2, 3, 2]);
        let mut index = TestIndex::new(DefaultKeyHasher);

        insert_all(&mut index, &nodes[..4]);
        assert_eq!(index.table_len(), 8);

        // SAFETY: Test nodes outlive the index.
        let result = unsafe { index.insert(nodes[4]) };

        assert_eq!(result, Err(Error::DuplicateKey));
        assert_eq!(index.table_len(), 8);
        assert_eq!(index.len(), 4);
        assert_eq!(index.get(&2), Some(nodes[2]));
        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn colliding_keys_probe_past_each_other() {
        let nodes = new_nodes([1, 2, 3]);
        let mut index = TestIndex::new(CollidingHasher);

        insert_all(&mut index, &nodes);

        assert_eq!(index.get(&1), Some(nodes[0]));
        assert_eq!(index.get(&2), Some(nodes[1]));
        assert_eq!(index.get(&3), Some(nodes[2]));
        assert_eq!(index.get(&4), None);
        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn removal_leaves_tombstone_that_lookups_probe_past() {
        let nodes = new_nodes([1, 2, 3]);
        let mut index = TestIndex::new(CollidingHasher);

        insert_all(&mut index, &nodes);

        let (position, node) = index.find(&2).expect("key was inserted");
        assert_eq!(node, nodes[1]);
        assert_eq!(index.remove_at(position), nodes[1]);

        assert_eq!(index.len(), 2);
        assert_eq!(index.tombstones(), 1);
        assert_eq!(index.get(&2), None);

        // Key 3 sits after the tombstone on the shared probe sequence.
        assert_eq!(index.get(&3), Some(nodes[2]));
        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn insertion_reuses_first_tombstone() {
        let nodes = new_nodes([1, 2, 3, 4]);
        let mut index = TestIndex::new(CollidingHasher);

        insert_all(&mut index, &nodes[..3]);

        // SAFETY: The node is live.
        assert!(unsafe { index.remove(nodes[1]) });
        assert_eq!(index.tombstones(), 1);

        insert_all(&mut index, &nodes[3..]);

        assert_eq!(index.tombstones(), 0);
        assert_eq!(index.len(), 3);
        assert_eq!(index.find(&4).map(|(position, _)| position), Some(SlotPosition(1)));
        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn tombstones_count_towards_growth_and_are_dropped_by_rebuild() {
        let nodes = new_nodes(0..5);
        let mut index = TestIndex::new(DefaultKeyHasher);

        insert_all(&mut index, &nodes[..3]);

        for &node in &nodes[..3] {
            // SAFETY: The node is live.
            assert!(unsafe { index.remove(node) });
        }

        assert_eq!(index.tombstones(), 3);

        // Slot 3 is still empty, so no tombstone is reused.
        insert_all(&mut index, &nodes[3..4]);
        assert_eq!(index.tombstones(), 3);

        // 1 entry + 3 tombstones fill half the table; the rebuild keeps the size but drops the
        // tombstones.
        insert_all(&mut index, &nodes[4..]);
        assert_eq!(index.tombstones(), 0);
        assert_eq!(index.len(), 2);
        assert_eq!(index.table_len(), 8);
        assert_eq!(index.get(&3), Some(nodes[3]));
        assert_eq!(index.get(&4), Some(nodes[4]));
        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn remove_matches_identity_not_key() {
        let nodes = new_nodes([5, 5]);
        let mut index = TestIndex::new(DefaultKeyHasher);

        insert_all(&mut index, &nodes[..1]);

        // SAFETY: Both nodes are live.
        unsafe {
            assert!(!index.remove(nodes[1]));
            assert_eq!(index.get(&5), Some(nodes[0]));

            assert!(index.remove(nodes[0]));
            assert!(!index.remove(nodes[0]));
        }

        assert!(index.is_empty());
        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    #[should_panic]
    fn stale_position_panics() {
        let nodes = new_nodes([1]);
        let mut index = TestIndex::new(DefaultKeyHasher);

        insert_all(&mut index, &nodes);

        let (position, _) = index.find(&1).expect("key was inserted");
        index.remove_at(position);

        // The nodes are intentionally leaked because this panics.
        index.remove_at(position);
    }

    #[test]
    fn reserve_prevents_rebuilds() {
        let nodes = new_nodes(0..100);
        let mut index = TestIndex::with_capacity(100, DefaultKeyHasher);

        let table_len = index.table_len();
        assert_eq!(table_len, 256);

        insert_all(&mut index, &nodes);

        assert_eq!(index.table_len(), table_len);
        index.integrity_check();

        // Already enough room.
        index.reserve(0);
        assert_eq!(index.table_len(), table_len);

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn clear_keeps_table() {
        let nodes = new_nodes(0..6);
        let mut index = TestIndex::new(DefaultKeyHasher);

        insert_all(&mut index, &nodes);
        let table_len = index.table_len();

        index.clear();

        assert!(index.is_empty());
        assert_eq!(index.tombstones(), 0);
        assert_eq!(index.table_len(), table_len);
        assert_eq!(index.get(&3), None);
        index.integrity_check();

        // Nodes can be inserted again after clearing.
        insert_all(&mut index, &nodes);
        assert_eq!(index.len(), 6);

        drop(index);
        free_nodes(nodes);
    }

    #[test]
    fn panicking_hasher_leaves_index_unchanged() {
        let nodes = new_nodes([1, 2, 13]);
        let mut index = TestIndex::new(PanickingHasher { poisoned_key: 13 });

        insert_all(&mut index, &nodes[..2]);

        let result = catch_unwind(AssertUnwindSafe(|| {
            // SAFETY: Test nodes outlive the index.
            _ = unsafe { index.insert(nodes[2]) };
        }));

        assert!(result.is_err());
        assert_eq!(index.len(), 2);
        assert_eq!(index.get(&1), Some(nodes[0]));
        assert_eq!(index.get(&2), Some(nodes[1]));
        index.integrity_check();

        drop(index);
        free_nodes(nodes);
    }
}
