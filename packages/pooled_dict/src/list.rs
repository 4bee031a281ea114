use std::any::type_name;
use std::fmt;
use std::iter::FusedIterator;
use std::marker::PhantomData;
use std::ptr::NonNull;
use std::thread;

/// The forward and backward links that a node embeds for membership in one [`List`].
///
/// A node that participates in several lists at once embeds one `Links` per list and describes
/// each of them to the corresponding list via a separate [`ListAdapter`].
pub struct Links<T> {
    previous: Option<NonNull<T>>,
    next: Option<NonNull<T>>,
}

impl<T> Links<T> {
    /// Creates unlinked links, ready for insertion into a list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            previous: None,
            next: None,
        }
    }
}

impl<T> Default for Links<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> fmt::Debug for Links<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Links")
            .field("previous", &self.previous)
            .field("next", &self.next)
            .finish()
    }
}

/// Tells a [`List`] where a node of type `N` keeps the [`Links`] for that list.
///
/// Adapters are usually uninhabited enums that only ever appear as type parameters.
///
/// # Safety
///
/// [`links()`][ListAdapter::links] must return a pointer to a `Links` field inside the node it
/// is given, and must return the same field every time for the same node. Two adapters used with
/// lists that share nodes must point at different fields.
pub unsafe trait ListAdapter<N> {
    /// Locates the links inside `node`.
    ///
    /// # Safety
    ///
    /// `node` must point to a live node.
    unsafe fn links(node: NonNull<N>) -> NonNull<Links<N>>;
}

/// An intrusive doubly-linked list over nodes owned by someone else.
///
/// The list never allocates or frees nodes; it only rewires the [`Links`] embedded in them. This
/// makes insertion and removal O(1) given a pointer to the node, with no search. Iteration order
/// is insertion order unless the caller explicitly inserts at another position.
///
/// Moving a list is O(1) and does not touch any node, because nodes only ever point at each
/// other and never at the list itself.
///
/// # Resource usage
///
/// A list must be emptied by its owner before it is dropped. Dropping a non-empty list is a bug
/// (checked in debug builds) because the nodes would keep pointing at each other with nobody
/// left to unlink them.
pub struct List<N, A: ListAdapter<N>> {
    head: Option<NonNull<N>>,
    tail: Option<NonNull<N>>,
    len: usize,

    _adapter: PhantomData<A>,
}

impl<N, A: ListAdapter<N>> List<N, A> {
    /// Creates an empty list.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
            _adapter: PhantomData,
        }
    }

    /// The number of nodes in the list.
    #[must_use]
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the list contains no nodes.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The first node, or `None` if the list is empty.
    #[must_use]
    pub fn front(&self) -> Option<NonNull<N>> {
        self.head
    }

    /// The last node, or `None` if the list is empty.
    #[must_use]
    pub fn back(&self) -> Option<NonNull<N>> {
        self.tail
    }

    /// Links `node` immediately before `position`, or at the end if `position` is `None`.
    ///
    /// # Safety
    ///
    /// `node` must be live, must not currently be linked into any list via this adapter and must
    /// stay live until it is unlinked again. `position`, if present, must be a node of this list.
    pub unsafe fn insert_before(
        &mut self,
        position: Option<NonNull<N>>,
        node: NonNull<N>,
    ) {
        let previous = match position {
            // SAFETY: The caller guarantees position is a node of this list, hence live.
            Some(position) => unsafe { Self::links(position).previous },
            None => self.tail,
        };

        // SAFETY: The caller guarantees the node is live.
        let links = unsafe { A::links(node) };

        // SAFETY: The node is not linked anywhere else via this adapter, so we are free to
        // overwrite its links.
        unsafe {
            links.write(Links {
                previous,
                next: position,
            });
        }

        match previous {
            // SAFETY: previous is either a node of this list or we took it from one.
            Some(previous) => unsafe { Self::set_next(previous, Some(node)) },
            None => self.head = Some(node),
        }

        match position {
            // SAFETY: The caller guarantees position is a node of this list.
            Some(position) => unsafe { Self::set_previous(position, Some(node)) },
            None => self.tail = Some(node),
        }

        self.len = self
            .len
            .checked_add(1)
            .expect("a list cannot hold more nodes than fit in memory");
    }

    /// Links `node` at the end of the list.
    ///
    /// # Safety
    ///
    /// Same as [`insert_before()`][Self::insert_before].
    pub unsafe fn push_back(&mut self, node: NonNull<N>) {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe {
            self.insert_before(None, node);
        }
    }

    /// Links `node` at the start of the list.
    ///
    /// # Safety
    ///
    /// Same as [`insert_before()`][Self::insert_before].
    pub unsafe fn push_front(&mut self, node: NonNull<N>) {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe {
            self.insert_before(self.head, node);
        }
    }

    /// Unlinks `node` from the list and returns the node that followed it, if any.
    ///
    /// # Safety
    ///
    /// `node` must be a node of this list.
    pub unsafe fn erase(&mut self, node: NonNull<N>) -> Option<NonNull<N>> {
        debug_assert!(
            self.len > 0,
            "erase() called on an empty list of {}",
            type_name::<N>()
        );

        // SAFETY: The caller guarantees the node is in this list, hence live.
        let Links { previous, next } = unsafe { Self::take_links(node) };

        match previous {
            // SAFETY: Neighbors of a node in this list are nodes of this list.
            Some(previous) => unsafe { Self::set_next(previous, next) },
            None => self.head = next,
        }

        match next {
            // SAFETY: Neighbors of a node in this list are nodes of this list.
            Some(next) => unsafe { Self::set_previous(next, previous) },
            None => self.tail = previous,
        }

        self.len = self
            .len
            .checked_sub(1)
            .expect("erased a node from a list that claims to be empty");

        next
    }

    /// Unlinks and returns the first node, or returns `None` if the list is empty.
    pub fn pop_front(&mut self) -> Option<NonNull<N>> {
        let node = self.head?;

        // SAFETY: The head is a node of this list.
        unsafe {
            self.erase(node);
        }

        Some(node)
    }

    /// Unlinks and returns the last node, or returns `None` if the list is empty.
    pub fn pop_back(&mut self) -> Option<NonNull<N>> {
        let node = self.tail?;

        // SAFETY: The tail is a node of this list.
        unsafe {
            self.erase(node);
        }

        Some(node)
    }

    /// The node that follows `node`, or `None` if it is the last one.
    ///
    /// # Safety
    ///
    /// `node` must be a node of this list.
    #[must_use]
    pub unsafe fn next(&self, node: NonNull<N>) -> Option<NonNull<N>> {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe { Self::links(node).next }
    }

    /// The node that precedes `node`, or `None` if it is the first one.
    ///
    /// # Safety
    ///
    /// `node` must be a node of this list.
    #[must_use]
    pub unsafe fn previous(&self, node: NonNull<N>) -> Option<NonNull<N>> {
        // SAFETY: Forwarding the caller's guarantees.
        unsafe { Self::links(node).previous }
    }

    /// Iterates over the nodes from front to back.
    pub fn iter(&self) -> ListIter<'_, N, A> {
        ListIter {
            front: self.head,
            back: self.tail,
            remaining: self.len,
            _list: PhantomData,
        }
    }

    /// # Safety
    ///
    /// `node` must be live.
    unsafe fn links(node: NonNull<N>) -> Links<N> {
        // SAFETY: Forwarding the caller's guarantees.
        let links = unsafe { A::links(node) };

        // SAFETY: The links are live. We copy them out instead of returning a reference so no
        // reference into the node outlives this call.
        let links = unsafe { links.as_ref() };

        Links {
            previous: links.previous,
            next: links.next,
        }
    }

    /// # Safety
    ///
    /// `node` must be live.
    unsafe fn take_links(node: NonNull<N>) -> Links<N> {
        // SAFETY: Forwarding the caller's guarantees.
        let links = unsafe { A::links(node) };

        // SAFETY: The links are live and nothing else borrows them.
        unsafe { links.replace(Links::new()) }
    }

    /// # Safety
    ///
    /// `node` must be live.
    unsafe fn set_next(node: NonNull<N>, next: Option<NonNull<N>>) {
        // SAFETY: Forwarding the caller's guarantees.
        let links = unsafe { A::links(node) };

        // SAFETY: The links are live and nothing else borrows them.
        unsafe {
            (*links.as_ptr()).next = next;
        }
    }

    /// # Safety
    ///
    /// `node` must be live.
    unsafe fn set_previous(node: NonNull<N>, previous: Option<NonNull<N>>) {
        // SAFETY: Forwarding the caller's guarantees.
        let links = unsafe { A::links(node) };

        // SAFETY: The links are live and nothing else borrows them.
        unsafe {
            (*links.as_ptr()).previous = previous;
        }
    }

    #[cfg_attr(test, mutants::skip)] // This is essentially test logic, mutation is meaningless.
    #[cfg(debug_assertions)]
    pub(crate) fn integrity_check(&self) {
        let mut observed_len: usize = 0;
        let mut previous = None;
        let mut cursor = self.head;

        while let Some(node) = cursor {
            // SAFETY: Every node reachable from the head is a node of this list.
            let links = unsafe { Self::links(node) };

            assert_eq!(
                links.previous, previous,
                "node {observed_len} in list of {} has a broken backward link",
                type_name::<N>()
            );

            observed_len = observed_len
                .checked_add(1)
                .expect("list is longer than the address space - it must contain a cycle");

            assert!(
                observed_len <= self.len,
                "list of {} has more nodes than its length {} - it may contain a cycle",
                type_name::<N>(),
                self.len
            );

            previous = Some(node);
            cursor = links.next;
        }

        assert_eq!(
            previous,
            self.tail,
            "tail of list of {} is not the last reachable node",
            type_name::<N>()
        );
        assert_eq!(
            observed_len,
            self.len,
            "list of {} has {observed_len} reachable nodes but its length is {}",
            type_name::<N>(),
            self.len
        );
    }
}

impl<N, A: ListAdapter<N>> Default for List<N, A> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N, A: ListAdapter<N>> fmt::Debug for List<N, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("List")
            .field("node_type", &format_args!("{}", type_name::<N>()))
            .field("len", &self.len)
            .field("head", &self.head)
            .field("tail", &self.tail)
            .finish()
    }
}

impl<N, A: ListAdapter<N>> Drop for List<N, A> {
    fn drop(&mut self) {
        // If we are already panicking, the owner may not have had a chance to empty us and we
        // do not want to obscure the original panic.
        if !thread::panicking() {
            debug_assert!(
                self.is_empty(),
                "dropped a list of {} that still links {} nodes",
                type_name::<N>(),
                self.len
            );
        }
    }
}

impl<'a, N, A: ListAdapter<N>> IntoIterator for &'a List<N, A> {
    type Item = NonNull<N>;
    type IntoIter = ListIter<'a, N, A>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Iterator over the nodes of a [`List`], front to back (or back to front when reversed).
pub struct ListIter<'a, N, A: ListAdapter<N>> {
    front: Option<NonNull<N>>,
    back: Option<NonNull<N>>,

    /// Both ends walk towards each other; this tells us when they have met.
    remaining: usize,

    _list: PhantomData<&'a List<N, A>>,
}

impl<N, A: ListAdapter<N>> fmt::Debug for ListIter<'_, N, A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ListIter")
            .field("front", &self.front)
            .field("back", &self.back)
            .field("remaining", &self.remaining)
            .finish()
    }
}

impl<N, A: ListAdapter<N>> Clone for ListIter<'_, N, A> {
    fn clone(&self) -> Self {
        Self {
            front: self.front,
            back: self.back,
            remaining: self.remaining,
            _list: PhantomData,
        }
    }
}

impl<N, A: ListAdapter<N>> Iterator for ListIter<'_, N, A> {
    type Item = NonNull<N>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let node = self.front?;

        // SAFETY: The borrowed list cannot change while we exist, so every node between front
        // and back is still a live node of the list.
        self.front = unsafe { List::<N, A>::links(node).next };
        self.remaining = self
            .remaining
            .checked_sub(1)
            .expect("guarded by zero check above");

        Some(node)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<N, A: ListAdapter<N>> DoubleEndedIterator for ListIter<'_, N, A> {
    fn next_back(&mut self) -> Option<Self::Item> {
        if self.remaining == 0 {
            return None;
        }

        let node = self.back?;

        // SAFETY: See next().
        self.back = unsafe { List::<N, A>::links(node).previous };
        self.remaining = self
            .remaining
            .checked_sub(1)
            .expect("guarded by zero check above");

        Some(node)
    }
}

impl<N, A: ListAdapter<N>> ExactSizeIterator for ListIter<'_, N, A> {}

impl<N, A: ListAdapter<N>> FusedIterator for ListIter<'_, N, A> {}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
#[allow(
    clippy::multiple_unsafe_ops_per_block,
    clippy::indexing_slicing,
    reason = "tests focus on succinct code and do not need to tick all the boxes"
)]
mod tests {
    use super::*;

    struct TestNode {
        value: u32,
        first: Links<TestNode>,
        second: Links<TestNode>,
    }

    enum FirstAdapter {}

    // SAFETY: Always points at the `first` field.
    unsafe impl ListAdapter<TestNode> for FirstAdapter {
        unsafe fn links(node: NonNull<TestNode>) -> NonNull<Links<TestNode>> {
            // SAFETY: The caller guarantees the node is live.
            let links = unsafe { &raw mut (*node.as_ptr()).first };

            // SAFETY: A field of a non-null node is itself non-null.
            unsafe { NonNull::new_unchecked(links) }
        }
    }

    enum SecondAdapter {}

    // SAFETY: Always points at the `second` field.
    unsafe impl ListAdapter<TestNode> for SecondAdapter {
        unsafe fn links(node: NonNull<TestNode>) -> NonNull<Links<TestNode>> {
            // SAFETY: The caller guarantees the node is live.
            let links = unsafe { &raw mut (*node.as_ptr()).second };

            // SAFETY: A field of a non-null node is itself non-null.
            unsafe { NonNull::new_unchecked(links) }
        }
    }

    fn new_node(value: u32) -> NonNull<TestNode> {
        NonNull::from(Box::leak(Box::new(TestNode {
            value,
            first: Links::new(),
            second: Links::new(),
        })))
    }

    fn free_nodes(nodes: impl IntoIterator<Item = NonNull<TestNode>>) {
        for node in nodes {
            // SAFETY: Every test node was created by new_node() and is unlinked by now.
            drop(unsafe { Box::from_raw(node.as_ptr()) });
        }
    }

    fn values<A: ListAdapter<TestNode>>(list: &List<TestNode, A>) -> Vec<u32> {
        list.iter()
            // SAFETY: Nodes in the list are live.
            .map(|node| unsafe { node.as_ref() }.value)
            .collect()
    }

    fn drain<N, A: ListAdapter<N>>(list: &mut List<N, A>) {
        while list.pop_front().is_some() {}
    }

    #[test]
    fn empty_list() {
        let list = List::<TestNode, FirstAdapter>::new();

        assert_eq!(list.len(), 0);
        assert!(list.is_empty());
        assert!(list.front().is_none());
        assert!(list.back().is_none());
        assert_eq!(list.iter().next(), None);
        list.integrity_check();
    }

    #[test]
    fn push_back_keeps_insertion_order() {
        let nodes = (1..=4).map(new_node).collect::<Vec<_>>();
        let mut list = List::<TestNode, FirstAdapter>::new();

        for &node in &nodes {
            // SAFETY: Fresh nodes, live for the whole test.
            unsafe { list.push_back(node) };
        }

        assert_eq!(values(&list), vec![1, 2, 3, 4]);
        assert_eq!(list.len(), 4);
        assert_eq!(list.front(), nodes.first().copied());
        assert_eq!(list.back(), nodes.last().copied());
        list.integrity_check();

        drain(&mut list);
        free_nodes(nodes);
    }

    #[test]
    fn push_front_and_insert_before() {
        let a = new_node(1);
        let b = new_node(2);
        let c = new_node(3);
        let d = new_node(4);
        let mut list = List::<TestNode, FirstAdapter>::new();

        // SAFETY: Fresh nodes, live for the whole test; positions are list members.
        unsafe {
            list.push_back(c);
            list.push_front(a);
            list.insert_before(Some(c), b);
            list.insert_before(None, d);
        }

        assert_eq!(values(&list), vec![1, 2, 3, 4]);
        list.integrity_check();

        drain(&mut list);
        free_nodes([a, b, c, d]);
    }

    #[test]
    fn erase_returns_next_and_relinks_neighbors() {
        let nodes = (1..=5).map(new_node).collect::<Vec<_>>();
        let mut list = List::<TestNode, FirstAdapter>::new();

        for &node in &nodes {
            // SAFETY: Fresh nodes, live for the whole test.
            unsafe { list.push_back(node) };
        }

        // SAFETY: All of these are members of the list at the time of erasing.
        unsafe {
            assert_eq!(list.erase(nodes[2]), Some(nodes[3]));
            assert_eq!(list.erase(nodes[0]), Some(nodes[1]));
            assert_eq!(list.erase(nodes[4]), None);
        }

        assert_eq!(values(&list), vec![2, 4]);
        assert_eq!(list.front(), Some(nodes[1]));
        assert_eq!(list.back(), Some(nodes[3]));
        list.integrity_check();

        // Erased nodes can be linked again.
        // SAFETY: The node was erased above so it is no longer linked.
        unsafe { list.push_back(nodes[0]) };
        assert_eq!(values(&list), vec![2, 4, 1]);
        list.integrity_check();

        drain(&mut list);
        free_nodes(nodes);
    }

    #[test]
    fn pop_from_both_ends() {
        let nodes = (1..=3).map(new_node).collect::<Vec<_>>();
        let mut list = List::<TestNode, FirstAdapter>::new();

        for &node in &nodes {
            // SAFETY: Fresh nodes, live for the whole test.
            unsafe { list.push_back(node) };
        }

        assert_eq!(list.pop_back(), Some(nodes[2]));
        assert_eq!(list.pop_front(), Some(nodes[0]));
        assert_eq!(list.pop_front(), Some(nodes[1]));
        assert_eq!(list.pop_front(), None);
        assert_eq!(list.pop_back(), None);
        assert!(list.is_empty());

        free_nodes(nodes);
    }

    #[test]
    fn navigation_and_reverse_iteration() {
        let nodes = (1..=3).map(new_node).collect::<Vec<_>>();
        let mut list = List::<TestNode, FirstAdapter>::new();

        for &node in &nodes {
            // SAFETY: Fresh nodes, live for the whole test.
            unsafe { list.push_back(node) };
        }

        // SAFETY: All nodes are members of the list.
        unsafe {
            assert_eq!(list.next(nodes[0]), Some(nodes[1]));
            assert_eq!(list.next(nodes[2]), None);
            assert_eq!(list.previous(nodes[1]), Some(nodes[0]));
            assert_eq!(list.previous(nodes[0]), None);
        }

        let reversed = list.iter().rev().collect::<Vec<_>>();
        assert_eq!(reversed, vec![nodes[2], nodes[1], nodes[0]]);

        // Both ends meet in the middle without yielding anything twice.
        let mut iter = list.iter();
        assert_eq!(iter.len(), 3);
        assert_eq!(iter.next(), Some(nodes[0]));
        assert_eq!(iter.next_back(), Some(nodes[2]));
        assert_eq!(iter.next(), Some(nodes[1]));
        assert_eq!(iter.next_back(), None);
        assert_eq!(iter.next(), None);

        drain(&mut list);
        free_nodes(nodes);
    }

    #[test]
    fn node_in_two_lists_at_once() {
        let nodes = (1..=4).map(new_node).collect::<Vec<_>>();
        let mut first = List::<TestNode, FirstAdapter>::new();
        let mut second = List::<TestNode, SecondAdapter>::new();

        for &node in &nodes {
            // SAFETY: Fresh nodes, live for the whole test; each adapter uses its own links.
            unsafe {
                first.push_back(node);
                second.push_front(node);
            }
        }

        assert_eq!(values(&first), vec![1, 2, 3, 4]);
        assert_eq!(values(&second), vec![4, 3, 2, 1]);

        // SAFETY: The node is a member of the first list.
        unsafe { first.erase(nodes[1]) };

        // The other list is not affected.
        assert_eq!(values(&first), vec![1, 3, 4]);
        assert_eq!(values(&second), vec![4, 3, 2, 1]);
        first.integrity_check();
        second.integrity_check();

        drain(&mut first);
        drain(&mut second);
        free_nodes(nodes);
    }

    #[test]
    fn moving_list_keeps_nodes_linked() {
        let nodes = (1..=3).map(new_node).collect::<Vec<_>>();
        let mut list = List::<TestNode, FirstAdapter>::new();

        for &node in &nodes {
            // SAFETY: Fresh nodes, live for the whole test.
            unsafe { list.push_back(node) };
        }

        let mut moved = Box::new(list);

        assert_eq!(values(&moved), vec![1, 2, 3]);
        moved.integrity_check();

        drain(&mut moved);
        free_nodes(nodes);
    }

    #[test]
    #[cfg(debug_assertions)]
    #[should_panic]
    fn dropping_non_empty_list_panics_in_debug() {
        let node = new_node(1);
        let mut list = List::<TestNode, FirstAdapter>::new();

        // SAFETY: Fresh node. It is intentionally leaked because the test panics.
        unsafe { list.push_back(node) };

        drop(list);
    }
}
