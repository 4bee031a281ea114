use std::any::type_name;
use std::fmt;
use std::marker::PhantomData;

use crate::{DefaultKeyHasher, Dictionary};

/// Builder for creating an instance of [`Dictionary`].
///
/// You only need to use this builder if you want to customize the dictionary configuration.
/// The default configuration used by [`Dictionary::new()`][1] is sufficient for most use cases.
///
/// # Examples
///
/// ```
/// use pooled_dict::{BuildKeyHasher, Dictionary};
///
/// let mut dict = Dictionary::builder()
///     .capacity(1000)
///     .hasher(BuildKeyHasher::new(foldhash::fast::FixedState::with_seed(42)))
///     .build();
///
/// dict.add((1, 2), "pair").unwrap();
/// assert_eq!(dict[&(1, 2)], "pair");
/// ```
///
/// [1]: Dictionary::new
#[must_use]
pub struct DictionaryBuilder<K, V, H = DefaultKeyHasher> {
    capacity: usize,
    hasher: H,

    _entries: PhantomData<fn() -> (K, V)>,
}

impl<K, V, H> fmt::Debug for DictionaryBuilder<K, V, H> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DictionaryBuilder")
            .field("key_type", &format_args!("{}", type_name::<K>()))
            .field("value_type", &format_args!("{}", type_name::<V>()))
            .field("hasher_type", &format_args!("{}", type_name::<H>()))
            .field("capacity", &self.capacity)
            .finish()
    }
}

impl<K, V> DictionaryBuilder<K, V> {
    pub(crate) fn new() -> Self {
        Self {
            capacity: 0,
            hasher: DefaultKeyHasher,
            _entries: PhantomData,
        }
    }
}

impl<K, V, H> DictionaryBuilder<K, V, H> {
    /// Sets the number of entries the dictionary can hold before it first needs to grow.
    ///
    /// By default, no memory is allocated until the first entry is added.
    pub fn capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    /// Sets the hasher that places keys in the index.
    ///
    /// The hasher must produce equal hashes for equal keys, including when a key is looked up
    /// through a borrowed form such as `&str` for a `String` key.
    ///
    /// # Examples
    ///
    /// ```
    /// use pooled_dict::{BuildKeyHasher, Dictionary};
    ///
    /// let dict = Dictionary::<String, u32>::builder()
    ///     .hasher(BuildKeyHasher::new(foldhash::fast::RandomState::default()))
    ///     .build();
    /// ```
    pub fn hasher<H2>(self, hasher: H2) -> DictionaryBuilder<K, V, H2> {
        DictionaryBuilder {
            capacity: self.capacity,
            hasher,
            _entries: PhantomData,
        }
    }

    /// Builds the dictionary with the specified configuration.
    ///
    /// # Examples
    ///
    /// ```
    /// use pooled_dict::Dictionary;
    ///
    /// let dict = Dictionary::<u64, u64>::builder().build();
    /// assert!(dict.is_empty());
    /// ```
    #[must_use]
    pub fn build(self) -> Dictionary<K, V, H> {
        Dictionary::with_capacity_and_hasher(self.capacity, self.hasher)
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use static_assertions::assert_impl_all;

    use super::*;
    use crate::BuildKeyHasher;

    assert_impl_all!(DictionaryBuilder<String, Vec<u8>>: Send, Sync, fmt::Debug);

    #[test]
    fn default_build_is_empty_and_unallocated() {
        let dict = Dictionary::<u32, u32>::builder().build();

        assert!(dict.is_empty());
        assert_eq!(dict.capacity(), 0);
    }

    #[test]
    fn capacity_is_preallocated() {
        let dict = Dictionary::<u32, u32>::builder().capacity(10).build();

        assert!(dict.capacity() >= 10);
        assert!(dict.is_empty());
    }

    #[test]
    fn hasher_is_used() {
        let mut dict = Dictionary::builder()
            .hasher(BuildKeyHasher::<foldhash::fast::FixedState>::default())
            .capacity(4)
            .build();

        dict.add("key".to_string(), 1).unwrap();

        assert_eq!(dict.get("key"), Ok(&1));
        assert!(dict.capacity() >= 4);
    }

    #[test]
    fn debug_shows_configuration() {
        let builder = Dictionary::<u8, u8>::builder().capacity(3);
        let debug = format!("{builder:?}");

        assert!(debug.contains("capacity: 3"));
        assert!(debug.contains("DefaultKeyHasher"));
    }
}
