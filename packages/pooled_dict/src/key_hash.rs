use std::hash::{BuildHasher, Hash};

use foldhash::fast::FixedState;

/// Computes the hash values a [`HashIndex`][crate::HashIndex] uses to place and find keys.
///
/// This is how hashing is injected into the containers of this crate. A hasher may be able to
/// hash several key types (e.g. both `String` and `str`); lookups with a borrowed form of the
/// key require the hasher to produce the same value for the borrowed form as for the owned one.
pub trait KeyHasher<Q: ?Sized> {
    /// Calculates the hash value of `key`.
    fn hash_key(&self, key: &Q) -> u64;
}

/// A key type with a built-in hash, used by [`DefaultKeyHasher`].
///
/// Integers hash to their own value, strings use a fixed-seed string hash and compound keys
/// (tuples, arrays, slices) combine the hashes of their parts. Implement this for your own key
/// types to use them with the default hasher:
///
/// ```
/// use pooled_dict::{Dictionary, KeyHash};
///
/// #[derive(Clone, Copy, Eq, PartialEq)]
/// enum Color {
///     Red,
///     Green,
/// }
///
/// impl KeyHash for Color {
///     fn key_hash(&self) -> u64 {
///         *self as u64
///     }
/// }
///
/// let mut favorites = Dictionary::new();
/// favorites.add(Color::Green, "leaves").unwrap();
/// assert_eq!(favorites.get(&Color::Green), Ok(&"leaves"));
/// assert!(!favorites.contains(&Color::Red));
/// ```
pub trait KeyHash {
    /// Calculates the hash value of `self`.
    fn key_hash(&self) -> u64;
}

/// The hasher used by containers unless configured otherwise. Dispatches to [`KeyHash`].
#[derive(Clone, Copy, Debug, Default)]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
pub struct DefaultKeyHasher;

impl<Q: ?Sized + KeyHash> KeyHasher<Q> for DefaultKeyHasher {
    fn hash_key(&self, key: &Q) -> u64 {
        key.key_hash()
    }
}

/// Adapts a standard library style [`BuildHasher`] to [`KeyHasher`], for keys that implement
/// [`Hash`] but not [`KeyHash`].
///
/// # Example
///
/// ```
/// use pooled_dict::{BuildKeyHasher, Dictionary};
///
/// let mut dict = Dictionary::builder()
///     .hasher(BuildKeyHasher::new(foldhash::fast::RandomState::default()))
///     .build();
///
/// dict.add(vec![1, 2], "list").unwrap();
/// assert_eq!(dict.get(&vec![1, 2]), Ok(&"list"));
/// ```
#[derive(Clone, Debug, Default)]
pub struct BuildKeyHasher<S> {
    build_hasher: S,
}

impl<S> BuildKeyHasher<S> {
    /// Wraps `build_hasher`.
    #[must_use]
    pub fn new(build_hasher: S) -> Self {
        Self { build_hasher }
    }
}

impl<Q: ?Sized + Hash, S: BuildHasher> KeyHasher<Q> for BuildKeyHasher<S> {
    fn hash_key(&self, key: &Q) -> u64 {
        self.build_hasher.hash_one(key)
    }
}

/// Hashes `(row, column)` index pairs with a 64-bit multiply/xor-shift finalizer, which spreads
/// neighboring coordinates across the whole table.
#[derive(Clone, Copy, Debug, Default)]
#[expect(clippy::exhaustive_structs, reason = "intentionally an empty struct")]
pub struct IndexPairHasher;

impl KeyHasher<(usize, usize)> for IndexPairHasher {
    #[allow(
        clippy::cast_possible_truncation,
        reason = "usize is at most 64 bits on every supported target"
    )]
    fn hash_key(&self, &(row, column): &(usize, usize)) -> u64 {
        let row = row as u64;
        let column = column as u64;

        let mut hash = (row << 32)
            .wrapping_add(row >> 32)
            .wrapping_add(column);
        hash ^= hash >> 23;
        hash = hash.wrapping_mul(0x2127_599b_f432_5c37);
        hash ^= hash >> 47;
        hash
    }
}

/// Mixes the hash of a leading element into the combined hash of the elements after it.
#[must_use]
pub(crate) fn combine(first: u64, rest: u64) -> u64 {
    first
        ^ rest
            .wrapping_add(0x9e37_79b9)
            .wrapping_add(first << 6)
            .wrapping_add(first >> 2)
}

macro_rules! identity_key_hash {
    ($($t:ty),*) => {
        $(
            impl KeyHash for $t {
                #[allow(
                    clippy::cast_sign_loss,
                    clippy::cast_lossless,
                    clippy::cast_possible_truncation,
                    reason = "integers hash to their own bit pattern, widened or wrapped to 64 bits"
                )]
                fn key_hash(&self) -> u64 {
                    *self as u64
                }
            }
        )*
    };
}

identity_key_hash!(u8, u16, u32, u64, usize, i8, i16, i32, i64, isize);

impl KeyHash for u128 {
    #[expect(
        clippy::cast_possible_truncation,
        reason = "the two halves are folded together on purpose"
    )]
    fn key_hash(&self) -> u64 {
        (*self as u64) ^ ((*self >> 64) as u64)
    }
}

impl KeyHash for i128 {
    #[expect(
        clippy::cast_sign_loss,
        reason = "we only care about the bit pattern"
    )]
    fn key_hash(&self) -> u64 {
        (*self as u128).key_hash()
    }
}

impl KeyHash for bool {
    fn key_hash(&self) -> u64 {
        u64::from(*self)
    }
}

impl KeyHash for char {
    fn key_hash(&self) -> u64 {
        u64::from(u32::from(*self))
    }
}

impl KeyHash for str {
    fn key_hash(&self) -> u64 {
        FixedState::default().hash_one(self)
    }
}

impl KeyHash for String {
    fn key_hash(&self) -> u64 {
        self.as_str().key_hash()
    }
}

impl KeyHash for Box<str> {
    fn key_hash(&self) -> u64 {
        (**self).key_hash()
    }
}

impl<T: KeyHash + ?Sized> KeyHash for &T {
    fn key_hash(&self) -> u64 {
        (**self).key_hash()
    }
}

impl<T: KeyHash> KeyHash for [T] {
    fn key_hash(&self) -> u64 {
        self.iter()
            .rev()
            .fold(0, |rest, item| combine(item.key_hash(), rest))
    }
}

impl<T: KeyHash, const N: usize> KeyHash for [T; N] {
    fn key_hash(&self) -> u64 {
        self.as_slice().key_hash()
    }
}

impl<T: KeyHash> KeyHash for Vec<T> {
    fn key_hash(&self) -> u64 {
        self.as_slice().key_hash()
    }
}

impl KeyHash for () {
    fn key_hash(&self) -> u64 {
        0
    }
}

macro_rules! tuple_key_hash {
    ($(($($name:ident),+)),+) => {
        $(
            impl<$($name: KeyHash),+> KeyHash for ($($name,)+) {
                #[allow(non_snake_case, reason = "reusing the type parameter names as bindings")]
                fn key_hash(&self) -> u64 {
                    let ($($name,)+) = self;
                    tuple_key_hash!(@fold $($name),+)
                }
            }
        )+
    };
    (@fold $first:ident) => {
        combine($first.key_hash(), 0)
    };
    (@fold $first:ident, $($rest:ident),+) => {
        combine($first.key_hash(), tuple_key_hash!(@fold $($rest),+))
    };
}

tuple_key_hash!((A), (A, B), (A, B, C), (A, B, C, D));

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use foldhash::fast::RandomState;

    use super::*;

    #[test]
    fn integers_hash_to_themselves() {
        assert_eq!(42_u8.key_hash(), 42);
        assert_eq!(1234_usize.key_hash(), 1234);
        assert_eq!((-1_i32).key_hash(), u64::MAX);
        assert_eq!(u64::MAX.key_hash(), u64::MAX);
        assert_eq!(true.key_hash(), 1);
        assert_eq!('A'.key_hash(), 65);
    }

    #[test]
    fn owned_and_borrowed_strings_agree() {
        let owned = "hello".to_string();

        assert_eq!(owned.key_hash(), "hello".key_hash());
        assert_eq!(Box::<str>::from("hello").key_hash(), "hello".key_hash());
        assert_ne!("hello".key_hash(), "world".key_hash());

        let hasher = DefaultKeyHasher;
        assert_eq!(
            KeyHasher::<String>::hash_key(&hasher, &owned),
            KeyHasher::<str>::hash_key(&hasher, "hello")
        );
    }

    #[test]
    fn tuples_combine_parts() {
        assert_eq!((7_u32,).key_hash(), combine(7, 0));
        assert_eq!((1_u32, 2_u32).key_hash(), combine(1, combine(2, 0)));
        assert_ne!((1_u32, 2_u32).key_hash(), (2_u32, 1_u32).key_hash());
    }

    #[test]
    fn combine_matches_reference_formula() {
        assert_eq!(combine(0, 0), 0x9e37_79b9);
        assert_eq!(combine(1, 0), 1 ^ (0x9e37_79b9 + 64));
    }

    #[test]
    fn sequences_agree_with_their_slices() {
        let vec = vec![3_u16, 4, 5];

        assert_eq!(vec.key_hash(), vec.as_slice().key_hash());
        assert_eq!([3_u16, 4, 5].key_hash(), vec.key_hash());
        assert_eq!(vec.key_hash(), (3_u16, 4_u16, 5_u16).key_hash());
    }

    #[test]
    fn index_pair_hasher_spreads_neighbors() {
        let hasher = IndexPairHasher;

        let a = hasher.hash_key(&(0, 0));
        let b = hasher.hash_key(&(0, 1));
        let c = hasher.hash_key(&(1, 0));

        assert_eq!(a, 0);
        assert_ne!(b, c);
        // Neighbors differ in more than the lowest bits.
        assert!((b ^ c) >> 8 != 0);
    }

    #[test]
    fn build_key_hasher_agrees_for_borrowed_forms() {
        let hasher = BuildKeyHasher::new(RandomState::default());

        let owned = "key".to_string();
        assert_eq!(
            KeyHasher::<String>::hash_key(&hasher, &owned),
            KeyHasher::<str>::hash_key(&hasher, "key")
        );
    }
}
