#![cfg_attr(coverage_nightly, feature(coverage_attribute))]

//! An insertion-ordered dictionary assembled from reusable intrusive building blocks.
//!
//! The main type is [`Dictionary`], a map that remembers the order in which keys were added
//! and looks them up in expected constant time. Each entry is stored exactly once, in a node
//! taken from a pool. The same node is linked into an intrusive list, which gives the iteration
//! order, and is referenced from an open-addressing hash index, which gives the lookup.
//!
//! The building blocks are public and can be combined into other containers:
//!
//! * [`PoolAllocator`] hands out fixed-size memory slots from large blocks and recycles them.
//! * [`ObjectPool<T>`] builds on the allocator to construct and destroy typed objects.
//! * [`List<N, A>`] is a doubly linked list threaded through link fields embedded in the nodes
//!   themselves. One node can be in several lists at once, one per [`ListAdapter`].
//! * [`HashIndex<N, A, H>`] maps the key embedded in each node (located by an
//!   [`IndexAdapter`]) to the node, with hashing injected through [`KeyHasher`].
//!
//! [`Sparse2D<V>`] is a second container built from the same parts: a sparse two-dimensional
//! array where every item is linked into both its row and its column.
//!
//! # Examples
//!
//! ```
//! use pooled_dict::{Dictionary, Error};
//!
//! let mut inventory = Dictionary::new();
//!
//! inventory.add("apples".to_string(), 3).unwrap();
//! inventory.add("pears".to_string(), 0).unwrap();
//! inventory.add("plums".to_string(), 12).unwrap();
//!
//! // Keys can only be added once.
//! assert_eq!(
//!     inventory.add("pears".to_string(), 5),
//!     Err(Error::DuplicateKey)
//! );
//!
//! *inventory.get_mut("pears").unwrap() += 5;
//! assert_eq!(inventory.erase("apples"), Ok(3));
//!
//! // Iteration follows the order in which keys were added.
//! let listed = inventory
//!     .iter()
//!     .map(|(name, count)| format!("{name}={count}"))
//!     .collect::<Vec<_>>();
//! assert_eq!(listed, ["pears=5", "plums=12"]);
//! ```
//!
//! # Thread safety
//!
//! The containers are [`Send`] and [`Sync`] when their contents are, so they can be moved
//! between threads or shared behind a lock. They perform no synchronization of their own.
//!
//! # Logging
//!
//! Storage growth and index rebuilds are reported as `trace` level events via [`tracing`].

mod builder;
mod dictionary;
mod error;
mod hash_index;
mod key_hash;
mod list;
mod object_pool;
mod pool_allocator;
mod sparse_2d;

pub use builder::*;
pub use dictionary::*;
pub use error::*;
pub use hash_index::*;
pub use key_hash::*;
pub use list::*;
pub use object_pool::*;
pub use pool_allocator::*;
pub use sparse_2d::*;
