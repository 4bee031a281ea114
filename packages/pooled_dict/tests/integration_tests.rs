//! Integration tests for the `pooled_dict` package.
//!
//! These exercise the public containers through their public API only, including the
//! building blocks assembled into a container of our own.

use std::ptr::NonNull;
use std::sync::{Arc, Mutex};
use std::thread;

use pooled_dict::{
    Axis, DefaultKeyHasher, Dictionary, Error, HashIndex, IndexAdapter, Links, List, ListAdapter,
    ObjectPool, Sparse2D,
};

#[test]
fn iteration_follows_insertion_order() {
    let mut dict = Dictionary::new();

    dict.add("a".to_string(), 1).unwrap();
    dict.add("b".to_string(), 2).unwrap();
    dict.add("c".to_string(), 3).unwrap();

    let pairs = dict
        .iter()
        .map(|(key, value)| (key.as_str(), *value))
        .collect::<Vec<_>>();
    assert_eq!(pairs, vec![("a", 1), ("b", 2), ("c", 3)]);
}

#[test]
fn erasing_only_key_leaves_empty_dictionary() {
    let mut dict = Dictionary::new();

    dict.add(7_u32, "seven").unwrap();
    assert_eq!(dict.erase(&7), Ok("seven"));

    assert!(!dict.contains(&7));
    assert_eq!(dict.len(), 0);
    assert_eq!(dict.get(&7), Err(Error::KeyNotFound));
    assert_eq!(dict.iter().count(), 0);
}

#[test]
fn erasing_evens_keeps_odds_in_order() {
    let mut dict = Dictionary::new();

    for key in 0..1000_u32 {
        dict.add(key, u64::from(key) * 3).unwrap();
    }

    for key in (0..1000_u32).step_by(2) {
        dict.erase(&key).unwrap();
    }

    assert_eq!(dict.len(), 500);
    assert!(dict.keys().copied().eq((1..1000).step_by(2)));
    assert!(dict.values().copied().eq((1..1000_u64).step_by(2).map(|key| key * 3)));
}

#[test]
fn lookups_probe_past_erased_keys() {
    // With eight slots, 3 and 11 land on the same home slot.
    let mut dict = Dictionary::with_capacity(2);

    dict.add(3_u64, 'x').unwrap();
    dict.add(11_u64, 'y').unwrap();
    dict.erase(&3).unwrap();

    assert_eq!(dict.get(&11), Ok(&'y'));
    assert!(!dict.contains(&3));

    dict.add(3, 'z').unwrap();
    assert_eq!(dict.keys().copied().collect::<Vec<_>>(), vec![11, 3]);
}

#[test]
fn entries_survive_many_resizes() {
    let mut dict = Dictionary::new();

    for key in 0..5000_u64 {
        dict.add(key, key.to_string()).unwrap();
    }

    for key in 0..5000_u64 {
        assert_eq!(dict.get(&key), Ok(&key.to_string()));
    }

    assert!(dict.keys().copied().eq(0..5000));
}

#[test]
fn string_keys_can_be_looked_up_by_str() {
    let mut dict = Dictionary::new();

    dict.add("alpha".to_string(), 1).unwrap();
    dict.add("beta".to_string(), 2).unwrap();

    assert_eq!(dict["alpha"], 1);
    assert_eq!(dict.get_key_value("beta"), Ok((&"beta".to_string(), &2)));
    assert_eq!(dict.erase("gamma"), Err(Error::KeyNotFound));
}

#[test]
fn dictionary_can_be_shared_behind_a_lock() {
    let dict = Arc::new(Mutex::new(Dictionary::<u64, u64>::new()));

    let handles = (0..4_u64)
        .map(|worker| {
            let dict = Arc::clone(&dict);

            thread::spawn(move || {
                for i in 0..100_u64 {
                    dict.lock().unwrap().add(worker * 1000 + i, i).unwrap();
                }
            })
        })
        .collect::<Vec<_>>();

    for handle in handles {
        handle.join().unwrap();
    }

    let dict = dict.lock().unwrap();
    assert_eq!(dict.len(), 400);

    for worker in 0..4_u64 {
        assert_eq!(dict.get(&(worker * 1000 + 99)), Ok(&99));
    }
}

#[test]
fn collected_dictionary_keeps_first_position_of_repeated_keys() {
    let dict = [(1, "one"), (2, "two"), (1, "uno")]
        .into_iter()
        .collect::<Dictionary<i32, &str>>();

    assert_eq!(
        dict.into_iter().collect::<Vec<_>>(),
        vec![(1, "uno"), (2, "two")]
    );
}

#[test]
fn sparse_2d_rows_and_columns() {
    let mut matrix = Sparse2D::new(10, 10);

    matrix.insert(2, 5, "a");
    matrix.insert(2, 1, "b");
    matrix.insert(7, 5, "c");

    assert_eq!(
        matrix.row(2).collect::<Vec<_>>(),
        vec![(2, 5, &"a"), (2, 1, &"b")]
    );
    assert_eq!(
        matrix.column(5).collect::<Vec<_>>(),
        vec![(2, 5, &"a"), (7, 5, &"c")]
    );

    assert_eq!(
        matrix.resize_columns(5),
        Err(Error::LineNotEmpty {
            axis: Axis::Column,
            index: 5
        })
    );

    matrix.clear_column(5);
    matrix.resize_columns(5).unwrap();

    assert_eq!(matrix.len(), 1);
    assert_eq!(matrix.get(2, 1), Some(&"b"));
}

// The building blocks can be assembled into other intrusive containers. This one is a queue of
// jobs that can also be found by name.

struct Job {
    name: &'static str,
    priority: u8,
    queue_links: Links<Job>,
}

enum QueueOrder {}

// SAFETY: Always points at the `queue_links` field.
unsafe impl ListAdapter<Job> for QueueOrder {
    unsafe fn links(node: NonNull<Job>) -> NonNull<Links<Job>> {
        // SAFETY: The caller guarantees the node is live.
        let links = unsafe { &raw mut (*node.as_ptr()).queue_links };

        // SAFETY: A field of a non-null node is itself non-null.
        unsafe { NonNull::new_unchecked(links) }
    }
}

enum ByName {}

// SAFETY: Always points at the `name` field, which is never modified.
unsafe impl IndexAdapter<Job> for ByName {
    type Key = &'static str;

    unsafe fn key<'a>(node: NonNull<Job>) -> &'a &'static str {
        // SAFETY: The caller guarantees the node is live.
        unsafe { &(*node.as_ptr()).name }
    }
}

#[test]
fn building_blocks_compose_into_custom_container() {
    let mut pool = ObjectPool::<Job>::new();
    let mut queue = List::<Job, QueueOrder>::new();
    let mut by_name = HashIndex::<Job, ByName, DefaultKeyHasher>::new(DefaultKeyHasher);

    for (name, priority) in [("build", 2), ("test", 1), ("deploy", 3)] {
        let node = pool.create(Job {
            name,
            priority,
            queue_links: Links::new(),
        });

        // SAFETY: The node is live and not yet in the queue or the index.
        unsafe {
            queue.push_back(node);
        }
        // SAFETY: As above.
        unsafe { by_name.insert(node) }.unwrap();
    }

    let test = by_name.get(&"test").unwrap();
    // SAFETY: The node is live.
    assert_eq!(unsafe { test.as_ref() }.priority, 1);

    // Cancel the "test" job.
    // SAFETY: The node is live and in the index.
    assert!(unsafe { by_name.remove(test) });
    // SAFETY: The node is in the queue.
    unsafe {
        queue.erase(test);
    }
    // SAFETY: The node came from the pool and is no longer referenced.
    let cancelled = unsafe { pool.destroy(test) };
    assert_eq!(cancelled.name, "test");

    let mut order = Vec::new();

    while let Some(node) = queue.pop_front() {
        // SAFETY: The node is live and in the index.
        assert!(unsafe { by_name.remove(node) });
        // SAFETY: The node came from the pool and is no longer referenced.
        order.push(unsafe { pool.destroy(node) }.name);
    }

    assert_eq!(order, vec!["build", "deploy"]);
    assert!(by_name.is_empty());
    assert!(pool.is_empty());
}
