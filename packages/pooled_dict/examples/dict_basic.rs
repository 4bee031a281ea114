//! Basic usage of the `pooled_dict` crate:
//!
//! * Creating a dictionary.
//! * Adding and looking up entries.
//! * Erasing entries.
//! * Iterating in insertion order.

use pooled_dict::{Dictionary, Error};

fn main() {
    let mut ages = Dictionary::new();

    // Entries remember the order in which they were added.
    ages.add("Charlie".to_string(), 41).unwrap();
    ages.add("Alice".to_string(), 29).unwrap();
    ages.add("Bob".to_string(), 35).unwrap();

    println!(
        "Dictionary contains {} entries, with an auto-adjusting capacity of {}",
        ages.len(),
        ages.capacity()
    );

    // Lookups accept borrowed forms of the key, so no String needs to be allocated here.
    let alice = ages.get("Alice").unwrap();
    println!("Alice is {alice}");

    // Adding a key that is already present is an error and leaves the entry untouched.
    match ages.add("Alice".to_string(), 30) {
        Err(Error::DuplicateKey) => println!("Alice was already added"),
        other => println!("Unexpected result: {other:?}"),
    }

    // Values can be modified in place.
    *ages.get_mut("Bob").unwrap() += 1;

    let charlie = ages.erase("Charlie").unwrap();
    println!("Erased Charlie, who was {charlie}");

    for (name, age) in &ages {
        println!("{name}: {age}");
    }
}
