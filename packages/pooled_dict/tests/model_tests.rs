//! Randomized tests that drive the containers with long sequences of operations and compare
//! every observable result against a simple vector-based model.

#![allow(clippy::indexing_slicing, reason = "panic is fine in tests")]

use std::mem;

use pooled_dict::{Dictionary, Error, Sparse2D};
use rand::rngs::SmallRng;
use rand::{Rng, SeedableRng};

const OPERATIONS: usize = 20_000;

#[test]
fn dictionary_matches_ordered_vec_model() {
    for seed in [1, 2, 3, 0xdead_beef] {
        let mut rng = SmallRng::seed_from_u64(seed);
        let mut dict = Dictionary::<u32, u64>::new();
        let mut model: Vec<(u32, u64)> = Vec::new();

        for step in 0..OPERATIONS {
            let key = rng.random_range(0..300_u32);
            let position = model.iter().position(|(k, _)| *k == key);

            match rng.random_range(0..10) {
                0..=3 => {
                    let value = u64::try_from(step).unwrap();
                    let result = dict.add(key, value).map(|v| *v);

                    if position.is_some() {
                        assert_eq!(result, Err(Error::DuplicateKey));
                    } else {
                        assert_eq!(result, Ok(value));
                        model.push((key, value));
                    }
                }
                4..=6 => {
                    let result = dict.erase(&key);

                    match position {
                        Some(position) => assert_eq!(result, Ok(model.remove(position).1)),
                        None => assert_eq!(result, Err(Error::KeyNotFound)),
                    }
                }
                7 | 8 => {
                    let expected = position.map(|position| &model[position].1);
                    assert_eq!(dict.get(&key).ok(), expected);
                }
                _ => {
                    if let Ok(value) = dict.get_mut(&key) {
                        *value += 1;
                    }

                    if let Some(position) = position {
                        model[position].1 += 1;
                    }
                }
            }

            assert_eq!(dict.len(), model.len());
        }

        let actual = dict.iter().map(|(k, v)| (*k, *v)).collect::<Vec<_>>();
        assert_eq!(actual, model);
        assert_eq!(dict.first().map(|(k, _)| *k), model.first().map(|(k, _)| *k));
        assert_eq!(dict.last().map(|(k, _)| *k), model.last().map(|(k, _)| *k));
    }
}

#[test]
fn sparse_2d_matches_ordered_vec_model() {
    const ROWS: usize = 12;
    const COLUMNS: usize = 9;

    let mut rng = SmallRng::seed_from_u64(42);
    let mut matrix = Sparse2D::<usize>::new(ROWS, COLUMNS);
    let mut model: Vec<(usize, usize, usize)> = Vec::new();

    for step in 0..OPERATIONS {
        let row = rng.random_range(0..ROWS);
        let column = rng.random_range(0..COLUMNS);
        let position = model.iter().position(|(r, c, _)| (*r, *c) == (row, column));

        match rng.random_range(0..22) {
            0..=8 => {
                let previous = matrix.insert(row, column, step);

                match position {
                    Some(position) => {
                        let old = mem::replace(&mut model[position].2, step);
                        assert_eq!(previous, Some(old));
                    }
                    None => {
                        assert_eq!(previous, None);
                        model.push((row, column, step));
                    }
                }
            }
            9..=14 => {
                let removed = matrix.remove(row, column);
                let expected = position.map(|position| model.remove(position).2);
                assert_eq!(removed, expected);
            }
            15..=17 => {
                let expected = position.map(|position| &model[position].2);
                assert_eq!(matrix.get(row, column), expected);
            }
            18 => {
                let visited = matrix
                    .row_mut(row)
                    .map(|(r, c, value)| {
                        *value = value.wrapping_add(1);
                        (r, c)
                    })
                    .collect::<Vec<_>>();

                let mut expected = Vec::new();

                for (r, c, value) in &mut model {
                    if *r == row {
                        *value = value.wrapping_add(1);
                        expected.push((*r, *c));
                    }
                }

                assert_eq!(visited, expected);
            }
            19 => {
                for (_, _, value) in matrix.column_mut(column).rev() {
                    *value = value.wrapping_mul(3);
                }

                for (_, c, value) in &mut model {
                    if *c == column {
                        *value = value.wrapping_mul(3);
                    }
                }
            }
            20 => {
                matrix.clear_row(row);
                model.retain(|(r, _, _)| *r != row);
            }
            _ => {
                matrix.clear_column(column);
                model.retain(|(_, c, _)| *c != column);
            }
        }

        assert_eq!(matrix.len(), model.len());
    }

    for row in 0..ROWS {
        let expected = model
            .iter()
            .filter(|(r, _, _)| *r == row)
            .map(|(r, c, v)| (*r, *c, v))
            .collect::<Vec<_>>();
        assert_eq!(matrix.row(row).collect::<Vec<_>>(), expected);
    }

    for column in 0..COLUMNS {
        let expected = model
            .iter()
            .filter(|(_, c, _)| *c == column)
            .map(|(r, c, v)| (*r, *c, v))
            .collect::<Vec<_>>();
        assert_eq!(matrix.column(column).collect::<Vec<_>>(), expected);
    }
}
