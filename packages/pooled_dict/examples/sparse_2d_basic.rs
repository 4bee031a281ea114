//! Basic usage of the `Sparse2D` container from the `pooled_dict` crate:
//!
//! * Storing values in a large but mostly empty grid.
//! * Walking one row or one column.
//! * Clearing and resizing lines.

use pooled_dict::Sparse2D;

fn main() {
    // A million cells, but memory is only used for the ones that hold a value.
    let mut distances = Sparse2D::new(1000, 1000);

    distances.insert(10, 20, 5.5);
    distances.insert(10, 400, 1.25);
    distances.insert(999, 20, 7.0);

    // Walking a row visits only the occupied cells, in the order they were inserted.
    for (row, column, distance) in distances.row(10) {
        println!("({row}, {column}) = {distance}");
    }

    // Values can also be updated while walking a line.
    for (_, _, distance) in distances.column_mut(20) {
        *distance *= 2.0;
    }

    println!("Column 20 holds {} values", distances.column_len(20));

    // Vacant cells can be read with a fallback value.
    println!("(0, 0) = {}", distances.get_or(0, 0, &f64::INFINITY));

    // Rows that still hold values cannot be removed by shrinking.
    if let Err(error) = distances.resize_rows(500) {
        println!("Cannot shrink: {error}");
    }

    distances.clear_row(999);
    distances.resize_rows(500).unwrap();

    println!(
        "Grid is now {} by {} with {} values",
        distances.row_count(),
        distances.column_count(),
        distances.len()
    );
}
