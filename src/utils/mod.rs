//! Utility functions for matrix operations.

mod matrix;

pub use matrix::{
    build_design_matrix, center_column, column_matrix, detect_constant_columns, fitted_values,
    invert_cross_product, median, row_dot, trace, PIVOT_TOLERANCE,
};
