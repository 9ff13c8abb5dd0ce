//! Raw dataset loading and partitioning
//!
//! - [`load`] reads the historical weather/fire CSV and removes exact duplicates
//! - [`RawDataset`] holds the raw numeric columns plus the label source
//! - [`split`] / [`stratified_indices`] produce disjoint, class-stratified partitions

mod dataset;
mod split;

pub use dataset::{load, LabelSource, RawColumn, RawDataset, RawRecord};
pub use split::{split, stratified_indices, LabeledSet, SplitIndices};

use ndarray::Array1;
use std::collections::BTreeMap;

/// Count samples per class. Labels are rounded to the nearest integer.
pub fn class_counts(y: &Array1<f64>) -> BTreeMap<i64, usize> {
    let mut counts = BTreeMap::new();
    for &label in y.iter() {
        *counts.entry(label.round() as i64).or_insert(0) += 1;
    }
    counts
}

/// Indices of the samples of each class, in input order.
pub fn class_indices(y: &Array1<f64>) -> BTreeMap<i64, Vec<usize>> {
    let mut indices = BTreeMap::new();
    for (i, &label) in y.iter().enumerate() {
        indices
            .entry(label.round() as i64)
            .or_insert_with(Vec::new)
            .push(i);
    }
    indices
}
