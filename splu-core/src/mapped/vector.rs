use std::fmt::Debug;
use std::hash::Hash;
use std::ops::{Add, AddAssign};
use std::sync::Arc;

use bimap::BiHashMap;
use serde::{Deserialize, Serialize};

use super::matrix::MappedMatrix;
use super::LabelMap;
use crate::error::{SpluError, SpluResult};
use crate::linalg::sparse;

/// Dense vector whose entries are addressed by label.
///
/// Serializes as its label map plus values; a deserialized vector owns a
/// fresh copy of the labels.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MappedVector<T>
where
    T: Eq + Hash,
{
    mapping: LabelMap<T>,
    values: Vec<f64>,
}

impl<T> MappedVector<T>
where
    T: Eq + Hash + Clone,
{
    /// Zero vector over `mapping`.
    pub fn zeros(mapping: LabelMap<T>) -> Self {
        let n = mapping.len();
        Self {
            mapping,
            values: vec![0.0; n],
        }
    }

    /// Wrap `values` (indexed like `mapping`).
    pub fn from_values(mapping: LabelMap<T>, values: Vec<f64>) -> SpluResult<Self> {
        if values.len() != mapping.len() {
            return Err(SpluError::LabelMismatch(format!(
                "{} values for {} labels",
                values.len(),
                mapping.len()
            )));
        }
        Ok(Self { mapping, values })
    }

    /// Build from `(label, value)` pairs; labels get indices in order of
    /// first appearance and repeated labels accumulate.
    pub fn from_pairs<I>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (T, f64)>,
    {
        let mut mapping = BiHashMap::new();
        let mut values = Vec::new();
        for (label, value) in pairs {
            if let Some(&i) = mapping.get_by_left(&label) {
                values[i] += value;
                continue;
            }
            mapping.insert(label, values.len());
            values.push(value);
        }
        Self {
            mapping: Arc::new(mapping),
            values,
        }
    }

    pub fn mapping(&self) -> &LabelMap<T> {
        &self.mapping
    }

    pub fn values(&self) -> &[f64] {
        &self.values
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn contains(&self, label: &T) -> bool {
        self.mapping.contains_left(label)
    }

    /// Index of `label`.
    pub fn row(&self, label: &T) -> Option<usize> {
        self.mapping.get_by_left(label).copied()
    }

    /// Label at `index`.
    pub fn irow(&self, index: usize) -> Option<&T> {
        self.mapping.get_by_right(&index)
    }

    pub fn get(&self, label: &T) -> Option<f64> {
        self.row(label).map(|i| self.values[i])
    }

    fn index_of(&self, label: &T) -> SpluResult<usize>
    where
        T: Debug,
    {
        self.row(label).ok_or_else(|| SpluError::UnknownLabel(format!("{:?}", label)))
    }

    /// Overwrite the value at `label`, returning the previous one.
    pub fn set(&mut self, label: &T, value: f64) -> SpluResult<f64>
    where
        T: Debug,
    {
        let i = self.index_of(label)?;
        Ok(std::mem::replace(&mut self.values[i], value))
    }

    /// Add `value` to the entry at `label`, returning the previous value.
    pub fn accumulate(&mut self, label: &T, value: f64) -> SpluResult<f64>
    where
        T: Debug,
    {
        let i = self.index_of(label)?;
        let old = self.values[i];
        self.values[i] += value;
        Ok(old)
    }

    /// `(label, value)` pairs in index order.
    pub fn iter(&self) -> impl Iterator<Item = (&T, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(move |(i, &v)| self.mapping.get_by_right(&i).map(|label| (label, v)))
    }

    /// Diagonal matrix with this vector on the diagonal.
    pub fn diag(&self) -> MappedMatrix<T, T> {
        MappedMatrix::from_parts(
            self.mapping.clone(),
            self.mapping.clone(),
            sparse::diagonal(&self.values),
        )
    }

    pub(crate) fn same_labels(&self, mapping: &LabelMap<T>) -> bool {
        Arc::ptr_eq(&self.mapping, mapping) || *self.mapping == **mapping
    }
}

/// Build a [`MappedVector`] from `label => value` pairs.
///
/// Labels are indexed in order of first appearance; repeated labels
/// accumulate.
///
/// ```
/// use splu_core::MV;
///
/// let v = MV!("steel" => 2.0, "power" => 0.5, "steel" => 1.0);
/// assert_eq!(v.len(), 2);
/// assert_eq!(v.get(&"steel"), Some(3.0));
/// ```
#[macro_export]
macro_rules! MV {
    ($($label:expr => $val:expr),* $(,)?) => {
        $crate::mapped::MappedVector::from_pairs(::std::vec![$(($label, $val)),*])
    };
}

impl<T> Add for MappedVector<T>
where
    T: Eq + Hash + Clone,
{
    type Output = Self;

    fn add(mut self, other: Self) -> Self {
        self += other;
        self
    }
}

impl<T> AddAssign for MappedVector<T>
where
    T: Eq + Hash + Clone,
{
    /// Both operands must share a label mapping.
    fn add_assign(&mut self, rhs: Self) {
        debug_assert!(rhs.same_labels(&self.mapping), "adding vectors with different labels");
        for (l, r) in self.values.iter_mut().zip(rhs.values) {
            *l += r;
        }
    }
}
