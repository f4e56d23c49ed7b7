#![forbid(unsafe_code)]

//! Argument lists carried by settlement and progress events.

use std::ops::Index;

use serde_json::Value;

/// The ordered arguments of one resolve, reject or notify.
///
/// Most events carry a single value; [`Args::none`] and [`Args::many`] cover
/// the empty and multi-value cases.
#[derive(Debug, Clone, PartialEq)]
pub struct Args<V>(Vec<V>);

impl<V> Args<V> {
    #[must_use]
    pub const fn none() -> Self {
        Self(Vec::new())
    }

    #[must_use]
    pub fn one(value: V) -> Self {
        Self(vec![value])
    }

    #[must_use]
    pub fn many(values: Vec<V>) -> Self {
        Self(values)
    }

    #[must_use]
    pub fn first(&self) -> Option<&V> {
        self.0.first()
    }

    #[must_use]
    pub fn get(&self, index: usize) -> Option<&V> {
        self.0.get(index)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, V> {
        self.0.iter()
    }

    #[must_use]
    pub fn as_slice(&self) -> &[V] {
        &self.0
    }

    #[must_use]
    pub fn into_vec(self) -> Vec<V> {
        self.0
    }
}

impl<V> Default for Args<V> {
    fn default() -> Self {
        Self::none()
    }
}

impl<V> From<Vec<V>> for Args<V> {
    fn from(values: Vec<V>) -> Self {
        Self(values)
    }
}

impl<V> FromIterator<V> for Args<V> {
    fn from_iter<I: IntoIterator<Item = V>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<V> IntoIterator for Args<V> {
    type Item = V;
    type IntoIter = std::vec::IntoIter<V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}

impl<'a, V> IntoIterator for &'a Args<V> {
    type Item = &'a V;
    type IntoIter = std::slice::Iter<'a, V>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl<V> Index<usize> for Args<V> {
    type Output = V;

    fn index(&self, index: usize) -> &V {
        &self.0[index]
    }
}

/// A value that can travel through results and be joined by `when`.
pub trait Payload: Clone + 'static {
    /// Fold the arguments of one event into a single positional slot.
    ///
    /// No arguments map to the payload's "absent" value, one argument to
    /// itself, and several to a sub-sequence.
    fn collapse(args: Args<Self>) -> Self;
}

impl Payload for Value {
    fn collapse(args: Args<Self>) -> Self {
        let mut values = args.into_vec();
        match values.len() {
            0 => Value::Null,
            1 => values.pop().unwrap_or(Value::Null),
            _ => Value::Array(values),
        }
    }
}
