//! # Parameter sets
//!
//! A [`ParameterSet`] bundles the positional and keyword arguments of one call.
//! The same call signature is carried through every stage of dispatch by
//! mapping its values: domain values become payloads, payloads are merged, and
//! the merged result is mapped back.

use std::collections::BTreeMap;
use std::fmt;
use serde::{Deserialize, Serialize};
use crate::error::{Result, RobataError};

/// Identifies one argument of a call.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArgKey {
    Positional(usize),
    Named(String),
}

impl ArgKey {
    pub fn named(name: impl Into<String>) -> Self {
        ArgKey::Named(name.into())
    }
}

impl fmt::Display for ArgKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ArgKey::Positional(index) => write!(f, "#{index}"),
            ArgKey::Named(name) => f.write_str(name),
        }
    }
}

impl From<usize> for ArgKey {
    fn from(index: usize) -> Self {
        ArgKey::Positional(index)
    }
}

impl From<&str> for ArgKey {
    fn from(name: &str) -> Self {
        ArgKey::Named(name.to_string())
    }
}

/// # ParameterSet
///
/// Ordered positional values plus uniquely named keyword values.
///
/// Keyword arguments are unordered from the caller's point of view; they are
/// kept sorted by name so that iteration is deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet<T> {
    args: Vec<T>,
    kwargs: BTreeMap<String, T>,
}

impl<T> Default for ParameterSet<T> {
    fn default() -> Self {
        Self { args: Vec::new(), kwargs: BTreeMap::new() }
    }
}

impl<T> ParameterSet<T> {
    /// A parameter set with positional arguments only
    pub fn new(args: Vec<T>) -> Self {
        Self { args, kwargs: BTreeMap::new() }
    }

    /// Builds a parameter set from positional and keyword arguments.
    ///
    /// Fails with [`RobataError::DuplicateKeyword`] if a keyword appears twice.
    pub fn from_parts<K, I>(args: Vec<T>, kwargs: I) -> Result<Self>
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, T)>,
    {
        kwargs
            .into_iter()
            .try_fold(Self::new(args), |set, (key, value)| set.with_kwarg(key, value))
    }

    /// Adds one keyword argument.
    pub fn with_kwarg(mut self, key: impl Into<String>, value: T) -> Result<Self> {
        let key = key.into();
        if self.kwargs.contains_key(&key) {
            return Err(RobataError::DuplicateKeyword(key));
        }
        self.kwargs.insert(key, value);
        Ok(self)
    }

    /// A single positional argument
    pub fn single(value: T) -> Self {
        Self::new(vec![value])
    }

    pub fn args(&self) -> &[T] {
        &self.args
    }

    pub fn kwargs(&self) -> &BTreeMap<String, T> {
        &self.kwargs
    }

    pub fn get(&self, key: &ArgKey) -> Option<&T> {
        match key {
            ArgKey::Positional(index) => self.args.get(*index),
            ArgKey::Named(name) => self.kwargs.get(name),
        }
    }

    /// Total number of arguments
    pub fn len(&self) -> usize {
        self.args.len() + self.kwargs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Every argument key: positional keys in order, then keyword keys by name.
    pub fn keys(&self) -> impl Iterator<Item = ArgKey> + '_ {
        (0..self.args.len())
            .map(ArgKey::Positional)
            .chain(self.kwargs.keys().cloned().map(ArgKey::Named))
    }

    pub fn iter(&self) -> impl Iterator<Item = (ArgKey, &T)> + '_ {
        self.args
            .iter()
            .enumerate()
            .map(|(index, value)| (ArgKey::Positional(index), value))
            .chain(self.kwargs.iter().map(|(name, value)| (ArgKey::Named(name.clone()), value)))
    }

    /// True if both sets have the same arity and the same keyword names.
    pub fn same_signature<U>(&self, other: &ParameterSet<U>) -> bool {
        self.args.len() == other.args.len() && self.kwargs.keys().eq(other.kwargs.keys())
    }

    /// Applies `transform` to every value, keeping arity and keyword names.
    pub fn map<U, F>(self, mut transform: F) -> ParameterSet<U>
    where
        F: FnMut(T) -> U,
    {
        self.map_with_key(|_, value| transform(value))
    }

    /// Like [`ParameterSet::map`], with the argument key passed to the transform.
    pub fn map_with_key<U, F>(self, mut transform: F) -> ParameterSet<U>
    where
        F: FnMut(&ArgKey, T) -> U,
    {
        let args = self
            .args
            .into_iter()
            .enumerate()
            .map(|(index, value)| transform(&ArgKey::Positional(index), value))
            .collect();
        let kwargs = self
            .kwargs
            .into_iter()
            .map(|(name, value)| {
                let mapped = transform(&ArgKey::Named(name.clone()), value);
                (name, mapped)
            })
            .collect();
        ParameterSet { args, kwargs }
    }

    /// Applies a fallible transform to every value, stopping at the first error.
    pub fn try_map<U, F>(self, mut transform: F) -> Result<ParameterSet<U>>
    where
        F: FnMut(&ArgKey, T) -> Result<U>,
    {
        let mut args = Vec::with_capacity(self.args.len());
        for (index, value) in self.args.into_iter().enumerate() {
            args.push(transform(&ArgKey::Positional(index), value)?);
        }
        let mut kwargs = BTreeMap::new();
        for (name, value) in self.kwargs {
            let mapped = transform(&ArgKey::Named(name.clone()), value)?;
            kwargs.insert(name, mapped);
        }
        Ok(ParameterSet { args, kwargs })
    }

    /// Borrowing view of the same call signature.
    pub fn by_ref(&self) -> ParameterSet<&T> {
        ParameterSet {
            args: self.args.iter().collect(),
            kwargs: self.kwargs.iter().map(|(name, value)| (name.clone(), value)).collect(),
        }
    }
}
