//! Path-based traversal of nested value trees

use crate::hasher::ContentHasher;
use crate::value::Value;
use std::fmt;
use thiserror::Error;

/// One step into a container
#[derive(Debug, Clone, PartialEq)]
pub enum PathKey {
    /// Position in a list, tuple or set
    Index(usize),
    /// Key in a map
    Key(Value),
}

/// Path from the root of a tree to one of its nodes
pub type ValuePath = Vec<PathKey>;

impl From<usize> for PathKey {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for PathKey {
    fn from(key: &str) -> Self {
        Self::Key(Value::from(key))
    }
}

impl fmt::Display for PathKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "[{i}]"),
            Self::Key(Value::Str(s)) => write!(f, ".{s}"),
            Self::Key(other) => write!(f, "[{other:?}]"),
        }
    }
}

/// Render a path as `.a[0].b`
pub fn format_path(path: &[PathKey]) -> String {
    if path.is_empty() {
        return ".".to_string();
    }
    path.iter().map(ToString::to_string).collect()
}

/// Errors from path-based mutation
#[derive(Debug, Error, PartialEq)]
pub enum PathError {
    /// The empty path has no parent to mutate
    #[error("the empty path refers to the root and cannot be removed")]
    EmptyPath,
    /// A prefix of the path does not exist
    #[error("no value at {0}")]
    NotFound(String),
    /// A path step does not fit the container it is applied to
    #[error("cannot apply {key} to a {type_name} at {at}")]
    Mismatch {
        /// Offending step
        key: String,
        /// Type found at that position
        type_name: &'static str,
        /// Path of the container
        at: String,
    },
}

/// Depth-first, pre-order iterator over every node below a root
///
/// Yields `(path, node)` pairs; children are visited in container order.
pub struct Walker<'a> {
    stack: Vec<(ValuePath, &'a Value)>,
}

impl<'a> Walker<'a> {
    /// Walk all descendants of `root`
    pub fn new(root: &'a Value) -> Self {
        let mut walker = Self { stack: Vec::new() };
        walker.push_children(&[], root);
        walker
    }

    fn push_children(&mut self, path: &[PathKey], node: &'a Value) {
        let child = |key: PathKey| {
            let mut p = path.to_vec();
            p.push(key);
            p
        };

        match node {
            Value::List(items) | Value::Tuple(items) | Value::Set(items) => {
                for (i, item) in items.iter().enumerate().rev() {
                    self.stack.push((child(PathKey::Index(i)), item));
                }
            }
            Value::Map(entries) => {
                for (key, value) in entries.iter().rev() {
                    self.stack.push((child(PathKey::Key(key.clone())), value));
                }
            }
            _ => {}
        }
    }
}

impl<'a> Iterator for Walker<'a> {
    type Item = (ValuePath, &'a Value);

    fn next(&mut self) -> Option<Self::Item> {
        let (path, node) = self.stack.pop()?;
        self.push_children(&path, node);
        Some((path, node))
    }
}

fn is_container(value: &Value) -> bool {
    matches!(
        value,
        Value::List(_) | Value::Tuple(_) | Value::Set(_) | Value::Map(_)
    )
}

fn step<'v>(node: &'v Value, key: &PathKey) -> Option<&'v Value> {
    match (node, key) {
        (Value::List(items) | Value::Tuple(items) | Value::Set(items), PathKey::Index(i)) => {
            items.get(*i)
        }
        (Value::Map(entries), PathKey::Key(k)) => {
            entries.iter().find(|(ek, _)| ek == k).map(|(_, v)| v)
        }
        _ => None,
    }
}

fn step_mut<'v>(node: &'v mut Value, key: &PathKey) -> Option<&'v mut Value> {
    match (node, key) {
        (Value::List(items) | Value::Tuple(items) | Value::Set(items), PathKey::Index(i)) => {
            items.get_mut(*i)
        }
        (Value::Map(entries), PathKey::Key(k)) => {
            entries.iter_mut().find(|(ek, _)| ek == k).map(|(_, v)| v)
        }
        _ => None,
    }
}

impl Value {
    /// Iterate every node below this one
    pub fn walk(&self) -> Walker<'_> {
        Walker::new(self)
    }

    /// Iterate the non-container nodes below this one
    pub fn leaves(&self) -> impl Iterator<Item = (ValuePath, &Value)> {
        self.walk().filter(|(_, v)| !is_container(v))
    }

    /// Node at `path`, if every step exists
    pub fn get_path(&self, path: &[PathKey]) -> Option<&Value> {
        path.iter().try_fold(self, step)
    }

    /// Mutable node at `path`, if every step exists
    pub fn get_path_mut(&mut self, path: &[PathKey]) -> Option<&mut Value> {
        let mut node = self;
        for key in path {
            node = step_mut(node, key)?;
        }
        Some(node)
    }

    /// Store `value` at `path`, returning the value it replaced
    ///
    /// Map keys that do not exist yet are appended; sequence indices must
    /// already exist. The empty path replaces the whole tree.
    pub fn set_path(&mut self, path: &[PathKey], value: Value) -> Result<Option<Value>, PathError> {
        let Some((last, parent_path)) = path.split_last() else {
            return Ok(Some(std::mem::replace(self, value)));
        };
        let parent = self
            .get_path_mut(parent_path)
            .ok_or_else(|| PathError::NotFound(format_path(parent_path)))?;

        match (parent, last) {
            (Value::List(items) | Value::Tuple(items) | Value::Set(items), PathKey::Index(i)) => {
                match items.get_mut(*i) {
                    Some(slot) => Ok(Some(std::mem::replace(slot, value))),
                    None => Err(PathError::NotFound(format_path(path))),
                }
            }
            (Value::Map(entries), PathKey::Key(k)) => {
                match entries.iter().position(|(ek, _)| ek == k) {
                    Some(pos) => Ok(Some(std::mem::replace(&mut entries[pos].1, value))),
                    None => {
                        entries.push((k.clone(), value));
                        Ok(None)
                    }
                }
            }
            (other, key) => Err(PathError::Mismatch {
                key: key.to_string(),
                type_name: other.type_name(),
                at: format_path(parent_path),
            }),
        }
    }

    /// Remove and return the node at `path`
    pub fn remove_path(&mut self, path: &[PathKey]) -> Result<Value, PathError> {
        let (last, parent_path) = path.split_last().ok_or(PathError::EmptyPath)?;
        let parent = self
            .get_path_mut(parent_path)
            .ok_or_else(|| PathError::NotFound(format_path(parent_path)))?;

        match (parent, last) {
            (Value::List(items) | Value::Tuple(items) | Value::Set(items), PathKey::Index(i)) => {
                if *i < items.len() {
                    Ok(items.remove(*i))
                } else {
                    Err(PathError::NotFound(format_path(path)))
                }
            }
            (Value::Map(entries), PathKey::Key(k)) => entries
                .iter()
                .position(|(ek, _)| ek == k)
                .map(|pos| entries.remove(pos).1)
                .ok_or_else(|| PathError::NotFound(format_path(path))),
            (other, key) => Err(PathError::Mismatch {
                key: key.to_string(),
                type_name: other.type_name(),
                at: format_path(parent_path),
            }),
        }
    }
}

/// Tolerances for [`allclose`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Tolerance {
    /// Relative tolerance, scaled by the larger magnitude
    pub rel: f64,
    /// Absolute tolerance
    pub abs: f64,
}

impl Default for Tolerance {
    fn default() -> Self {
        Self { rel: 1e-9, abs: 0.0 }
    }
}

impl Tolerance {
    fn is_close(&self, a: f64, b: f64) -> bool {
        if a == b || (a.is_nan() && b.is_nan()) {
            return true;
        }
        if !a.is_finite() || !b.is_finite() {
            return false;
        }
        (a - b).abs() <= (self.rel * a.abs().max(b.abs())).max(self.abs)
    }
}

/// Set membership by canonical encoding, so map order inside elements is ignored
fn same_members(xs: &[Value], ys: &[Value]) -> bool {
    let hasher = ContentHasher::default();
    let canonical = |items: &[Value]| -> Option<Vec<Vec<u8>>> {
        let mut encoded = items
            .iter()
            .map(|item| hasher.encode(item).ok())
            .collect::<Option<Vec<_>>>()?;
        encoded.sort();
        encoded.dedup();
        Some(encoded)
    };
    match (canonical(xs), canonical(ys)) {
        (Some(x), Some(y)) => x == y,
        // Unhashable elements fall back to structural equality
        _ => xs.iter().all(|x| ys.contains(x)) && ys.iter().all(|y| xs.contains(y)),
    }
}

/// Paths at which `a` and `b` differ
///
/// Numbers (ints and floats alike) are compared with `tol`; NaN matches
/// NaN. Sequences must have equal length, maps equal key sets. An empty
/// result means the trees are close everywhere.
pub fn allclose(a: &Value, b: &Value, tol: Tolerance) -> Vec<ValuePath> {
    let mut differences = Vec::new();
    let mut stack: Vec<(ValuePath, &Value, &Value)> = vec![(Vec::new(), a, b)];

    while let Some((path, a, b)) = stack.pop() {
        match (a, b) {
            (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_)) => {
                let x = a.as_f64().unwrap_or(f64::NAN);
                let y = b.as_f64().unwrap_or(f64::NAN);
                let close = a == b || tol.is_close(x, y);
                if !close {
                    differences.push(path);
                }
            }
            (Value::List(xs) | Value::Tuple(xs), Value::List(ys) | Value::Tuple(ys)) => {
                if xs.len() != ys.len() {
                    differences.push(path);
                    continue;
                }
                for (i, (x, y)) in xs.iter().zip(ys).enumerate().rev() {
                    let mut child = path.clone();
                    child.push(PathKey::Index(i));
                    stack.push((child, x, y));
                }
            }
            (Value::Map(xs), Value::Map(ys)) => {
                for (key, x) in xs.iter().rev() {
                    let mut child = path.clone();
                    child.push(PathKey::Key(key.clone()));
                    match ys.iter().find(|(k, _)| k == key) {
                        Some((_, y)) => stack.push((child, x, y)),
                        None => differences.push(child),
                    }
                }
                for (key, _) in ys {
                    if !xs.iter().any(|(k, _)| k == key) {
                        let mut child = path.clone();
                        child.push(PathKey::Key(key.clone()));
                        differences.push(child);
                    }
                }
            }
            (Value::Set(xs), Value::Set(ys)) => {
                if !same_members(xs, ys) {
                    differences.push(path);
                }
            }
            _ => {
                if a != b {
                    differences.push(path);
                }
            }
        }
    }

    differences
}
