//! Type-extension registry
//!
//! Maps the `TypeId` of a custom value to a named serializer. Lookup
//! resolves the exact type first, then walks declared ancestors breadth
//! first in declaration order, so the nearest registered ancestor wins.
//!
//! Writes are copy-on-write: hashing works on an immutable
//! [`RegistrySnapshot`], so registration never blocks an in-flight hash and
//! a serializer may itself call back into the hasher.

use crate::error::{HashError, Result};
use crate::value::{Object, Value};
use ahash::{AHashMap, AHashSet};
use parking_lot::RwLock;
use std::any::{Any, TypeId};
use std::collections::VecDeque;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Output of a registered serializer
#[derive(Debug, Clone, PartialEq)]
pub enum Encoded {
    /// Final bytes, emitted as-is (length-prefixed)
    Bytes(Vec<u8>),
    /// A further value, traversed like any other node
    Value(Value),
}

impl From<Vec<u8>> for Encoded {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Value> for Encoded {
    fn from(value: Value) -> Self {
        Self::Value(value)
    }
}

trait ErasedSerializer: Send + Sync {
    /// `None` when `value` is not of the serializer's type
    fn serialize(&self, value: &dyn Any) -> Option<Result<Encoded>>;
}

struct TypedSerializer<T, F> {
    func: F,
    _marker: PhantomData<fn(&T)>,
}

impl<T, F> ErasedSerializer for TypedSerializer<T, F>
where
    T: Any,
    F: Fn(&T) -> Result<Encoded> + Send + Sync,
{
    fn serialize(&self, value: &dyn Any) -> Option<Result<Encoded>> {
        value.downcast_ref::<T>().map(|v| (self.func)(v))
    }
}

trait Upcast: Send + Sync {
    fn upcast<'a>(&self, value: &'a dyn Any) -> Option<&'a dyn Any>;
}

struct UpcastFn<C, P> {
    func: fn(&C) -> &P,
}

impl<C: Any, P: Any> Upcast for UpcastFn<C, P> {
    fn upcast<'a>(&self, value: &'a dyn Any) -> Option<&'a dyn Any> {
        value
            .downcast_ref::<C>()
            .map(|child| (self.func)(child) as &dyn Any)
    }
}

#[derive(Clone)]
struct Entry {
    name: String,
    serializer: Arc<dyn ErasedSerializer>,
}

#[derive(Clone)]
struct Parent {
    type_id: TypeId,
    upcast: Arc<dyn Upcast>,
}

#[derive(Clone, Default)]
struct Tables {
    entries: AHashMap<TypeId, Entry>,
    parents: AHashMap<TypeId, Vec<Parent>>,
}

/// Registry of serializers for custom types
#[derive(Default)]
pub struct ExtensionRegistry {
    tables: RwLock<Arc<Tables>>,
}

impl ExtensionRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry seeded with the built-in entries (dates and times,
    /// UUIDs, durations, paths, IP addresses)
    pub fn with_defaults() -> Self {
        let registry = Self::new();
        register_defaults(&registry);
        registry
    }

    /// Register `func` as the serializer for `T`, replacing any previous one
    ///
    /// `name` is mixed into the digest when type names are included.
    pub fn register<T, F>(&self, name: impl Into<String>, func: F) -> &Self
    where
        T: Any,
        F: Fn(&T) -> Result<Encoded> + Send + Sync + 'static,
    {
        let entry = Entry {
            name: name.into(),
            serializer: Arc::new(TypedSerializer {
                func,
                _marker: PhantomData,
            }),
        };
        debug!(
            type_name = std::any::type_name::<T>(),
            name = %entry.name,
            "registering hash extension"
        );

        let mut tables = self.tables.write();
        Arc::make_mut(&mut *tables)
            .entries
            .insert(TypeId::of::<T>(), entry);
        self
    }

    /// Declare `P` as an ancestor of `C`
    ///
    /// Values of type `C` without their own serializer are hashed through
    /// `P`'s serializer, reached with `upcast`. Several parents may be
    /// declared; earlier declarations are tried first.
    pub fn declare_parent<C: Any, P: Any>(&self, upcast: fn(&C) -> &P) -> &Self {
        let parent = Parent {
            type_id: TypeId::of::<P>(),
            upcast: Arc::new(UpcastFn { func: upcast }),
        };

        let mut tables = self.tables.write();
        Arc::make_mut(&mut *tables)
            .parents
            .entry(TypeId::of::<C>())
            .or_default()
            .push(parent);
        self
    }

    /// Remove the serializer for `T`; returns whether one was present
    pub fn unregister<T: Any>(&self) -> bool {
        let mut tables = self.tables.write();
        Arc::make_mut(&mut *tables)
            .entries
            .remove(&TypeId::of::<T>())
            .is_some()
    }

    /// Whether `T` has its own serializer
    pub fn contains<T: Any>(&self) -> bool {
        self.tables.read().entries.contains_key(&TypeId::of::<T>())
    }

    /// Number of registered serializers
    pub fn len(&self) -> usize {
        self.tables.read().entries.len()
    }

    /// Whether no serializer is registered
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Immutable view used for the duration of one hash
    pub fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            tables: Arc::clone(&*self.tables.read()),
        }
    }
}

impl std::fmt::Debug for ExtensionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let tables = self.tables.read();
        let mut names: Vec<&str> = tables.entries.values().map(|e| e.name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("ExtensionRegistry")
            .field("entries", &names)
            .finish()
    }
}

/// Point-in-time view of an [`ExtensionRegistry`]
#[derive(Clone)]
pub struct RegistrySnapshot {
    tables: Arc<Tables>,
}

impl RegistrySnapshot {
    /// Serialize `object` with the most specific registered serializer
    ///
    /// Returns the entry name alongside the serializer output.
    pub fn resolve(&self, object: &Object) -> Result<(&str, Encoded)> {
        let mut queue: VecDeque<(TypeId, &dyn Any)> = VecDeque::new();
        let mut visited: AHashSet<TypeId> = AHashSet::new();
        queue.push_back((object.type_id(), object.as_any()));

        while let Some((type_id, value)) = queue.pop_front() {
            if !visited.insert(type_id) {
                continue;
            }

            if let Some(entry) = self.tables.entries.get(&type_id) {
                if let Some(result) = entry.serializer.serialize(value) {
                    return Ok((entry.name.as_str(), result?));
                }
            }

            if let Some(parents) = self.tables.parents.get(&type_id) {
                for parent in parents {
                    if let Some(upcast) = parent.upcast.upcast(value) {
                        queue.push_back((parent.type_id, upcast));
                    }
                }
            }
        }

        Err(HashError::UnhashableType {
            type_name: object.type_name().to_string(),
        })
    }
}

/// Process-wide registry used when no override is supplied
///
/// Seeded with [`ExtensionRegistry::with_defaults`] on first use.
pub fn default_registry() -> Arc<ExtensionRegistry> {
    static DEFAULT: OnceLock<Arc<ExtensionRegistry>> = OnceLock::new();
    Arc::clone(DEFAULT.get_or_init(|| Arc::new(ExtensionRegistry::with_defaults())))
}

fn register_defaults(registry: &ExtensionRegistry) {
    use chrono::{DateTime, FixedOffset, NaiveDate, NaiveDateTime, NaiveTime, SecondsFormat, Utc};
    use std::net::IpAddr;
    use std::path::PathBuf;
    use std::time::Duration;

    registry
        .register::<NaiveDate, _>("date", |d| {
            Ok(d.format("%Y-%m-%d").to_string().into_bytes().into())
        })
        .register::<NaiveTime, _>("time", |t| {
            Ok(t.format("%H:%M:%S%.f").to_string().into_bytes().into())
        })
        .register::<NaiveDateTime, _>("datetime", |dt| {
            Ok(dt.format("%Y-%m-%dT%H:%M:%S%.f").to_string().into_bytes().into())
        })
        .register::<DateTime<Utc>, _>("datetime", |dt| {
            Ok(dt
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .into_bytes()
                .into())
        })
        .register::<DateTime<FixedOffset>, _>("datetime", |dt| {
            // Same instant, same digest, whatever the offset
            Ok(dt
                .with_timezone(&Utc)
                .to_rfc3339_opts(SecondsFormat::Nanos, true)
                .into_bytes()
                .into())
        })
        .register::<uuid::Uuid, _>("uuid", |id| Ok(id.as_bytes().to_vec().into()))
        .register::<Duration, _>("duration", |d| {
            Ok(Value::tuple([i128::from(d.as_secs()), i128::from(d.subsec_nanos())]).into())
        })
        .register::<PathBuf, _>("path", |p| {
            Ok(Value::Str(p.to_string_lossy().into_owned()).into())
        })
        .register::<IpAddr, _>("ipaddr", |ip| Ok(ip.to_string().into_bytes().into()));
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Base {
        id: u32,
    }

    struct Derived {
        base: Base,
        #[allow(dead_code)]
        extra: String,
    }

    struct Grandchild {
        derived: Derived,
    }

    fn derived_as_base(d: &Derived) -> &Base {
        &d.base
    }

    fn grandchild_as_derived(g: &Grandchild) -> &Derived {
        &g.derived
    }

    fn make_grandchild(id: u32) -> Grandchild {
        Grandchild {
            derived: Derived {
                base: Base { id },
                extra: "x".into(),
            },
        }
    }

    #[test]
    fn test_exact_match() {
        let registry = ExtensionRegistry::new();
        registry.register::<Base, _>("Base", |b| Ok(Value::from(b.id).into()));

        let snapshot = registry.snapshot();
        let (name, encoded) = snapshot.resolve(&Object::new(Base { id: 7 })).unwrap();
        assert_eq!(name, "Base");
        assert_eq!(encoded, Encoded::Value(Value::Int(7)));
    }

    #[test]
    fn test_ancestor_resolution() {
        let registry = ExtensionRegistry::new();
        registry
            .register::<Base, _>("Base", |b| Ok(Value::from(b.id).into()))
            .declare_parent::<Derived, Base>(derived_as_base)
            .declare_parent::<Grandchild, Derived>(grandchild_as_derived);

        let snapshot = registry.snapshot();
        let (name, encoded) = snapshot.resolve(&Object::new(make_grandchild(3))).unwrap();
        assert_eq!(name, "Base");
        assert_eq!(encoded, Encoded::Value(Value::Int(3)));
    }

    #[test]
    fn test_most_specific_wins() {
        let registry = ExtensionRegistry::new();
        registry
            .register::<Base, _>("Base", |b| Ok(Value::from(b.id).into()))
            .register::<Derived, _>("Derived", |d| Ok(Value::from(d.base.id + 100).into()))
            .declare_parent::<Derived, Base>(derived_as_base)
            .declare_parent::<Grandchild, Derived>(grandchild_as_derived);

        let snapshot = registry.snapshot();
        let (name, encoded) = snapshot.resolve(&Object::new(make_grandchild(1))).unwrap();
        assert_eq!(name, "Derived");
        assert_eq!(encoded, Encoded::Value(Value::Int(101)));
    }

    #[test]
    fn test_unregistered_type_is_unhashable() {
        let registry = ExtensionRegistry::new();
        let err = registry
            .snapshot()
            .resolve(&Object::new(Base { id: 1 }))
            .unwrap_err();
        match err {
            HashError::UnhashableType { type_name } => assert!(type_name.ends_with("Base")),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_snapshot_is_isolated_from_later_registration() {
        let registry = ExtensionRegistry::new();
        let before = registry.snapshot();
        registry.register::<Base, _>("Base", |b| Ok(Value::from(b.id).into()));

        assert!(before.resolve(&Object::new(Base { id: 1 })).is_err());
        assert!(registry.snapshot().resolve(&Object::new(Base { id: 1 })).is_ok());
    }

    #[test]
    fn test_unregister() {
        let registry = ExtensionRegistry::new();
        registry.register::<Base, _>("Base", |b| Ok(Value::from(b.id).into()));
        assert!(registry.contains::<Base>());
        assert!(registry.unregister::<Base>());
        assert!(!registry.contains::<Base>());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_defaults_cover_common_types() {
        let registry = ExtensionRegistry::with_defaults();
        assert!(registry.contains::<chrono::NaiveDate>());
        assert!(registry.contains::<uuid::Uuid>());
        assert!(registry.contains::<std::time::Duration>());
        assert!(!registry.is_empty());
    }

    #[test]
    fn test_serializer_error_propagates() {
        let registry = ExtensionRegistry::new();
        registry.register::<Base, _>("Base", |_| Err(HashError::extension("Base", "refused")));
        let err = registry
            .snapshot()
            .resolve(&Object::new(Base { id: 1 }))
            .unwrap_err();
        assert!(matches!(err, HashError::Extension { .. }));
    }
}
