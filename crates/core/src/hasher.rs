//! Deterministic content hashing of value trees

use crate::base::Base;
use crate::encode::Encoder;
use crate::error::Result;
use crate::hash::{digest_file, DigestBackend, HashAlgorithm, IncrementalHasher};
use crate::registry::{default_registry, ExtensionRegistry};
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::debug;

/// Default bound on value nesting
pub const DEFAULT_MAX_DEPTH: usize = 512;

/// Options controlling how a value is hashed and rendered
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HashOptions {
    /// Digest back end
    pub hasher: HashAlgorithm,
    /// Output alphabet
    pub base: Base,
    /// Mix concrete type names into the digest (`[1, 2]` vs `(1, 2)`)
    pub include_types: bool,
    /// Hash integral floats as integers, so `1.0` and `1` collide
    pub convert: bool,
    /// Truncate the rendered digest to this many characters
    pub length: Option<usize>,
    /// Maximum nesting depth before hashing fails
    pub max_depth: usize,
    /// Registry override; the process-wide default is used when unset
    #[serde(skip)]
    pub extensions: Option<Arc<ExtensionRegistry>>,
}

impl Default for HashOptions {
    fn default() -> Self {
        Self {
            hasher: HashAlgorithm::default(),
            base: Base::default(),
            include_types: false,
            convert: false,
            length: None,
            max_depth: DEFAULT_MAX_DEPTH,
            extensions: None,
        }
    }
}

impl HashOptions {
    /// Default options
    pub fn new() -> Self {
        Self::default()
    }

    /// Select the digest back end
    pub fn hasher(mut self, hasher: HashAlgorithm) -> Self {
        self.hasher = hasher;
        self
    }

    /// Select the output alphabet
    pub fn base(mut self, base: Base) -> Self {
        self.base = base;
        self
    }

    /// Include type names in the digest
    pub fn include_types(mut self, include_types: bool) -> Self {
        self.include_types = include_types;
        self
    }

    /// Normalise integral floats to integers
    pub fn convert(mut self, convert: bool) -> Self {
        self.convert = convert;
        self
    }

    /// Truncate the output
    pub fn length(mut self, length: usize) -> Self {
        self.length = Some(length);
        self
    }

    /// Bound the nesting depth
    pub fn max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Use `registry` instead of the process-wide default
    pub fn extensions(mut self, registry: Arc<ExtensionRegistry>) -> Self {
        self.extensions = Some(registry);
        self
    }
}

/// A registry plus hashing options
///
/// Cheap to clone; reuse one instance to hash many values with the same
/// settings.
#[derive(Debug, Clone)]
pub struct ContentHasher {
    options: HashOptions,
    registry: Arc<ExtensionRegistry>,
}

impl ContentHasher {
    /// Build a hasher; falls back to [`default_registry`] when the options
    /// carry no registry
    pub fn new(options: HashOptions) -> Self {
        let registry = options
            .extensions
            .clone()
            .unwrap_or_else(default_registry);
        Self { options, registry }
    }

    /// Options in effect
    pub fn options(&self) -> &HashOptions {
        &self.options
    }

    /// Registry consulted for custom types
    pub fn registry(&self) -> &Arc<ExtensionRegistry> {
        &self.registry
    }

    /// Canonical byte stream for `value`, as fed to the digest
    pub fn encode(&self, value: &Value) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.encode_into(value, &mut buf)?;
        Ok(buf)
    }

    /// Raw digest of `value`
    pub fn digest_bytes(&self, value: &Value) -> Result<Vec<u8>> {
        let mut sink = IncrementalHasher::new(self.options.hasher)?;
        self.encode_into(value, &mut sink)?;
        Ok(sink.finalize())
    }

    /// Rendered digest of `value`
    pub fn hash(&self, value: &Value) -> Result<String> {
        let digest = self.digest_bytes(value)?;
        let rendered = self.render(&digest);
        debug!(
            hasher = %self.options.hasher,
            base = %self.options.base,
            kind = value.type_name(),
            digest = %rendered,
            "hashed value"
        );
        Ok(rendered)
    }

    /// Rendered digest of `value` using a caller-supplied back end
    ///
    /// The `hasher` option is ignored.
    pub fn hash_with_backend(
        &self,
        value: &Value,
        backend: Box<dyn DigestBackend>,
    ) -> Result<String> {
        let mut sink = IncrementalHasher::from_backend(backend);
        self.encode_into(value, &mut sink)?;
        Ok(self.render(&sink.finalize()))
    }

    /// Rendered digest of a file's contents
    pub fn hash_file(&self, path: &Path) -> Result<String> {
        let digest = digest_file(path, self.options.hasher)?;
        let rendered = self.render(&digest);
        debug!(path = %path.display(), digest = %rendered, "hashed file");
        Ok(rendered)
    }

    /// Render raw digest bytes with the configured base and length
    pub fn render(&self, digest: &[u8]) -> String {
        let mut text = self.options.base.encode(digest);
        if let Some(length) = self.options.length {
            text.truncate(length);
        }
        text
    }

    fn encode_into<S: crate::encode::Sink>(&self, value: &Value, sink: &mut S) -> Result<()> {
        let snapshot = self.registry.snapshot();
        let encoder = Encoder {
            registry: &snapshot,
            include_types: self.options.include_types,
            convert: self.options.convert,
            max_depth: self.options.max_depth,
        };
        encoder.encode(value, sink)
    }
}

impl Default for ContentHasher {
    fn default() -> Self {
        Self::new(HashOptions::default())
    }
}

/// Hash `value` with `options`
///
/// ```
/// use digestkit_core::{hash_data, HashOptions, Value};
///
/// let config = Value::list([
///     Value::tuple(["arg1".into(), Value::from(5)]),
///     Value::tuple(["lr".into(), Value::from(0.01)]),
/// ]);
/// let key = hash_data(&config, &HashOptions::default())?;
/// assert_eq!(key.len(), 64);
/// # Ok::<(), digestkit_core::HashError>(())
/// ```
pub fn hash_data(value: &Value, options: &HashOptions) -> Result<String> {
    ContentHasher::new(options.clone()).hash(value)
}

/// Hash the contents of the file at `path`
pub fn hash_file(path: &Path, options: &HashOptions) -> Result<String> {
    ContentHasher::new(options.clone()).hash_file(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::HashError;
    use crate::registry::Encoded;

    fn h(value: &Value) -> String {
        hash_data(value, &HashOptions::default()).unwrap()
    }

    fn typed(value: &Value) -> String {
        hash_data(value, &HashOptions::new().include_types(true)).unwrap()
    }

    fn training_config(lr: f64) -> Value {
        Value::list([
            Value::from(("arg1", 5)),
            Value::from(("lr", lr)),
            Value::from(("augmenters", vec!["flip", "translate"])),
        ])
    }

    #[test]
    fn test_determinism() {
        let value = training_config(0.01);
        assert_eq!(h(&value), h(&value));
    }

    #[test]
    fn test_known_digest_is_stable() {
        // Pinned so accidental changes to the encoding are caught
        let encoded = ContentHasher::default().encode(&Value::Int(1)).unwrap();
        let mut expected = vec![0x02];
        expected.extend_from_slice(&1i128.to_be_bytes());
        assert_eq!(encoded, expected);

        let hasher = ContentHasher::default();
        assert_eq!(
            hex::encode(hasher.encode(&Value::from(0.01)).unwrap()),
            "03003f847ae147ae147b"
        );
        assert_eq!(
            hex::encode(hasher.encode(&Value::from("ab")).unwrap()),
            "0400000000000000026162"
        );
    }

    fn golden(value: &Value, options: &HashOptions) -> String {
        hash_data(value, &options.clone().hasher(HashAlgorithm::Sha256).base(Base::Hex)).unwrap()
    }

    #[test]
    fn test_golden_config_digest() {
        let config = training_config(0.01);
        assert_eq!(
            golden(&config, &HashOptions::new()),
            "dd58ac2d3eb2c0bda614325e4233d7143ed75b02c7b580671c48d4b79ecda4fe"
        );
        assert_eq!(
            golden(&config, &HashOptions::new().include_types(true)),
            "4c6ebe940b393ec4290af15a144cf878f083802239c371a5a74dc44bcdc556dc"
        );
    }

    #[test]
    fn test_golden_map_and_set_digests() {
        let map = Value::map([
            ("b", Value::from(2)),
            ("a", Value::list([Value::from(1), Value::from(2.5)])),
        ]);
        assert_eq!(
            golden(&map, &HashOptions::new()),
            "2f91e75d3fe73c7e2dc8daca7698a2746b99511c5a17a465ba73f99c429a646e"
        );

        let set = Value::set(["z", "x", "y"]);
        assert_eq!(
            golden(&set, &HashOptions::new()),
            "99c02d78819a733acdf15c807218a6b056c9ce71ea8f28ffd6b2b16a2b6bfe19"
        );
    }

    #[test]
    fn test_golden_convert_digest() {
        let options = HashOptions::new().convert(true);
        let mixed = Value::list([Value::from(1.0), Value::from(2), Value::from(0.5)]);
        let ints = Value::list([Value::from(1), Value::from(2), Value::from(0.5)]);
        let expected = "fe5ab1d052e14c37d932999944c7e24b802777cb2faa203ea9fa3d3d8c97dcb6";
        assert_eq!(golden(&mixed, &options), expected);
        assert_eq!(golden(&ints, &options), expected);
        assert_eq!(
            golden(&mixed, &options.clone().include_types(true)),
            "c216dd4261d0ac52ab1a821ed5591ac0d3910bc65df1c474207661e2bea4d632"
        );
    }

    #[test]
    fn test_golden_bytes_extension_digest() {
        let registry = Arc::new(ExtensionRegistry::new());
        registry.register::<Point, _>("Point", |p| {
            let mut bytes = p.x.to_be_bytes().to_vec();
            bytes.extend_from_slice(&p.y.to_be_bytes());
            Ok(Encoded::Bytes(bytes))
        });
        let options = HashOptions::new().extensions(registry);
        let point = Value::object(Point { x: 1, y: -2 });

        assert_eq!(
            golden(&point, &options),
            "e0c15d67369f148bdae96f2f1367b8e151c38cb14554da23aac51d5d1fe3a351"
        );
        assert_eq!(
            golden(&point, &options.clone().include_types(true)),
            "6b4116f1c304a6a853df374b79d39c91c95f9159cfd58075d0c5b6a0ecdc8f97"
        );
    }

    #[test]
    fn test_end_to_end_example() {
        let options = HashOptions::new().base(Base::Hex);
        let first = hash_data(&training_config(0.01), &options).unwrap();
        let second = hash_data(&training_config(0.01), &options).unwrap();
        let changed = hash_data(&training_config(0.02), &options).unwrap();

        assert_eq!(first.len(), 64);
        assert!(first.chars().all(|c| c.is_ascii_hexdigit()));
        assert_eq!(first, second);
        assert_ne!(first, changed);
    }

    #[test]
    fn test_sequence_order_matters() {
        assert_ne!(h(&Value::list([1, 2])), h(&Value::list([2, 1])));
    }

    #[test]
    fn test_map_order_does_not_matter() {
        let a = Value::map([("a", 1), ("b", 2)]);
        let b = Value::map([("b", 2), ("a", 1)]);
        assert_eq!(h(&a), h(&b));
    }

    #[test]
    fn test_set_order_does_not_matter() {
        assert_eq!(h(&Value::set(["x", "y", "z"])), h(&Value::set(["z", "x", "y"])));
    }

    #[test]
    fn test_type_discrimination() {
        let list = Value::list([1, 2]);
        let tuple = Value::tuple([1, 2]);
        assert_ne!(typed(&list), typed(&tuple));
        // Without type names only structure counts
        assert_eq!(h(&list), h(&tuple));
    }

    #[test]
    fn test_sign_correctness() {
        assert_ne!(h(&Value::from(-5)), h(&Value::from(5)));
        assert_ne!(typed(&Value::from(-5)), typed(&Value::from(5)));
    }

    #[test]
    fn test_empty_containers_distinct() {
        for hash in [h, typed] {
            let list = hash(&Value::List(vec![]));
            let map = hash(&Value::Map(vec![]));
            let set = hash(&Value::Set(vec![]));
            assert_ne!(list, map);
            assert_ne!(map, set);
            assert_ne!(list, set);
        }
    }

    #[test]
    fn test_convert_policy() {
        let plain = HashOptions::new();
        let converted = HashOptions::new().convert(true);
        let typed_converted = HashOptions::new().convert(true).include_types(true);

        let one = Value::from(1);
        let one_f = Value::from(1.0);

        assert_ne!(hash_data(&one, &plain).unwrap(), hash_data(&one_f, &plain).unwrap());
        assert_eq!(
            hash_data(&one, &converted).unwrap(),
            hash_data(&one_f, &converted).unwrap()
        );
        assert_eq!(
            hash_data(&one, &typed_converted).unwrap(),
            hash_data(&one_f, &typed_converted).unwrap()
        );
    }

    #[test]
    fn test_nan_and_infinities() {
        let nan = h(&Value::from(f64::NAN));
        let inf = h(&Value::from(f64::INFINITY));
        let ninf = h(&Value::from(f64::NEG_INFINITY));
        assert_eq!(nan, h(&Value::from(-f64::NAN)));
        assert_ne!(nan, inf);
        assert_ne!(inf, ninf);
    }

    #[test]
    fn test_bases_and_length() {
        let value = Value::from("abc");
        let hex = hash_data(&value, &HashOptions::new().base(Base::Hex)).unwrap();
        let b32 = hash_data(&value, &HashOptions::new().base(Base::Base32)).unwrap();
        let abc = hash_data(&value, &HashOptions::new().base(Base::Abc)).unwrap();
        assert_eq!(hex.len(), 64);
        assert_eq!(b32.len(), 52);
        assert!(abc.chars().all(|c| c.is_ascii_lowercase()));

        let short = hash_data(&value, &HashOptions::new().length(8)).unwrap();
        assert_eq!(short, hex[..8]);
    }

    #[test]
    fn test_hasher_selection() {
        let value = Value::from("abc");
        let sha1 = hash_data(&value, &HashOptions::new().hasher(HashAlgorithm::Sha1)).unwrap();
        let sha512 = hash_data(&value, &HashOptions::new().hasher(HashAlgorithm::Sha512)).unwrap();
        assert_eq!(sha1.len(), 40);
        assert_eq!(sha512.len(), 128);
    }

    #[cfg(feature = "xxhash")]
    #[test]
    fn test_xxhash_backend() {
        let value = Value::list([1, 2, 3]);
        let digest = hash_data(&value, &HashOptions::new().hasher(HashAlgorithm::Xxh64)).unwrap();
        assert_eq!(digest.len(), 16);
    }

    #[test]
    fn test_custom_backend_matches_builtin() {
        let hasher = ContentHasher::default();
        let value = training_config(0.1);
        let custom = hasher
            .hash_with_backend(&value, HashAlgorithm::Sha256.backend().unwrap())
            .unwrap();
        assert_eq!(custom, hasher.hash(&value).unwrap());
    }

    #[derive(Debug)]
    struct Point {
        x: i32,
        y: i32,
    }

    struct LabeledPoint {
        point: Point,
        #[allow(dead_code)]
        label: &'static str,
    }

    fn labeled_as_point(p: &LabeledPoint) -> &Point {
        &p.point
    }

    fn point_registry() -> Arc<ExtensionRegistry> {
        let registry = ExtensionRegistry::new();
        registry.register::<Point, _>("Point", |p| Ok(Value::tuple([p.x, p.y]).into()));
        Arc::new(registry)
    }

    #[test]
    fn test_registry_round_trip() {
        let options = HashOptions::new().extensions(point_registry());
        let a = hash_data(&Value::object(Point { x: 1, y: 2 }), &options).unwrap();
        let b = hash_data(&Value::object(Point { x: 1, y: 2 }), &options).unwrap();
        let c = hash_data(&Value::object(Point { x: 2, y: 1 }), &options).unwrap();
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_subclass_uses_parent_serializer() {
        let registry = point_registry();
        registry.declare_parent::<LabeledPoint, Point>(labeled_as_point);
        let options = HashOptions::new().extensions(registry);

        let child = Value::object(LabeledPoint {
            point: Point { x: 4, y: 5 },
            label: "corner",
        });
        let parent = Value::object(Point { x: 4, y: 5 });
        assert_eq!(hash_data(&child, &options).unwrap(), hash_data(&parent, &options).unwrap());
    }

    #[test]
    fn test_extension_bytes_and_nested_objects() {
        let registry = point_registry();
        registry.register::<LabeledPoint, _>("LabeledPoint", |p| {
            let point = Point {
                x: p.point.x,
                y: p.point.y,
            };
            Ok(Value::list([Value::object(point), Value::from(p.label)]).into())
        });
        let options = HashOptions::new().extensions(registry).include_types(true);

        let value = Value::object(LabeledPoint {
            point: Point { x: 0, y: 0 },
            label: "origin",
        });
        assert!(hash_data(&value, &options).is_ok());
    }

    #[test]
    fn test_raw_bytes_extension() {
        let registry = Arc::new(ExtensionRegistry::new());
        registry.register::<Point, _>("Point", |p| {
            let mut bytes = p.x.to_be_bytes().to_vec();
            bytes.extend_from_slice(&p.y.to_be_bytes());
            Ok(Encoded::Bytes(bytes))
        });
        let options = HashOptions::new().extensions(registry);
        let a = hash_data(&Value::object(Point { x: 1, y: 2 }), &options).unwrap();
        let b = hash_data(&Value::object(Point { x: 2, y: 1 }), &options).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_unhashable_type_names_offender() {
        struct RawSocket {
            #[allow(dead_code)]
            fd: i32,
        }

        let options = HashOptions::new().extensions(Arc::new(ExtensionRegistry::new()));
        let err = hash_data(&Value::object(RawSocket { fd: 3 }), &options).unwrap_err();
        assert!(matches!(err, HashError::UnhashableType { .. }));
        assert!(err.to_string().contains("RawSocket"));
    }

    #[test]
    fn test_unhashable_nested_value_fails_whole_hash() {
        struct Opaque;
        let options = HashOptions::new().extensions(Arc::new(ExtensionRegistry::new()));
        let value = Value::map([("ok", Value::from(1)), ("bad", Value::object(Opaque))]);
        assert!(hash_data(&value, &options).is_err());
    }

    #[test]
    fn test_deep_nesting_is_traversal_error() {
        let mut value = Value::Null;
        for _ in 0..100 {
            value = Value::list([value]);
        }
        let err = hash_data(&value, &HashOptions::new().max_depth(50)).unwrap_err();
        assert!(matches!(err, HashError::Traversal { limit: 50, .. }));

        assert!(hash_data(&value, &HashOptions::new()).is_ok());
    }

    #[test]
    fn test_very_deep_nesting_does_not_overflow_stack() {
        let mut value = Value::Null;
        for _ in 0..10_000 {
            value = Value::list([value]);
        }
        let result = hash_data(&value, &HashOptions::new());
        assert!(matches!(result, Err(HashError::Traversal { .. })));
        // Unwind iteratively so the drop itself cannot overflow
        while let Value::List(mut items) = value {
            value = items.pop().unwrap_or(Value::Null);
        }
    }

    #[test]
    fn test_default_registry_handles_builtins() {
        let date = chrono::NaiveDate::from_ymd_opt(2024, 1, 31).unwrap();
        let a = h(&Value::object(date));
        let b = h(&Value::object(date));
        let c = h(&Value::object(date.succ_opt().unwrap()));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn test_hash_file_matches_bytes_hash() -> Result<()> {
        let temp_dir = tempfile::tempdir()?;
        let path = temp_dir.path().join("data.bin");
        std::fs::write(&path, b"abc")?;

        let options = HashOptions::new().hasher(HashAlgorithm::Sha256);
        assert_eq!(
            hash_file(&path, &options)?,
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
        Ok(())
    }

    #[test]
    fn test_options_from_toml_like_json() {
        let json = r#"{"hasher": "sha1", "base": "abc", "include_types": true}"#;
        let options: HashOptions = serde_json::from_str(json).unwrap();
        assert_eq!(options.hasher, HashAlgorithm::Sha1);
        assert_eq!(options.base, Base::Abc);
        assert!(options.include_types);
        assert_eq!(options.max_depth, DEFAULT_MAX_DEPTH);
    }
}
