//! Canonical byte encoding of value trees
//!
//! Every node starts with a structural tag byte, optionally followed by the
//! node's type name. Lengths are `u64` big-endian, integers are 16-byte
//! big-endian two's complement, floats carry a subkind byte so NaN and the
//! infinities never collide with a finite value. Maps and sets are emitted
//! in the order of their encoded keys/elements, which makes the stream
//! independent of insertion order.
//!
//! Traversal uses an explicit work stack. Only map keys and set elements are
//! materialised (they have to be sorted); everything else streams straight
//! into the sink.

use crate::error::{HashError, Result};
use crate::hash::IncrementalHasher;
use crate::registry::{Encoded, RegistrySnapshot};
use crate::value::{Kind, Value};
use std::borrow::Cow;

const TAG_NULL: u8 = 0x00;
const TAG_BOOL: u8 = 0x01;
const TAG_INT: u8 = 0x02;
const TAG_FLOAT: u8 = 0x03;
const TAG_STR: u8 = 0x04;
const TAG_BYTES: u8 = 0x05;
const TAG_SEQ: u8 = 0x10;
const TAG_MAP: u8 = 0x11;
const TAG_SET: u8 = 0x12;
const TAG_EXT_BYTES: u8 = 0x20;
const TAG_EXT_VALUE: u8 = 0x21;

const FLOAT_FINITE: u8 = 0x00;
const FLOAT_NAN: u8 = 0x01;
const FLOAT_POS_INF: u8 = 0x02;
const FLOAT_NEG_INF: u8 = 0x03;

/// Destination for encoded bytes
pub(crate) trait Sink {
    fn write(&mut self, bytes: &[u8]);
}

impl Sink for Vec<u8> {
    fn write(&mut self, bytes: &[u8]) {
        self.extend_from_slice(bytes);
    }
}

impl Sink for IncrementalHasher {
    fn write(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}

enum Work<'a> {
    Node(Cow<'a, Value>, usize),
    Raw(Vec<u8>),
}

/// Encoding policy for one hash call
pub(crate) struct Encoder<'r> {
    pub registry: &'r RegistrySnapshot,
    pub include_types: bool,
    pub convert: bool,
    pub max_depth: usize,
}

impl Encoder<'_> {
    /// Stream the encoding of `root` into `sink`
    pub fn encode<S: Sink>(&self, root: &Value, sink: &mut S) -> Result<()> {
        self.run(Cow::Borrowed(root), 0, sink)
    }

    /// Encoding of `value` as an owned buffer
    fn to_bytes(&self, value: &Value, depth: usize) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.run(Cow::Borrowed(value), depth, &mut buf)?;
        Ok(buf)
    }

    fn run<'a, S: Sink>(&self, root: Cow<'a, Value>, depth: usize, sink: &mut S) -> Result<()> {
        let mut stack: Vec<Work<'a>> = vec![Work::Node(root, depth)];

        while let Some(work) = stack.pop() {
            let (node, depth) = match work {
                Work::Raw(bytes) => {
                    sink.write(&bytes);
                    continue;
                }
                Work::Node(node, depth) => (node, depth),
            };

            if depth > self.max_depth {
                return Err(HashError::Traversal {
                    depth,
                    limit: self.max_depth,
                });
            }

            let name = node.type_name();
            match node.kind() {
                Kind::Primitive => self.write_primitive(&node, sink),
                Kind::Sequence => {
                    let items = sequence_items(node);
                    self.header(sink, TAG_SEQ, name);
                    write_len(sink, items.len());
                    for item in items.into_iter().rev() {
                        stack.push(Work::Node(item, depth + 1));
                    }
                }
                Kind::Set => {
                    let mut encoded = Vec::new();
                    if let Value::Set(items) = node.as_ref() {
                        for item in items {
                            encoded.push(self.to_bytes(item, depth + 1)?);
                        }
                    }
                    encoded.sort_unstable();
                    encoded.dedup();

                    self.header(sink, TAG_SET, name);
                    write_len(sink, encoded.len());
                    for element in &encoded {
                        sink.write(element);
                    }
                }
                Kind::Mapping => {
                    let entries = map_entries(node);
                    let mut keyed = Vec::with_capacity(entries.len());
                    for (key, value) in entries {
                        keyed.push((self.to_bytes(&key, depth + 1)?, value));
                    }
                    keyed.sort_by(|a, b| a.0.cmp(&b.0));

                    self.header(sink, TAG_MAP, name);
                    write_len(sink, keyed.len());
                    for (key, value) in keyed.into_iter().rev() {
                        stack.push(Work::Node(value, depth + 1));
                        stack.push(Work::Raw(key));
                    }
                }
                Kind::Extension => {
                    let Value::Object(object) = node.as_ref() else {
                        continue;
                    };
                    let (entry_name, encoded) = self.registry.resolve(object)?;
                    match encoded {
                        Encoded::Bytes(bytes) => {
                            self.header(sink, TAG_EXT_BYTES, entry_name);
                            write_len(sink, bytes.len());
                            sink.write(&bytes);
                        }
                        Encoded::Value(inner) => {
                            self.header(sink, TAG_EXT_VALUE, entry_name);
                            stack.push(Work::Node(Cow::Owned(inner), depth + 1));
                        }
                    }
                }
            }
        }

        Ok(())
    }

    fn header<S: Sink>(&self, sink: &mut S, tag: u8, name: &str) {
        sink.write(&[tag]);
        if self.include_types {
            write_len(sink, name.len());
            sink.write(name.as_bytes());
        }
    }

    fn write_primitive<S: Sink>(&self, value: &Value, sink: &mut S) {
        match value {
            Value::Null => self.header(sink, TAG_NULL, "none"),
            Value::Bool(b) => {
                self.header(sink, TAG_BOOL, "bool");
                sink.write(&[u8::from(*b)]);
            }
            Value::Int(i) => self.write_int(*i, sink),
            Value::Float(f) => self.write_float(*f, sink),
            Value::Str(s) => {
                self.header(sink, TAG_STR, "str");
                write_len(sink, s.len());
                sink.write(s.as_bytes());
            }
            Value::Bytes(b) => {
                self.header(sink, TAG_BYTES, "bytes");
                write_len(sink, b.len());
                sink.write(b);
            }
            _ => {}
        }
    }

    fn write_int<S: Sink>(&self, value: i128, sink: &mut S) {
        self.header(sink, TAG_INT, "int");
        sink.write(&value.to_be_bytes());
    }

    fn write_float<S: Sink>(&self, value: f64, sink: &mut S) {
        if self.convert {
            if let Some(int) = integral(value) {
                self.write_int(int, sink);
                return;
            }
        }

        self.header(sink, TAG_FLOAT, "float");
        if value.is_nan() {
            sink.write(&[FLOAT_NAN]);
        } else if value == f64::INFINITY {
            sink.write(&[FLOAT_POS_INF]);
        } else if value == f64::NEG_INFINITY {
            sink.write(&[FLOAT_NEG_INF]);
        } else {
            // -0.0 == 0.0
            let value = if value == 0.0 { 0.0 } else { value };
            sink.write(&[FLOAT_FINITE]);
            sink.write(&value.to_bits().to_be_bytes());
        }
    }
}

/// The integer a float stands for, when it is finite, integral and in range
fn integral(value: f64) -> Option<i128> {
    const LOWER: f64 = i128::MIN as f64;
    const UPPER: f64 = i128::MAX as f64;

    if value.is_finite() && value.fract() == 0.0 && (LOWER..UPPER).contains(&value) {
        Some(value as i128)
    } else {
        None
    }
}

fn write_len<S: Sink>(sink: &mut S, len: usize) {
    sink.write(&(len as u64).to_be_bytes());
}

fn sequence_items(node: Cow<'_, Value>) -> Vec<Cow<'_, Value>> {
    match node {
        Cow::Borrowed(Value::List(items) | Value::Tuple(items)) => {
            items.iter().map(Cow::Borrowed).collect()
        }
        Cow::Owned(Value::List(items) | Value::Tuple(items)) => {
            items.into_iter().map(Cow::Owned).collect()
        }
        _ => Vec::new(),
    }
}

type Entry<'a> = (Cow<'a, Value>, Cow<'a, Value>);

fn map_entries(node: Cow<'_, Value>) -> Vec<Entry<'_>> {
    match node {
        Cow::Borrowed(Value::Map(entries)) => entries
            .iter()
            .map(|(k, v)| (Cow::Borrowed(k), Cow::Borrowed(v)))
            .collect(),
        Cow::Owned(Value::Map(entries)) => entries
            .into_iter()
            .map(|(k, v)| (Cow::Owned(k), Cow::Owned(v)))
            .collect(),
        _ => Vec::new(),
    }
}
