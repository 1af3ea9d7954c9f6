#![forbid(unsafe_code)]

//! The plain-data tree tracked by the engine.
//!
//! [`Value`] mirrors a JSON document with two extra leaf kinds: [`Value::Date`]
//! and [`Value::Opaque`]. Both are *opaque leaves*: path lookup and writes
//! never descend into them, and reads hand them back as-is.
//!
//! # Invariants
//!
//! 1. Only `Array` and `Object` are containers; every other variant is a leaf.
//! 2. `Clone` is a deep copy of containers and dates. Opaque handles are shared.
//! 3. Equality is structural, except `Opaque` which compares by identity and
//!    `Number(NaN)` which never equals itself.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::PathError;
use crate::path::{FieldPath, Segment};

// ─── Opaque handles ──────────────────────────────────────────────────────────

/// Shared handle to a value the engine stores but never looks inside
/// (maps, sets, regexes, error objects, in-flight futures...).
#[derive(Clone)]
pub struct OpaqueRef {
    inner: Rc<dyn Any>,
    type_name: &'static str,
}

impl OpaqueRef {
    #[must_use]
    pub fn new<T: Any>(value: T) -> Self {
        Self {
            inner: Rc::new(value),
            type_name: std::any::type_name::<T>(),
        }
    }

    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.inner.downcast_ref::<T>()
    }

    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

impl PartialEq for OpaqueRef {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::eq(
            Rc::as_ptr(&self.inner).cast::<()>(),
            Rc::as_ptr(&other.inner).cast::<()>(),
        )
    }
}

impl fmt::Debug for OpaqueRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Opaque<{}>", self.type_name)
    }
}

// ─── Value ───────────────────────────────────────────────────────────────────

/// A node of the tracked plain-data tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Value {
    #[default]
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Date(DateTime<Utc>),
    Array(Vec<Value>),
    Object(BTreeMap<String, Value>),
    Opaque(OpaqueRef),
}

/// Discriminant of a [`Value`], for diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    Null,
    Bool,
    Number,
    String,
    Date,
    Array,
    Object,
    Opaque,
}

impl ValueKind {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Date => "date",
            Self::Array => "array",
            Self::Object => "object",
            Self::Opaque => "opaque value",
        }
    }
}

/// A writable location returned by [`Value::slot_mut`].
#[derive(Debug)]
pub struct Slot<'a> {
    pub value: &'a mut Value,
    /// Whether the field existed before the lookup created it.
    pub existed: bool,
}

impl Value {
    /// An empty object.
    #[must_use]
    pub fn object() -> Self {
        Self::Object(BTreeMap::new())
    }

    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match self {
            Self::Null => ValueKind::Null,
            Self::Bool(_) => ValueKind::Bool,
            Self::Number(_) => ValueKind::Number,
            Self::String(_) => ValueKind::String,
            Self::Date(_) => ValueKind::Date,
            Self::Array(_) => ValueKind::Array,
            Self::Object(_) => ValueKind::Object,
            Self::Opaque(_) => ValueKind::Opaque,
        }
    }

    /// Whether reads of this value should be wrapped in a tracked view.
    #[inline]
    #[must_use]
    pub fn is_container(&self) -> bool {
        matches!(self, Self::Array(_) | Self::Object(_))
    }

    #[inline]
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Integral numbers only.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) if n.fract() == 0.0 && n.abs() <= i64::MAX as f64 => Some(*n as i64),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_date(&self) -> Option<&DateTime<Utc>> {
        match self {
            Self::Date(d) => Some(d),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Self::Array(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_object(&self) -> Option<&BTreeMap<String, Value>> {
        match self {
            Self::Object(map) => Some(map),
            _ => None,
        }
    }

    // ── Navigation ───────────────────────────────────────────────────

    fn child(&self, segment: &Segment) -> Option<&Value> {
        match (self, segment) {
            (Self::Object(map), segment) => map.get(&segment.key()),
            (Self::Array(items), Segment::Index(i)) => items.get(*i),
            _ => None,
        }
    }

    /// Look up the value at `path`. The root path returns `self`.
    #[must_use]
    pub fn get_path(&self, path: &FieldPath) -> Option<&Value> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| node.child(segment))
    }

    /// Resolve `path` to a writable slot.
    ///
    /// Intermediate segments must already exist. A missing final object key
    /// is inserted as `Null`; a final array index equal to the length
    /// appends a `Null`. [`Slot::existed`] tells the two cases apart.
    pub fn slot_mut(&mut self, path: &FieldPath) -> Result<Slot<'_>, PathError> {
        let segments = path.segments();
        let Some((last, parents)) = segments.split_last() else {
            return Err(PathError::RootWrite);
        };

        let mut node = self;
        for (depth, segment) in parents.iter().enumerate() {
            let here = || FieldPath::from_segments(segments[..=depth].to_vec());
            node = match node {
                Self::Object(map) => map
                    .get_mut(&segment.key())
                    .ok_or_else(|| PathError::not_found(here()))?,
                Self::Array(items) => {
                    let Segment::Index(i) = segment else {
                        return Err(PathError::not_found(here()));
                    };
                    let length = items.len();
                    items.get_mut(*i).ok_or_else(|| PathError::IndexOutOfBounds {
                        path: here().to_string(),
                        index: *i,
                        length,
                    })?
                }
                other => {
                    return Err(PathError::NotAContainer {
                        path: FieldPath::from_segments(segments[..depth].to_vec()).to_string(),
                        kind: other.kind().name(),
                    });
                }
            };
        }

        let parent_path = || FieldPath::from_segments(parents.to_vec()).to_string();
        match node {
            Self::Object(map) => {
                let key = last.key();
                let existed = map.contains_key(&key);
                Ok(Slot {
                    value: map.entry(key).or_insert(Value::Null),
                    existed,
                })
            }
            Self::Array(items) => {
                let Segment::Index(i) = last else {
                    return Err(PathError::not_found(path));
                };
                let length = items.len();
                if *i > length {
                    return Err(PathError::IndexOutOfBounds {
                        path: path.to_string(),
                        index: *i,
                        length,
                    });
                }
                let existed = *i < length;
                if !existed {
                    items.push(Value::Null);
                }
                Ok(Slot {
                    value: &mut items[*i],
                    existed,
                })
            }
            other => Err(PathError::NotAContainer {
                path: parent_path(),
                kind: other.kind().name(),
            }),
        }
    }

    /// Overwrite `self` with `source` in place.
    ///
    /// When both are objects the existing map is kept: stale keys are
    /// removed and every key of `source` is assigned. Otherwise `self` is
    /// replaced wholesale.
    pub fn restore_from(&mut self, source: &Value) {
        if let (Self::Object(live), Self::Object(saved)) = (&mut *self, source) {
            live.retain(|key, _| saved.contains_key(key));
            for (key, value) in saved {
                match live.get_mut(key) {
                    Some(slot) if slot == value => {}
                    Some(slot) => *slot = value.clone(),
                    None => {
                        live.insert(key.clone(), value.clone());
                    }
                }
            }
            return;
        }
        *self = source.clone();
    }

    // ── JSON interop ─────────────────────────────────────────────────

    /// Convert to JSON. Dates become RFC 3339 strings, opaque values `null`,
    /// non-finite numbers `null`.
    #[must_use]
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value as Json;
        match self {
            Self::Null | Self::Opaque(_) => Json::Null,
            Self::Bool(b) => Json::Bool(*b),
            Self::Number(n) => match self.as_i64() {
                Some(i) => Json::from(i),
                None => serde_json::Number::from_f64(*n).map_or(Json::Null, Json::Number),
            },
            Self::String(s) => Json::String(s.clone()),
            Self::Date(d) => Json::String(d.to_rfc3339_opts(SecondsFormat::Millis, true)),
            Self::Array(items) => Json::Array(items.iter().map(Self::to_json).collect()),
            Self::Object(map) => Json::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), v.to_json()))
                    .collect(),
            ),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<serde_json::Value> for Value {
    fn from(json: serde_json::Value) -> Self {
        use serde_json::Value as Json;
        match json {
            Json::Null => Self::Null,
            Json::Bool(b) => Self::Bool(b),
            Json::Number(n) => Self::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Self::String(s),
            Json::Array(items) => Self::Array(items.into_iter().map(Self::from).collect()),
            Json::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, Self::from(v))).collect())
            }
        }
    }
}

impl Serialize for Value {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

impl<'de> Deserialize<'de> for Value {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        serde_json::Value::deserialize(deserializer).map(Self::from)
    }
}

macro_rules! impl_from_number {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for Value {
                fn from(n: $ty) -> Self {
                    Self::Number(n as f64)
                }
            }
        )*
    };
}

impl_from_number!(f64, f32, i64, i32, u32, u64, usize);

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_owned())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(d: DateTime<Utc>) -> Self {
        Self::Date(d)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::Array(items)
    }
}

impl From<BTreeMap<String, Value>> for Value {
    fn from(map: BTreeMap<String, Value>) -> Self {
        Self::Object(map)
    }
}

impl From<OpaqueRef> for Value {
    fn from(handle: OpaqueRef) -> Self {
        Self::Opaque(handle)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}
