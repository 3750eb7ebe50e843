//! Typed format descriptors used for negotiation.
//!
//! A [`FormatDescriptor`] is an immutable map from well-known keys to values.
//! Every slot is either a concrete value or a wildcard, and a wildcard matches
//! any value as well as the absence of the key. Descriptors are cheap to clone
//! and every builder method returns a new instance.

use crate::error::{Error, Result};
use crate::media::{ByteOrder, FileKind, MediaType};
use crate::rational::Rational;
use bytes::Bytes;
use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

/// Untyped identity of a format key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct KeyId {
    name: &'static str,
    required: bool,
}

impl KeyId {
    /// Key name as stored in descriptors.
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Whether descriptors of a complete stream must carry this key.
    pub const fn is_required(&self) -> bool {
        self.required
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// A typed format key.
///
/// The type parameter fixes what [`FormatDescriptor::get`] returns and what
/// [`FormatDescriptor::with`] accepts for the key.
pub struct FormatKey<T> {
    id: KeyId,
    _marker: PhantomData<fn() -> T>,
}

impl<T> FormatKey<T> {
    /// Declare an optional key.
    pub const fn new(name: &'static str) -> Self {
        Self {
            id: KeyId {
                name,
                required: false,
            },
            _marker: PhantomData,
        }
    }

    /// Declare a key that complete stream descriptors must carry.
    pub const fn required(name: &'static str) -> Self {
        Self {
            id: KeyId {
                name,
                required: true,
            },
            _marker: PhantomData,
        }
    }

    /// Untyped identity of this key.
    pub const fn id(&self) -> KeyId {
        self.id
    }

    /// Key name.
    pub const fn name(&self) -> &'static str {
        self.id.name
    }
}

impl<T> Clone for FormatKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for FormatKey<T> {}

impl<T> fmt::Debug for FormatKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormatKey({})", self.id.name)
    }
}

impl<T> From<FormatKey<T>> for KeyId {
    fn from(key: FormatKey<T>) -> Self {
        key.id
    }
}

/// A concrete descriptor value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Value {
    /// Boolean flag.
    Bool(bool),
    /// Integer quantity.
    Int(i64),
    /// Exact rational quantity (rates, durations).
    Ratio(Rational),
    /// Free text (encodings, MIME types).
    Text(Arc<str>),
    /// Media type.
    Media(MediaType),
    /// Container file kind.
    File(FileKind),
    /// Sample byte order.
    Order(ByteOrder),
    /// Opaque bytes such as a palette.
    Bytes(Bytes),
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Ratio(v) => write!(f, "{v}"),
            Value::Text(v) => write!(f, "{v:?}"),
            Value::Media(v) => write!(f, "{v}"),
            Value::File(v) => write!(f, "{v}"),
            Value::Order(v) => write!(f, "{v}"),
            Value::Bytes(v) => write!(f, "<{} bytes>", v.len()),
        }
    }
}

/// Conversion between Rust types and descriptor [`Value`]s.
pub trait FormatValue: Sized {
    /// Wrap into a descriptor value.
    fn into_value(self) -> Value;
    /// Extract from a descriptor value of the matching kind.
    fn from_value(value: &Value) -> Option<Self>;
}

impl FormatValue for bool {
    fn into_value(self) -> Value {
        Value::Bool(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl FormatValue for i64 {
    fn into_value(self) -> Value {
        Value::Int(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }
}

impl FormatValue for u32 {
    fn into_value(self) -> Value {
        Value::Int(self as i64)
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Int(v) => u32::try_from(*v).ok(),
            _ => None,
        }
    }
}

impl FormatValue for Rational {
    fn into_value(self) -> Value {
        Value::Ratio(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Ratio(v) => Some(*v),
            _ => None,
        }
    }
}

impl FormatValue for Arc<str> {
    fn into_value(self) -> Value {
        Value::Text(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Text(v) => Some(v.clone()),
            _ => None,
        }
    }
}

impl FormatValue for MediaType {
    fn into_value(self) -> Value {
        Value::Media(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Media(v) => Some(*v),
            _ => None,
        }
    }
}

impl FormatValue for FileKind {
    fn into_value(self) -> Value {
        Value::File(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::File(v) => Some(*v),
            _ => None,
        }
    }
}

impl FormatValue for ByteOrder {
    fn into_value(self) -> Value {
        Value::Order(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Order(v) => Some(*v),
            _ => None,
        }
    }
}

impl FormatValue for Bytes {
    fn into_value(self) -> Value {
        Value::Bytes(self)
    }
    fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Bytes(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// One entry of a descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Slot {
    /// A fixed value.
    Concrete(Value),
    /// Matches any value and the absence of the key.
    Wildcard,
}

impl Slot {
    /// The concrete value, if any.
    pub fn value(&self) -> Option<&Value> {
        match self {
            Slot::Concrete(v) => Some(v),
            Slot::Wildcard => None,
        }
    }

    /// Check if two slots are compatible.
    pub fn accepts(&self, other: &Slot) -> bool {
        match (self, other) {
            (Slot::Concrete(a), Slot::Concrete(b)) => a == b,
            _ => true,
        }
    }
}

/// Immutable set of typed format keys.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct FormatDescriptor {
    entries: Arc<BTreeMap<KeyId, Slot>>,
}

impl FormatDescriptor {
    /// Create an empty descriptor. Matches everything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a descriptor for the given media type.
    pub fn of(media: MediaType) -> Self {
        Self::new().with(keys::MEDIA_TYPE, media)
    }

    /// Return a copy with `key` set to a concrete value.
    #[must_use]
    pub fn with<T: FormatValue>(&self, key: FormatKey<T>, value: impl Into<T>) -> Self {
        self.with_slot(key.id(), Slot::Concrete(value.into().into_value()))
    }

    /// Return a copy with `key` set to a wildcard.
    #[must_use]
    pub fn wildcard<T>(&self, key: FormatKey<T>) -> Self {
        self.with_slot(key.id(), Slot::Wildcard)
    }

    /// Return a copy with `key` removed.
    #[must_use]
    pub fn without<T>(&self, key: FormatKey<T>) -> Self {
        if !self.entries.contains_key(&key.id()) {
            return self.clone();
        }
        let mut entries = (*self.entries).clone();
        entries.remove(&key.id());
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Return a copy with an untyped slot stored under `id`.
    #[must_use]
    pub fn with_slot(&self, id: KeyId, slot: Slot) -> Self {
        let mut entries = (*self.entries).clone();
        entries.insert(id, slot);
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Get the concrete value stored under `key`.
    ///
    /// Returns `None` for absent keys, wildcards and values of another kind.
    pub fn get<T: FormatValue>(&self, key: FormatKey<T>) -> Option<T> {
        self.value(key.id()).and_then(T::from_value)
    }

    /// Get a concrete value or fall back to `default`.
    pub fn get_or<T: FormatValue>(&self, key: FormatKey<T>, default: T) -> T {
        self.get(key).unwrap_or(default)
    }

    /// Get a concrete value or fail with [`Error::MissingRequiredKey`].
    pub fn require<T: FormatValue>(&self, key: FormatKey<T>) -> Result<T> {
        self.get(key).ok_or_else(|| Error::MissingRequiredKey {
            keys: vec![key.name().to_string()],
        })
    }

    /// Untyped concrete value stored under `id`.
    pub fn value(&self, id: KeyId) -> Option<&Value> {
        self.entries.get(&id).and_then(Slot::value)
    }

    /// Slot stored under `id`, concrete or wildcard.
    pub fn slot(&self, id: KeyId) -> Option<&Slot> {
        self.entries.get(&id)
    }

    /// Check if a concrete value is stored under `key`.
    pub fn contains(&self, key: impl Into<KeyId>) -> bool {
        self.value(key.into()).is_some()
    }

    /// Check if `key` is present as a wildcard.
    pub fn is_wildcard(&self, key: impl Into<KeyId>) -> bool {
        matches!(self.entries.get(&key.into()), Some(Slot::Wildcard))
    }

    /// Iterate over all slots in key order.
    pub fn iter(&self) -> impl Iterator<Item = (KeyId, &Slot)> {
        self.entries.iter().map(|(k, v)| (*k, v))
    }

    /// Number of slots, wildcards included.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Check if the descriptor has no slots.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Check compatibility with another descriptor.
    ///
    /// For every key both sides carry as concrete values, the values must be
    /// equal. Wildcards and keys present on only one side never conflict, so
    /// the relation is symmetric.
    pub fn matches(&self, other: &FormatDescriptor) -> bool {
        let (small, large) = if self.len() <= other.len() {
            (self, other)
        } else {
            (other, self)
        };
        small.entries.iter().all(|(key, slot)| match large.entries.get(key) {
            Some(theirs) => slot.accepts(theirs),
            None => true,
        })
    }

    /// Describe the first conflicting key, if any.
    pub fn mismatch(&self, other: &FormatDescriptor) -> Option<String> {
        self.entries.iter().find_map(|(key, slot)| {
            let theirs = other.entries.get(key)?;
            if slot.accepts(theirs) {
                None
            } else {
                Some(format!(
                    "{key}: {} != {}",
                    display_slot(slot),
                    display_slot(theirs)
                ))
            }
        })
    }

    /// Merge `other` into a copy of `self`; `other` wins on shared keys.
    #[must_use]
    pub fn append(&self, other: &FormatDescriptor) -> Self {
        if other.is_empty() {
            return self.clone();
        }
        let mut entries = (*self.entries).clone();
        for (key, slot) in other.entries.iter() {
            entries.insert(*key, slot.clone());
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Merge `other` into a copy of `self`; `self` wins on shared keys.
    ///
    /// Used to supply defaults without clobbering caller-specified slots.
    #[must_use]
    pub fn prepend(&self, other: &FormatDescriptor) -> Self {
        other.append(self)
    }

    /// Fill wildcards and absent keys of `self` from `other`.
    ///
    /// Concrete slots of `self` always win; a wildcard is replaced by
    /// whatever `other` holds for the key. Negotiation uses this to complete
    /// a caller's request from a provider's supported pattern.
    #[must_use]
    pub fn refine(&self, other: &FormatDescriptor) -> Self {
        let mut entries = (*self.entries).clone();
        for (key, slot) in other.entries.iter() {
            match entries.get(key) {
                Some(Slot::Concrete(_)) => {}
                _ => {
                    entries.insert(*key, slot.clone());
                }
            }
        }
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Keep only the listed keys.
    #[must_use]
    pub fn intersect_keys(&self, keys: &[KeyId]) -> Self {
        let entries = self
            .entries
            .iter()
            .filter(|(k, _)| keys.contains(k))
            .map(|(k, v)| (*k, v.clone()))
            .collect();
        Self {
            entries: Arc::new(entries),
        }
    }

    /// Fail unless every listed key holds a concrete value.
    ///
    /// The error names every missing key, not just the first.
    pub fn require_keys(&self, keys: &[KeyId]) -> Result<()> {
        let missing: Vec<String> = keys
            .iter()
            .filter(|k| !self.contains(**k))
            .map(|k| k.name().to_string())
            .collect();
        if missing.is_empty() {
            Ok(())
        } else {
            Err(Error::MissingRequiredKey { keys: missing })
        }
    }

    /// Like [`require_keys`](Self::require_keys), restricted to the keys
    /// declared with [`FormatKey::required`].
    pub fn require_flagged(&self, keys: &[KeyId]) -> Result<()> {
        let flagged: Vec<KeyId> = keys.iter().copied().filter(KeyId::is_required).collect();
        self.require_keys(&flagged)
    }

    /// Media type, when concrete.
    pub fn media_type(&self) -> Option<MediaType> {
        self.get(keys::MEDIA_TYPE)
    }

    /// Encoding name, when concrete.
    pub fn encoding(&self) -> Option<Arc<str>> {
        self.get(keys::ENCODING)
    }

    /// Check if the encoding equals `name`.
    pub fn has_encoding(&self, name: &str) -> bool {
        self.encoding().is_some_and(|e| &*e == name)
    }
}

fn display_slot(slot: &Slot) -> String {
    match slot {
        Slot::Concrete(v) => v.to_string(),
        Slot::Wildcard => "*".to_string(),
    }
}

impl fmt::Display for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("{")?;
        for (i, (key, slot)) in self.entries.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{key}={}", display_slot(slot))?;
        }
        f.write_str("}")
    }
}

impl fmt::Debug for FormatDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FormatDescriptor{self}")
    }
}

/// Well-known format keys.
pub mod keys {
    use super::{FormatKey, KeyId};
    use crate::media::{ByteOrder, FileKind, MediaType};
    use crate::rational::Rational;
    use bytes::Bytes;
    use std::sync::Arc;

    /// Kind of stream.
    pub const MEDIA_TYPE: FormatKey<MediaType> = FormatKey::required("mediaType");
    /// MIME type of a file-level descriptor.
    pub const MIME_TYPE: FormatKey<Arc<str>> = FormatKey::new("mimeType");
    /// Container kind of a file-level descriptor.
    pub const FILE_KIND: FormatKey<FileKind> = FormatKey::required("fileKind");
    /// Encoding name, see [`crate::media::encoding`].
    pub const ENCODING: FormatKey<Arc<str>> = FormatKey::required("encoding");
    /// Frame width in pixels.
    pub const WIDTH: FormatKey<u32> = FormatKey::required("width");
    /// Frame height in pixels.
    pub const HEIGHT: FormatKey<u32> = FormatKey::required("height");
    /// Bits per pixel.
    pub const DEPTH: FormatKey<u32> = FormatKey::required("depth");
    /// Frames per second.
    pub const FRAME_RATE: FormatKey<Rational> = FormatKey::new("frameRate");
    /// Whether every frame lasts exactly one frame period.
    pub const FIXED_FRAME_RATE: FormatKey<bool> = FormatKey::new("fixedFrameRate");
    /// Maximum distance between keyframes, in frames.
    pub const KEY_FRAME_INTERVAL: FormatKey<u32> = FormatKey::new("keyFrameInterval");
    /// RGB triples of an 8-bit palette.
    pub const PALETTE: FormatKey<Bytes> = FormatKey::new("palette");
    /// Audio sample frames per second.
    pub const SAMPLE_RATE: FormatKey<u32> = FormatKey::required("sampleRate");
    /// Audio channel count.
    pub const CHANNELS: FormatKey<u32> = FormatKey::required("channels");
    /// Bits per audio sample.
    pub const SAMPLE_SIZE_BITS: FormatKey<u32> = FormatKey::required("sampleSizeInBits");
    /// Whether audio samples are signed.
    pub const SIGNED: FormatKey<bool> = FormatKey::new("signed");
    /// Byte order of multi-byte audio samples.
    pub const BYTE_ORDER: FormatKey<ByteOrder> = FormatKey::new("byteOrder");
    /// Bytes per audio sample frame.
    pub const FRAME_SIZE: FormatKey<u32> = FormatKey::new("frameSize");
    /// Payload representation, e.g. `bytes` or `text`.
    pub const DATA_CLASS: FormatKey<Arc<str>> = FormatKey::new("dataClass");

    /// Keys describing a video stream.
    pub const VIDEO: &[KeyId] = &[
        MEDIA_TYPE.id(),
        ENCODING.id(),
        WIDTH.id(),
        HEIGHT.id(),
        DEPTH.id(),
        FRAME_RATE.id(),
    ];

    /// Keys describing an audio stream.
    pub const AUDIO: &[KeyId] = &[
        MEDIA_TYPE.id(),
        ENCODING.id(),
        SAMPLE_RATE.id(),
        CHANNELS.id(),
        SAMPLE_SIZE_BITS.id(),
        SIGNED.id(),
        BYTE_ORDER.id(),
    ];

    /// Keys describing a text stream.
    pub const TEXT: &[KeyId] = &[MEDIA_TYPE.id(), ENCODING.id(), DATA_CLASS.id()];
}
