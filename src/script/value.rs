//! Host-side values that can cross the script boundary.

use std::collections::BTreeMap;
use std::fmt;

use thiserror::Error;

use super::registry::Handle;

/// Text-keyed property map, ordered by key.
pub type PropertyBag = BTreeMap<String, HostValue>;

/// A host value as seen from the script boundary.
///
/// Everything but `Wrapper` is plain data and is copied across. `Wrapper`
/// carries the handle of a registered facade; the facade itself (and the
/// aggregate behind it) stays on the host side.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum HostValue {
    #[default]
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    List(Vec<HostValue>),
    Map(PropertyBag),
    Wrapper(Handle),
}

/// A value that could not be converted between the script and the host.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cannot convert {from} to {to}{}", .detail.as_ref().map(|d| format!(": {d}")).unwrap_or_default())]
pub struct ConversionError {
    /// Kind of the source value.
    pub from: &'static str,
    /// Kind that was expected.
    pub to: &'static str,
    /// Optional context.
    pub detail: Option<String>,
}

impl ConversionError {
    pub fn new(from: &'static str, to: &'static str) -> Self {
        Self {
            from,
            to,
            detail: None,
        }
    }

    pub fn with_detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

impl From<ConversionError> for mlua::Error {
    fn from(err: ConversionError) -> Self {
        mlua::Error::external(err)
    }
}

/// The exact `i64` a float stands for, if it has one.
///
/// Fractional, non-finite and out-of-range floats have none; nothing is
/// rounded or saturated.
pub fn integral(f: f64) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX is not.
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.fract() == 0.0 && (-LIMIT..LIMIT).contains(&f) {
        Some(f as i64)
    } else {
        None
    }
}

impl HostValue {
    /// Short name of the value kind, used in conversion errors.
    pub fn kind(&self) -> &'static str {
        match self {
            HostValue::Nil => "nil",
            HostValue::Bool(_) => "boolean",
            HostValue::Int(_) => "integer",
            HostValue::Float(_) => "float",
            HostValue::Text(_) => "text",
            HostValue::List(_) => "list",
            HostValue::Map(_) => "map",
            HostValue::Wrapper(_) => "wrapper",
        }
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, HostValue::Nil)
    }

    /// Script truthiness: everything but `nil` and `false`.
    pub fn is_truthy(&self) -> bool {
        !matches!(self, HostValue::Nil | HostValue::Bool(false))
    }

    /// Whether the value holds no nested aggregate.
    pub fn is_primitive(&self) -> bool {
        !matches!(self, HostValue::List(_) | HostValue::Map(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Numeric view. Integers widen to floats.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Int(i) => Some(*i as f64),
            HostValue::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer view. Floats with an integral value are accepted.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            HostValue::Int(i) => Some(*i),
            HostValue::Float(f) => integral(*f),
            _ => None,
        }
    }

    /// Whether a wrapper handle appears anywhere in the value.
    pub fn holds_wrapper(&self) -> bool {
        match self {
            HostValue::Wrapper(_) => true,
            HostValue::List(items) => items.iter().any(HostValue::holds_wrapper),
            HostValue::Map(map) => map.values().any(HostValue::holds_wrapper),
            _ => false,
        }
    }

    /// Narrow to a native integer width.
    pub fn to_int<T: TryFrom<i64>>(&self) -> Result<T, ConversionError> {
        let wide = self.as_i64().ok_or_else(|| {
            let err = ConversionError::new(self.kind(), std::any::type_name::<T>());
            match self {
                HostValue::Float(f) => err.with_detail(format!("{f} is not an exact integer")),
                _ => err,
            }
        })?;
        T::try_from(wide).map_err(|_| {
            ConversionError::new("integer", std::any::type_name::<T>())
                .with_detail(format!("{wide} is out of range"))
        })
    }

    pub fn as_list(&self) -> Option<&[HostValue]> {
        match self {
            HostValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&PropertyBag> {
        match self {
            HostValue::Map(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_handle(&self) -> Option<Handle> {
        match self {
            HostValue::Wrapper(handle) => Some(*handle),
            _ => None,
        }
    }

    /// Look up a key when the value is a map.
    pub fn get(&self, key: &str) -> Option<&HostValue> {
        self.as_map().and_then(|map| map.get(key))
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Nil => f.write_str("nil"),
            HostValue::Bool(b) => write!(f, "{b}"),
            HostValue::Int(i) => write!(f, "{i}"),
            HostValue::Float(n) => write!(f, "{n}"),
            HostValue::Text(s) => write!(f, "{s:?}"),
            HostValue::List(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
            HostValue::Map(map) => {
                f.write_str("{")?;
                for (i, (key, value)) in map.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{key} = {value}")?;
                }
                f.write_str("}")
            }
            HostValue::Wrapper(handle) => write!(f, "<wrapper {handle}>"),
        }
    }
}

macro_rules! lossless_int {
    ($($t:ty),*) => {
        $(
            impl From<$t> for HostValue {
                fn from(value: $t) -> Self {
                    HostValue::Int(i64::from(value))
                }
            }
        )*
    };
}

lossless_int!(i8, i16, i32, i64, u8, u16, u32);

macro_rules! checked_int {
    ($($t:ty),*) => {
        $(
            impl TryFrom<$t> for HostValue {
                type Error = ConversionError;

                fn try_from(value: $t) -> Result<Self, Self::Error> {
                    i64::try_from(value).map(HostValue::Int).map_err(|_| {
                        ConversionError::new(stringify!($t), "integer")
                            .with_detail(format!("{value} exceeds the script integer range"))
                    })
                }
            }
        )*
    };
}

checked_int!(u64, usize, isize, i128, u128);

impl From<f32> for HostValue {
    fn from(value: f32) -> Self {
        HostValue::Float(f64::from(value))
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Float(value)
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::Text(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::Text(value)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(HostValue::Nil)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(items: Vec<T>) -> Self {
        HostValue::List(items.into_iter().map(Into::into).collect())
    }
}

impl From<PropertyBag> for HostValue {
    fn from(map: PropertyBag) -> Self {
        HostValue::Map(map)
    }
}

impl From<Handle> for HostValue {
    fn from(handle: Handle) -> Self {
        HostValue::Wrapper(handle)
    }
}

/// A decoded index key.
///
/// `x` and `y` get their own variants so the vector-like hot path never
/// allocates. They compare and behave exactly like `Name("x")`/`Name("y")`
/// would; [`Key::named`] is the only constructor for text keys and never
/// produces those two names.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum Key {
    X,
    Y,
    Index(i64),
    Name(String),
}

impl Key {
    /// Build a text key, folding `x`/`y` into their short forms.
    pub fn named(name: &str) -> Self {
        match name.as_bytes() {
            b"x" => Key::X,
            b"y" => Key::Y,
            _ => Key::Name(name.to_string()),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Key::X => Some("x"),
            Key::Y => Some("y"),
            Key::Name(name) => Some(name),
            Key::Index(_) => None,
        }
    }

    pub fn as_index(&self) -> Option<i64> {
        match self {
            Key::Index(i) => Some(*i),
            _ => None,
        }
    }

    /// The key as a host value (for iteration results).
    pub fn to_value(&self) -> HostValue {
        match self {
            Key::Index(i) => HostValue::Int(*i),
            other => HostValue::Text(other.as_str().unwrap_or_default().to_string()),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Key::Index(i) => write!(f, "[{i}]"),
            other => f.write_str(other.as_str().unwrap_or_default()),
        }
    }
}
