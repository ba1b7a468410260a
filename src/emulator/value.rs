//! Values crossing the script bridge.
//!
//! [`HostValue`] is the engine-independent form of an argument or result. The proxy side
//! (boxed primitives, strings, arrays of those) maps onto it one to one; script objects that
//! have no such form are kept alive in the host and travel as an opaque [`ObjectHandle`].

use std::{
    fmt,
    hash::{Hash, Hasher},
    sync::{Arc, Mutex},
};

/// A value that converts itself to a string before entering the script engine.
///
/// The DOM wrapper types of the compiler's web API implement this so that they arrive in the
/// script as plain strings.
pub trait StringLike: Send + Sync + fmt::Debug {
    /// The string handed to the script engine.
    fn to_script_string(&self) -> String;
}

/// Slots whose last [`ObjectHandle`] was dropped, waiting for the engine thread to free them.
#[derive(Debug, Default)]
pub(crate) struct ReleaseQueue(Mutex<Vec<(u64, u32)>>);

impl ReleaseQueue {
    /// Takes every slot released since the last call.
    pub(crate) fn drain(&self) -> Vec<(u64, u32)> {
        std::mem::take(&mut *lock!(self.0))
    }
}

#[derive(Debug)]
struct HandleSlot {
    generation: u64,
    id: u32,
    released: Arc<ReleaseQueue>,
}

impl Drop for HandleSlot {
    fn drop(&mut self) {
        lock!(self.released.0).push((self.generation, self.id));
    }
}

/// Reference to a script object owned by the engine thread.
///
/// The object stays reachable in the engine while any clone of the handle is alive; dropping
/// the last clone frees its slot the next time the engine converts a value. A handle is only
/// valid for the page that produced it; after a reload, passing it back yields `undefined`.
#[derive(Debug, Clone)]
pub struct ObjectHandle(Arc<HandleSlot>);

impl ObjectHandle {
    pub(crate) fn new(generation: u64, id: u32, released: Arc<ReleaseQueue>) -> Self {
        ObjectHandle(Arc::new(HandleSlot {
            generation,
            id,
            released,
        }))
    }

    /// Page generation the object belongs to.
    #[must_use]
    pub fn generation(&self) -> u64 {
        self.0.generation
    }

    /// Slot in the handle table of that page.
    #[must_use]
    pub fn id(&self) -> u32 {
        self.0.id
    }
}

impl PartialEq for ObjectHandle {
    fn eq(&self, other: &Self) -> bool {
        self.generation() == other.generation() && self.id() == other.id()
    }
}

impl Eq for ObjectHandle {}

impl Hash for ObjectHandle {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.generation().hash(state);
        self.id().hash(state);
    }
}

/// A value exchanged with the script engine.
#[derive(Debug, Clone)]
pub enum HostValue {
    /// `undefined`, also the result of `void` functions
    Undefined,
    /// `null`
    Null,
    /// A boolean
    Bool(bool),
    /// A number that is an `i32`
    Int(i32),
    /// Any other number
    Double(f64),
    /// A string
    String(String),
    /// A string-like wrapper, converted on entry
    StringLike(Arc<dyn StringLike>),
    /// An array, converted element-wise
    Array(Vec<HostValue>),
    /// An opaque script object
    Object(ObjectHandle),
}

impl HostValue {
    /// Returns `true` for `undefined` and `null`.
    #[must_use]
    pub fn is_nullish(&self) -> bool {
        matches!(self, HostValue::Undefined | HostValue::Null)
    }

    /// The value as `f64` if it is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            HostValue::Int(v) => Some(f64::from(*v)),
            HostValue::Double(v) => Some(*v),
            _ => None,
        }
    }

    /// The value as `i32`; doubles are truncated the way `Number.intValue` does.
    #[must_use]
    pub fn as_i32(&self) -> Option<i32> {
        match self {
            HostValue::Int(v) => Some(*v),
            #[allow(clippy::cast_possible_truncation)]
            HostValue::Double(v) => Some(*v as i32),
            _ => None,
        }
    }

    /// The value as a string slice if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            HostValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// The value as a boolean if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            HostValue::Bool(b) => Some(*b),
            _ => None,
        }
    }
}

impl PartialEq for HostValue {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (HostValue::Undefined, HostValue::Undefined) | (HostValue::Null, HostValue::Null) => {
                true
            }
            (HostValue::Bool(a), HostValue::Bool(b)) => a == b,
            (HostValue::Int(a), HostValue::Int(b)) => a == b,
            (HostValue::Double(a), HostValue::Double(b)) => a == b,
            (HostValue::Int(a), HostValue::Double(b)) | (HostValue::Double(b), HostValue::Int(a)) => {
                f64::from(*a) == *b
            }
            (HostValue::String(a), HostValue::String(b)) => a == b,
            (HostValue::StringLike(a), HostValue::StringLike(b)) => {
                a.to_script_string() == b.to_script_string()
            }
            (HostValue::String(a), HostValue::StringLike(b))
            | (HostValue::StringLike(b), HostValue::String(a)) => *a == b.to_script_string(),
            (HostValue::Array(a), HostValue::Array(b)) => a == b,
            (HostValue::Object(a), HostValue::Object(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for HostValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HostValue::Undefined => write!(f, "undefined"),
            HostValue::Null => write!(f, "null"),
            HostValue::Bool(b) => write!(f, "{}", b),
            HostValue::Int(v) => write!(f, "{}", v),
            HostValue::Double(v) => write!(f, "{}", v),
            HostValue::String(s) => write!(f, "{:?}", s),
            HostValue::StringLike(s) => write!(f, "{:?}", s.to_script_string()),
            HostValue::Array(values) => {
                write!(f, "[")?;
                for (i, value) in values.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", value)?;
                }
                write!(f, "]")
            }
            HostValue::Object(handle) => write!(f, "object#{}@{}", handle.id(), handle.generation()),
        }
    }
}

impl From<bool> for HostValue {
    fn from(value: bool) -> Self {
        HostValue::Bool(value)
    }
}

impl From<i32> for HostValue {
    fn from(value: i32) -> Self {
        HostValue::Int(value)
    }
}

impl From<f64> for HostValue {
    fn from(value: f64) -> Self {
        HostValue::Double(value)
    }
}

impl From<&str> for HostValue {
    fn from(value: &str) -> Self {
        HostValue::String(value.to_string())
    }
}

impl From<String> for HostValue {
    fn from(value: String) -> Self {
        HostValue::String(value)
    }
}

impl<T: Into<HostValue>> From<Option<T>> for HostValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(HostValue::Null, Into::into)
    }
}

impl<T: Into<HostValue>> From<Vec<T>> for HostValue {
    fn from(values: Vec<T>) -> Self {
        HostValue::Array(values.into_iter().map(Into::into).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct Text(&'static str);

    impl StringLike for Text {
        fn to_script_string(&self) -> String {
            self.0.to_string()
        }
    }

    #[test]
    fn numeric_equality() {
        assert_eq!(HostValue::Int(5), HostValue::Double(5.0));
        assert_ne!(HostValue::Int(5), HostValue::Double(5.5));
        assert_eq!(HostValue::Double(-2.9).as_i32(), Some(-2));
    }

    #[test]
    fn string_like_compares_as_string() {
        let wrapped = HostValue::StringLike(Arc::new(Text("div")));
        assert_eq!(wrapped, HostValue::from("div"));
        assert_eq!(wrapped.to_string(), "\"div\"");
    }

    #[test]
    fn last_handle_clone_releases_the_slot() {
        let queue = Arc::new(ReleaseQueue::default());
        let handle = ObjectHandle::new(3, 7, Arc::clone(&queue));
        let copy = handle.clone();
        assert_eq!(copy, handle);

        drop(handle);
        assert!(queue.drain().is_empty());
        drop(copy);
        assert_eq!(queue.drain(), vec![(3, 7)]);
        assert!(queue.drain().is_empty());
    }

    #[test]
    fn conversions() {
        assert_eq!(HostValue::from(None::<i32>), HostValue::Null);
        assert_eq!(
            HostValue::from(vec![1, 2]).to_string(),
            "[1, 2]"
        );
        assert!(HostValue::Undefined.is_nullish());
        assert!(!HostValue::Bool(false).is_nullish());
    }
}
