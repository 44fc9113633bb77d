// SPDX-License-Identifier: MIT OR Apache-2.0

//! Type-erased payloads attached to records, and the [`Outcome`] capability.
//!
//! Tracked functions return values of many different types, but listeners subscribe
//! once per tracker or coordinator.  Results and errors are therefore attached to
//! records as a [`Value`]: a cheaply cloned, `Debug`-printable payload.  Values of
//! cheap `'static` types are kept as they are and can be downcast back; everything
//! else is kept as its `Debug` rendering, so a tracked function never needs a
//! `Clone` error type.
//!
//! ```rust
//! use trackwise::Value;
//!
//! let value = Value::new(42u32);
//! assert_eq!(value.downcast_ref::<u32>(), Some(&42));
//! assert!(value.downcast_ref::<String>().is_none());
//! assert_eq!(format!("{:?}", value), "42");
//!
//! let io = std::io::Error::other("disk on fire");
//! let rendered = Value::rendered(&io);
//! assert!(rendered.downcast_ref::<std::io::Error>().is_none());
//! assert!(format!("{:?}", rendered).contains("disk on fire"));
//! ```

use std::any::Any;
use std::fmt::{Debug, Display};
use std::sync::Arc;

trait Payload: Any + Debug + Send + Sync {
    fn as_any(&self) -> &dyn Any;
}

impl<T: Any + Debug + Send + Sync> Payload for T {
    fn as_any(&self) -> &dyn Any {
        self
    }
}

#[derive(Clone)]
enum Repr {
    Typed(Arc<dyn Payload>),
    Rendered(Arc<str>),
}

/// A shared, type-erased payload.
#[derive(Clone)]
pub struct Value(Repr);

impl Value {
    /// Keeps `value` itself; [`Value::downcast_ref`] gets it back.
    pub fn new<T: Any + Debug + Send + Sync>(value: T) -> Self {
        Value(Repr::Typed(Arc::new(value)))
    }

    /// Keeps only the `Debug` rendering of `value`.
    pub fn rendered<T: Debug + ?Sized>(value: &T) -> Self {
        Value(Repr::Rendered(format!("{value:?}").into()))
    }

    /// A placeholder naming the type of a value that cannot be shown.
    pub fn opaque<T: ?Sized>() -> Self {
        Value(Repr::Rendered(
            format!("<{}>", std::any::type_name::<T>()).into(),
        ))
    }

    /// Borrows the payload as `T`, if that is what it holds.
    ///
    /// Rendered values hold no payload and always return `None`.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        match &self.0 {
            Repr::Typed(payload) => (**payload).as_any().downcast_ref::<T>(),
            Repr::Rendered(_) => None,
        }
    }

    pub fn is<T: Any>(&self) -> bool {
        self.downcast_ref::<T>().is_some()
    }

    /// Whether only a rendering was kept.
    pub fn is_rendered(&self) -> bool {
        matches!(self.0, Repr::Rendered(_))
    }
}

impl Debug for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.0 {
            Repr::Typed(payload) => Debug::fmt(&**payload, f),
            Repr::Rendered(text) => f.write_str(text),
        }
    }
}

/**
Classifies the value a tracked function or operation produced.

This is the explicit capability check that decides between a `completed` and an
`errored` record (or a failed settlement).

* `Result<T, E>` fails on `Err`.  Both sides are recorded by their `Debug` rendering,
  so neither needs to be `Clone`.
* `()`, the primitive types, `String`, `&str`, `Option`, `Vec`, `Box` and `Arc` always
  succeed.
* Anything else can be returned inside [`Success`], which always succeeds and records
  only the type name.

```rust
use trackwise::Outcome;

let ok: Result<u8, std::io::Error> = Ok(1);
let err: Result<u8, std::io::Error> = Err(std::io::Error::other("boom"));
assert!(!ok.is_failure());
assert!(err.is_failure());
assert!(format!("{:?}", err.to_value()).contains("boom"));
assert!(!7u32.is_failure());
```
*/
pub trait Outcome {
    /// Whether this value represents a failure.
    fn is_failure(&self) -> bool;

    /// The success or failure value as listeners see it.
    fn to_value(&self) -> Value;
}

impl<T: Debug, E: Debug> Outcome for Result<T, E> {
    #[inline]
    fn is_failure(&self) -> bool {
        self.is_err()
    }

    fn to_value(&self) -> Value {
        match self {
            Ok(t) => Value::rendered(t),
            Err(e) => Value::rendered(e),
        }
    }
}

macro_rules! kept_outcome {
    ($($t:ty),* $(,)?) => {
        $(
            impl Outcome for $t {
                #[inline]
                fn is_failure(&self) -> bool {
                    false
                }

                fn to_value(&self) -> Value {
                    Value::new(self.clone())
                }
            }
        )*
    };
}

kept_outcome!(
    (),
    bool,
    char,
    u8,
    u16,
    u32,
    u64,
    u128,
    usize,
    i8,
    i16,
    i32,
    i64,
    i128,
    isize,
    f32,
    f64,
    String,
);

impl Outcome for &str {
    #[inline]
    fn is_failure(&self) -> bool {
        false
    }

    fn to_value(&self) -> Value {
        Value::new(self.to_string())
    }
}

impl<T: Debug> Outcome for Option<T> {
    #[inline]
    fn is_failure(&self) -> bool {
        false
    }

    fn to_value(&self) -> Value {
        Value::rendered(self)
    }
}

impl<T: Debug> Outcome for Vec<T> {
    #[inline]
    fn is_failure(&self) -> bool {
        false
    }

    fn to_value(&self) -> Value {
        Value::rendered(self)
    }
}

impl<T: Debug + ?Sized> Outcome for Box<T> {
    #[inline]
    fn is_failure(&self) -> bool {
        false
    }

    fn to_value(&self) -> Value {
        Value::rendered(self)
    }
}

//sharing the `Arc` keeps the payload without copying it
impl<T: Debug + Send + Sync + ?Sized + 'static> Outcome for Arc<T> {
    #[inline]
    fn is_failure(&self) -> bool {
        false
    }

    fn to_value(&self) -> Value {
        Value::new(self.clone())
    }
}

/**
A value that always counts as a success.

Wrap return values that have no [`Outcome`] of their own, such as types without a
`Debug` implementation.  Records carry only the type name.

```rust
use trackwise::{Outcome, Success};

struct Connection;
let out = Success(Connection);
assert!(!out.is_failure());
assert!(format!("{:?}", out.to_value()).contains("Connection"));
let _connection: Connection = out.into_inner();
```
*/
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Success<T>(pub T);

impl<T> Success<T> {
    pub fn into_inner(self) -> T {
        self.0
    }
}

impl<T> Outcome for Success<T> {
    #[inline]
    fn is_failure(&self) -> bool {
        false
    }

    fn to_value(&self) -> Value {
        Value::opaque::<T>()
    }
}

/**
The failure value recorded when tracked code panics.

The panic itself is resumed unchanged; this is only the listener-facing rendering
of its payload.
*/
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PanicMessage(pub String);

impl PanicMessage {
    pub(crate) fn from_payload(payload: &(dyn Any + Send)) -> Self {
        if let Some(s) = payload.downcast_ref::<&'static str>() {
            PanicMessage((*s).to_string())
        } else if let Some(s) = payload.downcast_ref::<String>() {
            PanicMessage(s.clone())
        } else {
            PanicMessage("<non-string panic payload>".to_string())
        }
    }
}

impl Display for PanicMessage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "panicked: {}", self.0)
    }
}
