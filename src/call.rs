use std::any::{Any, type_name};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::InjectError;

/// A resolved dependency value, type-erased so heterogeneous values can
/// share one cache.
pub type Value = Arc<dyn Any + Send + Sync>;

/// Boxes a concrete value as a [`Value`].
pub fn value<T>(v: T) -> Value
where
    T: Send + Sync + 'static,
{
    Arc::new(v)
}

/// A consumer function: takes a resolved call payload, produces a value.
///
/// Identity matters: clones of one `Arc` are the same callable for the
/// annotation store, so a handle passed around by clone keeps its
/// annotation.
pub type Callable = Arc<dyn Fn(CallArgs) -> Result<Value, InjectError> + Send + Sync>;

/// Wraps a closure as a [`Callable`].
pub fn callable<F>(f: F) -> Callable
where
    F: Fn(CallArgs) -> Result<Value, InjectError> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Positional and keyword arguments for one call of a [`Callable`].
#[derive(Clone, Default)]
pub struct CallArgs {
    /// Positional arguments, in call order.
    pub args: Vec<Value>,
    /// Keyword arguments. Later merge layers override earlier ones on key
    /// collision.
    pub kwargs: BTreeMap<String, Value>,
}

impl CallArgs {
    /// Creates an empty call payload.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a positional argument.
    pub fn with_arg<T>(mut self, v: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.args.push(value(v));
        self
    }

    /// Sets a keyword argument, overriding any previous value for the name.
    pub fn with_kwarg<T>(mut self, name: impl Into<String>, v: T) -> Self
    where
        T: Send + Sync + 'static,
    {
        self.kwargs.insert(name.into(), value(v));
        self
    }

    /// Returns the positional argument at `index`, downcast to `T`.
    ///
    /// Fails with [`InjectError::TypeMismatch`] when the argument is absent
    /// or holds a different type.
    pub fn arg<T: 'static>(&self, index: usize) -> Result<&T, InjectError> {
        self.args
            .get(index)
            .and_then(|v| v.downcast_ref::<T>())
            .ok_or(InjectError::TypeMismatch {
                expected: type_name::<T>(),
            })
    }

    /// Returns the keyword argument `name` downcast to `T`, or `None` when
    /// the keyword was not passed (e.g. dropped by `maybe`) or holds a
    /// different type.
    pub fn kwarg<T: 'static>(&self, name: &str) -> Option<&T> {
        self.kwargs.get(name).and_then(|v| v.downcast_ref::<T>())
    }

    pub fn is_empty(&self) -> bool {
        self.args.is_empty() && self.kwargs.is_empty()
    }
}

/// Borrows the concrete `T` out of a [`Value`].
pub fn value_ref<T: 'static>(v: &Value) -> Result<&T, InjectError> {
    v.downcast_ref::<T>().ok_or(InjectError::TypeMismatch {
        expected: type_name::<T>(),
    })
}
