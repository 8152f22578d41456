//! Type-erased payload used for both user errors and upstream messages.

use std::any::{Any, TypeId};
use std::fmt;

/// An opaque, type-tagged value.
///
/// `Signal` is how the engine carries an open universe of user-defined error
/// and message types through the graph without knowing their concrete type
/// ahead of time: a [`TypeId`] acts as the runtime tag, and the payload lives
/// behind `Box<dyn Any>`. Cloning is supported via a function pointer
/// captured at construction time, since `Any` alone has no way to express
/// `Clone` across a trait object.
pub struct Signal {
    type_id: TypeId,
    type_name: &'static str,
    payload: Box<dyn Any>,
    clone_fn: fn(&dyn Any) -> Box<dyn Any>,
}

impl Signal {
    /// Wraps `value` as a Signal, tagged with its concrete type.
    pub fn new<T: Any + Clone>(value: T) -> Self {
        Signal {
            type_id: TypeId::of::<T>(),
            type_name: std::any::type_name::<T>(),
            payload: Box::new(value),
            clone_fn: clone_boxed::<T>,
        }
    }

    pub(crate) fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// True iff `self` carries a payload of type `T`.
    pub fn is<T: Any>(&self) -> bool {
        self.type_id == TypeId::of::<T>()
    }

    /// True iff both signals carry the same concrete payload type.
    pub fn same_type_as(&self, other: &Signal) -> bool {
        self.type_id == other.type_id
    }

    /// Consumes the signal, returning the payload if it is of type `T`, or
    /// the signal itself back if the tag doesn't match.
    pub fn downcast<T: Any>(self) -> Result<T, Signal> {
        if self.type_id == TypeId::of::<T>() {
            Ok(*self.payload.downcast::<T>().expect("type tag matched TypeId but downcast failed"))
        } else {
            Err(self)
        }
    }
}

impl Clone for Signal {
    fn clone(&self) -> Self {
        Signal {
            type_id: self.type_id,
            type_name: self.type_name,
            payload: (self.clone_fn)(&*self.payload),
            clone_fn: self.clone_fn,
        }
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal").field("type", &self.type_name).finish()
    }
}

fn clone_boxed<T: Any + Clone>(payload: &dyn Any) -> Box<dyn Any> {
    Box::new(
        payload
            .downcast_ref::<T>()
            .expect("Signal::clone_fn called against the wrong concrete type")
            .clone(),
    )
}
