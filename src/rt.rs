// src/rt.rs

//! Runtime utilities for generated code (Macros).
//! Do not use directly.

use std::any::{Any, type_name};

use crate::error::{Result, ShapeError};
use crate::meta::Object;

/// Boxes a value as an [`Object`].
#[inline]
pub fn boxed<T: Send + 'static>(value: T) -> Object {
    Box::new(value)
}

/// Checks the argument count of a constructor call and returns the arguments in order.
pub fn arguments(
    args: Vec<Object>,
    expected: usize,
    owner: &'static str,
) -> Result<std::vec::IntoIter<Object>> {
    if args.len() != expected {
        return Err(ShapeError::conversion(
            owner,
            format!(
                "constructor expects {expected} arguments, received {}",
                args.len()
            ),
        ));
    }
    Ok(args.into_iter())
}

/// Takes the next constructor argument and downcasts it to the parameter type.
pub fn take_arg<T: 'static>(
    args: &mut std::vec::IntoIter<Object>,
    owner: &'static str,
    name: &'static str,
    position: usize,
) -> Result<T> {
    let arg = args.next().ok_or_else(|| {
        ShapeError::component(owner, name, position, "missing constructor argument")
    })?;
    arg.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        ShapeError::component(
            owner,
            name,
            position,
            format!("argument is not a {}", type_name::<T>()),
        )
    })
}

/// Downcasts a receiver to the type owning the invoked method.
pub fn receiver<'a, T: 'static>(this: &'a dyn Any, owner: &'static str) -> Result<&'a T> {
    this.downcast_ref::<T>().ok_or_else(|| {
        ShapeError::conversion(owner, format!("receiver is not a {}", type_name::<T>()))
    })
}

/// Downcasts an owned object, typically a carrier handed back to a self-describing type.
pub fn downcast<T: 'static>(object: Object, owner: &'static str) -> Result<T> {
    object.downcast::<T>().map(|boxed| *boxed).map_err(|_| {
        ShapeError::conversion(owner, format!("object is not a {}", type_name::<T>()))
    })
}
