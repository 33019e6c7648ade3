/// Type-state markers for the builder pattern
///
/// The token is the only setting without a usable default, so the
/// builder tracks at compile time whether it has been provided.

use std::marker::PhantomData;

/// Marker trait for token state
pub trait TokenState {}

/// Token has not been set
pub struct NoToken;
impl TokenState for NoToken {}

/// Token has been set
pub struct HasToken;
impl TokenState for HasToken {}

/// Phantom marker to prevent direct construction
#[derive(Debug, Clone, Copy)]
pub struct TypeState<T> {
    _token: PhantomData<T>,
}

impl<T> TypeState<T> {
    pub(crate) fn new() -> Self {
        Self {
            _token: PhantomData,
        }
    }
}

impl<T> Default for TypeState<T> {
    fn default() -> Self {
        Self::new()
    }
}
