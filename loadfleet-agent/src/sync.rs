use std::sync::{self, PoisonError};

pub(crate) use std::sync::MutexGuard;

/// A mutex that shrugs off poisoning: a panicked holder never wedges the
/// agent's shared state.
#[derive(Debug, Default)]
pub(crate) struct Mutex<T: ?Sized>(sync::Mutex<T>);

impl<T> Mutex<T> {
    pub(crate) fn new(data: T) -> Self {
        Self(sync::Mutex::new(data))
    }
}

impl<T: ?Sized> Mutex<T> {
    pub(crate) fn lock(&self) -> MutexGuard<'_, T> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
