//! Promise/A+ deferred values for a single cooperative execution context.
//!
//! A [`Runtime`] owns the microtask queue. Promises are created with
//! [`Runtime::new_promise`] or [`Runtime::deferred`], chained with
//! [`Runtime::then`], and their reactions run when the host drains the queue
//! with [`Runtime::run_microtasks`]. Any object exposing a callable `then`
//! member is adopted as a thenable.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::error::Error as StdError;
use std::fmt;
use std::rc::Rc;

use num_bigint::BigInt;

mod promise;
mod resolution;
mod runtime;
mod runtime_state;
mod runtime_values;

pub use promise::{Deferred, Promise, Trigger};
pub use runtime::Runtime;
pub use runtime_values::{
    ErrorValue, FunctionValue, NativeFn, ObjectValue, PromiseState, Property, Value,
};

pub(crate) use runtime_state::*;
pub(crate) use runtime_values::{
    PromiseReaction, PromiseReactionKind, PromiseSettledValue, PromiseValue,
};

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Clone, PartialEq)]
pub enum Error {
    Thrown(Value),
    TypeError(String),
    MicrotaskLimitExceeded {
        limit: usize,
        ran: usize,
        next_task: String,
    },
    InvalidConfig(String),
}

impl Error {
    /// Converts the error into the payload a promise is rejected with.
    pub fn into_reason(self) -> Value {
        match self {
            Self::Thrown(value) => value,
            Self::TypeError(message) => ErrorValue::type_error(message).into(),
            other => ErrorValue::new("Error", other.to_string()).into(),
        }
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Thrown(value) => write!(f, "uncaught {value}"),
            Self::TypeError(msg) => write!(f, "type error: {msg}"),
            Self::MicrotaskLimitExceeded {
                limit,
                ran,
                next_task,
            } => write!(
                f,
                "microtask step limit exceeded: limit={limit} ran={ran} next_task={next_task}"
            ),
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
        }
    }
}

impl StdError for Error {}

/// Raises `value` from a handler or executor.
pub fn throw<T>(value: impl Into<Value>) -> Result<T> {
    Err(Error::Thrown(value.into()))
}

#[cfg(test)]
mod tests;
