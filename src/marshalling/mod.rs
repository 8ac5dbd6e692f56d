//! Dump and load engines.
//!
//! A [`Marshaller`] or [`Unmarshaller`] is built for every call and owns
//! that call's error store, so concurrent calls on one schema instance
//! never share error state.

mod accessor;
mod marshaller;
mod unmarshaller;

pub use accessor::{set_value, Accessor, DefaultAccessor};
pub(crate) use marshaller::Marshaller;
pub(crate) use unmarshaller::{collect_errors, Unmarshaller};
