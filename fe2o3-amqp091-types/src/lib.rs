#![deny(missing_docs, missing_debug_implementations)]

//! Implements the AMQP 0-9-1 data types, field tables, method arguments and
//! content headers.
//!
//! Everything in this crate is a pure codec over [`bytes`] buffers. Framing,
//! connection and channel state live in `fe2o3-amqp091`.

pub mod definitions;
pub mod methods;
pub mod primitives;
pub mod properties;
pub mod value;

mod error;
pub use error::Error;
