#![deny(missing_docs, missing_debug_implementations)]

//! Implements the AMQP 0-9-1 data types as defined in the
//! [specification](https://www.rabbitmq.com/resources/specs/amqp0-9-1.pdf).
//!
//! Decoding goes through [`read::Parser`], a cursor that never fails on truncated input.
//! Encoding goes through [`ser::Encode`].

pub mod constants;
pub mod content;
pub mod error;
pub mod methods;
pub mod primitives;
pub mod read;
pub mod ser;
pub mod value;

pub use content::{BasicProperties, ContentHeader};
pub use error::Error;
pub use methods::{Method, MethodKind};
pub use primitives::{Decimal, ShortString, Timestamp};
pub use read::Parser;
pub use ser::Encode;
pub use value::{FieldTable, FieldValue};
