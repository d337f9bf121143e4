//! # Core
//!
//! Pure types shared by every layer. No I/O happens here.
//!
//! - `Position` coercion (`IntoPosition`)
//! - `Element`, the bound for values stored in an array
//! - `ArrayConfig`
//! - `ArrayError`

pub mod config;
pub mod error;
pub mod position;

use serde::de::DeserializeOwned;
use serde::Serialize;

pub use error::{ArrayError, ArrayResult};
pub use position::IntoPosition;

/// A value that can live in an `OrderedArray`.
///
/// Anything serde can move in and out of a `serde_json::Value` qualifies.
pub trait Element: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}

impl<T> Element for T where T: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {}
