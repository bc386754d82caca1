//! Columnar binary container and query engine for semi-structured log
//! lines: extract templates, store variable fields in typed columns, and
//! query without decompressing lines you don't need.

pub mod classify;
pub mod codec;
pub mod column;
pub mod compress;
pub mod config;
pub mod container;
pub mod entropy;
pub mod error;
pub mod field_type;
pub mod query;
pub mod template;
pub mod timefmt;
pub mod token;

mod bits;

pub use compress::{compress, decompress_all};
pub use config::CompressionConfig;
pub use container::Container;
pub use error::{Error, Result};
pub use query::{count, count_matching, filter, Predicate};
