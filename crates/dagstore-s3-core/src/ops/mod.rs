//! Object-store operation implementations.
//!
//! Each submodule adds an `impl ObjectStore` block for one group of
//! operations:
//!
//! - [`object`]: store, get, stat, delete
//! - [`list`]: listing, bucket usage and bucket cleanup
//! - [`multipart`]: multipart upload lifecycle

mod list;
mod multipart;
mod object;
