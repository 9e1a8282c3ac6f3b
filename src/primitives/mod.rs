//! Low-level primitives the stores are built on.

/// Varint and buffer utilities.
pub mod bytes;

/// Positioned file I/O.
pub mod io;

/// Fixed-size block file with a checksummed commit header.
pub mod block;
