//! Library target for the `footage` package.
//!
//! The primary deliverable of this package is the `footage` CLI binary
//! (`src/main.rs`). This library exists so CI can run `cargo test -p footage
//! --doc` for feature/doctype validation.

#[doc(hidden)]
pub use footage_engine;
