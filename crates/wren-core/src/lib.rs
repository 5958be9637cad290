//! # wren-core
//!
//! Core blob primitives, element types, and numeric kernels for wren.
//!
//! This crate provides:
//! - [`Blob`] — shaped buffer with a shareable value region, an owned
//!   gradient region and an optional per-channel selection
//! - [`Shape`] — dimension list with `[num, channels, height, width]` accessors
//! - [`DType`] / [`WithDType`] — the floating-point element types
//! - [`Backend`] trait and [`CpuBackend`] — copy / add / axpy / set kernels
//! - [`Error`] — invariant violations and other failures

pub mod backend;
pub mod blob;
pub mod dtype;
pub mod error;
pub mod shape;

pub use backend::{Backend, CpuBackend};
pub use blob::{Blob, BlobId, BlobState};
pub use dtype::{DType, WithDType};
pub use error::{Error, Result};
pub use shape::Shape;
