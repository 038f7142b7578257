//! Raw FFI declarations for the NPU vendor runtimes.
//!
//! Only the subset the runner uses is declared. Each runtime sits behind its
//! own cargo feature (`acl`, `rknn`); `build.rs` links the matching shared
//! library when the feature is enabled.
//!
//! # Safety
//! Everything here is an unsafe FFI call. Use the backends in
//! `edgeflow-runner` for safe wrappers.

#![allow(non_upper_case_globals)]
#![allow(non_camel_case_types)]
#![allow(non_snake_case)]
#![allow(clippy::all)]

#[cfg(feature = "acl")]
pub mod acl;

#[cfg(feature = "rknn")]
pub mod rknn;
