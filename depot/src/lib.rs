#![deny(
    asm_sub_register,
    deprecated,
    missing_abi,
    unsafe_code,
    unused_macros,
    unused_must_use,
    unused_unsafe
)]
#![deny(clippy::from_over_into, clippy::needless_question_mark)]
#![cfg_attr(
    not(debug_assertions),
    deny(unused_imports, unused_mut, unused_variables,)
)]

//! The Depot common library.
//!
//! Depot is a distributed blob store. A metadata tracker records which
//! storage devices hold each object, and storage nodes hold the bytes in
//! content-numbered chunk files. This crate contains everything shared
//! between the tracker, the storage nodes and the clients:
//!
//! - [`digest`]: resumable checksums whose partial state can be
//!   checkpointed and exchanged between machines.
//! - [`chunkpath`]: the deterministic fid-to-path layout of chunk files.
//! - [`transfer`]: the offset-addressed chunk transfer protocol (header
//!   names and the client-side sender).
//! - [`api`]: tracker API request/response types.
//! - [`key`]: validated object key names.

pub mod api;
pub mod chunkpath;
pub mod digest;
pub mod error;
pub mod key;
pub mod transfer;

pub use error::{DepotError, DepotResult};
