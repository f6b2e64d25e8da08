//! Storage is organized through [kv_store::JsonStore].
//! The basic idea is:
//!  - There is a directory holding one JSON document per logical record.
//!  - Four records exist: projects, tasks, sessions and the single mutable current state.
//!  - Writers serialize on a sidecar lock file, so independent processes sharing the
//!    directory never interleave a read-modify-write.

pub mod entities;
pub mod kv_store;
