//! Study Desk: notes, scored quiz exercises, and a private file archive
//! behind one small self-hosted binary.
//!
//! The crate splits into domain stores over a shared SQLite handle
//! ([`store`], [`auth`], [`notes`], [`exercises`], [`archive`]) and an HTTP
//! [`gateway`] that renders the whole UI server-side.

pub mod archive;
pub mod auth;
pub mod config;
pub mod exercises;
pub mod gateway;
pub mod notes;
pub mod store;
