//! User authentication: credential store + cookie-backed sessions.
//!
//! Provides:
//! - Registration with username/password (iterated SHA-256, 100k rounds + per-user salt)
//! - Session token management (opaque hex tokens, SHA-256 hashed for storage, time-limited)
//! - SQLite-backed persistent storage over the shared [`crate::store::Store`]
//!
//! ## Design Decisions
//! - No external JWT dependency — sessions use opaque random tokens with
//!   server-side SHA-256 hashed lookup.
//! - Password hashing uses iterated SHA-256 (100k rounds) + per-user salt
//!   (using the existing `sha2` crate) to avoid new dependencies while
//!   maintaining security.
//! - Login failure is uniform: unknown usernames and wrong passwords share
//!   one message and comparable timing.

pub mod store;

pub use store::{AuthStore, Session, User, DEFAULT_SESSION_TTL_SECS};
