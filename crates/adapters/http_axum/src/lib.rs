//! # plugwatch-adapter-http-axum
//!
//! HTTP adapter built on [axum](https://docs.rs/axum).
//!
//! ## Responsibilities
//! - Serve a **JSON API** over the coordinator
//!   (`/api/plugs`, `/api/shutdown`, `/api/machine`, …)
//! - Stream coordinator events to observers as **server-sent events**
//!   (`/api/events/stream`)
//! - Map coordinator errors into HTTP status codes
//!
//! ## Dependency rule
//! Depends on `plugwatch-app` (coordinator and port traits) and
//! `plugwatch-domain` (types used in request/response mapping). Never leaks
//! axum types into the domain.

pub mod api;
pub mod error;
pub mod router;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;
