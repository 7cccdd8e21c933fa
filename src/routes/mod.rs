//! HTTP route handlers grouped by resource.
//!
//! Handlers are thin: they validate the request body, call a repository or
//! the import coordinator, and wrap the result in the response envelope.
//! Every handler is annotated with `#[openapi]` so `rocket_okapi` can derive
//! the OpenAPI document.

pub mod health;
pub(crate) mod helpers;
pub mod import;
pub mod teams;
pub mod users;
