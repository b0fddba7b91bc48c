//! Request routing.
//!
//! - [`RouteTable`]: explicit `(path, method) -> handler` table validated at
//!   startup
//! - [`handle`]: the per-request state machine (bypasses, auth, rate limit,
//!   dispatch, panic containment)

mod dispatch;
mod routes;

pub use dispatch::handle;
pub use routes::{HandlerKind, Route, RouteMethod, RouteTable};
