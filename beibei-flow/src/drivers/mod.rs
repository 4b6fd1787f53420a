//! Driver backends binding the surface seam to a real automation engine.
//!
//! Everything above this module is driver-agnostic: the workflow talks to
//! [`Surface`](crate::surface::Surface) handles and never to a concrete
//! engine. The CDP driver below is the production backend; tests substitute
//! in-memory doubles.

pub mod cdp;

use crate::errors::FlowError;
use crate::surface::Surface;
use async_trait::async_trait;
use std::fmt::Debug;

/// A live connection to the driven application.
#[async_trait]
pub trait DriverSession: Send + Sync + Debug {
    /// Re-acquire the current top-level window. Steps call this instead of
    /// holding a long-lived handle, which tolerates the window being
    /// replaced (e.g. by a login-driven reload).
    async fn current_window(&self) -> Result<Surface, FlowError>;

    /// Close the driven application.
    async fn close(&self) -> Result<(), FlowError>;
}
