//! JobAction port - what a scheduled job runs.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::JobError;

/// An argument-less async entry point.
///
/// # Example
/// ```ignore
/// struct Ping;
///
/// #[async_trait]
/// impl JobAction for Ping {
///     async fn run(&self) -> Result<(), JobError> {
///         tracing::info!("ping");
///         Ok(())
///     }
/// }
/// ```
#[async_trait]
pub trait JobAction: Send + Sync {
    async fn run(&self) -> Result<(), JobError>;
}

#[async_trait]
impl<A: JobAction + ?Sized> JobAction for Arc<A> {
    async fn run(&self) -> Result<(), JobError> {
        (**self).run().await
    }
}
