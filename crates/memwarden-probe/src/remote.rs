//! The remote capability seam.

use std::future::Future;

use memwarden_core::CommandOutput;

/// Runs the two remote operations against one host.
///
/// Implementations must not fail: transport errors and timeouts are
/// reported through [`CommandOutput::exit_code`] and the output text.
pub trait RemoteCapability: Send + Sync + 'static {
    /// Read-only health check. Must never change remote state.
    fn probe(&self, host: &str) -> impl Future<Output = CommandOutput> + Send;

    /// Restart the service on `host`. Called at most once per host per run.
    fn restart(&self, host: &str) -> impl Future<Output = CommandOutput> + Send;
}
