//! cpf-core - Dynamic Plugin Framework for POSIX/ELF Systems
//!
//! Discovers shared objects under a root directory, loads them through
//! the dynamic linker, extracts their exported function and dependency
//! tables straight out of the ELF symbol table, links cross-plugin
//! dependencies, invokes lifecycle hooks, and reconciles a live set
//! against a freshly discovered one for hot reload.

pub mod discover;
pub mod dispatch;
pub mod elf;
pub mod error;
pub mod framework;
pub mod hash;
pub mod plugin;
pub mod reconcile;

pub use error::CoreError;
pub use framework::Framework;

/// Install the process-wide `tracing` subscriber. Level is taken from
/// `RUST_LOG`, defaulting to `info`. Safe to call more than once; later
/// calls are no-ops (`tracing_subscriber`'s global subscriber can only be
/// set once per process).
pub fn init_logging() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_logging_does_not_panic_when_called_twice() {
        init_logging();
        init_logging();
    }
}
