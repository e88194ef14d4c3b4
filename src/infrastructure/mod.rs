//! External integrations: admin REST, sync-layer REST, configuration,
//! logging.

pub mod config;
pub mod controlplane;
pub mod dataplane;
pub mod logging;
