// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Base trait every persistence backend implements.

use async_trait::async_trait;

use crate::error::KeywardError;
use crate::types::HealthStatus;

/// Identity and liveness for a persistence backend.
#[async_trait]
pub trait PersistenceAdapter: Send + Sync + 'static {
    /// Returns the human-readable name of this backend.
    fn name(&self) -> &str;

    /// Performs a cheap reachability check.
    async fn health_check(&self) -> Result<HealthStatus, KeywardError>;
}
