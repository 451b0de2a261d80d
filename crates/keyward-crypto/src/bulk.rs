// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Batched processing with per-item error collection.

use keyward_core::KeywardError;
use serde::Serialize;

/// How a bulk call walks its input.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BulkOptions {
    /// Items processed between cooperative yields.
    pub batch_size: usize,
    /// Return the first item error instead of collecting.
    pub fail_fast: bool,
}

impl Default for BulkOptions {
    fn default() -> Self {
        Self {
            batch_size: 10,
            fail_fast: false,
        }
    }
}

/// A failed item, identified by position only so no plaintext is echoed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BulkError {
    pub index: usize,
    pub error: String,
}

/// Aggregate outcome of a bulk call. `success` keeps input order with
/// failed items omitted.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BulkResult<T> {
    pub success: Vec<T>,
    pub errors: Vec<BulkError>,
    pub total_count: usize,
    pub success_count: usize,
    pub error_count: usize,
}

/// Apply `op` to every item in batches of `options.batch_size`, yielding to
/// the scheduler between batches.
pub(crate) async fn run_batched<I, T, F>(
    items: Vec<I>,
    options: BulkOptions,
    mut op: F,
) -> Result<BulkResult<T>, KeywardError>
where
    F: FnMut(I) -> Result<T, KeywardError>,
{
    if options.batch_size == 0 {
        return Err(KeywardError::Validation("batch size must be at least 1".into()));
    }

    let total_count = items.len();
    let mut success = Vec::with_capacity(total_count);
    let mut errors = Vec::new();

    for (index, item) in items.into_iter().enumerate() {
        if index > 0 && index % options.batch_size == 0 {
            tokio::task::yield_now().await;
        }
        match op(item) {
            Ok(value) => success.push(value),
            Err(e) if options.fail_fast => {
                tracing::debug!(index, error = %e, "bulk operation stopped at first failure");
                return Err(e);
            }
            Err(e) => errors.push(BulkError {
                index,
                error: e.to_string(),
            }),
        }
    }

    Ok(BulkResult {
        success_count: success.len(),
        error_count: errors.len(),
        success,
        errors,
        total_count,
    })
}
