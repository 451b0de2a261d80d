// SPDX-FileCopyrightText: 2026 Keyward Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persistence collaborator traits.
//!
//! The vault never talks to a concrete database. It consumes a blob store
//! ([`KeyValueStore`]) and a queryable metadata index ([`MetadataIndex`]),
//! both of which extend [`PersistenceAdapter`] for identity and health.

pub mod adapter;
pub mod storage;

pub use adapter::PersistenceAdapter;
pub use storage::{KeyValueStore, MetadataIndex};
