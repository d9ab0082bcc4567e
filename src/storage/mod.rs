// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Tier backends.
//!
//! - [`memory::InMemoryTier`]: DashMap-backed, usable in either role
//! - [`redis::RedisTier`]: hash-per-record Redis cache tier

pub mod memory;
pub mod redis;
pub mod traits;
