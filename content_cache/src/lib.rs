// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1
pub mod cache;
pub mod cfg;
pub mod core;
pub mod launcher;
pub mod provider;
