// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

pub mod budget;
pub mod context;
pub mod store;

pub use budget::BudgetController;
pub use context::{CacheFileContext, PathContextPair};
pub use store::CacheStore;
