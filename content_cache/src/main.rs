// Copyright 2025 ReductSoftware UG
// Licensed under the Business Source License 1.1

use content_cache::core::env::StdEnvGetter;
use content_cache::launcher::{launch, shutdown_ctrl_c};
use log::error;

#[tokio::main]
async fn main() {
    if let Err(err) = launch(StdEnvGetter::default(), shutdown_ctrl_c()).await {
        error!("Failed to open cache: {}", err);
        std::process::exit(1);
    }
}
