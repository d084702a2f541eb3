// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

mod image;
mod layer;
mod repository;

pub use self::image::{Image, Resolved};
pub use self::layer::Layer;
pub use self::repository::Repository;

use crate::formats::oci::Platform;

/// Failures talking to a registry
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("image reference {0:?} is invalid, please specify <name:tag|name@digest>")]
    Reference(String),

    #[error("request for {url} failed")]
    Transport {
        url: String,
        #[source]
        source: Box<ureq::Error>,
    },

    #[error("{url} returned status {code}")]
    Status { url: String, code: u16 },

    #[error("manifest {reference} is larger than {limit} bytes")]
    TooLarge { reference: String, limit: u64 },

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("no manifest found for platform {0}")]
    Platform(Platform),

    #[error("image is built for {found}, not {wanted}")]
    PlatformMismatch { found: Platform, wanted: Platform },

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}
