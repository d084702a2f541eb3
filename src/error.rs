// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use crate::api;
use crate::formats::Digest;
use crate::iotools::{decoder, Codec};

use std::path::PathBuf;

/// Reasons a write of an image to a device is abandoned
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("image reference {0:?} is invalid, please specify <name:tag|name@digest>")]
    ReferenceInvalid(String),

    #[error("failed to open device {}", .device.display())]
    DeviceOpen {
        device: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to resolve manifest for {reference}")]
    Resolve {
        reference: String,
        #[source]
        source: api::Error,
    },

    #[error("failed to fetch manifest for {reference}")]
    Fetch {
        reference: String,
        #[source]
        source: api::Error,
    },

    #[error("failed to parse manifest for {reference}")]
    ManifestParse {
        reference: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("failed to fetch layer {digest}")]
    LayerFetch {
        digest: Digest,
        #[source]
        source: api::Error,
    },

    #[error("failed to create decompressor for layer {digest} ({title:?})")]
    UnsupportedCodec {
        digest: Digest,
        title: String,
        #[source]
        source: decoder::Unsupported,
    },

    #[error("failed to create {codec} decompressor for layer {digest}")]
    CodecInit {
        digest: Digest,
        codec: Codec,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write layer {digest} to device")]
    DeviceWrite {
        digest: Digest,
        #[source]
        source: std::io::Error,
    },

    #[error("no layers with media type {media_type} found in manifest")]
    NoMatchingLayers { media_type: &'static str },
}

impl Error {
    pub(crate) fn decoder(digest: &Digest, title: &str, err: decoder::Error) -> Self {
        match err {
            decoder::Error::Unsupported(source) => Self::UnsupportedCodec {
                digest: digest.clone(),
                title: title.into(),
                source,
            },

            decoder::Error::Init(codec, source) => Self::CodecInit {
                digest: digest.clone(),
                codec,
                source,
            },
        }
    }
}
