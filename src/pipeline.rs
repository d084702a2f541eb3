// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

//! Streams the layers of an image onto a device

use crate::api::{self, Image, Repository};
use crate::device::Device;
use crate::error::Error;
use crate::formats::{self, oci::Descriptor, oci::Platform};
use crate::iotools::{Decoder, Reporter, Tracked};

use std::io::{Read, Write};
use std::path::Path;

use indicatif::HumanBytes;
use log::{debug, info};

/// Where the pipeline gets its layers from
pub trait Source {
    type Blob: Read;

    /// The layers of the manifest, in order
    fn layers(&self) -> &[Descriptor];

    /// Opens the byte stream of one layer
    fn fetch(&self, layer: &Descriptor) -> Result<Self::Blob, api::Error>;
}

impl Source for Image {
    type Blob = Box<dyn Read + Send + Sync + 'static>;

    fn layers(&self) -> &[Descriptor] {
        &self.manifest().layers
    }

    fn fetch(&self, layer: &Descriptor) -> Result<Self::Blob, api::Error> {
        let (len, reader) = self.layer(layer).download()?;
        debug!("layer {} announced {} bytes", layer.digest, len);
        Ok(reader)
    }
}

/// What a run wrote
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct Totals {
    pub layers: usize,
    pub bytes: u64,
}

/// Writes every layer of `source` with the recognized media type to
/// `device`, in manifest order
pub fn run<S: Source, W: Write>(source: &S, device: &mut W) -> Result<Totals, Error> {
    let mut totals = Totals::default();

    for layer in source.layers() {
        if layer.media_type != formats::LAYER {
            debug!("Skipping layer with media type: {}", layer.media_type);
            continue;
        }

        info!("Fetching layer: {} (size: {} bytes)", layer.digest, layer.size);

        let blob = source.fetch(layer).map_err(|source| Error::LayerFetch {
            digest: layer.digest.clone(),
            source,
        })?;

        // The blob is dropped with the failed decoder.
        let reader = match layer.title() {
            Some(title) => Decoder::for_name(title, blob)
                .map_err(|e| Error::decoder(&layer.digest, title, e))?,
            None => Decoder::plain(blob),
        };

        if let Some(codec) = reader.codec() {
            debug!("decompressing layer {} as {}", layer.digest, codec);
        }

        let mut tracked = Tracked::new(&mut *device, reader);
        let progress = tracked.progress();
        let reporter = Reporter::start(progress.clone(), layer.size);

        let copied = tracked.copy();
        reporter.stop();

        // Releases the decoder, then the blob beneath it.
        drop(tracked);

        copied.map_err(|source| Error::DeviceWrite {
            digest: layer.digest.clone(),
            source,
        })?;

        totals.layers += 1;
        totals.bytes += progress.write_count();
    }

    if totals.layers == 0 {
        return Err(Error::NoMatchingLayers {
            media_type: formats::LAYER,
        });
    }

    info!(
        "Successfully processed {} layer(s), total: {}",
        totals.layers,
        HumanBytes(totals.bytes)
    );

    Ok(totals)
}

/// Pulls `reference` and writes its disk layers to the device at `device`
pub fn write(reference: &str, device: impl AsRef<Path>) -> Result<Totals, Error> {
    let (repo, tag) =
        Repository::new(reference).map_err(|_| Error::ReferenceInvalid(reference.into()))?;

    let mut device = Device::open(device)?;

    info!(
        "Beginning write of image [{}] to disk [{}]",
        repo,
        device.path().display()
    );

    let platform = Platform::current();
    info!("Filtering for platform: {}", platform);

    let resolved = repo.resolve(tag, &platform).map_err(|source| Error::Resolve {
        reference: reference.into(),
        source,
    })?;

    let image = resolved
        .fetch()
        .map_err(|source| Error::Fetch {
            reference: reference.into(),
            source,
        })?
        .parse()
        .map_err(|source| Error::ManifestParse {
            reference: reference.into(),
            source,
        })?;

    info!("Resolved {} to {}", reference, image);

    let totals = run(&image, &mut device)?;
    device.finalize();
    Ok(totals)
}
