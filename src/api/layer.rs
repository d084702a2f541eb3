// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use super::{Error, Repository};
use crate::formats::oci::Descriptor;

use std::io::Read;

/// A layer blob stored in a repository
#[derive(Clone, Debug)]
pub struct Layer {
    repo: Repository,
    descriptor: Descriptor,
}

impl Layer {
    pub(super) fn new(repo: Repository, descriptor: Descriptor) -> Self {
        Self { repo, descriptor }
    }

    /// Starts downloading the blob
    ///
    /// Returns the length announced by the registry, or the size from the
    /// descriptor when there is none, with a reader over the body.
    pub fn download(&self) -> Result<(u64, Box<dyn Read + Send + Sync + 'static>), Error> {
        let rep = self.repo.blob(&self.descriptor.digest.to_string())?;
        let len = rep
            .header("Content-Length")
            .and_then(|s| s.parse().ok())
            .unwrap_or(self.descriptor.size);

        Ok((len, rep.into_reader()))
    }
}
