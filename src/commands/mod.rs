// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

use crate::pipeline;

use std::path::PathBuf;

use log::info;
use structopt::StructOpt;

pub trait Command {
    fn execute(self) -> anyhow::Result<()>;
}

/// Streams an OCI disk image onto a block device
#[derive(StructOpt, Debug)]
#[structopt(name = "oci2disk")]
pub struct Main {
    /// The image to write (format: [source]name[:tag|@digest])
    #[structopt(short, long, env = "IMG_URL")]
    image: String,

    /// The block device to write to
    #[structopt(short, long, env = "DEST_DISK", parse(from_os_str))]
    device: PathBuf,
}

impl Command for Main {
    fn execute(self) -> anyhow::Result<()> {
        info!("OCI2DISK - OCI Container Disk image streamer");

        pipeline::write(&self.image, &self.device)?;

        info!(
            "Successfully written [{}] to [{}]",
            self.image,
            self.device.display()
        );

        Ok(())
    }
}
