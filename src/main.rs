// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

mod api;
mod commands;
mod device;
mod error;
mod formats;
mod iotools;
mod pipeline;

use commands::Command;
use env_logger::Env;
use structopt::StructOpt;

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    commands::Main::from_args().execute()
}
