// SPDX-License-Identifier: Apache-2.0
// Copyright (C) 2021 Profian, Inc.

//! Utility types for dealing with readers and writers

pub mod decoder;
mod counter;
mod reporter;

pub use counter::{Progress, Tracked};
pub use decoder::{Codec, Decoder};
pub use reporter::Reporter;
