// This file is part of framesift, a forensic multimedia parser.
// SPDX-License-Identifier: GPL-3.0-or-later

mod error;
pub mod tracing_setup;

pub use crate::error::{prettify_error, Error, ErrorKind, ResultExt};
