//! CLI library components for the Millennium installer.

#![allow(missing_docs)]

pub mod cli;
pub mod logging;
pub mod summary;
