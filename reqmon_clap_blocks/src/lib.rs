//! Building blocks for [`clap`]-driven configuration
//!
//! Each block can be `#[clap(flatten)]`ed into a binary's config. Every setting is
//! resolved from its command line flag first, then its environment variable, then its
//! default.
pub mod identity;
pub mod logging;
pub mod reporting;
pub mod settings;
