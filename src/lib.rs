rust_i18n::i18n!("locales", fallback = "en");

pub mod config;
pub mod error;
pub mod features;
mod i18n;
mod router;
mod state;
mod ui;

#[cfg(test)]
mod ui_tests;

pub use config::Config;
pub use error::{OverlayError, WorkflowError};
pub use features::compositor::{apply, apply_image, page_dimensions, ImageSource, OverlayImage};
pub use features::workflow::Workflow;
