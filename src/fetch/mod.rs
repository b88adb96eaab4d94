// src/fetch/mod.rs

pub mod download;
pub mod select;

pub use download::{download_selected, DownloadOutcome};
pub use select::{select_new_exports, ExportName, Selection};
