// src/process/mod.rs

pub mod clean;
pub mod date_parser;
pub mod policy;
pub mod record;

pub use clean::{clean_file, clean_reader, CleanStats};
pub use policy::{ExclusionPolicy, PolicyColumn};
pub use record::{CanonicalRecord, CleanedTable, RawRecord};
