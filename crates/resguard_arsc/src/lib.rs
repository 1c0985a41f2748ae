//! Android resource table obfuscation.
//!
//! Rewrites `resources.arsc` so every resource entry of an app package gets a
//! short generated name, moves the resource files the table points at to short
//! paths, and optionally collapses files with identical content.
//!
//! A run makes three passes over the table:
//!
//! - **Pre-scan**: collect the original spec names of every type
//! - **Decode**: decide each entry's replacement and move its files
//! - **Encode**: replay the decode walk, writing the new pools and keys
//!
//! # Example
//!
//! ```no_run
//! use camino::Utf8Path;
//! use resguard_arsc::{PriorMapping, Resguard, ResguardOptions};
//! use resguard_config::Whitelist;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let whitelist = Whitelist::from_patterns(["com.example.R.string.app_name"])?;
//! let prior = PriorMapping::new();
//! let report = Resguard::new(&whitelist, &prior, ResguardOptions::default())
//!     .run(Utf8Path::new("build/unpacked"), Utf8Path::new("build/resguard"))?;
//!
//! let mut mapping = Vec::new();
//! report.write_mapping(&mut mapping)?;
//! println!("renamed {} resources", report.renamed_count());
//! # Ok(())
//! # }
//! ```

pub mod chunk;
mod decode;
mod encode;
pub mod error;
pub mod mapping;
pub mod merge;
pub mod model;
pub mod name_gen;
pub mod plan;
pub mod prescan;
pub mod report;
pub mod res_dir;
mod resguard;
pub mod string_pool;
pub mod table;

pub use decode::DecodedTable;
pub use error::{ResguardError, ResguardWarning, Result};
pub use mapping::PriorMapping;
pub use merge::{MergeSummary, MergedFile};
pub use model::{RenameDecision, ResPackage, ResType};
pub use prescan::PreScan;
pub use report::{IdMapping, ResguardReport};
pub use resguard::{Resguard, ResguardOptions, RESOURCES_ARSC};

#[cfg(test)]
mod test_support;
