//! Output writers for extracted listings.
//!
//! # Submodules
//!
//! - [`json`]: writes records as a pretty JSON array and as JSON Lines
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── listings.json    # one array, indented
//! └── listings.jsonl   # one record per line
//! ```

pub mod json;
