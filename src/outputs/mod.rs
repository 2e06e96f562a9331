//! Output generation: the Telegram digest and the JSON run report.
//!
//! # Submodules
//!
//! - [`message`]: renders accepted results as an HTML digest and splits it
//!   into transport-sized parts
//! - [`json`]: writes the run report for later inspection
//!
//! # Output Structure
//!
//! ```text
//! json_output_dir/
//! └── 2025-05-06/
//!     ├── morning.json
//!     ├── afternoon.json
//!     └── evening.json
//! ```

pub mod json;
pub mod message;
