//! Output generation for the finished digest.
//!
//! # Submodules
//!
//! - [`json`]: Writes the [`Digest`](crate::models::Digest) consumed by the
//!   site renderer and the notifier
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! ├── digest.json            # Latest digest (always today's)
//! └── 2025-05-06/
//!     └── digest.json        # Archived copy per day
//! ```

pub mod json;
