//! # TIFF-volume library
//!
//! This crate reassembles microscope recordings stored as one multi-page
//! TIFF per timepoint into time series volumes.
//!
//! A recording directory holds one `*.tif` file per timepoint, each a
//! Z-stack whose page index is the depth index. Files are ordered by file
//! name. The volume can be compiled in three ways:
//!  - Merge: one (T, Z, Y, X) volume
//!  - Split: one (T, Y, X) series per depth index
//!  - Z-projection: one (T, Y, X) series of per-timepoint mean projections
//!
//! Files that cannot be read or do not have the expected number of pages
//! are skipped with a diagnostic; they never abort an operation. Outputs are
//! uncompressed single-channel 16-bit BigTIFFs.
//!
//! Besides compiling, the crate downsamples (T, Y, X) series in time and
//! drives an external motion correction program, rescaling its output to
//! the full 16-bit range.
//!
//! # Examples
//!
//! ## Merging a recording directory
//!
//! To merge all 4-page Z-stacks of the recording/ directory and save the
//! result:
//!
//! ```no_run
//! # use tiff_volume::{VolumeLoader, scanner, tiff_io};
//! # use std::path::Path;
//! let files = scanner::list_tiffs("recording").expect("should have listed directory");
//! let volume = VolumeLoader::merge(&files, 4).expect("should have found valid Z-stacks");
//! tiff_io::write_volume(Path::new("recording_TZYX.tif"), &volume)
//!    .expect("should have written volume");
//! ```

pub mod batch;
pub mod config;
pub mod downsample;
pub mod enums;
pub mod motion;
pub mod naming;
pub mod picker;
pub mod scanner;
pub mod tiff_io;
pub mod volume;
pub mod volume_loader;

pub use batch::{BatchError, BatchReport, Outcome, Recording};
pub use enums::{Axes, CompileMode, CorrectionDims, Rigidity, Rounding};
pub use motion::{ExternalEngine, MotionEngine, MotionError, MotionParams};
pub use picker::{FixedFolder, FolderPicker};
pub use volume::Volume;
pub use volume_loader::{VolumeLoader, VolumeLoaderError};
