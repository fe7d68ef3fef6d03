//! Recording directory scanning and per-file validation.
//!
//! A file that cannot be read, or whose page count or page size does not
//! match what the operation expects, is skipped with a diagnostic. Skips
//! never abort the scan.

use crate::tiff_io::{self, StackError};

use ndarray::{Array3, Axis, stack};
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{info, warn};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum SkipReason {
    #[error("unreadable: {0}")]
    Unreadable(String),

    #[error("expected {expected} slices, found {found}")]
    PageCountMismatch { expected: usize, found: usize },

    #[error("page size {found:?} differs from {expected:?} of earlier files")]
    ShapeMismatch {
        expected: (usize, usize),
        found: (usize, usize),
    },
}

impl From<StackError> for SkipReason {
    fn from(error: StackError) -> Self {
        SkipReason::Unreadable(error.to_string())
    }
}

/// Result of loading one file.
#[derive(Debug)]
pub enum StackOutcome {
    Loaded(Array3<u16>),
    Skipped(SkipReason),
}

/// Page count a file must have to take part in an operation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Depth {
    Exactly(usize),
    Any,
}

/// Loaded stacks in input order plus the files that were left out.
#[derive(Debug, Default)]
pub struct ScanReport {
    pub loaded: Vec<(PathBuf, Array3<u16>)>,
    pub skipped: Vec<(PathBuf, SkipReason)>,
}

impl ScanReport {
    pub fn is_empty(&self) -> bool {
        self.loaded.is_empty()
    }

    pub fn stacks(&self) -> impl Iterator<Item = &Array3<u16>> {
        self.loaded.iter().map(|(_, stack)| stack)
    }
}

fn is_tif(path: &Path) -> bool {
    let visible = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| !name.starts_with('.'));
    visible
        && path.is_file()
        && path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext == "tif")
}

/// List the `*.tif` files of a directory in ascending lexicographic
/// file name order. Hidden files are not listed.
pub fn list_tiffs(dir: impl AsRef<Path>) -> io::Result<Vec<PathBuf>> {
    let mut paths: Vec<_> = fs::read_dir(dir.as_ref())?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| is_tif(path))
        .collect();
    paths.sort();
    Ok(paths)
}

/// Load one timepoint as a (Z, Y, X) stack.
pub fn load_stack(path: &Path, depth: Depth) -> StackOutcome {
    let limit = match depth {
        Depth::Exactly(expected) => match tiff_io::count_pages(path) {
            Ok(found) if found == expected => Some(expected),
            Ok(found) => {
                return StackOutcome::Skipped(SkipReason::PageCountMismatch { expected, found });
            }
            Err(e) => return StackOutcome::Skipped(e.into()),
        },
        Depth::Any => None,
    };

    let pages = match tiff_io::read_pages::<u16>(path, limit) {
        Ok(pages) => pages,
        Err(e) => return StackOutcome::Skipped(e.into()),
    };
    let views: Vec<_> = pages.iter().map(|page| page.view()).collect();
    match stack(Axis(0), &views) {
        Ok(zstack) => StackOutcome::Loaded(zstack),
        Err(e) => StackOutcome::Skipped(SkipReason::Unreadable(e.to_string())),
    }
}

/// Load every file in order, keeping those that match `depth` and the page
/// size of the first loaded file.
pub fn scan_stacks(files: &[impl AsRef<Path>], depth: Depth) -> ScanReport {
    let mut report = ScanReport::default();
    let mut plane_dim: Option<(usize, usize)> = None;

    for path in files.iter().map(AsRef::as_ref) {
        info!("Processing: {}", path.display());
        let outcome = match load_stack(path, depth) {
            StackOutcome::Loaded(zstack) => {
                let (_, rows, cols) = zstack.dim();
                match plane_dim {
                    Some(expected) if expected != (rows, cols) => {
                        StackOutcome::Skipped(SkipReason::ShapeMismatch {
                            expected,
                            found: (rows, cols),
                        })
                    }
                    _ => {
                        plane_dim = Some((rows, cols));
                        StackOutcome::Loaded(zstack)
                    }
                }
            }
            skipped => skipped,
        };

        match outcome {
            StackOutcome::Loaded(zstack) => report.loaded.push((path.to_path_buf(), zstack)),
            StackOutcome::Skipped(reason) => {
                warn!("Skipping {}: {}", path.display(), reason);
                report.skipped.push((path.to_path_buf(), reason));
            }
        }
    }
    report
}
