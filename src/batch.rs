//! Runs an operation over a list of input items.
//!
//! Items are processed in order and independently: an item that fails is
//! reported and the next one still runs.

use crate::{
    config::{CompileOptions, DownsampleOptions, MotionOptions},
    downsample::{self, DownsampleError},
    enums::CompileMode,
    motion::{self, MotionEngine, MotionError},
    naming::OutputNaming,
    picker::FolderPicker,
    scanner,
    tiff_io::{self, StackError},
    volume::Volume,
    volume_loader::{VolumeLoader, VolumeLoaderError},
};

use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
pub enum BatchError {
    #[error("Unsupported item, expected a directory or .tif file: {0}")]
    Unsupported(PathBuf),

    #[error("No TIFF files found in {0}")]
    NoTiffs(PathBuf),

    #[error("Failed to list {path}: {source}")]
    List {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Failed to read Z-stack length from {path}: {source}")]
    Depth {
        path: PathBuf,
        #[source]
        source: StackError,
    },

    #[error(transparent)]
    Compile(#[from] VolumeLoaderError),

    #[error(transparent)]
    Downsample(#[from] DownsampleError),

    #[error(transparent)]
    Motion(#[from] MotionError),

    #[error("Failed to create output folder {path}: {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Save failed for {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: StackError,
    },
}

/// The TIFF files behind one input item.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Recording {
    /// Directory or file the item named; output names derive from it.
    pub source: PathBuf,
    /// Timepoint files in processing order.
    pub files: Vec<PathBuf>,
}

impl Recording {
    pub fn naming(&self) -> OutputNaming {
        OutputNaming::from_source(&self.source)
    }
}

/// What a single operation produced.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outcome {
    Written(Vec<PathBuf>),
    /// No output folder was chosen.
    Cancelled,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub written: Vec<PathBuf>,
    pub cancelled: Vec<PathBuf>,
    /// Items where no file survived validation. Nothing was written.
    pub empty: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, BatchError)>,
}

impl BatchReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }

    fn record(&mut self, item: &Path, result: Result<Outcome, BatchError>) {
        match result {
            Ok(Outcome::Written(paths)) => self.written.extend(paths),
            Ok(Outcome::Cancelled) => self.cancelled.push(item.to_path_buf()),
            Err(BatchError::Compile(VolumeLoaderError::NoValidStacks)) => {
                warn!("No valid Z-stacks found in {}", item.display());
                self.empty.push(item.to_path_buf());
            }
            Err(e) => {
                error!("{}: {}", item.display(), e);
                self.failed.push((item.to_path_buf(), e));
            }
        }
    }
}

fn is_tif_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("tif"))
}

/// Resolve a directory to its sorted `*.tif` files, or a `.tif` file to
/// itself.
pub fn resolve_item(item: &Path) -> Result<Recording, BatchError> {
    let files = if item.is_dir() {
        scanner::list_tiffs(item).map_err(|source| BatchError::List {
            path: item.to_path_buf(),
            source,
        })?
    } else if is_tif_file(item) {
        vec![item.to_path_buf()]
    } else {
        return Err(BatchError::Unsupported(item.to_path_buf()));
    };

    if files.is_empty() {
        return Err(BatchError::NoTiffs(item.to_path_buf()));
    }
    Ok(Recording {
        source: item.to_path_buf(),
        files,
    })
}

/// Z-stack depth of a recording: the page count of its first file.
pub fn detect_depth(recording: &Recording) -> Result<usize, BatchError> {
    let first = recording
        .files
        .first()
        .ok_or_else(|| BatchError::NoTiffs(recording.source.clone()))?;
    let depth = tiff_io::count_pages(first).map_err(|source| BatchError::Depth {
        path: first.clone(),
        source,
    })?;
    info!("Detected Z-stack length: {}", depth);
    Ok(depth)
}

fn ensure_folder(path: PathBuf) -> Result<PathBuf, BatchError> {
    fs::create_dir_all(&path).map_err(|source| BatchError::CreateDir {
        path: path.clone(),
        source,
    })?;
    info!("Ensured folder exists: {}", path.display());
    Ok(path)
}

fn save(path: PathBuf, volume: &Volume) -> Result<PathBuf, BatchError> {
    tiff_io::write_volume(&path, volume).map_err(|source| BatchError::Write {
        path: path.clone(),
        source,
    })?;
    info!("Saved {}", path.display());
    Ok(path)
}

/// Assemble a recording per `options.mode` and write the result into a
/// subfolder of the picked base directory.
///
/// The folder is only requested once assembly succeeded, so an empty
/// recording never prompts and never writes.
pub fn compile_recording(
    recording: &Recording,
    options: &CompileOptions,
    picker: &mut dyn FolderPicker,
) -> Result<Outcome, BatchError> {
    let depth = match (options.mode, options.depth) {
        (CompileMode::ZProject, _) => None,
        (_, Some(depth)) => Some(depth),
        (_, None) => Some(detect_depth(recording)?),
    };

    let volumes = match (options.mode, depth) {
        (CompileMode::Merge, Some(depth)) => vec![VolumeLoader::merge(&recording.files, depth)?],
        (CompileMode::Split, Some(depth)) => VolumeLoader::split_by_z(&recording.files, depth)?,
        _ => vec![VolumeLoader::z_project(&recording.files, options.rounding)?],
    };

    let naming = recording.naming();
    let Some(base_dir) = picker.pick_folder("Select output base folder") else {
        info!("No output directory selected");
        return Ok(Outcome::Cancelled);
    };
    let folder = ensure_folder(naming.folder(&base_dir))?;

    let mut written = Vec::with_capacity(volumes.len());
    for (z, volume) in volumes.iter().enumerate() {
        let path = match options.mode {
            CompileMode::Merge => naming.merged(&folder),
            CompileMode::Split => naming.split(&folder, z),
            CompileMode::ZProject => naming.projection(&folder),
        };
        match save(path, volume) {
            Ok(path) => written.push(path),
            Err(e) => {
                discard(&written);
                return Err(e);
            }
        }
    }
    Ok(Outcome::Written(written))
}

/// Remove the outputs of an operation that failed part-way.
fn discard(paths: &[PathBuf]) {
    for path in paths {
        match fs::remove_file(path) {
            Ok(()) => warn!("Removed partial output {}", path.display()),
            Err(e) => warn!("Failed to remove partial output {}: {}", path.display(), e),
        }
    }
}

/// Downsample one stored series into the picked directory.
pub fn downsample_one(
    file: &Path,
    options: &DownsampleOptions,
    picker: &mut dyn FolderPicker,
) -> Result<Outcome, BatchError> {
    let volume = downsample::downsample_file(file, options.factor, options.rounding)?;

    let title = format!(
        "Select output folder for downsampled file {}",
        file.display()
    );
    let Some(dir) = picker.pick_folder(&title) else {
        info!("No output directory selected");
        return Ok(Outcome::Cancelled);
    };
    let path = OutputNaming::from_source(file).downsampled(&dir, options.factor);
    Ok(Outcome::Written(vec![save(path, &volume)?]))
}

/// Motion-correct one stored movie into the picked directory.
pub fn correct_one<E: MotionEngine>(
    engine: &mut E,
    file: &Path,
    options: &MotionOptions,
    picker: &mut dyn FolderPicker,
) -> Result<Outcome, BatchError> {
    let volume = motion::correct_file(engine, file, &options.params)?;

    let title = format!(
        "Select output folder for motion corrected {}",
        file.display()
    );
    let Some(dir) = picker.pick_folder(&title) else {
        info!("No output directory selected");
        return Ok(Outcome::Cancelled);
    };
    let path = OutputNaming::from_source(file).motion_corrected(&dir, options.params.dims);
    Ok(Outcome::Written(vec![save(path, &volume)?]))
}

pub fn run_compile(
    items: &[PathBuf],
    options: &CompileOptions,
    picker: &mut dyn FolderPicker,
) -> BatchReport {
    let mut report = BatchReport::default();
    for item in items {
        info!("Processing folder: {}", item.display());
        let result = resolve_item(item).and_then(|recording| {
            compile_recording(&recording, options, picker)
        });
        report.record(item, result);
    }
    report
}

/// Run `operation` on every file of every item.
fn run_per_file<F>(items: &[PathBuf], mut operation: F) -> BatchReport
where
    F: FnMut(&Path) -> Result<Outcome, BatchError>,
{
    let mut report = BatchReport::default();
    for item in items {
        match resolve_item(item) {
            Ok(recording) => {
                for file in &recording.files {
                    info!("Processing file: {}", file.display());
                    report.record(file, operation(file));
                }
            }
            Err(e) => report.record(item, Err(e)),
        }
    }
    report
}

pub fn run_downsample(
    items: &[PathBuf],
    options: &DownsampleOptions,
    picker: &mut dyn FolderPicker,
) -> BatchReport {
    run_per_file(items, |file| downsample_one(file, options, picker))
}

pub fn run_motion<E: MotionEngine>(
    items: &[PathBuf],
    options: &MotionOptions,
    engine: &mut E,
    picker: &mut dyn FolderPicker,
) -> BatchReport {
    run_per_file(items, |file| correct_one(engine, file, options, picker))
}
