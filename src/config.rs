//! Command-line configuration.
//!
//! The CLI is parsed once with clap. Each subcommand is turned into an
//! immutable options value that is passed into the operation it configures.
//!
//! # Environment Variables
//!
//! - `TVOL_OUTPUT_DIR` - Output base directory (skips the folder picker)
//! - `TVOL_ENGINE` - Motion correction program
//! - `TVOL_PROCESSES` - Worker processes requested for motion correction

use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

use crate::enums::{CompileMode, CorrectionDims, Rigidity, Rounding};
use crate::motion::MotionParams;

/// Default number of frames averaged into one when downsampling.
pub const DEFAULT_DOWNSAMPLE_FACTOR: usize = 5;

/// Preprocess microscope TIFF recordings.
///
/// Items are recording directories (their `*.tif` files, one per
/// timepoint) or single `.tif` files.
#[derive(Parser, Debug, Clone)]
#[command(name = "tiff-volume")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Output base directory. Without it a folder dialog is shown when the
    /// `dialog` feature is enabled.
    #[arg(short, long, global = true, env = "TVOL_OUTPUT_DIR")]
    pub output_dir: Option<PathBuf>,

    /// Enable verbose logging (debug level).
    #[arg(short, long, global = true, default_value_t = false)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Reassemble per-timepoint Z-stacks.
    Compile(CompileArgs),
    /// Average consecutive frames of (T, Y, X) series.
    Downsample(DownsampleArgs),
    /// Motion-correct movies with an external registration program.
    Motion(MotionArgs),
    /// Render one timepoint of a stored volume as PNG.
    Preview(PreviewArgs),
}

#[derive(Args, Debug, Clone)]
pub struct CompileArgs {
    #[arg(short, long, value_enum, default_value_t = CompileMode::Merge)]
    pub mode: CompileMode,

    /// Pages per Z-stack. Detected from the first file when omitted.
    #[arg(short, long)]
    pub depth: Option<usize>,

    /// Conversion of projected means to 16-bit samples.
    #[arg(long, value_enum, default_value_t = Rounding::Nearest)]
    pub rounding: Rounding,

    /// Recording directories or `.tif` files.
    #[arg(required = true)]
    pub items: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct DownsampleArgs {
    /// Average every how many frames.
    #[arg(short, long, default_value_t = DEFAULT_DOWNSAMPLE_FACTOR)]
    pub factor: usize,

    #[arg(long, value_enum, default_value_t = Rounding::Nearest)]
    pub rounding: Rounding,

    #[arg(required = true)]
    pub items: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct MotionArgs {
    #[arg(long, value_enum, default_value_t = CorrectionDims::TwoD)]
    pub dims: CorrectionDims,

    #[arg(long, value_enum, default_value_t = Rigidity::Rigid)]
    pub rigidity: Rigidity,

    /// Registration program to run per file.
    #[arg(long, env = "TVOL_ENGINE")]
    pub engine: PathBuf,

    /// Extra leading argument for the engine (repeatable).
    #[arg(long = "engine-arg", allow_hyphen_values = true)]
    pub engine_args: Vec<String>,

    /// Worker processes to request. Defaults to the preset for `--dims`.
    #[arg(long, env = "TVOL_PROCESSES")]
    pub processes: Option<usize>,

    #[arg(required = true)]
    pub items: Vec<PathBuf>,
}

#[derive(Args, Debug, Clone)]
pub struct PreviewArgs {
    /// Timepoint to render.
    #[arg(short, long, default_value_t = 0)]
    pub frame: usize,

    /// PNG file to write.
    #[arg(long)]
    pub png: PathBuf,

    pub input: PathBuf,
}

/// Settings for one compile run.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CompileOptions {
    pub mode: CompileMode,
    pub depth: Option<usize>,
    pub rounding: Rounding,
}

impl CompileOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.depth == Some(0) {
            return Err("depth must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl From<&CompileArgs> for CompileOptions {
    fn from(args: &CompileArgs) -> Self {
        Self {
            mode: args.mode,
            depth: args.depth,
            rounding: args.rounding,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DownsampleOptions {
    pub factor: usize,
    pub rounding: Rounding,
}

impl DownsampleOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.factor == 0 {
            return Err("downsample factor must be at least 1".to_string());
        }
        Ok(())
    }
}

impl From<&DownsampleArgs> for DownsampleOptions {
    fn from(args: &DownsampleArgs) -> Self {
        Self {
            factor: args.factor,
            rounding: args.rounding,
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct MotionOptions {
    pub params: MotionParams,
}

impl MotionOptions {
    pub fn validate(&self) -> Result<(), String> {
        if self.params.processes == 0 {
            return Err("processes must be greater than 0".to_string());
        }
        Ok(())
    }
}

impl From<&MotionArgs> for MotionOptions {
    fn from(args: &MotionArgs) -> Self {
        let params = MotionParams::preset(args.dims, args.rigidity);
        let params = match args.processes {
            Some(processes) => params.with_processes(processes),
            None => params,
        };
        Self { params }
    }
}
