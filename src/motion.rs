//! Motion correction boundary.
//!
//! Registration itself belongs to an external toolkit behind
//! [`MotionEngine`]. This module owns the rest: requesting a worker pool
//! before correction and releasing it afterwards, checking the corrected
//! shape, and rescaling the result to the full 16-bit range.

use crate::{
    enums::{Axes, CorrectionDims, Rigidity},
    tiff_io::{self, StackError},
    volume::Volume,
};

use ndarray::{Array4, Zip};
use rayon::prelude::*;
use std::{
    env, fs, io,
    path::{Path, PathBuf},
    process::{Command, ExitStatus},
};
use thiserror::Error;
use tracing::{debug, info, warn};

/// Worker processes requested for 2D correction.
pub const DEFAULT_2D_PROCESSES: usize = 20;

/// Worker processes requested for 3D correction.
pub const DEFAULT_3D_PROCESSES: usize = 1;

type Shape4 = (usize, usize, usize, usize);

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Worker pool setup failed: {0}")]
    PoolSetup(String),

    #[error("Motion correction engine failed: {0}")]
    Engine(String),

    #[error("Engine exited with {0}")]
    EngineExit(ExitStatus),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Failed to read TIFF: {0}")]
    Read(#[from] StackError),

    #[error("{dims:?} correction expects {expected} data, input is {found}")]
    WrongDimensionality {
        dims: CorrectionDims,
        expected: &'static str,
        found: &'static str,
    },

    #[error("Corrected shape {found:?} differs from input shape {expected:?}")]
    ShapeMismatch { expected: Shape4, found: Shape4 },
}

/// Registration parameters handed to the engine.
#[derive(Clone, Debug, PartialEq)]
pub struct MotionParams {
    pub dims: CorrectionDims,
    pub rigidity: Rigidity,
    pub max_shifts: Vec<usize>,
    pub strides: Vec<usize>,
    pub overlaps: Vec<usize>,
    pub max_deviation_rigid: usize,
    /// Fill registration borders with copied edge pixels instead of NaN.
    pub border_copy: bool,
    pub processes: usize,
}

impl MotionParams {
    pub fn preset(dims: CorrectionDims, rigidity: Rigidity) -> Self {
        match dims {
            CorrectionDims::TwoD => Self {
                dims,
                rigidity,
                max_shifts: vec![25, 25],
                strides: vec![32, 32],
                overlaps: vec![32, 32],
                max_deviation_rigid: 3,
                border_copy: true,
                processes: DEFAULT_2D_PROCESSES,
            },
            CorrectionDims::ThreeD => Self {
                dims,
                rigidity,
                max_shifts: vec![4, 4, 2],
                strides: vec![24, 24, 6],
                overlaps: vec![12, 12, 2],
                max_deviation_rigid: 5,
                border_copy: false,
                processes: DEFAULT_3D_PROCESSES,
            },
        }
    }

    pub fn with_processes(mut self, processes: usize) -> Self {
        self.processes = processes;
        self
    }

    fn join(values: &[usize]) -> String {
        values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Parameters as `TVOL_MC_*` environment variables.
    pub fn env(&self, processes: usize) -> Vec<(&'static str, String)> {
        vec![
            ("TVOL_MC_PW_RIGID", (self.rigidity == Rigidity::NonRigid).to_string()),
            ("TVOL_MC_IS3D", (self.dims == CorrectionDims::ThreeD).to_string()),
            ("TVOL_MC_MAX_SHIFTS", Self::join(&self.max_shifts)),
            ("TVOL_MC_STRIDES", Self::join(&self.strides)),
            ("TVOL_MC_OVERLAPS", Self::join(&self.overlaps)),
            ("TVOL_MC_MAX_DEVIATION_RIGID", self.max_deviation_rigid.to_string()),
            (
                "TVOL_MC_BORDER_NAN",
                if self.border_copy { "copy" } else { "false" }.to_string(),
            ),
            ("TVOL_MC_PROCESSES", processes.to_string()),
        ]
    }
}

/// An external registration toolkit.
pub trait MotionEngine {
    /// Handle to the worker pool the engine computes on.
    type Pool;

    fn start_pool(&mut self, processes: usize) -> Result<Self::Pool, MotionError>;

    /// Correct the movie stored at `input`, returning an array of the same
    /// (T, Z, Y, X) shape.
    fn correct(
        &mut self,
        pool: &Self::Pool,
        input: &Path,
        params: &MotionParams,
    ) -> Result<Array4<f32>, MotionError>;

    fn stop_pool(&mut self, pool: Self::Pool) -> Result<(), MotionError>;
}

/// Holds a started pool and stops it when dropped.
struct PoolGuard<'a, E: MotionEngine> {
    engine: &'a mut E,
    pool: Option<E::Pool>,
}

impl<'a, E: MotionEngine> PoolGuard<'a, E> {
    fn start(engine: &'a mut E, processes: usize) -> Result<Self, MotionError> {
        info!("Setting up worker pool ({} processes)", processes);
        let pool = engine.start_pool(processes).map_err(|e| match e {
            MotionError::PoolSetup(_) => e,
            other => MotionError::PoolSetup(other.to_string()),
        })?;
        Ok(Self {
            engine,
            pool: Some(pool),
        })
    }

    fn correct(
        &mut self,
        input: &Path,
        params: &MotionParams,
    ) -> Result<Array4<f32>, MotionError> {
        match self.pool.as_ref() {
            Some(pool) => self.engine.correct(pool, input, params),
            None => Err(MotionError::PoolSetup("pool already stopped".to_string())),
        }
    }
}

impl<E: MotionEngine> Drop for PoolGuard<'_, E> {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            match self.engine.stop_pool(pool) {
                Ok(()) => debug!("Worker pool stopped"),
                Err(e) => warn!("Failed to stop worker pool: {}", e),
            }
        }
    }
}

/// Min-max rescale to `[0, 65535]`. NaN samples and constant inputs map to 0.
pub fn normalize_to_u16(corrected: &Array4<f32>) -> Array4<u16> {
    let (min, max) = corrected
        .par_iter()
        .copied()
        .filter(|v| !v.is_nan())
        .fold(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |(lo, hi), v| (lo.min(v), hi.max(v)),
        )
        .reduce(
            || (f32::INFINITY, f32::NEG_INFINITY),
            |(lo_a, hi_a), (lo_b, hi_b)| (lo_a.min(lo_b), hi_a.max(hi_b)),
        );

    let mut normalized = Array4::<u16>::zeros(corrected.raw_dim());
    let range = f64::from(max) - f64::from(min);
    if !(range.is_finite() && range > 0.0) {
        return normalized;
    }
    Zip::from(&mut normalized)
        .and(corrected)
        .par_for_each(|out, &value| {
            if !value.is_nan() {
                let scaled = (f64::from(value) - f64::from(min)) / range;
                *out = (scaled * f64::from(u16::MAX)) as u16;
            }
        });
    normalized
}

fn check_input(dims: CorrectionDims, shape: Shape4, axes: Axes) -> Result<(), MotionError> {
    let found = match axes {
        Axes::TZYX if shape.1 > 1 => "(T, Z, Y, X)",
        _ => "(T, Y, X)",
    };
    let expected = match dims {
        CorrectionDims::TwoD => "(T, Y, X)",
        CorrectionDims::ThreeD => "(T, Z, Y, X)",
    };
    if found != expected {
        return Err(MotionError::WrongDimensionality {
            dims,
            expected,
            found,
        });
    }
    Ok(())
}

/// Correct one stored movie and return it rescaled to 16 bits.
///
/// The worker pool is started before the engine runs and stopped on every
/// exit path. A pool that cannot be started fails this file only.
pub fn correct_file<E: MotionEngine>(
    engine: &mut E,
    input: &Path,
    params: &MotionParams,
) -> Result<Volume, MotionError> {
    let (shape, axes) = tiff_io::probe_shape(input)?;
    check_input(params.dims, shape, axes)?;

    let corrected = {
        let mut pool = PoolGuard::start(engine, params.processes)?;
        info!(
            "Running {} motion correction on {}",
            params.rigidity.as_str(),
            input.display()
        );
        pool.correct(input, params)?
    };

    if corrected.dim() != shape {
        return Err(MotionError::ShapeMismatch {
            expected: shape,
            found: corrected.dim(),
        });
    }
    info!("Motion correction complete for {}", input.display());
    Ok(Volume::new(normalize_to_u16(&corrected), axes))
}

/// Runs a registration program once per file.
///
/// Invoked as `PROGRAM [ARGS..] INPUT rigid|nonrigid OUTPUT`, with the
/// parameters in `TVOL_MC_*` environment variables. The program writes the
/// corrected movie to `OUTPUT` as a TIFF with the input's page layout.
#[derive(Clone, Debug)]
pub struct ExternalEngine {
    program: PathBuf,
    args: Vec<String>,
    scratch_dir: PathBuf,
}

impl ExternalEngine {
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>) -> Self {
        Self {
            program: program.into(),
            args,
            scratch_dir: env::temp_dir(),
        }
    }

    pub fn with_scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scratch_dir = dir.into();
        self
    }

    fn resolve_program(&self) -> Option<PathBuf> {
        if self.program.components().count() > 1 {
            return self.program.is_file().then(|| self.program.clone());
        }
        let paths = env::var_os("PATH")?;
        env::split_paths(&paths)
            .map(|dir| dir.join(&self.program))
            .find(|candidate| candidate.is_file())
    }

    fn scratch_path(&self, input: &Path) -> PathBuf {
        let stem = input
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        self.scratch_dir
            .join(format!("tvol-{}-{}_mc.tif", std::process::id(), stem))
    }
}

impl MotionEngine for ExternalEngine {
    type Pool = usize;

    fn start_pool(&mut self, processes: usize) -> Result<usize, MotionError> {
        if processes == 0 {
            return Err(MotionError::PoolSetup(
                "at least one worker process is required".to_string(),
            ));
        }
        let program = self.resolve_program().ok_or_else(|| {
            MotionError::PoolSetup(format!(
                "engine program {} not found",
                self.program.display()
            ))
        })?;
        debug!("Using engine {}", program.display());
        Ok(processes)
    }

    fn correct(
        &mut self,
        pool: &usize,
        input: &Path,
        params: &MotionParams,
    ) -> Result<Array4<f32>, MotionError> {
        let output = self.scratch_path(input);
        let status = Command::new(&self.program)
            .args(&self.args)
            .arg(input)
            .arg(params.rigidity.as_str())
            .arg(&output)
            .envs(params.env(*pool))
            .status()
            .map_err(|e| MotionError::Engine(format!("{}: {}", self.program.display(), e)))?;
        if !status.success() {
            return Err(MotionError::EngineExit(status));
        }

        let read = tiff_io::read_array::<f32>(&output);
        if let Err(e) = fs::remove_file(&output) {
            debug!("Could not remove {}: {}", output.display(), e);
        }
        let (corrected, _) = read?;
        Ok(corrected)
    }

    fn stop_pool(&mut self, _pool: usize) -> Result<(), MotionError> {
        Ok(())
    }
}
