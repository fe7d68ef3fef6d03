//! Temporal downsampling of (T, Y, X) series by frame averaging.

use crate::{
    enums::{Axes, Rounding},
    tiff_io::{self, StackError},
    volume::Volume,
};

use ndarray::{Array3, Axis, s};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum DownsampleError {
    #[error("Downsample factor must be at least 1")]
    ZeroFactor,

    #[error("Expected a 3D TIFF (T, Y, X), found {slices} slices per timepoint")]
    NotTimeSeries { slices: usize },

    #[error("Failed to read TIFF: {0}")]
    Read(#[source] StackError),
}

/// Average every `factor` consecutive frames. The last group holds the
/// remaining frames and may be shorter.
pub fn downsample_series(
    volume: &Volume,
    factor: usize,
    rounding: Rounding,
) -> Result<Volume, DownsampleError> {
    if factor == 0 {
        return Err(DownsampleError::ZeroFactor);
    }
    let series = volume.series().ok_or(DownsampleError::NotTimeSeries {
        slices: volume.depth(),
    })?;
    let (frames, height, width) = series.dim();
    let groups = frames.div_ceil(factor);

    let mut output = Array3::<u16>::zeros((groups, height, width));
    for (k, mut frame) in output.outer_iter_mut().enumerate() {
        let start = k * factor;
        let end = (start + factor).min(frames);
        if let Some(mean) = series
            .slice(s![start..end, .., ..])
            .mapv(f64::from)
            .mean_axis(Axis(0))
        {
            frame.assign(&mean.mapv(|m| rounding.to_u16(m)));
        }
    }
    Ok(Volume::from_series(output))
}

/// Read a stored series and downsample it.
pub fn downsample_file(
    path: &Path,
    factor: usize,
    rounding: Rounding,
) -> Result<Volume, DownsampleError> {
    let volume = tiff_io::read_volume(path).map_err(DownsampleError::Read)?;
    if volume.axes == Axes::TZYX && volume.depth() > 1 {
        return Err(DownsampleError::NotTimeSeries {
            slices: volume.depth(),
        });
    }
    info!("Downsampling {} by {}", path.display(), factor);
    downsample_series(&volume, factor, rounding)
}
