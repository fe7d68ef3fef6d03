use crate::{
    enums::{Axes, Rounding},
    scanner::{self, Depth, ScanReport},
    volume::Volume,
};

use ndarray::{Array2, Array3, Array4, ArrayView2, ArrayView3, Axis, s, stack};
use std::path::Path;
use thiserror::Error;
use tracing::info;

#[derive(Debug, Error)]
pub enum VolumeLoaderError {
    #[error("No valid Z-stacks found")]
    NoValidStacks,

    #[error("Depth must be at least 1")]
    ZeroDepth,

    #[error("Stacking failed: {0}")]
    Shape(#[from] ndarray::ShapeError),
}

pub struct VolumeLoader;

impl VolumeLoader {
    /// Merge per-timepoint Z-stacks into one (T, Z, Y, X) volume
    ///
    /// # Arguments
    ///
    /// * `files` - Timepoint files in acquisition order
    /// * `depth` - Pages every file must have
    ///
    /// # Errors
    ///
    /// Returns [`VolumeLoaderError::NoValidStacks`] if every file was skipped
    pub fn merge(files: &[impl AsRef<Path>], depth: usize) -> Result<Volume, VolumeLoaderError> {
        let report = Self::scan(files, depth)?;
        let stacks: Vec<_> = report.stacks().map(|s| s.view()).collect();
        let data = Self::build_volume_array(&stacks)?;
        info!(
            "Merged {} timepoint(s) of depth {}",
            data.len_of(Axis(0)),
            depth
        );
        Ok(Volume::new(data, Axes::TZYX))
    }

    /// Split per-timepoint Z-stacks into `depth` separate (T, Y, X) series
    ///
    /// Series `z` holds page `z` of every accepted file, in file order.
    pub fn split_by_z(
        files: &[impl AsRef<Path>],
        depth: usize,
    ) -> Result<Vec<Volume>, VolumeLoaderError> {
        let report = Self::scan(files, depth)?;

        let mut accumulators: Vec<Vec<ArrayView2<'_, u16>>> = vec![Vec::new(); depth];
        for zstack in report.stacks() {
            for (z, page) in zstack.outer_iter().enumerate() {
                accumulators[z].push(page);
            }
        }

        accumulators
            .iter()
            .map(|pages| Ok(Volume::from_series(Self::build_series_array(pages)?)))
            .collect()
    }

    /// Mean projection over Z of every readable file, one plane per file
    ///
    /// Files may differ in depth but not in page size.
    pub fn z_project(
        files: &[impl AsRef<Path>],
        rounding: Rounding,
    ) -> Result<Volume, VolumeLoaderError> {
        let report = scanner::scan_stacks(files, Depth::Any);
        if report.is_empty() {
            return Err(VolumeLoaderError::NoValidStacks);
        }

        let projections = report
            .stacks()
            .map(|zstack| Self::mean_projection(zstack, rounding))
            .collect::<Option<Vec<_>>>()
            .ok_or(VolumeLoaderError::NoValidStacks)?;
        let views: Vec<_> = projections.iter().map(|p| p.view()).collect();
        Ok(Volume::from_series(Self::build_series_array(&views)?))
    }

    /// Per-pixel arithmetic mean across the depth axis, rounded to 16 bits.
    pub fn mean_projection(zstack: &Array3<u16>, rounding: Rounding) -> Option<Array2<u16>> {
        zstack
            .mapv(f64::from)
            .mean_axis(Axis(0))
            .map(|mean| mean.mapv(|m| rounding.to_u16(m)))
    }

    fn scan(files: &[impl AsRef<Path>], depth: usize) -> Result<ScanReport, VolumeLoaderError> {
        if depth == 0 {
            return Err(VolumeLoaderError::ZeroDepth);
        }
        let report = scanner::scan_stacks(files, Depth::Exactly(depth));
        if report.is_empty() {
            return Err(VolumeLoaderError::NoValidStacks);
        }
        Ok(report)
    }

    fn build_volume_array(
        stacks: &[ArrayView3<'_, u16>],
    ) -> Result<Array4<u16>, VolumeLoaderError> {
        let (depth, height, width) = stacks
            .first()
            .map(|s| s.dim())
            .ok_or(VolumeLoaderError::NoValidStacks)?;
        let mut volume = Array4::<u16>::zeros((stacks.len(), depth, height, width));

        for (t, zstack) in stacks.iter().enumerate() {
            volume.slice_mut(s![t, .., .., ..]).assign(zstack);
        }

        Ok(volume)
    }

    fn build_series_array(
        planes: &[ArrayView2<'_, u16>],
    ) -> Result<Array3<u16>, VolumeLoaderError> {
        if planes.is_empty() {
            return Err(VolumeLoaderError::NoValidStacks);
        }
        Ok(stack(Axis(0), planes)?)
    }
}
