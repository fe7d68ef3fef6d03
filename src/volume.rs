use crate::enums::Axes;

use image::ImageBuffer;
use image::Luma;
use ndarray::Array2;
use ndarray::Array3;
use ndarray::Array4;
use ndarray::ArrayView2;
use ndarray::ArrayView3;
use ndarray::Axis;
use ndarray::s;
use rayon::prelude::*;

/// An in-memory recording indexed (T, Z, Y, X).
///
/// Time series without a depth axis are stored with a single Z plane and
/// labelled [`Axes::TYX`].
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Volume {
    pub data: Array4<u16>,
    pub axes: Axes,
}

impl Volume {
    pub fn new(data: Array4<u16>, axes: Axes) -> Self {
        Self { data, axes }
    }

    /// Wrap a (T, Y, X) series.
    pub fn from_series(series: Array3<u16>) -> Self {
        Self {
            data: series.insert_axis(Axis(1)),
            axes: Axes::TYX,
        }
    }

    /// Get the dimensions of the volume (frames, depth, height, width)
    pub fn dim(&self) -> (usize, usize, usize, usize) {
        self.data.dim()
    }

    pub fn frames(&self) -> usize {
        self.data.len_of(Axis(0))
    }

    pub fn depth(&self) -> usize {
        self.data.len_of(Axis(1))
    }

    /// Get a reference to the underlying data
    pub fn data(&self) -> &Array4<u16> {
        &self.data
    }

    /// View as (T, Y, X); `None` if the volume has more than one Z plane.
    pub fn series(&self) -> Option<ArrayView3<'_, u16>> {
        (self.depth() == 1).then(|| self.data.index_axis(Axis(1), 0))
    }

    pub fn plane(&self, frame: usize, slice: usize) -> Option<ArrayView2<'_, u16>> {
        if frame >= self.frames() || slice >= self.depth() {
            return None;
        }
        Some(self.data.slice(s![frame, slice, .., ..]))
    }

    /// All 2D planes in storage order: T-major, then Z.
    pub fn planes(&self) -> impl Iterator<Item = ArrayView2<'_, u16>> {
        let (frames, depth, _, _) = self.dim();
        (0..frames).flat_map(move |t| (0..depth).filter_map(move |z| self.plane(t, z)))
    }

    /// Per-pixel maximum over Z for one timepoint.
    pub fn max_projection(&self, frame: usize) -> Option<Array2<u16>> {
        if frame >= self.frames() {
            return None;
        }
        let stack = self.data.index_axis(Axis(0), frame);
        Some(stack.fold_axis(Axis(0), 0u16, |&acc, &v| acc.max(v)))
    }

    #[inline]
    fn normalize_to_u8(value: u16, min: u16, range: f32) -> u8 {
        if range <= 0.0 {
            return 0;
        }
        (((value - min) as f32 / range) * 255.0).clamp(0.0, 255.0) as u8
    }

    // Contrast-stretched 8-bit rendering of a plane
    fn slice_to_image(slice: &ArrayView2<'_, u16>) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let (height, width) = slice.dim();
        let (width, height) = (u32::try_from(width).ok()?, u32::try_from(height).ok()?);
        let min = slice.iter().copied().min()?;
        let max = slice.iter().copied().max()?;
        let range = f32::from(max - min);
        let pixel_data: Vec<u8> = slice
            .into_par_iter()
            .map(|&v| Self::normalize_to_u8(v, min, range))
            .collect();
        ImageBuffer::from_raw(width, height, pixel_data)
    }

    /// Grayscale preview of one timepoint: max projection over Z,
    /// stretched to the full 8-bit range.
    pub fn preview_image(&self, frame: usize) -> Option<ImageBuffer<Luma<u8>, Vec<u8>>> {
        let projection = self.max_projection(frame)?;
        Self::slice_to_image(&projection.view())
    }
}
