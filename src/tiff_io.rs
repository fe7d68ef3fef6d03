//! Multi-page TIFF reading and BigTIFF writing.
//!
//! Every 2D plane is stored as its own page. Volumes are written T-major
//! (all Z planes of timepoint 0, then timepoint 1, ...) with an
//! ImageJ-style `ImageDescription` on the first page so that the Z axis
//! can be restored when the file is read back.

use crate::{enums::Axes, volume::Volume};

use ndarray::{Array2, Array4, ArrayView2, Axis};
use std::{
    fmt,
    fs::{self, File},
    io::{BufReader, BufWriter, Write},
    path::{Path, PathBuf},
};
use thiserror::Error;
use tiff::{
    ColorType,
    decoder::{Decoder, DecodingResult, Limits},
    encoder::{TiffEncoder, colortype},
    tags::Tag,
};
use tracing::debug;

/// ImageJ version string written into the description header.
pub const IMAGEJ_VERSION: &str = "1.11a";

#[derive(Debug, Error)]
pub enum StackError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TIFF error: {0}")]
    Tiff(#[from] tiff::TiffError),

    #[error("Expected a single-channel page, found {0:?}")]
    NotGrayscale(ColorType),

    #[error("Page {page} is {found:?} (rows, cols), expected {expected:?}")]
    InconsistentPageDimensions {
        page: usize,
        expected: (usize, usize),
        found: (usize, usize),
    },

    #[error("Page holds {found} samples, expected {expected}")]
    SampleCount { expected: usize, found: usize },

    #[error("{pages} pages cannot be split into {slices} slices per timepoint")]
    RaggedHyperstack { pages: usize, slices: usize },

    #[error("Plane of {rows}x{cols} does not fit into a TIFF page")]
    PlaneTooLarge { rows: usize, cols: usize },

    #[error("Volume has no planes")]
    Empty,
}

/// A sample type pages can be decoded into.
///
/// Conversions saturate: negative values map to zero and values past the
/// target range clamp to its maximum.
pub trait Sample: Copy + Default + Send + Sync + 'static {
    fn from_decoded(result: DecodingResult) -> Vec<Self>;
}

impl Sample for u16 {
    fn from_decoded(result: DecodingResult) -> Vec<Self> {
        const MAX: i64 = u16::MAX as i64;
        match result {
            DecodingResult::U16(samples) => samples,
            DecodingResult::U8(samples) => samples.into_iter().map(u16::from).collect(),
            DecodingResult::U32(samples) => samples
                .into_iter()
                .map(|s| s.min(u16::MAX as u32) as u16)
                .collect(),
            DecodingResult::U64(samples) => samples
                .into_iter()
                .map(|s| s.min(u16::MAX as u64) as u16)
                .collect(),
            DecodingResult::I8(samples) => samples.into_iter().map(|s| s.max(0) as u16).collect(),
            DecodingResult::I16(samples) => samples.into_iter().map(|s| s.max(0) as u16).collect(),
            DecodingResult::I32(samples) => samples
                .into_iter()
                .map(|s| i64::from(s).clamp(0, MAX) as u16)
                .collect(),
            DecodingResult::I64(samples) => {
                samples.into_iter().map(|s| s.clamp(0, MAX) as u16).collect()
            }
            // float to int `as` casts saturate
            DecodingResult::F32(samples) => samples.into_iter().map(|s| s as u16).collect(),
            DecodingResult::F64(samples) => samples.into_iter().map(|s| s as u16).collect(),
        }
    }
}

impl Sample for f32 {
    fn from_decoded(result: DecodingResult) -> Vec<Self> {
        match result {
            DecodingResult::F32(samples) => samples,
            DecodingResult::U8(samples) => samples.into_iter().map(f32::from).collect(),
            DecodingResult::U16(samples) => samples.into_iter().map(f32::from).collect(),
            DecodingResult::U32(samples) => samples.into_iter().map(|s| s as f32).collect(),
            DecodingResult::U64(samples) => samples.into_iter().map(|s| s as f32).collect(),
            DecodingResult::I8(samples) => samples.into_iter().map(f32::from).collect(),
            DecodingResult::I16(samples) => samples.into_iter().map(f32::from).collect(),
            DecodingResult::I32(samples) => samples.into_iter().map(|s| s as f32).collect(),
            DecodingResult::I64(samples) => samples.into_iter().map(|s| s as f32).collect(),
            DecodingResult::F64(samples) => samples.into_iter().map(|s| s as f32).collect(),
        }
    }
}

/// The key=value header ImageJ reads from the first page.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StackDescription {
    pub frames: usize,
    pub slices: usize,
    pub axes: Axes,
}

impl StackDescription {
    pub fn for_volume(volume: &Volume) -> Self {
        let (frames, slices, _, _) = volume.dim();
        Self {
            frames,
            slices,
            axes: volume.axes,
        }
    }

    /// Parse the `slices`/`frames` keys. Returns `None` for descriptions
    /// without a slice count, which are treated as plain (T, Y, X) series.
    ///
    /// Slices only form a Z axis in hyperstacks (`hyperstack=true`, more
    /// than one frame, or `axes=TZYX`). A plain ImageJ stack lists every
    /// page as a slice; its pages are timepoints.
    pub fn parse(text: &str) -> Option<Self> {
        let mut images = None;
        let mut frames = None;
        let mut slices = None;
        let mut axes = None;
        let mut hyperstack = false;
        for line in text.lines() {
            let Some((key, value)) = line.split_once('=') else {
                continue;
            };
            let value = value.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            match key.trim() {
                "images" => images = value.parse().ok(),
                "frames" => frames = value.parse().ok(),
                "slices" => slices = value.parse().ok(),
                "hyperstack" => hyperstack = value == "true",
                "axes" => {
                    axes = match value {
                        "TZYX" => Some(Axes::TZYX),
                        "TYX" => Some(Axes::TYX),
                        _ => None,
                    }
                }
                _ => {}
            }
        }
        let slices: usize = slices.filter(|&s| s > 0)?;
        let has_z =
            hyperstack || frames.is_some_and(|f: usize| f > 1) || axes == Some(Axes::TZYX);
        if slices > 1 && !has_z {
            return Some(Self {
                frames: images.unwrap_or(slices),
                slices: 1,
                axes: Axes::TYX,
            });
        }
        let axes = axes.unwrap_or(if slices > 1 { Axes::TZYX } else { Axes::TYX });
        Some(Self {
            frames: frames.unwrap_or(0),
            slices,
            axes,
        })
    }
}

impl fmt::Display for StackDescription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "ImageJ={IMAGEJ_VERSION}")?;
        writeln!(f, "images={}", self.frames * self.slices)?;
        if self.slices > 1 {
            writeln!(f, "slices={}", self.slices)?;
            writeln!(f, "hyperstack=true")?;
        } else {
            writeln!(f, "slices=1")?;
        }
        writeln!(f, "frames={}", self.frames)?;
        writeln!(f, "mode=grayscale")?;
        writeln!(f, "loop=false")?;
        writeln!(f, "axes={}", self.axes.as_str())
    }
}

fn open_decoder(path: &Path) -> Result<Decoder<BufReader<File>>, StackError> {
    let file = File::open(path)?;
    Ok(Decoder::new(BufReader::new(file))?.with_limits(Limits::unlimited()))
}

/// Count the pages (image file directories) of a TIFF without decoding
/// pixel data.
pub fn count_pages(path: &Path) -> Result<usize, StackError> {
    let mut decoder = open_decoder(path)?;
    let mut pages = 1;
    while decoder.more_images() {
        decoder.next_image()?;
        pages += 1;
    }
    Ok(pages)
}

fn decode_page<T: Sample>(
    decoder: &mut Decoder<BufReader<File>>,
) -> Result<Array2<T>, StackError> {
    let color_type = decoder.colortype()?;
    if !matches!(color_type, ColorType::Gray(_)) {
        return Err(StackError::NotGrayscale(color_type));
    }
    let (width, height) = decoder.dimensions()?;
    let (rows, cols) = (height as usize, width as usize);
    let samples = T::from_decoded(decoder.read_image()?);
    let found = samples.len();
    Array2::from_shape_vec((rows, cols), samples).map_err(|_| StackError::SampleCount {
        expected: rows * cols,
        found,
    })
}

/// Decode pages in file order, stopping after `limit` pages if given.
///
/// All pages must share the dimensions of the first one.
pub fn read_pages<T: Sample>(
    path: &Path,
    limit: Option<usize>,
) -> Result<Vec<Array2<T>>, StackError> {
    let mut decoder = open_decoder(path)?;
    let mut pages: Vec<Array2<T>> = Vec::new();
    loop {
        let page = decode_page::<T>(&mut decoder)?;
        if let Some(first) = pages.first() {
            if page.dim() != first.dim() {
                return Err(StackError::InconsistentPageDimensions {
                    page: pages.len(),
                    expected: first.dim(),
                    found: page.dim(),
                });
            }
        }
        pages.push(page);

        if limit.is_some_and(|limit| pages.len() >= limit) || !decoder.more_images() {
            break;
        }
        decoder.next_image()?;
    }
    debug!("Decoded {} page(s) from {}", pages.len(), path.display());
    Ok(pages)
}

/// Read the description stored on the first page, if any.
pub fn read_description(path: &Path) -> Result<Option<StackDescription>, StackError> {
    let mut decoder = open_decoder(path)?;
    Ok(decoder
        .get_tag_ascii_string(Tag::ImageDescription)
        .ok()
        .and_then(|text| StackDescription::parse(&text)))
}

/// Read a stored volume back as (T, Z, Y, X).
///
/// The Z extent comes from the description's slice count; without one
/// every page is a timepoint.
pub fn read_array<T: Sample>(path: &Path) -> Result<(Array4<T>, Axes), StackError> {
    let description = read_description(path)?;
    let pages = read_pages::<T>(path, None)?;
    let (slices, axes) = description
        .map(|d| (d.slices, d.axes))
        .unwrap_or((1, Axes::TYX));

    if pages.len() % slices != 0 {
        return Err(StackError::RaggedHyperstack {
            pages: pages.len(),
            slices,
        });
    }
    let frames = pages.len() / slices;
    let (rows, cols) = pages[0].dim();

    let mut data = Array4::<T>::from_elem((frames, slices, rows, cols), T::default());
    for (index, page) in pages.iter().enumerate() {
        data.index_axis_mut(Axis(0), index / slices)
            .index_axis_mut(Axis(0), index % slices)
            .assign(page);
    }
    Ok((data, axes))
}

pub fn read_volume(path: &Path) -> Result<Volume, StackError> {
    let (data, axes) = read_array::<u16>(path)?;
    Ok(Volume::new(data, axes))
}

/// Probe the (T, Z, Y, X) shape of a stored volume without decoding pixels.
pub fn probe_shape(path: &Path) -> Result<((usize, usize, usize, usize), Axes), StackError> {
    let description = read_description(path)?;
    let pages = count_pages(path)?;
    let (slices, axes) = description
        .map(|d| (d.slices, d.axes))
        .unwrap_or((1, Axes::TYX));
    if pages % slices != 0 {
        return Err(StackError::RaggedHyperstack { pages, slices });
    }
    let (width, height) = open_decoder(path)?.dimensions()?;
    Ok((
        (pages / slices, slices, height as usize, width as usize),
        axes,
    ))
}

fn page_size(plane: &ArrayView2<'_, u16>) -> Result<(u32, u32), StackError> {
    let (rows, cols) = plane.dim();
    match (u32::try_from(cols), u32::try_from(rows)) {
        (Ok(width), Ok(height)) => Ok((width, height)),
        _ => Err(StackError::PlaneTooLarge { rows, cols }),
    }
}

/// Sibling path a volume is encoded into before it is renamed into place.
fn partial_path(path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "volume".to_string());
    path.with_file_name(format!(".{name}.part"))
}

fn encode_volume(path: &Path, volume: &Volume) -> Result<(), StackError> {
    let description = StackDescription::for_volume(volume).to_string();

    let mut writer = BufWriter::new(File::create(path)?);
    {
        let mut encoder = TiffEncoder::new_big(&mut writer)?;
        for (index, plane) in volume.planes().enumerate() {
            let (width, height) = page_size(&plane)?;
            let mut image = encoder.new_image::<colortype::Gray16>(width, height)?;
            if index == 0 {
                image
                    .encoder()
                    .write_tag(Tag::ImageDescription, description.as_str())?;
            }
            match plane.as_slice() {
                Some(samples) => image.write_data(samples)?,
                None => image.write_data(&plane.iter().copied().collect::<Vec<_>>())?,
            }
        }
    }
    writer.flush()?;
    Ok(())
}

/// Write a volume as an uncompressed, single-channel 16-bit BigTIFF.
///
/// The file only appears at `path` once it is complete; a failed write
/// leaves nothing behind.
pub fn write_volume(path: &Path, volume: &Volume) -> Result<(), StackError> {
    if volume.data().is_empty() {
        return Err(StackError::Empty);
    }
    let partial = partial_path(path);
    let result = encode_volume(&partial, volume)
        .and_then(|()| fs::rename(&partial, path).map_err(StackError::from));
    if result.is_err() {
        if let Err(e) = fs::remove_file(&partial) {
            debug!("Could not remove {}: {}", partial.display(), e);
        }
        return result;
    }
    debug!(
        "Wrote {} plane(s) to {}",
        volume.frames() * volume.depth(),
        path.display()
    );
    Ok(())
}

/// Write `pages` as a classic TIFF with `description` on the first page,
/// the way ImageJ saves a stack.
#[cfg(test)]
pub(crate) fn write_described_pages(path: &Path, pages: &[Array2<u16>], description: &str) {
    let mut encoder = TiffEncoder::new(BufWriter::new(File::create(path).unwrap())).unwrap();
    for (index, page) in pages.iter().enumerate() {
        let (rows, cols) = page.dim();
        let mut image = encoder
            .new_image::<colortype::Gray16>(cols as u32, rows as u32)
            .unwrap();
        if index == 0 {
            image
                .encoder()
                .write_tag(Tag::ImageDescription, description)
                .unwrap();
        }
        image.write_data(page.as_slice().unwrap()).unwrap();
    }
}
