//! Output file naming.
//!
//! Names derive from the base name of the source (a recording directory or
//! a single TIFF), split into stem and extension. Sources without an
//! extension use `.tif`.

use crate::enums::CorrectionDims;

use std::path::{Path, PathBuf};

pub const DEFAULT_EXTENSION: &str = ".tif";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OutputNaming {
    stem: String,
    ext: String,
}

impl OutputNaming {
    pub fn from_source(source: impl AsRef<Path>) -> Self {
        let source = source.as_ref();
        let stem = source
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "output".to_string());
        let ext = source
            .extension()
            .map(|ext| format!(".{}", ext.to_string_lossy()))
            .unwrap_or_else(|| DEFAULT_EXTENSION.to_string());
        Self { stem, ext }
    }

    pub fn stem(&self) -> &str {
        &self.stem
    }

    pub fn ext(&self) -> &str {
        &self.ext
    }

    /// Per-recording subfolder of the chosen output base directory.
    pub fn folder(&self, base_dir: &Path) -> PathBuf {
        base_dir.join(&self.stem)
    }

    pub fn merged(&self, folder: &Path) -> PathBuf {
        folder.join(format!("{}_TZYX{}", self.stem, self.ext))
    }

    pub fn split(&self, folder: &Path, z: usize) -> PathBuf {
        folder.join(format!("{}_Z{}{}", self.stem, z, self.ext))
    }

    pub fn projection(&self, folder: &Path) -> PathBuf {
        folder.join(format!("{}_zproj{}", self.stem, self.ext))
    }

    pub fn downsampled(&self, dir: &Path, factor: usize) -> PathBuf {
        dir.join(format!("{}_DS{}{}", self.stem, factor, self.ext))
    }

    pub fn motion_corrected(&self, dir: &Path, dims: CorrectionDims) -> PathBuf {
        let tag = match dims {
            CorrectionDims::TwoD => "MC2D",
            CorrectionDims::ThreeD => "MC3D",
        };
        dir.join(format!("{}_{}{}", self.stem, tag, self.ext))
    }
}
