//! Helpers for writing synthetic acquisition files.
//!
//! Acquisition files are plain (non-Big) multi-page TIFFs without any
//! description, the way the microscope software saves one Z-stack per
//! timepoint.

use ndarray::{Array2, Array3};
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tiff::encoder::{TiffEncoder, colortype};

use tiff_volume::FixedFolder;

/// Write each page as one uncompressed Gray16 image.
pub fn write_acquisition(path: &Path, pages: &[Array2<u16>]) {
    let file = File::create(path).unwrap();
    let mut encoder = TiffEncoder::new(BufWriter::new(file)).unwrap();
    for page in pages {
        let (rows, cols) = page.dim();
        let samples: Vec<u16> = page.iter().copied().collect();
        encoder
            .write_image::<colortype::Gray16>(cols as u32, rows as u32, &samples)
            .unwrap();
    }
}

/// Write a (Z, Y, X) stack as one acquisition file.
pub fn write_zstack(path: &Path, zstack: &Array3<u16>) {
    let pages: Vec<_> = zstack.outer_iter().map(|p| p.to_owned()).collect();
    write_acquisition(path, &pages);
}

/// Pages whose every pixel encodes (file, page): `file * 100 + page`.
pub fn tagged_zstack(file: usize, depth: usize, rows: usize, cols: usize) -> Array3<u16> {
    Array3::from_shape_fn((depth, rows, cols), |(z, _, _)| (file * 100 + z) as u16)
}

/// A recording directory named `name` with one tagged stack per depth
/// entry, files named `t000.tif`, `t001.tif`, ...
pub fn recording(root: &Path, name: &str, depths: &[usize]) -> PathBuf {
    let dir = root.join(name);
    fs::create_dir_all(&dir).unwrap();
    for (t, &depth) in depths.iter().enumerate() {
        write_zstack(&dir.join(format!("t{t:03}.tif")), &tagged_zstack(t, depth, 3, 2));
    }
    dir
}

pub fn output_picker(root: &Path) -> (FixedFolder, PathBuf) {
    let out = root.join("out");
    (FixedFolder(out.clone()), out)
}
