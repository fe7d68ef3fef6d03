//! Downsampling integration tests.

use ndarray::Array3;

use tiff_volume::{
    Rounding, Volume, batch,
    batch::BatchError,
    config::DownsampleOptions,
    downsample::DownsampleError,
    tiff_io,
};

use super::test_utils::{output_picker, write_zstack};

#[test]
fn test_downsample_acquisition_series() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("movie.tif");
    // seven frames valued 0, 10, ..., 60
    let series = Array3::from_shape_fn((7, 2, 2), |(t, _, _)| (t * 10) as u16);
    write_zstack(&input, &series);
    let (mut picker, out) = output_picker(root.path());
    std::fs::create_dir(&out).unwrap();

    let options = DownsampleOptions {
        factor: 3,
        rounding: Rounding::Nearest,
    };
    let report = batch::run_downsample(&[input], &options, &mut picker);
    assert!(report.is_success());

    let path = out.join("movie_DS3.tif");
    assert_eq!(report.written, vec![path.clone()]);
    let downsampled = tiff_io::read_volume(&path).unwrap();
    let frames: Vec<u16> = (0..3).map(|t| downsampled.data()[[t, 0, 0, 0]]).collect();
    assert_eq!(frames, vec![10, 40, 60]);
}

#[test]
fn test_downsample_every_file_in_directory() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("movies");
    std::fs::create_dir(&dir).unwrap();
    for name in ["a.tif", "b.tif"] {
        write_zstack(&dir.join(name), &Array3::from_elem((4, 1, 1), 8));
    }
    let (mut picker, out) = output_picker(root.path());
    std::fs::create_dir(&out).unwrap();

    let options = DownsampleOptions {
        factor: 2,
        rounding: Rounding::Nearest,
    };
    let report = batch::run_downsample(&[dir], &options, &mut picker);
    assert_eq!(
        report.written,
        vec![out.join("a_DS2.tif"), out.join("b_DS2.tif")]
    );
}

#[test]
fn test_downsample_rejects_hyperstacks() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("hyper.tif");
    let hyper = Volume::new(
        ndarray::Array4::zeros((2, 3, 2, 2)),
        tiff_volume::Axes::TZYX,
    );
    tiff_io::write_volume(&input, &hyper).unwrap();
    let (mut picker, _) = output_picker(root.path());

    let options = DownsampleOptions {
        factor: 2,
        rounding: Rounding::Nearest,
    };
    let report = batch::run_downsample(&[input], &options, &mut picker);
    assert_eq!(report.failed.len(), 1);
    assert!(matches!(
        report.failed[0].1,
        BatchError::Downsample(DownsampleError::NotTimeSeries { slices: 3 })
    ));
}
