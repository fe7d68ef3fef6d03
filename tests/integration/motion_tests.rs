//! Motion correction integration tests.

use ndarray::{Array3, Array4};
use std::path::Path;

use tiff_volume::{
    CorrectionDims, MotionEngine, MotionError, MotionParams, Rigidity, Volume, batch,
    config::MotionOptions, tiff_io,
};

use super::test_utils::{output_picker, write_zstack};

/// Returns the input unchanged and counts pool requests.
#[derive(Default)]
struct IdentityEngine {
    pools_started: usize,
    pools_stopped: usize,
}

impl MotionEngine for IdentityEngine {
    type Pool = ();

    fn start_pool(&mut self, _processes: usize) -> Result<(), MotionError> {
        self.pools_started += 1;
        Ok(())
    }

    fn correct(
        &mut self,
        _pool: &(),
        input: &Path,
        _params: &MotionParams,
    ) -> Result<Array4<f32>, MotionError> {
        let (data, _) = tiff_io::read_array::<f32>(input)?;
        Ok(data)
    }

    fn stop_pool(&mut self, _pool: ()) -> Result<(), MotionError> {
        self.pools_stopped += 1;
        Ok(())
    }
}

fn options(dims: CorrectionDims) -> MotionOptions {
    MotionOptions {
        params: MotionParams::preset(dims, Rigidity::Rigid),
    }
}

fn ramp_movie(path: &Path) {
    let series = Array3::from_shape_fn((4, 2, 2), |(t, y, x)| (100 + t * 4 + y * 2 + x) as u16);
    write_zstack(path, &series);
}

#[test]
fn test_corrected_movie_is_rescaled_and_saved() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("movie.tif");
    ramp_movie(&input);
    let (mut picker, out) = output_picker(root.path());
    std::fs::create_dir(&out).unwrap();
    let mut engine = IdentityEngine::default();

    let report = batch::run_motion(
        &[input],
        &options(CorrectionDims::TwoD),
        &mut engine,
        &mut picker,
    );
    assert!(report.is_success());

    let saved = tiff_io::read_volume(&out.join("movie_MC2D.tif")).unwrap();
    assert_eq!(saved.dim(), (4, 1, 2, 2));
    assert_eq!(saved.data()[[0, 0, 0, 0]], 0);
    assert_eq!(saved.data()[[3, 0, 1, 1]], u16::MAX);
    assert_eq!((engine.pools_started, engine.pools_stopped), (1, 1));
}

#[test]
fn test_each_file_gets_its_own_pool() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("movies");
    std::fs::create_dir(&dir).unwrap();
    ramp_movie(&dir.join("a.tif"));
    ramp_movie(&dir.join("b.tif"));
    std::fs::write(dir.join("c.tif"), b"broken").unwrap();
    let (mut picker, out) = output_picker(root.path());
    std::fs::create_dir(&out).unwrap();
    let mut engine = IdentityEngine::default();

    let report = batch::run_motion(
        &[dir],
        &options(CorrectionDims::TwoD),
        &mut engine,
        &mut picker,
    );
    assert_eq!(report.written.len(), 2);
    assert_eq!(report.failed.len(), 1);
    // the broken file fails before a pool is requested
    assert_eq!((engine.pools_started, engine.pools_stopped), (2, 2));
}

#[test]
fn test_3d_correction_of_merged_volume() {
    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("stack_TZYX.tif");
    let data = Array4::from_shape_fn((2, 3, 2, 2), |(t, z, _, _)| (t * 3 + z) as u16);
    tiff_io::write_volume(&input, &Volume::new(data, tiff_volume::Axes::TZYX)).unwrap();
    let (mut picker, out) = output_picker(root.path());
    std::fs::create_dir(&out).unwrap();
    let mut engine = IdentityEngine::default();

    let report = batch::run_motion(
        &[input],
        &options(CorrectionDims::ThreeD),
        &mut engine,
        &mut picker,
    );
    assert!(report.is_success());
    let saved = tiff_io::read_volume(&out.join("stack_TZYX_MC3D.tif")).unwrap();
    assert_eq!(saved.dim(), (2, 3, 2, 2));
    assert_eq!(saved.data()[[1, 2, 0, 0]], u16::MAX);
}

#[cfg(unix)]
#[test]
fn test_external_engine_round_trip() {
    use tiff_volume::ExternalEngine;

    let root = tempfile::tempdir().unwrap();
    let input = root.path().join("movie.tif");
    ramp_movie(&input);
    let (mut picker, out) = output_picker(root.path());
    std::fs::create_dir(&out).unwrap();

    // sh -c 'cp "$1" "$3"' sh INPUT MODE OUTPUT
    let mut engine = ExternalEngine::new(
        "/bin/sh",
        vec!["-c".to_string(), "cp \"$1\" \"$3\"".to_string(), "sh".to_string()],
    )
    .with_scratch_dir(root.path());

    let report = batch::run_motion(
        &[input],
        &options(CorrectionDims::TwoD),
        &mut engine,
        &mut picker,
    );
    assert!(report.is_success(), "{:?}", report.failed);
    let saved = tiff_io::read_volume(&out.join("movie_MC2D.tif")).unwrap();
    assert_eq!(saved.data()[[3, 0, 1, 1]], u16::MAX);
}
