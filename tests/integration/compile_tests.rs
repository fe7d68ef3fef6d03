//! Compile-mode integration tests: merge, split and Z-projection.

use ndarray::{Array3, s};
use std::fs;

use tiff_volume::{
    CompileMode, Rounding, Volume, batch,
    config::CompileOptions,
    tiff_io::{self, StackDescription},
};

use super::test_utils::{output_picker, recording, write_zstack};

fn options(mode: CompileMode, depth: Option<usize>) -> CompileOptions {
    CompileOptions {
        mode,
        depth,
        rounding: Rounding::Nearest,
    }
}

// =============================================================================
// Merge
// =============================================================================

#[test]
fn test_merge_shape_and_order() {
    let root = tempfile::tempdir().unwrap();
    let dir = recording(root.path(), "session1", &[4, 4, 4]);
    let (mut picker, out) = output_picker(root.path());

    let report = batch::run_compile(&[dir], &options(CompileMode::Merge, None), &mut picker);
    assert!(report.is_success());

    let path = out.join("session1").join("session1_TZYX.tif");
    assert_eq!(report.written, vec![path.clone()]);

    let merged = tiff_io::read_volume(&path).unwrap();
    assert_eq!(merged.dim(), (3, 4, 3, 2));
    for t in 0..3 {
        for z in 0..4 {
            assert_eq!(merged.data()[[t, z, 2, 1]], (t * 100 + z) as u16);
        }
    }
}

#[test]
fn test_merge_output_metadata() {
    let root = tempfile::tempdir().unwrap();
    let dir = recording(root.path(), "session2", &[2, 2]);
    let (mut picker, out) = output_picker(root.path());
    batch::run_compile(&[dir], &options(CompileMode::Merge, None), &mut picker);

    let path = out.join("session2").join("session2_TZYX.tif");
    let bytes = fs::read(&path).unwrap();
    // BigTIFF version number
    assert_eq!(u16::from_le_bytes([bytes[2], bytes[3]]), 43);

    let description = tiff_io::read_description(&path).unwrap().unwrap();
    assert_eq!(
        description,
        StackDescription {
            frames: 2,
            slices: 2,
            axes: tiff_volume::Axes::TZYX,
        }
    );
}

#[test]
fn test_merge_skips_mismatched_and_corrupt_files() {
    let root = tempfile::tempdir().unwrap();
    let dir = recording(root.path(), "session3", &[3, 2, 3, 4, 3]);
    fs::write(dir.join("t002.tif"), b"not a tiff").unwrap();
    let (mut picker, out) = output_picker(root.path());

    let report = batch::run_compile(&[dir], &options(CompileMode::Merge, None), &mut picker);
    assert!(report.is_success());

    let merged = tiff_io::read_volume(&out.join("session3").join("session3_TZYX.tif")).unwrap();
    // t000 and t004 survive; t001 is short, t002 corrupt, t003 long
    assert_eq!(merged.dim(), (2, 3, 3, 2));
    assert_eq!(merged.data()[[0, 2, 0, 0]], 2);
    assert_eq!(merged.data()[[1, 2, 0, 0]], 402);
}

#[test]
fn test_merge_is_idempotent() {
    let root = tempfile::tempdir().unwrap();
    let dir = recording(root.path(), "session4", &[2, 2, 2]);
    let (mut picker, out) = output_picker(root.path());
    let path = out.join("session4").join("session4_TZYX.tif");

    batch::run_compile(&[dir.clone()], &options(CompileMode::Merge, None), &mut picker);
    let first = fs::read(&path).unwrap();
    batch::run_compile(&[dir], &options(CompileMode::Merge, None), &mut picker);
    let second = fs::read(&path).unwrap();

    assert_eq!(first, second);
}

#[test]
fn test_three_file_scenario() {
    let root = tempfile::tempdir().unwrap();
    let dir = root.path().join("scenario");
    fs::create_dir(&dir).unwrap();
    for t in 0..3 {
        let mut zstack = Array3::<u16>::zeros((4, 2, 2));
        if t == 1 {
            zstack.slice_mut(s![1, .., ..]).fill(1);
        }
        write_zstack(&dir.join(format!("f{t}.tif")), &zstack);
    }
    let (mut picker, out) = output_picker(root.path());

    batch::run_compile(&[dir.clone()], &options(CompileMode::Merge, None), &mut picker);
    let merged = tiff_io::read_volume(&out.join("scenario").join("scenario_TZYX.tif")).unwrap();
    assert_eq!(merged.dim(), (3, 4, 2, 2));
    assert_eq!(merged.data()[[1, 1, 0, 0]], 1);

    batch::run_compile(&[dir], &options(CompileMode::ZProject, None), &mut picker);
    let projected = tiff_io::read_volume(&out.join("scenario").join("scenario_zproj.tif")).unwrap();
    assert_eq!(projected.dim(), (3, 1, 2, 2));
    // mean of [1, 0, 0, 0] is 0.25, rounds to 0
    assert!(projected.data().iter().all(|&v| v == 0));
}

#[test]
fn test_single_short_file_writes_nothing() {
    let root = tempfile::tempdir().unwrap();
    let dir = recording(root.path(), "short", &[3]);
    let (mut picker, out) = output_picker(root.path());

    let report = batch::run_compile(
        &[dir.clone()],
        &options(CompileMode::Merge, Some(4)),
        &mut picker,
    );
    assert!(report.is_success());
    assert_eq!(report.empty, vec![dir]);
    assert!(report.written.is_empty());
    assert!(!out.exists());
}

// =============================================================================
// Split
// =============================================================================

#[test]
fn test_split_distributes_pages_by_depth() {
    let root = tempfile::tempdir().unwrap();
    let dir = recording(root.path(), "split", &[3, 3, 1, 3]);
    let (mut picker, out) = output_picker(root.path());

    let report = batch::run_compile(&[dir], &options(CompileMode::Split, None), &mut picker);
    assert_eq!(report.written.len(), 3);

    let folder = out.join("split");
    for z in 0..3 {
        let path = folder.join(format!("split_Z{z}.tif"));
        let series = tiff_io::read_volume(&path).unwrap();
        // t002 has a single page and contributes to no depth
        assert_eq!(series.dim(), (3, 1, 3, 2));
        let firsts: Vec<u16> = (0..3).map(|t| series.data()[[t, 0, 0, 0]]).collect();
        let z = z as u16;
        assert_eq!(firsts, vec![z, 100 + z, 300 + z]);
    }
}

// =============================================================================
// Z-projection
// =============================================================================

#[test]
fn test_projection_accepts_mixed_depths() {
    let root = tempfile::tempdir().unwrap();
    let dir = recording(root.path(), "proj", &[2, 5, 3]);
    let (mut picker, out) = output_picker(root.path());

    let report = batch::run_compile(&[dir], &options(CompileMode::ZProject, None), &mut picker);
    assert!(report.is_success());

    let projected = tiff_io::read_volume(&out.join("proj").join("proj_zproj.tif")).unwrap();
    assert_eq!(projected.dim(), (3, 1, 3, 2));
    // means: (0 + 1) / 2 = 0.5 -> 1, 100 + 2 = 102, 200 + 1 = 201
    assert_eq!(projected.data()[[0, 0, 0, 0]], 1);
    assert_eq!(projected.data()[[1, 0, 1, 1]], 102);
    assert_eq!(projected.data()[[2, 0, 2, 0]], 201);
}

#[test]
fn test_projection_truncation_policy() {
    let root = tempfile::tempdir().unwrap();
    let dir = recording(root.path(), "trunc", &[2]);
    let (mut picker, out) = output_picker(root.path());
    let options = CompileOptions {
        mode: CompileMode::ZProject,
        depth: None,
        rounding: Rounding::Truncate,
    };

    batch::run_compile(&[dir], &options, &mut picker);
    let projected: Volume = tiff_io::read_volume(&out.join("trunc").join("trunc_zproj.tif")).unwrap();
    assert_eq!(projected.data()[[0, 0, 0, 0]], 0);
}

#[test]
fn test_single_file_item() {
    let root = tempfile::tempdir().unwrap();
    let dir = recording(root.path(), "single", &[2, 2]);
    let (mut picker, out) = output_picker(root.path());

    let file = dir.join("t001.tif");
    let report = batch::run_compile(&[file], &options(CompileMode::Merge, None), &mut picker);
    assert_eq!(
        report.written,
        vec![out.join("t001").join("t001_TZYX.tif")]
    );
}
