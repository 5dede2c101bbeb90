//! Tile storage integration tests.
//!
//! Tests verify:
//! - Mapped and positioned backends produce identical tiles
//! - Backpressure forces flushes without changing tile content
//! - Level files are laid out per level and cleaned up on every exit path

use std::sync::Arc;

use jpeg_pyramid::store::{BackpressureController, FixedMemory, OutstandingWrites};
use jpeg_pyramid::{BuildStatus, PyramidBuilder, StoreBackend};

use super::test_utils::{
    build_in_chunks, build_with, create_test_rgb_jpeg, level_files, quiet_backpressure,
    test_config,
};

// =============================================================================
// Backends
// =============================================================================

#[test]
fn test_backends_produce_identical_tiles() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(100, 90, 85);
    let config = |backend| {
        test_config(scratch.path())
            .with_level_count(3)
            .with_backend(backend)
    };

    let mapped = build_in_chunks(config(StoreBackend::Mapped), &data, 1500);
    let positioned = build_in_chunks(config(StoreBackend::Positioned), &data, 1500);

    assert_eq!(mapped.levels(), positioned.levels());
    for level in mapped.levels() {
        for row in 0..level.rows {
            for col in 0..level.cols {
                assert_eq!(
                    mapped.tile(level.index, col, row).unwrap(),
                    positioned.tile(level.index, col, row).unwrap(),
                    "level {}, tile ({col}, {row})",
                    level.index
                );
            }
        }
    }
}

#[test]
fn test_one_file_per_level() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(100, 90, 85);

    let image = build_in_chunks(test_config(scratch.path()).with_level_count(4), &data, 4096);
    let dir = image.directory().unwrap();
    assert!(dir.starts_with(scratch.path()));
    assert_eq!(level_files(&dir), 4);
    for level in 0..4 {
        assert!(dir.join(format!("level_{level}.tiles")).exists());
    }
}

#[test]
fn test_concurrent_builds_use_separate_directories() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(40, 40, 85);

    let a = build_in_chunks(test_config(scratch.path()), &data, 4096);
    let b = build_in_chunks(test_config(scratch.path()), &data, 4096);
    assert_ne!(a.directory(), b.directory());
}

// =============================================================================
// Backpressure
// =============================================================================

#[test]
fn test_backpressure_flushes_without_changing_tiles() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(160, 160, 85);
    let config = || test_config(scratch.path()).with_level_count(3);

    let counter = Arc::new(OutstandingWrites::new(0.5));
    // Limit of 32 KiB: a flush every eight 32x32 tiles or so
    let tight = BackpressureController::with_probe(counter.clone(), Box::new(FixedMemory(64 * 1024)));
    let pressured = build_with(config(), tight, &data, 2048);
    let relaxed = build_in_chunks(config(), &data, 2048);

    assert!(pressured.stats().flushes > 0);
    assert_eq!(relaxed.stats().flushes, 0);
    assert_eq!(pressured.stats().tiles_written, relaxed.stats().tiles_written);
    // Finished builders withdraw their outstanding bytes
    assert_eq!(counter.bytes(), 0);

    for level in relaxed.levels() {
        for row in 0..level.rows {
            for col in 0..level.cols {
                assert_eq!(
                    pressured.tile(level.index, col, row).unwrap(),
                    relaxed.tile(level.index, col, row).unwrap()
                );
            }
        }
    }
}

#[test]
fn test_builders_share_one_budget() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(96, 96, 85);
    let counter = Arc::new(OutstandingWrites::new(0.5));
    let controller = || {
        BackpressureController::with_probe(counter.clone(), Box::new(FixedMemory(256 * 1024)))
    };

    let mut a = PyramidBuilder::new(test_config(scratch.path()))
        .unwrap()
        .with_backpressure(controller());
    let mut b = PyramidBuilder::new(test_config(scratch.path()))
        .unwrap()
        .with_backpressure(controller());

    // Interleave the two builds on the same counter
    for chunk in data.chunks(512) {
        for builder in [&mut a, &mut b] {
            if builder.status() != BuildStatus::Finished {
                builder.supply(chunk).unwrap();
            }
        }
        // Whoever crosses the limit flushes, leaving only the other's bytes
        assert!(counter.bytes() <= 128 * 1024);
    }
    assert_eq!(a.end_of_input().unwrap(), BuildStatus::Finished);
    assert_eq!(b.end_of_input().unwrap(), BuildStatus::Finished);
    drop((a, b));
    assert_eq!(counter.bytes(), 0);
}

// =============================================================================
// Cleanup
// =============================================================================

#[test]
fn test_files_removed_when_image_dropped() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(64, 64, 85);

    let image = build_in_chunks(test_config(scratch.path()), &data, 4096);
    let dir = image.directory().unwrap();
    assert!(dir.exists());

    drop(image);
    assert!(!dir.exists());
}

#[test]
fn test_keep_files_survives_drop() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(64, 64, 85);

    let image = build_in_chunks(
        test_config(scratch.path()).with_keep_files(true),
        &data,
        4096,
    );
    let dir = image.directory().unwrap();
    drop(image);
    assert!(dir.exists());
    assert_eq!(level_files(&dir), 1);
}

#[test]
fn test_cancel_removes_files_immediately() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(64, 256, 85);

    let mut builder = PyramidBuilder::new(test_config(scratch.path()))
        .unwrap()
        .with_backpressure(quiet_backpressure());
    let image = builder.image();
    builder.supply(&data[..data.len() / 2]).unwrap();
    let dir = image.directory().unwrap();
    assert!(dir.exists());

    image.cancel();
    assert_eq!(image.status(), BuildStatus::Cancelled);
    assert!(!dir.exists());
    assert!(image.tile(0, 0, 0).is_err());

    // The builder notices on its next call
    assert!(builder.supply(&data[data.len() / 2..]).is_err());
    assert!(builder.end_of_input().is_err());
}
