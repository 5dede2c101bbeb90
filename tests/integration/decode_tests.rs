//! Incremental decoding integration tests.
//!
//! Tests verify:
//! - Tiles are identical no matter how the input is chunked
//! - Restart markers are honored, including markers split across chunks
//! - Decoded pixels agree with a reference decoder
//! - Progressive streams are buffered and tiled at end of input
//! - Small chunks never hold back more than one unfinished MCU
//! - Truncated, empty and non-JPEG input fail the build with a decode error

use image::GenericImageView;

use jpeg_pyramid::{BuildError, BuildStatus, DecodeError, PyramidBuilder, TileError};

use super::test_utils::{
    assemble_level, build_in_chunks, create_progressive_jpeg, create_restart_jpeg,
    create_test_jpeg, create_test_rgb_jpeg, is_valid_jpeg, pixel_at, quiet_backpressure,
    test_config, RESTART_GRAY,
};

// =============================================================================
// Chunk Independence
// =============================================================================

#[test]
fn test_chunk_size_does_not_change_tiles() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(150, 100, 85);
    assert!(is_valid_jpeg(&data));

    let config = || test_config(scratch.path()).with_level_count(3);
    let whole = build_in_chunks(config(), &data, data.len());

    for chunk in [1, 7, 512, 4096] {
        let split = build_in_chunks(config(), &data, chunk);
        assert_eq!(split.levels(), whole.levels());
        for level in whole.levels() {
            for row in 0..level.rows {
                for col in 0..level.cols {
                    assert_eq!(
                        split.tile(level.index, col, row).unwrap(),
                        whole.tile(level.index, col, row).unwrap(),
                        "chunk {chunk}, level {}, tile ({col}, {row})",
                        level.index
                    );
                }
            }
        }
    }
}

#[test]
fn test_bytes_supplied_counts_every_chunk() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_jpeg(64, 64, 90);

    let image = build_in_chunks(test_config(scratch.path()), &data, 100);
    let stats = image.stats();
    assert_eq!(stats.status, BuildStatus::Finished);
    // The last scanline may complete before the final EOI chunk is needed
    assert!(stats.bytes_supplied + 100 > data.len() as u64);
    assert!(stats.bytes_supplied <= data.len() as u64);
    assert_eq!(stats.scanlines, 64);
    assert!(stats.elapsed_ms.is_some());
}

#[test]
fn test_wide_image_in_small_chunks_is_not_redecoded() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(8000, 64, 90);
    let chunk = 1024;

    let mut builder = PyramidBuilder::new(test_config(scratch.path()).with_level_count(2))
        .unwrap()
        .with_backpressure(quiet_backpressure());
    let image = builder.image();
    for piece in data.chunks(chunk) {
        if builder.supply(piece).unwrap() == BuildStatus::Finished {
            break;
        }
        if image.source().is_some() {
            // Completed MCUs leave the buffer as soon as they decode
            assert!(builder.cursor().bytes_buffered() < chunk);
        }
    }
    assert_eq!(builder.end_of_input().unwrap(), BuildStatus::Finished);

    // Each chunk re-reads at most the one MCU it cut short
    let retried = builder.cursor().retried_bytes();
    assert!(
        retried < data.len() as u64 / 4,
        "retried {retried} of {} bytes",
        data.len()
    );

    let whole = build_in_chunks(test_config(scratch.path()).with_level_count(2), &data, data.len());
    let (_, _, expected) = assemble_level(&whole, 0);
    let (_, _, pixels) = assemble_level(&image, 0);
    assert!(pixels == expected);
}

// =============================================================================
// Restart Markers
// =============================================================================

#[test]
fn test_restart_markers_reset_prediction() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_restart_jpeg(16, 8, 3);

    let image = build_in_chunks(test_config(scratch.path()), &data, data.len());
    let (width, height, pixels) = assemble_level(&image, 0);
    assert_eq!((width, height), (128, 64));
    for y in 0..height {
        for x in 0..width {
            assert_eq!(
                pixel_at(&pixels, width, x, y),
                [RESTART_GRAY, RESTART_GRAY, RESTART_GRAY, 255],
                "pixel ({x}, {y})"
            );
        }
    }
    assert_eq!(
        image.properties().get("RestartInterval"),
        Some(&serde_json::Value::from(3))
    );
}

#[test]
fn test_restart_markers_split_across_chunks() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_restart_jpeg(16, 8, 1);
    let reference = build_in_chunks(test_config(scratch.path()), &data, data.len());
    let (_, _, expected) = assemble_level(&reference, 0);

    for chunk in [1, 2, 3] {
        let image = build_in_chunks(test_config(scratch.path()), &data, chunk);
        let (_, _, pixels) = assemble_level(&image, 0);
        assert_eq!(pixels, expected, "chunk {chunk}");
    }
}

// =============================================================================
// Pixel Accuracy
// =============================================================================

#[test]
fn test_grayscale_matches_reference_decoder() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_jpeg(96, 80, 92);
    let reference = image::load_from_memory(&data).unwrap();

    let image = build_in_chunks(test_config(scratch.path()), &data, 333);
    let (width, height, pixels) = assemble_level(&image, 0);
    assert_eq!((width, height), reference.dimensions());

    for (x, y, expected) in reference.pixels() {
        let actual = pixel_at(&pixels, width, x, y);
        assert!(
            (actual[0] as i32 - expected[0] as i32).abs() <= 3,
            "pixel ({x}, {y}): {actual:?} vs {expected:?}"
        );
        assert_eq!(actual[0], actual[1]);
        assert_eq!(actual[1], actual[2]);
        assert_eq!(actual[3], 255);
    }
}

#[test]
fn test_source_properties_are_published() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(48, 40, 90);

    let image = build_in_chunks(test_config(scratch.path()), &data, 256);
    let source = image.source().unwrap();
    assert_eq!((source.width, source.height), (48, 40));
    assert_eq!(source.components, 3);
    assert!(!source.progressive);
}

// =============================================================================
// Failures
// =============================================================================

#[test]
fn test_empty_input_fails_with_decode_error() {
    let scratch = tempfile::tempdir().unwrap();
    let mut builder = PyramidBuilder::new(test_config(scratch.path())).unwrap();
    let image = builder.image();

    let err = builder.end_of_input().unwrap_err();
    assert!(matches!(
        err,
        BuildError::Decode(DecodeError::MissingHeader { received: 0 })
    ));
    assert_eq!(image.status(), BuildStatus::Failed);
    assert!(image.image_size().is_none());
    assert_eq!(
        image.tile(0, 0, 0).unwrap_err(),
        TileError::Unavailable {
            status: BuildStatus::Failed
        }
    );
}

#[test]
fn test_not_a_jpeg_fails() {
    let scratch = tempfile::tempdir().unwrap();
    let mut builder = PyramidBuilder::new(test_config(scratch.path())).unwrap();

    // Too short to parse until input ends
    assert_eq!(
        builder.supply(&[0x89, b'P', b'N', b'G']).unwrap(),
        BuildStatus::Decoding
    );
    assert!(builder.end_of_input().unwrap_err().is_decode());
    assert_eq!(builder.status(), BuildStatus::Failed);
}

#[test]
fn test_truncated_stream_fails_and_removes_files() {
    let scratch = tempfile::tempdir().unwrap();
    let mut data = create_test_jpeg(128, 128, 90);
    data.truncate(data.len() * 2 / 3);

    let mut builder = PyramidBuilder::new(test_config(scratch.path()))
        .unwrap()
        .with_backpressure(quiet_backpressure());
    let image = builder.image();
    for chunk in data.chunks(1024) {
        assert_eq!(builder.supply(chunk).unwrap(), BuildStatus::Decoding);
    }
    let dir = image.directory().unwrap();
    assert!(dir.exists());

    match builder.end_of_input().unwrap_err() {
        BuildError::Decode(DecodeError::Truncated { decoded, expected }) => {
            assert_eq!(expected, 128);
            assert!(decoded < 128);
        }
        other => panic!("unexpected error {other}"),
    }
    assert_eq!(image.status(), BuildStatus::Failed);
    assert!(image.failure().is_some_and(|e| e.is_decode()));
    assert!(!dir.exists());
}

#[test]
fn test_trailing_bytes_after_eoi_are_ignored() {
    let scratch = tempfile::tempdir().unwrap();
    let mut data = create_test_jpeg(40, 40, 90);
    data.extend_from_slice(&[0u8; 300]);

    let mut builder = PyramidBuilder::new(test_config(scratch.path()))
        .unwrap()
        .with_backpressure(quiet_backpressure());
    assert_eq!(builder.supply(&data).unwrap(), BuildStatus::Finished);
    assert_eq!(builder.end_of_input().unwrap(), BuildStatus::Finished);
}

// =============================================================================
// Progressive Streams
// =============================================================================

#[test]
fn test_progressive_matches_reference_decoder() {
    for subsampled in [true, false] {
        let scratch = tempfile::tempdir().unwrap();
        let data = create_progressive_jpeg(97, 61, subsampled);
        let reference = image::load_from_memory(&data).unwrap().to_rgba8();

        let config = || test_config(scratch.path()).with_level_count(3);
        let whole = build_in_chunks(config(), &data, data.len());
        let source = whole.source().unwrap();
        assert!(source.progressive);
        assert!(source.buffered);
        assert_eq!((source.width, source.height), (97, 61));

        let (width, height, pixels) = assemble_level(&whole, 0);
        assert_eq!((width, height), reference.dimensions());
        assert!(pixels == reference.as_raw().as_slice(), "subsampled {subsampled}");

        for chunk in [1, 7, 333] {
            let split = build_in_chunks(config(), &data, chunk);
            assert_eq!(split.levels(), whole.levels());
            for level in whole.levels() {
                for row in 0..level.rows {
                    for col in 0..level.cols {
                        assert_eq!(
                            split.tile(level.index, col, row).unwrap(),
                            whole.tile(level.index, col, row).unwrap(),
                            "subsampled {subsampled}, chunk {chunk}, level {}, tile ({col}, {row})",
                            level.index
                        );
                    }
                }
            }
        }
    }
}

#[test]
fn test_progressive_rows_wait_for_end_of_input() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_progressive_jpeg(64, 64, true);

    let mut builder = PyramidBuilder::new(test_config(scratch.path()))
        .unwrap()
        .with_backpressure(quiet_backpressure());
    let image = builder.image();
    assert_eq!(builder.supply(&data).unwrap(), BuildStatus::Decoding);
    assert_eq!(image.stats().scanlines, 0);
    assert!(!image.tile_ready(0, 0));

    assert_eq!(builder.end_of_input().unwrap(), BuildStatus::Finished);
    assert_eq!(image.stats().scanlines, 64);
    assert!(image.tile_ready(0, 1));
}
