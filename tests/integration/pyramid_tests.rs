//! Pyramid geometry and content integration tests.
//!
//! Tests verify:
//! - Level planning for viewport and fixed-count policies
//! - Tile grids, tile sizes and edge padding
//! - Reduced levels are the rounded 2x2 average of their parent
//! - Bands become readable progressively while decoding continues

use jpeg_pyramid::{
    plan_levels, BuildStatus, LevelPolicy, PyramidBuilder, TileError, TilerConfig,
};

use super::test_utils::{
    assemble_level, build_in_chunks, close_to, create_solid_jpeg, create_test_rgb_jpeg,
    pixel_at, quiet_backpressure, test_config,
};

// =============================================================================
// Level Planning
// =============================================================================

#[test]
fn test_viewport_policy_600x400() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(600, 400, 80);
    let config = TilerConfig::new()
        .with_output_dir(scratch.path())
        .with_tile_dimension(256)
        .with_viewport(200, 200);

    let image = build_in_chunks(config, &data, 8192);
    let levels = image.levels();
    let sizes: Vec<_> = levels.iter().map(|l| (l.width, l.height)).collect();
    assert_eq!(sizes, vec![(600, 400), (300, 200), (150, 100)]);
    assert_eq!(image.level_count(), 3);
    assert_eq!((levels[0].cols, levels[0].rows), (3, 2));
    assert_eq!((levels[1].cols, levels[1].rows), (2, 1));
    assert_eq!((levels[2].cols, levels[2].rows), (1, 1));

    // Edge tiles are full size, padded past the image
    let edge = image.tile(0, 2, 1).unwrap();
    assert_eq!(edge.len(), 256 * 256 * 4);
    let padding = ((200 * 256) + 100) * 4;
    assert_eq!(&edge[padding..padding + 4], &[0, 0, 0, 0]);
    let inside = ((10 * 256) + 10) * 4;
    assert_eq!(edge[inside + 3], 255);

    assert_eq!(image.tile(2, 0, 0).unwrap().len(), 256 * 256 * 4);
}

#[test]
fn test_level_sizes_round_up() {
    let levels = plan_levels(101, 51, 32, LevelPolicy::Count(4)).unwrap();
    let sizes: Vec<_> = levels.iter().map(|l| (l.width, l.height)).collect();
    assert_eq!(sizes, vec![(101, 51), (51, 26), (26, 13), (13, 7)]);
}

#[test]
fn test_fixed_level_count() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(64, 64, 90);

    let image = build_in_chunks(test_config(scratch.path()).with_level_count(5), &data, 1000);
    assert_eq!(image.level_count(), 5);
    let last = image.level(4).unwrap();
    assert_eq!((last.width, last.height), (4, 4));
    assert_eq!((last.cols, last.rows), (1, 1));
    assert!(image.level(5).is_none());
}

#[test]
fn test_small_image_has_single_level() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(60, 40, 90);

    // Default viewport is larger than the image
    let image = build_in_chunks(test_config(scratch.path()), &data, 1000);
    assert_eq!(image.level_count(), 1);
}

// =============================================================================
// Tile Content
// =============================================================================

#[test]
fn test_solid_color_survives_every_level() {
    let scratch = tempfile::tempdir().unwrap();
    let color = [40, 120, 200];
    let data = create_solid_jpeg(130, 90, color);

    let image = build_in_chunks(test_config(scratch.path()).with_level_count(5), &data, 777);
    for level in 0..image.level_count() {
        let (width, height, pixels) = assemble_level(&image, level);
        for y in 0..height {
            for x in 0..width {
                let px = pixel_at(&pixels, width, x, y);
                assert!(
                    close_to(px, color, 4),
                    "level {level} pixel ({x}, {y}) is {px:?}"
                );
                assert_eq!(px[3], 255);
            }
        }
    }
}

#[test]
fn test_reduced_level_is_rounded_average() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(90, 70, 85);

    let image = build_in_chunks(test_config(scratch.path()).with_level_count(3), &data, 2048);
    for level in 1..image.level_count() {
        let (pw, ph, parent) = assemble_level(&image, level - 1);
        let (width, height, child) = assemble_level(&image, level);

        for y in 0..height {
            for x in 0..width {
                let mut sum = [0u32; 4];
                let mut n = 0;
                for (px, py) in [(0, 0), (1, 0), (0, 1), (1, 1)].map(|(i, j)| (2 * x + i, 2 * y + j)) {
                    if px < pw && py < ph {
                        let p = pixel_at(&parent, pw, px, py);
                        for (acc, value) in sum.iter_mut().zip(p) {
                            *acc += value as u32;
                        }
                        n += 1;
                    }
                }
                let expected: Vec<u8> = sum.iter().map(|s| ((s + n / 2) / n) as u8).collect();
                assert_eq!(
                    pixel_at(&child, width, x, y).to_vec(),
                    expected,
                    "level {level} pixel ({x}, {y})"
                );
            }
        }
    }
}

#[test]
fn test_tile_coordinates_are_checked() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(70, 40, 90);

    let image = build_in_chunks(test_config(scratch.path()).with_level_count(2), &data, 4096);
    assert_eq!(
        image.tile(2, 0, 0).unwrap_err(),
        TileError::InvalidLevel {
            level: 2,
            levels: 2
        }
    );
    assert_eq!(
        image.tile(0, 3, 0).unwrap_err(),
        TileError::TileOutOfBounds {
            level: 0,
            col: 3,
            row: 0,
            cols: 3,
            rows: 2
        }
    );
    assert!(image.tile(0, 2, 1).is_ok());
}

// =============================================================================
// Progressive Availability
// =============================================================================

#[test]
fn test_bands_become_ready_while_decoding() {
    let scratch = tempfile::tempdir().unwrap();
    let data = create_test_rgb_jpeg(64, 256, 90);

    let mut builder = PyramidBuilder::new(test_config(scratch.path()).with_level_count(2))
        .unwrap()
        .with_backpressure(quiet_backpressure());
    let image = builder.image();
    assert_eq!(
        image.tile(0, 0, 0).unwrap_err(),
        TileError::Unavailable {
            status: BuildStatus::NotStarted
        }
    );

    // Roughly the first half of the scan
    let half = data.len() / 2;
    assert_eq!(builder.supply(&data[..half]).unwrap(), BuildStatus::Decoding);
    assert_eq!(image.status(), BuildStatus::Decoding);
    assert_eq!(image.image_size(), Some((64, 256)));

    assert!(image.tile_ready(0, 0));
    assert!(image.tile(0, 1, 0).is_ok());
    assert!(!image.tile_ready(0, 7));
    assert_eq!(
        image.tile(0, 0, 7).unwrap_err(),
        TileError::BandNotReady { level: 0, row: 7 }
    );
    assert!(image.stats().scanlines < 256);

    assert_eq!(builder.supply(&data[half..]).unwrap(), BuildStatus::Finished);
    for level in image.levels() {
        for row in 0..level.rows {
            assert!(image.tile_ready(level.index, row));
        }
    }
}
