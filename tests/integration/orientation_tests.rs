//! EXIF orientation integration tests.
//!
//! Tests verify:
//! - Embedded EXIF orientation is detected and applied while tiling
//! - A configured orientation overrides the embedded one
//! - All eight orientations place every pixel where the transform says
//! - Each orientation's inverse restores the original coordinates

use jpeg_pyramid::error::GeometryError;
use jpeg_pyramid::{BuildError, Orientation, PyramidBuilder, ALL_ORIENTATIONS};

use super::test_utils::{
    assemble_level, build_in_chunks, close_to, create_split_jpeg, create_test_rgb_jpeg,
    pixel_at, test_config, with_exif_orientation,
};

const RED: [u8; 3] = [220, 20, 20];
const BLUE: [u8; 3] = [20, 20, 220];

// =============================================================================
// Embedded Orientation
// =============================================================================

#[test]
fn test_exif_rotation_is_applied() {
    let scratch = tempfile::tempdir().unwrap();
    let data = with_exif_orientation(&create_split_jpeg(64, 32, RED, BLUE), 6);

    let image = build_in_chunks(test_config(scratch.path()), &data, 200);
    assert_eq!(image.orientation(), Some(Orientation::Rotate90));
    assert_eq!(image.source().unwrap().orientation, Some(6));
    assert_eq!(image.image_size(), Some((32, 64)));

    // The left half of the stored image becomes the top half
    let (width, height, pixels) = assemble_level(&image, 0);
    assert_eq!((width, height), (32, 64));
    assert!(close_to(pixel_at(&pixels, width, 16, 8), RED, 8));
    assert!(close_to(pixel_at(&pixels, width, 16, 56), BLUE, 8));
}

#[test]
fn test_exif_mirror_is_applied() {
    let scratch = tempfile::tempdir().unwrap();
    let data = with_exif_orientation(&create_split_jpeg(64, 32, RED, BLUE), 2);

    let image = build_in_chunks(test_config(scratch.path()), &data, 200);
    assert_eq!(image.orientation(), Some(Orientation::MirrorHorizontal));
    assert_eq!(image.image_size(), Some((64, 32)));

    let (width, _, pixels) = assemble_level(&image, 0);
    assert!(close_to(pixel_at(&pixels, width, 8, 16), BLUE, 8));
    assert!(close_to(pixel_at(&pixels, width, 56, 16), RED, 8));
}

#[test]
fn test_configured_orientation_overrides_exif() {
    let scratch = tempfile::tempdir().unwrap();
    let data = with_exif_orientation(&create_split_jpeg(64, 32, RED, BLUE), 6);

    let config = test_config(scratch.path()).with_orientation(1);
    let image = build_in_chunks(config, &data, 200);
    assert_eq!(image.orientation(), Some(Orientation::Identity));
    assert_eq!(image.image_size(), Some((64, 32)));
}

#[test]
fn test_out_of_range_exif_is_ignored() {
    let scratch = tempfile::tempdir().unwrap();
    let data = with_exif_orientation(&create_split_jpeg(64, 32, RED, BLUE), 9);

    let image = build_in_chunks(test_config(scratch.path()), &data, 200);
    assert_eq!(image.orientation(), Some(Orientation::Identity));
}

#[test]
fn test_invalid_configured_orientation_is_rejected() {
    let config = test_config(std::env::temp_dir().as_path()).with_orientation(9);
    assert!(matches!(
        PyramidBuilder::new(config),
        Err(BuildError::Geometry(GeometryError::InvalidOrientation(9)))
    ));
}

// =============================================================================
// Pixel Mapping
// =============================================================================

#[test]
fn test_every_orientation_maps_every_pixel() {
    let scratch = tempfile::tempdir().unwrap();
    // Odd size so the last band and column are partial
    let (sw, sh) = (48, 40);
    let data = create_test_rgb_jpeg(sw, sh, 90);

    let identity = build_in_chunks(test_config(scratch.path()).with_orientation(1), &data, 500);
    let (_, _, stored) = assemble_level(&identity, 0);

    for orientation in ALL_ORIENTATIONS {
        let config = test_config(scratch.path()).with_orientation(orientation.code());
        let image = build_in_chunks(config, &data, 500);
        let (width, height, display) = assemble_level(&image, 0);
        assert_eq!((width, height), orientation.display_size(sw, sh));

        for dy in 0..height {
            for dx in 0..width {
                let (x, y) = orientation.to_stored(dx, dy, sw, sh);
                assert_eq!(
                    pixel_at(&display, width, dx, dy),
                    pixel_at(&stored, sw, x, y),
                    "orientation {orientation}, display ({dx}, {dy})"
                );
            }
        }
    }
}

#[test]
fn test_inverse_round_trip() {
    let (width, height) = (7, 5);
    for orientation in ALL_ORIENTATIONS {
        let (dw, dh) = orientation.display_size(width, height);
        let inverse = orientation.inverse();
        assert_eq!(inverse.display_size(dw, dh), (width, height));

        for y in 0..height {
            for x in 0..width {
                let (dx, dy) = orientation.to_display(x, y, width, height);
                assert!(dx < dw && dy < dh);
                assert_eq!(orientation.to_stored(dx, dy, width, height), (x, y));
                assert_eq!(
                    inverse.to_display(dx, dy, dw, dh),
                    (x, y),
                    "orientation {orientation}"
                );
            }
        }
    }
}
