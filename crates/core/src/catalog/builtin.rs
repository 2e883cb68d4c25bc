//! The production variation set.

use super::{ArtifactType, CatalogBuilder, Derivation, Fit, MimeCategory, VariationDefinition};

const JPEG: &str = "image/jpeg";
const PNG: &str = "image/png";
const MP4: &str = "video/mp4";

fn contain(name: &str, mime: &str, priority: i32, width: u32, height: u32) -> VariationDefinition {
    VariationDefinition::new(
        name,
        mime,
        priority,
        Derivation::Resize {
            width,
            height,
            fit: Fit::Contain,
        },
    )
}

fn square(name: &str, priority: i32, size: u32, source: &str) -> VariationDefinition {
    VariationDefinition::new(name, JPEG, priority, Derivation::Square { size }).with_source(source)
}

/// Playfield images are shown both as portrait panels and as square tiles.
/// Fullscreen playfields are stored rotated for widescreen display.
fn playfield_images(portrait: bool) -> Vec<VariationDefinition> {
    let (w, h) = if portrait { (393, 700) } else { (700, 393) };
    let mut variations = vec![
        contain("medium", JPEG, 10, w, h),
        contain("medium-2x", JPEG, 15, w * 2, h * 2),
        contain("full", JPEG, 30, 1920, 1920),
        square("square", 40, 120, "medium"),
        square("square-2x", 45, 240, "medium-2x"),
    ];
    if portrait {
        variations.push(VariationDefinition::new(
            "landscape",
            JPEG,
            50,
            Derivation::Rotate {
                degrees: 90,
                width: 700,
                height: 393,
            },
        ));
    }
    variations
}

/// Playfield videos produce a still frame first; image thumbnails chain off it.
fn playfield_videos(portrait: bool) -> Vec<VariationDefinition> {
    let (w, h) = if portrait { (393, 700) } else { (700, 393) };
    vec![
        VariationDefinition::new("still", JPEG, 5, Derivation::Screenshot { at_secs: 0.0 }),
        contain("medium", JPEG, 10, w, h).with_source("still"),
        contain("medium-2x", JPEG, 15, w * 2, h * 2).with_source("still"),
        square("square", 40, 120, "medium"),
        square("square-2x", 45, 240, "medium-2x"),
        VariationDefinition::new(
            "small",
            MP4,
            60,
            Derivation::Transcode {
                max_width: w,
                max_height: h,
            },
        ),
    ]
}

pub(super) fn declare(builder: CatalogBuilder) -> CatalogBuilder {
    builder
        .entry(
            ArtifactType::Backglass,
            MimeCategory::Image,
            vec![
                contain("medium", JPEG, 10, 364, 291),
                contain("medium-2x", JPEG, 15, 728, 582),
                contain("small", JPEG, 20, 253, 202).with_source("medium-2x"),
                contain("small-2x", JPEG, 25, 506, 404).with_source("medium-2x"),
                contain("full", JPEG, 30, 1280, 1024),
            ],
        )
        .entry(ArtifactType::PlayfieldFs, MimeCategory::Image, playfield_images(true))
        .entry(ArtifactType::PlayfieldWs, MimeCategory::Image, playfield_images(false))
        .entry(ArtifactType::PlayfieldFs, MimeCategory::Video, playfield_videos(true))
        .entry(ArtifactType::PlayfieldWs, MimeCategory::Video, playfield_videos(false))
        .entry(
            ArtifactType::Logo,
            MimeCategory::Image,
            vec![
                contain("medium", PNG, 10, 300, 136),
                contain("medium-2x", PNG, 15, 600, 272),
            ],
        )
        .empty(ArtifactType::ReleaseTable, MimeCategory::Table)
        .empty(ArtifactType::Rom, MimeCategory::Archive)
        .empty(ArtifactType::Directb2s, MimeCategory::Table)
}
