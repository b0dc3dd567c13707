use serde::Serialize;

use crate::layout::Rect;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PlacementMode {
    /// The image exactly covers its box, tolerating a small distortion.
    Stretch,
    /// The image keeps its aspect ratio and is centered in its box.
    Fit,
}

/// Where an image lands inside its box. Offsets are relative to the top-left corner of the box.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Placement {
    pub draw_width: f32,
    pub draw_height: f32,
    pub offset_x: f32,
    pub offset_y: f32,
    pub mode: PlacementMode,
}

/// How far, in percent, stretching an image of the given aspect ratio into the box would distort it.
pub fn distortion_percent(image_aspect_ratio: f32, box_aspect_ratio: f32) -> f32 {
    (1.0 - image_aspect_ratio / box_aspect_ratio).abs() * 100.0
}

/// Stretches the image over the whole box when the distortion stays within the threshold,
/// otherwise shrinks it uniformly to fit and centers it on the unconstrained axis.
pub fn place(
    image_width: f32,
    image_height: f32,
    target_box: &Rect,
    distortion_threshold_percent: f32,
) -> Placement {
    let stretched = Placement {
        draw_width: target_box.width,
        draw_height: target_box.height,
        offset_x: 0.0,
        offset_y: 0.0,
        mode: PlacementMode::Stretch,
    };
    if image_width <= 0.0 || image_height <= 0.0 || target_box.width <= 0.0 || target_box.height <= 0.0
    {
        return stretched;
    }

    let distortion = distortion_percent(image_width / image_height, target_box.aspect_ratio());
    if distortion <= distortion_threshold_percent {
        return stretched;
    }

    let scale = (target_box.width / image_width).min(target_box.height / image_height);
    let (draw_width, draw_height) = (image_width * scale, image_height * scale);
    Placement {
        draw_width,
        draw_height,
        offset_x: (target_box.width - draw_width) / 2.0,
        offset_y: (target_box.height - draw_height) / 2.0,
        mode: PlacementMode::Fit,
    }
}
