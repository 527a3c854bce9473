//! Mapping instance frames back to object ids.

use std::collections::{BTreeMap, BTreeSet};

use super::base_camera::SensorFrame;
use crate::scene::world::{IdColorMap, ObjectId};

pub const BACKGROUND: [u8; 3] = [0, 0, 0];

/// Every distinct 8-bit color in `frame`.
pub fn distinct_colors(frame: &SensorFrame) -> BTreeSet<[u8; 3]> {
    let mut colors = BTreeSet::new();
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            colors.insert(frame.pixel_rgb8(x, y));
        }
    }
    colors
}

/// Pixel counts per object, background and unrecognised color.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InstanceCounts {
    pub objects: BTreeMap<ObjectId, usize>,
    pub background: usize,
    pub unknown: BTreeMap<[u8; 3], usize>,
}

impl InstanceCounts {
    /// True when every pixel is either background or a known object.
    pub fn is_clean(&self) -> bool {
        self.unknown.is_empty()
    }
}

pub fn decode_instances(frame: &SensorFrame, id_colors: &IdColorMap) -> InstanceCounts {
    let mut counts = InstanceCounts::default();
    for y in 0..frame.height() {
        for x in 0..frame.width() {
            let color = frame.pixel_rgb8(x, y);
            if let Some(id) = id_colors.id_for_color(color) {
                *counts.objects.entry(id.clone()).or_default() += 1;
            } else if color == BACKGROUND {
                counts.background += 1;
            } else {
                *counts.unknown.entry(color).or_default() += 1;
            }
        }
    }
    counts
}
