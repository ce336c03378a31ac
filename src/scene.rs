//! 3D projection of container contents.
//!
//! The backend resolves every position; this module only re-expresses them for
//! a viewer whose origin sits at the container's center. Boxes are not checked
//! for overlap or feasibility.

use serde::Serialize;
use utoipa::ToSchema;

use crate::model::{ContainerDetails, ReturnPlan, StoredItem};
use crate::types::{BoundingBox, Dimensional, EPSILON_GENERAL, Vec3};

/// Hue step between consecutive items, in degrees.
const HUE_STEP: u32 = 50;

/// One renderable item.
#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct SceneBox {
    pub item_id: String,
    pub name: String,
    /// Start corner in the container frame.
    pub min: Vec3,
    pub size: Vec3,
    /// Box center relative to the container center.
    pub center: Vec3,
    /// HSL hue in degrees.
    pub hue: u32,
    /// `false` when the box reaches past the container walls.
    pub within_container: bool,
}

#[derive(Clone, Debug, PartialEq, Serialize, ToSchema)]
pub struct Scene {
    pub container: Vec3,
    pub boxes: Vec<SceneBox>,
    /// Items left out for lack of a position or a usable extent.
    pub skipped: usize,
}

impl Scene {
    /// Total volume of the projected boxes.
    pub fn occupied_volume(&self) -> f64 {
        self.boxes.iter().map(|b| b.size.volume()).sum()
    }
}

/// Hue assigned to the `index`-th item of a container.
pub fn hue_for(index: usize) -> u32 {
    ((index as u64 * HUE_STEP as u64) % 360) as u32
}

/// Projects a container lookup. Item extents come from the position corners.
pub fn project_container(details: &ContainerDetails) -> Scene {
    project(details.dimensions.dimensions(), &details.items, |item| {
        item.position.map(|position| position.bounding_box())
    })
}

/// Projects a return plan. Extents come from each item's own dimensions,
/// falling back to the position corners when the backend omits them.
pub fn project_return_plan(plan: &ReturnPlan) -> Scene {
    project(plan.container_dimensions.dimensions(), &plan.placed_items, |item| {
        let position = item.position?;
        Some(match item.dimensions {
            Some(dims) => BoundingBox::from_position_and_dims(
                position.start_coordinates.as_vec3(),
                dims.as_vec3(),
            ),
            None => position.bounding_box(),
        })
    })
}

fn project(
    container: Vec3,
    items: &[StoredItem],
    bounds: impl Fn(&StoredItem) -> Option<BoundingBox>,
) -> Scene {
    let half = container.center();
    let mut boxes = Vec::with_capacity(items.len());
    let mut skipped = 0;

    for (index, item) in items.iter().enumerate() {
        let Some(bb) = bounds(item).filter(BoundingBox::is_ordered) else {
            skipped += 1;
            continue;
        };
        boxes.push(SceneBox {
            item_id: item.item_id.clone(),
            name: item.name.clone(),
            min: bb.min,
            size: bb.dimensions(),
            center: bb.center() - half,
            hue: hue_for(index),
            within_container: bb.max.fits_within(&container, EPSILON_GENERAL)
                && bb.min.x >= -EPSILON_GENERAL
                && bb.min.y >= -EPSILON_GENERAL
                && bb.min.z >= -EPSILON_GENERAL,
        });
    }

    Scene {
        container,
        boxes,
        skipped,
    }
}
