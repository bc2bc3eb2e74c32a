//! Per-pass draw list and its ordering
//!
//! Opaque primitives come first, ascending by sort key with ties broken front
//! to back. Translucent primitives follow, ascending by sort key with ties
//! broken back to front.

use std::cmp::Ordering;

use crate::ecs::{ComponentSid, EntityUid};

use super::material::MaterialUid;
use super::mesh::PrimitiveUid;

/// One primitive of one mesh entity, ready to be drawn
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrawItem {
    /// Primitive to draw
    pub primitive: PrimitiveUid,
    /// Material the primitive uses
    pub material: Option<MaterialUid>,
    /// Entity the primitive belongs to
    pub entity: EntityUid,
    /// Scene graph node providing the world matrix (instance id in shaders)
    pub scene_graph_sid: ComponentSid,
    /// Mesh renderer that owns the draw
    pub mesh_renderer_sid: ComponentSid,
    /// Composite sort key
    pub sort_key: u32,
    /// Distance in front of the camera
    pub view_depth: f32,
    /// Drawn in the translucent block
    pub translucent: bool,
    /// Rejected by CPU culling
    pub culled: bool,
}

fn compare(a: &DrawItem, b: &DrawItem) -> Ordering {
    a.translucent
        .cmp(&b.translucent)
        .then(a.sort_key.cmp(&b.sort_key))
        .then_with(|| {
            if a.translucent {
                b.view_depth.total_cmp(&a.view_depth)
            } else {
                a.view_depth.total_cmp(&b.view_depth)
            }
        })
}

/// Order a draw list in place
pub fn sort_draw_items(items: &mut [DrawItem]) {
    items.sort_by(compare);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(primitive: u32, sort_key: u32, depth: f32, translucent: bool) -> DrawItem {
        DrawItem {
            primitive: PrimitiveUid(primitive),
            material: None,
            entity: EntityUid(primitive),
            scene_graph_sid: ComponentSid(primitive),
            mesh_renderer_sid: ComponentSid(primitive),
            sort_key,
            view_depth: depth,
            translucent,
            culled: false,
        }
    }

    #[test]
    fn test_opaque_before_translucent() {
        let mut items = vec![item(0, 0, 1.0, true), item(1, 5, 1.0, false)];
        sort_draw_items(&mut items);
        assert_eq!(items[0].primitive, PrimitiveUid(1));
    }

    #[test]
    fn test_tie_breaks_by_depth() {
        let mut items = vec![
            item(0, 1, 9.0, false),
            item(1, 1, 2.0, false),
            item(2, 0, 50.0, false),
            item(3, 1, 2.0, true),
            item(4, 1, 9.0, true),
        ];
        sort_draw_items(&mut items);
        let order: Vec<u32> = items.iter().map(|i| i.primitive.0).collect();
        // key first; opaque near to far, translucent far to near
        assert_eq!(order, vec![2, 1, 0, 4, 3]);
    }
}
