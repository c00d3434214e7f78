//! Location – the position of an entity relative to its containment parent.

use crate::types::{Quaternion, Vec3};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Position of an entity within its parent's frame.
///
/// `ref_id` names the containment parent; `None` makes the entity
/// *omnipresent* (no spatial parent – used by admin characters).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Location {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ref_id: Option<String>,
    pub pos: Vec3,
    pub velocity: Vec3,
    /// Unit facing vector, or zero when the entity has no facing.
    pub face: Vec3,
    pub bbox: Vec3,
    pub bmedian: Vec3,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub orientation: Option<Quaternion>,
}

impl Default for Location {
    fn default() -> Self {
        Self {
            ref_id: None,
            pos: Vec3::zero(),
            velocity: Vec3::zero(),
            face: Vec3::zero(),
            bbox: Vec3::zero(),
            bmedian: Vec3::zero(),
            orientation: None,
        }
    }
}

impl Location {
    pub fn in_parent(ref_id: impl Into<String>, pos: Vec3) -> Self {
        Self {
            ref_id: Some(ref_id.into()),
            pos,
            ..Default::default()
        }
    }

    /// Orientation when valid, identity otherwise.
    fn effective_orientation(&self) -> Quaternion {
        match self.orientation {
            Some(q) if q.is_valid() => q,
            _ => Quaternion::identity(),
        }
    }

    /// Re-express a child location in this location's parent frame.
    ///
    /// Used when this entity is destroyed: each child is rotated and
    /// translated by the destroyed entity's pose so its coordinates stay
    /// meaningful under the grandparent. Velocity is rotated; orientations
    /// compose.
    pub fn child_to_parent_frame(&self, child: &mut Location) {
        let rot = self.effective_orientation();
        child.pos = rot.rotate(&child.pos) + self.pos;
        if let Some(q) = self.orientation.filter(|q| q.is_valid()) {
            child.velocity = q.rotate(&child.velocity);
            child.orientation = Some(match child.orientation {
                Some(co) => q.multiply(&co),
                None => q,
            });
        }
        child.ref_id = self.ref_id.clone();
    }

    /// Serialise the location into an argument record.
    pub fn add_to_message(&self, map: &mut serde_json::Map<String, Value>) {
        if let Some(ref r) = self.ref_id {
            map.insert("loc".into(), Value::String(r.clone()));
        }
        map.insert("pos".into(), self.pos.to_value());
        map.insert("velocity".into(), self.velocity.to_value());
        if !self.face.is_zero() {
            map.insert("face".into(), self.face.to_value());
        }
        if !self.bbox.is_zero() {
            map.insert("bbox".into(), self.bbox.to_value());
            map.insert("bmedian".into(), self.bmedian.to_value());
        }
        if let Some(q) = self.orientation {
            map.insert(
                "orientation".into(),
                serde_json::json!([q.w, q.x, q.y, q.z]),
            );
        }
    }
}
