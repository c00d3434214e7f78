//! Pedestrian movement model.
//!
//! Piecewise-linear motion with tick-driven re-projection: a plan stores a
//! velocity and an optional target, and every self-addressed Tick asks the
//! model to advance the location and emit the corresponding Move. Stale
//! ticks are discarded through the `serialno` – replanning advances it, so
//! ticks scheduled under an older plan no longer match.

use crate::location::Location;
use crate::operation::{OpKind, Operation};
use crate::types::Vec3;
use log::debug;

/// Floor for self-tick scheduling, so a plan ending millimetres away cannot
/// starve the scheduler with sub-millisecond ticks.
pub const MIN_TICK_SECONDS: f64 = 0.1;

/// One re-projection step: the advanced location and the Move describing it.
#[derive(Debug, Clone)]
pub struct MoveStep {
    pub location: Location,
    pub op: Operation,
}

#[derive(Debug, Clone, Default)]
pub struct Pedestrian {
    /// Monotone plan counter; ticks carrying an older value are stale.
    pub serialno: u64,
    pub target_location: Option<Vec3>,
    pub velocity: Vec3,
    /// World time of the last projection.
    last_updated: f64,
}

impl Pedestrian {
    pub fn new() -> Self {
        Self::default()
    }

    /// Abandon the current plan. Advances the serialno, which invalidates
    /// every tick scheduled under the old plan.
    pub fn reset(&mut self, now: f64) {
        self.serialno += 1;
        self.target_location = None;
        self.velocity = Vec3::zero();
        self.last_updated = now;
    }

    /// A tick argument with `serialno < self.serialno` belongs to an
    /// abandoned plan. Equal serialnos are current.
    pub fn is_stale(&self, tick_serialno: u64) -> bool {
        tick_serialno < self.serialno
    }

    /// Advance from `basis` to `now` under the current plan.
    ///
    /// Returns `None` when there is nothing to do (no velocity). Otherwise
    /// produces the advanced location and a self-addressed Move carrying
    /// pos, velocity and mode. Arrival at the target zeroes the velocity
    /// and switches the mode to "standing".
    ///
    /// The caller supplies the basis location explicitly so two moves
    /// generated in the same tick can be coalesced: the second projection
    /// starts from the first one's output rather than from live state.
    pub fn gen_move_operation(
        &mut self,
        entity_id: &str,
        basis: &Location,
        now: f64,
    ) -> Option<MoveStep> {
        if self.velocity.is_zero() {
            return None;
        }
        let dt = (now - self.last_updated).max(0.0);
        self.last_updated = now;

        let mut location = basis.clone();
        let travelled = self.velocity.scale(dt);
        let arrival = self
            .target_location
            .filter(|target| basis.pos.distance(target) <= travelled.mag());

        let mode;
        if let Some(target) = arrival {
            debug!("{} reached target {}", entity_id, target);
            location.pos = target;
            location.velocity = Vec3::zero();
            self.velocity = Vec3::zero();
            self.target_location = None;
            mode = "standing";
        } else {
            location.pos = basis.pos + travelled;
            location.velocity = self.velocity;
            mode = "walking";
        }

        let mut record = serde_json::Map::new();
        record.insert("id".into(), serde_json::Value::String(entity_id.into()));
        location.add_to_message(&mut record);
        record.insert("mode".into(), serde_json::Value::String(mode.into()));

        let op = Operation::new(OpKind::Move)
            .from(entity_id)
            .to(entity_id)
            .arg(serde_json::Value::Object(record));
        Some(MoveStep { location, op })
    }

    /// Emit a Move that only updates facing, for an actor that has stopped.
    pub fn gen_face_operation(&self, entity_id: &str, loc: &Location) -> Option<Operation> {
        if loc.face.is_zero() {
            return None;
        }
        Some(
            Operation::new(OpKind::Move)
                .from(entity_id)
                .to(entity_id)
                .arg(serde_json::json!({"id": entity_id, "face": loc.face.to_value()})),
        )
    }

    /// Seconds until the next re-projection is worth doing.
    ///
    /// With a target this is the ETA at the planned speed; without one the
    /// plan re-projects every `basic_tick`. Never below
    /// [`MIN_TICK_SECONDS`].
    pub fn get_tick_addition(&self, from_pos: &Vec3, basic_tick: f64) -> f64 {
        let speed = self.velocity.mag();
        let addition = match self.target_location {
            Some(target) if speed > 0.0 => from_pos.distance(&target) / speed,
            _ => basic_tick,
        };
        addition.max(MIN_TICK_SECONDS)
    }
}
