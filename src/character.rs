//! Character – an entity that can host a mind and metabolises.
//!
//! A character routes operations through three layers:
//!
//! ```text
//! world ──world2body──▶ body handlers (physical effects)
//! world ──world2mind──▶ send_mind ──▶ local or external mind
//! mind  ──mind2body───▶ outbound operations (intent), re-entering the world
//! ```
//!
//! The split keeps perception separate from effect: a Move mutates the
//! body whether or not anyone is watching, while the mind only ever sees
//! the filtered percept stream.

use crate::config::MetabolismRates;
use crate::entity::{base_operation, thing_dispatcher, Dispatcher, Entity};
use crate::mind::{new_mind, ExternalMind, Mind};
use crate::movement::Pedestrian;
use crate::operation::{OpKind, OpVec, Operation};
use crate::types::Vec3;
use crate::world::World;
use log::{debug, warn};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Character state
// ---------------------------------------------------------------------------

pub struct CharacterState {
    pub movement: Pedestrian,
    /// Local mind drives the body when no external mind is attached.
    pub autom: bool,
    pub mind: Option<Box<dyn Mind>>,
    pub external_mind: Option<ExternalMind>,
    pub drunkness: f64,
    pub sex: String,
    pub status: f64,
    pub food: f64,
    pub weight: f64,
    pub max_weight: f64,
    /// Admin characters bypass the local mind and may act as any entity.
    pub is_admin: bool,
}

impl Default for CharacterState {
    fn default() -> Self {
        Self {
            movement: Pedestrian::new(),
            autom: true,
            mind: None,
            external_mind: None,
            drunkness: 0.0,
            sex: "female".into(),
            status: 1.0,
            food: 0.0,
            weight: 60.0,
            max_weight: 100.0,
            is_admin: false,
        }
    }
}

impl CharacterState {
    /// Write through character slots; returns false for unknown names so
    /// the caller can fall back to the property bag.
    pub fn set_attr(&mut self, name: &str, value: &Value) -> bool {
        match name {
            "drunkness" => set_f64(&mut self.drunkness, value),
            "status" => set_f64(&mut self.status, value),
            "food" => set_f64(&mut self.food, value),
            "weight" => set_f64(&mut self.weight, value),
            "max_weight" => set_f64(&mut self.max_weight, value),
            "sex" => {
                if let Some(s) = value.as_str() {
                    self.sex = s.to_string();
                }
                true
            }
            _ => false,
        }
    }

    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "drunkness" => Some(Value::from(self.drunkness)),
            "status" => Some(Value::from(self.status)),
            "food" => Some(Value::from(self.food)),
            "weight" => Some(Value::from(self.weight)),
            "max_weight" => Some(Value::from(self.max_weight)),
            "sex" => Some(Value::String(self.sex.clone())),
            _ => None,
        }
    }

    pub fn add_to_message(&self, map: &mut serde_json::Map<String, Value>) {
        map.insert("weight".into(), Value::from(self.weight));
        map.insert("sex".into(), Value::String(self.sex.clone()));
        map.insert("status".into(), Value::from(self.status));
        map.insert("food".into(), Value::from(self.food));
    }

    /// Convert stored energy, weight and food into a Set describing the
    /// new nutrition state. Status is clamped into [0, 2] on output.
    pub fn metabolise(&mut self, id: &str, amount: f64, cfg: &MetabolismRates) -> Operation {
        let mut ent = serde_json::Map::new();
        ent.insert("id".into(), Value::String(id.into()));
        if self.status > 1.5 + cfg.energy_loss && self.weight < self.max_weight {
            self.status -= cfg.energy_loss;
            ent.insert("weight".into(), Value::from(self.weight + cfg.weight_gain));
        }
        let energy_used = cfg.energy_consumption * amount;
        let new_status = if self.status <= energy_used && self.weight > cfg.weight_consumption {
            ent.insert(
                "weight".into(),
                Value::from(self.weight - cfg.weight_consumption),
            );
            self.status - energy_used + cfg.energy_gain
        } else {
            self.status - energy_used
        };
        ent.insert("status".into(), Value::from(new_status.clamp(0.0, 2.0)));

        Operation::new(OpKind::Set)
            .from(id)
            .to(id)
            .arg(Value::Object(ent))
    }
}

fn set_f64(slot: &mut f64, value: &Value) -> bool {
    if let Some(n) = value.as_f64() {
        *slot = n;
    }
    true
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Promote a plain entity to a character.
pub fn make_character(ent: &mut Entity) {
    ent.character = Some(Box::new(CharacterState::default()));
    ent.location.bbox = Vec3::new(0.25, 0.25, 1.0);
    ent.location.bmedian = Vec3::new(0.0, 0.0, 1.0);
    ent.handlers = character_dispatcher();
}

/// Promote a plain entity to an omnipresent admin character.
pub fn make_creator(ent: &mut Entity) {
    make_character(ent);
    if let Some(character) = ent.character.as_mut() {
        character.is_admin = true;
    }
    ent.location.ref_id = None;
    ent.location.bbox = Vec3::zero();
}

/// Character handler table: thing handlers plus the character kinds.
pub fn character_dispatcher() -> Dispatcher {
    let mut d = thing_dispatcher();
    d.install(OpKind::Setup, setup_handler);
    d.install(OpKind::Tick, tick_handler);
    d.install(OpKind::Talk, talk_handler);
    d.install(OpKind::Nourish, nourish_handler);
    d
}

// ---------------------------------------------------------------------------
// Body handlers (world2body side)
// ---------------------------------------------------------------------------

/// Setup boots the character: instantiate the local mind, orient with a
/// round of Looks, and start the metabolism tick.
fn setup_handler(ent: &mut Entity, world: &mut World, op: &Operation, res: &mut OpVec) {
    if op.sub_to.is_some() {
        return;
    }
    let mind_class = world
        .config()
        .mind_class_for(&ent.etype)
        .unwrap_or_else(|| "npc".to_string());
    if let Some(character) = ent.character.as_mut() {
        character.mind = Some(new_mind(&mind_class, &ent.id));
    }

    res.push(
        Operation::new(OpKind::Setup)
            .from(ent.id.clone())
            .to(ent.id.clone())
            .sub_to("mind"),
    );
    res.push(
        Operation::new(OpKind::Look)
            .from(ent.id.clone())
            .to(world.root_id().to_string()),
    );
    if let Some(parent) = ent.location.ref_id.clone() {
        if parent != world.root_id() {
            res.push(Operation::new(OpKind::Look).from(ent.id.clone()).to(parent));
        }
    }
    res.push(
        Operation::new(OpKind::Look)
            .from(ent.id.clone())
            .to(ent.id.clone()),
    );
    res.push(
        Operation::new(OpKind::Tick)
            .from(ent.id.clone())
            .to(ent.id.clone()),
    );
}

/// Tick drives the two time-indexed machines: movement re-projection when
/// the tick carries a movement record, metabolism otherwise.
fn tick_handler(ent: &mut Entity, world: &mut World, op: &Operation, res: &mut OpVec) {
    if op.sub_to.is_some() {
        return;
    }
    let now = world.time();
    let basic_tick = world.config().basic_tick;

    let movement_serialno = op
        .arg_map()
        .and_then(|m| m.get("serialno"))
        .and_then(|v| v.as_u64());
    if let Some(tick_serialno) = movement_serialno {
        let Some(character) = ent.character.as_mut() else {
            return;
        };
        if character.movement.is_stale(tick_serialno) {
            debug!("{} drops stale movement tick {}", ent.id, tick_serialno);
            return;
        }
        if let Some(step) = character
            .movement
            .gen_move_operation(&ent.id, &ent.location, now)
        {
            let addition = character
                .movement
                .get_tick_addition(&step.location.pos, basic_tick);
            let serialno = character.movement.serialno;
            res.push(
                Operation::new(OpKind::Tick)
                    .from(ent.id.clone())
                    .to(ent.id.clone())
                    .future(addition)
                    .arg(serde_json::json!({"name": "move", "serialno": serialno})),
            );
            res.push(step.op);
            return;
        }
        // The plan ran out; fall through to metabolism.
    }

    let rates = world.config().metabolism_rates();
    let Some(character) = ent.character.as_mut() else {
        return;
    };

    // Digest before metabolising, so the status change lands there.
    if character.food >= rates.food_consumption && character.status < 2.0 {
        character.status += rates.food_consumption;
        character.food -= rates.food_consumption;
        let set = Operation::new(OpKind::Set)
            .from(ent.id.clone())
            .to(ent.id.clone())
            .arg(serde_json::json!({"id": ent.id, "food": character.food}));
        res.push(Operation::wrap(OpKind::Sight, &set).from(ent.id.clone()).to(ent.id.clone()));
    }

    res.push(character.metabolise(&ent.id, 1.0, &rates));

    res.push(
        Operation::new(OpKind::Tick)
            .from(ent.id.clone())
            .to(ent.id.clone())
            .future(basic_tick * 30.0),
    );
}

/// Talk → a Sound everyone nearby can hear.
fn talk_handler(ent: &mut Entity, _world: &mut World, op: &Operation, res: &mut OpVec) {
    res.push(Operation::wrap(OpKind::Sound, op).from(ent.id.clone()));
}

/// Nourish → absorb the delivered weight as food.
fn nourish_handler(ent: &mut Entity, _world: &mut World, op: &Operation, res: &mut OpVec) {
    let Some(weight) = op
        .arg_map()
        .and_then(|m| m.get("weight"))
        .and_then(|v| v.as_f64())
    else {
        warn!("nourish op for {} has no weight", ent.id);
        if op.serialno != 0 && !op.from.is_empty() {
            res.push(Operation::error(op, "Malformed argument").to(op.from.clone()));
        }
        return;
    };
    let Some(character) = ent.character.as_mut() else {
        return;
    };
    character.food += weight;
    let set = Operation::new(OpKind::Set)
        .from(ent.id.clone())
        .to(ent.id.clone())
        .arg(serde_json::json!({"id": ent.id, "food": character.food}));
    res.push(
        Operation::wrap(OpKind::Sight, &set)
            .from(ent.id.clone())
            .to(ent.id.clone()),
    );
}

// ---------------------------------------------------------------------------
// The five pipes
// ---------------------------------------------------------------------------

/// world → mind: the perception filter. Returns the percept forwarded to
/// the mind, if any.
pub fn world2mind(ent: &Entity, op: &Operation) -> Option<Operation> {
    let character = ent.character.as_ref()?;
    match op.kind {
        OpKind::Setup | OpKind::Tick => op.sub_to.as_ref().map(|_| op.clone()),
        OpKind::Error => Some(op.clone()),
        OpKind::Sight | OpKind::Sound | OpKind::Touch => {
            if character.drunkness > 1.0 {
                debug!("{} too drunk to perceive {}", ent.id, op.kind);
                None
            } else {
                Some(op.clone())
            }
        }
        _ => None,
    }
}

/// Route a percept to whichever mind is in charge.
///
/// The external mind receives a copy whenever it is attached; its replies
/// arrive later through the gateway. The local mind's replies are used
/// only when `autom` is on. A character whose external link has gone away
/// flips `autom` back on so the local mind takes over.
pub fn send_mind(ent: &mut Entity, world: &mut World, op: &Operation) -> OpVec {
    let Some(character) = ent.character.as_mut() else {
        return OpVec::new();
    };
    if let Some(ext) = &character.external_mind {
        world.send_external(&ext.connection_id, op.clone());
        if !character.autom {
            return OpVec::new();
        }
    } else if !character.autom {
        debug!("turning automatic on for {}", ent.id);
        character.autom = true;
    }
    match character.mind.as_mut() {
        Some(mind) => mind.message(op),
        None => OpVec::new(),
    }
}

/// mind → body: translate intent into outbound operations.
pub fn mind2body(ent: &mut Entity, world: &mut World, op: &Operation) -> OpVec {
    let Some(character) = ent.character.as_ref() else {
        return OpVec::new();
    };
    if character.drunkness > 1.0 {
        debug!("{} too drunk to act", ent.id);
        return OpVec::new();
    }
    let mut newop = op.clone();
    newop.from = ent.id.clone();
    if newop.to.is_empty() && newop.kind != OpKind::Look {
        newop.to = ent.id.clone();
    }
    match newop.kind {
        OpKind::Move => mind_move(ent, world, newop),
        OpKind::Set => vec![mind_set(ent, newop)],
        OpKind::Look => vec![mind_look(ent, world, newop)],
        OpKind::Touch => mind_touch(ent, world, newop),
        OpKind::Setup => {
            newop.to = ent.id.clone();
            newop.sub_to = Some("mind".into());
            vec![newop]
        }
        OpKind::Tick => {
            newop.to = ent.id.clone();
            newop.sub_to = Some("mind".into());
            vec![newop]
        }
        OpKind::Talk | OpKind::Delete | OpKind::Cut | OpKind::Eat => vec![newop],
        _ => OpVec::new(),
    }
}

/// Set intent may address any entity named in its argument record.
fn mind_set(ent: &Entity, mut op: Operation) -> Operation {
    let target = op
        .arg_map()
        .and_then(|m| m.get("id"))
        .and_then(|v| v.as_str())
        .map(str::to_string);
    if let Some(id) = target {
        if id != ent.id {
            op.to = id;
        }
    }
    op
}

/// Look intent marks the character perceptive and resolves its target:
/// the argument id when given, the world root otherwise.
fn mind_look(ent: &mut Entity, world: &World, mut op: Operation) -> Operation {
    ent.perceptive = true;
    if op.to.is_empty() {
        let target = op
            .arg_map()
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        op.to = target.unwrap_or_else(|| world.root_id().to_string());
    }
    op
}

/// Touch resolves its target the same way and sets our mode to touching.
fn mind_touch(ent: &Entity, world: &World, mut op: Operation) -> OpVec {
    if op.to.is_empty() || op.to == ent.id {
        let target = match op.args.first() {
            Some(Value::Object(map)) => map
                .get("id")
                .and_then(|v| v.as_str())
                .map(str::to_string),
            Some(Value::String(id)) => Some(id.clone()),
            _ => None,
        };
        op.to = target.unwrap_or_else(|| world.root_id().to_string());
    }
    let set = Operation::new(OpKind::Set)
        .from(ent.id.clone())
        .to(ent.id.clone())
        .arg(serde_json::json!({"id": ent.id, "mode": "touching"}));
    vec![op, set]
}

/// Move is the rich intent: plan a pedestrian trajectory, clipped to the
/// configured base velocity, and start the tick-driven re-projection.
fn mind_move(ent: &mut Entity, world: &mut World, newop: Operation) -> OpVec {
    let now = world.time();
    let base_velocity = world.config().base_velocity;
    let basic_tick = world.config().basic_tick;

    let Some(arg) = newop.arg_map().cloned() else {
        warn!("move intent from {} has no argument", ent.id);
        return OpVec::new();
    };
    let target_id = arg.get("id").and_then(|v| v.as_str()).unwrap_or("");

    // Whatever the move names must resolve in the registry before any
    // planning happens. This entity is checked out of the registry while
    // its handlers run, so its own id is recognised directly; anything
    // else (including an absent or empty id) must be a live object.
    if target_id != ent.id && world.get_object(target_id).is_none() {
        debug!("move intent for phoney object '{}'", target_id);
        return OpVec::new();
    }

    // Moving something else: forward when it is light enough.
    if target_id != ent.id {
        let obj_weight = world
            .get_object(target_id)
            .and_then(|obj| obj.get_attr("weight"))
            .and_then(|v| v.as_f64())
            .unwrap_or(-1.0);
        let own_weight = ent.character.as_ref().map(|c| c.weight).unwrap_or(0.0);
        if obj_weight < 0.0 || obj_weight > own_weight {
            debug!("{} cannot move {}: too heavy", ent.id, target_id);
            return OpVec::new();
        }
        let mut forwarded = newop;
        forwarded.to = target_id.to_string();
        return vec![forwarded];
    }

    let location_ref = arg.get("loc").and_then(|v| v.as_str());
    let mut location_pos = arg.get("pos").and_then(Vec3::from_value);
    let location_vel = arg.get("velocity").and_then(Vec3::from_value);
    let location_face = arg.get("face").and_then(Vec3::from_value);

    let mut newop = newop;
    if location_pos.is_none() {
        if newop.future_seconds < 0.0 {
            newop.future_seconds = 0.0;
        }
    } else if let Some(pos) = location_pos {
        // Drunk characters miss their mark: uniform jitter in [0, 1) per
        // horizontal axis, scaled by drunkness * 10.
        let character = ent.character.as_ref().expect("move intent on character");
        if character.drunkness > 0.0 {
            let scale = character.drunkness * 10.0;
            location_pos = Some(
                pos + Vec3::new(rand::random::<f64>(), rand::random::<f64>(), 0.0).scale(scale),
            );
        }
    }

    let same_ref = match (location_ref, ent.location.ref_id.as_deref()) {
        (Some(r), Some(own)) => r == own,
        (None, _) => true,
        _ => false,
    };
    if !same_ref || newop.future_seconds < 0.0 {
        // A move out of our frame is not planned, just delivered.
        return vec![newop];
    }

    // An absent velocity walks at the default speed; an explicit zero stops.
    let vel_mag = match location_vel {
        Some(v) => v.mag().min(base_velocity),
        None => base_velocity,
    };
    if let Some(face) = location_face {
        ent.location.face = face;
    }

    if location_pos == Some(ent.location.pos) {
        location_pos = None;
    }
    let direction = match location_pos {
        Some(pos) => pos - ent.location.pos,
        None => match location_vel {
            Some(v) if !v.is_zero() => v,
            _ => ent.location.face,
        },
    };
    let direction = direction.unit();
    if location_face.is_none() {
        ent.location.face = direction;
    }

    let (character, location) = {
        let ent = &mut *ent;
        (
            ent.character.as_mut().expect("move intent on character"),
            &mut ent.location,
        )
    };
    let prior_step = character.movement.gen_move_operation(&newop.from, location, now);
    let basis = prior_step
        .as_ref()
        .map(|s| s.location.clone())
        .unwrap_or_else(|| location.clone());
    character.movement.reset(now);

    if vel_mag == 0.0 || direction.is_zero() {
        debug!("{} movement stopped", newop.from);
        if let Some(mut step) = prior_step {
            if let Some(Value::Object(map)) = step.op.args.first_mut() {
                map.insert("velocity".into(), Vec3::zero().to_value());
                map.insert("mode".into(), Value::String("standing".into()));
            }
            return vec![step.op];
        }
        return match character.movement.gen_face_operation(&newop.from, location) {
            Some(face_op) => vec![face_op],
            None => OpVec::new(),
        };
    }

    character.movement.target_location = location_pos;
    character.movement.velocity = direction.scale(vel_mag);

    let step = character.movement.gen_move_operation(&newop.from, &basis, now);
    let addition = character.movement.get_tick_addition(&location.pos, basic_tick);
    let tick = Operation::new(OpKind::Tick)
        .from(newop.from.clone())
        .to(newop.from.clone())
        .future(addition)
        .arg(serde_json::json!({
            "name": "move",
            "serialno": character.movement.serialno,
        }));

    let move_op = match (step, prior_step) {
        (Some(s), _) => s.op,
        (None, Some(p)) => p.op,
        (None, None) => return vec![tick],
    };
    vec![move_op, tick]
}

// ---------------------------------------------------------------------------
// Composites
// ---------------------------------------------------------------------------

/// The character operation composite: physical effects first, then the
/// percept stream through the mind and back out as intent.
pub fn character_operation(ent: &mut Entity, world: &mut World, op: &Operation, res: &mut OpVec) {
    if ent.character.as_ref().map(|c| c.is_admin).unwrap_or(false) {
        return creator_operation(ent, world, op, res);
    }
    base_operation(ent, world, op, res);
    if let Some(percept) = world2mind(ent, op) {
        let mind_replies = send_mind(ent, world, &percept);
        for reply in mind_replies {
            external_message(ent, world, &reply);
        }
    }
}

/// The mind's output re-enters the world as this character's own traffic.
fn external_message(ent: &mut Entity, world: &mut World, op: &Operation) {
    for out in mind2body(ent, world, op) {
        world.enqueue(out);
    }
}

/// External operations from a possessing client go through mind2body, as
/// if the client were the character's mind.
pub fn character_external_operation(ent: &mut Entity, world: &mut World, op: &Operation) {
    for out in mind2body(ent, world, op) {
        world.enqueue(out);
    }
}

// ---------------------------------------------------------------------------
// Creator
// ---------------------------------------------------------------------------

/// Admin composite: Looks behave normally, Setup surveys the world, and
/// everything else goes straight to the external mind. The local mind is
/// never consulted.
fn creator_operation(ent: &mut Entity, world: &mut World, op: &Operation, res: &mut OpVec) {
    match op.kind {
        OpKind::Look => base_operation(ent, world, op, res),
        OpKind::Setup => {
            world.enqueue(
                Operation::new(OpKind::Look)
                    .from(ent.id.clone())
                    .to(world.root_id().to_string()),
            );
        }
        _ => {
            creator_send_mind(ent, world, op);
        }
    }
}

/// Simplified send_mind: the creator's local mind is irrelevant.
fn creator_send_mind(ent: &mut Entity, world: &mut World, op: &Operation) {
    let Some(character) = ent.character.as_ref() else {
        return;
    };
    if let Some(ext) = &character.external_mind {
        world.send_external(&ext.connection_id, op.clone());
    }
}

/// Admin external operations addressed to the creator itself dispatch
/// directly; anything else is forwarded as coming from the internal
/// `cheat` source, letting the creator act as any entity.
pub fn creator_external_operation(ent: &mut Entity, world: &mut World, op: &Operation) {
    if op.to.is_empty() || op.to == ent.id {
        let mut res = OpVec::new();
        base_operation(ent, world, op, &mut res);
        for mut reply in res {
            if op.serialno != 0 {
                reply.refno = op.serialno;
            }
            world.enqueue(reply);
        }
    } else {
        let mut forwarded = op.clone();
        forwarded.from = "cheat".to_string();
        world.enqueue(forwarded);
    }
}
