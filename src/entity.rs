//! Entity – the base routed object.
//!
//! An entity is identity + properties + location + containment edges plus a
//! table of per-kind operation handlers. Base handlers are no-ops; thing
//! handlers (look, move, set, delete, eat, nourish) give physical objects
//! their default behaviour, and characters extend the table further.
//!
//! Handlers run with the entity temporarily checked out of the world
//! registry, so they get `&mut Entity` and `&mut World` without aliasing.

use crate::character::CharacterState;
use crate::location::Location;
use crate::operation::{OpKind, OpVec, Operation};
use crate::property::PropertyStore;
use crate::script::{run_script, Script};
use crate::types::Vec3;
use crate::world::World;
use log::{debug, warn};
use serde_json::Value;
use std::collections::{BTreeSet, HashMap};

/// Property-store writes set this; the world clears it after broadcasting
/// the resulting sight.
pub const ENTITY_DIRTY: u32 = 1 << 0;

// ---------------------------------------------------------------------------
// Dispatcher
// ---------------------------------------------------------------------------

/// Per-kind operation handler. Replies are appended to the final argument.
pub type Handler = fn(&mut Entity, &mut World, &Operation, &mut OpVec);

/// Kind-to-handler table. Cloned per entity so handlers can be installed
/// dynamically on one entity without affecting its type siblings.
#[derive(Clone, Default)]
pub struct Dispatcher {
    handlers: HashMap<OpKind, Handler>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, kind: OpKind, handler: Handler) {
        self.handlers.insert(kind, handler);
    }

    pub fn get(&self, kind: &OpKind) -> Option<Handler> {
        self.handlers.get(kind).copied()
    }
}

// ---------------------------------------------------------------------------
// Entity
// ---------------------------------------------------------------------------

pub struct Entity {
    /// Stable string id, unique within a run.
    pub id: String,
    /// Parallel monotone integer id.
    pub int_id: u64,
    /// Ruleset type name.
    pub etype: String,
    pub properties: PropertyStore,
    pub location: Location,
    /// Ids of directly contained entities.
    pub contains: BTreeSet<String>,
    pub destroyed: bool,
    /// Sequence stamp, bumped on every observable change.
    pub seq: u64,
    pub flags: u32,
    /// Receives broadcast perception ops when true.
    pub perceptive: bool,
    pub script: Option<Box<dyn Script>>,
    pub handlers: Dispatcher,
    /// Present when this entity is a character.
    pub character: Option<Box<CharacterState>>,
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("etype", &self.etype)
            .field("seq", &self.seq)
            .field("destroyed", &self.destroyed)
            .finish()
    }
}

impl Entity {
    pub fn new(id: impl Into<String>, int_id: u64, etype: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            int_id,
            etype: etype.into(),
            properties: PropertyStore::new(),
            location: Location::default(),
            contains: BTreeSet::new(),
            destroyed: false,
            seq: 0,
            flags: 0,
            perceptive: false,
            script: None,
            handlers: thing_dispatcher(),
            character: None,
        }
    }

    pub fn is_character(&self) -> bool {
        self.character.is_some()
    }

    /// Upsert an attribute, routing signal properties to their typed slots.
    ///
    /// `bbox`, `pos`, `velocity` and `face` write through to the Location;
    /// character state slots (`status`, `food`, `weight`, `drunkness`,
    /// `sex`) write through when the entity is a character.
    pub fn set_attr(&mut self, name: &str, value: Value) {
        let routed = match name {
            "bbox" => set_vec3(&mut self.location.bbox, &value),
            "bmedian" => set_vec3(&mut self.location.bmedian, &value),
            "pos" => set_vec3(&mut self.location.pos, &value),
            "velocity" => set_vec3(&mut self.location.velocity, &value),
            "face" => set_vec3(&mut self.location.face, &value),
            _ => self
                .character
                .as_mut()
                .map(|c| c.set_attr(name, &value))
                .unwrap_or(false),
        };
        if !routed {
            self.properties.set(name, value);
        }
        self.flags |= ENTITY_DIRTY;
        self.seq += 1;
    }

    /// Read an attribute, consulting typed slots before the property bag.
    pub fn get_attr(&self, name: &str) -> Option<Value> {
        match name {
            "bbox" => Some(self.location.bbox.to_value()),
            "pos" => Some(self.location.pos.to_value()),
            "velocity" => Some(self.location.velocity.to_value()),
            "face" => Some(self.location.face.to_value()),
            _ => self
                .character
                .as_ref()
                .and_then(|c| c.get_attr(name))
                .or_else(|| self.properties.get(name).cloned()),
        }
    }

    /// Serialise the entity into an argument record.
    pub fn add_to_message(&self, map: &mut serde_json::Map<String, Value>) {
        self.properties.add_to_message(map);
        if let Some(character) = &self.character {
            character.add_to_message(map);
        }
        map.insert("stamp".into(), Value::from(self.seq));
        map.insert("parents".into(), serde_json::json!([self.etype]));
        self.location.add_to_message(map);
        map.insert("objtype".into(), Value::String("obj".into()));
    }

    /// Full record including the id, as used in Sight and Info args.
    pub fn record(&self) -> Value {
        let mut map = serde_json::Map::new();
        map.insert("id".into(), Value::String(self.id.clone()));
        self.add_to_message(&mut map);
        Value::Object(map)
    }

    pub fn install_handler(&mut self, kind: OpKind, handler: Handler) {
        self.handlers.install(kind, handler);
    }
}

/// Malformed arguments are logged and dropped; the sender only hears
/// about it when its op was serialised.
fn malformed(ent: &Entity, op: &Operation, res: &mut OpVec, what: &str) {
    warn!("{}: {} from {}", ent.id, what, op.from);
    if op.serialno != 0 && !op.from.is_empty() {
        res.push(Operation::error(op, "Malformed argument").to(op.from.clone()));
    }
}

fn set_vec3(slot: &mut Vec3, value: &Value) -> bool {
    match Vec3::from_value(value) {
        Some(v) => {
            *slot = v;
            true
        }
        None => {
            warn!("malformed vector attribute {:?}", value);
            // Consumed (and dropped); do not shadow the slot in the bag.
            true
        }
    }
}

// ---------------------------------------------------------------------------
// Base operation path
// ---------------------------------------------------------------------------

/// Script hook first, then the handler table. Unhandled kinds are no-ops
/// for in-game entities.
pub fn base_operation(ent: &mut Entity, world: &mut World, op: &Operation, res: &mut OpVec) {
    if run_script(ent.script.as_mut(), op, res) {
        return;
    }
    match ent.handlers.get(&op.kind) {
        Some(handler) => handler(ent, world, op, res),
        None => debug!("{} ignores {}", ent.id, op.kind),
    }
}

// ---------------------------------------------------------------------------
// Thing handlers
// ---------------------------------------------------------------------------

/// Default handler table for physical objects.
pub fn thing_dispatcher() -> Dispatcher {
    let mut d = Dispatcher::new();
    d.install(OpKind::Look, look_handler);
    d.install(OpKind::Move, move_handler);
    d.install(OpKind::Set, set_handler);
    d.install(OpKind::Delete, delete_handler);
    d.install(OpKind::Eat, eat_handler);
    d.install(OpKind::Update, update_handler);
    d
}

/// Update → show everyone the entity's current record. The world sends
/// these after property writes mark the entity dirty.
fn update_handler(ent: &mut Entity, _world: &mut World, _op: &Operation, res: &mut OpVec) {
    res.push(
        Operation::new(OpKind::Sight)
            .from(ent.id.clone())
            .arg(ent.record()),
    );
}

/// Look → Sight of this entity, addressed to the looker.
fn look_handler(ent: &mut Entity, _world: &mut World, op: &Operation, res: &mut OpVec) {
    if op.from.is_empty() {
        warn!("anonymous look at {}", ent.id);
        return;
    }
    res.push(
        Operation::new(OpKind::Sight)
            .from(ent.id.clone())
            .to(op.from.clone())
            .arg(ent.record()),
    );
}

/// Move → mutate the location from the argument record, then show everyone.
fn move_handler(ent: &mut Entity, _world: &mut World, op: &Operation, res: &mut OpVec) {
    let Some(arg) = op.arg_map() else {
        malformed(ent, op, res, "move op has no argument");
        return;
    };
    let mut changed = false;
    if let Some(pos) = arg.get("pos").and_then(Vec3::from_value) {
        ent.location.pos = pos;
        changed = true;
    }
    if let Some(velocity) = arg.get("velocity").and_then(Vec3::from_value) {
        ent.location.velocity = velocity;
        changed = true;
    }
    if let Some(face) = arg.get("face").and_then(Vec3::from_value) {
        ent.location.face = face;
        changed = true;
    }
    if let Some(mode) = arg.get("mode") {
        ent.properties.set("mode", mode.clone());
        changed = true;
    }
    if !changed {
        return;
    }
    ent.seq += 1;
    res.push(Operation::wrap(OpKind::Sight, op).from(ent.id.clone()));
}

/// Set → apply attributes to this entity, then show everyone.
fn set_handler(ent: &mut Entity, _world: &mut World, op: &Operation, res: &mut OpVec) {
    let Some(arg) = op.arg_map() else {
        malformed(ent, op, res, "set op has no argument");
        return;
    };
    if let Some(id) = arg.get("id").and_then(|v| v.as_str()) {
        if id != ent.id {
            debug!("{} drops set addressed to {}", ent.id, id);
            return;
        }
    }
    for (name, value) in arg {
        if name == "id" {
            continue;
        }
        ent.set_attr(name, value.clone());
    }
    res.push(Operation::wrap(OpKind::Sight, op).from(ent.id.clone()));
}

/// Delete → hand the entity to the world's graveyard and show everyone.
fn delete_handler(ent: &mut Entity, world: &mut World, op: &Operation, res: &mut OpVec) {
    world.schedule_destroy(&ent.id);
    res.push(Operation::wrap(OpKind::Sight, op).from(ent.id.clone()));
}

/// Eat → this entity is consumed: status collapses, the eater is nourished.
fn eat_handler(ent: &mut Entity, _world: &mut World, op: &Operation, res: &mut OpVec) {
    if op.from.is_empty() {
        warn!("anonymous eat of {}", ent.id);
        return;
    }
    let weight = ent
        .get_attr("weight")
        .and_then(|v| v.as_f64())
        .unwrap_or(0.0);
    res.push(
        Operation::new(OpKind::Set)
            .from(ent.id.clone())
            .to(ent.id.clone())
            .arg(serde_json::json!({"id": ent.id, "status": -1.0})),
    );
    res.push(
        Operation::new(OpKind::Nourish)
            .from(ent.id.clone())
            .to(op.from.clone())
            .arg(serde_json::json!({"id": op.from, "weight": weight})),
    );
}
