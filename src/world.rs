//! World router – the registry and delivery mechanism for entities.
//!
//! A single owning registry maps ids to entities; containment edges are
//! stored as ids on both sides and always mutated in pairs. Dispatch
//! checks the destination entity out of the registry for the duration of
//! its handlers, so handlers see `&mut Entity` and `&mut World` without
//! aliasing the entity they run on.
//!
//! All delivery is queue-driven: handlers never call into other entities,
//! they emit operations that re-enter the queue.

use crate::character::{
    character_external_operation, character_operation, creator_external_operation,
};
use crate::config::ServerConfig;
use crate::entity::{base_operation, Entity, ENTITY_DIRTY};
use crate::operation::{OpKind, OpVec, Operation};
use crate::scheduler::Scheduler;
use log::{debug, info, warn};
use std::collections::{HashMap, VecDeque};

/// Ruleset type of the world root.
pub const WORLD_TYPE: &str = "world";

pub struct World {
    entities: HashMap<String, Entity>,
    root_id: String,
    queue: VecDeque<Operation>,
    scheduler: Scheduler,
    /// Operations bound for external minds, keyed by connection id.
    outbound: Vec<(String, Operation)>,
    /// Entities condemned by a handler, destroyed after it returns.
    graveyard: Vec<String>,
    serial: u64,
    time: f64,
    config: ServerConfig,
}

impl World {
    pub fn new(config: ServerConfig) -> Self {
        let root = Entity::new("world_0", 0, WORLD_TYPE);
        let root_id = root.id.clone();
        let mut entities = HashMap::new();
        entities.insert(root_id.clone(), root);
        Self {
            entities,
            root_id,
            queue: VecDeque::new(),
            scheduler: Scheduler::new(),
            outbound: Vec::new(),
            graveyard: Vec::new(),
            serial: 0,
            time: 0.0,
            config,
        }
    }

    pub fn root_id(&self) -> &str {
        &self.root_id
    }

    pub fn time(&self) -> f64 {
        self.time
    }

    pub fn config(&self) -> &ServerConfig {
        &self.config
    }

    /// Advance the logical clock. Time never runs backwards.
    pub fn advance(&mut self, now: f64) {
        if now > self.time {
            self.time = now;
        }
    }

    // -----------------------------------------------------------------------
    // Registry
    // -----------------------------------------------------------------------

    /// Register an entity and wire its containment edge. Both sides of the
    /// edge change together: the child's `ref_id` is already set, the
    /// parent's `contains` gains the child here.
    pub fn add_object(&mut self, ent: Entity) -> String {
        let id = ent.id.clone();
        if let Some(parent) = ent.location.ref_id.clone() {
            match self.entities.get_mut(&parent) {
                Some(p) => {
                    p.contains.insert(id.clone());
                }
                None => warn!("{} added under unknown parent {}", id, parent),
            }
        }
        debug!("added {} ({})", id, ent.etype);
        self.entities.insert(id.clone(), ent);

        // Everyone nearby sees the new arrival.
        self.enqueue(
            Operation::new(OpKind::Appearance)
                .from(id.clone())
                .arg(serde_json::json!({"id": id})),
        );
        id
    }

    pub fn get_object(&self, id: &str) -> Option<&Entity> {
        self.entities.get(id)
    }

    pub fn get_object_mut(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id)
    }

    pub fn len(&self) -> usize {
        self.entities.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Move an entity under a new parent, mutating both edges together.
    pub fn set_parent(&mut self, child_id: &str, parent_id: &str) {
        if let Some(old) = self
            .entities
            .get(child_id)
            .and_then(|c| c.location.ref_id.clone())
        {
            if let Some(old_parent) = self.entities.get_mut(&old) {
                old_parent.contains.remove(child_id);
            }
        }
        if let Some(parent) = self.entities.get_mut(parent_id) {
            parent.contains.insert(child_id.to_string());
        }
        if let Some(child) = self.entities.get_mut(child_id) {
            child.location.ref_id = Some(parent_id.to_string());
        }
    }

    /// Condemn an entity from inside one of its own handlers.
    pub fn schedule_destroy(&mut self, id: &str) {
        self.graveyard.push(id.to_string());
    }

    /// Unregister an entity: detach it from its parent, re-parent its
    /// children into the grandparent frame, and return the corpse.
    ///
    /// Destroying the world root (or any entity without a parent) is an
    /// invariant violation; dying loudly beats corrupting the containment
    /// index.
    pub fn destroy_entity(&mut self, id: &str) -> Option<Entity> {
        let mut ent = self.entities.remove(id)?;
        let parent_id = ent
            .location
            .ref_id
            .clone()
            .unwrap_or_else(|| panic!("destroy of rootless entity {}", id));

        let children: Vec<String> = ent.contains.iter().cloned().collect();
        for child_id in &children {
            if let Some(child) = self.entities.get_mut(child_id) {
                ent.location.child_to_parent_frame(&mut child.location);
                child.seq += 1;
            }
        }
        if let Some(parent) = self.entities.get_mut(&parent_id) {
            parent.contains.remove(id);
            parent.contains.extend(children);
        }
        ent.contains.clear();
        ent.destroyed = true;
        ent.seq += 1;
        info!("destroyed {}", id);

        self.enqueue(
            Operation::new(OpKind::Disappearance)
                .from(parent_id)
                .arg(serde_json::json!({"id": id})),
        );
        Some(ent)
    }

    // -----------------------------------------------------------------------
    // Queueing
    // -----------------------------------------------------------------------

    /// Accept an operation into the world. Unstamped operations get the
    /// next serialno; positive `future_seconds` park in the scheduler.
    pub fn enqueue(&mut self, mut op: Operation) {
        if op.serialno == 0 {
            self.serial += 1;
            op.serialno = self.serial;
        }
        if op.future_seconds > 0.0 {
            self.scheduler.schedule(self.time + op.future_seconds, op);
        } else {
            self.queue.push_back(op);
        }
    }

    pub fn dequeue(&mut self) -> Option<Operation> {
        self.queue.pop_front()
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    /// Move every scheduler entry due at the current time into the queue.
    pub fn take_due(&mut self) -> usize {
        let due = self.scheduler.due(self.time);
        let n = due.len();
        for op in due {
            self.queue.push_back(op);
        }
        n
    }

    pub fn next_deadline(&self) -> Option<f64> {
        self.scheduler.next_deadline()
    }

    /// Queue an operation for an external mind's connection.
    pub fn send_external(&mut self, connection_id: &str, op: Operation) {
        self.outbound.push((connection_id.to_string(), op));
    }

    pub fn take_outbound(&mut self) -> Vec<(String, Operation)> {
        std::mem::take(&mut self.outbound)
    }

    // -----------------------------------------------------------------------
    // Delivery
    // -----------------------------------------------------------------------

    /// Route one operation: broadcasts fan out to perceivers, everything
    /// else goes to its destination's external-operation entry.
    pub fn deliver(&mut self, op: Operation) {
        if op.to.is_empty() && op.kind.is_perception() {
            self.broadcast(op);
            return;
        }
        let id = if op.to.is_empty() {
            self.root_id.clone()
        } else {
            op.to.clone()
        };
        self.external_operation(&id, op);
    }

    /// Fan a perception out to every perceptive entity in the containment
    /// subtree rooted at the sender's parent.
    fn broadcast(&mut self, op: Operation) {
        let root = self
            .entities
            .get(&op.from)
            .and_then(|e| e.location.ref_id.clone())
            .unwrap_or_else(|| self.root_id.clone());
        let perceivers = self.perceivers_under(&root);
        debug!(
            "broadcast {} from {} to {} perceivers",
            op.kind,
            op.from,
            perceivers.len()
        );
        for id in perceivers {
            let copy = op.clone().to(id.clone());
            self.external_operation(&id, copy);
        }
    }

    /// Perceptive entity ids in the subtree rooted at `root`, root included.
    pub fn perceivers_under(&self, root: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = vec![root.to_string()];
        while let Some(id) = stack.pop() {
            let Some(ent) = self.entities.get(&id) else {
                continue;
            };
            if ent.perceptive {
                out.push(id.clone());
            }
            stack.extend(ent.contains.iter().cloned());
        }
        out
    }

    /// Dispatch to the destination's operation entry and re-enter every
    /// reply, each stamped with `refno = op.serialno` when the incoming
    /// operation was serialised.
    pub fn external_operation(&mut self, id: &str, op: Operation) {
        let Some(mut ent) = self.entities.remove(id) else {
            debug!("dropping {} for unknown entity {}", op.kind, id);
            return;
        };
        let mut res = OpVec::new();
        if ent.is_character() {
            character_operation(&mut ent, self, &op, &mut res);
        } else {
            base_operation(&mut ent, self, &op, &mut res);
        }

        // Property writes during the handlers schedule a broadcast Update.
        if ent.flags & ENTITY_DIRTY != 0 && op.kind != OpKind::Update {
            ent.flags &= !ENTITY_DIRTY;
            res.push(
                Operation::new(OpKind::Update)
                    .from(ent.id.clone())
                    .to(ent.id.clone()),
            );
        }

        self.entities.insert(id.to_string(), ent);
        self.flush_graveyard();

        for mut reply in res {
            if op.serialno != 0 {
                reply.refno = op.serialno;
            }
            self.enqueue(reply);
        }
    }

    /// Entry point for operations arriving from a possessing client.
    /// Characters run their mind-to-body pipe; anything else takes the
    /// ordinary external-operation path.
    pub fn mind_input(&mut self, id: &str, op: Operation) {
        let Some(mut ent) = self.entities.remove(id) else {
            debug!("mind input for unknown entity {}", id);
            return;
        };
        match &ent.character {
            Some(c) if c.is_admin => creator_external_operation(&mut ent, self, &op),
            Some(_) => character_external_operation(&mut ent, self, &op),
            None => {
                self.entities.insert(id.to_string(), ent);
                self.external_operation(id, op);
                return;
            }
        }
        self.entities.insert(id.to_string(), ent);
        self.flush_graveyard();
    }

    fn flush_graveyard(&mut self) {
        while let Some(id) = self.graveyard.pop() {
            self.destroy_entity(&id);
        }
    }
}
