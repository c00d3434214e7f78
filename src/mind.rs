//! Minds – behaviour sources for characters.
//!
//! A character routes its perceptions to at most one of two minds:
//!
//! - the **local mind** (an in-process [`Mind`] implementation, the NPC
//!   fallback), consulted when no client is attached or `autom` is on;
//! - the **external mind** (a link to a remote client via its connection),
//!   whose replies arrive asynchronously through the gateway.

use crate::operation::{OpKind, OpVec, Operation};
use log::debug;

// ---------------------------------------------------------------------------
// Local minds
// ---------------------------------------------------------------------------

pub trait Mind: Send {
    /// React to a perception; returned operations re-enter the character's
    /// mind-to-body pipe.
    fn message(&mut self, op: &Operation) -> OpVec;
}

/// Default NPC behaviour: orient on setup, glance at whatever appears.
///
/// Deliberately minimal – richer behaviour belongs to scripts.
pub struct NpcMind {
    entity_id: String,
}

impl NpcMind {
    pub fn new(entity_id: impl Into<String>) -> Self {
        Self {
            entity_id: entity_id.into(),
        }
    }
}

impl Mind for NpcMind {
    fn message(&mut self, op: &Operation) -> OpVec {
        match op.kind {
            OpKind::Setup => {
                debug!("npc mind {} waking up", self.entity_id);
                // An empty destination resolves to the world root.
                vec![Operation::new(OpKind::Look)]
            }
            OpKind::Appearance => {
                let Some(id) = op.arg_map().and_then(|m| m.get("id")).and_then(|v| v.as_str())
                else {
                    return OpVec::new();
                };
                vec![Operation::new(OpKind::Look).to(id)]
            }
            _ => OpVec::new(),
        }
    }
}

/// Build a local mind by class name. Per-type ruleset overrides resolve to
/// a class here; everything unrecognised gets the NPC default.
pub fn new_mind(class: &str, entity_id: &str) -> Box<dyn Mind> {
    match class {
        "npc" => Box::new(NpcMind::new(entity_id)),
        other => {
            debug!("unknown mind class '{}', using npc for {}", other, entity_id);
            Box::new(NpcMind::new(entity_id))
        }
    }
}

// ---------------------------------------------------------------------------
// External mind link
// ---------------------------------------------------------------------------

/// Link from a possessed character to the connection speaking for it.
///
/// Perceptions routed here are queued for the connection's wire; replies
/// come back later as ordinary external operations, so the link itself
/// never produces operations synchronously.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalMind {
    pub connection_id: String,
    pub entity_id: String,
}

impl ExternalMind {
    pub fn new(connection_id: impl Into<String>, entity_id: impl Into<String>) -> Self {
        Self {
            connection_id: connection_id.into(),
            entity_id: entity_id.into(),
        }
    }
}
