//! Entity factory.
//!
//! Maps ruleset type names to default property records and builds entities
//! with fresh ids. The ruleset file format itself lives outside the core;
//! whoever parses it populates the factory through [`EntityFactory::install_type`].

use crate::character::{make_character, make_creator};
use crate::entity::Entity;
use log::warn;
use serde_json::Value;
use std::collections::HashMap;

/// Which construction path a type uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    Thing,
    Character,
    Creator,
}

#[derive(Debug, Clone)]
pub struct TypeRecord {
    pub kind: TypeKind,
    pub defaults: serde_json::Map<String, Value>,
}

pub struct EntityFactory {
    counter: u64,
    types: HashMap<String, TypeRecord>,
}

impl EntityFactory {
    pub fn new() -> Self {
        let mut types = HashMap::new();
        for (name, kind) in [
            ("thing", TypeKind::Thing),
            ("character", TypeKind::Character),
            ("creator", TypeKind::Creator),
        ] {
            types.insert(
                name.to_string(),
                TypeRecord {
                    kind,
                    defaults: serde_json::Map::new(),
                },
            );
        }
        Self { counter: 0, types }
    }

    pub fn install_type(&mut self, name: impl Into<String>, record: TypeRecord) {
        self.types.insert(name.into(), record);
    }

    pub fn knows_type(&self, name: &str) -> bool {
        self.types.contains_key(name)
    }

    /// Build a new entity of `type_name`, applying type defaults and then
    /// the creation arguments. Unknown types fall back to plain things.
    pub fn new_entity(
        &mut self,
        type_name: &str,
        args: &serde_json::Map<String, Value>,
    ) -> Entity {
        self.counter += 1;
        let id = format!("{}_{}", type_name, self.counter);
        let mut ent = Entity::new(id, self.counter, type_name);

        let record = match self.types.get(type_name) {
            Some(record) => record.clone(),
            None => {
                warn!("unknown entity type '{}', building a thing", type_name);
                TypeRecord {
                    kind: TypeKind::Thing,
                    defaults: serde_json::Map::new(),
                }
            }
        };
        match record.kind {
            TypeKind::Thing => {}
            TypeKind::Character => make_character(&mut ent),
            TypeKind::Creator => make_creator(&mut ent),
        }
        for (name, value) in record.defaults.iter().chain(args.iter()) {
            if name == "id" {
                continue;
            }
            ent.set_attr(name, value.clone());
        }
        // Creation writes are not observable changes.
        ent.flags = 0;
        ent.seq = 0;
        ent
    }
}

impl Default for EntityFactory {
    fn default() -> Self {
        Self::new()
    }
}
