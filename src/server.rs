//! The server pump.
//!
//! Single-threaded, cooperative, event-driven. Each pump cycle:
//!
//! 1. drain the world input queue – every operation dispatches into its
//!    destination entity, whose replies re-enter the queue;
//! 2. move scheduler entries due at the current time into the queue and
//!    drain again (input always precedes timers within a cycle);
//! 3. route operations bound for external minds into their connections'
//!    outboxes, ready to be framed onto the wire.
//!
//! Nothing here blocks. The binary drives `pump` from a timer task and
//! owns the transport; the core never touches a socket.

use crate::account::Account;
use crate::config::ServerConfig;
use crate::connection::{Connection, Gateway};
use crate::factory::EntityFactory;
use crate::operation::{OpVec, Operation};
use crate::persistence::AccountStore;
use crate::types::Vec3;
use crate::world::World;
use bytes::Bytes;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::HashMap;

pub struct Server {
    pub name: String,
    world: World,
    factory: EntityFactory,
    connections: HashMap<String, Connection>,
    accounts: HashMap<String, Account>,
    store: Box<dyn AccountStore>,
    conn_counter: u64,
    cycles: u64,
}

impl Server {
    pub fn new(
        name: impl Into<String>,
        config: ServerConfig,
        store: Box<dyn AccountStore>,
    ) -> Self {
        Self {
            name: name.into(),
            world: World::new(config),
            factory: EntityFactory::new(),
            connections: HashMap::new(),
            accounts: HashMap::new(),
            store,
            conn_counter: 0,
            cycles: 0,
        }
    }

    pub fn world(&self) -> &World {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    pub fn factory_mut(&mut self) -> &mut EntityFactory {
        &mut self.factory
    }

    pub fn accounts_mut(&mut self) -> &mut HashMap<String, Account> {
        &mut self.accounts
    }

    /// Build an entity of `type_name` under `parent` and register it.
    pub fn spawn(
        &mut self,
        type_name: &str,
        parent: &str,
        pos: Vec3,
        args: serde_json::Map<String, Value>,
    ) -> String {
        let mut ent = self.factory.new_entity(type_name, &args);
        let omnipresent = ent.character.as_ref().map(|c| c.is_admin).unwrap_or(false);
        if !omnipresent {
            ent.location.ref_id = Some(parent.to_string());
        }
        ent.location.pos = pos;
        self.world.add_object(ent)
    }

    // -----------------------------------------------------------------------
    // Connections
    // -----------------------------------------------------------------------

    pub fn add_connection(&mut self) -> String {
        self.conn_counter += 1;
        let id = format!("conn_{}", self.conn_counter);
        info!("connection {} opened", id);
        self.connections.insert(id.clone(), Connection::new(id.clone()));
        id
    }

    /// Tear a connection down, releasing every character it possessed.
    pub fn drop_connection(&mut self, id: &str) {
        let Some(mut conn) = self.connections.remove(id) else {
            warn!("dropping unknown connection {}", id);
            return;
        };
        info!("connection {} closed", id);
        conn.destroy(&mut self.world);
    }

    pub fn connection(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Inject a decoded client operation through its connection.
    pub fn external_message(&mut self, conn_id: &str, op: Operation) {
        let Some(mut conn) = self.connections.remove(conn_id) else {
            warn!("operation from unknown connection {}", conn_id);
            return;
        };
        let restricted = self.world.config().restricted;
        let server_record = self.record();
        let mut gw = Gateway {
            world: &mut self.world,
            accounts: &mut self.accounts,
            store: self.store.as_mut(),
            restricted,
            server_record,
        };
        conn.operation(op, &mut gw);
        self.connections.insert(conn_id.to_string(), conn);
    }

    // -----------------------------------------------------------------------
    // Pump
    // -----------------------------------------------------------------------

    /// Run one pump cycle at logical time `now` (seconds).
    pub fn pump(&mut self, now: f64) {
        self.cycles += 1;
        self.world.advance(now);

        let mut guard = 0usize;
        while let Some(op) = self.world.dequeue() {
            self.world.deliver(op);
            guard += 1;
            if guard > 100_000 {
                warn!("pump cycle aborted: operation storm");
                break;
            }
        }

        if self.world.take_due() > 0 {
            debug!("timer drain at t={:.3}", now);
            while let Some(op) = self.world.dequeue() {
                self.world.deliver(op);
            }
        }

        for (conn_id, op) in self.world.take_outbound() {
            match self.connections.get_mut(&conn_id) {
                Some(conn) => conn.push_outbound(op),
                None => debug!("outbound for closed connection {}", conn_id),
            }
        }
    }

    /// Earliest scheduler deadline, for the caller's sleep computation.
    pub fn next_deadline(&self) -> Option<f64> {
        self.world.next_deadline()
    }

    /// Drain a connection's outbox as wire frames (one JSON object per
    /// newline-terminated frame).
    pub fn take_frames(&mut self, conn_id: &str) -> Vec<Bytes> {
        let Some(conn) = self.connections.get_mut(conn_id) else {
            return Vec::new();
        };
        conn.take_outbox()
            .into_iter()
            .filter_map(|op| encode_frame(&op).ok())
            .collect()
    }

    /// Drain a connection's outbox as operations (test and embedding use).
    pub fn take_outbox(&mut self, conn_id: &str) -> OpVec {
        self.connections
            .get_mut(conn_id)
            .map(|c| c.take_outbox())
            .unwrap_or_default()
    }

    pub fn record(&self) -> Value {
        serde_json::json!({
            "id": self.name,
            "objtype": "server",
            "clients": self.connections.len(),
            "entities": self.world.len(),
            "cycles": self.cycles,
        })
    }
}

/// Encode one operation as a newline-delimited JSON frame.
pub fn encode_frame(op: &Operation) -> Result<Bytes, serde_json::Error> {
    let mut buf = serde_json::to_vec(op)?;
    buf.push(b'\n');
    Ok(Bytes::from(buf))
}

/// Decode a single frame back into an operation.
pub fn decode_frame(frame: &[u8]) -> Result<Operation, serde_json::Error> {
    serde_json::from_slice(frame)
}
