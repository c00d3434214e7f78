//! Connection gateway.
//!
//! A connection is the trust boundary between a remote client and the
//! world: it owns the set of ids the client may speak as, handles the
//! account-level operations (Login, Create, Logout, Get), and performs the
//! possession handoff when a client starts speaking as one of its
//! characters.
//!
//! ## Routing rules (inbound)
//!
//! | `from`                  | Effect                                      |
//! |-------------------------|---------------------------------------------|
//! | empty                   | account-level dispatch on this connection   |
//! | in the dictionary       | possession check, then the entity's pipe    |
//! | anything else           | `Error("From is illegal")`                  |

use crate::account::Account;
use crate::mind::ExternalMind;
use crate::operation::{OpKind, OpVec, Operation};
use crate::persistence::AccountStore;
use crate::world::World;
use log::{debug, info, warn};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

/// Everything a connection needs from the server while handling one
/// operation. Borrowed fresh per call; nothing here outlives it.
pub struct Gateway<'a> {
    pub world: &'a mut World,
    pub accounts: &'a mut HashMap<String, Account>,
    pub store: &'a mut dyn AccountStore,
    /// Whether account creation is disabled.
    pub restricted: bool,
    /// Record describing this server, for Get replies.
    pub server_record: Value,
}

pub struct Connection {
    pub id: String,
    /// Ids this connection may speak as: its account plus the account's
    /// characters.
    objects: HashSet<String>,
    /// Id of the logged-in account, once there is one.
    account: Option<String>,
    outbox: OpVec,
}

impl Connection {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            objects: HashSet::new(),
            account: None,
            outbox: OpVec::new(),
        }
    }

    pub fn speaks_for(&self, id: &str) -> bool {
        self.objects.contains(id)
    }

    pub fn account_id(&self) -> Option<&str> {
        self.account.as_deref()
    }

    /// Drain queued outbound operations.
    pub fn take_outbox(&mut self) -> OpVec {
        std::mem::take(&mut self.outbox)
    }

    pub fn push_outbound(&mut self, op: Operation) {
        self.outbox.push(op);
    }

    // -----------------------------------------------------------------------
    // Inbound dispatch
    // -----------------------------------------------------------------------

    pub fn operation(&mut self, op: Operation, gw: &mut Gateway<'_>) {
        if op.from.is_empty() {
            self.local_operation(op, gw);
        } else if self.objects.contains(&op.from) {
            self.forward_operation(op, gw);
        } else {
            debug!("{} rejects op from {}", self.id, op.from);
            self.reply(Operation::error(&op, "From is illegal"));
        }
    }

    /// Account-level traffic carries no `from`.
    fn local_operation(&mut self, op: Operation, gw: &mut Gateway<'_>) {
        match op.kind {
            OpKind::Login => self.login(op, gw),
            OpKind::Create => self.create(op, gw),
            OpKind::Logout => self.logout(op, gw),
            OpKind::Get => {
                let reply = Operation::new(OpKind::Info)
                    .refno(op.serialno)
                    .arg(gw.server_record.clone());
                self.reply(reply);
            }
            _ => self.reply(Operation::error(&op, "Unknown operation")),
        }
    }

    /// Traffic from an owned id flows into the world, re-possessing the
    /// character first when its external mind seat is empty.
    fn forward_operation(&mut self, op: Operation, gw: &mut Gateway<'_>) {
        let from = op.from.clone();

        let Some(ent) = gw.world.get_object(&from) else {
            // Owned but not in the world: the account itself.
            if self.account.as_deref() == Some(from.as_str()) && op.kind == OpKind::Logout {
                self.finish_logout(&op);
            } else {
                debug!("{} drops {} for offline object {}", self.id, op.kind, from);
            }
            return;
        };

        let needs_possession = ent
            .character
            .as_ref()
            .map(|c| c.external_mind.is_none())
            .unwrap_or(false);
        if needs_possession {
            info!("re-connecting character {} to connection {}", from, self.id);
            let record = ent.record();
            if let Some(character) = gw
                .world
                .get_object_mut(&from)
                .and_then(|e| e.character.as_mut())
            {
                character.external_mind = Some(ExternalMind::new(self.id.clone(), from.clone()));
                character.autom = false;
            }
            self.reply(
                Operation::new(OpKind::Info)
                    .refno(op.serialno)
                    .arg(record),
            );
        }

        gw.world.mind_input(&from, op);
    }

    // -----------------------------------------------------------------------
    // Account operations
    // -----------------------------------------------------------------------

    fn login(&mut self, op: Operation, gw: &mut Gateway<'_>) {
        let Some((account_id, password)) = credentials(&op) else {
            self.reply(Operation::error(&op, "Login is invalid"));
            return;
        };

        if !gw.accounts.contains_key(&account_id) {
            if let Some(stored) = gw.store.get_account(&account_id) {
                gw.accounts.insert(account_id.clone(), stored);
            }
        }
        let Some(account) = gw.accounts.get(&account_id) else {
            self.reply(Operation::error(&op, "Login is invalid"));
            return;
        };
        if account_id.is_empty() || !account.check_password(&password) {
            self.reply(Operation::error(&op, "Login is invalid"));
            return;
        }

        self.objects.insert(account.id.clone());
        for character in &account.characters {
            self.objects.insert(character.clone());
        }
        self.account = Some(account.id.clone());
        debug!("good login for {}", account_id);
        let reply = Operation::new(OpKind::Info)
            .refno(op.serialno)
            .arg(account.record());
        self.reply(reply);
    }

    fn create(&mut self, op: Operation, gw: &mut Gateway<'_>) {
        if gw.restricted {
            self.reply(Operation::error(
                &op,
                "Account creation on this server is restricted",
            ));
            return;
        }
        let Some((account_id, password)) = credentials(&op) else {
            self.reply(Operation::error(&op, "Account creation is invalid"));
            return;
        };
        if account_id.is_empty()
            || password.is_empty()
            || gw.accounts.contains_key(&account_id)
            || gw.store.find_account(&account_id)
        {
            self.reply(Operation::error(&op, "Account creation is invalid"));
            return;
        }

        let account = Account::new(account_id.clone(), &password);
        if let Err(e) = gw.store.put_account(&account) {
            warn!("failed to persist account {}: {}", account_id, e);
            self.reply(Operation::error(&op, "Account creation is invalid"));
            return;
        }
        let record = account.record();
        gw.accounts.insert(account_id.clone(), account);
        self.objects.insert(account_id.clone());
        self.account = Some(account_id.clone());
        debug!("good create for {}", account_id);
        self.reply(Operation::new(OpKind::Info).refno(op.serialno).arg(record));
    }

    /// An anonymous Logout is stamped with the account id and re-entered.
    fn logout(&mut self, op: Operation, gw: &mut Gateway<'_>) {
        let Some(account_id) = op
            .arg_map()
            .and_then(|m| m.get("id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .or_else(|| self.account.clone())
        else {
            debug!("{} logout without an account", self.id);
            return;
        };
        if !gw.accounts.contains_key(&account_id) {
            return;
        }
        let mut restamped = op;
        debug!("logout without from, using {}", account_id);
        restamped.from = account_id;
        self.operation(restamped, gw);
    }

    fn finish_logout(&mut self, op: &Operation) {
        info!("{} logs out {}", self.id, op.from);
        self.objects.clear();
        self.account = None;
        let reply = Operation::new(OpKind::Info)
            .refno(op.serialno)
            .arg(serde_json::json!({"id": op.from}));
        self.reply(reply);
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// Release every possessed character: clear the external mind link and
    /// hand control back to the local mind.
    pub fn destroy(&mut self, world: &mut World) {
        for id in self.objects.iter() {
            let Some(character) = world
                .get_object_mut(id)
                .and_then(|e| e.character.as_mut())
            else {
                continue;
            };
            let ours = character
                .external_mind
                .as_ref()
                .map(|m| m.connection_id == self.id)
                .unwrap_or(false);
            if ours {
                debug!("releasing {} from {}", id, self.id);
                character.external_mind = None;
                character.autom = true;
            }
        }
        self.objects.clear();
        self.account = None;
    }

    fn reply(&mut self, op: Operation) {
        self.outbox.push(op);
    }
}

/// Extract `(id, password)` from an account operation's first argument.
fn credentials(op: &Operation) -> Option<(String, String)> {
    let arg = op.arg_map()?;
    let id = arg.get("id")?.as_str()?.to_string();
    let password = arg.get("password")?.as_str()?.to_string();
    Some((id, password))
}
