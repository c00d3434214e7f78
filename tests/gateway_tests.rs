//! Gateway tests: accounts, possession, error replies, the pump.

#[cfg(test)]
mod tests {
    use serde_json::json;
    use weald_world::account::Account;
    use weald_world::config::ServerConfig;
    use weald_world::operation::{OpKind, Operation};
    use weald_world::persistence::MemoryStore;
    use weald_world::server::{decode_frame, Server};
    use weald_world::types::Vec3;

    fn server_with_account() -> Server {
        let account = Account::new("a", "p");
        let store = MemoryStore::new().with_account(account);
        Server::new("test-server", ServerConfig::default(), Box::new(store))
    }

    fn login_op(serialno: u64) -> Operation {
        let mut op = Operation::new(OpKind::Login).arg(json!({"id": "a", "password": "p"}));
        op.serialno = serialno;
        op
    }

    // -----------------------------------------------------------------------
    // Login
    // -----------------------------------------------------------------------

    #[test]
    fn login_with_good_credentials_replies_info() {
        let mut server = server_with_account();
        let conn = server.add_connection();
        server.external_message(&conn, login_op(5));
        let out = server.take_outbox(&conn);
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].kind, OpKind::Info);
        assert_eq!(out[0].refno, 5);
        assert_eq!(out[0].arg_map().unwrap()["id"], "a");
    }

    #[test]
    fn login_adds_the_accounts_characters_to_the_dictionary() {
        let mut account = Account::new("a", "p");
        account.characters.push("char_1".into());
        let store = MemoryStore::new().with_account(account);
        let mut server = Server::new("test-server", ServerConfig::default(), Box::new(store));
        let conn = server.add_connection();
        server.external_message(&conn, login_op(1));
        let connection = server.connection(&conn).unwrap();
        assert!(connection.speaks_for("a"));
        assert!(connection.speaks_for("char_1"));
        assert!(!connection.speaks_for("char_2"));
    }

    #[test]
    fn login_with_a_bad_password_is_an_error() {
        let mut server = server_with_account();
        let conn = server.add_connection();
        let mut op = Operation::new(OpKind::Login).arg(json!({"id": "a", "password": "wrong"}));
        op.serialno = 6;
        server.external_message(&conn, op);
        let out = server.take_outbox(&conn);
        assert_eq!(out[0].kind, OpKind::Error);
        assert_eq!(out[0].refno, 6);
        assert_eq!(out[0].args[0], json!("Login is invalid"));
    }

    // -----------------------------------------------------------------------
    // Account creation
    // -----------------------------------------------------------------------

    #[test]
    fn create_persists_and_logs_in() {
        let mut server = server_with_account();
        let conn = server.add_connection();
        let op = Operation::new(OpKind::Create).arg(json!({"id": "b", "password": "s"}));
        server.external_message(&conn, op);
        let out = server.take_outbox(&conn);
        assert_eq!(out[0].kind, OpKind::Info);
        assert!(server.connection(&conn).unwrap().speaks_for("b"));
    }

    #[test]
    fn create_refuses_duplicates() {
        let mut server = server_with_account();
        let conn = server.add_connection();
        let op = Operation::new(OpKind::Create).arg(json!({"id": "a", "password": "s"}));
        server.external_message(&conn, op);
        let out = server.take_outbox(&conn);
        assert_eq!(out[0].kind, OpKind::Error);
        assert_eq!(out[0].args[0], json!("Account creation is invalid"));
    }

    #[test]
    fn create_is_refused_on_restricted_servers() {
        let account = Account::new("a", "p");
        let store = MemoryStore::new().with_account(account);
        let config = ServerConfig {
            restricted: true,
            ..Default::default()
        };
        let mut server = Server::new("test-server", config, Box::new(store));
        let conn = server.add_connection();
        let op = Operation::new(OpKind::Create).arg(json!({"id": "b", "password": "s"}));
        server.external_message(&conn, op);
        let out = server.take_outbox(&conn);
        assert_eq!(out[0].kind, OpKind::Error);
        assert_eq!(
            out[0].args[0],
            json!("Account creation on this server is restricted")
        );
    }

    // -----------------------------------------------------------------------
    // From validation
    // -----------------------------------------------------------------------

    #[test]
    fn unknown_from_is_illegal() {
        let mut server = server_with_account();
        let conn = server.add_connection();
        let mut op = Operation::new(OpKind::Talk)
            .from("nobody")
            .arg(json!({"say": "boo"}));
        op.serialno = 44;
        server.external_message(&conn, op);
        let out = server.take_outbox(&conn);
        assert_eq!(out[0].kind, OpKind::Error);
        assert_eq!(out[0].refno, 44);
        assert_eq!(out[0].args[0], json!("From is illegal"));
    }

    #[test]
    fn unknown_account_operations_are_errors() {
        let mut server = server_with_account();
        let conn = server.add_connection();
        let mut op = Operation::new(OpKind::Fire);
        op.serialno = 9;
        server.external_message(&conn, op);
        let out = server.take_outbox(&conn);
        assert_eq!(out[0].kind, OpKind::Error);
        assert_eq!(out[0].args[0], json!("Unknown operation"));
    }

    // -----------------------------------------------------------------------
    // Possession
    // -----------------------------------------------------------------------

    /// Build a logged-in server with one spawned character owned by "a".
    fn possessed_setup() -> (Server, String, String) {
        let mut server = Server::new(
            "test-server",
            ServerConfig::default(),
            Box::new(MemoryStore::new()),
        );
        let root = server.world().root_id().to_string();
        let char_id = server.spawn("character", &root, Vec3::zero(), serde_json::Map::new());
        let mut account = Account::new("a", "p");
        account.characters.push(char_id.clone());
        server.accounts_mut().insert("a".into(), account);
        // Swallow the arrival broadcast.
        server.pump(0.0);

        let conn = server.add_connection();
        server.external_message(&conn, login_op(1));
        server.take_outbox(&conn);
        (server, char_id, conn)
    }

    #[test]
    fn speaking_as_an_unpossessed_character_attaches_an_external_mind() {
        let (mut server, char_id, conn) = possessed_setup();
        let mut look = Operation::new(OpKind::Look).from(char_id.clone());
        look.serialno = 9;
        server.external_message(&conn, look);

        // The possession confirmation comes first.
        let out = server.take_outbox(&conn);
        assert_eq!(out[0].kind, OpKind::Info);
        assert_eq!(out[0].refno, 9);
        assert_eq!(out[0].arg_map().unwrap()["id"], char_id);

        // The look routed on into the world: pumping it produces the
        // sight, which lands back on this connection.
        server.pump(0.1);
        let out = server.take_outbox(&conn);
        let sight = out.iter().find(|o| o.kind == OpKind::Sight).unwrap();
        assert_eq!(sight.refno, 9);
        let ext = server
            .world()
            .get_object(&char_id)
            .unwrap()
            .character
            .as_ref()
            .unwrap()
            .external_mind
            .clone();
        assert_eq!(ext.unwrap().connection_id, conn);
    }

    #[test]
    fn dropping_the_connection_releases_the_character() {
        let (mut server, char_id, conn) = possessed_setup();
        server.external_message(&conn, Operation::new(OpKind::Look).from(char_id.clone()));
        server.pump(0.1);
        server.drop_connection(&conn);

        let character = server.world().get_object(&char_id).unwrap();
        let c = character.character.as_ref().unwrap();
        assert!(c.external_mind.is_none());
        assert!(c.autom, "the local mind takes over");
    }

    #[test]
    fn logout_clears_the_dictionary() {
        let (mut server, char_id, conn) = possessed_setup();
        let op = Operation::new(OpKind::Logout).arg(json!({"id": "a"}));
        server.external_message(&conn, op);
        let out = server.take_outbox(&conn);
        assert_eq!(out[0].kind, OpKind::Info);
        assert!(!server.connection(&conn).unwrap().speaks_for(&char_id));
        assert!(!server.connection(&conn).unwrap().speaks_for("a"));
    }

    // -----------------------------------------------------------------------
    // Get & frames
    // -----------------------------------------------------------------------

    #[test]
    fn get_describes_the_server() {
        let mut server = server_with_account();
        let conn = server.add_connection();
        let mut op = Operation::new(OpKind::Get);
        op.serialno = 3;
        server.external_message(&conn, op);
        let frames = server.take_frames(&conn);
        assert_eq!(frames.len(), 1);
        let reply = decode_frame(&frames[0][..frames[0].len() - 1]).unwrap();
        assert_eq!(reply.kind, OpKind::Info);
        assert_eq!(reply.refno, 3);
        assert_eq!(reply.arg_map().unwrap()["id"], "test-server");
    }

    // -----------------------------------------------------------------------
    // Pump
    // -----------------------------------------------------------------------

    #[test]
    fn pump_runs_due_timers_after_input() {
        let mut server = server_with_account();
        let root = server.world().root_id().to_string();
        let char_id = server.spawn("character", &root, Vec3::zero(), serde_json::Map::new());
        server
            .world_mut()
            .enqueue(Operation::new(OpKind::Setup).to(char_id.clone()));
        server.pump(0.0);

        // Setup self-scheduled the first metabolism tick; advancing past
        // the scheduler deadline must keep the world alive.
        let deadline = server.next_deadline();
        assert!(deadline.is_some());
        server.pump(deadline.unwrap() + 0.1);
        assert!(
            server.next_deadline().is_some(),
            "the metabolism tick rescheduled itself"
        );
    }

    #[test]
    fn pump_smoke_under_an_async_runtime() {
        tokio_test::block_on(async {
            let mut server = server_with_account();
            for i in 0..10 {
                server.pump(i as f64 * 0.1);
            }
            let record = server.record();
            assert_eq!(record["cycles"], 10);
            assert_eq!(record["id"], "test-server");
        });
    }
}
