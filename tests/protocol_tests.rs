//! Protocol-level unit tests: math, operations, locations, properties.

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};
    use weald_world::location::Location;
    use weald_world::operation::{OpKind, Operation};
    use weald_world::property::PropertyStore;
    use weald_world::types::{Quaternion, Vec3};

    // -----------------------------------------------------------------------
    // Vec3 / Quaternion
    // -----------------------------------------------------------------------

    #[test]
    fn unit_vector_preserves_direction() {
        let v = Vec3::new(3.0, 0.0, 0.0).unit();
        assert_eq!(v, Vec3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn zero_vector_stays_zero_when_normalised() {
        assert!(Vec3::zero().unit().is_zero());
    }

    #[test]
    fn quarter_turn_about_z() {
        // 90 degrees about +z maps +x onto +y.
        let half = std::f64::consts::FRAC_PI_4;
        let q = Quaternion::new(half.cos(), 0.0, 0.0, half.sin());
        let r = q.rotate(&Vec3::new(1.0, 0.0, 0.0));
        assert!((r - Vec3::new(0.0, 1.0, 0.0)).mag() < 1e-9);
    }

    #[test]
    fn vec3_value_round_trip() {
        let v = Vec3::new(1.5, -2.0, 0.25);
        assert_eq!(Vec3::from_value(&v.to_value()), Some(v));
        assert_eq!(Vec3::from_value(&json!([1, 2])), None);
        assert_eq!(Vec3::from_value(&json!("nope")), None);
    }

    // -----------------------------------------------------------------------
    // Operation kinds
    // -----------------------------------------------------------------------

    #[test]
    fn kind_names_round_trip() {
        for name in ["move", "sight", "nourish", "wield", "frobnicate"] {
            assert_eq!(OpKind::from_name(name).name(), name);
        }
    }

    #[test]
    fn other_kind_keeps_its_parent_string() {
        let k = OpKind::from_name("frobnicate");
        assert_eq!(k, OpKind::Other("frobnicate".into()));
        assert_eq!(k.parents()[0], "frobnicate");
    }

    #[test]
    fn perception_chain_ends_at_root() {
        assert_eq!(
            OpKind::Sight.parents(),
            vec!["sight", "perception", "root_operation"]
        );
        assert!(OpKind::Sound.is_perception());
        assert!(!OpKind::Move.is_perception());
    }

    // -----------------------------------------------------------------------
    // Operation wire shape
    // -----------------------------------------------------------------------

    #[test]
    fn wire_round_trip_preserves_header() {
        let mut op = Operation::new(OpKind::Move)
            .from("c1")
            .to("c2")
            .future(1.5)
            .arg(json!({"id": "c1", "pos": [1.0, 2.0, 3.0]}));
        op.serialno = 7;
        let bytes = serde_json::to_string(&op).unwrap();
        let back: Operation = serde_json::from_str(&bytes).unwrap();
        assert_eq!(back.kind, OpKind::Move);
        assert_eq!(back.from, "c1");
        assert_eq!(back.to, "c2");
        assert_eq!(back.serialno, 7);
        assert_eq!(back.refno, 0);
        assert_eq!(back.future_seconds, 1.5);
        assert_eq!(back.arg_map().unwrap()["id"], "c1");
    }

    #[test]
    fn defaults_are_omitted_on_the_wire() {
        let op = Operation::new(OpKind::Look);
        let encoded = serde_json::to_value(&op).unwrap();
        let map = encoded.as_object().unwrap();
        assert_eq!(map.len(), 1, "only the kind should be present: {}", encoded);
        assert_eq!(map["kind"], "look");
    }

    #[test]
    fn error_reply_correlates_serialno() {
        let mut req = Operation::new(OpKind::Talk);
        req.serialno = 42;
        let err = Operation::error(&req, "From is illegal");
        assert_eq!(err.refno, 42);
        assert_eq!(err.args[0], Value::String("From is illegal".into()));
    }

    #[test]
    fn wrapped_operation_round_trips() {
        let inner = Operation::new(OpKind::Set)
            .to("c1")
            .arg(json!({"id": "c1", "status": 0.5}));
        let sight = Operation::wrap(OpKind::Sight, &inner);
        let decoded: Operation = serde_json::from_value(sight.args[0].clone()).unwrap();
        assert_eq!(decoded.kind, OpKind::Set);
        assert_eq!(decoded.arg_map().unwrap()["status"], 0.5);
    }

    // -----------------------------------------------------------------------
    // Location frame transforms
    // -----------------------------------------------------------------------

    #[test]
    fn child_translates_without_orientation() {
        let parent = Location::in_parent("world_0", Vec3::new(10.0, 0.0, 0.0));
        let mut child = Location::in_parent("house_1", Vec3::new(1.0, 2.0, 0.0));
        parent.child_to_parent_frame(&mut child);
        assert_eq!(child.pos, Vec3::new(11.0, 2.0, 0.0));
        assert_eq!(child.ref_id.as_deref(), Some("world_0"));
    }

    #[test]
    fn child_rotates_with_parent_orientation() {
        // Parent rotated 90 degrees about +z: child at +x lands at +y.
        let half = std::f64::consts::FRAC_PI_4;
        let mut parent = Location::in_parent("world_0", Vec3::zero());
        parent.orientation = Some(Quaternion::new(half.cos(), 0.0, 0.0, half.sin()));
        let mut child = Location::in_parent("house_1", Vec3::new(1.0, 0.0, 0.0));
        child.velocity = Vec3::new(1.0, 0.0, 0.0);
        parent.child_to_parent_frame(&mut child);
        assert!((child.pos - Vec3::new(0.0, 1.0, 0.0)).mag() < 1e-9);
        assert!((child.velocity - Vec3::new(0.0, 1.0, 0.0)).mag() < 1e-9);
        assert!(child.orientation.is_some());
    }

    #[test]
    fn invalid_orientation_falls_back_to_identity() {
        let mut parent = Location::in_parent("world_0", Vec3::new(5.0, 0.0, 0.0));
        parent.orientation = Some(Quaternion::new(0.0, 0.0, 0.0, 0.0));
        let mut child = Location::in_parent("house_1", Vec3::new(1.0, 0.0, 0.0));
        parent.child_to_parent_frame(&mut child);
        assert_eq!(child.pos, Vec3::new(6.0, 0.0, 0.0));
        // Velocity and orientation untouched under the identity fallback.
        assert!(child.orientation.is_none());
    }

    #[test]
    fn message_record_includes_frame_fields() {
        let mut loc = Location::in_parent("world_0", Vec3::new(1.0, 2.0, 3.0));
        loc.bbox = Vec3::new(0.25, 0.25, 1.0);
        loc.bmedian = Vec3::new(0.0, 0.0, 1.0);
        let mut map = serde_json::Map::new();
        loc.add_to_message(&mut map);
        assert_eq!(map["loc"], "world_0");
        assert_eq!(map["pos"], json!([1.0, 2.0, 3.0]));
        assert!(map.contains_key("bbox"));
    }

    // -----------------------------------------------------------------------
    // Property store
    // -----------------------------------------------------------------------

    #[test]
    fn set_then_get_is_identity() {
        let mut store = PropertyStore::new();
        for (k, v) in [
            ("name", json!("moose")),
            ("count", json!(3)),
            ("ratio", json!(0.5)),
            ("tags", json!(["a", "b"])),
            ("extra", json!({"k": null})),
        ] {
            store.set(k, v.clone());
            assert_eq!(store.get(k), Some(&v));
        }
    }

    #[test]
    fn set_reports_change_only_on_new_values() {
        let mut store = PropertyStore::new();
        assert!(store.set("mode", json!("standing")));
        assert!(!store.set("mode", json!("standing")));
        assert!(store.set("mode", json!("walking")));
    }
}
