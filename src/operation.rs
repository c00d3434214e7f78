//! Operation values – the typed messages routed between entities.
//!
//! Every interaction in the world is an [`Operation`]: a tagged header
//! (kind, from, to, serialno, refno, future_seconds) plus a list of JSON
//! argument records. Operations are the *only* currency of communication;
//! errors travel as `Error` operations, never as Rust errors.
//!
//! ## Design rules
//!
//! 1. Every struct must be `Serialize + Deserialize` with snake_case JSON.
//! 2. Argument records are plain `serde_json::Value` maps – no domain types
//!    leak into the wire shape.
//! 3. Replies carry `refno = request.serialno`; 0 means "unset" for both.
//! 4. `future_seconds <= 0` means "deliver immediately".

use serde::de::{self, Deserializer};
use serde::ser::Serializer;
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ---------------------------------------------------------------------------
// Operation kinds
// ---------------------------------------------------------------------------

/// The closed set of operation kinds, plus `Other` for kinds only scripts
/// know about. `Other` carries the wire name so it can round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum OpKind {
    Login,
    Logout,
    Create,
    Delete,
    Set,
    Get,
    Look,
    Move,
    Talk,
    Touch,
    Sight,
    Sound,
    Tick,
    Setup,
    Eat,
    Nourish,
    Cut,
    Chop,
    Fire,
    Appearance,
    Disappearance,
    Error,
    Info,
    Load,
    Save,
    Combine,
    Divide,
    Attack,
    Actuate,
    Update,
    Wield,
    Other(String),
}

impl OpKind {
    /// Wire name of the kind.
    pub fn name(&self) -> &str {
        match self {
            OpKind::Login => "login",
            OpKind::Logout => "logout",
            OpKind::Create => "create",
            OpKind::Delete => "delete",
            OpKind::Set => "set",
            OpKind::Get => "get",
            OpKind::Look => "look",
            OpKind::Move => "move",
            OpKind::Talk => "talk",
            OpKind::Touch => "touch",
            OpKind::Sight => "sight",
            OpKind::Sound => "sound",
            OpKind::Tick => "tick",
            OpKind::Setup => "setup",
            OpKind::Eat => "eat",
            OpKind::Nourish => "nourish",
            OpKind::Cut => "cut",
            OpKind::Chop => "chop",
            OpKind::Fire => "fire",
            OpKind::Appearance => "appearance",
            OpKind::Disappearance => "disappearance",
            OpKind::Error => "error",
            OpKind::Info => "info",
            OpKind::Load => "load",
            OpKind::Save => "save",
            OpKind::Combine => "combine",
            OpKind::Divide => "divide",
            OpKind::Attack => "attack",
            OpKind::Actuate => "actuate",
            OpKind::Update => "update",
            OpKind::Wield => "wield",
            OpKind::Other(name) => name,
        }
    }

    /// Resolve a wire name back to a kind. Unknown names become `Other`.
    pub fn from_name(name: &str) -> OpKind {
        match name {
            "login" => OpKind::Login,
            "logout" => OpKind::Logout,
            "create" => OpKind::Create,
            "delete" => OpKind::Delete,
            "set" => OpKind::Set,
            "get" => OpKind::Get,
            "look" => OpKind::Look,
            "move" => OpKind::Move,
            "talk" => OpKind::Talk,
            "touch" => OpKind::Touch,
            "sight" => OpKind::Sight,
            "sound" => OpKind::Sound,
            "tick" => OpKind::Tick,
            "setup" => OpKind::Setup,
            "eat" => OpKind::Eat,
            "nourish" => OpKind::Nourish,
            "cut" => OpKind::Cut,
            "chop" => OpKind::Chop,
            "fire" => OpKind::Fire,
            "appearance" => OpKind::Appearance,
            "disappearance" => OpKind::Disappearance,
            "error" => OpKind::Error,
            "info" => OpKind::Info,
            "load" => OpKind::Load,
            "save" => OpKind::Save,
            "combine" => OpKind::Combine,
            "divide" => OpKind::Divide,
            "attack" => OpKind::Attack,
            "actuate" => OpKind::Actuate,
            "update" => OpKind::Update,
            "wield" => OpKind::Wield,
            other => OpKind::Other(other.to_string()),
        }
    }

    /// The kind-hierarchy chain, leaf first, ending at `root_operation`.
    ///
    /// Dispatch is an exhaustive match on the enum; the chain exists for
    /// wire compatibility and for scripts registered against parent names.
    pub fn parents(&self) -> Vec<&str> {
        match self {
            OpKind::Sight | OpKind::Sound | OpKind::Appearance | OpKind::Disappearance => {
                vec![self.name(), "perception", "root_operation"]
            }
            OpKind::Info => vec!["info", "root_operation"],
            OpKind::Error => vec!["error", "info", "root_operation"],
            OpKind::Other(name) => vec![name.as_str(), "root_operation"],
            _ => vec![self.name(), "action", "root_operation"],
        }
    }

    /// Perception kinds are broadcast when they carry no destination.
    pub fn is_perception(&self) -> bool {
        matches!(
            self,
            OpKind::Sight | OpKind::Sound | OpKind::Appearance | OpKind::Disappearance
        )
    }
}

impl Serialize for OpKind {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.name())
    }
}

impl<'de> Deserialize<'de> for OpKind {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        if name.is_empty() {
            return Err(de::Error::custom("empty operation kind"));
        }
        Ok(OpKind::from_name(&name))
    }
}

impl std::fmt::Display for OpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// ---------------------------------------------------------------------------
// Operation
// ---------------------------------------------------------------------------

/// A routed message. Immutable once handed to the world queue.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Operation {
    pub kind: OpKind,
    /// Sender entity id; empty = anonymous (account-level traffic).
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub from: String,
    /// Destination entity id; empty = the world root.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub to: String,
    /// Monotone per producer; 0 = unset.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub serialno: u64,
    /// Serialno of the request this replies to; 0 = none.
    #[serde(default, skip_serializing_if = "is_zero_u64")]
    pub refno: u64,
    /// Delay from now in seconds; negative means "already due".
    #[serde(default, skip_serializing_if = "is_zero_f64")]
    pub future_seconds: f64,
    /// Tags the op as routed to a subcomponent (e.g. "mind").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub_to: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<Value>,
}

fn is_zero_u64(n: &u64) -> bool {
    *n == 0
}

fn is_zero_f64(n: &f64) -> bool {
    *n == 0.0
}

impl Operation {
    pub fn new(kind: OpKind) -> Self {
        Self {
            kind,
            from: String::new(),
            to: String::new(),
            serialno: 0,
            refno: 0,
            future_seconds: 0.0,
            sub_to: None,
            args: Vec::new(),
        }
    }

    pub fn from(mut self, from: impl Into<String>) -> Self {
        self.from = from.into();
        self
    }

    pub fn to(mut self, to: impl Into<String>) -> Self {
        self.to = to.into();
        self
    }

    pub fn arg(mut self, arg: Value) -> Self {
        self.args.push(arg);
        self
    }

    pub fn future(mut self, seconds: f64) -> Self {
        self.future_seconds = seconds;
        self
    }

    pub fn sub_to(mut self, component: impl Into<String>) -> Self {
        self.sub_to = Some(component.into());
        self
    }

    pub fn refno(mut self, refno: u64) -> Self {
        self.refno = refno;
        self
    }

    /// First argument as a map record, when it is one.
    pub fn arg_map(&self) -> Option<&serde_json::Map<String, Value>> {
        self.args.first().and_then(|v| v.as_object())
    }

    /// Build an Error reply correlated to `source`.
    pub fn error(source: &Operation, message: &str) -> Operation {
        Operation::new(OpKind::Error)
            .refno(source.serialno)
            .arg(Value::String(message.to_string()))
    }

    /// Wrap another operation as the argument of a perception op.
    pub fn wrap(kind: OpKind, inner: &Operation) -> Operation {
        let body = serde_json::to_value(inner).unwrap_or(Value::Null);
        Operation::new(kind).arg(body)
    }
}

/// A batch of reply operations, in emission order.
pub type OpVec = Vec<Operation>;
