//! Script boundary.
//!
//! Entities may carry a script that sees every operation before the native
//! handlers. A script returning [`ScriptVerdict::Handled`] short-circuits
//! the native path; a missing script behaves as identity.

use crate::operation::{OpVec, Operation};
use log::warn;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptVerdict {
    /// The script consumed the operation; skip native handlers.
    Handled,
    /// Run the native handlers as usual.
    Passthrough,
    /// The script failed. Logged at the boundary; native handlers still run.
    Error(String),
}

pub trait Script: Send {
    /// `kind` is the leaf name of the operation's parent chain.
    fn operation(&mut self, kind: &str, op: &Operation, res: &mut OpVec) -> ScriptVerdict;
}

/// Run the script hook, absorbing script failures so the native path
/// always remains available.
pub fn run_script(
    script: Option<&mut Box<dyn Script>>,
    op: &Operation,
    res: &mut OpVec,
) -> bool {
    let Some(script) = script else {
        return false;
    };
    match script.operation(op.kind.name(), op, res) {
        ScriptVerdict::Handled => true,
        ScriptVerdict::Passthrough => false,
        ScriptVerdict::Error(msg) => {
            warn!("script error handling {}: {}", op.kind, msg);
            false
        }
    }
}
