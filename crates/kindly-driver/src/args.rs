//! Engine command-line arguments.
//!
//! Flag names belong to the engine and are passed through verbatim.

use std::time::Duration;

/// Format selector that makes the engine emit structured records.
pub const JSON_FLAG: &str = "-json";

/// Builder for the engine's argument list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EngineArgs {
    /// Wall-clock timeout, in whole seconds.
    pub timeout: Option<u64>,
    pub smt_solver: Option<String>,
    pub smt_logic: Option<String>,
    /// Engine modules to enable (e.g. `BMC`, `IND`, `IC3`).
    pub enable: Vec<String>,
    pub disable: Vec<String>,
    pub compositional: Option<bool>,
    pub modular: Option<bool>,
    /// Top node to verify.
    pub main_node: Option<String>,
    /// Arguments appended after the named flags.
    pub extra: Vec<String>,
}

impl EngineArgs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        // The engine rejects a zero timeout.
        self.timeout = Some(timeout.as_secs().max(1));
        self
    }

    pub fn smt_solver(mut self, solver: impl Into<String>) -> Self {
        self.smt_solver = Some(solver.into());
        self
    }

    pub fn smt_logic(mut self, logic: impl Into<String>) -> Self {
        self.smt_logic = Some(logic.into());
        self
    }

    pub fn enable(mut self, module: impl Into<String>) -> Self {
        self.enable.push(module.into());
        self
    }

    pub fn disable(mut self, module: impl Into<String>) -> Self {
        self.disable.push(module.into());
        self
    }

    pub fn compositional(mut self, on: bool) -> Self {
        self.compositional = Some(on);
        self
    }

    pub fn modular(mut self, on: bool) -> Self {
        self.modular = Some(on);
        self
    }

    pub fn main_node(mut self, node: impl Into<String>) -> Self {
        self.main_node = Some(node.into());
        self
    }

    pub fn arg(mut self, raw: impl Into<String>) -> Self {
        self.extra.push(raw.into());
        self
    }

    /// Render the argument list. The JSON format selector always comes first.
    pub fn to_args(&self) -> Vec<String> {
        let mut args = vec![JSON_FLAG.to_string()];
        let mut flag = |name: &str, value: String| {
            args.push(name.to_string());
            args.push(value);
        };
        if let Some(t) = self.timeout {
            flag("--timeout", t.to_string());
        }
        if let Some(s) = &self.smt_solver {
            flag("--smt_solver", s.clone());
        }
        if let Some(l) = &self.smt_logic {
            flag("--smt_logic", l.clone());
        }
        for m in &self.enable {
            flag("--enable", m.clone());
        }
        for m in &self.disable {
            flag("--disable", m.clone());
        }
        if let Some(c) = self.compositional {
            flag("--compositional", c.to_string());
        }
        if let Some(m) = self.modular {
            flag("--modular", m.to_string());
        }
        if let Some(n) = &self.main_node {
            flag("--lus_main", n.clone());
        }
        args.extend(self.extra.iter().cloned());
        args
    }
}
