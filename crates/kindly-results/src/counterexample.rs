//! Counterexample traces.
//!
//! A counterexample mirrors the instantiated call path of the analyzed
//! component: each node carries the streams of one component instance and
//! the nodes of the instances it calls.

use serde::Serialize;

/// Whether a trace violates the property from an initial state or only
/// witnesses a failed inductive step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CexKind {
    Base,
    Inductive,
}

/// A single value of a stream at one instant.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum StreamValue {
    Bool(bool),
    Int(i64),
    /// Exact textual value, either decimal (`0.5`) or rational (`1/2`).
    Real(String),
    /// Enumeration constants and anything else the engine reports as text.
    Text(String),
    Array(Vec<StreamValue>),
}

impl StreamValue {
    /// Numeric value of a real, if it can be interpreted as one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            StreamValue::Int(i) => Some(*i as f64),
            StreamValue::Real(text) => parse_real(text),
            _ => None,
        }
    }
}

fn parse_real(text: &str) -> Option<f64> {
    let text = text.trim();
    if let Some((num, den)) = text.split_once('/') {
        let num: f64 = num.trim().parse().ok()?;
        let den: f64 = den.trim().parse().ok()?;
        if den == 0.0 {
            return None;
        }
        return Some(num / den);
    }
    text.parse().ok()
}

/// A named, time-indexed value stream.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Stream {
    pub name: String,
    /// Declared type of the stream (`int`, `real`, `bool`, enum name, ...).
    pub ty: String,
    /// Stream class (`input`, `output`, `local`, ...).
    pub class: String,
    /// `(instant, value)` pairs in ascending instant order.
    pub values: Vec<(u64, StreamValue)>,
}

impl Stream {
    /// Value at a given instant, if recorded.
    pub fn at(&self, instant: u64) -> Option<&StreamValue> {
        self.values
            .iter()
            .find(|(step, _)| *step == instant)
            .map(|(_, v)| v)
    }
}

/// One component instance in a counterexample.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CexNode {
    /// Kind of block (`node`, `function`, ...).
    pub block_type: String,
    pub name: String,
    pub streams: Vec<Stream>,
    pub subnodes: Vec<CexNode>,
}

impl CexNode {
    /// Number of instants covered by the streams of this node and its callees.
    pub fn length(&self) -> u64 {
        let own = self
            .streams
            .iter()
            .filter_map(|s| s.values.iter().map(|(step, _)| step.saturating_add(1)).max())
            .max()
            .unwrap_or(0);
        self.subnodes.iter().map(CexNode::length).fold(own, u64::max)
    }
}

/// A violating execution trace.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CounterExample {
    pub kind: CexKind,
    pub blocks: Vec<CexNode>,
}

impl CounterExample {
    /// Number of instants in the trace.
    pub fn length(&self) -> u64 {
        self.blocks.iter().map(CexNode::length).max().unwrap_or(0)
    }
}
