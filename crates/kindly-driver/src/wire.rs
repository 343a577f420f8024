//! Record schema of the engine's structured output.
//!
//! Field names follow the engine's JSON output exactly; they are part of an
//! external contract and must not be renamed.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use kindly_results::{
    CexKind, CexNode, CounterExample, Location, ModelElement, ModelElementSet, Runtime, Stream,
    StreamValue,
};

/// One self-describing output record.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "objectType", rename_all = "camelCase")]
pub enum Record {
    Kind2Options(Map<String, Value>),
    Log(LogRecord),
    AnalysisStart(AnalysisStartRecord),
    Property(PropertyRecord),
    AnalysisStop,
    PostAnalysisStart(PostAnalysisStartRecord),
    ModelElementSet(ModelElementSetRecord),
    PostAnalysisEnd,
    Progress(ProgressRecord),
}

impl Record {
    /// The discriminator value of this record.
    pub fn kind(&self) -> &'static str {
        match self {
            Record::Kind2Options(_) => "kind2Options",
            Record::Log(_) => "log",
            Record::AnalysisStart(_) => "analysisStart",
            Record::Property(_) => "property",
            Record::AnalysisStop => "analysisStop",
            Record::PostAnalysisStart(_) => "postAnalysisStart",
            Record::ModelElementSet(_) => "modelElementSet",
            Record::PostAnalysisEnd => "postAnalysisEnd",
            Record::Progress(_) => "progress",
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct LogRecord {
    pub level: String,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub line: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub column: Option<u32>,
    #[serde(default)]
    pub value: Value,
}

impl LogRecord {
    /// The log message as text.
    pub fn message(&self) -> String {
        match &self.value {
            Value::String(s) => s.clone(),
            Value::Null => String::new(),
            other => other.to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnalysisStartRecord {
    pub top: String,
    #[serde(default)]
    pub concrete: Vec<String>,
    #[serde(default, rename = "abstract")]
    pub abstracted: Vec<String>,
    #[serde(default)]
    pub assumptions: Vec<(String, u64)>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RuntimeRecord {
    #[serde(default)]
    pub unit: Option<String>,
    #[serde(default)]
    pub timeout: bool,
    pub value: f64,
}

impl RuntimeRecord {
    /// Convert to seconds, honoring the reported unit.
    pub fn to_runtime(&self) -> Runtime {
        let seconds = match self.unit.as_deref() {
            Some("ms") => self.value / 1000.0,
            _ => self.value,
        };
        Runtime {
            seconds,
            timed_out: self.timeout,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnswerRecord {
    #[serde(default)]
    pub source: Option<String>,
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PropertyRecord {
    pub name: String,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub line: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub column: Option<u32>,
    pub source: String,
    #[serde(default)]
    pub runtime: Option<RuntimeRecord>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub k: Option<u64>,
    pub answer: AnswerRecord,
    #[serde(default)]
    pub counter_example: Option<Vec<CexBlockRecord>>,
    #[serde(default)]
    pub inductive_counter_example: Option<Vec<CexBlockRecord>>,
}

impl PropertyRecord {
    pub fn location(&self) -> Option<Location> {
        match (self.line, self.column) {
            (Some(line), column) => Some(Location {
                line,
                column: column.unwrap_or(0),
            }),
            _ => None,
        }
    }

    /// The trace attached to this result, preferring a base counterexample.
    pub fn counter_example(&self) -> Option<CounterExample> {
        if let Some(blocks) = &self.counter_example {
            return Some(CounterExample {
                kind: CexKind::Base,
                blocks: blocks.iter().map(CexBlockRecord::to_node).collect(),
            });
        }
        self.inductive_counter_example
            .as_ref()
            .map(|blocks| CounterExample {
                kind: CexKind::Inductive,
                blocks: blocks.iter().map(CexBlockRecord::to_node).collect(),
            })
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CexBlockRecord {
    #[serde(default = "default_block_type")]
    pub block_type: String,
    pub name: String,
    #[serde(default)]
    pub streams: Vec<StreamRecord>,
    #[serde(default)]
    pub subnodes: Vec<CexBlockRecord>,
}

fn default_block_type() -> String {
    "node".to_string()
}

impl CexBlockRecord {
    pub fn to_node(&self) -> CexNode {
        CexNode {
            block_type: self.block_type.clone(),
            name: self.name.clone(),
            streams: self.streams.iter().map(StreamRecord::to_stream).collect(),
            subnodes: self.subnodes.iter().map(CexBlockRecord::to_node).collect(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamRecord {
    pub name: String,
    #[serde(rename = "type", default)]
    pub ty: String,
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub instant_values: Vec<(u64, Value)>,
}

impl StreamRecord {
    pub fn to_stream(&self) -> Stream {
        Stream {
            name: self.name.clone(),
            ty: self.ty.clone(),
            class: self.class.clone(),
            values: self
                .instant_values
                .iter()
                .map(|(step, v)| (*step, stream_value(&self.ty, v)))
                .collect(),
        }
    }
}

/// Convert a raw trace value according to the declared stream type.
pub fn stream_value(ty: &str, value: &Value) -> StreamValue {
    let is_real = ty == "real";
    match value {
        Value::Bool(b) => StreamValue::Bool(*b),
        Value::Number(n) if is_real => StreamValue::Real(n.to_string()),
        Value::Number(n) => match n.as_i64() {
            Some(i) => StreamValue::Int(i),
            None => StreamValue::Real(n.to_string()),
        },
        Value::String(s) if is_real => StreamValue::Real(s.clone()),
        Value::String(s) => StreamValue::Text(s.clone()),
        Value::Array(items) => {
            let elem_ty = ty
                .strip_prefix("array of ")
                .map(str::trim)
                .unwrap_or(ty);
            StreamValue::Array(items.iter().map(|v| stream_value(elem_ty, v)).collect())
        }
        other => StreamValue::Text(other.to_string()),
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PostAnalysisStartRecord {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModelElementSetRecord {
    #[serde(default)]
    pub class: String,
    #[serde(default)]
    pub nodes: Vec<NodeElementsRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NodeElementsRecord {
    pub name: String,
    #[serde(default)]
    pub elements: Vec<ElementRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ElementRecord {
    #[serde(default)]
    pub category: String,
    pub name: String,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub line: Option<u32>,
    #[serde(default, deserialize_with = "lenient_u32")]
    pub column: Option<u32>,
}

impl ModelElementSetRecord {
    pub fn to_set(&self) -> ModelElementSet {
        let elements = self
            .nodes
            .iter()
            .flat_map(|node| {
                node.elements.iter().map(move |e| ModelElement {
                    component: node.name.clone(),
                    category: e.category.clone(),
                    name: e.name.clone(),
                    line: e.line,
                    column: e.column,
                })
            })
            .collect();
        ModelElementSet {
            class: self.class.clone(),
            elements,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressRecord {
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default, deserialize_with = "lenient_u64")]
    pub k: Option<u64>,
}

/// Numbers the engine sometimes prints as strings.
#[derive(Deserialize)]
#[serde(untagged)]
enum NumberOrText {
    Number(u64),
    Text(String),
}

fn lenient_u64<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<NumberOrText> = Option::deserialize(deserializer)?;
    match raw {
        None => Ok(None),
        Some(NumberOrText::Number(n)) => Ok(Some(n)),
        Some(NumberOrText::Text(s)) => s
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("expected a number, found '{s}'"))),
    }
}

fn lenient_u32<'de, D>(deserializer: D) -> Result<Option<u32>, D::Error>
where
    D: Deserializer<'de>,
{
    match lenient_u64(deserializer)? {
        None => Ok(None),
        Some(n) => u32::try_from(n)
            .map(Some)
            .map_err(|_| serde::de::Error::custom(format!("{n} does not fit in 32 bits"))),
    }
}
