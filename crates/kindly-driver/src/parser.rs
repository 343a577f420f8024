//! Incremental decoder for the engine's output stream.
//!
//! The engine prints a JSON array of records, one object per event, while it
//! runs. The decoder never waits for the closing bracket: a byte scanner
//! tracks object nesting (string and escape aware) and each complete
//! top-level object is decoded and applied to the [`ResultModel`] as soon as
//! its last byte arrives. After a decode failure the stream is abandoned but
//! everything applied so far stays in the model.

use tracing::{debug, error, info, trace, warn};

use kindly_results::{
    AnalysisContext, AnalysisId, Answer, PostAnalysis, Property, PropertySource, ResultModel,
};

use crate::error::ParseError;
use crate::transcript::{LogEntry, Transcript};
use crate::wire::{AnalysisStartRecord, LogRecord, PropertyRecord, Record};

/// Splits a byte stream into complete top-level JSON objects.
#[derive(Debug, Default)]
struct RecordScanner {
    buf: Vec<u8>,
    depth: usize,
    in_string: bool,
    escaped: bool,
    /// Absolute offset of the next byte to be scanned.
    offset: u64,
    record_start: u64,
}

impl RecordScanner {
    /// Scan `input` from `*pos` until one record completes.
    ///
    /// Returns the record's start offset and bytes, or `None` once `input`
    /// is exhausted without completing a record.
    fn next_record(
        &mut self,
        input: &[u8],
        pos: &mut usize,
    ) -> Result<Option<(u64, Vec<u8>)>, ParseError> {
        while *pos < input.len() {
            let byte = input[*pos];
            let offset = self.offset;
            *pos += 1;
            self.offset += 1;

            if self.depth == 0 {
                match byte {
                    b'{' => {
                        self.depth = 1;
                        self.record_start = offset;
                        self.buf.push(byte);
                    }
                    b'[' | b']' | b',' => {}
                    b if b.is_ascii_whitespace() => {}
                    _ => return Err(ParseError::UnexpectedByte { offset, byte }),
                }
                continue;
            }

            self.buf.push(byte);
            if self.in_string {
                if self.escaped {
                    self.escaped = false;
                } else if byte == b'\\' {
                    self.escaped = true;
                } else if byte == b'"' {
                    self.in_string = false;
                }
                continue;
            }
            match byte {
                b'"' => self.in_string = true,
                b'{' | b'[' => self.depth += 1,
                b'}' | b']' => {
                    self.depth -= 1;
                    if self.depth == 0 {
                        return Ok(Some((self.record_start, std::mem::take(&mut self.buf))));
                    }
                }
                _ => {}
            }
        }
        Ok(None)
    }

    /// Start offset of a record that has begun but not completed.
    fn pending(&self) -> Option<u64> {
        (self.depth > 0).then_some(self.record_start)
    }
}

/// Decodes output records and applies them to a [`ResultModel`].
///
/// The parser is the only writer of its model.
#[derive(Debug, Default)]
pub struct StreamParser {
    model: ResultModel,
    transcript: Transcript,
    scanner: RecordScanner,
    /// Analyses started and not yet stopped, innermost last.
    open: Vec<AnalysisId>,
    last_stopped: Option<AnalysisId>,
    post_analysis: Option<PostAnalysis>,
    aborted: bool,
}

impl StreamParser {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode every record completed by `chunk`.
    ///
    /// On failure the parser is aborted: records decoded before the failing
    /// one remain applied and later calls return [`ParseError::Aborted`].
    pub fn feed(&mut self, chunk: &[u8]) -> Result<(), ParseError> {
        if self.aborted {
            return Err(ParseError::Aborted);
        }
        let mut pos = 0;
        loop {
            let next = self.scanner.next_record(chunk, &mut pos);
            let step = next.and_then(|record| match record {
                Some((offset, bytes)) => self.decode(offset, &bytes).map(|_| true),
                None => Ok(false),
            });
            match step {
                Ok(true) => continue,
                Ok(false) => return Ok(()),
                Err(e) => {
                    warn!(error = %e, "aborting output stream");
                    self.aborted = true;
                    return Err(e);
                }
            }
        }
    }

    /// Signal the end of output.
    ///
    /// Fails if the output stopped in the middle of a record. Analyses left
    /// open (for example after cancellation) are kept as they are.
    pub fn finish(&mut self) -> Result<(), ParseError> {
        if self.aborted {
            return Err(ParseError::Aborted);
        }
        if let Some(offset) = self.scanner.pending() {
            self.aborted = true;
            return Err(ParseError::UnterminatedRecord { offset });
        }
        if !self.open.is_empty() {
            debug!(open = self.open.len(), "output ended with analyses still open");
        }
        Ok(())
    }

    /// Whether a decode failure has aborted the stream.
    pub fn is_aborted(&self) -> bool {
        self.aborted
    }

    /// The model as decoded so far.
    pub fn model(&self) -> &ResultModel {
        &self.model
    }

    pub fn transcript(&self) -> &Transcript {
        &self.transcript
    }

    pub fn into_parts(self) -> (ResultModel, Transcript) {
        (self.model, self.transcript)
    }

    fn decode(&mut self, offset: u64, bytes: &[u8]) -> Result<(), ParseError> {
        let record: Record =
            serde_json::from_slice(bytes).map_err(|source| ParseError::Json { offset, source })?;
        trace!(kind = record.kind(), offset, "record");
        self.transcript.records += 1;
        self.dispatch(offset, record)
    }

    fn dispatch(&mut self, offset: u64, record: Record) -> Result<(), ParseError> {
        match record {
            Record::Kind2Options(options) => {
                self.transcript.options = Some(serde_json::Value::Object(options));
            }
            Record::Log(log) => self.log(log),
            Record::AnalysisStart(start) => self.start_analysis(start)?,
            Record::Property(property) => self.property(offset, property)?,
            Record::AnalysisStop => {
                let stopped = self.open.pop().ok_or_else(|| ParseError::OutOfOrder {
                    kind: "analysisStop",
                    offset,
                    reason: "no analysis is running".into(),
                })?;
                debug!(analysis = %stopped, "analysis stopped");
                self.last_stopped = Some(stopped);
            }
            Record::PostAnalysisStart(start) => {
                if let Some(running) = &self.post_analysis {
                    return Err(ParseError::OutOfOrder {
                        kind: "postAnalysisStart",
                        offset,
                        reason: format!("post-analysis '{}' has not ended", running.name),
                    });
                }
                self.post_analysis = Some(PostAnalysis::new(start.name));
            }
            Record::ModelElementSet(set) => {
                let post = self
                    .post_analysis
                    .as_mut()
                    .ok_or_else(|| ParseError::OutOfOrder {
                        kind: "modelElementSet",
                        offset,
                        reason: "no post-analysis is running".into(),
                    })?;
                post.element_sets.push(set.to_set());
            }
            Record::PostAnalysisEnd => {
                let post = self.post_analysis.take().ok_or_else(|| ParseError::OutOfOrder {
                    kind: "postAnalysisEnd",
                    offset,
                    reason: "no post-analysis is running".into(),
                })?;
                let target = self
                    .last_stopped
                    .or_else(|| self.open.last().copied())
                    .ok_or_else(|| ParseError::OutOfOrder {
                        kind: "postAnalysisEnd",
                        offset,
                        reason: "no analysis to attach to".into(),
                    })?;
                self.model.attach_post_analysis(target, post)?;
            }
            Record::Progress(progress) => {
                if let Some(k) = progress.k {
                    let source = progress.source.unwrap_or_else(|| "engine".into());
                    self.transcript.progress.insert(source, k);
                }
            }
        }
        Ok(())
    }

    fn log(&mut self, log: LogRecord) {
        let message = log.message();
        let source = log.source.as_deref().unwrap_or("engine");
        match log.level.as_str() {
            "fatal" | "error" => error!(target: "kindly::engine", source, "{message}"),
            "warn" | "warning" => warn!(target: "kindly::engine", source, "{message}"),
            "info" | "note" => info!(target: "kindly::engine", source, "{message}"),
            "debug" => debug!(target: "kindly::engine", source, "{message}"),
            _ => trace!(target: "kindly::engine", source, "{message}"),
        }
        self.transcript.logs.push(LogEntry {
            level: log.level,
            source: log.source,
            message,
            file: log.file,
            line: log.line,
            column: log.column,
        });
    }

    fn start_analysis(&mut self, start: AnalysisStartRecord) -> Result<(), ParseError> {
        for sub in start.concrete.iter().chain(&start.abstracted) {
            if *sub != start.top {
                self.model.add_child(&start.top, sub)?;
            }
        }
        let context = AnalysisContext {
            concrete: start.concrete,
            abstracted: start.abstracted,
            assumptions: start.assumptions,
        };
        let id = self.model.add_analysis(&start.top, context);
        debug!(component = %start.top, analysis = %id, "analysis started");
        self.open.push(id);
        self.last_stopped = None;
        Ok(())
    }

    fn property(&mut self, offset: u64, record: PropertyRecord) -> Result<(), ParseError> {
        let analysis = *self.open.last().ok_or_else(|| ParseError::OutOfOrder {
            kind: "property",
            offset,
            reason: format!("result for '{}' arrived outside an analysis", record.name),
        })?;
        let source =
            PropertySource::from_wire(&record.source).ok_or_else(|| ParseError::UnknownValue {
                field: "property source",
                value: record.source.clone(),
                offset,
            })?;
        let answer =
            Answer::from_wire(&record.answer.value).ok_or_else(|| ParseError::UnknownValue {
                field: "answer",
                value: record.answer.value.clone(),
                offset,
            })?;
        let scope = match &record.scope {
            Some(scope) => scope.clone(),
            None => self
                .model
                .analysis(analysis)
                .and_then(|a| self.model.component(a.component))
                .map(|c| c.name.clone())
                .unwrap_or_default(),
        };

        let property = Property {
            location: record.location(),
            k: record.k,
            runtime: record.runtime.as_ref().map(|r| r.to_runtime()),
            counter_example: record.counter_example(),
            answered_by: record.answer.source.clone(),
            ..Property::new(record.name, scope, source, answer)
        };
        debug!(property = %property.name, answer = %property.answer, "property result");
        self.model.add_property(analysis, property)?;
        Ok(())
    }
}

/// Decode a complete captured output in one go.
pub fn parse_output(bytes: &[u8]) -> Result<(ResultModel, Transcript), (ParseError, ResultModel)> {
    let mut parser = StreamParser::new();
    if let Err(e) = parser.feed(bytes).and_then(|_| parser.finish()) {
        let (model, _) = parser.into_parts();
        return Err((e, model));
    }
    Ok(parser.into_parts())
}

#[cfg(test)]
mod tests {
    use super::*;

    const STREAM: &str = r#"[
{"objectType": "kind2Options", "enabled": ["BMC", "IND"], "timeout": 10},
{"objectType": "log", "level": "info", "source": "parse", "value": "parsed {ok}"},
{"objectType": "analysisStart", "top": "Top", "concrete": [], "abstract": ["Sub"], "assumptions": []},
{"objectType": "property", "name": "g \"quoted\"", "scope": "Top", "source": "Guarantee", "answer": {"source": "ind", "value": "valid"}},
{"objectType": "analysisStop"},
{"objectType": "postAnalysisStart", "name": "ivc"},
{"objectType": "modelElementSet", "class": "must", "nodes": [{"name": "Top", "elements": [{"category": "guarantee", "name": "g", "line": 3, "column": 1}]}]},
{"objectType": "postAnalysisEnd"},
{"objectType": "progress", "source": "bmc", "k": "4"}
]"#;

    #[test]
    fn decodes_whole_stream() {
        let (model, transcript) = parse_output(STREAM.as_bytes()).unwrap();
        assert_eq!(transcript.records, 9);
        assert_eq!(transcript.logs[0].message, "parsed {ok}");
        assert_eq!(transcript.progress.get("bmc"), Some(&4));
        assert!(transcript.options.is_some());

        let top = model.component_id("Top").unwrap();
        let last = model.last_analysis(top).unwrap();
        assert_eq!(last.decoded()[0].name, "g \"quoted\"");
        assert_eq!(last.decoded()[0].answered_by.as_deref(), Some("ind"));
        assert_eq!(last.post_analyses.len(), 1);
        assert_eq!(last.post_analyses[0].element_sets[0].elements[0].name, "g");
        assert_eq!(model.component_named("Sub").unwrap().parents().len(), 1);
    }

    #[test]
    fn byte_at_a_time_matches_whole() {
        let mut parser = StreamParser::new();
        for byte in STREAM.as_bytes() {
            parser.feed(std::slice::from_ref(byte)).unwrap();
        }
        parser.finish().unwrap();
        let (whole, _) = parse_output(STREAM.as_bytes()).unwrap();
        assert_eq!(parser.model().final_verdicts(), whole.final_verdicts());
    }

    #[test]
    fn partial_records_become_visible_incrementally() {
        let (head, tail) = STREAM.split_at(STREAM.find("{\"objectType\": \"analysisStop\"").unwrap());
        let mut parser = StreamParser::new();
        parser.feed(head.as_bytes()).unwrap();
        assert_eq!(parser.model().final_verdicts().len(), 1);
        parser.feed(tail.as_bytes()).unwrap();
        parser.finish().unwrap();
    }

    #[test]
    fn decode_failure_keeps_earlier_records() {
        let input = br#"[{"objectType": "analysisStart", "top": "A"},
{"objectType": "property", "name": "p", "source": "Guarantee", "answer": {"value": "valid"}},
{"objectType": "property", "name": "q", "source": "Guarantee", "answer": {"value": "maybe"}},
{"objectType": "property", "name": "r", "source": "Guarantee", "answer": {"value": "valid"}}]"#;
        let mut parser = StreamParser::new();
        let err = parser.feed(input).unwrap_err();
        assert!(matches!(err, ParseError::UnknownValue { field: "answer", .. }));
        assert!(parser.is_aborted());
        assert!(matches!(parser.feed(b"{}"), Err(ParseError::Aborted)));

        let a = parser.model().component_id("A").unwrap();
        let names: Vec<_> = parser
            .model()
            .last_analysis(a)
            .unwrap()
            .decoded()
            .iter()
            .map(|p| p.name.clone())
            .collect();
        assert_eq!(names, vec!["p"]);
    }

    #[test]
    fn out_of_order_records_rejected() {
        let property = br#"{"objectType": "property", "name": "p", "source": "Guarantee", "answer": {"value": "valid"}}"#;
        assert!(matches!(
            parse_output(property),
            Err((ParseError::OutOfOrder { kind: "property", .. }, _))
        ));
        assert!(matches!(
            parse_output(br#"{"objectType": "analysisStop"}"#),
            Err((ParseError::OutOfOrder { kind: "analysisStop", .. }, _))
        ));
        assert!(matches!(
            parse_output(br#"{"objectType": "modelElementSet", "nodes": []}"#),
            Err((ParseError::OutOfOrder { kind: "modelElementSet", .. }, _))
        ));
    }

    #[test]
    fn truncated_output_is_reported() {
        let err = parse_output(br#"[{"objectType": "analysisStart", "top": "A"}, {"objectType": "prop"#)
            .unwrap_err();
        assert!(matches!(err.0, ParseError::UnterminatedRecord { offset: 46 }));
        assert!(err.1.component_id("A").is_some());
    }

    #[test]
    fn garbage_between_records() {
        let err = parse_output(b"[{\"objectType\": \"analysisStop\"} x").unwrap_err();
        // The first record is decoded (and rejected) before the garbage is seen.
        assert!(matches!(err.0, ParseError::OutOfOrder { .. }));

        let err = parse_output(b"  oops").unwrap_err();
        assert!(matches!(
            err.0,
            ParseError::UnexpectedByte { offset: 2, byte: b'o' }
        ));
    }

    #[test]
    fn nested_analyses_route_properties_to_innermost() {
        let input = br#"[
{"objectType": "analysisStart", "top": "Outer"},
{"objectType": "analysisStart", "top": "Inner"},
{"objectType": "property", "name": "i", "source": "Guarantee", "answer": {"value": "valid"}},
{"objectType": "analysisStop"},
{"objectType": "property", "name": "o", "source": "Guarantee", "answer": {"value": "unknown"}},
{"objectType": "analysisStop"}]"#;
        let (model, _) = parse_output(input).unwrap();
        assert_eq!(
            model.final_verdicts(),
            vec![
                ("Outer".to_string(), "o".to_string(), Answer::Unknown),
                ("Inner".to_string(), "i".to_string(), Answer::Valid),
            ]
        );
        let inner = model.component_named("Inner").unwrap();
        let p = &model.last_analysis(inner.id).unwrap().decoded()[0];
        assert_eq!(p.scope, "Inner");
    }
}
