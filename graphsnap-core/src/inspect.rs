/*!
Registry-free inspection of encoded text.

[`EnvelopeReport::analyze`] walks an envelope without rebuilding any values,
so it works on text produced by an application whose factories are not
available. It visits nodes in the same order the deserializer does, which makes
a ref marker that precedes its definition show up as dangling. The visit keeps
its own stack, so deep envelopes are reported on rather than overflowing.
*/

use std::collections::{BTreeMap, HashSet};

use serde::Serialize;
use serde_json::{Map, Value as JsonValue};

use crate::config::DEFAULT_MAX_DEPTH;
use crate::de::DeserializeWalker;
use crate::node::{
    is_node, parse_text, release, CLASS_KEY, MARKER_KEY, REF_KEY, REF_MARKER, SELF_MARKER, VALUE_KEY,
};
use crate::Result;

/// Structural summary of one encoded graph.
#[derive(Debug, Clone, Default, Serialize)]
pub struct EnvelopeReport {
    pub version: String,
    /// Fully written nodes per class
    pub classes: BTreeMap<String, usize>,
    pub node_count: usize,
    pub ref_markers: usize,
    pub self_markers: usize,
    /// JSON-native primitives written inline
    pub inline_values: usize,
    /// Ref markers with no earlier definition
    pub dangling_refs: Vec<String>,
    /// RefIds defined more than once
    pub duplicate_refs: Vec<String>,
    /// Nodes missing their class, ref, value or marker
    pub problems: Vec<String>,
    /// Deepest JSON nesting below the envelope
    pub max_depth: usize,
}

impl EnvelopeReport {
    /// Analyze text with the default depth limit
    pub fn analyze(text: &str) -> Result<Self> {
        Self::analyze_with_limit(text, DEFAULT_MAX_DEPTH)
    }

    /// Analyze text, refusing input nested deeper than `max_depth`
    pub fn analyze_with_limit(text: &str, max_depth: usize) -> Result<Self> {
        let envelope = DeserializeWalker::envelope(parse_text(text, max_depth)?)?;
        let mut report = EnvelopeReport {
            version: envelope.version,
            ..Self::default()
        };
        report.visit(&envelope.root);
        release(envelope.root);
        Ok(report)
    }

    /// No dangling or duplicate refs and no malformed nodes
    pub fn is_consistent(&self) -> bool {
        self.dangling_refs.is_empty() && self.duplicate_refs.is_empty() && self.problems.is_empty()
    }

    fn visit(&mut self, root: &JsonValue) {
        let mut defined = HashSet::new();
        let mut pending = vec![(root, 1usize)];

        while let Some((json, depth)) = pending.pop() {
            match json {
                JsonValue::Object(object) => {
                    self.max_depth = self.max_depth.max(depth);
                    if is_node(object) {
                        if let Some(value) = self.visit_node(object, &mut defined) {
                            pending.push((value, depth + 1));
                        }
                    } else {
                        // reversed so children pop in document order
                        let fields: Vec<&JsonValue> = object.values().collect();
                        pending.extend(fields.into_iter().rev().map(|field| (field, depth + 1)));
                    }
                }
                JsonValue::Array(items) => {
                    self.max_depth = self.max_depth.max(depth);
                    pending.extend(items.iter().rev().map(|item| (item, depth + 1)));
                }
                _ => self.inline_values += 1,
            }
        }
    }

    /// Record one node; returns its value when that must be visited too
    fn visit_node<'j>(
        &mut self,
        node: &'j Map<String, JsonValue>,
        defined: &mut HashSet<String>,
    ) -> Option<&'j JsonValue> {
        let class = node.get(CLASS_KEY).and_then(JsonValue::as_str);
        let ref_id = node.get(REF_KEY).and_then(JsonValue::as_str);
        let (Some(class), Some(ref_id)) = (class, ref_id) else {
            self.problems
                .push("node without a string class and ref".to_string());
            return None;
        };

        match (node.get(MARKER_KEY).and_then(JsonValue::as_str), node.get(VALUE_KEY)) {
            (Some(REF_MARKER), _) => {
                self.ref_markers += 1;
                if !defined.contains(ref_id) {
                    self.dangling_refs.push(ref_id.to_string());
                }
            }
            (Some(SELF_MARKER), _) => {
                self.self_markers += 1;
                self.define(class, ref_id, defined);
            }
            (Some(other), _) => self
                .problems
                .push(format!("node '{ref_id}' has unknown marker '{other}'")),
            (None, Some(value)) => {
                self.define(class, ref_id, defined);
                return Some(value);
            }
            (None, None) => self
                .problems
                .push(format!("node '{ref_id}' has neither value nor marker")),
        }
        None
    }

    fn define(&mut self, class: &str, ref_id: &str, defined: &mut HashSet<String>) {
        self.node_count += 1;
        *self.classes.entry(class.to_string()).or_insert(0) += 1;
        if !defined.insert(ref_id.to_string()) {
            self.duplicate_refs.push(ref_id.to_string());
        }
    }
}
