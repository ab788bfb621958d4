//! Output builder: node arena → JSON text.
//!
//! Second pass over the walker's result. The first visit of a node writes it in
//! full, every later visit writes a ref marker. Visiting order is the walker's
//! order, so a marker always follows the definition it points at.
//!
//! Text is streamed through a serde_json [`Formatter`] from an explicit stack
//! of open containers, so output depth costs heap, not call stack.

use std::collections::btree_map;

use serde::Serialize;
use serde_json::ser::{CompactFormatter, Formatter, PrettyFormatter};

use crate::node::{
    Encoded, NodeArena, NodeId, NodeValue, CLASS_KEY, MARKER_KEY, NODE_KEY, REF_KEY, REF_MARKER,
    SELF_MARKER, VALUE_KEY,
};
use crate::{GraphSnapError, Result};

/// A container whose entries are still being written
enum Frame<'e> {
    Array {
        items: std::slice::Iter<'e, Encoded>,
        first: bool,
    },
    Object {
        fields: btree_map::Iter<'e, String, Encoded>,
        first: bool,
    },
    /// The `value` entry of a node
    NodeBody,
}

pub(crate) struct OutputBuilder<'a> {
    arena: &'a NodeArena,
    emitted: Vec<bool>,
    markers: usize,
}

impl<'a> OutputBuilder<'a> {
    pub fn new(arena: &'a NodeArena) -> Self {
        Self {
            arena,
            emitted: vec![false; arena.len()],
            markers: 0,
        }
    }

    /// Build the envelope text
    pub fn finish(&mut self, version: &str, root: &Encoded, pretty: bool) -> Result<String> {
        let mut out = Vec::new();
        if pretty {
            self.write_envelope(&mut out, &mut PrettyFormatter::new(), version, root)?;
        } else {
            self.write_envelope(&mut out, &mut CompactFormatter, version, root)?;
        }
        String::from_utf8(out)
            .map_err(|e| GraphSnapError::validation(format!("Encoded text is not UTF-8: {e}")))
    }

    /// Ref markers written so far
    pub fn markers(&self) -> usize {
        self.markers
    }

    fn write_envelope<F: Formatter>(
        &mut self,
        out: &mut Vec<u8>,
        formatter: &mut F,
        version: &str,
        root: &Encoded,
    ) -> Result<()> {
        formatter.begin_object(out)?;
        write_entry(out, formatter, "version", version, true)?;
        write_key(out, formatter, "root", false)?;
        self.write_encoded(out, formatter, root)?;
        formatter.end_object_value(out)?;
        formatter.end_object(out)?;
        Ok(())
    }

    fn write_encoded<'e, F: Formatter>(
        &mut self,
        out: &mut Vec<u8>,
        formatter: &mut F,
        root: &'e Encoded,
    ) -> Result<()>
    where
        'a: 'e,
    {
        let arena: &'a NodeArena = self.arena;
        let mut stack: Vec<Frame<'e>> = Vec::new();
        let mut next = Some(root);

        loop {
            if let Some(encoded) = next.take() {
                match encoded {
                    Encoded::Inline(value) => serde_json::to_writer(&mut *out, value)?,
                    Encoded::Array(items) => {
                        formatter.begin_array(out)?;
                        stack.push(Frame::Array {
                            items: items.iter(),
                            first: true,
                        });
                    }
                    Encoded::Object(fields) => {
                        formatter.begin_object(out)?;
                        stack.push(Frame::Object {
                            fields: fields.iter(),
                            first: true,
                        });
                    }
                    Encoded::Node(id) => {
                        if let Some(body) = self.open_node(out, formatter, arena, *id)? {
                            stack.push(Frame::NodeBody);
                            next = Some(body);
                            continue;
                        }
                    }
                }
            }

            // The value just written is complete; advance the innermost container
            let Some(frame) = stack.last_mut() else {
                return Ok(());
            };
            match frame {
                Frame::Array { items, first } => {
                    if !*first {
                        formatter.end_array_value(out)?;
                    }
                    match items.next() {
                        Some(item) => {
                            formatter.begin_array_value(out, *first)?;
                            *first = false;
                            next = Some(item);
                        }
                        None => {
                            formatter.end_array(out)?;
                            stack.pop();
                        }
                    }
                }
                Frame::Object { fields, first } => {
                    if !*first {
                        formatter.end_object_value(out)?;
                    }
                    match fields.next() {
                        Some((key, field)) => {
                            write_key(out, formatter, key, *first)?;
                            *first = false;
                            next = Some(field);
                        }
                        None => {
                            formatter.end_object(out)?;
                            stack.pop();
                        }
                    }
                }
                Frame::NodeBody => {
                    formatter.end_object_value(out)?;
                    formatter.end_object(out)?;
                    stack.pop();
                }
            }
        }
    }

    /// Write a node's header. Returns the snapshot still to be written as its
    /// `value`, or `None` when the node was closed as a marker.
    fn open_node<F: Formatter>(
        &mut self,
        out: &mut Vec<u8>,
        formatter: &mut F,
        arena: &'a NodeArena,
        id: NodeId,
    ) -> Result<Option<&'a Encoded>> {
        let node = arena
            .get(id)
            .ok_or_else(|| GraphSnapError::validation(format!("Unknown node index {id}")))?;
        let ref_id = NodeArena::ref_id(id);

        let marker = if self.emitted[id] {
            self.markers += 1;
            Some(REF_MARKER)
        } else {
            self.emitted[id] = true;
            match &node.value {
                NodeValue::SelfRef => Some(SELF_MARKER),
                NodeValue::Snapshot(_) => None,
                NodeValue::Pending => {
                    return Err(GraphSnapError::validation(format!(
                        "Node {ref_id} was never completed"
                    )))
                }
            }
        };

        formatter.begin_object(out)?;
        write_entry(out, formatter, NODE_KEY, &true, true)?;
        write_entry(out, formatter, CLASS_KEY, node.class.as_str(), false)?;

        match (marker, &node.value) {
            (Some(marker), _) => {
                write_entry(out, formatter, MARKER_KEY, marker, false)?;
                write_entry(out, formatter, REF_KEY, ref_id.as_str(), false)?;
                formatter.end_object(out)?;
                Ok(None)
            }
            (None, NodeValue::Snapshot(snapshot)) => {
                write_entry(out, formatter, REF_KEY, ref_id.as_str(), false)?;
                write_key(out, formatter, VALUE_KEY, false)?;
                Ok(Some(snapshot))
            }
            (None, _) => Err(GraphSnapError::validation(format!(
                "Node {ref_id} has no snapshot"
            ))),
        }
    }
}

/// Write an object key and open its value
fn write_key<F: Formatter>(
    out: &mut Vec<u8>,
    formatter: &mut F,
    key: &str,
    first: bool,
) -> Result<()> {
    formatter.begin_object_key(out, first)?;
    serde_json::to_writer(&mut *out, key)?;
    formatter.end_object_key(out)?;
    formatter.begin_object_value(out)?;
    Ok(())
}

/// Write a complete `key: value` entry with a scalar value
fn write_entry<F: Formatter, V: Serialize + ?Sized>(
    out: &mut Vec<u8>,
    formatter: &mut F,
    key: &str,
    value: &V,
    first: bool,
) -> Result<()> {
    write_key(out, formatter, key, first)?;
    serde_json::to_writer(&mut *out, value)?;
    formatter.end_object_value(out)?;
    Ok(())
}
