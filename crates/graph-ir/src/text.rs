// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! The internal textual graph form.
//!
//! A simple line-oriented format for snapshotting and debugging — not
//! the external model format. Ids are renumbered densely on write, so a
//! graph that went through rewrite passes serialises without tombstones.
//!
//! ```text
//! graph {
//!   inputs: [0]
//!   outputs: [2]
//!   node {
//!     id: 0
//!     op_type: "Relu"
//!     name: "act"
//!     inputs: [0]
//!     outputs: [1]
//!     attrs: {}
//!   }
//!   value {
//!     id: 0
//!     name: "x"
//!     shape: [2, 2]
//!     dtype: f32
//!   }
//! }
//! ```
//!
//! Initializer payloads are carried as hex on a `data:` line so that a
//! snapshot of a loaded model remains runnable after a round-trip.

use crate::{Attribute, Graph, GraphError, NodeId, ValueId};
use std::collections::HashMap;
use std::fmt::Write as _;
use tensor_core::{DType, Shape, Tensor};

impl Graph {
    /// Serialises the graph to the textual form.
    pub fn to_text(&self) -> String {
        // Dense renumbering in iteration (id) order.
        let value_index: HashMap<ValueId, usize> = self
            .iter_values()
            .enumerate()
            .map(|(i, v)| (v.id(), i))
            .collect();

        let mut out = String::from("graph {\n");

        let list = |ids: &[ValueId]| -> String {
            let mapped: Vec<String> = ids
                .iter()
                .filter_map(|id| value_index.get(id))
                .map(|i| i.to_string())
                .collect();
            mapped.join(", ")
        };
        let _ = writeln!(out, "  inputs: [{}]", list(&self.inputs));
        let _ = writeln!(out, "  outputs: [{}]", list(&self.outputs));

        for (index, node) in self.iter_nodes().enumerate() {
            out.push_str("  node {\n");
            let _ = writeln!(out, "    id: {index}");
            let _ = writeln!(out, "    op_type: \"{}\"", node.op_type);
            if let Some(name) = &node.name {
                let _ = writeln!(out, "    name: \"{name}\"");
            }
            let _ = writeln!(out, "    inputs: [{}]", list(node.inputs()));
            let _ = writeln!(out, "    outputs: [{}]", list(node.outputs()));
            out.push_str("    attrs: {");
            let mut first = true;
            for (name, attr) in node.attrs.iter() {
                if !first {
                    out.push_str("; ");
                }
                first = false;
                match attr {
                    Attribute::F32(v) => {
                        let _ = write!(out, "{name} = f32:{v}");
                    }
                    Attribute::I64(v) => {
                        let _ = write!(out, "{name} = i64:{v}");
                    }
                    Attribute::Str(v) => {
                        let _ = write!(out, "{name} = str:\"{v}\"");
                    }
                    Attribute::F32s(v) => {
                        let joined: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                        let _ = write!(out, "{name} = f32s:{}", joined.join(","));
                    }
                    Attribute::I64s(v) => {
                        let joined: Vec<String> = v.iter().map(|x| x.to_string()).collect();
                        let _ = write!(out, "{name} = i64s:{}", joined.join(","));
                    }
                    // Tensor attributes are not part of the debug form.
                    Attribute::Tensor(_) => {
                        let _ = write!(out, "{name} = tensor:<elided>");
                    }
                }
            }
            out.push_str("}\n");
            out.push_str("  }\n");
        }

        for (index, value) in self.iter_values().enumerate() {
            out.push_str("  value {\n");
            let _ = writeln!(out, "    id: {index}");
            if let Some(name) = &value.name {
                let _ = writeln!(out, "    name: \"{name}\"");
            }
            if let Some(shape) = value.effective_shape() {
                let dims: Vec<String> = shape
                    .display_dims()
                    .iter()
                    .map(|&d| if d < 0 { "?".to_string() } else { d.to_string() })
                    .collect();
                let _ = writeln!(out, "    shape: [{}]", dims.join(", "));
            }
            let dtype = value.effective_dtype();
            if dtype != DType::Unknown {
                let _ = writeln!(out, "    dtype: {dtype}");
            }
            if value.is_initializer() {
                if let Some(tensor) = &value.tensor {
                    let _ = writeln!(out, "    data: {}", hex_encode(tensor.as_bytes()));
                }
            }
            out.push_str("  }\n");
        }

        out.push_str("}\n");
        out
    }

    /// Parses the textual form produced by [`to_text`](Graph::to_text).
    ///
    /// # Errors
    /// [`GraphError::Parse`] on any structural problem; the parsed graph
    /// is additionally validated before being returned.
    pub fn from_text(text: &str) -> Result<Graph, GraphError> {
        let mut nodes: Vec<NodeSpec> = Vec::new();
        let mut values: Vec<ValueSpec> = Vec::new();
        let mut input_ids: Vec<usize> = Vec::new();
        let mut output_ids: Vec<usize> = Vec::new();

        let mut lines = text.lines().peekable();
        while let Some(raw) = lines.next() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(rest) = line.strip_prefix("inputs:") {
                input_ids = parse_id_list(rest)?;
            } else if let Some(rest) = line.strip_prefix("outputs:") {
                output_ids = parse_id_list(rest)?;
            } else if line.starts_with("node {") {
                nodes.push(parse_node_block(&mut lines)?);
            } else if line.starts_with("value {") {
                values.push(parse_value_block(&mut lines)?);
            }
        }

        // Ids written by to_text are dense, but accept any order.
        nodes.sort_by_key(|n| n.id);
        values.sort_by_key(|v| v.id);
        for (i, spec) in values.iter().enumerate() {
            if spec.id != i {
                return Err(GraphError::Parse(format!(
                    "non-dense value ids: expected {i}, found {}",
                    spec.id
                )));
            }
        }
        for (i, spec) in nodes.iter().enumerate() {
            if spec.id != i {
                return Err(GraphError::Parse(format!(
                    "non-dense node ids: expected {i}, found {}",
                    spec.id
                )));
            }
        }

        let mut graph = Graph::new();
        for spec in &values {
            let id = graph.add_value();
            let value = graph.value_mut(id);
            value.name = spec.name.clone();
            if let Some(shape) = &spec.shape {
                value.shape = Some(shape.clone());
            }
            value.dtype = spec.dtype;
            if let Some(data) = &spec.data {
                let shape = spec.shape.clone().ok_or_else(|| {
                    GraphError::Parse(format!("value {} has data but no shape", spec.id))
                })?;
                let tensor = Tensor::from_bytes(shape, spec.dtype, data)
                    .map_err(|e| GraphError::Parse(format!("value {}: {e}", spec.id)))?;
                value.tensor = Some(tensor);
            }
        }
        let value_bound = values.len();
        let resolve = |id: usize| -> Result<ValueId, GraphError> {
            if id < value_bound {
                Ok(ValueId::from_index(id))
            } else {
                Err(GraphError::Parse(format!("unknown value id {id}")))
            }
        };

        for spec in &nodes {
            let id = graph.add_node(spec.op_type.clone(), spec.name.clone());
            debug_assert_eq!(id, NodeId::from_index(spec.id));
            for &input in &spec.inputs {
                let vid = resolve(input)?;
                graph.connect_input(id, vid);
            }
            for &output in &spec.outputs {
                let vid = resolve(output)?;
                graph.connect_output(id, vid);
            }
            for (name, attr) in &spec.attrs {
                graph.set_attr(id, name.clone(), attr.clone());
            }
        }

        for id in input_ids {
            graph.add_input(resolve(id)?);
        }
        for id in output_ids {
            graph.add_output(resolve(id)?);
        }

        graph
            .validate()
            .map_err(|e| GraphError::Parse(format!("parsed graph failed validation: {e}")))?;
        Ok(graph)
    }
}

struct NodeSpec {
    id: usize,
    op_type: String,
    name: Option<String>,
    inputs: Vec<usize>,
    outputs: Vec<usize>,
    attrs: Vec<(String, Attribute)>,
}

struct ValueSpec {
    id: usize,
    name: Option<String>,
    shape: Option<Shape>,
    dtype: DType,
    data: Option<Vec<u8>>,
}

fn parse_node_block<'a, I: Iterator<Item = &'a str>>(
    lines: &mut I,
) -> Result<NodeSpec, GraphError> {
    let mut spec = NodeSpec {
        id: usize::MAX,
        op_type: String::new(),
        name: None,
        inputs: Vec::new(),
        outputs: Vec::new(),
        attrs: Vec::new(),
    };
    for raw in lines.by_ref() {
        let line = raw.trim();
        if line == "}" {
            if spec.id == usize::MAX || spec.op_type.is_empty() {
                return Err(GraphError::Parse("node block missing id or op_type".into()));
            }
            return Ok(spec);
        }
        if let Some(rest) = line.strip_prefix("id:") {
            spec.id = parse_usize(rest)?;
        } else if let Some(rest) = line.strip_prefix("op_type:") {
            spec.op_type = parse_quoted(rest)?;
        } else if let Some(rest) = line.strip_prefix("name:") {
            spec.name = Some(parse_quoted(rest)?);
        } else if let Some(rest) = line.strip_prefix("inputs:") {
            spec.inputs = parse_id_list(rest)?;
        } else if let Some(rest) = line.strip_prefix("outputs:") {
            spec.outputs = parse_id_list(rest)?;
        } else if let Some(rest) = line.strip_prefix("attrs:") {
            spec.attrs = parse_attrs(rest)?;
        }
    }
    Err(GraphError::Parse("unterminated node block".into()))
}

fn parse_value_block<'a, I: Iterator<Item = &'a str>>(
    lines: &mut I,
) -> Result<ValueSpec, GraphError> {
    let mut spec = ValueSpec {
        id: usize::MAX,
        name: None,
        shape: None,
        dtype: DType::Unknown,
        data: None,
    };
    for raw in lines.by_ref() {
        let line = raw.trim();
        if line == "}" {
            if spec.id == usize::MAX {
                return Err(GraphError::Parse("value block missing id".into()));
            }
            return Ok(spec);
        }
        if let Some(rest) = line.strip_prefix("id:") {
            spec.id = parse_usize(rest)?;
        } else if let Some(rest) = line.strip_prefix("name:") {
            spec.name = Some(parse_quoted(rest)?);
        } else if let Some(rest) = line.strip_prefix("shape:") {
            spec.shape = Some(parse_shape(rest)?);
        } else if let Some(rest) = line.strip_prefix("dtype:") {
            let label = rest.trim();
            spec.dtype = DType::from_str_loose(label)
                .ok_or_else(|| GraphError::Parse(format!("unknown dtype '{label}'")))?;
        } else if let Some(rest) = line.strip_prefix("data:") {
            spec.data = Some(hex_decode(rest.trim())?);
        }
    }
    Err(GraphError::Parse("unterminated value block".into()))
}

fn parse_usize(text: &str) -> Result<usize, GraphError> {
    text.trim()
        .parse()
        .map_err(|_| GraphError::Parse(format!("expected integer, found '{}'", text.trim())))
}

fn parse_quoted(text: &str) -> Result<String, GraphError> {
    let trimmed = text.trim();
    trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .map(str::to_string)
        .ok_or_else(|| GraphError::Parse(format!("expected quoted string, found '{trimmed}'")))
}

fn parse_id_list(text: &str) -> Result<Vec<usize>, GraphError> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| GraphError::Parse(format!("expected [..] list, found '{text}'")))?;
    inner
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(parse_usize)
        .collect()
}

fn parse_shape(text: &str) -> Result<Shape, GraphError> {
    let inner = text
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .ok_or_else(|| GraphError::Parse(format!("expected [..] shape, found '{text}'")))?;
    let mut dims = Vec::new();
    let mut dynamic = Vec::new();
    for part in inner.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        if part == "?" {
            dims.push(-1);
            dynamic.push(true);
        } else {
            dims.push(
                part.parse()
                    .map_err(|_| GraphError::Parse(format!("bad shape dim '{part}'")))?,
            );
            dynamic.push(false);
        }
    }
    Ok(Shape::with_dynamic(dims, dynamic))
}

fn parse_attrs(text: &str) -> Result<Vec<(String, Attribute)>, GraphError> {
    let inner = text
        .trim()
        .strip_prefix('{')
        .and_then(|s| s.strip_suffix('}'))
        .ok_or_else(|| GraphError::Parse(format!("expected {{..}} attrs, found '{text}'")))?;
    let mut attrs = Vec::new();
    for entry in inner.split(';').map(str::trim).filter(|s| !s.is_empty()) {
        let (name, rest) = entry
            .split_once('=')
            .ok_or_else(|| GraphError::Parse(format!("bad attr entry '{entry}'")))?;
        let (kind, payload) = rest
            .trim()
            .split_once(':')
            .ok_or_else(|| GraphError::Parse(format!("bad attr value '{rest}'")))?;
        let attr = match kind.trim() {
            "f32" => Attribute::F32(
                payload
                    .parse()
                    .map_err(|_| GraphError::Parse(format!("bad f32 '{payload}'")))?,
            ),
            "i64" => Attribute::I64(
                payload
                    .parse()
                    .map_err(|_| GraphError::Parse(format!("bad i64 '{payload}'")))?,
            ),
            "str" => Attribute::Str(parse_quoted(payload)?),
            "f32s" => Attribute::F32s(
                payload
                    .split(',')
                    .map(|p| {
                        p.trim()
                            .parse()
                            .map_err(|_| GraphError::Parse(format!("bad f32 '{p}'")))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            "i64s" => Attribute::I64s(
                payload
                    .split(',')
                    .map(|p| {
                        p.trim()
                            .parse()
                            .map_err(|_| GraphError::Parse(format!("bad i64 '{p}'")))
                    })
                    .collect::<Result<_, _>>()?,
            ),
            "tensor" => continue, // elided on write; nothing to restore
            other => {
                return Err(GraphError::Parse(format!("unknown attr kind '{other}'")));
            }
        };
        attrs.push((name.trim().to_string(), attr));
    }
    Ok(attrs)
}

fn hex_encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        let _ = write!(out, "{b:02x}");
    }
    out
}

fn hex_decode(text: &str) -> Result<Vec<u8>, GraphError> {
    if text.len() % 2 != 0 {
        return Err(GraphError::Parse("odd-length hex payload".into()));
    }
    (0..text.len())
        .step_by(2)
        .map(|i| {
            u8::from_str_radix(&text[i..i + 2], 16)
                .map_err(|_| GraphError::Parse(format!("bad hex at offset {i}")))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_graph() -> Graph {
        let mut g = Graph::new();
        let x = g.add_named_value("x");
        let w = g.add_initializer(
            "w",
            Tensor::from_f32(Shape::vector(3), &[1.0, 2.0, 3.0]).unwrap(),
        );
        let y = g.add_named_value("y");
        let add = g.add_node("Add", Some("add0".into()));
        g.connect_input(add, x);
        g.connect_input(add, w);
        g.connect_output(add, y);
        g.set_attr(add, "axis", Attribute::I64(-1));
        g.set_attr(add, "scales", Attribute::F32s(vec![0.5, 1.5]));
        g.add_input(x);
        g.add_output(y);
        g.value_mut(x).shape = Some(Shape::vector(3));
        g.value_mut(x).dtype = DType::F32;
        g
    }

    #[test]
    fn test_roundtrip() {
        let g = sample_graph();
        let text = g.to_text();
        let back = Graph::from_text(&text).unwrap();

        assert_eq!(back.node_count(), 1);
        assert_eq!(back.value_count(), 3);
        assert_eq!(back.inputs().len(), 1);
        assert_eq!(back.outputs().len(), 1);

        let node = back.iter_nodes().next().unwrap();
        assert_eq!(node.op_type, "Add");
        assert_eq!(node.name.as_deref(), Some("add0"));
        assert_eq!(node.attrs.get_i64("axis"), Some(-1));
        assert_eq!(node.attrs.get_f32s("scales"), Some(&[0.5, 1.5][..]));
    }

    #[test]
    fn test_roundtrip_preserves_initializer_payload() {
        let g = sample_graph();
        let back = Graph::from_text(&g.to_text()).unwrap();
        let w = back.find_value_by_name("w").unwrap();
        let tensor = back.value(w).tensor.as_ref().unwrap();
        assert_eq!(tensor.as_f32(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn test_roundtrip_after_node_removal_renumbers() {
        let mut g = sample_graph();
        // Add a second consumer then remove it, leaving a tombstone.
        let y = g.find_value_by_name("y").unwrap();
        let z = g.add_value();
        let relu = g.add_node("Relu", None);
        g.connect_input(relu, y);
        g.connect_output(relu, z);
        g.remove_node(relu);

        let back = Graph::from_text(&g.to_text()).unwrap();
        assert_eq!(back.node_count(), 1);
        back.validate().unwrap();
    }

    #[test]
    fn test_dynamic_shape_roundtrip() {
        let mut g = sample_graph();
        let x = g.find_value_by_name("x").unwrap();
        let mut shape = Shape::new(vec![-1, 3]);
        shape.mark_dynamic(0);
        g.value_mut(x).shape = Some(shape);

        let back = Graph::from_text(&g.to_text()).unwrap();
        let x = back.find_value_by_name("x").unwrap();
        let shape = back.value(x).shape.as_ref().unwrap();
        assert!(shape.is_dim_dynamic(0));
        assert_eq!(shape.dim(1), Some(3));
    }

    #[test]
    fn test_parse_garbage_fails() {
        assert!(Graph::from_text("not a graph").is_err());
        assert!(Graph::from_text("graph {\n  node {\n").is_err());
    }

    #[test]
    fn test_hex_roundtrip() {
        let data = [0u8, 1, 0xAB, 0xFF];
        assert_eq!(hex_decode(&hex_encode(&data)).unwrap(), data);
        assert!(hex_decode("abc").is_err());
        assert!(hex_decode("zz").is_err());
    }
}
