//! JSON parameter-tree protocol used by firmware 2.8 adapters (`/dsiot/multireq`).

use serde::Deserialize;
use serde_json::{json, Value};

use crate::{Error, Result};

pub const MULTIREQ_PATH: &str = "dsiot/multireq";

pub const INDOOR_STATUS: &str = "/dsiot/edge/adr_0100.dgc_status";
pub const OUTDOOR_STATUS: &str = "/dsiot/edge/adr_0200.dgc_status";
pub const WEEK_POWER: &str = "/dsiot/edge/adr_0100.i_power.week_power";
pub const ADAPTER_INFO: &str = "/dsiot/edge.adp_i";

const WRITE_ROOT: &str = "dgc_status";
const OP_READ: u8 = 2;
const OP_WRITE: u8 = 3;

/// One `multireq` answer: a list of per-endpoint parameter trees.
#[derive(Debug, Clone, Deserialize)]
pub struct MultiResponse {
    #[serde(default)]
    pub responses: Vec<EndpointResponse>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EndpointResponse {
    pub fr: String,
    #[serde(default)]
    pub pc: Option<Node>,
    #[serde(default)]
    pub rsc: Option<u32>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Node {
    pub pn: String,
    #[serde(default)]
    pub pv: Option<Value>,
    #[serde(default)]
    pub pch: Vec<Node>,
}

/// Request reading every endpoint the session maps into canonical fields.
pub fn status_request() -> Value {
    json!({
        "requests": [
            { "op": OP_READ, "to": format!("{INDOOR_STATUS}?filter=pv,pt,md") },
            { "op": OP_READ, "to": format!("{OUTDOOR_STATUS}?filter=pv,pt,md") },
            { "op": OP_READ, "to": format!("{WEEK_POWER}?filter=pv,pt,md") },
            { "op": OP_READ, "to": ADAPTER_INFO },
        ]
    })
}

pub fn parse(body: &str) -> Result<MultiResponse> {
    serde_json::from_str(body).map_err(|e| Error::Protocol(format!("invalid multireq body: {e}")))
}

/// Walks the `pc`/`pch` tree of endpoint `from` along `path` (matched on `pn`)
/// and returns the leaf `pv`.
pub fn find_value<'a>(response: &'a MultiResponse, from: &str, path: &[&str]) -> Result<&'a Value> {
    let mut nodes: Vec<&'a Node> = response
        .responses
        .iter()
        .filter(|r| r.fr == from)
        .filter_map(|r| r.pc.as_ref())
        .collect();
    if nodes.is_empty() {
        return Err(Error::Protocol(format!("endpoint {from} missing from response")));
    }
    let (leaf, parents) = path
        .split_last()
        .ok_or_else(|| Error::Protocol("empty parameter path".to_string()))?;
    for segment in parents {
        let node = nodes
            .iter()
            .copied()
            .find(|n| n.pn == *segment)
            .ok_or_else(|| Error::Protocol(format!("key {segment} not found under {from}")))?;
        nodes = node.pch.iter().collect();
    }
    nodes
        .iter()
        .copied()
        .find(|n| n.pn == *leaf)
        .and_then(|n| n.pv.as_ref())
        .ok_or_else(|| Error::Protocol(format!("key {leaf} not found under {from}")))
}

pub fn find_str<'a>(response: &'a MultiResponse, from: &str, path: &[&str]) -> Result<&'a str> {
    find_value(response, from, path)?
        .as_str()
        .ok_or_else(|| Error::Protocol(format!("{} is not a string", path.join("."))))
}

/// Reads the first hex byte and scales it: `"32"` with divisor 2 is 25.0.
pub fn hex_to_temp(value: &str, divisor: f64) -> Result<f64> {
    let head = value.get(..2).unwrap_or(value);
    u8::from_str_radix(head, 16)
        .map(|raw| f64::from(raw) / divisor)
        .map_err(|_| Error::Protocol(format!("invalid hex temperature {value:?}")))
}

pub fn temp_to_hex(temperature: f64, divisor: f64) -> String {
    format!("{:02x}", (temperature * divisor) as i64)
}

pub fn hex_to_int(value: &str) -> Result<i64> {
    i64::from_str_radix(value, 16)
        .map_err(|_| Error::Protocol(format!("invalid hex value {value:?}")))
}

/// A single parameter write: `name = value` at `path` below endpoint `to`.
#[derive(Debug, Clone, PartialEq)]
pub struct TreeAttribute {
    pub name: String,
    pub value: String,
    pub path: Vec<&'static str>,
    pub to: &'static str,
}

impl TreeAttribute {
    pub fn new(name: impl Into<String>, value: impl Into<String>, path: &[&'static str], to: &'static str) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            path: path.to_vec(),
            to,
        }
    }
}

#[derive(Debug)]
struct WriteNode {
    pn: String,
    pv: Option<String>,
    pch: Vec<WriteNode>,
}

impl WriteNode {
    fn branch(pn: &str) -> Self {
        Self { pn: pn.to_string(), pv: None, pch: Vec::new() }
    }

    fn to_json(&self) -> Value {
        match &self.pv {
            Some(pv) => json!({ "pn": self.pn, "pv": pv }),
            None => json!({
                "pn": self.pn,
                "pch": self.pch.iter().map(WriteNode::to_json).collect::<Vec<_>>(),
            }),
        }
    }
}

fn insert(children: &mut Vec<WriteNode>, path: &[&str], leaf: WriteNode) {
    match path.split_first() {
        None => children.push(leaf),
        Some((head, rest)) => {
            let idx = match children.iter().position(|c| c.pn == *head && c.pv.is_none()) {
                Some(idx) => idx,
                None => {
                    children.push(WriteNode::branch(head));
                    children.len() - 1
                }
            };
            insert(&mut children[idx].pch, rest, leaf);
        }
    }
}

/// Batch of writes, serialized as one `op: 3` entry per target endpoint.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct TreeRequest {
    pub attributes: Vec<TreeAttribute>,
}

impl TreeRequest {
    pub fn new(attributes: Vec<TreeAttribute>) -> Self {
        Self { attributes }
    }

    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }

    pub fn to_json(&self) -> Value {
        let mut targets: Vec<(&str, WriteNode)> = Vec::new();
        for attribute in &self.attributes {
            let idx = match targets.iter().position(|(to, _)| *to == attribute.to) {
                Some(idx) => idx,
                None => {
                    targets.push((attribute.to, WriteNode::branch(WRITE_ROOT)));
                    targets.len() - 1
                }
            };
            let leaf = WriteNode {
                pn: attribute.name.clone(),
                pv: Some(attribute.value.clone()),
                pch: Vec::new(),
            };
            insert(&mut targets[idx].1.pch, &attribute.path, leaf);
        }
        let requests: Vec<Value> = targets
            .iter()
            .map(|(to, root)| json!({ "op": OP_WRITE, "pc": root.to_json(), "to": to }))
            .collect();
        json!({ "requests": requests })
    }
}
