//! # Payloads
//!
//! Domain values ([`Value`]) and their transportable, self-describing form
//! ([`Payload`]).
//!
//! A payload is a closed set of kinds. Two of them, [`PayloadKind::NdArray`]
//! and [`PayloadKind::Table`], can be merged along a batch axis; the other two
//! are opaque pass-through values. New kinds are added by extending
//! [`PayloadKind`] and the [`codec`] functions, never by inspecting values at
//! runtime.

pub mod codec;
pub mod ndarray;
pub mod table;

use std::fmt;
use bytes::Bytes;
use serde::{Deserialize, Serialize};

pub use codec::{from_payload, merge, split, to_payload};
pub use ndarray::{ArrayData, DType, Element, NdArray};
pub use table::{ColumnMeta, Table};

/// A single scalar argument or result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Scalar {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

/// A domain value handed to or returned from a model method.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Array(NdArray),
    Table(Table),
    Scalar(Scalar),
    /// Arbitrary structured object, passed through untouched
    Object(serde_json::Value),
}

impl Value {
    pub fn kind(&self) -> PayloadKind {
        match self {
            Value::Array(_) => PayloadKind::NdArray,
            Value::Table(_) => PayloadKind::Table,
            Value::Scalar(_) => PayloadKind::Scalar,
            Value::Object(_) => PayloadKind::Object,
        }
    }

    pub fn as_array(&self) -> Option<&NdArray> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Value::Table(table) => Some(table),
            _ => None,
        }
    }

    pub fn into_array(self) -> Option<NdArray> {
        match self {
            Value::Array(array) => Some(array),
            _ => None,
        }
    }
}

impl From<NdArray> for Value {
    fn from(value: NdArray) -> Self {
        Value::Array(value)
    }
}

impl From<Table> for Value {
    fn from(value: Table) -> Self {
        Value::Table(value)
    }
}

impl From<Scalar> for Value {
    fn from(value: Scalar) -> Self {
        Value::Scalar(value)
    }
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        Value::Object(value)
    }
}

/// The closed set of payload kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadKind {
    NdArray,
    Table,
    Scalar,
    Object,
}

impl PayloadKind {
    /// Whether payloads of this kind can be merged along a batch axis.
    pub fn is_batchable(self) -> bool {
        matches!(self, PayloadKind::NdArray | PayloadKind::Table)
    }
}

impl fmt::Display for PayloadKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PayloadKind::NdArray => "ndarray",
            PayloadKind::Table => "table",
            PayloadKind::Scalar => "scalar",
            PayloadKind::Object => "object",
        };
        f.write_str(name)
    }
}

/// Body of a payload: raw bytes for batchable kinds, a structured value otherwise.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayloadData {
    Raw(Bytes),
    Scalar(Scalar),
    Object(serde_json::Value),
}

/// Shape and type metadata needed to decode a payload.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PayloadMeta {
    /// Element type, for arrays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dtype: Option<DType>,
    /// Array shape, or `[rows]` for tables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub shape: Vec<usize>,
    /// Column schema, for tables
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub columns: Vec<ColumnMeta>,
    /// Axis the payload was produced for
    pub batch_axis: usize,
}

/// # Payload
///
/// The transportable representation of one argument or result. A payload is
/// created per call argument, consumed once by a merge or by the runnable, and
/// dropped once the caller has its response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub kind: PayloadKind,
    pub data: PayloadData,
    pub meta: PayloadMeta,
}

impl Payload {
    /// Size along the axis this payload was produced for.
    pub fn extent(&self) -> Option<usize> {
        self.extent_along(self.meta.batch_axis)
    }

    /// Size along `axis`, or `None` for unbatchable kinds and out-of-range axes.
    pub fn extent_along(&self, axis: usize) -> Option<usize> {
        match self.kind {
            PayloadKind::NdArray => self.meta.shape.get(axis).copied(),
            PayloadKind::Table if axis == crate::constant::TABLE_ROW_AXIS => self.meta.shape.first().copied(),
            _ => None,
        }
    }

    pub fn batch_axis(&self) -> usize {
        self.meta.batch_axis
    }
}
