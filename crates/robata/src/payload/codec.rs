//! Conversion between [`Value`]s and [`Payload`]s, and the batch merge/split
//! operations on payloads.

use bytes::Bytes;
use crate::backend::Batchable;
use crate::error::{Result, RobataError};
use super::{NdArray, Payload, PayloadData, PayloadKind, PayloadMeta, Table, Value};

/// Encodes `value`, recording `batch_axis` as the axis it is meant to be batched along.
///
/// Encoding never fails; whether the axis is usable is decided by [`merge`].
pub fn to_payload(value: &Value, batch_axis: usize) -> Payload {
    match value {
        Value::Array(array) => encode_array(array, batch_axis),
        Value::Table(table) => encode_table(table, batch_axis),
        Value::Scalar(scalar) => Payload {
            kind: PayloadKind::Scalar,
            data: PayloadData::Scalar(scalar.clone()),
            meta: PayloadMeta { batch_axis, ..Default::default() },
        },
        Value::Object(object) => Payload {
            kind: PayloadKind::Object,
            data: PayloadData::Object(object.clone()),
            meta: PayloadMeta { batch_axis, ..Default::default() },
        },
    }
}

/// Decodes a payload back into the value it was produced from.
pub fn from_payload(payload: &Payload) -> Result<Value> {
    match (payload.kind, &payload.data) {
        (PayloadKind::NdArray, PayloadData::Raw(bytes)) => {
            let dtype = payload
                .meta
                .dtype
                .ok_or_else(|| RobataError::malformed("array payload carries no dtype"))?;
            Ok(Value::Array(NdArray::from_le_bytes(dtype, payload.meta.shape.clone(), bytes)?))
        }
        (PayloadKind::Table, PayloadData::Raw(bytes)) => {
            let rows = payload
                .meta
                .shape
                .first()
                .copied()
                .ok_or_else(|| RobataError::malformed("table payload carries no row count"))?;
            Ok(Value::Table(Table::from_le_bytes(&payload.meta.columns, rows, bytes)?))
        }
        (PayloadKind::Scalar, PayloadData::Scalar(scalar)) => Ok(Value::Scalar(scalar.clone())),
        (PayloadKind::Object, PayloadData::Object(object)) => Ok(Value::Object(object.clone())),
        (kind, _) => Err(RobataError::malformed(format!(
            "{kind} payload has a body of the wrong shape"
        ))),
    }
}

/// Merges same-kind payloads along `axis` into one batched payload.
///
/// Only batchable kinds can be merged; mixing kinds, ranks or shapes fails
/// with [`RobataError::IncompatibleBatch`], mixing element types with
/// [`RobataError::TypeMismatch`].
pub fn merge(payloads: &[Payload], axis: usize) -> Result<Payload> {
    let first = payloads
        .first()
        .ok_or_else(|| RobataError::malformed("cannot merge an empty batch"))?;
    check_mergeable(payloads)?;

    match first.kind {
        PayloadKind::NdArray => {
            let arrays = payloads.iter().map(decode_array).collect::<Result<Vec<_>>>()?;
            Ok(encode_array(&NdArray::cat(&arrays, axis)?, axis))
        }
        PayloadKind::Table => {
            let tables = payloads.iter().map(decode_table).collect::<Result<Vec<_>>>()?;
            Ok(encode_table(&Table::cat(&tables, axis)?, axis))
        }
        kind => Err(RobataError::incompatible(format!("{kind} payloads cannot be batched"))),
    }
}

/// Splits a batched payload along `axis` into one payload per entry of `extents`.
///
/// The extents must add up to the payload's size along `axis`, otherwise the
/// batch cannot be reconstructed and [`RobataError::MalformedBatch`] is returned.
pub fn split(payload: &Payload, axis: usize, extents: &[usize]) -> Result<Vec<Payload>> {
    match payload.kind {
        PayloadKind::NdArray => Ok(decode_array(payload)?
            .split(axis, extents)?
            .iter()
            .map(|array| encode_array(array, axis))
            .collect()),
        PayloadKind::Table => Ok(decode_table(payload)?
            .split(axis, extents)?
            .iter()
            .map(|table| encode_table(table, axis))
            .collect()),
        kind => Err(RobataError::malformed(format!(
            "cannot split a {kind} payload into batch items"
        ))),
    }
}

fn check_mergeable(payloads: &[Payload]) -> Result<()> {
    let kind = payloads[0].kind;
    if let Some(other) = payloads.iter().find(|p| p.kind != kind) {
        return Err(RobataError::incompatible(format!(
            "cannot batch {kind} together with {}",
            other.kind
        )));
    }
    if !kind.is_batchable() {
        return Err(RobataError::incompatible(format!("{kind} payloads cannot be batched")));
    }
    Ok(())
}

fn encode_array(array: &NdArray, batch_axis: usize) -> Payload {
    Payload {
        kind: PayloadKind::NdArray,
        data: PayloadData::Raw(Bytes::from(array.to_le_bytes())),
        meta: PayloadMeta {
            dtype: Some(array.dtype()),
            shape: array.shape().to_vec(),
            columns: vec![],
            batch_axis,
        },
    }
}

fn encode_table(table: &Table, batch_axis: usize) -> Payload {
    Payload {
        kind: PayloadKind::Table,
        data: PayloadData::Raw(Bytes::from(table.to_le_bytes())),
        meta: PayloadMeta {
            dtype: None,
            shape: vec![table.num_rows()],
            columns: table.schema(),
            batch_axis,
        },
    }
}

fn decode_array(payload: &Payload) -> Result<NdArray> {
    match from_payload(payload)? {
        Value::Array(array) => Ok(array),
        _ => Err(RobataError::malformed("expected an array payload")),
    }
}

fn decode_table(payload: &Payload) -> Result<Table> {
    match from_payload(payload)? {
        Value::Table(table) => Ok(table),
        _ => Err(RobataError::malformed("expected a table payload")),
    }
}
