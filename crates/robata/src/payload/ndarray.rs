use std::fmt;
use serde::{Deserialize, Serialize};
use crate::backend::Batchable;
use crate::error::{Result, RobataError};

/// Element type of an [`NdArray`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    U8,
    I32,
    I64,
    F32,
    F64,
}

impl DType {
    /// Width of one encoded element in bytes
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::Bool | DType::U8 => 1,
            DType::I32 | DType::F32 => 4,
            DType::I64 | DType::F64 => 8,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            DType::Bool => "bool",
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::I64 => "i64",
            DType::F32 => "f32",
            DType::F64 => "f64",
        };
        f.write_str(name)
    }
}

/// Typed, row-major element storage.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Bool(Vec<bool>),
    U8(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

/// Runs `$body` with `$T` aliased to the rust type of `$dtype`.
macro_rules! dispatch_dtype {
    ($dtype:expr, $T:ident => $body:expr) => {
        match $dtype {
            DType::Bool => { type $T = bool; $body }
            DType::U8 => { type $T = u8; $body }
            DType::I32 => { type $T = i32; $body }
            DType::I64 => { type $T = i64; $body }
            DType::F32 => { type $T = f32; $body }
            DType::F64 => { type $T = f64; $body }
        }
    };
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::Bool(_) => DType::Bool,
            ArrayData::U8(_) => DType::U8,
            ArrayData::I32(_) => DType::I32,
            ArrayData::I64(_) => DType::I64,
            ArrayData::F32(_) => DType::F32,
            ArrayData::F64(_) => DType::F64,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Bool(v) => v.len(),
            ArrayData::U8(v) => v.len(),
            ArrayData::I32(v) => v.len(),
            ArrayData::I64(v) => v.len(),
            ArrayData::F32(v) => v.len(),
            ArrayData::F64(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Little-endian encoding of every element, in storage order
    pub fn to_le_bytes(&self) -> Vec<u8> {
        dispatch_dtype!(self.dtype(), T => encode_le(T::values(self).unwrap_or(&[])))
    }

    /// Decodes elements written by [`ArrayData::to_le_bytes`].
    pub fn from_le_bytes(dtype: DType, bytes: &[u8]) -> Result<Self> {
        if bytes.len() % dtype.size_in_bytes() != 0 {
            return Err(RobataError::malformed(format!(
                "{} bytes is not a whole number of {dtype} elements",
                bytes.len()
            )));
        }
        Ok(dispatch_dtype!(dtype, T => T::into_data(decode_le::<T>(bytes))))
    }
}

/// A rust primitive that can live inside an [`NdArray`].
pub trait Element: Copy + PartialEq + fmt::Debug + Send + Sync + 'static {
    const DTYPE: DType;

    fn into_data(values: Vec<Self>) -> ArrayData;

    fn values(data: &ArrayData) -> Option<&[Self]>;

    fn write_le(self, out: &mut Vec<u8>);

    fn read_le(bytes: &[u8]) -> Self;
}

macro_rules! numeric_element {
    ($t:ty, $variant:ident) => {
        impl Element for $t {
            const DTYPE: DType = DType::$variant;

            fn into_data(values: Vec<Self>) -> ArrayData {
                ArrayData::$variant(values)
            }

            fn values(data: &ArrayData) -> Option<&[Self]> {
                match data {
                    ArrayData::$variant(v) => Some(v),
                    _ => None,
                }
            }

            fn write_le(self, out: &mut Vec<u8>) {
                out.extend_from_slice(&self.to_le_bytes());
            }

            fn read_le(bytes: &[u8]) -> Self {
                let mut buf = [0u8; std::mem::size_of::<$t>()];
                buf.copy_from_slice(bytes);
                <$t>::from_le_bytes(buf)
            }
        }
    };
}

numeric_element!(u8, U8);
numeric_element!(i32, I32);
numeric_element!(i64, I64);
numeric_element!(f32, F32);
numeric_element!(f64, F64);

impl Element for bool {
    const DTYPE: DType = DType::Bool;

    fn into_data(values: Vec<Self>) -> ArrayData {
        ArrayData::Bool(values)
    }

    fn values(data: &ArrayData) -> Option<&[Self]> {
        match data {
            ArrayData::Bool(v) => Some(v),
            _ => None,
        }
    }

    fn write_le(self, out: &mut Vec<u8>) {
        out.push(self as u8);
    }

    fn read_le(bytes: &[u8]) -> Self {
        bytes[0] != 0
    }
}

fn encode_le<T: Element>(values: &[T]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * T::DTYPE.size_in_bytes());
    for &value in values {
        value.write_le(&mut out);
    }
    out
}

fn decode_le<T: Element>(bytes: &[u8]) -> Vec<T> {
    bytes
        .chunks_exact(T::DTYPE.size_in_bytes())
        .map(T::read_le)
        .collect()
}

/// # NdArray
///
/// A fixed-rank, row-major numeric array. This is the payload kind most
/// batchable methods consume: callers' arrays are concatenated along the
/// method's batch axis and the output array is sliced back along its own axis.
#[derive(Debug, Clone, PartialEq)]
pub struct NdArray {
    shape: Vec<usize>,
    data: ArrayData,
}

impl NdArray {
    /// Creates an array, checking that `shape` describes exactly `data.len()` elements.
    pub fn new(shape: Vec<usize>, data: ArrayData) -> Result<Self> {
        let expected = element_count(&shape)?;
        if expected != data.len() {
            return Err(RobataError::malformed(format!(
                "shape {:?} needs {expected} elements but {} were supplied",
                shape,
                data.len()
            )));
        }
        Ok(Self { shape, data })
    }

    pub fn from_vec<T: Element>(shape: Vec<usize>, values: Vec<T>) -> Result<Self> {
        Self::new(shape, T::into_data(values))
    }

    /// Builds a rank 2 array from equally long rows.
    pub fn from_rows<T: Element>(rows: Vec<Vec<T>>) -> Result<Self> {
        let width = rows.first().map(Vec::len).unwrap_or(0);
        if rows.iter().any(|row| row.len() != width) {
            return Err(RobataError::malformed("rows of a matrix must have equal length"));
        }
        let height = rows.len();
        let values = rows.into_iter().flatten().collect();
        Self::from_vec(vec![height, width], values)
    }

    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    pub fn rank(&self) -> usize {
        self.shape.len()
    }

    pub fn dtype(&self) -> DType {
        self.data.dtype()
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn data(&self) -> &ArrayData {
        &self.data
    }

    pub fn into_data(self) -> ArrayData {
        self.data
    }

    /// Borrow the elements as `T`, or `None` if the dtype is not `T`.
    pub fn as_slice<T: Element>(&self) -> Option<&[T]> {
        T::values(&self.data)
    }

    pub fn to_le_bytes(&self) -> Vec<u8> {
        self.data.to_le_bytes()
    }

    pub fn from_le_bytes(dtype: DType, shape: Vec<usize>, bytes: &[u8]) -> Result<Self> {
        let expected = element_count(&shape)?
            .checked_mul(dtype.size_in_bytes())
            .ok_or_else(|| RobataError::malformed(format!("{dtype} array of shape {shape:?} is too large")))?;
        if bytes.len() != expected {
            return Err(RobataError::malformed(format!(
                "{dtype} array of shape {:?} needs {expected} bytes, got {}",
                shape,
                bytes.len()
            )));
        }
        Self::new(shape, ArrayData::from_le_bytes(dtype, bytes)?)
    }

    fn check_axis(&self, axis: usize) -> Result<()> {
        if axis >= self.rank() {
            return Err(RobataError::incompatible(format!(
                "axis {axis} is out of range for an array of rank {}",
                self.rank()
            )));
        }
        Ok(())
    }
}

/// Number of elements `shape` describes, failing instead of overflowing.
fn element_count(shape: &[usize]) -> Result<usize> {
    shape
        .iter()
        .try_fold(1usize, |count, &dim| count.checked_mul(dim))
        .ok_or_else(|| RobataError::malformed(format!("shape {shape:?} overflows the element count")))
}

fn concat_typed<T: Element>(items: &[NdArray], axis: usize) -> Vec<T> {
    let outer: usize = items[0].shape[..axis].iter().product();
    let total = items.iter().map(NdArray::len).sum();
    let mut out = Vec::with_capacity(total);
    for o in 0..outer {
        for item in items {
            let chunk: usize = item.shape[axis..].iter().product();
            let values = item.as_slice::<T>().unwrap_or(&[]);
            out.extend_from_slice(&values[o * chunk..(o + 1) * chunk]);
        }
    }
    out
}

fn slice_typed<T: Element>(array: &NdArray, axis: usize, start: usize, len: usize) -> Vec<T> {
    let values = array.as_slice::<T>().unwrap_or(&[]);
    let inner: usize = array.shape[axis + 1..].iter().product();
    let outer: usize = array.shape[..axis].iter().product();
    let row = array.shape[axis] * inner;
    let mut out = Vec::with_capacity(outer * len * inner);
    for o in 0..outer {
        let base = o * row + start * inner;
        out.extend_from_slice(&values[base..base + len * inner]);
    }
    out
}

impl Batchable for NdArray {
    fn extent(&self, axis: usize) -> Option<usize> {
        self.shape.get(axis).copied()
    }

    fn cat(items: &[Self], axis: usize) -> Result<Self> {
        let first = items
            .first()
            .ok_or_else(|| RobataError::malformed("cannot concatenate an empty list of arrays"))?;
        first.check_axis(axis)?;

        for item in &items[1..] {
            if item.rank() != first.rank() {
                return Err(RobataError::incompatible(format!(
                    "cannot concatenate arrays of rank {} and {}",
                    first.rank(),
                    item.rank()
                )));
            }
            if item.dtype() != first.dtype() {
                return Err(RobataError::type_mismatch(format!(
                    "cannot concatenate {} and {} arrays",
                    first.dtype(),
                    item.dtype()
                )));
            }
            let other_dims_match = first
                .shape
                .iter()
                .zip(&item.shape)
                .enumerate()
                .all(|(dim, (a, b))| dim == axis || a == b);
            if !other_dims_match {
                return Err(RobataError::incompatible(format!(
                    "shapes {:?} and {:?} differ outside axis {axis}",
                    first.shape, item.shape
                )));
            }
        }

        let mut shape = first.shape.clone();
        shape[axis] = items.iter().map(|item| item.shape[axis]).sum();
        let data = dispatch_dtype!(first.dtype(), T => T::into_data(concat_typed::<T>(items, axis)));
        Self::new(shape, data)
    }

    fn slice(&self, axis: usize, start: usize, len: usize) -> Result<Self> {
        self.check_axis(axis)?;
        if start + len > self.shape[axis] {
            return Err(RobataError::malformed(format!(
                "slice {start}..{} exceeds axis {axis} of size {}",
                start + len,
                self.shape[axis]
            )));
        }
        let mut shape = self.shape.clone();
        shape[axis] = len;
        let data = dispatch_dtype!(self.dtype(), T => T::into_data(slice_typed::<T>(self, axis, start, len)));
        Self::new(shape, data)
    }
}
