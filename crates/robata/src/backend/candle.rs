use candle_core::{Device, Tensor};
use super::Batchable;
use crate::error::{Result, RobataError};
use crate::payload::{ArrayData, DType, NdArray};

fn batch_error(err: candle_core::Error) -> RobataError {
    RobataError::incompatible(err.to_string())
}

impl Batchable for Tensor {
    fn extent(&self, axis: usize) -> Option<usize> {
        self.dims().get(axis).copied()
    }

    fn cat(items: &[Self], axis: usize) -> Result<Self> {
        if let Some(first) = items.first() {
            if let Some(other) = items.iter().find(|t| t.dtype() != first.dtype()) {
                return Err(RobataError::type_mismatch(format!(
                    "cannot batch {:?} tensors with {:?} tensors",
                    first.dtype(),
                    other.dtype()
                )));
            }
        }
        Tensor::cat(items, axis).map_err(batch_error)
    }

    fn slice(&self, axis: usize, start: usize, len: usize) -> Result<Self> {
        self.narrow(axis, start, len).map_err(batch_error)
    }
}

impl TryFrom<&Tensor> for NdArray {
    type Error = RobataError;

    fn try_from(tensor: &Tensor) -> Result<Self> {
        let shape = tensor.dims().to_vec();
        let flat = tensor.flatten_all().map_err(batch_error)?;
        let data = match tensor.dtype() {
            candle_core::DType::U8 => flat.to_vec1::<u8>().map(ArrayData::U8),
            candle_core::DType::I64 => flat.to_vec1::<i64>().map(ArrayData::I64),
            candle_core::DType::F32 => flat.to_vec1::<f32>().map(ArrayData::F32),
            candle_core::DType::F64 => flat.to_vec1::<f64>().map(ArrayData::F64),
            other => {
                return Err(RobataError::type_mismatch(format!(
                    "{other:?} tensors have no array equivalent"
                )));
            }
        }
        .map_err(batch_error)?;
        NdArray::new(shape, data)
    }
}

impl NdArray {
    /// Copies the array into a tensor on `device`.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor> {
        let shape = self.shape().to_vec();
        let tensor = match self.data() {
            ArrayData::U8(values) => Tensor::from_vec(values.clone(), shape, device),
            ArrayData::I64(values) => Tensor::from_vec(values.clone(), shape, device),
            ArrayData::F32(values) => Tensor::from_vec(values.clone(), shape, device),
            ArrayData::F64(values) => Tensor::from_vec(values.clone(), shape, device),
            data @ (ArrayData::Bool(_) | ArrayData::I32(_)) => {
                return Err(RobataError::type_mismatch(format!(
                    "{} arrays have no tensor equivalent",
                    data.dtype()
                )));
            }
        };
        tensor.map_err(batch_error)
    }
}

impl DType {
    /// Matching candle element type, if candle has one.
    pub fn to_candle(self) -> Option<candle_core::DType> {
        match self {
            DType::U8 => Some(candle_core::DType::U8),
            DType::I64 => Some(candle_core::DType::I64),
            DType::F32 => Some(candle_core::DType::F32),
            DType::F64 => Some(candle_core::DType::F64),
            DType::Bool | DType::I32 => None,
        }
    }
}
