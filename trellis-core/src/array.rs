//! Dtype-tagged n-dimensional arrays.
//!
//! [`Array`] is the leaf value carried by observations, actions, rewards and any other
//! field of time steps and trajectories. It wraps [`ndarray::ArrayD`] of one of the
//! element types listed in [`DType`].
use crate::error::TrellisError;
use anyhow::Result;
use ndarray::{ArrayD, Axis, IxDyn, Slice};
use serde::{Deserialize, Serialize};
use std::fmt;
use xxhash_rust::xxh3::Xxh3;

/// Element type of an [`Array`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit float.
    F32,
    /// 64-bit float.
    F64,
    /// 32-bit signed integer.
    I32,
    /// 64-bit signed integer.
    I64,
    /// 8-bit unsigned integer.
    U8,
    /// 16-bit unsigned integer.
    U16,
}

impl DType {
    /// Returns `true` for floating point types.
    pub fn is_float(&self) -> bool {
        matches!(self, DType::F32 | DType::F64)
    }

    /// Name in the numpy convention, e.g. `"float32"`.
    pub fn name(&self) -> &'static str {
        match self {
            DType::F32 => "float32",
            DType::F64 => "float64",
            DType::I32 => "int32",
            DType::I64 => "int64",
            DType::U8 => "uint8",
            DType::U16 => "uint16",
        }
    }

    /// Parses a numpy dtype name.
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "float32" => Some(DType::F32),
            "float64" => Some(DType::F64),
            "int32" => Some(DType::I32),
            "int64" => Some(DType::I64),
            "uint8" => Some(DType::U8),
            "uint16" => Some(DType::U16),
            _ => None,
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// An n-dimensional array with a runtime element type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Array {
    /// `float32` elements.
    F32(ArrayD<f32>),
    /// `float64` elements.
    F64(ArrayD<f64>),
    /// `int32` elements.
    I32(ArrayD<i32>),
    /// `int64` elements.
    I64(ArrayD<i64>),
    /// `uint8` elements.
    U8(ArrayD<u8>),
    /// `uint16` elements.
    U16(ArrayD<u16>),
}

/// Applies an expression to the inner [`ArrayD`] whatever its element type is.
macro_rules! with_array {
    ($array:expr, $a:ident => $body:expr) => {
        match $array {
            Array::F32($a) => $body,
            Array::F64($a) => $body,
            Array::I32($a) => $body,
            Array::I64($a) => $body,
            Array::U8($a) => $body,
            Array::U16($a) => $body,
        }
    };
}

/// Like `with_array`, but wraps the result into the variant of the input.
macro_rules! map_array {
    ($array:expr, $a:ident => $body:expr) => {
        match $array {
            Array::F32($a) => Array::F32($body),
            Array::F64($a) => Array::F64($body),
            Array::I32($a) => Array::I32($body),
            Array::I64($a) => Array::I64($body),
            Array::U8($a) => Array::U8($body),
            Array::U16($a) => Array::U16($body),
        }
    };
}

/// Builds an array of the given dtype from `f64` values.
macro_rules! from_f64s {
    ($dtype:expr, $shape:expr, $values:expr) => {{
        let shape = IxDyn($shape);
        let values = $values;
        match $dtype {
            DType::F32 => Array::F32(ArrayD::from_shape_vec(
                shape,
                values.iter().map(|v| *v as f32).collect(),
            )?),
            DType::F64 => Array::F64(ArrayD::from_shape_vec(shape, values)?),
            DType::I32 => Array::I32(ArrayD::from_shape_vec(
                shape,
                values.iter().map(|v| *v as i32).collect(),
            )?),
            DType::I64 => Array::I64(ArrayD::from_shape_vec(
                shape,
                values.iter().map(|v| *v as i64).collect(),
            )?),
            DType::U8 => Array::U8(ArrayD::from_shape_vec(
                shape,
                values.iter().map(|v| *v as u8).collect(),
            )?),
            DType::U16 => Array::U16(ArrayD::from_shape_vec(
                shape,
                values.iter().map(|v| *v as u16).collect(),
            )?),
        }
    }};
}

macro_rules! impl_from_arrayd {
    ($($t:ty => $variant:ident),*) => {
        $(
            impl From<ArrayD<$t>> for Array {
                fn from(a: ArrayD<$t>) -> Self {
                    Array::$variant(a)
                }
            }
        )*
    };
}

impl_from_arrayd!(f32 => F32, f64 => F64, i32 => I32, i64 => I64, u8 => U8, u16 => U16);

fn shape_error(e: ndarray::ShapeError) -> TrellisError {
    TrellisError::ShapeMismatch(e.to_string())
}

impl Array {
    /// Element type.
    pub fn dtype(&self) -> DType {
        match self {
            Array::F32(_) => DType::F32,
            Array::F64(_) => DType::F64,
            Array::I32(_) => DType::I32,
            Array::I64(_) => DType::I64,
            Array::U8(_) => DType::U8,
            Array::U16(_) => DType::U16,
        }
    }

    /// Shape of the array.
    pub fn shape(&self) -> &[usize] {
        with_array!(self, a => a.shape())
    }

    /// Number of dimensions.
    pub fn ndim(&self) -> usize {
        self.shape().len()
    }

    /// Total number of elements.
    pub fn num_elements(&self) -> usize {
        with_array!(self, a => a.len())
    }

    /// An array filled with zeros.
    pub fn zeros(dtype: DType, shape: &[usize]) -> Self {
        let shape = IxDyn(shape);
        match dtype {
            DType::F32 => Array::F32(ArrayD::zeros(shape)),
            DType::F64 => Array::F64(ArrayD::zeros(shape)),
            DType::I32 => Array::I32(ArrayD::zeros(shape)),
            DType::I64 => Array::I64(ArrayD::zeros(shape)),
            DType::U8 => Array::U8(ArrayD::zeros(shape)),
            DType::U16 => Array::U16(ArrayD::zeros(shape)),
        }
    }

    /// A zero-dimensional `float32` array.
    pub fn scalar_f32(v: f32) -> Self {
        Array::F32(ArrayD::from_elem(IxDyn(&[]), v))
    }

    /// A zero-dimensional `int32` array.
    pub fn scalar_i32(v: i32) -> Self {
        Array::I32(ArrayD::from_elem(IxDyn(&[]), v))
    }

    /// A zero-dimensional `int64` array.
    pub fn scalar_i64(v: i64) -> Self {
        Array::I64(ArrayD::from_elem(IxDyn(&[]), v))
    }

    /// A one-dimensional `float32` array.
    pub fn vec_f32(v: Vec<f32>) -> Self {
        Array::F32(ndarray::Array1::from(v).into_dyn())
    }

    /// A one-dimensional `int64` array.
    pub fn vec_i64(v: Vec<i64>) -> Self {
        Array::I64(ndarray::Array1::from(v).into_dyn())
    }

    /// An array filled with `value`, casted to `dtype`.
    pub fn full(dtype: DType, shape: &[usize], value: f64) -> Self {
        let shape = IxDyn(shape);
        match dtype {
            DType::F32 => Array::F32(ArrayD::from_elem(shape, value as f32)),
            DType::F64 => Array::F64(ArrayD::from_elem(shape, value)),
            DType::I32 => Array::I32(ArrayD::from_elem(shape, value as i32)),
            DType::I64 => Array::I64(ArrayD::from_elem(shape, value as i64)),
            DType::U8 => Array::U8(ArrayD::from_elem(shape, value as u8)),
            DType::U16 => Array::U16(ArrayD::from_elem(shape, value as u16)),
        }
    }

    /// Builds an array of `dtype` from `f64` values in row-major order.
    pub fn from_f64_vec(dtype: DType, shape: &[usize], values: Vec<f64>) -> Result<Self> {
        Ok(from_f64s!(dtype, shape, values))
    }

    /// Builds an array of `dtype` from `f32` values in row-major order.
    pub fn from_f32_vec(dtype: DType, shape: &[usize], values: Vec<f32>) -> Result<Self> {
        Self::from_f64_vec(dtype, shape, values.into_iter().map(|v| v as f64).collect())
    }

    /// Elements casted to `f32`, in row-major order.
    pub fn to_f32_vec(&self) -> Vec<f32> {
        with_array!(self, a => a.iter().map(|v| *v as f32).collect())
    }

    /// Elements casted to `f64`, in row-major order.
    pub fn to_f64_vec(&self) -> Vec<f64> {
        with_array!(self, a => a.iter().map(|v| *v as f64).collect())
    }

    /// Casts the array to another element type.
    pub fn cast(&self, dtype: DType) -> Result<Self> {
        if dtype == self.dtype() {
            return Ok(self.clone());
        }
        Self::from_f64_vec(dtype, self.shape(), self.to_f64_vec())
    }

    /// Reshapes the array. The number of elements must not change.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        Ok(map_array!(self, a => {
            ArrayD::from_shape_vec(IxDyn(shape), a.iter().cloned().collect())
                .map_err(shape_error)?
        }))
    }

    /// Adds an axis of length one at `axis`.
    pub fn insert_axis(&self, axis: usize) -> Result<Self> {
        if axis > self.ndim() {
            return Err(TrellisError::ShapeMismatch(format!(
                "Cannot insert axis {} into an array of rank {}",
                axis,
                self.ndim()
            ))
            .into());
        }
        let mut shape = self.shape().to_vec();
        shape.insert(axis, 1);
        self.reshape(&shape)
    }

    /// Takes index `i` along `axis`, keeping the axis with length one.
    pub fn index_axis_keep(&self, axis: usize, i: usize) -> Result<Self> {
        if axis >= self.ndim() || i >= self.shape()[axis] {
            return Err(TrellisError::ShapeMismatch(format!(
                "Index {} along axis {} is out of range for shape {:?}",
                i,
                axis,
                self.shape()
            ))
            .into());
        }
        Ok(map_array!(self, a => a.slice_axis(Axis(axis), Slice::from(i..i + 1)).to_owned()))
    }

    /// Concatenates arrays along an existing axis.
    pub fn concatenate(arrays: &[Array], axis: usize) -> Result<Self> {
        let first = arrays
            .first()
            .ok_or_else(|| TrellisError::ShapeMismatch("Nothing to concatenate".to_string()))?;
        macro_rules! concat_variant {
            ($variant:ident) => {{
                let views = arrays
                    .iter()
                    .map(|x| match x {
                        Array::$variant(a) => Ok(a.view()),
                        other => Err(TrellisError::DTypeMismatch {
                            expected: first.dtype().to_string(),
                            got: other.dtype().to_string(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Array::$variant(ndarray::concatenate(Axis(axis), &views).map_err(shape_error)?)
            }};
        }
        Ok(match first {
            Array::F32(_) => concat_variant!(F32),
            Array::F64(_) => concat_variant!(F64),
            Array::I32(_) => concat_variant!(I32),
            Array::I64(_) => concat_variant!(I64),
            Array::U8(_) => concat_variant!(U8),
            Array::U16(_) => concat_variant!(U16),
        })
    }

    /// 64-bit xxh3 digest of the dtype, the shape and the element bytes.
    pub fn hash64(&self) -> u64 {
        let mut hasher = Xxh3::new();
        hasher.update(self.dtype().name().as_bytes());
        for d in self.shape() {
            hasher.update(&(*d as u64).to_le_bytes());
        }
        let mut bytes = Vec::with_capacity(self.num_elements() * 8);
        with_array!(self, a => {
            for v in a.iter() {
                bytes.extend_from_slice(&v.to_le_bytes());
            }
        });
        hasher.update(&bytes);
        hasher.digest()
    }

    /// Reference to the inner `float32` array, if the dtype matches.
    pub fn as_f32(&self) -> Option<&ArrayD<f32>> {
        match self {
            Array::F32(a) => Some(a),
            _ => None,
        }
    }

    /// Reference to the inner `int32` array, if the dtype matches.
    pub fn as_i32(&self) -> Option<&ArrayD<i32>> {
        match self {
            Array::I32(a) => Some(a),
            _ => None,
        }
    }

    /// Reference to the inner `int64` array, if the dtype matches.
    pub fn as_i64(&self) -> Option<&ArrayD<i64>> {
        match self {
            Array::I64(a) => Some(a),
            _ => None,
        }
    }
}

/// Stacking along a new leading axis.
///
/// Implemented for [`Array`] and for the structured records built on it, such as
/// [`Nest`](crate::Nest), [`TimeStep`](crate::TimeStep) and [`Trajectory`](crate::Trajectory).
pub trait Stack: Sized {
    /// Stacks items along a new leading axis.
    fn stack(items: &[Self]) -> Result<Self>;

    /// Splits the leading axis into items.
    fn unstack(&self) -> Result<Vec<Self>>;
}

impl Stack for Array {
    fn stack(items: &[Self]) -> Result<Self> {
        let first = items
            .first()
            .ok_or_else(|| TrellisError::ShapeMismatch("Nothing to stack".to_string()))?;
        macro_rules! stack_variant {
            ($variant:ident) => {{
                let views = items
                    .iter()
                    .map(|x| match x {
                        Array::$variant(a) => Ok(a.view()),
                        other => Err(TrellisError::DTypeMismatch {
                            expected: first.dtype().to_string(),
                            got: other.dtype().to_string(),
                        }),
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Array::$variant(ndarray::stack(Axis(0), &views).map_err(shape_error)?)
            }};
        }
        Ok(match first {
            Array::F32(_) => stack_variant!(F32),
            Array::F64(_) => stack_variant!(F64),
            Array::I32(_) => stack_variant!(I32),
            Array::I64(_) => stack_variant!(I64),
            Array::U8(_) => stack_variant!(U8),
            Array::U16(_) => stack_variant!(U16),
        })
    }

    fn unstack(&self) -> Result<Vec<Self>> {
        if self.ndim() == 0 {
            return Err(
                TrellisError::ShapeMismatch("Cannot unstack a scalar array".to_string()).into(),
            );
        }
        Ok(with_array!(self, a => a
            .outer_iter()
            .map(|v| Array::from(v.to_owned()))
            .collect()))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_stack_and_unstack() -> Result<()> {
        let xs = (0..3)
            .map(|i| Array::from_f32_vec(DType::F32, &[2], vec![i as f32, 10.0 + i as f32]))
            .collect::<Result<Vec<_>>>()?;
        let stacked = Array::stack(&xs)?;
        assert_eq!(stacked.shape(), &[3, 2]);
        assert_eq!(stacked.to_f32_vec(), vec![0.0, 10.0, 1.0, 11.0, 2.0, 12.0]);
        assert_eq!(stacked.unstack()?, xs);
        Ok(())
    }

    #[test]
    fn test_stack_rejects_mixed_dtypes() {
        let xs = vec![Array::scalar_f32(1.0), Array::scalar_i32(1)];
        let err = Array::stack(&xs).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrellisError>(),
            Some(TrellisError::DTypeMismatch { .. })
        ));
    }

    #[test]
    fn test_concatenate_last_axis() -> Result<()> {
        let frames = (0..4)
            .map(|k| Array::full(DType::I32, &[2, 2, 1], k as f64))
            .collect::<Vec<_>>();
        let stacked = Array::concatenate(&frames, 2)?;
        assert_eq!(stacked.shape(), &[2, 2, 4]);
        for k in 0..4 {
            assert_eq!(stacked.index_axis_keep(2, k)?, frames[k]);
        }
        Ok(())
    }

    #[test]
    fn test_hash_depends_on_content_dtype_and_shape() -> Result<()> {
        let a = Array::full(DType::U8, &[4, 4, 1], 3.0);
        let b = Array::full(DType::U8, &[4, 4, 1], 3.0);
        let c = Array::full(DType::U8, &[4, 4, 1], 4.0);
        assert_eq!(a.hash64(), b.hash64());
        assert_ne!(a.hash64(), c.hash64());
        assert_ne!(a.hash64(), a.cast(DType::U16)?.hash64());
        assert_ne!(a.hash64(), a.reshape(&[16])?.hash64());
        Ok(())
    }
}
