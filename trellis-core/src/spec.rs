//! Specifications of arrays.
use crate::{
    array::{Array, DType},
    error::TrellisError,
    nest::Nest,
};
use anyhow::Result;
use ndarray::{ArrayD, IxDyn};
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Describes the shape, dtype and optional bounds of an array.
///
/// Bounds are stored as `f64` arrays, either zero-dimensional (applied to every element)
/// or of the same shape as the spec.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArraySpec {
    /// Shape without outer (batch or time) dimensions.
    pub shape: Vec<usize>,

    /// Element type.
    pub dtype: DType,

    /// Optional name.
    pub name: Option<String>,

    /// Inclusive lower bound.
    pub minimum: Option<ArrayD<f64>>,

    /// Inclusive upper bound.
    pub maximum: Option<ArrayD<f64>>,
}

impl ArraySpec {
    /// An unbounded spec.
    pub fn new(shape: &[usize], dtype: DType) -> Self {
        Self {
            shape: shape.to_vec(),
            dtype,
            name: None,
            minimum: None,
            maximum: None,
        }
    }

    /// A bounded spec with element-wise bounds.
    pub fn bounded(
        shape: &[usize],
        dtype: DType,
        minimum: ArrayD<f64>,
        maximum: ArrayD<f64>,
    ) -> Result<Self> {
        for bound in [&minimum, &maximum].iter() {
            if bound.ndim() != 0 && bound.shape() != shape {
                return Err(TrellisError::ShapeMismatch(format!(
                    "Bound of shape {:?} does not fit spec shape {:?}",
                    bound.shape(),
                    shape
                ))
                .into());
            }
        }
        Ok(Self {
            shape: shape.to_vec(),
            dtype,
            name: None,
            minimum: Some(minimum),
            maximum: Some(maximum),
        })
    }

    /// A bounded spec with the same bounds for every element.
    pub fn bounded_scalar(shape: &[usize], dtype: DType, minimum: f64, maximum: f64) -> Self {
        Self {
            shape: shape.to_vec(),
            dtype,
            name: None,
            minimum: Some(ArrayD::from_elem(IxDyn(&[]), minimum)),
            maximum: Some(ArrayD::from_elem(IxDyn(&[]), maximum)),
        }
    }

    /// Sets the name.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Returns `true` if both bounds are set.
    pub fn is_bounded(&self) -> bool {
        self.minimum.is_some() && self.maximum.is_some()
    }

    /// Returns `true` for integer specs.
    pub fn is_discrete(&self) -> bool {
        !self.dtype.is_float()
    }

    /// Number of elements of a single (non-batched) value.
    pub fn num_elements(&self) -> usize {
        self.shape.iter().product()
    }

    /// Returns `true` if `array` has exactly the dtype and the shape of the spec.
    pub fn check_array(&self, array: &Array) -> bool {
        array.dtype() == self.dtype && array.shape() == self.shape.as_slice()
    }

    /// Outer dimensions of `array`, i.e. its shape without the trailing spec shape.
    pub fn outer_dims_of(&self, array: &Array) -> Result<Vec<usize>> {
        if array.dtype() != self.dtype {
            return Err(TrellisError::DTypeMismatch {
                expected: self.dtype.to_string(),
                got: array.dtype().to_string(),
            }
            .into());
        }
        let shape = array.shape();
        let k = self.shape.len();
        if shape.len() < k || shape[shape.len() - k..] != self.shape[..] {
            return Err(TrellisError::ShapeMismatch(format!(
                "Array of shape {:?} does not end with spec shape {:?}",
                shape, self.shape
            ))
            .into());
        }
        Ok(shape[..shape.len() - k].to_vec())
    }

    fn full_shape(&self, outer_dims: &[usize]) -> Vec<usize> {
        outer_dims.iter().chain(self.shape.iter()).cloned().collect()
    }

    /// Lower and upper bound of the `i`-th element of a single value.
    fn bounds_at(&self, i: usize) -> (Option<f64>, Option<f64>) {
        let at = |b: &Option<ArrayD<f64>>| {
            b.as_ref().and_then(|b| {
                if b.ndim() == 0 {
                    b.iter().next().cloned()
                } else {
                    b.iter().nth(i).cloned()
                }
            })
        };
        (at(&self.minimum), at(&self.maximum))
    }

    /// Zeros with the given outer dimensions.
    pub fn zeros(&self, outer_dims: &[usize]) -> Array {
        Array::zeros(self.dtype, &self.full_shape(outer_dims))
    }

    /// Samples uniformly within the bounds.
    ///
    /// Integer specs draw from the inclusive range. Missing float bounds default to
    /// `[-1, 1]` and missing integer bounds to `[0, 9]`.
    pub fn sample_uniform(&self, rng: &mut impl Rng, outer_dims: &[usize]) -> Result<Array> {
        let shape = self.full_shape(outer_dims);
        let inner = self.num_elements().max(1);
        let n = shape.iter().product::<usize>();
        let values = (0..n)
            .map(|j| {
                let (lo, hi) = self.bounds_at(j % inner);
                if self.dtype.is_float() {
                    let lo = lo.unwrap_or(-1.0);
                    let hi = hi.unwrap_or(1.0);
                    lo + (hi - lo) * rng.gen::<f64>()
                } else {
                    let lo = lo.unwrap_or(0.0) as i64;
                    let hi = hi.unwrap_or(9.0) as i64;
                    rng.gen_range(lo..=hi.max(lo)) as f64
                }
            })
            .collect();
        Array::from_f64_vec(self.dtype, &shape, values)
    }

    /// Clips `array` to the bounds, broadcasting over outer dimensions.
    pub fn clip(&self, array: &Array) -> Result<Array> {
        if !self.is_bounded() {
            return Ok(array.clone());
        }
        let inner = self.num_elements().max(1);
        let values = array
            .to_f64_vec()
            .into_iter()
            .enumerate()
            .map(|(j, v)| {
                let (lo, hi) = self.bounds_at(j % inner);
                let v = lo.map_or(v, |lo| v.max(lo));
                hi.map_or(v, |hi| v.min(hi))
            })
            .collect();
        Array::from_f64_vec(array.dtype(), array.shape(), values)
    }
}

impl Nest<ArraySpec> {
    /// Zeros for every leaf.
    pub fn zeros(&self, outer_dims: &[usize]) -> Nest<Array> {
        self.map(|s| s.zeros(outer_dims))
    }

    /// Uniform samples for every leaf.
    pub fn sample_uniform(&self, rng: &mut impl Rng, outer_dims: &[usize]) -> Result<Nest<Array>> {
        self.try_map(|s| s.sample_uniform(rng, outer_dims))
    }

    /// Clips every leaf of `value` to the bounds of the corresponding spec.
    pub fn clip(&self, value: &Nest<Array>) -> Result<Nest<Array>> {
        self.zip_with(value, |s, x| s.clip(x))
    }
}

/// Outer dimensions shared by every leaf of `value`.
///
/// For example, `[B]` for a batch of observations and `[B, T]` for experience.
pub fn outer_dims(value: &Nest<Array>, spec: &Nest<ArraySpec>) -> Result<Vec<usize>> {
    let dims = spec.zip_with(value, |s, x| s.outer_dims_of(x))?.into_flat();
    let first = dims.first().ok_or_else(|| {
        TrellisError::StructureMismatch("Cannot compute outer dims of an empty nest".into())
    })?;
    if let Some(d) = dims.iter().find(|d| *d != first) {
        return Err(TrellisError::ShapeMismatch(format!(
            "Leaves have different outer dims: {:?} vs {:?}",
            first, d
        ))
        .into());
    }
    Ok(first.clone())
}

#[cfg(test)]
mod test {
    use super::*;
    use rand::{rngs::StdRng, SeedableRng};

    #[test]
    fn test_sample_within_bounds() -> Result<()> {
        let mut rng = StdRng::seed_from_u64(42);
        let spec = ArraySpec::bounded_scalar(&[3], DType::I64, 2.0, 4.0);
        let x = spec.sample_uniform(&mut rng, &[5])?;
        assert_eq!(x.shape(), &[5, 3]);
        assert!(x.to_f64_vec().iter().all(|v| *v >= 2.0 && *v <= 4.0));

        let min = ArrayD::from_shape_vec(IxDyn(&[2]), vec![-1.0, 10.0])?;
        let max = ArrayD::from_shape_vec(IxDyn(&[2]), vec![0.0, 11.0])?;
        let spec = ArraySpec::bounded(&[2], DType::F32, min, max)?;
        let x = spec.sample_uniform(&mut rng, &[100])?;
        for (j, v) in x.to_f64_vec().into_iter().enumerate() {
            if j % 2 == 0 {
                assert!((-1.0..=0.0).contains(&v));
            } else {
                assert!((10.0..=11.0).contains(&v));
            }
        }
        Ok(())
    }

    #[test]
    fn test_clip_broadcasts_over_batch() -> Result<()> {
        let spec = ArraySpec::bounded_scalar(&[1], DType::F32, -1.0, 1.0);
        let x = Array::from_f32_vec(DType::F32, &[2, 1], vec![-3.0, 0.5])?;
        assert_eq!(spec.clip(&x)?.to_f32_vec(), vec![-1.0, 0.5]);
        Ok(())
    }

    #[test]
    fn test_outer_dims() -> Result<()> {
        let spec = Nest::tuple_of(vec![
            ArraySpec::new(&[2], DType::F32),
            ArraySpec::new(&[], DType::I64),
        ]);
        let value = spec.zeros(&[4, 3]);
        assert_eq!(outer_dims(&value, &spec)?, vec![4, 3]);

        let bad = Nest::tuple_of(vec![
            Array::zeros(DType::F32, &[4, 2]),
            Array::zeros(DType::I64, &[5]),
        ]);
        assert!(outer_dims(&bad, &spec).is_err());
        Ok(())
    }
}
