//! Conversion between arrays and tensors.
use anyhow::Result;
use std::convert::TryFrom;
use tch::{Device, Kind, Tensor};
use trellis_core::{
    array::{Array, DType},
    error::TrellisError,
    spec::outer_dims,
    ArraySpec, Nest,
};

/// Converts an array into a tensor of the same shape.
///
/// Float arrays become `Kind::Float` tensors, integer arrays `Kind::Int64` tensors.
pub fn array_to_tensor(array: &Array, device: Device) -> Tensor {
    let shape = array.shape().iter().map(|&d| d as i64).collect::<Vec<_>>();
    let t = if array.dtype().is_float() {
        Tensor::from_slice(&array.to_f32_vec())
    } else {
        Tensor::from_slice(&array.to_f64_vec()).to_kind(Kind::Int64)
    };
    t.reshape(&shape).to(device)
}

/// Converts a tensor into an array of the given dtype, keeping its shape.
pub fn tensor_to_array(t: &Tensor, dtype: DType) -> Result<Array> {
    let shape = t.size().iter().map(|&d| d as usize).collect::<Vec<_>>();
    let t = t
        .detach()
        .to(Device::Cpu)
        .to_kind(Kind::Double)
        .flatten(0, -1);
    let values = Vec::<f64>::try_from(&t)?;
    Array::from_f64_vec(dtype, &shape, values)
}

/// Shape as `i64`, the way tch takes it.
pub(crate) fn dims(shape: &[usize]) -> Vec<i64> {
    shape.iter().map(|&d| d as i64).collect()
}

/// Concatenates the flattened leaves of an observation into a `float` tensor of shape
/// `[N, D]`, where `N` is the product of the outer dims and `D` the total number of
/// elements of a single observation.
///
/// Returns the tensor and the outer dims.
pub fn flatten_observation(
    observation: &Nest<Array>,
    spec: &Nest<ArraySpec>,
    device: Device,
) -> Result<(Tensor, Vec<usize>)> {
    let outer = outer_dims(observation, spec)?;
    let n = outer.iter().product::<usize>() as i64;
    let leaves = observation
        .flatten()
        .into_iter()
        .map(|x| {
            array_to_tensor(x, device)
                .to_kind(Kind::Float)
                .reshape(&[n, -1])
        })
        .collect::<Vec<_>>();
    if leaves.is_empty() {
        return Err(TrellisError::StructureMismatch("Empty observation".into()).into());
    }
    Ok((Tensor::cat(&leaves, 1), outer))
}

/// Number of elements of a flattened observation.
pub fn observation_dim(spec: &Nest<ArraySpec>) -> i64 {
    spec.flatten()
        .iter()
        .map(|s| s.num_elements() as i64)
        .sum()
}

/// Mean of `x` over the elements where `mask` is one.
///
/// Returns zero if the mask is empty.
pub fn masked_mean(x: &Tensor, mask: &Tensor) -> Tensor {
    (x * mask).sum(Kind::Float) / mask.sum(Kind::Float).clamp_min(1.0)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_array_tensor_conversion() -> Result<()> {
        let a = Array::from_f64_vec(DType::F32, &[2, 3], vec![0., 1., 2., 3., 4., 5.])?;
        let t = array_to_tensor(&a, Device::Cpu);
        assert_eq!(t.size(), vec![2, 3]);
        assert_eq!(t.kind(), Kind::Float);
        assert_eq!(tensor_to_array(&t, DType::F32)?, a);

        let a = Array::vec_i64(vec![3, 1]);
        let t = array_to_tensor(&a, Device::Cpu);
        assert_eq!(t.kind(), Kind::Int64);
        assert_eq!(tensor_to_array(&t, DType::I64)?, a);

        let s = Array::scalar_f32(1.5);
        assert_eq!(tensor_to_array(&array_to_tensor(&s, Device::Cpu), DType::F32)?, s);
        Ok(())
    }

    #[test]
    fn test_flatten_observation() -> Result<()> {
        let spec = Nest::tuple_of(vec![
            ArraySpec::new(&[2], DType::F32),
            ArraySpec::new(&[], DType::I64),
        ]);
        let obs = Nest::tuple_of(vec![
            Array::from_f64_vec(DType::F32, &[3, 2], vec![0., 1., 2., 3., 4., 5.])?,
            Array::vec_i64(vec![7, 8, 9]),
        ]);
        let (t, outer) = flatten_observation(&obs, &spec, Device::Cpu)?;
        assert_eq!(outer, vec![3]);
        assert_eq!(t.size(), vec![3, 3]);
        assert_eq!(observation_dim(&spec), 3);
        let row = Vec::<f32>::try_from(&t.get(2))?;
        assert_eq!(row, vec![4.0, 5.0, 9.0]);
        Ok(())
    }

    #[test]
    fn test_masked_mean() {
        let x = Tensor::from_slice(&[1.0f32, 2.0, 3.0, 100.0]);
        let mask = Tensor::from_slice(&[1.0f32, 1.0, 1.0, 0.0]);
        assert_eq!(masked_mean(&x, &mask).double_value(&[]), 2.0);
        let none = Tensor::zeros(&[4], (Kind::Float, Device::Cpu));
        assert_eq!(masked_mean(&x, &none).double_value(&[]), 0.0);
    }
}
