//! Conversions between nests of arrays and Python objects.
use crate::{GymEnvError, GymSpace};
use anyhow::Result;
use ndarray::{ArrayD, IxDyn};
use numpy::PyArrayDyn;
use pyo3::{
    types::{PyDict, PyTuple},
    IntoPy, PyAny, PyObject, Python,
};
use trellis_core::{array::Array, error::TrellisError, ArraySpec, Nest};

/// Converts an observation into a nest of arrays following `spec`.
///
/// Leaves are read as `float64` numpy arrays and cast to the dtype of the spec. Scalars
/// fill specs with a single element, e.g. of shape `[1]`.
pub fn observation_from_py(
    py: Python,
    obj: &PyAny,
    spec: &Nest<ArraySpec>,
) -> Result<Nest<Array>> {
    match spec {
        Nest::Leaf(spec) => {
            let np = py.import("numpy")?;
            let array = np.getattr("asarray")?.call1((obj, "float64"))?;
            let array: &PyArrayDyn<f64> = array.extract()?;
            let values: Vec<f64> = array.to_owned_array().iter().cloned().collect();
            if values.len() != spec.num_elements() {
                return Err(GymEnvError::UnexpectedValue(format!(
                    "{} elements for spec of shape {:?}",
                    values.len(),
                    spec.shape
                ))
                .into());
            }
            Ok(Nest::Leaf(Array::from_f64_vec(spec.dtype, &spec.shape, values)?))
        }
        Nest::Tuple(specs) => Ok(Nest::Tuple(
            specs
                .iter()
                .enumerate()
                .map(|(i, s)| observation_from_py(py, obj.get_item(i)?, s))
                .collect::<Result<Vec<_>>>()?,
        )),
        Nest::Dict(specs) => {
            let items = specs
                .iter()
                .map(|(k, s)| {
                    let value = observation_from_py(py, obj.get_item(k.as_str())?, s)?;
                    Ok((k.clone(), value))
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(Nest::dict(items))
        }
    }
}

fn mismatch(action: &Nest<Array>, space: &GymSpace) -> anyhow::Error {
    TrellisError::StructureMismatch(format!(
        "Action with {} leaves does not fit {:?}",
        action.len(),
        space
    ))
    .into()
}

/// Converts an action into the Python object expected by `space`.
///
/// `Discrete` actions become Python integers. `Box` actions become `float32` numpy arrays
/// and other integer spaces `int64` numpy arrays.
pub fn action_to_py(py: Python, action: &Nest<Array>, space: &GymSpace) -> Result<PyObject> {
    match (action, space) {
        (Nest::Leaf(a), GymSpace::Discrete(_)) => {
            let v = a
                .to_f64_vec()
                .first()
                .cloned()
                .ok_or_else(|| mismatch(action, space))?;
            Ok((v as i64).into_py(py))
        }
        (Nest::Leaf(a), GymSpace::Box { shape, .. }) => {
            let a = ArrayD::from_shape_vec(IxDyn(shape), a.to_f32_vec())?;
            Ok(PyArrayDyn::<f32>::from_array(py, &a).into_py(py))
        }
        (Nest::Leaf(a), GymSpace::MultiDiscrete(_)) | (Nest::Leaf(a), GymSpace::MultiBinary(_)) => {
            let v: Vec<i64> = a.to_f64_vec().into_iter().map(|v| v as i64).collect();
            let a = ArrayD::from_shape_vec(IxDyn(&[v.len()]), v)?;
            Ok(PyArrayDyn::<i64>::from_array(py, &a).into_py(py))
        }
        (Nest::Tuple(xs), GymSpace::Tuple(spaces)) if xs.len() == spaces.len() => {
            let items = xs
                .iter()
                .zip(spaces.iter())
                .map(|(x, s)| action_to_py(py, x, s))
                .collect::<Result<Vec<_>>>()?;
            Ok(PyTuple::new(py, items).into_py(py))
        }
        (Nest::Dict(xs), GymSpace::Dict(spaces)) => {
            let dict = PyDict::new(py);
            for (k, s) in spaces.iter() {
                let x = xs.get(k).ok_or_else(|| mismatch(action, space))?;
                dict.set_item(k, action_to_py(py, x, s)?)?;
            }
            Ok(dict.into_py(py))
        }
        _ => Err(mismatch(action, space)),
    }
}

/// Reads scalar values of an info dict, skipping others.
pub fn info_from_py(info: &PyAny) -> Result<Vec<(String, f64)>> {
    let info: &PyDict = match info.extract() {
        Ok(info) => info,
        Err(_) => return Ok(vec![]),
    };
    Ok(info
        .iter()
        .filter_map(|(k, v)| Some((k.extract::<String>().ok()?, v.extract::<f64>().ok()?)))
        .collect())
}
