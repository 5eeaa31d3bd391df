//! Gym spaces and their conversion to array specs.
use anyhow::Result;
use ndarray::ArrayD;
use pyo3::{types::PyDict, PyAny};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use crate::GymEnvError;
use trellis_core::{array::DType, ArraySpec, Nest};

/// A Rust mirror of a gym space.
#[derive(Debug, Clone, PartialEq)]
pub enum GymSpace {
    /// Integers in `0..n`.
    Discrete(i64),

    /// Integers in `0..nvec[i]` for each element.
    MultiDiscrete(Vec<i64>),

    /// `n` binary values.
    MultiBinary(usize),

    /// Values in a box.
    Box {
        /// Element-wise lower bounds.
        low: ArrayD<f64>,
        /// Element-wise upper bounds.
        high: ArrayD<f64>,
        /// Shape of values.
        shape: Vec<usize>,
        /// Name of the numpy dtype, e.g. `float32`.
        dtype: String,
    },

    /// A sequence of spaces.
    Tuple(Vec<GymSpace>),

    /// Spaces keyed by name.
    Dict(BTreeMap<String, GymSpace>),
}

fn to_f64_array(array: &PyAny) -> Result<ArrayD<f64>> {
    let array = array.call_method1("astype", ("float64",))?;
    let array: &numpy::PyArrayDyn<f64> = array.extract()?;
    Ok(array.to_owned_array())
}

impl GymSpace {
    /// Parses a Python space object by its class name.
    pub fn from_py(space: &PyAny) -> Result<Self> {
        let class: String = space.getattr("__class__")?.getattr("__name__")?.extract()?;
        match class.as_str() {
            "Discrete" => Ok(Self::Discrete(space.getattr("n")?.extract()?)),
            "MultiDiscrete" => {
                let nvec = to_f64_array(space.getattr("nvec")?)?;
                Ok(Self::MultiDiscrete(nvec.iter().map(|n| *n as i64).collect()))
            }
            "MultiBinary" => Ok(Self::MultiBinary(space.getattr("n")?.extract()?)),
            "Box" => Ok(Self::Box {
                low: to_f64_array(space.getattr("low")?)?,
                high: to_f64_array(space.getattr("high")?)?,
                shape: space.getattr("shape")?.extract()?,
                dtype: space.getattr("dtype")?.getattr("name")?.extract()?,
            }),
            "Tuple" => {
                let spaces: Vec<&PyAny> = space.getattr("spaces")?.extract()?;
                let spaces = spaces
                    .into_iter()
                    .map(Self::from_py)
                    .collect::<Result<Vec<_>>>()?;
                Ok(Self::Tuple(spaces))
            }
            "Dict" => {
                let spaces: &PyDict = space.getattr("spaces")?.extract()?;
                let mut map = BTreeMap::new();
                for (k, v) in spaces.iter() {
                    map.insert(k.extract::<String>()?, Self::from_py(v)?);
                }
                Ok(Self::Dict(map))
            }
            _ => Err(GymEnvError::UnsupportedSpace(class).into()),
        }
    }
}

/// Overrides the dtype of specs per kind of space.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DTypeMap {
    /// Dtype of `Discrete` spaces, `int64` if not given.
    pub discrete: Option<DType>,

    /// Dtype of `MultiDiscrete` spaces, `int64` if not given.
    pub multi_discrete: Option<DType>,

    /// Dtype of `MultiBinary` spaces, `int64` if not given.
    pub multi_binary: Option<DType>,

    /// Dtype of `Box` spaces. If not given, float boxes map to `float32` and integer boxes
    /// keep their dtype.
    pub box_space: Option<DType>,
}

impl DTypeMap {
    /// Sets the dtype of `Discrete` spaces.
    pub fn discrete(mut self, v: DType) -> Self {
        self.discrete = Some(v);
        self
    }

    /// Sets the dtype of `Box` spaces.
    pub fn box_space(mut self, v: DType) -> Self {
        self.box_space = Some(v);
        self
    }
}

fn box_dtype(dtype: &str, dtype_map: &DTypeMap) -> DType {
    if let Some(dtype) = dtype_map.box_space {
        return dtype;
    }
    match DType::from_name(dtype) {
        Some(dtype) if !dtype.is_float() => dtype,
        _ => DType::F32,
    }
}

/// Converts a gym space into a nest of array specs.
///
/// A `Discrete(n)` space becomes an integer spec of shape `[1]` bounded by `0` and `n - 1`.
/// Boxes keep their shape and element-wise bounds. Tuples and dicts are converted
/// recursively.
pub fn spec_from_gym_space(space: &GymSpace, dtype_map: &DTypeMap) -> Result<Nest<ArraySpec>> {
    let spec = match space {
        GymSpace::Discrete(n) => {
            let dtype = dtype_map.discrete.unwrap_or(DType::I64);
            Nest::Leaf(ArraySpec::bounded_scalar(&[1], dtype, 0.0, (n - 1) as f64))
        }
        GymSpace::MultiDiscrete(nvec) => {
            let dtype = dtype_map.multi_discrete.unwrap_or(DType::I64);
            let shape = [nvec.len()];
            let maximum = ArrayD::from_shape_vec(
                ndarray::IxDyn(&shape),
                nvec.iter().map(|n| (n - 1) as f64).collect(),
            )?;
            let minimum = ArrayD::zeros(ndarray::IxDyn(&shape));
            Nest::Leaf(ArraySpec::bounded(&shape, dtype, minimum, maximum)?)
        }
        GymSpace::MultiBinary(n) => {
            let dtype = dtype_map.multi_binary.unwrap_or(DType::I64);
            Nest::Leaf(ArraySpec::bounded_scalar(&[*n], dtype, 0.0, 1.0))
        }
        GymSpace::Box {
            low,
            high,
            shape,
            dtype,
        } => {
            let dtype = box_dtype(dtype, dtype_map);
            Nest::Leaf(ArraySpec::bounded(shape, dtype, low.clone(), high.clone())?)
        }
        GymSpace::Tuple(spaces) => Nest::Tuple(
            spaces
                .iter()
                .map(|s| spec_from_gym_space(s, dtype_map))
                .collect::<Result<Vec<_>>>()?,
        ),
        GymSpace::Dict(spaces) => {
            let mut map = BTreeMap::new();
            for (k, s) in spaces.iter() {
                map.insert(k.clone(), spec_from_gym_space(s, dtype_map)?);
            }
            Nest::Dict(map)
        }
    };
    Ok(spec)
}

#[cfg(test)]
mod test {
    use super::*;
    use ndarray::IxDyn;

    fn unit_box(shape: &[usize]) -> GymSpace {
        GymSpace::Box {
            low: ArrayD::from_elem(IxDyn(shape), -1.0),
            high: ArrayD::from_elem(IxDyn(shape), 1.0),
            shape: shape.to_vec(),
            dtype: "float32".to_string(),
        }
    }

    fn bounds(spec: &ArraySpec) -> (Vec<f64>, Vec<f64>) {
        let min = spec.minimum.as_ref().unwrap().iter().cloned().collect();
        let max = spec.maximum.as_ref().unwrap().iter().cloned().collect();
        (min, max)
    }

    #[test]
    fn test_discrete() -> Result<()> {
        let spec = spec_from_gym_space(&GymSpace::Discrete(3), &DTypeMap::default())?;
        let spec = spec.as_leaf().unwrap();
        assert_eq!(spec.shape, vec![1]);
        assert_eq!(spec.dtype, DType::I64);
        assert_eq!(bounds(spec), (vec![0.0], vec![2.0]));
        Ok(())
    }

    #[test]
    fn test_box() -> Result<()> {
        let spec = spec_from_gym_space(&unit_box(&[3, 4]), &DTypeMap::default())?;
        let spec = spec.as_leaf().unwrap();
        assert_eq!(spec.shape, vec![3, 4]);
        assert_eq!(spec.dtype, DType::F32);
        let (min, max) = bounds(spec);
        assert_eq!(min, vec![-1.0; 12]);
        assert_eq!(max, vec![1.0; 12]);

        let space = GymSpace::Box {
            low: ArrayD::from_shape_vec(IxDyn(&[2]), vec![-1.0, -2.0])?,
            high: ArrayD::from_shape_vec(IxDyn(&[2]), vec![2.0, 4.0])?,
            shape: vec![2],
            dtype: "float64".to_string(),
        };
        let spec = spec_from_gym_space(&space, &DTypeMap::default())?;
        let spec = spec.as_leaf().unwrap();
        assert_eq!(spec.dtype, DType::F32);
        assert_eq!(bounds(spec), (vec![-1.0, -2.0], vec![2.0, 4.0]));
        Ok(())
    }

    #[test]
    fn test_nested_spaces() -> Result<()> {
        let mut dict = BTreeMap::new();
        dict.insert("spec_1".to_string(), GymSpace::Discrete(2));
        dict.insert(
            "spec_2".to_string(),
            GymSpace::Tuple(vec![GymSpace::Discrete(2), GymSpace::Discrete(3)]),
        );
        let space = GymSpace::Tuple(vec![
            GymSpace::Discrete(2),
            unit_box(&[3, 4]),
            GymSpace::Tuple(vec![GymSpace::Discrete(2), GymSpace::Discrete(3)]),
            GymSpace::Dict(dict),
        ]);
        let spec = spec_from_gym_space(&space, &DTypeMap::default())?;
        assert_eq!(spec.len(), 7);

        let inner = spec.get(2).unwrap().get(1).unwrap().as_leaf().unwrap();
        assert_eq!(bounds(inner), (vec![0.0], vec![2.0]));
        let in_dict = spec.get(3).unwrap().get_key("spec_1").unwrap();
        assert_eq!(in_dict.as_leaf().unwrap().dtype, DType::I64);
        Ok(())
    }

    #[test]
    fn test_dtype_map() -> Result<()> {
        let map = DTypeMap::default().discrete(DType::U8).box_space(DType::U16);
        let space = GymSpace::Tuple(vec![GymSpace::Discrete(2), unit_box(&[2])]);
        let spec = spec_from_gym_space(&space, &map)?;
        let dtypes: Vec<DType> = spec.flatten().iter().map(|s| s.dtype).collect();
        assert_eq!(dtypes, vec![DType::U8, DType::U16]);
        Ok(())
    }

    #[test]
    fn test_multi_discrete() -> Result<()> {
        let spec = spec_from_gym_space(&GymSpace::MultiDiscrete(vec![3, 5]), &DTypeMap::default())?;
        let spec = spec.as_leaf().unwrap();
        assert_eq!(spec.shape, vec![2]);
        assert_eq!(bounds(spec), (vec![0.0, 0.0], vec![2.0, 4.0]));
        Ok(())
    }

    #[test]
    fn test_integer_box_keeps_dtype() -> Result<()> {
        let space = GymSpace::Box {
            low: ArrayD::from_elem(IxDyn(&[2]), 0.0),
            high: ArrayD::from_elem(IxDyn(&[2]), 255.0),
            shape: vec![2],
            dtype: "uint8".to_string(),
        };
        let spec = spec_from_gym_space(&space, &DTypeMap::default())?;
        assert_eq!(spec.as_leaf().unwrap().dtype, DType::U8);
        Ok(())
    }
}
