//! Nested structures of values.
//!
//! Observations, actions, policy states and policy infos may be a single array, a tuple of
//! arrays or a dictionary of arrays, nested arbitrarily. [`Nest`] represents such a
//! structure. Leaves are visited in a deterministic order: tuple elements in order and
//! dictionary entries sorted by key.
use crate::{
    array::{Array, Stack},
    error::TrellisError,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A nested structure with leaves of type `T`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Nest<T> {
    /// A single value.
    Leaf(T),

    /// An ordered sequence of nests.
    Tuple(Vec<Nest<T>>),

    /// Nests keyed by name.
    Dict(BTreeMap<String, Nest<T>>),
}

impl<T> Default for Nest<T> {
    fn default() -> Self {
        Self::empty()
    }
}

impl<T> From<T> for Nest<T> {
    fn from(x: T) -> Self {
        Nest::Leaf(x)
    }
}

impl<T> Nest<T> {
    /// A nest without leaves, used where no value exists, e.g. the state of a stateless policy.
    pub fn empty() -> Self {
        Nest::Tuple(vec![])
    }

    /// A tuple of leaves.
    pub fn tuple_of(xs: Vec<T>) -> Self {
        Nest::Tuple(xs.into_iter().map(Nest::Leaf).collect())
    }

    /// A dictionary built from key/nest pairs.
    pub fn dict<K: Into<String>>(items: impl IntoIterator<Item = (K, Nest<T>)>) -> Self {
        Nest::Dict(items.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Number of leaves.
    pub fn len(&self) -> usize {
        match self {
            Nest::Leaf(_) => 1,
            Nest::Tuple(xs) => xs.iter().map(|x| x.len()).sum(),
            Nest::Dict(xs) => xs.values().map(|x| x.len()).sum(),
        }
    }

    /// Returns `true` if the nest has no leaves.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The value if this nest is a single leaf.
    pub fn as_leaf(&self) -> Option<&T> {
        match self {
            Nest::Leaf(x) => Some(x),
            _ => None,
        }
    }

    /// Element `i` of a tuple.
    pub fn get(&self, i: usize) -> Option<&Nest<T>> {
        match self {
            Nest::Tuple(xs) => xs.get(i),
            _ => None,
        }
    }

    /// Entry `key` of a dictionary.
    pub fn get_key(&self, key: &str) -> Option<&Nest<T>> {
        match self {
            Nest::Dict(xs) => xs.get(key),
            _ => None,
        }
    }

    /// References to the leaves in traversal order.
    pub fn flatten(&self) -> Vec<&T> {
        let mut out = Vec::with_capacity(self.len());
        self.flatten_into(&mut out);
        out
    }

    fn flatten_into<'a>(&'a self, out: &mut Vec<&'a T>) {
        match self {
            Nest::Leaf(x) => out.push(x),
            Nest::Tuple(xs) => xs.iter().for_each(|x| x.flatten_into(out)),
            Nest::Dict(xs) => xs.values().for_each(|x| x.flatten_into(out)),
        }
    }

    /// Consumes the nest and returns the leaves in traversal order.
    pub fn into_flat(self) -> Vec<T> {
        let mut out = Vec::new();
        self.into_flat_inner(&mut out);
        out
    }

    fn into_flat_inner(self, out: &mut Vec<T>) {
        match self {
            Nest::Leaf(x) => out.push(x),
            Nest::Tuple(xs) => xs.into_iter().for_each(|x| x.into_flat_inner(out)),
            Nest::Dict(xs) => xs.into_iter().for_each(|(_, x)| x.into_flat_inner(out)),
        }
    }

    /// Builds a nest with the structure of `structure` from leaves in traversal order.
    pub fn pack_sequence_as<U>(structure: &Nest<U>, flat: Vec<T>) -> Result<Self> {
        if structure.len() != flat.len() {
            return Err(TrellisError::StructureMismatch(format!(
                "Structure has {} leaves, but {} values were given",
                structure.len(),
                flat.len()
            ))
            .into());
        }
        let mut it = flat.into_iter();
        structure.try_map(|_| {
            it.next()
                .ok_or_else(|| TrellisError::StructureMismatch("Ran out of values".into()).into())
        })
    }

    /// Applies `f` to each leaf.
    pub fn map<U, F: FnMut(&T) -> U>(&self, mut f: F) -> Nest<U> {
        self.map_inner(&mut f)
    }

    fn map_inner<U, F: FnMut(&T) -> U>(&self, f: &mut F) -> Nest<U> {
        match self {
            Nest::Leaf(x) => Nest::Leaf(f(x)),
            Nest::Tuple(xs) => Nest::Tuple(xs.iter().map(|x| x.map_inner(f)).collect()),
            Nest::Dict(xs) => Nest::Dict(
                xs.iter()
                    .map(|(k, x)| (k.clone(), x.map_inner(f)))
                    .collect(),
            ),
        }
    }

    /// Applies a fallible `f` to each leaf, stopping at the first error.
    pub fn try_map<U, F: FnMut(&T) -> Result<U>>(&self, mut f: F) -> Result<Nest<U>> {
        self.try_map_inner(&mut f)
    }

    fn try_map_inner<U, F: FnMut(&T) -> Result<U>>(&self, f: &mut F) -> Result<Nest<U>> {
        Ok(match self {
            Nest::Leaf(x) => Nest::Leaf(f(x)?),
            Nest::Tuple(xs) => {
                let mut ys = Vec::with_capacity(xs.len());
                for x in xs.iter() {
                    ys.push(x.try_map_inner(f)?);
                }
                Nest::Tuple(ys)
            }
            Nest::Dict(xs) => {
                let mut ys = BTreeMap::new();
                for (k, x) in xs.iter() {
                    ys.insert(k.clone(), x.try_map_inner(f)?);
                }
                Nest::Dict(ys)
            }
        })
    }

    /// Combines two nests of the same structure leaf by leaf.
    pub fn zip_with<U, V, F>(&self, other: &Nest<U>, mut f: F) -> Result<Nest<V>>
    where
        F: FnMut(&T, &U) -> Result<V>,
    {
        self.zip_inner(other, &mut f)
    }

    fn zip_inner<U, V, F>(&self, other: &Nest<U>, f: &mut F) -> Result<Nest<V>>
    where
        F: FnMut(&T, &U) -> Result<V>,
    {
        Ok(match (self, other) {
            (Nest::Leaf(x), Nest::Leaf(y)) => Nest::Leaf(f(x, y)?),
            (Nest::Tuple(xs), Nest::Tuple(ys)) if xs.len() == ys.len() => {
                let mut zs = Vec::with_capacity(xs.len());
                for (x, y) in xs.iter().zip(ys.iter()) {
                    zs.push(x.zip_inner(y, f)?);
                }
                Nest::Tuple(zs)
            }
            (Nest::Dict(xs), Nest::Dict(ys)) if xs.keys().eq(ys.keys()) => {
                let mut zs = BTreeMap::new();
                for ((k, x), y) in xs.iter().zip(ys.values()) {
                    zs.insert(k.clone(), x.zip_inner(y, f)?);
                }
                Nest::Dict(zs)
            }
            _ => {
                return Err(TrellisError::StructureMismatch(format!(
                    "{} vs {}",
                    self.describe(),
                    other.describe()
                ))
                .into())
            }
        })
    }

    /// Checks that `other` has the same structure, ignoring the leaf values.
    pub fn assert_same_structure<U>(&self, other: &Nest<U>) -> Result<()> {
        self.zip_with(other, |_, _| Ok(())).map(|_| ())
    }

    /// A short description of the structure, used in error messages.
    fn describe(&self) -> String {
        match self {
            Nest::Leaf(_) => "leaf".to_string(),
            Nest::Tuple(xs) => format!(
                "({})",
                xs.iter().map(|x| x.describe()).collect::<Vec<_>>().join(", ")
            ),
            Nest::Dict(xs) => format!(
                "{{{}}}",
                xs.iter()
                    .map(|(k, x)| format!("{}: {}", k, x.describe()))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        }
    }
}

impl Nest<Array> {
    /// Splits the leading axis into `n` nests.
    ///
    /// Unlike [`Stack::unstack`], this also works for nests without leaves, which are
    /// repeated `n` times.
    pub fn unstack_to(&self, n: usize) -> Result<Vec<Self>> {
        if self.is_empty() {
            return Ok(vec![self.clone(); n]);
        }
        let items = self.unstack()?;
        if items.len() != n {
            return Err(TrellisError::ShapeMismatch(format!(
                "Expected leading dimension {}, got {}",
                n,
                items.len()
            ))
            .into());
        }
        Ok(items)
    }
}

/// Stacks one array field of each item.
pub(crate) fn stack_by<S, F>(items: &[S], f: F) -> Result<Array>
where
    F: Fn(&S) -> &Array,
{
    Array::stack(&items.iter().map(|x| f(x).clone()).collect::<Vec<_>>())
}

/// Stacks one nest field of each item.
pub(crate) fn stack_nest_by<S, F>(items: &[S], f: F) -> Result<Nest<Array>>
where
    F: Fn(&S) -> &Nest<Array>,
{
    Nest::stack(&items.iter().map(|x| f(x).clone()).collect::<Vec<_>>())
}

impl Stack for Nest<Array> {
    fn stack(items: &[Self]) -> Result<Self> {
        let first = items
            .first()
            .ok_or_else(|| TrellisError::ShapeMismatch("Nothing to stack".to_string()))?;
        let mut flats = Vec::with_capacity(items.len());
        for x in items.iter() {
            first.assert_same_structure(x)?;
            flats.push(x.flatten());
        }
        let stacked = (0..first.len())
            .map(|i| Array::stack(&flats.iter().map(|f| f[i].clone()).collect::<Vec<_>>()))
            .collect::<Result<Vec<_>>>()?;
        Nest::pack_sequence_as(first, stacked)
    }

    fn unstack(&self) -> Result<Vec<Self>> {
        let leaves = self
            .flatten()
            .into_iter()
            .map(|x| x.unstack())
            .collect::<Result<Vec<_>>>()?;
        let n = match leaves.first() {
            Some(x) => x.len(),
            None => {
                return Err(TrellisError::ShapeMismatch(
                    "Cannot infer the leading dimension of an empty nest".to_string(),
                )
                .into())
            }
        };
        if leaves.iter().any(|x| x.len() != n) {
            return Err(TrellisError::ShapeMismatch(
                "Leaves have different leading dimensions".to_string(),
            )
            .into());
        }
        let mut leaves = leaves.into_iter().map(|x| x.into_iter()).collect::<Vec<_>>();
        (0..n)
            .map(|_| {
                let flat = leaves.iter_mut().filter_map(|it| it.next()).collect();
                Nest::pack_sequence_as(self, flat)
            })
            .collect()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::array::DType;

    fn obs(v: f64) -> Nest<Array> {
        Nest::dict(vec![
            ("position", Nest::Leaf(Array::full(DType::F32, &[2], v))),
            (
                "sensors",
                Nest::tuple_of(vec![
                    Array::full(DType::I64, &[], v),
                    Array::full(DType::U8, &[3], v),
                ]),
            ),
        ])
    }

    #[test]
    fn test_flatten_order_and_pack() -> Result<()> {
        let nest = obs(1.0);
        let flat = nest.flatten();
        assert_eq!(flat.len(), 3);
        assert_eq!(flat[0].dtype(), DType::F32);
        assert_eq!(flat[1].dtype(), DType::I64);
        assert_eq!(flat[2].dtype(), DType::U8);

        let packed = Nest::pack_sequence_as(&nest, nest.clone().into_flat())?;
        assert_eq!(packed, nest);
        assert!(Nest::pack_sequence_as(&nest, vec![Array::scalar_f32(0.0)]).is_err());
        Ok(())
    }

    #[test]
    fn test_structure_mismatch() {
        let a = obs(0.0);
        let b = Nest::tuple_of(vec![Array::scalar_f32(0.0)]);
        let err = a.assert_same_structure(&b).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<TrellisError>(),
            Some(TrellisError::StructureMismatch(_))
        ));
    }

    #[test]
    fn test_stack_unstack() -> Result<()> {
        let items = vec![obs(0.0), obs(1.0), obs(2.0)];
        let stacked = Nest::stack(&items)?;
        let position = stacked.get_key("position").and_then(|x| x.as_leaf());
        assert_eq!(position.map(|x| x.shape().to_vec()), Some(vec![3, 2]));
        assert_eq!(stacked.unstack()?, items);
        assert_eq!(Nest::<Array>::empty().unstack_to(4)?.len(), 4);
        Ok(())
    }
}
