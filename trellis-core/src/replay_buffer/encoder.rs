//! Encoding of items stored in replay buffers.
use anyhow::Result;
use serde::{de::DeserializeOwned, Deserialize, Serialize};

/// Converts items into their stored representation and back.
///
/// [`ItemEncoder::on_delete`] is called with every stored item that is overwritten or
/// cleared, so encoders holding shared data can release it.
pub trait ItemEncoder<T> {
    /// Stored representation.
    type Encoded: Clone + Serialize + DeserializeOwned;

    /// Encodes an item to be stored.
    fn encode(&mut self, item: T) -> Result<Self::Encoded>;

    /// Decodes a stored item.
    fn decode(&self, encoded: &Self::Encoded) -> Result<T>;

    /// Called when a stored item is removed from the buffer.
    #[allow(unused_variables)]
    fn on_delete(&mut self, encoded: &Self::Encoded) {}
}

/// Stores items as they are.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct Identity;

impl<T> ItemEncoder<T> for Identity
where
    T: Clone + Serialize + DeserializeOwned,
{
    type Encoded = T;

    fn encode(&mut self, item: T) -> Result<T> {
        Ok(item)
    }

    fn decode(&self, encoded: &T) -> Result<T> {
        Ok(encoded.clone())
    }
}
