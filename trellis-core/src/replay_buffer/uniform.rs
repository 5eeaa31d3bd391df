//! Uniform replay buffer.
use super::{Identity, ItemEncoder, UniformReplayBufferConfig};
use crate::{
    array::Stack,
    base::{Checkpointable, Observer, ReplayBufferBase},
    error::TrellisError,
    trajectory::Trajectory,
};
use anyhow::Result;
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde::{de::DeserializeOwned, Serialize};
use std::{
    fs::File,
    io::{BufReader, BufWriter},
    marker::PhantomData,
    path::Path,
};

/// A fixed-capacity circular buffer with uniform sampling of consecutive items.
///
/// New items are written at the head (`cur_id`). When the buffer is full, the oldest item,
/// which sits at the head, is overwritten and handed to [`ItemEncoder::on_delete`].
///
/// Sequences returned by [`UniformReplayBuffer::get_next`] never wrap across the head, so
/// every sequence consists of items added consecutively.
pub struct UniformReplayBuffer<T, C = Identity>
where
    C: ItemEncoder<T>,
{
    capacity: usize,
    cur_id: usize,
    size: usize,
    storage: Vec<Option<C::Encoded>>,
    encoder: C,
    rng: StdRng,
    phantom: PhantomData<T>,
}

impl<T, C> UniformReplayBuffer<T, C>
where
    C: ItemEncoder<T> + Default,
{
    /// Builds a replay buffer with the default encoder.
    pub fn build(config: &UniformReplayBufferConfig) -> Self {
        Self::with_encoder(config, C::default())
    }
}

impl<T, C> UniformReplayBuffer<T, C>
where
    C: ItemEncoder<T>,
{
    /// Builds a replay buffer with the given encoder.
    pub fn with_encoder(config: &UniformReplayBufferConfig, encoder: C) -> Self {
        let capacity = config.capacity.max(1);
        Self {
            capacity,
            cur_id: 0,
            size: 0,
            storage: (0..capacity).map(|_| None).collect(),
            encoder,
            rng: StdRng::seed_from_u64(config.seed),
            phantom: PhantomData,
        }
    }

    /// The encoder.
    pub fn encoder(&self) -> &C {
        &self.encoder
    }

    /// Number of stored items.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Maximum number of items.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Adds an item, overwriting the oldest one if the buffer is full.
    pub fn add(&mut self, item: T) -> Result<()> {
        let encoded = self.encoder.encode(item)?;
        if let Some(old) = self.storage[self.cur_id].replace(encoded) {
            self.encoder.on_delete(&old);
        }
        self.cur_id = (self.cur_id + 1) % self.capacity;
        self.size = (self.size + 1).min(self.capacity);
        Ok(())
    }

    fn decode_at(&self, ix: usize) -> Result<T> {
        let encoded = self.storage[ix].as_ref().ok_or(TrellisError::NotEnoughItems {
            requested: 1,
            size: self.size,
        })?;
        self.encoder.decode(encoded)
    }

    /// Index of the oldest item.
    fn oldest(&self) -> usize {
        if self.size == self.capacity {
            self.cur_id
        } else {
            0
        }
    }

    /// Samples `num_steps` consecutive items, uniformly over the valid start positions.
    pub fn get_next(&mut self, num_steps: usize) -> Result<Vec<T>> {
        if self.size == 0 || num_steps == 0 || num_steps > self.size {
            return Err(TrellisError::NotEnoughItems {
                requested: num_steps,
                size: self.size,
            }
            .into());
        }
        let ix = self.oldest() + self.rng.gen_range(0..=self.size - num_steps);
        (0..num_steps)
            .map(|k| self.decode_at((ix + k) % self.capacity))
            .collect()
    }

    /// Removes every item.
    pub fn clear(&mut self) {
        for slot in self.storage.iter_mut() {
            if let Some(old) = slot.take() {
                self.encoder.on_delete(&old);
            }
        }
        self.cur_id = 0;
        self.size = 0;
    }
}

impl<T, C> UniformReplayBuffer<T, C>
where
    T: Stack,
    C: ItemEncoder<T>,
{
    /// Samples a single item if `num_steps` is `None`, otherwise `num_steps` consecutive
    /// items stacked along a new leading time axis.
    pub fn get_next_stacked(&mut self, num_steps: Option<usize>) -> Result<T> {
        match num_steps {
            None => {
                let mut items = self.get_next(1)?;
                items.pop().ok_or_else(|| {
                    TrellisError::NotEnoughItems {
                        requested: 1,
                        size: self.size,
                    }
                    .into()
                })
            }
            Some(n) => T::stack(&self.get_next(n)?),
        }
    }

    /// An endless iterator of samples.
    ///
    /// With `batch_size`, samples are stacked along a leading batch axis. With `num_steps`,
    /// each sample is a sequence stacked along a time axis following the batch axis.
    pub fn as_dataset(
        &mut self,
        batch_size: Option<usize>,
        num_steps: Option<usize>,
    ) -> Dataset<'_, T, C> {
        Dataset {
            buffer: self,
            batch_size,
            num_steps,
        }
    }

    /// Every stored item, oldest first, stacked along a leading axis.
    pub fn gather_all(&self) -> Result<T> {
        if self.size == 0 {
            return Err(TrellisError::NotEnoughItems {
                requested: 1,
                size: 0,
            }
            .into());
        }
        let start = self.oldest();
        let items = (0..self.size)
            .map(|k| self.decode_at((start + k) % self.capacity))
            .collect::<Result<Vec<_>>>()?;
        T::stack(&items)
    }
}

impl<T, C> UniformReplayBuffer<T, C>
where
    C: ItemEncoder<T> + Serialize + DeserializeOwned,
{
    /// Saves the items and the encoder state.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let writer = BufWriter::new(File::create(path)?);
        bincode::serialize_into(
            writer,
            &(
                self.capacity,
                self.cur_id,
                self.size,
                &self.storage,
                &self.encoder,
            ),
        )?;
        info!("Saved replay buffer with {} items in {:?}", self.size, path);
        Ok(())
    }

    /// Restores the items and the encoder state saved with [`UniformReplayBuffer::save`].
    pub fn load(&mut self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let reader = BufReader::new(File::open(path)?);
        let (capacity, cur_id, size, storage, encoder): (
            usize,
            usize,
            usize,
            Vec<Option<C::Encoded>>,
            C,
        ) = bincode::deserialize_from(reader)?;
        if storage.len() != capacity || cur_id >= capacity || size > capacity {
            return Err(TrellisError::ShapeMismatch(format!(
                "Corrupted replay buffer checkpoint {:?}",
                path
            ))
            .into());
        }
        self.capacity = capacity;
        self.cur_id = cur_id;
        self.size = size;
        self.storage = storage;
        self.encoder = encoder;
        info!("Loaded replay buffer with {} items from {:?}", self.size, path);
        Ok(())
    }
}

impl<T, C> Checkpointable for UniformReplayBuffer<T, C>
where
    C: ItemEncoder<T> + Serialize + DeserializeOwned,
{
    fn save(&self, path: &Path) -> Result<()> {
        UniformReplayBuffer::save(self, path)
    }

    fn load(&mut self, path: &Path) -> Result<()> {
        UniformReplayBuffer::load(self, path)
    }
}

impl<T, C> ReplayBufferBase for UniformReplayBuffer<T, C>
where
    T: Stack,
    C: ItemEncoder<T>,
{
    type Item = T;

    fn add_batch(&mut self, item: T) -> Result<()> {
        for x in item.unstack()? {
            self.add(x)?;
        }
        Ok(())
    }

    fn gather_all(&self) -> Result<T> {
        UniformReplayBuffer::gather_all(self)
    }

    fn clear(&mut self) {
        UniformReplayBuffer::clear(self)
    }

    fn len(&self) -> usize {
        self.size
    }

    fn capacity(&self) -> usize {
        self.capacity
    }
}

impl<C> Observer for UniformReplayBuffer<Trajectory, C>
where
    C: ItemEncoder<Trajectory>,
{
    fn observe(&mut self, trajectory: &Trajectory) -> Result<()> {
        if trajectory.step_type.ndim() == 0 {
            self.add(trajectory.clone())
        } else {
            self.add_batch(trajectory.clone())
        }
    }
}

/// Iterator of samples returned by [`UniformReplayBuffer::as_dataset`].
pub struct Dataset<'a, T, C>
where
    C: ItemEncoder<T>,
{
    buffer: &'a mut UniformReplayBuffer<T, C>,
    batch_size: Option<usize>,
    num_steps: Option<usize>,
}

impl<'a, T, C> Iterator for Dataset<'a, T, C>
where
    T: Stack,
    C: ItemEncoder<T>,
{
    type Item = Result<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let num_steps = self.num_steps;
        Some(match self.batch_size {
            None => self.buffer.get_next_stacked(num_steps),
            Some(b) => (0..b)
                .map(|_| self.buffer.get_next_stacked(num_steps))
                .collect::<Result<Vec<_>>>()
                .and_then(|items| T::stack(&items)),
        })
    }
}
