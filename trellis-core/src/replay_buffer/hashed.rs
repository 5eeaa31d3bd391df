//! Replay buffer storing stacked-frame observations once per frame.
use super::{FrameBuffer, ItemEncoder, UniformReplayBuffer};
use crate::{
    array::Array, error::TrellisError, nest::Nest, trajectory::Trajectory,
};
use anyhow::Result;
use serde::{Deserialize, Serialize};

/// A trajectory whose observation is replaced by the hashes of its frames.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HashedTrajectory {
    /// Hashes of the frames, in the order of the last observation axis.
    pub frames: Vec<u64>,

    /// The trajectory with an empty observation.
    pub rest: Trajectory,
}

/// Stores the frames of observations in a [`FrameBuffer`].
///
/// The observation must be a single array whose last axis stacks frames, e.g.
/// `[height, width, num_frames]`. Consecutive observations of a frame-stacking environment
/// share all but one frame, so each frame is stored once.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameHashEncoder {
    frame_buffer: FrameBuffer,
}

impl FrameHashEncoder {
    /// Creates an encoder with an empty frame buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// The frame buffer.
    pub fn frame_buffer(&self) -> &FrameBuffer {
        &self.frame_buffer
    }
}

impl ItemEncoder<Trajectory> for FrameHashEncoder {
    type Encoded = HashedTrajectory;

    fn encode(&mut self, mut item: Trajectory) -> Result<HashedTrajectory> {
        let observation = std::mem::replace(&mut item.observation, Nest::empty());
        let obs = match observation {
            Nest::Leaf(obs) if obs.ndim() > 0 => obs,
            _ => {
                return Err(TrellisError::StructureMismatch(
                    "Frame hashing requires a single array observation with a frame axis"
                        .into(),
                )
                .into())
            }
        };
        let axis = obs.ndim() - 1;
        let num_frames = obs.shape()[axis];
        let frames = (0..num_frames)
            .map(|k| obs.index_axis_keep(axis, k))
            .collect::<Result<Vec<_>>>()?;
        let frames = frames
            .iter()
            .map(|f| self.frame_buffer.add_frame(f))
            .collect();
        Ok(HashedTrajectory { frames, rest: item })
    }

    fn decode(&self, encoded: &HashedTrajectory) -> Result<Trajectory> {
        let frames = encoded
            .frames
            .iter()
            .map(|h| {
                self.frame_buffer
                    .get(*h)
                    .cloned()
                    .ok_or(TrellisError::MissingFrame(*h))
            })
            .collect::<Result<Vec<_>, _>>()?;
        let axis = frames.first().map_or(0, |f| f.ndim() - 1);
        let mut item = encoded.rest.clone();
        item.observation = Nest::Leaf(Array::concatenate(&frames, axis)?);
        Ok(item)
    }

    fn on_delete(&mut self, encoded: &HashedTrajectory) {
        self.frame_buffer.on_delete(&encoded.frames);
    }
}

/// Uniform replay buffer of trajectories with frame de-duplication.
pub type HashedUniformReplayBuffer = UniformReplayBuffer<Trajectory, FrameHashEncoder>;

#[cfg(test)]
mod test {
    use super::*;
    use crate::{
        array::DType,
        base::{PolicyStep, TimeStep},
        replay_buffer::UniformReplayBufferConfig,
    };
    use tempdir::TempDir;

    const NUM_FRAMES: usize = 100;
    const STACK: usize = 4;
    const CAPACITY: usize = 32;
    const NUM_ADDED: usize = 96;

    fn frame(k: usize) -> Array {
        Array::full(DType::U8, &[15, 15, 1], k as f64)
    }

    /// Observation `i` stacks frames `i..i + STACK`.
    fn trajectory(frames: &[Array], i: usize) -> Result<Trajectory> {
        let obs = Array::concatenate(&frames[i..i + STACK], 2)?;
        let ts = TimeStep::transition(Nest::Leaf(obs), 0.0, 1.0);
        let ps = PolicyStep::new(Nest::Leaf(Array::scalar_i64(i as i64)));
        Ok(Trajectory::from_transition(&ts, &ps, &ts))
    }

    fn filled_buffer() -> Result<HashedUniformReplayBuffer> {
        let frames = (0..NUM_FRAMES).map(frame).collect::<Vec<_>>();
        let config = UniformReplayBufferConfig::default().capacity(CAPACITY);
        let mut rb = HashedUniformReplayBuffer::build(&config);
        for i in 0..NUM_ADDED {
            rb.add(trajectory(&frames, i)?)?;
        }
        Ok(rb)
    }

    /// Checks stacked observations of shape `[..., 15, 15, STACK]`.
    fn check_observations(obs: &Array) {
        let values = obs.to_f64_vec();
        let frame_len = 15 * 15 * STACK;
        for stacked in values.chunks(frame_len) {
            let first = stacked[0];
            assert!(first >= (NUM_ADDED - CAPACITY) as f64);
            for c in 0..STACK {
                assert_eq!(stacked[c], first + c as f64);
            }
        }
    }

    fn check_dataset(rb: &mut HashedUniformReplayBuffer) -> Result<()> {
        let batch = rb.as_dataset(Some(5), None).next().unwrap()?;
        let obs = batch.observation.as_leaf().unwrap();
        assert_eq!(obs.shape(), &[5, 15, 15, STACK]);
        assert_eq!(batch.action.as_leaf().unwrap().shape(), &[5]);
        check_observations(obs);

        let batch = rb.as_dataset(Some(5), Some(3)).next().unwrap()?;
        let obs = batch.observation.as_leaf().unwrap();
        assert_eq!(obs.shape(), &[5, 3, 15, 15, STACK]);
        assert_eq!(batch.action.as_leaf().unwrap().shape(), &[5, 3]);
        check_observations(obs);
        Ok(())
    }

    #[test]
    fn test_stacked_frames() -> Result<()> {
        let mut rb = filled_buffer()?;
        assert_eq!(rb.size(), CAPACITY);
        // Frames of the remaining observations 64..96 are 64..99.
        assert_eq!(rb.encoder().frame_buffer().len(), CAPACITY + STACK - 1);
        check_dataset(&mut rb)
    }

    #[test]
    fn test_checkpoint() -> Result<()> {
        let rb = filled_buffer()?;
        let dir = TempDir::new("hashed_replay_buffer")?;
        let path = dir.path().join("rb.bin");
        rb.save(&path)?;

        let config = UniformReplayBufferConfig::default().capacity(CAPACITY);
        let mut restored = HashedUniformReplayBuffer::build(&config);
        restored.load(&path)?;
        assert_eq!(restored.size(), CAPACITY);
        assert_eq!(restored.encoder(), rb.encoder());
        check_dataset(&mut restored)
    }

    #[test]
    fn test_clear_releases_frames() -> Result<()> {
        let mut rb = filled_buffer()?;
        rb.clear();
        assert!(rb.encoder().frame_buffer().is_empty());
        Ok(())
    }

    #[test]
    fn test_rejects_nested_observation() {
        let ts = TimeStep::restart(Nest::tuple_of(vec![frame(0), frame(1)]));
        let ps = PolicyStep::new(Nest::Leaf(Array::scalar_i64(0)));
        let mut encoder = FrameHashEncoder::new();
        assert!(encoder
            .encode(Trajectory::from_transition(&ts, &ps, &ts))
            .is_err());
    }
}
