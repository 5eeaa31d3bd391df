//! Content-addressed store of observation frames.
use crate::array::Array;
use serde::{Deserialize, Serialize};
use std::collections::{hash_map::Entry, HashMap};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct FrameEntry {
    frame: Array,
    refcount: usize,
}

/// Stores frames once per content, with reference counts.
///
/// Frames are keyed by [`Array::hash64`]. Adding a frame already stored increments its
/// reference count; [`FrameBuffer::on_delete`] decrements it and removes the frame once no
/// reference is left.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FrameBuffer {
    frames: HashMap<u64, FrameEntry>,
}

impl FrameBuffer {
    /// Creates an empty frame buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a reference to `frame` and returns its hash.
    pub fn add_frame(&mut self, frame: &Array) -> u64 {
        let hash = frame.hash64();
        self.frames
            .entry(hash)
            .and_modify(|e| e.refcount += 1)
            .or_insert_with(|| FrameEntry {
                frame: frame.clone(),
                refcount: 1,
            });
        hash
    }

    /// Releases one reference to each of the frames.
    pub fn on_delete(&mut self, hashes: &[u64]) {
        for hash in hashes.iter() {
            if let Entry::Occupied(mut e) = self.frames.entry(*hash) {
                e.get_mut().refcount -= 1;
                if e.get().refcount == 0 {
                    e.remove();
                }
            }
        }
    }

    /// Frame with the given hash.
    pub fn get(&self, hash: u64) -> Option<&Array> {
        self.frames.get(&hash).map(|e| &e.frame)
    }

    /// Number of references to the frame with the given hash.
    pub fn refcount(&self, hash: u64) -> usize {
        self.frames.get(&hash).map_or(0, |e| e.refcount)
    }

    /// Number of distinct frames.
    pub fn len(&self) -> usize {
        self.frames.len()
    }

    /// Returns `true` if no frame is stored.
    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    /// Removes every frame.
    pub fn clear(&mut self) {
        self.frames.clear();
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::array::DType;

    fn frame(v: f64) -> Array {
        Array::full(DType::U8, &[15, 15, 1], v)
    }

    #[test]
    fn test_add_and_delete_frame() {
        let mut buffer = FrameBuffer::new();
        let h = buffer.add_frame(&frame(1.0));
        assert_eq!(buffer.len(), 1);
        buffer.on_delete(&[h]);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_delete_one_of_two_frames() {
        let mut buffer = FrameBuffer::new();
        let h1 = buffer.add_frame(&frame(1.0));
        let h2 = buffer.add_frame(&frame(2.0));
        assert_ne!(h1, h2);
        buffer.on_delete(&[h1]);
        assert_eq!(buffer.len(), 1);
        assert_eq!(buffer.get(h2), Some(&frame(2.0)));
        assert_eq!(buffer.get(h1), None);
    }

    #[test]
    fn test_shared_frame_refcount() {
        let mut buffer = FrameBuffer::new();
        let h = buffer.add_frame(&frame(3.0));
        assert_eq!(buffer.add_frame(&frame(3.0)), h);
        assert_eq!(buffer.refcount(h), 2);
        buffer.on_delete(&[h]);
        assert_eq!(buffer.len(), 1);
        buffer.on_delete(&[h]);
        assert!(buffer.is_empty());
    }
}
