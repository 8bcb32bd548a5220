//! Byte-range index of the objects inside one root

use super::ids::ObjectId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Default)]
pub struct ByteArena {
    /// (start, object) -> end (exclusive)
    ranges: BTreeMap<(i64, ObjectId), i64>,
}

impl ByteArena {
    pub fn insert(&mut self, obj: ObjectId, start: i64, end: i64) {
        self.ranges.insert((start, obj), end);
    }

    pub fn remove(&mut self, obj: ObjectId, start: i64) {
        self.ranges.remove(&(start, obj));
    }

    pub fn clear(&mut self) {
        self.ranges.clear();
    }

    /// Objects whose byte range intersects `[start, end)`
    pub fn overlapping(&self, start: i64, end: i64) -> Vec<ObjectId> {
        self.ranges
            .range(..(end, ObjectId(0)))
            .filter(|(_, &obj_end)| obj_end > start)
            .map(|((_, obj), _)| *obj)
            .collect()
    }

    pub fn len(&self) -> usize {
        self.ranges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ranges.is_empty()
    }
}
