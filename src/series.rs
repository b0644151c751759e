use crate::models::Reading;
use std::collections::VecDeque;

/// Number of points kept for the line chart.
pub const MAX_POINTS: usize = 25;

/// Rolling window of readings in arrival order. Oldest points are evicted
/// first once the capacity is exceeded.
#[derive(Debug, Clone)]
pub struct SeriesBuffer {
    points: VecDeque<Reading>,
    capacity: usize,
}

impl Default for SeriesBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl SeriesBuffer {
    pub fn new() -> Self {
        Self::with_capacity(MAX_POINTS)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            points: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    pub fn push(&mut self, reading: Reading) {
        self.points.push_back(reading);
        while self.points.len() > self.capacity {
            self.points.pop_front();
        }
    }

    pub fn current_points(&self) -> Vec<Reading> {
        self.points.iter().copied().collect()
    }

    pub fn latest(&self) -> Option<&Reading> {
        self.points.back()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.points.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    #[cfg(test)]
    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
