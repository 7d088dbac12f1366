//! Inclusive integer rectangles on the vertex grid.

use serde::{Deserialize, Serialize};

/// An axis-aligned rectangle of grid vertices, inclusive on all sides.
///
/// A rect with `x1 == x2` and `y1 == y2` covers exactly one vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct GridRect {
    pub x1: i32,
    pub y1: i32,
    pub x2: i32,
    pub y2: i32,
}

impl GridRect {
    pub fn new(x1: i32, y1: i32, x2: i32, y2: i32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Single-vertex rect.
    pub fn point(x: i32, y: i32) -> Self {
        Self { x1: x, y1: y, x2: x, y2: y }
    }

    /// Number of vertices covered horizontally.
    pub fn width(&self) -> i32 {
        self.x2 - self.x1 + 1
    }

    /// Number of vertices covered vertically.
    pub fn height(&self) -> i32 {
        self.y2 - self.y1 + 1
    }

    pub fn area(&self) -> usize {
        (self.width() as usize) * (self.height() as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.x2 < self.x1 || self.y2 < self.y1
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    /// Smallest rect covering both.
    pub fn union(&self, other: &GridRect) -> GridRect {
        GridRect {
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
            x2: self.x2.max(other.x2),
            y2: self.y2.max(other.y2),
        }
    }

    /// Overlap of two rects, if any.
    pub fn intersect(&self, other: &GridRect) -> Option<GridRect> {
        let r = GridRect {
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
            x2: self.x2.min(other.x2),
            y2: self.y2.min(other.y2),
        };
        if r.is_empty() { None } else { Some(r) }
    }

    /// Row-major flat index of (x, y) within this rect.
    pub fn index_of(&self, x: i32, y: i32) -> usize {
        debug_assert!(self.contains(x, y));
        ((y - self.y1) * self.width() + (x - self.x1)) as usize
    }

    /// Iterate all (x, y) vertices row-major.
    pub fn iter(&self) -> impl Iterator<Item = (i32, i32)> + '_ {
        let (x1, x2) = (self.x1, self.x2);
        (self.y1..=self.y2).flat_map(move |y| (x1..=x2).map(move |x| (x, y)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_width_height() {
        let r = GridRect::new(2, 3, 5, 3);
        assert_eq!(r.width(), 4);
        assert_eq!(r.height(), 1);
        assert_eq!(r.area(), 4);
    }

    #[test]
    fn test_point_rect() {
        let r = GridRect::point(7, -2);
        assert_eq!(r.area(), 1);
        assert!(r.contains(7, -2));
        assert!(!r.contains(8, -2));
    }

    #[test]
    fn test_union_intersect() {
        let a = GridRect::new(0, 0, 4, 4);
        let b = GridRect::new(3, 3, 8, 8);
        assert_eq!(a.union(&b), GridRect::new(0, 0, 8, 8));
        assert_eq!(a.intersect(&b), Some(GridRect::new(3, 3, 4, 4)));

        let c = GridRect::new(10, 10, 12, 12);
        assert_eq!(a.intersect(&c), None);
    }

    #[test]
    fn test_index_of() {
        let r = GridRect::new(1, 1, 3, 3);
        assert_eq!(r.index_of(1, 1), 0);
        assert_eq!(r.index_of(3, 1), 2);
        assert_eq!(r.index_of(1, 2), 3);
    }

    #[test]
    fn test_iter_row_major() {
        let r = GridRect::new(0, 0, 1, 1);
        let v: Vec<_> = r.iter().collect();
        assert_eq!(v, vec![(0, 0), (1, 0), (0, 1), (1, 1)]);
    }
}
