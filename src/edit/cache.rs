//! Stroke-scoped write-back cache over the region data interface.
//!
//! A tool opens one cache per stroke. The cache keeps a single bounding rect
//! of fetched data; growing it fetches only the border strips not yet
//! covered, so dragging a brush re-reads nothing.

use std::collections::HashMap;

use crate::core::types::Result;
use crate::math::GridRect;
use crate::terrain::Terrain;

/// Seam between the cache and one kind of terrain data.
pub trait RegionAccessor {
    type Sample: Clone + Default;

    /// Fetch a region into the map. Vertices over missing components are
    /// simply not inserted.
    fn get_region(
        &mut self,
        terrain: &Terrain,
        rect: GridRect,
        out: &mut HashMap<(i32, i32), Self::Sample>,
    );

    /// Write a dense row-major region back to the terrain.
    fn set_region(&mut self, terrain: &mut Terrain, rect: GridRect, data: &[Self::Sample])
        -> Result<()>;

    /// End-of-stroke hook (collision rebuilds and the like).
    fn flush(&mut self, terrain: &mut Terrain);
}

/// Sparse cache of terrain samples with strip-wise extension.
pub struct EditCache<A: RegionAccessor> {
    accessor: A,
    data: HashMap<(i32, i32), A::Sample>,
    cached: Option<GridRect>,
}

impl<A: RegionAccessor> EditCache<A> {
    pub fn new(accessor: A) -> Self {
        Self { accessor, data: HashMap::new(), cached: None }
    }

    pub fn accessor(&self) -> &A {
        &self.accessor
    }

    pub fn cached_rect(&self) -> Option<GridRect> {
        self.cached
    }

    /// Make sure every vertex of the rect has been fetched. Only the strips
    /// outside the current cached rect are read from the terrain.
    pub fn cache_region(&mut self, terrain: &Terrain, rect: GridRect) {
        let Some(cur) = self.cached else {
            self.accessor.get_region(terrain, rect, &mut self.data);
            self.cached = Some(rect);
            return;
        };
        if cur.contains(rect.x1, rect.y1) && cur.contains(rect.x2, rect.y2) {
            return;
        }

        // side strips span the union's full height, top/bottom strips only
        // the previously cached width
        let y1 = rect.y1.min(cur.y1);
        let y2 = rect.y2.max(cur.y2);
        if rect.x1 < cur.x1 {
            self.accessor.get_region(
                terrain,
                GridRect::new(rect.x1, y1, cur.x1 - 1, y2),
                &mut self.data,
            );
        }
        if rect.x2 > cur.x2 {
            self.accessor.get_region(
                terrain,
                GridRect::new(cur.x2 + 1, y1, rect.x2, y2),
                &mut self.data,
            );
        }
        if rect.y1 < cur.y1 {
            self.accessor.get_region(
                terrain,
                GridRect::new(cur.x1, rect.y1, cur.x2, cur.y1 - 1),
                &mut self.data,
            );
        }
        if rect.y2 > cur.y2 {
            self.accessor.get_region(
                terrain,
                GridRect::new(cur.x1, cur.y2 + 1, cur.x2, rect.y2),
                &mut self.data,
            );
        }
        self.cached = Some(cur.union(&rect));
    }

    /// Dense row-major copy of a rect. Samples never fetched (or over
    /// missing components) come out as `Default`.
    pub fn get_cached(&self, rect: GridRect) -> Vec<A::Sample> {
        let mut out = Vec::with_capacity(rect.area());
        for (x, y) in rect.iter() {
            out.push(self.data.get(&(x, y)).cloned().unwrap_or_default());
        }
        out
    }

    pub fn value(&self, x: i32, y: i32) -> Option<&A::Sample> {
        self.data.get(&(x, y))
    }

    /// Update the cache only; the terrain is untouched until `set_cached`.
    pub fn set_value(&mut self, x: i32, y: i32, value: A::Sample) {
        self.data.insert((x, y), value);
    }

    /// Store a dense rect into the cache and write it through to the
    /// terrain.
    pub fn set_cached(
        &mut self,
        terrain: &mut Terrain,
        rect: GridRect,
        data: &[A::Sample],
    ) -> Result<()> {
        for (i, (x, y)) in rect.iter().enumerate() {
            self.data.insert((x, y), data[i].clone());
        }
        self.accessor.set_region(terrain, rect, data)
    }

    pub fn flush(&mut self, terrain: &mut Terrain) {
        self.accessor.flush(terrain);
    }
}
