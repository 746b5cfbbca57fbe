//! Spatial hash grid for broad-phase collision
//!
//! The grid is rebuilt from scratch every tick and never carried over:
//! - each solid, alive entity is added to every cell its AABB overlaps
//! - buckets hold arena indices, valid until the next cleanup
//! - cells live in a `BTreeMap` so pair generation order is stable

use std::collections::{BTreeMap, HashSet};

use glam::Vec2;

use super::aabb::{Aabb, CellKey, cell_of};
use super::entity::Entity;
use crate::consts::GRID_SIZE;

#[derive(Debug, Clone)]
pub struct SpatialGrid {
    cell_size: f32,
    cells: BTreeMap<CellKey, Vec<usize>>,
}

impl Default for SpatialGrid {
    fn default() -> Self {
        Self::new(GRID_SIZE)
    }
}

impl SpatialGrid {
    pub fn new(cell_size: f32) -> Self {
        Self {
            cell_size: cell_size.max(1.0),
            cells: BTreeMap::new(),
        }
    }

    pub fn cell_size(&self) -> f32 {
        self.cell_size
    }

    pub fn clear(&mut self) {
        self.cells.clear();
    }

    /// Rebuild every bucket from the current entity positions
    pub fn rebuild(&mut self, entities: &[Entity]) {
        self.cells.clear();
        for (index, entity) in entities.iter().enumerate() {
            if !entity.alive || !entity.solid {
                continue;
            }
            let bounds = entity.bounds();
            for cell in self.cells_for(&bounds) {
                self.cells.entry(cell).or_default().push(index);
            }
        }
    }

    pub fn cell_of(&self, p: Vec2) -> CellKey {
        cell_of(p, self.cell_size)
    }

    /// Every cell overlapped by `bounds`
    pub fn cells_for(&self, bounds: &Aabb) -> impl Iterator<Item = CellKey> + use<> {
        let ((x0, y0), (x1, y1)) = bounds.cell_range(self.cell_size);
        (y0..=y1).flat_map(move |y| (x0..=x1).map(move |x| (x, y)))
    }

    pub fn bucket(&self, cell: CellKey) -> &[usize] {
        self.cells.get(&cell).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn occupied_cells(&self) -> usize {
        self.cells.len()
    }

    /// Unique entity indices whose cells overlap `bounds`, ascending
    pub fn query(&self, bounds: &Aabb) -> Vec<usize> {
        let mut found: Vec<usize> = self
            .cells_for(bounds)
            .flat_map(|cell| self.bucket(cell).iter().copied())
            .collect();
        found.sort_unstable();
        found.dedup();
        found
    }

    /// Unordered index pairs sharing at least one cell, each reported once.
    /// `accept` filters pairs before they are recorded.
    pub fn candidate_pairs(&self, mut accept: impl FnMut(usize, usize) -> bool) -> Vec<(usize, usize)> {
        let mut seen: HashSet<(usize, usize)> = HashSet::new();
        let mut pairs = Vec::new();

        for bucket in self.cells.values() {
            if bucket.len() < 2 {
                continue;
            }
            for (n, &a) in bucket.iter().enumerate() {
                for &b in &bucket[n + 1..] {
                    let key = if a < b { (a, b) } else { (b, a) };
                    if seen.contains(&key) {
                        continue;
                    }
                    seen.insert(key);
                    if accept(key.0, key.1) {
                        pairs.push(key);
                    }
                }
            }
        }
        pairs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sim::entity::{EntityKind, Layer, LayerMask, Wall, WallKind};
    use proptest::prelude::*;

    fn block(id: u32, x: f32, y: f32, w: f32, h: f32) -> Entity {
        Entity::new(
            id,
            Vec2::new(x, y),
            Vec2::new(w, h),
            Layer::Wall,
            LayerMask::of(&[Layer::Tank]),
            EntityKind::Wall(Wall {
                kind: WallKind::Barrier,
                destructible: false,
            }),
        )
    }

    #[test]
    fn test_entity_straddling_boundary_fills_four_cells() {
        let mut grid = SpatialGrid::default();
        grid.rebuild(&[block(1, 50.0, 50.0, 32.0, 32.0)]);

        assert_eq!(grid.occupied_cells(), 4);
        for cell in [(0, 0), (1, 0), (0, 1), (1, 1)] {
            assert_eq!(grid.bucket(cell), &[0]);
        }
    }

    #[test]
    fn test_dead_and_non_solid_are_skipped() {
        let mut dead = block(1, 0.0, 0.0, 10.0, 10.0);
        dead.alive = false;
        let mut ghost = block(2, 0.0, 0.0, 10.0, 10.0);
        ghost.solid = false;

        let mut grid = SpatialGrid::default();
        grid.rebuild(&[dead, ghost]);
        assert_eq!(grid.occupied_cells(), 0);
    }

    #[test]
    fn test_pairs_sharing_many_cells_reported_once() {
        let mut grid = SpatialGrid::default();
        // Both straddle the same four cells
        grid.rebuild(&[
            block(1, 40.0, 40.0, 40.0, 40.0),
            block(2, 50.0, 50.0, 40.0, 40.0),
        ]);
        let pairs = grid.candidate_pairs(|_, _| true);
        assert_eq!(pairs, vec![(0, 1)]);
    }

    #[test]
    fn test_rebuild_discards_previous_tick() {
        let mut grid = SpatialGrid::default();
        let mut e = block(1, 0.0, 0.0, 10.0, 10.0);
        grid.rebuild(std::slice::from_ref(&e));
        assert_eq!(grid.bucket((0, 0)), &[0]);

        e.pos = Vec2::new(300.0, 300.0);
        grid.rebuild(std::slice::from_ref(&e));
        assert!(grid.bucket((0, 0)).is_empty());
        assert_eq!(grid.bucket((4, 4)), &[0]);
    }

    #[test]
    fn test_query_returns_unique_indices() {
        let mut grid = SpatialGrid::default();
        grid.rebuild(&[block(1, 60.0, 60.0, 10.0, 10.0), block(2, 500.0, 500.0, 10.0, 10.0)]);
        let hits = grid.query(&Aabb::new(Vec2::ZERO, Vec2::new(128.0, 128.0)));
        assert_eq!(hits, vec![0]);
    }

    proptest! {
        #[test]
        fn prop_grid_completeness(
            boxes in prop::collection::vec((-300.0f32..300.0, -300.0f32..300.0, 1.0f32..150.0, 1.0f32..150.0), 1..20)
        ) {
            let entities: Vec<Entity> = boxes
                .iter()
                .enumerate()
                .map(|(i, &(x, y, w, h))| block(i as u32 + 1, x, y, w, h))
                .collect();
            let mut grid = SpatialGrid::default();
            grid.rebuild(&entities);

            for (index, e) in entities.iter().enumerate() {
                for cell in grid.cells_for(&e.bounds()) {
                    prop_assert!(grid.bucket(cell).contains(&index));
                }
            }
        }

        #[test]
        fn prop_pairs_are_unique(
            boxes in prop::collection::vec((0.0f32..256.0, 0.0f32..256.0, 1.0f32..100.0, 1.0f32..100.0), 2..16)
        ) {
            let entities: Vec<Entity> = boxes
                .iter()
                .enumerate()
                .map(|(i, &(x, y, w, h))| block(i as u32 + 1, x, y, w, h))
                .collect();
            let mut grid = SpatialGrid::default();
            grid.rebuild(&entities);

            let pairs = grid.candidate_pairs(|_, _| true);
            let unique: HashSet<_> = pairs.iter().copied().collect();
            prop_assert_eq!(unique.len(), pairs.len());
            for (a, b) in pairs {
                prop_assert!(a < b);
            }
        }
    }
}
