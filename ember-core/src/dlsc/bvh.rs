//! Index BVH over cache entry positions, laid out as a flat skip-list so a
//! query is a single forward sweep over the node array.

use serde::{Deserialize, Serialize};

use crate::geometry::{Normal3f, Point3f};

#[derive(Debug, Clone, Serialize, Deserialize)]
struct ArrayNode {
    bbox_min: [f32; 3],
    bbox_max: [f32; 3],
    /// Leaf: index of the entry. Interior: unused.
    entry_index: u32,
    /// Index of the first node after this subtree.
    skip_index: u32,
    is_leaf: bool,
}

/// The data the BVH needs from each cache entry.
pub trait BvhEntry {
    fn position(&self) -> Point3f;
    fn normal(&self) -> Normal3f;
    fn is_volume(&self) -> bool;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlscBvh {
    nodes: Vec<ArrayNode>,
    entry_radius2: f32,
    normal_cos_angle: f32,
}

impl DlscBvh {
    pub fn new<E: BvhEntry>(entries: &[E], radius: f32, normal_angle_deg: f32) -> DlscBvh {
        let mut bvh = DlscBvh {
            nodes: Vec::new(),
            entry_radius2: radius * radius,
            normal_cos_angle: normal_angle_deg.to_radians().cos(),
        };
        if entries.is_empty() {
            return bvh;
        }
        let mut indices: Vec<u32> = (0..entries.len() as u32).collect();
        let positions: Vec<Point3f> = entries.iter().map(BvhEntry::position).collect();
        let n = indices.len();
        bvh.build_recursive(&positions, radius, &mut indices, 0, n);
        bvh
    }

    fn build_recursive(
        &mut self,
        positions: &[Point3f],
        radius: f32,
        indices: &mut [u32],
        start: usize,
        end: usize,
    ) {
        // Node bounds cover the entry positions expanded by the lookup
        // radius, so a point-in-box test is a conservative radius test.
        let mut bbox_min = [f32::INFINITY; 3];
        let mut bbox_max = [f32::NEG_INFINITY; 3];
        for &i in &indices[start..end] {
            let p = positions[i as usize];
            for axis in 0..3 {
                bbox_min[axis] = bbox_min[axis].min(p[axis] - radius);
                bbox_max[axis] = bbox_max[axis].max(p[axis] + radius);
            }
        }

        if end - start == 1 {
            self.nodes.push(ArrayNode {
                bbox_min,
                bbox_max,
                entry_index: indices[start],
                skip_index: self.nodes.len() as u32 + 1,
                is_leaf: true,
            });
            return;
        }

        // Median split on the widest axis of the positions.
        let mut axis = 0;
        let mut widest = f32::NEG_INFINITY;
        for a in 0..3 {
            let extent = bbox_max[a] - bbox_min[a];
            if extent > widest {
                widest = extent;
                axis = a;
            }
        }
        indices[start..end].sort_unstable_by(|&a, &b| {
            positions[a as usize][axis]
                .partial_cmp(&positions[b as usize][axis])
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        let mid = start + (end - start) / 2;

        let node_index = self.nodes.len();
        self.nodes.push(ArrayNode {
            bbox_min,
            bbox_max,
            entry_index: 0,
            skip_index: 0,
            is_leaf: false,
        });
        self.build_recursive(positions, radius, indices, start, mid);
        self.build_recursive(positions, radius, indices, mid, end);
        self.nodes[node_index].skip_index = self.nodes.len() as u32;
    }

    fn point_in_node(node: &ArrayNode, p: &Point3f) -> bool {
        p.x >= node.bbox_min[0]
            && p.x <= node.bbox_max[0]
            && p.y >= node.bbox_min[1]
            && p.y <= node.bbox_max[1]
            && p.z >= node.bbox_min[2]
            && p.z <= node.bbox_max[2]
    }

    /// Nearest entry within the lookup radius whose normal passes the cone
    /// test (skipped for volumes, which match both sides).
    pub fn get_nearest_entry<E: BvhEntry>(
        &self,
        entries: &[E],
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
    ) -> Option<usize> {
        let mut nearest = None;
        let mut nearest_distance2 = self.entry_radius2;

        let mut current = 0usize;
        let stop = self.nodes.len();
        while current < stop {
            let node = &self.nodes[current];
            if node.is_leaf {
                let entry = &entries[node.entry_index as usize];
                let distance2 = p.distance_squared(&entry.position());
                if distance2 < nearest_distance2
                    && is_volume == entry.is_volume()
                    && (is_volume || n.dot(&entry.normal()) > self.normal_cos_angle)
                {
                    nearest = Some(node.entry_index as usize);
                    nearest_distance2 = distance2;
                }
                current += 1;
            } else if Self::point_in_node(node, p) {
                current += 1;
            } else {
                current = node.skip_index as usize;
            }
        }
        nearest
    }

    /// All entries within the build radius. The normal test is relaxed to a
    /// sign check so neighbors on curved surfaces still merge.
    pub fn get_all_near_entries<E: BvhEntry>(
        &self,
        entries: &[E],
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
    ) -> Vec<usize> {
        let mut found = Vec::new();
        let mut current = 0usize;
        let stop = self.nodes.len();
        while current < stop {
            let node = &self.nodes[current];
            if node.is_leaf {
                let entry = &entries[node.entry_index as usize];
                if p.distance_squared(&entry.position()) < self.entry_radius2
                    && is_volume == entry.is_volume()
                    && (is_volume || n.dot(&entry.normal()) > 0.0)
                {
                    found.push(node.entry_index as usize);
                }
                current += 1;
            } else if Self::point_in_node(node, p) {
                current += 1;
            } else {
                current = node.skip_index as usize;
            }
        }
        found
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestEntry {
        p: Point3f,
        n: Normal3f,
    }

    impl BvhEntry for TestEntry {
        fn position(&self) -> Point3f {
            self.p
        }
        fn normal(&self) -> Normal3f {
            self.n
        }
        fn is_volume(&self) -> bool {
            false
        }
    }

    fn grid_entries() -> Vec<TestEntry> {
        let mut entries = Vec::new();
        for y in 0..8 {
            for x in 0..8 {
                entries.push(TestEntry {
                    p: Point3f::new(x as f32, y as f32, 0.0),
                    n: Normal3f::new(0.0, 0.0, 1.0),
                });
            }
        }
        entries
    }

    #[test]
    fn test_nearest_entry() {
        let entries = grid_entries();
        let bvh = DlscBvh::new(&entries, 0.75, 25.0);
        let up = Normal3f::new(0.0, 0.0, 1.0);

        let found = bvh
            .get_nearest_entry(&entries, &Point3f::new(3.2, 4.1, 0.0), &up, false)
            .unwrap();
        assert_eq!(entries[found].p, Point3f::new(3.0, 4.0, 0.0));

        // Far outside the grid there is nothing within the radius.
        assert!(bvh
            .get_nearest_entry(&entries, &Point3f::new(20.0, 0.0, 0.0), &up, false)
            .is_none());
    }

    #[test]
    fn test_normal_cone_rejection() {
        let entries = grid_entries();
        let bvh = DlscBvh::new(&entries, 0.75, 25.0);
        let sideways = Normal3f::new(1.0, 0.0, 0.0);
        assert!(bvh
            .get_nearest_entry(&entries, &Point3f::new(3.0, 4.0, 0.0), &sideways, false)
            .is_none());
    }

    #[test]
    fn test_all_near_entries() {
        let entries = grid_entries();
        let bvh = DlscBvh::new(&entries, 1.5, 25.0);
        let up = Normal3f::new(0.0, 0.0, 1.0);
        let near = bvh.get_all_near_entries(&entries, &Point3f::new(3.0, 3.0, 0.0), &up, false);
        // Self plus the four direct neighbors fall within radius 1.5.
        assert_eq!(near.len(), 5);
    }

    #[test]
    fn test_empty() {
        let entries: Vec<TestEntry> = Vec::new();
        let bvh = DlscBvh::new(&entries, 1.0, 25.0);
        assert!(bvh
            .get_nearest_entry(
                &entries,
                &Point3f::zero(),
                &Normal3f::new(0.0, 0.0, 1.0),
                false
            )
            .is_none());
    }
}
