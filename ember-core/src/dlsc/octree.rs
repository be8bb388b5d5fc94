//! Octree used while tracing visibility particles: finds, for a candidate
//! point, an already-recorded particle within the lookup radius and normal
//! cone so the two can be merged.

use crate::geometry::{Bounds3f, Normal3f, Point3f, Vector3f};

struct OctreeNode {
    children: [Option<Box<OctreeNode>>; 8],
    entries: Vec<u32>,
}

impl OctreeNode {
    fn new() -> OctreeNode {
        OctreeNode {
            children: Default::default(),
            entries: Vec::new(),
        }
    }
}

/// Copy of the per-particle key data, kept flat for cache-friendly tests.
struct OctreeEntry {
    p: Point3f,
    n: Normal3f,
    is_volume: bool,
}

pub struct DlscOctree {
    root: OctreeNode,
    world_bbox: Bounds3f,
    entry_radius: f32,
    entry_radius2: f32,
    entry_normal_cos_angle: f32,
    max_depth: u32,
    entries: Vec<OctreeEntry>,
}

fn child_bbox(child: usize, node_bbox: &Bounds3f, mid: &Point3f) -> Bounds3f {
    let mut p_min = node_bbox.p_min;
    let mut p_max = *mid;
    if child & 4 != 0 {
        p_min.x = mid.x;
        p_max.x = node_bbox.p_max.x;
    }
    if child & 2 != 0 {
        p_min.y = mid.y;
        p_max.y = node_bbox.p_max.y;
    }
    if child & 1 != 0 {
        p_min.z = mid.z;
        p_max.z = node_bbox.p_max.z;
    }
    Bounds3f { p_min, p_max }
}

fn overlaps(a: &Bounds3f, b: &Bounds3f) -> bool {
    a.p_min.x <= b.p_max.x
        && a.p_max.x >= b.p_min.x
        && a.p_min.y <= b.p_max.y
        && a.p_max.y >= b.p_min.y
        && a.p_min.z <= b.p_max.z
        && a.p_max.z >= b.p_min.z
}

impl DlscOctree {
    pub fn new(world_bbox: Bounds3f, entry_radius: f32, normal_angle_deg: f32) -> DlscOctree {
        DlscOctree {
            root: OctreeNode::new(),
            world_bbox: world_bbox.expand(entry_radius),
            entry_radius,
            entry_radius2: entry_radius * entry_radius,
            entry_normal_cos_angle: normal_angle_deg.to_radians().cos(),
            max_depth: 24,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Register a new particle; its index must match the caller's particle
    /// list.
    pub fn add(&mut self, index: u32, p: Point3f, n: Normal3f, is_volume: bool) {
        debug_assert_eq!(index as usize, self.entries.len());
        self.entries.push(OctreeEntry { p, n, is_volume });

        let r = Vector3f::new(self.entry_radius, self.entry_radius, self.entry_radius);
        let entry_bbox = Bounds3f::from_points(&(p - r), &(p + r));
        let world = self.world_bbox;
        let max_depth = self.max_depth;
        Self::add_impl(&mut self.root, &world, index, &entry_bbox, max_depth);
    }

    fn add_impl(
        node: &mut OctreeNode,
        node_bbox: &Bounds3f,
        index: u32,
        entry_bbox: &Bounds3f,
        depth: u32,
    ) {
        let mid = node_bbox.center();
        if depth == 0
            || (entry_bbox.p_min.x <= node_bbox.p_min.x
                && entry_bbox.p_max.x >= node_bbox.p_max.x
                && entry_bbox.p_min.y <= node_bbox.p_min.y
                && entry_bbox.p_max.y >= node_bbox.p_max.y
                && entry_bbox.p_min.z <= node_bbox.p_min.z
                && entry_bbox.p_max.z >= node_bbox.p_max.z)
        {
            node.entries.push(index);
            return;
        }
        for child in 0..8 {
            let cb = child_bbox(child, node_bbox, &mid);
            if overlaps(&cb, entry_bbox) {
                let child_node = node.children[child].get_or_insert_with(|| Box::new(OctreeNode::new()));
                Self::add_impl(child_node, &cb, index, entry_bbox, depth - 1);
            }
        }
    }

    /// First particle within the lookup radius whose normal agrees (strict
    /// cone test), or `None`.
    pub fn get_entry(&self, p: &Point3f, n: &Normal3f, is_volume: bool) -> Option<u32> {
        self.get_entry_impl(&self.root, &self.world_bbox, p, n, is_volume)
    }

    fn get_entry_impl(
        &self,
        node: &OctreeNode,
        node_bbox: &Bounds3f,
        p: &Point3f,
        n: &Normal3f,
        is_volume: bool,
    ) -> Option<u32> {
        if !node_bbox.contains(p) {
            return None;
        }
        for &index in &node.entries {
            let entry = &self.entries[index as usize];
            if p.distance_squared(&entry.p) <= self.entry_radius2
                && is_volume == entry.is_volume
                && (is_volume || n.dot(&entry.n) >= self.entry_normal_cos_angle)
            {
                return Some(index);
            }
        }
        let mid = node_bbox.center();
        for child in 0..8 {
            if let Some(child_node) = &node.children[child] {
                let cb = child_bbox(child, node_bbox, &mid);
                if let Some(found) = self.get_entry_impl(child_node, &cb, p, n, is_volume) {
                    return Some(found);
                }
            }
        }
        None
    }

    pub fn entry_position(&self, index: u32) -> Point3f {
        self.entries[index as usize].p
    }
}
