use crate::geometry::{Bounds3f, Normal3f, Point2f, Point3f, Vector3f};

/// Indexed triangle mesh with optional per-vertex shading normals and UVs.
#[derive(Debug, Clone)]
pub struct TriangleMesh {
    pub points: Vec<Point3f>,
    pub triangles: Vec<[u32; 3]>,
    pub normals: Option<Vec<Normal3f>>,
    pub uvs: Option<Vec<Point2f>>,
}

impl TriangleMesh {
    pub fn new(points: Vec<Point3f>, triangles: Vec<[u32; 3]>) -> TriangleMesh {
        TriangleMesh {
            points,
            triangles,
            normals: None,
            uvs: None,
        }
    }

    pub fn with_normals(mut self, normals: Vec<Normal3f>) -> TriangleMesh {
        debug_assert_eq!(normals.len(), self.points.len());
        self.normals = Some(normals);
        self
    }

    pub fn with_uvs(mut self, uvs: Vec<Point2f>) -> TriangleMesh {
        debug_assert_eq!(uvs.len(), self.points.len());
        self.uvs = Some(uvs);
        self
    }

    /// Two triangles spanning the quad `p0 p1 p2 p3` (counter-clockwise).
    pub fn quad(p0: Point3f, p1: Point3f, p2: Point3f, p3: Point3f) -> TriangleMesh {
        TriangleMesh::new(vec![p0, p1, p2, p3], vec![[0, 1, 2], [0, 2, 3]])
    }

    pub fn triangle_vertices(&self, tri: usize) -> (Point3f, Point3f, Point3f) {
        let [i0, i1, i2] = self.triangles[tri];
        (
            self.points[i0 as usize],
            self.points[i1 as usize],
            self.points[i2 as usize],
        )
    }

    /// Geometric normal of the triangle's front face.
    pub fn geometric_normal(&self, tri: usize) -> Normal3f {
        let (v0, v1, v2) = self.triangle_vertices(tri);
        Normal3f::from((v1 - v0).cross(&(v2 - v0)).normalize())
    }

    pub fn triangle_area(&self, tri: usize) -> f32 {
        let (v0, v1, v2) = self.triangle_vertices(tri);
        0.5 * (v1 - v0).cross(&(v2 - v0)).length()
    }

    pub fn triangle_bounds(&self, tri: usize) -> Bounds3f {
        let (v0, v1, v2) = self.triangle_vertices(tri);
        Bounds3f::from_points(&v0, &v1).union_point(&v2)
    }

    /// Interpolated shading normal at barycentric coordinates `(b1, b2)`,
    /// falling back to the geometric normal.
    pub fn shading_normal(&self, tri: usize, b1: f32, b2: f32) -> Normal3f {
        match &self.normals {
            Some(normals) => {
                let [i0, i1, i2] = self.triangles[tri];
                let b0 = 1.0 - b1 - b2;
                let n0 = normals[i0 as usize];
                let n1 = normals[i1 as usize];
                let n2 = normals[i2 as usize];
                (n0 * b0 + n1 * b1 + n2 * b2).normalize()
            }
            None => self.geometric_normal(tri),
        }
    }

    pub fn interpolated_uv(&self, tri: usize, b1: f32, b2: f32) -> Point2f {
        match &self.uvs {
            Some(uvs) => {
                let [i0, i1, i2] = self.triangles[tri];
                let b0 = 1.0 - b1 - b2;
                let uv0 = uvs[i0 as usize];
                let uv1 = uvs[i1 as usize];
                let uv2 = uvs[i2 as usize];
                Point2f::new(
                    b0 * uv0.x + b1 * uv1.x + b2 * uv2.x,
                    b0 * uv0.y + b1 * uv1.y + b2 * uv2.y,
                )
            }
            None => Point2f::new(b1, b2),
        }
    }
}

/// Möller-Trumbore ray/triangle intersection; returns `(t, b1, b2)`.
pub fn intersect_triangle(
    o: &Point3f,
    d: &Vector3f,
    v0: &Point3f,
    v1: &Point3f,
    v2: &Point3f,
) -> Option<(f32, f32, f32)> {
    let e1 = *v1 - *v0;
    let e2 = *v2 - *v0;
    let p = d.cross(&e2);
    let det = e1.dot(&p);
    if det.abs() < 1e-12 {
        return None;
    }
    let inv_det = 1.0 / det;
    let tv = *o - *v0;
    let b1 = tv.dot(&p) * inv_det;
    if !(0.0..=1.0).contains(&b1) {
        return None;
    }
    let q = tv.cross(&e1);
    let b2 = d.dot(&q) * inv_det;
    if b2 < 0.0 || b1 + b2 > 1.0 {
        return None;
    }
    let t = e2.dot(&q) * inv_det;
    if t <= 0.0 {
        return None;
    }
    Some((t, b1, b2))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_quad_area() {
        let mesh = TriangleMesh::quad(
            Point3f::new(0.0, 0.0, 0.0),
            Point3f::new(1.0, 0.0, 0.0),
            Point3f::new(1.0, 1.0, 0.0),
            Point3f::new(0.0, 1.0, 0.0),
        );
        let area: f32 = (0..mesh.triangles.len()).map(|t| mesh.triangle_area(t)).sum();
        assert!((area - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_triangle_hit_and_miss() {
        let v0 = Point3f::new(0.0, 0.0, 0.0);
        let v1 = Point3f::new(1.0, 0.0, 0.0);
        let v2 = Point3f::new(0.0, 1.0, 0.0);
        let o = Point3f::new(0.25, 0.25, 1.0);
        let d = Vector3f::new(0.0, 0.0, -1.0);
        let (t, b1, b2) = intersect_triangle(&o, &d, &v0, &v1, &v2).unwrap();
        assert!((t - 1.0).abs() < 1e-6);
        assert!(b1 >= 0.0 && b2 >= 0.0);

        let o_miss = Point3f::new(2.0, 2.0, 1.0);
        assert!(intersect_triangle(&o_miss, &d, &v0, &v1, &v2).is_none());
    }
}
