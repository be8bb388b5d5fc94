//! The scene aggregate and the intersection oracle the integrators consume.

use std::sync::Arc;

use log::info;

use crate::bsdf::{Bsdf, BsdfEvent, HitPoint, Material};
use crate::camera::PerspectiveCamera;
use crate::epsilon;
use crate::error::{RenderError, Result};
use crate::geometry::{Bounds3f, Point3f};
use crate::light::{LightKind, LightSource, TriangleLight};
use crate::ray::Ray;
use crate::spectrum::Spectrum;
use crate::volume::{PathVolumeInfo, Volume};

mod accel;
mod mesh;

pub use self::accel::{Bvh, TriHit};
pub use self::mesh::{intersect_triangle, TriangleMesh};

#[derive(Debug, Clone)]
pub struct SceneObject {
    pub mesh: TriangleMesh,
    pub material: Arc<Material>,
    /// Lambertian emission of the front faces; every triangle of an
    /// emissive object becomes a light source.
    pub emission: Option<Spectrum>,
    pub light_group: u32,
    pub interior_volume: Option<u32>,
    pub exterior_volume: Option<u32>,
    pub object_id: u32,
    pub camera_invisible: bool,
}

impl SceneObject {
    pub fn new(mesh: TriangleMesh, material: Arc<Material>) -> SceneObject {
        SceneObject {
            mesh,
            material,
            emission: None,
            light_group: 0,
            interior_volume: None,
            exterior_volume: None,
            object_id: 0,
            camera_invisible: false,
        }
    }

    pub fn with_emission(mut self, emission: Spectrum) -> SceneObject {
        self.emission = Some(emission);
        self
    }

    pub fn with_object_id(mut self, id: u32) -> SceneObject {
        self.object_id = id;
        self
    }

    pub fn with_interior_volume(mut self, volume: u32) -> SceneObject {
        self.interior_volume = Some(volume);
        self
    }
}

pub struct SceneIntersection {
    pub bsdf: Bsdf,
    pub t: f32,
}

pub struct Scene {
    pub camera: PerspectiveCamera,
    pub objects: Vec<SceneObject>,
    pub volumes: Vec<Volume>,
    pub lights: Vec<LightSource>,
    accel: Bvh,
    world_bounds: Bounds3f,
    /// Per object: base index of its triangle lights in `lights`.
    emissive_offsets: Vec<Option<u32>>,
    light_group_count: u32,
}

impl Scene {
    pub fn new(
        camera: PerspectiveCamera,
        objects: Vec<SceneObject>,
        volumes: Vec<Volume>,
        extra_lights: Vec<LightSource>,
    ) -> Result<Scene> {
        if objects.is_empty() && extra_lights.is_empty() {
            return Err(RenderError::Scene("the scene is empty".to_string()));
        }

        let meshes: Vec<&TriangleMesh> = objects.iter().map(|o| &o.mesh).collect();
        let accel = Bvh::new(&meshes);
        let mut world_bounds = accel.bounds();
        if objects.is_empty() {
            world_bounds = Bounds3f::from_points(
                &Point3f::new(-1.0, -1.0, -1.0),
                &Point3f::new(1.0, 1.0, 1.0),
            );
        }

        // Emissive triangles become individual light sources.
        let mut lights = Vec::new();
        let mut emissive_offsets = Vec::with_capacity(objects.len());
        for object in &objects {
            match object.emission {
                Some(emission) if !emission.is_black() => {
                    emissive_offsets.push(Some(lights.len() as u32));
                    for tri in 0..object.mesh.triangles.len() {
                        let (v0, v1, v2) = object.mesh.triangle_vertices(tri);
                        let mut light = LightSource::new(LightKind::Triangle(TriangleLight::new(
                            v0,
                            v1,
                            v2,
                            emission,
                            object.object_id,
                        )));
                        light.group = object.light_group;
                        lights.push(light);
                    }
                }
                _ => emissive_offsets.push(None),
            }
        }
        lights.extend(extra_lights);

        if lights.is_empty() {
            return Err(RenderError::Scene(
                "the scene has no light sources".to_string(),
            ));
        }

        let world_center = world_bounds.center();
        let world_radius = world_bounds.bounding_sphere_radius();
        let mut light_group_count = 1;
        for (index, light) in lights.iter_mut().enumerate() {
            light.light_scene_index = index as u32;
            light.preprocess(world_center, world_radius);
            light_group_count = light_group_count.max(light.group + 1);
        }

        info!(
            "Scene: {} objects, {} lights ({} groups), world bounds {}",
            objects.len(),
            lights.len(),
            light_group_count,
            world_bounds
        );

        Ok(Scene {
            camera,
            objects,
            volumes,
            lights,
            accel,
            world_bounds,
            emissive_offsets,
            light_group_count,
        })
    }

    pub fn world_bounds(&self) -> Bounds3f {
        self.world_bounds
    }

    pub fn world_center(&self) -> Point3f {
        self.world_bounds.center()
    }

    pub fn world_radius(&self) -> f32 {
        self.world_bounds.bounding_sphere_radius()
    }

    pub fn light_group_count(&self) -> u32 {
        self.light_group_count
    }

    pub fn environment_lights(&self) -> impl Iterator<Item = &LightSource> {
        self.lights.iter().filter(|l| l.is_environmental())
    }

    fn triangle_light_index(&self, object_index: u32, tri_index: u32) -> Option<u32> {
        self.emissive_offsets[object_index as usize].map(|base| base + tri_index)
    }

    fn build_bsdf(&self, ray: &Ray, hit: &TriHit) -> Bsdf {
        let object = &self.objects[hit.object_index as usize];
        let p = ray.at(hit.t);
        let geometry_n = object.mesh.geometric_normal(hit.tri_index as usize);
        let into_object = ray.d.dotn(&geometry_n) < 0.0;
        let mut shade_n = object
            .mesh
            .shading_normal(hit.tri_index as usize, hit.b1, hit.b2);
        let fixed_dir = -ray.d;
        // Flip the shading normal onto the viewer side.
        if fixed_dir.dotn(&shade_n) < 0.0 {
            shade_n = -shade_n;
        }
        let hit_point = HitPoint {
            p,
            geometry_n,
            shade_n,
            fixed_dir,
            uv: object
                .mesh
                .interpolated_uv(hit.tri_index as usize, hit.b1, hit.b2),
            into_object,
            material_id: hit.object_index,
            object_id: object.object_id,
            interior_volume: object.interior_volume,
            exterior_volume: object.exterior_volume,
        };
        Bsdf::new(
            hit_point,
            Arc::clone(&object.material),
            self.triangle_light_index(hit.object_index, hit.tri_index),
        )
    }

    fn segment_transmittance(
        &self,
        volume_info: &PathVolumeInfo,
        distance: f32,
    ) -> Spectrum {
        match volume_info.current(&self.volumes) {
            Some(idx) if distance > 0.0 && distance.is_finite() => {
                self.volumes[idx as usize].transmittance(distance)
            }
            _ => Spectrum::white(),
        }
    }

    /// The intersection oracle. A pass-through surface consumes
    /// `pass_through_u` to decide whether the hit fails (the ray continues,
    /// attenuated) or the surface keeps the hit; the same sample drives
    /// every pass-through test along the ray. Media transmittance is
    /// accumulated into the returned connection throughput and
    /// `volume_info` is advanced in place.
    pub fn intersect(
        &self,
        ray: &mut Ray,
        volume_info: &mut PathVolumeInfo,
        pass_through_u: f32,
    ) -> (Option<SceneIntersection>, Spectrum) {
        let mut connection_throughput = Spectrum::white();
        loop {
            match self.accel.intersect(ray) {
                None => {
                    // Escaped; attenuate over the remaining in-medium
                    // distance when the path is still inside a volume.
                    if volume_info.depth() > 0 {
                        let exit = 2.0 * self.world_radius();
                        connection_throughput =
                            connection_throughput * self.segment_transmittance(volume_info, exit);
                    }
                    return (None, connection_throughput);
                }
                Some(hit) => {
                    let distance = hit.t - ray.start;
                    connection_throughput = connection_throughput
                        * self.segment_transmittance(volume_info, distance);

                    let bsdf = self.build_bsdf(ray, &hit);
                    if bsdf.material.is_pass_through() {
                        if let Some(weight) =
                            bsdf.material.pass_through_transparency(pass_through_u)
                        {
                            // The hit failed: invisible to the tracer.
                            // Attenuate, cross the interface and continue
                            // the same ray.
                            connection_throughput = connection_throughput * weight;
                            volume_info
                                .update(BsdfEvent::SPECULAR | BsdfEvent::TRANSMIT, &bsdf);
                            ray.start = hit.t + epsilon::epsilon(hit.t);
                            continue;
                        }
                    }

                    return (
                        Some(SceneIntersection { bsdf, t: hit.t }),
                        connection_throughput,
                    );
                }
            }
        }
    }

    /// Shadow-ray test through a private copy of the volume stack. Returns
    /// the transmittance when unoccluded, `None` when blocked.
    pub fn intersect_shadow(
        &self,
        shadow_ray: &Ray,
        volume_info: &PathVolumeInfo,
        pass_through_u: f32,
    ) -> Option<Spectrum> {
        let mut ray = *shadow_ray;
        let mut volume_info = volume_info.clone();
        let (hit, connection_throughput) =
            self.intersect(&mut ray, &mut volume_info, pass_through_u);
        match hit {
            Some(_) => None,
            None => Some(connection_throughput),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::Vector3f;

    fn single_quad_scene() -> Scene {
        let camera = PerspectiveCamera::new(
            Point3f::new(0.0, 0.0, -3.0),
            Point3f::zero(),
            Vector3f::new(0.0, 1.0, 0.0),
            45.0,
            32,
            32,
        );
        let wall = SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(-1.0, -1.0, 0.0),
                Point3f::new(1.0, -1.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(-1.0, 1.0, 0.0),
            ),
            Arc::new(Material::matte(Spectrum::grey(0.5))),
        );
        let lamp = SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(-0.2, -0.2, 2.0),
                Point3f::new(-0.2, 0.2, 2.0),
                Point3f::new(0.2, 0.2, 2.0),
                Point3f::new(0.2, -0.2, 2.0),
            ),
            Arc::new(Material::matte(Spectrum::black())),
        )
        .with_emission(Spectrum::grey(10.0));
        Scene::new(camera, vec![wall, lamp], vec![], vec![]).unwrap()
    }

    #[test]
    fn test_intersect_builds_bsdf() {
        let scene = single_quad_scene();
        let mut ray = Ray::new(
            Point3f::new(0.0, 0.0, -2.0),
            Vector3f::new(0.0, 0.0, 1.0),
            0.0,
        );
        let mut vol = PathVolumeInfo::new();
        let (hit, throughput) = scene.intersect(&mut ray, &mut vol, 0.5);
        let hit = hit.unwrap();
        assert!((hit.t - 2.0).abs() < 1e-4);
        assert_eq!(throughput, Spectrum::white());
        // The viewer faces the front of the quad.
        assert!(hit.bsdf.hit_point.fixed_dir.dotn(&hit.bsdf.hit_point.shade_n) > 0.0);
    }

    #[test]
    fn test_emissive_triangles_become_lights() {
        let scene = single_quad_scene();
        assert_eq!(scene.lights.len(), 2);
        assert!(scene.lights.iter().all(|l| l.is_intersectable()));
    }

    #[test]
    fn test_shadow_occlusion() {
        let scene = single_quad_scene();
        let mut blocked = Ray::segment(
            Point3f::new(0.0, 0.0, -2.0),
            Vector3f::new(0.0, 0.0, 1.0),
            0.0,
            3.0,
            0.0,
        );
        blocked.update_min_max_with_epsilon();
        assert!(scene
            .intersect_shadow(&blocked, &PathVolumeInfo::new(), 0.5)
            .is_none());

        let mut clear = Ray::segment(
            Point3f::new(0.0, 0.0, -2.0),
            Vector3f::new(0.0, 0.0, -1.0),
            0.0,
            10.0,
            0.0,
        );
        clear.update_min_max_with_epsilon();
        assert!(scene
            .intersect_shadow(&clear, &PathVolumeInfo::new(), 0.5)
            .is_some());
    }

    #[test]
    fn test_pass_through_is_invisible() {
        let camera = PerspectiveCamera::new(
            Point3f::new(0.0, 0.0, -3.0),
            Point3f::zero(),
            Vector3f::new(0.0, 1.0, 0.0),
            45.0,
            32,
            32,
        );
        let veil = SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(-1.0, -1.0, -1.0),
                Point3f::new(1.0, -1.0, -1.0),
                Point3f::new(1.0, 1.0, -1.0),
                Point3f::new(-1.0, 1.0, -1.0),
            ),
            Arc::new(Material::null()),
        );
        let wall = SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(-1.0, -1.0, 0.0),
                Point3f::new(1.0, -1.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(-1.0, 1.0, 0.0),
            ),
            Arc::new(Material::matte(Spectrum::grey(0.5))),
        )
        .with_emission(Spectrum::white())
        .with_object_id(1);
        let scene = Scene::new(camera, vec![veil, wall], vec![], vec![]).unwrap();

        let mut ray = Ray::new(
            Point3f::new(0.0, 0.0, -2.0),
            Vector3f::new(0.0, 0.0, 1.0),
            0.0,
        );
        let mut vol = PathVolumeInfo::new();
        let (hit, _) = scene.intersect(&mut ray, &mut vol, 0.5);
        // The null veil is skipped; the wall behind it is what the tracer
        // sees.
        assert_eq!(hit.unwrap().bsdf.hit_point.object_id, 1);
        assert!((ray.start - 1.0).abs() < 0.01);
    }

    #[test]
    fn test_partial_pass_through_consumes_the_sample() {
        let camera = PerspectiveCamera::new(
            Point3f::new(0.0, 0.0, -3.0),
            Point3f::zero(),
            Vector3f::new(0.0, 1.0, 0.0),
            45.0,
            32,
            32,
        );
        // A half-transparent veil in front of an emissive wall.
        let veil = SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(-1.0, -1.0, -1.0),
                Point3f::new(1.0, -1.0, -1.0),
                Point3f::new(1.0, 1.0, -1.0),
                Point3f::new(-1.0, 1.0, -1.0),
            ),
            Arc::new(Material::null_with_transparency(Spectrum::rgb(0.6, 0.3, 0.3))),
        );
        let wall = SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(-1.0, -1.0, 0.0),
                Point3f::new(1.0, -1.0, 0.0),
                Point3f::new(1.0, 1.0, 0.0),
                Point3f::new(-1.0, 1.0, 0.0),
            ),
            Arc::new(Material::matte(Spectrum::grey(0.5))),
        )
        .with_emission(Spectrum::white())
        .with_object_id(1);
        let scene = Scene::new(camera, vec![veil, wall], vec![], vec![]).unwrap();

        let shoot = |pass_through_u: f32| {
            let mut ray = Ray::new(
                Point3f::new(0.0, 0.0, -2.0),
                Vector3f::new(0.0, 0.0, 1.0),
                0.0,
            );
            let mut vol = PathVolumeInfo::new();
            scene.intersect(&mut ray, &mut vol, pass_through_u)
        };

        // A sample below the mean transparency (0.4) fails the hit and
        // carries the unbiased weight through to the wall.
        let (hit, throughput) = shoot(0.2);
        assert_eq!(hit.unwrap().bsdf.hit_point.object_id, 1);
        assert!((throughput.r - 1.5).abs() < 1e-5);
        assert!((throughput.g - 0.75).abs() < 1e-5);

        // A sample above it keeps the veil hit.
        let (hit, throughput) = shoot(0.9);
        let hit = hit.unwrap();
        assert_eq!(hit.bsdf.hit_point.object_id, 0);
        assert!((hit.t - 1.0).abs() < 1e-4);
        assert_eq!(throughput, Spectrum::white());
    }
}
