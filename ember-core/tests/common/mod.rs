//! Scene builders shared by the integration tests.

use std::sync::Arc;

use ember_core::bsdf::Material;
use ember_core::camera::PerspectiveCamera;
use ember_core::geometry::{Point3f, Vector3f};
use ember_core::light::{LightKind, LightSource, PointLight};
use ember_core::scene::{Scene, SceneObject, TriangleMesh};
use ember_core::spectrum::Spectrum;

/// A small closed box lit by a quad light on the ceiling.
pub fn cornell_box(width: u32, height: u32) -> Scene {
    let camera = PerspectiveCamera::new(
        Point3f::new(0.0, 1.0, -3.4),
        Point3f::new(0.0, 1.0, 0.0),
        Vector3f::new(0.0, 1.0, 0.0),
        45.0,
        width,
        height,
    );

    let white = Arc::new(Material::matte(Spectrum::grey(0.73)));
    let black = Arc::new(Material::matte(Spectrum::black()));

    let mut objects = Vec::new();
    // Floor
    objects.push(SceneObject::new(
        TriangleMesh::quad(
            Point3f::new(1.0, 0.0, -1.0),
            Point3f::new(-1.0, 0.0, -1.0),
            Point3f::new(-1.0, 0.0, 1.0),
            Point3f::new(1.0, 0.0, 1.0),
        ),
        Arc::clone(&white),
    ));
    // Ceiling
    objects.push(SceneObject::new(
        TriangleMesh::quad(
            Point3f::new(1.0, 2.0, -1.0),
            Point3f::new(1.0, 2.0, 1.0),
            Point3f::new(-1.0, 2.0, 1.0),
            Point3f::new(-1.0, 2.0, -1.0),
        ),
        Arc::clone(&white),
    ));
    // Back wall
    objects.push(SceneObject::new(
        TriangleMesh::quad(
            Point3f::new(1.0, 0.0, 1.0),
            Point3f::new(-1.0, 0.0, 1.0),
            Point3f::new(-1.0, 2.0, 1.0),
            Point3f::new(1.0, 2.0, 1.0),
        ),
        Arc::clone(&white),
    ));
    // Side walls
    objects.push(SceneObject::new(
        TriangleMesh::quad(
            Point3f::new(-1.0, 0.0, 1.0),
            Point3f::new(-1.0, 0.0, -1.0),
            Point3f::new(-1.0, 2.0, -1.0),
            Point3f::new(-1.0, 2.0, 1.0),
        ),
        Arc::clone(&white),
    ));
    objects.push(SceneObject::new(
        TriangleMesh::quad(
            Point3f::new(1.0, 0.0, -1.0),
            Point3f::new(1.0, 0.0, 1.0),
            Point3f::new(1.0, 2.0, 1.0),
            Point3f::new(1.0, 2.0, -1.0),
        ),
        Arc::clone(&white),
    ));
    // Ceiling light, facing down
    objects.push(
        SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(0.4, 1.98, -0.3),
                Point3f::new(0.4, 1.98, 0.3),
                Point3f::new(-0.4, 1.98, 0.3),
                Point3f::new(-0.4, 1.98, -0.3),
            ),
            black,
        )
        .with_emission(Spectrum::grey(14.0))
        .with_object_id(9),
    );

    Scene::new(camera, objects, vec![], vec![]).unwrap()
}

/// A floor split by an occluder wall, with one point light on each side.
/// Left-half points only ever see light A, right-half points only light B.
pub fn occluded_two_light_room() -> Scene {
    let camera = PerspectiveCamera::new(
        Point3f::new(0.0, 3.0, -6.0),
        Point3f::new(0.0, 0.0, 0.0),
        Vector3f::new(0.0, 1.0, 0.0),
        50.0,
        64,
        64,
    );

    let white = Arc::new(Material::matte(Spectrum::grey(0.7)));
    let mut objects = Vec::new();
    // Floor
    objects.push(SceneObject::new(
        TriangleMesh::quad(
            Point3f::new(4.0, 0.0, -4.0),
            Point3f::new(-4.0, 0.0, -4.0),
            Point3f::new(-4.0, 0.0, 4.0),
            Point3f::new(4.0, 0.0, 4.0),
        ),
        Arc::clone(&white),
    ));
    // Tall occluder wall along the x = 0 plane
    objects.push(SceneObject::new(
        TriangleMesh::quad(
            Point3f::new(0.0, 0.0, -4.0),
            Point3f::new(0.0, 0.0, 4.0),
            Point3f::new(0.0, 6.0, 4.0),
            Point3f::new(0.0, 6.0, -4.0),
        ),
        white,
    ));

    // Light A on the left (negative x), light B on the right.
    let light_a = LightSource::new(LightKind::Point(PointLight::new(
        Point3f::new(-2.0, 2.0, 0.0),
        Spectrum::grey(10.0),
    )));
    let light_b = LightSource::new(LightKind::Point(PointLight::new(
        Point3f::new(2.0, 2.0, 0.0),
        Spectrum::grey(10.0),
    )));

    Scene::new(camera, objects, vec![], vec![light_a, light_b]).unwrap()
}
