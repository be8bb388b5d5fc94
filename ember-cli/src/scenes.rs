//! Built-in demo scenes (scene-file parsing lives outside the core).

use std::sync::Arc;

use ember_core::bsdf::Material;
use ember_core::camera::PerspectiveCamera;
use ember_core::geometry::{Point3f, Vector3f};
use ember_core::scene::{Scene, SceneObject, TriangleMesh};
use ember_core::spectrum::Spectrum;

/// The classic box: white floor/ceiling/back, red and green side walls, a
/// quad light under the ceiling and two blocks approximated by tall quads.
pub fn cornell_box(width: u32, height: u32) -> anyhow::Result<Scene> {
    let camera = PerspectiveCamera::new(
        Point3f::new(278.0, 273.0, -800.0),
        Point3f::new(278.0, 273.0, 0.0),
        Vector3f::new(0.0, 1.0, 0.0),
        39.3,
        width,
        height,
    );

    let white = Arc::new(Material::matte(Spectrum::grey(0.73)));
    let red = Arc::new(Material::matte(Spectrum::rgb(0.63, 0.065, 0.05)));
    let green = Arc::new(Material::matte(Spectrum::rgb(0.14, 0.45, 0.091)));
    let black = Arc::new(Material::matte(Spectrum::black()));

    let mut objects = Vec::new();

    // Floor
    objects.push(
        SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(552.8, 0.0, 0.0),
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(0.0, 0.0, 559.2),
                Point3f::new(549.6, 0.0, 559.2),
            ),
            Arc::clone(&white),
        )
        .with_object_id(0),
    );
    // Ceiling
    objects.push(
        SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(556.0, 548.8, 0.0),
                Point3f::new(556.0, 548.8, 559.2),
                Point3f::new(0.0, 548.8, 559.2),
                Point3f::new(0.0, 548.8, 0.0),
            ),
            Arc::clone(&white),
        )
        .with_object_id(1),
    );
    // Back wall
    objects.push(
        SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(549.6, 0.0, 559.2),
                Point3f::new(0.0, 0.0, 559.2),
                Point3f::new(0.0, 548.8, 559.2),
                Point3f::new(556.0, 548.8, 559.2),
            ),
            Arc::clone(&white),
        )
        .with_object_id(2),
    );
    // Right wall (green)
    objects.push(
        SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(0.0, 0.0, 559.2),
                Point3f::new(0.0, 0.0, 0.0),
                Point3f::new(0.0, 548.8, 0.0),
                Point3f::new(0.0, 548.8, 559.2),
            ),
            green,
        )
        .with_object_id(3),
    );
    // Left wall (red)
    objects.push(
        SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(552.8, 0.0, 0.0),
                Point3f::new(549.6, 0.0, 559.2),
                Point3f::new(556.0, 548.8, 559.2),
                Point3f::new(556.0, 548.8, 0.0),
            ),
            red,
        )
        .with_object_id(4),
    );
    // Light, slightly below the ceiling, facing down
    objects.push(
        SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(343.0, 548.0, 227.0),
                Point3f::new(343.0, 548.0, 332.0),
                Point3f::new(213.0, 548.0, 332.0),
                Point3f::new(213.0, 548.0, 227.0),
            ),
            black,
        )
        .with_emission(Spectrum::rgb(18.4, 15.6, 8.0))
        .with_object_id(5),
    );
    // Short block, stylized as a single tall quad pair
    objects.push(
        SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(130.0, 165.0, 65.0),
                Point3f::new(82.0, 165.0, 225.0),
                Point3f::new(240.0, 165.0, 272.0),
                Point3f::new(290.0, 165.0, 114.0),
            ),
            Arc::clone(&white),
        )
        .with_object_id(6),
    );
    objects.push(
        SceneObject::new(
            TriangleMesh::quad(
                Point3f::new(423.0, 330.0, 247.0),
                Point3f::new(265.0, 330.0, 296.0),
                Point3f::new(314.0, 330.0, 456.0),
                Point3f::new(472.0, 330.0, 406.0),
            ),
            Arc::clone(&white),
        )
        .with_object_id(7),
    );

    Ok(Scene::new(camera, objects, vec![], vec![])?)
}
