//! Perspective camera with depth of field and a shutter interval, plus the
//! inverse projection needed by light tracing to splat onto the film.

use crate::geometry::{Point2f, Point3f, Vector3f};
use crate::lerp;
use crate::ray::Ray;
use crate::sampling::concentric_sample_disk;

#[derive(Debug, Clone)]
pub struct PerspectiveCamera {
    pub eye: Point3f,
    pub target: Point3f,
    pub up: Vector3f,
    pub fov_y: f32,
    pub lens_radius: f32,
    pub focal_distance: f32,
    pub shutter_open: f32,
    pub shutter_close: f32,
    pub film_width: u32,
    pub film_height: u32,

    // Derived basis and screen extents
    forward: Vector3f,
    right: Vector3f,
    up_v: Vector3f,
    half_w: f32,
    half_h: f32,
    pixel_area: f32,
}

impl PerspectiveCamera {
    pub fn new(
        eye: Point3f,
        target: Point3f,
        up: Vector3f,
        fov_y: f32,
        film_width: u32,
        film_height: u32,
    ) -> PerspectiveCamera {
        let mut camera = PerspectiveCamera {
            eye,
            target,
            up,
            fov_y,
            lens_radius: 0.0,
            focal_distance: 1.0,
            shutter_open: 0.0,
            shutter_close: 0.0,
            film_width,
            film_height,
            forward: Vector3f::zero(),
            right: Vector3f::zero(),
            up_v: Vector3f::zero(),
            half_w: 0.0,
            half_h: 0.0,
            pixel_area: 0.0,
        };
        camera.update();
        camera
    }

    /// Recompute the derived basis after any field edit.
    pub fn update(&mut self) {
        self.forward = (self.target - self.eye).normalize();
        self.right = self.forward.cross(&self.up).normalize();
        self.up_v = self.right.cross(&self.forward);
        self.half_h = (self.fov_y.to_radians() * 0.5).tan();
        self.half_w = self.half_h * self.film_width as f32 / self.film_height as f32;
        self.pixel_area = (2.0 * self.half_w / self.film_width as f32)
            * (2.0 * self.half_h / self.film_height as f32);
    }

    pub fn generate_ray_time(&self, u: f32) -> f32 {
        if self.shutter_close > self.shutter_open {
            lerp(u, self.shutter_open, self.shutter_close)
        } else {
            0.0
        }
    }

    /// Primary ray through film coordinates (fractional pixels). `u0`/`u1`
    /// sample the lens when depth of field is enabled.
    pub fn generate_ray(&self, time: f32, film_x: f32, film_y: f32, u0: f32, u1: f32) -> Ray {
        let px = (2.0 * film_x / self.film_width as f32 - 1.0) * self.half_w;
        let py = (1.0 - 2.0 * film_y / self.film_height as f32) * self.half_h;
        let dir = (self.forward + self.right * px + self.up_v * py).normalize();

        if self.lens_radius > 0.0 {
            let lens = concentric_sample_disk(u0, u1);
            let lens_world =
                self.right * (lens.x * self.lens_radius) + self.up_v * (lens.y * self.lens_radius);
            let ft = self.focal_distance / dir.dot(&self.forward);
            let p_focus = self.eye + dir * ft;
            let o = self.eye + lens_world;
            Ray::new(o, (p_focus - o).normalize(), time)
        } else {
            Ray::new(self.eye, dir, time)
        }
    }

    /// Sample a point on the lens (the eye for a pinhole camera).
    pub fn sample_lens(&self, _time: f32, u0: f32, u1: f32) -> Point3f {
        if self.lens_radius > 0.0 {
            let lens = concentric_sample_disk(u0, u1);
            self.eye
                + self.right * (lens.x * self.lens_radius)
                + self.up_v * (lens.y * self.lens_radius)
        } else {
            self.eye
        }
    }

    /// Invert the projection: where does a ray from the lens in direction
    /// `ray.d` land on the film? Returns `None` when it falls outside.
    pub fn get_sample_position(&self, ray: &Ray) -> Option<Point2f> {
        let cos = ray.d.dot(&self.forward);
        if cos <= 0.0 {
            return None;
        }
        // Project the focal-plane point so depth of field stays consistent.
        let ft = self.focal_distance.max(1e-3) / cos;
        let p_focus = ray.at(ft);
        let v = p_focus - self.eye;
        let z = v.dot(&self.forward);
        if z <= 0.0 {
            return None;
        }
        let px = v.dot(&self.right) / z;
        let py = v.dot(&self.up_v) / z;
        let film_x = (px / self.half_w + 1.0) * 0.5 * self.film_width as f32;
        let film_y = (1.0 - py / self.half_h) * 0.5 * self.film_height as f32;
        if film_x < 0.0
            || film_x >= self.film_width as f32
            || film_y < 0.0
            || film_y >= self.film_height as f32
        {
            return None;
        }
        Some(Point2f::new(film_x, film_y))
    }

    /// Solid-angle pdf of the camera for a ray direction, and the factor
    /// converting light-path flux into radiance for an eye connection over
    /// `eye_distance`.
    pub fn get_pdf(&self, dir: &Vector3f, eye_distance: f32) -> Option<(f32, f32)> {
        let cos = dir.dot(&self.forward);
        if cos <= 0.0 {
            return None;
        }
        let camera_pdf_w = 1.0 / (cos * cos * cos * self.pixel_area);
        let flux_to_radiance = if eye_distance > 0.0 {
            camera_pdf_w / (eye_distance * eye_distance)
        } else {
            camera_pdf_w
        };
        Some((camera_pdf_w, flux_to_radiance))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_camera() -> PerspectiveCamera {
        PerspectiveCamera::new(
            Point3f::new(0.0, 0.0, -5.0),
            Point3f::zero(),
            Vector3f::new(0.0, 1.0, 0.0),
            45.0,
            64,
            64,
        )
    }

    #[test]
    fn test_center_ray() {
        let camera = test_camera();
        let ray = camera.generate_ray(0.0, 32.0, 32.0, 0.5, 0.5);
        assert!((ray.d - Vector3f::new(0.0, 0.0, 1.0)).length() < 1e-5);
    }

    #[test]
    fn test_projection_round_trip() {
        use approx::assert_relative_eq;

        let camera = test_camera();
        for &(x, y) in &[(5.5f32, 10.25f32), (32.0, 32.0), (63.0, 1.0)] {
            let ray = camera.generate_ray(0.0, x, y, 0.5, 0.5);
            let p = camera.get_sample_position(&ray).unwrap();
            assert_relative_eq!(p.x, x, max_relative = 1e-3, epsilon = 1e-3);
            assert_relative_eq!(p.y, y, max_relative = 1e-3, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_behind_camera_rejected() {
        let camera = test_camera();
        let ray = Ray::new(camera.eye, Vector3f::new(0.0, 0.0, -1.0), 0.0);
        assert!(camera.get_sample_position(&ray).is_none());
        assert!(camera.get_pdf(&Vector3f::new(0.0, 0.0, -1.0), 1.0).is_none());
    }

    #[test]
    fn test_shutter_time() {
        let mut camera = test_camera();
        assert_eq!(camera.generate_ray_time(0.7), 0.0);
        camera.shutter_close = 1.0;
        assert!((camera.generate_ray_time(0.5) - 0.5).abs() < 1e-6);
    }
}
