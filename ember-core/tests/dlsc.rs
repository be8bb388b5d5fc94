//! Direct-light sampling cache: correctness, determinism and persistence.

mod common;

use std::sync::atomic::AtomicBool;

use ember_core::dlsc::{DirectLightSamplingCache, DlscParams};
use ember_core::geometry::{Normal3f, Point3f};

fn test_params() -> DlscParams {
    let mut params = DlscParams::default();
    // Small, fixed-radius build so the tests stay fast and deterministic.
    params.visibility.lookup_radius = 0.5;
    params.visibility.max_sample_count = 4096;
    params.entry.warmup_samples = 24;
    params.entry.max_passes = 256;
    params.entry.convergence_threshold = 0.01;
    params
}

#[test]
fn occluded_emitter_is_suppressed_in_the_distribution() {
    let scene = common::occluded_two_light_room();
    let interrupt = AtomicBool::new(false);
    let cache = DirectLightSamplingCache::build(test_params(), &scene, &interrupt).unwrap();
    assert!(cache.entry_count() > 0);

    // A floor point on the left half sees only light A (index 0); the
    // occluder hides light B. The entry floor keeps B at 2.5%, so A gets
    // nearly all of the probability mass.
    let up = Normal3f::new(0.0, 1.0, 0.0);
    let distribution = cache
        .get_light_distribution(&Point3f::new(-2.0, 0.0, 0.0), &up, false)
        .expect("no cache entry near the left floor");
    let pdf_a = distribution.pdf_discrete(0);
    let pdf_b = distribution.pdf_discrete(1);
    assert!(
        pdf_a > 0.9,
        "left-side distribution should prefer light A: pdf_a={} pdf_b={}",
        pdf_a,
        pdf_b
    );

    // And symmetrically on the right half.
    let distribution = cache
        .get_light_distribution(&Point3f::new(2.0, 0.0, 0.0), &up, false)
        .expect("no cache entry near the right floor");
    assert!(distribution.pdf_discrete(1) > 0.9);
}

#[test]
fn lookup_far_from_any_entry_returns_none() {
    let scene = common::occluded_two_light_room();
    let interrupt = AtomicBool::new(false);
    let cache = DirectLightSamplingCache::build(test_params(), &scene, &interrupt).unwrap();
    assert!(cache
        .get_light_distribution(
            &Point3f::new(100.0, 100.0, 100.0),
            &Normal3f::new(0.0, 1.0, 0.0),
            false
        )
        .is_none());
}

#[test]
fn build_is_deterministic() {
    let dir = tempfile::tempdir().unwrap();
    let file_a = dir.path().join("a.dlsc");
    let file_b = dir.path().join("b.dlsc");
    let interrupt = AtomicBool::new(false);

    for file in [&file_a, &file_b] {
        let scene = common::occluded_two_light_room();
        let mut params = test_params();
        params.persistent.file_name = Some(file.to_str().unwrap().to_string());
        DirectLightSamplingCache::build(params, &scene, &interrupt).unwrap();
    }

    let bytes_a = std::fs::read(&file_a).unwrap();
    let bytes_b = std::fs::read(&file_b).unwrap();
    assert!(!bytes_a.is_empty());
    assert_eq!(bytes_a, bytes_b, "two builds must produce identical caches");
}

#[test]
fn persistent_cache_round_trip_and_rebuild_on_corruption() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("cache.dlsc");
    let file_name = file.to_str().unwrap().to_string();
    let interrupt = AtomicBool::new(false);

    let mut params = test_params();
    params.persistent.file_name = Some(file_name.clone());

    let scene = common::occluded_two_light_room();
    let built = DirectLightSamplingCache::build(params.clone(), &scene, &interrupt).unwrap();
    assert!(file.exists());

    // Second build loads the persistent file.
    let loaded = DirectLightSamplingCache::build(params.clone(), &scene, &interrupt).unwrap();
    assert_eq!(loaded.entry_count(), built.entry_count());

    // A corrupt file is rejected and the cache rebuilt (and re-saved).
    std::fs::write(&file, b"garbage").unwrap();
    let rebuilt = DirectLightSamplingCache::build(params, &scene, &interrupt).unwrap();
    assert_eq!(rebuilt.entry_count(), built.entry_count());
    assert_ne!(std::fs::read(&file).unwrap(), b"garbage");
}

#[test]
fn cancelled_build_propagates() {
    let scene = common::occluded_two_light_room();
    let interrupt = AtomicBool::new(true);
    assert!(DirectLightSamplingCache::build(test_params(), &scene, &interrupt).is_err());
}
