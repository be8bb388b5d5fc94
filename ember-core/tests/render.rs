//! End-to-end render scenarios over the built-in engines.

mod common;

use ember_core::config::Properties;
use ember_core::engine::{EngineState, RenderEngine};

fn base_cfg(engine: &str, halt_spp: u64) -> Properties {
    let mut cfg = Properties::new();
    cfg.set("renderengine.type", engine)
        .set("renderengine.seed", 131)
        .set("native.threads.count", 2)
        .set("batch.haltspp", halt_spp)
        // Fixed sample budgets: no noise-driven skipping or early halt.
        .set("sampler.sobol.adaptive.strength", 0.0)
        .set("path.pathdepth.total", 5);
    cfg
}

#[test]
fn pathcpu_sobol_renders_a_lit_box() {
    let scene = common::cornell_box(32, 32);
    let mut engine = RenderEngine::new(base_cfg("PATHCPU", 8), scene).unwrap();
    engine.start().unwrap();
    engine.wait_for_halt();

    let film = engine.film();
    let spp = film.total_eye_sample_count() / u64::from(film.pixel_count());
    assert!(spp >= 8, "only {} spp accumulated", spp);

    // Every pixel of the closed box receives light; the center region must
    // be lit well above black and everything must be finite.
    let mut center_luminance = 0.0;
    for y in 12..20 {
        for x in 12..20 {
            let value = film.develop_pixel(x, y);
            assert!(value.is_valid(), "invalid pixel {},{}: {}", x, y, value);
            center_luminance += value.y();
        }
    }
    assert!(
        center_luminance / 64.0 > 0.01,
        "center luminance {} too low",
        center_luminance / 64.0
    );
}

#[test]
fn pathcpu_random_sampler_matches_direction() {
    let scene = common::cornell_box(24, 24);
    let mut cfg = base_cfg("PATHCPU", 4);
    cfg.set("sampler.type", "RANDOM");
    let mut engine = RenderEngine::new(cfg, scene).unwrap();
    engine.start().unwrap();
    engine.wait_for_halt();
    assert!(engine.film().develop_pixel(12, 12).is_valid());
}

#[test]
fn lightcpu_splats_screen_normalized_radiance() {
    let scene = common::cornell_box(32, 32);
    let mut cfg = base_cfg("LIGHTCPU", 4);
    cfg.set("sampler.type", "METROPOLIS");
    let mut engine = RenderEngine::new(cfg, scene).unwrap();
    engine.start().unwrap();
    engine.wait_for_halt();

    let film = engine.film();
    assert!(film.total_light_sample_count() > 0);
    // Light tracing must cover a good share of the visible floor/walls.
    let mut covered = 0;
    for y in 0..32 {
        for x in 0..32 {
            if film.develop_pixel(x, y).y() > 0.0 {
                covered += 1;
            }
        }
    }
    assert!(covered > 512, "only {}/1024 pixels covered", covered);
}

#[test]
fn bidircpu_produces_both_channel_kinds() {
    let scene = common::cornell_box(24, 24);
    let mut engine = RenderEngine::new(base_cfg("BIDIRCPU", 4), scene).unwrap();
    engine.start().unwrap();
    engine.wait_for_halt();

    let film = engine.film();
    assert!(film.total_eye_sample_count() > 0);
    assert!(film.total_light_sample_count() > 0);
    let center = film.develop_pixel(12, 12);
    assert!(center.is_valid());
    assert!(center.y() > 0.0);
}

#[test]
fn bidircpu_matches_pathcpu_on_diffuse_regions() {
    let render = |engine_tag: &str| {
        let scene = common::cornell_box(24, 24);
        let mut engine = RenderEngine::new(base_cfg(engine_tag, 32), scene).unwrap();
        engine.start().unwrap();
        engine.wait_for_halt();
        engine
    };
    let path = render("PATHCPU");
    let bidir = render("BIDIRCPU");

    // Both estimators target the same radiance; over a purely diffuse
    // region the merged BiDir channels must agree with the path tracer up
    // to Monte-Carlo noise of the regional mean.
    let regional_mean = |engine: &RenderEngine| {
        let film = engine.film();
        let mut sum = 0.0;
        for y in 6..18 {
            for x in 6..18 {
                let value = film.develop_pixel(x, y);
                assert!(value.is_valid(), "invalid pixel {},{}", x, y);
                sum += value.y();
            }
        }
        sum / 144.0
    };
    let path_mean = regional_mean(&path);
    let bidir_mean = regional_mean(&bidir);
    assert!(path_mean > 0.0 && bidir_mean > 0.0);
    let ratio = bidir_mean / path_mean;
    assert!(
        (0.75..1.3).contains(&ratio),
        "BiDir/Path diffuse mean ratio {} (path {}, bidir {})",
        ratio,
        path_mean,
        bidir_mean
    );
}

#[test]
fn bidirvmcpu_smoke() {
    let scene = common::cornell_box(16, 16);
    let mut cfg = base_cfg("BIDIRVMCPU", 2);
    cfg.set("bidirvm.lightpath.count", 4);
    let mut engine = RenderEngine::new(cfg, scene).unwrap();
    engine.start().unwrap();
    engine.wait_for_halt();
    assert!(engine.film().develop_pixel(8, 8).is_valid());
}

#[test]
fn tilepathcpu_renders_exact_sample_budget() {
    let scene = common::cornell_box(32, 32);
    let mut cfg = base_cfg("TILEPATHCPU", 4);
    cfg.set("sampler.type", "TILEPATHSAMPLER")
        .set("tilepath.sampling.aa.size", 2)
        .set("tilepath.tiles.size", 16);
    let mut engine = RenderEngine::new(cfg, scene).unwrap();
    engine.start().unwrap();
    engine.wait_for_halt();

    // One multipass of aa^2 = 4 samples per pixel.
    let film = engine.film();
    assert_eq!(film.total_eye_sample_count(), 32 * 32 * 4);
}

#[test]
fn tilepath_render_state_resumes_without_duplicating_work() {
    let tile_cfg = |halt_spp: u64| {
        let mut cfg = base_cfg("TILEPATHCPU", halt_spp);
        cfg.set("sampler.type", "TILEPATHSAMPLER")
            .set("tilepath.sampling.aa.size", 2)
            .set("tilepath.tiles.size", 16);
        cfg
    };

    // First process: run half of the 8 spp budget, then snapshot the
    // render state before tearing the engine down.
    let mut first = RenderEngine::new(tile_cfg(4), common::cornell_box(32, 32)).unwrap();
    first.start().unwrap();
    while !first.is_done() {
        std::thread::sleep(std::time::Duration::from_millis(10));
    }
    let snapshot = first.render_state();
    first.stop();
    assert_eq!(first.film().total_eye_sample_count(), 32 * 32 * 4);

    // Second process: restore the snapshot and continue to the full
    // budget. Only the remaining multipass is rendered, so no tile work is
    // repeated or lost.
    let mut second = RenderEngine::new(tile_cfg(8), common::cornell_box(32, 32)).unwrap();
    second.set_start_state(snapshot).unwrap();
    second.start().unwrap();
    second.wait_for_halt();

    assert_eq!(second.film().total_eye_sample_count(), 32 * 32 * 4);
    assert!(second.film().develop_pixel(16, 16).is_valid());
    assert!(second.film().develop_pixel(16, 16).y() > 0.0);
}

#[test]
fn rtpathcpu_zoom_phase_covers_the_film() {
    let scene = common::cornell_box(32, 32);
    let mut cfg = base_cfg("RTPATHCPU", 0);
    cfg.set("sampler.type", "RTPATHCPUSAMPLER")
        .set("rtpathcpu.zoomphase.size", 4)
        .set("native.threads.count", 1)
        // 64 zoom cells plus one fine frame
        .set("batch.haltdebug", 64 + 1024);
    let mut engine = RenderEngine::new(cfg, scene).unwrap();
    engine.start().unwrap();
    engine.wait_for_halt();
    assert!(engine.state() == EngineState::Stopped);

    let film = engine.film();
    for y in 0..32 {
        for x in 0..32 {
            assert!(
                film.develop_pixel(x, y).y() >= 0.0 && film.pixel_radiance_mean(x, y).is_some(),
                "zoom phase left a hole at {},{}",
                x,
                y
            );
        }
    }
}

#[test]
fn pathcpu_with_dls_cache_strategy() {
    let scene = common::occluded_two_light_room();
    let mut cfg = base_cfg("PATHCPU", 2);
    cfg.set("lightstrategy.type", "DLS_CACHE")
        .set("lightstrategy.dlscache.visibility.lookupradius", 0.5)
        .set("lightstrategy.dlscache.visibility.maxsamplecount", 2048)
        .set("lightstrategy.dlscache.entry.maxpasses", 64);
    let mut engine = RenderEngine::new(cfg, scene).unwrap();
    engine.start().unwrap();
    assert!(engine.dlsc().is_some());
    engine.wait_for_halt();

    let film = engine.film();
    // The floor fills the lower part of the frame and is lit on both sides
    // of the occluder.
    let mut floor_luminance = 0.0;
    for y in 40..60 {
        for x in 0..64 {
            let value = film.develop_pixel(x, y);
            assert!(value.is_valid(), "invalid pixel {},{}", x, y);
            floor_luminance += value.y();
        }
    }
    assert!(floor_luminance > 0.0);
}

#[test]
fn hybrid_back_forward_adds_light_paths() {
    let scene = common::cornell_box(24, 24);
    let mut cfg = base_cfg("PATHCPU", 2);
    cfg.set("path.hybridbackforward.enable", true);
    let mut engine = RenderEngine::new(cfg, scene).unwrap();
    engine.start().unwrap();
    engine.wait_for_halt();
    // The light sampler committed screen-normalized samples alongside the
    // eye samples.
    assert!(engine.film().total_light_sample_count() > 0);
}

#[test]
fn wrong_sampler_for_tiled_engine_is_a_config_error() {
    let scene = common::cornell_box(16, 16);
    let mut cfg = base_cfg("TILEPATHCPU", 1);
    cfg.set("sampler.type", "SOBOL");
    assert!(RenderEngine::new(cfg, scene).is_err());
}

#[test]
fn edit_cycle_restarts_rendering() {
    let scene = common::cornell_box(16, 16);
    let mut engine = RenderEngine::new(base_cfg("PATHCPU", 2), scene).unwrap();
    engine.start().unwrap();
    engine.wait_for_halt();
    let first_pass_samples = engine.film().total_eye_sample_count();
    assert!(first_pass_samples > 0);

    engine.begin_scene_edit();
    assert!(engine.scene_mut().is_some());
    engine.end_scene_edit(true).unwrap();
    engine.wait_for_halt();

    // The film was reset and refilled by the second run.
    let second_pass_samples = engine.film().total_eye_sample_count();
    assert!(second_pass_samples > 0);
    assert!(engine.film().develop_pixel(8, 8).is_valid());
}

#[test]
fn filesaver_exports_the_target_configuration() {
    let dir = tempfile::tempdir().unwrap();
    let export_dir = dir.path().join("export");
    let scene = common::cornell_box(16, 16);
    let mut cfg = base_cfg("FILESAVER", 0);
    cfg.set("filesaver.directory", export_dir.to_str().unwrap())
        .set("filesaver.renderengine.type", "BIDIRCPU");
    let mut engine = RenderEngine::new(cfg, scene).unwrap();
    engine.start().unwrap();
    assert_eq!(engine.state(), EngineState::Stopped);

    let exported = std::fs::read_to_string(export_dir.join("render.cfg")).unwrap();
    assert!(exported.contains("renderengine.type = BIDIRCPU"));
}
