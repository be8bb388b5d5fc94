//! Render engines: worker orchestration, state machine, halt conditions and
//! the per-engine render loops.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{error, info, warn};

use crate::config::Properties;
use crate::dlsc::{DirectLightSamplingCache, DlscParams};
use crate::epsilon;
use crate::error::{RenderError, Result};
use crate::film::{Film, FilmChannels, FilmSampleSplatter, Filter, SubRegion};
use crate::light::strategy::{LightStrategy, LightStrategyType};
use crate::rng::Rng;
use crate::sampler::{
    MetropolisSampler, MetropolisSamplerSharedData, RandomSampler, RandomSamplerSharedData,
    RtPathSampler, RtPathSamplerSharedData, SampleType, Sampler, SamplerType, SobolSampler,
    SobolSamplerSharedData, TilePathSampler,
};
use crate::scene::Scene;

mod bidir;
mod pathdepth;
mod state;
mod tilerepository;
mod tracer;
mod varianceclamping;

pub use self::bidir::{BiDirTracer, PathVertexVm};
pub use self::pathdepth::{PathDepthInfo, PathDepthLimits};
pub use self::state::RenderState;
pub use self::tilerepository::{TileRepository, TileRepositoryState};
pub use self::tracer::{PathTracer, TracerContext};
pub use self::varianceclamping::VarianceClamping;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum RenderEngineType {
    PathCpu,
    BiDirCpu,
    BiDirVmCpu,
    LightCpu,
    TilePathCpu,
    RtPathCpu,
    FileSaver,
}

impl RenderEngineType {
    pub fn parse(tag: &str) -> Result<RenderEngineType> {
        match tag {
            "PATHCPU" => Ok(RenderEngineType::PathCpu),
            "BIDIRCPU" => Ok(RenderEngineType::BiDirCpu),
            "BIDIRVMCPU" => Ok(RenderEngineType::BiDirVmCpu),
            "LIGHTCPU" => Ok(RenderEngineType::LightCpu),
            "TILEPATHCPU" => Ok(RenderEngineType::TilePathCpu),
            "RTPATHCPU" => Ok(RenderEngineType::RtPathCpu),
            "FILESAVER" => Ok(RenderEngineType::FileSaver),
            other => Err(RenderError::config(
                "renderengine.type",
                format!("unknown render engine {:?}", other),
            )),
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            RenderEngineType::PathCpu => "PATHCPU",
            RenderEngineType::BiDirCpu => "BIDIRCPU",
            RenderEngineType::BiDirVmCpu => "BIDIRVMCPU",
            RenderEngineType::LightCpu => "LIGHTCPU",
            RenderEngineType::TilePathCpu => "TILEPATHCPU",
            RenderEngineType::RtPathCpu => "RTPATHCPU",
            RenderEngineType::FileSaver => "FILESAVER",
        }
    }

    fn uses_light_paths(&self) -> bool {
        matches!(
            self,
            RenderEngineType::LightCpu
                | RenderEngineType::BiDirCpu
                | RenderEngineType::BiDirVmCpu
        )
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum EngineState {
    Unstarted,
    Running,
    Paused,
    Stopped,
}

#[derive(Debug, Clone)]
struct HaltConditions {
    spp: u64,
    debug_samples: u64,
    noise_threshold: f32,
    refresh_interval: u64,
}

#[derive(Debug, Clone)]
struct SamplerSettings {
    sampler_type: SamplerType,
    image_samples_enable: bool,
    adaptive_strength: f32,
    adaptive_user_importance_weight: f32,
    bucket_size: u32,
    tile_size: u32,
    super_sampling: u32,
    overlapping: u32,
    large_mutation_probability: f32,
    image_mutation_range: f32,
    max_rejects: u32,
    aa_size: u32,
    zoom_factor: u32,
    zoom_weight: f32,
}

impl SamplerSettings {
    fn from_properties(cfg: &Properties) -> Result<SamplerSettings> {
        let sampler_type = SamplerType::parse(&cfg.get_string("sampler.type", "SOBOL"))?;
        let zoom_factor = cfg.get_u32("rtpathcpu.zoomphase.size", 4)?.max(1);
        let zoom_weight = cfg.get_f32("rtpathcpu.zoomphase.weight", 0.0)?;
        Ok(SamplerSettings {
            sampler_type,
            image_samples_enable: cfg.get_bool("sampler.imagesamples.enable", true)?,
            adaptive_strength: cfg.get_f32_in_range(
                "sampler.sobol.adaptive.strength",
                0.95,
                0.0,
                0.95,
            )?,
            adaptive_user_importance_weight: cfg.get_f32_in_range(
                "sampler.sobol.adaptive.userimportanceweight",
                0.75,
                0.0,
                1.0,
            )?,
            bucket_size: cfg.get_u32("sampler.sobol.bucketsize", 16)?,
            tile_size: cfg.get_u32("sampler.sobol.tilesize", 16)?,
            super_sampling: cfg.get_u32("sampler.sobol.supersampling", 1)?,
            overlapping: cfg.get_u32("sampler.sobol.overlapping", 1)?,
            large_mutation_probability: cfg.get_f32_in_range(
                "sampler.metropolis.largestepprob",
                0.4,
                0.0,
                1.0,
            )?,
            image_mutation_range: cfg.get_f32("sampler.metropolis.imagemutationrate", 0.1)?,
            max_rejects: cfg.get_u32("sampler.metropolis.maxconsecutivereject", 512)?,
            aa_size: cfg.get_u32("tilepath.sampling.aa.size", 3)?.max(1),
            zoom_factor,
            zoom_weight: if zoom_weight > 0.0 {
                zoom_weight
            } else {
                1.0 / (zoom_factor * zoom_factor) as f32
            },
        })
    }
}

/// Everything the worker threads share, read-only apart from atomics.
struct EngineCore {
    engine_type: RenderEngineType,
    scene: Arc<Scene>,
    film: Arc<Film>,
    splatter: Arc<FilmSampleSplatter>,
    illuminate_strategy: Arc<LightStrategy>,
    emit_strategy: Arc<LightStrategy>,
    dlsc: Option<Arc<DirectLightSamplingCache>>,
    tracer: PathTracer,
    bidir: Option<BiDirTracer>,
    sampler_settings: SamplerSettings,
    sobol_shared: Arc<SobolSamplerSharedData>,
    random_shared: Arc<RandomSamplerSharedData>,
    metropolis_shared: Arc<MetropolisSamplerSharedData>,
    light_metropolis_shared: Arc<MetropolisSamplerSharedData>,
    rt_shared: Option<Arc<RtPathSamplerSharedData>>,
    tile_repository: Option<TileRepository>,
    halt: HaltConditions,
    seed_base: u64,
    worker_count: usize,
    interrupt: AtomicBool,
    pause: AtomicBool,
    paused_workers: AtomicUsize,
}

pub struct RenderEngine {
    engine_type: RenderEngineType,
    cfg: Properties,
    scene: Arc<Scene>,
    film: Arc<Film>,
    state: EngineState,
    editing: bool,
    seed_base: u64,
    worker_count: usize,
    core: Option<Arc<EngineCore>>,
    threads: Vec<thread::JoinHandle<()>>,
    start_state: Option<RenderState>,
    dlsc_file: Option<String>,
}

impl RenderEngine {
    pub fn new(cfg: Properties, scene: Scene) -> Result<RenderEngine> {
        let engine_type = RenderEngineType::parse(&cfg.get_string("renderengine.type", "PATHCPU"))?;
        let sampler_settings = SamplerSettings::from_properties(&cfg)?;
        Self::check_sampler_compatibility(engine_type, sampler_settings.sampler_type)?;

        let seed_base = cfg.get_u64("renderengine.seed", 131)?;
        let worker_count = {
            let requested = cfg.get_u32("native.threads.count", 0)?;
            if requested == 0 {
                num_cpus::get().max(1)
            } else {
                requested as usize
            }
        };

        // Film setup: channels requested by the active engine and sampler.
        let mut film = Film::new(scene.camera.film_width, scene.camera.film_height);
        if let Some(raw) = cfg.get_raw("film.subregion") {
            let values: Vec<u32> = raw
                .split_whitespace()
                .filter_map(|v| v.parse().ok())
                .collect();
            if values.len() == 4 && values[0] <= values[1] && values[2] <= values[3] {
                film.set_sub_region(SubRegion {
                    x_min: values[0],
                    x_max: values[1].min(scene.camera.film_width - 1),
                    y_min: values[2],
                    y_max: values[3].min(scene.camera.film_height - 1),
                });
            } else {
                return Err(RenderError::config(
                    "film.subregion",
                    format!("expected 4 ordered integers, got {:?}", raw),
                ));
            }
        }
        film.add_channel(FilmChannels::ALPHA | FilmChannels::DEPTH);
        let hybrid = cfg.get_bool("path.hybridbackforward.enable", false)?;
        if engine_type.uses_light_paths() || hybrid {
            film.add_channel(FilmChannels::RADIANCE_PER_SCREEN_NORMALIZED);
        }
        if sampler_settings.sampler_type == SamplerType::Sobol
            && sampler_settings.adaptive_strength > 0.0
        {
            film.add_channel(FilmChannels::NOISE);
        }
        film.set_radiance_group_count(scene.light_group_count());
        film.init(worker_count);

        Ok(RenderEngine {
            engine_type,
            cfg,
            scene: Arc::new(scene),
            film: Arc::new(film),
            state: EngineState::Unstarted,
            editing: false,
            seed_base,
            worker_count,
            core: None,
            threads: Vec::new(),
            start_state: None,
            dlsc_file: None,
        })
    }

    fn check_sampler_compatibility(
        engine_type: RenderEngineType,
        sampler_type: SamplerType,
    ) -> Result<()> {
        let expected = match engine_type {
            RenderEngineType::TilePathCpu => Some(SamplerType::TilePath),
            RenderEngineType::RtPathCpu => Some(SamplerType::RtPath),
            _ => None,
        };
        match expected {
            Some(required) if sampler_type != required => Err(RenderError::config(
                "sampler.type",
                format!(
                    "{} render engine requires the {:?} sampler",
                    engine_type.tag(),
                    required
                ),
            )),
            None if matches!(sampler_type, SamplerType::TilePath | SamplerType::RtPath) => {
                Err(RenderError::config(
                    "sampler.type",
                    format!(
                        "{} render engine can not use the {:?} sampler",
                        engine_type.tag(),
                        sampler_type
                    ),
                ))
            }
            _ => Ok(()),
        }
    }

    pub fn engine_type(&self) -> RenderEngineType {
        self.engine_type
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn film(&self) -> &Arc<Film> {
        &self.film
    }

    pub fn scene(&self) -> &Arc<Scene> {
        &self.scene
    }

    /// Resume from a previously saved render state; must be called before
    /// `start`.
    pub fn set_start_state(&mut self, render_state: RenderState) -> Result<()> {
        render_state.check_engine_tag(self.engine_type.tag())?;
        // Continue with a fresh seed so the resumed run does not repeat
        // the already-accumulated samples.
        self.seed_base = render_state.seed_base + 1;
        info!(
            "Continuing the rendering with new {} seed: {}",
            self.engine_type.tag(),
            self.seed_base
        );
        self.start_state = Some(render_state);
        Ok(())
    }

    /// Snapshot the resumable state of the running (or stopped) engine.
    pub fn render_state(&self) -> RenderState {
        let mut render_state = RenderState::new(self.engine_type.tag(), self.seed_base);
        if let Some(core) = &self.core {
            render_state.tile_state = core.tile_repository.as_ref().map(|r| r.snapshot());
        }
        render_state.dlsc_file = self.dlsc_file.clone();
        render_state
    }

    pub fn start(&mut self) -> Result<()> {
        match self.state {
            EngineState::Unstarted | EngineState::Stopped => {}
            _ => return Ok(()),
        }

        epsilon::set_min(self.cfg.get_f32("scene.epsilon.min", epsilon::DEFAULT_EPSILON_MIN)?);
        epsilon::set_max(self.cfg.get_f32("scene.epsilon.max", epsilon::DEFAULT_EPSILON_MAX)?);

        if self.engine_type == RenderEngineType::FileSaver {
            return self.export_scene();
        }

        let interrupt = AtomicBool::new(false);

        // Build the caches and light strategies
        let strategy_type =
            LightStrategyType::parse(&self.cfg.get_string("lightstrategy.type", "LOG_POWER"))?;
        let dlsc = if strategy_type == LightStrategyType::DlsCache {
            let params = DlscParams::from_properties(&self.cfg)?;
            self.dlsc_file = params.persistent.file_name.clone();
            Some(Arc::new(DirectLightSamplingCache::build(
                params,
                &self.scene,
                &interrupt,
            )?))
        } else {
            None
        };
        let env_radius = crate::light::env_radius(self.scene.world_radius());
        let illuminate_strategy = Arc::new(LightStrategy::preprocess(
            &self.scene.lights,
            strategy_type,
            false,
            env_radius,
            dlsc.clone(),
        )?);
        let emit_strategy = Arc::new(LightStrategy::preprocess(
            &self.scene.lights,
            LightStrategyType::LogPower,
            false,
            env_radius,
            None,
        )?);

        let sampler_settings = SamplerSettings::from_properties(&self.cfg)?;
        let tracer = PathTracer::from_properties(&self.cfg)?;
        let bidir = match self.engine_type {
            RenderEngineType::BiDirCpu => {
                Some(BiDirTracer::from_properties(&self.cfg, self.scene.world_radius())?)
            }
            RenderEngineType::BiDirVmCpu => {
                let mut cfg = self.cfg.clone();
                cfg.set("bidirvm.enable", true);
                Some(BiDirTracer::from_properties(&cfg, self.scene.world_radius())?)
            }
            _ => None,
        };

        let halt = HaltConditions {
            spp: self.cfg.get_u64("batch.haltspp", 0)?,
            debug_samples: self.cfg.get_u64("batch.haltdebug", 0)?,
            noise_threshold: self.cfg.get_f32("batch.haltnoisethreshold", 0.02)?,
            refresh_interval: self.cfg.get_u64("screen.refresh.interval", 4096)?.max(1),
        };

        let tile_repository = if self.engine_type == RenderEngineType::TilePathCpu {
            let aa2 = (sampler_settings.aa_size * sampler_settings.aa_size) as u64;
            let max_multipass = if halt.spp > 0 {
                ((halt.spp + aa2 - 1) / aa2) as u32
            } else {
                0
            };
            let repository = TileRepository::new(
                self.film.sub_region(),
                self.cfg.get_u32("tilepath.tiles.size", 32)?,
                max_multipass,
            );
            if let Some(tile_state) = self
                .start_state
                .take()
                .and_then(|render_state| render_state.tile_state)
            {
                repository.restore(tile_state);
            }
            repository
        } else {
            self.start_state = None;
            return self.spawn_core(
                interrupt,
                dlsc,
                illuminate_strategy,
                emit_strategy,
                sampler_settings,
                tracer,
                bidir,
                halt,
                None,
            );
        };

        self.spawn_core(
            interrupt,
            dlsc,
            illuminate_strategy,
            emit_strategy,
            sampler_settings,
            tracer,
            bidir,
            halt,
            Some(tile_repository),
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn spawn_core(
        &mut self,
        interrupt: AtomicBool,
        dlsc: Option<Arc<DirectLightSamplingCache>>,
        illuminate_strategy: Arc<LightStrategy>,
        emit_strategy: Arc<LightStrategy>,
        sampler_settings: SamplerSettings,
        tracer: PathTracer,
        bidir: Option<BiDirTracer>,
        halt: HaltConditions,
        tile_repository: Option<TileRepository>,
    ) -> Result<()> {
        let mut seed_rng = Rng::new(self.seed_base);
        let sobol_shared = Arc::new(SobolSamplerSharedData::from_rng(
            &mut seed_rng,
            Some(Arc::clone(&self.film)),
        ));
        let rt_shared = if self.engine_type == RenderEngineType::RtPathCpu {
            Some(Arc::new(RtPathSamplerSharedData::new(
                &self.film,
                self.worker_count,
                seed_rng.uniform_u32(),
            )))
        } else {
            None
        };

        let core = Arc::new(EngineCore {
            engine_type: self.engine_type,
            scene: Arc::clone(&self.scene),
            film: Arc::clone(&self.film),
            splatter: Arc::new(FilmSampleSplatter::new(Filter::default_gaussian())),
            illuminate_strategy,
            emit_strategy,
            dlsc,
            tracer,
            bidir,
            sampler_settings,
            sobol_shared,
            random_shared: Arc::new(RandomSamplerSharedData::new()),
            metropolis_shared: Arc::new(MetropolisSamplerSharedData::new()),
            light_metropolis_shared: Arc::new(MetropolisSamplerSharedData::new()),
            rt_shared,
            tile_repository,
            halt,
            seed_base: self.seed_base,
            worker_count: self.worker_count,
            interrupt,
            pause: AtomicBool::new(false),
            paused_workers: AtomicUsize::new(0),
        });

        info!(
            "Starting {} with {} workers",
            self.engine_type.tag(),
            self.worker_count
        );
        for thread_index in 0..self.worker_count {
            let worker_core = Arc::clone(&core);
            self.threads
                .push(thread::spawn(move || worker_main(worker_core, thread_index)));
        }
        self.core = Some(core);
        self.state = EngineState::Running;
        Ok(())
    }

    /// FILESAVER engine: dump the render configuration for a later run with
    /// the target engine instead of rendering.
    fn export_scene(&mut self) -> Result<()> {
        let directory = self.cfg.get_string("filesaver.directory", "ember-export");
        let target = self
            .cfg
            .get_string("filesaver.renderengine.type", "PATHCPU");
        std::fs::create_dir_all(&directory)?;

        let mut exported = self.cfg.clone();
        exported.set("renderengine.type", &target);
        std::fs::write(
            std::path::Path::new(&directory).join("render.cfg"),
            exported.to_string(),
        )?;
        info!("FILESAVER: exported render configuration to {}", directory);
        self.state = EngineState::Stopped;
        Ok(())
    }

    pub fn pause(&mut self) {
        if let Some(core) = &self.core {
            core.pause.store(true, Ordering::Relaxed);
            self.state = EngineState::Paused;
        }
    }

    pub fn resume(&mut self) {
        if let Some(core) = &self.core {
            core.pause.store(false, Ordering::Relaxed);
            self.state = EngineState::Running;
        }
    }

    /// Quiesce the workers so the scene can be mutated. Worker threads are
    /// joined; `end_scene_edit` re-preprocesses and restarts them.
    pub fn begin_scene_edit(&mut self) {
        if self.editing {
            return;
        }
        self.halt_workers();
        self.editing = true;
    }

    /// Exclusive access to the scene during an edit section.
    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        if self.editing {
            Arc::get_mut(&mut self.scene)
        } else {
            None
        }
    }

    pub fn end_scene_edit(&mut self, reset_film: bool) -> Result<()> {
        if !self.editing {
            return Ok(());
        }
        self.editing = false;
        if reset_film {
            self.film.reset();
        }
        self.state = EngineState::Stopped;
        self.start()
    }

    fn halt_workers(&mut self) {
        if let Some(core) = &self.core {
            core.interrupt.store(true, Ordering::Relaxed);
            core.pause.store(false, Ordering::Relaxed);
        }
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("A render worker panicked");
            }
        }
        self.core = None;
    }

    pub fn stop(&mut self) {
        self.halt_workers();
        self.state = EngineState::Stopped;
    }

    /// True when every worker exited (halt condition or interrupt).
    pub fn is_done(&self) -> bool {
        self.threads.iter().all(|handle| handle.is_finished())
    }

    /// Block until every worker hit a halt condition, then stop.
    pub fn wait_for_halt(&mut self) {
        for handle in self.threads.drain(..) {
            if handle.join().is_err() {
                error!("A render worker panicked");
            }
        }
        self.core = None;
        self.state = EngineState::Stopped;
    }

    /// The direct-light sampling cache, when the DLS_CACHE strategy is
    /// active.
    pub fn dlsc(&self) -> Option<&Arc<DirectLightSamplingCache>> {
        self.core.as_ref().and_then(|core| core.dlsc.as_ref())
    }

    /// True once every worker finished its zoom-phase first frame
    /// (RTPATHCPU only).
    pub fn first_frame_done(&self) -> bool {
        self.core
            .as_ref()
            .and_then(|core| core.rt_shared.as_ref())
            .map(|shared| shared.all_first_frames_done())
            .unwrap_or(false)
    }
}

impl Drop for RenderEngine {
    fn drop(&mut self) {
        self.halt_workers();
    }
}

//------------------------------------------------------------------------------
// Worker loops
//------------------------------------------------------------------------------

/// Pause/interrupt gate checked between samples. Returns false when the
/// worker must exit.
fn wait_if_paused(core: &EngineCore) -> bool {
    if core.pause.load(Ordering::Relaxed) {
        core.paused_workers.fetch_add(1, Ordering::Relaxed);
        while core.pause.load(Ordering::Relaxed) && !core.interrupt.load(Ordering::Relaxed) {
            thread::sleep(Duration::from_millis(100));
        }
        core.paused_workers.fetch_sub(1, Ordering::Relaxed);
    }
    !core.interrupt.load(Ordering::Relaxed)
}

fn halt_reached(core: &EngineCore, steps: u64) -> bool {
    if core.film.get_convergence() == 1.0 {
        return true;
    }
    if core.halt.debug_samples > 0 && steps >= core.halt.debug_samples {
        return true;
    }
    if core.halt.spp > 0 {
        let spp = core.film.total_eye_sample_count() / u64::from(core.film.pixel_count().max(1));
        if spp >= core.halt.spp {
            return true;
        }
    }
    false
}

/// Periodic film maintenance done by worker 0 only.
fn update_film_tests(core: &EngineCore, thread_index: usize, steps: u64) {
    if thread_index == 0
        && steps % core.halt.refresh_interval == 0
        && core.film.has_channel(FilmChannels::NOISE)
    {
        core.film.update_convergence_test(core.halt.noise_threshold);
    }
}

fn alloc_sampler(
    core: &EngineCore,
    seed: u64,
    thread_index: usize,
    image_samples_enable: bool,
) -> Box<dyn Sampler> {
    let settings = &core.sampler_settings;
    let rng = Rng::new(seed);
    let film = Some(Arc::clone(&core.film));
    let splatter = Some(Arc::clone(&core.splatter));
    let mut sampler: Box<dyn Sampler> = match settings.sampler_type {
        SamplerType::Random => Box::new(RandomSampler::new(
            rng,
            film,
            splatter,
            image_samples_enable,
            Arc::clone(&core.random_shared),
        )),
        SamplerType::Sobol => Box::new(SobolSampler::new(
            rng,
            film,
            splatter,
            image_samples_enable,
            settings.adaptive_strength,
            settings.adaptive_user_importance_weight,
            settings.bucket_size,
            settings.tile_size,
            settings.super_sampling,
            settings.overlapping,
            Arc::clone(&core.sobol_shared),
        )),
        SamplerType::Metropolis => Box::new(MetropolisSampler::new(
            rng,
            film,
            splatter,
            image_samples_enable,
            settings.large_mutation_probability,
            settings.image_mutation_range,
            settings.max_rejects,
            Arc::clone(&core.metropolis_shared),
        )),
        SamplerType::TilePath => {
            Box::new(TilePathSampler::new(film, splatter, settings.aa_size))
        }
        SamplerType::RtPath => Box::new(RtPathSampler::new(
            rng,
            film,
            splatter,
            settings.zoom_factor,
            settings.zoom_weight,
            Arc::clone(core.rt_shared.as_ref().expect("missing rtpath shared data")),
        )),
    };
    sampler.set_thread_index(thread_index);
    sampler
}

fn worker_main(core: Arc<EngineCore>, thread_index: usize) {
    match core.engine_type {
        RenderEngineType::PathCpu | RenderEngineType::RtPathCpu => {
            path_worker(&core, thread_index)
        }
        RenderEngineType::LightCpu => light_worker(&core, thread_index),
        RenderEngineType::BiDirCpu | RenderEngineType::BiDirVmCpu => {
            bidir_worker(&core, thread_index)
        }
        RenderEngineType::TilePathCpu => tile_worker(&core, thread_index),
        RenderEngineType::FileSaver => {}
    }
}

fn tracer_context(core: &EngineCore) -> TracerContext<'_> {
    TracerContext {
        scene: &core.scene,
        film: &core.film,
        illuminate_strategy: &core.illuminate_strategy,
        emit_strategy: &core.emit_strategy,
    }
}

fn path_worker(core: &EngineCore, thread_index: usize) {
    let ctx = tracer_context(core);
    let mut eye_sampler = alloc_sampler(
        core,
        core.seed_base + 1 + thread_index as u64,
        thread_index,
        true,
    );
    eye_sampler.request_samples(SampleType::PixelNormalizedOnly, core.tracer.eye_sample_size);

    // Light path sampler for the hybrid back/forward mode; always
    // Metropolis, with the image-plane meaning of dims 0/1 disabled.
    let mut light_sampler = if core.tracer.hybrid_back_forward_enable {
        let mut sampler: Box<dyn Sampler> = Box::new(MetropolisSampler::new(
            Rng::new(core.seed_base + 1 + (thread_index + core.worker_count) as u64),
            Some(Arc::clone(&core.film)),
            Some(Arc::clone(&core.splatter)),
            false,
            core.sampler_settings.large_mutation_probability,
            core.sampler_settings.image_mutation_range,
            core.sampler_settings.max_rejects,
            Arc::clone(&core.light_metropolis_shared),
        ));
        sampler.set_thread_index(thread_index);
        sampler.request_samples(
            SampleType::ScreenNormalizedOnly,
            core.tracer.light_sample_size,
        );
        Some(sampler)
    } else {
        None
    };

    let clamping = VarianceClamping::new(core.tracer.sqrt_variance_clamp_max_value);
    let mut numerical_error_logged = false;

    let mut steps = 0u64;
    loop {
        if !wait_if_paused(core) {
            break;
        }

        let mut sample_result = core.tracer.render_eye_sample(&ctx, eye_sampler.as_mut());
        if sample_result.is_valid() {
            clamping.clamp(&core.film, &mut sample_result);
            eye_sampler.next_sample(std::slice::from_ref(&sample_result));
        } else {
            // Drop the sample, keep the sampler stream advancing.
            if !numerical_error_logged {
                warn!(
                    "[worker {}] NaN/Inf radiance sample discarded",
                    thread_index
                );
                numerical_error_logged = true;
            }
            eye_sampler.next_sample(&[]);
        }

        if let Some(light_sampler) = light_sampler.as_mut() {
            let results =
                core.tracer
                    .render_light_sample(&ctx, light_sampler.as_mut(), true);
            let results: Vec<_> = results.into_iter().filter(|r| r.is_valid()).collect();
            light_sampler.next_sample(&results);
        }

        steps += 1;
        update_film_tests(core, thread_index, steps);
        if halt_reached(core, steps) {
            break;
        }
    }
}

fn light_worker(core: &EngineCore, thread_index: usize) {
    let ctx = tracer_context(core);
    let mut sampler = alloc_sampler(
        core,
        core.seed_base + 1 + thread_index as u64,
        thread_index,
        // Disable image plane meaning for samples 0 and 1
        false,
    );
    sampler.request_samples(
        SampleType::ScreenNormalizedOnly,
        core.tracer.light_sample_size,
    );

    let mut steps = 0u64;
    loop {
        if !wait_if_paused(core) {
            break;
        }
        let results = core
            .tracer
            .render_light_sample(&ctx, sampler.as_mut(), false);
        let results: Vec<_> = results.into_iter().filter(|r| r.is_valid()).collect();
        sampler.next_sample(&results);

        steps += 1;
        update_film_tests(core, thread_index, steps);
        if halt_reached(core, steps) {
            break;
        }
        if core.halt.spp > 0 {
            // Screen-normalized halt: treat light paths per pixel as spp.
            let spp =
                core.film.total_light_sample_count() / u64::from(core.film.pixel_count().max(1));
            if spp >= core.halt.spp {
                break;
            }
        }
    }
}

fn bidir_worker(core: &EngineCore, thread_index: usize) {
    let ctx = tracer_context(core);
    let bidir = core.bidir.as_ref().expect("missing BiDir tracer");
    let mut sampler = alloc_sampler(
        core,
        core.seed_base + 1 + thread_index as u64,
        thread_index,
        true,
    );
    sampler.request_samples(
        SampleType::PixelNormalizedAndScreenNormalized,
        bidir.sample_size(),
    );
    let mut aux_rng = Rng::new(core.seed_base + 1 + (thread_index + core.worker_count) as u64);
    let clamping = VarianceClamping::new(bidir.sqrt_variance_clamp_max_value);

    let mut steps = 0u64;
    loop {
        if !wait_if_paused(core) {
            break;
        }
        let iteration = (core.film.total_eye_sample_count()
            / u64::from(core.film.pixel_count().max(1))) as u32;
        let mut results = bidir.render_sample(&ctx, sampler.as_mut(), &mut aux_rng, iteration);
        results.retain(|r| r.is_valid());
        if clamping.has_clamping() {
            for result in &mut results {
                clamping.clamp(&core.film, result);
            }
        }
        sampler.next_sample(&results);

        steps += 1;
        update_film_tests(core, thread_index, steps);
        if halt_reached(core, steps) {
            break;
        }
    }
}

fn tile_worker(core: &EngineCore, thread_index: usize) {
    let ctx = tracer_context(core);
    let repository = core
        .tile_repository
        .as_ref()
        .expect("missing tile repository");
    let mut sampler = TilePathSampler::new(
        Some(Arc::clone(&core.film)),
        Some(Arc::clone(&core.splatter)),
        core.sampler_settings.aa_size,
    );
    sampler.set_thread_index(thread_index);
    sampler.request_samples(SampleType::PixelNormalizedOnly, core.tracer.eye_sample_size);
    let clamping = VarianceClamping::new(core.tracer.sqrt_variance_clamp_max_value);

    while let Some(tile) = repository.next_tile() {
        if !wait_if_paused(core) {
            break;
        }
        sampler.set_tile(tile);
        while !sampler.tile_done() {
            let mut sample_result = core.tracer.render_eye_sample(&ctx, &mut sampler);
            if sample_result.is_valid() {
                clamping.clamp(&core.film, &mut sample_result);
                sampler.next_sample(std::slice::from_ref(&sample_result));
            } else {
                sampler.next_sample(&[]);
            }
            if core.interrupt.load(Ordering::Relaxed) {
                return;
            }
        }
        update_film_tests(core, thread_index, 0);
        if core.film.get_convergence() == 1.0 {
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_type_parse() {
        assert_eq!(
            RenderEngineType::parse("PATHCPU").unwrap(),
            RenderEngineType::PathCpu
        );
        assert_eq!(
            RenderEngineType::parse("BIDIRVMCPU").unwrap(),
            RenderEngineType::BiDirVmCpu
        );
        assert!(RenderEngineType::parse("GPU").is_err());
    }

    #[test]
    fn test_sampler_engine_compatibility() {
        assert!(RenderEngine::check_sampler_compatibility(
            RenderEngineType::TilePathCpu,
            SamplerType::TilePath
        )
        .is_ok());
        assert!(RenderEngine::check_sampler_compatibility(
            RenderEngineType::TilePathCpu,
            SamplerType::Sobol
        )
        .is_err());
        assert!(RenderEngine::check_sampler_compatibility(
            RenderEngineType::PathCpu,
            SamplerType::RtPath
        )
        .is_err());
        assert!(RenderEngine::check_sampler_compatibility(
            RenderEngineType::PathCpu,
            SamplerType::Sobol
        )
        .is_ok());
    }
}
