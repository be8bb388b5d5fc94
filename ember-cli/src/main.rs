mod scenes;

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{App, Arg, ArgMatches};
use flexi_logger::Logger;
use log::info;

use ember_core::config::Properties;
use ember_core::engine::{EngineState, RenderEngine, RenderState};

fn main() {
    println!("ember 0.1 [detected {} cores]", num_cpus::get());

    let matches = parse_args();

    Logger::try_with_env_or_str("info")
        .unwrap()
        .start()
        .unwrap_or_else(|e| panic!("Failed to initialize logger: {}", e));

    if let Err(ref e) = run(&matches) {
        eprintln!("Application error: {:#}", e);
        std::process::exit(1);
    }
}

fn parse_args() -> ArgMatches<'static> {
    App::new("ember")
        .about("A physically based path tracing renderer")
        .arg(
            Arg::with_name("config")
                .short("c")
                .long("config")
                .takes_value(true)
                .help("Render configuration file (key = value lines)"),
        )
        .arg(
            Arg::with_name("define")
                .short("D")
                .multiple(true)
                .number_of_values(1)
                .takes_value(true)
                .help("Override a configuration key: -D key=value"),
        )
        .arg(
            Arg::with_name("width")
                .short("w")
                .long("width")
                .takes_value(true)
                .help("Film width in pixels [default: 512]"),
        )
        .arg(
            Arg::with_name("height")
                .short("e")
                .long("height")
                .takes_value(true)
                .help("Film height in pixels [default: 512]"),
        )
        .arg(
            Arg::with_name("output")
                .short("o")
                .long("output")
                .takes_value(true)
                .help("Output PNG file [default: ember.png]"),
        )
        .arg(
            Arg::with_name("resume")
                .long("resume")
                .takes_value(true)
                .help("Resume from a render state file"),
        )
        .arg(
            Arg::with_name("save-state")
                .long("save-state")
                .takes_value(true)
                .help("Write the render state to this file on exit"),
        )
        .get_matches()
}

fn run(matches: &ArgMatches<'_>) -> Result<()> {
    let mut cfg = match matches.value_of("config") {
        Some(path) => {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("can not read configuration {}", path))?;
            Properties::from_str_lines(&text)?
        }
        None => Properties::new(),
    };
    if let Some(defines) = matches.values_of("define") {
        for define in defines {
            let mut split = define.splitn(2, '=');
            match (split.next(), split.next()) {
                (Some(key), Some(value)) => {
                    cfg.set(key.trim(), value.trim());
                }
                _ => anyhow::bail!("malformed -D override {:?}", define),
            }
        }
    }

    let width: u32 = matches
        .value_of("width")
        .map(str::parse)
        .transpose()?
        .unwrap_or(512);
    let height: u32 = matches
        .value_of("height")
        .map(str::parse)
        .transpose()?
        .unwrap_or(512);
    let output = matches.value_of("output").unwrap_or("ember.png");

    let scene = scenes::cornell_box(width, height)?;
    let mut engine = RenderEngine::new(cfg, scene)?;

    if let Some(state_file) = matches.value_of("resume") {
        let render_state = RenderState::load(state_file)?;
        engine.set_start_state(render_state)?;
    }

    engine.start()?;
    if engine.state() == EngineState::Running {
        let progress = indicatif::ProgressBar::new_spinner();
        progress.enable_steady_tick(250);
        while !engine.is_done() {
            let film = engine.film();
            let spp = film.total_eye_sample_count() / u64::from(film.pixel_count().max(1));
            progress.set_message(format!(
                "{} spp, convergence {:.3}",
                spp,
                film.get_convergence()
            ));
            std::thread::sleep(Duration::from_millis(250));
        }
        progress.finish_and_clear();
    }
    engine.wait_for_halt();

    if let Some(state_file) = matches.value_of("save-state") {
        engine.render_state().save(state_file)?;
        info!("Render state saved to {}", state_file);
    }

    write_png(&engine, output)?;
    info!("Image written to {}", output);
    Ok(())
}

fn write_png(engine: &RenderEngine, path: &str) -> Result<()> {
    let film = engine.film();
    let mut image = image::RgbImage::new(film.width(), film.height());
    for y in 0..film.height() {
        for x in 0..film.width() {
            let srgb = film.develop_pixel(x, y).to_srgb();
            image.put_pixel(x, y, image::Rgb(srgb));
        }
    }
    image.save(path).context("failed to write image")?;
    Ok(())
}
