//! ZnVis CLI - Render a scene file to a video or a screenshot.

#[cfg(feature = "dhat-heap")]
#[global_allocator]
static ALLOC: dhat::Alloc = dhat::Alloc;

use std::path::PathBuf;
use std::thread;
use std::time::{Duration, Instant};

use glam::Vec3;
use rand::Rng;

use znvis::{
    GeometryTemplate, Particle, Scene, Visualizer, VisualizerConfig, VisualizerHandle,
    engine::HeadlessEngine,
    visualizer::{ACTION_EXPORT_VIDEO, ACTION_SCREENSHOT},
};

const EXAMPLE_STEPS: usize = 10;
const GROUP_SIZE: usize = 10;

fn main() {
    #[cfg(feature = "dhat-heap")]
    let _profiler = dhat::Profiler::new_heap();

    env_logger::init();

    let args: Vec<String> = std::env::args().collect();

    if args.len() < 2 {
        eprintln!("Usage: {} <scene.json> [--screenshot]", args[0]);
        eprintln!();
        eprintln!("Render a ZnVis scene headless and export it.");
        eprintln!();
        eprintln!("Arguments:");
        eprintln!("  scene.json    Path to scene file (config + particles)");
        eprintln!("  --screenshot  Save a screenshot of step 0 instead of a video");
        eprintln!();
        eprintln!("An example scene is printed with --example [spheres|cylinders].");
        std::process::exit(1);
    }

    if args[1] == "--example" {
        print_example_scene(args.get(2).map_or("spheres", String::as_str));
        return;
    }

    let scene_path = PathBuf::from(&args[1]);
    let screenshot = args[2..].iter().any(|a| a == "--screenshot");

    let scene = Scene::load(&scene_path).unwrap_or_else(|e| {
        eprintln!("Error loading scene: {}", e);
        std::process::exit(1);
    });

    println!("ZnVis Visualizer");
    println!("================");
    println!("Particles: {}", scene.particles.len());
    for particle in &scene.particles {
        println!(
            "  {} ({} steps, up to {} instances)",
            particle.name,
            particle.steps(),
            particle.max_instances()
        );
    }
    println!("Frame rate: {} fps", scene.config.frame_rate);
    println!("Output: {}", scene.config.output_dir.display());
    println!();

    let start = Instant::now();
    match run(scene, screenshot) {
        Ok(path) => {
            println!("Wrote {}", path.display());
            println!("Time: {:.2}s", start.elapsed().as_secs_f32());
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(1);
        }
    }
}

/// Run the viewer on this thread while a driver thread triggers the export.
fn run(scene: Scene, screenshot: bool) -> znvis::Result<PathBuf> {
    let timeout = scene.config.dispatch_timeout();
    let screenshot_path = scene.config.output_dir.join("screenshot_0.png");

    let visualizer = Visualizer::<HeadlessEngine>::new(&scene.particles, scene.config)?;
    println!(
        "Running {} steps ({})...",
        visualizer.number_of_steps(),
        if screenshot { "screenshot" } else { "video export" }
    );

    let handle = visualizer.handle();
    let driver = thread::spawn(move || drive(handle, screenshot, timeout));

    visualizer.run(HeadlessEngine::new())?;

    let exported = driver
        .join()
        .unwrap_or_else(|_| Err(znvis::VisError::Encoder("driver thread panicked".into())))?;
    Ok(exported.unwrap_or(screenshot_path))
}

fn drive(
    handle: VisualizerHandle<HeadlessEngine>,
    screenshot: bool,
    timeout: Duration,
) -> znvis::Result<Option<PathBuf>> {
    let dispatcher = handle.dispatcher();
    let label = if screenshot {
        ACTION_SCREENSHOT
    } else {
        ACTION_EXPORT_VIDEO
    };

    let result = dispatcher
        .call(move |engine: &mut HeadlessEngine| engine.trigger_action(label), timeout)
        .and_then(|_| {
            if screenshot {
                Ok(None)
            } else {
                handle.wait_for_export().transpose()
            }
        });

    // The loop may already be gone if startup failed.
    let _ = dispatcher.close();
    result
}

/// Positions drawn uniformly from `[-extent, extent)`, `GROUP_SIZE` per step.
fn scatter<R: Rng>(rng: &mut R, extent: f32) -> Vec<Vec<Vec3>> {
    (0..EXAMPLE_STEPS)
        .map(|_| {
            (0..GROUP_SIZE)
                .map(|_| {
                    Vec3::new(
                        rng.gen_range(-extent..extent),
                        rng.gen_range(-extent..extent),
                        rng.gen_range(-extent..extent),
                    )
                })
                .collect()
        })
        .collect()
}

/// Two groups of spheres jumping around a 20 x 20 x 20 box.
fn spheres_scene<R: Rng>(rng: &mut R) -> Scene {
    Scene {
        config: VisualizerConfig {
            frame_rate: 20,
            ..Default::default()
        },
        particles: vec![
            Particle::group(
                "Blue",
                GeometryTemplate::sphere(2.0, [30.0 / 255.0, 144.0 / 255.0, 1.0], 10),
                scatter(rng, 10.0),
            ),
            Particle::group(
                "Orange",
                GeometryTemplate::sphere(1.0, [1.0, 140.0 / 255.0, 0.0], 10),
                scatter(rng, 10.0),
            ),
        ],
    }
}

/// One group of randomly oriented rods.
fn cylinders_scene<R: Rng>(rng: &mut R) -> znvis::Result<Scene> {
    let positions = scatter(rng, 5.0);
    let directors = (0..EXAMPLE_STEPS)
        .map(|_| {
            (0..GROUP_SIZE)
                .map(|_| {
                    Vec3::new(
                        rng.gen_range(0.0..1.0),
                        rng.gen_range(0.0..1.0),
                        rng.gen_range(0.0..1.0),
                    )
                })
                .collect()
        })
        .collect();

    Ok(Scene {
        config: VisualizerConfig {
            frame_rate: 10,
            ..Default::default()
        },
        particles: vec![Particle::directed_group(
            "Blue",
            GeometryTemplate::cylinder(0.2, 3.0, [30.0 / 255.0, 144.0 / 255.0, 1.0], 10),
            positions,
            directors,
        )?],
    })
}

fn print_example_scene(kind: &str) {
    let mut rng = rand::thread_rng();
    let scene = match kind {
        "spheres" => Ok(spheres_scene(&mut rng)),
        "cylinders" => cylinders_scene(&mut rng),
        other => {
            eprintln!("Unknown example '{}' (expected spheres or cylinders)", other);
            std::process::exit(1);
        }
    };

    match scene.and_then(|scene| Ok(serde_json::to_string_pretty(&scene)?)) {
        Ok(json) => println!("{}", json),
        Err(e) => {
            eprintln!("Error building example: {}", e);
            std::process::exit(1);
        }
    }
}
