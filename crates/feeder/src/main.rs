use std::{
    fs::File,
    io::BufWriter,
    path::{Path, PathBuf},
    time::Duration,
};

use anyhow::{anyhow, Context as _};
use clap::{Parser, Subcommand};
use indicatif::ProgressBar;
use polarplot_controller::{
    sim::SimAxis, Axes, JobSummary, MachineConfig, MotionController, NoWait, Plotter, Ticker,
};
use polarplot_geom::ArmPose;
use polarplot_protocol::{directives, MotionDirective, ParseError, SyncFrame};

use crate::{link::Tee, render::ArmOverlay, simulator::RealTime};

mod hpgl;
mod link;
mod render;
mod simulator;

/// How many frames can queue up for the writer thread before the plotter
/// starts dropping them.
const LINK_CAPACITY: usize = 64;

#[derive(Parser)]
#[command(version, author, about = "Drives a simulated polar-arm pen plotter")]
struct Args {
    #[command(subcommand)]
    cmd: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Run a drawing on the simulated plotter.
    Plot {
        /// A file of plotter commands, or HPGL (.hpgl or .plt).
        path: PathBuf,
        /// Machine configuration (JSON); the built-in one otherwise.
        #[arg(long)]
        config: Option<PathBuf>,
        /// Where to write the sync frames (a file, or a serial device).
        #[arg(long)]
        sync_out: Option<PathBuf>,
        /// Draw what the plotter reported.
        #[arg(long)]
        svg: Option<PathBuf>,
        /// Run at the speed of the real machine.
        #[arg(long)]
        realtime: bool,
    },
    /// Print an HPGL file as plotter commands.
    Convert { path: PathBuf },
    /// Draw a captured stream of sync frames.
    Render {
        frames: PathBuf,
        #[arg(short, long)]
        output: PathBuf,
        /// Machine configuration (JSON) for drawing the arm at the last
        /// frame; the arm is left out otherwise.
        #[arg(long)]
        config: Option<PathBuf>,
    },
    /// Print the built-in machine configuration.
    Config,
}

fn load_config(path: Option<&Path>) -> anyhow::Result<MachineConfig> {
    let Some(path) = path else {
        return Ok(MachineConfig::default());
    };
    let file = File::open(path).with_context(|| format!("opening {}", path.display()))?;
    let config = serde_json::from_reader(file)
        .with_context(|| format!("reading config from {}", path.display()))?;
    Ok(config)
}

fn is_hpgl(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("hpgl") || ext.eq_ignore_ascii_case("plt"))
}

fn load_directives(path: &Path) -> anyhow::Result<Vec<Result<MotionDirective, ParseError>>> {
    let text =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    if is_hpgl(path) {
        Ok(hpgl::import(&text)?.into_iter().map(Ok).collect())
    } else {
        Ok(directives(&text).collect())
    }
}

struct Finished {
    summary: JobSummary,
    axes: Axes<SimAxis>,
    pose: ArmPose,
    link: Tee,
}

fn run<T: Ticker>(
    config: MachineConfig,
    directives: Vec<Result<MotionDirective, ParseError>>,
    link: Tee,
    ticker: T,
) -> anyhow::Result<Finished> {
    let motion = MotionController::new(config, simulator::machine(&config));
    let mut plotter = Plotter::new(motion, link, ticker);
    plotter.home(&mut || false).context("homing failed")?;
    // Nobody to press the start button here.
    plotter.wait_for_start(&mut || true, &mut || false)?;

    let bar = ProgressBar::new(directives.len() as u64);
    let summary = plotter.run(
        directives.into_iter().inspect(|_| bar.inc(1)),
        &mut || false,
    );
    bar.finish();
    let summary = summary?;

    let (motion, link, _) = plotter.into_parts();
    Ok(Finished {
        summary,
        pose: motion.state().pose(),
        axes: motion.into_drivers(),
        link,
    })
}

/// The arm as it was at the last frame, if the configuration can reach it.
fn final_arm(config: &MachineConfig, frames: &[SyncFrame]) -> Option<ArmOverlay> {
    let last = frames.last()?;
    let geometry = &config.geometry;
    let target = polarplot_geom::Point::new(last.x, last.y);
    match geometry.solve(&target, &geometry.center_pose()) {
        Ok(pose) => Some(ArmOverlay::new(geometry, &pose)),
        Err(e) => {
            log::warn!("not drawing the arm: {e}");
            None
        }
    }
}

fn plot(
    path: &Path,
    config: Option<&Path>,
    sync_out: Option<&Path>,
    svg: Option<&Path>,
    realtime: bool,
) -> anyhow::Result<()> {
    let config = load_config(config)?;
    let directives = load_directives(path)?;
    log::info!("loaded {} directives from {}", directives.len(), path.display());

    let mut writer = None;
    let mut link = Tee::default();
    if let Some(out) = sync_out {
        let file = File::create(out).with_context(|| format!("opening {}", out.display()))?;
        let (tx, handle) = link::spawn_writer(BufWriter::new(file), LINK_CAPACITY);
        link.sender = Some(tx);
        writer = Some(handle);
    }
    if svg.is_some() {
        link.capture = Some(Vec::new());
    }

    let Finished {
        summary,
        axes,
        pose,
        link,
    } = if realtime {
        let period = Duration::from_micros(config.control_period_us.into());
        run(config, directives, link, RealTime::new(period))?
    } else {
        run(config, directives, link, NoWait)?
    };
    simulator::report(&axes);

    let Tee { sender, capture } = link;
    // Closing the channel lets the writer finish.
    drop(sender);
    if let Some(handle) = writer {
        let written = handle
            .join()
            .map_err(|_| anyhow!("sync writer panicked"))?
            .context("writing sync frames")?;
        log::info!("wrote {written} bytes of sync frames");
    }
    if let (Some(svg), Some(bytes)) = (svg, capture) {
        let (frames, _) = render::decode(&bytes);
        let arm = ArmOverlay::new(&config.geometry, &pose);
        render::save(svg, &frames, Some(&arm))?;
    }

    println!(
        "{} directives drawn, {} skipped; {} frames sent, {} dropped",
        summary.completed, summary.skipped, summary.frames_sent, summary.frames_dropped
    );
    Ok(())
}

fn main() -> anyhow::Result<()> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Info)
        .parse_filters(&std::env::var("RUST_LOG").unwrap_or_default())
        .init();

    let args = Args::parse();
    match args.cmd {
        Cmd::Plot {
            path,
            config,
            sync_out,
            svg,
            realtime,
        } => plot(
            &path,
            config.as_deref(),
            sync_out.as_deref(),
            svg.as_deref(),
            realtime,
        ),
        Cmd::Convert { path } => {
            let text = std::fs::read_to_string(&path)
                .with_context(|| format!("reading {}", path.display()))?;
            for d in hpgl::import(&text)? {
                println!("{d}");
            }
            Ok(())
        }
        Cmd::Render {
            frames,
            output,
            config,
        } => {
            let bytes =
                std::fs::read(&frames).with_context(|| format!("reading {}", frames.display()))?;
            let (frames, bad) = render::decode(&bytes);
            if bad > 0 {
                log::warn!("{bad} unreadable frames");
            }
            log::info!("{} frames", frames.len());
            let arm = match config {
                Some(path) => final_arm(&load_config(Some(&path))?, &frames),
                None => None,
            };
            render::save(&output, &frames, arm.as_ref())
        }
        Cmd::Config => {
            serde_json::to_writer_pretty(std::io::stdout().lock(), &MachineConfig::default())?;
            println!();
            Ok(())
        }
    }
}
