use std::fs;
use std::io::{self, BufRead};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use metronome_core::audio::click::{click_wav, ClickKind};
use metronome_core::config::AppConfig;
use metronome_core::meter::{clamp_display_tempo, MeterSetting, NoteValue, TimeSignature};
use metronome_core::testing::ManualClockBackend;
use metronome_core::{AudioBackend, BeatScheduler, CpalBackend, TapTempoEstimator};

#[derive(Parser, Debug)]
#[command(
    name = "metronome_cli",
    about = "Look-ahead metronome and tap tempo from the terminal"
)]
struct Cli {
    /// JSON configuration file (defaults to assets/metronome_config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Play a click track on the default output device
    Play {
        /// Displayed tempo (quarter or dotted quarter), clamped to 30-300
        #[arg(long, default_value_t = 120.0)]
        tempo: f64,
        #[arg(long, default_value = "4/4")]
        signature: TimeSignature,
        /// quarter, eighth, sixteenth or dotted-quarter
        #[arg(long, default_value = "quarter")]
        note: NoteValue,
        #[arg(long)]
        no_accent: bool,
        /// WAV file for regular beats (defaults to a synthesized click)
        #[arg(long)]
        normal: Option<PathBuf>,
        /// WAV file for the first beat of each bar
        #[arg(long)]
        accent: Option<PathBuf>,
        #[arg(long, default_value_t = 10.0)]
        seconds: f64,
        /// Simulate the audio clock instead of opening a device
        #[arg(long)]
        dry_run: bool,
    },
    /// Estimate a tempo from taps: each line on stdin is a tap, `r` resets, `q` quits
    Tap {
        /// Seconds of inactivity that start a new session (0 disables)
        #[arg(long)]
        auto_reset_secs: Option<u64>,
    },
    /// List supported time signatures and their click subdivisions
    Meters,
}

struct PlayOptions {
    setting: MeterSetting,
    display_tempo: f64,
    accent_enabled: bool,
    normal: Option<PathBuf>,
    accent: Option<PathBuf>,
    duration: Duration,
}

fn main() -> ExitCode {
    metronome_core::init_logging();
    match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("Error: {err:?}");
            ExitCode::from(1)
        }
    }
}

fn run() -> Result<ExitCode> {
    let cli = Cli::parse();
    let config = cli
        .config
        .map(AppConfig::load_from_file)
        .unwrap_or_else(AppConfig::load);

    match cli.command {
        Commands::Play {
            tempo,
            signature,
            note,
            no_accent,
            normal,
            accent,
            seconds,
            dry_run,
        } => {
            let options = PlayOptions {
                setting: MeterSetting::new(signature, note),
                display_tempo: clamp_display_tempo(tempo),
                accent_enabled: config.scheduler.accent_enabled && !no_accent,
                normal,
                accent,
                duration: Duration::try_from_secs_f64(seconds.max(0.0))
                    .context("--seconds must be a finite number of seconds")?,
            };
            if dry_run {
                run_dry(&config, &options)
            } else {
                run_play(&config, &options)
            }
        }
        Commands::Tap { auto_reset_secs } => run_tap(&config, auto_reset_secs),
        Commands::Meters => run_meters(),
    }
}

fn run_play(config: &AppConfig, options: &PlayOptions) -> Result<ExitCode> {
    let backend = Arc::new(CpalBackend::open(&config.audio).context("opening audio output")?);
    let mut scheduler = prepare_scheduler(backend, config, options)?;

    scheduler.start().context("starting metronome")?;
    let deadline = Instant::now() + options.duration;
    while Instant::now() < deadline {
        scheduler.wait_for_tick(Duration::from_millis(100));
    }
    scheduler.stop();

    // Let the final click ring out
    std::thread::sleep(Duration::from_millis(150));
    scheduler.destroy();
    Ok(ExitCode::from(0))
}

fn run_dry(config: &AppConfig, options: &PlayOptions) -> Result<ExitCode> {
    let backend = Arc::new(ManualClockBackend::default());
    let mut scheduler = prepare_scheduler(Arc::clone(&backend), config, options)?;

    scheduler.start().context("starting metronome")?;
    let step = config.scheduler.tick_period().as_secs_f64();
    let end = options.duration.as_secs_f64();
    let mut now = 0.0;
    while now < end {
        backend.set_time(now);
        scheduler.process_tick();
        now += step;
    }
    scheduler.destroy();

    for playback in backend.playbacks() {
        println!(
            "{}",
            serde_json::json!({ "at_secs": playback.at, "frames": playback.frames })
        );
    }
    Ok(ExitCode::from(0))
}

fn prepare_scheduler<B: AudioBackend + 'static>(
    backend: Arc<B>,
    config: &AppConfig,
    options: &PlayOptions,
) -> Result<BeatScheduler<B>> {
    let sample_rate = backend.sample_rate();
    let normal = sound_bytes(options.normal.as_ref(), sample_rate, ClickKind::Normal)?;
    let accent = sound_bytes(options.accent.as_ref(), sample_rate, ClickKind::Accent)?;

    let mut scheduler = BeatScheduler::new(backend, &config.scheduler)?;
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("building decode runtime")?;
    runtime
        .block_on(scheduler.load_normal_sound(normal))
        .context("loading normal sound")?;
    runtime
        .block_on(scheduler.load_accent_sound(accent))
        .context("loading accent sound")?;

    scheduler.set_accent_enabled(options.accent_enabled);
    scheduler.set_beats_per_bar(options.setting.beats_per_bar())?;
    scheduler.set_tempo(options.setting.scheduler_tempo(options.display_tempo))?;

    let setting = options.setting;
    scheduler.set_on_beat_callback(move |beat| {
        let dot = setting.display_beat(beat);
        let marker = if beat == 0 { "*" } else { "." };
        println!("{} beat {:>2}  dot {}", marker, beat + 1, dot + 1);
    });

    println!(
        "{} {} at {:.0} BPM ({} clicks per bar, {:.1} clicks/min)",
        setting.signature(),
        setting.note(),
        options.display_tempo,
        setting.beats_per_bar(),
        scheduler.tempo()
    );
    Ok(scheduler)
}

fn sound_bytes(path: Option<&PathBuf>, sample_rate: u32, kind: ClickKind) -> Result<Vec<u8>> {
    match path {
        Some(path) => fs::read(path).with_context(|| format!("reading {}", path.display())),
        None => Ok(click_wav(sample_rate, kind)?),
    }
}

fn run_tap(config: &AppConfig, auto_reset_secs: Option<u64>) -> Result<ExitCode> {
    let auto_reset = match auto_reset_secs {
        Some(0) => None,
        Some(secs) => Some(Duration::from_secs(secs.clamp(1, 10))),
        None => config.tap_tempo.auto_reset(),
    };
    let mut estimator = TapTempoEstimator::new();
    estimator.set_auto_reset(auto_reset);

    println!("Press Enter to tap, `r` + Enter to reset, `q` + Enter to quit");
    for line in io::stdin().lock().lines() {
        let line = line.context("reading stdin")?;
        match line.trim() {
            "q" => break,
            "r" => {
                estimator.reset();
                println!("{}", serde_json::to_string(&estimator.snapshot())?);
            }
            _ => println!("{}", serde_json::to_string(&estimator.tap())?),
        }
    }
    Ok(ExitCode::from(0))
}

fn run_meters() -> Result<ExitCode> {
    for signature in TimeSignature::ALL {
        let options: Vec<String> = signature
            .pulse_options()
            .iter()
            .map(|option| format!("{} x{}", option.note, option.beats_per_bar))
            .collect();
        println!("{:>5}  {}", signature.to_string(), options.join(", "));
    }
    Ok(ExitCode::from(0))
}
