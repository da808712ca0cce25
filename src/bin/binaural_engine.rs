use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use binaural_engine::ambient::AmbientSound;
use binaural_engine::audio_io::CpalClock;
use binaural_engine::clock::OfflineClock;
use binaural_engine::composite::PRESETS;
use binaural_engine::config::{EngineConfig, CONFIG};
use binaural_engine::context::AudioContext;
use binaural_engine::session::{SessionData, SessionPlayer};
use clap::{Args as ClapArgs, Parser, Subcommand};
use crossbeam::channel::{unbounded, RecvTimeoutError};
use tracing_subscriber::EnvFilter;

/// Play or render binaural beat sessions
#[derive(Parser)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Stream or render a session JSON file
    Run(RunArgs),
    /// List the composite presets
    Presets,
    /// List the ambient sounds
    Sounds,
    /// Generate a default config file and exit
    GenerateConfig(ConfigArgs),
}

#[derive(ClapArgs)]
struct RunArgs {
    /// Path to the session JSON file
    #[arg(long)]
    path: String,
    /// Render the session to a WAV file instead of streaming
    #[arg(long, default_value_t = false)]
    generate: bool,
    /// Output WAV path, relative paths land in the configured output dir
    #[arg(long)]
    out: Option<String>,
    /// Length in seconds, overriding the session's sequence and timer
    #[arg(long)]
    seconds: Option<f64>,
}

#[derive(ClapArgs)]
struct ConfigArgs {
    /// Output path for the generated configuration
    #[arg(long, default_value = "config.toml")]
    out: String,
}

/// Time left for fade-outs and teardowns after a streamed session stops.
const RELEASE_TIME: Duration = Duration::from_millis(500);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Run(args) => run_command(args)?,
        Commands::Presets => {
            for preset in PRESETS.iter() {
                println!(
                    "{:<20} {:>6.2} Hz  {} carrier / {} isochronic  {}",
                    preset.id,
                    preset.target_beat_freq,
                    preset.carrier_layers.len(),
                    preset.isochronic_layers.len(),
                    preset.name
                );
            }
        }
        Commands::Sounds => {
            for sound in AmbientSound::ALL {
                println!(
                    "{:<14} {:<14} {:?}",
                    sound.id(),
                    sound.display_name(),
                    sound.category()
                );
            }
        }
        Commands::GenerateConfig(cfg) => {
            EngineConfig::generate_default(&cfg.out)?;
            println!("Generated default config at {}", cfg.out);
        }
    }
    Ok(())
}

fn run_command(args: RunArgs) -> Result<(), Box<dyn std::error::Error>> {
    let data = SessionData::load(&args.path)?;
    let seconds = args.seconds.or_else(|| data.duration_seconds());

    if args.generate {
        let seconds = seconds.ok_or("session has no sequence or timer, pass --seconds")?;
        let out_name = args.out.unwrap_or_else(|| "session.wav".to_string());
        let out_path = if Path::new(&out_name).is_absolute() {
            PathBuf::from(&out_name)
        } else {
            CONFIG.output_dir.join(&out_name)
        };
        render_full_wav(data, &out_path, seconds)?;
        println!("Generated session at {}", out_path.display());
        return Ok(());
    }

    let ctx = AudioContext::new(CpalClock::new()?);
    let mut session = SessionPlayer::new(ctx.clone(), data, &CONFIG);
    session.start()?;

    let (tx, rx) = unbounded();
    ctrlc::set_handler(move || {
        let _ = tx.send(());
    })?;
    println!("Streaming {}... press Ctrl+C to stop", args.path);

    let started = Instant::now();
    let mut last = started;
    loop {
        match rx.recv_timeout(Duration::from_millis(250)) {
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
            Err(RecvTimeoutError::Timeout) => {}
        }
        let now = Instant::now();
        session.advance((now - last).as_secs_f64())?;
        last = now;
        let over_limit = seconds.is_some_and(|s| started.elapsed().as_secs_f64() >= s);
        if !session.is_running() || over_limit {
            break;
        }
    }

    session.stop();
    std::thread::sleep(RELEASE_TIME);
    ctx.close();
    Ok(())
}

fn render_full_wav(
    data: SessionData,
    out_path: &Path,
    seconds: f64,
) -> Result<(), Box<dyn std::error::Error>> {
    use hound::{SampleFormat, WavSpec, WavWriter};

    let sample_rate = CONFIG.sample_rate;
    let ctx: Arc<AudioContext> = AudioContext::new(OfflineClock::running(sample_rate));
    let mut session = SessionPlayer::new(ctx.clone(), data, &CONFIG);
    session.start()?;

    if let Some(dir) = out_path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let spec = WavSpec {
        channels: 2,
        sample_rate,
        bits_per_sample: 16,
        sample_format: SampleFormat::Int,
    };
    let mut writer = WavWriter::create(out_path, spec)?;

    let start_time = Instant::now();
    let block = CONFIG.block_frames.max(1);
    let mut remaining = (seconds.max(0.0) * sample_rate as f64) as usize;
    let mut buffer = vec![0.0f32; block * 2];
    while remaining > 0 {
        let frames = block.min(remaining);
        buffer.resize(frames * 2, 0.0);
        ctx.render(&mut buffer);
        for sample in &buffer {
            let s = (sample.clamp(-1.0, 1.0) * i16::MAX as f32) as i16;
            writer.write_sample(s)?;
        }
        session.advance(frames as f64 / sample_rate as f64)?;
        remaining -= frames;
    }

    writer.finalize()?;
    session.stop();
    tracing::info!(
        "rendered {seconds:.1}s in {:.2}s",
        start_time.elapsed().as_secs_f32()
    );
    Ok(())
}
