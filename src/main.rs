use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use helmsman::can;
use helmsman::config::AudioConfig;
use helmsman::voice::filter;
use helmsman::voice::{AudioSource, RecognizerFactory, WakeWordClassifier, WavSource};
use helmsman::{ActuatorClient, CommandDispatcher, CommandGrammar, Config, Pipeline};

/// Helmsman - Voice-command control front-end for a motor and tail driven craft
#[derive(Parser)]
#[command(name = "helmsman", version, about)]
struct Cli {
    /// Config file (defaults to ~/.config/helmsman/config.toml)
    #[arg(short, long, env = "HELMSMAN_CONFIG")]
    config: Option<PathBuf>,

    /// Replay a WAV file instead of capturing from the microphone
    #[arg(long)]
    input_wav: Option<PathBuf>,

    /// Send actuator frames on a real CAN interface
    #[arg(long)]
    can: bool,

    /// CAN interface name
    #[arg(long)]
    interface: Option<String>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Send one motor frame
    SendMotor {
        /// Duty cycle in percent (clamped to 0..=100)
        #[arg(allow_negative_numbers = true)]
        duty: i32,
    },
    /// Send one tail frame
    SendTail {
        /// Tail position in centi-degrees (clamped to ±4500)
        #[arg(allow_negative_numbers = true)]
        centi_degrees: i32,
    },
    /// Print the recognizer grammar as JSON
    Grammar,
    /// Log frames received on the CAN interface
    Monitor {
        /// Stop after this many frames
        #[arg(short = 'n', long)]
        count: Option<u64>,
    },
    /// Test audio input levels and the frame filter
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info",
        1 => "info,helmsman=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(path) = cli.input_wav {
        config.audio.input_wav = Some(path);
    }
    if cli.can {
        config.can.enabled = true;
    }
    if let Some(interface) = cli.interface {
        config.can.interface = interface;
    }
    config.validate()?;
    tracing::debug!(?config, "loaded configuration");

    if let Some(cmd) = cli.command {
        return match cmd {
            Command::SendMotor { duty } => send_motor(&config, duty),
            Command::SendTail { centi_degrees } => send_tail(&config, centi_degrees),
            Command::Grammar => print_grammar(),
            Command::Monitor { count } => {
                tokio::task::spawn_blocking(move || monitor(&config, count)).await?
            }
            Command::TestMic { duration } => {
                tokio::task::spawn_blocking(move || test_mic(&config.audio, duration)).await?
            }
        };
    }

    run_pipeline(config).await
}

/// Run the voice pipeline until Ctrl-C or the end of replayed input
async fn run_pipeline(config: Config) -> anyhow::Result<()> {
    tracing::info!(
        wake_label = %config.wake.label,
        can = config.can.enabled,
        input = ?config.audio.input_wav,
        "starting helmsman"
    );

    let stop = Arc::new(AtomicBool::new(false));
    let worker_stop = Arc::clone(&stop);

    // The audio stream and models stay on the blocking thread that builds them
    let mut worker = tokio::task::spawn_blocking(move || -> helmsman::Result<()> {
        let (classifier, factory) = load_models(&config)?;
        let transport = can::open_transport(&config.can)?;
        let source = open_source(&config.audio)?;

        let dispatcher = CommandDispatcher::new(
            classifier,
            factory,
            ActuatorClient::new(transport),
            config.wake.label.clone(),
            config.audio.frame_len,
        );
        tracing::info!(wake_label = %config.wake.label, "helmsman ready");

        Pipeline::new(source, dispatcher).run(&worker_stop)?;
        Ok(())
    });

    tokio::select! {
        result = &mut worker => result??,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("shutdown requested");
            stop.store(true, Ordering::Relaxed);
            worker.await??;
        }
    }

    Ok(())
}

type Models = (Box<dyn WakeWordClassifier>, Box<dyn RecognizerFactory>);

#[cfg(feature = "vosk")]
fn load_models(config: &Config) -> helmsman::Result<Models> {
    use helmsman::voice::{VoskKeywordClassifier, VoskRecognizerFactory, load_model};

    let model = load_model(&config.recognizer.model)?;
    let classifier =
        VoskKeywordClassifier::new(&model, config.audio.sample_rate, &config.wake.label)?;
    let factory = VoskRecognizerFactory::new(model, config.audio.sample_rate);
    Ok((Box::new(classifier), Box::new(factory)))
}

#[cfg(not(feature = "vosk"))]
fn load_models(_config: &Config) -> helmsman::Result<Models> {
    Err(helmsman::Error::Model(
        "built without the `vosk` feature, no recognizer available".to_string(),
    ))
}

fn open_source(audio: &AudioConfig) -> helmsman::Result<Box<dyn AudioSource>> {
    if let Some(path) = &audio.input_wav {
        tracing::info!(path = %path.display(), "replaying audio file");
        return Ok(Box::new(WavSource::open(path, audio.sample_rate)?));
    }
    open_microphone(audio)
}

#[cfg(feature = "microphone")]
fn open_microphone(audio: &AudioConfig) -> helmsman::Result<Box<dyn AudioSource>> {
    use helmsman::voice::{MicrophoneSource, open_with_retry};

    let device = audio.device.as_deref();
    let source = open_with_retry(
        || MicrophoneSource::open(device, audio.sample_rate),
        audio.open_attempts,
        audio.open_retry_delay,
    )?;
    Ok(Box::new(source))
}

#[cfg(not(feature = "microphone"))]
fn open_microphone(_audio: &AudioConfig) -> helmsman::Result<Box<dyn AudioSource>> {
    Err(helmsman::Error::Audio(
        "built without the `microphone` feature, use --input-wav".to_string(),
    ))
}

fn send_motor(config: &Config, duty: i32) -> anyhow::Result<()> {
    let mut client = ActuatorClient::new(can::open_transport(&config.can)?);
    let ack = client.send_motor(duty)?;
    println!("{}", ack.frame);
    Ok(())
}

fn send_tail(config: &Config, centi_degrees: i32) -> anyhow::Result<()> {
    let mut client = ActuatorClient::new(can::open_transport(&config.can)?);
    let ack = client.send_tail(centi_degrees)?;
    println!("{}", ack.frame);
    Ok(())
}

fn print_grammar() -> anyhow::Result<()> {
    println!("{}", CommandGrammar::standard().to_json()?);
    Ok(())
}

#[cfg(target_os = "linux")]
fn monitor(config: &Config, count: Option<u64>) -> anyhow::Result<()> {
    use helmsman::can::SocketCanTransport;
    use helmsman::can::protocol::{self, ActuatorMessage};

    let mut socket = SocketCanTransport::open(&config.can.interface)?;
    tracing::info!(interface = socket.interface(), "monitoring CAN traffic");

    let mut received = 0u64;
    while count.is_none_or(|limit| received < limit) {
        let frame = socket.receive()?;
        received += 1;

        match protocol::decode(&frame) {
            Ok(ActuatorMessage::Motor(m)) => tracing::info!(
                %frame,
                duty = m.duty_percent,
                soft_start = m.soft_start_percent,
                flags = m.flags.bits(),
                "motor"
            ),
            Ok(ActuatorMessage::Tail(t)) => tracing::info!(
                %frame,
                degrees = f32::from(t.position) / 100.0,
                "tail"
            ),
            Err(e) => tracing::info!(%frame, reason = %e, "other"),
        }
    }

    Ok(())
}

#[cfg(not(target_os = "linux"))]
fn monitor(_config: &Config, _count: Option<u64>) -> anyhow::Result<()> {
    anyhow::bail!("CAN monitoring needs SocketCAN, which is only available on Linux")
}

/// Test audio input
fn test_mic(audio: &AudioConfig, duration: u64) -> anyhow::Result<()> {
    println!("Testing audio input for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut source = open_source(audio)?;
    let chunk = usize::try_from(audio.sample_rate / 10)?.max(2);
    println!("Sample rate: {} Hz", audio.sample_rate);
    println!("---");

    let started = Instant::now();
    let mut rejected = 0u64;
    while started.elapsed().as_secs() < duration {
        let samples = match source.read_frame(chunk) {
            Ok(samples) => samples,
            Err(helmsman::Error::EndOfInput) => break,
            Err(e) => return Err(e.into()),
        };

        let valid = filter::is_valid(&samples);
        if !valid {
            rejected += 1;
        }
        let energy = calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:5.1}s] RMS: {energy:.4} | Peak: {peak:.4} | [{meter}]{}",
            started.elapsed().as_secs_f32(),
            if valid { "" } else { " flat" }
        );
    }

    println!("\n---");
    if rejected > 0 {
        println!("{rejected} chunk(s) were flat and would be dropped by the pipeline.");
        println!("A constant signal usually means a disconnected or muted input.");
    } else {
        println!("If you saw movement in the meter, your input is working!");
    }
    Ok(())
}

/// Calculate RMS (root mean square) energy of audio samples
#[allow(clippy::cast_precision_loss)]
fn calculate_rms(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f32 = samples.iter().map(|s| s * s).sum();
    (sum / samples.len() as f32).sqrt()
}
