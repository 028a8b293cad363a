//! `synthstream-tone`: stream a sine tone through a `StreamSession`.
//!
//! Plays on the default output device, or with `--wav` renders the pulled
//! audio through the virtual device into a 32-bit float WAV file.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context};
use serde::Serialize;
use synthstream_core::{
    CaptureBuffer, CpalBackend, DiagnosticsSnapshot, SineSource, StreamConfig, StreamSession,
    VirtualBackend,
};
use tracing::info;

#[derive(Debug)]
struct Args {
    config: Option<PathBuf>,
    seconds: f64,
    frequency: f64,
    amplitude: f32,
    device: Option<String>,
    wav: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Summary<'a> {
    backend: &'a str,
    config: &'a StreamConfig,
    seconds: f64,
    frequency: f64,
    amplitude: f32,
    wav: Option<String>,
    captured_samples: Option<usize>,
    diagnostics: DiagnosticsSnapshot,
}

const USAGE: &str = "Usage: synthstream-tone [--seconds <s>] [--frequency <hz>] \
[--amplitude <0..1>] [--config <stream.json>] [--device <name>] [--wav <out.wav>]";

fn parse_args() -> anyhow::Result<Args> {
    let mut args = Args {
        config: None,
        seconds: 2.0,
        frequency: 440.0,
        amplitude: 0.2,
        device: None,
        wav: None,
    };

    let mut it = std::env::args().skip(1);
    while let Some(arg) = it.next() {
        let mut value = |flag: &str| {
            it.next()
                .with_context(|| format!("missing value for {flag}"))
        };
        match arg.as_str() {
            "--config" => args.config = Some(PathBuf::from(value("--config")?)),
            "--seconds" => {
                args.seconds = value("--seconds")?
                    .parse()
                    .context("invalid value for --seconds")?;
                if !args.seconds.is_finite() || args.seconds <= 0.0 {
                    bail!("--seconds must be positive");
                }
            }
            "--frequency" => {
                args.frequency = value("--frequency")?
                    .parse()
                    .context("invalid value for --frequency")?;
            }
            "--amplitude" => {
                args.amplitude = value("--amplitude")?
                    .parse()
                    .context("invalid value for --amplitude")?;
            }
            "--device" => args.device = Some(value("--device")?),
            "--wav" => args.wav = Some(PathBuf::from(value("--wav")?)),
            "--help" | "-h" => {
                println!("{USAGE}");
                std::process::exit(0);
            }
            other => bail!("unknown argument: {other}\n{USAGE}"),
        }
    }
    Ok(args)
}

fn write_wav(path: &Path, config: &StreamConfig, samples: &[f32]) -> anyhow::Result<()> {
    let spec = hound::WavSpec {
        channels: config.channels,
        sample_rate: config.sample_rate,
        bits_per_sample: 32,
        sample_format: hound::SampleFormat::Float,
    };
    let mut writer = hound::WavWriter::create(path, spec)
        .with_context(|| format!("cannot create {}", path.display()))?;
    for sample in samples {
        writer.write_sample(*sample)?;
    }
    writer.finalize()?;
    Ok(())
}

fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("synthstream=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = parse_args()?;
    let config = match &args.config {
        Some(path) => StreamConfig::from_json_file(path)
            .with_context(|| format!("cannot load config {}", path.display()))?,
        None => StreamConfig::default(),
    };
    let duration = Duration::from_secs_f64(args.seconds);

    let capture = args.wav.as_ref().map(|_| {
        let frames = (args.seconds * config.sample_rate as f64).ceil() as usize;
        CaptureBuffer::with_limit(frames * config.channels as usize)
    });

    let mut session = match (&capture, &args.device) {
        (Some(capture), _) => StreamSession::new(
            config.clone(),
            VirtualBackend::new().capture_into(capture.clone()),
        ),
        (None, Some(device)) => {
            StreamSession::new(config.clone(), CpalBackend::with_device_name(device.clone()))
        }
        (None, None) => StreamSession::new(config.clone(), CpalBackend::new()),
    };

    session.open()?;
    session.start(SineSource::new(
        args.frequency,
        args.amplitude,
        config.sample_rate,
    ))?;
    info!(
        backend = session.backend_name(),
        frequency = args.frequency,
        seconds = args.seconds,
        "tone streaming"
    );

    let started = Instant::now();
    while started.elapsed() < duration {
        if capture.as_ref().is_some_and(CaptureBuffer::is_full) {
            break;
        }
        thread::sleep(Duration::from_millis(10));
    }
    session.stop()?;
    let diagnostics = session.diagnostics();

    let mut captured_samples = None;
    if let (Some(path), Some(capture)) = (&args.wav, &capture) {
        let samples = capture.take();
        write_wav(path, &config, &samples)?;
        info!(path = %path.display(), samples = samples.len(), "wav written");
        captured_samples = Some(samples.len());
    }

    let summary = Summary {
        backend: session.backend_name(),
        config: &config,
        seconds: args.seconds,
        frequency: args.frequency,
        amplitude: args.amplitude,
        wav: args.wav.as_ref().map(|p| p.display().to_string()),
        captured_samples,
        diagnostics,
    };
    println!("{}", serde_json::to_string_pretty(&summary)?);

    session.close()?;
    Ok(())
}
