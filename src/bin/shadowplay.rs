use std::{
    fs,
    path::{Path, PathBuf},
    time::{Duration, Instant},
};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use shadowplay::{
    ConfigOverrides, Control, Engine, EosPolicy, FilterKind, OpenOptions, SessionState,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "shadowplay", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Probe the host and print the hardware profile as JSON.
    Probe,
    /// Print the resolved pipeline configuration as JSON.
    Config(ConfigArgs),
    /// Play a URI and print session events as JSON lines.
    Play(PlayArgs),
}

#[derive(Parser, Debug)]
struct ConfigArgs {
    /// JSON file with configuration overrides.
    #[arg(long)]
    overrides: Option<PathBuf>,
}

#[derive(Parser, Debug)]
struct PlayArgs {
    /// URI to play (`file://...`, a plain path, or `test://av?duration_ms=3000`).
    uri: String,

    /// JSON file with configuration overrides.
    #[arg(long)]
    overrides: Option<PathBuf>,

    /// Equalizer preset; enables the equalizer filter.
    #[arg(long)]
    eq: Option<String>,

    /// Seek to this position (milliseconds) once playing.
    #[arg(long)]
    seek_ms: Option<u64>,

    /// Switch to an equalizer backend after this many milliseconds of playback.
    #[arg(long)]
    switch_eq_after_ms: Option<u64>,

    /// Loop instead of stopping at end of stream.
    #[arg(long = "loop")]
    looping: bool,

    /// Give up after this many milliseconds.
    #[arg(long, default_value_t = 60_000)]
    timeout_ms: u64,
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.cmd {
        Command::Probe => cmd_probe(),
        Command::Config(args) => cmd_config(args),
        Command::Play(args) => cmd_play(args),
    }
}

fn read_overrides(path: Option<&Path>) -> anyhow::Result<ConfigOverrides> {
    let Some(path) = path else {
        return Ok(ConfigOverrides::default());
    };
    let text = fs::read_to_string(path)
        .with_context(|| format!("read overrides '{}'", path.display()))?;
    ConfigOverrides::from_json(&text).with_context(|| "parse overrides JSON")
}

fn cmd_probe() -> anyhow::Result<()> {
    let profile = shadowplay::probe_hardware();
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(())
}

fn cmd_config(args: ConfigArgs) -> anyhow::Result<()> {
    let overrides = read_overrides(args.overrides.as_deref())?;
    let profile = shadowplay::shared_profile();
    let config = shadowplay::resolve_config(&profile, &overrides);
    println!("{}", serde_json::to_string_pretty(&config)?);
    Ok(())
}

fn cmd_play(args: PlayArgs) -> anyhow::Result<()> {
    let overrides = read_overrides(args.overrides.as_deref())?;
    let profile = shadowplay::shared_profile();
    let config = shadowplay::resolve_config(&profile, &overrides);

    let mut filters = config.filters.clone();
    if args.eq.is_some() && !filters.contains(&FilterKind::Equalizer) {
        filters.push(FilterKind::Equalizer);
    }
    let engine = Engine::new();
    let session = engine.open(
        &args.uri,
        &config,
        OpenOptions {
            filters: Some(filters),
            eos_policy: args.looping.then_some(EosPolicy::Loop),
            autoplay: true,
            ..OpenOptions::default()
        },
    )?;
    if let Some(preset) = &args.eq {
        session.apply_equalizer_preset(preset)?;
    }

    let deadline = Instant::now() + Duration::from_millis(args.timeout_ms);
    let mut playing_since: Option<Instant> = None;
    let mut seek = args.seek_ms.map(Duration::from_millis);
    let mut switch_after = args.switch_eq_after_ms.map(Duration::from_millis);

    while Instant::now() < deadline {
        if let Some(since) = playing_since {
            if let Some(pos) = seek.take() {
                session.control(Control::SeekTo(pos))?;
            }
            if let Some(after) = switch_after
                && since.elapsed() >= after
            {
                switch_after = None;
                session.switch_backend(&[FilterKind::Equalizer])?;
            }
        }

        let Ok(event) = session.events().recv_timeout(Duration::from_millis(20)) else {
            continue;
        };
        println!("{}", serde_json::to_string(&event)?);
        match event.new_state() {
            Some(SessionState::Playing) if playing_since.is_none() => playing_since = Some(Instant::now()),
            Some(SessionState::Stopped) => break,
            Some(SessionState::Error) => {
                session.close();
                anyhow::bail!("playback failed");
            }
            _ => {}
        }
    }

    let snapshot = session.snapshot();
    eprintln!("{}", serde_json::to_string_pretty(&snapshot)?);
    session.close();
    Ok(())
}
