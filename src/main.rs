use anyhow::{Context, Result};
use clap::Parser;
use std::io::{self, BufRead, Write};
use tonestack::audio_device;
use tonestack::audio_engine::command::AudioCommand;
use tonestack::settings;
use tonestack::AudioEngine;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "tonestack")]
#[command(about = "Real-time guitar effects, looper and recorder", long_about = None)]
struct Args {
    /// Input device name (default: host default)
    #[arg(short, long)]
    input: Option<String>,

    /// Output device name (default: host default)
    #[arg(short, long)]
    output: Option<String>,

    /// Audio host, e.g. ALSA or CoreAudio
    #[arg(long)]
    host: Option<String>,

    /// Sample rate in Hz
    #[arg(short, long)]
    sample_rate: Option<u32>,

    /// Buffer size in frames
    #[arg(short, long)]
    buffer_size: Option<u32>,

    /// Low-latency mode: fixed buffer, pitch shifting disabled
    #[arg(long)]
    exclusive: bool,

    /// List audio hosts and devices, then exit
    #[arg(long)]
    list_devices: bool,
}

fn list_devices() -> Result<()> {
    for host_name in audio_device::host_names() {
        let host_id = audio_device::host_id_from_name(Some(host_name))?;
        println!("{}", host_name);
        for (name, _) in audio_device::get_input_devices(host_id).unwrap_or_default() {
            println!("  in:  {}", name);
        }
        for (name, _) in audio_device::get_output_devices(host_id).unwrap_or_default() {
            println!("  out: {}", name);
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args = Args::parse();
    if args.list_devices {
        return list_devices();
    }

    let mut settings = settings::load_settings();
    if args.host.is_some() {
        settings.host_name = args.host;
    }
    if args.input.is_some() {
        settings.input_device = args.input;
    }
    if args.output.is_some() {
        settings.output_device = args.output;
    }
    if let Some(sr) = args.sample_rate {
        settings.sample_rate = sr;
    }
    if let Some(bs) = args.buffer_size {
        settings.buffer_size = bs;
    }
    settings.exclusive_mode |= args.exclusive;

    let mut engine = AudioEngine::new();
    if let Some(effects) = &settings.effects {
        engine.params().apply(effects);
    }
    engine.set_input_latency_compensation_ms(settings.input_latency_compensation_ms);
    engine
        .start(&settings.stream_request())
        .context("Failed to start audio engine")?;
    let clips_dir = settings.clips_dir()?;

    let stdin = io::stdin();
    let mut stdout = io::stdout();
    print!("> ");
    stdout.flush()?;
    for line in stdin.lock().lines() {
        let line = line?;
        if !line.trim().is_empty() {
            match line.parse::<AudioCommand>() {
                Ok(AudioCommand::Quit) => break,
                Ok(command) => match command.execute(&engine, &clips_dir) {
                    Ok(Some(reply)) => println!("{}", reply),
                    Ok(None) => {}
                    Err(e) => error!("{:#}", e),
                },
                Err(e) => println!("{}", e),
            }
        }
        print!("> ");
        stdout.flush()?;
    }

    engine.stop();
    settings.effects = Some(engine.params().snapshot());
    settings::save_settings(&settings);
    engine.recorder_mut().shutdown(false);
    info!("Bye");
    Ok(())
}
