use std::{error::Error, io::BufRead, path::PathBuf, thread, time::Duration};

use chrono::Utc;
use clap::{command, Parser, Subcommand};
use crossbeam_channel::{bounded, never, select, unbounded, Receiver};
use log::{error, info};
use ring_coordinator::{
    config::Config, platform::desktop, AlarmId, AlarmSpec, ButtonSet, Coordinator, Event,
    KillWarning, NotificationContent,
};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[clap(subcommand)]
    command: Command,
}
#[derive(Subcommand)]
enum Command {
    /// writes the default config
    Init {
        #[clap(long, short)]
        force: bool,
    },
    /// arms one alarm and stays around until it has rung
    Ring {
        sound: PathBuf,
        #[clap(long, default_value_t = 1)]
        id: AlarmId,
        /// seconds from now
        #[clap(long = "in", default_value_t = 0)]
        in_secs: u64,
        /// play the sound once instead of looping it
        #[clap(long)]
        once: bool,
        #[clap(long)]
        no_vibrate: bool,
        /// system volume to force while ringing, 0.0 to 1.0
        #[clap(long)]
        volume: Option<f32>,
        /// seconds to fade the sound in over
        #[clap(long, default_value_t = 0)]
        fade: u64,
        #[clap(long, default_value = "Alarm")]
        title: String,
        #[clap(long, default_value = "")]
        body: String,
        /// leave a notification behind if the process is killed before it rings
        #[clap(long)]
        warn_on_kill: bool,
    },
    /// prints and clears the actions recorded while nothing was listening
    History,
}

#[cfg(unix)]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigint = signal(SignalKind::interrupt())?;
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sigquit = signal(SignalKind::quit())?;

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {},
        _ = sigint.recv()  => {},
        _ = sigterm.recv() => {},
        _ = sigquit.recv() => {},
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() -> std::io::Result<()> {
    tokio::signal::ctrl_c().await
}

/// yields once when the process is asked to terminate
fn shutdown_signals() -> std::io::Result<Receiver<()>> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let (tx, rx) = bounded(1);
    thread::Builder::new()
        .name("signals".into())
        .spawn(move || match runtime.block_on(wait_for_shutdown_signal()) {
            Ok(()) => {
                let _ = tx.send(());
            }
            Err(e) => error!("couldn't listen for signals: {e}"),
        })?;
    Ok(rx)
}

fn stdin_lines() -> Receiver<String> {
    let (tx, rx) = unbounded();
    thread::spawn(move || {
        for line in std::io::stdin().lock().lines().map_while(Result::ok) {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    rx
}

fn main() -> Result<(), Box<dyn Error>> {
    // initilize the logger
    simple_file_logger::init_logger!("ring_coordinator").expect("couldn't initialize logger");

    let args = Args::parse();
    let config_path = Config::config_path()?;
    match args.command {
        Command::Init { force } => {
            if force || !Config::is_config_present() {
                Config::new().save(&config_path)?;
                println!("wrote {}", config_path.display());
            } else {
                println!("{} already exists, use --force", config_path.display());
            }
            Ok(())
        }
        Command::History => {
            let config = Config::load_or_default(&config_path)?;
            let platform = desktop::platform(&config)?;
            let coordinator = Coordinator::start(&config, &platform)?;
            for record in coordinator.drain_history()? {
                println!(
                    "{} alarm {}: {}",
                    record.timestamp, record.alarm_id, record.action
                );
            }
            Ok(())
        }
        Command::Ring {
            sound,
            id,
            in_secs,
            once,
            no_vibrate,
            volume,
            fade,
            title,
            body,
            warn_on_kill,
        } => {
            let config = Config::load_or_default(&config_path)?;
            let fire_at = Utc::now() + chrono::Duration::seconds(i64::try_from(in_secs)?);
            let mut notification = NotificationContent::new(title, body);
            notification.buttons = ButtonSet {
                stop: Some("Stop".into()),
                snooze: Some("Snooze".into()),
                confirm: None,
            };
            let mut spec = AlarmSpec::new(id, fire_at, sound, notification);
            spec.loop_audio = !once;
            spec.vibrate = !no_vibrate;
            spec.volume = volume;
            spec.fade_in = Duration::from_secs(fade);
            spec.warn_on_kill = warn_on_kill;
            ring(&config, spec)
        }
    }
}

fn ring(config: &Config, spec: AlarmSpec) -> Result<(), Box<dyn Error>> {
    let id = spec.id;
    let platform = desktop::platform(config)?;
    let coordinator = Coordinator::start(config, &platform)?;
    let events = coordinator.attach()?;
    if spec.warn_on_kill {
        let KillWarning { title, body } = config.kill_warning.clone();
        coordinator.set_warn_on_kill(title, body)?;
    }
    coordinator.arm(spec)?;
    info!("alarm {id} armed from the command line");
    println!("alarm {id} armed, type stop, snooze or confirm once it rings");

    let mut signals = shutdown_signals()?;
    let mut input = stdin_lines();
    loop {
        select! {
            recv(events) -> event => match event {
                Ok(Event::RingStarted { id }) => println!("alarm {id} is ringing"),
                Ok(Event::Stopped { id: stopped, action }) => {
                    println!("alarm {stopped}: {action}");
                    if stopped == id {
                        break;
                    }
                }
                Ok(Event::Replayed(record)) => println!(
                    "earlier, {}: alarm {} {}",
                    record.timestamp, record.alarm_id, record.action
                ),
                Ok(Event::RingFailed { id: failed, reason }) => {
                    println!("alarm {failed} couldn't ring: {reason}");
                    if failed == id {
                        break;
                    }
                }
                Err(_) => break,
            },
            recv(input) -> line => match line.as_deref().map(str::trim) {
                Ok("stop") => {
                    coordinator.stop(id)?;
                }
                Ok("snooze") => {
                    coordinator.snooze(id)?;
                }
                Ok("confirm") => {
                    coordinator.confirm(id)?;
                }
                Ok(other) => println!("unknown command {other:?}"),
                // stdin closed, keep waiting for the alarm
                Err(_) => input = never(),
            },
            recv(signals) -> signal => {
                if signal.is_err() {
                    signals = never();
                    continue;
                }
                if coordinator.teardown() {
                    println!("left a kill warning behind");
                }
                break;
            }
        }
    }
    Ok(())
}
