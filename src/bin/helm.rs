/**
 * Helm Binary
 *
 * Loads a mission, connects to the low level controller over a serial
 * port and runs the arbitration loop. Stdin doubles as the mission state
 * control surface.
 *
 * Usage: helm --mission mission.toml --port /dev/ttyACM0
 */

use std::io::{self, BufRead, Write};
use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use tracing::{error, info};

use auv_helm::logging::{self, LogFormat};
use auv_helm::{BehaviorFactory, Helm, HelmError, Mission, SerialLink, Shutdown, StateControl, TopicRegistry};

#[derive(Parser)]
#[command(name = "helm")]
#[command(version, about = "Mission execution helm: behavior arbitration for the low level controller", long_about = None)]
struct Cli {
    /// Path to the mission file
    #[arg(short, long, default_value = "mission.toml")]
    mission: String,

    /// Serial port of the low level controller
    #[arg(short, long, default_value = "/dev/ttyACM0")]
    port: String,

    #[arg(short, long, default_value_t = 115200)]
    baud: u32,

    /// Seconds between control mode queries while the controller is unreachable
    #[arg(long, default_value_t = 5.0)]
    mode_retry: f64,

    /// Seconds to wait for the controller to answer a single query
    #[arg(long, default_value_t = 1.0)]
    reply_timeout: f64,

    /// Log level, overrides the mission file (trace, debug, info, warn, error)
    #[arg(long)]
    log_level: Option<String>,

    /// Log format, overrides the mission file (pretty, compact, json)
    #[arg(long)]
    log_format: Option<LogFormat>,

    /// Load the mission and build every behavior, then exit
    #[arg(long)]
    validate: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let mission = match Mission::load(&cli.mission) {
        Ok(mission) => mission,
        Err(e) => {
            eprintln!("failed to load mission {}: {}", cli.mission, e);
            return ExitCode::FAILURE;
        }
    };

    let mut log_config = mission.logging.clone();
    if let Some(level) = &cli.log_level {
        log_config.level = level.clone();
    }
    if let Some(format) = &cli.log_format {
        log_config.format = format.clone();
    }
    logging::init(&log_config);

    match run(&cli, &mission) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) if e.is_configuration() => {
            error!(error = %e, mission = %cli.mission, "mission rejected");
            ExitCode::from(2)
        }
        Err(e) => {
            error!(error = %e, "helm aborted");
            ExitCode::FAILURE
        }
    }
}

const MIN_INTERVAL: f64 = 0.1;
const MAX_INTERVAL: f64 = 3600.0;

/// Seconds from the command line as a duration in [0.1 s, 1 h]. Values that
/// are not numbers fall back to the lower bound.
fn interval(seconds: f64) -> Duration {
    let seconds = if seconds.is_nan() {
        MIN_INTERVAL
    } else {
        seconds.clamp(MIN_INTERVAL, MAX_INTERVAL)
    };
    Duration::from_secs_f64(seconds)
}

fn run(cli: &Cli, mission: &Mission) -> Result<(), HelmError> {
    let bus = TopicRegistry::new();
    let mut helm = Helm::from_mission(mission, &BehaviorFactory::with_builtins(), &bus)?;

    if cli.validate {
        info!(mission = %cli.mission, "mission is valid");
        return Ok(());
    }

    let shutdown = Shutdown::new();
    shutdown.trigger_on_signals()?;
    spawn_console(helm.state_control(), shutdown.clone())?;

    let mut link = SerialLink::open(&cli.port, cli.baud, &bus)?.with_reply_timeout(interval(cli.reply_timeout));

    match helm.fetch_control_modes(&mut link, interval(cli.mode_retry), &shutdown) {
        Ok(()) => {}
        Err(HelmError::Shutdown) => {
            info!("shutdown before the controller answered");
            return Ok(());
        }
        Err(e) => return Err(e),
    }

    link.start_forwarding(Helm::subscribe_set_points(&bus))?;
    helm.run(&shutdown);
    link.shutdown();
    Ok(())
}

/// Line console over the mission state control surface. Detached: a blocked
/// stdin read must not hold up shutdown. EOF leaves the helm running.
fn spawn_console(states: StateControl, shutdown: Shutdown) -> Result<(), HelmError> {
    std::thread::Builder::new()
        .name("helm-console".into())
        .spawn(move || {
            println!("[Commands] state | states | goto <name> | quit");
            let stdin = io::stdin();
            for line in stdin.lock().lines() {
                let Ok(line) = line else { break };
                let mut words = line.split_whitespace();

                match (words.next(), words.next()) {
                    (Some("state"), None) => {
                        let state = states.active_state();
                        println!("[STATE] {} (mode {})", state.name, state.mode);
                    }
                    (Some("states"), None) => {
                        for state in states.states() {
                            let edges: Vec<_> = state.transitions.iter().map(String::as_str).collect();
                            println!("  {} mode={} -> [{}]", state.name, state.mode, edges.join(", "));
                        }
                    }
                    (Some("goto"), Some(name)) => {
                        if states.change_state(name) {
                            println!("[OK] {}", name);
                        } else {
                            println!("[REJECTED] {}", name);
                        }
                    }
                    (Some("quit" | "exit" | "x"), None) => {
                        println!("[SHUTDOWN]");
                        shutdown.trigger();
                        return;
                    }
                    (None, _) => {}
                    _ => println!("Unknown command: {}", line.trim()),
                }
                let _ = io::stdout().flush();
            }
        })?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_clamps_command_line_seconds() {
        assert_eq!(interval(5.0), Duration::from_secs(5));
        assert_eq!(interval(0.0), Duration::from_millis(100));
        assert_eq!(interval(-3.0), Duration::from_millis(100));
        assert_eq!(interval(f64::NAN), Duration::from_millis(100));
        assert_eq!(interval(f64::INFINITY), Duration::from_secs(3600));
        assert_eq!(interval(1e300), Duration::from_secs(3600));
    }
}
