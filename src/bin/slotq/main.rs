//! Interactive producer/consumer session over a shared slot queue
//!
//! The parent process adds items, a forked child removes items, and the
//! parent reports the queue after joining the child.

mod prompt;

use clap::Parser;
use env_logger::Env;
use log::info;
use prompt::PromptCollaborator;
use slotq::config::{SegmentConfig, SegmentKey, DEFAULT_KEY};
use slotq::coordinator::{Collaborator, TurnCoordinator};
use slotq::segment::SharedSegment;
use slotq::spawn::{ForkSpawner, Spawner, ThreadSpawner};
use slotq::Result;

#[derive(Parser)]
#[command(name = "slotq", version, about = "Shared-memory producer/consumer turns")]
struct Args {
    /// Key of the shared segment
    #[arg(long, default_value_t = DEFAULT_KEY)]
    key: u32,

    /// Octal permission bits of a newly created segment
    #[arg(long, default_value = "666", value_parser = parse_mode)]
    mode: u32,

    /// Remove a segment left behind by an earlier run before starting
    #[arg(long)]
    reset: bool,

    /// Run the consumer on a thread instead of a forked process
    #[arg(long)]
    in_process: bool,
}

fn parse_mode(s: &str) -> std::result::Result<u32, String> {
    u32::from_str_radix(s.trim_start_matches("0o"), 8)
        .map_err(|e| format!("invalid octal mode '{}': {}", s, e))
}

fn run<S, C>(config: &SegmentConfig, spawner: S, collab: &mut C) -> Result<()>
where
    S: Spawner,
    C: Collaborator + Send,
{
    TurnCoordinator::start(config, spawner, collab)?.run(collab)
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("warn")).init();
    let args = Args::parse();

    let config = SegmentConfig {
        key: SegmentKey(args.key),
        mode: args.mode,
    };

    if args.reset {
        match SharedSegment::remove_stale(&config) {
            Ok(true) => info!("Removed stale segment {}", config.key),
            Ok(false) => {}
            Err(e) => {
                eprintln!("[slotq] {}", e);
                std::process::exit(1);
            }
        }
    }

    let mut collab = PromptCollaborator::stdio();
    let result = if args.in_process {
        run(&config, ThreadSpawner::new(), &mut collab)
    } else {
        run(&config, ForkSpawner, &mut collab)
    };

    if let Err(e) = result {
        eprintln!("[slotq] {}", e);
        std::process::exit(1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_mode() {
        assert_eq!(parse_mode("666").unwrap(), 0o666);
        assert_eq!(parse_mode("0o600").unwrap(), 0o600);
        assert!(parse_mode("9").is_err());
    }

    #[test]
    fn test_args_defaults() {
        let args = Args::parse_from(["slotq"]);
        assert_eq!(args.key, 123456);
        assert_eq!(args.mode, 0o666);
        assert!(!args.reset);
        assert!(!args.in_process);
    }

    #[test]
    fn test_args_flags() {
        let args = Args::parse_from([
            "slotq",
            "--key",
            "9",
            "--mode",
            "600",
            "--reset",
            "--in-process",
        ]);
        assert_eq!(args.key, 9);
        assert_eq!(args.mode, 0o600);
        assert!(args.reset && args.in_process);
    }
}
