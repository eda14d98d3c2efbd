use clap::{Parser, Subcommand};
use clap_verbosity_flag::{Verbosity, WarnLevel};
use config::Interface;
use std::path::{Path, PathBuf};

/// damo: control DAMON, the Linux data access monitor
///
/// damo writes kdamonds, their monitoring contexts and DAMOS schemes to the
/// kernel through the sysfs or the debugfs interface, turns them on and off,
/// and reads back live scheme statistics.
#[derive(Debug, Parser, Clone)]
#[command(about, long_about, version)]
pub struct Cli {
    /// Path to configuration file.
    ///
    /// If not provided, the default locations are checked. They are
    /// `/etc/damo/config.toml` and `/etc/damo/config.d/*.toml`, where the
    /// latter being a glob pattern. If they don't exist, the default
    /// configuration is used.
    #[arg(short, long, value_parser = validate_file)]
    pub conffile: Option<PathBuf>,

    /// Kernel interface to use, overriding the configuration.
    #[arg(long, value_parser = parse_interface)]
    pub damon_interface: Option<Interface>,

    #[command(flatten)]
    pub verbosity: Verbosity<WarnLevel>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Show the kdamonds the kernel currently holds.
    Status {
        /// Also show each kdamond's contexts and schemes.
        #[arg(short, long)]
        detail: bool,
    },

    /// Apply the kdamonds of a TOML file and turn them on.
    Start {
        /// Kdamonds file, as written by `damo dump`.
        #[arg(value_parser = validate_file)]
        kdamonds: PathBuf,

        /// Give up waiting for the kdamonds after this many milliseconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Turn kdamonds off.
    Stop {
        /// Names of the kdamonds. All running kdamonds when empty.
        names: Vec<String>,

        /// Give up waiting for the kdamonds after this many milliseconds.
        #[arg(long)]
        timeout: Option<u64>,
    },

    /// Update running kdamonds with the inputs of a TOML file.
    Commit {
        #[arg(value_parser = validate_file)]
        kdamonds: PathBuf,
    },

    /// Show the statistics of every scheme.
    Stats {
        /// Names of the kdamonds. All kdamonds when empty.
        names: Vec<String>,
    },

    /// Show the regions every scheme was last tried on.
    TriedRegions {
        /// Names of the kdamonds. All kdamonds when empty.
        names: Vec<String>,
    },

    /// Show which optional DAMON features the kernel supports.
    Features,

    /// Write the current kdamonds in the format `start` reads.
    Dump {
        /// Dump the raw control files instead.
        #[arg(long)]
        raw: bool,

        /// Output file. Standard output when absent.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

/// Check if the file exists.
#[inline(always)]
fn validate_file(file: &str) -> Result<PathBuf, String> {
    let path = Path::new(file);
    if path.exists() {
        Ok(path.to_owned())
    } else {
        Err(format!("File not found: {:?}", path))
    }
}

#[inline(always)]
fn parse_interface(name: &str) -> Result<Interface, String> {
    name.parse().map_err(|err: config::Error| err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn interface_candidates() -> impl Strategy<Value = String> {
        prop_oneof![
            2 => prop_oneof![Just("auto"), Just("sysfs"), Just("debugfs")].prop_map(String::from),
            1 => "[a-z]{0,8}",
            1 => ".*",
        ]
    }

    proptest! {
        #[test]
        fn test_parse_interface(name in interface_candidates()) {
            match parse_interface(&name) {
                Ok(interface) => prop_assert_eq!(interface.as_str(), name.trim()),
                Err(err) => prop_assert!(err.starts_with("Invalid DAMON interface")),
            }
        }
    }

    #[test]
    fn missing_file_is_rejected() {
        let err = validate_file("/nonexistent/damo/kdamonds.toml").unwrap_err();
        assert!(err.starts_with("File not found"));
    }

    #[test]
    fn stop_takes_any_number_of_names() {
        let cli = Cli::try_parse_from(["damo", "-vv", "stop", "0", "1"]).unwrap();
        match cli.command {
            Command::Stop { names, timeout } => {
                assert_eq!(names, ["0", "1"]);
                assert_eq!(timeout, None);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn interface_override() {
        let cli =
            Cli::try_parse_from(["damo", "--damon-interface", "debugfs", "features"]).unwrap();
        assert_eq!(cli.damon_interface, Some(Interface::Debugfs));
        assert!(matches!(cli.command, Command::Features));
    }
}
