use clap::Parser;
use config::Config;
use damo::{
    cli::{Cli, Command},
    kdamonds, report,
};
use damon::{DamonControl, Error, Kdamond, KdamondState, WaitOptions};
use std::io::Write;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, trace};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // load config
    let mut config = match &cli.conffile {
        Some(path) => Config::load(path)?,
        _ => {
            let mut candidates = glob::glob("/etc/damo/config.d/*.toml")?
                .filter_map(Result::ok)
                .collect::<Vec<_>>();
            candidates.insert(0, "/etc/damo/config.toml".into());
            Config::load_multiple(candidates)?
        }
    };
    if let Some(interface) = cli.damon_interface {
        config.damon.interface = interface;
    }

    // NOTE: The verbosity flag takes precedence over the environment variable
    // for log control. For example, `DAMO_LOG=warn damo -vvv status` will
    // still log at the trace level. The environment variable (`DAMO_LOG`)
    // can only set the log level per crate, not override the verbosity flag.
    // Eg. `DAMO_LOG=damon=warn damo -vvv status` will log at the trace level
    // for all crates except `damon` which will log at the warn level.
    let mut env_filter = EnvFilter::builder()
        .with_env_var("DAMO_LOG")
        .from_env()?
        .add_directive(cli.verbosity.log_level_filter().as_str().parse()?);
    if config.damon.debug_damon {
        env_filter = env_filter.add_directive("damon=debug".parse()?);
    }

    let layer = tracing_subscriber::fmt::layer()
        .with_level(true)
        .with_file(false)
        .with_line_number(false);

    tracing_subscriber::registry()
        .with(layer)
        .with(env_filter)
        .init();
    debug!(?config, ?cli);

    damon::ensure_root_permission()?;
    let control = damon::ensure_initialized(&config.damon)?;
    let mut out = std::io::stdout().lock();

    match cli.command {
        Command::Status { detail } => {
            let kdamonds = control.current_kdamonds()?;
            writeln!(out, "{}", report::status(&kdamonds, detail))?;
        }
        Command::Start {
            kdamonds: path,
            timeout,
        } => {
            let kdamonds = kdamonds::load(&path)?;
            control.apply_kdamonds(&kdamonds)?;
            let names = names_of(&kdamonds);
            let wait = wait_options(control, timeout);
            control.turn_damon_with(KdamondState::On, &names, &wait)?;
            info!(kdamonds = ?names, "started");
        }
        Command::Stop { names, timeout } => {
            let names = if names.is_empty() {
                running_kdamond_names(control)?
            } else {
                names
            };
            let wait = wait_options(control, timeout);
            control.turn_damon_with(KdamondState::Off, &names, &wait)?;
            info!(kdamonds = ?names, "stopped");
        }
        Command::Commit { kdamonds: path } => {
            let kdamonds = kdamonds::load(&path)?;
            control.commit_inputs(&kdamonds)?;
            info!(kdamonds = ?names_of(&kdamonds), "committed");
        }
        Command::Stats { names } => {
            let mut kdamonds = select_kdamonds(control, &names)?;
            for kdamond in &mut kdamonds {
                control.update_schemes_stats(kdamond)?;
            }
            writeln!(out, "{}", report::stats(&kdamonds))?;
        }
        Command::TriedRegions { names } => {
            let mut kdamonds = select_kdamonds(control, &names)?;
            for kdamond in &mut kdamonds {
                control.update_schemes_tried_regions(kdamond)?;
            }
            writeln!(out, "{}", report::tried_regions(&kdamonds))?;
        }
        Command::Features => {
            writeln!(out, "{}", report::features(control.features()))?;
        }
        Command::Dump { raw, output } => {
            let text = if raw {
                toml_edit::ser::to_string_pretty(&control.read_damon_fs()?)?
            } else {
                kdamonds::to_string(&control.current_kdamonds()?)?
            };
            match output {
                Some(path) => write_output(&path, &text)?,
                None => out.write_all(text.as_bytes())?,
            }
        }
    }

    Ok(())
}

fn names_of(kdamonds: &[Kdamond]) -> Vec<String> {
    kdamonds.iter().map(|kdamond| kdamond.name.clone()).collect()
}

fn wait_options(control: &DamonControl, timeout_ms: Option<u64>) -> WaitOptions {
    let mut wait = control.wait_options().clone();
    if let Some(timeout_ms) = timeout_ms {
        wait.timeout = Some(Duration::from_millis(timeout_ms));
    }
    wait
}

fn running_kdamond_names(control: &DamonControl) -> Result<Vec<String>, Error> {
    let mut running = Vec::new();
    for name in control.current_kdamond_names()? {
        if control.is_kdamond_running(&name)? {
            running.push(name);
        }
    }
    trace!(?running, "running kdamonds");
    Ok(running)
}

/// Current kdamonds named `names`, in that order. Every kdamond when empty.
fn select_kdamonds(control: &DamonControl, names: &[String]) -> Result<Vec<Kdamond>, Error> {
    let mut current = control.current_kdamonds()?;
    if names.is_empty() {
        return Ok(current);
    }
    names
        .iter()
        .map(|name| {
            let idx = current
                .iter()
                .position(|kdamond| &kdamond.name == name)
                .ok_or_else(|| Error::NoSuchKdamond(name.clone()))?;
            Ok::<_, Error>(current.swap_remove(idx))
        })
        .collect()
}

fn write_output(path: &Path, text: &str) -> anyhow::Result<()> {
    std::fs::write(path, text)?;
    debug!(path = %path.display(), "dumped");
    Ok(())
}
