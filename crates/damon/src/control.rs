#![forbid(unsafe_code)]

use crate::backend::{Backend, DebugfsBackend, SysfsBackend, fs};
use crate::clock::{Clock, SystemClock};
use crate::error::Error;
use crate::features::{Feature, FeatureSet};
use crate::kvpairs::KvMap;
use crate::model::{Kdamond, KdamondState};
use config::Interface;
use std::borrow::Cow;
use std::sync::OnceLock;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, trace, warn};

static CONTROL: OnceLock<DamonControl> = OnceLock::new();

/// How to wait for kdamonds to reach a requested state.
#[derive(Debug, Clone)]
pub struct WaitOptions {
    pub interval: Duration,
    /// Unset waits forever.
    pub timeout: Option<Duration>,
    pub cancel: Option<CancellationToken>,
}

impl Default for WaitOptions {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(1),
            timeout: None,
            cancel: None,
        }
    }
}

impl WaitOptions {
    pub fn from_config(config: &config::Damon) -> Self {
        Self {
            interval: config.poll_interval,
            timeout: config.poll_timeout,
            cancel: None,
        }
    }

    pub fn with_cancel(mut self, cancel: CancellationToken) -> Self {
        self.cancel = Some(cancel);
        self
    }
}

/// Entry point for controlling DAMON through one kernel interface.
pub struct DamonControl {
    backend: Box<dyn Backend>,
    features: FeatureSet,
    wait: WaitOptions,
    clock: Box<dyn Clock + Send + Sync>,
}

impl DamonControl {
    /// Select the kernel interface `config` asks for and probe its features.
    /// With [`Interface::Auto`], sysfs is used when present.
    pub fn initialize(config: &config::Damon) -> Result<Self, Error> {
        let sysfs = SysfsBackend::new(&config.sysfs_root);
        let backend: Box<dyn Backend> = match config.interface {
            Interface::Sysfs => Box::new(sysfs),
            Interface::Debugfs => Box::new(DebugfsBackend::new(&config.debugfs_root)),
            Interface::Auto if sysfs.is_available() => Box::new(sysfs),
            Interface::Auto => Box::new(DebugfsBackend::new(&config.debugfs_root)),
        };
        info!(
            interface = %backend.interface(),
            root = %backend.root().display(),
            "selected DAMON interface"
        );
        Self::with_backend(
            backend,
            Box::new(SystemClock),
            WaitOptions::from_config(config),
        )
    }

    pub fn with_backend(
        backend: Box<dyn Backend>,
        clock: Box<dyn Clock + Send + Sync>,
        wait: WaitOptions,
    ) -> Result<Self, Error> {
        let features = backend
            .probe_features()
            .map_err(|e| Error::Initialization(Box::new(e)))?;
        info!(
            features = ?features.iter().map(|f| f.as_str()).collect::<Vec<_>>(),
            "probed DAMON features"
        );
        Ok(Self {
            backend,
            features,
            wait,
            clock,
        })
    }

    pub fn interface(&self) -> Interface {
        self.backend.interface()
    }

    pub fn backend(&self) -> &dyn Backend {
        self.backend.as_ref()
    }

    pub fn features(&self) -> &FeatureSet {
        &self.features
    }

    /// Unknown feature names are reported as unsupported.
    pub fn feature_supported(&self, name: &str) -> bool {
        self.features.supported(name)
    }

    pub fn wait_options(&self) -> &WaitOptions {
        &self.wait
    }

    /// Raw dump of the interface's control files.
    pub fn read_damon_fs(&self) -> Result<KvMap, Error> {
        fs::read_tree(self.backend.root())
    }

    pub fn write_damon_fs(&self, tree: &KvMap) -> Result<(), Error> {
        fs::write_tree(self.backend.root(), tree)
    }

    pub fn current_kdamonds(&self) -> Result<Vec<Kdamond>, Error> {
        self.backend.current_kdamonds()
    }

    pub fn current_kdamond_names(&self) -> Result<Vec<String>, Error> {
        self.backend.current_kdamond_names()
    }

    pub fn is_kdamond_running(&self, name: &str) -> Result<bool, Error> {
        self.backend.is_kdamond_running(name)
    }

    pub fn any_kdamond_running(&self) -> Result<bool, Error> {
        for name in self.current_kdamond_names()? {
            if self.is_kdamond_running(&name)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    pub fn every_kdamond_turned_off(&self) -> Result<bool, Error> {
        Ok(!self.any_kdamond_running()?)
    }

    pub fn apply_kdamonds(&self, kdamonds: &[Kdamond]) -> Result<(), Error> {
        self.backend.apply_kdamonds(&self.supported_inputs(kdamonds))
    }

    /// Update running kdamonds without turning them off. Not available on
    /// debugfs.
    pub fn commit_inputs(&self, kdamonds: &[Kdamond]) -> Result<(), Error> {
        self.backend.commit_inputs(&self.supported_inputs(kdamonds))
    }

    /// Drop scheme filters when the kernel cannot take them.
    fn supported_inputs<'a>(&self, kdamonds: &'a [Kdamond]) -> Cow<'a, [Kdamond]> {
        let has_filters = kdamonds
            .iter()
            .flat_map(|kdamond| &kdamond.contexts)
            .flat_map(|ctx| &ctx.schemes)
            .any(|scheme| !scheme.filters.is_empty());
        if !has_filters || self.features.is_supported(Feature::SchemesFilters) {
            return Cow::Borrowed(kdamonds);
        }

        warn!(
            interface = %self.interface(),
            "kernel does not support scheme filters, ignoring them"
        );
        let mut stripped = kdamonds.to_vec();
        for scheme in stripped
            .iter_mut()
            .flat_map(|kdamond| &mut kdamond.contexts)
            .flat_map(|ctx| &mut ctx.schemes)
        {
            scheme.filters.clear();
        }
        Cow::Owned(stripped)
    }

    /// Turn kdamonds `names` on or off and block until the kernel reports
    /// the new state, polling as configured at initialization.
    pub fn turn_damon(&self, state: KdamondState, names: &[String]) -> Result<(), Error> {
        self.turn_damon_with(state, names, &self.wait)
    }

    pub fn turn_damon_with(
        &self,
        state: KdamondState,
        names: &[String],
        wait: &WaitOptions,
    ) -> Result<(), Error> {
        self.backend.turn_damon(state, names)?;
        self.wait_kdamonds_turned(state, names, wait)
    }

    /// Poll until every kdamond in `names` is `state`.
    pub fn wait_kdamonds_turned(
        &self,
        state: KdamondState,
        names: &[String],
        wait: &WaitOptions,
    ) -> Result<(), Error> {
        let start = self.clock.now();
        for (idx, name) in names.iter().enumerate() {
            loop {
                let running = self.backend.is_kdamond_running(name)?;
                trace!(kdamond = %name, running, "polled kdamond");
                if running == state.is_on() {
                    break;
                }
                if wait.cancel.as_ref().is_some_and(|c| c.is_cancelled()) {
                    return Err(Error::Cancelled(state));
                }
                let elapsed = self.clock.now().saturating_duration_since(start);
                if let Some(timeout) = wait.timeout
                    && elapsed >= timeout
                {
                    return Err(Error::Timeout {
                        names: names[idx..].to_vec(),
                        state,
                        elapsed,
                    });
                }
                self.clock.sleep(wait.interval);
            }
        }
        info!(kdamonds = ?names, %state, "kdamonds turned");
        Ok(())
    }

    /// Refresh the statistics of every scheme of `kdamond` from the kernel.
    pub fn update_schemes_stats(&self, kdamond: &mut Kdamond) -> Result<(), Error> {
        let stats = self.backend.update_schemes_stats(&kdamond.name)?;
        check_shape(kdamond, stats.iter().map(Vec::len));
        for (ctx, ctx_stats) in kdamond.contexts.iter_mut().zip(stats) {
            for (scheme, stats) in ctx.schemes.iter_mut().zip(ctx_stats) {
                scheme.stats = Some(stats);
            }
        }
        Ok(())
    }

    /// Refresh the regions every scheme of `kdamond` was last tried on.
    /// Fails with [`Error::Unsupported`] on debugfs.
    pub fn update_schemes_tried_regions(&self, kdamond: &mut Kdamond) -> Result<(), Error> {
        let tried = self.backend.update_schemes_tried_regions(&kdamond.name)?;
        check_shape(kdamond, tried.iter().map(Vec::len));
        for (ctx, ctx_tried) in kdamond.contexts.iter_mut().zip(tried) {
            for (scheme, regions) in ctx.schemes.iter_mut().zip(ctx_tried) {
                scheme.tried_regions = Some(regions);
            }
        }
        Ok(())
    }

    /// Re-read the state and pid of `kdamond`.
    pub fn refresh_kdamond(&self, kdamond: &mut Kdamond) -> Result<(), Error> {
        kdamond.state = KdamondState::from(self.backend.is_kdamond_running(&kdamond.name)?);
        kdamond.pid = if kdamond.state.is_on() {
            self.backend.kdamond_pid(&kdamond.name)?
        } else {
            None
        };
        Ok(())
    }
}

/// Warn when the kernel reports a different number of contexts or schemes
/// than `kdamond` holds. Only the common prefix gets refreshed.
fn check_shape(kdamond: &Kdamond, nr_schemes: impl ExactSizeIterator<Item = usize>) {
    let held: Vec<usize> = kdamond.contexts.iter().map(|ctx| ctx.schemes.len()).collect();
    let reported: Vec<usize> = nr_schemes.collect();
    if held != reported {
        warn!(
            kdamond = %kdamond.name,
            ?held,
            ?reported,
            "kernel schemes differ from the held kdamond"
        );
    }
}

/// Initialize DAMON control once per process. Later calls return the first
/// instance whatever `config` they pass.
pub fn ensure_initialized(config: &config::Damon) -> Result<&'static DamonControl, Error> {
    if let Some(control) = CONTROL.get() {
        return Ok(control);
    }
    let control = DamonControl::initialize(config)?;
    Ok(CONTROL.get_or_init(|| control))
}

pub fn ensure_root_permission() -> Result<(), Error> {
    if !nix::unistd::geteuid().is_root() {
        return Err(Error::PermissionDenied);
    }
    Ok(())
}
