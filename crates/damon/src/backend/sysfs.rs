#![forbid(unsafe_code)]

//! The DAMON sysfs interface, a directory per kdamond, context, target and
//! scheme, with one file per attribute.

use super::Backend;
use super::fs::{numbered_dirs, read_file, read_value, write_file};
use crate::error::{DecodeError, Error};
use crate::features::{Feature, FeatureSet};
use crate::model::{
    Age, DamonCtx, DamonIntervals, DamonNrRegionsRange, DamonOps, DamonRegion, DamonTarget, Damos,
    DamosAccessPattern, DamosFilter, DamosQuotas, DamosStats, DamosTriedRegion, DamosWatermarks,
    FilterType, Kdamond, KdamondState, NrAccesses,
};
use config::Interface;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Features every kernel with the sysfs interface has.
const BASELINE_FEATURES: [Feature; 11] = [
    Feature::Schemes,
    Feature::InitRegions,
    Feature::Vaddr,
    Feature::Paddr,
    Feature::InitRegionsTargetIdx,
    Feature::SchemesSpeedLimit,
    Feature::SchemesQuotas,
    Feature::SchemesPrioritization,
    Feature::SchemesWmarks,
    Feature::SchemesStatSucc,
    Feature::SchemesStatQtExceed,
];

pub struct SysfsBackend {
    root: PathBuf,
}

impl SysfsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn kdamonds_dir(&self) -> PathBuf {
        self.root.join("kdamonds")
    }

    fn kdamond_dir(&self, name: &str) -> Result<PathBuf, Error> {
        let dir = self.kdamonds_dir().join(name);
        if !dir.is_dir() {
            return Err(Error::NoSuchKdamond(name.to_string()));
        }
        Ok(dir)
    }

    fn write_state(&self, name: &str, command: &str) -> Result<(), Error> {
        write_file(&self.kdamond_dir(name)?.join("state"), command)
    }

    fn read_kdamond(&self, name: &str) -> Result<Kdamond, Error> {
        let dir = self.kdamond_dir(name)?;
        let contexts_dir = dir.join("contexts");
        let contexts = (0..read_nr(&contexts_dir, "nr_contexts")?)
            .map(|idx| read_ctx(&contexts_dir.join(idx.to_string()), idx))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Kdamond {
            name: name.to_string(),
            state: read_value(&dir.join("state"))?,
            pid: read_pid(&dir.join("pid"))?,
            contexts,
        })
    }

    /// Directories of every scheme of kdamond `name`, per context.
    fn scheme_dirs(&self, name: &str) -> Result<Vec<Vec<PathBuf>>, Error> {
        let contexts_dir = self.kdamond_dir(name)?.join("contexts");
        (0..read_nr(&contexts_dir, "nr_contexts")?)
            .map(|ctx_idx| {
                let schemes_dir = contexts_dir.join(ctx_idx.to_string()).join("schemes");
                let nr_schemes = read_nr(&schemes_dir, "nr_schemes")?;
                Ok::<_, Error>(
                    (0..nr_schemes)
                        .map(|idx| schemes_dir.join(idx.to_string()))
                        .collect::<Vec<_>>(),
                )
            })
            .collect()
    }

    /// The first scheme directory of any existing kdamond.
    fn first_scheme_dir(&self) -> Result<Option<PathBuf>, Error> {
        for name in self.current_kdamond_names()? {
            if let Some(dir) = self.scheme_dirs(&name)?.into_iter().flatten().next() {
                return Ok(Some(dir));
            }
        }
        Ok(None)
    }
}

/// Create kdamond 0, its context 0 and that context's scheme 0 wherever they
/// are missing, returning the scheme directory. Counts already above zero
/// are left alone, as rewriting one rebuilds everything below it. The first
/// count raised from zero is stored in `raised` before it is written.
fn create_scratch_scheme(
    kdamonds_dir: &Path,
    raised: &mut Option<PathBuf>,
) -> Result<PathBuf, Error> {
    let mut dir = kdamonds_dir.to_path_buf();
    for (count, child) in [
        ("nr_kdamonds", Some("contexts")),
        ("nr_contexts", Some("schemes")),
        ("nr_schemes", None),
    ] {
        let count_file = dir.join(count);
        let nr = if count_file.exists() {
            read_nr(&dir, count)?
        } else {
            0
        };
        if nr == 0 {
            raised.get_or_insert(count_file);
            set_nr(&dir, count, 1)?;
        }
        dir = dir.join("0");
        if let Some(child) = child {
            dir = subdir(&dir, child)?;
        }
    }
    Ok(dir)
}

fn probe_scheme_dir(scheme_dir: &Path, features: &mut FeatureSet) -> Result<(), Error> {
    if let Some(ctx_dir) = scheme_dir.ancestors().nth(2) {
        let avail = ctx_dir.join("avail_operations");
        if avail.exists() {
            let ops = read_file(&avail)?;
            if ops.split_whitespace().any(|op| op == DamonOps::Fvaddr.as_str()) {
                features.insert(Feature::Fvaddr);
            }
        }
    }
    if scheme_dir.join("tried_regions").is_dir() {
        features.insert(Feature::SchemesTriedRegions);
    }
    if scheme_dir.join("filters").is_dir() {
        features.insert(Feature::SchemesFilters);
    }
    Ok(())
}

impl Backend for SysfsBackend {
    fn interface(&self) -> Interface {
        Interface::Sysfs
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn is_available(&self) -> bool {
        self.kdamonds_dir().join("nr_kdamonds").is_file()
    }

    fn probe_features(&self) -> Result<FeatureSet, Error> {
        let mut features = FeatureSet::new(BASELINE_FEATURES);
        if let Some(scheme_dir) = self.first_scheme_dir()? {
            probe_scheme_dir(&scheme_dir, &mut features)?;
            return Ok(features);
        }

        debug!("creating scratch scheme for feature probing");
        let mut raised = None;
        let probed = create_scratch_scheme(&self.kdamonds_dir(), &mut raised)
            .and_then(|scheme_dir| probe_scheme_dir(&scheme_dir, &mut features));
        if let Some(count_file) = &raised {
            write_file(count_file, "0")?;
        }
        if let Err(e) = probed {
            warn!(error = %e, "no scratch scheme, scheme filters and tried regions undetected");
        }
        Ok(features)
    }

    fn current_kdamonds(&self) -> Result<Vec<Kdamond>, Error> {
        self.current_kdamond_names()?
            .iter()
            .map(|name| self.read_kdamond(name))
            .collect()
    }

    fn current_kdamond_names(&self) -> Result<Vec<String>, Error> {
        Ok((0..read_nr(&self.kdamonds_dir(), "nr_kdamonds")?)
            .map(|idx| idx.to_string())
            .collect())
    }

    fn is_kdamond_running(&self, name: &str) -> Result<bool, Error> {
        let state: KdamondState = read_value(&self.kdamond_dir(name)?.join("state"))?;
        Ok(state.is_on())
    }

    fn kdamond_pid(&self, name: &str) -> Result<Option<u32>, Error> {
        read_pid(&self.kdamond_dir(name)?.join("pid"))
    }

    fn apply_kdamonds(&self, kdamonds: &[Kdamond]) -> Result<(), Error> {
        let kdamonds_dir = self.kdamonds_dir();
        set_nr(&kdamonds_dir, "nr_kdamonds", kdamonds.len())?;
        for (idx, kdamond) in kdamonds.iter().enumerate() {
            write_kdamond(&kdamonds_dir.join(idx.to_string()), kdamond)?;
        }
        info!(nr_kdamonds = kdamonds.len(), "applied kdamonds");
        Ok(())
    }

    fn commit_inputs(&self, kdamonds: &[Kdamond]) -> Result<(), Error> {
        for (idx, kdamond) in kdamonds.iter().enumerate() {
            let name = idx.to_string();
            write_kdamond(&self.kdamond_dir(&name)?, kdamond)?;
            self.write_state(&name, "commit")?;
        }
        info!(nr_kdamonds = kdamonds.len(), "committed inputs");
        Ok(())
    }

    fn update_schemes_stats(&self, name: &str) -> Result<Vec<Vec<DamosStats>>, Error> {
        self.write_state(name, "update_schemes_stats")?;
        self.scheme_dirs(name)?
            .iter()
            .map(|schemes| {
                schemes
                    .iter()
                    .map(|dir| read_stats(&dir.join("stats")))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    fn update_schemes_tried_regions(
        &self,
        name: &str,
    ) -> Result<Vec<Vec<Vec<DamosTriedRegion>>>, Error> {
        let scheme_dirs = self.scheme_dirs(name)?;
        let tried_dirs = scheme_dirs.iter().flatten().map(|dir| dir.join("tried_regions"));
        for dir in tried_dirs {
            if !dir.is_dir() {
                return Err(Error::Unsupported {
                    interface: self.interface(),
                    operation: "schemes tried regions",
                });
            }
        }
        self.write_state(name, "update_schemes_tried_regions")?;
        scheme_dirs
            .iter()
            .map(|schemes| {
                schemes
                    .iter()
                    .map(|dir| read_tried_regions(&dir.join("tried_regions")))
                    .collect::<Result<Vec<_>, _>>()
            })
            .collect()
    }

    fn turn_damon(&self, state: KdamondState, names: &[String]) -> Result<(), Error> {
        for name in names {
            self.write_state(name, state.as_str())?;
            info!(kdamond = %name, %state, "requested kdamond state");
        }
        Ok(())
    }
}

/// Return `dir/name`, creating it if missing. The kernel creates these
/// directories itself, so this only matters for plain directory trees.
fn subdir(dir: &Path, name: &str) -> Result<PathBuf, Error> {
    let path = dir.join(name);
    if !path.is_dir() {
        fs::create_dir_all(&path).map_err(|e| Error::kernel_io(&path, e))?;
    }
    Ok(path)
}

/// Write the count file `dir/file` and make sure its numbered entries exist.
fn set_nr(dir: &Path, file: &str, nr: usize) -> Result<(), Error> {
    write_file(&dir.join(file), &nr.to_string())?;
    for idx in 0..nr {
        subdir(dir, &idx.to_string())?;
    }
    Ok(())
}

fn read_nr(dir: &Path, file: &str) -> Result<usize, Error> {
    read_value(&dir.join(file))
}

/// The kernel reports -1 while the kdamond is off.
fn read_pid(path: &Path) -> Result<Option<u32>, Error> {
    let pid: i64 = read_value(path)?;
    Ok(u32::try_from(pid).ok().filter(|pid| *pid > 0))
}

fn write_num(dir: &Path, file: &str, value: u64) -> Result<(), Error> {
    write_file(&dir.join(file), &value.to_string())
}

fn write_min_max(dir: &Path, min: u64, max: u64) -> Result<(), Error> {
    write_num(dir, "min", min)?;
    write_num(dir, "max", max)
}

fn write_kdamond(dir: &Path, kdamond: &Kdamond) -> Result<(), Error> {
    let contexts_dir = subdir(dir, "contexts")?;
    set_nr(&contexts_dir, "nr_contexts", kdamond.contexts.len())?;
    for (idx, ctx) in kdamond.contexts.iter().enumerate() {
        write_ctx(&contexts_dir.join(idx.to_string()), ctx)?;
    }
    Ok(())
}

fn write_ctx(dir: &Path, ctx: &DamonCtx) -> Result<(), Error> {
    if ctx.record_request.is_some() {
        warn!(ctx = %ctx.name, "sysfs has no record feature, ignoring record request");
    }
    write_file(&dir.join("operations"), ctx.ops.as_str())?;

    let attrs_dir = subdir(dir, "monitoring_attrs")?;
    let intervals_dir = subdir(&attrs_dir, "intervals")?;
    write_num(&intervals_dir, "sample_us", ctx.intervals.sample)?;
    write_num(&intervals_dir, "aggr_us", ctx.intervals.aggr)?;
    write_num(&intervals_dir, "update_us", ctx.intervals.ops_update)?;
    let nr_regions_dir = subdir(&attrs_dir, "nr_regions")?;
    write_min_max(
        &nr_regions_dir,
        ctx.nr_regions.min_nr_regions,
        ctx.nr_regions.max_nr_regions,
    )?;

    let targets_dir = subdir(dir, "targets")?;
    set_nr(&targets_dir, "nr_targets", ctx.targets.len())?;
    for (idx, target) in ctx.targets.iter().enumerate() {
        write_target(&targets_dir.join(idx.to_string()), target, ctx.ops)?;
    }

    let schemes_dir = subdir(dir, "schemes")?;
    set_nr(&schemes_dir, "nr_schemes", ctx.schemes.len())?;
    for (idx, scheme) in ctx.schemes.iter().enumerate() {
        write_scheme(&schemes_dir.join(idx.to_string()), scheme, &ctx.intervals)?;
    }
    Ok(())
}

fn write_target(dir: &Path, target: &DamonTarget, ops: DamonOps) -> Result<(), Error> {
    if ops.has_pid() {
        let pid = target.pid.ok_or(DecodeError::MissingField {
            entity: "target",
            field: "pid",
        })?;
        write_num(dir, "pid_target", pid as u64)?;
    }
    let regions_dir = subdir(dir, "regions")?;
    set_nr(&regions_dir, "nr_regions", target.regions.len())?;
    for (idx, region) in target.regions.iter().enumerate() {
        let region_dir = regions_dir.join(idx.to_string());
        write_num(&region_dir, "start", region.start)?;
        write_num(&region_dir, "end", region.end)?;
    }
    Ok(())
}

fn write_scheme(dir: &Path, scheme: &Damos, intervals: &DamonIntervals) -> Result<(), Error> {
    write_file(&dir.join("action"), scheme.action.as_str())?;

    let pattern = scheme.access_pattern.to_kernel_units(intervals);
    let pattern_dir = subdir(dir, "access_pattern")?;
    write_min_max(
        &subdir(&pattern_dir, "sz")?,
        pattern.min_sz_bytes,
        pattern.max_sz_bytes,
    )?;
    write_min_max(
        &subdir(&pattern_dir, "nr_accesses")?,
        pattern.min_nr_accesses,
        pattern.max_nr_accesses,
    )?;
    write_min_max(&subdir(&pattern_dir, "age")?, pattern.min_age, pattern.max_age)?;

    let quotas = &scheme.quotas;
    let quotas_dir = subdir(dir, "quotas")?;
    write_num(&quotas_dir, "ms", quotas.time_ms)?;
    write_num(&quotas_dir, "bytes", quotas.sz_bytes)?;
    write_num(&quotas_dir, "reset_interval_ms", quotas.reset_interval_ms)?;
    let weights_dir = subdir(&quotas_dir, "weights")?;
    write_num(&weights_dir, "sz_permil", quotas.weight_sz_permil)?;
    write_num(&weights_dir, "nr_accesses_permil", quotas.weight_nr_accesses_permil)?;
    write_num(&weights_dir, "age_permil", quotas.weight_age_permil)?;

    let wmarks = &scheme.watermarks;
    let wmarks_dir = subdir(dir, "watermarks")?;
    write_file(&wmarks_dir.join("metric"), wmarks.metric.as_str())?;
    write_num(&wmarks_dir, "interval_us", wmarks.interval_us)?;
    write_num(&wmarks_dir, "high", wmarks.high_permil)?;
    write_num(&wmarks_dir, "mid", wmarks.mid_permil)?;
    write_num(&wmarks_dir, "low", wmarks.low_permil)?;

    // Kernels without filter support have no filters directory.
    let filters_dir = dir.join("filters");
    if scheme.filters.is_empty() && !filters_dir.is_dir() {
        return Ok(());
    }
    let filters_dir = subdir(dir, "filters")?;
    set_nr(&filters_dir, "nr_filters", scheme.filters.len())?;
    for (idx, filter) in scheme.filters.iter().enumerate() {
        let filter_dir = filters_dir.join(idx.to_string());
        write_file(&filter_dir.join("type"), filter.filter_type.as_str())?;
        if filter.filter_type == FilterType::Memcg {
            write_file(&filter_dir.join("memcg_path"), &filter.memcg_path)?;
        }
        write_file(&filter_dir.join("matching"), if filter.matching { "Y" } else { "N" })?;
    }
    Ok(())
}

fn read_min_max(dir: &Path) -> Result<(u64, u64), Error> {
    Ok((read_value(&dir.join("min"))?, read_value(&dir.join("max"))?))
}

fn read_ctx(dir: &Path, idx: usize) -> Result<DamonCtx, Error> {
    let ops: DamonOps = read_value(&dir.join("operations"))?;

    let intervals_dir = dir.join("monitoring_attrs/intervals");
    let intervals = DamonIntervals::from_us(
        read_value(&intervals_dir.join("sample_us"))?,
        read_value(&intervals_dir.join("aggr_us"))?,
        read_value(&intervals_dir.join("update_us"))?,
    );
    let (min_nr_regions, max_nr_regions) = read_min_max(&dir.join("monitoring_attrs/nr_regions"))?;
    let nr_regions = DamonNrRegionsRange {
        min_nr_regions,
        max_nr_regions,
    };

    let targets_dir = dir.join("targets");
    let targets = (0..read_nr(&targets_dir, "nr_targets")?)
        .map(|idx| read_target(&targets_dir.join(idx.to_string()), idx, ops))
        .collect::<Result<Vec<_>, _>>()?;

    let schemes_dir = dir.join("schemes");
    let schemes = (0..read_nr(&schemes_dir, "nr_schemes")?)
        .map(|idx| read_scheme(&schemes_dir.join(idx.to_string()), idx))
        .collect::<Result<Vec<_>, _>>()?;

    Ok(DamonCtx::new(
        idx.to_string(),
        intervals,
        nr_regions,
        ops,
        targets,
        schemes,
    ))
}

fn read_target(dir: &Path, idx: usize, ops: DamonOps) -> Result<DamonTarget, Error> {
    let pid = if ops.has_pid() {
        Some(read_value(&dir.join("pid_target"))?)
    } else {
        None
    };
    let regions_dir = dir.join("regions");
    let regions = (0..read_nr(&regions_dir, "nr_regions")?)
        .map(|idx| {
            let region_dir = regions_dir.join(idx.to_string());
            Ok(DamonRegion {
                start: read_value(&region_dir.join("start"))?,
                end: read_value(&region_dir.join("end"))?,
            })
        })
        .collect::<Result<Vec<_>, Error>>()?;
    Ok(DamonTarget::new(idx.to_string(), pid, regions))
}

fn read_scheme(dir: &Path, idx: usize) -> Result<Damos, Error> {
    let pattern_dir = dir.join("access_pattern");
    let (min_sz_bytes, max_sz_bytes) = read_min_max(&pattern_dir.join("sz"))?;
    let (min_nr_accesses, max_nr_accesses) = read_min_max(&pattern_dir.join("nr_accesses"))?;
    let (min_age, max_age) = read_min_max(&pattern_dir.join("age"))?;
    let access_pattern = DamosAccessPattern {
        min_sz_bytes,
        max_sz_bytes,
        nr_accesses: NrAccesses::SampleIntervals {
            min: min_nr_accesses,
            max: max_nr_accesses,
        },
        age: Age::AggrIntervals {
            min: min_age,
            max: max_age,
        },
    };

    let quotas_dir = dir.join("quotas");
    let weights_dir = quotas_dir.join("weights");
    let quotas = DamosQuotas {
        time_ms: read_value(&quotas_dir.join("ms"))?,
        sz_bytes: read_value(&quotas_dir.join("bytes"))?,
        reset_interval_ms: read_value(&quotas_dir.join("reset_interval_ms"))?,
        weight_sz_permil: read_value(&weights_dir.join("sz_permil"))?,
        weight_nr_accesses_permil: read_value(&weights_dir.join("nr_accesses_permil"))?,
        weight_age_permil: read_value(&weights_dir.join("age_permil"))?,
    };

    let wmarks_dir = dir.join("watermarks");
    let watermarks = DamosWatermarks {
        metric: read_value(&wmarks_dir.join("metric"))?,
        interval_us: read_value(&wmarks_dir.join("interval_us"))?,
        high_permil: read_value(&wmarks_dir.join("high"))?,
        mid_permil: read_value(&wmarks_dir.join("mid"))?,
        low_permil: read_value(&wmarks_dir.join("low"))?,
    };

    let filters_dir = dir.join("filters");
    let filters = if filters_dir.is_dir() {
        (0..read_nr(&filters_dir, "nr_filters")?)
            .map(|idx| read_filter(&filters_dir.join(idx.to_string()), idx))
            .collect::<Result<Vec<_>, _>>()?
    } else {
        Vec::new()
    };

    let mut scheme = Damos::new(
        idx.to_string(),
        access_pattern,
        read_value(&dir.join("action"))?,
        quotas,
        watermarks,
        filters,
    );
    let stats_dir = dir.join("stats");
    if stats_dir.is_dir() {
        scheme.stats = Some(read_stats(&stats_dir)?);
    }
    Ok(scheme)
}

fn read_filter(dir: &Path, idx: usize) -> Result<DamosFilter, Error> {
    let filter_type: FilterType = read_value(&dir.join("type"))?;
    let memcg_path = match filter_type {
        FilterType::Memcg => read_file(&dir.join("memcg_path"))?,
        FilterType::Anon => String::new(),
    };
    let matching_path = dir.join("matching");
    let matching = read_file(&matching_path)?;
    let matching = crate::model::text_to_bool(&matching)
        .map_err(|_| Error::kernel_data(&matching_path, matching))?;
    Ok(DamosFilter::new(idx.to_string(), filter_type, memcg_path, matching))
}

fn read_stats(dir: &Path) -> Result<DamosStats, Error> {
    Ok(DamosStats {
        nr_tried: read_value(&dir.join("nr_tried"))?,
        sz_tried: read_value(&dir.join("sz_tried"))?,
        nr_applied: read_value(&dir.join("nr_applied"))?,
        sz_applied: read_value(&dir.join("sz_applied"))?,
        qt_exceeds: read_value(&dir.join("qt_exceeds"))?,
    })
}

fn read_tried_regions(dir: &Path) -> Result<Vec<DamosTriedRegion>, Error> {
    numbered_dirs(dir)?
        .into_iter()
        .map(|name| {
            let region_dir = dir.join(name);
            Ok(DamosTriedRegion {
                start: read_value(&region_dir.join("start"))?,
                end: read_value(&region_dir.join("end"))?,
                nr_accesses: read_value(&region_dir.join("nr_accesses"))?,
                age: read_value(&region_dir.join("age"))?,
            })
        })
        .collect()
}
