#![forbid(unsafe_code)]

//! The legacy DAMON debugfs interface: a handful of flat files driving a
//! single kdamond with a single context.

use super::Backend;
use super::fs::{read_file, write_file};
use crate::error::{DecodeError, Error};
use crate::features::{Feature, FeatureSet};
use crate::model::{
    Age, DamonCtx, DamonIntervals, DamonNrRegionsRange, DamonOps, DamonRecord, DamonRegion,
    DamonTarget, Damos, DamosAccessPattern, DamosAction, DamosQuotas, DamosStats, DamosWatermarks,
    Kdamond, KdamondState, NrAccesses, WatermarkMetric,
};
use config::Interface;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// The only kdamond debugfs drives.
pub const KDAMOND_NAME: &str = "0";

/// Fields of a scheme line as written.
const NR_SCHEME_FIELDS: usize = 18;
/// Statistics appended to each scheme line when read back.
const NR_STAT_FIELDS: usize = 5;

/// The kernel reports the physical address space as this target id.
const PADDR_TARGET_ID: &str = "42";

/// Scheme line written while probing: nohugepage with quotas, weights and
/// watermarks all set.
const PROBE_SCHEME: &str = "1 2 3 4 5 6 4 10 4096 1000 1 2 3 1 100 300 200 100";

pub struct DebugfsBackend {
    root: PathBuf,
}

impl DebugfsBackend {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn file(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    fn check_name(name: &str) -> Result<(), Error> {
        if name != KDAMOND_NAME {
            return Err(Error::NoSuchKdamond(name.to_string()));
        }
        Ok(())
    }

    fn unsupported(operation: &'static str) -> Error {
        Error::Unsupported {
            interface: Interface::Debugfs,
            operation,
        }
    }

    fn write_ctx(&self, ctx: &DamonCtx) -> Result<(), Error> {
        let intervals = &ctx.intervals;
        write_file(
            &self.file("attrs"),
            &format!(
                "{} {} {} {} {}",
                intervals.sample,
                intervals.aggr,
                intervals.ops_update,
                ctx.nr_regions.min_nr_regions,
                ctx.nr_regions.max_nr_regions
            ),
        )?;

        let target_ids = match ctx.ops {
            DamonOps::Paddr => DamonOps::Paddr.as_str().to_string(),
            DamonOps::Vaddr => ctx
                .targets
                .iter()
                .map(|target| {
                    target.pid.map(|pid| pid.to_string()).ok_or(DecodeError::MissingField {
                        entity: "target",
                        field: "pid",
                    })
                })
                .collect::<Result<Vec<_>, _>>()?
                .join(" "),
            DamonOps::Fvaddr => return Err(Self::unsupported("fvaddr operations")),
        };
        write_file(&self.file("target_ids"), &target_ids)?;

        let init_regions: Vec<String> = ctx
            .targets
            .iter()
            .enumerate()
            .flat_map(|(idx, target)| {
                target
                    .regions
                    .iter()
                    .map(move |region| format!("{} {} {}", idx, region.start, region.end))
            })
            .collect();
        let init_regions_file = self.file("init_regions");
        if init_regions_file.exists() {
            write_file(&init_regions_file, &init_regions.join("\n"))?;
        } else if !init_regions.is_empty() {
            return Err(Self::unsupported("initial monitoring regions"));
        }

        let schemes = ctx
            .schemes
            .iter()
            .map(|scheme| scheme_line(scheme, intervals))
            .collect::<Result<Vec<_>, _>>()?;
        let schemes_file = self.file("schemes");
        if schemes_file.exists() {
            write_file(&schemes_file, &schemes.join("\n"))?;
        } else if !schemes.is_empty() {
            return Err(Self::unsupported("schemes"));
        }

        if let Some(record) = &ctx.record_request {
            let record_file = self.file("record");
            if !record_file.exists() {
                return Err(Self::unsupported("record"));
            }
            write_file(
                &record_file,
                &format!("{} {}", record.rfile_buf, record.rfile_path.display()),
            )?;
        }
        Ok(())
    }

    fn read_ctx(&self) -> Result<DamonCtx, Error> {
        let attrs_file = self.file("attrs");
        let attrs = read_numbers(&attrs_file)?;
        let [sample, aggr, ops_update, min_nr_regions, max_nr_regions] = attrs[..] else {
            return Err(Error::kernel_data(&attrs_file, read_file(&attrs_file)?));
        };

        let target_ids = read_file(&self.file("target_ids"))?;
        let target_ids = target_ids.trim();
        let (ops, mut targets) = if target_ids == DamonOps::Paddr.as_str()
            || target_ids == PADDR_TARGET_ID
        {
            (DamonOps::Paddr, vec![DamonTarget::new("0", None, Vec::new())])
        } else {
            let targets = target_ids
                .split_whitespace()
                .enumerate()
                .map(|(idx, id)| {
                    id.parse()
                        .map(|pid| DamonTarget::new(idx.to_string(), Some(pid), Vec::new()))
                        .map_err(|_| Error::kernel_data(self.file("target_ids"), target_ids))
                })
                .collect::<Result<Vec<_>, _>>()?;
            (DamonOps::Vaddr, targets)
        };

        let init_regions_file = self.file("init_regions");
        if init_regions_file.exists() {
            for line in read_file(&init_regions_file)?.lines() {
                let fields: Vec<u64> = parse_numbers(&init_regions_file, line)?;
                let [idx, start, end] = fields[..] else {
                    return Err(Error::kernel_data(&init_regions_file, line));
                };
                match targets.get_mut(idx as usize) {
                    Some(target) => target.regions.push(DamonRegion { start, end }),
                    None => return Err(Error::kernel_data(&init_regions_file, line)),
                }
            }
        }

        let schemes_file = self.file("schemes");
        let schemes = if schemes_file.exists() {
            read_file(&schemes_file)?
                .lines()
                .filter(|line| !line.trim().is_empty())
                .enumerate()
                .map(|(idx, line)| parse_scheme_line(&schemes_file, idx, line))
                .collect::<Result<Vec<_>, _>>()?
        } else {
            Vec::new()
        };

        let mut ctx = DamonCtx::new(
            "0",
            DamonIntervals::from_us(sample, aggr, ops_update),
            DamonNrRegionsRange {
                min_nr_regions,
                max_nr_regions,
            },
            ops,
            targets,
            schemes,
        );
        ctx.record_request = self.read_record()?;
        Ok(ctx)
    }

    fn read_record(&self) -> Result<Option<DamonRecord>, Error> {
        let record_file = self.file("record");
        if !record_file.exists() {
            return Ok(None);
        }
        let content = read_file(&record_file)?;
        let Some((buf, path)) = content.trim().split_once(' ') else {
            return Ok(None);
        };
        let rfile_buf: u64 = buf
            .parse()
            .map_err(|_| Error::kernel_data(&record_file, content.as_str()))?;
        if rfile_buf == 0 {
            return Ok(None);
        }
        Ok(Some(DamonRecord {
            rfile_buf,
            rfile_path: PathBuf::from(path.trim()),
        }))
    }

    /// Write `content` to `path`, reporting whether the kernel accepted it.
    fn try_write(path: &Path, content: &str) -> bool {
        match write_file(path, content) {
            Ok(()) => true,
            Err(e) => {
                debug!(error = %e, "probe write rejected");
                false
            }
        }
    }

    fn probe_paddr(&self, features: &mut FeatureSet) -> Result<(), Error> {
        let target_ids_file = self.file("target_ids");
        let prior_ids = read_file(&target_ids_file)?;
        if !Self::try_write(&target_ids_file, DamonOps::Paddr.as_str()) {
            return Ok(());
        }
        features.insert(Feature::Paddr);

        let init_regions_file = self.file("init_regions");
        if init_regions_file.exists() {
            let prior_regions = read_file(&init_regions_file)?;
            if Self::try_write(&init_regions_file, "0 1 100") {
                features.insert(Feature::InitRegionsTargetIdx);
                write_file(&init_regions_file, &prior_regions)?;
            }
        }

        let prior_ids = if prior_ids.trim() == PADDR_TARGET_ID {
            DamonOps::Paddr.as_str().to_string()
        } else {
            prior_ids
        };
        write_file(&target_ids_file, &prior_ids)
    }

    fn probe_schemes(&self, features: &mut FeatureSet) -> Result<(), Error> {
        let schemes_file = self.file("schemes");
        let prior = read_file(&schemes_file)?;
        if !Self::try_write(&schemes_file, PROBE_SCHEME) {
            return Ok(());
        }
        let read_back = read_file(&schemes_file)?;
        insert_scheme_line_features(&read_back, features);

        // Read back lines carry statistics, which the kernel does not take.
        let restore: Vec<String> = prior
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| {
                line.split_whitespace()
                    .take(NR_SCHEME_FIELDS)
                    .collect::<Vec<_>>()
                    .join(" ")
            })
            .collect();
        write_file(&schemes_file, &restore.join("\n"))
    }

    /// Feature detection for a running kdamond, whose inputs the kernel
    /// refuses to change. Only what the current inputs show is reported.
    fn inspect_running(&self, features: &mut FeatureSet) -> Result<(), Error> {
        if features.is_supported(Feature::Vaddr)
            && read_file(&self.file("target_ids"))?.trim() == PADDR_TARGET_ID
        {
            features.insert(Feature::Paddr);
        }
        if features.is_supported(Feature::Schemes) {
            insert_scheme_line_features(&read_file(&self.file("schemes"))?, features);
        }
        Ok(())
    }
}

/// Scheme features implied by the first line of the `schemes` file.
fn insert_scheme_line_features(content: &str, features: &mut FeatureSet) {
    let nr_fields = content
        .lines()
        .find(|line| !line.trim().is_empty())
        .map(|line| line.split_whitespace().count())
        .unwrap_or(0);
    if nr_fields >= NR_SCHEME_FIELDS {
        features.insert(Feature::SchemesSpeedLimit);
        features.insert(Feature::SchemesQuotas);
        features.insert(Feature::SchemesPrioritization);
        features.insert(Feature::SchemesWmarks);
    }
    if nr_fields >= NR_SCHEME_FIELDS + NR_STAT_FIELDS {
        features.insert(Feature::SchemesStatSucc);
        features.insert(Feature::SchemesStatQtExceed);
    }
}

impl Backend for DebugfsBackend {
    fn interface(&self) -> Interface {
        Interface::Debugfs
    }

    fn root(&self) -> &Path {
        &self.root
    }

    fn is_available(&self) -> bool {
        self.file("monitor_on").is_file()
    }

    fn probe_features(&self) -> Result<FeatureSet, Error> {
        let running = self.is_kdamond_running(KDAMOND_NAME)?;
        let mut features = FeatureSet::default();
        for (file, feature) in [
            ("record", Feature::Record),
            ("schemes", Feature::Schemes),
            ("init_regions", Feature::InitRegions),
            ("target_ids", Feature::Vaddr),
        ] {
            if self.file(file).exists() {
                features.insert(feature);
            }
        }
        if running {
            warn!("kdamond is running, detecting features from its current inputs");
            self.inspect_running(&mut features)?;
            return Ok(features);
        }
        if features.is_supported(Feature::Vaddr) {
            self.probe_paddr(&mut features)?;
        }
        if features.is_supported(Feature::Schemes) {
            self.probe_schemes(&mut features)?;
        }
        Ok(features)
    }

    fn current_kdamonds(&self) -> Result<Vec<Kdamond>, Error> {
        Ok(vec![Kdamond {
            name: KDAMOND_NAME.to_string(),
            state: KdamondState::from(self.is_kdamond_running(KDAMOND_NAME)?),
            pid: self.kdamond_pid(KDAMOND_NAME)?,
            contexts: vec![self.read_ctx()?],
        }])
    }

    fn current_kdamond_names(&self) -> Result<Vec<String>, Error> {
        Ok(vec![KDAMOND_NAME.to_string()])
    }

    fn is_kdamond_running(&self, name: &str) -> Result<bool, Error> {
        Self::check_name(name)?;
        let monitor_on = self.file("monitor_on");
        let content = read_file(&monitor_on)?;
        match content.trim() {
            "on" => Ok(true),
            "off" => Ok(false),
            _ => Err(Error::kernel_data(&monitor_on, content)),
        }
    }

    fn kdamond_pid(&self, name: &str) -> Result<Option<u32>, Error> {
        Self::check_name(name)?;
        let pid_file = self.file("kdamond_pid");
        let content = read_file(&pid_file)?;
        match content.trim() {
            "none" => Ok(None),
            pid => pid
                .parse()
                .map(Some)
                .map_err(|_| Error::kernel_data(&pid_file, content.as_str())),
        }
    }

    fn apply_kdamonds(&self, kdamonds: &[Kdamond]) -> Result<(), Error> {
        let kdamond = match kdamonds {
            [] => return Ok(()),
            [kdamond] => kdamond,
            _ => return Err(Self::unsupported("more than one kdamond")),
        };
        let ctx = match &kdamond.contexts[..] {
            [] => return Err(Self::unsupported("kdamonds without contexts")),
            [ctx] => ctx,
            _ => return Err(Self::unsupported("more than one context")),
        };
        for scheme in ctx.schemes.iter().filter(|scheme| !scheme.filters.is_empty()) {
            warn!(
                scheme = %scheme.name,
                nr_filters = scheme.filters.len(),
                "debugfs has no scheme filters, ignoring them"
            );
        }
        self.write_ctx(ctx)?;
        info!(kdamond = %kdamond.name, "applied kdamond");
        Ok(())
    }

    fn update_schemes_stats(&self, name: &str) -> Result<Vec<Vec<DamosStats>>, Error> {
        Self::check_name(name)?;
        let schemes = self.read_ctx()?.schemes;
        Ok(vec![
            schemes
                .into_iter()
                .map(|scheme| scheme.stats.unwrap_or_default())
                .collect(),
        ])
    }

    fn turn_damon(&self, state: KdamondState, names: &[String]) -> Result<(), Error> {
        for name in names {
            Self::check_name(name)?;
        }
        write_file(&self.file("monitor_on"), state.as_str())?;
        info!(kdamond = KDAMOND_NAME, %state, "requested kdamond state");
        Ok(())
    }
}

fn parse_numbers(path: &Path, line: &str) -> Result<Vec<u64>, Error> {
    line.split_whitespace()
        .map(|field| field.parse().map_err(|_| Error::kernel_data(path, line)))
        .collect()
}

fn read_numbers(path: &Path) -> Result<Vec<u64>, Error> {
    parse_numbers(path, &read_file(path)?)
}

fn scheme_line(scheme: &Damos, intervals: &DamonIntervals) -> Result<String, Error> {
    let action = scheme
        .action
        .debugfs_code()
        .ok_or_else(|| DebugfsBackend::unsupported("LRU sorting actions"))?;
    let pattern = scheme.access_pattern.to_kernel_units(intervals);
    let quotas = &scheme.quotas;
    let wmarks = &scheme.watermarks;
    let fields: [u64; NR_SCHEME_FIELDS] = [
        pattern.min_sz_bytes,
        pattern.max_sz_bytes,
        pattern.min_nr_accesses,
        pattern.max_nr_accesses,
        pattern.min_age,
        pattern.max_age,
        action,
        quotas.time_ms,
        quotas.sz_bytes,
        quotas.reset_interval_ms,
        quotas.weight_sz_permil,
        quotas.weight_nr_accesses_permil,
        quotas.weight_age_permil,
        wmarks.metric.debugfs_code(),
        wmarks.interval_us,
        wmarks.high_permil,
        wmarks.mid_permil,
        wmarks.low_permil,
    ];
    Ok(fields.map(|field| field.to_string()).join(" "))
}

fn parse_scheme_line(path: &Path, idx: usize, line: &str) -> Result<Damos, Error> {
    let fields = parse_numbers(path, line)?;
    if fields.len() < NR_SCHEME_FIELDS {
        return Err(Error::kernel_data(path, line));
    }
    let bad_line = || Error::kernel_data(path, line);
    let access_pattern = DamosAccessPattern {
        min_sz_bytes: fields[0],
        max_sz_bytes: fields[1],
        nr_accesses: NrAccesses::SampleIntervals {
            min: fields[2],
            max: fields[3],
        },
        age: Age::AggrIntervals {
            min: fields[4],
            max: fields[5],
        },
    };
    let action = DamosAction::from_debugfs_code(fields[6]).ok_or_else(bad_line)?;
    let quotas = DamosQuotas {
        time_ms: fields[7],
        sz_bytes: fields[8],
        reset_interval_ms: fields[9],
        weight_sz_permil: fields[10],
        weight_nr_accesses_permil: fields[11],
        weight_age_permil: fields[12],
    };
    let watermarks = DamosWatermarks {
        metric: WatermarkMetric::from_debugfs_code(fields[13]).ok_or_else(bad_line)?,
        interval_us: fields[14],
        high_permil: fields[15],
        mid_permil: fields[16],
        low_permil: fields[17],
    };

    let mut scheme = Damos::new(
        idx.to_string(),
        access_pattern,
        action,
        quotas,
        watermarks,
        Vec::new(),
    );
    if let [nr_tried, sz_tried, nr_applied, sz_applied, qt_exceeds] = fields[NR_SCHEME_FIELDS..] {
        scheme.stats = Some(DamosStats {
            nr_tried,
            sz_tried,
            nr_applied,
            sz_applied,
            qt_exceeds,
        });
    }
    Ok(scheme)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kvpairs::KvMap;

    #[test]
    fn scheme_line_uses_kernel_units() {
        let intervals = DamonIntervals::default();
        let kv = KvMap::new()
            .with("name", "0")
            .with("action", "pageout")
            .with(
                "access_pattern",
                KvMap::new()
                    .with("min_nr_accesses", "10 %")
                    .with("max_nr_accesses", "50 %")
                    .with("min_age", "2 s")
                    .with("max_age", "max"),
            );
        let scheme = Damos::from_kvpairs(&kv).unwrap();
        assert_eq!(
            scheme_line(&scheme, &intervals).unwrap(),
            format!(
                "0 {max} 2 10 20 {max} 2 0 0 0 0 0 0 0 0 0 0 0",
                max = u64::MAX
            )
        );
    }

    #[test]
    fn lru_actions_are_unsupported() {
        let kv = KvMap::new().with("name", "0").with("action", "lru_prio");
        let scheme = Damos::from_kvpairs(&kv).unwrap();
        assert!(matches!(
            scheme_line(&scheme, &DamonIntervals::default()),
            Err(Error::Unsupported {
                interface: Interface::Debugfs,
                ..
            })
        ));
    }

    #[test]
    fn scheme_line_with_stats() {
        let path = Path::new("schemes");
        let line = format!("{PROBE_SCHEME} 3 12288 1 4096 0");
        let scheme = parse_scheme_line(path, 0, &line).unwrap();
        assert_eq!(scheme.action, DamosAction::Nohugepage);
        assert_eq!(scheme.watermarks.metric, WatermarkMetric::FreeMemRate);
        assert_eq!(scheme.quotas.sz_bytes, 4_096);
        assert_eq!(scheme.stats.map(|stats| stats.sz_tried), Some(12_288));

        let scheme = parse_scheme_line(path, 1, PROBE_SCHEME).unwrap();
        assert_eq!(scheme.name, "1");
        assert!(scheme.stats.is_none());

        assert!(matches!(
            parse_scheme_line(path, 0, "1 2 3"),
            Err(Error::KernelData { .. })
        ));
    }
}
