use damon::{
    Backend, DamonOps, DamosAction, DamosStats, Error, Feature, FilterType, Kdamond, KdamondState,
    KvMap, KvValue, SysfsBackend,
};
use pretty_assertions::assert_eq;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

/// An empty sysfs hierarchy, as a kernel without kdamonds exposes it.
fn empty_kernel() -> TempDir {
    let dir = tempfile::tempdir().unwrap();
    fs::create_dir_all(dir.path().join("kdamonds")).unwrap();
    fs::write(dir.path().join("kdamonds/nr_kdamonds"), "0\n").unwrap();
    dir
}

/// Files the kernel maintains itself for kdamond `idx`.
fn kernel_owned_files(root: &Path, idx: usize, state: &str, pid: &str) {
    let dir = root.join("kdamonds").join(idx.to_string());
    fs::write(dir.join("state"), format!("{state}\n")).unwrap();
    fs::write(dir.join("pid"), format!("{pid}\n")).unwrap();
}

fn read(root: &Path, path: &str) -> String {
    fs::read_to_string(root.join(path)).unwrap().trim_end().to_string()
}

fn list(items: Vec<KvMap>) -> KvValue {
    KvValue::List(items.into_iter().map(KvValue::Map).collect())
}

fn vaddr_kdamond() -> Kdamond {
    let scheme = KvMap::new()
        .with("name", "cold")
        .with("action", "pageout")
        .with(
            "access_pattern",
            KvMap::new()
                .with("min_sz_bytes", "4 KiB")
                .with("min_nr_accesses", "10 %")
                .with("max_nr_accesses", "50 %")
                .with("min_age", "2 s")
                .with("max_age", "max"),
        )
        .with(
            "quotas",
            KvMap::new()
                .with("time_ms", "10 ms")
                .with("sz_bytes", "128 MiB")
                .with("reset_interval_ms", "1 s"),
        )
        .with(
            "filters",
            list(vec![
                KvMap::new()
                    .with("name", "0")
                    .with("filter_type", "memcg")
                    .with("memcg_path", "/workloads/batch")
                    .with("matching", "true"),
            ]),
        );
    let target = KvMap::new().with("name", "0").with("pid", "1234").with(
        "regions",
        list(vec![KvMap::new().with("start", "4096").with("end", "8192")]),
    );
    let ctx = KvMap::new()
        .with("name", "0")
        .with("ops", "vaddr")
        .with("targets", list(vec![target]))
        .with("schemes", list(vec![scheme]));
    let kdamond = KvMap::new()
        .with("name", "0")
        .with("contexts", list(vec![ctx]));
    Kdamond::from_kvpairs(&kdamond).unwrap()
}

#[test]
fn availability_follows_nr_kdamonds() {
    let dir = tempfile::tempdir().unwrap();
    assert!(!SysfsBackend::new(dir.path()).is_available());

    let kernel = empty_kernel();
    assert!(SysfsBackend::new(kernel.path()).is_available());
}

#[test]
fn probing_an_idle_kernel_leaves_no_kdamond() {
    let kernel = empty_kernel();
    let backend = SysfsBackend::new(kernel.path());

    let features = backend.probe_features().unwrap();
    assert!(features.is_supported(Feature::Schemes));
    assert!(features.is_supported(Feature::SchemesQuotas));
    assert!(!features.is_supported(Feature::Record));
    assert!(!features.is_supported(Feature::SchemesTriedRegions));
    assert!(!features.is_supported(Feature::Fvaddr));

    assert_eq!(read(kernel.path(), "kdamonds/nr_kdamonds"), "0");
    assert!(backend.current_kdamond_names().unwrap().is_empty());
}

#[test]
fn probing_detects_newer_directories() {
    let kernel = empty_kernel();
    let root = kernel.path();
    let ctx = root.join("kdamonds/0/contexts/0");
    fs::create_dir_all(ctx.join("schemes/0/tried_regions")).unwrap();
    fs::create_dir_all(ctx.join("schemes/0/filters")).unwrap();
    fs::write(ctx.join("avail_operations"), "vaddr\nfvaddr\npaddr\n").unwrap();
    fs::write(ctx.join("schemes/nr_schemes"), "1\n").unwrap();
    fs::write(root.join("kdamonds/0/contexts/nr_contexts"), "1\n").unwrap();
    fs::write(root.join("kdamonds/nr_kdamonds"), "1\n").unwrap();

    let features = SysfsBackend::new(root).probe_features().unwrap();
    assert!(features.is_supported(Feature::SchemesTriedRegions));
    assert!(features.is_supported(Feature::SchemesFilters));
    assert!(features.is_supported(Feature::Fvaddr));
    assert_eq!(read(root, "kdamonds/nr_kdamonds"), "1");
    assert_eq!(read(root, "kdamonds/0/contexts/0/schemes/nr_schemes"), "1");
}

#[test]
fn probing_a_kdamond_without_contexts() {
    let kernel = empty_kernel();
    let root = kernel.path();
    fs::create_dir_all(root.join("kdamonds/0/contexts")).unwrap();
    fs::write(root.join("kdamonds/0/contexts/nr_contexts"), "0\n").unwrap();
    fs::write(root.join("kdamonds/nr_kdamonds"), "1\n").unwrap();
    // Directories the kernel creates once the counts are raised.
    let scheme = root.join("kdamonds/0/contexts/0/schemes/0");
    fs::create_dir_all(scheme.join("tried_regions")).unwrap();
    fs::create_dir_all(scheme.join("filters")).unwrap();

    let features = SysfsBackend::new(root).probe_features().unwrap();
    assert!(features.is_supported(Feature::SchemesFilters));
    assert!(features.is_supported(Feature::SchemesTriedRegions));
    assert_eq!(read(root, "kdamonds/nr_kdamonds"), "1");
    assert_eq!(read(root, "kdamonds/0/contexts/nr_contexts"), "0");
}

#[test]
fn failed_scratch_scheme_is_undone() {
    let kernel = empty_kernel();
    let root = kernel.path();
    // A plain file where the scratch kdamond directory has to go.
    fs::write(root.join("kdamonds/0"), "").unwrap();

    let features = SysfsBackend::new(root).probe_features().unwrap();
    assert!(features.is_supported(Feature::Schemes));
    assert!(!features.is_supported(Feature::SchemesFilters));
    assert_eq!(read(root, "kdamonds/nr_kdamonds"), "0");
}

#[test]
fn apply_writes_kernel_units() {
    let kernel = empty_kernel();
    let root = kernel.path();
    let backend = SysfsBackend::new(root);

    backend.apply_kdamonds(&[vaddr_kdamond()]).unwrap();

    let ctx = "kdamonds/0/contexts/0";
    assert_eq!(read(root, "kdamonds/nr_kdamonds"), "1");
    assert_eq!(read(root, "kdamonds/0/contexts/nr_contexts"), "1");
    assert_eq!(read(root, &format!("{ctx}/operations")), "vaddr");
    assert_eq!(
        read(root, &format!("{ctx}/monitoring_attrs/intervals/sample_us")),
        "5000"
    );
    assert_eq!(read(root, &format!("{ctx}/targets/0/pid_target")), "1234");
    assert_eq!(
        read(root, &format!("{ctx}/targets/0/regions/0/end")),
        "8192"
    );

    let scheme = format!("{ctx}/schemes/0");
    assert_eq!(read(root, &format!("{scheme}/action")), "pageout");
    assert_eq!(
        read(root, &format!("{scheme}/access_pattern/sz/min")),
        "4096"
    );
    // 5 ms samples in a 100 ms aggregation: 10 % is 2 samples.
    assert_eq!(
        read(root, &format!("{scheme}/access_pattern/nr_accesses/min")),
        "2"
    );
    assert_eq!(
        read(root, &format!("{scheme}/access_pattern/nr_accesses/max")),
        "10"
    );
    assert_eq!(read(root, &format!("{scheme}/access_pattern/age/min")), "20");
    assert_eq!(read(root, &format!("{scheme}/quotas/bytes")), "134217728");
    assert_eq!(
        read(root, &format!("{scheme}/quotas/reset_interval_ms")),
        "1000"
    );
    assert_eq!(read(root, &format!("{scheme}/filters/nr_filters")), "1");
    assert_eq!(read(root, &format!("{scheme}/filters/0/type")), "memcg");
    assert_eq!(
        read(root, &format!("{scheme}/filters/0/memcg_path")),
        "/workloads/batch"
    );
    assert_eq!(read(root, &format!("{scheme}/filters/0/matching")), "Y");
}

#[test]
fn applied_kdamonds_read_back() {
    let kernel = empty_kernel();
    let root = kernel.path();
    let backend = SysfsBackend::new(root);
    let applied = vaddr_kdamond();

    backend.apply_kdamonds(&[applied.clone()]).unwrap();
    kernel_owned_files(root, 0, "off", "-1");

    let current = backend.current_kdamonds().unwrap();
    assert_eq!(current.len(), 1);
    let kdamond = &current[0];
    assert_eq!(kdamond.state, KdamondState::Off);
    assert_eq!(kdamond.pid, None);

    let ctx = &kdamond.contexts[0];
    assert_eq!(ctx.ops, DamonOps::Vaddr);
    assert_eq!(ctx.intervals, applied.contexts[0].intervals);
    assert_eq!(ctx.targets, applied.contexts[0].targets);

    let scheme = &ctx.schemes[0];
    let applied_scheme = &applied.contexts[0].schemes[0];
    assert_eq!(scheme.action, DamosAction::Pageout);
    assert_eq!(scheme.quotas, applied_scheme.quotas);
    assert_eq!(scheme.watermarks, applied_scheme.watermarks);
    assert_eq!(scheme.filters[0].filter_type, FilterType::Memcg);
    assert_eq!(scheme.filters[0].memcg_path, "/workloads/batch");
    assert!(scheme.filters[0].matching);
    assert_eq!(
        scheme
            .access_pattern
            .to_kernel_units(&ctx.intervals)
            .min_nr_accesses,
        2
    );
}

#[test]
fn turning_on_writes_state() {
    let kernel = empty_kernel();
    let root = kernel.path();
    let backend = SysfsBackend::new(root);
    backend.apply_kdamonds(&[vaddr_kdamond()]).unwrap();
    kernel_owned_files(root, 0, "off", "-1");

    assert!(!backend.is_kdamond_running("0").unwrap());
    backend
        .turn_damon(KdamondState::On, &["0".to_string()])
        .unwrap();
    assert_eq!(read(root, "kdamonds/0/state"), "on");
    assert!(backend.is_kdamond_running("0").unwrap());

    fs::write(root.join("kdamonds/0/pid"), "812\n").unwrap();
    assert_eq!(backend.kdamond_pid("0").unwrap(), Some(812));
}

#[test]
fn unknown_kdamond() {
    let kernel = empty_kernel();
    let backend = SysfsBackend::new(kernel.path());
    assert!(matches!(
        backend.is_kdamond_running("3"),
        Err(Error::NoSuchKdamond(name)) if name == "3"
    ));
}

#[test]
fn commit_requests_the_kernel_to_reread_inputs() {
    let kernel = empty_kernel();
    let root = kernel.path();
    let backend = SysfsBackend::new(root);
    let mut kdamond = vaddr_kdamond();
    backend.apply_kdamonds(&[kdamond.clone()]).unwrap();
    kernel_owned_files(root, 0, "on", "812");

    kdamond.contexts[0].schemes[0].quotas.sz_bytes = 1 << 30;
    backend.commit_inputs(&[kdamond]).unwrap();

    assert_eq!(
        read(root, "kdamonds/0/contexts/0/schemes/0/quotas/bytes"),
        "1073741824"
    );
    assert_eq!(read(root, "kdamonds/0/state"), "commit");
}

#[test]
fn stats_are_read_after_the_update_command() {
    let kernel = empty_kernel();
    let root = kernel.path();
    let backend = SysfsBackend::new(root);
    backend.apply_kdamonds(&[vaddr_kdamond()]).unwrap();
    kernel_owned_files(root, 0, "on", "812");

    let stats_dir = root.join("kdamonds/0/contexts/0/schemes/0/stats");
    fs::create_dir_all(&stats_dir).unwrap();
    for (file, value) in [
        ("nr_tried", "3"),
        ("sz_tried", "12288"),
        ("nr_applied", "1"),
        ("sz_applied", "4096"),
        ("qt_exceeds", "0"),
    ] {
        fs::write(stats_dir.join(file), value).unwrap();
    }

    let stats = backend.update_schemes_stats("0").unwrap();
    assert_eq!(
        stats,
        vec![vec![DamosStats {
            nr_tried: 3,
            sz_tried: 12288,
            nr_applied: 1,
            sz_applied: 4096,
            qt_exceeds: 0,
        }]]
    );
    assert_eq!(read(root, "kdamonds/0/state"), "update_schemes_stats");
}

#[test]
fn tried_regions_need_kernel_support() {
    let kernel = empty_kernel();
    let root = kernel.path();
    let backend = SysfsBackend::new(root);
    backend.apply_kdamonds(&[vaddr_kdamond()]).unwrap();
    kernel_owned_files(root, 0, "on", "812");

    assert!(matches!(
        backend.update_schemes_tried_regions("0"),
        Err(Error::Unsupported { .. })
    ));

    let tried = root.join("kdamonds/0/contexts/0/schemes/0/tried_regions");
    for (idx, (start, end)) in [(4096, 8192), (8192, 16384)].into_iter().enumerate() {
        let region = tried.join(idx.to_string());
        fs::create_dir_all(&region).unwrap();
        fs::write(region.join("start"), start.to_string()).unwrap();
        fs::write(region.join("end"), end.to_string()).unwrap();
        fs::write(region.join("nr_accesses"), "5").unwrap();
        fs::write(region.join("age"), "12").unwrap();
    }
    fs::write(tried.join("total_bytes"), "12288").unwrap();

    let regions = backend.update_schemes_tried_regions("0").unwrap();
    let regions = &regions[0][0];
    assert_eq!(regions.len(), 2);
    assert_eq!(regions[1].start, 8192);
    assert_eq!(regions[1].age, 12);
    assert_eq!(
        read(root, "kdamonds/0/state"),
        "update_schemes_tried_regions"
    );
}

#[test]
fn vaddr_target_needs_pid() {
    let kernel = empty_kernel();
    let backend = SysfsBackend::new(kernel.path());
    let mut kdamond = vaddr_kdamond();
    kdamond.contexts[0].targets[0].pid = None;

    assert!(matches!(
        backend.apply_kdamonds(&[kdamond]),
        Err(Error::Decode(_))
    ));
}
