//! Text rendering of command results.

use damon::fmt::{format_sz, indent_lines};
use damon::{FeatureSet, Kdamond};
use std::fmt::Write;

/// One line per kdamond, or the full tree with `detail`.
pub fn status(kdamonds: &[Kdamond], detail: bool) -> String {
    if kdamonds.is_empty() {
        return "no kdamond".to_string();
    }
    let lines: Vec<String> = kdamonds
        .iter()
        .map(|kdamond| {
            if detail {
                kdamond.to_string()
            } else {
                kdamond.summary_str()
            }
        })
        .collect();
    lines.join("\n")
}

pub fn stats(kdamonds: &[Kdamond]) -> String {
    per_scheme(kdamonds, |out, scheme| match &scheme.stats {
        Some(stats) => out.push_str(&indent_lines(&stats.to_string(), 12)),
        None => out.push_str(&indent_lines("no statistics", 12)),
    })
}

pub fn tried_regions(kdamonds: &[Kdamond]) -> String {
    per_scheme(kdamonds, |out, scheme| {
        let regions = scheme.tried_regions.as_deref().unwrap_or_default();
        let total: u64 = regions.iter().map(|r| r.end.saturating_sub(r.start)).sum();
        for region in regions {
            out.push_str(&indent_lines(&region.to_string(), 12));
            out.push('\n');
        }
        let total = format!("total size: {}", format_sz(total, false));
        out.push_str(&indent_lines(&total, 12));
    })
}

pub fn features(features: &FeatureSet) -> String {
    let lines: Vec<String> = features
        .table()
        .map(|(feature, supported)| {
            let mark = if supported { "Supported" } else { "Unsupported" };
            format!("{feature}: {mark}")
        })
        .collect();
    lines.join("\n")
}

fn per_scheme(kdamonds: &[Kdamond], body: impl Fn(&mut String, &damon::Damos)) -> String {
    let mut out = String::new();
    for kdamond in kdamonds {
        let _ = writeln!(out, "kdamond {}", kdamond.summary_str());
        for ctx in &kdamond.contexts {
            let _ = writeln!(out, "    context {}", ctx.name);
            for scheme in &ctx.schemes {
                let _ = writeln!(out, "        scheme {} (action: {})", scheme.name, scheme.action);
                body(&mut out, scheme);
                out.push('\n');
            }
        }
    }
    out.truncate(out.trim_end().len());
    out
}
