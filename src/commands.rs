//! Terminal output for the CLI commands.
//!
//! Each `run_*` function performs one engine operation and prints either a
//! human-readable listing or, with `json`, the serialized result.

use anyhow::Result;
use serde::Serialize;

use crate::engine::{Engine, SearchOptions};
use crate::index::IndexStats;

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub fn run_search(engine: &Engine, opts: &SearchOptions, json: bool) -> Result<()> {
    let response = engine.search(opts)?;
    if json {
        return print_json(&response);
    }

    if response.results.is_empty() {
        println!("No results.");
        return Ok(());
    }

    println!(
        "mode: {}  margin: {:.1}  matches: {}",
        response.mode, response.margin, response.total_matches
    );
    println!();

    for (i, result) in response.results.iter().enumerate() {
        let heading = result.chunk.heading.as_deref().unwrap_or("(no heading)");
        println!(
            "{}. [{:.2}] {} {} / {} / {}",
            i + 1,
            result.score,
            result.confidence,
            result.chunk.group,
            result.chunk.subgroup,
            heading
        );
        println!("    matched: {}", result.matched_terms.join(", "));
        if !result.anchor_hits.is_empty() {
            println!("    anchors: {}", result.anchor_hits.join(", "));
        }
        if result.siblings > 0 {
            println!("    siblings: {}", result.siblings);
        }
        if let Some(explain) = &result.explain {
            println!(
                "    bm25: {:.3}  coverage: {:.2}  proximity: {:.2}  editorial: {:.2}",
                explain.bm25, explain.coverage, explain.proximity, explain.editorial
            );
        }
        println!("    excerpt: \"{}\"", result.snippet.replace('\n', " ").trim());
        println!();
    }
    Ok(())
}

pub fn run_status(engine: &Engine, json: bool) -> Result<()> {
    let status = engine.status();
    if json {
        return print_json(&status);
    }

    println!("spectra — Index Status");
    println!("======================");
    println!();
    println!("  Chunks:      {}", status.chunks);
    println!("  Groups:      {}", status.groups);
    println!("  Vocabulary:  {}", status.vocabulary);
    println!("  Scope:       {} ({})", status.scope_mode, status.origin);
    println!("  Anchors:     {:?}", status.anchor_strategy);
    println!(
        "  Built:       {} ({} ms)",
        status.built_at.format("%Y-%m-%d %H:%M:%S UTC"),
        status.build_duration_ms
    );
    if let Some(err) = &status.last_error {
        println!("  Last error:  {}", err);
    }
    if !status.included_groups.is_empty() {
        println!();
        println!("  Groups: {}", status.included_groups.join(", "));
    }
    println!();
    Ok(())
}

pub fn print_stats(stats: &IndexStats, json: bool) -> Result<()> {
    if json {
        return print_json(stats);
    }
    println!(
        "Indexed {} chunks in {} groups ({} terms) in {} ms",
        stats.chunks, stats.groups, stats.vocabulary, stats.duration_ms
    );
    Ok(())
}

pub fn run_duplicates(
    engine: &Engine,
    threshold: Option<f64>,
    top_n: Option<usize>,
    exclude_shared_names: bool,
    json: bool,
) -> Result<()> {
    let pairs = engine.find_duplicates(threshold, top_n, exclude_shared_names)?;
    if json {
        return print_json(&pairs);
    }
    if pairs.is_empty() {
        println!("No duplicates.");
        return Ok(());
    }

    println!("  {:>6}   {:<34} {}", "SIM", "A", "B");
    println!("  {}", "-".repeat(76));
    for pair in &pairs {
        println!(
            "  {:>6.3}   {:<34} {}",
            pair.similarity,
            format!("{}/{}", pair.a.group, pair.a.subgroup),
            format!("{}/{}", pair.b.group, pair.b.subgroup)
        );
    }
    Ok(())
}

pub fn run_orphans(engine: &Engine, threshold: Option<f64>, top_n: Option<usize>, json: bool) -> Result<()> {
    let orphans = engine.find_orphans(threshold, top_n)?;
    if json {
        return print_json(&orphans);
    }
    if orphans.is_empty() {
        println!("No orphans.");
        return Ok(());
    }

    println!("  {:>6}   {:<10} {}", "MAX", "KIND", "CHUNK");
    println!("  {}", "-".repeat(76));
    for orphan in &orphans {
        println!(
            "  {:>6.3}   {:<10} {}/{}",
            orphan.max_similarity, orphan.kind, orphan.chunk.group, orphan.chunk.subgroup
        );
    }
    Ok(())
}

pub fn run_coverage(engine: &Engine, group: &str, json: bool) -> Result<()> {
    let report = engine.coverage(group)?;
    if json {
        return print_json(&report);
    }

    println!("Coverage for '{}'", report.group);
    println!(
        "  roots: {}  seeds: {}  average: {:.3}  weak: {}",
        report.roots,
        report.seeds.len(),
        report.average,
        report.weak_count
    );
    if let Some(note) = &report.note {
        println!("  note: {}", note);
    }
    for seed in &report.seeds {
        let flag = if seed.weak { "WEAK" } else { "" };
        println!("  {:>6.3}  {:<4} {}", seed.best_similarity, flag, seed.chunk.subgroup);
    }
    Ok(())
}

pub fn run_similarity(engine: &Engine, json: bool) -> Result<()> {
    let pairs = engine.group_similarity();
    if json {
        return print_json(&pairs);
    }
    if pairs.is_empty() {
        println!("Fewer than two groups indexed.");
        return Ok(());
    }

    println!("  {:>6}   {:<24} {}", "JACC", "GROUP", "GROUP");
    println!("  {}", "-".repeat(60));
    for pair in &pairs {
        println!("  {:>6.3}   {:<24} {}", pair.similarity, pair.a, pair.b);
    }
    Ok(())
}
