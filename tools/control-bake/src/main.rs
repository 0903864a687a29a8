use anyhow::{Context, Result};
use clap::Parser;
use codec::ControlStringBuilder;
use common::{ChoiceRecord, MappedLedger};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Reassembles recorded choices into control strings.
#[derive(Parser)]
#[command(name = "control-bake")]
struct Args {
    /// Ledgers (`.rkyv`), choice traces, or directories holding them.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,
    /// Print one embedded string per function instead of the global string.
    #[arg(long)]
    embedded: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut records = Vec::new();
    for input in &args.inputs {
        records.extend(collect_records(input)?);
    }
    if records.is_empty() {
        eprintln!("Warning: no choice records found.");
    }

    for line in bake(&records, args.embedded)? {
        println!("{line}");
    }
    Ok(())
}

fn collect_records(root: &Path) -> Result<Vec<ChoiceRecord>> {
    let mut records = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name().into_iter().filter_map(|e| e.ok()) {
        let path = entry.path();
        if !entry.file_type().is_file() {
            continue;
        }
        if path.extension().and_then(|s| s.to_str()) == Some("rkyv") {
            let ledger = MappedLedger::open(path)
                .with_context(|| format!("Failed to open ledger {:?}", path))?;
            records.extend(ledger.to_records()?);
        } else {
            let content =
                fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
            records.extend(parse_trace(&content).with_context(|| format!("In {:?}", path))?);
        }
    }
    Ok(records)
}

/// Choice lines of a captured stderr stream; everything else is ignored.
fn parse_trace(content: &str) -> Result<Vec<ChoiceRecord>> {
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| line.starts_with("[OC]"))
        .map(|(n, line)| {
            line.parse::<ChoiceRecord>()
                .with_context(|| format!("line {}: {line}", n + 1))
        })
        .collect()
}

fn bake(records: &[ChoiceRecord], embedded: bool) -> Result<Vec<String>> {
    let builder = ControlStringBuilder::from_records(records)?;
    if !embedded {
        return Ok(vec![builder.build()?]);
    }

    let names: BTreeMap<u32, &str> = records
        .iter()
        .map(|r| (r.function, r.function_name.as_str()))
        .collect();
    builder
        .functions()
        .into_iter()
        .map(|function| {
            let name = names.get(&function).copied().unwrap_or_default();
            let data = builder.embedded_for(function)?;
            Ok(format!(
                "{}_OptimisticChoices = \"{data}\"",
                name.replace('.', "_")
            ))
        })
        .collect()
}
