//! CLI command implementations

use anyhow::{bail, Context, Result};
use colored::Colorize;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::compiler::DictionaryCompiler;
use crate::config::CompilerParams;
use crate::dictionary::Dictionary;
use crate::merger::DictionaryMerger;
use crate::value::{Value, ValueStoreKind};

use super::args::Commands;

/// Execute a CLI command
pub fn execute(command: Commands) -> Result<()> {
    match command {
        Commands::Stats { file } => cmd_stats(&file),
        Commands::Dump {
            file,
            output,
            json_escape,
        } => cmd_dump(&file, &output, json_escape),
        Commands::Compile {
            input,
            output,
            kind,
            params,
        } => {
            let params = parse_params(&params.params)?;
            let summary = cmd_compile(&input, &output, kind, params)?;
            println!(
                "{} {} keys into {}",
                "Compiled".green().bold(),
                summary.added,
                output.display()
            );
            if summary.skipped > 0 {
                println!("{} {} malformed lines", "Skipped".yellow(), summary.skipped);
            }
            Ok(())
        }
        Commands::Merge {
            inputs,
            output,
            kind,
            params,
        } => {
            let params = parse_params(&params.params)?;
            cmd_merge(&inputs, &output, kind, params)
        }
    }
}

fn parse_params(assignments: &[String]) -> Result<CompilerParams> {
    CompilerParams::parse_assignments(assignments).context("Invalid compiler parameters")
}

/// Print the statistics of a dictionary as pretty JSON.
pub fn cmd_stats(file: &Path) -> Result<()> {
    let dict = Dictionary::open(file)
        .with_context(|| format!("Failed to open dictionary: {}", file.display()))?;
    let json = serde_json::to_string_pretty(dict.statistics())?;
    println!("{}", json);
    Ok(())
}

/// Write every entry of `file` to `output` as `key<TAB>value` lines.
///
/// Keys are written byte for byte. With `json_escape` a key becomes a JSON
/// string, or a JSON array of its bytes when it is not valid UTF-8, and
/// string values are quoted the same way.
pub fn cmd_dump(file: &Path, output: &Path, json_escape: bool) -> Result<()> {
    let dict = Dictionary::open(file)
        .with_context(|| format!("Failed to open dictionary: {}", file.display()))?;
    let out = File::create(output)
        .with_context(|| format!("Failed to create output file: {}", output.display()))?;
    let mut writer = BufWriter::new(out);
    let quote_values = json_escape && dict.value_store_kind() == ValueStoreKind::String;

    let mut count = 0usize;
    for entry in dict.entries() {
        let value = entry
            .value_as_string()
            .with_context(|| format!("Failed to decode value of '{}'", entry.matched_string()))?;
        if json_escape {
            writer.write_all(escape_key(entry.matched())?.as_bytes())?;
        } else {
            writer.write_all(entry.matched())?;
        }
        if quote_values {
            writeln!(writer, "\t{}", serde_json::to_string(&value)?)?;
        } else {
            writeln!(writer, "\t{}", value)?;
        }
        count += 1;
    }
    writer.flush()?;

    tracing::debug!(entries = count, output = %output.display(), "dumped dictionary");
    Ok(())
}

fn escape_key(key: &[u8]) -> serde_json::Result<String> {
    match std::str::from_utf8(key) {
        Ok(text) => serde_json::to_string(text),
        Err(_) => serde_json::to_string(key),
    }
}

/// Outcome of [`cmd_compile`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompileSummary {
    /// Lines turned into entries.
    pub added: usize,
    /// Malformed lines that were skipped.
    pub skipped: usize,
}

/// Compile a tab-separated text file into a dictionary.
///
/// Key-only input may omit the tab; for every other flavor a line without
/// one, or with a value that does not parse or that the value store
/// rejects, is logged and skipped.
pub fn cmd_compile(
    input: &Path,
    output: &Path,
    kind: ValueStoreKind,
    params: CompilerParams,
) -> Result<CompileSummary> {
    let file = File::open(input)
        .with_context(|| format!("Failed to open input file: {}", input.display()))?;
    let reader = BufReader::new(file);
    let mut compiler = DictionaryCompiler::new(kind, params)?;

    let mut summary = CompileSummary {
        added: 0,
        skipped: 0,
    };
    for (index, line) in reader.lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", input.display()))?;
        let line_number = index + 1;
        if line.is_empty() {
            continue;
        }
        let (key, value) = match parse_line(&line, kind) {
            Ok(entry) => entry,
            Err(reason) => {
                tracing::warn!(line = line_number, %reason, "skipping malformed input line");
                summary.skipped += 1;
                continue;
            }
        };
        match compiler.add(key, value) {
            Ok(()) => summary.added += 1,
            Err(e) if e.is_usage() => {
                tracing::warn!(line = line_number, reason = %e, "skipping rejected input line");
                summary.skipped += 1;
            }
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to add line {}", line_number));
            }
        }
    }

    compiler.compile().context("Compilation failed")?;
    compiler
        .write_to_file(output)
        .with_context(|| format!("Failed to write dictionary: {}", output.display()))?;
    Ok(summary)
}

fn parse_line(line: &str, kind: ValueStoreKind) -> std::result::Result<(&str, Value), String> {
    let (key, raw) = match (line.split_once('\t'), kind) {
        (Some((key, raw)), _) => (key, raw),
        (None, ValueStoreKind::KeyOnly) => return Ok((line, Value::None)),
        (None, _) => return Err("no tab separator".to_string()),
    };

    let value = match kind {
        ValueStoreKind::KeyOnly => Value::None,
        ValueStoreKind::Int | ValueStoreKind::IntWithWeights => raw
            .trim()
            .parse::<u64>()
            .map(Value::Int)
            .map_err(|e| format!("invalid integer '{}': {}", raw, e))?,
        ValueStoreKind::String => Value::String(raw.to_string()),
        ValueStoreKind::Json => Value::String(raw.to_string()),
        ValueStoreKind::FloatVector => Value::FloatVector(parse_floats(raw)?),
    };
    Ok((key, value))
}

/// Accepts a JSON array or comma/whitespace separated numbers.
fn parse_floats(raw: &str) -> std::result::Result<Vec<f32>, String> {
    let trimmed = raw.trim();
    if trimmed.starts_with('[') {
        return serde_json::from_str::<Vec<f32>>(trimmed)
            .map_err(|e| format!("invalid float vector '{}': {}", raw, e));
    }
    trimmed
        .split(|c: char| c == ',' || c.is_whitespace())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<f32>()
                .map_err(|e| format!("invalid float '{}': {}", s, e))
        })
        .collect()
}

/// Merge `inputs` (oldest first) into `output`.
pub fn cmd_merge(
    inputs: &[PathBuf],
    output: &Path,
    kind: ValueStoreKind,
    params: CompilerParams,
) -> Result<()> {
    if inputs.len() < 2 {
        bail!("merge needs at least two inputs, got {}", inputs.len());
    }

    let mut merger = DictionaryMerger::new(params);
    for input in inputs {
        let dict = Dictionary::open(input)
            .with_context(|| format!("Failed to open dictionary: {}", input.display()))?;
        if dict.value_store_kind() != kind {
            bail!(
                "{} holds {} values, expected {}",
                input.display(),
                dict.value_store_kind(),
                kind
            );
        }
        merger
            .add(input)
            .with_context(|| format!("Failed to add merge input: {}", input.display()))?;
    }
    merger
        .merge(output)
        .with_context(|| format!("Failed to write merged dictionary: {}", output.display()))?;

    let stats = merger.stats();
    println!(
        "{} {} keys ({} updated, {} deleted) into {}",
        "Merged".green().bold(),
        stats.number_of_keys,
        stats.updated_keys,
        stats.deleted_keys,
        output.display()
    );
    Ok(())
}
