use std::fs::File;
use std::io::{self, Read, Write};
use std::sync::Arc;

use anyhow::{bail, Context};
use colored::Colorize;
use objstore::{
    conformance, create_storage, ObjectAttributes, ObjectStorage, ObjectStorageExt, ReadMethod,
    ReadSettings, StorageConfig, WriteMode, WriteSettings, DEFAULT_BUFFER_SIZE,
};
use serde_json::json;
use tracing::warn;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let storage = open_storage(&cli)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    match cli.command {
        Command::Put(args) => match &args.file {
            Some(file) => {
                let mut input = File::open(file)
                    .with_context(|| format!("opening {}", file.display()))?;
                cmd_put(storage.as_ref(), &args, &mut input, cli.format, &mut out)
            }
            None => cmd_put(storage.as_ref(), &args, &mut io::stdin().lock(), cli.format, &mut out),
        },
        command => dispatch(storage.as_ref(), command, cli.format, &mut out),
    }
}

fn open_storage(cli: &Cli) -> anyhow::Result<Arc<dyn ObjectStorage>> {
    let config = match (&cli.store, &cli.config) {
        (Some(url), _) => StorageConfig::from_url(url)?,
        (None, Some(path)) => StorageConfig::load(path)?,
        (None, None) => bail!("no storage configured: pass --store <url> or --config <file>"),
    };
    Ok(create_storage(&config)?)
}

/// Run every command that does not consume input.
fn dispatch(
    storage: &dyn ObjectStorage,
    command: Command,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    match command {
        Command::Exists(args) => cmd_exists(storage, &args, format, out),
        Command::Ls(args) => cmd_ls(storage, &args, format, out),
        Command::Stat(args) => cmd_stat(storage, &args, format, out),
        Command::Cat(args) => cmd_cat(storage, &args, out),
        Command::Put(args) => cmd_put(storage, &args, &mut io::empty(), format, out),
        Command::Rm(args) => cmd_rm(storage, &args, format, out),
        Command::Check(args) => cmd_check(storage, &args, format, out),
    }
}

fn print_json(out: &mut dyn Write, value: &serde_json::Value) -> anyhow::Result<()> {
    writeln!(out, "{}", serde_json::to_string_pretty(value)?)?;
    Ok(())
}

fn cmd_exists(
    storage: &dyn ObjectStorage,
    args: &ExistsArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let exists = storage.exists(&args.path);
    match format {
        OutputFormat::Json => print_json(out, &json!({ "path": args.path, "exists": exists })),
        OutputFormat::Text => {
            if exists {
                writeln!(out, "{} {}", "✓".green().bold(), args.path)?;
            } else {
                writeln!(out, "{} {} (not found)", "✗".red().bold(), args.path)?;
            }
            Ok(())
        }
    }
}

fn cmd_ls(
    storage: &dyn ObjectStorage,
    args: &LsArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let mut keys = storage.list_all(&args.prefix)?;
    keys.sort();

    if !args.long {
        return match format {
            OutputFormat::Json => print_json(out, &json!(keys)),
            OutputFormat::Text => {
                for key in &keys {
                    writeln!(out, "{key}")?;
                }
                Ok(())
            }
        };
    }

    let mut entries = Vec::with_capacity(keys.len());
    for key in keys {
        let meta = storage.get_object_metadata(&key)?;
        entries.push((key, meta.size_bytes));
    }
    match format {
        OutputFormat::Json => {
            let rows: Vec<_> = entries
                .iter()
                .map(|(path, size)| json!({ "path": path, "size_bytes": size }))
                .collect();
            print_json(out, &json!(rows))
        }
        OutputFormat::Text => {
            for (path, size) in &entries {
                writeln!(out, "{size:>12}  {path}")?;
            }
            Ok(())
        }
    }
}

fn cmd_stat(
    storage: &dyn ObjectStorage,
    args: &StatArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let meta = storage.get_object_metadata(&args.path)?;
    match format {
        OutputFormat::Json => print_json(out, &json!({ "path": args.path, "metadata": meta })),
        OutputFormat::Text => {
            writeln!(out, "{}", args.path.bold())?;
            writeln!(out, "  Size: {} bytes", meta.size_bytes)?;
            if let Some(modified) = meta.last_modified {
                writeln!(out, "  Modified: {}", modified.to_rfc3339().cyan())?;
            }
            if let Some(attributes) = &meta.attributes {
                let mut keys: Vec<_> = attributes.keys().collect();
                keys.sort();
                for key in keys {
                    writeln!(out, "  {} = {}", key.yellow(), attributes[key])?;
                }
            }
            Ok(())
        }
    }
}

fn cmd_cat(storage: &dyn ObjectStorage, args: &CatArgs, out: &mut dyn Write) -> anyhow::Result<()> {
    let mut settings = ReadSettings::default();
    if args.mmap {
        settings = settings.with_method(ReadMethod::Mmap);
    }
    if let Some(size) = args.buffer_size {
        settings = settings.with_buffer_size(size);
    }
    let mut reader = storage.read_object(&args.path, &settings, None, None)?;
    io::copy(&mut reader, out).with_context(|| format!("reading {}", args.path))?;
    Ok(())
}

fn cmd_put(
    storage: &dyn ObjectStorage,
    args: &PutArgs,
    input: &mut dyn Read,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let mode = if args.append {
        WriteMode::Append
    } else {
        WriteMode::Rewrite
    };
    let attributes = if args.attributes.is_empty() {
        None
    } else {
        if !storage.supports_attributes() {
            warn!(backend = storage.name(), "backend drops object attributes");
        }
        Some(args.attributes.iter().cloned().collect::<ObjectAttributes>())
    };
    let settings = if args.fsync {
        WriteSettings::default().with_durability(objstore::Durability::Fsync)
    } else {
        WriteSettings::default()
    };

    let mut writer =
        storage.write_object(&args.path, attributes, DEFAULT_BUFFER_SIZE, mode, &settings)?;
    io::copy(input, &mut writer).with_context(|| format!("writing {}", args.path))?;
    let written = writer.bytes_written();
    writer.finalize()?;

    match format {
        OutputFormat::Json => print_json(
            out,
            &json!({ "path": args.path, "mode": mode.to_string(), "bytes_written": written }),
        ),
        OutputFormat::Text => {
            let verb = if args.append { "Appended" } else { "Wrote" };
            writeln!(out, "{} {verb} {written} bytes to {}", "✓".green().bold(), args.path.bold())?;
            Ok(())
        }
    }
}

fn cmd_rm(
    storage: &dyn ObjectStorage,
    args: &RmArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let removed: Vec<&String> = if args.force {
        let mut removed = Vec::new();
        for path in &args.paths {
            let existed = storage.exists(path);
            storage.remove_object_if_exists(path)?;
            if existed {
                removed.push(path);
            }
        }
        removed
    } else if let [path] = args.paths.as_slice() {
        storage.remove_object(path)?;
        vec![path]
    } else {
        storage.remove_objects(&args.paths)?;
        args.paths.iter().collect()
    };

    match format {
        OutputFormat::Json => print_json(out, &json!({ "removed": removed })),
        OutputFormat::Text => {
            for path in removed {
                writeln!(out, "Removed {}", path.bold())?;
            }
            Ok(())
        }
    }
}

fn cmd_check(
    storage: &dyn ObjectStorage,
    args: &CheckArgs,
    format: OutputFormat,
    out: &mut dyn Write,
) -> anyhow::Result<()> {
    let report = conformance::run(storage, &args.prefix);
    match format {
        OutputFormat::Json => print_json(out, &serde_json::to_value(&report)?)?,
        OutputFormat::Text => {
            for check in &report.checks {
                match &check.failure {
                    None => writeln!(out, "{} {}", "✓".green(), check.name)?,
                    Some(reason) => writeln!(out, "{} {}: {}", "✗".red(), check.name, reason)?,
                }
            }
            for leftover in &report.leftovers {
                writeln!(out, "{} left behind: {leftover}", "!".yellow())?;
            }
        }
    }
    if !report.passed() {
        bail!(
            "{} of {} conformance checks failed on {}",
            report.failures().count(),
            report.checks.len(),
            report.backend
        );
    }
    Ok(())
}
