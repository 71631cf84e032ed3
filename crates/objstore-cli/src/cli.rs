use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "objstore",
    about = "Inspect and exercise object storage backends",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Storage URL (`memory://`, `file:///path/to/objects`)
    #[arg(long, global = true, conflicts_with = "config")]
    pub store: Option<String>,

    /// TOML storage configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Check whether an object exists
    Exists(ExistsArgs),
    /// List keys under a prefix
    Ls(LsArgs),
    /// Show object metadata
    Stat(StatArgs),
    /// Write an object's bytes to stdout
    Cat(CatArgs),
    /// Write an object from a file or stdin
    Put(PutArgs),
    /// Remove one or more objects
    Rm(RmArgs),
    /// Run the contract conformance suite against the backend
    Check(CheckArgs),
}

#[derive(Args)]
pub struct ExistsArgs {
    pub path: String,
}

#[derive(Args)]
pub struct LsArgs {
    #[arg(default_value = "")]
    pub prefix: String,
    /// Show object sizes
    #[arg(short, long)]
    pub long: bool,
}

#[derive(Args)]
pub struct StatArgs {
    pub path: String,
}

#[derive(Args)]
pub struct CatArgs {
    pub path: String,
    /// Read through a memory map where the backend supports it
    #[arg(long)]
    pub mmap: bool,
    #[arg(long)]
    pub buffer_size: Option<usize>,
}

#[derive(Args)]
pub struct PutArgs {
    pub path: String,
    /// Source file; stdin when omitted
    #[arg(short, long)]
    pub file: Option<PathBuf>,
    /// Append instead of replacing
    #[arg(long)]
    pub append: bool,
    /// Attribute as key=value (repeatable)
    #[arg(long = "attr", value_parser = parse_attribute)]
    pub attributes: Vec<(String, String)>,
    /// fsync before committing
    #[arg(long)]
    pub fsync: bool,
}

#[derive(Args)]
pub struct RmArgs {
    #[arg(required = true)]
    pub paths: Vec<String>,
    /// Ignore missing objects
    #[arg(short, long)]
    pub force: bool,
}

#[derive(Args)]
pub struct CheckArgs {
    /// Scratch prefix the suite writes under
    #[arg(long, default_value = "objstore-check")]
    pub prefix: String,
}

fn parse_attribute(raw: &str) -> Result<(String, String), String> {
    match raw.split_once('=') {
        Some((key, value)) if !key.is_empty() => Ok((key.to_string(), value.to_string())),
        _ => Err(format!("expected key=value, got {raw:?}")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_exists() {
        let cli = Cli::try_parse_from(["objstore", "--store", "memory://", "exists", "a/b"]).unwrap();
        assert_eq!(cli.store.as_deref(), Some("memory://"));
        if let Command::Exists(args) = cli.command {
            assert_eq!(args.path, "a/b");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_ls_defaults_to_everything() {
        let cli = Cli::try_parse_from(["objstore", "ls"]).unwrap();
        if let Command::Ls(args) = cli.command {
            assert_eq!(args.prefix, "");
            assert!(!args.long);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_put_with_attributes() {
        let cli = Cli::try_parse_from([
            "objstore", "put", "t/part", "--append", "--attr", "table=hits", "--attr", "codec=lz4",
        ])
        .unwrap();
        if let Command::Put(args) = cli.command {
            assert!(args.append);
            assert!(args.file.is_none());
            assert_eq!(
                args.attributes,
                vec![("table".into(), "hits".into()), ("codec".into(), "lz4".into())]
            );
        } else { panic!("wrong command"); }
    }

    #[test]
    fn attribute_value_may_contain_equals() {
        assert_eq!(parse_attribute("q=a=b").unwrap(), ("q".into(), "a=b".into()));
        assert!(parse_attribute("novalue").is_err());
        assert!(parse_attribute("=v").is_err());
    }

    #[test]
    fn parse_rm_many() {
        let cli = Cli::try_parse_from(["objstore", "rm", "-f", "a", "b"]).unwrap();
        if let Command::Rm(args) = cli.command {
            assert!(args.force);
            assert_eq!(args.paths, vec!["a", "b"]);
        } else { panic!("wrong command"); }
    }

    #[test]
    fn rm_requires_a_path() {
        assert!(Cli::try_parse_from(["objstore", "rm"]).is_err());
    }

    #[test]
    fn store_and_config_conflict() {
        assert!(Cli::try_parse_from([
            "objstore", "--store", "memory://", "--config", "s.toml", "ls"
        ])
        .is_err());
    }

    #[test]
    fn parse_check_prefix() {
        let cli = Cli::try_parse_from(["objstore", "check", "--prefix", "tmp/conformance"]).unwrap();
        if let Command::Check(args) = cli.command {
            assert_eq!(args.prefix, "tmp/conformance");
        } else { panic!("wrong command"); }
    }

    #[test]
    fn parse_json_format() {
        let cli = Cli::try_parse_from(["objstore", "--format", "json", "stat", "k"]).unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
    }

    #[test]
    fn parse_verbose() {
        let cli = Cli::try_parse_from(["objstore", "--verbose", "ls"]).unwrap();
        assert!(cli.verbose);
    }
}
