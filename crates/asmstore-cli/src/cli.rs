use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "asmstore",
    about = "Inspect and extract sharded assembly stores",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Explorer settings file (TOML)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Summarize the stores and manifest of a set
    Info(InfoArgs),
    /// List every module in a set
    List(ListArgs),
    /// Write module images to a directory
    Extract(ExtractArgs),
    /// Load a set and report every diagnostic
    Validate(ValidateArgs),
}

#[derive(Args)]
pub struct InfoArgs {
    /// Any store, manifest or archive belonging to the set
    pub path: PathBuf,
}

#[derive(Args)]
pub struct ListArgs {
    pub path: PathBuf,
    /// Only list modules of this architecture
    #[arg(long)]
    pub arch: Option<String>,
}

#[derive(Args)]
pub struct ExtractArgs {
    pub path: PathBuf,
    /// Module names or hex hashes; everything when empty
    pub modules: Vec<String>,
    #[arg(short, long, default_value = ".")]
    pub output: PathBuf,
    /// Only extract modules of this architecture
    #[arg(long)]
    pub arch: Option<String>,
    /// Decompress compressed module images
    #[arg(long)]
    pub decompress: bool,
    /// Also write debug data (.pdb)
    #[arg(long)]
    pub debug: bool,
    /// Also write config data (.dll.config)
    #[arg(long = "with-config")]
    pub with_config: bool,
}

#[derive(Args)]
pub struct ValidateArgs {
    pub path: PathBuf,
    /// Treat warnings as failures
    #[arg(long)]
    pub strict: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_info() {
        let cli = Cli::try_parse_from(["asmstore", "info", "app.apk"]).unwrap();
        if let Command::Info(args) = cli.command {
            assert_eq!(args.path, PathBuf::from("app.apk"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_list_with_arch() {
        let cli = Cli::try_parse_from(["asmstore", "list", "assemblies.blob", "--arch", "x86"]).unwrap();
        if let Command::List(args) = cli.command {
            assert_eq!(args.arch.as_deref(), Some("x86"));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_extract() {
        let cli = Cli::try_parse_from([
            "asmstore",
            "extract",
            "assemblies.blob",
            "Foo",
            "0xdeadbeef",
            "-o",
            "out",
            "--decompress",
            "--debug",
        ])
        .unwrap();
        if let Command::Extract(args) = cli.command {
            assert_eq!(args.modules, vec!["Foo", "0xdeadbeef"]);
            assert_eq!(args.output, PathBuf::from("out"));
            assert!(args.decompress);
            assert!(args.debug);
            assert!(!args.with_config);
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_extract_defaults() {
        let cli = Cli::try_parse_from(["asmstore", "extract", "a.blob"]).unwrap();
        if let Command::Extract(args) = cli.command {
            assert!(args.modules.is_empty());
            assert_eq!(args.output, PathBuf::from("."));
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_validate_strict() {
        let cli = Cli::try_parse_from(["asmstore", "validate", "a.blob", "--strict"]).unwrap();
        assert!(matches!(cli.command, Command::Validate(ValidateArgs { strict: true, .. })));
    }

    #[test]
    fn parse_global_flags() {
        let cli = Cli::try_parse_from([
            "asmstore",
            "list",
            "a.blob",
            "--verbose",
            "--format",
            "json",
            "--config",
            "asmstore.toml",
        ])
        .unwrap();
        assert!(cli.verbose);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.config, Some(PathBuf::from("asmstore.toml")));
    }

    #[test]
    fn missing_path_is_rejected() {
        assert!(Cli::try_parse_from(["asmstore", "info"]).is_err());
    }
}
