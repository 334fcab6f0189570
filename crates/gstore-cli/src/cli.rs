use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "gstore",
    about = "gstore - schema-driven entities over a hierarchical-key document store",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// TOML file with `[odm]` settings and `[kinds.<Kind>]` schemas
    #[arg(long, global = true, default_value = "gstore.toml")]
    pub schema: PathBuf,

    /// JSON fixtures loaded into the in-memory store: {"Kind": {"id": {...}}}
    #[arg(long, global = true)]
    pub fixtures: Option<PathBuf>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Derive a key from a kind, an id and an ancestor path
    Key(KeyArgs),
    /// Validate a JSON record against a kind's schema
    Validate(RecordArgs),
    /// Strip non-writable and undeclared fields from a JSON record
    Sanitize(RecordArgs),
    /// Fetch one entity from the fixtures
    Get(GetArgs),
    /// Fetch one entity and resolve its references
    Populate(PopulateArgs),
    /// Delete every entity of a kind in batches
    DeleteAll(DeleteAllArgs),
    /// List the kinds declared in the schema file
    Kinds,
}

/// Ancestor path and namespace shared by keyed commands.
#[derive(Args, Clone, Debug, Default)]
pub struct PathArgs {
    /// Ancestor as KIND:ID, outermost first; repeatable
    #[arg(long = "ancestor", value_name = "KIND:ID")]
    pub ancestors: Vec<String>,

    #[arg(long)]
    pub namespace: Option<String>,
}

#[derive(Args)]
pub struct KeyArgs {
    pub kind: String,
    pub id: String,
    #[command(flatten)]
    pub path: PathArgs,
}

#[derive(Args)]
pub struct RecordArgs {
    pub kind: String,
    /// JSON object, or @FILE to read it from a file
    pub data: String,
}

#[derive(Args)]
pub struct GetArgs {
    pub kind: String,
    pub id: String,
    #[command(flatten)]
    pub path: PathArgs,
    /// Include fields declared `read = false`
    #[arg(long)]
    pub read_all: bool,
    /// Include the entity key under `__key`
    #[arg(long)]
    pub show_key: bool,
}

#[derive(Args)]
pub struct PopulateArgs {
    pub kind: String,
    pub id: String,
    #[command(flatten)]
    pub path: PathArgs,
    /// Reference to resolve as PATH or PATH:FIELD,FIELD; repeatable.
    /// Defaults to every declared reference.
    #[arg(long = "ref", value_name = "PATH[:FIELDS]")]
    pub refs: Vec<String>,
}

#[derive(Args)]
pub struct DeleteAllArgs {
    pub kind: String,
    #[command(flatten)]
    pub path: PathArgs,
    /// Skip the pause between delete batches
    #[arg(long)]
    pub no_delay: bool,
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_key_with_ancestors() {
        let cli = Cli::try_parse_from([
            "gstore",
            "key",
            "User",
            "42",
            "--ancestor",
            "Org:1",
            "--ancestor",
            "Team:core",
            "--namespace",
            "tenant",
        ])
        .unwrap();
        match cli.command {
            Command::Key(args) => {
                assert_eq!(args.kind, "User");
                assert_eq!(args.path.ancestors, vec!["Org:1", "Team:core"]);
                assert_eq!(args.path.namespace.as_deref(), Some("tenant"));
            }
            _ => panic!("expected key command"),
        }
    }

    #[test]
    fn parses_global_options_after_subcommand() {
        let cli = Cli::try_parse_from([
            "gstore",
            "populate",
            "Post",
            "1",
            "--ref",
            "author:name",
            "--fixtures",
            "data.json",
            "--format",
            "json",
        ])
        .unwrap();
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.fixtures, Some(PathBuf::from("data.json")));
        assert_eq!(cli.schema, PathBuf::from("gstore.toml"));
        match cli.command {
            Command::Populate(args) => assert_eq!(args.refs, vec!["author:name"]),
            _ => panic!("expected populate command"),
        }
    }

    #[test]
    fn delete_all_flag() {
        let cli = Cli::try_parse_from(["gstore", "delete-all", "User", "--no-delay"]).unwrap();
        assert!(matches!(cli.command, Command::DeleteAll(DeleteAllArgs { no_delay: true, .. })));
    }
}
