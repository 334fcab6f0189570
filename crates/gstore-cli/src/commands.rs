use std::sync::Arc;

use anyhow::{anyhow, Context};
use colored::Colorize;
use tracing::{debug, info};

use gstore_odm::{Gstore, KeyPath, Loader, Model, PlainOptions, PopulateRef, ValidationReport};
use gstore_store::{Cache, InMemoryCache, InMemoryDatastore};
use gstore_types::{record_from_json, Ancestor, Record, Value};

use crate::cli::*;
use crate::config::{load_fixtures, CliConfig};

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.block_on(dispatch(cli))
}

async fn dispatch(cli: Cli) -> anyhow::Result<()> {
    let workspace = Workspace::open(&cli)?;
    let format = cli.format;
    match cli.command {
        Command::Key(args) => cmd_key(&workspace, args, format),
        Command::Validate(args) => cmd_validate(&workspace, args, format),
        Command::Sanitize(args) => cmd_sanitize(&workspace, args),
        Command::Get(args) => cmd_get(&workspace, args, format).await,
        Command::Populate(args) => cmd_populate(&workspace, args).await,
        Command::DeleteAll(args) => cmd_delete_all(&workspace, args, format).await,
        Command::Kinds => cmd_kinds(&workspace, format),
    }
}

/// Registry over an in-memory store seeded from the fixtures, with every
/// kind of the schema file registered.
struct Workspace {
    config: CliConfig,
    store: InMemoryDatastore,
    gstore: Gstore,
}

impl Workspace {
    fn open(cli: &Cli) -> anyhow::Result<Self> {
        let config = CliConfig::load(&cli.schema)?;
        let store = InMemoryDatastore::new();
        if let Some(path) = &cli.fixtures {
            let loaded = load_fixtures(path, &config, &store)?;
            info!(loaded, path = %path.display(), "fixtures");
        }
        Self::build(config, store)
    }

    fn build(config: CliConfig, store: InMemoryDatastore) -> anyhow::Result<Self> {
        let ttl = config.odm.cache_ttl_secs.map(std::time::Duration::from_secs);
        let cache = config
            .odm
            .cache
            .then(|| Arc::new(InMemoryCache::with_ttl(ttl)) as Arc<dyn Cache>);
        let gstore = Gstore::with_options(Arc::new(store.clone()), config.odm.to_config(), cache);
        for (kind, section) in &config.kinds {
            gstore.model(kind, section.to_schema(kind)?)?;
            debug!(kind = %kind, fields = section.fields.len(), "registered");
        }
        Ok(Self {
            config,
            store,
            gstore,
        })
    }

    fn model(&self, kind: &str) -> anyhow::Result<Model> {
        self.gstore
            .model_of(kind)
            .with_context(|| format!("kind '{kind}' is not declared in the schema file"))
    }
}

fn key_path(args: &PathArgs) -> anyhow::Result<KeyPath> {
    let mut path = KeyPath::new();
    for notation in &args.ancestors {
        let ancestor = Ancestor::parse(notation)?;
        path = path.ancestor(ancestor.kind, ancestor.id);
    }
    if let Some(namespace) = &args.namespace {
        path = path.namespace(namespace.clone());
    }
    Ok(path)
}

/// `PATH` or `PATH:FIELD,FIELD`.
fn parse_ref(notation: &str) -> PopulateRef {
    match notation.split_once(':') {
        Some((path, fields)) => {
            let fields: Vec<&str> = fields.split(',').map(str::trim).filter(|f| !f.is_empty()).collect();
            PopulateRef::fields(path, &fields)
        }
        None => PopulateRef::new(notation),
    }
}

fn read_record(data: &str) -> anyhow::Result<Record> {
    let text = match data.strip_prefix('@') {
        Some(path) => std::fs::read_to_string(path).with_context(|| format!("reading {path}"))?,
        None => data.to_string(),
    };
    let json: serde_json::Value = serde_json::from_str(&text).context("parsing record JSON")?;
    record_from_json(json).ok_or_else(|| anyhow!("record must be a JSON object"))
}

fn print_json(value: &serde_json::Value) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn cmd_key(workspace: &Workspace, args: KeyArgs, format: OutputFormat) -> anyhow::Result<()> {
    let path = key_path(&args.path)?;
    // Undeclared kinds still get a key, with automatic id coercion.
    let key = match workspace.gstore.model_of(&args.kind) {
        Ok(model) => model.key(args.id.as_str(), &path)?,
        Err(_) => {
            let id = gstore_odm::key::coerce_id(&Value::from(args.id.as_str()), workspace.config.key_type(&args.kind))?;
            gstore_types::Key::new(args.kind.as_str())
                .with_id(id)
                .with_ancestors(path.ancestors.clone())
                .with_namespace(path.namespace.clone())
        }
    };
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&key)?),
        OutputFormat::Text => {
            println!("{}", key.to_string().cyan());
            Ok(())
        }
    }
}

fn print_report(report: &ValidationReport, format: OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(report)?),
        OutputFormat::Text => {
            if report.is_valid() {
                println!("{} Valid.", "✓".green().bold());
            } else {
                for error in report.errors().values() {
                    println!("  {} {}: {}", "✗".red(), error.field.yellow(), error.message);
                }
            }
            Ok(())
        }
    }
}

fn cmd_validate(workspace: &Workspace, args: RecordArgs, format: OutputFormat) -> anyhow::Result<()> {
    let model = workspace.model(&args.kind)?;
    let entity = model.entity(read_record(&args.data)?);
    let report = entity.validation_report();
    print_report(&report, format)?;
    if report.is_valid() {
        Ok(())
    } else {
        Err(anyhow!("{} field(s) failed validation", report.len()))
    }
}

fn cmd_sanitize(workspace: &Workspace, args: RecordArgs) -> anyhow::Result<()> {
    let model = workspace.model(&args.kind)?;
    let clean = model.sanitize(read_record(&args.data)?);
    print_json(&Value::Entity(clean).to_json())
}

async fn cmd_get(workspace: &Workspace, args: GetArgs, format: OutputFormat) -> anyhow::Result<()> {
    let model = workspace.model(&args.kind)?;
    let path = key_path(&args.path)?;
    let Some(entity) = model.get(args.id.as_str(), &path, Default::default()).await? else {
        println!("{} No {} with id {}.", "∅".dimmed(), args.kind.bold(), args.id.yellow());
        return Ok(());
    };
    let options = PlainOptions {
        read_all: args.read_all,
        virtuals: true,
        show_key: args.show_key,
    };
    match format {
        OutputFormat::Json => print_json(&entity.to_json(options)),
        OutputFormat::Text => {
            println!("{} {}", args.kind.bold(), entity.key().to_string().cyan());
            for (field, value) in entity.plain(options) {
                println!("  {}: {}", field.yellow(), value.to_json());
            }
            Ok(())
        }
    }
}

async fn cmd_populate(workspace: &Workspace, args: PopulateArgs) -> anyhow::Result<()> {
    let model = workspace.model(&args.kind)?;
    let path = key_path(&args.path)?;
    let entity = model
        .get(args.id.as_str(), &path, Default::default())
        .await?
        .ok_or_else(|| anyhow!("no {} with id {}", args.kind, args.id))?;
    let refs = args.refs.iter().map(|r| parse_ref(r)).collect();
    let loader: Arc<dyn Loader> = workspace.gstore.create_data_loader();
    let entity = entity.populate(refs, Some(loader)).await?;
    print_json(&entity.to_json(PlainOptions {
        virtuals: true,
        ..PlainOptions::default()
    }))
}

async fn cmd_delete_all(workspace: &Workspace, args: DeleteAllArgs, format: OutputFormat) -> anyhow::Result<()> {
    let mut model = workspace.model(&args.kind)?;
    if args.no_delay {
        let mut config = workspace.gstore.config().clone();
        config.delete_all.batch_delay = std::time::Duration::ZERO;
        let registry = Gstore::with_options(
            Arc::clone(workspace.gstore.datastore()),
            config,
            workspace.gstore.cache().cloned(),
        );
        model = registry.model(&args.kind, Arc::clone(model.schema()))?;
    }
    let path = key_path(&args.path)?;
    let result = model.delete_all(&path).await?;
    match format {
        OutputFormat::Json => print_json(&serde_json::json!({
            "success": result.success,
            "message": result.message,
            "deleted": result.deleted,
            "remaining": workspace.store.len(),
        })),
        OutputFormat::Text => {
            println!("{} {}", "✓".green().bold(), result.message);
            println!("  Deleted: {}", result.deleted.to_string().bold());
            Ok(())
        }
    }
}

fn cmd_kinds(workspace: &Workspace, format: OutputFormat) -> anyhow::Result<()> {
    let kinds = workspace.gstore.kinds();
    match format {
        OutputFormat::Json => print_json(&serde_json::to_value(&kinds)?),
        OutputFormat::Text => {
            if kinds.is_empty() {
                println!("No kinds declared.");
            }
            for kind in kinds {
                let model = workspace.model(&kind)?;
                let references = model.schema().reference_paths().join(", ");
                println!(
                    "{}  {} fields  key: {:?}{}",
                    kind.bold(),
                    model.schema().paths().len(),
                    model.schema().options().key_type,
                    if references.is_empty() { String::new() } else { format!("  refs: {}", references.cyan()) }
                );
            }
            Ok(())
        }
    }
}
