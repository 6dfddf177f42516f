use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context};
use asmstore_explorer::{
    ExplorerConfig, ExtractOptions, LogLevel, MemorySink, ModuleRecord, Region, Retention,
    StoreSetExplorer,
};
use colored::Colorize;
use serde::Serialize;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match cli.command {
        Command::Info(args) => cmd_info(args, config, cli.format),
        Command::List(args) => cmd_list(args, config, cli.format),
        Command::Extract(args) => cmd_extract(args, config),
        Command::Validate(args) => cmd_validate(args, config),
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<ExplorerConfig> {
    match path {
        Some(path) => ExplorerConfig::load(path)
            .with_context(|| format!("loading config {}", path.display())),
        None => Ok(ExplorerConfig::default()),
    }
}

fn open(path: &Path, config: ExplorerConfig) -> anyhow::Result<StoreSetExplorer> {
    StoreSetExplorer::open(path, config)
        .with_context(|| format!("opening store set {}", path.display()))
}

#[derive(Debug, Serialize)]
struct StoreSummary {
    store_id: u32,
    arch: String,
    version: u32,
    modules: usize,
    global_entries: usize,
}

#[derive(Debug, Serialize)]
struct SetSummary {
    path: String,
    set_name: String,
    complete: bool,
    stores: Vec<StoreSummary>,
    manifest_entries: Option<usize>,
    modules: usize,
    warnings: usize,
    errors: usize,
}

fn summarize(explorer: &StoreSetExplorer) -> SetSummary {
    let stores = explorer
        .stores()
        .values()
        .flatten()
        .map(|store| StoreSummary {
            store_id: store.store_id(),
            arch: store.arch().to_string(),
            version: store.version(),
            modules: store.records().len(),
            global_entries: store.index32().len(),
        })
        .collect();
    SetSummary {
        path: explorer.store_path().to_string(),
        set_name: explorer.set_name().to_string(),
        complete: explorer.is_complete(),
        stores,
        manifest_entries: explorer.manifest().map(|m| m.len()),
        modules: explorer.modules().len(),
        warnings: explorer.warning_count(),
        errors: explorer.error_count(),
    }
}

fn cmd_info(args: InfoArgs, config: ExplorerConfig, format: OutputFormat) -> anyhow::Result<()> {
    let explorer = open(&args.path, config)?;
    let summary = summarize(&explorer);
    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    println!("Store set {} ({})", summary.set_name.bold(), summary.path);
    for store in &summary.stores {
        let arch = if store.arch.is_empty() { "-" } else { store.arch.as_str() };
        println!(
            "  store {} {:<12} v{}  {} modules  {} index entries",
            store.store_id.to_string().yellow(),
            arch.cyan(),
            store.version,
            store.modules,
            store.global_entries
        );
    }
    match summary.manifest_entries {
        Some(n) => println!("  manifest: {n} entries"),
        None => println!("  manifest: {}", "missing".red()),
    }
    let state = if summary.complete { "complete".green() } else { "incomplete".yellow() };
    println!(
        "  {} modules, {}, {} warnings, {} errors",
        summary.modules, state, summary.warnings, summary.errors
    );
    Ok(())
}

#[derive(Debug, Serialize)]
struct ModuleSummary {
    name: String,
    hash32: String,
    hash64: String,
    store_id: u32,
    arch: String,
    local_index: u32,
    mapping_index: Option<u32>,
    data_size: u32,
    debug_size: u32,
    config_size: u32,
}

impl From<&ModuleRecord> for ModuleSummary {
    fn from(record: &ModuleRecord) -> Self {
        Self {
            name: record.name().to_string(),
            hash32: format!("{:#010x}", record.hash32()),
            hash64: format!("{:#018x}", record.hash64()),
            store_id: record.store_id(),
            arch: record.arch().to_string(),
            local_index: record.local_index(),
            mapping_index: record.mapping_index(),
            data_size: record.data_size,
            debug_size: record.debug_size,
            config_size: record.config_size,
        }
    }
}

fn cmd_list(args: ListArgs, config: ExplorerConfig, format: OutputFormat) -> anyhow::Result<()> {
    let explorer = open(&args.path, config)?;
    let modules: Vec<ModuleSummary> = explorer
        .modules()
        .iter()
        .filter(|r| matches_arch(r, args.arch.as_deref()))
        .map(|r| ModuleSummary::from(r.as_ref()))
        .collect();

    if format == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&modules)?);
        return Ok(());
    }
    for m in &modules {
        let name = if m.name.is_empty() { "<unnamed>".dimmed() } else { m.name.bold() };
        println!(
            "{} {} {}  store {}:{} {}  {} bytes",
            m.hash32.yellow(),
            m.hash64.dimmed(),
            name,
            m.store_id,
            m.local_index,
            m.arch.cyan(),
            m.data_size
        );
    }
    Ok(())
}

fn matches_arch(record: &ModuleRecord, arch: Option<&str>) -> bool {
    arch.map_or(true, |a| record.arch().eq_ignore_ascii_case(a))
}

/// Whether `query` names the record or spells one of its hashes in hex.
fn matches_query(record: &ModuleRecord, query: &str) -> bool {
    if !record.name().is_empty() && record.name().eq_ignore_ascii_case(query) {
        return true;
    }
    let hex = query.strip_prefix("0x").unwrap_or(query);
    match u64::from_str_radix(hex, 16) {
        Ok(0) | Err(_) => false,
        Ok(hash) => hash == record.hash64() || hash == u64::from(record.hash32()),
    }
}

/// Modules selected by `queries` (all when empty), in set order.
fn select_modules(
    explorer: &StoreSetExplorer,
    queries: &[String],
    arch: Option<&str>,
) -> anyhow::Result<Vec<Arc<ModuleRecord>>> {
    let candidates = explorer
        .modules()
        .iter()
        .filter(|r| matches_arch(r, arch));
    if queries.is_empty() {
        return Ok(candidates.cloned().collect());
    }

    let selected: Vec<_> = candidates
        .filter(|r| queries.iter().any(|q| matches_query(r, q)))
        .cloned()
        .collect();
    for query in queries {
        if !selected.iter().any(|r| matches_query(r, query)) {
            bail!("no module matches '{query}'");
        }
    }
    Ok(selected)
}

fn cmd_extract(args: ExtractArgs, mut config: ExplorerConfig) -> anyhow::Result<()> {
    if !config.retention.retains_data() {
        config.retention = Retention::InMemory;
    }
    let explorer = open(&args.path, config)?;
    let modules = select_modules(&explorer, &args.modules, args.arch.as_deref())?;

    let mut regions = vec![Region::Data];
    if args.debug {
        regions.push(Region::DebugData);
    }
    if args.with_config {
        regions.push(Region::ConfigData);
    }
    let options = ExtractOptions {
        file_name: None,
        decompress: args.decompress,
    };

    let mut written = 0usize;
    for record in &modules {
        let dir = args.output.join(record.arch());
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("creating {}", dir.display()))?;
        for &region in &regions {
            let path = record
                .extract_to_dir(&dir, region, &options)
                .with_context(|| format!("extracting {} of {}", region, record.file_name(region, None)))?;
            if let Some(path) = path {
                println!("  {} {}", "wrote".green(), path.display());
                written += 1;
            }
        }
    }
    println!("{} {} files extracted", "✓".green().bold(), written);
    Ok(())
}

fn cmd_validate(args: ValidateArgs, config: ExplorerConfig) -> anyhow::Result<()> {
    let sink = Arc::new(MemorySink::new());
    let explorer = StoreSetExplorer::open_with_sink(&args.path, config, sink.clone())
        .with_context(|| format!("opening store set {}", args.path.display()))?;

    for (level, message) in sink.messages() {
        match level {
            LogLevel::Error => println!("{} {message}", "error:".red().bold()),
            LogLevel::Warning => println!("{} {message}", "warning:".yellow().bold()),
            LogLevel::Info | LogLevel::Debug => tracing::debug!("{message}"),
        }
    }

    if explorer.has_errors() {
        bail!("{} errors in store set", explorer.error_count());
    }
    if args.strict && explorer.has_warnings() {
        bail!("{} warnings in store set", explorer.warning_count());
    }
    println!(
        "{} {} stores, {} modules",
        "✓".green().bold(),
        explorer.stores_read(),
        explorer.modules().len()
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use asmstore_format::{ManifestWriter, StoreWriter};

    use super::*;

    fn build_set(dir: &Path) {
        let mut index = StoreWriter::new(0);
        index.add_global_entry(0x11, 0x1111, 0, 0, 1);
        index.add_global_entry(0x22, 0x2222, 1, 1, 1);
        index.finish(&dir.join("assemblies.blob")).unwrap();
        for arch in ["arm64_v8a", "x86"] {
            let mut shard = StoreWriter::new(1);
            shard.add_module(b"first", Some(b"first pdb"), None);
            shard.add_module(b"second", None, Some(b"<configuration/>"));
            shard
                .finish(&dir.join(format!("assemblies.{arch}.blob")))
                .unwrap();
        }
        let mut manifest = ManifestWriter::new();
        manifest.add(0x11, 0x1111, 1, 0, "First");
        manifest.add(0x22, 0x2222, 1, 1, "Second");
        manifest.finish(&dir.join("assemblies.manifest")).unwrap();
    }

    #[test]
    fn selects_by_name_hash_and_arch() {
        let dir = tempfile::tempdir().unwrap();
        build_set(dir.path());
        let explorer =
            StoreSetExplorer::open(dir.path().join("assemblies.blob"), ExplorerConfig::default())
                .unwrap();

        let all = select_modules(&explorer, &[], None).unwrap();
        assert_eq!(all.len(), 4);

        let x86 = select_modules(&explorer, &[], Some("x86")).unwrap();
        assert_eq!(x86.len(), 2);

        let by_name = select_modules(&explorer, &["first".to_string()], Some("x86")).unwrap();
        assert_eq!(by_name.len(), 1);
        assert_eq!(by_name[0].name(), "First");

        let by_hash = select_modules(&explorer, &["0x2222".to_string()], None).unwrap();
        assert_eq!(by_hash.len(), 2);
        assert!(by_hash.iter().all(|r| r.name() == "Second"));

        assert!(select_modules(&explorer, &["Missing".to_string()], None).is_err());
    }

    #[test]
    fn summary_counts_every_shard() {
        let dir = tempfile::tempdir().unwrap();
        build_set(dir.path());
        let explorer =
            StoreSetExplorer::open(dir.path().join("assemblies.blob"), ExplorerConfig::default())
                .unwrap();
        let summary = summarize(&explorer);
        assert_eq!(summary.stores.len(), 3);
        assert_eq!(summary.manifest_entries, Some(2));
        assert_eq!(summary.modules, 4);
        assert!(summary.complete);
        assert_eq!(summary.errors, 0);

        let json = serde_json::to_value(&summary).unwrap();
        assert_eq!(json["set_name"], "assemblies");
        assert_eq!(json["stores"][0]["global_entries"], 2);
    }

    #[test]
    fn extract_writes_per_arch_directories() {
        let dir = tempfile::tempdir().unwrap();
        build_set(dir.path());
        let out = tempfile::tempdir().unwrap();

        let args = ExtractArgs {
            path: dir.path().join("assemblies.blob"),
            modules: vec!["First".to_string()],
            output: out.path().to_path_buf(),
            arch: None,
            decompress: false,
            debug: true,
            with_config: false,
        };
        cmd_extract(args, ExplorerConfig::default()).unwrap();

        for arch in ["arm64_v8a", "x86"] {
            let base = out.path().join(arch);
            assert_eq!(std::fs::read(base.join("First.dll")).unwrap(), b"first");
            assert_eq!(std::fs::read(base.join("First.pdb")).unwrap(), b"first pdb");
        }
    }

    #[test]
    fn extract_refuses_names_leaving_the_output_dir() {
        let dir = tempfile::tempdir().unwrap();
        let mut index = StoreWriter::new(0);
        index.add_module(b"payload", None, None);
        index.add_global_entry(0x1, 0x1, 0, 0, 0);
        index.finish(&dir.path().join("assemblies.blob")).unwrap();
        let mut manifest = ManifestWriter::new();
        manifest.add(0x1, 0x1, 0, 0, "../escaped");
        manifest.finish(&dir.path().join("assemblies.manifest")).unwrap();

        let root = tempfile::tempdir().unwrap();
        let out = root.path().join("out");
        let args = ExtractArgs {
            path: dir.path().join("assemblies.blob"),
            modules: Vec::new(),
            output: out.clone(),
            arch: None,
            decompress: false,
            debug: false,
            with_config: false,
        };
        assert!(cmd_extract(args, ExplorerConfig::default()).is_err());
        assert!(!root.path().join("escaped.dll").exists());
    }

    #[test]
    fn module_summary_formats_hashes() {
        let dir = tempfile::tempdir().unwrap();
        build_set(dir.path());
        let explorer =
            StoreSetExplorer::open(dir.path().join("assemblies.blob"), ExplorerConfig::default())
                .unwrap();
        let summary = ModuleSummary::from(explorer.by_name("second").unwrap().as_ref());
        assert_eq!(summary.hash32, "0x00000022");
        assert_eq!(summary.hash64, "0x0000000000002222");
        assert_eq!(summary.config_size, 16);
        assert_eq!(summary.mapping_index, Some(1));
    }

    #[test]
    fn validate_fails_on_divergent_architectures() {
        let dir = tempfile::tempdir().unwrap();
        build_set(dir.path());
        let mut odd = StoreWriter::new(1);
        odd.add_module(b"only one", None, None);
        odd.finish(&dir.path().join("assemblies.x86_64.blob")).unwrap();

        let args = ValidateArgs {
            path: dir.path().join("assemblies.blob"),
            strict: false,
        };
        let err = cmd_validate(args, ExplorerConfig::default()).unwrap_err();
        assert!(err.to_string().contains("1 errors"));
    }
}
