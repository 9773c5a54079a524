mod chunker;
mod config;
mod dom;
mod embed;
mod errors;
mod extract;
mod lists;
mod matcher;
mod recognizer;
mod registry;
mod scanner;
mod tagger;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, info, warn};
use tei_ner_types::EntityLabel;

use config::{Config, LogLevel};
use embed::Embedder;
use lists::EntityLists;
use matcher::{EntityKind, EntityMatcher};

#[derive(Parser)]
#[command(
    name = "tei_ner",
    about = "Named-entity lists and TEI markup for Japanese literary texts"
)]
struct Cli {
    /// JSON configuration file; defaults apply when it does not exist
    #[arg(long, default_value = config::DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    #[arg(long, value_enum)]
    log_level: Option<LogLevelArg>,

    /// Overrides `output_dir` from the config
    #[arg(long)]
    output_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Recognize entities in a plain text → <prefix>_{Person,Province,City}.txt
    Extract {
        /// UTF-8 source text
        input: PathBuf,
        /// Output prefix, the input file stem by default
        #[arg(long)]
        prefix: Option<String>,
        /// Largest recognizer input in bytes
        #[arg(long)]
        max_bytes: Option<usize>,
        /// Use this gazetteer instead of the configured recognizer
        #[arg(long)]
        gazetteer: Option<PathBuf>,
    },
    /// Tag persons and places in a TEI document or a directory of them
    Embed {
        /// XML file, or directory searched recursively for *.xml
        input: PathBuf,
        #[command(flatten)]
        lists: ListArgs,
    },
    /// Render listPerson/listPlace for every list entry
    Registry {
        #[command(flatten)]
        lists: ListArgs,
        /// Fragment file, <output_dir>/registry.xml by default
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

#[derive(Args)]
struct ListArgs {
    /// Person list file
    #[arg(long)]
    persons: Option<PathBuf>,
    /// Place list file, may be repeated
    #[arg(long)]
    places: Vec<PathBuf>,
    /// Prefix written by `extract`; locates lists in the output directory
    #[arg(long)]
    prefix: Option<String>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogLevelArg {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

impl From<LogLevelArg> for LogLevel {
    fn from(level: LogLevelArg) -> Self {
        match level {
            LogLevelArg::Error => LogLevel::Error,
            LogLevelArg::Warn => LogLevel::Warn,
            LogLevelArg::Info => LogLevel::Info,
            LogLevelArg::Debug => LogLevel::Debug,
            LogLevelArg::Trace => LogLevel::Trace,
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config = Config::load_or_default(&cli.config)?;
    if let Some(level) = cli.log_level {
        config.log_level = level.into();
    }
    if let Some(dir) = cli.output_dir {
        config.output_dir = dir;
    }
    init_logger(config.log_level);
    debug!("Using config: {config:?}");

    match cli.command {
        Command::Extract {
            input,
            prefix,
            max_bytes,
            gazetteer,
        } => {
            if let Some(max_bytes) = max_bytes {
                config.extract.max_bytes = max_bytes;
            }
            if let Some(path) = gazetteer {
                config.extract.recognizer = config::RecognizerConfig::Gazetteer { path };
            }
            if prefix.is_some() {
                config.extract.prefix = prefix;
            }
            config.validate()?;
            run_extract(&input, &config)
        }
        Command::Embed { input, lists } => run_embed(&input, &lists, &config),
        Command::Registry { lists, output } => run_registry(&lists, output, &config),
    }
}

fn init_logger(level: LogLevel) {
    env_logger::Builder::new()
        .filter_level(level.to_level_filter())
        .format_timestamp(None)
        .format_target(false)
        .parse_default_env()
        .init();
}

// ═══════════════════════════════════════════════════════════════════════
//  OUTPUT FILE HELPERS
// ═══════════════════════════════════════════════════════════════════════

fn ensure_output_dir(config: &Config) -> Result<()> {
    fs::create_dir_all(&config.output_dir).with_context(|| {
        format!(
            "Cannot create output directory {}",
            config.output_dir.display()
        )
    })
}

fn output_path(config: &Config, name: &str) -> PathBuf {
    config.output_dir.join(name)
}

/// Resolve and read the person and place lists. Explicit paths win; with
/// only a prefix, the lists `extract` wrote to the output directory are
/// used, City before Province.
fn load_lists(args: &ListArgs, config: &Config) -> Result<(Vec<String>, Vec<String>)> {
    let prefix = args.prefix.as_ref().or(config.extract.prefix.as_ref());

    let persons_path = match (&args.persons, prefix) {
        (Some(path), _) => path.clone(),
        (None, Some(prefix)) => output_path(config, &lists::list_file_name(prefix, EntityLabel::Person)),
        (None, None) => bail!("Pass --persons or --prefix to locate the person list"),
    };

    let place_paths: Vec<PathBuf> = match (args.places.is_empty(), prefix) {
        (false, _) => args.places.clone(),
        (true, Some(prefix)) => [EntityLabel::City, EntityLabel::Province]
            .into_iter()
            .map(|label| output_path(config, &lists::list_file_name(prefix, label)))
            .filter(|path| {
                let exists = path.exists();
                if !exists {
                    warn!("No place list at {}", path.display());
                }
                exists
            })
            .collect(),
        (true, None) => bail!("Pass --places or --prefix to locate the place lists"),
    };

    let persons = lists::read_entity_list(&persons_path)?;
    let mut places = Vec::new();
    for path in &place_paths {
        places.extend(lists::read_entity_list(path)?);
    }
    info!(
        "Read {} persons from {}, {} places from {} file(s)",
        persons.len(),
        persons_path.display(),
        places.len(),
        place_paths.len()
    );
    Ok((persons, places))
}

// ═══════════════════════════════════════════════════════════════════════
//  EXTRACT MODE: plain text → entity lists
// ═══════════════════════════════════════════════════════════════════════

fn run_extract(input: &Path, config: &Config) -> Result<()> {
    let text = fs::read_to_string(input)
        .with_context(|| format!("Cannot read source text {}", input.display()))?;
    let prefix = config
        .extract
        .prefix
        .clone()
        .unwrap_or_else(|| scanner::file_prefix(input));

    let chunker = chunker::Chunker::new(
        config.extract.max_bytes,
        &config.extract.paragraph_separator,
    )?;
    let recognizer = recognizer::from_config(&config.extract.recognizer)
        .context("Cannot set up the recognizer")?;

    let total_chunks = chunker.chunks(&text).len();
    info!(
        "Extracting from {} ({} chars, {} chunks of at most {} bytes) with {}",
        input.display(),
        text.chars().count(),
        total_chunks,
        chunker.max_bytes(),
        recognizer.name()
    );

    let pb = ProgressBar::new(total_chunks as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} chunks ({percent}%)")?
            .progress_chars("=>-"),
    );
    let (mentions, stats) =
        extract::extract_entities(&text, &chunker, recognizer.as_ref(), |_| pb.inc(1))
            .with_context(|| format!("Recognition failed on {}", input.display()))?;
    pb.finish_and_clear();

    let entity_lists = EntityLists::from_mentions(&mentions);

    // ── Write outputs ──────────────────────────────────────────────
    ensure_output_dir(config)?;
    for label in EntityLabel::ALL {
        let path = output_path(config, &lists::list_file_name(&prefix, label));
        lists::write_entity_list(&path, entity_lists.get(label))?;
        info!("  {} ({} entries)", path.display(), entity_lists.get(label).len());
    }

    let records = output_path(config, &format!("{prefix}_entities.tsv"));
    lists::write_records(&records, &mentions)?;
    info!("  {} ({} records)", records.display(), mentions.len());

    let mentions_json = output_path(config, &format!("{prefix}_mentions.json"));
    lists::write_mentions_json(&mentions_json, &mentions)?;
    info!("  {}", mentions_json.display());

    info!(
        "Done: {} chunks, {} entities recognized, {} kept, {} distinct",
        stats.chunks,
        stats.recognized,
        stats.kept,
        entity_lists.total()
    );
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  EMBED MODE: entity lists + TEI → tagged TEI
// ═══════════════════════════════════════════════════════════════════════

fn run_embed(input: &Path, list_args: &ListArgs, config: &Config) -> Result<()> {
    let (persons, places) = load_lists(list_args, config)?;
    let embedder = Embedder::new(persons, places, &config.embed);

    let documents = scanner::scan_documents(input, &config.embed.output_suffix);
    if documents.is_empty() {
        bail!("No XML documents found at {}", input.display());
    }
    info!("Embedding into {} document(s)", documents.len());

    ensure_output_dir(config)?;
    let (mut persons_total, mut places_total) = (0usize, 0usize);

    for path in &documents {
        let xml = fs::read_to_string(path)
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let (tagged, report) = embedder
            .embed_str(&xml)
            .with_context(|| format!("Cannot process {}", path.display()))?;

        let out = embed::tagged_output_path(
            path,
            input,
            &config.output_dir,
            &config.embed.output_suffix,
        );
        if let Some(parent) = out.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Cannot create {}", parent.display()))?;
        }
        fs::write(&out, tagged).with_context(|| format!("Cannot write {}", out.display()))?;

        info!(
            "  {} → {}: {} persName, {} placeName, registry {} persons / {} places",
            path.display(),
            out.display(),
            report.persons_tagged,
            report.places_tagged,
            report.registry.persons,
            report.registry.places
        );
        if report.skipped > 0 {
            debug!("  {} fragments were already detached", report.skipped);
        }
        persons_total += report.persons_tagged;
        places_total += report.places_tagged;
    }

    info!("Done: {persons_total} persons and {places_total} places tagged");
    Ok(())
}

// ═══════════════════════════════════════════════════════════════════════
//  REGISTRY MODE: entity lists → standalone listPerson/listPlace
// ═══════════════════════════════════════════════════════════════════════

fn run_registry(list_args: &ListArgs, output: Option<PathBuf>, config: &Config) -> Result<()> {
    let (persons, places) = load_lists(list_args, config)?;
    let persons = EntityMatcher::new(EntityKind::Person, persons, config.embed.id_scheme);
    let places = EntityMatcher::new(EntityKind::Place, places, config.embed.id_scheme);

    let fragment = registry::render_fragment(&persons, &places);
    let out = match output {
        Some(path) => path,
        None => {
            ensure_output_dir(config)?;
            output_path(config, "registry.xml")
        }
    };
    fs::write(&out, &fragment).with_context(|| format!("Cannot write {}", out.display()))?;
    info!(
        "  {} ({} persons, {} places, {} bytes)",
        out.display(),
        persons.len(),
        places.len(),
        fragment.len()
    );
    Ok(())
}
