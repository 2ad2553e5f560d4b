use crate::{
    config::AppConfig,
    extract::ExtractEvent,
    inspect::{InspectEvent, InspectOverrides},
    mods::Mod,
    remote::RemoteCatalog,
    session::{ImportSession, SessionMessage},
};
use anyhow::{bail, Context, Result};
use serde::Serialize;
use std::{
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Text,
    Json,
}

impl OutputFormat {
    fn parse(value: &str) -> Option<Self> {
        match value {
            "json" => Some(OutputFormat::Json),
            "text" => Some(OutputFormat::Text),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerbosity {
    Quiet,
    Normal,
    Verbose,
    Debug,
    Trace,
}

impl CliVerbosity {
    fn parse(level: &str) -> Option<Self> {
        match level {
            "quiet" | "minimal" => Some(CliVerbosity::Quiet),
            "normal" => Some(CliVerbosity::Normal),
            "verbose" | "info" => Some(CliVerbosity::Verbose),
            "debug" => Some(CliVerbosity::Debug),
            "trace" => Some(CliVerbosity::Trace),
            _ => None,
        }
    }

    fn from_flag_count(count: usize) -> Self {
        match count {
            0 => CliVerbosity::Normal,
            1 => CliVerbosity::Verbose,
            2 => CliVerbosity::Debug,
            _ => CliVerbosity::Trace,
        }
    }

    fn filter(self) -> &'static str {
        match self {
            CliVerbosity::Quiet => "error",
            CliVerbosity::Normal => "warn",
            CliVerbosity::Verbose => "info",
            CliVerbosity::Debug => "debug",
            CliVerbosity::Trace => "trace",
        }
    }

    fn narrates(self) -> bool {
        self != CliVerbosity::Quiet
    }
}

#[derive(Debug)]
struct GlobalOptions {
    config_path: Option<PathBuf>,
    offline: bool,
    verbosity: CliVerbosity,
}

#[derive(Debug)]
enum CliCommand {
    Inspect(InspectArgs),
    Import(ImportArgs),
    Help,
    Version,
}

#[derive(Debug)]
struct InspectArgs {
    archive: PathBuf,
    format: OutputFormat,
    overrides: InspectOverrides,
}

#[derive(Debug)]
struct ImportArgs {
    archive: PathBuf,
    select: Vec<String>,
    compress: bool,
    overrides: InspectOverrides,
}

pub fn run() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();
    let (global, command) = parse_args(&args)?;
    init_logging(global.verbosity);

    match command {
        CliCommand::Help => {
            print_help();
            Ok(())
        }
        CliCommand::Version => {
            println!("TweakSmith v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        CliCommand::Inspect(inspect) => {
            let session = open_session(&global)?.1;
            let mods = run_inspection(&session, &inspect.archive, &inspect.overrides, &global)?;
            print_mods(&mods, inspect.format)
        }
        CliCommand::Import(import) => {
            let (config, session) = open_session(&global)?;
            run_import(&config, &session, import, &global)
        }
    }
}

fn init_logging(verbosity: CliVerbosity) {
    let env = env_logger::Env::default().default_filter_or(verbosity.filter());
    let _ = env_logger::Builder::from_env(env)
        .format_timestamp(None)
        .format_target(false)
        .try_init();
}

fn parse_args(args: &[String]) -> Result<(GlobalOptions, CliCommand)> {
    let (global, tokens) = parse_global_options(args)?;
    let command = match tokens.first().map(String::as_str) {
        None | Some("help" | "--help" | "-h") => CliCommand::Help,
        Some("version" | "--version" | "-V") => CliCommand::Version,
        Some("inspect") => CliCommand::Inspect(parse_inspect(&tokens[1..])?),
        Some("import") => CliCommand::Import(parse_import(&tokens[1..])?),
        Some(other) => bail!("Unknown command: {other} (see 'tweaksmith help')"),
    };
    Ok((global, command))
}

fn parse_global_options(args: &[String]) -> Result<(GlobalOptions, Vec<String>)> {
    let mut config_path = None;
    let mut offline = false;
    let mut verbosity = CliVerbosity::Normal;
    let mut tokens = Vec::new();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter.next().context("--config requires a path")?;
                config_path = Some(PathBuf::from(value));
            }
            value if value.starts_with("--config=") => {
                config_path = Some(PathBuf::from(value.trim_start_matches("--config=")));
            }
            "--offline" => offline = true,
            "-q" | "--quiet" => verbosity = CliVerbosity::Quiet,
            "--verbose" => verbosity = CliVerbosity::Verbose,
            "--verbosity" => {
                let level = iter.next().context("--verbosity requires a level")?;
                verbosity = CliVerbosity::parse(level)
                    .with_context(|| format!("Unknown verbosity: {level}"))?;
            }
            value if value.starts_with("-v") && value[1..].chars().all(|ch| ch == 'v') => {
                verbosity = CliVerbosity::from_flag_count(value.len() - 1);
            }
            _ => tokens.push(arg.to_string()),
        }
    }

    Ok((
        GlobalOptions {
            config_path,
            offline,
            verbosity,
        },
        tokens,
    ))
}

fn parse_inspect(args: &[String]) -> Result<InspectArgs> {
    let mut archive = None;
    let mut format = OutputFormat::Text;
    let mut overrides = InspectOverrides::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--format" => {
                let value = iter.next().context("--format requires a value")?;
                format = parse_format(value)?;
            }
            value if value.starts_with("--format=") => {
                format = parse_format(value.trim_start_matches("--format="))?;
            }
            "--hash" | "--size" => parse_override(arg, iter.next(), &mut overrides)?,
            value if value.starts_with('-') => bail!("Unknown inspect option: {value}"),
            value => set_archive(&mut archive, value)?,
        }
    }

    Ok(InspectArgs {
        archive: archive.context("inspect requires an archive path")?,
        format,
        overrides,
    })
}

fn parse_import(args: &[String]) -> Result<ImportArgs> {
    let mut archive = None;
    let mut select = Vec::new();
    let mut compress = false;
    let mut overrides = InspectOverrides::default();
    let mut iter = args.iter();

    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--select" => {
                let name = iter.next().context("--select requires a mod name")?;
                select.push(name.to_string());
            }
            value if value.starts_with("--select=") => {
                select.push(value.trim_start_matches("--select=").to_string());
            }
            "--compress" => compress = true,
            "--hash" | "--size" => parse_override(arg, iter.next(), &mut overrides)?,
            value if value.starts_with('-') => bail!("Unknown import option: {value}"),
            value => set_archive(&mut archive, value)?,
        }
    }

    Ok(ImportArgs {
        archive: archive.context("import requires an archive path")?,
        select,
        compress,
        overrides,
    })
}

fn parse_format(value: &str) -> Result<OutputFormat> {
    OutputFormat::parse(value)
        .with_context(|| format!("Unknown format: {value} (use json or text)"))
}

fn parse_override(
    flag: &str,
    value: Option<&String>,
    overrides: &mut InspectOverrides,
) -> Result<()> {
    let value = value.with_context(|| format!("{flag} requires a value"))?;
    if flag == "--hash" {
        overrides.hash = Some(value.to_string());
    } else {
        let size = value
            .parse::<u64>()
            .with_context(|| format!("--size expects a byte count, got {value}"))?;
        overrides.size = Some(size);
    }
    Ok(())
}

fn set_archive(archive: &mut Option<PathBuf>, value: &str) -> Result<()> {
    if archive.is_some() {
        bail!("Only one archive may be given (extra: {value})");
    }
    *archive = Some(PathBuf::from(value));
    Ok(())
}

fn open_session(global: &GlobalOptions) -> Result<(AppConfig, ImportSession)> {
    let mut config = match &global.config_path {
        Some(path) => AppConfig::load_or_create_at(path)?,
        None => AppConfig::load_or_create()?,
    };
    if global.offline {
        config.offline = true;
    }
    log::debug!(
        "Library: {}, cache: {}, offline: {}",
        config.library_dir.display(),
        config.cache_dir.display(),
        config.offline
    );
    let catalog = Arc::new(RemoteCatalog::from_config(&config));
    Ok((config, ImportSession::new(catalog)))
}

fn run_inspection(
    session: &ImportSession,
    archive: &Path,
    overrides: &InspectOverrides,
    global: &GlobalOptions,
) -> Result<Vec<Mod>> {
    session.start_inspection(archive.to_path_buf(), overrides.clone())?;
    while let Some(message) = session.recv() {
        match message {
            SessionMessage::Inspection(InspectEvent::Status(text)) => {
                if global.verbosity.narrates() {
                    eprintln!("{text}");
                }
            }
            SessionMessage::Inspection(InspectEvent::ModFound(found)) => {
                if global.verbosity.narrates() {
                    eprintln!("Found {} ({})", found.name, found.game);
                }
            }
            SessionMessage::InspectionCompleted { mods, .. } => return Ok(mods),
            SessionMessage::InspectionFailed { archive, error } => {
                bail!("Could not inspect {}: {error}", archive.display())
            }
            _ => {}
        }
    }
    bail!("inspection worker stopped unexpectedly")
}

fn run_import(
    config: &AppConfig,
    session: &ImportSession,
    import: ImportArgs,
    global: &GlobalOptions,
) -> Result<()> {
    let mut mods = run_inspection(session, &import.archive, &import.overrides, global)?;
    if mods.is_empty() {
        println!("No importable mods in {}", import.archive.display());
        return Ok(());
    }

    apply_selection(&mut mods, &import.select);
    let selected = mods.iter().filter(|m| m.selected_for_import).count();
    if selected == 0 {
        bail!(
            "None of the requested mods are in {} (found: {})",
            import.archive.display(),
            mods.iter()
                .map(|m| m.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut options = config.extract_options();
    options.compress_packages |= import.compress;
    session.start_extraction(import.archive.clone(), mods, options)?;

    let mut stderr = io::stderr();
    while let Some(message) = session.recv() {
        match message {
            SessionMessage::Extraction(ExtractEvent::Status(text)) => {
                if global.verbosity.narrates() {
                    eprintln!("{text}");
                }
            }
            SessionMessage::Extraction(ExtractEvent::Progress(percent)) => {
                if global.verbosity.narrates() {
                    let _ = write!(stderr, "\r{percent:>3}%");
                    if percent == 100 {
                        let _ = writeln!(stderr);
                    }
                    let _ = stderr.flush();
                }
            }
            SessionMessage::Extraction(ExtractEvent::Finished { name, destination }) => {
                println!("Imported {name} -> {}", destination.display());
            }
            SessionMessage::ExtractionCompleted { extracted, .. } => {
                println!(
                    "Imported {} of {} mod(s) from {}",
                    extracted.len(),
                    selected,
                    import.archive.display()
                );
                return Ok(());
            }
            SessionMessage::ExtractionFailed { archive, error } => {
                bail!("Import from {} failed: {error}", archive.display())
            }
            _ => {}
        }
    }
    bail!("extraction worker stopped unexpectedly")
}

/// With no names every mod stays selected; otherwise only named mods are.
fn apply_selection(mods: &mut [Mod], names: &[String]) {
    if names.is_empty() {
        return;
    }
    for candidate in mods {
        candidate.selected_for_import = names
            .iter()
            .any(|name| name.trim().eq_ignore_ascii_case(&candidate.name));
    }
}

#[derive(Serialize)]
struct ModListItem {
    name: String,
    game: String,
    version: String,
    unofficial: bool,
    #[serde(rename = "virtual")]
    is_virtual: bool,
    developer: Option<String>,
    site: Option<String>,
    description: Option<String>,
    update_code: Option<u32>,
    anchor_dir: String,
}

fn print_mods(mods: &[Mod], format: OutputFormat) -> Result<()> {
    let mut items: Vec<ModListItem> = mods
        .iter()
        .map(|m| ModListItem {
            name: m.name.clone(),
            game: m.game.as_str().to_string(),
            version: m.display_version().to_string(),
            unofficial: m.unofficial,
            is_virtual: m.is_virtual,
            developer: m.developer.clone(),
            site: m.site.clone(),
            description: m.description.clone(),
            update_code: m.update_code,
            anchor_dir: m.anchor_dir.clone(),
        })
        .collect();
    items.sort_by(|a, b| a.name.to_ascii_lowercase().cmp(&b.name.to_ascii_lowercase()));

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&items)?);
        }
        OutputFormat::Text => {
            if items.is_empty() {
                println!("No importable mods found");
            }
            for item in items {
                let kind = if item.unofficial { "unofficial" } else { "descriptor" };
                println!(
                    "{game:<4} {version:<8} {kind:<10} {name}",
                    game = item.game,
                    version = item.version,
                    name = item.name
                );
            }
        }
    }

    Ok(())
}

fn print_help() {
    println!("TweakSmith v{}", env!("CARGO_PKG_VERSION"));
    println!("Usage:");
    println!("  tweaksmith inspect <archive>      List the mods inside an archive");
    println!("  tweaksmith import <archive>       Extract mods into the library");
    println!("  tweaksmith version                Show version");
    println!("  tweaksmith help                   Show this help");
    println!();
    println!("Inspect options:");
    println!("  --format <json|text>              Output format (default text)");
    println!("  --hash <md5>                      Use this archive hash instead of hashing");
    println!("  --size <bytes>                    Use this archive size");
    println!();
    println!("Import options:");
    println!("  --select <name>                   Import only this mod (repeatable)");
    println!("  --compress                        Request package compression");
    println!("  --hash <md5>, --size <bytes>      As for inspect");
    println!();
    println!("Global options:");
    println!("  --config <path>                   Config file (default in the data dir)");
    println!("  --offline                         Use cached catalog data only");
    println!("  -q, --quiet                       Errors only");
    println!("  -v, -vv, -vvv                     Increase verbosity");
    println!("  --verbosity <level>               quiet | normal | verbose | debug | trace");
    println!("  --verbose                         Alias for --verbosity verbose");
}
