use anyhow::{bail, Context, Result};
use std::path::PathBuf;
use std::sync::mpsc;
use std::thread;

use lumio::config::Config;
use lumio::db::Database;
use lumio::export::{self, ExportFormat, ExportOutcome, ManifestOptions};
use lumio::filters::graph::replay_asset;
use lumio::filters::FilterOp;
use lumio::hashing::{compute_hashes, similar_by_content};
use lumio::logging;
use lumio::model::STAMP_FORMAT;
use lumio::query::{Order, QueryOptions};
use lumio::scanner::{ImportProgress, Importer};
use lumio::similarity::SimilarityIndex;
use lumio::tags::sort_tags;
use lumio::tasks::{TaskProgress, WorkerPool};
use lumio::transcoder::Transcoder;
use lumio::Asset;

struct Cli {
    config_path: Option<PathBuf>,
    command: String,
    args: Vec<String>,
}

fn parse_args() -> Cli {
    let args: Vec<String> = std::env::args().collect();
    let mut config_path = None;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--help" | "-h" => {
                print_help();
                std::process::exit(0);
            }
            "--version" | "-V" => {
                println!("lumio {}", env!("CARGO_PKG_VERSION"));
                std::process::exit(0);
            }
            "--config" | "-c" => {
                if i + 1 < args.len() {
                    config_path = Some(PathBuf::from(&args[i + 1]));
                    i += 1;
                } else {
                    eprintln!("Error: --config requires a path argument");
                    std::process::exit(1);
                }
            }
            _ => break,
        }
        i += 1;
    }

    if i >= args.len() {
        print_help();
        std::process::exit(1);
    }

    Cli {
        config_path,
        command: args[i].clone(),
        args: args[i + 1..].to_vec(),
    }
}

fn print_help() {
    println!(
        r#"lumio - photo, audio and video library

USAGE:
    lumio [OPTIONS] COMMAND [ARGS]

COMMANDS:
    init                                Create the library database
    import [--tag T]... PATH...         Import media files under PATHs
    ls [--order KEY] [--limit N] [--offset N] [QUERY]
                                        List assets matching QUERY
    tag add|rm SLUG TAG...              Add or remove tags
    filter add SLUG NAME [ARGS...]      Append an edit operation
    filter rm SLUG NAME [INDEX]         Remove an edit operation (default: last)
    filter ls SLUG                      Show edit operations and the result geometry
    stamp SLUG WHEN                     Set (2019-07-04 09:30:00) or shift (+1d -2h) a timestamp
    hash [--threads N] [QUERY]          Compute content hashes
    similar SLUG [--method M] [--distance D]
                                        Assets with near-identical content
    related SLUG [--threshold X] [--limit N]
                                        Assets with overlapping tags
    plan SLUG [--format F] OUTPUT       Print the transcoder commands for an export
    export DIR [--format F] [--overwrite] [QUERY]
                                        Export matching assets
    bundle DIR [--format F]... [--hide RE]... [--metadata] [--datetime] [--omnipresent] [QUERY]
                                        Export with an index.json manifest
    rm SLUG...                          Delete assets

QUERY:
    Tags, "quoted text", photo|audio|video, before:DATE, after:DATE, during:DATE,
    path:TEXT, slug:PREFIX, hash:[METHOD=]NIBBLES, combined with spaces (and),
    "or", "not" and parentheses.

OPTIONS:
    --config, -c PATH   Path to config file
    --version, -V       Show version
    --help, -h          Show this help message

ENVIRONMENT:
    LUMIO_CONFIG        Path to config file (overrides default location)
    LUMIO_LOG           Log filter (trace, debug, info, warn, error)

Config file location: $XDG_CONFIG_HOME/lumio/config.toml"#
    );
}

/// Remove `--name VALUE` pairs from `args`, returning the values in order.
fn take_values(args: &mut Vec<String>, name: &str) -> Result<Vec<String>> {
    let mut values = Vec::new();
    let mut i = 0;
    while i < args.len() {
        if args[i] == name {
            if i + 1 >= args.len() {
                bail!("{name} requires a value");
            }
            values.push(args.remove(i + 1));
            args.remove(i);
        } else {
            i += 1;
        }
    }
    Ok(values)
}

fn take_value(args: &mut Vec<String>, name: &str) -> Result<Option<String>> {
    Ok(take_values(args, name)?.pop())
}

fn take_switch(args: &mut Vec<String>, name: &str) -> bool {
    let before = args.len();
    args.retain(|a| a != name);
    args.len() != before
}

fn take_parsed<T>(args: &mut Vec<String>, name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    take_value(args, name)?
        .map(|raw| raw.parse::<T>().with_context(|| format!("invalid {name} {raw:?}")))
        .transpose()
}

fn require<'a>(args: &'a [String], index: usize, what: &str) -> Result<&'a str> {
    args.get(index)
        .map(String::as_str)
        .with_context(|| format!("missing {what}"))
}

fn describe(asset: &Asset) -> String {
    let stamp = asset
        .stamp
        .map(|s| s.format(STAMP_FORMAT).to_string())
        .unwrap_or_else(|| "-".to_string());
    let tags = sort_tags(asset.tags.iter().cloned()).join(" ");
    format!("{}  {:<5}  {}  {}  [{}]", asset.slug, asset.medium.as_str(), stamp, asset.path, tags)
}

/// Print task progress on stderr until the sender is dropped.
fn spawn_progress_printer() -> (mpsc::Sender<TaskProgress>, thread::JoinHandle<()>) {
    let (tx, rx) = mpsc::channel();
    let handle = thread::spawn(move || {
        for update in rx {
            match update {
                TaskProgress::Started { total } => eprintln!("Processing {total} items"),
                TaskProgress::Finished { current, total, item, error } => match error {
                    Some(e) => eprintln!("[{current}/{total}] {item}: {e}"),
                    None => eprintln!("[{current}/{total}] {item}"),
                },
                TaskProgress::Completed { succeeded, failed } => {
                    eprintln!("Done: {succeeded} succeeded, {failed} failed")
                }
            }
        }
    });
    (tx, handle)
}

fn cmd_import(config: &Config, db: &Database, mut args: Vec<String>) -> Result<()> {
    let tags = take_values(&mut args, "--tag")?;
    if args.is_empty() {
        bail!("import needs at least one path");
    }
    let roots: Vec<PathBuf> = args.iter().map(PathBuf::from).collect();

    let (tx, rx) = mpsc::channel();
    let printer = thread::spawn(move || {
        for update in rx {
            match update {
                ImportProgress::Started { total_files } => eprintln!("Found {total_files} files"),
                ImportProgress::Importing { current, total, path } => {
                    eprintln!("[{current}/{total}] {path}")
                }
                ImportProgress::Error { message } => eprintln!("{message}"),
                ImportProgress::Completed { .. } => {}
            }
        }
    });

    let result = Importer::new(config).import(&roots, &tags, db, Some(tx))?;
    let _ = printer.join();
    println!(
        "Imported {} of {} files ({} already present, {} failed)",
        result.imported, result.total_found, result.skipped, result.failed
    );
    Ok(())
}

fn cmd_ls(db: &Database, mut args: Vec<String>) -> Result<()> {
    let options = QueryOptions {
        order: take_parsed::<Order>(&mut args, "--order")?,
        limit: take_parsed(&mut args, "--limit")?,
        offset: take_parsed(&mut args, "--offset")?.unwrap_or(0),
    };
    for asset in db.assets(&args.join(" "), &options)? {
        println!("{}", describe(&asset));
    }
    Ok(())
}

fn cmd_tag(db: &Database, args: Vec<String>) -> Result<()> {
    let action = require(&args, 0, "tag action (add or rm)")?;
    let asset = db.require_asset(require(&args, 1, "slug")?)?;
    for tag in &args[2..] {
        match action {
            "add" => {
                db.add_tag(asset.id, tag)?;
            }
            "rm" => {
                if !db.remove_tag(asset.id, tag)? {
                    eprintln!("{} does not have tag {tag:?}", asset.slug);
                }
            }
            other => bail!("unknown tag action {other:?}"),
        }
    }
    println!("{}", describe(&db.require_asset(&asset.slug)?));
    Ok(())
}

fn cmd_filter(db: &Database, args: Vec<String>) -> Result<()> {
    let action = require(&args, 0, "filter action (add, rm or ls)")?;
    let mut asset = db.require_asset(require(&args, 1, "slug")?)?;
    match action {
        "add" => {
            let name = require(&args, 2, "filter name")?;
            let values = args[3..]
                .iter()
                .map(|v| v.parse::<f64>().with_context(|| format!("invalid argument {v:?}")))
                .collect::<Result<Vec<_>>>()?;
            let op = FilterOp::from_args(name, &values)?;
            db.add_filter(&mut asset, &op)?;
        }
        "rm" => {
            let name = require(&args, 2, "filter name")?;
            let index = match args.get(3) {
                Some(raw) => raw.parse().with_context(|| format!("invalid index {raw:?}"))?,
                None => -1,
            };
            db.remove_filter(&mut asset, name, index)?;
        }
        "ls" => {}
        other => bail!("unknown filter action {other:?}"),
    }

    for (i, entry) in asset.filters.entries().iter().enumerate() {
        println!("{i}: {entry}");
    }
    let replay = replay_asset(&asset);
    println!(
        "geometry: {}x{}, {} slices, duration {}",
        replay.geometry.width,
        replay.geometry.height,
        replay.slices.len(),
        replay.geometry.duration
    );
    Ok(())
}

fn cmd_stamp(db: &Database, args: Vec<String>) -> Result<()> {
    let mut asset = db.require_asset(require(&args, 0, "slug")?)?;
    let when = args[1..].join(" ");
    if when.is_empty() {
        bail!("missing timestamp or shift");
    }
    db.update_stamp(&mut asset, &when)?;
    println!("{}", describe(&asset));
    Ok(())
}

fn cmd_hash(config: &Config, db: &Database, mut args: Vec<String>) -> Result<()> {
    let threads = take_parsed(&mut args, "--threads")?.unwrap_or(config.export.threads);
    let assets = db.assets(&args.join(" "), &QueryOptions::default())?;
    let pool = WorkerPool::new(threads)?;
    let transcoder = Transcoder::from_config(&config.tools);

    let (tx, printer) = spawn_progress_printer();
    let results = pool.run(
        &assets,
        |asset| asset.slug.clone(),
        Some(&tx),
        |asset| compute_hashes(asset, &config.hashing, &transcoder),
    );
    drop(tx);
    let _ = printer.join();

    for (asset, result) in assets.iter().zip(results) {
        if let Ok(hashes) = result {
            db.replace_hashes(asset.id, &hashes)?;
        }
    }
    Ok(())
}

fn cmd_similar(config: &Config, db: &Database, mut args: Vec<String>) -> Result<()> {
    let method = take_value(&mut args, "--method")?.unwrap_or_else(|| config.similarity.method.clone());
    let distance = take_parsed(&mut args, "--distance")?.unwrap_or(config.similarity.max_distance);
    let asset = db.require_asset(require(&args, 0, "slug")?)?;

    let ids = similar_by_content(db, asset.id, &method, distance)?;
    for similar in db.assets_by_ids(&ids, &QueryOptions::default())? {
        println!("{}", describe(&similar));
    }
    Ok(())
}

fn cmd_related(config: &Config, db: &Database, mut args: Vec<String>) -> Result<()> {
    let threshold = take_parsed(&mut args, "--threshold")?.unwrap_or(config.similarity.tag_threshold);
    let limit = take_parsed(&mut args, "--limit")?.unwrap_or(config.similarity.limit);
    let asset = db.require_asset(require(&args, 0, "slug")?)?;

    let index = SimilarityIndex::build(db.tag_assignments()?);
    for (id, score) in index.related(asset.id, threshold, limit) {
        if let Some(related) = db.get_asset(id)? {
            println!("{score:.3}  {}", describe(&related));
        }
    }
    Ok(())
}

fn cmd_plan(config: &Config, db: &Database, mut args: Vec<String>) -> Result<()> {
    let format: ExportFormat = take_value(&mut args, "--format")?
        .unwrap_or_else(|| config.export.format.clone())
        .parse()?;
    let asset = db.require_asset(require(&args, 0, "slug")?)?;
    let output = PathBuf::from(require(&args, 1, "output path")?);

    let plan = export::plan_export(&asset, &output, &format)?;
    for command in plan.commands {
        let quoted: Vec<String> = command
            .iter()
            .map(|a| if a.contains(&[' ', ';', '[', '\''][..]) { format!("\"{a}\"") } else { a.clone() })
            .collect();
        println!("{} {}", config.tools.ffmpeg.display(), quoted.join(" "));
    }
    Ok(())
}

fn cmd_export(config: &Config, db: &Database, mut args: Vec<String>) -> Result<()> {
    let format: ExportFormat = take_value(&mut args, "--format")?
        .unwrap_or_else(|| config.export.format.clone())
        .parse()?;
    let overwrite = take_switch(&mut args, "--overwrite") || config.export.overwrite;
    if args.is_empty() {
        bail!("export needs an output directory");
    }
    let dir = PathBuf::from(args.remove(0));
    let assets = db.assets(&args.join(" "), &QueryOptions::default())?;

    let pool = WorkerPool::new(config.export.threads)?;
    let transcoder = Transcoder::from_config(&config.tools);
    let (tx, printer) = spawn_progress_printer();
    let results = pool.run(
        &assets,
        |asset| asset.slug.clone(),
        Some(&tx),
        |asset| export::export_asset(asset, &dir, None, &format, overwrite, &transcoder),
    );
    drop(tx);
    let _ = printer.join();

    let skipped = results
        .iter()
        .filter(|r| matches!(r, Ok(ExportOutcome::Skipped(_))))
        .count();
    if skipped > 0 {
        println!("{skipped} existing files left in place (use --overwrite to replace)");
    }
    Ok(())
}

fn cmd_bundle(config: &Config, db: &Database, mut args: Vec<String>) -> Result<()> {
    let mut formats = take_values(&mut args, "--format")?
        .iter()
        .map(|f| f.parse::<ExportFormat>())
        .collect::<lumio::Result<Vec<_>>>()?;
    if formats.is_empty() {
        formats.push(config.export.format.parse()?);
    }
    let mut hide_tags = config.export.hide_tags.clone();
    hide_tags.extend(take_values(&mut args, "--hide")?);
    let options = ManifestOptions {
        hide_tags,
        include_metadata: take_switch(&mut args, "--metadata"),
        include_datetime: take_switch(&mut args, "--datetime"),
        include_omnipresent: take_switch(&mut args, "--omnipresent"),
    };
    let overwrite = take_switch(&mut args, "--overwrite") || config.export.overwrite;
    if args.is_empty() {
        bail!("bundle needs an output directory");
    }
    let root = PathBuf::from(args.remove(0));
    let assets = db.assets(&args.join(" "), &QueryOptions::default())?;

    let pool = WorkerPool::new(config.export.threads)?;
    let transcoder = Transcoder::from_config(&config.tools);
    let (tx, printer) = spawn_progress_printer();
    let outcome = export::export_bundle(
        &assets,
        &root,
        &formats,
        &options,
        overwrite,
        &pool,
        &transcoder,
        Some(&tx),
    );
    drop(tx);
    let _ = printer.join();

    let (manifest, report) = outcome?;
    println!(
        "Wrote {} files, skipped {}, failed {}; {} tags in {}",
        report.written,
        report.skipped,
        report.failed,
        manifest.tags.len(),
        root.join("index.json").display()
    );
    Ok(())
}

fn cmd_rm(db: &Database, args: Vec<String>) -> Result<()> {
    if args.is_empty() {
        bail!("rm needs at least one slug");
    }
    for slug in &args {
        let asset = db.require_asset(slug)?;
        db.delete_asset(asset.id)?;
        println!("Deleted {slug}");
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = parse_args();

    // Logging is best effort; a second subscriber or an unwritable log dir is not fatal
    let _ = logging::init(None);

    let config = match &cli.config_path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let db = Database::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;
    db.initialize()?;

    match cli.command.as_str() {
        "init" => {
            println!("Library ready at {}", config.db_path.display());
            Ok(())
        }
        "import" => cmd_import(&config, &db, cli.args),
        "ls" => cmd_ls(&db, cli.args),
        "tag" => cmd_tag(&db, cli.args),
        "filter" => cmd_filter(&db, cli.args),
        "stamp" => cmd_stamp(&db, cli.args),
        "hash" => cmd_hash(&config, &db, cli.args),
        "similar" => cmd_similar(&config, &db, cli.args),
        "related" => cmd_related(&config, &db, cli.args),
        "plan" => cmd_plan(&config, &db, cli.args),
        "export" => cmd_export(&config, &db, cli.args),
        "bundle" => cmd_bundle(&config, &db, cli.args),
        "rm" => cmd_rm(&db, cli.args),
        other => {
            eprintln!("Unknown command: {other}");
            print_help();
            std::process::exit(1);
        }
    }
}
