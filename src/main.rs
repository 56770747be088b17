//! Thin CLI layer: parse args, styled output, and call into annex-core.
//! Crash-proof: panic caught and reported; errors exit with an errno-style code.

use annex_core::{
    is_binary, is_pointer, load_config, materialize, Annex, AnnexBackend, AnnexConfig,
    AnnexError, AnnexResult, HashKind, ObjectEntry, ObjectId, StoreSpec,
};
use clap::{Arg, ArgAction, ArgMatches, Command};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::env;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

// ---- UI helpers (no-op when stdout isn't a TTY) ----

fn use_color() -> bool {
    std::io::stdout().is_terminal() && env::var("NO_COLOR").unwrap_or_default().is_empty()
}

fn success(msg: &str) {
    if use_color() {
        println!("{}", msg.green());
    } else {
        println!("{}", msg);
    }
}

fn error(msg: &str) {
    if use_color() {
        eprintln!("{}", msg.red());
    } else {
        eprintln!("{}", msg);
    }
}

fn info(msg: &str) {
    if use_color() {
        println!("{}", msg.cyan());
    } else {
        println!("{}", msg);
    }
}

fn dim(msg: &str) {
    if use_color() {
        println!("{}", msg.dimmed());
    } else {
        println!("{}", msg);
    }
}

fn init_logging(quiet: bool, verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("debug")
    } else if quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::try_from_env("ANNEX_LOG").unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn cli() -> Command {
    let files_arg = |help: &'static str| {
        Arg::new("files")
            .required(true)
            .num_args(1..)
            .value_parser(clap::value_parser!(PathBuf))
            .help(help)
    };

    Command::new("annex")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Content-addressed store for binary sources kept out of package trees")
        .after_help(
            "Examples:\n  annex push foo-1.0.tar.gz\n  annex restore foo-1.0.tar.gz\n  annex materialize ./foo\n  annex list --json",
        )
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("annex")
                .long("annex")
                .global(true)
                .help("Annex address: directory, file:// or http(s):// origin (or ANNEX_PATH)"),
        )
        .arg(
            Arg::new("staging")
                .long("staging")
                .global(true)
                .help("Staging directory receiving pushes (or ANNEX_STAGING)"),
        )
        .arg(
            Arg::new("restore-cache")
                .long("restore-cache")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Local directory caching fetched objects (or ANNEX_RESTORE_CACHE)"),
        )
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(clap::value_parser!(PathBuf))
                .help("Directory searched for .annexrc before $HOME (default: current directory)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Only log errors; no progress bar"),
        )
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Debug logging"),
        )
        .subcommand(
            Command::new("get")
                .about("Fetch one object by identifier")
                .arg(Arg::new("id").long("id").required(true).help("Object identifier"))
                .arg(
                    Arg::new("dest")
                        .long("dest")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Where to write the content"),
                ),
        )
        .subcommand(
            Command::new("push")
                .about("Store binary files and replace them with pointers")
                .arg(files_arg("Files to push"))
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Push text files too"),
                ),
        )
        .subcommand(
            Command::new("restore")
                .about("Replace pointers with the content they name")
                .arg(files_arg("Pointer files to restore")),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete an object and its metadata")
                .arg(Arg::new("id").required(true).help("Object identifier")),
        )
        .subcommand(
            Command::new("list").about("List stored objects").arg(
                Arg::new("json")
                    .long("json")
                    .action(ArgAction::SetTrue)
                    .help("Output machine-readable JSON"),
            ),
        )
        .subcommand(
            Command::new("backup")
                .about("Archive the objects named by pointer files into a .tar.gz")
                .arg(
                    Arg::new("pointers")
                        .num_args(0..)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Pointer files"),
                )
                .arg(
                    Arg::new("sources")
                        .long("sources")
                        .action(ArgAction::Append)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Directory whose pointer files are backed up (repeatable)"),
                )
                .arg(
                    Arg::new("output-file")
                        .long("output-file")
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Archive path (default: a new annex-backup*.tar.gz in the temp dir)"),
                ),
        )
        .subcommand(
            Command::new("materialize")
                .about("Copy a directory with its pointers resolved; prints the copy's path")
                .arg(
                    Arg::new("dir")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf))
                        .help("Package directory"),
                )
                .arg(
                    Arg::new("force")
                        .long("force")
                        .action(ArgAction::SetTrue)
                        .help("Copy even when there are no pointers"),
                ),
        )
        .subcommand(
            Command::new("digest")
                .about("Print the identifier a file would be stored under")
                .arg(
                    Arg::new("file")
                        .required(true)
                        .value_parser(clap::value_parser!(PathBuf)),
                )
                .arg(
                    Arg::new("legacy")
                        .long("legacy")
                        .action(ArgAction::SetTrue)
                        .help("Use the 128-bit MD5 digest of older stores"),
                ),
        )
}

/// File config, then environment, then flags.
fn resolve_config(matches: &ArgMatches) -> AnnexResult<AnnexConfig> {
    let dir = match matches.get_one::<PathBuf>("config") {
        Some(d) => d.clone(),
        None => env::current_dir().unwrap_or_else(|_| PathBuf::from(".")),
    };
    let mut config = load_config(&dir)?;
    config.apply_env()?;
    if let Some(a) = matches.get_one::<String>("annex") {
        config.annex = Some(StoreSpec::parse(a)?);
    }
    if let Some(s) = matches.get_one::<String>("staging") {
        config.staging = Some(StoreSpec::parse(s)?);
    }
    if let Some(c) = matches.get_one::<PathBuf>("restore-cache") {
        config.restore_cache = Some(c.clone());
    }
    Ok(config)
}

fn format_date(secs: i64) -> String {
    chrono::DateTime::from_timestamp(secs, 0)
        .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
        .unwrap_or_else(|| secs.to_string())
}

fn print_table(entries: &[ObjectEntry]) {
    if entries.is_empty() {
        dim("Annex is empty.");
        return;
    }
    let id_width = entries.iter().map(|e| e.name.len()).max().unwrap_or(2);
    println!("{:<id_width$}  {:>12}  {:<19}  FILENAMES", "ID", "SIZE", "DATE");
    for e in entries {
        println!(
            "{:<id_width$}  {:>12}  {:<19}  {}",
            e.name,
            e.size,
            format_date(e.inserted),
            e.filenames.join(", ")
        );
    }
}

/// Pointer files among the direct entries of `dir`, sorted.
fn pointers_in(dir: &Path) -> AnnexResult<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(AnnexError::Config(format!("{} is not a directory", dir.display())));
    }
    Ok(annex_core::utils::sorted_entries(dir)?
        .into_iter()
        .filter(|p| p.is_file() && is_pointer(p))
        .collect())
}

fn progress_bar(quiet: bool) -> ProgressBar {
    if quiet || !std::io::stderr().is_terminal() {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(0);
    if let Ok(style) = ProgressStyle::default_bar().template("{bar:40.cyan/blue} {pos}/{len} objects") {
        pb.set_style(style);
    }
    pb
}

fn run() -> AnnexResult<()> {
    let matches = cli().get_matches();
    let quiet = matches.get_flag("quiet");
    init_logging(quiet, matches.get_flag("verbose"));

    if let Some(("digest", sub_m)) = matches.subcommand() {
        let Some(file) = sub_m.get_one::<PathBuf>("file") else {
            return Ok(());
        };
        let kind = if sub_m.get_flag("legacy") {
            HashKind::Md5
        } else {
            HashKind::Sha3_256
        };
        println!("{}", annex_core::digest_with(file, kind)?);
        return Ok(());
    }

    let config = resolve_config(&matches)?;
    let annex = Annex::open(&config)?;

    match matches.subcommand() {
        Some(("get", sub_m)) => {
            let id = sub_m.get_one::<String>("id").map(String::as_str).unwrap_or_default();
            let id = ObjectId::parse(id)?;
            if let Some(dest) = sub_m.get_one::<PathBuf>("dest") {
                annex.fetch(&id, dest)?;
                success(&format!("{} -> {}", id, dest.display()));
            }
        }
        Some(("push", sub_m)) => {
            let force = sub_m.get_flag("force");
            for file in sub_m.get_many::<PathBuf>("files").into_iter().flatten() {
                let label = file.display();
                if is_pointer(file) {
                    dim(&format!("{}: already pointing to annex", label));
                } else if !force && !is_binary(file)? {
                    dim(&format!("{}: not binary, ignoring", label));
                } else {
                    let id = annex.import(file)?;
                    success(&format!("{}: {}", label, id));
                }
            }
        }
        Some(("restore", sub_m)) => {
            for file in sub_m.get_many::<PathBuf>("files").into_iter().flatten() {
                if is_pointer(file) {
                    let id = annex.restore(file)?;
                    success(&format!("{}: restored {}", file.display(), id));
                } else {
                    dim(&format!("{}: not a pointer, ignoring", file.display()));
                }
            }
        }
        Some(("delete", sub_m)) => {
            let id = sub_m.get_one::<String>("id").map(String::as_str).unwrap_or_default();
            let id = ObjectId::parse(id)?;
            annex.delete(&id)?;
            success(&format!("Deleted {}", id));
        }
        Some(("list", sub_m)) => {
            let entries = annex.list()?;
            if sub_m.get_flag("json") {
                let json = serde_json::to_string_pretty(&entries)
                    .map_err(|e| AnnexError::Config(e.to_string()))?;
                println!("{}", json);
            } else {
                print_table(&entries);
            }
        }
        Some(("backup", sub_m)) => {
            let mut pointers: Vec<PathBuf> = sub_m
                .get_many::<PathBuf>("pointers")
                .into_iter()
                .flatten()
                .cloned()
                .collect();
            for dir in sub_m.get_many::<PathBuf>("sources").into_iter().flatten() {
                pointers.extend(pointers_in(dir)?);
            }
            if pointers.is_empty() {
                return Err(AnnexError::Config(
                    "nothing to back up: pass pointer files or --sources DIR".to_string(),
                ));
            }
            let pb = progress_bar(quiet);
            let output = annex.backup_pointers(
                &pointers,
                sub_m.get_one::<PathBuf>("output-file").map(PathBuf::as_path),
                &mut |done, total| {
                    pb.set_length(total as u64);
                    pb.set_position(done as u64);
                },
            )?;
            pb.finish_and_clear();
            success(&format!("Backup written to {}", output.display()));
        }
        Some(("materialize", sub_m)) => {
            let Some(dir) = sub_m.get_one::<PathBuf>("dir") else {
                return Ok(());
            };
            let workspace = materialize(&annex, dir, sub_m.get_flag("force"))?;
            match workspace.keep() {
                Some(path) => println!("{}", path.display()),
                None => info(&format!("{} has no pointers; use it as is", dir.display())),
            }
        }
        _ => {}
    }
    Ok(())
}

fn main() {
    if !use_color() {
        colored::control::set_override(false);
    }

    let code = match std::panic::catch_unwind(run) {
        Ok(Ok(())) => 0,
        Ok(Err(e)) => {
            error(&format!("Error: {}", e));
            e.exit_code()
        }
        Err(_) => {
            error("An unexpected error occurred. Please report this issue.");
            1
        }
    };
    std::process::exit(code);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_definition_is_consistent() {
        cli().debug_assert();
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date(0), "1970-01-01 00:00:00");
        assert_eq!(format_date(1_704_207_845), "2024-01-02 15:04:05");
    }
}
