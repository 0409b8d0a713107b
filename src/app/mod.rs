mod episode;
mod session;


use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use crate::cli::{Cli, Command};
use crate::config::{self, Config};
use crate::db::Database;
use crate::paths::{config_file_path, database_file_path};

use self::episode::{format_clock, format_timestamp_display, truncate};
use self::session::{
    PlayerClient, PlayerProcess, Session, player_command, resolve_successor, run_session,
};

pub fn run(cli: Cli) -> Result<()> {
    let config_path = match cli.config {
        Some(path) => path,
        None => config_file_path()?,
    };
    let config = config::load_or_create(&config_path)
        .with_context(|| format!("failed to load config from {}", config_path.display()))?;
    let db = open_db(&config)?;

    match cli.command {
        Some(Command::Play { file, from_start }) => run_play(&db, &config, &file, from_start)?,
        Some(Command::Continue) | None => run_continue(&db, &config)?,
        Some(Command::AddWorkspace { dir }) => run_add_workspace(&db, &dir)?,
        Some(Command::Workspaces) => run_workspaces(&db)?,
        Some(Command::Next) => run_next(&db)?,
        Some(Command::List) => run_list(&db)?,
    }

    Ok(())
}

fn run_play(db: &Database, config: &Config, file: &Path, from_start: bool) -> Result<()> {
    if !file.is_file() {
        bail!("media file not found: {}", file.display());
    }
    let file = std::path::absolute(file)
        .with_context(|| format!("failed to resolve {}", file.display()))?;
    let file = file.to_string_lossy().into_owned();

    let start_second = if from_start {
        0
    } else {
        db.media_file(&file)?
            .map_or(0, |entry| entry.current_second)
    };
    start_session(db, config, &file, start_second)
}

fn run_continue(db: &Database, config: &Config) -> Result<()> {
    let Some(latest) = db.latest_media_file()? else {
        println!("No media file recorded yet. Run `villain-couch play <FILE>` first.");
        return Ok(());
    };
    if !Path::new(&latest.filepath).is_file() {
        bail!("media file not found: {}", latest.filepath);
    }
    println!(
        "Continuing {} at {}",
        latest.filename,
        format_clock(latest.current_second)
    );
    start_session(db, config, &latest.filepath, latest.current_second)
}

fn start_session(db: &Database, config: &Config, file: &str, start_second: i64) -> Result<()> {
    let player_bin = config::resolve_player_bin(&config.player);
    tracing::info!(
        player = %player_bin.display(),
        file,
        start_second,
        "starting session"
    );
    let command = player_command(
        &player_bin,
        file,
        &config.player.extra_intf,
        config.http.port,
        &config.http.password,
        start_second,
    );

    let mut session = Session::new(
        db,
        PlayerClient::from_config(&config.http),
        PlayerProcess::new(command),
    )?;
    run_session(&mut session, file, config.session.tick_interval())
}

fn run_add_workspace(db: &Database, dir: &Path) -> Result<()> {
    if !dir.is_dir() {
        bail!("not a directory: {}", dir.display());
    }
    let dir = dir
        .canonicalize()
        .with_context(|| format!("failed to resolve {}", dir.display()))?;
    let name = dir
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| dir.to_string_lossy().into_owned());

    db.upsert_workspace(&dir.to_string_lossy(), &name)?;
    println!("Registered workspace {name} ({})", dir.display());
    Ok(())
}

fn run_workspaces(db: &Database) -> Result<()> {
    let workspaces = db.list_workspaces()?;
    if workspaces.is_empty() {
        println!("No workspaces yet. Run `villain-couch add-workspace <DIR>` first.");
        return Ok(());
    }

    println!("{:<24} {:<50} {:<20}", "NAME", "PATH", "ADDED");
    for workspace in workspaces {
        println!(
            "{:<24} {:<50} {:<20}",
            truncate(&workspace.directory_name, 24),
            truncate(&workspace.directory_path, 50),
            format_timestamp_display(&workspace.created_at)
        );
    }
    Ok(())
}

fn run_next(db: &Database) -> Result<()> {
    let Some(latest) = db.latest_media_file()? else {
        println!("No media file recorded yet. Run `villain-couch play <FILE>` first.");
        return Ok(());
    };
    let roots: Vec<PathBuf> = db
        .list_workspaces()?
        .into_iter()
        .map(|workspace| PathBuf::from(workspace.directory_path))
        .collect();

    match resolve_successor(&roots, &latest.filepath) {
        Ok(next) => {
            println!("Last watched: {}", latest.filepath);
            println!("Next episode: {next}");
        }
        Err(err) => println!("{err}"),
    }
    Ok(())
}

fn run_list(db: &Database) -> Result<()> {
    let items = db.list_media_files()?;
    if items.is_empty() {
        println!("No media file recorded yet. Run `villain-couch play <FILE>` first.");
        return Ok(());
    }

    println!("{:<48} {:<20} {:<20}", "FILE", "POSITION", "LAST WATCHED");
    for item in items {
        println!(
            "{:<48} {:<20} {:<20}",
            truncate(&item.filename, 48),
            format!(
                "{} / {}",
                format_clock(item.current_second),
                format_clock(item.total_seconds)
            ),
            format_timestamp_display(&item.updated_at)
        );
    }
    Ok(())
}

fn open_db(config: &Config) -> Result<Database> {
    let db_path = database_file_path(&config.session.database_file)?;
    let db = Database::open(&db_path)?;
    db.migrate()?;
    Ok(db)
}
