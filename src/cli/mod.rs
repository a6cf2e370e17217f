//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了CLI命令行接口。

use crate::config::CacheConfig;
use crate::manager::CacheManager;
use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "oxtier")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    #[arg(short, long, global = true, help = "Path to the TOML configuration file")]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, default_value = "info", help = "Log filter directive")]
    pub log_level: String,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    #[command(name = "get", about = "Read a value from a namespace")]
    Get(GetArgs),

    #[command(name = "set", about = "Save a value into one or more namespaces")]
    Set(SetArgs),

    #[command(name = "del", about = "Invalidate a key in one or more namespaces")]
    Del(DelArgs),

    #[command(name = "clear", about = "Clear one or more namespaces")]
    Clear(ClearArgs),

    #[command(name = "listen", about = "Print mutation events until interrupted")]
    Listen,

    #[command(name = "status", about = "Check store connectivity and show settings")]
    Status(StatusArgs),
}

#[derive(Parser, Debug)]
pub struct GetArgs {
    #[arg(help = "Namespace to read from")]
    pub cache: String,

    #[arg(help = "Key to read")]
    pub key: String,
}

#[derive(Parser, Debug)]
pub struct SetArgs {
    #[arg(help = "Key to write")]
    pub key: String,

    #[arg(help = "Value, parsed as JSON when possible, otherwise stored as a string")]
    pub value: String,

    #[arg(short = 'n', long = "cache", required = true, help = "Target namespace (repeatable)")]
    pub caches: Vec<String>,

    #[arg(long, default_value_t = 0, help = "Time to live in milliseconds, 0 means none")]
    pub ttl_ms: u64,

    #[arg(long = "async", help = "Submit the shared-store write to the background pool")]
    pub background: bool,
}

#[derive(Parser, Debug)]
pub struct DelArgs {
    #[arg(help = "Key to invalidate")]
    pub key: String,

    #[arg(short = 'n', long = "cache", required = true, help = "Target namespace (repeatable)")]
    pub caches: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct ClearArgs {
    #[arg(short = 'n', long = "cache", required = true, help = "Target namespace (repeatable)")]
    pub caches: Vec<String>,
}

#[derive(Parser, Debug)]
pub struct StatusArgs {
    #[arg(short, long, help = "Also print collected metrics")]
    pub metrics: bool,
}

mod listen;
mod ops;
mod status;

fn load_config(path: Option<&PathBuf>) -> Result<CacheConfig> {
    match path {
        Some(path) => CacheConfig::from_file(path)
            .with_context(|| format!("Failed to load config from {}", path.display())),
        None => Ok(CacheConfig::default()),
    }
}

pub async fn run() -> Result<()> {
    let cli = Cli::parse();
    crate::telemetry::init_tracing("oxtier", Some(cli.log_level.as_str()));

    let config = load_config(cli.config.as_ref())?;
    if let Commands::Status(args) = &cli.command {
        return status::execute(config, args).await;
    }

    let manager = CacheManager::start(config)
        .await
        .context("Failed to start cache manager")?;

    let result = match &cli.command {
        Commands::Get(args) => ops::get(&manager, args).await,
        Commands::Set(args) => ops::set(&manager, args).await,
        Commands::Del(args) => ops::del(&manager, args).await,
        Commands::Clear(args) => ops::clear(&manager, args).await,
        Commands::Listen => listen::execute(&manager).await,
        Commands::Status(_) => Ok(()),
    };

    manager.shutdown().await?;
    result
}
