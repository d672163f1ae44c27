//! Kestrel launcher CLI
//!
//! Loads config and stdio plugins, then answers queries:
//! - `query`: one-shot query, printed as a table or JSON
//! - `repl`: interactive prompt
//! - `pipe`: JSON-lines requests on stdin, ranked results on stdout
//! - `plugins`: list discovered plugins

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use kestrel_core::config::{Config, Directories};
use kestrel_core::{Launcher, QueryResult};
use rustyline::DefaultEditor;
use rustyline::error::ReadlineError;
use serde_json::json;
use std::io::{BufRead, Write};
use std::path::PathBuf;
use tracing::{debug, info};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Kestrel - quick-launcher query core
#[derive(Parser, Debug)]
#[command(name = "kestrel")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Directory holding config.json and plugins/ (defaults to the XDG config dir)
    #[arg(long, value_name = "DIR", global = true)]
    config_dir: Option<PathBuf>,

    /// Plugin directory override
    #[arg(long, value_name = "DIR", global = true)]
    plugins_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run one query and print the ranked results
    Query {
        /// Query text; words are joined with single spaces
        #[arg(required = true, num_args = 1..)]
        text: Vec<String>,

        /// Print results as JSON
        #[arg(long)]
        json: bool,
    },

    /// Interactive prompt; each line is a new query
    Repl,

    /// Read `{"query": "..."}` lines from stdin, write one JSON line per request
    Pipe,

    /// List registered plugins
    Plugins,
}

/// Logs go to stderr since stdout carries results. Debug builds also keep a
/// plain-text copy in the temp dir and default to `debug`.
fn setup_logging() {
    let default_level = if cfg!(debug_assertions) { "debug" } else { "info" };
    let filter = EnvFilter::try_from_env("KESTREL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new(format!("kestrel={default_level}")));

    let log_file = cfg!(debug_assertions).then(|| {
        let name = format!("kestrel-{}.log", chrono::Local::now().format("%Y%m%d_%H%M%S"));
        let path = std::env::temp_dir().join(&name);
        let (writer, guard) =
            tracing_appender::non_blocking(tracing_appender::rolling::never(std::env::temp_dir(), name));
        // Process-lifetime writer
        std::mem::forget(guard);
        (path, fmt::layer().with_writer(writer).with_ansi(false))
    });
    let (log_path, file_layer) = log_file.unzip();

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(file_layer)
        .init();

    if let Some(path) = log_path {
        eprintln!("Logging to: {}", path.display());
    }
}

async fn build_launcher(cli: &Cli) -> Result<Launcher> {
    let dirs = match &cli.config_dir {
        Some(dir) => Directories::with_base(dir.clone()),
        None => Directories::new().context("Failed to resolve config directory")?,
    };

    let config = Config::load(&dirs.config_file)
        .with_context(|| format!("Failed to load {}", dirs.config_file.display()))?;
    debug!("Loaded config from {}", dirs.config_file.display());

    let launcher = Launcher::new(config);
    let plugins_dir = cli.plugins_dir.clone().unwrap_or(dirs.plugins);
    launcher
        .load_plugins(&plugins_dir)
        .await
        .with_context(|| format!("Failed to load plugins from {}", plugins_dir.display()))?;
    Ok(launcher)
}

fn print_table(results: &[QueryResult]) {
    if results.is_empty() {
        println!("(no results)");
        return;
    }
    for (i, r) in results.iter().enumerate() {
        if r.subtitle.is_empty() {
            println!("{:>3}. [{:>5}] {}  ({})", i + 1, r.score_or_zero(), r.title, r.plugin_id);
        } else {
            println!(
                "{:>3}. [{:>5}] {} - {}  ({})",
                i + 1,
                r.score_or_zero(),
                r.title,
                r.subtitle,
                r.plugin_id
            );
        }
    }
}

async fn run_query(launcher: &Launcher, text: &str, as_json: bool) -> Result<()> {
    let results = launcher.query_once(text).await?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&results)?);
    } else {
        print_table(&results);
    }
    Ok(())
}

async fn run_repl(launcher: &Launcher) -> Result<()> {
    let mut editor = DefaultEditor::new().context("Failed to start line editor")?;
    loop {
        match editor.readline("kestrel> ") {
            Ok(line) => {
                let line = line.trim_end();
                if line.is_empty() {
                    continue;
                }
                let _ = editor.add_history_entry(line);
                if let Err(e) = run_query(launcher, line, false).await {
                    eprintln!("error: {e:#}");
                }
            }
            Err(ReadlineError::Interrupted | ReadlineError::Eof) => break,
            Err(e) => return Err(e).context("Failed to read input"),
        }
    }
    Ok(())
}

/// One JSON-lines request; `query` may be missing or null
#[derive(Debug, serde::Deserialize)]
struct PipeRequest {
    #[serde(default)]
    query: Option<String>,
}

async fn answer_pipe_line(launcher: &Launcher, line: &str) -> serde_json::Value {
    let request = match serde_json::from_str::<PipeRequest>(line) {
        Ok(request) => request,
        Err(e) => return json!({ "error": kestrel_core::Error::from(e).to_string() }),
    };

    let Some(query) = request.query else {
        let err = kestrel_core::Error::InvalidArgument("query is missing or null".to_string());
        return json!({ "error": err.to_string() });
    };

    match launcher.query_once(&query).await {
        Ok(results) => json!({ "query": query, "results": results }),
        Err(e) => json!({ "query": query, "error": e.to_string() }),
    }
}

async fn run_pipe(launcher: &Launcher) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout().lock();
    for line in stdin.lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            continue;
        }
        let response = answer_pipe_line(launcher, &line).await;
        writeln!(stdout, "{response}")?;
        stdout.flush()?;
    }
    Ok(())
}

fn list_plugins(launcher: &Launcher) {
    let plugins = launcher.registry().all_plugins();
    if plugins.is_empty() {
        println!("(no plugins)");
        return;
    }
    for plugin in plugins {
        let meta = plugin.metadata();
        let state = if plugin.is_disabled() { " [disabled]" } else { "" };
        println!(
            "{:<20} {:<24} keywords: {}{}",
            meta.id,
            meta.name,
            meta.trigger_keywords.join(" "),
            state
        );
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    setup_logging();

    let launcher = build_launcher(&cli).await?;
    info!("Kestrel ready with {} plugin(s)", launcher.registry().len());

    match &cli.command {
        Commands::Query { text, json } => run_query(&launcher, &text.join(" "), *json).await?,
        Commands::Repl => run_repl(&launcher).await?,
        Commands::Pipe => run_pipe(&launcher).await?,
        Commands::Plugins => list_plugins(&launcher),
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cli_parses_query() {
        let cli = Cli::try_parse_from(["kestrel", "query", "g", "search", "rust", "--json"]).unwrap();
        match cli.command {
            Commands::Query { text, json } => {
                assert_eq!(text.join(" "), "g search rust");
                assert!(json);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_cli_global_dirs() {
        let cli =
            Cli::try_parse_from(["kestrel", "plugins", "--config-dir", "/tmp/k"]).unwrap();
        assert_eq!(cli.config_dir, Some(PathBuf::from("/tmp/k")));
        assert!(matches!(cli.command, Commands::Plugins));
    }

    #[test]
    fn test_query_requires_text() {
        assert!(Cli::try_parse_from(["kestrel", "query"]).is_err());
    }

    #[tokio::test]
    async fn test_pipe_rejects_null_query() {
        let launcher = Launcher::new(Config::default());
        let response = answer_pipe_line(&launcher, r#"{"query": null}"#).await;
        assert_eq!(
            response["error"],
            "Invalid argument: query is missing or null"
        );

        let response = answer_pipe_line(&launcher, "{}").await;
        assert!(response["error"].as_str().unwrap().starts_with("Invalid argument"));

        let response = answer_pipe_line(&launcher, "not json").await;
        assert!(response["error"].as_str().unwrap().starts_with("JSON error"));
    }

    #[tokio::test]
    async fn test_pipe_answers_query() {
        let launcher = Launcher::new(Config::default());
        let response = answer_pipe_line(&launcher, r#"{"query": "anything"}"#).await;
        assert_eq!(response["query"], "anything");
        assert_eq!(response["results"], json!([]));
    }
}
