mod runner;

use std::path::{Path, PathBuf};

use anyhow::{anyhow, bail, Context};
use clap::{Parser, Subcommand};
use roulette_core::{
    compute_schedule, import_winners, DefinitionFormat, DrawConfig, DrawEngine, DrawError,
    DrawRequest, DurationSource, LogLayout, PrizeCatalog, ProvablyFairRng, ResultRecorder,
    TraversalMode,
};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "roulette", about = "Raffle host: spins, highlights and logs winners")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
    /// JSON settings file
    #[arg(long, value_parser, env = "ROULETTE_CONFIG")]
    config: Option<PathBuf>,
    /// Folder with one prize definition .txt per category
    #[arg(long, env = "ROULETTE_REWARDS_DIR")]
    rewards_dir: Option<PathBuf>,
    /// Folder for the winners CSV log
    #[arg(long, env = "ROULETTE_RESULTS_DIR")]
    results_dir: Option<PathBuf>,
    /// Secret seed; a random one is generated and its hash logged if absent
    #[arg(long, env = "ROULETTE_SERVER_SEED")]
    server_seed: Option<String>,
    #[arg(long, env = "ROULETTE_CLIENT_SEED")]
    client_seed: Option<String>,
    /// Run ticks back to back without waiting on the schedule
    #[arg(long)]
    instant: bool,
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[derive(Subcommand)]
enum Commands {
    /// Check resources and prize definitions
    Check,
    /// List categories and their remaining pools
    List,
    /// Run one draw
    Draw {
        #[arg(long)]
        category: String,
        /// Winners to draw (chained rounds in chained mode)
        #[arg(long)]
        count: Option<usize>,
        /// sequential, random or chained
        #[arg(long)]
        mode: Option<TraversalMode>,
        /// Fixed duration in seconds instead of the spinner
        #[arg(long, value_parser = parse_seconds)]
        duration: Option<f64>,
        /// Earlier winner logs to import before drawing
        #[arg(long)]
        resume: Vec<PathBuf>,
        /// Commit even if the category quota would be exceeded
        #[arg(long)]
        force: bool,
    },
    /// Interactive session reading commands from stdin
    Session,
}

/// What to do when a commit would exceed the category quota.
enum QuotaChoice<'a> {
    Override,
    Refuse,
    Ask(&'a mut Lines<BufReader<Stdin>>),
}

struct Host {
    config: DrawConfig,
    catalog: PrizeCatalog,
    engine: Option<DrawEngine>,
    structured_log: ResultRecorder,
    simple_log: ResultRecorder,
    instant: bool,
}

impl Host {
    fn new(config: DrawConfig, instant: bool) -> anyhow::Result<Self> {
        let (catalog, report) = PrizeCatalog::load_dir(&config.rewards_dir)
            .with_context(|| format!("loading prizes from {}", config.rewards_dir.display()))?;
        for err in &report.rejected {
            eprintln!("rejected: {err}");
        }
        if catalog.is_empty() {
            bail!("no prize definitions found in {}", config.rewards_dir.display());
        }

        let client_seed = config.client_seed.clone().unwrap_or_else(|| "roulette".to_string());
        let rng = match &config.server_seed {
            Some(seed) => ProvablyFairRng::new(seed.clone(), client_seed, 0),
            None => ProvablyFairRng::from_entropy(client_seed),
        };
        info!(
            server_seed_hash = %rng.server_seed_hash_hex(),
            client_seed = rng.client_seed(),
            nonce = rng.nonce(),
            "draw seeds committed"
        );
        let engine = DrawEngine::new(rng, config.quota_policy);
        let log = |layout| ResultRecorder::new(&config.results_dir, &config.results_prefix, layout);
        let structured_log = log(LogLayout::Structured);
        let simple_log = log(LogLayout::Simple);
        Ok(Self {
            config,
            catalog,
            engine: Some(engine),
            structured_log,
            simple_log,
            instant,
        })
    }

    fn list(&self) {
        for c in self.catalog.categories() {
            println!(
                "{:<14} {:<20} winners {:>3}/{:<3} eligible {:>4}",
                c.id,
                c.display_name,
                c.winners().len(),
                c.quota,
                c.eligible_count()
            );
        }
    }

    fn winners(&self, id: &str) -> anyhow::Result<()> {
        let category = self.catalog.get(id).ok_or_else(|| self.unknown(id))?;
        for (name, band) in category.winner_bands() {
            println!("[band {band}] {name}");
        }
        Ok(())
    }

    fn import(&mut self, path: &Path) -> anyhow::Result<()> {
        let report = import_winners(&mut self.catalog, path)?;
        println!(
            "imported {} winners ({} already present, {} skipped) from {}",
            report.imported,
            report.already_present,
            report.skipped.len(),
            path.display()
        );
        Ok(())
    }

    fn unknown(&self, id: &str) -> anyhow::Error {
        anyhow!("unknown category `{id}`; known: {}", self.catalog.ids().join(", "))
    }

    async fn draw(
        &mut self,
        id: &str,
        count: usize,
        mode: TraversalMode,
        mut quota: QuotaChoice<'_>,
    ) -> anyhow::Result<()> {
        let category = self.catalog.get_mut(id).ok_or_else(|| anyhow!("unknown category `{id}`"))?;
        let mut engine = self.engine.take().context("draw engine unavailable")?;

        let seconds = runner::pick_duration(&self.config, engine.rng_mut(), self.instant).await;
        let bounds = self.config.interval_bounds();
        let schedule = compute_schedule(seconds, bounds.start_ms, bounds.end_ms);
        println!(
            "{}: drawing {count} ({mode:?}) over {seconds:.1}s in {} ticks",
            category.full_name,
            schedule.len()
        );

        let request = DrawRequest {
            pick_count: count,
            mode,
            schedule,
        };
        let started = engine.start(category, request).map(|_| ());
        if let Err(err) = started {
            self.engine = Some(engine);
            return Err(err.into());
        }

        let names = category.candidates().to_vec();
        let recorder = match category.format {
            DefinitionFormat::Structured => &mut self.structured_log,
            DefinitionFormat::Simple => &mut self.simple_log,
        };
        loop {
            let (returned, ticked) = runner::spin(engine, names.clone(), self.instant).await?;
            engine = returned;
            if let Err(err) = ticked {
                self.engine = Some(engine);
                return Err(err);
            }
            let outcome = match engine.commit(category, false) {
                Ok(outcome) => outcome,
                Err(advisory @ DrawError::QuotaExceeded { .. }) => {
                    println!("warning: {advisory}");
                    let proceed = match &mut quota {
                        QuotaChoice::Override => true,
                        QuotaChoice::Refuse => false,
                        QuotaChoice::Ask(lines) => {
                            let answer = ask("commit anyway? [force/skip] ", lines).await?;
                            answer.as_deref() == Some("force")
                        }
                    };
                    if !proceed {
                        engine.discard()?;
                        println!("draw discarded; nothing committed");
                        break;
                    }
                    match engine.commit(category, true) {
                        Ok(outcome) => outcome,
                        Err(err) => {
                            warn!(error = %err, "override refused");
                            engine.discard()?;
                            println!("override refused by quota policy; nothing committed");
                            break;
                        }
                    }
                }
                Err(err) => {
                    self.engine = Some(engine);
                    return Err(err.into());
                }
            };

            println!("winners: {}", outcome.winners.join(", "));
            match recorder.record(category, &outcome.winners) {
                Ok(_) => {
                    if let Some(path) = recorder.path() {
                        println!("saved to {}", path.display());
                    }
                }
                Err(err) => eprintln!("could not write result log: {err}"),
            }
            if !outcome.next_round {
                break;
            }
        }
        self.engine = Some(engine);
        Ok(())
    }

    fn reveal(&self) {
        if let Some(engine) = &self.engine {
            info!(
                server_seed = engine.rng().server_seed(),
                "server seed revealed for verification"
            );
        }
    }
}

/// Prompts and reads one line; `None` once stdin is closed.
async fn ask(prompt: &str, lines: &mut Lines<BufReader<Stdin>>) -> anyhow::Result<Option<String>> {
    let mut out = tokio::io::stdout();
    out.write_all(prompt.as_bytes()).await?;
    out.flush().await?;
    Ok(lines.next_line().await?.map(|l| l.trim().to_string()))
}

/// Whitespace split that keeps "double quoted" words together.
fn split_args(line: &str) -> Vec<String> {
    let mut args = Vec::new();
    let mut current = String::new();
    let mut quoted = false;
    for c in line.chars() {
        match c {
            '"' => quoted = !quoted,
            c if c.is_whitespace() && !quoted => {
                if !current.is_empty() {
                    args.push(std::mem::take(&mut current));
                }
            }
            c => current.push(c),
        }
    }
    if !current.is_empty() {
        args.push(current);
    }
    args
}

/// `--duration`: a positive, finite number of seconds.
fn parse_seconds(raw: &str) -> Result<f64, String> {
    let seconds: f64 = raw.trim().parse().map_err(|e| format!("`{raw}`: {e}"))?;
    if !(seconds.is_finite() && seconds > 0.0) {
        return Err(format!("`{raw}` is not a positive, finite number of seconds"));
    }
    Ok(seconds)
}

async fn session(host: &mut Host) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    println!("commands: list | draw <id> [count] [mode] | import <file> | winners <id> | quit");
    loop {
        let Some(line) = ask("> ", &mut lines).await? else {
            break;
        };
        let args = split_args(&line);
        let result = match args.iter().map(String::as_str).collect::<Vec<_>>().as_slice() {
            [] => Ok(()),
            ["quit" | "exit"] => break,
            ["list"] => {
                host.list();
                Ok(())
            }
            ["winners", id] => host.winners(id),
            ["import", file] => host.import(Path::new(file)),
            ["draw", id, rest @ ..] => {
                let count = match rest.first() {
                    Some(n) => n.parse().map_err(|_| anyhow!("count `{n}` is not a number")),
                    None => Ok(host.config.pick_count),
                };
                let mode = match rest.get(1) {
                    Some(m) => m.parse::<TraversalMode>().map_err(|e| anyhow!(e)),
                    None => Ok(host.config.traversal),
                };
                match (count, mode) {
                    (Ok(count), Ok(mode)) => {
                        let id = id.to_string();
                        host.draw(&id, count, mode, QuotaChoice::Ask(&mut lines)).await
                    }
                    (Err(e), _) | (_, Err(e)) => Err(e),
                }
            }
            _ => Err(anyhow!("unrecognised command `{line}`")),
        };
        if let Err(err) = result {
            eprintln!("error: {err:#}");
        }
    }
    Ok(())
}

fn load_config(cli: &Cli) -> anyhow::Result<DrawConfig> {
    let mut config = match &cli.config {
        Some(path) => DrawConfig::from_json_file(path)?,
        None => DrawConfig::default(),
    };
    if let Some(dir) = &cli.rewards_dir {
        config.rewards_dir = dir.clone();
    }
    if let Some(dir) = &cli.results_dir {
        config.results_dir = dir.clone();
    }
    if cli.server_seed.is_some() {
        config.server_seed = cli.server_seed.clone();
    }
    if cli.client_seed.is_some() {
        config.client_seed = cli.client_seed.clone();
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let mut config = load_config(&cli)?;
    config.validate_resources(".")?;

    match cli.command {
        Commands::Check => {
            let (catalog, report) = PrizeCatalog::load_dir(&config.rewards_dir)?;
            println!("resources ok; {} categories loaded", catalog.len());
            for err in &report.rejected {
                println!("rejected: {err}");
            }
            if !report.is_clean() {
                bail!("{} prize definitions rejected", report.rejected.len());
            }
        }
        Commands::List => {
            Host::new(config, cli.instant)?.list();
        }
        Commands::Draw {
            category,
            count,
            mode,
            duration,
            resume,
            force,
        } => {
            if let Some(seconds) = duration {
                config.duration = DurationSource::Fixed { seconds };
            }
            let count = count.unwrap_or(config.pick_count);
            let mode = mode.unwrap_or(config.traversal);
            let mut host = Host::new(config, cli.instant)?;
            for path in &resume {
                host.import(path)?;
            }
            let quota = if force { QuotaChoice::Override } else { QuotaChoice::Refuse };
            host.draw(&category, count, mode, quota).await?;
            host.reveal();
        }
        Commands::Session => {
            let mut host = Host::new(config, cli.instant)?;
            session(&mut host).await?;
            host.reveal();
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_seconds() {
        assert_eq!(parse_seconds("7.5"), Ok(7.5));
        for bad in ["inf", "-inf", "NaN", "0", "-3", "soon"] {
            assert!(parse_seconds(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn test_duration_flag_rejects_infinity() {
        let args = ["roulette", "draw", "--category", "R1", "--duration", "inf"];
        assert!(Cli::try_parse_from(args).is_err());
        let args = ["roulette", "draw", "--category", "R1", "--duration", "4"];
        assert!(Cli::try_parse_from(args).is_ok());
    }

    #[test]
    fn test_split_args_keeps_quotes() {
        assert_eq!(split_args(r#"draw "Grand Prize" 2"#), vec!["draw", "Grand Prize", "2"]);
    }
}
