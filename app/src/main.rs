//! `wavespeed` -- prompt advisor for the WaveSpeed creative suite.
//!
//! # Environment variables
//!
//! | Variable                    | Default                    | Description                      |
//! |-----------------------------|----------------------------|----------------------------------|
//! | `ANTHROPIC_API_KEY`         | --                         | Claude key (`CLAUDE_API_KEY` also read) |
//! | `OPENAI_API_KEY`            | --                         | OpenAI key                       |
//! | `WAVESPEED_AI_PROVIDER`     | `claude`                   | Provider tried first             |
//! | `CLAUDE_MODEL`              | `claude-sonnet-4-20250514` | Claude model id                  |
//! | `OPENAI_MODEL`              | `gpt-4o`                   | OpenAI model id                  |
//! | `WAVESPEED_AI_TIMEOUT_SECS` | `60`                       | Per-provider request timeout     |
//! | `WAVESPEED_DATA_DIR`        | `~/.wavespeed`             | Settings and feedback log        |

use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};
use wavespeed_core::tracker::Rating;
use wavespeed_core::{Mode, ProviderKind, Target, DEFAULT_SUGGESTION_COUNT};
use wavespeed_lib::{AppState, Dispatcher, PanelState, PromptField, SuggestionPanel, PATTERN_MIN_RATE};

#[derive(Debug, Parser)]
#[command(name = "wavespeed", version, about = "AI prompt advisor for WaveSpeed generation tabs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Ask the AI for improved versions of a prompt.
    Improve(ImproveArgs),
    /// Record a generation, a saved/deleted result, or a rating.
    Track(TrackArgs),
    /// Show aggregated stats, for one prompt or all of them.
    Stats {
        prompt: Vec<String>,
    },
    /// List prompts with a high success rate.
    Successful {
        #[arg(long, default_value_t = PATTERN_MIN_RATE)]
        min_rate: f64,
        #[arg(long, default_value_t = 10)]
        limit: usize,
    },
    /// Recompute prompt_stats.json from the event log.
    RebuildStats,
    /// Show advisor settings; `--primary` changes the provider tried first.
    Settings {
        #[arg(long)]
        primary: Option<ProviderKind>,
    },
    /// List the generation tabs the advisor knows.
    Targets,
}

#[derive(Debug, Args)]
struct ImproveArgs {
    /// Tab name or id, e.g. "Nano Banana Editor" or nano_banana_editor.
    #[arg(long, short)]
    target: Target,
    #[arg(long, default_value = "normal")]
    mode: Mode,
    #[arg(long)]
    image_description: Option<String>,
    #[arg(long, default_value_t = DEFAULT_SUGGESTION_COUNT)]
    count: usize,
    /// Apply the suggestion with this row number and print the new prompt.
    #[arg(long)]
    apply: Option<usize>,
    /// Print suggestions as JSON instead of rows.
    #[arg(long)]
    json: bool,
    /// Current prompt text; may be empty.
    prompt: Vec<String>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum TrackKind {
    Generated,
    Saved,
    Deleted,
    Good,
    Bad,
}

#[derive(Debug, Args)]
struct TrackArgs {
    kind: TrackKind,
    prompt: String,
    #[arg(long)]
    target: Option<Target>,
    /// Path or id of the generated result.
    #[arg(long)]
    result: Option<String>,
    #[arg(long)]
    image_description: Option<String>,
}

fn main() -> ExitCode {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "wavespeed=info,wavespeed_lib=info,wavespeed_suggest=info,wavespeed_core=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "command failed");
            eprintln!("error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> Result<ExitCode> {
    let state = AppState::load().context("opening the WaveSpeed data directory")?;

    match cli.command {
        Command::Improve(args) => improve(&state, args),
        Command::Track(args) => {
            track(&state, args)?;
            Ok(ExitCode::SUCCESS)
        }
        Command::Stats { prompt } => {
            let prompt = prompt.join(" ");
            let json = if prompt.trim().is_empty() {
                serde_json::to_string_pretty(&state.tracker().read_stats_snapshot()?)?
            } else {
                serde_json::to_string_pretty(&state.tracker().get_prompt_stats(&prompt)?)?
            };
            println!("{json}");
            Ok(ExitCode::SUCCESS)
        }
        Command::Successful { min_rate, limit } => {
            let prompts = state.tracker().get_successful_prompts(min_rate)?;
            if prompts.is_empty() {
                println!("No prompts at or above {:.0}% success yet.", min_rate * 100.0);
            }
            for stats in prompts.into_iter().take(limit) {
                let rate = stats.success_rate.unwrap_or_default() * 100.0;
                println!(
                    "{rate:>5.1}%  {:>3} ok / {:>3} bad  {}",
                    stats.successes(),
                    stats.failures(),
                    stats.prompt
                );
            }
            Ok(ExitCode::SUCCESS)
        }
        Command::RebuildStats => {
            let snapshot = state.tracker().rebuild_stats()?;
            println!(
                "Rebuilt {} from {} events ({} prompts).",
                state.tracker().stats_path().display(),
                snapshot.total_events,
                snapshot.prompts.len()
            );
            Ok(ExitCode::SUCCESS)
        }
        Command::Settings { primary } => {
            if let Some(primary) = primary {
                let dir = wavespeed_core::data_dir();
                std::fs::create_dir_all(&dir)?;
                state
                    .save_primary(&dir, primary)
                    .context("writing settings.json")?;
            }
            println!("{}", serde_json::to_string_pretty(&state.ai_settings_view())?);
            Ok(ExitCode::SUCCESS)
        }
        Command::Targets => {
            for target in Target::ALL {
                let kind = if target.is_video() { "video" } else { "image" };
                println!("{:<20} {:<20} {kind}", target.display_name(), target.id());
            }
            Ok(ExitCode::SUCCESS)
        }
    }
}

fn improve(state: &AppState, args: ImproveArgs) -> Result<ExitCode> {
    let mut field = PromptField::new(args.prompt.join(" "));
    let mut panel = SuggestionPanel::new(args.target, state.availability());

    let Some(token) = panel.begin_request() else {
        eprintln!("{}", panel.status_line());
        return Ok(ExitCode::from(2));
    };

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("starting the async runtime")?;
    let (dispatcher, mut replies) = Dispatcher::new(Arc::clone(state.advisor()), runtime.handle().clone());

    let request = state.build_request(
        panel.target(),
        field.text(),
        args.mode,
        args.image_description,
        args.count,
    );
    eprintln!("{}", panel.status_line());
    let _worker = dispatcher.submit(token, request);
    // The worker task now holds the only sender, so the queue closes if it is lost.
    drop(dispatcher);

    // This thread plays the UI thread: results only touch the panel here.
    while panel.is_loading() {
        let Some(reply) = replies.blocking_recv() else {
            anyhow::bail!("advisor worker stopped without replying");
        };
        panel.accept(reply);
    }

    if let PanelState::Unavailable { reason } = panel.state() {
        eprintln!("{reason}");
        return Ok(ExitCode::from(2));
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(panel.suggestions())?);
    } else {
        for row in panel.rows() {
            println!("{row}");
        }
        eprintln!("{}", panel.status_line());
    }

    if let Some(index) = args.apply {
        let suggestion = panel
            .select(index)
            .with_context(|| format!("no suggestion numbered {index}"))?;
        field.apply(suggestion);
        println!("\n{}", field.text());
    }
    Ok(ExitCode::SUCCESS)
}

fn track(state: &AppState, args: TrackArgs) -> Result<()> {
    let tracker = state.tracker();
    let result = args.result.as_deref();
    let event = match args.kind {
        TrackKind::Generated => {
            tracker.track_generation(&args.prompt, args.target, args.image_description.as_deref())?
        }
        TrackKind::Saved => tracker.track_result_saved(&args.prompt, result)?,
        TrackKind::Deleted => tracker.track_result_deleted(&args.prompt, result)?,
        TrackKind::Good => tracker.track_feedback(&args.prompt, Rating::Good)?,
        TrackKind::Bad => tracker.track_feedback(&args.prompt, Rating::Bad)?,
    };
    tracing::info!(event = ?event.event, path = %tracker.events_path().display(), "recorded");
    Ok(())
}
