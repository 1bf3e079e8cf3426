use anyhow::{Context, Result};
use clap::builder::styling::{AnsiColor, Color, Style};
use clap::builder::Styles;
use clap::{CommandFactory, Parser, Subcommand};
use std::{path::PathBuf, sync::Arc};
use tracing::{error, info, level_filters::LevelFilter};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use tunedin_reviews::config::{AppConfig, CliConfig, FileConfig, DEFAULT_METADATA_TIMEOUT_SEC};
use tunedin_reviews::metadata::{HttpMetadataProvider, MetadataProvider, NoOpMetadataProvider};
use tunedin_reviews::metrics;
use tunedin_reviews::review::{
    AlbumReview, Opinion, ReviewManager, SqliteReviewStore, TrackReview,
};

use rustyline::{
    completion::Completer, highlight::Highlighter, history::FileHistory, validate::Validator,
    CompletionType, Config, Editor, Helper,
};

fn parse_path(s: &str) -> Result<PathBuf> {
    let original_path = PathBuf::from(s);
    if original_path.is_absolute() {
        return Ok(original_path);
    }
    let cwd = std::env::current_dir()?;
    Ok(cwd.join(original_path))
}

fn get_styles() -> Styles {
    Styles::styled()
        .usage(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
        )
        .header(
            Style::new()
                .bold()
                .underline()
                .fg_color(Some(Color::Ansi(AnsiColor::Cyan))),
        )
        .literal(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Green))),
        )
        .error(
            Style::new()
                .bold()
                .fg_color(Some(Color::Ansi(AnsiColor::Red))),
        )
}

#[derive(Parser, Debug)]
#[command(styles=get_styles(), version = env!("GIT_HASH"))]
struct CliArgs {
    /// Directory holding the review database.
    #[clap(value_parser = parse_path)]
    pub db_dir: Option<PathBuf>,

    /// Path to a TOML config file, its values override the command line.
    #[clap(long, value_parser = parse_path)]
    pub config: Option<PathBuf>,

    /// Base URL of the track metadata provider.
    #[clap(long)]
    pub metadata_url: Option<String>,

    /// Timeout in seconds for metadata requests.
    #[clap(long, default_value_t = DEFAULT_METADATA_TIMEOUT_SEC)]
    pub metadata_timeout_sec: u64,

    /// Fail review creation when track metadata cannot be resolved.
    #[clap(long)]
    pub strict_metadata: bool,
}

#[derive(Parser)]
#[command(styles=get_styles(), name = "")]
struct InnerCli {
    #[command(subcommand)]
    command: InnerCommand,
}

#[derive(Subcommand)]
enum InnerCommand {
    /// Lists the reviews of a user in ranking order, optionally only the
    /// given opinions (liked, neutral, dislike).
    List {
        user_id: String,
        opinions: Vec<String>,
    },

    /// Shows a single track review.
    Show { review_id: String },

    /// Recomputes the ratings of a user from the current ranks.
    Rescore { user_id: String },

    /// Closes rank gaps in every bucket of a user, then rescores.
    Renormalize { user_id: String },

    /// Deletes a track review and re-ranks the remaining ones.
    Delete { review_id: String },

    /// Lists the album reviews of a user.
    Albums { user_id: String },

    /// Prints the collected metrics in Prometheus text format.
    Metrics,

    /// Shows the path of the current review db.
    Where,

    /// Close this program.
    Exit,
}

enum CommandExecutionResult {
    Ok,
    Exit,
    Error(String),
}

const PROMPT: &str = ">> ";

fn print_track_review(review: &TrackReview) {
    println!(
        "{:>3}  {:<8} {:>5.2}  {}  track={} album={} id={}",
        review.rank,
        review.opinion.to_string(),
        review.rating,
        if review.description.is_empty() {
            "-"
        } else {
            review.description.as_str()
        },
        review.track_id,
        review.album_id.as_deref().unwrap_or("-"),
        review.id
    );
}

fn print_album_review(review: &AlbumReview) {
    println!(
        "{:<24} {:<10} {:>5.2}  tracks={} ranking={} id={}",
        review.spotify_album_id,
        format!("{:?}", review.opinion),
        review.rating,
        review.spotify_track_ids.len(),
        review.ranking,
        review.id
    );
}

async fn execute_command(
    line: String,
    manager: &ReviewManager,
    db_path: String,
) -> CommandExecutionResult {
    if line.is_empty() {
        return CommandExecutionResult::Ok;
    }

    let args =
        shlex::split(&line).unwrap_or_else(|| line.split_whitespace().map(String::from).collect());

    let cli = InnerCli::try_parse_from(std::iter::once(" ").chain(args.iter().map(String::as_str)));

    match cli {
        Ok(cli) => {
            println!("{} {}", PROMPT, &line);
            match cli.command {
                InnerCommand::List { user_id, opinions } => {
                    let parsed: Result<Vec<Opinion>, _> =
                        opinions.iter().map(|o| o.parse::<Opinion>()).collect();
                    let parsed = match parsed {
                        Ok(parsed) => parsed,
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    };
                    let filter = if parsed.is_empty() {
                        None
                    } else {
                        Some(parsed.as_slice())
                    };
                    match manager.get_reviews_by_user(&user_id, filter) {
                        Ok(reviews) if reviews.is_empty() => {
                            println!("User {} has no reviews.", user_id)
                        }
                        Ok(reviews) => reviews.iter().for_each(print_track_review),
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    }
                }
                InnerCommand::Show { review_id } => match manager.get_review(&review_id) {
                    Ok(Some(review)) => {
                        print_track_review(&review);
                        if !review.genres.is_empty() {
                            println!("     genres: {}", review.genres.join(", "));
                        }
                    }
                    Ok(None) => println!("Review {} not found.", review_id),
                    Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                },
                InnerCommand::Rescore { user_id } => {
                    if let Err(err) = manager.rescore_reviews(&user_id) {
                        return CommandExecutionResult::Error(format!("{}", err));
                    }
                    println!("Rescored reviews of {}.", user_id);
                }
                InnerCommand::Renormalize { user_id } => match manager.renormalize_user(&user_id)
                {
                    Ok(reviews) => println!("Renormalized {} reviews of {}.", reviews.len(), user_id),
                    Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                },
                InnerCommand::Delete { review_id } => {
                    match manager.delete_review(&review_id, None).await {
                        Ok(true) => println!("Deleted review {}.", review_id),
                        Ok(false) => println!("Review {} not found.", review_id),
                        Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                    }
                }
                InnerCommand::Albums { user_id } => match manager.get_user_album_reviews(&user_id) {
                    Ok(albums) if albums.is_empty() => {
                        println!("User {} has no album reviews.", user_id)
                    }
                    Ok(albums) => albums.iter().for_each(print_album_review),
                    Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                },
                InnerCommand::Metrics => match metrics::gather_text() {
                    Ok(text) => println!("{}", text),
                    Err(err) => return CommandExecutionResult::Error(format!("{}", err)),
                },
                InnerCommand::Where => {
                    println!("{}", db_path);
                }
                InnerCommand::Exit => return CommandExecutionResult::Exit,
            }
        }

        Err(e) => {
            if e.print().is_err() {
                println!("{}", e);
            }
        }
    }
    CommandExecutionResult::Ok
}

#[derive(rustyline_derive::Hinter)]
struct MyHelper {
    commands_names: Vec<String>,
}

impl MyHelper {
    pub fn new() -> Self {
        let commands_names: Vec<String> = InnerCli::command()
            .get_subcommands()
            .map(|sc| sc.get_name().to_string())
            .collect();

        MyHelper { commands_names }
    }
}

impl Completer for MyHelper {
    type Candidate = String;

    fn complete(
        &self,
        line: &str,
        _pos: usize,
        _ctx: &rustyline::Context<'_>,
    ) -> rustyline::Result<(usize, Vec<String>)> {
        if line.contains(' ') {
            return Ok((0, Vec::with_capacity(0)));
        }
        let matches = self
            .commands_names
            .iter()
            .filter(|c| c.starts_with(line))
            .map(|c| c.to_string())
            .collect::<Vec<_>>();

        Ok((0, matches))
    }
}

impl Highlighter for MyHelper {}
impl Validator for MyHelper {}
impl Helper for MyHelper {}

fn build_metadata_provider(config: &AppConfig) -> Result<Arc<dyn MetadataProvider>> {
    match &config.metadata_url {
        Some(url) => {
            info!("Using metadata provider at {}", url);
            Ok(Arc::new(HttpMetadataProvider::new(
                url.clone(),
                config.metadata_timeout_sec,
            )?))
        }
        None => {
            info!("No metadata provider configured");
            Ok(Arc::new(NoOpMetadataProvider))
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            EnvFilter::builder()
                .with_default_directive(LevelFilter::INFO.into())
                .with_env_var("LOG_LEVEL")
                .from_env_lossy(),
        )
        .try_init()
        .context("Failed to initialize logging")?;

    let cli_args = CliArgs::parse();
    let file_config = match &cli_args.config {
        Some(path) => Some(FileConfig::load(path)?),
        None => None,
    };
    let cli_config = CliConfig {
        db_dir: cli_args.db_dir.clone(),
        metadata_url: cli_args.metadata_url.clone(),
        metadata_timeout_sec: cli_args.metadata_timeout_sec,
        strict_metadata: cli_args.strict_metadata,
    };
    let app_config = AppConfig::resolve(&cli_config, file_config)?;

    metrics::init_metrics();

    let db_path = app_config.review_db_path();
    info!("Opening review database at {:?}...", db_path);
    let store = SqliteReviewStore::new(&db_path)?;
    let manager = ReviewManager::new(
        Arc::new(store),
        build_metadata_provider(&app_config)?,
        app_config.strict_metadata,
    );

    InnerCli::command().print_long_help()?;

    let config = Config::builder()
        .completion_type(CompletionType::List)
        .build();

    let mut rl = Editor::<MyHelper, FileHistory>::with_config(config)?;

    let helper = MyHelper::new();
    rl.set_helper(Some(helper));

    loop {
        let readline = rl.readline(PROMPT);

        match readline {
            Ok(line) => {
                let _ = rl.add_history_entry(&line);
                match execute_command(line, &manager, db_path.display().to_string()).await {
                    CommandExecutionResult::Ok => {}
                    CommandExecutionResult::Exit => {
                        break;
                    }
                    CommandExecutionResult::Error(err) => {
                        error!("{}", err);
                        continue;
                    }
                }
            }
            Err(rustyline::error::ReadlineError::Interrupted) => {
                println!("CTRL-C");
                break;
            }
            Err(rustyline::error::ReadlineError::Eof) => {
                println!("CTRL-D: exiting.");
                break;
            }
            Err(e) => {
                println!("Error: {:?}", e);
                break;
            }
        }
    }
    Ok(())
}
