use std::sync::Arc;

use ai_client::Gemini;
use anyhow::{anyhow, Result};
use browserless_client::BrowserlessClient;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::EnvFilter;

use lynkbin_common::{Config, Platform, PostFilter, VocabularyKind};
use lynkbin_ingest::{
    BrowserlessRenderer, GeminiOracle, HttpFetcher, IngestSettings, Ingestor, PgStore, Submission,
};

#[derive(Parser)]
#[command(name = "lynkbin")]
#[command(about = "Save posts and notes, classified against your own vocabulary")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,

    /// Save a link or a note
    Submit {
        #[arg(long)]
        user: i64,

        /// Link to a post
        #[arg(long, conflicts_with = "notes", required_unless_present = "notes")]
        url: Option<String>,

        /// Free-form note
        #[arg(long)]
        notes: Option<String>,

        /// Tag to keep on the post (up to 3)
        #[arg(long = "tag")]
        tags: Vec<String>,
    },

    /// List posts, newest first
    Posts {
        #[arg(long)]
        user: i64,

        #[arg(long)]
        platform: Option<Platform>,

        #[arg(long = "tag")]
        tags: Vec<String>,

        #[arg(long = "author")]
        authors: Vec<String>,

        #[arg(long = "category")]
        categories: Vec<String>,
    },

    /// Latest posts
    Recent {
        #[arg(long)]
        user: i64,
    },

    /// Known authors, tags or categories for one platform
    Vocabulary {
        #[arg(long)]
        user: i64,

        #[arg(long)]
        platform: Platform,

        /// authors, tags or categories
        #[arg(long)]
        kind: VocabularyKind,
    },

    /// Post, tag and category totals
    Counts {
        #[arg(long)]
        user: i64,
    },

    /// Delete one of your posts
    Delete {
        #[arg(long)]
        user: i64,

        #[arg(long)]
        post: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("lynkbin=info")),
        )
        .init();

    let cli = Cli::parse();

    let config = Config::from_env()?;
    config.log_redacted();

    let store = PgStore::connect(&config.database_url).await?;

    if let Commands::Migrate = cli.command {
        store.migrate().await?;
        info!("Migrations applied");
        return Ok(());
    }

    let renderer = BrowserlessRenderer::new(BrowserlessClient::new(
        &config.browserless_url,
        config.browserless_token.as_deref(),
    )?);
    let fetcher = HttpFetcher::new(config.fetch_timeout)?;
    let oracle = GeminiOracle::new(Gemini::new(&config.gemini_api_key, &config.gemini_model));

    let ingestor = Ingestor::new(
        Arc::new(renderer),
        Arc::new(fetcher),
        Arc::new(oracle),
        Arc::new(store),
        IngestSettings::from_config(&config),
    );

    // Callers only ever see the public message; detail is already logged.
    let public = |e: lynkbin_ingest::IngestError| anyhow!(e.public_message());

    match cli.command {
        Commands::Migrate => {}
        Commands::Submit {
            user,
            url,
            notes,
            tags,
        } => {
            let submission = match url {
                Some(url) => Submission::link(url, tags),
                None => Submission::note(notes.unwrap_or_default(), tags),
            };
            print_json(&ingestor.submit(user, submission).await.map_err(public)?)?;
        }
        Commands::Posts {
            user,
            platform,
            tags,
            authors,
            categories,
        } => {
            let filter = PostFilter {
                platform,
                tags,
                authors,
                categories,
            };
            print_json(&ingestor.posts(user, &filter).await.map_err(public)?)?;
        }
        Commands::Recent { user } => {
            print_json(&ingestor.recent_posts(user).await.map_err(public)?)?;
        }
        Commands::Vocabulary {
            user,
            platform,
            kind,
        } => {
            print_json(&ingestor.vocabulary(kind, user, platform).await.map_err(public)?)?;
        }
        Commands::Counts { user } => {
            print_json(&ingestor.counts(user).await.map_err(public)?)?;
        }
        Commands::Delete { user, post } => {
            ingestor.delete_post(user, post).await.map_err(public)?;
            println!("Post {post} deleted");
        }
    }

    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
