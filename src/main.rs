//! srl - spaced repetition from the command line
//!
//! Thin host around the `srl_recall` scheduling core, backed by a SQLite file.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;

use srl_recall::{
    import_csv, Algorithm, Backup, Bucket, Card, Config, Deck, DeckQuery, Learner, Outcome,
    Repository, SqliteRepository,
};

// ══════════════════════════════════════════════════════════════════════════
// CLI Arguments
// ══════════════════════════════════════════════════════════════════════════

#[derive(Parser, Debug)]
#[command(name = "srl")]
#[command(author, version, about = "Leitner / Fibonacci spaced repetition scheduler", long_about = None)]
struct Args {
    /// SQLite database file
    #[arg(short, long)]
    db: Option<PathBuf>,

    /// Config file (defaults to the platform config dir)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Learner to act as; created on first use
    #[arg(short, long, default_value = "default")]
    learner: String,

    /// Override the configured algorithm (leitner, fibonacci)
    #[arg(short, long)]
    algorithm: Option<Algorithm>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    #[command(flatten)]
    Deck(DeckCommand),
    /// Write a JSON backup of the whole database
    Export { path: PathBuf },
    /// Load a JSON backup, skipping items that already exist
    Restore { path: PathBuf },
    /// Delete the learner and all their progress
    Destroy,
}

/// Commands that act on the learner's deck, creating the learner if needed.
#[derive(Subcommand, Debug)]
enum DeckCommand {
    /// Create a card and add it to the deck
    Add {
        #[arg(long)]
        front: String,
        #[arg(long)]
        back: String,
        #[arg(long = "tag")]
        tags: Vec<String>,
    },
    /// Remove a card from the deck (the card itself is kept)
    Remove { card_id: String },
    /// List cards in a bucket
    List {
        #[arg(short, long, value_enum, default_value_t = Listing::Review)]
        bucket: Listing,
        #[arg(long)]
        tag: Option<String>,
    },
    /// Show the next card to study
    Next,
    /// Record an answer: right or wrong
    Answer { card_id: String, outcome: Outcome },
    /// Bucket counts for the deck
    Stats,
    /// Import `front,back` lines from a CSV file
    Import { csv: PathBuf },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum Listing {
    All,
    Review,
    Untested,
    Known,
    Failed,
    Expired,
    Mastered,
}

// ══════════════════════════════════════════════════════════════════════════
// Main Entry Point
// ══════════════════════════════════════════════════════════════════════════

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("srl_recall=warn,srl=warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();

    // Load config
    let mut config = match &args.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    if let Some(algorithm) = args.algorithm {
        config.algorithm = algorithm;
    }

    let db_path = args.db.clone().unwrap_or_else(SqliteRepository::default_path);
    let mut repo = SqliteRepository::open(&db_path)
        .with_context(|| format!("Failed to open database: {:?}", db_path))?;

    run(args, &config, &mut repo)
}

fn run(args: Args, config: &Config, repo: &mut SqliteRepository) -> Result<()> {
    match args.command {
        Command::Deck(command) => {
            let learner = ensure_learner(repo, &args.learner)?;
            let mut deck = Deck::new(repo, learner.id, config.strategy()?);
            run_deck(&mut deck, command)?;
        }
        Command::Export { path } => {
            let backup = Backup::capture(&*repo)?;
            backup.write_to(&path)?;
            println!("✓ Exported {} items to {:?}", backup.items.len(), path);
        }
        Command::Restore { path } => {
            let (imported, skipped) = Backup::read_from(&path)?.restore(repo)?;
            println!("✓ Restored {} items ({} already present)", imported, skipped);
        }
        Command::Destroy => {
            let Some(learner) = find_learner(repo, &args.learner)? else {
                bail!("no learner named {:?}", args.learner);
            };
            let removed = Deck::new(repo, learner.id, config.strategy()?).destroy()?;
            println!("✓ Deleted learner {:?} and {} items", args.learner, removed);
        }
    }

    Ok(())
}

fn run_deck(deck: &mut Deck<'_, SqliteRepository>, command: DeckCommand) -> Result<()> {
    match command {
        DeckCommand::Add { front, back, tags } => {
            let mut card = Card::new(front, back);
            card.tags = tags;
            deck.add_card(&card)?;
            println!("✓ Added card {}", card.id);
        }
        DeckCommand::Remove { card_id } => {
            if deck.remove(&card_id)? {
                println!("✓ Removed card {}", card_id);
            } else {
                println!("Card {} is not in the deck", card_id);
            }
        }
        DeckCommand::List { bucket, tag } => {
            let mut query = listing(deck, bucket);
            if let Some(tag) = tag {
                query = query.tagged(&tag);
            }
            for entry in query.entries()? {
                let due = entry
                    .item
                    .state
                    .due_at
                    .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                    .unwrap_or_else(|| "-".to_string());
                println!(
                    "{}  {:<8}  L{:<3} {:<16}  {}",
                    entry.card.id, entry.bucket, entry.item.state.progress_level, due, entry.card.front
                );
            }
        }
        DeckCommand::Next => match deck.next()? {
            Some(card) => println!("{}  {}\n    {}", card.id, card.front, card.back),
            None => println!("Nothing to review"),
        },
        DeckCommand::Answer { card_id, outcome } => {
            let item = deck.record_answer(&card_id, outcome)?;
            let due = item
                .state
                .due_at
                .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
                .unwrap_or_default();
            println!(
                "✓ {} → level {}, due {}",
                outcome, item.state.progress_level, due
            );
        }
        DeckCommand::Stats => {
            let stats = deck.stats()?;
            println!("Algorithm: {}", deck.strategy().name());
            println!("Total:     {}", stats.total);
            println!("Review:    {}", stats.review);
            println!("  untested {}", stats.untested);
            println!("  failed   {}", stats.failed);
            println!("  expired  {}", stats.expired);
            println!("Known:     {} ({} mastered)", stats.known, stats.mastered);
        }
        DeckCommand::Import { csv } => {
            let cards = import_csv(&csv)?;
            for card in &cards {
                deck.add_card(card)?;
            }
            println!("✓ Imported {} cards", cards.len());
        }
    }

    Ok(())
}

fn listing<'d>(deck: &'d Deck<'_, SqliteRepository>, listing: Listing) -> DeckQuery<'d, SqliteRepository> {
    match listing {
        Listing::All => deck.all(),
        Listing::Review => deck.review(),
        Listing::Untested => deck.bucket(Bucket::Untested),
        Listing::Known => deck.bucket(Bucket::Known),
        Listing::Failed => deck.bucket(Bucket::Failed),
        Listing::Expired => deck.bucket(Bucket::Expired),
        Listing::Mastered => deck.mastered(),
    }
}

fn find_learner(repo: &SqliteRepository, name: &str) -> Result<Option<Learner>> {
    Ok(repo.list_learners()?.into_iter().find(|l| l.name == name))
}

fn ensure_learner(repo: &mut SqliteRepository, name: &str) -> Result<Learner> {
    if let Some(learner) = find_learner(repo, name)? {
        return Ok(learner);
    }
    let learner = Learner::new(name);
    repo.save_learner(&learner)?;
    tracing::info!(name, id = %learner.id, "created learner");
    Ok(learner)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    fn parse(argv: &[&str]) -> Args {
        Args::try_parse_from(std::iter::once("srl").chain(argv.iter().copied())).unwrap()
    }

    #[test]
    fn cli_definition_is_consistent() {
        Args::command().debug_assert();
    }

    #[test]
    fn deck_commands_parse_at_the_top_level() {
        let args = parse(&["add", "--front", "hola", "--back", "hello", "--tag", "es"]);
        assert!(matches!(
            args.command,
            Command::Deck(DeckCommand::Add { ref tags, .. }) if tags == &["es"]
        ));
        assert!(matches!(parse(&["stats"]).command, Command::Deck(DeckCommand::Stats)));
        assert!(matches!(parse(&["destroy"]).command, Command::Destroy));
    }

    #[test]
    fn every_command_runs_without_panicking() {
        let dir = tempfile::tempdir().unwrap();
        let backup = dir.path().join("backup.json");
        let backup = backup.to_str().unwrap();
        let config = Config::default();
        let mut repo = SqliteRepository::open_in_memory().unwrap();

        for argv in [
            vec!["add", "--front", "hola", "--back", "hello"],
            vec!["stats"],
            vec!["next"],
            vec!["list", "--bucket", "all"],
            vec!["export", backup],
            vec!["restore", backup],
            vec!["destroy"],
        ] {
            run(parse(&argv), &config, &mut repo).unwrap();
        }

        assert!(repo.list_learners().unwrap().is_empty());
        assert!(run(parse(&["destroy"]), &config, &mut repo).is_err());
    }
}
