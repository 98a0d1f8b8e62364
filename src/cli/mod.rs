//! CLI command definitions and parsing
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(
    name = "ragsql",
    version,
    about = "Retrieval-augmented text-to-SQL worker",
    long_about = "ragsql answers natural-language questions about a database schema with a SQL \
                  statement. It retrieves similar worked examples from a labeled corpus, prompts a \
                  local model with them, and serves requests from a durable Redis REST queue."
)]
pub struct Cli {
    /// Global config file path (defaults to ~/.config/ragsql/config.toml)
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Named profile from the config file to apply
    #[arg(short, long, global = true)]
    pub profile: Option<String>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Serve requests from the queue until interrupted
    Run,

    /// Answer one question and print the SQL
    Ask {
        /// Natural-language question
        question: String,

        /// Schema the question is about (e.g. CREATE TABLE statements)
        #[arg(short, long)]
        schema: String,
    },

    /// Show the corpus examples nearest to a question
    Search {
        /// Natural-language question
        question: String,

        /// Schema the question is about
        #[arg(short, long)]
        schema: String,

        /// Number of examples to return
        #[arg(short = 'k', long, default_value = "2")]
        limit: usize,

        /// Show results in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Rebuild the corpus index and store a fresh snapshot
    Index,

    /// Extract the SQL statement from raw model output
    Extract {
        /// File holding the raw output (reads stdin when omitted)
        file: Option<PathBuf>,
    },

    /// Manage configuration
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Validate a configuration file
    Validate {
        /// Configuration file to validate (defaults to the active one)
        file: Option<PathBuf>,
    },

    /// Write the default configuration file
    Init {
        /// Overwrite an existing configuration
        #[arg(long)]
        force: bool,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_args() {
        let cli = Cli::try_parse_from([
            "ragsql", "search", "count rows", "--schema", "t(x int)", "-k", "3", "--json",
        ])
        .unwrap();

        match cli.command {
            Commands::Search {
                question,
                schema,
                limit,
                json,
            } => {
                assert_eq!(question, "count rows");
                assert_eq!(schema, "t(x int)");
                assert_eq!(limit, 3);
                assert!(json);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags() {
        let cli = Cli::try_parse_from(["ragsql", "run", "--profile", "fast", "-v"]).unwrap();
        assert!(matches!(cli.command, Commands::Run));
        assert_eq!(cli.profile.as_deref(), Some("fast"));
        assert!(cli.verbose);
    }

    #[test]
    fn test_ask_requires_schema() {
        assert!(Cli::try_parse_from(["ragsql", "ask", "count rows"]).is_err());
    }
}
