use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "cairn",
    version,
    about = "Deduplicating incremental backups",
    after_help = "\
Backend specs (--source/--destination) are inline JSON when they start
with '{', otherwise a path to a JSON file:
  {\"type\": \"filesystem\", \"config\": {\"base_path\": \"/backups\"}}

Environment variables:
  CAIRN_KEY   Base64 encryption key, as produced by `cairn gen-key`
              (used when --key is not given)"
)]
pub(crate) struct Cli {
    /// Verbosity level (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub(crate) enum Commands {
    /// Generate a fresh encryption key and print it as base64
    GenKey,

    /// Record a new backup generation
    Backup {
        /// Source backend spec (inline JSON or a file path)
        #[arg(short = 's', long)]
        source: Option<String>,

        /// Destination backend spec (inline JSON or a file path)
        #[arg(short = 'd', long)]
        destination: Option<String>,

        /// Plan document bundling source, destination, and engine knobs
        #[arg(long, conflicts_with_all = ["source", "destination"])]
        plan: Option<String>,

        /// Base64 encryption key (falls back to CAIRN_KEY)
        #[arg(short = 'k', long)]
        key: Option<String>,

        /// Write a resumable checkpoint every N recorded files
        #[arg(short = 'p', long = "progress-files")]
        progress_files: Option<u64>,

        /// Write a resumable checkpoint every N bytes read
        #[arg(long = "progress-bytes")]
        progress_bytes: Option<u64>,

        /// Rewrite chunks and re-read files even when they look unchanged
        #[arg(long)]
        force: bool,
    },

    /// Write files from a recorded generation back into a source
    Restore {
        /// Source backend spec to restore into (inline JSON or a file path)
        #[arg(short = 's', long)]
        source: String,

        /// Destination backend spec holding the backups
        #[arg(short = 'd', long)]
        destination: String,

        /// Base64 encryption key (falls back to CAIRN_KEY)
        #[arg(short = 'k', long)]
        key: Option<String>,

        /// Generation to restore (defaults to the latest)
        #[arg(short = 'e', long)]
        entry: Option<String>,

        /// Only touch paths starting with this prefix
        #[arg(short = 'p', long)]
        prefix: Option<String>,

        /// Compare live files against the generation instead of writing
        #[arg(long)]
        verify: bool,

        /// Rewrite files even when their size and mtime already match
        #[arg(long)]
        force: bool,
    },

    /// Print a CSV inventory of recorded generations
    Report {
        /// Destination backend spec holding the backups
        #[arg(short = 'd', long)]
        destination: String,

        /// Base64 encryption key (falls back to CAIRN_KEY)
        #[arg(short = 'k', long)]
        key: Option<String>,

        /// Report a single generation instead of the whole chain
        #[arg(short = 'e', long)]
        entry: Option<String>,

        /// Only list paths starting with this prefix
        #[arg(short = 'p', long)]
        prefix: Option<String>,

        /// Write the CSV to a file instead of stdout
        #[arg(short = 'o', long)]
        output: Option<String>,

        /// One row per stored chunk instead of a per-file chunk count
        #[arg(long)]
        subhashes: bool,

        /// Keep rows that a newer generation already covers
        #[arg(long)]
        include_dupes: bool,
    },
}
