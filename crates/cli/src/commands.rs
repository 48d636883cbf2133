use clap::{Subcommand, ValueEnum};

#[derive(Subcommand)]
pub enum Commands {
    /// Preview strategy, deduplication and batch layout without fetching anything
    Plan {
        #[arg(long, help = "Targets file (JSON array of repositories and paths)")]
        targets: String,

        #[arg(long, help = "Config file path (JSON overrides on top of the defaults)")]
        config: Option<String>,

        #[arg(long, value_enum, help = "Start from a named preset instead of the defaults")]
        preset: Option<Preset>,

        #[arg(long, help = "Force a strategy: sequential, parallel, adaptive, conservative")]
        strategy: Option<String>,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        output: Option<String>,
    },
    /// Fetch manifests from a local mirror laid out as <root>/<owner>/<repo>/<path>
    Run {
        #[arg(long, help = "Targets file (JSON array of repositories and paths)")]
        targets: String,

        #[arg(long, help = "Mirror root directory")]
        root: String,

        #[arg(long, help = "Config file path (JSON overrides on top of the defaults)")]
        config: Option<String>,

        #[arg(long, value_enum, help = "Start from a named preset instead of the defaults")]
        preset: Option<Preset>,

        #[arg(long, help = "Force a strategy: sequential, parallel, adaptive, conservative")]
        strategy: Option<String>,

        #[arg(
            long,
            help = "Include fetched file contents in the report instead of only hashes"
        )]
        with_content: bool,

        #[arg(
            long,
            help = "If specified, writes the JSON report to this file instead of stdout"
        )]
        output: Option<String>,
    },
    /// Validate a config file and print the effective settings
    CheckConfig {
        #[arg(long, help = "Config file path")]
        config: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum Preset {
    Conservative,
    Balanced,
    Aggressive,
}
