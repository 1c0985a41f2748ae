use clap::builder::{styling::AnsiColor, Styles};
use clap::ColorChoice;
use clap::{CommandFactory, FromArgMatches, Parser, Subcommand};
use commands::{info_resource_table, obfuscate_resources, InfoTableArgs, ObfuscateArgs};
use miette::Result;

mod commands;
mod errors;
mod utils;

#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Args {
    /// Log per-entry decisions
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rename resources of an unpacked APK and rewrite its resource table
    Obfuscate {
        /// The unpacked APK directory holding resources.arsc and res/
        #[arg(short, long)]
        input_dir: String,

        /// The directory to write the new table, renamed files and mapping files to
        #[arg(short, long, default_value = "resguard")]
        output_dir: String,

        /// The path to a resguard config file (TOML or JSON)
        #[arg(short, long)]
        config_path: Option<String>,

        /// A mapping file from a previous run, to keep names stable
        #[arg(short, long)]
        mapping: Option<String>,

        /// Keep the original res/ directory names
        #[arg(long)]
        keep_root: bool,

        /// Collapse resource files with identical content
        #[arg(long)]
        merge_duplicates: bool,

        /// JSON object of archive paths to their compressed flag
        #[arg(long)]
        compress_data: Option<String>,
    },
    /// Show the packages and types of a resource table
    Info {
        /// The path to the resources.arsc file
        #[arg(short, long = "file")]
        file_path: String,
    },
}

fn parse_args() -> Args {
    // Configure colored/styled help output
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default().bold())
        .usage(AnsiColor::Green.on_default().bold())
        .literal(AnsiColor::Cyan.on_default())
        .placeholder(AnsiColor::Blue.on_default());

    let matches = Args::command()
        .styles(styles)
        .color(ColorChoice::Auto)
        .get_matches();

    Args::from_arg_matches(&matches).expect("failed to parse arguments")
}

fn init_tracing(verbose: bool) {
    let default_filter = if verbose {
        "resguard=debug,resguard_arsc=debug"
    } else {
        "resguard=info,resguard_arsc=warn"
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    let args = parse_args();
    init_tracing(args.verbose);

    match args.command {
        Commands::Obfuscate {
            input_dir,
            output_dir,
            config_path,
            mapping,
            keep_root,
            merge_duplicates,
            compress_data,
        } => obfuscate_resources(ObfuscateArgs {
            input_dir,
            output_dir,
            config_path,
            mapping,
            keep_root,
            merge_duplicates,
            compress_data,
        }),
        Commands::Info { file_path } => info_resource_table(InfoTableArgs { file_path }),
    }
}
