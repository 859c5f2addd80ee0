//! CLI entry point for pressmark

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use pressmark::commands::list::ListKind;
use pressmark::Site;

#[derive(Parser)]
#[command(name = "pressmark")]
#[command(version)]
#[command(about = "A minimal static blog generator", long_about = None)]
struct Cli {
    /// Set the base directory (defaults to current directory)
    #[arg(short, long, global = true)]
    cwd: Option<PathBuf>,

    /// Enable debug output
    #[arg(short, long, global = true)]
    debug: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize a new site
    Init {
        /// Directory to initialize (defaults to the base directory)
        #[arg(default_value = ".")]
        folder: PathBuf,
    },

    /// Create a new post
    New {
        /// Title of the new post
        title: String,

        /// Create a draft instead of a post
        #[arg(long)]
        draft: bool,

        /// File name for the new post, without extension
        #[arg(short, long)]
        path: Option<String>,
    },

    /// Generate static files
    #[command(visible_alias = "generate", alias = "g")]
    Build {
        /// Source directory (overrides `source_dir`)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Output directory (overrides `public_dir`)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Publish draft posts too
        #[arg(long)]
        drafts: bool,

        /// Watch for file changes and rebuild
        #[arg(short, long)]
        watch: bool,
    },

    /// Delete the public folder
    Clean,

    /// List site information
    List {
        /// Type of content to list (post, draft, tag, category)
        #[arg(default_value = "post")]
        r#type: ListKind,
    },

    /// Display version information
    Version,
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.debug {
        "pressmark=debug,info"
    } else {
        "pressmark=info"
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| filter.into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    // Determine base directory
    let base_dir = match cli.cwd {
        Some(dir) => dir,
        None => std::env::current_dir().context("Failed to read the current directory")?,
    };

    match cli.command {
        Commands::Init { folder } => {
            let target_dir = if folder.is_absolute() {
                folder
            } else {
                base_dir.join(folder)
            };
            tracing::info!("Initializing site in {:?}", target_dir);
            pressmark::commands::init::init_site(&target_dir)?;
            println!("Initialized site in {:?}", target_dir);
        }

        Commands::New { title, draft, path } => {
            let site = Site::new(&base_dir)?;
            let file = pressmark::commands::new::create_post(&site, &title, draft, path.as_deref())?;
            println!("Created: {:?}", file);
        }

        Commands::Build {
            source,
            output,
            drafts,
            watch,
        } => {
            let mut site = Site::new(&base_dir)?.with_drafts(drafts);
            if let Some(source) = source {
                site = site.with_source_dir(source);
            }
            if let Some(output) = output {
                site = site.with_public_dir(output);
            }

            tracing::info!("Generating static files...");
            let report = site.build()?;
            for failure in &report.failures {
                eprintln!("error: {}", failure);
            }

            if watch {
                site.watch()?;
            }

            if !report.is_success() {
                eprintln!("{} documents failed to build", report.failures.len());
                return Ok(ExitCode::FAILURE);
            }
            println!(
                "Generated {} posts ({} files written, {} unchanged)",
                report.published, report.written, report.unchanged
            );
        }

        Commands::Clean => {
            let site = Site::new(&base_dir)?;
            if site.clean()? {
                println!("Cleaned successfully!");
            }
        }

        Commands::List { r#type } => {
            let site = Site::new(&base_dir)?;
            pressmark::commands::list::run(&site, r#type)?;
        }

        Commands::Version => {
            println!("pressmark version {}", env!("CARGO_PKG_VERSION"));
        }
    }

    Ok(ExitCode::SUCCESS)
}
