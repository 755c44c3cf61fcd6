//! shipbin CLI
//!
//! Publish prebuilt native binaries to npm and PyPI

use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use shipbin::core::{
    ConfigLoadOptions, ConfigLoader, ConfigOverrides, PollOptions, PropagationChecker,
    PublishConfig, PublishError, PublishTarget, PublishTargets,
};
use shipbin::packaging::{platform_package_name, wheel_filename};
use shipbin::security::CredentialSource;
use shipbin::validation::VersionValidator;
use shipbin::{BatchPublisher, NpmPlugin, PyPiPlugin, SecureTokenManager};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

/// Publish prebuilt native binaries to npm and PyPI
#[derive(Parser)]
#[command(name = "shipbin")]
#[command(version = "0.1.0")]
#[command(about = "Publish prebuilt native binaries to npm and PyPI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Publish to npm and PyPI at the same time
    Publish {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        npm: NpmArgs,

        /// Registries to publish to (all, npm, pypi)
        #[arg(long)]
        target: Option<PublishTargets>,
    },

    /// Publish to npm only
    Npm {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        npm: NpmArgs,
    },

    /// Publish to PyPI only
    Pypi {
        #[command(flatten)]
        common: CommonArgs,
    },

    /// Check configuration and artifacts, then print what would be published
    Validate {
        #[command(flatten)]
        common: CommonArgs,

        #[command(flatten)]
        npm: NpmArgs,
    },
}

#[derive(Args)]
struct CommonArgs {
    /// Project path (defaults to current directory)
    #[arg(value_name = "PROJECT_PATH")]
    project_path: Option<PathBuf>,

    /// Package name
    #[arg(long)]
    name: Option<String>,

    /// Version to publish (defaults to the exact git tag on HEAD)
    #[arg(long)]
    version: Option<String>,

    /// Prebuilt binary as os/arch:path (repeatable)
    #[arg(long = "artifact", value_name = "OS/ARCH:PATH")]
    artifacts: Vec<String>,

    /// SPDX license identifier
    #[arg(long)]
    license: Option<String>,

    /// One-line package description
    #[arg(long)]
    summary: Option<String>,

    /// README used as the long description
    #[arg(long)]
    readme: Option<PathBuf>,

    /// Build everything but upload nothing
    #[arg(long)]
    dry_run: bool,

    /// Config file (defaults to .shipbin.yaml)
    #[arg(long)]
    config: Option<PathBuf>,
}

#[derive(Args, Default)]
struct NpmArgs {
    /// npm scope for platform packages, without the @
    #[arg(long)]
    org: Option<String>,

    /// npm dist-tag
    #[arg(long)]
    tag: Option<String>,

    /// Publish with npm provenance
    #[arg(long, num_args = 0..=1, require_equals = true, default_missing_value = "true")]
    provenance: Option<bool>,
}

impl CommonArgs {
    fn into_options(self, npm: NpmArgs, target: Option<PublishTargets>) -> ConfigLoadOptions {
        ConfigLoadOptions {
            project_path: self.project_path.unwrap_or_else(|| PathBuf::from(".")),
            config_file: self.config,
            overrides: ConfigOverrides {
                name: self.name,
                version: self.version,
                license: self.license,
                summary: self.summary,
                readme: self.readme,
                artifacts: self.artifacts,
                org: npm.org,
                tag: npm.tag,
                provenance: npm.provenance,
                target,
                dry_run: self.dry_run,
            },
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("shipbin=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let result = run().await;

    match result {
        Ok(exit_code) => process::exit(exit_code),
        Err(e) => {
            eprintln!("\n❌ Error");
            eprintln!("{}", e);
            process::exit(1);
        }
    }
}

async fn run() -> Result<i32> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Publish {
            common,
            npm,
            target,
        } => publish_command(common.into_options(npm, target)).await,
        Commands::Npm { common, npm } => {
            publish_command(common.into_options(npm, Some(PublishTargets::Npm))).await
        }
        Commands::Pypi { common } => {
            publish_command(common.into_options(NpmArgs::default(), Some(PublishTargets::Pypi)))
                .await
        }
        Commands::Validate { common, npm } => validate_command(common.into_options(npm, None)).await,
    }
}

async fn publish_command(options: ConfigLoadOptions) -> Result<i32> {
    println!("\n📦 shipbin\n");

    let config = ConfigLoader::new().load(options).await?;
    if config.dry_run {
        println!("🔍 Dry run: nothing will be uploaded\n");
    }

    let publisher = BatchPublisher::new(PropagationChecker::new(PollOptions::default()))
        .with_plugin(Arc::new(NpmPlugin::new()))
        .with_plugin(Arc::new(PyPiPlugin::new()));

    let result = publisher.publish(Arc::new(config)).await;
    result.print_summary();

    match result.into_result() {
        Ok(_) => {
            println!("✅ Publishing completed successfully!");
            Ok(0)
        }
        Err(errors) => {
            eprintln!("❌ Publishing failed ({} error(s))", errors.len());
            for error in errors.errors() {
                print_suggestions(error);
            }
            Ok(1)
        }
    }
}

fn print_suggestions(error: &PublishError) {
    let actions = error.suggested_actions();
    if actions.is_empty() {
        return;
    }
    eprintln!("\n💡 {} [{}]:", error.registry(), error.code());
    for action in actions {
        eprintln!("  - {}", action);
    }
}

async fn validate_command(options: ConfigLoadOptions) -> Result<i32> {
    println!("\n🔍 shipbin Check\n");

    let config = ConfigLoader::new().load(options).await?;
    print_plan(&config)?;

    let credentials = SecureTokenManager::from_env().credential_source();
    if config.targets.includes(PublishTarget::Pypi) {
        println!("\nPyPI credentials: {}", credentials);
        if credentials == CredentialSource::Missing {
            println!("⚠️  {}", PublishError::TokenMissing {
                registry: PublishTarget::Pypi.to_string(),
            });
        }
    }

    println!("\n✅ Validation successful\n");
    Ok(0)
}

fn print_plan(config: &PublishConfig) -> Result<()> {
    println!("Name:     {}", config.name);
    println!("Version:  {}", config.version);
    println!("Targets:  {}", config.targets);
    println!("\nArtifacts:");
    for artifact in &config.artifacts {
        println!("  - {} → {}", artifact.platform, artifact.path.display());
    }

    if config.targets.includes(PublishTarget::Npm) {
        println!(
            "\n📦 npm (tag: {}, provenance: {}):",
            config.npm.tag, config.npm.provenance
        );
        for artifact in &config.artifacts {
            println!(
                "  - {}@{}",
                platform_package_name(&config.npm.org, &config.name, artifact),
                config.version
            );
        }
        println!("  - {}@{}", config.name, config.version);
    }

    if config.targets.includes(PublishTarget::Pypi) {
        let version = VersionValidator::new().to_pypi_version(&config.version)?;
        println!("\n🐍 PyPI ({}):", version);
        for artifact in &config.artifacts {
            println!(
                "  - {}",
                wheel_filename(&config.name, &version, artifact.mapping.wheel_tag)
            );
        }
    }

    Ok(())
}
