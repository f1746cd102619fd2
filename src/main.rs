use clap::Parser;
use memocache::cli::{commands, Cli, Commands};
use memocache::types::config::Config;
use memocache::CacheResult;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

fn main() -> CacheResult<()> {
    let cli = Cli::parse();

    // Load configuration first (no logging yet)
    let mut config = if cli.config.exists() {
        let mut config = Config::load(&cli.config)?;
        if let Some(base) = cli.config.parent() {
            config.cache.resolve_relative_to(base);
        }
        config
    } else {
        Config::default_config()
    };

    if let Some(dir) = &cli.dir {
        config.cache.directory = dir.clone();
    }

    // CLI flags take precedence over config
    let log_level = if cli.quiet {
        "error".to_string()
    } else if cli.verbose {
        "debug".to_string()
    } else {
        config.general.log_level.clone()
    };

    let filter = EnvFilter::from_default_env().add_directive(
        format!("memocache={}", log_level)
            .parse()
            .unwrap_or_else(|_| "memocache=info".parse().expect("fallback directive is valid")),
    );

    if config.general.log_format.eq_ignore_ascii_case("json") {
        tracing_subscriber::registry()
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .with(filter)
            .init();
    } else {
        tracing_subscriber::registry()
            .with(fmt::layer().with_writer(std::io::stderr))
            .with(filter)
            .init();
    }

    tracing::debug!("Configuration loaded from: {}", cli.config.display());

    match cli.command {
        Commands::Init { path } => commands::init(path)?,
        Commands::Stats => commands::stats(&config.cache)?,
        Commands::List { limit } => commands::list(limit, &config.cache)?,
        Commands::Inspect { key } => commands::inspect(&key, &config.cache)?,
        Commands::Get { key } => commands::get(&key, &config.cache)?,
        Commands::Delete { key } => commands::delete(&key, &config.cache)?,
        Commands::Prune => commands::prune(&config.cache)?,
        Commands::Clear { yes } => commands::clear(yes, &config.cache)?,
        Commands::Doctor => commands::doctor(&config.cache)?,
        Commands::Config => commands::config_cmd(&config, &cli.config)?,
        Commands::Version => commands::version(),
    }

    Ok(())
}
