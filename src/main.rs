use clap::Parser;
use color_eyre::eyre::WrapErr;
use color_eyre::Result;
use log::{debug, info};
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

use fattree_builder::config::{FabricConfig, FabricOverrides};
use fattree_builder::output::{self, OutputFormat};
use fattree_builder::topology;
use fattree_builder::utils::logging::{log_filter, DEFAULT_LOG_LEVEL};

/// Generate k-ary-n-tree (fat-tree) topology files in ibnetdiscover format
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None, disable_version_flag = true)]
struct Args {
    /// k (k-ary-n-tree) is half the number of ports of each switch
    #[arg(
        short = 'k',
        long = "ftree-half-ports-of-each-switch",
        value_name = "K",
        required_unless_present = "config"
    )]
    k: Option<u32>,

    /// n (k-ary-n-tree) is the number of levels in the tree
    #[arg(
        short = 'n',
        long = "ftree-levels",
        value_name = "N",
        required_unless_present = "config"
    )]
    n: Option<u32>,

    /// Connect a mirrored subtree to the free ports of the root switches,
    /// doubling the number of hosts
    #[arg(short = 'f', long = "fully-connected-root-switches")]
    fully_connected_roots: bool,

    /// Oversubscription rate of the leaf switches [default: 1]
    #[arg(short = 'o', long, value_parser = clap::value_parser!(u32).range(1..=4))]
    oversubscription: Option<u32>,

    /// YAML file with fabric parameters; command-line values take precedence
    #[arg(short = 'c', long)]
    config: Option<PathBuf>,

    /// Link speed label written on every port line [default: 4xEDR]
    #[arg(long)]
    link_speed: Option<String>,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Ibnetdiscover)]
    format: OutputFormat,

    /// Write the topology to this file instead of standard output
    #[arg(long)]
    output: Option<PathBuf>,

    /// Leave the generation time out of the file header
    #[arg(long)]
    no_timestamp: bool,

    /// LOG_LEVEL might be set to: CRITICAL, ERROR, WARNING, INFO, DEBUG
    #[arg(short = 'l', long = "loglevel", value_name = "LOG_LEVEL", default_value = DEFAULT_LOG_LEVEL)]
    loglevel: String,

    /// Disable logging in the console
    #[arg(short = 'q', long)]
    quiet: bool,

    /// Print version
    #[arg(short = 'v', long, action = clap::ArgAction::Version)]
    version: Option<bool>,
}

impl Args {
    fn overrides(&self) -> FabricOverrides {
        FabricOverrides {
            k: self.k,
            n: self.n,
            oversubscription: self.oversubscription,
            fully_connected_roots: self.fully_connected_roots,
            link_speed: self.link_speed.clone(),
        }
    }

    /// Assemble the fabric configuration from the optional file and the flags
    fn fabric_config(&self) -> Result<FabricConfig> {
        let mut config = match &self.config {
            Some(path) => FabricConfig::load(path)
                .wrap_err_with(|| format!("Failed to load configuration '{}'", path.display()))?,
            None => FabricConfig::default(),
        };
        config.apply_overrides(&self.overrides());
        Ok(config)
    }
}

fn main() -> Result<()> {
    // Initialize error handling
    color_eyre::install()?;

    let args = Args::parse();

    // Initialize logging; an unknown level is a configuration error
    let filter = log_filter(&args.loglevel, args.quiet)?;
    env_logger::Builder::new()
        .filter_level(filter)
        .format_timestamp(None)
        .format_target(false)
        .init();

    info!("{} v{} is running...", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION"));

    let config = args.fabric_config()?;
    debug!("Fabric configuration: {:?}", config);

    // Build fully in memory before anything is written
    let fabric = topology::build(&config).wrap_err("Failed to build the fat-tree topology")?;

    let generated_at = (!args.no_timestamp).then(|| chrono::Local::now().naive_local());

    match &args.output {
        Some(path) => {
            let file = File::create(path)
                .wrap_err_with(|| format!("Failed to create output file '{}'", path.display()))?;
            let mut writer = BufWriter::new(file);
            output::render(&mut writer, args.format, &fabric, &config, generated_at)?;
            writer.flush().wrap_err("Failed to flush output file")?;
            info!("Topology written to {:?}", path);
        }
        None => {
            let stdout = io::stdout();
            let mut writer = BufWriter::new(stdout.lock());
            output::render(&mut writer, args.format, &fabric, &config, generated_at)?;
            writer.flush().wrap_err("Failed to flush standard output")?;
        }
    }

    output::log_summary(&fabric);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_cli_parsing() {
        let args = Args::parse_from(["fattree-builder", "-k", "4", "-n", "3"]);

        assert_eq!(args.k, Some(4));
        assert_eq!(args.n, Some(3));
        assert_eq!(args.oversubscription, None);
        assert!(!args.fully_connected_roots);
        assert_eq!(args.loglevel, "INFO");
        assert_eq!(args.format, OutputFormat::Ibnetdiscover);

        let config = args.fabric_config().unwrap();
        assert_eq!(config, FabricConfig::new(4, 3, 1, false));
    }

    #[test]
    fn test_long_options() {
        let args = Args::parse_from([
            "fattree-builder",
            "--ftree-half-ports-of-each-switch", "2",
            "--ftree-levels", "4",
            "--fully-connected-root-switches",
            "--oversubscription", "3",
            "--loglevel", "DEBUG",
            "--link-speed", "4xHDR",
            "--format", "json",
            "--no-timestamp",
            "--quiet",
        ]);

        assert!(args.fully_connected_roots);
        assert!(args.quiet);
        assert!(args.no_timestamp);
        assert_eq!(args.format, OutputFormat::Json);

        let config = args.fabric_config().unwrap();
        assert_eq!(config.oversubscription, 3);
        assert_eq!(config.link_speed, "4xHDR");
        assert!(config.fully_connected_roots);
    }

    #[test]
    fn test_k_and_n_are_required() {
        assert!(Args::try_parse_from(["fattree-builder", "-k", "2"]).is_err());
        assert!(Args::try_parse_from(["fattree-builder", "-n", "2"]).is_err());
    }

    #[test]
    fn test_oversubscription_range() {
        for bad in ["0", "5"] {
            assert!(Args::try_parse_from(["fattree-builder", "-k", "2", "-n", "2", "-o", bad]).is_err());
        }
        let args = Args::try_parse_from(["fattree-builder", "-k", "2", "-n", "2", "-o", "4"]).unwrap();
        assert_eq!(args.oversubscription, Some(4));
    }

    #[test]
    fn test_version_flag() {
        let err = Args::try_parse_from(["fattree-builder", "-v"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayVersion);
    }

    #[test]
    fn test_config_file_with_cli_override() {
        let mut temp_file = NamedTempFile::new().unwrap();
        write!(temp_file, "k: 4\nn: 2\noversubscription: 2\n").unwrap();
        let path = temp_file.path().to_str().unwrap().to_string();

        let args = Args::parse_from(["fattree-builder", "--config", &path, "-n", "3"]);
        let config = args.fabric_config().unwrap();

        assert_eq!(config.k, 4);
        assert_eq!(config.n, 3);
        assert_eq!(config.oversubscription, 2);
    }
}
