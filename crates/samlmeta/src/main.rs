#![forbid(unsafe_code)]

//! samlmeta CLI: fetch, verify and extract SAML IdP metadata.

use clap::{Parser, Subcommand};
use samlmeta::core::Pinned;
use samlmeta::net::TlsProbe;
use samlmeta::{Error, InMemorySource, MetadataCycle, PinTarget, TrustConfig};
use std::path::PathBuf;
use std::process;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
    name = "samlmeta",
    about = "Fetch, verify and extract SAML identity provider metadata",
    version
)]
struct Cli {
    /// Verbose logging on stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch metadata and print relation data
    Fetch {
        /// Entity ID of the identity provider
        #[arg(long, env = "SAML_ENTITY_ID")]
        entity_id: String,

        /// Metadata URL (http or https)
        #[arg(long, env = "SAML_METADATA_URL")]
        metadata_url: String,

        /// SHA-256 fingerprint to pin (`:` or space separated)
        #[arg(long, env = "SAML_FINGERPRINT", default_value = "")]
        fingerprint: String,

        /// What the fingerprint pins: signing or tls
        #[arg(long, default_value = "signing")]
        pin_target: PinTarget,

        /// Fetch timeout in seconds
        #[arg(long, default_value_t = 10)]
        timeout: u64,
    },

    /// Run the same pipeline over a local metadata file
    Inspect {
        /// Metadata XML file
        file: PathBuf,

        /// Entity ID of the identity provider
        #[arg(long, env = "SAML_ENTITY_ID")]
        entity_id: String,

        /// Metadata URL reported in the relation data
        #[arg(long, env = "SAML_METADATA_URL", default_value = "http://localhost/metadata")]
        metadata_url: String,

        /// SHA-256 fingerprint of the signing certificate
        #[arg(long, env = "SAML_FINGERPRINT", default_value = "")]
        fingerprint: String,
    },

    /// Compare a host's TLS certificate with a fingerprint
    Probe {
        /// Host name
        host: String,

        /// Expected SHA-256 fingerprint
        #[arg(long, env = "SAML_FINGERPRINT")]
        fingerprint: String,

        /// TLS port
        #[arg(long, default_value_t = 443)]
        port: u16,
    },
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let result = match cli.command {
        Commands::Fetch {
            entity_id,
            metadata_url,
            fingerprint,
            pin_target,
            timeout,
        } => cmd_fetch(&entity_id, &metadata_url, &fingerprint, pin_target, timeout),

        Commands::Inspect {
            file,
            entity_id,
            metadata_url,
            fingerprint,
        } => cmd_inspect(file, &entity_id, &metadata_url, &fingerprint),

        Commands::Probe {
            host,
            fingerprint,
            port,
        } => cmd_probe(&host, &fingerprint, port),
    };

    if let Err(e) = result {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn cmd_fetch(
    entity_id: &str,
    metadata_url: &str,
    fingerprint: &str,
    pin_target: PinTarget,
    timeout: u64,
) -> Result<(), Error> {
    let config = TrustConfig::new(entity_id, metadata_url)?
        .with_fingerprint(fingerprint)?
        .with_pin_target(pin_target)?;
    let cycle = MetadataCycle::over_http(config, Duration::from_secs(timeout))?;
    print_relation_data(&cycle)
}

fn cmd_inspect(
    file: PathBuf,
    entity_id: &str,
    metadata_url: &str,
    fingerprint: &str,
) -> Result<(), Error> {
    let config = TrustConfig::new(entity_id, metadata_url)?.with_fingerprint(fingerprint)?;
    let source = InMemorySource::from_file(&file)?;
    let cycle = MetadataCycle::new(config, Box::new(source), Box::new(TlsProbe::new()));
    print_relation_data(&cycle)
}

fn cmd_probe(host: &str, fingerprint: &str, port: u16) -> Result<(), Error> {
    if TlsProbe::new().port(port).verify_fingerprint(host, fingerprint)? {
        println!("fingerprint matches {host}:{port}");
        Ok(())
    } else {
        Err(Error::FingerprintMismatch {
            pinned: Pinned::TlsCertificate,
            reason: format!("{host}:{port} served another certificate"),
        })
    }
}

fn print_relation_data(cycle: &MetadataCycle) -> Result<(), Error> {
    for (key, value) in cycle.relation_data()?.to_relation_data() {
        println!("{key}={value}");
    }
    Ok(())
}
