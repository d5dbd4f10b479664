use anyhow::Context;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use clap::{Parser, Subcommand};
use fhir::{Bundle, StructureDefinition};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use transfer_core::clients::directory::DirectorySchemaLookup;
use transfer_core::constants::RETURN_AAD;
use transfer_core::{PayloadCodec, Redaction, ReturnKey, SnapshotGenerator, TransferConfig};

#[derive(Parser)]
#[command(name = "transfer")]
#[command(about = "Cross-site clinical data transfer tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a base64 AES-256 return key
    Keygen,
    /// Encrypt a bundle
    Encrypt {
        /// Bundle JSON file
        input: PathBuf,
        /// Base64 key (16 or 32 bytes)
        #[arg(long, env = "TRANSFER_KEY")]
        key: String,
        /// Ciphertext file; base64 on stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Decrypt a bundle
    Decrypt {
        /// Ciphertext file, raw bytes or base64
        input: PathBuf,
        /// Base64 key (16 or 32 bytes)
        #[arg(long, env = "TRANSFER_KEY")]
        key: String,
        /// Bundle JSON file; stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Encrypt a validation result for return, hiding the receiver's pseudonym
    EncryptValidationError {
        /// Result bundle JSON file
        input: PathBuf,
        /// Base64 return key
        #[arg(long, env = "TRANSFER_KEY")]
        key: String,
        /// The receiving site's pseudonym for the patient
        #[arg(long)]
        pseudonym: String,
        /// Ciphertext file; base64 on stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Generate a snapshot for a differential profile
    Snapshot {
        /// Profile file (JSON or YAML)
        input: PathBuf,
        /// Directory of base profiles (defaults to TRANSFER_SCHEMA_DIR)
        #[arg(long)]
        schema_dir: Option<PathBuf>,
        /// Snapshot JSON file; stdout if omitted
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

/// Main entry point for the transfer CLI
///
/// # Environment Variables
/// - `TRANSFER_BLOOM_FILTER_SYSTEM`: bloom-filter naming system
/// - `TRANSFER_DIC_PSEUDONYM_SYSTEM`: naming system of this site's pseudonyms
/// - `TRANSFER_CRR_PSEUDONYM_SYSTEM`: naming system of the peer's pseudonyms
/// - `TRANSFER_PSEUDONYM_PLACEHOLDER`: token written in place of redacted pseudonyms
/// - `TRANSFER_SCHEMA_DIR`: directory of base profiles (default: "profiles")
/// - `TRANSFER_KEY`: default base64 key for the crypto subcommands
fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("transfer=info".parse()?),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let cli = Cli::parse();

    let cfg = Arc::new(TransferConfig::from_env_values(
        std::env::var("TRANSFER_BLOOM_FILTER_SYSTEM").ok(),
        std::env::var("TRANSFER_DIC_PSEUDONYM_SYSTEM").ok(),
        std::env::var("TRANSFER_CRR_PSEUDONYM_SYSTEM").ok(),
        std::env::var("TRANSFER_PSEUDONYM_PLACEHOLDER").ok(),
        std::env::var("TRANSFER_SCHEMA_DIR").ok(),
    )?);

    match cli.command {
        Commands::Keygen => {
            println!("{}", ReturnKey::generate().to_base64());
        }
        Commands::Encrypt { input, key, output } => {
            let bundle = read_bundle(&input)?;
            let key = ReturnKey::from_base64(&key)?;
            let ciphertext = PayloadCodec::encrypt(&bundle, RETURN_AAD, &key)?;
            write_ciphertext(output.as_deref(), &ciphertext)?;
        }
        Commands::Decrypt { input, key, output } => {
            let ciphertext = read_ciphertext(&input)?;
            let key = ReturnKey::from_base64(&key)?;
            let bundle = PayloadCodec::decrypt(&ciphertext, RETURN_AAD, &key)?;
            write_text(output.as_deref(), &bundle.render_pretty()?)?;
        }
        Commands::EncryptValidationError {
            input,
            key,
            pseudonym,
            output,
        } => {
            let bundle = read_bundle(&input)?;
            let key = ReturnKey::from_base64(&key)?;
            let redaction = Redaction {
                pseudonym: &pseudonym,
                placeholder: cfg.pseudonym_placeholder(),
                own_system: cfg.dic_pseudonym_system(),
                peer_system: cfg.crr_pseudonym_system(),
            };
            let ciphertext =
                PayloadCodec::encrypt_with_pseudonym_redaction(&bundle, &redaction, RETURN_AAD, &key)?;
            write_ciphertext(output.as_deref(), &ciphertext)?;
        }
        Commands::Snapshot {
            input,
            schema_dir,
            output,
        } => {
            let schema_dir = schema_dir.unwrap_or_else(|| cfg.schema_dir().to_path_buf());
            let lookup = DirectorySchemaLookup::load(&schema_dir)?;
            tracing::info!(
                "++ Loaded {} profiles from {}",
                lookup.len(),
                schema_dir.display()
            );

            let differential = read_profile(&input)?;
            let result = SnapshotGenerator::new(Arc::new(lookup)).generate_snapshot(&differential);

            for message in &result.messages {
                eprintln!("{message}");
            }
            write_text(output.as_deref(), &result.snapshot.render_pretty()?)?;

            if result.has_errors() {
                anyhow::bail!("snapshot generated with {} message(s)", result.messages.len());
            }
        }
    }

    Ok(())
}

fn read_bundle(path: &Path) -> anyhow::Result<Bundle> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    Ok(Bundle::parse(&text)?)
}

fn read_profile(path: &Path) -> anyhow::Result<StructureDefinition> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    let is_yaml = matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yaml" | "yml")
    );
    let definition = if is_yaml {
        StructureDefinition::parse_yaml(&text)?
    } else {
        StructureDefinition::parse(&text)?
    };
    Ok(definition)
}

/// Raw ciphertext, or base64 text as written to stdout by `encrypt`.
fn read_ciphertext(path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes =
        std::fs::read(path).with_context(|| format!("failed to read {}", path.display()))?;
    let decoded = std::str::from_utf8(&bytes)
        .ok()
        .and_then(|text| BASE64.decode(text.trim()).ok());
    Ok(decoded.unwrap_or(bytes))
}

fn write_ciphertext(output: Option<&Path>, ciphertext: &[u8]) -> anyhow::Result<()> {
    match output {
        Some(path) => std::fs::write(path, ciphertext)
            .with_context(|| format!("failed to write {}", path.display())),
        None => {
            println!("{}", BASE64.encode(ciphertext));
            Ok(())
        }
    }
}

fn write_text(output: Option<&Path>, text: &str) -> anyhow::Result<()> {
    match output {
        Some(path) => {
            std::fs::write(path, text).with_context(|| format!("failed to write {}", path.display()))
        }
        None => {
            println!("{text}");
            Ok(())
        }
    }
}
