// src/main.rs

use anyhow::{anyhow, Context, Result};
use casket::build::{build_stream, CdcChunker, Chunker, FixedSizeChunker, TreeOptions};
use casket::crypto::{AeadCipher, AeadKey, Ed25519Signer, KeyStore};
use casket::manifest::{AeadMode, Manifest, NameConstructor};
use casket::{
    Digest, DigestAlgorithm, DirectoryStore, PacketStore, PayloadType, SignatureValidator,
    Traverser,
};
use clap::{Parser, Subcommand};
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use tracing::info;

#[derive(Parser)]
#[command(name = "casket")]
#[command(author, version, about = "Content-addressed manifest trees: chunk, build, reconstruct", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Chunk a file into a packet store and build its manifest tree
    Build {
        /// File to publish
        input: PathBuf,
        /// Packet store directory
        #[arg(short, long, default_value = "casket-store")]
        store: PathBuf,
        /// Maximum packet size in bytes
        #[arg(long, default_value_t = casket::DEFAULT_MAX_PACKET_SIZE)]
        max_packet_size: usize,
        /// Cap on pointers per manifest
        #[arg(long)]
        degree: Option<usize>,
        /// Use content-defined chunking instead of fixed-size chunks
        #[arg(long)]
        cdc: bool,
        /// Name the manifests under this prefix with segment-id suffixes
        #[arg(long)]
        manifest_prefix: Option<String>,
        /// Name for the root manifest
        #[arg(long)]
        root_name: Option<String>,
        /// Sign the root manifest with this key pair file
        #[arg(long)]
        sign_key: Option<PathBuf>,
        /// Encrypt manifests with an AES-GCM key from this key store
        #[arg(long, requires = "key_number")]
        keys: Option<PathBuf>,
        /// Key number in the key store to encrypt under
        #[arg(long)]
        key_number: Option<u64>,
    },
    /// Reconstruct a file from a root manifest digest
    Extract {
        /// Root manifest digest (hex)
        root: String,
        /// Output file
        #[arg(short, long)]
        out: PathBuf,
        /// Packet store directory
        #[arg(short, long, default_value = "casket-store")]
        store: PathBuf,
        /// Key store for encrypted trees
        #[arg(long)]
        keys: Option<PathBuf>,
        /// Verify packet signatures against this key pair file
        #[arg(long)]
        sign_key: Option<PathBuf>,
    },
    /// Print the structure of a manifest tree
    Inspect {
        /// Root manifest digest (hex)
        root: String,
        /// Packet store directory
        #[arg(short, long, default_value = "casket-store")]
        store: PathBuf,
    },
    /// Generate key material
    Keygen {
        #[command(subcommand)]
        what: KeygenCommands,
    },
}

#[derive(Subcommand)]
enum KeygenCommands {
    /// Generate an Ed25519 signing key pair
    Sign {
        /// Where to write the key pair
        #[arg(short, long)]
        out: PathBuf,
    },
    /// Add a random AES-GCM key to a key store
    Aead {
        /// Key store file (created if missing)
        #[arg(long)]
        keys: PathBuf,
        /// Key number to file the key under
        #[arg(long)]
        key_number: u64,
        /// Key size in bits (128 or 256)
        #[arg(long, default_value_t = 128)]
        bits: u32,
    },
}

fn parse_digest(hex: &str) -> Result<Digest> {
    Digest::from_hex(DigestAlgorithm::Sha256, hex)
        .map_err(|e| anyhow!("bad root digest {hex:?}: {e}"))
}

fn load_keystore(path: Option<&PathBuf>) -> Result<Option<KeyStore>> {
    match path {
        Some(path) => Ok(Some(
            KeyStore::load(path).with_context(|| format!("loading keys from {}", path.display()))?,
        )),
        None => Ok(None),
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Build {
            input,
            store,
            max_packet_size,
            degree,
            cdc,
            manifest_prefix,
            root_name,
            sign_key,
            keys,
            key_number,
        } => {
            let mut opts = TreeOptions {
                max_packet_size,
                max_tree_degree: degree,
                ..Default::default()
            };
            if let Some(prefix) = manifest_prefix {
                opts.manifest_scheme = NameConstructor::Segmented(
                    prefix.parse().map_err(|e| anyhow!("bad prefix: {e}"))?,
                );
            }
            if let Some(name) = root_name {
                opts.root_name = Some(name.parse().map_err(|e| anyhow!("bad root name: {e}"))?);
            }

            let signer = match sign_key {
                Some(path) => Some(
                    Ed25519Signer::load(&path)
                        .with_context(|| format!("loading signing key {}", path.display()))?,
                ),
                None => None,
            };
            let cipher = match (load_keystore(keys.as_ref())?, key_number) {
                (Some(keystore), Some(number)) => {
                    let key = keystore
                        .aead_key(number)
                        .ok_or_else(|| anyhow!("key store has no key #{number}"))?
                        .clone();
                    Some(AeadCipher::new(number, key))
                }
                _ => None,
            };

            let mut packet_store = DirectoryStore::open(&store)?;
            let file = File::open(&input)
                .with_context(|| format!("opening {}", input.display()))?;
            let mut reader = BufReader::new(file);

            let chunker: Box<dyn Chunker> = if cdc {
                Box::new(CdcChunker::for_budget(max_packet_size, &opts.data_scheme)?)
            } else {
                Box::new(FixedSizeChunker::for_budget(
                    max_packet_size,
                    &opts.data_scheme,
                )?)
            };
            let tree = build_stream(
                &mut reader,
                chunker.as_ref(),
                &opts,
                &mut packet_store,
                cipher
                    .as_ref()
                    .map(|c| c as &dyn casket::crypto::NodeEncryptor),
                signer.as_ref().map(|s| s as &dyn casket::crypto::Signer),
            )?;

            info!(
                packets = tree.total_packets(),
                leaves = tree.leaf_manifests,
                interior = tree.interior_manifests,
                "tree built"
            );
            println!("{}", tree.root_digest().to_hex());
            Ok(())
        }

        Commands::Extract {
            root,
            out,
            store,
            keys,
            sign_key,
        } => {
            let digest = parse_digest(&root)?;
            let packet_store = DirectoryStore::open(&store)?;
            let root_packet = packet_store.get(None, &digest)?;

            let keystore = load_keystore(keys.as_ref())?;
            let verifier = match sign_key {
                Some(path) => Some(Ed25519Signer::load(&path)?.verifier()),
                None => None,
            };
            let validator = verifier
                .as_ref()
                .map(|v| SignatureValidator::new(v as &dyn casket::crypto::Verifier));

            let file = File::create(&out)
                .with_context(|| format!("creating {}", out.display()))?;
            let mut writer = BufWriter::new(file);

            let mut traverser = Traverser::new(&packet_store);
            if let Some(keystore) = keystore.as_ref() {
                traverser = traverser.with_keys(keystore);
            }
            if let Some(validator) = validator.as_ref() {
                traverser = traverser.with_validator(validator);
            }
            let summary = traverser.traverse(&root_packet, &mut writer)?;

            println!(
                "wrote {} bytes from {} packets to {}",
                summary.bytes_written,
                summary.packets_visited,
                out.display()
            );
            Ok(())
        }

        Commands::Inspect { root, store } => {
            let digest = parse_digest(&root)?;
            let packet_store = DirectoryStore::open(&store)?;
            let root_packet = packet_store.get(None, &digest)?;
            inspect(&packet_store, &root_packet, 0)?;
            Ok(())
        }

        Commands::Keygen { what } => match what {
            KeygenCommands::Sign { out } => {
                let signer = Ed25519Signer::generate();
                signer.save(&out)?;
                println!("wrote signing key {} ({})", out.display(), signer.key_id());
                Ok(())
            }
            KeygenCommands::Aead {
                keys,
                key_number,
                bits,
            } => {
                let mode = match bits {
                    128 => AeadMode::AesGcm128,
                    256 => AeadMode::AesGcm256,
                    other => return Err(anyhow!("unsupported AES-GCM key size {other}")),
                };
                let mut keystore = if keys.exists() {
                    KeyStore::load(&keys)?
                } else {
                    KeyStore::new()
                };
                keystore.add_aead_key(key_number, AeadKey::generate(mode));
                keystore.save(&keys)?;
                println!("added {mode} key #{key_number} to {}", keys.display());
                Ok(())
            }
        },
    }
}

/// Print one packet and recurse through its children.
fn inspect(store: &DirectoryStore, packet: &casket::Packet, depth: usize) -> Result<()> {
    let indent = "  ".repeat(depth);
    match packet.payload_type() {
        PayloadType::Data => {
            println!(
                "{indent}data {} ({} bytes)",
                packet.digest().short_hex(),
                packet.payload().len()
            );
        }
        PayloadType::Manifest => {
            let manifest = Manifest::decode(packet.payload())?;
            match manifest.node() {
                None => {
                    println!(
                        "{indent}manifest {} [encrypted, {}]",
                        packet.digest().short_hex(),
                        manifest
                            .security_ctx
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_default()
                    );
                }
                Some(node) => {
                    println!(
                        "{indent}manifest {} ({} pointers)",
                        packet.digest().short_hex(),
                        node.pointer_count()
                    );
                    for group in node.groups() {
                        for pointer in &group.pointers {
                            let child = store.get(None, pointer)?;
                            inspect(store, &child, depth + 1)?;
                        }
                    }
                }
            }
        }
    }
    Ok(())
}
