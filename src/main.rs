//! SCITT Transparency Log - Service Launcher
//!
//! Run modes:
//!   scitt-log api        - Start the HTTP service
//!   scitt-log keygen     - Generate a service signing key
//!   scitt-log demo       - Register a sample statement in-memory
//!   scitt-log help       - Show usage

use std::env;
use std::sync::Arc;
use tokio::sync::RwLock;

use scitt_log::api::{start_server, AppState};
use scitt_log::config::{PolicyMode, ServiceConfig};
use scitt_log::cose::sign1::encode_protected;
use scitt_log::cose::HEADER_CWT_CLAIMS;
use scitt_log::logging::{init_logging, LogLevel};
use scitt_log::registration::{
    AcceptAllPolicy, RegistrationService, RequireSignaturePolicy, StatementPolicy,
};
use scitt_log::{
    BlobStore, CoseSign1, CwtClaims, Es256SigningKey, Es256VerifyingKey, FsBlobStore,
    MemoryBlobStore, MemoryMetadataIndex, MetadataIndex, SqliteMetadataIndex, TileLog,
};

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    let args: Vec<String> = env::args().collect();
    match args.get(1).map(String::as_str) {
        Some("api") => run_api().await,
        Some("keygen") => run_keygen(),
        Some("demo") => run_demo().await,
        Some("help") | Some("--help") | Some("-h") | None => print_usage(),
        Some(_) => print_usage(),
    }
}

fn print_usage() {
    println!("SCITT Transparency Log");
    println!();
    println!("Usage:");
    println!("  scitt-log api       Start the HTTP service");
    println!("  scitt-log keygen    Generate a service signing key");
    println!("  scitt-log demo      Register a sample statement in-memory");
    println!();
    println!("Environment Variables:");
    println!("  SCITT_ORIGIN               Log origin URL");
    println!("  SCITT_PORT                 HTTP listen port (default: 8080)");
    println!("  SCITT_DATA_DIR             Tile storage directory (in-memory if unset)");
    println!("  SCITT_DB_PATH              SQLite metadata index path (in-memory if unset)");
    println!("  SCITT_SERVICE_KEY          Hex-encoded P-256 signing key");
    println!("  SCITT_REGISTRATION_POLICY  accept-all | require-signature");
    println!("  SCITT_TRUSTED_KEYS         Comma-separated hex COSE_Keys (require-signature)");
    println!("  SCITT_LOG_LEVEL            debug | info | warn | error");
    println!("  SCITT_LOG_JSON             Set to 1 for JSON logs");
}

/// Start the HTTP service from environment configuration
async fn run_api() {
    let config = match ServiceConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    config.print_summary();

    if let Err(e) = init_logging(LogLevel::from(config.log_level.as_str()), config.log_json) {
        eprintln!("Warning: {}", e);
    }

    // Service signing key
    let key = match &config.service_key_hex {
        Some(hex) => match Es256SigningKey::from_hex(hex) {
            Ok(key) => key,
            Err(e) => {
                eprintln!("Invalid SCITT_SERVICE_KEY: {}", e);
                std::process::exit(1);
            }
        },
        None => {
            eprintln!(
                "WARNING: Generating an ephemeral service key; receipts will not verify after restart"
            );
            Es256SigningKey::generate()
        }
    };
    println!("Service kid: {}", key.verifying_key().thumbprint());

    // Blob store
    let store: Arc<dyn BlobStore> = match &config.data_dir {
        Some(dir) => match FsBlobStore::new(dir) {
            Ok(store) => Arc::new(store),
            Err(e) => {
                eprintln!("Failed to open blob store at {}: {}", dir.display(), e);
                std::process::exit(1);
            }
        },
        None => Arc::new(MemoryBlobStore::new()),
    };

    // Tile log
    let log = match TileLog::load(store).await {
        Ok(log) => log,
        Err(e) => {
            eprintln!("Failed to load tile log: {}", e);
            std::process::exit(1);
        }
    };
    println!("Tree size: {}", log.size());

    // Metadata index
    let index: Arc<dyn MetadataIndex> = match &config.db_path {
        Some(path) => match SqliteMetadataIndex::new(path) {
            Ok(index) => Arc::new(index),
            Err(e) => {
                eprintln!("Failed to open metadata index at {}: {}", path.display(), e);
                std::process::exit(1);
            }
        },
        None => Arc::new(MemoryMetadataIndex::new()),
    };

    // Startup reconciliation: an index behind the log is a tolerated gap.
    match index.tree_size().await {
        Ok(indexed) if indexed != log.size() => {
            eprintln!(
                "Warning: metadata index records tree size {} but the log holds {}",
                indexed,
                log.size()
            );
        }
        Ok(_) => {}
        Err(e) => eprintln!("Warning: could not read metadata index: {}", e),
    }

    // Acceptance policy
    let policy: Arc<dyn StatementPolicy> = match config.policy {
        PolicyMode::AcceptAll => Arc::new(AcceptAllPolicy),
        PolicyMode::RequireSignature => {
            let mut policy = RequireSignaturePolicy::new();
            match load_trusted_keys() {
                Ok(keys) if keys.is_empty() => {
                    eprintln!(
                        "Warning: require-signature policy with no SCITT_TRUSTED_KEYS; every statement will be refused"
                    );
                }
                Ok(keys) => {
                    for key in keys {
                        policy = policy.trust(key);
                    }
                }
                Err(e) => {
                    eprintln!("Invalid SCITT_TRUSTED_KEYS: {}", e);
                    std::process::exit(1);
                }
            }
            Arc::new(policy)
        }
    };

    let registration = RegistrationService::new(
        Arc::new(RwLock::new(log)),
        index,
        key,
        config.origin.clone(),
        policy,
    );
    let state = AppState::new(Arc::new(registration));

    if let Err(e) = start_server(state, config.port).await {
        eprintln!("Server error: {}", e);
    }
}

/// Parse SCITT_TRUSTED_KEYS: comma-separated hex-encoded public COSE_Keys
fn load_trusted_keys() -> Result<Vec<Es256VerifyingKey>, String> {
    let raw = match env::var("SCITT_TRUSTED_KEYS") {
        Ok(raw) => raw,
        Err(_) => return Ok(Vec::new()),
    };
    let mut keys = Vec::new();
    for part in raw.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let bytes = hex::decode(part).map_err(|e| e.to_string())?;
        keys.push(Es256VerifyingKey::from_cose_key(&bytes).map_err(|e| e.to_string())?);
    }
    Ok(keys)
}

/// Generate and print a service signing key
fn run_keygen() {
    let key = Es256SigningKey::generate();
    println!("SCITT_SERVICE_KEY={}", key.to_hex());
    println!("kid: {}", key.verifying_key().thumbprint());
    match key.verifying_key().to_cose_key() {
        Ok(cose) => println!("public COSE_Key: {}", hex::encode(cose)),
        Err(e) => eprintln!("Warning: could not encode COSE_Key: {}", e),
    }
}

/// Register a sample statement against an in-memory log
async fn run_demo() {
    println!("\n=== SCITT Log Demo ===\n");

    let store = Arc::new(MemoryBlobStore::new());
    let log = TileLog::load(store).await.expect("empty store loads");
    let service_key = Es256SigningKey::generate();
    let registration = RegistrationService::new(
        Arc::new(RwLock::new(log)),
        Arc::new(MemoryMetadataIndex::new()),
        service_key.clone(),
        "https://demo.scitt.localhost",
        Arc::new(AcceptAllPolicy),
    );

    // An issuer signs a statement about an artifact.
    let issuer = Es256SigningKey::generate();
    let protected = encode_protected(vec![
        (ciborium::value::Value::from(1), ciborium::value::Value::from(-7)),
        (
            ciborium::value::Value::from(HEADER_CWT_CLAIMS),
            CwtClaims::new("https://issuer.example", "pkg:example/widget@1.0.0").to_value(),
        ),
    ])
    .expect("protected headers encode");
    let statement = CoseSign1::sign(protected, vec![], Some(b"artifact digest".to_vec()), None, &issuer)
        .expect("statement signs")
        .encode()
        .expect("statement encodes");

    println!("Statement: {} bytes", statement.len());

    let receipt = registration
        .register(&statement)
        .await
        .expect("registration succeeds");
    println!("Receipt:   {} bytes", receipt.len());

    let verified = scitt_log::verify_receipt(&receipt, &statement, &service_key.verifying_key())
        .expect("receipt decodes");
    println!("Receipt verifies: {}", verified);

    let checkpoint = registration.checkpoint().await.expect("checkpoint signs");
    println!("\nCheckpoint note:\n{}", checkpoint.to_note());

    println!("=== Demo Complete ===");
}
