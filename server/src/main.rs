use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use inkroom_server::auth::TokenVerifier;
use inkroom_server::state::AppState;
use inkroom_server::storage::{FileStore, MemoryStore, S3Store, S3StoreConfig, Store};

#[derive(Parser)]
#[command(author, version, about)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
    #[arg(long, env = "PORT", default_value_t = 8080)]
    port: u16,
    #[arg(long)]
    public_dir: Option<PathBuf>,
    /// Shared secret the identity service signs tokens with.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    jwt_secret: String,
    #[arg(long, value_enum, default_value_t = StorageKind::File)]
    storage: StorageKind,
    #[arg(long, env = "INKROOM_DATA_DIR")]
    data_dir: Option<PathBuf>,
    #[arg(long, env = "S3_BUCKET")]
    s3_bucket: Option<String>,
    #[arg(long, env = "S3_PREFIX")]
    s3_prefix: Option<String>,
    #[arg(long, env = "S3_REGION")]
    s3_region: Option<String>,
    #[arg(long, env = "S3_ENDPOINT_URL")]
    s3_endpoint_url: Option<String>,
    #[arg(long, env = "S3_FORCE_PATH_STYLE")]
    s3_force_path_style: bool,
    #[arg(long, env = "S3_ACCESS_KEY_ID")]
    s3_access_key_id: Option<String>,
    #[arg(long, env = "S3_SECRET_ACCESS_KEY", hide_env_values = true)]
    s3_secret_access_key: Option<String>,
    #[arg(long, requires = "tls_key")]
    tls_cert: Option<PathBuf>,
    #[arg(long, requires = "tls_cert")]
    tls_key: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Print a signed token for the given user id.
    IssueToken {
        #[arg(long)]
        user: String,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum StorageKind {
    Memory,
    File,
    S3,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "inkroom_server=info,tower_http=info".into()),
        )
        .init();

    let args = Args::parse();
    let verifier = TokenVerifier::new(&args.jwt_secret);

    if let Some(Command::IssueToken { user }) = &args.command {
        match verifier.issue(user) {
            Ok(token) => println!("{token}"),
            Err(error) => {
                tracing::error!(%error, "failed to sign token");
                std::process::exit(1);
            }
        }
        return;
    }

    let store = build_store(&args).await;
    let state = AppState::new(store, verifier);

    let public_dir = args
        .public_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../public"));
    let public_dir = public_dir.is_dir().then_some(public_dir);
    if public_dir.is_none() {
        tracing::warn!("no public dir found, serving the API only");
    }
    let app = inkroom_server::app(state, public_dir);

    let addr = SocketAddr::from(([0, 0, 0, 0], args.port));
    if let (Some(cert), Some(key)) = (&args.tls_cert, &args.tls_key) {
        let config = axum_server::tls_rustls::RustlsConfig::from_pem_file(cert, key)
            .await
            .expect("Failed to load TLS certificate");
        tracing::info!("Whiteboard relay listening on https://{addr}");
        axum_server::bind_rustls(addr, config)
            .serve(app.into_make_service())
            .await
            .expect("Server crashed");
    } else {
        tracing::info!("Whiteboard relay listening on http://{addr}");
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .expect("Failed to bind server");
        axum::serve(listener, app).await.expect("Server crashed");
    }
}

async fn build_store(args: &Args) -> Arc<dyn Store> {
    match args.storage {
        StorageKind::Memory => {
            tracing::warn!("using in-memory storage, shapes are lost on restart");
            Arc::new(MemoryStore::new())
        }
        StorageKind::File => {
            let data_dir = args
                .data_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../data"));
            if let Err(error) = tokio::fs::create_dir_all(&data_dir).await {
                tracing::error!(%error, dir = %data_dir.display(), "failed to create data dir");
            }
            tracing::info!(dir = %data_dir.display(), "using file storage");
            Arc::new(FileStore::new(data_dir))
        }
        StorageKind::S3 => {
            let Some(bucket) = args.s3_bucket.clone() else {
                tracing::error!("--storage s3 needs --s3-bucket");
                std::process::exit(2);
            };
            let mut config = S3StoreConfig::new(bucket);
            config.prefix = args.s3_prefix.clone();
            config.region = args.s3_region.clone();
            config.endpoint_url = args.s3_endpoint_url.clone();
            config.force_path_style = args.s3_force_path_style;
            config.access_key_id = args.s3_access_key_id.clone();
            config.secret_access_key = args.s3_secret_access_key.clone();
            tracing::info!(bucket = %config.bucket, "using s3 storage");
            Arc::new(S3Store::new(config).await)
        }
    }
}
