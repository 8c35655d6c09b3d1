use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use basalt_core::Db;
use clap::Parser;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "basalt-server", about = "Redis-wire key/value server over an ordered store")]
struct Args {
    /// Address to bind.
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on.
    #[arg(short, long, default_value_t = 6380)]
    port: u16,

    /// Directory for the store's data files.
    #[arg(long, default_value = "basalt-data")]
    data_dir: PathBuf,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "basalt=info".into()),
        )
        .init();

    let args = Args::parse();
    let db = Arc::new(Db::open(&args.data_dir)?);
    info!(data_dir = %args.data_dir.display(), "store opened");

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    basalt_server::run(addr, db).await?;
    Ok(())
}
