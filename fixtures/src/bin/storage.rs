use clap::Parser;
use fixtures::storage::{storage_router, StorageState};
use fixtures::{run_server, FixtureArgs};

/// Blob-storage fixture server
#[derive(Parser, Debug)]
#[clap(name = "storage-fixture")]
struct Cli {
    #[clap(flatten)]
    common: FixtureArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    run_server(args.common, storage_router(StorageState::new())).await
}
