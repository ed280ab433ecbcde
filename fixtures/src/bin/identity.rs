use clap::Parser;
use fixtures::identity::{identity_router, IdentityState};
use fixtures::{run_server, FixtureArgs};

/// Identity fixture server
#[derive(Parser, Debug)]
#[clap(name = "identity-fixture")]
struct Cli {
    #[clap(flatten)]
    common: FixtureArgs,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Cli::parse();
    run_server(args.common, identity_router(IdentityState::seeded())).await
}
