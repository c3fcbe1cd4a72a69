use std::path::PathBuf;

use argh::FromArgs;
use depthmatch_serve::{
    config::Registries,
    router,
    state::{init_checkpoints, AppState},
};

/// Swap depth and matching models and run inference on demand
#[derive(Debug, FromArgs)]
struct Args {
    /// address to bind
    #[argh(option, default = "String::from(\"0.0.0.0\")")]
    host: String,

    /// port to listen on
    #[argh(option, short = 'p', default = "8000")]
    port: u16,

    /// JSON registry with the "depth" and "match" model tables
    #[argh(option, short = 'r')]
    registry: Option<PathBuf>,

    /// root directory of the built-in checkpoints
    #[argh(option, short = 'c', default = "PathBuf::from(\"checkpoints\")")]
    checkpoint_dir: PathBuf,

    /// write initial weights for every registered checkpoint that is missing
    #[argh(switch)]
    init_checkpoints: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args: Args = argh::from_env();

    let registries = Registries::load(args.registry.as_deref(), &args.checkpoint_dir)?;
    if args.init_checkpoints {
        let written = init_checkpoints(&registries)?;
        log::info!("wrote {written} initial checkpoints");
    }

    let state = AppState::new(registries)?;
    let app = router(state);

    let listener = tokio::net::TcpListener::bind((args.host.as_str(), args.port)).await?;
    log::info!("listening on http://{}", listener.local_addr()?);
    log::info!("press Ctrl+C to stop the server");

    axum::serve(listener, app).await?;

    Ok(())
}
