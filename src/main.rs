use clap::Parser;
use tempo_notes::cli::{
    handle_add, handle_clear, handle_delete, handle_edit, handle_front, handle_list, handle_move,
    handle_resize, handle_serve, handle_status, handle_sync, Cli, Commands,
};
use tempo_notes::logging::init_logging;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_logging(cli.global.verbose);

    let global = &cli.global;
    let result = match cli.command {
        Commands::List { json } => handle_list(global, json).await,
        Commands::Add {
            x,
            y,
            width,
            height,
            content,
            json,
        } => handle_add(global, x, y, width, height, content, json).await,
        Commands::Edit { id, content } => handle_edit(global, id, content).await,
        Commands::Move { id, x, y } => handle_move(global, id, x, y).await,
        Commands::Resize { id, width, height } => handle_resize(global, id, width, height).await,
        Commands::Front { id } => handle_front(global, id).await,
        Commands::Delete { id } => handle_delete(global, id).await,
        Commands::Clear { local_only } => handle_clear(global, local_only).await,
        Commands::Sync => handle_sync(global).await,
        Commands::Status { json } => handle_status(global, json).await,
        Commands::Serve { addr } => handle_serve(global, addr).await,
    };

    if let Err(e) = result {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
