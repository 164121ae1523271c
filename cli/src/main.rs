mod commands;
mod terminal;

use commands::{CommandLine, Commands, api, arch, discover, pair};
use terminal::{logging, print};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let commands = CommandLine::parse_args();

    logging::init_logging(commands.quiet);

    let cfg = commands.config();
    let app = commands.app.as_deref();

    let outcome = match commands.command {
        Commands::Arch => arch::arch(app, &cfg),
        Commands::Discover { strategy } => {
            print::header("getting ready for discovery", cfg.quiet);
            discover::discover(&strategy, app, &cfg).await
        }
        Commands::Pair { driver, view } => {
            print::header("starting pairing session", cfg.quiet);
            pair::pair(&driver, &view, app, &cfg).await
        }
        Commands::Api { method, path, query, params, body } => {
            let call = api::ApiCall { method, path, query, params, body };
            api::api(call, app, &cfg).await
        }
    };

    if cfg.quiet == 0 {
        print::end_of_program();
    }
    outcome
}
