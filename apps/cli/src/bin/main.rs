use braid_cli::{App, Command};
use clap::Parser;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let app = App::parse();
    app.init_tracing();

    if let Command::Prompt(cmd) = &app.command {
        return cmd.run();
    }

    let settings = match app.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("error: invalid configuration: {e:#}");
            std::process::exit(2);
        }
    };
    app.run(&settings).await
}
