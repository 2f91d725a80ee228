//! LLM Viz: transformer walkthrough. Runs the model_explorer app.

use std::process::ExitCode;

use model_explorer::ModelExplorerBuilder;

fn main() -> ExitCode {
    let _ = dotenvy::dotenv();

    let app = ModelExplorerBuilder::new()
        .env_config()
        .and_then(|builder| builder.build());
    let mut app = match app {
        Ok(app) => app,
        Err(err) => {
            eprintln!("llm-viz: {err}");
            return ExitCode::FAILURE;
        }
    };

    if app.run().is_error() {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}
