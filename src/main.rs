//! ForestShield - Main Entry Point

use clap::Parser;
use forestshield::cli::{cmd_info, cmd_predict, cmd_serve, cmd_train, init_tracing, Cli, Commands};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.log_json);

    match cli.command {
        Commands::Train {
            data,
            config,
            feature_set,
            output,
            threshold,
            cv_folds,
            n_iter,
            grid,
            full_dataset_thresholds,
        } => {
            cmd_train(
                &data,
                config.as_deref(),
                feature_set,
                output.as_deref(),
                threshold,
                cv_folds,
                n_iter,
                grid,
                full_dataset_thresholds,
            )?;
        }
        Commands::Predict { model_dir, input, threshold } => {
            cmd_predict(&model_dir, &input, threshold)?;
        }
        Commands::Serve { model_dir, host, port, threshold } => {
            cmd_serve(model_dir, host, port, threshold).await?;
        }
        Commands::Info { data } => {
            cmd_info(&data)?;
        }
    }

    Ok(())
}
