use anyhow::Result;
use log::info;

use scribeflow::api::handlers::jobs::generate_job_routes;
use scribeflow::api::handlers::system::generate_system_routes;
use scribeflow::bootstrap::setup::{AppState, initialize};
use scribeflow::broker::transport::InProcessBroker;
use scribeflow::common::errors::handle_error;
use scribeflow::common::{ENGINE_RUNTIME, ROCKET_RUNTIME};
use scribeflow::config::Settings;

use std::thread;
use tokio::sync::broadcast;

async fn build_rocket(state: AppState) -> rocket::Rocket<rocket::Build> {
    let figment = rocket::Config::figment().merge(("shutdown.ctrlc", false));

    rocket::custom(figment)
        .manage(state)
        .mount("/", generate_job_routes())
        .mount("/", generate_system_routes())
}

fn main() -> Result<()> {
    env_logger::init();

    let settings = Settings::load()?;
    let (shutdown_tx, _) = broadcast::channel::<()>(1);

    let state = ENGINE_RUNTIME.block_on(initialize(settings, InProcessBroker::new()))?;

    let worker_handle = thread::spawn({
        let shutdown_tx = shutdown_tx.clone();
        let state = state.clone();
        move || {
            ENGINE_RUNTIME.block_on(async {
                let mut shutdown_rx = shutdown_tx.subscribe();

                let is_ctrl_c = tokio::select! {
                    _ = tokio::signal::ctrl_c() => true,
                    _ = shutdown_rx.recv() => false,
                };

                // Bounded shutdown: every consumer loop finishes its current
                // message before this returns.
                state.gateway.stop_all().await;

                if is_ctrl_c {
                    let _ = shutdown_tx.send(());
                }
            });
        }
    });

    let rocket_handle = thread::spawn({
        let shutdown_tx = shutdown_tx.clone();
        move || {
            let result = ROCKET_RUNTIME.block_on(async {
                let rocket_instance = build_rocket(state).await.ignite().await?;
                let shutdown_handle = rocket_instance.shutdown();
                let shutdown_tx_clone = shutdown_tx.clone();
                ROCKET_RUNTIME.spawn(async move {
                    let mut shutdown_rx = shutdown_tx_clone.subscribe();
                    if shutdown_rx.recv().await.is_ok() {
                        shutdown_handle.notify();
                    }
                });
                rocket_instance.launch().await
            });
            if let Err(e) = result {
                let error = handle_error(anyhow::Error::from(e).context("Rocket server failed"));
                let _ = shutdown_tx.send(());
                return Err(error);
            }
            Ok(())
        }
    });

    worker_handle.join().expect("Worker thread panicked");
    let _ = rocket_handle.join().expect("Rocket thread panicked");

    info!("Shutdown complete.");
    Ok(())
}
