#![cfg_attr(not(debug_assertions), windows_subsystem = "windows")]

mod config;
mod gesture;
mod model_download;
mod pipeline;
mod session;
mod types;
mod ui;

use anyhow::Result;
use gpui::Application;

use config::AppConfig;

fn main() -> Result<()> {
    env_logger::init();

    let config = AppConfig::default();
    log::info!("starting with {config:?}");

    Application::new()
        .with_assets(gpui_component_assets::Assets)
        .run(move |app| {
            gpui_component::init(app);

            if let Err(err) = ui::launch_ui(app, config) {
                log::error!("failed to launch ui: {err:?}");
            }
        });

    Ok(())
}
