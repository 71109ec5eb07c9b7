mod app;
mod export;
mod history;
mod layers;
mod model;
mod session;
mod store;
mod view;

fn main() -> eframe::Result<()> {
    env_logger::init();
    let native_options = eframe::NativeOptions::default();
    eframe::run_native(
        "Facemark",
        native_options,
        Box::new(|cc| Ok(Box::new(app::EvaluationApp::new(cc)))),
    )
}
