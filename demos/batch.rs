use std::time::Duration;

use imagegen::{codec, AppConfig, BatchCoordinator, BatchObserver, GenerationRequest, ImageSize};
use tokio::runtime::Handle;

/// Mimics a UI that polls once per frame instead of awaiting events.
#[derive(Default)]
struct Gallery {
    slots: Vec<Option<String>>,
    done: bool,
}

impl BatchObserver for Gallery {
    fn on_progress(&mut self, fraction: f32) {
        log::info!("📊 {:.0}%", fraction * 100.0);
    }

    fn on_image(&mut self, index: usize, base64: &str) {
        match codec::image_info(base64) {
            Ok(info) => log::info!("🖼️  slot {}: {}x{} {}", index + 1, info.width, info.height, info.format),
            Err(e) => log::warn!("slot {} undecodable: {}", index + 1, e),
        }
        self.slots[index] = Some(base64.to_string());
    }

    fn on_error(&mut self, index: usize, message: &str) {
        log::error!("slot {}: {}", index + 1, message);
    }

    fn on_finished(&mut self) {
        self.done = true;
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    match dotenv::dotenv() {
        Ok(_) => log::info!("✅ .env file loaded"),
        Err(_) => log::warn!("⚠️  No .env file found"),
    }
    imagegen::logger::init()?;

    let config = AppConfig::from_env();
    let api_key = config.api_key().ok_or("set IMAGEGEN_API_KEY first")?.to_string();

    let request = GenerationRequest::new("a lighthouse on a cliff at dusk, oil painting")
        .with_count(3)
        .with_size(ImageSize::Landscape)
        .with_credentials(api_key, config.api_url().to_string());
    imagegen::validation::validate_request(&request)?;

    let coordinator = BatchCoordinator::http(Handle::current(), &config);
    let mut handle = coordinator.start(request)?;

    let mut gallery = Gallery {
        slots: vec![None; handle.total()],
        done: false,
    };
    let mut frame = tokio::time::interval(Duration::from_millis(100));
    while !gallery.done {
        frame.tick().await;
        handle.try_dispatch(&mut gallery);
    }

    let state = coordinator.state();
    log::info!(
        "Batch {} done: {} ok, {} failed",
        state.batch_id,
        state.succeeded(),
        state.failed()
    );
    Ok(())
}
