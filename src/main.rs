use std::time::Duration;

use indicatif::{ProgressBar, ProgressStyle};
use screen_translate_capture::{
    Backend, CaptureError, CaptureGrant, CaptureResource, Configuration, StopMode,
};
use screen_translate_comparator::{ChangeDetector, Fingerprint};

const FRAMES: u64 = 5;
const MAX_TICKS: usize = 40;

#[tokio::main(flavor = "multi_thread")]
async fn main() -> Result<(), CaptureError> {
    let mut config = Configuration::from_env().unwrap_or_default();
    let platform = match config.create_platform() {
        Ok(platform) => platform,
        Err(err) if config.backend != Backend::Mock => {
            eprintln!(
                "backend {failed} failed to initialize ({err}); trying mock",
                failed = config.backend
            );
            config.backend = Backend::Mock;
            config.create_platform()?
        }
        Err(err) => return Err(err),
    };
    let capture = CaptureResource::new(platform, config.release);
    capture.start(&CaptureGrant::new("probe"))?;

    let progress = ProgressBar::new_spinner();
    progress.set_style(
        ProgressStyle::with_template("{spinner:.green} [{elapsed_precise}] frame {pos} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    progress.enable_steady_tick(Duration::from_millis(100));

    let mut detector = ChangeDetector::new();
    let mut ticker = tokio::time::interval(config.frame_period.min(Duration::from_millis(500)));
    let mut captured = 0u64;
    for _ in 0..MAX_TICKS {
        ticker.tick().await;
        let Some(frame) = capture.capture() else {
            continue;
        };
        let difference = detector.observe(Fingerprint::of(&frame));
        progress.println(format!(
            "frame #{captured}: {}x{} stride {} bytes {} change {}",
            frame.width(),
            frame.height(),
            frame.stride(),
            frame.data().len(),
            difference.map_or_else(|| "-".to_string(), |d| format!("{d:.4}"))
        ));
        captured += 1;
        progress.set_position(captured);
        progress.set_message(format!("via {}", config.backend));
        if captured >= FRAMES {
            break;
        }
    }
    progress.finish_with_message(format!("captured {captured} frames via {}", config.backend));
    capture.stop(StopMode::Force);
    Ok(())
}
