use std::io::Write;
use std::time::Duration;

use anyhow::Context;
use roulette_core::{
    DrawConfig, DrawEngine, DurationSource, ProvablyFairRng, SpinnerFrame, SpinnerTimeSelector,
};
use tokio::sync::oneshot;
use tracing::debug;

/// Live spinner readout refresh, in frames.
const SPINNER_REDRAW_FRAMES: usize = 25;

/// Draw duration in seconds: fixed, or whatever the spinner lands on.
pub async fn pick_duration(config: &DrawConfig, rng: &mut ProvablyFairRng, instant: bool) -> f64 {
    match config.duration {
        DurationSource::Fixed { seconds } => seconds,
        DurationSource::Spinner => {
            let mut spinner = SpinnerTimeSelector::start(&config.spinner_config(), rng);
            debug!(
                start_speed = spinner.start_speed(),
                frames = spinner.total_frames(),
                "spinner started"
            );
            let mut ticker = tokio::time::interval(spinner.frame_interval());
            let mut frame = 0usize;
            let seconds = loop {
                match spinner.advance() {
                    SpinnerFrame::Live(value) => {
                        if frame % SPINNER_REDRAW_FRAMES == 0 {
                            redraw(&format!("duration {value:5.1}s"));
                        }
                    }
                    SpinnerFrame::Finished(value) => break value,
                }
                frame += 1;
                if !instant {
                    ticker.tick().await;
                }
            };
            redraw(&format!("duration {seconds:5.1}s"));
            println!();
            seconds
        }
    }
}

/// Runs every tick of the current session on a worker task that owns the
/// engine. The engine comes back alongside the tick loop's result, so a
/// failed spin still leaves the host with an engine.
pub async fn spin(
    mut engine: DrawEngine,
    names: Vec<String>,
    instant: bool,
) -> anyhow::Result<(DrawEngine, anyhow::Result<()>)> {
    let (tx, rx) = oneshot::channel();
    tokio::spawn(async move {
        let result = spin_until_done(&mut engine, &names, instant).await;
        let _ = tx.send((engine, result));
    });
    rx.await.context("draw worker stopped before finishing")
}

async fn spin_until_done(
    engine: &mut DrawEngine,
    names: &[String],
    instant: bool,
) -> anyhow::Result<()> {
    loop {
        let tick = engine.tick()?;
        if tick.done {
            println!();
            return Ok(());
        }
        let shown: Vec<&str> = tick
            .highlighted
            .iter()
            .filter_map(|&i| names.get(i).map(String::as_str))
            .collect();
        redraw(&shown.join("  "));
        if !instant && tick.delay > Duration::ZERO {
            tokio::time::sleep(tick.delay).await;
        }
    }
}

fn redraw(line: &str) {
    let mut out = std::io::stdout().lock();
    let _ = write!(out, "\r\x1b[2K{line}");
    let _ = out.flush();
}

#[cfg(test)]
mod tests {
    use roulette_core::{
        BandFormat, DrawError, DrawPhase, DrawRequest, PrizeCategory, QuotaPolicy, TraversalMode,
    };

    use super::*;

    fn engine() -> DrawEngine {
        DrawEngine::new(ProvablyFairRng::new("s", "c", 1), QuotaPolicy::Advisory)
    }

    #[tokio::test]
    async fn test_spin_returns_engine_on_error() {
        // Idle engine: the first tick is rejected.
        let (engine, result) = spin(engine(), Vec::new(), true).await.unwrap();
        let err = result.unwrap_err();
        assert!(matches!(err.downcast_ref::<DrawError>(), Some(DrawError::InvalidDrawState(_))));
        assert_eq!(engine.phase(), DrawPhase::Idle);
    }

    #[tokio::test]
    async fn test_spin_reaches_commit() {
        let names: Vec<String> = ["Amy", "Bo", "Cy"].iter().map(|s| s.to_string()).collect();
        let band = BandFormat::default();
        let cat = PrizeCategory::structured("R1", "Grand", "Grand", 3, band, names.clone());
        let mut engine = engine();
        engine
            .start(
                &cat,
                DrawRequest {
                    pick_count: 1,
                    mode: TraversalMode::RandomNoRepeat,
                    schedule: vec![1; 3],
                },
            )
            .unwrap();
        let (engine, result) = spin(engine, names, true).await.unwrap();
        result.unwrap();
        assert_eq!(engine.phase(), DrawPhase::Committing);
    }
}
