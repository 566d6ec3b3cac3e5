//! Demo driver: connect to a coaching endpoint, drive the engine with a
//! simulated recording clock, and print what the resolver surfaces.

use anyhow::{Context, Result};
use reelcoach::{
    CoachEngine, CoachEvent, CoachSession, ControlAction, FeedbackPlayer, MonotonicClock,
    RecordingClock, SessionConfig,
};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "reelcoach=info".into()),
        )
        .init();
    info!("starting reelcoach demo");

    let url = std::env::var("REELCOACH_URL").context("REELCOACH_URL is not set")?;
    let session_id = std::env::var("REELCOACH_SESSION").unwrap_or_else(|_| "demo".to_string());

    let config = SessionConfig {
        url,
        session_id,
        ..Default::default()
    };

    let (host_tx, mut host_rx) = mpsc::unbounded_channel();
    // No audio device in the demo: feedback degrades to visual-only.
    let player = FeedbackPlayer::new(None, None);
    let mut engine = CoachEngine::new(CoachSession::new(config), player, host_tx);

    engine.connect().await?;
    engine.control(ControlAction::Start).await?;

    let clock = MonotonicClock::start();
    let mut ticks = tokio::time::interval(Duration::from_millis(100));

    loop {
        tokio::select! {
            alive = engine.run_once() => {
                if !alive {
                    break;
                }
                while let Ok(event) = host_rx.try_recv() {
                    report(event);
                }
            }
            _ = ticks.tick() => {
                let t_ms = clock.current_time_ms();
                let view = engine.resolve(t_ms);
                if let Some(shot) = view.shot {
                    info!(t_ms, shot = shot.index, guidance = %shot.guidance, "active shot");
                }
                if let Some(upcoming) = view.kicks.upcoming {
                    info!(
                        t_ms,
                        cue = %upcoming.kick.cue,
                        countdown = upcoming.countdown_secs,
                        "kick upcoming"
                    );
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("shutting down");
                break;
            }
        }
    }

    engine.control(ControlAction::Stop).await.ok();
    engine.shutdown().await;
    Ok(())
}

fn report(event: CoachEvent) {
    match event {
        CoachEvent::Feedback { rule_id, text } => info!(%rule_id, %text, "feedback"),
        CoachEvent::TextCoach { text, persona, .. } => info!(%persona, %text, "coach"),
        CoachEvent::GuidanceLoaded => info!("guidance loaded"),
        CoachEvent::NegotiationSettled(outcome) => info!(?outcome, "negotiation settled"),
        CoachEvent::UpstreamError { message } => warn!(%message, "server error"),
        CoachEvent::ConnectionLost => warn!("connection lost, reconnecting"),
        other => info!(?other, "event"),
    }
}
