//! Audio feedback player
//!
//! Plays synthesized coaching audio, or falls back to host speech
//! synthesis when no payload is supplied. Playback failures are logged and
//! the session keeps going. Dispatch is fire-and-forget per message:
//! rapidly arriving utterances may overlap, and serializing them is the
//! host sink's concern.

use base64::engine::general_purpose;
use base64::Engine;
use tracing::{debug, warn};

/// Host-supplied audio output (the "audio element" side of the boundary).
pub trait AudioSink: Send + Sync {
    fn play(&self, audio: &[u8]) -> Result<(), String>;
}

/// Host-supplied local speech synthesis.
pub trait SpeechSynthesizer: Send + Sync {
    fn speak(&self, text: &str) -> Result<(), String>;
}

/// How a feedback message ended up being delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FeedbackDelivery {
    PlayedAudio,
    Spoke,
    /// No audio path available (or it failed); the text is still rendered
    /// by the UI layer.
    VisualOnly,
}

pub struct FeedbackPlayer {
    sink: Option<Box<dyn AudioSink>>,
    synth: Option<Box<dyn SpeechSynthesizer>>,
}

impl FeedbackPlayer {
    pub fn new(sink: Option<Box<dyn AudioSink>>, synth: Option<Box<dyn SpeechSynthesizer>>) -> Self {
        Self { sink, synth }
    }

    /// Deliver one feedback message. Never fails the session: every error
    /// path degrades to a quieter delivery mode plus a log line.
    pub fn play(&self, text: &str, audio_b64: Option<&str>) -> FeedbackDelivery {
        if let Some(encoded) = audio_b64 {
            match general_purpose::STANDARD.decode(encoded) {
                Ok(audio) => {
                    if let Some(sink) = &self.sink {
                        return match sink.play(&audio) {
                            Ok(()) => {
                                debug!(bytes = audio.len(), "played feedback audio");
                                FeedbackDelivery::PlayedAudio
                            }
                            Err(e) => {
                                warn!(error = %e, "audio playback failed, continuing");
                                FeedbackDelivery::VisualOnly
                            }
                        };
                    }
                    debug!("audio payload present but no sink configured");
                }
                Err(e) => {
                    warn!(error = %e, "undecodable audio payload, falling back to speech");
                }
            }
        }

        if let Some(synth) = &self.synth {
            return match synth.speak(text) {
                Ok(()) => FeedbackDelivery::Spoke,
                Err(e) => {
                    warn!(error = %e, "speech synthesis failed, continuing");
                    FeedbackDelivery::VisualOnly
                }
            };
        }

        FeedbackDelivery::VisualOnly
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct CountingSink {
        plays: Arc<AtomicUsize>,
        fail: bool,
    }

    impl AudioSink for CountingSink {
        fn play(&self, _audio: &[u8]) -> Result<(), String> {
            if self.fail {
                return Err("device busy".into());
            }
            self.plays.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct CountingSynth {
        spoken: Arc<AtomicUsize>,
    }

    impl SpeechSynthesizer for CountingSynth {
        fn speak(&self, _text: &str) -> Result<(), String> {
            self.spoken.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    fn b64(bytes: &[u8]) -> String {
        general_purpose::STANDARD.encode(bytes)
    }

    #[test]
    fn payload_goes_to_the_sink() {
        let plays = Arc::new(AtomicUsize::new(0));
        let player = FeedbackPlayer::new(
            Some(Box::new(CountingSink {
                plays: plays.clone(),
                fail: false,
            })),
            None,
        );
        let delivery = player.play("tilt up", Some(&b64(b"pcm-bytes")));
        assert_eq!(delivery, FeedbackDelivery::PlayedAudio);
        assert_eq!(plays.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sink_failure_degrades_to_visual_only() {
        let player = FeedbackPlayer::new(
            Some(Box::new(CountingSink {
                plays: Arc::new(AtomicUsize::new(0)),
                fail: true,
            })),
            None,
        );
        assert_eq!(
            player.play("tilt up", Some(&b64(b"pcm"))),
            FeedbackDelivery::VisualOnly
        );
    }

    #[test]
    fn missing_payload_uses_speech_synthesis() {
        let spoken = Arc::new(AtomicUsize::new(0));
        let player = FeedbackPlayer::new(
            None,
            Some(Box::new(CountingSynth {
                spoken: spoken.clone(),
            })),
        );
        assert_eq!(player.play("hold the frame", None), FeedbackDelivery::Spoke);
        assert_eq!(spoken.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn bad_base64_falls_back_to_speech() {
        let spoken = Arc::new(AtomicUsize::new(0));
        let player = FeedbackPlayer::new(
            None,
            Some(Box::new(CountingSynth {
                spoken: spoken.clone(),
            })),
        );
        assert_eq!(
            player.play("hold", Some("!!! not base64 !!!")),
            FeedbackDelivery::Spoke
        );
    }

    #[test]
    fn nothing_available_is_visual_only() {
        let player = FeedbackPlayer::new(None, None);
        assert_eq!(player.play("hold", None), FeedbackDelivery::VisualOnly);
    }
}
