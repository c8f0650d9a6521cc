//! Voice query assistant: wake word, transcription, a text-generation reply,
//! spoken back through the shared audio queue.
//!
//! Runs beside the tracker and shares nothing with it except the voice sink.

use anyhow::Result;
use log::{error, info, warn};
use std::sync::Arc;
use std::thread;
use tokio_util::sync::CancellationToken;

use crate::audio::VoiceSink;
use crate::settings::VoiceSettings;

/// Blocks until the wake word is heard. Returns `Ok(false)` once `cancel`
/// fires or the microphone closes.
pub trait WakeWordDetector: Send {
    fn wait_for_wake_word(&mut self, cancel: &CancellationToken) -> Result<bool>;
}

/// Records one utterance and returns its transcription, if any.
pub trait Transcriber: Send {
    fn listen(&mut self) -> Result<Option<String>>;
}

/// Text-generation backend.
pub trait Responder: Send {
    fn respond(&mut self, prompt: &str) -> Result<String>;
}

pub struct Assistant {
    wake: Box<dyn WakeWordDetector>,
    transcriber: Box<dyn Transcriber>,
    responder: Box<dyn Responder>,
    voice: Arc<dyn VoiceSink>,
    settings: VoiceSettings,
}

impl Assistant {
    pub fn new(
        wake: Box<dyn WakeWordDetector>,
        transcriber: Box<dyn Transcriber>,
        responder: Box<dyn Responder>,
        voice: Arc<dyn VoiceSink>,
        settings: VoiceSettings,
    ) -> Self {
        Self {
            wake,
            transcriber,
            responder,
            voice,
            settings,
        }
    }

    /// Serves wake-word requests until cancelled.
    pub fn run(&mut self, cancel: &CancellationToken) -> Result<()> {
        info!("Waiting for wake word...");
        while !cancel.is_cancelled() {
            if !self.wake.wait_for_wake_word(cancel)? {
                break;
            }
            info!("Wake word detected");
            self.handle_request();
        }
        info!("assistant loop stopped");
        Ok(())
    }

    /// Prompts, listens and speaks one reply.
    pub fn handle_request(&mut self) {
        self.say(&self.settings.listen_prompt);

        let heard = match self.transcriber.listen() {
            Ok(heard) => heard,
            Err(err) => {
                warn!("audio input failed: {err:#}");
                None
            }
        };

        let reply = match heard.as_deref().map(str::trim) {
            Some(text) if !text.is_empty() => {
                info!("Recognition result: {text}");
                self.ask(text)
            }
            _ => self.settings.no_command_reply.clone(),
        };
        self.say(&reply);
    }

    /// Sends the prompt to the responder, retrying failures with a doubling
    /// delay. Always returns something speakable.
    pub fn ask(&mut self, prompt: &str) -> String {
        let prompt = prompt.trim();
        if prompt.is_empty() {
            return self.settings.no_input_reply.clone();
        }

        let request = format!(
            "Please respond concisely in under {} words: {prompt}",
            self.settings.max_response_words
        );
        let attempts = self.settings.max_retries.max(1);
        let mut delay = self.settings.initial_retry_delay();

        for attempt in 1..=attempts {
            match self.responder.respond(&request) {
                Ok(reply) if !reply.trim().is_empty() => return reply,
                Ok(_) => {
                    warn!("responder returned an empty reply (attempt {attempt}/{attempts})")
                }
                Err(err) => {
                    warn!("responder request failed (attempt {attempt}/{attempts}): {err:#}")
                }
            }
            if attempt < attempts {
                thread::sleep(delay);
                delay *= 2;
            }
        }
        self.settings.unavailable_reply.clone()
    }

    fn say(&self, text: &str) {
        if let Err(err) = self.voice.speak(text) {
            error!("failed to queue speech: {err:#}");
        }
    }
}
