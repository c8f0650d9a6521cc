//! Spoken output: a single playback thread fed through a channel.

use anyhow::{anyhow, Result};
use log::{debug, error, info, warn};
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    mpsc::{self, Sender},
    Arc, Mutex,
};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use crate::settings::VoiceSettings;

/// Anything that can say a line of text. Must not block for long.
pub trait VoiceSink: Send + Sync {
    fn speak(&self, text: &str) -> Result<()>;
}

/// Text-to-speech request handed to a [`Synthesizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct SpeechRequest {
    pub text: String,
    pub language_code: String,
    pub voice_name: String,
}

/// Text-to-speech service returning encoded audio (MP3 or WAV).
pub trait Synthesizer: Send {
    fn synthesize(&mut self, request: &SpeechRequest) -> Result<Vec<u8>>;
}

enum AudioCommand {
    Speak(String),
    PlayEncoded(Vec<u8>),
    Shutdown,
}

/// FIFO playback queue. Clips play one at a time on the `audio-queue` thread.
///
/// Without a synthesizer, spoken lines are only logged.
pub struct AudioQueue {
    tx: Mutex<Sender<AudioCommand>>,
    pending: Arc<AtomicUsize>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl AudioQueue {
    pub fn new(synthesizer: Option<Box<dyn Synthesizer>>, voice: VoiceSettings) -> Result<Self> {
        let (tx, rx) = mpsc::channel::<AudioCommand>();
        let pending = Arc::new(AtomicUsize::new(0));
        let thread_pending = Arc::clone(&pending);

        let worker = thread::Builder::new()
            .name("audio-queue".to_string())
            .spawn(move || {
                let mut synthesizer = synthesizer;
                let mut player = Player::new();

                while let Ok(cmd) = rx.recv() {
                    match cmd {
                        AudioCommand::Speak(text) => {
                            info!("Assistant: {text}");
                            if let Some(synth) = synthesizer.as_mut() {
                                let request = SpeechRequest {
                                    text,
                                    language_code: voice.language_code.clone(),
                                    voice_name: voice.voice_name.clone(),
                                };
                                match synth.synthesize(&request) {
                                    Ok(clip) => player.play(clip),
                                    Err(err) => error!("speech synthesis failed: {err:#}"),
                                }
                            }
                        }
                        AudioCommand::PlayEncoded(clip) => player.play(clip),
                        AudioCommand::Shutdown => break,
                    }
                    thread_pending.fetch_sub(1, Ordering::SeqCst);
                }
                debug!("audio queue thread exiting");
            })
            .map_err(|e| anyhow!("failed to spawn audio queue thread: {e}"))?;

        Ok(Self {
            tx: Mutex::new(tx),
            pending,
            worker: Mutex::new(Some(worker)),
        })
    }

    pub fn play_encoded(&self, clip: Vec<u8>) -> Result<()> {
        self.send(AudioCommand::PlayEncoded(clip))
    }

    /// Number of queued or playing items.
    pub fn pending(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Waits until the queue drains. Returns false on timeout.
    pub fn wait_until_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        while self.pending() > 0 {
            if Instant::now() >= deadline {
                return false;
            }
            thread::sleep(Duration::from_millis(10));
        }
        true
    }

    fn send(&self, cmd: AudioCommand) -> Result<()> {
        let tx = self.tx.lock().map_err(|e| anyhow!(e.to_string()))?;
        self.pending.fetch_add(1, Ordering::SeqCst);
        tx.send(cmd).map_err(|e| {
            self.pending.fetch_sub(1, Ordering::SeqCst);
            anyhow!("audio queue thread is gone: {e}")
        })
    }
}

impl VoiceSink for AudioQueue {
    fn speak(&self, text: &str) -> Result<()> {
        self.send(AudioCommand::Speak(text.to_string()))
    }
}

impl Drop for AudioQueue {
    fn drop(&mut self) {
        let handle = match self.worker.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(handle) = handle {
            let _ = self.send(AudioCommand::Shutdown);
            if handle.join().is_err() {
                error!("audio queue thread panicked");
            }
        }
    }
}

#[cfg(feature = "playback")]
struct Player {
    _stream: Option<rodio::OutputStream>,
    sink: Option<rodio::Sink>,
}

#[cfg(feature = "playback")]
impl Player {
    fn new() -> Self {
        Self {
            _stream: None,
            sink: None,
        }
    }

    fn ensure_sink(&mut self) -> Result<(), String> {
        if self.sink.is_none() {
            let (stream, handle) = rodio::OutputStream::try_default()
                .map_err(|e| format!("Failed to create audio output stream: {}", e))?;
            let sink = rodio::Sink::try_new(&handle)
                .map_err(|e| format!("Failed to create audio sink: {}", e))?;
            self._stream = Some(stream);
            self.sink = Some(sink);
        }
        Ok(())
    }

    /// Blocks until the clip has finished, so clips never overlap.
    fn play(&mut self, clip: Vec<u8>) {
        if let Err(err) = self.ensure_sink() {
            warn!("{err}; dropping {} byte clip", clip.len());
            return;
        }
        let source = match rodio::Decoder::new(std::io::Cursor::new(clip)) {
            Ok(source) => source,
            Err(err) => {
                warn!("could not decode audio clip: {err}");
                return;
            }
        };
        if let Some(sink) = self.sink.as_ref() {
            sink.append(source);
            sink.sleep_until_end();
        }
    }
}

#[cfg(not(feature = "playback"))]
struct Player;

#[cfg(not(feature = "playback"))]
impl Player {
    fn new() -> Self {
        Player
    }

    fn play(&mut self, clip: Vec<u8>) {
        warn!(
            "built without the `playback` feature; dropping {} byte clip",
            clip.len()
        );
    }
}
