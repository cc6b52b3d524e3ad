use std::io::Write;
use std::process::{Child, Command, Stdio};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread;
use std::time::{Duration, Instant};

use guardian_core::config::AudioConfig;
use guardian_core::{CancelToken, SpeechOutcome, TextToSpeech, TtsError};

/// How often a blocking `speak` re-checks its cancel token.
const CANCEL_POLL: Duration = Duration::from_millis(20);

/// Build the engine selected by `[audio] engine`.
pub fn engine_from_config(config: &AudioConfig) -> Arc<dyn TextToSpeech> {
    match config.engine.as_str() {
        "piper" => Arc::new(PiperTts::new(
            &config.piper_binary,
            &config.piper_model,
            &config.piper_config,
        )),
        _ => Arc::new(ConsoleTts::stdout(config.words_per_minute)),
    }
}

struct Playback {
    piper: Child,
    aplay: Child,
}

impl Playback {
    fn kill(&mut self) {
        let _ = self.aplay.kill();
        let _ = self.piper.kill();
        let _ = self.aplay.wait();
        let _ = self.piper.wait();
    }
}

/// Text-to-speech engine using Piper as a subprocess piped into aplay.
pub struct PiperTts {
    piper_binary: String,
    model_path: String,
    config_path: String,
    /// Running playback and the generation of the utterance it belongs to.
    active: Mutex<Option<(u64, Playback)>>,
}

impl PiperTts {
    pub fn new(piper_binary: &str, model_path: &str, config_path: &str) -> Self {
        Self {
            piper_binary: piper_binary.to_string(),
            model_path: model_path.to_string(),
            config_path: config_path.to_string(),
            active: Mutex::new(None),
        }
    }

    fn start(&self, text: &str) -> Result<Playback, TtsError> {
        // piper --model X --config Y --output-raw | aplay -r 22050 -f S16_LE -c 1
        let mut piper = Command::new(&self.piper_binary)
            .args([
                "--model",
                &self.model_path,
                "--config",
                &self.config_path,
                "--output-raw",
            ])
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| TtsError::Spawn(format!("piper: {e}")))?;

        if let Some(mut stdin) = piper.stdin.take() {
            if let Err(e) = stdin.write_all(text.as_bytes()) {
                let _ = piper.kill();
                let _ = piper.wait();
                return Err(e.into());
            }
            // stdin is dropped here, closing the pipe
        }

        let Some(piper_stdout) = piper.stdout.take() else {
            let _ = piper.kill();
            return Err(TtsError::Spawn("piper has no stdout".into()));
        };

        let aplay = match Command::new("aplay")
            .args(["-r", "22050", "-f", "S16_LE", "-c", "1", "-q"])
            .stdin(piper_stdout)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
        {
            Ok(child) => child,
            Err(e) => {
                let _ = piper.kill();
                let _ = piper.wait();
                return Err(TtsError::Spawn(format!("aplay: {e}")));
            }
        };

        Ok(Playback { piper, aplay })
    }
}

impl TextToSpeech for PiperTts {
    /// Speak the given text. Blocks until playback finishes or is cancelled.
    fn speak(&self, text: &str, cancel: &CancelToken) -> Result<SpeechOutcome, TtsError> {
        if text.is_empty() {
            return Ok(SpeechOutcome::Completed);
        }
        if cancel.is_cancelled() {
            return Ok(SpeechOutcome::Cancelled);
        }

        tracing::debug!("TTS speaking: {text}");
        let playback = self.start(text)?;
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some((cancel.generation(), playback));

        loop {
            {
                let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
                let Some((_, playback)) = active.as_mut() else {
                    // Killed by `cancel()`.
                    return Ok(SpeechOutcome::Cancelled);
                };
                if cancel.is_cancelled() {
                    playback.kill();
                    *active = None;
                    return Ok(SpeechOutcome::Cancelled);
                }
                if let Some(status) = playback.aplay.try_wait()? {
                    let _ = playback.piper.wait();
                    *active = None;
                    if !status.success() {
                        return Err(TtsError::Device(format!("aplay exited with {status}")));
                    }
                    return Ok(SpeechOutcome::Completed);
                }
            }
            thread::sleep(CANCEL_POLL);
        }
    }

    fn cancel(&self, generation: u64) {
        let mut active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let current = match active.as_ref() {
            Some((current, _)) => *current,
            None => return,
        };
        if current != generation {
            tracing::debug!("Ignoring cancel for utterance {generation}, playing {current}");
            return;
        }
        if let Some((_, mut playback)) = active.take() {
            tracing::debug!("Stopping piper playback");
            playback.kill();
        }
    }
}

/// Prints announcements to a writer, paced like real speech.
pub struct ConsoleTts {
    words_per_minute: u32,
    out: Mutex<Box<dyn Write + Send>>,
}

impl ConsoleTts {
    pub fn new(words_per_minute: u32, out: Box<dyn Write + Send>) -> Self {
        Self {
            words_per_minute: words_per_minute.max(1),
            out: Mutex::new(out),
        }
    }

    pub fn stdout(words_per_minute: u32) -> Self {
        Self::new(words_per_minute, Box::new(std::io::stdout()))
    }

    /// Time it would take to say `text` out loud.
    pub fn speaking_time(&self, text: &str) -> Duration {
        let words = text.split_whitespace().count() as u64;
        Duration::from_millis(words * 60_000 / u64::from(self.words_per_minute))
    }
}

impl TextToSpeech for ConsoleTts {
    fn speak(&self, text: &str, cancel: &CancelToken) -> Result<SpeechOutcome, TtsError> {
        if text.is_empty() {
            return Ok(SpeechOutcome::Completed);
        }
        {
            let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
            writeln!(out, "[speak] {text}")?;
            out.flush()?;
        }

        let deadline = Instant::now() + self.speaking_time(text);
        loop {
            if cancel.is_cancelled() {
                let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
                writeln!(out, "[speak] (interrupted)")?;
                return Ok(SpeechOutcome::Cancelled);
            }
            let now = Instant::now();
            if now >= deadline {
                return Ok(SpeechOutcome::Completed);
            }
            thread::sleep(CANCEL_POLL.min(deadline - now));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use guardian_core::SpeechInterrupt;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl SharedBuf {
        fn contents(&self) -> String {
            String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
        }
    }

    #[test]
    fn speak_empty_text_is_noop() {
        let tts = PiperTts::new("nonexistent-piper", "model.onnx", "model.onnx.json");
        // Empty text should return Ok without spawning any subprocess
        assert_eq!(tts.speak("", &CancelToken::never()).unwrap(), SpeechOutcome::Completed);
    }

    #[test]
    fn speak_with_missing_binary_fails() {
        let tts = PiperTts::new("/nonexistent/piper", "model.onnx", "model.onnx.json");
        let result = tts.speak("hello world", &CancelToken::never());
        assert!(matches!(result, Err(TtsError::Spawn(_))), "Should fail when piper binary doesn't exist");
    }

    #[test]
    fn piper_cancel_without_playback_is_noop() {
        let tts = PiperTts::new("piper", "model.onnx", "model.onnx.json");
        tts.cancel(1);
    }

    fn sleeper() -> Child {
        Command::new("sleep").arg("5").spawn().unwrap()
    }

    #[test]
    fn piper_cancel_only_stops_matching_utterance() {
        let tts = PiperTts::new("piper", "model.onnx", "model.onnx.json");
        let playback = Playback {
            piper: sleeper(),
            aplay: sleeper(),
        };
        *tts.active.lock().unwrap() = Some((7, playback));

        // A late interrupt for the previous utterance.
        tts.cancel(6);
        assert!(matches!(tts.active.lock().unwrap().as_ref(), Some((7, _))));

        tts.cancel(7);
        assert!(tts.active.lock().unwrap().is_none());
    }

    #[test]
    fn console_speaks_and_paces_output() {
        let buf = SharedBuf::default();
        let tts = ConsoleTts::new(6_000, Box::new(buf.clone()));
        assert_eq!(tts.speaking_time("one two three"), Duration::from_millis(30));

        let started = Instant::now();
        let outcome = tts.speak("one two three", &CancelToken::never()).unwrap();
        assert_eq!(outcome, SpeechOutcome::Completed);
        assert!(started.elapsed() >= Duration::from_millis(30));
        assert_eq!(buf.contents(), "[speak] one two three\n");
    }

    #[test]
    fn console_stops_when_cancelled() {
        let buf = SharedBuf::default();
        // 1 word per minute: would take a minute per word if not cancelled.
        let tts = Arc::new(ConsoleTts::new(1, Box::new(buf.clone())));
        let interrupt = Arc::new(SpeechInterrupt::new());
        let token = interrupt.begin();

        let speaker = {
            let tts = tts.clone();
            let token = token.clone();
            thread::spawn(move || tts.speak("a long sentence", &token))
        };
        thread::sleep(Duration::from_millis(50));
        assert!(token.cancel());

        let outcome = speaker.join().unwrap().unwrap();
        assert_eq!(outcome, SpeechOutcome::Cancelled);
        assert!(buf.contents().ends_with("(interrupted)\n"));
    }

    #[test]
    fn engine_selection_follows_config() {
        let config = AudioConfig::default();
        let engine = engine_from_config(&config);
        assert_eq!(engine.speak("", &CancelToken::never()).unwrap(), SpeechOutcome::Completed);
    }
}
