//! Subprocess bridge engine.
//!
//! Runs a transcription worker as a long-lived child process and talks
//! newline-delimited JSON over its stdio:
//!
//! ```text
//! child → {"status": "ready"}                          (once, on startup)
//! core  → {"wav": "/tmp/window-….wav"}                 (one per window)
//! child → {"segments": [{"start_sec", "end_sec", "text"}, …]}
//! ```
//!
//! The child owns its model state between calls. Reads happen on a
//! dedicated thread feeding a channel, so warm-up can enforce its
//! deadline with `recv_timeout` while normal reads stay blocking (the
//! runner layer applies the transcribe deadline). `restart` kills the
//! child; the reader thread unblocks on the resulting EOF.

use crate::defaults;
use crate::error::{Result, StreamscribeError};
use crate::stt::engine::{SpeechEngine, TranscriptFragment};
use serde::{Deserialize, Serialize};
use std::io::{BufRead, BufReader, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, Command, Stdio};
use std::sync::Mutex;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

/// Configuration for a subprocess engine.
#[derive(Debug, Clone)]
pub struct ProcessEngineConfig {
    /// Program to run.
    pub program: String,
    /// Arguments passed to the program.
    pub args: Vec<String>,
    /// How long the child gets to print its ready line.
    pub warm_up_timeout: Duration,
}

impl ProcessEngineConfig {
    pub fn new(program: &str) -> Self {
        Self {
            program: program.to_string(),
            args: Vec::new(),
            warm_up_timeout: Duration::from_secs_f64(defaults::WARM_UP_TIMEOUT_SEC),
        }
    }

    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_warm_up_timeout(mut self, timeout: Duration) -> Self {
        self.warm_up_timeout = timeout;
        self
    }
}

#[derive(Serialize)]
struct TranscribeRequest<'a> {
    wav: &'a Path,
}

#[derive(Deserialize)]
struct ReadyLine {
    status: String,
}

#[derive(Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    segments: Vec<TranscriptFragment>,
    #[serde(default)]
    error: Option<String>,
}

/// A running child plus its I/O plumbing.
struct Bridge {
    child: Child,
    stdin: ChildStdin,
    lines: mpsc::Receiver<std::io::Result<String>>,
}

impl Bridge {
    fn kill(mut self) {
        let _ = self.child.kill();
        let _ = self.child.wait();
    }
}

/// Engine backed by a long-lived worker process.
pub struct ProcessEngine {
    name: String,
    config: ProcessEngineConfig,
    bridge: Mutex<Option<Bridge>>,
}

impl ProcessEngine {
    pub fn new(name: &str, config: ProcessEngineConfig) -> Self {
        Self {
            name: name.to_string(),
            config,
            bridge: Mutex::new(None),
        }
    }

    fn spawn_bridge(&self) -> Result<Bridge> {
        let mut child = Command::new(&self.config.program)
            .args(&self.config.args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| StreamscribeError::Engine {
                message: format!("failed to spawn {}: {}", self.config.program, e),
            })?;

        let stdin = child.stdin.take().ok_or_else(|| StreamscribeError::Engine {
            message: "child stdin unavailable".to_string(),
        })?;
        let stdout = child.stdout.take().ok_or_else(|| StreamscribeError::Engine {
            message: "child stdout unavailable".to_string(),
        })?;

        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let reader = BufReader::new(stdout);
            for line in reader.lines() {
                if tx.send(line).is_err() {
                    break;
                }
            }
        });

        Ok(Bridge {
            child,
            stdin,
            lines: rx,
        })
    }

    fn wait_for_ready(&self, bridge: &Bridge) -> Result<()> {
        match bridge.lines.recv_timeout(self.config.warm_up_timeout) {
            Ok(Ok(line)) => {
                let ready: ReadyLine =
                    serde_json::from_str(&line).map_err(|e| StreamscribeError::EngineResponse {
                        message: format!("bad ready line {:?}: {}", line, e),
                    })?;
                if ready.status == "ready" {
                    Ok(())
                } else {
                    Err(StreamscribeError::EngineResponse {
                        message: format!("unexpected startup status {:?}", ready.status),
                    })
                }
            }
            Ok(Err(e)) => Err(StreamscribeError::Io(e)),
            Err(_) => Err(StreamscribeError::EngineWarmupTimeout {
                name: self.name.clone(),
                timeout_sec: self.config.warm_up_timeout.as_secs_f64(),
            }),
        }
    }
}

impl SpeechEngine for ProcessEngine {
    fn warm_up(&self) -> Result<()> {
        let mut guard = self.bridge.lock().unwrap();
        if guard.is_some() {
            return Ok(());
        }

        debug!(engine = %self.name, program = %self.config.program, "spawning worker process");
        let bridge = self.spawn_bridge()?;
        match self.wait_for_ready(&bridge) {
            Ok(()) => {
                *guard = Some(bridge);
                Ok(())
            }
            Err(e) => {
                bridge.kill();
                Err(e)
            }
        }
    }

    fn transcribe(&self, wav: &Path) -> Result<Vec<TranscriptFragment>> {
        let mut guard = self.bridge.lock().unwrap();
        let bridge = guard.as_mut().ok_or_else(|| StreamscribeError::Engine {
            message: format!("engine {} used before warm-up", self.name),
        })?;

        let request = serde_json::to_string(&TranscribeRequest { wav }).map_err(|e| {
            StreamscribeError::Engine {
                message: format!("failed to encode request: {}", e),
            }
        })?;
        if let Err(e) = writeln!(bridge.stdin, "{}", request).and_then(|_| bridge.stdin.flush()) {
            // Broken pipe: the child died. Clear the bridge so the next
            // warm-up respawns it.
            if let Some(dead) = guard.take() {
                dead.kill();
            }
            return Err(StreamscribeError::Engine {
                message: format!("worker pipe closed: {}", e),
            });
        }

        match bridge.lines.recv() {
            Ok(Ok(line)) => {
                let response: TranscribeResponse = serde_json::from_str(&line).map_err(|e| {
                    StreamscribeError::EngineResponse {
                        message: format!("bad response line {:?}: {}", line, e),
                    }
                })?;
                if let Some(error) = response.error {
                    return Err(StreamscribeError::EngineResponse { message: error });
                }
                Ok(response.segments)
            }
            Ok(Err(e)) => {
                if let Some(dead) = guard.take() {
                    dead.kill();
                }
                Err(StreamscribeError::Io(e))
            }
            Err(_) => {
                if let Some(dead) = guard.take() {
                    dead.kill();
                }
                Err(StreamscribeError::Engine {
                    message: "worker exited mid-request".to_string(),
                })
            }
        }
    }

    fn restart(&self) {
        warn!(engine = %self.name, "restarting worker process");
        if let Some(bridge) = self.bridge.lock().unwrap().take() {
            bridge.kill();
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl Drop for ProcessEngine {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.bridge.lock()
            && let Some(bridge) = guard.take()
        {
            bridge.kill();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Shell one-liner bridge: prints ready, then answers every request
    /// with a fixed line.
    fn stub_engine(reply: &str, warm_up_timeout: Duration) -> ProcessEngine {
        let script = format!(
            r#"printf '{{"status":"ready"}}\n'; while read line; do printf '%s\n' '{reply}'; done"#
        );
        ProcessEngine::new(
            "stub",
            ProcessEngineConfig::new("sh")
                .with_args(["-c", &script])
                .with_warm_up_timeout(warm_up_timeout),
        )
    }

    #[test]
    fn warm_up_and_transcribe_roundtrip() {
        let engine = stub_engine(
            r#"{"segments":[{"start_sec":0.0,"end_sec":1.5,"text":"bridged"}]}"#,
            Duration::from_secs(5),
        );

        engine.warm_up().unwrap();
        // Warm engines stay warm.
        engine.warm_up().unwrap();

        let fragments = engine.transcribe(Path::new("/tmp/w.wav")).unwrap();
        assert_eq!(fragments.len(), 1);
        assert_eq!(fragments[0].text, "bridged");
        assert!((fragments[0].end_sec - 1.5).abs() < 1e-9);
    }

    #[test]
    fn empty_segments_are_valid() {
        let engine = stub_engine(r#"{"segments":[]}"#, Duration::from_secs(5));
        engine.warm_up().unwrap();
        assert!(engine.transcribe(Path::new("/tmp/w.wav")).unwrap().is_empty());
    }

    #[test]
    fn error_field_becomes_engine_response() {
        let engine = stub_engine(r#"{"error":"model exploded"}"#, Duration::from_secs(5));
        engine.warm_up().unwrap();

        let result = engine.transcribe(Path::new("/tmp/w.wav"));
        assert!(matches!(
            result,
            Err(StreamscribeError::EngineResponse { message }) if message == "model exploded"
        ));
    }

    #[test]
    fn malformed_response_is_engine_response() {
        let engine = stub_engine("not json at all", Duration::from_secs(5));
        engine.warm_up().unwrap();

        let result = engine.transcribe(Path::new("/tmp/w.wav"));
        assert!(matches!(result, Err(StreamscribeError::EngineResponse { .. })));
    }

    #[test]
    fn warm_up_timeout_fires() {
        let engine = ProcessEngine::new(
            "sleepy",
            ProcessEngineConfig::new("sh")
                .with_args(["-c", "sleep 30"])
                .with_warm_up_timeout(Duration::from_millis(100)),
        );

        let result = engine.warm_up();
        assert!(matches!(
            result,
            Err(StreamscribeError::EngineWarmupTimeout { .. })
        ));
    }

    #[test]
    fn transcribe_before_warm_up_is_an_error() {
        let engine = stub_engine(r#"{"segments":[]}"#, Duration::from_secs(5));
        assert!(engine.transcribe(Path::new("/tmp/w.wav")).is_err());
    }

    #[test]
    fn restart_clears_bridge_and_rewarm_works() {
        let engine = stub_engine(r#"{"segments":[]}"#, Duration::from_secs(5));
        engine.warm_up().unwrap();
        engine.restart();

        // Cold again: transcribe refuses until re-warmed.
        assert!(engine.transcribe(Path::new("/tmp/w.wav")).is_err());
        engine.warm_up().unwrap();
        assert!(engine.transcribe(Path::new("/tmp/w.wav")).is_ok());
    }

    #[test]
    fn dead_child_surfaces_and_clears() {
        // Child exits immediately after the ready line.
        let engine = ProcessEngine::new(
            "flaky",
            ProcessEngineConfig::new("sh")
                .with_args(["-c", r#"printf '{"status":"ready"}\n'"#])
                .with_warm_up_timeout(Duration::from_secs(5)),
        );
        engine.warm_up().unwrap();

        let result = engine.transcribe(Path::new("/tmp/w.wav"));
        assert!(result.is_err());

        // Next warm-up respawns instead of reusing the dead bridge.
        engine.warm_up().unwrap();
    }

    #[test]
    fn bad_ready_line_fails_warm_up() {
        let engine = ProcessEngine::new(
            "confused",
            ProcessEngineConfig::new("sh")
                .with_args(["-c", r#"printf '{"status":"loading"}\n'; sleep 5"#])
                .with_warm_up_timeout(Duration::from_secs(5)),
        );
        assert!(matches!(
            engine.warm_up(),
            Err(StreamscribeError::EngineResponse { .. })
        ));
    }
}
