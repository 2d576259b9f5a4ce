use crate::config::{AlertPlayer, Config};
use crate::error::AlertError;
use crate::models::EventKind;
use crate::pipeline::severity::Tier;
use std::collections::HashMap;
use std::io::Write;
use std::path::PathBuf;
use std::process::{Command, Stdio};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, warn};

/// Fire-and-forget "play named sound" capability.
pub trait SoundPlayer: Send + Sync {
    fn play(&self, sound: &str) -> Result<(), AlertError>;
}

/// macOS system sounds through `afplay`.
pub struct Afplay {
    sound_dir: PathBuf,
    fallback: String,
}

impl Afplay {
    pub fn new(sound_dir: impl Into<PathBuf>, fallback: impl Into<String>) -> Self {
        Self {
            sound_dir: sound_dir.into(),
            fallback: fallback.into(),
        }
    }

    fn sound_path(&self, sound: &str) -> PathBuf {
        self.sound_dir.join(format!("{}.aiff", sound))
    }
}

impl SoundPlayer for Afplay {
    fn play(&self, sound: &str) -> Result<(), AlertError> {
        let mut path = self.sound_path(sound);
        if !path.exists() {
            warn!("Sound '{}' not found, using '{}'", sound, self.fallback);
            path = self.sound_path(&self.fallback);
            if !path.exists() {
                return Err(AlertError::SoundNotFound(sound.to_string()));
            }
        }

        let mut child = Command::new("afplay")
            .arg(&path)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|source| AlertError::Spawn {
                player: "afplay".to_string(),
                source,
            })?;

        // Reap off the delivery path.
        std::thread::spawn(move || {
            let _ = child.wait();
        });
        Ok(())
    }
}

pub struct TerminalBell;

impl SoundPlayer for TerminalBell {
    fn play(&self, _sound: &str) -> Result<(), AlertError> {
        let mut out = std::io::stdout().lock();
        out.write_all(b"\x07").map_err(AlertError::Bell)?;
        out.flush().map_err(AlertError::Bell)
    }
}

pub struct Silent;

impl SoundPlayer for Silent {
    fn play(&self, _sound: &str) -> Result<(), AlertError> {
        Ok(())
    }
}

/// Decides per event whether the sound plays. Every qualifying event alerts
/// unless a coalesce window is configured.
pub struct AlertDispatcher {
    player: Arc<dyn SoundPlayer>,
    sound: String,
    floors: HashMap<EventKind, Tier>,
    coalesce_window: Option<Duration>,
    last_fired: Mutex<HashMap<EventKind, Instant>>,
}

impl AlertDispatcher {
    pub fn new(player: Arc<dyn SoundPlayer>, sound: impl Into<String>) -> Self {
        Self {
            player,
            sound: sound.into(),
            floors: HashMap::new(),
            coalesce_window: None,
            last_fired: Mutex::new(HashMap::new()),
        }
    }

    /// Alerts fire for `kind` when the tier is strictly above `floor`.
    pub fn with_floor(mut self, kind: EventKind, floor: Tier) -> Self {
        self.floors.insert(kind, floor);
        self
    }

    pub fn with_coalesce_window(mut self, window: Duration) -> Self {
        self.coalesce_window = (!window.is_zero()).then_some(window);
        self
    }

    pub fn from_config(config: &Config) -> Self {
        let player: Arc<dyn SoundPlayer> = match (config.alert.enabled, config.alert.player) {
            (false, _) | (_, AlertPlayer::None) => Arc::new(Silent),
            (true, AlertPlayer::Bell) => Arc::new(TerminalBell),
            (true, AlertPlayer::Afplay) => Arc::new(Afplay::new(
                &config.alert.sound_dir,
                &config.alert.fallback_sound,
            )),
        };

        let dispatcher = EventKind::ALL.into_iter().fold(
            Self::new(player, &config.alert.sound),
            |dispatcher, kind| match config.kind(kind).alert_floor_for(kind) {
                Some(floor) => dispatcher.with_floor(kind, floor),
                None => dispatcher,
            },
        );
        dispatcher.with_coalesce_window(Duration::from_millis(config.alert.coalesce_window_ms))
    }

    /// Returns true when the sound was requested.
    pub fn maybe_alert(&self, kind: EventKind, tier: Tier) -> bool {
        let Some(floor) = self.floors.get(&kind) else {
            return false;
        };
        if tier <= *floor {
            return false;
        }

        if let Some(window) = self.coalesce_window {
            let now = Instant::now();
            let mut last_fired = self.last_fired.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(last) = last_fired.get(&kind) {
                if now.duration_since(*last) < window {
                    debug!("Coalesced {} alert ({:?})", kind, tier);
                    return false;
                }
            }
            last_fired.insert(kind, now);
        }

        if let Err(e) = self.player.play(&self.sound) {
            warn!("Alert for {} ({:?}) failed: {}", kind, tier, e);
        }
        true
    }
}
