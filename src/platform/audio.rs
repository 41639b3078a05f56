use std::collections::HashSet;
use std::sync::Mutex;

use super::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SoundHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BgmHandle(pub u64);

/// Audio collaborator: decoded sound effects and streamed background music.
pub trait Audio: Send + Sync {
    fn load_sound_effect(&self, bytes: &[u8]) -> Result<SoundHandle, PlatformError>;
    fn load_bgm(&self, bytes: &[u8]) -> Result<BgmHandle, PlatformError>;
    fn release_sound_effect(&self, sound: SoundHandle);
    fn release_bgm(&self, bgm: BgmHandle);
    fn play_sound_effect(&self, sound: SoundHandle);
    fn play_bgm(&self, bgm: BgmHandle);
    fn stop_bgm(&self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AudioEvent {
    SoundEffect(SoundHandle),
    BgmStarted(BgmHandle),
    BgmStopped,
}

#[derive(Debug, Default)]
struct Mixer {
    next_id: u64,
    loaded: HashSet<u64>,
    events: Vec<AudioEvent>,
}

/// Audio without a device: validates container headers and logs playback.
#[derive(Debug, Default)]
pub struct HeadlessAudio {
    mixer: Mutex<Mixer>,
}

impl HeadlessAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AudioEvent> {
        self.lock().events.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Mixer> {
        self.mixer.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn admit(&self, bytes: &[u8]) -> Result<u64, PlatformError> {
        let wave = bytes.len() >= 12 && &bytes[..4] == b"RIFF" && &bytes[8..12] == b"WAVE";
        let ogg = bytes.starts_with(b"OggS");
        if !wave && !ogg {
            return Err(PlatformError::unsupported("sound", "expected RIFF/WAVE or Ogg data"));
        }
        let mut mixer = self.lock();
        mixer.next_id += 1;
        let id = mixer.next_id;
        mixer.loaded.insert(id);
        Ok(id)
    }
}

impl Audio for HeadlessAudio {
    fn load_sound_effect(&self, bytes: &[u8]) -> Result<SoundHandle, PlatformError> {
        self.admit(bytes).map(SoundHandle)
    }

    fn load_bgm(&self, bytes: &[u8]) -> Result<BgmHandle, PlatformError> {
        self.admit(bytes).map(BgmHandle)
    }

    fn release_sound_effect(&self, sound: SoundHandle) {
        self.lock().loaded.remove(&sound.0);
    }

    fn release_bgm(&self, bgm: BgmHandle) {
        self.lock().loaded.remove(&bgm.0);
    }

    fn play_sound_effect(&self, sound: SoundHandle) {
        self.lock().events.push(AudioEvent::SoundEffect(sound));
    }

    fn play_bgm(&self, bgm: BgmHandle) {
        self.lock().events.push(AudioEvent::BgmStarted(bgm));
    }

    fn stop_bgm(&self) {
        self.lock().events.push(AudioEvent::BgmStopped);
    }
}
