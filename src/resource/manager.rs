use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{debug, info};

use super::{CancellationToken, ResourceError, ResourceId};
use crate::platform::{
    Audio, BgmHandle, FileSource, FontHandle, Graphics, SoundHandle, TextureHandle,
};

/// What a registered resource decodes into, and from where.
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceSpec {
    Texture { path: PathBuf },
    Font { path: PathBuf, size: u32 },
    SoundEffect { path: PathBuf },
    Bgm { path: PathBuf },
}

impl ResourceSpec {
    pub fn path(&self) -> &Path {
        match self {
            ResourceSpec::Texture { path }
            | ResourceSpec::Font { path, .. }
            | ResourceSpec::SoundEffect { path }
            | ResourceSpec::Bgm { path } => path,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            ResourceSpec::Texture { .. } => "texture",
            ResourceSpec::Font { .. } => "font",
            ResourceSpec::SoundEffect { .. } => "sound effect",
            ResourceSpec::Bgm { .. } => "bgm",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Loaded {
    Texture(TextureHandle),
    Font(FontHandle),
    SoundEffect(SoundHandle),
    Bgm(BgmHandle),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadState {
    Registered,
    Loading,
    Loaded,
}

#[derive(Debug)]
enum Slot {
    Registered,
    Loading,
    Loaded(Loaded),
}

#[derive(Debug)]
struct ResourceEntry {
    id: ResourceId,
    spec: ResourceSpec,
    slot: Mutex<Slot>,
}

type ResourceSet = HashMap<ResourceId, Arc<ResourceEntry>>;

/// Registry of resource sets shared between the script thread and the
/// loader thread.
pub struct ResourceManager {
    files: Arc<dyn FileSource>,
    graphics: Arc<dyn Graphics>,
    audio: Arc<dyn Audio>,
    sets: Mutex<HashMap<u32, ResourceSet>>,
    sealed: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

impl ResourceManager {
    pub fn new(
        files: Arc<dyn FileSource>,
        graphics: Arc<dyn Graphics>,
        audio: Arc<dyn Audio>,
    ) -> Self {
        Self {
            files,
            graphics,
            audio,
            sets: Mutex::new(HashMap::new()),
            sealed: AtomicBool::new(true),
        }
    }

    /// Open the registration window.
    pub fn unseal(&self) {
        self.sealed.store(false, Ordering::SeqCst);
    }

    pub fn seal(&self) {
        self.sealed.store(true, Ordering::SeqCst);
    }

    pub fn is_sealed(&self) -> bool {
        self.sealed.load(Ordering::SeqCst)
    }

    pub fn register(&self, set: u32, id: &str, spec: ResourceSpec) -> Result<(), ResourceError> {
        if self.is_sealed() {
            return Err(ResourceError::Sealed);
        }
        let id = ResourceId::new(id)?;

        let mut sets = lock(&self.sets);
        let entries = sets.entry(set).or_default();
        if entries.contains_key(&id) {
            return Err(ResourceError::AlreadyRegistered {
                set,
                id: id.to_string(),
            });
        }

        debug!(set, %id, kind = spec.kind(), path = %spec.path().display(), "registered resource");
        entries.insert(
            id,
            Arc::new(ResourceEntry {
                id,
                spec,
                slot: Mutex::new(Slot::Registered),
            }),
        );
        Ok(())
    }

    pub fn set_ids(&self) -> Vec<u32> {
        let mut ids: Vec<u32> = lock(&self.sets).keys().copied().collect();
        ids.sort_unstable();
        ids
    }

    /// `None` when the id is not registered in the set.
    pub fn state(&self, set: u32, id: &str) -> Option<LoadState> {
        let entry = self.entry(set, id).ok()?;
        let state = match *lock(&entry.slot) {
            Slot::Registered => LoadState::Registered,
            Slot::Loading => LoadState::Loading,
            Slot::Loaded(_) => LoadState::Loaded,
        };
        Some(state)
    }

    /// Decode every entry of a set that is not loaded yet. Returns how many
    /// entries this call loaded.
    pub fn load_resource_set(
        &self,
        set: u32,
        cancel: &CancellationToken,
    ) -> Result<usize, ResourceError> {
        let entries = self.snapshot(set);
        let mut loaded = 0;

        for entry in entries {
            if cancel.is_cancelled() {
                info!(set, "resource load cancelled");
                return Err(ResourceError::Cancelled);
            }
            if self.load_entry(&entry)? {
                loaded += 1;
            }
        }

        info!(set, loaded, "resource set loaded");
        Ok(loaded)
    }

    /// Release every loaded entry of a set. Registrations stay. Safe to call
    /// repeatedly. An entry still loading is skipped and reported.
    pub fn unload_resource_set(&self, set: u32) -> Result<(), ResourceError> {
        let mut busy = None;
        for entry in self.snapshot(set) {
            let mut slot = lock(&entry.slot);
            match *slot {
                Slot::Registered => {}
                Slot::Loading => {
                    busy.get_or_insert_with(|| {
                        ResourceError::UnloadWhileLoading(entry.id.to_string())
                    });
                }
                Slot::Loaded(handle) => {
                    self.release(handle);
                    *slot = Slot::Registered;
                }
            }
        }
        busy.map_or(Ok(()), Err)
    }

    /// Unload everything and forget all registrations. The registrations go
    /// even when an entry could not be unloaded; the first such error is
    /// returned.
    pub fn clear(&self) -> Result<(), ResourceError> {
        let mut first_error = None;
        for set in self.set_ids() {
            if let Err(err) = self.unload_resource_set(set) {
                first_error.get_or_insert(err);
            }
        }
        lock(&self.sets).clear();
        first_error.map_or(Ok(()), Err)
    }

    pub fn texture(&self, set: u32, id: &str) -> Result<TextureHandle, ResourceError> {
        match self.loaded(set, id)? {
            Loaded::Texture(handle) => Ok(handle),
            other => Err(wrong_kind(id, "texture", other)),
        }
    }

    pub fn font(&self, set: u32, id: &str) -> Result<FontHandle, ResourceError> {
        match self.loaded(set, id)? {
            Loaded::Font(handle) => Ok(handle),
            other => Err(wrong_kind(id, "font", other)),
        }
    }

    pub fn sound_effect(&self, set: u32, id: &str) -> Result<SoundHandle, ResourceError> {
        match self.loaded(set, id)? {
            Loaded::SoundEffect(handle) => Ok(handle),
            other => Err(wrong_kind(id, "sound effect", other)),
        }
    }

    pub fn bgm(&self, set: u32, id: &str) -> Result<BgmHandle, ResourceError> {
        match self.loaded(set, id)? {
            Loaded::Bgm(handle) => Ok(handle),
            other => Err(wrong_kind(id, "bgm", other)),
        }
    }

    pub fn loaded(&self, set: u32, id: &str) -> Result<Loaded, ResourceError> {
        let entry = self.entry(set, id)?;
        let slot = lock(&entry.slot);
        match *slot {
            Slot::Loaded(handle) => Ok(handle),
            Slot::Registered | Slot::Loading => Err(ResourceError::NotLoaded(id.to_string())),
        }
    }

    fn entry(&self, set: u32, id: &str) -> Result<Arc<ResourceEntry>, ResourceError> {
        let not_found = || ResourceError::NotFound(id.to_string());
        let key = ResourceId::new(id).map_err(|_| not_found())?;
        lock(&self.sets)
            .get(&set)
            .and_then(|entries| entries.get(&key))
            .cloned()
            .ok_or_else(not_found)
    }

    fn snapshot(&self, set: u32) -> Vec<Arc<ResourceEntry>> {
        let sets = lock(&self.sets);
        let mut entries: Vec<_> = sets
            .get(&set)
            .map(|entries| entries.values().cloned().collect())
            .unwrap_or_default();
        entries.sort_by_key(|entry| entry.id);
        entries
    }

    /// Check, decode outside the lock, then commit. Returns false when the
    /// entry was already loaded or another loader holds it.
    fn load_entry(&self, entry: &ResourceEntry) -> Result<bool, ResourceError> {
        {
            let mut slot = lock(&entry.slot);
            match *slot {
                Slot::Loaded(_) | Slot::Loading => return Ok(false),
                Slot::Registered => *slot = Slot::Loading,
            }
        }

        let mut guard = LoadingGuard {
            slot: &entry.slot,
            committed: false,
        };
        let handle = self.decode(entry)?;
        *lock(&entry.slot) = Slot::Loaded(handle);
        guard.committed = true;
        Ok(true)
    }

    fn release(&self, handle: Loaded) {
        match handle {
            Loaded::Texture(h) => self.graphics.release_texture(h),
            Loaded::Font(h) => self.graphics.release_font(h),
            Loaded::SoundEffect(h) => self.audio.release_sound_effect(h),
            Loaded::Bgm(h) => self.audio.release_bgm(h),
        }
    }
}

/// Returns an entry to `Registered` unless its decode committed, also when
/// the decoder panics.
struct LoadingGuard<'a> {
    slot: &'a Mutex<Slot>,
    committed: bool,
}

impl Drop for LoadingGuard<'_> {
    fn drop(&mut self) {
        if !self.committed {
            *lock(self.slot) = Slot::Registered;
        }
    }
}

fn wrong_kind(id: &str, expected: &'static str, actual: Loaded) -> ResourceError {
    let actual = match actual {
        Loaded::Texture(_) => "texture",
        Loaded::Font(_) => "font",
        Loaded::SoundEffect(_) => "sound effect",
        Loaded::Bgm(_) => "bgm",
    };
    ResourceError::WrongKind {
        id: id.to_string(),
        expected,
        actual,
    }
}
