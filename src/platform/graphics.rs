use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

use super::PlatformError;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureHandle(pub u64);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FontHandle(pub u64);

/// Placement of a textured quad.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub x: f32,
    pub y: f32,
    pub sx: f32,
    pub sy: f32,
    pub angle: f32,
    pub alpha: f32,
}

impl Transform {
    pub fn at(x: f32, y: f32) -> Self {
        Self {
            x,
            y,
            sx: 1.0,
            sy: 1.0,
            angle: 0.0,
            alpha: 1.0,
        }
    }
}

/// Rendering collaborator. Draw calls only enqueue; the flush belongs to the
/// embedding application.
pub trait Graphics: Send + Sync {
    fn load_texture(&self, bytes: &[u8]) -> Result<TextureHandle, PlatformError>;
    fn load_font(&self, bytes: &[u8], size: u32) -> Result<FontHandle, PlatformError>;
    fn release_texture(&self, texture: TextureHandle);
    fn release_font(&self, font: FontHandle);
    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)>;
    fn draw_texture(&self, texture: TextureHandle, transform: Transform);
    fn draw_string(&self, font: FontHandle, text: &str, x: f32, y: f32, color: u32);
}

#[derive(Debug, Clone, PartialEq)]
pub enum DrawCommand {
    Texture {
        texture: TextureHandle,
        transform: Transform,
    },
    Text {
        font: FontHandle,
        text: String,
        x: f32,
        y: f32,
        color: u32,
    },
}

#[derive(Debug, Default)]
struct HeadlessState {
    next_id: u64,
    textures: HashMap<u64, (u32, u32)>,
    fonts: HashSet<u64>,
    queue: Vec<DrawCommand>,
}

impl HeadlessState {
    fn issue(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }
}

/// Graphics without a device: reads PNG headers for sizes, queues draws.
#[derive(Debug, Default)]
pub struct HeadlessGraphics {
    state: Mutex<HeadlessState>,
}

const PNG_SIGNATURE: &[u8] = b"\x89PNG\r\n\x1a\n";

impl HeadlessGraphics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain the draw queue, as a frame flush would.
    pub fn take_commands(&self) -> Vec<DrawCommand> {
        std::mem::take(&mut self.lock().queue)
    }

    pub fn live_textures(&self) -> usize {
        self.lock().textures.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HeadlessState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

fn png_size(bytes: &[u8]) -> Result<(u32, u32), PlatformError> {
    if bytes.len() < 24 || !bytes.starts_with(PNG_SIGNATURE) {
        return Err(PlatformError::unsupported("texture", "not a PNG image"));
    }
    if &bytes[12..16] != b"IHDR" {
        return Err(PlatformError::unsupported("texture", "missing IHDR header"));
    }
    let word = |at: usize| u32::from_be_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]]);
    Ok((word(16), word(20)))
}

fn is_font(bytes: &[u8]) -> bool {
    matches!(
        bytes.get(..4),
        Some([0, 1, 0, 0]) | Some(b"OTTO") | Some(b"true") | Some(b"ttcf")
    )
}

impl Graphics for HeadlessGraphics {
    fn load_texture(&self, bytes: &[u8]) -> Result<TextureHandle, PlatformError> {
        let size = png_size(bytes)?;
        let mut state = self.lock();
        let id = state.issue();
        state.textures.insert(id, size);
        Ok(TextureHandle(id))
    }

    fn load_font(&self, bytes: &[u8], size: u32) -> Result<FontHandle, PlatformError> {
        if !is_font(bytes) {
            return Err(PlatformError::unsupported("font", "not a TrueType/OpenType font"));
        }
        if size == 0 {
            return Err(PlatformError::unsupported("font", "point size must be positive"));
        }
        let mut state = self.lock();
        let id = state.issue();
        state.fonts.insert(id);
        Ok(FontHandle(id))
    }

    fn release_texture(&self, texture: TextureHandle) {
        self.lock().textures.remove(&texture.0);
    }

    fn release_font(&self, font: FontHandle) {
        self.lock().fonts.remove(&font.0);
    }

    fn texture_size(&self, texture: TextureHandle) -> Option<(u32, u32)> {
        self.lock().textures.get(&texture.0).copied()
    }

    fn draw_texture(&self, texture: TextureHandle, transform: Transform) {
        self.lock().queue.push(DrawCommand::Texture { texture, transform });
    }

    fn draw_string(&self, font: FontHandle, text: &str, x: f32, y: f32, color: u32) {
        self.lock().queue.push(DrawCommand::Text {
            font,
            text: text.to_string(),
            x,
            y,
            color,
        });
    }
}
