//! Music and sound effects.
//!
//! Playback itself is provided by the host through [`AudioProvider`]. The
//! handles it returns are owned by [`Music`] (a context singleton, one track
//! at a time) and [`Sound`] (wrapped by per-entity components). Both stop
//! their handle when dropped.

use crate::{context::World, error::AudioError};

pub trait MusicTrack {
    fn play(&mut self, looping: bool) -> Result<(), AudioError>;
    fn stop(&mut self);
}

pub trait SoundEffect {
    fn play(&mut self) -> Result<(), AudioError>;
    fn stop(&mut self);
}

pub trait AudioProvider {
    fn open_music(&mut self, path: &str) -> Result<Box<dyn MusicTrack>, AudioError>;
    fn open_sound(&mut self, path: &str) -> Result<Box<dyn SoundEffect>, AudioError>;
    fn set_master_volume(&mut self, _volume: f32) {}
}

/// Context slot for the audio device.
pub struct Audio(pub Box<dyn AudioProvider>);

/// The track currently streaming.
pub struct Music {
    path: String,
    track: Box<dyn MusicTrack>,
}

impl Music {
    pub fn path(&self) -> &str {
        &self.path
    }
}

impl Drop for Music {
    fn drop(&mut self) {
        log::debug!("stopping music {}", self.path);
        self.track.stop();
    }
}

/// A loaded one-shot sound.
pub struct Sound(Box<dyn SoundEffect>);

impl Sound {
    pub fn play(&mut self) {
        if let Err(e) = self.0.play() {
            log::warn!("sound playback failed: {}", e);
        }
    }
}

impl Drop for Sound {
    fn drop(&mut self) {
        self.0.stop();
    }
}

/// Loads a sound, or `None` when no audio device is registered.
pub fn load_sound(world: &mut World, path: &str) -> Result<Option<Sound>, AudioError> {
    match world.ctx.get_mut::<Audio>() {
        Some(audio) => Ok(Some(Sound(audio.0.open_sound(path)?))),
        None => Ok(None),
    }
}

/// Replace the current track with `path`, looping. The old track is stopped
/// before the new one is opened.
pub fn play_music(world: &mut World, path: &str) -> Result<(), AudioError> {
    stop_music(world);
    let Some(audio) = world.ctx.get_mut::<Audio>() else {
        log::debug!("no audio device, skipping music {}", path);
        return Ok(());
    };
    let mut track = audio.0.open_music(path)?;
    track.play(true)?;
    world.ctx.insert(Music {
        path: path.to_string(),
        track,
    });
    Ok(())
}

pub fn stop_music(world: &mut World) {
    world.ctx.erase::<Music>();
}
