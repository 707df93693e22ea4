//! Name-based module lookup.

use std::collections::HashMap;
use std::sync::Arc;

use framewright_common::error::{FramewrightError, FramewrightResult};
use framewright_media_model::{Codec, MediaKind, StreamMask};
use tracing::{debug, info, warn};

use crate::builtin;
use crate::info::{ModuleClass, ModuleInfo};
use crate::module::{EncodeModule, MuxModule};

pub type EncoderConstructor = Arc<dyn Fn() -> Box<dyn EncodeModule> + Send + Sync>;
pub type MuxerConstructor = Arc<dyn Fn() -> Box<dyn MuxModule> + Send + Sync>;

/// Instantiates modules by (class, name, media).
pub trait ModuleFactory: Send + Sync {
    /// A fresh encoder serving `kind`.
    fn new_encoder(&self, name: &str, kind: MediaKind) -> FramewrightResult<Box<dyn EncodeModule>>;

    /// A fresh muxer serving every kind in `media`.
    fn new_muxer(&self, name: &str, media: StreamMask) -> FramewrightResult<Box<dyn MuxModule>>;
}

struct Registered<C> {
    media: StreamMask,
    construct: C,
}

/// Table of module constructors.
pub struct ModuleRegistry {
    encoders: HashMap<String, Registered<EncoderConstructor>>,
    muxers: HashMap<String, Registered<MuxerConstructor>>,
}

impl ModuleRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self {
            encoders: HashMap::new(),
            muxers: HashMap::new(),
        }
    }

    /// A registry holding the built-in modules.
    pub fn builtin() -> Self {
        let mut registry = Self::new();
        if let Err(e) = builtin::register_all(&mut registry) {
            warn!(error = %e, "Failed to register built-in modules");
        }
        registry
    }

    /// Register an encoder constructor. Names are unique per class.
    pub fn register_encoder<F>(&mut self, name: &str, media: StreamMask, construct: F) -> FramewrightResult<()>
    where
        F: Fn() -> Box<dyn EncodeModule> + Send + Sync + 'static,
    {
        if self.encoders.contains_key(name) {
            return Err(already_registered(ModuleClass::Encode, name));
        }
        debug!(name, media = media.describe(), "Encoder registered");
        self.encoders.insert(
            name.to_string(),
            Registered {
                media,
                construct: Arc::new(construct),
            },
        );
        Ok(())
    }

    /// Register a muxer constructor. Names are unique per class.
    pub fn register_muxer<F>(&mut self, name: &str, media: StreamMask, construct: F) -> FramewrightResult<()>
    where
        F: Fn() -> Box<dyn MuxModule> + Send + Sync + 'static,
    {
        if self.muxers.contains_key(name) {
            return Err(already_registered(ModuleClass::Multiplex, name));
        }
        debug!(name, media = media.describe(), "Multiplexor registered");
        self.muxers.insert(
            name.to_string(),
            Registered {
                media,
                construct: Arc::new(construct),
            },
        );
        Ok(())
    }

    pub fn contains(&self, class: ModuleClass, name: &str) -> bool {
        match class {
            ModuleClass::Encode => self.encoders.contains_key(name),
            ModuleClass::Multiplex => self.muxers.contains_key(name),
        }
    }

    /// Registered names of `class`, sorted.
    pub fn names(&self, class: ModuleClass) -> Vec<&str> {
        let mut names: Vec<&str> = match class {
            ModuleClass::Encode => self.encoders.keys().map(String::as_str).collect(),
            ModuleClass::Multiplex => self.muxers.keys().map(String::as_str).collect(),
        };
        names.sort_unstable();
        names
    }

    pub fn count(&self) -> usize {
        self.encoders.len() + self.muxers.len()
    }
}

impl Default for ModuleRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl ModuleFactory for ModuleRegistry {
    fn new_encoder(&self, name: &str, kind: MediaKind) -> FramewrightResult<Box<dyn EncodeModule>> {
        let entry = self
            .encoders
            .get(name)
            .filter(|e| e.media.contains(kind.mask()))
            .ok_or_else(|| FramewrightError::module_not_found(ModuleClass::Encode.as_str(), name, kind.as_str()))?;
        let module = (entry.construct)();
        info!(module = name, media = %kind, "Encoder instantiated");
        Ok(module)
    }

    fn new_muxer(&self, name: &str, media: StreamMask) -> FramewrightResult<Box<dyn MuxModule>> {
        let entry = self
            .muxers
            .get(name)
            .filter(|e| e.media.contains(media))
            .ok_or_else(|| {
                FramewrightError::module_not_found(ModuleClass::Multiplex.as_str(), name, media.describe())
            })?;
        let module = (entry.construct)();
        info!(module = name, media = media.describe(), "Multiplexor instantiated");
        Ok(module)
    }
}

fn already_registered(class: ModuleClass, name: &str) -> FramewrightError {
    FramewrightError::module_config(name, format!("{class} module already registered"))
}

/// Whether `encoder` can produce `codec` for `kind` and `muxer` accepts it.
pub fn modules_match(codec: Codec, kind: MediaKind, encoder: &ModuleInfo, muxer: &ModuleInfo) -> bool {
    let produced = encoder.produced(kind).iter().any(|c| c.accepts(codec));
    let accepted = muxer.accepted(kind).iter().any(|c| c.accepts(codec));
    produced && accepted
}
