//! Module cache
//!
//! One slot per build flavour (debug, release). All slots share a single
//! output folder; switching folders empties the cache. A slot also records
//! the fingerprint of the unit it was built from, so a changed unit is
//! rebuilt rather than served stale.

use cinder_core::{BuildProfile, Fingerprint, Result};
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::debug;

#[derive(Debug, Clone)]
struct Slot<M> {
    fingerprint: Fingerprint,
    module: M,
}

/// Cache of built modules keyed by [`BuildProfile`]
#[derive(Debug, Clone)]
pub struct ModuleCache<M> {
    output_folder: Option<PathBuf>,
    slots: HashMap<bool, Slot<M>>,
    builds: usize,
}

impl<M> Default for ModuleCache<M> {
    fn default() -> Self {
        Self {
            output_folder: None,
            slots: HashMap::new(),
            builds: 0,
        }
    }
}

impl<M: Clone> ModuleCache<M> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the module cached for `profile` and `fingerprint`, building it
    /// with `build` on a miss.
    ///
    /// A failed build leaves the slot empty.
    pub fn get_or_build<F>(&mut self, profile: &BuildProfile, fingerprint: &Fingerprint, build: F) -> Result<M>
    where
        F: FnOnce() -> Result<M>,
    {
        self.switch_folder(profile);

        if let Some(slot) = self.slots.get(&profile.debug) {
            if &slot.fingerprint == fingerprint {
                debug!("Module cache hit for {}", profile);
                return Ok(slot.module.clone());
            }
            debug!("Module cache entry for {} is stale", profile);
        }

        self.slots.remove(&profile.debug);
        let module = build()?;
        self.builds += 1;
        self.slots.insert(
            profile.debug,
            Slot {
                fingerprint: fingerprint.clone(),
                module: module.clone(),
            },
        );
        Ok(module)
    }

    /// Cached module for `profile`, whatever its fingerprint
    pub fn get(&self, profile: &BuildProfile) -> Option<M> {
        if self.output_folder.as_ref() != Some(&profile.output_folder) {
            return None;
        }
        self.slots.get(&profile.debug).map(|slot| slot.module.clone())
    }

    pub fn invalidate(&mut self, profile: &BuildProfile) {
        if self.output_folder.as_ref() == Some(&profile.output_folder) {
            self.slots.remove(&profile.debug);
        }
    }

    pub fn clear(&mut self) {
        self.slots.clear();
    }

    /// Number of builds run through this cache
    pub fn build_count(&self) -> usize {
        self.builds
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn switch_folder(&mut self, profile: &BuildProfile) {
        if self.output_folder.as_ref() != Some(&profile.output_folder) {
            if self.output_folder.is_some() {
                debug!("Output folder changed to {:?}, dropping cached modules", profile.output_folder);
            }
            self.slots.clear();
            self.output_folder = Some(profile.output_folder.clone());
        }
    }
}
