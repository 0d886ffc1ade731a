//! Collaborator stores wired into the daemon.
//!
//! The chat core only sees the `consult-core` traits. [`Stores`] bundles one
//! implementation of each so routes and clients can share them.

use std::sync::Arc;

use consult_core::{MessageStore, ProfileResolver, SessionStore};

use crate::config::Config;

pub mod memory;

pub use memory::{MemoryMessageStore, MemoryProfileResolver, MemorySessionStore};

/// The three collaborators a client needs.
#[derive(Clone)]
pub struct Stores {
    pub sessions: Arc<dyn SessionStore>,
    pub messages: Arc<dyn MessageStore>,
    pub profiles: Arc<dyn ProfileResolver>,
}

impl Stores {
    pub fn new(
        sessions: Arc<dyn SessionStore>,
        messages: Arc<dyn MessageStore>,
        profiles: Arc<dyn ProfileResolver>,
    ) -> Self {
        Self {
            sessions,
            messages,
            profiles,
        }
    }

    /// In-memory stores seeded from the config's `[[sessions]]` and
    /// `[[profiles]]` tables.
    pub fn in_memory(config: &Config) -> Self {
        let sessions = MemorySessionStore::new();
        for seed in &config.sessions {
            sessions.insert(seed.id, seed.doctor_id, seed.patient_id, seed.status);
        }

        let profiles = MemoryProfileResolver::new();
        for seed in &config.profiles {
            profiles.insert(
                seed.user_id,
                consult_core::Profile::new(seed.name.clone(), seed.photo_url.clone()),
            );
        }

        Self::new(
            Arc::new(sessions),
            Arc::new(MemoryMessageStore::new()),
            Arc::new(profiles),
        )
    }
}
