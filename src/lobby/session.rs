//! Secret and name bookkeeping for registered players

use hashbrown::HashMap;

use crate::game::state::PlayerId;

/// Maps client secrets and display names to player ids
///
/// Secrets identify the caller on every request and never leave the server.
/// Names are unique among currently registered players only, so a name frees
/// up again on unregister.
#[derive(Debug, Default)]
pub struct SessionTable {
    by_secret: HashMap<String, PlayerId>,
    by_name: HashMap<String, PlayerId>,
    names: HashMap<PlayerId, String>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.by_secret.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_secret.is_empty()
    }

    pub fn player_for(&self, secret: &str) -> Option<PlayerId> {
        self.by_secret.get(secret).copied()
    }

    pub fn has_secret(&self, secret: &str) -> bool {
        self.by_secret.contains_key(secret)
    }

    pub fn name_taken(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// Record a new session; the caller has already checked for conflicts
    pub fn insert(&mut self, secret: String, name: String, player_id: PlayerId) {
        debug_assert!(!self.has_secret(&secret) && !self.name_taken(&name));
        self.by_secret.insert(secret, player_id);
        self.by_name.insert(name.clone(), player_id);
        self.names.insert(player_id, name);
    }

    /// Forget a session by secret, freeing its name
    pub fn remove(&mut self, secret: &str) -> Option<PlayerId> {
        let player_id = self.by_secret.remove(secret)?;
        if let Some(name) = self.names.remove(&player_id) {
            self.by_name.remove(&name);
        }
        Some(player_id)
    }

    pub fn name_of(&self, player_id: PlayerId) -> Option<&str> {
        self.names.get(&player_id).map(String::as_str)
    }
}
