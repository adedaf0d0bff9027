//! Caller session boundary.

use std::collections::HashMap;

/// Session slot the invited-page view writes the last seen token into.
pub const INVITATION_KEY_SESSION_KEY: &str = "invitation_key";

pub trait Session: Send {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&mut self, name: &str, value: Option<String>);

    fn invitation_key(&self) -> Option<String> {
        self.get(INVITATION_KEY_SESSION_KEY)
    }

    fn set_invitation_key(&mut self, key: Option<&str>) {
        self.set(INVITATION_KEY_SESSION_KEY, key.map(|k| k.to_string()));
    }
}

#[derive(Debug, Default, Clone)]
pub struct MemorySession {
    values: HashMap<String, Option<String>>,
}

impl MemorySession {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether `name` was ever written, even with an empty value.
    pub fn contains(&self, name: &str) -> bool {
        self.values.contains_key(name)
    }
}

impl Session for MemorySession {
    fn get(&self, name: &str) -> Option<String> {
        self.values.get(name).cloned().flatten()
    }

    fn set(&mut self, name: &str, value: Option<String>) {
        self.values.insert(name.to_string(), value);
    }
}
