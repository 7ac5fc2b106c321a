//! Managed-username registry.
//!
//! Process-wide set of usernames owned by either the rotation engine or
//! the check-out library. Creation of a role or a library set claims its
//! usernames here; a username can never belong to two owners.

use parking_lot::Mutex;
use std::collections::HashSet;

/// The registry. All mutation happens under one lock; request handlers
/// claim usernames only after the owning record persisted successfully.
#[derive(Default)]
pub struct ManagedUserRegistry {
    users: Mutex<HashSet<String>>,
}

impl ManagedUserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// True when the username is already owned.
    pub fn is_managed(&self, username: &str) -> bool {
        self.users.lock().contains(username)
    }

    /// Claim a batch of usernames.
    pub fn add_all<I, S>(&self, usernames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut users = self.users.lock();
        for username in usernames {
            users.insert(username.into());
        }
    }

    /// Release a batch of usernames.
    pub fn remove_all<'a, I>(&self, usernames: I)
    where
        I: IntoIterator<Item = &'a str>,
    {
        let mut users = self.users.lock();
        for username in usernames {
            users.remove(username);
        }
    }

    /// Atomically replace the whole set; used at engine initialization to
    /// rebuild from the role and library stores.
    pub fn replace_all<I, S>(&self, usernames: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let rebuilt: HashSet<String> = usernames.into_iter().map(Into::into).collect();
        *self.users.lock() = rebuilt;
    }

    /// Sorted copy of the current set.
    pub fn snapshot(&self) -> Vec<String> {
        let mut users: Vec<String> = self.users.lock().iter().cloned().collect();
        users.sort();
        users
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_remove_is_managed() {
        let registry = ManagedUserRegistry::new();
        assert!(!registry.is_managed("svc-blue"));

        registry.add_all(["svc-blue", "svc-green"]);
        assert!(registry.is_managed("svc-blue"));
        assert!(registry.is_managed("svc-green"));

        registry.remove_all(["svc-blue"]);
        assert!(!registry.is_managed("svc-blue"));
        assert!(registry.is_managed("svc-green"));
    }

    #[test]
    fn test_replace_all_is_atomic_rebuild() {
        let registry = ManagedUserRegistry::new();
        registry.add_all(["stale"]);

        registry.replace_all(["svc-a", "svc-b"]);
        assert!(!registry.is_managed("stale"));
        assert_eq!(registry.snapshot(), vec!["svc-a", "svc-b"]);
    }
}
