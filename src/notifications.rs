//! In-memory notification list.
//!
//! Fed by server pushes (`add_realtime_notification`) and by polling
//! (`refresh`). Entries are never removed; the client only flips `read`.
//! The unread badge is derived from the list, so it cannot drift.

use std::sync::{Mutex, MutexGuard};

use crate::api::{ApiError, NotificationApi};
use crate::models::Notification;

#[derive(Default)]
pub struct NotificationStore {
    items: Mutex<Vec<Notification>>,
}

impl NotificationStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Notification>> {
        // A poisoned list is still a valid list.
        self.items.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Newest first.
    pub fn list(&self) -> Vec<Notification> {
        self.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn get(&self, id: &str) -> Option<Notification> {
        self.lock().iter().find(|n| n.id == id).cloned()
    }

    /// Insert a pushed notification at the front. An entry with the same
    /// id is replaced in place and keeps its read flag.
    pub fn add_realtime_notification(&self, notification: Notification) {
        let mut items = self.lock();
        match items.iter_mut().find(|n| n.id == notification.id) {
            Some(existing) => {
                let read = existing.read || notification.read;
                *existing = notification;
                existing.read = read;
                tracing::debug!(id = %existing.id, "Notification replaced");
            }
            None => {
                tracing::debug!(id = %notification.id, kind = %notification.kind, "Notification added");
                items.insert(0, notification);
            }
        }
    }

    /// Mark one entry read. Returns false for an unknown id.
    pub fn mark_as_read(&self, id: &str) -> bool {
        match self.lock().iter_mut().find(|n| n.id == id) {
            Some(n) => {
                n.read = true;
                true
            }
            None => false,
        }
    }

    /// Mark every entry read and return how many changed.
    pub fn mark_all_as_read(&self) -> usize {
        let mut changed = 0;
        for n in self.lock().iter_mut().filter(|n| !n.read) {
            n.read = true;
            changed += 1;
        }
        changed
    }

    /// Drop every entry. Called when the user signs out.
    pub fn clear(&self) {
        let mut items = self.lock();
        let dropped = items.len();
        items.clear();
        tracing::debug!(dropped, "Notifications cleared");
    }

    pub fn unread_count(&self) -> usize {
        self.lock().iter().filter(|n| !n.read).count()
    }

    /// Merge a server list into the store.
    ///
    /// Server entries replace local ones by id; a local read flag wins.
    /// Local-only entries (pushes the server did not persist) are kept.
    pub fn merge_server_list(&self, server: Vec<Notification>) {
        let mut items = self.lock();
        let mut merged: Vec<Notification> = Vec::with_capacity(server.len() + items.len());

        for mut incoming in server {
            if merged.iter().any(|n| n.id == incoming.id) {
                continue;
            }
            if let Some(local) = items.iter().find(|n| n.id == incoming.id) {
                incoming.read |= local.read;
            }
            merged.push(incoming);
        }
        for local in items.drain(..) {
            if !merged.iter().any(|n| n.id == local.id) {
                merged.push(local);
            }
        }

        merged.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        *items = merged;
    }

    /// Poll the backend list and merge it.
    pub async fn refresh(&self, api: &dyn NotificationApi) -> Result<usize, ApiError> {
        let server = api.list_notifications().await?;
        let fetched = server.len();
        self.merge_server_list(server);
        tracing::info!(fetched, unread = self.unread_count(), "Notifications refreshed");
        Ok(fetched)
    }

    /// Mark read locally, then tell the backend. The local flag stays set
    /// if the request fails.
    pub async fn mark_as_read_remote(&self, api: &dyn NotificationApi, id: &str) -> Result<bool, ApiError> {
        if !self.mark_as_read(id) {
            return Ok(false);
        }
        api.mark_read(id).await?;
        Ok(true)
    }
}
