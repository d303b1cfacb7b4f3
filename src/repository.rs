use std::collections::BTreeMap;
use std::sync::RwLock;

use thiserror::Error;
use uuid::Uuid;

use crate::models::Activity;

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("activity not found: {0}")]
    NotFound(String),
    #[error("activity {id} was modified concurrently (expected version {expected}, found {found})")]
    Conflict { id: String, expected: u64, found: u64 },
    #[error("repository unavailable: {0}")]
    Unavailable(String),
}

/// Storage for activities keyed by identifier.
///
/// `update` is conditional: it succeeds only when the stored version equals
/// `activity.version`, and stores the record with the version incremented.
pub trait ActivityRepository: Send + Sync {
    /// Stores a new activity and returns its freshly assigned identifier.
    fn add(&self, activity: Activity) -> Result<String, RepositoryError>;
    fn update(&self, activity: &Activity) -> Result<(), RepositoryError>;
    fn get_by_id(&self, id: &str) -> Result<Activity, RepositoryError>;
    fn delete(&self, activity: &Activity) -> Result<(), RepositoryError>;
    fn ids(&self) -> Result<Vec<String>, RepositoryError>;
}

#[derive(Debug, Default)]
pub struct InMemoryActivityRepository {
    activities: RwLock<BTreeMap<String, Activity>>,
}

impl InMemoryActivityRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> RepositoryError {
    RepositoryError::Unavailable("activity store lock poisoned".into())
}

impl ActivityRepository for InMemoryActivityRepository {
    fn add(&self, mut activity: Activity) -> Result<String, RepositoryError> {
        let id = Uuid::new_v4().to_string();
        activity.id = id.clone();
        activity.version = 0;
        self.activities
            .write()
            .map_err(poisoned)?
            .insert(id.clone(), activity);
        Ok(id)
    }

    fn update(&self, activity: &Activity) -> Result<(), RepositoryError> {
        let mut activities = self.activities.write().map_err(poisoned)?;
        let stored = activities
            .get_mut(&activity.id)
            .ok_or_else(|| RepositoryError::NotFound(activity.id.clone()))?;
        if stored.version != activity.version {
            return Err(RepositoryError::Conflict {
                id: activity.id.clone(),
                expected: activity.version,
                found: stored.version,
            });
        }
        *stored = activity.clone();
        stored.version += 1;
        Ok(())
    }

    fn get_by_id(&self, id: &str) -> Result<Activity, RepositoryError> {
        self.activities
            .read()
            .map_err(poisoned)?
            .get(id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn delete(&self, activity: &Activity) -> Result<(), RepositoryError> {
        self.activities
            .write()
            .map_err(poisoned)?
            .remove(&activity.id)
            .map(|_| ())
            .ok_or_else(|| RepositoryError::NotFound(activity.id.clone()))
    }

    fn ids(&self) -> Result<Vec<String>, RepositoryError> {
        Ok(self.activities.read().map_err(poisoned)?.keys().cloned().collect())
    }
}
