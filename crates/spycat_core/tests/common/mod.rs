#![allow(dead_code)]

use async_trait::async_trait;
use spycat_core::{
    BreedDirectory, BreedDirectoryError, CallContext, CatService, Database, MissionService,
    NewCat, NewTarget, TargetService, TimeoutPolicy,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub const KNOWN_BREEDS: &[&str] = &["Abyssinian", "Bengal", "Siamese"];

/// Directory answering from a fixed list, counting calls.
pub struct StaticBreeds {
    pub calls: AtomicUsize,
}

#[async_trait]
impl BreedDirectory for StaticBreeds {
    async fn breed_names(&self) -> Result<Vec<String>, BreedDirectoryError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(KNOWN_BREEDS.iter().map(|name| name.to_string()).collect())
    }
}

pub struct FailingBreeds;

#[async_trait]
impl BreedDirectory for FailingBreeds {
    async fn breed_names(&self) -> Result<Vec<String>, BreedDirectoryError> {
        Err(BreedDirectoryError::Other("connection reset".to_string()))
    }
}

pub struct HungBreeds;

#[async_trait]
impl BreedDirectory for HungBreeds {
    async fn breed_names(&self) -> Result<Vec<String>, BreedDirectoryError> {
        tokio::time::sleep(Duration::from_secs(60)).await;
        Ok(Vec::new())
    }
}

pub struct Harness {
    pub db: Database,
    pub cats: CatService,
    pub missions: MissionService,
    pub targets: TargetService,
    _dir: Option<TempDir>,
}

impl Harness {
    pub fn in_memory() -> Self {
        Self::build(
            Database::open_in_memory().unwrap(),
            None,
            static_breeds(),
            TimeoutPolicy::default(),
        )
    }

    /// File database with a multi-connection pool, for concurrency tests.
    pub fn on_disk(pool_size: usize) -> Self {
        let dir = tempfile::tempdir().unwrap();
        let db = Database::open(dir.path().join("spycat.db"), pool_size).unwrap();
        Self::build(db, Some(dir), static_breeds(), TimeoutPolicy::default())
    }

    pub fn with_breeds(breeds: Arc<dyn BreedDirectory>, policy: TimeoutPolicy) -> Self {
        Self::build(Database::open_in_memory().unwrap(), None, breeds, policy)
    }

    fn build(
        db: Database,
        dir: Option<TempDir>,
        breeds: Arc<dyn BreedDirectory>,
        policy: TimeoutPolicy,
    ) -> Self {
        Self {
            cats: CatService::new(db.clone(), breeds, policy),
            missions: MissionService::new(db.clone(), policy),
            targets: TargetService::new(db.clone(), policy),
            db,
            _dir: dir,
        }
    }

    pub async fn cat(&self, name: &str) -> i64 {
        self.cats
            .create_cat(&ctx(), new_cat(name))
            .await
            .unwrap()
            .id
    }

    pub async fn mission(&self, target_count: usize) -> i64 {
        let targets = (0..target_count)
            .map(|index| target(&format!("target-{index}")))
            .collect();
        self.missions
            .create_mission(&ctx(), targets)
            .await
            .unwrap()
            .id
    }
}

pub fn static_breeds() -> Arc<dyn BreedDirectory> {
    Arc::new(StaticBreeds {
        calls: AtomicUsize::new(0),
    })
}

pub fn ctx() -> CallContext {
    CallContext::new("test")
}

pub fn new_cat(name: &str) -> NewCat {
    NewCat {
        name: name.to_string(),
        breed: "Bengal".to_string(),
        years_of_experience: 4,
        salary: 1_000,
    }
}

pub fn target(name: &str) -> NewTarget {
    NewTarget::new(name, "Portugal", "")
}
