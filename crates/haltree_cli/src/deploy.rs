//! The deployment API served by the `haltree` binary.
//!
//! Pools group apps, and apps carry a history of versions. The tree is
//!
//! ```text
//! /                         Root
//! /pools                    Pools, embedded in the root
//! /pools/{pool}             Pool
//! /pools/{pool}/apps        Apps, embedded in each pool
//! /pools/{pool}/apps/{app}  App
//! /pools/{pool}/apps/{app}/versions/{version}
//! ```
//!
//! State is held in memory for the life of the process.

use std::collections::BTreeMap;
use std::sync::LazyLock;

use haltree_base::{HaltreeError, HaltreeResult};
use haltree_engine::{Entity, Parent, TypeBuilder, TypeRef};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

const GREETING: &str = "Deployment API; PUT a pool, then its apps and their versions";

#[derive(Debug, Default)]
struct State {
    pools: BTreeMap<String, Pool>,
    apps: BTreeMap<String, BTreeMap<String, App>>,
    versions: BTreeMap<(String, String), BTreeMap<String, Version>>,
}

static STATE: LazyLock<RwLock<State>> = LazyLock::new(|| RwLock::new(State::default()));

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub hello: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pools: Option<Pools>,
}

impl Root {
    fn manifest(&mut self) -> HaltreeResult<()> {
        self.hello = GREETING.to_string();
        Ok(())
    }
}

impl Entity for Root {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.field("hello", TypeRef::scalar::<String>(), "")
            .field("pools", TypeRef::optional::<Pools>(), "embed()")
            .manifest(Root::manifest);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pools(pub BTreeMap<String, Pool>);

impl Pools {
    fn page(&mut self) -> HaltreeResult<Vec<String>> {
        self.0 = STATE.read().pools.clone();
        Ok(self.0.keys().cloned().collect())
    }
}

impl Entity for Pools {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.keyed_collection::<String, Pool>().page(Pools::page);
    }
}

/// Free-form labels attached to pools, apps and versions.
pub type Tags = Vec<String>;

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Pool {
    pub name: String,
    pub marathon_host: String,
    pub env: BTreeMap<String, String>,
    pub tags: Tags,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps: Option<Apps>,
}

impl Pool {
    fn manifest(&mut self, pools: Parent<Pools>, name: String) -> HaltreeResult<()> {
        if let Some(pool) = (*pools).0.get(&name) {
            *self = pool.clone();
        }
        Ok(())
    }

    fn write(&mut self, _pools: Parent<Pools>, name: String) -> HaltreeResult<()> {
        let mut state = STATE.write();
        if state.pools.contains_key(&name) {
            return Err(Box::new(HaltreeError::conflict(format!(
                "Pool {} already exists.",
                name
            ))));
        }
        self.name = name.clone();
        self.apps = None;
        debug!(pool = %name, "created pool");
        state.apps.entry(name.clone()).or_default();
        state.pools.insert(name, self.clone());
        Ok(())
    }
}

impl Entity for Pool {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.field("apps", TypeRef::optional::<Apps>(), "embed()")
            .manifest(Pool::manifest)
            .write(Pool::write);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Apps {
    #[serde(skip)]
    pub pool: String,
    pub items: BTreeMap<String, App>,
}

impl Apps {
    fn page(&mut self, _page: i64, pool: Parent<Pool>) -> HaltreeResult<Vec<String>> {
        self.pool = pool.name.clone();
        self.items = STATE
            .read()
            .apps
            .get(&pool.name)
            .cloned()
            .unwrap_or_default();
        Ok(self.items.keys().cloned().collect())
    }
}

impl Entity for Apps {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.keyed_collection::<String, App>().page(Apps::page);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct App {
    pub name: String,
    pub tags: Tags,
    #[serde(skip)]
    pub pool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<Versions>,
}

impl App {
    fn manifest(&mut self, apps: Parent<Apps>, name: String) -> HaltreeResult<()> {
        if let Some(app) = apps.items.get(&name) {
            *self = app.clone();
            self.pool = apps.pool.clone();
        }
        Ok(())
    }

    /// Create or replace an app. Its versions are kept.
    fn write(&mut self, apps: Parent<Apps>, name: String) -> HaltreeResult<()> {
        self.name = name.clone();
        self.pool = apps.pool.clone();
        self.versions = None;
        debug!(pool = %apps.pool, app = %name, "stored app");
        STATE
            .write()
            .apps
            .entry(apps.pool.clone())
            .or_default()
            .insert(name, self.clone());
        Ok(())
    }
}

impl Entity for App {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.field("versions", TypeRef::optional::<Versions>(), "link()")
            .manifest(App::manifest)
            .write(App::write);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Versions {
    #[serde(skip)]
    pub owner: (String, String),
    pub items: BTreeMap<String, Version>,
}

impl Versions {
    fn page(&mut self, _page: i64, app: Parent<App>) -> HaltreeResult<Vec<String>> {
        self.owner = (app.pool.clone(), app.name.clone());
        self.items = STATE
            .read()
            .versions
            .get(&self.owner)
            .cloned()
            .unwrap_or_default();
        Ok(self.items.keys().cloned().collect())
    }
}

impl Entity for Versions {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.keyed_collection::<String, Version>().page(Versions::page);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Version {
    pub app_name: String,
    pub version: String,
    #[serde(rename = "artifactURLs")]
    pub artifact_urls: Vec<String>,
    pub command: String,
    #[serde(rename = "healthURI")]
    pub health_uri: String,
    pub min_instances: u32,
    pub max_instances: u32,
    pub requirements: Requirements,
    pub tags: Tags,
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Requirements {
    pub ports: u32,
    pub specific_ports: Vec<u16>,
    #[serde(rename = "cpu")]
    pub cpu: f64,
    #[serde(rename = "memoryMB")]
    pub memory_mb: u64,
    #[serde(rename = "diskMB")]
    pub disk_mb: u64,
}

impl Version {
    fn manifest(&mut self, versions: Parent<Versions>, id: String) -> HaltreeResult<()> {
        if let Some(version) = versions.items.get(&id) {
            *self = version.clone();
        }
        Ok(())
    }

    /// Versions are immutable once written.
    fn write(&mut self, versions: Parent<Versions>, id: String) -> HaltreeResult<()> {
        let mut state = STATE.write();
        let existing = state.versions.entry(versions.owner.clone()).or_default();
        if existing.contains_key(&id) {
            return Err(Box::new(HaltreeError::conflict(format!(
                "{} already exists.",
                id
            ))));
        }
        self.app_name = versions.owner.1.clone();
        self.version = id.clone();
        debug!(app = %self.app_name, version = %id, "stored version");
        existing.insert(id, self.clone());
        Ok(())
    }
}

impl Entity for Version {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.manifest(Version::manifest).write(Version::write);
    }
}

/// Load a small sample deployment so the API has something to show.
pub fn seed() {
    let mut state = STATE.write();
    let pool = Pool {
        name: "ci".to_string(),
        marathon_host: "marathon.ci.local".to_string(),
        env: BTreeMap::from([("STAGE".to_string(), "ci".to_string())]),
        ..Pool::default()
    };
    state.pools.insert(pool.name.clone(), pool);
    let app = App {
        name: "web".to_string(),
        pool: "ci".to_string(),
        ..App::default()
    };
    state
        .apps
        .entry("ci".to_string())
        .or_default()
        .insert(app.name.clone(), app);
    let version = Version {
        app_name: "web".to_string(),
        version: "1.0.0".to_string(),
        command: "./web --port $PORT0".to_string(),
        health_uri: "/health".to_string(),
        min_instances: 1,
        max_instances: 3,
        requirements: Requirements {
            ports: 1,
            cpu: 0.5,
            memory_mb: 256,
            ..Requirements::default()
        },
        ..Version::default()
    };
    state
        .versions
        .entry(("ci".to_string(), "web".to_string()))
        .or_default()
        .insert(version.version.clone(), version);
}
