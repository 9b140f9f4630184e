//! A small deployment API (pools, apps, versions) shared by the engine tests.
//!
//! State lives in thread-local storage so that tests running in parallel never see
//! each other's writes.

use std::cell::RefCell;
use std::collections::BTreeMap;

use haltree_base::{HaltreeError, HaltreeResult};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::execute::{Reply, RequestContext, respond};
use crate::ops::Parent;
use crate::schema::{Entity, Schema, TypeBuilder, TypeRef};

#[derive(Debug, Default, Clone)]
struct State {
    motd: String,
    last_page: i64,
    pools: BTreeMap<String, Pool>,
    apps: BTreeMap<String, BTreeMap<String, App>>,
    versions: BTreeMap<(String, String), BTreeMap<String, Version>>,
}

thread_local! {
    static STATE: RefCell<State> = RefCell::new(State::default());
}

fn with_state<T>(f: impl FnOnce(&mut State) -> T) -> T {
    STATE.with(|state| f(&mut state.borrow_mut()))
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Root {
    pub hello: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pools: Option<Pools>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub motd: Option<Motd>,
}

impl Root {
    fn manifest(&mut self) -> HaltreeResult<()> {
        self.hello = "world".to_string();
        Ok(())
    }
}

impl Entity for Root {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.field("hello", TypeRef::scalar::<String>(), "")
            .field("pools", TypeRef::optional::<Pools>(), "embed()")
            .field("motd", TypeRef::optional::<Motd>(), "link()")
            .manifest(Root::manifest);
    }
}

/// Message of the day. Absent (zero) until a test sets it.
#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
pub struct Motd {
    pub text: String,
}

impl Motd {
    fn manifest(&mut self) -> HaltreeResult<()> {
        self.text = with_state(|state| state.motd.clone());
        Ok(())
    }
}

impl Entity for Motd {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.manifest(Motd::manifest);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Pools(pub BTreeMap<String, Pool>);

impl Pools {
    fn page(&mut self, page: i64) -> HaltreeResult<Vec<String>> {
        self.0 = with_state(|state| {
            state.last_page = page;
            state.pools.clone()
        });
        Ok(self.0.keys().cloned().collect())
    }
}

impl Entity for Pools {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.keyed_collection::<String, Pool>().page(Pools::page);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Pool {
    pub name: String,
    pub env: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub apps: Option<Apps>,
}

impl Pool {
    fn manifest(&mut self, pools: Parent<Pools>, id: String) -> HaltreeResult<()> {
        if let Some(pool) = (*pools).0.get(&id) {
            *self = pool.clone();
        }
        Ok(())
    }

    fn write(&mut self, _pools: Parent<Pools>, id: String) -> HaltreeResult<()> {
        self.name = id.clone();
        with_state(|state| {
            if state.pools.contains_key(&id) {
                return Err(Box::new(HaltreeError::conflict(format!(
                    "Pool {} already exists.",
                    id
                ))));
            }
            state.pools.insert(id, self.clone());
            Ok(())
        })
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
        self.items = with_state(|state| state.apps.get(&pool.name).cloned().unwrap_or_default());
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
    pub image: String,
    #[serde(skip)]
    pub pool: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub versions: Option<Versions>,
}

impl App {
    fn manifest(&mut self, apps: Parent<Apps>, id: String) -> HaltreeResult<()> {
        if let Some(app) = apps.items.get(&id) {
            *self = app.clone();
            self.pool = apps.pool.clone();
        }
        Ok(())
    }

    fn write(&mut self, apps: Parent<Apps>, id: String) -> HaltreeResult<()> {
        self.name = id.clone();
        with_state(|state| {
            state
                .apps
                .entry(apps.pool.clone())
                .or_default()
                .insert(id, self.clone());
        });
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
        self.items = with_state(|state| {
            state
                .versions
                .get(&self.owner)
                .cloned()
                .unwrap_or_default()
        });
        Ok(self.items.keys().cloned().collect())
    }
}

impl Entity for Versions {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.keyed_collection::<String, Version>()
            .page(Versions::page);
    }
}

#[derive(Debug, Default, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Version {
    pub number: String,
    pub instances: u32,
}

impl Version {
    fn manifest(&mut self, versions: Parent<Versions>, id: String) -> HaltreeResult<()> {
        if let Some(version) = versions.items.get(&id) {
            *self = version.clone();
        }
        Ok(())
    }

    fn write(&mut self, versions: Parent<Versions>, id: String) -> HaltreeResult<()> {
        self.number = id.clone();
        with_state(|state| {
            let existing = state.versions.entry(versions.owner.clone()).or_default();
            if existing.contains_key(&id) {
                return Err(Box::new(HaltreeError::conflict(format!(
                    "Version {} already exists.",
                    id
                ))));
            }
            existing.insert(id, self.clone());
            Ok(())
        })
    }
}

impl Entity for Version {
    fn describe(ty: &mut TypeBuilder<Self>) {
        ty.manifest(Version::manifest).write(Version::write);
    }
}

/// Clear all state and load two pools, one app and one version.
pub fn seed() {
    with_state(|state| {
        *state = State::default();
        for (name, env) in [("p1", "prod"), ("p2", "staging")] {
            state.pools.insert(
                name.to_string(),
                Pool {
                    name: name.to_string(),
                    env: env.to_string(),
                    apps: None,
                },
            );
        }
        state.apps.entry("p1".to_string()).or_default().insert(
            "a1".to_string(),
            App {
                name: "a1".to_string(),
                image: "nginx".to_string(),
                ..App::default()
            },
        );
        state
            .versions
            .entry(("p1".to_string(), "a1".to_string()))
            .or_default()
            .insert(
                "1.0".to_string(),
                Version {
                    number: "1.0".to_string(),
                    instances: 2,
                },
            );
    });
}

pub fn set_motd(text: &str) {
    with_state(|state| state.motd = text.to_string());
}

/// Page number most recently handed to `Pools::page`.
pub fn last_pools_page() -> i64 {
    with_state(|state| state.last_page)
}

pub fn pool_names() -> Vec<String> {
    with_state(|state| state.pools.keys().cloned().collect())
}

pub fn stored_pool(name: &str) -> Option<Pool> {
    with_state(|state| state.pools.get(name).cloned())
}

pub fn schema() -> Schema {
    Schema::compile::<Root>().unwrap()
}

/// An in-memory request.
pub struct TestRequest {
    pub method: String,
    pub path: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
}

impl TestRequest {
    pub fn get(target: &str) -> Self {
        Self::new("GET", target)
    }

    pub fn put(target: &str, body: Value) -> Self {
        let mut request = Self::new("PUT", target);
        request.body = Some(body);
        request
    }

    pub fn new(method: &str, target: &str) -> Self {
        let (path, query) = target.split_once('?').unwrap_or((target, ""));
        Self {
            method: method.to_string(),
            path: path.to_string(),
            query: query
                .split('&')
                .filter_map(|pair| pair.split_once('='))
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            body: None,
        }
    }

    pub fn send(&self, schema: &Schema) -> Reply {
        respond(schema, self)
    }
}

impl RequestContext for TestRequest {
    fn path(&self) -> &str {
        &self.path
    }

    fn method(&self) -> &str {
        &self.method
    }

    fn query_param(&self, name: &str) -> Option<String> {
        self.query
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    }

    fn payload(&self) -> HaltreeResult<Option<Value>> {
        Ok(self.body.clone())
    }
}
