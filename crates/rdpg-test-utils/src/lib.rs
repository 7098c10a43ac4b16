//! Testing utilities for the RDPG smoke workspace
//!
//! In-memory stand-ins for the platform and the deployed test app, so the
//! lifecycle can run end to end without a foundation.

#![allow(missing_docs)]

use async_trait::async_trait;
use parking_lot::Mutex;
use rdpg_lifecycle::pattern::{FAILURE_MARKER, SUCCESS_MARKER};
use rdpg_lifecycle::{
    PlatformClient, PlatformCommand, PlatformError, Probe, ProbeError, ProbeRequest, SmokeConfig,
};
use regex::Regex;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

/// Misbehavior injected into the fake database
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum FaultMode {
    #[default]
    None,
    /// `DELETE` reports success but keeps the row
    IgnoreDeletes,
    /// `UPDATE` reports success but keeps the old value
    DropUpdates,
    /// `DROP SCHEMA` reports success but the schema stays in the catalog
    KeepDroppedSchemas,
    /// `DROP TABLE` reports success but the table keeps answering selects
    KeepDroppedTables,
    /// A key's first read after `UPDATE` sees the new value, later reads
    /// fall back to the value it had before
    StaleReadsAfterUpdate,
}

type Table = BTreeMap<String, i64>;

/// `(schema, table, key)`
type RowId = (String, String, String);

#[derive(Debug, Clone, Copy)]
struct StaleRow {
    previous: i64,
    fresh_read_served: bool,
}

#[derive(Debug, Clone)]
struct Database {
    schemas: BTreeMap<String, BTreeMap<String, Table>>,
    stale: BTreeMap<RowId, StaleRow>,
}

impl Default for Database {
    fn default() -> Self {
        let mut schemas = BTreeMap::new();
        schemas.insert("public".to_string(), BTreeMap::new());
        schemas.insert("bdr".to_string(), BTreeMap::new());
        Self {
            schemas,
            stale: BTreeMap::new(),
        }
    }
}

struct Grammar {
    create_schema: Regex,
    drop_schema: Regex,
    create_table: Regex,
    drop_table: Regex,
    insert: Regex,
    update: Regex,
    delete: Regex,
    select: Regex,
    catalog: Regex,
}

impl Grammar {
    fn new() -> Self {
        let re = |pattern: &str| Regex::new(&format!("(?i)^{pattern}$")).unwrap();
        Self {
            create_schema: re(r"CREATE SCHEMA (\w+)"),
            drop_schema: re(r"DROP SCHEMA (\w+)"),
            create_table: re(r"CREATE TABLE (\w+)\.(\w+) \(.*\)"),
            drop_table: re(r"DROP TABLE (\w+)\.(\w+)"),
            insert: re(r"INSERT INTO (\w+)\.(\w+) VALUES\('(\w*)', (-?\d+)\)"),
            update: re(r"UPDATE (\w+)\.(\w+) SET value=(-?\d+) WHERE key='(\w*)'"),
            delete: re(r"DELETE FROM (\w+)\.(\w+) WHERE key='(\w*)'"),
            select: re(r"SELECT \* FROM (\w+)\.(\w+)(?: WHERE key='(\w*)')?"),
            catalog: re(
                r"SELECT schema_name FROM information_schema\.schemata WHERE schema_name='(\w*)'",
            ),
        }
    }
}

#[derive(Default)]
struct AppState {
    started: bool,
    bound: Option<String>,
    databases: HashMap<String, Database>,
    fault: FaultMode,
    requests: usize,
}

/// Fake deployed test application
///
/// Serves `/ping`, `/uri`, `/timestamp` and `/exec` the way the real app
/// does: `SUCCESS`/`FAILURE` markers, and SELECT rows as a JSON array of
/// string rows with nothing at all printed for zero rows. Identifiers fold
/// to lower case. A stopped app fails at the transport level.
pub struct FakeDatabaseApp {
    grammar: Grammar,
    state: Mutex<AppState>,
}

impl FakeDatabaseApp {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            grammar: Grammar::new(),
            state: Mutex::new(AppState::default()),
        })
    }

    pub fn with_fault(fault: FaultMode) -> Arc<Self> {
        let app = Self::new();
        app.set_fault(fault);
        app
    }

    pub fn set_fault(&self, fault: FaultMode) {
        self.state.lock().fault = fault;
    }

    pub fn set_started(&self, started: bool) {
        self.state.lock().started = started;
    }

    pub fn is_started(&self) -> bool {
        self.state.lock().started
    }

    /// Attach the database of `instance`, creating it on first use
    pub fn bind(&self, instance: &str) {
        let mut state = self.state.lock();
        state.databases.entry(instance.to_string()).or_default();
        state.bound = Some(instance.to_string());
    }

    pub fn unbind(&self) {
        self.state.lock().bound = None;
    }

    /// Forget an instance's database
    pub fn destroy(&self, instance: &str) {
        let mut state = self.state.lock();
        state.databases.remove(instance);
        if state.bound.as_deref() == Some(instance) {
            state.bound = None;
        }
    }

    /// Schemas in `instance`'s database, if it exists
    pub fn schemas(&self, instance: &str) -> Option<Vec<String>> {
        let state = self.state.lock();
        state
            .databases
            .get(instance)
            .map(|db| db.schemas.keys().cloned().collect())
    }

    /// Number of requests served
    pub fn requests(&self) -> usize {
        self.state.lock().requests
    }

    /// Run a statement batch against the bound database
    ///
    /// Batches are atomic: one failing statement rolls back the whole batch.
    pub fn execute_sql(&self, sql: &str) -> String {
        let mut state = self.state.lock();
        let fault = state.fault;
        let Some(instance) = state.bound.clone() else {
            return format!("{FAILURE_MARKER}: no database bound");
        };
        let Some(db) = state.databases.get_mut(&instance) else {
            return format!("{FAILURE_MARKER}: database is gone");
        };

        let mut scratch = db.clone();
        let mut output = SUCCESS_MARKER.to_string();
        for statement in sql.split(';').map(str::trim).filter(|s| !s.is_empty()) {
            match self.apply(&mut scratch, statement, fault) {
                Ok(out) => output = out,
                Err(reason) => return format!("{FAILURE_MARKER}: {reason}"),
            }
        }
        *db = scratch;
        output
    }

    fn apply(&self, db: &mut Database, statement: &str, fault: FaultMode) -> Result<String, String> {
        let g = &self.grammar;
        let ok = || -> Result<String, String> { Ok(SUCCESS_MARKER.to_string()) };

        if let Some(c) = g.create_schema.captures(statement) {
            let name = fold(&c[1]);
            if db.schemas.contains_key(&name) {
                return Err(format!("schema \"{name}\" already exists"));
            }
            db.schemas.insert(name, BTreeMap::new());
            return ok();
        }
        if let Some(c) = g.drop_schema.captures(statement) {
            let name = fold(&c[1]);
            match db.schemas.get(&name) {
                None => return Err(format!("schema \"{name}\" does not exist")),
                Some(tables) if !tables.is_empty() => {
                    return Err(format!("cannot drop schema {name} because other objects depend on it"));
                }
                Some(_) => {}
            }
            if fault != FaultMode::KeepDroppedSchemas {
                db.schemas.remove(&name);
            }
            return ok();
        }
        if let Some(c) = g.create_table.captures(statement) {
            let (schema, table) = (fold(&c[1]), fold(&c[2]));
            let tables = db
                .schemas
                .get_mut(&schema)
                .ok_or_else(|| format!("schema \"{schema}\" does not exist"))?;
            if tables.contains_key(&table) {
                return Err(format!("relation \"{table}\" already exists"));
            }
            tables.insert(table, Table::new());
            return ok();
        }
        if let Some(c) = g.drop_table.captures(statement) {
            let (schema, table) = (fold(&c[1]), fold(&c[2]));
            if fault == FaultMode::KeepDroppedTables {
                table_mut(db, &schema, &table)?;
                return ok();
            }
            db.schemas
                .get_mut(&schema)
                .and_then(|tables| tables.remove(&table))
                .ok_or_else(|| missing_relation(&schema, &table))?;
            db.stale.retain(|(s, t, _), _| *s != schema || *t != table);
            return ok();
        }
        if let Some(c) = g.insert.captures(statement) {
            let rows = table_mut(db, &c[1], &c[2])?;
            let key = c[3].to_string();
            let value = parse_value(&c[4])?;
            if rows.contains_key(&key) {
                return Err(format!("duplicate key value violates unique constraint: {key}"));
            }
            rows.insert(key, value);
            return ok();
        }
        if let Some(c) = g.update.captures(statement) {
            let value = parse_value(&c[3])?;
            let rows = table_mut(db, &c[1], &c[2])?;
            if fault == FaultMode::DropUpdates {
                return ok();
            }
            let previous = rows.get_mut(&c[4]).map(|slot| std::mem::replace(slot, value));
            if let (Some(previous), FaultMode::StaleReadsAfterUpdate) = (previous, fault) {
                let stale = StaleRow {
                    previous,
                    fresh_read_served: false,
                };
                db.stale.insert(row_id(&c[1], &c[2], &c[4]), stale);
            }
            return ok();
        }
        if let Some(c) = g.delete.captures(statement) {
            let rows = table_mut(db, &c[1], &c[2])?;
            if fault != FaultMode::IgnoreDeletes {
                rows.remove(&c[3]);
            }
            return ok();
        }
        if let Some(c) = g.select.captures(statement) {
            let stale = match c.get(3) {
                Some(key) => db
                    .stale
                    .get_mut(&row_id(&c[1], &c[2], key.as_str()))
                    .and_then(|row| {
                        let served = std::mem::replace(&mut row.fresh_read_served, true);
                        served.then_some(row.previous)
                    }),
                None => None,
            };
            let rows = table_mut(db, &c[1], &c[2])?;
            let selected: Vec<Vec<String>> = rows
                .iter()
                .filter(|(key, _)| c.get(3).map_or(true, |want| want.as_str() == key.as_str()))
                .map(|(key, value)| vec![key.clone(), stale.unwrap_or(*value).to_string()])
                .collect();
            return Ok(render_rows(&selected));
        }
        if let Some(c) = g.catalog.captures(statement) {
            let name = &c[1];
            let selected: Vec<Vec<String>> = db
                .schemas
                .keys()
                .filter(|schema| schema.as_str() == name)
                .map(|schema| vec![schema.clone()])
                .collect();
            return Ok(render_rows(&selected));
        }

        Err(format!("syntax error at or near \"{statement}\""))
    }
}

#[async_trait]
impl Probe for FakeDatabaseApp {
    async fn send(&self, request: &ProbeRequest) -> Result<String, ProbeError> {
        let (started, bound) = {
            let mut state = self.state.lock();
            state.requests += 1;
            (state.started, state.bound.clone())
        };
        if !started {
            return Err(ProbeError::Transport("connection refused".to_string()));
        }

        let path = request.url.rsplit('/').next().unwrap_or_default();
        let body = match (path, bound) {
            ("ping", _) => SUCCESS_MARKER.to_string(),
            ("uri", Some(instance)) => {
                format!("{SUCCESS_MARKER} postgres://smoke@fake-db:7432/{instance}")
            }
            ("timestamp", Some(_)) => format!("{SUCCESS_MARKER} 2026-01-01 00:00:00+00"),
            ("exec", _) => match request.field("sql") {
                Some(sql) => self.execute_sql(sql),
                None => format!("{FAILURE_MARKER}: missing sql parameter"),
            },
            (_, None) => format!("{FAILURE_MARKER}: no database bound"),
            _ => "404 page not found".to_string(),
        };
        Ok(body)
    }
}

fn fold(identifier: &str) -> String {
    identifier.to_ascii_lowercase()
}

fn row_id(schema: &str, table: &str, key: &str) -> RowId {
    (fold(schema), fold(table), key.to_string())
}

fn missing_relation(schema: &str, table: &str) -> String {
    format!("relation \"{schema}.{table}\" does not exist")
}

fn table_mut<'a>(db: &'a mut Database, schema: &str, table: &str) -> Result<&'a mut Table, String> {
    let (schema, table) = (fold(schema), fold(table));
    db.schemas
        .get_mut(&schema)
        .and_then(|tables| tables.get_mut(&table))
        .ok_or_else(|| missing_relation(&schema, &table))
}

fn parse_value(raw: &str) -> Result<i64, String> {
    raw.parse()
        .map_err(|_| format!("invalid input syntax for type integer: \"{raw}\""))
}

fn render_rows(rows: &[Vec<String>]) -> String {
    if rows.is_empty() {
        String::new()
    } else {
        serde_json::to_string(rows).unwrap()
    }
}

type FailurePredicate = Box<dyn Fn(&PlatformCommand) -> bool + Send + Sync>;

#[derive(Default)]
struct PlatformState {
    commands: Vec<PlatformCommand>,
    apps: HashSet<String>,
    instances: HashSet<String>,
    bindings: HashSet<(String, String)>,
    failures: Vec<FailurePredicate>,
}

/// Fake platform client
///
/// Tracks apps, instances and bindings, and drives a [`FakeDatabaseApp`]
/// the way pushes and bindings would. Commands that make no sense in the
/// current state exit with 1, as the CLI would.
pub struct FakePlatform {
    app: Arc<FakeDatabaseApp>,
    state: Mutex<PlatformState>,
}

impl FakePlatform {
    pub fn new(app: Arc<FakeDatabaseApp>) -> Arc<Self> {
        Arc::new(Self {
            app,
            state: Mutex::new(PlatformState::default()),
        })
    }

    /// Exit with 1 for every command matching `predicate`
    pub fn fail_when(&self, predicate: impl Fn(&PlatformCommand) -> bool + Send + Sync + 'static) {
        self.state.lock().failures.push(Box::new(predicate));
    }

    /// Reject instance creation for `plan`
    pub fn fail_plan(&self, plan: &str) {
        let plan = plan.to_string();
        self.fail_when(move |command| {
            matches!(command, PlatformCommand::CreateService { plan: p, .. } if *p == plan)
        });
    }

    /// Every command received, in order
    pub fn commands(&self) -> Vec<PlatformCommand> {
        self.state.lock().commands.clone()
    }

    /// Number of commands matching `predicate`
    pub fn count(&self, predicate: impl Fn(&PlatformCommand) -> bool) -> usize {
        self.state.lock().commands.iter().filter(|c| predicate(*c)).count()
    }

    pub fn live_instances(&self) -> usize {
        self.state.lock().instances.len()
    }

    pub fn live_bindings(&self) -> usize {
        self.state.lock().bindings.len()
    }

    pub fn live_apps(&self) -> usize {
        self.state.lock().apps.len()
    }

    fn apply(&self, state: &mut PlatformState, command: &PlatformCommand) -> bool {
        match command {
            PlatformCommand::Api { .. }
            | PlatformCommand::Auth { .. }
            | PlatformCommand::CreateOrg { .. }
            | PlatformCommand::CreateSpace { .. }
            | PlatformCommand::Target { .. }
            | PlatformCommand::DeleteOrg { .. } => true,
            PlatformCommand::Push { app, options } => {
                state.apps.insert(app.clone());
                self.app.set_started(!options.no_start);
                true
            }
            PlatformCommand::CreateService { instance, .. } => state.instances.insert(instance.clone()),
            PlatformCommand::BindService { app, instance } => {
                if !state.apps.contains(app) || !state.instances.contains(instance) {
                    return false;
                }
                self.app.bind(instance);
                state.bindings.insert((app.clone(), instance.clone()))
            }
            PlatformCommand::UnbindService { app, instance } => {
                let removed = state.bindings.remove(&(app.clone(), instance.clone()));
                if removed {
                    self.app.unbind();
                }
                removed
            }
            PlatformCommand::DeleteService { instance, .. } => {
                if state.bindings.iter().any(|(_, bound)| bound == instance) {
                    return false;
                }
                let removed = state.instances.remove(instance);
                if removed {
                    self.app.destroy(instance);
                }
                removed
            }
            PlatformCommand::DeleteApp { app, .. } => {
                state.bindings.retain(|(bound_app, _)| bound_app != app);
                self.app.unbind();
                self.app.set_started(false);
                state.apps.remove(app)
            }
        }
    }
}

#[async_trait]
impl PlatformClient for FakePlatform {
    async fn execute(&self, command: &PlatformCommand) -> Result<i32, PlatformError> {
        let mut state = self.state.lock();
        state.commands.push(command.clone());
        if state.failures.iter().any(|fails| fails(command)) {
            return Ok(1);
        }
        let applied = self.apply(&mut state, command);
        Ok(if applied { 0 } else { 1 })
    }
}

/// Config with short timeouts for paused-clock tests
pub fn fast_config(plans: &[&str]) -> SmokeConfig {
    SmokeConfig {
        apps_domain: "apps.example.com".to_string(),
        service_name: "rdpg".to_string(),
        plan_names: plans.iter().map(|p| (*p).to_string()).collect(),
        timeout_scale: 1.0,
        base_timeout_secs: 2,
        poll_interval_ms: 100,
        num_insertions: 4,
        seed: Some(7),
        ..SmokeConfig::default()
    }
}

/// Fake app and platform wired together
pub fn fake_foundation() -> (Arc<FakeDatabaseApp>, Arc<FakePlatform>) {
    let app = FakeDatabaseApp::new();
    let platform = FakePlatform::new(Arc::clone(&app));
    (app, platform)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bound_app() -> Arc<FakeDatabaseApp> {
        let app = FakeDatabaseApp::new();
        app.bind("inst");
        app.set_started(true);
        app
    }

    #[test]
    fn select_prints_nothing_for_zero_rows() {
        let app = bound_app();
        assert_eq!(
            app.execute_sql("CREATE TABLE public.Things (key varchar(255) PRIMARY KEY, value int);"),
            "SUCCESS"
        );
        assert_eq!(app.execute_sql("SELECT * FROM public.things;"), "");

        app.execute_sql("INSERT INTO public.things VALUES('k1', 0); INSERT INTO public.things VALUES('k2', 1);");
        assert_eq!(
            app.execute_sql("SELECT * FROM public.THINGS WHERE key='k2';"),
            r#"[["k2","1"]]"#
        );
    }

    #[test]
    fn failed_batch_rolls_back() {
        let app = bound_app();
        app.execute_sql("CREATE TABLE public.t (key varchar(255) PRIMARY KEY, value int);");
        let out = app.execute_sql("INSERT INTO public.t VALUES('a', 0); INSERT INTO public.t VALUES('a', 1);");
        assert!(out.starts_with("FAILURE"));
        assert_eq!(app.execute_sql("SELECT * FROM public.t;"), "");
    }

    #[test]
    fn dropped_table_reports_failure() {
        let app = bound_app();
        app.execute_sql("CREATE TABLE public.t (key varchar(255) PRIMARY KEY, value int);");
        assert_eq!(app.execute_sql("DROP TABLE public.t;"), "SUCCESS");
        assert!(app.execute_sql("SELECT * FROM public.t;").starts_with("FAILURE"));
    }

    #[test]
    fn stale_reads_return_the_old_value_after_one_fresh_read() {
        let app = bound_app();
        app.set_fault(FaultMode::StaleReadsAfterUpdate);
        app.execute_sql("CREATE TABLE public.t (key varchar(255) PRIMARY KEY, value int);");
        app.execute_sql("INSERT INTO public.t VALUES('a', 0);");
        assert_eq!(app.execute_sql("UPDATE public.t SET value=1 WHERE key='a';"), "SUCCESS");

        assert_eq!(app.execute_sql("SELECT * FROM public.t WHERE key='a';"), r#"[["a","1"]]"#);
        assert_eq!(app.execute_sql("SELECT * FROM public.t WHERE key='a';"), r#"[["a","0"]]"#);
        assert_eq!(app.execute_sql("SELECT * FROM public.t;"), r#"[["a","1"]]"#);
    }

    #[test]
    fn kept_table_still_answers_after_drop() {
        let app = bound_app();
        app.set_fault(FaultMode::KeepDroppedTables);
        app.execute_sql("CREATE TABLE public.t (key varchar(255) PRIMARY KEY, value int);");
        assert_eq!(app.execute_sql("DROP TABLE public.t;"), "SUCCESS");
        assert_eq!(app.execute_sql("SELECT * FROM public.t;"), "");
        assert!(app.execute_sql("DROP TABLE public.missing;").starts_with("FAILURE"));
    }

    #[test]
    fn schemas_fold_case_in_the_catalog() {
        let app = bound_app();
        assert_eq!(app.execute_sql("CREATE SCHEMA MixedCase;"), "SUCCESS");
        assert_eq!(
            app.execute_sql(
                "SELECT schema_name FROM information_schema.schemata WHERE schema_name='mixedcase';"
            ),
            r#"[["mixedcase"]]"#
        );
        app.execute_sql("DROP SCHEMA MixedCase;");
        assert_eq!(
            app.execute_sql(
                "SELECT schema_name FROM information_schema.schemata WHERE schema_name='mixedcase';"
            ),
            ""
        );
    }

    #[tokio::test]
    async fn stopped_app_fails_at_transport() {
        let app = FakeDatabaseApp::new();
        let err = app
            .send(&ProbeRequest::get("https://a.example.com/ping"))
            .await
            .unwrap_err();
        assert!(matches!(err, ProbeError::Transport(_)));
    }

    #[tokio::test]
    async fn platform_refuses_to_destroy_bound_instance() {
        let (_app, platform) = fake_foundation();
        let push = PlatformCommand::Push {
            app: "a".to_string(),
            options: rdpg_lifecycle::PushOptions {
                memory: "256M".to_string(),
                path: "assets/postgres-test-app".into(),
                stack: None,
                no_start: true,
            },
        };
        let create = PlatformCommand::CreateService {
            service: "rdpg".to_string(),
            plan: "shared".to_string(),
            instance: "i".to_string(),
        };
        let bind = PlatformCommand::BindService {
            app: "a".to_string(),
            instance: "i".to_string(),
        };
        let delete = PlatformCommand::DeleteService {
            instance: "i".to_string(),
            force: true,
        };

        assert_eq!(platform.execute(&push).await.unwrap(), 0);
        assert_eq!(platform.execute(&create).await.unwrap(), 0);
        assert_eq!(platform.execute(&bind).await.unwrap(), 0);
        assert_eq!(platform.execute(&delete).await.unwrap(), 1);
        assert_eq!(platform.live_instances(), 1);
    }
}
