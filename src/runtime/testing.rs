// src/runtime/testing.rs
//! In-process fake of the module-host capability
//!
//! Exercises the pool/session/replication logic without a real embedded
//! image: each materialized "module" carries its own fresh state, so
//! instance isolation, per-instance materialization caches, and the
//! teardown order are all observable from tests. The fake speaks a tiny
//! line-oriented language (`name = literal`, `import module`, and
//! single-expression `def` bodies), which is as much interpreter as the
//! engine's contracts need.

use crate::loader::host::{EmbeddedModule, ModuleHost};
use crate::loader::images::{EmbeddedImage, ImageSet};
use crate::runtime::backend::{
    FindModuleHook, InterpreterBackend, Obj, SessionBackend, Value,
};
use crate::runtime::interpreter::InterpreterConfig;
use crate::runtime::manager::InterpreterManager;
use crate::utils::errors::{EngineError, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

const FAKE_IMAGE: &[u8] = b"\x7fELF fake interpreter image";

pub(crate) type EventLog = Arc<Mutex<Vec<String>>>;

/// Route engine tracing into the test harness output; honors RUST_LOG.
fn init_test_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Build a pool backed by the fake host.
pub(crate) fn fake_manager(n: usize) -> Arc<InterpreterManager> {
    init_test_logging();
    InterpreterManager::with_config(n, FakeHost::config_with(FakeHost::new()))
        .expect("fake pool construction")
}

/// Build a pool backed by the fake host, keeping the shared event log.
pub(crate) fn fake_manager_with_events(n: usize) -> (Arc<InterpreterManager>, EventLog) {
    init_test_logging();
    let host = FakeHost::new();
    let events = host.events();
    let manager = InterpreterManager::with_config(n, FakeHost::config_with(host))
        .expect("fake pool construction");
    (manager, events)
}

/// Fake [`ModuleHost`]: every materialized image gets isolated state.
pub(crate) struct FakeHost {
    events: EventLog,
    created: AtomicUsize,
    fail_after: Option<usize>,
}

impl FakeHost {
    pub(crate) fn new() -> Self {
        Self {
            events: Arc::new(Mutex::new(Vec::new())),
            created: AtomicUsize::new(0),
            fail_after: None,
        }
    }

    /// Host that fails once `limit` modules have been materialized, for
    /// aborted-construction tests.
    pub(crate) fn failing_after(limit: usize) -> Self {
        Self {
            fail_after: Some(limit),
            ..Self::new()
        }
    }

    pub(crate) fn events(&self) -> EventLog {
        Arc::clone(&self.events)
    }

    pub(crate) fn config_with(host: FakeHost) -> InterpreterConfig {
        InterpreterConfig {
            images: ImageSet {
                cpu: Some(EmbeddedImage::new(FAKE_IMAGE).expect("fake image")),
                accel: None,
            },
            host: Arc::new(host),
        }
    }
}

impl ModuleHost for FakeHost {
    fn materialize_image(&self, image: &[u8]) -> Result<Box<dyn EmbeddedModule>> {
        if image.is_empty() {
            return Err(EngineError::LoadFailed("empty image".to_string()));
        }
        let instance = self.created.fetch_add(1, Ordering::SeqCst);
        if let Some(limit) = self.fail_after {
            if instance >= limit {
                return Err(EngineError::LoadFailed(format!(
                    "synthetic load failure for instance {}",
                    instance
                )));
            }
        }
        self.events.lock().push("image-materialized".to_string());
        Ok(Box::new(FakeModule {
            state: Arc::new(FakeState::new(instance, Arc::clone(&self.events))),
        }))
    }
}

struct FakeModule {
    state: Arc<FakeState>,
}

impl EmbeddedModule for FakeModule {
    fn register_self(&self) -> Result<()> {
        self.state.events.lock().push("self-registered".to_string());
        Ok(())
    }

    fn new_backend(&self) -> Result<Box<dyn InterpreterBackend>> {
        self.state.events.lock().push("backend-created".to_string());
        Ok(Box::new(FakeBackend {
            state: Arc::clone(&self.state),
        }))
    }
}

impl Drop for FakeModule {
    fn drop(&mut self) {
        self.state.events.lock().push("module-unloaded".to_string());
    }
}

/// Values living inside a fake instance. `Func` exists so callables can
/// be defined, reflected over, and pickled like everything else.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
enum FakeValue {
    Host(Value),
    Func { params: Vec<String>, body: String },
}

/// The isolated global state of one fake instance.
struct FakeState {
    instance: usize,
    events: EventLog,
    modules: Mutex<HashMap<String, HashMap<String, FakeValue>>>,
    objects: Mutex<HashMap<u64, FakeValue>>,
    next_obj: AtomicU64,
    arena: Mutex<HashMap<u64, Obj>>,
    find_module: Mutex<Option<FindModuleHook>>,
}

impl FakeState {
    fn new(instance: usize, events: EventLog) -> Self {
        let mut modules = HashMap::new();
        modules.insert("__main__".to_string(), HashMap::new());
        Self {
            instance,
            events,
            modules: Mutex::new(modules),
            objects: Mutex::new(HashMap::new()),
            next_obj: AtomicU64::new(1),
            arena: Mutex::new(HashMap::new()),
            find_module: Mutex::new(None),
        }
    }

    fn alloc(&self, value: FakeValue) -> Obj {
        let id = self.next_obj.fetch_add(1, Ordering::SeqCst);
        self.objects.lock().insert(id, value);
        Obj(id)
    }

    fn value_of(&self, obj: Obj) -> Result<FakeValue> {
        self.objects
            .lock()
            .get(&obj.0)
            .cloned()
            .ok_or_else(|| EngineError::Backend(format!("dangling object handle {}", obj.0)))
    }

    fn load_module(&self, name: &str) -> Result<()> {
        if self.modules.lock().contains_key(name) {
            return Ok(());
        }
        let source = {
            let hook = self.find_module.lock();
            hook.as_ref().and_then(|hook| hook(name))
        };
        let source =
            source.ok_or_else(|| EngineError::Backend(format!("module '{}' not found", name)))?;
        let parsed = parse_module(&source)?;
        self.modules.lock().insert(name.to_string(), parsed);
        Ok(())
    }

    fn bump_unpickle_counter(&self) {
        let mut modules = self.modules.lock();
        let stats = modules.entry("stats".to_string()).or_default();
        let next = match stats.get("unpickles") {
            Some(FakeValue::Host(Value::Int(count))) => count + 1,
            _ => 1,
        };
        stats.insert("unpickles".to_string(), FakeValue::Host(Value::Int(next)));
    }
}

struct FakeBackend {
    state: Arc<FakeState>,
}

impl InterpreterBackend for FakeBackend {
    fn new_session(&self) -> Box<dyn SessionBackend + '_> {
        Box::new(FakeSession {
            state: Arc::clone(&self.state),
        })
    }

    fn set_find_module(&self, hook: FindModuleHook) {
        *self.state.find_module.lock() = Some(hook);
    }
}

impl Drop for FakeBackend {
    fn drop(&mut self) {
        self.state.events.lock().push("backend-dropped".to_string());
    }
}

struct FakeSession {
    state: Arc<FakeState>,
}

impl SessionBackend for FakeSession {
    fn global(&mut self, module: &str, name: &str) -> Result<Obj> {
        // Qualified lookup imports the module on demand, the way the
        // real runtime resolves module-qualified names.
        self.state.load_module(module)?;
        let value = self
            .state
            .modules
            .lock()
            .get(module)
            .and_then(|bindings| bindings.get(name))
            .cloned()
            .ok_or_else(|| {
                EngineError::Backend(format!("undefined global {}.{}", module, name))
            })?;
        Ok(self.state.alloc(value))
    }

    fn set_global(&mut self, module: &str, name: &str, value: Obj) -> Result<()> {
        let value = self.state.value_of(value)?;
        self.state
            .modules
            .lock()
            .entry(module.to_string())
            .or_default()
            .insert(name.to_string(), value);
        Ok(())
    }

    fn execute(&mut self, code: &str) -> Result<Obj> {
        for line in code.lines() {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            if let Some(module) = line.strip_prefix("import ") {
                self.state.load_module(module.trim())?;
            } else if let Some((name, literal)) = split_assignment(line) {
                let value = parse_literal(literal).ok_or_else(|| {
                    EngineError::Backend(format!("unparseable literal '{}'", literal))
                })?;
                self.state
                    .modules
                    .lock()
                    .entry("__main__".to_string())
                    .or_default()
                    .insert(name.to_string(), FakeValue::Host(value));
            } else {
                return Err(EngineError::Backend(format!(
                    "unparseable statement '{}'",
                    line
                )));
            }
        }
        Ok(self.state.alloc(FakeValue::Host(Value::Null)))
    }

    fn call(&mut self, target: Obj, args: &[Obj]) -> Result<Obj> {
        let (params, body) = match self.state.value_of(target)? {
            FakeValue::Func { params, body } => (params, body),
            other => {
                return Err(EngineError::Backend(format!(
                    "object is not callable: {:?}",
                    other
                )))
            }
        };
        if params.len() != args.len() {
            return Err(EngineError::Backend(format!(
                "expected {} arguments, got {}",
                params.len(),
                args.len()
            )));
        }

        let expr = body
            .trim()
            .strip_prefix("return ")
            .ok_or_else(|| EngineError::Backend(format!("unsupported body '{}'", body)))?
            .trim();

        let result = if let Some(inner) = expr
            .strip_prefix("__reflect_params__(")
            .and_then(|rest| rest.strip_suffix(')'))
        {
            let position = params
                .iter()
                .position(|param| param == inner.trim())
                .ok_or_else(|| {
                    EngineError::Backend(format!("unbound name '{}'", inner.trim()))
                })?;
            match self.state.value_of(args[position])? {
                FakeValue::Func { params, .. } => FakeValue::Host(Value::List(
                    params.into_iter().map(Value::Str).collect(),
                )),
                other => {
                    return Err(EngineError::Backend(format!(
                        "cannot reflect over a non-callable: {:?}",
                        other
                    )))
                }
            }
        } else if let Some(position) = params.iter().position(|param| param == expr) {
            self.state.value_of(args[position])?
        } else if let Some(value) = parse_literal(expr) {
            FakeValue::Host(value)
        } else {
            return Err(EngineError::Backend(format!(
                "unsupported expression '{}'",
                expr
            )));
        };

        Ok(self.state.alloc(result))
    }

    fn from_value(&mut self, value: &Value) -> Result<Obj> {
        Ok(self.state.alloc(FakeValue::Host(value.clone())))
    }

    fn to_value(&mut self, obj: Obj) -> Result<Value> {
        match self.state.value_of(obj)? {
            FakeValue::Host(value) => Ok(value),
            FakeValue::Func { .. } => Err(EngineError::Backend(
                "a callable cannot cross the embedding boundary by value".to_string(),
            )),
        }
    }

    fn pickle(&mut self, obj: Obj) -> Result<Vec<u8>> {
        let value = self.state.value_of(obj)?;
        serde_json::to_vec(&value)
            .map_err(|e| EngineError::Backend(format!("pickle failed: {}", e)))
    }

    fn unpickle_or_get(&mut self, object_id: u64, payload: &[u8]) -> Result<Obj> {
        if let Some(obj) = self.state.arena.lock().get(&object_id) {
            return Ok(*obj);
        }
        let value: FakeValue = serde_json::from_slice(payload)
            .map_err(|e| EngineError::Backend(format!("unpickle failed: {}", e)))?;
        let obj = self.state.alloc(value);
        self.state.arena.lock().insert(object_id, obj);
        self.state.bump_unpickle_counter();
        Ok(obj)
    }

    fn unload(&mut self, object_id: u64) -> Result<()> {
        if let Some(obj) = self.state.arena.lock().remove(&object_id) {
            self.state.objects.lock().remove(&obj.0);
        }
        self.state
            .events
            .lock()
            .push(format!("unload:{}@{}", object_id, self.state.instance));
        Ok(())
    }
}

fn split_assignment(line: &str) -> Option<(&str, &str)> {
    let (name, literal) = line.split_once('=')?;
    let name = name.trim();
    if name.is_empty() || !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name, literal.trim()))
}

fn parse_literal(text: &str) -> Option<Value> {
    let text = text.trim();
    if text == "true" {
        return Some(Value::Bool(true));
    }
    if text == "false" {
        return Some(Value::Bool(false));
    }
    if let Ok(value) = text.parse::<i64>() {
        return Some(Value::Int(value));
    }
    for quote in ['\'', '"'] {
        if text.len() >= 2 && text.starts_with(quote) && text.ends_with(quote) {
            return Some(Value::Str(text[1..text.len() - 1].to_string()));
        }
    }
    None
}

/// Parse module source: `name = literal` bindings and `def` blocks with
/// a single-expression body.
fn parse_module(source: &str) -> Result<HashMap<String, FakeValue>> {
    let mut bindings = HashMap::new();
    let lines: Vec<&str> = source.lines().collect();
    let mut index = 0;

    while index < lines.len() {
        let line = lines[index].trim();
        index += 1;
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if let Some(rest) = line.strip_prefix("def ") {
            let (name, params) = rest
                .strip_suffix(':')
                .and_then(|signature| signature.split_once('('))
                .and_then(|(name, params)| {
                    params.strip_suffix(')').map(|params| (name.trim(), params))
                })
                .ok_or_else(|| {
                    EngineError::Backend(format!("unparseable definition '{}'", line))
                })?;
            let params: Vec<String> = params
                .split(',')
                .map(|param| param.trim().to_string())
                .filter(|param| !param.is_empty())
                .collect();
            let body = lines
                .get(index)
                .map(|body| body.trim().to_string())
                .filter(|body| !body.is_empty())
                .ok_or_else(|| {
                    EngineError::Backend(format!("definition '{}' has no body", name))
                })?;
            index += 1;
            bindings.insert(name.to_string(), FakeValue::Func { params, body });
        } else if let Some((name, literal)) = split_assignment(line) {
            let value = parse_literal(literal).ok_or_else(|| {
                EngineError::Backend(format!("unparseable literal '{}'", literal))
            })?;
            bindings.insert(name.to_string(), FakeValue::Host(value));
        } else {
            return Err(EngineError::Backend(format!(
                "unparseable module line '{}'",
                line
            )));
        }
    }

    Ok(bindings)
}
