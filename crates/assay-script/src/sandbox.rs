//! SandboxRuntime - one isolated engine that runs one script at a time

use crate::cache::ScriptCache;
use crate::convert::{from_dynamic, to_dynamic};
use crate::error::{Error, Result};
use crate::limits::SandboxLimits;
use crate::macros::{self, MacroSnapshot, SnapshotSlot};
use assay_core::{script_name, IndexMap, Value};
use rhai::module_resolvers::DummyModuleResolver;
use rhai::{Dynamic, Engine, EvalAltResult, Position, Scope};
use std::cell::{Cell, RefCell};
use std::panic::{self, AssertUnwindSafe};
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How many engine operations pass between deadline checks
const DEADLINE_CHECK_INTERVAL: u64 = 256;

/// Lifecycle state of a runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeState {
    Idle,
    Executing,
    /// The engine panicked; every later run fails with `Faulted`
    Faulted,
}

/// An isolated script runtime
///
/// Not `Send`: a runtime is created on, and stays on, its worker thread.
pub struct SandboxRuntime {
    engine: Engine,
    cache: ScriptCache,
    snapshot: SnapshotSlot,
    deadline: Rc<Cell<Option<Instant>>>,
    limits: SandboxLimits,
    state: RuntimeState,
    runs: u64,
}

impl SandboxRuntime {
    /// Create a runtime with the given limits
    pub fn new(limits: SandboxLimits) -> Self {
        let snapshot: SnapshotSlot = Rc::new(RefCell::new(None));
        let deadline: Rc<Cell<Option<Instant>>> = Rc::new(Cell::new(None));

        let mut engine = Engine::new();
        limits.apply(&mut engine);
        engine.set_module_resolver(DummyModuleResolver::new());
        engine.disable_symbol("eval");
        engine.on_print(|text| info!(target: "assay::script", "{}", text));
        engine.on_debug(|text, source, pos| {
            debug!(target: "assay::script", source = source.unwrap_or(""), %pos, "{}", text)
        });

        let clock = Rc::clone(&deadline);
        engine.on_progress(move |ops| {
            if ops % DEADLINE_CHECK_INTERVAL != 0 {
                return None;
            }
            match clock.get() {
                Some(deadline) if Instant::now() >= deadline => Some(Dynamic::UNIT),
                _ => None,
            }
        });

        macros::install(&mut engine, &snapshot);

        Self {
            engine,
            cache: ScriptCache::new(),
            snapshot,
            deadline,
            limits,
            state: RuntimeState::Idle,
            runs: 0,
        }
    }

    /// Current lifecycle state
    pub fn state(&self) -> RuntimeState {
        self.state
    }

    /// Limits this runtime was built with
    pub fn limits(&self) -> SandboxLimits {
        self.limits
    }

    /// The compiled-script cache
    pub fn cache(&self) -> &ScriptCache {
        &self.cache
    }

    /// Number of runs attempted
    pub fn runs(&self) -> u64 {
        self.runs
    }

    /// The underlying engine, for registering extra host functions
    pub fn engine_mut(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Run a script
    ///
    /// Each binding becomes a variable holding a copy of its value. A `$` in
    /// a binding name is not valid in a Rhai identifier, so it is injected
    /// with every `$` replaced by `_`.
    pub fn run(
        &mut self,
        script: &str,
        bindings: &IndexMap<String, Value>,
        snapshot: Arc<MacroSnapshot>,
        timeout: Duration,
    ) -> Result<Value> {
        if self.state == RuntimeState::Faulted {
            return Err(Error::Faulted("runtime is unusable after an earlier fault".into()));
        }
        self.runs += 1;
        self.state = RuntimeState::Executing;

        *self.snapshot.borrow_mut() = Some(snapshot);
        self.deadline.set(Some(Instant::now() + timeout));

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| self.execute(script, bindings)));

        self.deadline.set(None);
        self.snapshot.borrow_mut().take();

        match outcome {
            Ok(result) => {
                self.state = RuntimeState::Idle;
                result.map_err(|err| classify(*err, timeout))
            }
            Err(payload) => {
                self.state = RuntimeState::Faulted;
                let message = panic_message(payload.as_ref());
                warn!(error = %message, "sandbox runtime faulted");
                Err(Error::Faulted(message))
            }
        }
    }

    fn execute(
        &mut self,
        script: &str,
        bindings: &IndexMap<String, Value>,
    ) -> std::result::Result<Value, Box<EvalAltResult>> {
        let ast = self.cache.get_or_compile(&self.engine, script)?;
        self.limits
            .check_functions(&ast)
            .map_err(|detail| EvalAltResult::ErrorDataTooLarge(detail, Position::NONE))?;

        let mut scope = Scope::new();
        for (name, value) in bindings {
            scope.push_dynamic(script_name(name), to_dynamic(value));
        }

        let returned = self.engine.eval_ast_with_scope::<Dynamic>(&mut scope, &ast)?;
        Ok(from_dynamic(returned))
    }
}

impl Default for SandboxRuntime {
    fn default() -> Self {
        Self::new(SandboxLimits::default())
    }
}

impl std::fmt::Debug for SandboxRuntime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SandboxRuntime")
            .field("state", &self.state)
            .field("runs", &self.runs)
            .field("limits", &self.limits)
            .finish()
    }
}

/// Map an engine error onto the sandbox taxonomy
fn classify(err: EvalAltResult, timeout: Duration) -> Error {
    match err {
        EvalAltResult::ErrorTerminated(..) => Error::Timeout(timeout.as_millis() as u64),
        EvalAltResult::ErrorDataTooLarge(what, _) => Error::MemoryLimitExceeded(what),
        EvalAltResult::ErrorStackOverflow(_) => {
            Error::MemoryLimitExceeded("call stack too deep".into())
        }
        EvalAltResult::ErrorTooManyVariables(_) => {
            Error::MemoryLimitExceeded("too many variables".into())
        }
        EvalAltResult::ErrorInFunctionCall(_, _, inner, _) => classify(*inner, timeout),
        EvalAltResult::ErrorRuntime(thrown, _) => Error::ScriptError(thrown.to_string()),
        other => Error::ScriptError(other.to_string()),
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "engine panicked".to_string()
    }
}
