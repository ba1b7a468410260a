//! The lifecycle manager.
//!
//! A [`Session`] owns at most one engine thread. The thread creates the [`ScriptHost`] and
//! serves commands from an `mpsc` channel in order; callers that need a result block on a
//! [`Completion`]. The session itself is `Send + Sync` and cheap to clone, so the class-load
//! hook, the application threads and the work running on the engine can all hold it.
//!
//! # Execution slot
//!
//! `launch_*` and [`Session::execute`] hold a session-wide slot for their whole duration, so
//! posted work never interleaves. Calling either from the engine thread itself fails with
//! [`Error::Reentrant`]; [`Session::invoke`] and [`Session::register_script`] detect the engine
//! thread and talk to the host directly instead.
//!
//! # Registered functions
//!
//! Every registration is recorded in the session before it is sent to the engine. Each page
//! load replays the recorded functions in registration order before the boot completes, so a
//! function registered before the first launch or before a reload is always present.
//!
//! # Example
//!
//! ```rust
//! use importshim::emulator::{EmulatorConfig, HostValue, ImportAnnotation, Session};
//!
//! let session = Session::new(EmulatorConfig::testing());
//! session.register_script(ImportAnnotation::with_script("M", "add", "(a, b) => a + b").into())?;
//!
//! let sum = session.launch_content("", |host| host.invoke("M", "add", &[2.into(), 3.into()]))?;
//! assert_eq!(sum, HostValue::Int(5));
//! # Ok::<(), importshim::Error>(())
//! ```

use std::{
    any::Any,
    cell::RefCell,
    panic::{self, AssertUnwindSafe},
    path::PathBuf,
    rc::Rc,
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc::{self, Receiver, Sender},
        Arc, Mutex, TryLockError,
    },
    thread::{self, JoinHandle},
    time::Duration,
};

use crate::{
    emulator::{
        functions::FunctionSet,
        page::PageSource,
        state::{SessionState, StateCell},
        EmulatorConfig, HostValue, ImportAnnotation, ScriptHost,
    },
    utils::synchronization::{Completer, Completion},
    Error, Result,
};

static NEXT_SESSION_ID: AtomicU64 = AtomicU64::new(1);

thread_local! {
    // the session id and host served by this thread, if it is an engine thread
    static CURRENT: RefCell<Option<(u64, Rc<ScriptHost>)>> = const { RefCell::new(None) };
}

type Job = Box<dyn FnOnce(&ScriptHost) + Send>;

type Outcome<R> = std::result::Result<Result<R>, Box<dyn Any + Send>>;

enum Command {
    Load {
        page: PageSource,
        done: Completer<Result<()>>,
    },
    Register(Arc<ImportAnnotation>),
    Run(Job),
    Shutdown,
}

struct EngineThread {
    sender: Sender<Command>,
    join: JoinHandle<()>,
}

struct Shared {
    id: u64,
    config: Arc<EmulatorConfig>,
    state: StateCell,
    functions: Arc<FunctionSet>,
    engine: Mutex<Option<EngineThread>>,
    slot: Mutex<()>,
}

/// A script engine session.
#[derive(Clone)]
pub struct Session {
    shared: Arc<Shared>,
}

impl Session {
    /// Creates a session in [`SessionState::NotStarted`]; no thread is spawned yet.
    #[must_use]
    pub fn new(config: EmulatorConfig) -> Self {
        Session {
            shared: Arc::new(Shared {
                id: NEXT_SESSION_ID.fetch_add(1, Ordering::Relaxed),
                config: Arc::new(config),
                state: StateCell::new(),
                functions: Arc::new(FunctionSet::new()),
                engine: Mutex::new(None),
                slot: Mutex::new(()),
            }),
        }
    }

    /// Process-unique id of this session.
    #[must_use]
    pub fn id(&self) -> u64 {
        self.shared.id
    }

    /// The session configuration.
    #[must_use]
    pub fn config(&self) -> &EmulatorConfig {
        &self.shared.config
    }

    /// The current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.shared.state.get()
    }

    /// The registered functions in registration order.
    #[must_use]
    pub fn registered(&self) -> Vec<Arc<ImportAnnotation>> {
        self.shared.functions.snapshot()
    }

    /// Returns `true` if the calling thread is this session's engine thread.
    #[must_use]
    pub fn is_engine_thread(&self) -> bool {
        self.current_host().is_some()
    }

    /// Loads the page `content`, then runs `work` on the engine thread and returns its result.
    ///
    /// # Errors
    /// See [`Session::launch`].
    pub fn launch_content<R, F>(&self, content: impl Into<String>, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&ScriptHost) -> Result<R> + Send + 'static,
    {
        self.launch(PageSource::Content(content.into()), work)
    }

    /// Loads the page at `url` (`file://` only), then runs `work` on the engine thread.
    ///
    /// # Errors
    /// See [`Session::launch`].
    pub fn launch_url<R, F>(&self, url: impl Into<String>, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&ScriptHost) -> Result<R> + Send + 'static,
    {
        self.launch(PageSource::Url(url.into()), work)
    }

    /// Loads the page file at `path`, then runs `work` on the engine thread.
    ///
    /// # Errors
    /// See [`Session::launch`].
    pub fn launch_file<R, F>(&self, path: impl Into<PathBuf>, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&ScriptHost) -> Result<R> + Send + 'static,
    {
        self.launch(PageSource::File(path.into()), work)
    }

    /// Boots the engine with `page` (or reloads it), replays the registered functions, and runs
    /// `work` on the engine thread.
    ///
    /// # Errors
    /// - [`Error::Reentrant`] when called from the engine thread
    /// - [`Error::Boot`], [`Error::BootTimeout`], [`Error::Script`] or [`Error::NotSupported`]
    ///   if the page does not load; the session moves to [`SessionState::Error`]
    /// - whatever `work` returns, unchanged
    ///
    /// # Panics
    /// A panic inside `work` is resumed on the calling thread with its original payload.
    pub fn launch<R, F>(&self, page: PageSource, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&ScriptHost) -> Result<R> + Send + 'static,
    {
        self.reject_reentrant()?;
        let _slot = lock!(self.shared.slot);
        self.boot(page)?;
        self.run(work)
    }

    /// Runs `work` on the engine thread and blocks until it finished.
    ///
    /// If no page is loaded and auto-boot is enabled, the default page is loaded first.
    ///
    /// # Errors
    /// - [`Error::Reentrant`] when called from the engine thread
    /// - [`Error::Boot`] if no page is loaded and auto-boot is disabled, or any boot error
    /// - [`Error::ExecutionTimeout`] if the configured timeout elapsed; the work keeps running
    /// - whatever `work` returns, unchanged
    ///
    /// # Panics
    /// A panic inside `work` is resumed on the calling thread with its original payload.
    pub fn execute<R, F>(&self, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&ScriptHost) -> Result<R> + Send + 'static,
    {
        self.reject_reentrant()?;
        let _slot = lock!(self.shared.slot);
        if !self.shared.state.page_ready() {
            if !self.shared.config.auto_boot {
                return Err(Error::Boot("the session was not launched".to_string()));
            }
            self.boot(self.default_page())?;
        }
        self.run(work)
    }

    /// Records `annotation` and installs it in the engine.
    ///
    /// On the engine thread the function is installed immediately. From any other thread the
    /// installation is posted without waiting; if the session was never started and auto-boot
    /// is enabled, the default page is booted first, which blocks.
    ///
    /// # Errors
    /// Returns a boot error if the automatic boot fails, or [`Error::Script`] if a direct
    /// installation on the engine thread fails.
    pub fn register_script(&self, annotation: Arc<ImportAnnotation>) -> Result<()> {
        if self.shared.functions.insert(Arc::clone(&annotation)) {
            log::debug!("recorded {}", annotation);
        }

        if let Some(host) = self.current_host() {
            return if host.is_loaded() {
                host.register(&annotation)
            } else {
                Ok(())
            };
        }

        if self.has_engine() || !self.shared.config.auto_boot {
            return self.post_registration(annotation);
        }

        // someone else holding the slot is booting; the replay picks the function up
        let slot = match self.shared.slot.try_lock() {
            Ok(slot) => Some(slot),
            Err(TryLockError::Poisoned(poisoned)) => Some(poisoned.into_inner()),
            Err(TryLockError::WouldBlock) => None,
        };
        match slot {
            Some(_slot) if !self.shared.state.page_ready() => self.boot(self.default_page()),
            _ => self.send(Command::Register(annotation)),
        }
    }

    /// Calls `<module>.<name>(args...)`.
    ///
    /// On the engine thread the call is direct; from any other thread it runs through
    /// [`Session::execute`] and blocks the same way.
    ///
    /// # Errors
    /// See [`ScriptHost::invoke`] and [`Session::execute`].
    pub fn invoke(&self, module: &str, name: &str, args: Vec<HostValue>) -> Result<HostValue> {
        if let Some(host) = self.current_host() {
            return host.invoke(module, name, &args);
        }
        let (module, name) = (module.to_string(), name.to_string());
        self.execute(move |host| host.invoke(&module, &name, &args))
    }

    /// Moves a ready (or failed) session to [`SessionState::Hidden`]. The engine, its page and
    /// the registered functions stay; later executions run as before.
    pub fn hide(&self) {
        let hidden = self
            .shared
            .state
            .transition(&[SessionState::Ready, SessionState::Error], SessionState::Hidden);
        if !hidden {
            log::debug!("hide ignored in state {}", self.state());
        }
    }

    /// Stops the engine thread and waits for it. The registered functions are kept and replayed
    /// by the next boot.
    ///
    /// # Errors
    /// - [`Error::Reentrant`] when called from the engine thread
    /// - [`Error::Error`] if the engine thread panicked
    pub fn shutdown(&self) -> Result<()> {
        self.reject_reentrant()?;
        let _slot = lock!(self.shared.slot);

        let engine = lock!(self.shared.engine).take();
        self.shared.state.set_page_ready(false);
        if let Some(engine) = engine {
            if engine.sender.send(Command::Shutdown).is_err() {
                log::debug!("engine of session {} already gone", self.shared.id);
            }
            engine
                .join
                .join()
                .map_err(|_| Error::Error("the engine thread panicked".to_string()))?;
        }
        self.shared.state.set(SessionState::NotStarted);
        Ok(())
    }

    fn default_page(&self) -> PageSource {
        PageSource::Content(self.shared.config.default_page.clone())
    }

    fn current_host(&self) -> Option<Rc<ScriptHost>> {
        CURRENT.with(|current| match &*current.borrow() {
            Some((id, host)) if *id == self.shared.id => Some(Rc::clone(host)),
            _ => None,
        })
    }

    fn reject_reentrant(&self) -> Result<()> {
        if self.is_engine_thread() {
            return Err(Error::Reentrant);
        }
        Ok(())
    }

    fn has_engine(&self) -> bool {
        lock!(self.shared.engine).is_some()
    }

    fn post_registration(&self, annotation: Arc<ImportAnnotation>) -> Result<()> {
        if self.has_engine() {
            self.send(Command::Register(annotation))
        } else {
            Ok(())
        }
    }

    fn send(&self, command: Command) -> Result<()> {
        let mut guard = lock!(self.shared.engine);
        let engine = match &mut *guard {
            Some(engine) => engine,
            empty => empty.insert(EngineThread::spawn(&self.shared)?),
        };
        engine.sender.send(command).map_err(|_| Error::Disconnected)
    }

    /// Loads `page` on the engine; the caller holds the slot.
    fn boot(&self, page: PageSource) -> Result<()> {
        let state = &self.shared.state;
        state.set_page_ready(false);
        state.set(SessionState::Starting);

        let (completion, done) = Completion::new();
        let result = self
            .send(Command::Load { page, done })
            .and_then(|()| match completion.wait(self.shared.config.boot_timeout)? {
                Some(result) => result,
                None => Err(Error::BootTimeout(
                    self.shared.config.boot_timeout.unwrap_or(Duration::ZERO),
                )),
            });

        match result {
            Ok(()) => {
                state.set_page_ready(true);
                state.set(SessionState::Ready);
                Ok(())
            }
            Err(error) => {
                log::error!("session {} failed to boot: {}", self.shared.id, error);
                state.set(SessionState::Error);
                Err(error)
            }
        }
    }

    /// Runs `work` on the engine; the caller holds the slot and a page is loaded.
    fn run<R, F>(&self, work: F) -> Result<R>
    where
        R: Send + 'static,
        F: FnOnce(&ScriptHost) -> Result<R> + Send + 'static,
    {
        let state = &self.shared.state;
        let current = state.get();
        if !current.accepts_work() {
            return Err(Error::Boot(format!("the session cannot run work while {}", current)));
        }
        state.set(SessionState::Executing);

        let (completion, done) = Completion::<Outcome<R>>::new();
        let job: Job = Box::new(move |host| {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| work(host)));
            done.complete(outcome);
        });

        let outcome = self.send(Command::Run(job)).and_then(|()| {
            match completion.wait(self.shared.config.execute_timeout)? {
                Some(outcome) => Ok(outcome),
                None => Err(Error::ExecutionTimeout(
                    self.shared.config.execute_timeout.unwrap_or(Duration::ZERO),
                )),
            }
        });

        match outcome {
            Ok(Ok(Ok(value))) => {
                state.set(SessionState::Ready);
                Ok(value)
            }
            Ok(Ok(Err(error))) | Err(error) => {
                state.set(SessionState::Error);
                Err(error)
            }
            Ok(Err(payload)) => {
                state.set(SessionState::Error);
                panic::resume_unwind(payload)
            }
        }
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.shared.id)
            .field("state", &self.state())
            .field("registered", &self.shared.functions.len())
            .finish()
    }
}

impl EngineThread {
    fn spawn(shared: &Shared) -> Result<Self> {
        let (sender, receiver) = mpsc::channel();
        let id = shared.id;
        let config = Arc::clone(&shared.config);
        let functions = Arc::clone(&shared.functions);

        let join = thread::Builder::new()
            .name(format!("importshim-engine-{}", id))
            .spawn(move || engine_main(id, &config, &functions, &receiver))
            .map_err(|e| Error::Boot(format!("cannot spawn the engine thread: {}", e)))?;
        log::debug!("spawned engine thread for session {}", id);

        Ok(EngineThread { sender, join })
    }
}

fn engine_main(
    id: u64,
    config: &Arc<EmulatorConfig>,
    functions: &FunctionSet,
    receiver: &Receiver<Command>,
) {
    let host = match ScriptHost::new(Arc::clone(config)) {
        Ok(host) => Rc::new(host),
        Err(error) => {
            log::error!("session {} has no script engine: {}", id, error);
            for command in receiver {
                if let Command::Load { done, .. } = command {
                    done.complete(Err(Error::Boot(error.to_string())));
                }
            }
            return;
        }
    };
    CURRENT.with(|current| *current.borrow_mut() = Some((id, Rc::clone(&host))));

    for command in receiver {
        match command {
            Command::Load { page, done } => {
                let result = host.load_page(&page).map(|()| replay(&host, functions));
                done.complete(result);
            }
            Command::Register(annotation) => {
                if !host.is_loaded() {
                    continue;
                }
                if let Err(error) = host.register(&annotation) {
                    log::error!("cannot register {}: {}", annotation, error);
                }
            }
            Command::Run(job) => job(&host),
            Command::Shutdown => break,
        }
    }

    CURRENT.with(|current| current.borrow_mut().take());
    log::debug!("engine thread of session {} stopped", id);
}

fn replay(host: &ScriptHost, functions: &FunctionSet) {
    for annotation in functions.snapshot() {
        if let Err(error) = host.register(&annotation) {
            log::error!("cannot register {}: {}", annotation, error);
        }
    }
}
