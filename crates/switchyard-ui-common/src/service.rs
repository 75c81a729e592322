//! Main UI service entry point.
//!
//! The [`GameService`] owns the loaded game and its menu, the job tracker and
//! the configuration. Simulation runs execute on a blocking task and report
//! through a [`JobHandle`].

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{Mutex, RwLock};
use switchyard_core::{
    Busbar, CompositeAction, ElementKind, ElementRef, Environment, Game, SubstationId,
    SwitchyardError,
};
use switchyard_scenarios::ReplayEnvironment;
use tokio::sync::broadcast;
use tracing::{error, info, warn};

use crate::config::SwitchyardConfig;
use crate::error::{Error, Result};
use crate::events::{JobEvent, MenuEvent, RunKind};
use crate::jobs::{JobHandle, JobId, JobTracker, Progress};
use crate::menu::{ActionLog, Menu, MenuState};

/// Simulators are held behind a trait object so any facade can back the service.
pub type BoxedEnvironment = Box<dyn Environment>;

/// A loaded game together with the menu bound to it.
pub struct Session {
    pub game: Game<BoxedEnvironment>,
    pub menu: Menu,
    pub source: PathBuf,
}

/// Clears the service's `running` flag when a run ends, including by panic.
struct RunningFlag(Arc<AtomicBool>);

impl Drop for RunningFlag {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

/// Main service coordinating game state, menu, runs and configuration.
///
/// # Example
///
/// ```ignore
/// let service = GameService::new()?;
/// service.load_scenario("scenarios/demo.yaml")?;
/// service.select_line_to(SubstationId::new(1))?;
/// service.select_busbar(Busbar::new(2))?;
///
/// let handle = service.submit()?;
/// let result = handle.result.await?;
/// ```
pub struct GameService {
    session: Arc<Mutex<Option<Session>>>,

    /// Set while a run holds the session.
    running: Arc<AtomicBool>,

    jobs: Arc<JobTracker>,

    config: Arc<RwLock<SwitchyardConfig>>,

    /// Output sink shared with every menu this service builds.
    log: ActionLog,

    menu_events_tx: broadcast::Sender<MenuEvent>,
}

impl GameService {
    /// Create a service with configuration from `~/.switchyard/config.toml`, if present.
    pub fn new() -> Result<Self> {
        let config = SwitchyardConfig::load()?;
        Ok(Self::with_config(config))
    }

    pub fn with_config(config: SwitchyardConfig) -> Self {
        let (menu_events_tx, _) = broadcast::channel(64);
        Self {
            session: Arc::new(Mutex::new(None)),
            running: Arc::new(AtomicBool::new(false)),
            jobs: JobTracker::shared(),
            config: Arc::new(RwLock::new(config)),
            log: ActionLog::new(),
            menu_events_tx,
        }
    }

    pub fn jobs(&self) -> &Arc<JobTracker> {
        &self.jobs
    }

    pub fn config(&self) -> &Arc<RwLock<SwitchyardConfig>> {
        &self.config
    }

    /// Text of the pending action as last rendered by the menu.
    pub fn action_log(&self) -> &ActionLog {
        &self.log
    }

    /// Load a replay scenario from disk. The scenario's topology must validate.
    pub fn load_scenario(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref().to_path_buf();
        let environment = ReplayEnvironment::open(&path).map_err(|source| Error::LoadFailed {
            path: path.clone(),
            source,
        })?;
        self.load_environment(Box::new(environment), path)
    }

    /// Start a game on any simulator, replacing the current one.
    pub fn load_environment(&self, environment: BoxedEnvironment, source: PathBuf) -> Result<()> {
        if self.running.load(Ordering::Acquire) {
            return Err(Error::RunInProgress);
        }
        let (options, display) = {
            let config = self.config.read();
            (config.game.to_options(), config.display.clone())
        };
        let game = Game::new(environment, options)?;
        let menu = Menu::new(&game, self.log.clone(), display, self.menu_events_tx.clone())?;

        let topology = game.topology();
        info!(
            source = %source.display(),
            n_sub = topology.n_sub(),
            n_line = topology.n_line(),
            "game loaded"
        );
        let _ = self.menu_events_tx.send(MenuEvent::GameLoaded {
            path: source.clone(),
            n_sub: topology.n_sub(),
            n_line: topology.n_line(),
        });

        *self.session.lock() = Some(Session { game, menu, source });
        Ok(())
    }

    pub fn has_game(&self) -> bool {
        // A run only ever holds a loaded session.
        self.session.try_lock().map_or(true, |guard| guard.is_some())
    }

    /// Run `f` against the loaded session. Fails while a run holds it.
    pub fn with_session<R>(&self, f: impl FnOnce(&mut Session) -> Result<R>) -> Result<R> {
        let mut guard = self.session.try_lock().ok_or(Error::RunInProgress)?;
        let session = guard.as_mut().ok_or(Error::NoGameLoaded)?;
        f(session)
    }

    pub fn menu_state(&self) -> Result<MenuState> {
        self.with_session(|s| Ok(s.menu.state()))
    }

    pub fn select_substation(&self, substation: SubstationId) -> Result<()> {
        self.with_session(|s| s.menu.select_substation(&s.game, substation))
    }

    pub fn select_kind(&self, kind: ElementKind) -> Result<()> {
        self.with_session(|s| s.menu.select_kind(&s.game, kind))
    }

    pub fn select_element(&self, element: ElementRef) -> Result<()> {
        self.with_session(|s| s.menu.select_element(&s.game, element))
    }

    pub fn select_line_to(&self, neighbor: SubstationId) -> Result<()> {
        self.with_session(|s| s.menu.select_line_to(&s.game, neighbor))
    }

    pub fn select_busbar(&self, busbar: Busbar) -> Result<()> {
        self.with_session(|s| s.menu.select_busbar(&mut s.game, busbar))
    }

    /// Record a busbar change directly, bypassing the menu stages.
    pub fn upsert(&self, element: ElementRef, busbar: Busbar) -> Result<()> {
        self.with_session(|s| {
            s.game.upsert(element, busbar)?;
            s.menu.refresh(&s.game)
        })
    }

    pub fn clear_ledger(&self) -> Result<()> {
        self.with_session(|s| s.menu.clear_ledger(&mut s.game))
    }

    pub fn pending_action(&self) -> Result<CompositeAction> {
        self.with_session(|s| Ok(s.game.composite_action()))
    }

    /// Start a new episode on the loaded simulator.
    pub fn reset(&self) -> Result<()> {
        self.with_session(|s| {
            s.game.reset()?;
            let _ = self.menu_events_tx.send(MenuEvent::LedgerCleared);
            s.menu.refresh(&s.game)
        })
    }

    /// Submit the pending action and advance until a line overloads.
    ///
    /// Must be called from within a tokio runtime. The run holds the session
    /// until it finishes; menu calls made meanwhile fail with
    /// [`Error::RunInProgress`].
    pub fn submit(&self) -> Result<JobHandle> {
        if self.running.swap(true, Ordering::AcqRel) {
            return Err(Error::RunInProgress);
        }
        if !self.has_game() {
            self.running.store(false, Ordering::Release);
            return Err(Error::NoGameLoaded);
        }

        let handle = self.jobs.create(RunKind::ContinueSimulation);
        let job_id = handle.id;
        let cancel = self.jobs.token(job_id).ok_or(Error::JobNotFound(job_id))?;

        let session = Arc::clone(&self.session);
        let running = Arc::clone(&self.running);
        let jobs = Arc::clone(&self.jobs);

        tokio::task::spawn_blocking(move || {
            let flag = RunningFlag(running);
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                let mut guard = session.lock();
                let s = guard.as_mut().ok_or(Error::NoGameLoaded)?;
                let result = s.game.continue_simulation(&cancel, |tick| {
                    let progress = Progress::with_message(tick.tick, tick.to_string());
                    jobs.update_progress(job_id, progress);
                });
                if let Err(err) = s.menu.refresh(&s.game) {
                    warn!(%err, "menu refresh after run failed");
                }
                result.map_err(Error::from)
            }));
            drop(flag);

            match outcome {
                Ok(Ok(report)) => {
                    let message = format!(
                        "overload on lines {:?} after {} ticks",
                        report.overloaded_lines, report.ticks
                    );
                    jobs.complete(job_id, Some(message), Some(report));
                }
                Ok(Err(Error::Simulation(SwitchyardError::Cancelled { .. }))) => {
                    jobs.mark_cancelled(job_id)
                }
                Ok(Err(err)) => jobs.fail(job_id, err.to_string()),
                Err(payload) => {
                    let reason = panic_message(payload.as_ref());
                    error!(job = %job_id, %reason, "simulation run panicked");
                    jobs.fail(job_id, format!("simulation run panicked: {reason}"));
                }
            }
        });

        Ok(handle)
    }

    /// Stop a running job at its next tick.
    pub fn cancel(&self, id: JobId) -> Result<()> {
        self.jobs.cancel(id)
    }

    pub fn active_job_count(&self) -> usize {
        self.jobs.active_count()
    }

    pub fn subscribe_menu(&self) -> broadcast::Receiver<MenuEvent> {
        self.menu_events_tx.subscribe()
    }

    pub fn subscribe_jobs(&self) -> broadcast::Receiver<JobEvent> {
        self.jobs.subscribe()
    }

    pub fn save_config(&self) -> Result<()> {
        self.config.read().save()
    }
}
