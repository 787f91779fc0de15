/// Bulk save: bookmark many tabs in one run with progress reporting
///
/// A run moves Idle -> Running -> Completed. Tabs are saved strictly one
/// after another with a pause after every attempt, so progress only ever
/// grows and the bookmark service sees at most one request at a time.
/// Failed tabs are recorded and the run carries on; there is no failed
/// terminal state and no per-tab retry.
///
/// Runs cannot be cancelled. Adding cancellation needs its own state that
/// still waits for the in-flight request before stopping.

use crate::bookmark::{BookmarkCreator, BookmarkError, BookmarkRequest};
use crate::config_store::ConfigStore;
use crate::host::{HostError, Pacer, TabHost};
use crate::storage::KeyValueStore;
use crate::tab_data::{SaveType, TabInfo, bookmarkable_tabs};
use futures::StreamExt;
use futures::stream::{self, LocalBoxStream};
use std::cell::Cell;
use std::fmt;

/// Pause between two bookmark requests
pub const PACING_DELAY_MS: u32 = 100;

/// Number of per-tab errors shown before collapsing the rest
pub const MAX_ERRORS_SHOWN: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Completed,
}

/// Snapshot of a bulk save, emitted once per processed tab
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BulkSaveStatus {
    pub is_active: bool,
    pub total: usize,
    pub completed: usize,
    /// Percentage of tabs attempted, 0-100
    pub progress: u8,
    pub errors: Vec<String>,
    pub save_type: SaveType,
}

impl BulkSaveStatus {
    fn started(total: usize, save_type: SaveType) -> BulkSaveStatus {
        BulkSaveStatus {
            is_active: true,
            total,
            save_type,
            ..BulkSaveStatus::default()
        }
    }

    /// Placeholder shown between a save request and the run's first
    /// snapshot, while settings and tabs are fetched
    pub fn pending(save_type: SaveType) -> BulkSaveStatus {
        BulkSaveStatus::started(0, save_type)
    }

    /// Tabs attempted so far, successful or not
    pub fn processed(&self) -> usize {
        self.completed + self.errors.len()
    }

    pub fn state(&self) -> RunState {
        if self.is_active {
            RunState::Running
        } else if self.total > 0 && self.processed() == self.total {
            RunState::Completed
        } else {
            RunState::Idle
        }
    }

    /// Clear a finished run before starting the next one
    pub fn reset(&mut self) {
        *self = BulkSaveStatus::default();
    }

    /// Outcome of a completed run; `None` while running or idle
    pub fn summary(&self) -> Option<BulkSaveSummary> {
        if self.state() != RunState::Completed {
            return None;
        }
        Some(if self.errors.is_empty() {
            BulkSaveSummary::AllSaved {
                saved: self.completed,
            }
        } else if self.completed > 0 {
            BulkSaveSummary::Partial {
                saved: self.completed,
                total: self.total,
            }
        } else {
            BulkSaveSummary::NoneSaved { total: self.total }
        })
    }

    /// The first few error messages, then a line counting the rest
    pub fn error_preview(&self) -> Vec<String> {
        let mut lines: Vec<String> = self.errors.iter().take(MAX_ERRORS_SHOWN).cloned().collect();
        if self.errors.len() > MAX_ERRORS_SHOWN {
            lines.push(format!("...and {} more", self.errors.len() - MAX_ERRORS_SHOWN));
        }
        lines
    }

    fn record_attempt(&mut self, attempted: usize) {
        self.progress = percent(attempted, self.total);
    }
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 0;
    }
    (done.min(total) * 100 / total) as u8
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkSaveSummary {
    AllSaved { saved: usize },
    Partial { saved: usize, total: usize },
    NoneSaved { total: usize },
}

impl fmt::Display for BulkSaveSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BulkSaveSummary::AllSaved { saved: 1 } => write!(f, "Successfully saved 1 tab."),
            BulkSaveSummary::AllSaved { saved } => write!(f, "Successfully saved {} tabs.", saved),
            BulkSaveSummary::Partial { saved, total } => {
                write!(f, "Saved {} of {} tabs. Some tabs failed to save.", saved, total)
            }
            BulkSaveSummary::NoneSaved { .. } => write!(f, "Failed to save any tabs."),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum BulkSaveError {
    #[error("No valid tabs to save")]
    NoValidTabs,

    #[error("A bulk save is already in progress")]
    AlreadyRunning,

    #[error(transparent)]
    Host(#[from] HostError),
}

/// Stream of status snapshots for one run, ending with the completed snapshot
pub type BulkSaveRun<'a> = LocalBoxStream<'a, BulkSaveStatus>;

pub struct BulkSaveOrchestrator<C, H, P> {
    creator: C,
    host: H,
    pacer: P,
    running: Cell<bool>,
}

impl<C, H, P> BulkSaveOrchestrator<C, H, P>
where
    C: BookmarkCreator,
    H: TabHost,
    P: Pacer,
{
    pub fn new(creator: C, host: H, pacer: P) -> Self {
        BulkSaveOrchestrator {
            creator,
            host,
            pacer,
            running: Cell::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.get()
    }

    /// Start a run over `tabs`.
    ///
    /// The first snapshot has nothing processed; one snapshot follows per
    /// tab, then a final one with `is_active == false`. Empty input and
    /// overlapping runs are rejected before anything is emitted.
    pub fn run<'a>(
        &'a self,
        tabs: Vec<TabInfo>,
        save_type: SaveType,
        close_after: bool,
    ) -> Result<BulkSaveRun<'a>, BulkSaveError>
    where
        C: 'a,
        H: 'a,
        P: 'a,
    {
        if tabs.is_empty() {
            return Err(BulkSaveError::NoValidTabs);
        }
        let guard = self.claim()?;
        Ok(self.start(tabs, save_type, close_after, guard))
    }

    /// Drive a run to completion, handing every snapshot to `on_status`.
    /// Returns the final snapshot.
    pub async fn save_tabs<F>(
        &self,
        tabs: Vec<TabInfo>,
        save_type: SaveType,
        close_after: bool,
        on_status: F,
    ) -> Result<BulkSaveStatus, BulkSaveError>
    where
        F: FnMut(&BulkSaveStatus),
    {
        let run = self.run(tabs, save_type, close_after)?;
        Ok(drive(run, on_status).await)
    }

    /// Save the open tabs in `scope`, closing them afterwards when the
    /// settings ask for it. Settings are read once, before the run.
    ///
    /// The run is claimed before settings and tabs are fetched, so a second
    /// call made while those are pending gets `AlreadyRunning`.
    pub async fn save_open_tabs<S, F>(
        &self,
        scope: SaveType,
        settings: &ConfigStore<S>,
        on_status: F,
    ) -> Result<BulkSaveStatus, BulkSaveError>
    where
        S: KeyValueStore,
        F: FnMut(&BulkSaveStatus),
    {
        let guard = self.claim()?;
        let close_after = settings.read().await.close_tabs_on_bulk_save;
        let tabs = bookmarkable_tabs(&self.host.query_tabs(scope).await?);
        if tabs.is_empty() {
            return Err(BulkSaveError::NoValidTabs);
        }
        Ok(drive(self.start(tabs, scope, close_after, guard), on_status).await)
    }

    fn claim(&self) -> Result<RunningGuard<'_>, BulkSaveError> {
        if self.running.replace(true) {
            return Err(BulkSaveError::AlreadyRunning);
        }
        Ok(RunningGuard(&self.running))
    }

    fn start<'a>(
        &'a self,
        tabs: Vec<TabInfo>,
        save_type: SaveType,
        close_after: bool,
        guard: RunningGuard<'a>,
    ) -> BulkSaveRun<'a>
    where
        C: 'a,
        H: 'a,
        P: 'a,
    {
        log::info!("Bulk save of {} tabs started ({:?})", tabs.len(), save_type);
        let cursor = RunCursor {
            orchestrator: self,
            guard: Some(guard),
            status: BulkSaveStatus::started(tabs.len(), save_type),
            tabs,
            saved_ids: Vec::new(),
            close_after,
            phase: Phase::Start,
        };

        stream::unfold(cursor, |mut cursor| async move {
            let status = cursor.advance().await;
            status.map(move |status| (status, cursor))
        })
        .boxed_local()
    }
}

async fn drive<F>(mut run: BulkSaveRun<'_>, mut on_status: F) -> BulkSaveStatus
where
    F: FnMut(&BulkSaveStatus),
{
    let mut last = BulkSaveStatus::default();
    while let Some(status) = run.next().await {
        on_status(&status);
        last = status;
    }
    last
}

/// Clears the running flag when a run finishes or its stream is dropped
struct RunningGuard<'a>(&'a Cell<bool>);

impl Drop for RunningGuard<'_> {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

#[derive(Clone, Copy)]
enum Phase {
    Start,
    Saving(usize),
    Finishing,
    Done,
}

struct RunCursor<'a, C, H, P> {
    orchestrator: &'a BulkSaveOrchestrator<C, H, P>,
    guard: Option<RunningGuard<'a>>,
    status: BulkSaveStatus,
    tabs: Vec<TabInfo>,
    saved_ids: Vec<i32>,
    close_after: bool,
    phase: Phase,
}

impl<C, H, P> RunCursor<'_, C, H, P>
where
    C: BookmarkCreator,
    H: TabHost,
    P: Pacer,
{
    async fn advance(&mut self) -> Option<BulkSaveStatus> {
        match self.phase {
            Phase::Start => {
                self.phase = Phase::Saving(0);
            }
            Phase::Saving(index) => {
                if index > 0 {
                    self.orchestrator.pacer.pause().await;
                }
                self.attempt(index).await;
                self.phase = if index + 1 < self.tabs.len() {
                    Phase::Saving(index + 1)
                } else {
                    Phase::Finishing
                };
            }
            Phase::Finishing => {
                self.orchestrator.pacer.pause().await;
                self.close_saved_tabs().await;
                self.status.is_active = false;
                // Release the running flag with the final snapshot
                self.guard.take();
                self.phase = Phase::Done;
                log::info!(
                    "Bulk save finished: {} saved, {} failed",
                    self.status.completed,
                    self.status.errors.len()
                );
            }
            Phase::Done => return None,
        }
        Some(self.status.clone())
    }

    async fn attempt(&mut self, index: usize) {
        let tab = &self.tabs[index];
        let outcome = match BookmarkRequest::for_tab(tab) {
            Some(request) => self.orchestrator.creator.create(&request).await,
            None => Err(BookmarkError::NotBookmarkable),
        };

        match outcome {
            Ok(id) => {
                log::debug!("Saved tab {:?} as bookmark {}", tab.id, id);
                self.status.completed += 1;
                if let Some(tab_id) = tab.id {
                    self.saved_ids.push(tab_id);
                }
            }
            Err(e) => {
                log::warn!("Failed to save {}: {}", tab.display_label(), e);
                self.status.errors.push(format!("{}: {}", tab.display_label(), e));
            }
        }
        self.status.record_attempt(index + 1);
    }

    /// Close the saved tabs in one request, falling back to one request per
    /// tab. Failures of the fallback are ignored and never reach the status.
    async fn close_saved_tabs(&self) {
        if !self.close_after || self.saved_ids.is_empty() {
            return;
        }

        let host = &self.orchestrator.host;
        match host.close_tabs(&self.saved_ids).await {
            Ok(()) => log::info!("Closed {} saved tabs", self.saved_ids.len()),
            Err(e) => {
                log::warn!("{}; closing saved tabs one at a time", e);
                for tab_id in &self.saved_ids {
                    if let Err(e) = host.close_tab(*tab_id).await {
                        log::debug!("Ignoring failure to close tab {}: {}", tab_id, e);
                    }
                }
            }
        }
    }
}
