//! DER control scheduler
//!
//! Per control:
//!
//! ```text
//! Unevaluated --(in window)--> Active
//! Unevaluated --(otherwise)--> Scheduled
//! Scheduled   --(in window)--> Active     (added to derca)
//! Active      --(window over)--> Complete (removed from derca)
//! ```
//!
//! Windows are half-open: `[start, start + duration)`. Complete is terminal.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use sep_core::href::DerProgramSubType;
use sep_core::{
    DerControl, DerProgram, EventStatus, EventStatusKind, Resource, StoreError, StoreResult,
};
use sep_store::{ResourceStore, SharedStore};

/// What one evaluation did to a control
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlTransition {
    Unchanged,
    Scheduled,
    Activated,
    Completed,
}

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickReport {
    pub timestamp: i64,
    /// Controls looked at
    pub evaluated: usize,
    pub activated: usize,
    pub completed: usize,
    /// Programs whose evaluation failed and was skipped
    pub failed_programs: usize,
}

impl TickReport {
    pub fn changed(&self) -> bool {
        self.activated > 0 || self.completed > 0
    }
}

/// Apply the transition function to one control at time `now`
pub fn advance(control: &mut DerControl, now: i64) -> ControlTransition {
    let in_window = control.interval.map(|iv| iv.contains(now));

    let Some(status) = control.event_status.as_mut() else {
        return if in_window == Some(true) {
            control.event_status = Some(EventStatus::new(EventStatusKind::Active, now, "Active"));
            ControlTransition::Activated
        } else {
            control.event_status = Some(EventStatus::new(
                EventStatusKind::Scheduled,
                now,
                "Scheduled",
            ));
            ControlTransition::Scheduled
        };
    };

    let Some(interval) = control.interval else {
        return ControlTransition::Unchanged;
    };

    match status.current_status {
        EventStatusKind::Scheduled if interval.contains(now) => {
            status.current_status = EventStatusKind::Active;
            status.date_time = now;
            status.reason = Some(format!(
                "Control event active {}",
                control.mrid.as_deref().unwrap_or_default()
            ));
            ControlTransition::Activated
        }
        EventStatusKind::Active if now >= interval.end() => {
            status.current_status = EventStatusKind::Complete;
            status.date_time = now;
            ControlTransition::Completed
        }
        _ => ControlTransition::Unchanged,
    }
}

/// Identity used to de-duplicate the active list: mRID, else href
fn active_key(control: &DerControl) -> Option<String> {
    control
        .mrid
        .clone()
        .or_else(|| control.href.clone())
}

/// Drives control state for every program of a store
#[derive(Debug, Clone)]
pub struct DerControlScheduler {
    programs: SharedStore<DerProgram>,
    /// Top-level controls kept in step with the programs' copies
    controls: Option<SharedStore<DerControl>>,
}

impl DerControlScheduler {
    pub fn new(programs: SharedStore<DerProgram>) -> Self {
        Self {
            programs,
            controls: None,
        }
    }

    /// Also write every status change to the control with the same href
    /// in `controls`
    pub fn with_controls(mut self, controls: SharedStore<DerControl>) -> Self {
        self.controls = Some(controls);
        self
    }

    pub fn programs(&self) -> &SharedStore<DerProgram> {
        &self.programs
    }

    pub fn controls(&self) -> Option<&SharedStore<DerControl>> {
        self.controls.as_ref()
    }

    /// Evaluate every control of every program at `now`.
    ///
    /// The program store is write-locked for the whole tick, and the
    /// control store after it. A failing program is logged and skipped; the
    /// others are still evaluated.
    pub fn tick(&self, now: i64) -> TickReport {
        let mut report = TickReport {
            timestamp: now,
            ..TickReport::default()
        };
        let mut store = self.programs.write();
        let mut changed = Vec::new();

        for index in 0..store.len() {
            if let Err(e) = Self::tick_program(&mut store, index, now, &mut report, &mut changed) {
                report.failed_programs += 1;
                let href = store
                    .fetch(index)
                    .ok()
                    .and_then(|p| p.href().map(str::to_string))
                    .unwrap_or_default();
                warn!(program = %href, error = %e, "Program evaluation failed");
            }
        }

        if let Some(controls) = &self.controls {
            Self::write_back(&mut controls.write(), changed);
        }
        report
    }

    /// Replace each top-level control that shares an href with a changed one
    fn write_back(controls: &mut ResourceStore<DerControl>, changed: Vec<DerControl>) {
        for control in changed {
            let Some(href) = control.href.clone() else {
                continue;
            };
            let Ok(index) = controls.fetch_index_by_property(|c| c.href(), href.as_str()) else {
                continue;
            };
            if let Err(e) = controls.replace(index, control) {
                warn!(control = %href, error = %e, "Control write-back failed");
            }
        }
    }

    fn tick_program(
        store: &mut ResourceStore<DerProgram>,
        index: usize,
        now: i64,
        report: &mut TickReport,
        changed: &mut Vec<DerControl>,
    ) -> StoreResult<()> {
        let controls = DerProgramSubType::Controls.token();
        let active = DerProgramSubType::ActiveControls.token();

        if store.size_children(index, controls)? == 0 {
            return Ok(());
        }

        let mut activate = Vec::new();
        let mut complete = Vec::new();

        for control in store.children_mut::<DerControl>(index, controls)? {
            report.evaluated += 1;
            let transition = advance(control, now);
            match transition {
                ControlTransition::Activated => {
                    report.activated += 1;
                    debug!(control = ?control.href, mrid = ?control.mrid, now, "Control active");
                }
                ControlTransition::Completed => {
                    report.completed += 1;
                    debug!(control = ?control.href, mrid = ?control.mrid, now, "Control complete");
                    complete.push(control.clone());
                }
                ControlTransition::Scheduled | ControlTransition::Unchanged => {}
            }
            if transition != ControlTransition::Unchanged {
                changed.push(control.clone());
            }

            let live = control.status() == Some(EventStatusKind::Active)
                && control.interval.is_some_and(|iv| iv.contains(now));
            if live {
                activate.push(control.clone());
            }
        }

        for control in &complete {
            match store.remove_child(index, active, control) {
                Ok(_) | Err(StoreError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }

        let mut present: HashSet<String> = store
            .fetch_children::<DerControl>(index, active)?
            .iter()
            .filter_map(active_key)
            .collect();
        for control in activate {
            let Some(key) = active_key(&control) else {
                continue;
            };
            if present.insert(key) {
                store.add_replace_child(index, active, control, None)?;
            }
        }

        store.persist_children(index, controls)?;
        Ok(())
    }

    /// Run [`Self::tick`] for every received timestamp until `shutdown`
    /// flips to `true` or the tick channel closes
    pub fn spawn(
        self: Arc<Self>,
        mut ticks: broadcast::Receiver<i64>,
        mut shutdown: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            info!("Control scheduler started");
            loop {
                tokio::select! {
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            break;
                        }
                    }
                    tick = ticks.recv() => match tick {
                        Ok(now) => {
                            let report = self.tick(now);
                            if report.changed() || report.failed_programs > 0 {
                                info!(
                                    timestamp = now,
                                    activated = report.activated,
                                    completed = report.completed,
                                    failed = report.failed_programs,
                                    "Control states changed"
                                );
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            warn!(skipped = n, "Control scheduler lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => {
                            info!("Tick channel closed");
                            break;
                        }
                    },
                }
            }
            info!("Control scheduler stopped");
        })
    }
}
