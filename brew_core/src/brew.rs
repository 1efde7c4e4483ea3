//! Brew lifecycle: idle -> (preinfusion) -> brewing -> dripping -> idle.
//!
//! `BrewController` is single-owner and advanced only by [`BrewController::update`]
//! from the control tick. Public operations that can be refused return a
//! [`BrewRejection`] instead of failing silently.

use std::sync::Arc;
use std::time::Instant;

use brew_traits::{Clock, WallClock};

use crate::compensation::{CompensationBank, Learned};
use crate::config::BrewCfg;
use crate::error::BrewRejection;
use crate::history::{Profile, Shot, ShotHistory};
use crate::machine::{ButtonEdges, MachineController};
use crate::port::ScalePort;
use crate::prefs::{BrewPreferences, PreinfusionMode};
use crate::shot_log::{ShotRecord, ShotSink};
use crate::status::{BrewMetrics, BrewState};
use crate::store::{SavedState, SettingsStore};

/// Who asked for a start or a stop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    /// A machine button. The machine already reacted physically, so the relay
    /// is only driven where the button alone cannot do the job.
    Button,
    /// A software request (API, CLI). The relay does all the work.
    Remote,
}

/// Working state of the brew in progress.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BrewSession {
    pub state: BrewState,
    pub target_g: f32,
    /// Extrapolated weight from the latest tick.
    pub current_weight_g: f32,
    pub profile: Profile,
    pub started_ms: u64,
    pub ended_ms: Option<u64>,
    pub last_flow_gps: f32,
    pub stop_weight_g: f32,
}

pub struct BrewController<P: ScalePort> {
    pub(crate) scale: P,
    pub(crate) machine: MachineController,
    pub(crate) bank: CompensationBank,
    pub(crate) prefs: BrewPreferences,
    pub(crate) cfg: BrewCfg,
    pub(crate) store: Box<dyn SettingsStore>,
    pub(crate) shot_log: Option<Box<dyn ShotSink>>,
    pub(crate) wall: Option<Box<dyn WallClock>>,
    pub(crate) clock: Arc<dyn Clock + Send + Sync>,
    pub(crate) epoch: Instant,
    pub(crate) session: Option<BrewSession>,
    pub(crate) shot_counter: u32,
    pub(crate) active: bool,
    pub(crate) last_active_ms: u64,
    pub(crate) waiting_for_macro: bool,
    pub(crate) pending_beeps: u8,
    pub(crate) last_beep_ms: Option<u64>,
    pub(crate) offline_since_ms: Option<u64>,
}

impl<P: ScalePort> core::fmt::Debug for BrewController<P> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("BrewController")
            .field("session", &self.session)
            .field("active", &self.active)
            .field("shot_counter", &self.shot_counter)
            .field("bank", &self.bank)
            .field("machine", &self.machine)
            .finish_non_exhaustive()
    }
}

impl<P: ScalePort> BrewController<P> {
    #[inline]
    pub fn now_ms(&self) -> u64 {
        self.clock.ms_since(self.epoch)
    }

    // ── Queries ──────────────────────────────────────────────────────────────

    pub fn state(&self) -> BrewState {
        self.session.map_or(BrewState::Idle, |s| s.state)
    }

    pub fn session(&self) -> Option<&BrewSession> {
        self.session.as_ref()
    }

    /// Any non-idle state.
    pub fn is_brewing(&self) -> bool {
        self.session.is_some()
    }

    pub fn is_active(&self) -> bool {
        self.active
    }

    pub fn is_enabled(&self) -> bool {
        self.prefs.enabled
    }

    pub fn prefs(&self) -> &BrewPreferences {
        &self.prefs
    }

    pub fn cfg(&self) -> &BrewCfg {
        &self.cfg
    }

    pub fn target_weight(&self) -> f32 {
        self.session.map_or(0.0, |s| s.target_g)
    }

    /// Milliseconds since the current brew started; 0 when idle.
    pub fn brew_time_ms(&self) -> u64 {
        self.session
            .map_or(0, |s| self.now_ms().saturating_sub(s.started_ms))
    }

    pub fn shot_counter(&self) -> u32 {
        self.shot_counter
    }

    pub fn recent_shots(&self, profile: Profile) -> &ShotHistory {
        self.bank.history(profile)
    }

    pub fn compensation_state(&self, profile: Profile) -> f32 {
        self.bank.state(profile)
    }

    pub fn compensation(&self) -> &CompensationBank {
        &self.bank
    }

    pub fn scale(&self) -> &P {
        &self.scale
    }

    pub fn scale_mut(&mut self) -> &mut P {
        &mut self.scale
    }

    pub fn machine(&self) -> &MachineController {
        &self.machine
    }

    pub fn metrics(&self) -> BrewMetrics {
        let (weight_g, target_g) = match self.session {
            Some(s) => (s.current_weight_g, s.target_g),
            None => (self.scale.weight(), 0.0),
        };
        BrewMetrics {
            weight_g,
            flow_gps: self.scale.flow_rate(),
            target_g,
            elapsed_ms: self.brew_time_ms(),
            state: self.state(),
            active: self.active,
            connected: self.scale.is_connected(),
            enabled: self.prefs.enabled,
        }
    }

    /// Preset for a button-started brew: decaf once the configured hour has
    /// been reached in local time, regular otherwise.
    pub fn base_target(&self) -> f32 {
        let hour = self.wall.as_ref().and_then(|w| w.local_hour());
        match (self.prefs.decaf_start_hour, hour) {
            (Some(start), Some(h)) if h >= start => self.prefs.decaf_preset_g,
            _ => self.prefs.regular_preset_g,
        }
    }

    // ── Brew operations ─────────────────────────────────────────────────────

    /// Start a software-triggered brew; the relay starts the machine.
    pub fn start_brew(&mut self, target_g: f32) -> Result<(), BrewRejection> {
        self.start(target_g, Trigger::Remote)
    }

    pub(crate) fn start(&mut self, target_g: f32, trigger: Trigger) -> Result<(), BrewRejection> {
        if !self.prefs.enabled {
            return Err(BrewRejection::Disabled);
        }
        if self.session.is_some() {
            return Err(BrewRejection::AlreadyBrewing);
        }
        if !target_g.is_finite() || target_g <= 0.0 || target_g > self.cfg.max_target_g {
            return Err(BrewRejection::InvalidTarget(target_g));
        }
        if !self.scale.is_connected() {
            return Err(BrewRejection::Disconnected);
        }

        let now = self.now_ms();
        self.active = true;
        self.touch(now);
        let profile = Profile::for_target(target_g, self.cfg.profile_threshold_g);
        if !self.scale.start_and_tare() {
            tracing::warn!("start-and-tare not sent");
        }

        let state = match (self.prefs.preinfusion_mode, trigger) {
            (PreinfusionMode::Simple, Trigger::Remote) => {
                self.machine.click_relay(now);
                BrewState::Brewing
            }
            (PreinfusionMode::WeightTriggered, Trigger::Remote) => {
                self.machine.hold_relay();
                BrewState::Preinfusion
            }
            (PreinfusionMode::Simple, Trigger::Button) => BrewState::Brewing,
            (PreinfusionMode::WeightTriggered, Trigger::Button) => BrewState::Preinfusion,
        };
        self.session = Some(BrewSession {
            state,
            target_g,
            current_weight_g: 0.0,
            profile,
            started_ms: now,
            ended_ms: None,
            last_flow_gps: 0.0,
            stop_weight_g: 0.0,
        });
        self.offline_since_ms = None;
        tracing::info!(
            target_g,
            profile = ?profile,
            state = ?state,
            trigger = ?trigger,
            compensation = self.bank.state(profile),
            "brew start"
        );
        Ok(())
    }

    /// Cancel the brew in progress and return to idle.
    ///
    /// Refused once dripping: the relay has already been told to stop.
    pub fn abort_brew(&mut self, source: Trigger) -> Result<(), BrewRejection> {
        let now = self.now_ms();
        let Some(session) = self.session else {
            if self.waiting_for_macro {
                self.abandon_macro(source, now);
                return Ok(());
            }
            return Err(BrewRejection::NotBrewing);
        };
        match session.state {
            BrewState::Dripping => return Err(BrewRejection::AlreadyStopping),
            _ if self.machine.is_latched() => self.machine.stop_from_preinfusion(now),
            _ if source == Trigger::Remote => self.machine.click_relay(now),
            // the press itself stopped the machine; a click would restart it
            _ => {}
        }
        self.machine.cancel_macro();
        self.waiting_for_macro = false;
        self.session = None;
        self.offline_since_ms = None;
        if !self.scale.stop_timer() {
            tracing::debug!("stop_timer not sent (scale offline)");
        }
        self.touch(now);
        tracing::info!(
            from = ?session.state,
            source = ?source,
            elapsed_ms = now.saturating_sub(session.started_ms),
            "brew aborted"
        );
        Ok(())
    }

    /// Cancel a one-cup preinfusion macro before its brew has started.
    fn abandon_macro(&mut self, source: Trigger, now: u64) {
        self.waiting_for_macro = false;
        self.machine.abort_macro(now, source == Trigger::Remote);
        self.touch(now);
        tracing::info!(source = ?source, "preinfusion macro cancelled");
    }

    /// Stop the relay and start the drip settle window.
    pub fn finish_brew(&mut self) -> Result<(), BrewRejection> {
        let Some(mut session) = self.session else {
            return Err(BrewRejection::NotBrewing);
        };
        if session.state == BrewState::Dripping {
            return Err(BrewRejection::AlreadyStopping);
        }
        let now = self.now_ms();
        if self.machine.is_latched() {
            self.machine.stop_from_preinfusion(now);
        } else {
            self.machine.click_relay(now);
        }
        session.last_flow_gps = self.scale.flow_rate();
        session.stop_weight_g = self.scale.weight();
        session.ended_ms = Some(now);
        let from = session.state;
        session.state = BrewState::Dripping;
        self.session = Some(session);
        if !self.scale.stop_timer() {
            tracing::debug!("stop_timer not sent (scale offline)");
        }
        tracing::info!(
            from = ?from,
            elapsed_ms = now.saturating_sub(session.started_ms),
            stop_weight_g = session.stop_weight_g,
            flow_gps = session.last_flow_gps,
            "brew stop; dripping"
        );
        Ok(())
    }

    /// Reconnect the scale and restart the idle timer.
    pub fn wake(&mut self) {
        if !self.prefs.enabled {
            return;
        }
        let now = self.now_ms();
        if !self.active {
            tracing::info!("waking up");
        }
        self.active = true;
        self.last_active_ms = now;
        if !self.scale.is_connected() {
            self.scale.connect();
        }
    }

    #[inline]
    fn touch(&mut self, now: u64) {
        self.last_active_ms = now;
    }

    // ── Control tick ────────────────────────────────────────────────────────

    /// One control tick. Cheap and non-blocking.
    pub fn update(&mut self) {
        let now = self.now_ms();
        self.scale.poll();
        let edges = self.machine.update(now);
        if !self.prefs.enabled {
            return;
        }
        self.service_beeps(now);

        if self.active
            && self.session.is_none()
            && !self.waiting_for_macro
            && now.saturating_sub(self.last_active_ms) > self.cfg.activity_timeout_ms
        {
            tracing::info!(idle_ms = now.saturating_sub(self.last_active_ms), "going to sleep");
            self.active = false;
            self.scale.disconnect();
        }

        if !self.active {
            if edges.any() {
                self.wake();
            }
            return;
        }

        if self.session.is_none() {
            self.handle_idle(edges, now);
        } else {
            self.handle_active(edges, now);
        }
    }

    /// Advance relay timing only; used while shutting down.
    pub fn service_outputs(&mut self) {
        let now = self.now_ms();
        self.machine.update(now);
    }

    /// Abort any brew and force the relay low.
    pub fn shutdown(&mut self) {
        if self.session.is_some_and(|s| s.state.is_pouring()) {
            let _ = self.abort_brew(Trigger::Remote);
        } else if self.session.is_some() {
            self.session = None;
        } else if self.waiting_for_macro {
            self.abandon_macro(Trigger::Remote, self.now_ms());
        }
        if self.machine.is_latched() {
            self.machine.force_release();
        }
    }

    fn service_beeps(&mut self, now: u64) {
        if self.pending_beeps == 0 {
            return;
        }
        let due = self
            .last_beep_ms
            .is_none_or(|t| now.saturating_sub(t) >= self.cfg.beep_spacing_ms);
        if due {
            self.scale.beep();
            self.pending_beeps -= 1;
            self.last_beep_ms = Some(now);
        }
    }

    fn handle_idle(&mut self, edges: ButtonEdges, now: u64) {
        if self.waiting_for_macro {
            if edges.any() {
                self.abandon_macro(Trigger::Button, now);
                return;
            }
            if self.machine.take_macro_complete() {
                self.waiting_for_macro = false;
                let half = self.base_target() / 2.0;
                if let Err(e) = self.start(half, Trigger::Button) {
                    tracing::warn!(reason = %e, "brew after preinfusion macro refused");
                    self.machine.release_relay();
                }
            }
            return;
        }

        if edges.manual {
            let target = self.base_target();
            if let Err(e) = self.start(target, Trigger::Button) {
                tracing::info!(reason = %e, "manual press not tracked");
            }
        } else if edges.one_cup {
            let half = self.base_target() / 2.0;
            match self.prefs.preinfusion_mode {
                PreinfusionMode::WeightTriggered if self.scale.is_connected() => {
                    tracing::debug!("one-cup press; running preinfusion macro");
                    self.machine.start_preinfusion_macro(now);
                    self.waiting_for_macro = true;
                    self.touch(now);
                }
                _ => {
                    if let Err(e) = self.start(half, Trigger::Button) {
                        tracing::info!(reason = %e, "one-cup press not tracked");
                    }
                }
            }
        } else if edges.two_cup {
            self.wake();
        }
    }

    fn handle_active(&mut self, edges: ButtonEdges, now: u64) {
        let Some(mut session) = self.session else {
            return;
        };

        if edges.any() && session.state != BrewState::Dripping {
            let _ = self.abort_brew(Trigger::Button);
            return;
        }

        let elapsed = now.saturating_sub(session.started_ms);
        if session.state.is_pouring() && elapsed >= self.cfg.max_shot_ms {
            tracing::warn!(elapsed_ms = elapsed, "maximum shot time reached; forcing stop");
            let _ = self.finish_brew();
            return;
        }

        if !self.scale.is_connected() {
            let since = *self.offline_since_ms.get_or_insert(now);
            let offline = now.saturating_sub(since);
            if session.state.is_pouring() && offline >= self.cfg.link_loss_abort_ms {
                tracing::warn!(offline_ms = offline, "scale lost during brew; aborting");
                let _ = self.abort_brew(Trigger::Remote);
            } else if self.drip_settled(&session, now) {
                self.finalize(session, now);
            }
            return;
        }
        self.offline_since_ms = None;

        let flow = self.scale.flow_rate();
        let age_s = crate::util::ms_to_secs(self.scale.packet_age_ms().unwrap_or(0));
        session.current_weight_g = self.scale.weight() + flow * age_s;

        if session.state == BrewState::Preinfusion
            && self.prefs.preinfusion_mode == PreinfusionMode::WeightTriggered
            && session.current_weight_g >= self.cfg.first_drops_g
            && elapsed > self.cfg.preinfusion_grace_ms
        {
            self.machine.release_relay();
            session.state = BrewState::Brewing;
            tracing::info!(
                weight_g = session.current_weight_g,
                elapsed_ms = elapsed,
                "first drops; full pressure"
            );
        }
        self.session = Some(session);

        if session.state.is_pouring() {
            let projected = self.bank.project(
                session.profile,
                session.current_weight_g,
                flow,
                self.prefs.system_lag_s,
            );
            if projected >= session.target_g {
                tracing::debug!(projected, target_g = session.target_g, "projection reached target");
                let _ = self.finish_brew();
            }
        } else if self.drip_settled(&session, now) {
            self.finalize(session, now);
        }
    }

    fn drip_settled(&self, session: &BrewSession, now: u64) -> bool {
        session.state == BrewState::Dripping
            && session
                .ended_ms
                .is_some_and(|end| now >= end.saturating_add(self.prefs.drip_settle_ms))
    }

    /// Record the shot, learn from it if it qualifies, persist, return to idle.
    fn finalize(&mut self, session: BrewSession, now: u64) {
        self.session = None;
        self.offline_since_ms = None;
        self.shot_counter = self.shot_counter.saturating_add(1);
        let shot = Shot {
            id: self.shot_counter,
            target_weight_g: session.target_g,
            final_weight_g: session.current_weight_g,
            last_flow_gps: session.last_flow_gps,
            stop_weight_g: session.stop_weight_g,
        };
        let connected = self.scale.is_connected();
        let qualified = connected && shot.qualifies(self.cfg.qualify_tolerance);

        let learned = if qualified {
            let l = self.bank.record(
                session.profile,
                shot,
                self.prefs.learning_rate,
                self.prefs.system_lag_s,
            );
            self.pending_beeps = self.cfg.beep_count;
            self.last_beep_ms = None;
            tracing::info!(
                id = shot.id,
                profile = ?session.profile,
                final_g = shot.final_weight_g,
                target_g = shot.target_weight_g,
                observed = ?l.observed,
                previous = l.previous,
                compensation = l.state,
                "shot finalized"
            );
            l
        } else {
            tracing::info!(
                id = shot.id,
                final_g = shot.final_weight_g,
                target_g = shot.target_weight_g,
                connected,
                "shot excluded from learning"
            );
            let s = self.bank.state(session.profile);
            Learned {
                observed: None,
                previous: s,
                state: s,
            }
        };

        if let Some(sink) = self.shot_log.as_mut() {
            let rec = ShotRecord {
                shot,
                profile: session.profile,
                model: self.bank.model().kind(),
                qualified,
                observed: learned.observed,
                compensation: learned.state,
                brew_ms: session
                    .ended_ms
                    .unwrap_or(now)
                    .saturating_sub(session.started_ms),
            };
            if let Err(e) = sink.record(&rec) {
                tracing::warn!(error = %e, "shot log write failed");
            }
        }

        self.persist();
        self.touch(now);
    }

    // ── History and preferences ─────────────────────────────────────────────

    /// Delete a stored shot and recompute its profile from scratch.
    pub fn delete_shot(&mut self, id: u32) -> Result<Profile, BrewRejection> {
        let profile = self.bank.remove(id).ok_or(BrewRejection::UnknownShot(id))?;
        let v = self
            .bank
            .recompute(profile, self.prefs.history_length, self.prefs.system_lag_s);
        tracing::info!(id, profile = ?profile, compensation = v, "shot deleted");
        self.persist();
        Ok(profile)
    }

    /// Reset both profiles to the default state and forget all shots.
    /// The shot counter keeps counting.
    pub fn clear_shot_data(&mut self) {
        self.bank.clear();
        tracing::info!("shot data cleared");
        self.persist();
    }

    /// Recompute both profiles from their full retained history.
    pub fn recalculate(&mut self) {
        self.bank
            .recompute_all(self.prefs.history_length, self.prefs.system_lag_s);
        let [split, full] = self.bank.states();
        tracing::info!(split, full, "compensation recomputed");
        self.persist();
    }

    pub fn set_prefs(&mut self, prefs: BrewPreferences) {
        let prefs = prefs.normalized();
        if !prefs.enabled && self.session.is_some_and(|s| s.state.is_pouring()) {
            let _ = self.abort_brew(Trigger::Remote);
        }
        if !prefs.enabled && self.waiting_for_macro {
            self.waiting_for_macro = false;
            self.machine.force_release();
        }
        if prefs.timezone != self.prefs.timezone {
            self.apply_timezone(&prefs.timezone);
        }
        self.prefs = prefs;
        tracing::info!(prefs = ?self.prefs, "preferences updated");
        self.persist();
    }

    pub(crate) fn apply_timezone(&mut self, tz: &str) {
        if let Some(w) = self.wall.as_mut()
            && !w.set_timezone(tz)
        {
            tracing::warn!(timezone = tz, "timezone not understood; keeping previous");
        }
    }

    pub fn saved_state(&self) -> SavedState {
        SavedState {
            shot_counter: self.shot_counter,
            compensation: self.bank.states(),
            split_shots: self.bank.history(Profile::Split).clone(),
            full_shots: self.bank.history(Profile::Full).clone(),
            prefs: self.prefs.clone(),
        }
    }

    /// Apply a loaded snapshot.
    pub(crate) fn restore(&mut self, saved: SavedState) {
        self.shot_counter = saved.shot_counter;
        self.bank
            .restore(saved.compensation, [saved.split_shots, saved.full_shots]);
        self.prefs = saved.prefs.normalized();
        let tz = self.prefs.timezone.clone();
        self.apply_timezone(&tz);
    }

    fn persist(&mut self) {
        let state = self.saved_state();
        if let Err(e) = self.store.save(&state) {
            tracing::warn!(error = %e, "settings not saved; keeping in-memory state");
        }
    }
}
