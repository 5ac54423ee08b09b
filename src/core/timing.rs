// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 itsakeyfut
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Timing Event System
//!
//! Deferred event delivery between the GPU side and the CPU-emulation side.
//!
//! # Architecture
//!
//! The GPU never raises an interrupt by calling into the CPU side directly.
//! Whenever it detects a condition the CPU must observe (a PE token or
//! finish, a FIFO breakpoint, a watermark crossing) it posts an event through
//! [`EventScheduler::schedule_event`]. The owner of the emulated timeline
//! advances time and collects due events with
//! [`TimingEventManager::run_events`], so the notification lands on the
//! consumer's timeline rather than inside the GPU call that detected it.
//!
//! # Example
//!
//! ```
//! use swgx::core::timing::{EventScheduler, TimingEventManager};
//!
//! let mut timing = TimingEventManager::new();
//!
//! // Register an event
//! let event_id = timing.register_event("PE Token");
//!
//! // Schedule it to run after 1000 cycles with a token payload
//! timing.schedule_event(1000, event_id, 0x1234);
//!
//! // Advance the emulated timeline
//! timing.pending_ticks = 1000;
//! let fired = timing.run_events();
//! assert_eq!(fired, vec![(event_id, 0x1234)]);
//! ```

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Tick count type (relative time in CPU cycles)
pub type TickCount = i32;

/// Global tick counter type (absolute time in CPU cycles since reset)
pub type GlobalTicks = u64;

/// Event handle (identifier for registered events)
pub type EventHandle = usize;

/// Scheduler interface consumed by the GPU pipeline
pub trait EventScheduler {
    /// Register a named event and return its handle
    fn register_event(&mut self, name: &'static str) -> EventHandle;

    /// Schedule `event` to fire after `delay` cycles carrying `userdata`
    fn schedule_event(&mut self, delay: TickCount, event: EventHandle, userdata: u64);
}

/// Timing event
///
/// Represents a single scheduled event that will execute at a specific time.
/// Events can be one-shot or periodic (with automatic rescheduling).
#[derive(Debug)]
pub struct TimingEvent {
    /// Event ID (handle)
    pub id: EventHandle,

    /// Event name (for debugging)
    pub name: &'static str,

    /// Next execution time (global ticks)
    pub next_run_time: GlobalTicks,

    /// Last execution time (global ticks)
    pub last_run_time: GlobalTicks,

    /// Interval for periodic events (0 = one-shot)
    pub interval: TickCount,

    /// Payload delivered with the event
    pub userdata: u64,

    /// Whether this event is currently active
    pub active: bool,
}

impl TimingEvent {
    /// Create a new timing event
    ///
    /// # Arguments
    ///
    /// * `id` - Event ID (handle)
    /// * `name` - Event name for debugging
    /// * `interval` - Interval for periodic events (0 for one-shot)
    pub fn new(id: EventHandle, name: &'static str, interval: TickCount) -> Self {
        Self {
            id,
            name,
            next_run_time: 0,
            last_run_time: 0,
            interval,
            userdata: 0,
            active: false,
        }
    }
}

/// Timing Event Manager
///
/// Manages the global timing system and schedules events for execution.
///
/// # Design
///
/// - Global tick counter tracks absolute time
/// - Pending ticks accumulate CPU cycles between event checks
/// - Downcount determines when to run events
/// - Events are indexed by handle; due events fire in time order
///
/// # Example
///
/// ```
/// use swgx::core::timing::TimingEventManager;
///
/// let mut timing = TimingEventManager::new();
/// let event = timing.register_event("CP Interrupt");
/// timing.schedule(event, 5000);
///
/// // Simulate 5000 CPU cycles
/// timing.pending_ticks = 5000;
/// timing.run_events();
/// ```
#[derive(Debug)]
pub struct TimingEventManager {
    /// Global tick counter (absolute time since reset)
    pub global_tick_counter: GlobalTicks,

    /// Tick counter at last event run
    pub event_run_tick_counter: GlobalTicks,

    /// Pending ticks (accumulated since last event run)
    pub pending_ticks: TickCount,

    /// Downcount (cycles until next event)
    pub downcount: TickCount,

    /// Registered events, indexed by handle
    events: Vec<TimingEvent>,
}

impl TimingEventManager {
    /// Create a new timing event manager
    ///
    /// # Example
    ///
    /// ```
    /// use swgx::core::timing::TimingEventManager;
    ///
    /// let timing = TimingEventManager::new();
    /// assert_eq!(timing.global_tick_counter, 0);
    /// assert_eq!(timing.pending_ticks, 0);
    /// ```
    pub fn new() -> Self {
        Self {
            global_tick_counter: 0,
            event_run_tick_counter: 0,
            pending_ticks: 0,
            downcount: i32::MAX,
            events: Vec::new(),
        }
    }

    /// Register a periodic event with automatic rescheduling
    ///
    /// # Arguments
    ///
    /// * `name` - Event name for debugging
    /// * `interval` - Interval between executions (in CPU cycles)
    pub fn register_periodic_event(
        &mut self,
        name: &'static str,
        interval: TickCount,
    ) -> EventHandle {
        let handle = self.events.len();
        self.events.push(TimingEvent::new(handle, name, interval));
        handle
    }

    /// Schedule an event to run after a specific number of cycles
    ///
    /// Activates the event and schedules it to run after `ticks` CPU cycles
    /// from the current time. Rescheduling an active event moves it.
    pub fn schedule(&mut self, handle: EventHandle, ticks: TickCount) {
        let userdata = self.events[handle].userdata;
        self.schedule_with(handle, ticks, userdata);
    }

    fn schedule_with(&mut self, handle: EventHandle, ticks: TickCount, userdata: u64) {
        let current_time = self.get_current_time();

        let event = &mut self.events[handle];
        event.next_run_time = current_time + ticks.max(0) as GlobalTicks;
        event.last_run_time = current_time;
        event.userdata = userdata;
        event.active = true;

        self.update_downcount();
    }

    /// Deactivate an event
    pub fn deactivate(&mut self, handle: EventHandle) {
        self.events[handle].active = false;
        self.update_downcount();
    }

    /// Whether `handle` is waiting to fire
    pub fn is_active(&self, handle: EventHandle) -> bool {
        self.events.get(handle).is_some_and(|e| e.active)
    }

    /// Name of a registered event
    pub fn event_name(&self, handle: EventHandle) -> Option<&'static str> {
        self.events.get(handle).map(|e| e.name)
    }

    /// Get current time (global_tick_counter + pending_ticks)
    #[inline]
    fn get_current_time(&self) -> GlobalTicks {
        self.global_tick_counter + self.pending_ticks as GlobalTicks
    }

    /// Update downcount to the next event's run time
    ///
    /// If no events are active, sets downcount to maximum.
    pub fn update_downcount(&mut self) {
        let next = self
            .events
            .iter()
            .filter(|e| e.active)
            .map(|e| e.next_run_time)
            .min();

        self.downcount = match next {
            Some(time) => {
                let cycles = time.saturating_sub(self.global_tick_counter);
                cycles.min(i32::MAX as u64) as i32
            }
            None => i32::MAX,
        };
    }

    /// Run pending timing events
    ///
    /// Advances global time by pending_ticks and fires every event whose
    /// execution time has been reached, earliest first.
    ///
    /// # Returns
    ///
    /// `(handle, userdata)` pairs of the events that fired
    ///
    /// # Example
    ///
    /// ```
    /// use swgx::core::timing::TimingEventManager;
    ///
    /// let mut timing = TimingEventManager::new();
    /// let event = timing.register_event("Test");
    /// timing.schedule(event, 1000);
    ///
    /// timing.pending_ticks = 1000;
    /// let triggered = timing.run_events();
    /// assert_eq!(triggered.len(), 1);
    /// assert_eq!(triggered[0].0, event);
    /// ```
    pub fn run_events(&mut self) -> Vec<(EventHandle, u64)> {
        self.global_tick_counter = self.event_run_tick_counter + self.pending_ticks as GlobalTicks;
        self.pending_ticks = 0;

        let now = self.global_tick_counter;
        let mut due: Vec<(GlobalTicks, EventHandle)> = self
            .events
            .iter()
            .filter(|e| e.active && e.next_run_time <= now)
            .map(|e| (e.next_run_time, e.id))
            .collect();
        due.sort_unstable();

        let mut triggered = Vec::with_capacity(due.len());
        for (_, handle) in due {
            let event = &mut self.events[handle];
            let ticks_late = (now - event.next_run_time) as TickCount;

            log::trace!(
                "Timing: Event '{}' executed (late: {} ticks)",
                event.name,
                ticks_late
            );

            if event.interval > 0 {
                event.last_run_time = event.next_run_time;
                event.next_run_time += event.interval as GlobalTicks;
            } else {
                event.active = false;
            }

            triggered.push((handle, event.userdata));
        }

        self.update_downcount();
        self.event_run_tick_counter = self.global_tick_counter;

        triggered
    }

    /// Reset the timing system
    ///
    /// Clears all state and deactivates all events. Registrations survive.
    pub fn reset(&mut self) {
        self.global_tick_counter = 0;
        self.event_run_tick_counter = 0;
        self.pending_ticks = 0;
        self.downcount = i32::MAX;

        for event in &mut self.events {
            event.active = false;
            event.next_run_time = 0;
            event.last_run_time = 0;
            event.userdata = 0;
        }
    }
}

impl EventScheduler for TimingEventManager {
    fn register_event(&mut self, name: &'static str) -> EventHandle {
        let handle = self.events.len();
        self.events.push(TimingEvent::new(handle, name, 0));
        handle
    }

    fn schedule_event(&mut self, delay: TickCount, event: EventHandle, userdata: u64) {
        self.schedule_with(event, delay, userdata);
    }
}

impl TimingEventManager {
    /// Register a new one-shot event
    ///
    /// Inherent alias of [`EventScheduler::register_event`] so callers do not
    /// need the trait in scope.
    ///
    /// # Example
    ///
    /// ```
    /// use swgx::core::timing::TimingEventManager;
    ///
    /// let mut timing = TimingEventManager::new();
    /// let event = timing.register_event("Test Event");
    /// assert_eq!(timing.event_name(event), Some("Test Event"));
    /// ```
    pub fn register_event(&mut self, name: &'static str) -> EventHandle {
        <Self as EventScheduler>::register_event(self, name)
    }
}

impl Default for TimingEventManager {
    fn default() -> Self {
        Self::new()
    }
}

/// Scheduler that records posted events without a timeline
///
/// Useful for driving the GPU in isolation: every posted event is kept in
/// order and can be drained by the caller.
#[derive(Debug, Default)]
pub struct EventLog {
    names: Vec<&'static str>,
    posted: Vec<(TickCount, EventHandle, u64)>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Posted events in submission order
    pub fn posted(&self) -> &[(TickCount, EventHandle, u64)] {
        &self.posted
    }

    /// Handles posted so far, by name
    pub fn posted_named(&self, name: &str) -> Vec<u64> {
        self.posted
            .iter()
            .filter(|(_, handle, _)| self.names.get(*handle).is_some_and(|n| *n == name))
            .map(|(_, _, userdata)| *userdata)
            .collect()
    }

    /// Take every posted event, leaving the log empty
    pub fn drain(&mut self) -> Vec<(TickCount, EventHandle, u64)> {
        std::mem::take(&mut self.posted)
    }
}

impl EventScheduler for EventLog {
    fn register_event(&mut self, name: &'static str) -> EventHandle {
        self.names.push(name);
        self.names.len() - 1
    }

    fn schedule_event(&mut self, delay: TickCount, event: EventHandle, userdata: u64) {
        self.posted.push((delay, event, userdata));
    }
}

/// Thread-shareable handle to a [`TimingEventManager`]
///
/// The GPU thread posts through its clone while the CPU side advances the
/// timeline through another.
#[derive(Debug, Clone, Default)]
pub struct SharedScheduler {
    inner: Arc<Mutex<TimingEventManager>>,
}

impl SharedScheduler {
    pub fn new(manager: TimingEventManager) -> Self {
        Self {
            inner: Arc::new(Mutex::new(manager)),
        }
    }

    /// Lock the underlying manager
    ///
    /// A panic on another thread leaves the timeline usable.
    pub fn lock(&self) -> MutexGuard<'_, TimingEventManager> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl EventScheduler for SharedScheduler {
    fn register_event(&mut self, name: &'static str) -> EventHandle {
        self.lock().register_event(name)
    }

    fn schedule_event(&mut self, delay: TickCount, event: EventHandle, userdata: u64) {
        self.lock().schedule_event(delay, event, userdata);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shared_scheduler_clones_share_timeline() {
        let mut gpu_side = SharedScheduler::default();
        let cpu_side = gpu_side.clone();

        let event = gpu_side.register_event("PE Finish");
        gpu_side.schedule_event(0, event, 3);

        let fired = cpu_side.lock().run_events();
        assert_eq!(fired, vec![(event, 3)]);
    }

    #[test]
    fn test_timing_manager_initialization() {
        let timing = TimingEventManager::new();
        assert_eq!(timing.global_tick_counter, 0);
        assert_eq!(timing.pending_ticks, 0);
        assert_eq!(timing.downcount, i32::MAX);
    }

    #[test]
    fn test_event_registration() {
        let mut timing = TimingEventManager::new();
        let event = timing.register_event("Test Event");
        assert_eq!(event, 0);
        assert_eq!(timing.events.len(), 1);
        assert_eq!(timing.events[0].name, "Test Event");
        assert!(!timing.events[0].active);
    }

    #[test]
    fn test_event_scheduling() {
        let mut timing = TimingEventManager::new();
        let event = timing.register_event("Test");

        timing.schedule(event, 1000);

        assert!(timing.events[0].active);
        assert_eq!(timing.events[0].next_run_time, 1000);
        assert_eq!(timing.downcount, 1000);
    }

    #[test]
    fn test_userdata_delivered() {
        let mut timing = TimingEventManager::new();
        let event = timing.register_event("PE Token");

        timing.schedule_event(0, event, 0xBEEF);
        let triggered = timing.run_events();

        assert_eq!(triggered, vec![(event, 0xBEEF)]);
        assert!(!timing.is_active(event));
    }

    #[test]
    fn test_multiple_events_in_order() {
        let mut timing = TimingEventManager::new();
        let event1 = timing.register_event("Event 1");
        let event2 = timing.register_event("Event 2");
        let event3 = timing.register_event("Event 3");

        timing.schedule(event1, 1000);
        timing.schedule(event2, 500);
        timing.schedule(event3, 1500);

        timing.pending_ticks = 500;
        let triggered = timing.run_events();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].0, event2);

        timing.pending_ticks = 500;
        let triggered = timing.run_events();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].0, event1);

        timing.pending_ticks = 500;
        let triggered = timing.run_events();
        assert_eq!(triggered.len(), 1);
        assert_eq!(triggered[0].0, event3);
    }

    #[test]
    fn test_same_tick_events_fire_earliest_first() {
        let mut timing = TimingEventManager::new();
        let late = timing.register_event("Late");
        let early = timing.register_event("Early");

        timing.schedule(late, 300);
        timing.schedule(early, 100);

        timing.pending_ticks = 1000;
        let triggered: Vec<_> = timing.run_events().into_iter().map(|(h, _)| h).collect();
        assert_eq!(triggered, vec![early, late]);
    }

    #[test]
    fn test_periodic_event() {
        let mut timing = TimingEventManager::new();
        let event = timing.register_periodic_event("Periodic", 1000);

        timing.schedule(event, 1000);

        timing.pending_ticks = 1000;
        let triggered = timing.run_events();
        assert_eq!(triggered.len(), 1);
        assert!(timing.events[0].active);
        assert_eq!(timing.events[0].next_run_time, 2000);

        timing.pending_ticks = 1000;
        let triggered = timing.run_events();
        assert_eq!(triggered.len(), 1);
        assert_eq!(timing.events[0].next_run_time, 3000);
    }

    #[test]
    fn test_event_deactivation() {
        let mut timing = TimingEventManager::new();
        let event = timing.register_event("Test");

        timing.schedule(event, 1000);
        assert!(timing.events[0].active);

        timing.deactivate(event);
        assert!(!timing.events[0].active);
        assert_eq!(timing.downcount, i32::MAX);
    }

    #[test]
    fn test_late_event_execution() {
        let mut timing = TimingEventManager::new();
        let event = timing.register_event("Test");

        timing.schedule(event, 1000);

        timing.pending_ticks = 1500;
        let triggered = timing.run_events();

        assert_eq!(triggered.len(), 1);
        assert_eq!(timing.global_tick_counter, 1500);
    }

    #[test]
    fn test_reset() {
        let mut timing = TimingEventManager::new();
        let event = timing.register_event("Test");

        timing.schedule(event, 1000);
        timing.pending_ticks = 500;
        timing.run_events();

        timing.reset();

        assert_eq!(timing.global_tick_counter, 0);
        assert_eq!(timing.pending_ticks, 0);
        assert!(!timing.events[0].active);
    }

    #[test]
    fn test_event_log_records_in_order() {
        let mut log = EventLog::new();
        let token = log.register_event("PE Token");
        let finish = log.register_event("PE Finish");

        log.schedule_event(0, token, 7);
        log.schedule_event(0, finish, 0);
        log.schedule_event(0, token, 8);

        assert_eq!(log.posted_named("PE Token"), vec![7, 8]);
        assert_eq!(log.drain().len(), 3);
        assert!(log.posted().is_empty());
    }
}
