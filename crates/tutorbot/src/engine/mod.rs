//! Session collection engine.
//!
//! The engine owns the chat transport, the attendance book, the survey board
//! and all deadlines. It runs as a single task; gateway events, fired
//! deadlines and bridge jobs are handled one at a time on that task, so no
//! state here is ever touched concurrently.

mod admin;
mod attendance;
mod guild;
mod survey;
mod timers;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use tutorbot_gateway_protocol::{ChatTransport, GatewayEvent, Sender, UserId};

pub use attendance::AttendanceReport;
pub use survey::{SurveyDelivery, SurveyHandle, SurveyRequest};
pub use timers::{TimerKey, TimerReceiver, Timers};

use crate::attendance::AttendanceBook;
use crate::bridge::{Bridge, BridgeReceiver};
use crate::config::{AccessRole, Config};
use crate::store::RecordStore;
use crate::survey::SurveyBoard;

/// Engine settings taken from [`Config`].
#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub groups: Vec<String>,
    /// Known roles, used to name roles in replies. Replaced by the guild's
    /// roles once the gateway is ready.
    pub roles: Vec<AccessRole>,
    pub default_duration: Duration,
}

impl EngineConfig {
    pub fn from_config(config: &Config) -> Self {
        Self {
            groups: config.groups.clone(),
            roles: config.access.roles.clone(),
            default_duration: config.surveys.default_duration(),
        }
    }
}

pub struct Engine {
    transport: Arc<dyn ChatTransport>,
    store: Arc<dyn RecordStore>,
    attendance: AttendanceBook,
    surveys: SurveyBoard,
    timers: Timers,
    roles: Vec<AccessRole>,
    default_duration: Duration,
    bot_user: Option<UserId>,
}

impl Engine {
    /// Build an engine. Fired deadlines arrive on the returned receiver and
    /// must be fed back through [`Engine::handle_timer`] (the spawned loop
    /// does this itself).
    pub fn new(
        config: EngineConfig,
        transport: Arc<dyn ChatTransport>,
        store: Arc<dyn RecordStore>,
    ) -> (Self, TimerReceiver) {
        let (timers, timer_rx) = Timers::new();
        let engine = Self {
            transport,
            store,
            attendance: AttendanceBook::new(config.groups),
            surveys: SurveyBoard::new(),
            timers,
            roles: config.roles,
            default_duration: config.default_duration,
            bot_user: None,
        };
        (engine, timer_rx)
    }

    /// Attach to `bridge` and run the engine loop until shutdown.
    ///
    /// The loop stops when `shutdown_rx` flips to true, when the gateway sends
    /// [`GatewayEvent::Shutdown`] or closes its channel. Bridge jobs already
    /// queued at that point still run; new submissions fail.
    pub fn spawn(
        self,
        timer_rx: TimerReceiver,
        bridge: &Bridge<Engine>,
        events: mpsc::Receiver<GatewayEvent>,
        shutdown_rx: watch::Receiver<bool>,
    ) -> JoinHandle<()> {
        let engine_loop = EngineLoop {
            engine: self,
            jobs: bridge.attach(),
            timer_rx,
            events,
            shutdown_rx,
        };
        tokio::spawn(engine_loop.run())
    }

    pub fn attendance(&self) -> &AttendanceBook {
        &self.attendance
    }

    pub fn surveys(&self) -> &SurveyBoard {
        &self.surveys
    }

    pub fn pending_timers(&self) -> usize {
        self.timers.pending()
    }

    pub fn default_duration(&self) -> Duration {
        self.default_duration
    }

    pub fn bot_user(&self) -> Option<UserId> {
        self.bot_user
    }

    pub fn transport(&self) -> &dyn ChatTransport {
        self.transport.as_ref()
    }

    /// Dispatch one gateway event.
    pub async fn handle_event(&mut self, event: GatewayEvent) {
        match event {
            GatewayEvent::Ready { bot_user_id } => {
                info!(bot_user_id = %bot_user_id, "Gateway ready");
                self.bot_user = Some(bot_user_id);
                self.refresh_roles().await;
            }
            GatewayEvent::MessageReceived(message) => self.on_message(&message).await,
            GatewayEvent::ButtonPressed(press) => self.on_press(&press).await,
            GatewayEvent::Shutdown { reason } => {
                debug!(%reason, "Gateway shutdown event reached engine");
            }
        }
    }

    /// Handle a fired deadline. Keys that were cancelled or already handled
    /// are ignored.
    pub async fn handle_timer(&mut self, key: TimerKey) {
        if !self.timers.fired(&key) {
            debug!(?key, "Ignoring stale timer");
            return;
        }
        match key {
            TimerKey::View(id) => self.expire_view(&id).await,
            TimerKey::Announcement(id) => self.expire_announcement(&id).await,
            TimerKey::Feedback(id) => self.expire_form(&id).await,
        }
    }

    /// `"Display (username)"` for a presser, member or not.
    async fn participant_name(&self, sender: &Sender) -> String {
        match self.transport.resolve_member(sender.id).await {
            Ok(Some(member)) => member.participant_tag(),
            Ok(None) => fallback_tag(sender),
            Err(e) => {
                debug!(user = %sender.id, error = %e, "Member lookup failed, using account name");
                fallback_tag(sender)
            }
        }
    }
}

fn fallback_tag(sender: &Sender) -> String {
    let display = sender.display_name.as_deref().unwrap_or(&sender.username);
    format!("{} ({})", display, sender.username)
}

// ============================================================================
// Loop
// ============================================================================

struct EngineLoop {
    engine: Engine,
    jobs: BridgeReceiver<Engine>,
    timer_rx: TimerReceiver,
    events: mpsc::Receiver<GatewayEvent>,
    shutdown_rx: watch::Receiver<bool>,
}

impl EngineLoop {
    async fn run(mut self) {
        info!("Engine loop started");

        loop {
            tokio::select! {
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        debug!("Engine received shutdown signal");
                        break;
                    }
                }

                job = self.jobs.recv() => {
                    match job {
                        Some(job) => job(&mut self.engine).await,
                        None => {
                            debug!("Bridge detached, stopping engine");
                            break;
                        }
                    }
                }

                Some(key) = self.timer_rx.recv() => {
                    self.engine.handle_timer(key).await;
                }

                event = self.events.recv() => {
                    match event {
                        Some(GatewayEvent::Shutdown { reason }) => {
                            info!(%reason, "Gateway shut down");
                            break;
                        }
                        Some(event) => self.engine.handle_event(event).await,
                        None => {
                            debug!("Gateway event channel closed");
                            break;
                        }
                    }
                }
            }
        }

        // Jobs queued before the loop stopped still run.
        self.jobs.close();
        while let Some(job) = self.jobs.try_recv() {
            job(&mut self.engine).await;
        }
        self.engine.timers.abort_all();

        info!("Engine loop stopped");
    }
}
