use std::path::PathBuf;

use chrono::Local;
use tracing::{debug, error, info, warn};
use tutorbot_gateway_protocol::{Card, CardField, InboundMessage, OutboundMessage};

use super::Engine;
use crate::actor::SyntheticActor;
use crate::attendance::{Admission, Started, roster_text};
use crate::error::EngineResult;
use crate::flush::flush_roster;

const ACCEPTING: &str = "accepting messages in DM, please send attendance code.";
const ADDED: &str = "You are added to the attendance list.";
const SAVED: &str = "Attendance records have been saved to a CSV file.";
const SAVE_FAILED: &str = "⚠️ There was an error saving the attendance records.";

/// What a stop produced. The group is closed whether or not saving worked.
#[derive(Debug, Clone)]
pub struct AttendanceReport {
    pub group: String,
    pub code: Option<String>,
    pub roster: Vec<String>,
    /// Where the roster was written, if it was.
    pub saved_to: Option<PathBuf>,
    pub persist_error: Option<String>,
}

impl AttendanceReport {
    pub fn saved(&self) -> bool {
        self.persist_error.is_none()
    }
}

impl Engine {
    /// Open a group for attendance with `code`.
    pub async fn start_attendance(
        &mut self,
        actor: &SyntheticActor,
        group: &str,
        code: &str,
    ) -> EngineResult<Started> {
        actor.ensure_privileged()?;
        let started = self.attendance.start(group, code)?;

        if let Some(previous) = &started.superseded {
            warn!(
                group = %started.group,
                previous = %previous,
                "Attendance code moved; previous group no longer accepts entries"
            );
        }
        info!(group = %started.group, code = %started.code, "Attendance started");

        actor.respond(self.transport.as_ref(), ACCEPTING).await;
        Ok(started)
    }

    /// Close a group and persist its roster.
    ///
    /// A storage failure is logged and carried in the report; it never fails
    /// the transition.
    pub async fn stop_attendance(
        &mut self,
        actor: &SyntheticActor,
        group: &str,
    ) -> EngineResult<AttendanceReport> {
        actor.ensure_privileged()?;
        let stopped = self.attendance.stop(group)?;
        let code = stopped.code.clone().unwrap_or_default();

        let (saved_to, persist_error) =
            match flush_roster(self.store.as_ref(), &stopped.group, &stopped.roster, Local::now())
                .await
            {
                Ok(path) => {
                    info!(
                        group = %stopped.group,
                        count = stopped.roster.len(),
                        path = %path.display(),
                        "Attendance saved"
                    );
                    (Some(path), None)
                }
                Err(e) => {
                    error!(group = %stopped.group, error = %e, "Failed to save attendance");
                    (None, Some(e.to_string()))
                }
            };

        let transport = self.transport.as_ref();
        actor
            .respond(
                transport,
                format!("messages in DM are no longer accepted for code {code}."),
            )
            .await;
        actor
            .send(
                transport,
                OutboundMessage::default().with_card(Card {
                    title: format!("Attendance for group {} with code {}", stopped.group, code),
                    fields: vec![CardField {
                        name: "Students".to_string(),
                        value: roster_text(&stopped.roster),
                        inline: false,
                    }],
                }),
            )
            .await;
        actor
            .send(
                transport,
                if persist_error.is_none() {
                    SAVED
                } else {
                    SAVE_FAILED
                },
            )
            .await;

        Ok(AttendanceReport {
            group: stopped.group,
            code: stopped.code,
            roster: stopped.roster,
            saved_to,
            persist_error,
        })
    }

    /// Attendance intake: a message equal to the active code adds its author
    /// to the open group. The acknowledgement goes where the code was sent.
    pub(super) async fn on_message(&mut self, message: &InboundMessage) {
        if message.author.bot {
            return;
        }
        let Some(group) = self.attendance.matching_group(&message.content) else {
            return;
        };
        let group = group.to_string();

        let member = match self.transport.resolve_member(message.author.id).await {
            Ok(Some(member)) => member,
            Ok(None) => {
                debug!(user = %message.author.id, "Attendance code from non-member ignored");
                return;
            }
            Err(e) => {
                warn!(user = %message.author.id, error = %e, "Failed to resolve attendance sender");
                return;
            }
        };

        match self.attendance.admit(&member.participant_tag()) {
            Admission::Added { group } => {
                info!(group = %group, user = %member.id, "Added to attendance");
                let acked = if message.direct {
                    self.transport.send_direct(member.id, ADDED.into()).await
                } else {
                    self.transport
                        .send_message(message.channel_id, ADDED.into())
                        .await
                };
                if let Err(e) = acked {
                    error!(user = %member.id, error = %e, "Failed to acknowledge attendance");
                }
            }
            Admission::AlreadyListed => {
                debug!(group = %group, user = %member.id, "Already in attendance");
            }
            Admission::NotOpen => {}
        }
    }
}
