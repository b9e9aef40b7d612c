use std::time::Duration;

use chrono::Local;
use tracing::{debug, error, info, warn};
use tutorbot_gateway_protocol::{ButtonPress, ChannelId, MessageRef, OutboundMessage, UserId};

use super::{Engine, TimerKey};
use crate::actor::SyntheticActor;
use crate::attendance::AttendanceError;
use crate::error::EngineResult;
use crate::flush::flush_records;
use crate::store::RecordKey;
use crate::survey::{
    AnnouncementId, Category, ChainTemplate, FeedbackForm, FormId, Participation, Press, Question,
    SurveyEntry, SurveyError, Target, ViewId, ViewSpec, Vote,
};

const CREATING_SIMPLE: &str = "Creating the survey, it may take some time.";
const CREATING_COMPLEX: &str =
    "Creating the multiple question survey with the provided questions and button types.";
const THANKS: &str = "```Thank you for your feedback!```";
const ALREADY_TAKEN: &str = "You've already taken the survey.";

/// Where a survey goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SurveyDelivery {
    /// Post the question itself to a channel; anyone there may answer.
    Direct(ChannelId),
    /// Post an announcement; each participant gets a private copy.
    Broadcast(ChannelId),
}

#[derive(Debug, Clone)]
pub struct SurveyRequest {
    /// Announcement text. Direct surveys show the question prompt instead.
    pub message: String,
    pub topic: String,
    pub questions: Vec<Question>,
    pub duration: Duration,
    pub delivery: SurveyDelivery,
}

/// What a created survey can be addressed by.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SurveyHandle {
    View(ViewId),
    Announcement(AnnouncementId),
}

impl Engine {
    /// Post a survey. Simple direct surveys become a single channel view;
    /// everything else is broadcast behind an announcement.
    pub async fn create_survey(
        &mut self,
        actor: &SyntheticActor,
        request: SurveyRequest,
    ) -> EngineResult<SurveyHandle> {
        actor.ensure_privileged()?;
        let SurveyRequest {
            message,
            topic,
            questions,
            duration,
            delivery,
        } = request;

        if questions.is_empty() {
            return Err(SurveyError::EmptyQuestions.into());
        }
        if duration.is_zero() {
            return Err(SurveyError::ZeroDuration.into());
        }
        let simple = questions.len() == 1;
        if !simple && matches!(delivery, SurveyDelivery::Direct(_)) {
            return Err(SurveyError::ChainRequiresBroadcast.into());
        }

        actor
            .respond(
                self.transport.as_ref(),
                if simple { CREATING_SIMPLE } else { CREATING_COMPLEX },
            )
            .await;

        match delivery {
            SurveyDelivery::Direct(channel) => {
                let question = questions
                    .into_iter()
                    .next()
                    .ok_or(SurveyError::EmptyQuestions)?;
                self.post_direct_view(channel, question, &topic, duration)
                    .await
                    .map(SurveyHandle::View)
            }
            SurveyDelivery::Broadcast(channel) => {
                let specs = questions
                    .into_iter()
                    .map(|q| ViewSpec::new(q, duration, true))
                    .collect();
                let template = ChainTemplate::new(topic, specs);
                self.post_announcement(channel, &message, template, duration)
                    .await
                    .map(SurveyHandle::Announcement)
            }
        }
    }

    async fn post_direct_view(
        &mut self,
        channel: ChannelId,
        question: Question,
        topic: &str,
        duration: Duration,
    ) -> EngineResult<ViewId> {
        let id = self
            .surveys
            .add_direct_view(ViewSpec::new(question, duration, false), topic);
        let rendered = self.render_view(&id);

        match self.transport.send_message(channel, rendered).await {
            Ok(sent) => {
                self.surveys.set_view_message(&id, sent);
                self.timers.schedule(TimerKey::View(id.clone()), duration);
                info!(view = %id, channel = %channel, topic, "Survey posted");
                Ok(id)
            }
            Err(e) => {
                self.surveys.remove_view(&id);
                Err(e.into())
            }
        }
    }

    async fn post_announcement(
        &mut self,
        channel: ChannelId,
        text: &str,
        template: ChainTemplate,
        duration: Duration,
    ) -> EngineResult<AnnouncementId> {
        let questions = template.specs().len();
        let id = self.surveys.add_announcement(text, template, duration);
        let rendered = self
            .surveys
            .announcement(&id)
            .map(|a| a.render())
            .unwrap_or_default();

        match self.transport.send_message(channel, rendered).await {
            Ok(sent) => {
                if let Some(announcement) = self.surveys.announcement_mut(&id) {
                    announcement.set_message(sent);
                    self.timers
                        .schedule(TimerKey::Announcement(id.clone()), announcement.duration());
                }
                info!(announcement = %id, channel = %channel, questions, "Survey announced");
                Ok(id)
            }
            Err(e) => {
                self.surveys.remove_announcement(&id);
                Err(e.into())
            }
        }
    }

    /// Post a tutor-session feedback form for `group`.
    pub async fn create_feedback_form(
        &mut self,
        actor: &SyntheticActor,
        group: &str,
        channel: ChannelId,
        duration: Duration,
    ) -> EngineResult<FormId> {
        actor.ensure_privileged()?;
        if duration.is_zero() {
            return Err(SurveyError::ZeroDuration.into());
        }
        let group = self
            .attendance
            .group_ids()
            .find(|g| g.eq_ignore_ascii_case(group.trim()))
            .map(str::to_string)
            .ok_or_else(|| AttendanceError::UnknownGroup(group.to_string()))?;

        let form = FeedbackForm::new(
            group.clone(),
            RecordKey::tutor_feedback(&group, Local::now()),
            duration,
        );
        let rendered = form.render();
        let id = self.surveys.add_form(form);

        let sent = match self.transport.send_message(channel, rendered).await {
            Ok(sent) => sent,
            Err(e) => {
                self.surveys.remove_form(&id);
                return Err(e.into());
            }
        };
        if let Some(form) = self.surveys.form_mut(&id) {
            form.set_message(sent);
            self.timers
                .schedule(TimerKey::Feedback(id.clone()), form.duration());
        }
        info!(form = %id, group = %group, channel = %channel, "Feedback form posted");

        actor
            .respond(
                self.transport.as_ref(),
                format!(
                    "Feedback was created in channel {channel}, the timer is set to: {} seconds.",
                    duration.as_secs()
                ),
            )
            .await;
        Ok(id)
    }

    // ========================================================================
    // Presses
    // ========================================================================

    pub(super) async fn on_press(&mut self, press: &ButtonPress) {
        let Some(target) = Target::parse(&press.custom_id) else {
            debug!(custom_id = %press.custom_id, "Press on foreign button ignored");
            return;
        };
        match target {
            Target::View { view, option } => self.press_view(press, &view, option).await,
            Target::Announcement(id) => self.participate(press, &id).await,
            Target::Feedback { form, category } => self.vote(press, &form, category).await,
        }
    }

    async fn press_view(&mut self, press: &ButtonPress, view: &ViewId, option: usize) {
        let user = press.user.id;
        let name = self.participant_name(&press.user).await;

        match self.surveys.press(view, user, &name, option) {
            Press::Unknown => {
                debug!(view = %view, user = %user, "Press on expired or unknown view");
            }
            Press::Ignored => {
                debug!(view = %view, user = %user, "Repeated or invalid selection ignored");
            }
            Press::Finalized { view, disable } => {
                if disable {
                    self.disable_view(&view).await;
                }
                self.notify(user, THANKS.into()).await;
                debug!(view = %view, user = %user, "Survey entry completed");
            }
            Press::Advanced {
                from,
                next,
                disable,
            } => {
                if disable {
                    self.disable_view(&from).await;
                }
                self.deliver_view(user, &next).await;
            }
        }
    }

    async fn participate(&mut self, press: &ButtonPress, id: &AnnouncementId) {
        let user = press.user.id;
        match self.surveys.participate(id, user) {
            Participation::Unknown => {
                debug!(announcement = %id, "Participate on expired announcement");
            }
            Participation::AlreadyTaken => self.notify(user, ALREADY_TAKEN.into()).await,
            Participation::Started { first } => self.deliver_view(user, &first).await,
        }
    }

    async fn vote(&mut self, press: &ButtonPress, id: &FormId, category: Category) {
        let user = press.user.id;
        let name = self.participant_name(&press.user).await;
        let Some(form) = self.surveys.form_mut(id) else {
            debug!(form = %id, "Vote on expired form");
            return;
        };
        if form.record(user, &name, category) == Vote::Duplicate {
            debug!(form = %id, user = %user, "Repeated vote ignored");
            return;
        }
        let (message, rendered) = (form.message(), form.render());
        if let Some(message) = message {
            self.edit(message, rendered).await;
        }
    }

    /// Send a view privately and start its deadline.
    ///
    /// The deadline starts even if delivery fails, so the chain still ends.
    async fn deliver_view(&mut self, user: UserId, id: &ViewId) {
        let Some(view) = self.surveys.view(id) else {
            return;
        };
        let duration = view.spec().duration;
        let rendered = view.render();

        match self.transport.send_direct(user, rendered).await {
            Ok(sent) => self.surveys.set_view_message(id, sent),
            Err(e) => error!(view = %id, user = %user, error = %e, "Failed to deliver survey view"),
        }
        self.timers.schedule(TimerKey::View(id.clone()), duration);
    }

    async fn disable_view(&self, id: &ViewId) {
        if let Some(view) = self.surveys.view(id)
            && let Some(message) = view.message()
        {
            self.edit(message, view.render().disabled()).await;
        }
    }

    fn render_view(&self, id: &ViewId) -> OutboundMessage {
        self.surveys
            .view(id)
            .map(|v| v.render())
            .unwrap_or_default()
    }

    async fn edit(&self, target: MessageRef, message: OutboundMessage) {
        if let Err(e) = self.transport.edit_message(target, message).await {
            warn!(message = %target.message_id, error = %e, "Failed to update message");
        }
    }

    async fn notify(&self, user: UserId, message: OutboundMessage) {
        if let Err(e) = self.transport.send_direct(user, message).await {
            error!(user = %user, error = %e, "Failed to send direct message");
        }
    }

    // ========================================================================
    // Expiry
    // ========================================================================

    pub(super) async fn expire_view(&mut self, id: &ViewId) {
        let Some(expired) = self.surveys.expire_view(id) else {
            return;
        };
        let view = &expired.view;

        if let Some(message) = view.message() {
            self.edit(message, view.render().disabled()).await;
        }
        if expired.discarded > 0 {
            debug!(view = %id, discarded = expired.discarded, "Chain ended before it was completed");
        }

        let completed = view.completed();
        if completed.is_empty() {
            debug!(view = %id, "View expired without completed entries");
            return;
        }

        let key = RecordKey::survey(view.tag(), view.topic(), Local::now());
        match flush_records(
            self.store.as_ref(),
            &key,
            completed.iter().map(SurveyEntry::to_record),
        )
        .await
        {
            Ok(summary) => info!(
                key = %key,
                saved = summary.appended,
                duplicates = summary.duplicates,
                "Survey results saved"
            ),
            Err(e) => error!(key = %key, error = %e, "Failed to save survey results"),
        }
    }

    pub(super) async fn expire_announcement(&mut self, id: &AnnouncementId) {
        let Some(announcement) = self.surveys.remove_announcement(id) else {
            return;
        };
        if let Some(message) = announcement.message() {
            self.edit(message, announcement.render().disabled()).await;
        }
        info!(
            announcement = %id,
            participants = announcement.participant_count(),
            "Announcement closed"
        );
    }

    pub(super) async fn expire_form(&mut self, id: &FormId) {
        let Some(form) = self.surveys.remove_form(id) else {
            return;
        };
        if let Some(message) = form.message() {
            self.edit(message, form.render().disabled()).await;
        }

        let records = form.records();
        if records.is_empty() {
            info!(form = %id, group = %form.group(), "Feedback form closed without votes");
            return;
        }
        match flush_records(self.store.as_ref(), form.key(), records).await {
            Ok(summary) => info!(
                form = %id,
                key = %form.key(),
                saved = summary.appended,
                "Tutor session feedback saved"
            ),
            Err(e) => error!(form = %id, error = %e, "Failed to save tutor session feedback"),
        }
    }
}
