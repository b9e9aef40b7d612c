//! Blocking command facade for callers outside the engine loop.
//!
//! Each command validates its request, builds a [`SyntheticActor`] that
//! stands in for the configured operator, runs the engine operation through
//! the [`Bridge`] and folds every result into a [`CommandOutcome`].
//!
//! Methods block the calling thread; call them from a plain thread or from
//! `tokio::task::spawn_blocking`, never from a runtime worker.

use std::time::Duration;

use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use tutorbot_gateway_protocol::{ChannelId, ChannelInfo, GuildInfo, Member, RoleId, RoleInfo, UserId};

use crate::actor::{ActorIdentity, SyntheticActor};
use crate::attendance::AttendanceError;
use crate::bridge::{Bridge, BridgeError};
use crate::config::Config;
use crate::engine::{Engine, SurveyDelivery, SurveyRequest};
use crate::error::{EngineError, EngineResult};
use crate::survey::{Question, QuestionKind, SurveyError};

/// Default number of messages a clear deletes.
pub const DEFAULT_CLEAR_LIMIT: u32 = 10;

const NOT_RUNNING: &str = "Bot is not running";
const INCORRECT_GROUP: &str = "Incorrect group id.";

// ============================================================================
// Outcomes
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutcomeStatus {
    Success,
    Error,
    /// The bot is not in a state to run the command.
    Conflict,
}

/// Result of a controller command, ready to serialize.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandOutcome {
    pub status: OutcomeStatus,
    pub message: String,
    /// Query results, for commands that return some.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandOutcome {
    fn new(status: OutcomeStatus, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
            data: None,
        }
    }

    pub fn success(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Success, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Error, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(OutcomeStatus::Conflict, message)
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn is_success(&self) -> bool {
        self.status == OutcomeStatus::Success
    }
}

// ============================================================================
// Requests
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AttendanceRequest {
    pub status: Option<String>,
    pub group_id: Option<String>,
    pub attendance_code: Option<String>,
    /// User that receives the bot's replies.
    pub target_user_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct SimpleSurveyRequest {
    pub channel_id: Option<u64>,
    pub message: Option<String>,
    pub topic: Option<String>,
    pub button_type: Option<String>,
    /// Seconds; the configured default when absent.
    pub duration: Option<u64>,
    /// Post behind a "Participate" announcement instead of in the channel.
    #[serde(default)]
    pub broadcast: bool,
    pub target_user_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ComplexSurveyRequest {
    pub channel_id: Option<u64>,
    pub message: Option<String>,
    pub topic: Option<String>,
    #[serde(default)]
    pub questions: Vec<String>,
    #[serde(default)]
    pub button_types: Vec<String>,
    pub duration: Option<u64>,
    pub target_user_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct FeedbackRequest {
    pub group_id: Option<String>,
    pub channel_id: Option<u64>,
    pub duration: Option<u64>,
    pub target_user_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GreetRequest {
    pub message: Option<String>,
    pub target_user_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct GiveRoleRequest {
    pub member_id: Option<u64>,
    pub role_id: Option<u64>,
    pub target_user_id: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClearRequest {
    pub channel_id: Option<u64>,
    pub limit: Option<u32>,
    pub target_user_id: Option<u64>,
}

/// A request tagged with the command it belongs to, as read from a command
/// line such as `{"command": "greet", "message": "hi"}`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "command", rename_all = "snake_case")]
pub enum Command {
    Attendance(AttendanceRequest),
    SimpleSurvey(SimpleSurveyRequest),
    ComplexSurvey(ComplexSurveyRequest),
    Feedback(FeedbackRequest),
    Greet(GreetRequest),
    GiveRole(GiveRoleRequest),
    Clear(ClearRequest),
    Guild,
    Channels,
    Roles,
    Members,
}

// ============================================================================
// Controller
// ============================================================================

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error("access roles do not include the admin role '{0}'")]
    MissingAdminRole(String),
}

type Outcome = Result<CommandOutcome, CommandOutcome>;

#[derive(Clone)]
pub struct Controller {
    bridge: Bridge<Engine>,
    identity: ActorIdentity,
    admin_role: String,
    timeout: Duration,
    default_duration: Duration,
}

impl Controller {
    /// Build a controller acting with the configured access roles.
    ///
    /// Fails when those roles do not include the admin role, since every
    /// command would be refused.
    pub fn new(config: &Config, bridge: Bridge<Engine>) -> Result<Self, ControllerError> {
        let identity = ActorIdentity {
            user_id: UserId(config.bot.operator_user_id.unwrap_or_default()),
            name: "controller".to_string(),
            roles: config.access.roles.clone(),
        };
        if !identity.has_role(&config.access.admin_role) {
            return Err(ControllerError::MissingAdminRole(
                config.access.admin_role.clone(),
            ));
        }
        Ok(Self {
            bridge,
            identity,
            admin_role: config.access.admin_role.clone(),
            timeout: config.bridge.timeout(),
            default_duration: config.surveys.default_duration(),
        })
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_running(&self) -> bool {
        self.bridge.is_available()
    }

    fn actor(&self, target_user_id: Option<u64>) -> SyntheticActor {
        SyntheticActor::new(
            self.identity.clone(),
            &self.admin_role,
            target_user_id.map(UserId),
        )
    }

    /// Run an engine operation on the loop, mapping failures to outcomes.
    fn run<T, F>(&self, action: &str, work: F) -> Result<T, CommandOutcome>
    where
        F: for<'a> FnOnce(&'a mut Engine) -> BoxFuture<'a, EngineResult<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.bridge
            .submit_and_wait(work, self.timeout)
            .map_err(|e| failure(action, e))
    }

    /// Run a read-only engine operation and attach its result as data.
    fn query<T, F, M>(&self, action: &str, work: F, summary: M) -> CommandOutcome
    where
        F: for<'a> FnOnce(&'a mut Engine) -> BoxFuture<'a, EngineResult<T>> + Send + 'static,
        T: Serialize + Send + 'static,
        M: FnOnce(&T) -> String,
    {
        let value = match self.run(action, work) {
            Ok(value) => value,
            Err(outcome) => return outcome,
        };
        match serde_json::to_value(&value) {
            Ok(data) => CommandOutcome::success(summary(&value)).with_data(data),
            Err(e) => CommandOutcome::error(format!("Failed to {action}: {e}")),
        }
    }

    fn duration(&self, seconds: Option<u64>) -> Result<Duration, CommandOutcome> {
        match seconds {
            None => Ok(self.default_duration),
            Some(0) => Err(CommandOutcome::error(SurveyError::ZeroDuration.to_string())),
            Some(s) => Ok(Duration::from_secs(s)),
        }
    }

    /// Run any command. Blocks the calling thread until the engine answers.
    pub fn execute(&self, command: Command) -> CommandOutcome {
        match command {
            Command::Attendance(r) => self.attendance(r),
            Command::SimpleSurvey(r) => self.simple_survey(r),
            Command::ComplexSurvey(r) => self.complex_survey(r),
            Command::Feedback(r) => self.feedback(r),
            Command::Greet(r) => self.greet(r),
            Command::GiveRole(r) => self.give_role(r),
            Command::Clear(r) => self.clear(r),
            Command::Guild => self.guild(),
            Command::Channels => self.channels(),
            Command::Roles => self.roles(),
            Command::Members => self.members(),
        }
    }

    // ------------------------------------------------------------------------
    // Attendance
    // ------------------------------------------------------------------------

    pub fn attendance(&self, request: AttendanceRequest) -> CommandOutcome {
        self.try_attendance(request).unwrap_or_else(|outcome| outcome)
    }

    fn try_attendance(&self, request: AttendanceRequest) -> Outcome {
        let status = required_text(request.status, "Status parameter is required")?.to_lowercase();
        if status != "start" && status != "stop" {
            return Err(CommandOutcome::error("Status must be 'start' or 'stop'"));
        }
        let group = required_text(request.group_id, "Group ID parameter is required")?;
        let code = required_text(request.attendance_code, "Attendance code parameter is required")?;
        let target = required(request.target_user_id, "Target User ID parameter is required")?;

        let actor = self.actor(Some(target));
        let executed = format!(
            "Attendance command executed: {status} attendance for group {group} with code {code}"
        );

        if status == "start" {
            self.run("process attendance", move |engine| {
                Box::pin(async move {
                    engine
                        .start_attendance(&actor, &group, &code)
                        .await
                        .map(|_| ())
                })
            })?;
            info!("{executed}");
            return Ok(CommandOutcome::success(executed));
        }

        let report = self.run("process attendance", move |engine| {
            Box::pin(async move { engine.stop_attendance(&actor, &group).await })
        })?;
        info!(saved = report.saved(), "{executed}");
        match report.persist_error {
            None => Ok(CommandOutcome::success(executed)),
            Some(e) => Ok(CommandOutcome::success(format!(
                "{executed} (attendance records could not be saved: {e})"
            ))),
        }
    }

    // ------------------------------------------------------------------------
    // Surveys
    // ------------------------------------------------------------------------

    pub fn simple_survey(&self, request: SimpleSurveyRequest) -> CommandOutcome {
        self.try_simple_survey(request).unwrap_or_else(|outcome| outcome)
    }

    fn try_simple_survey(&self, request: SimpleSurveyRequest) -> Outcome {
        let channel = ChannelId(required(request.channel_id, "Channel ID parameter is required")?);
        let message = required_text(request.message, "Message parameter is required")?;
        let topic = required_text(request.topic, "Topic parameter is required")?;
        let kind = parse_kind(&required_text(
            request.button_type,
            "Button type parameter is required",
        )?)?;
        let duration = self.duration(request.duration)?;

        let delivery = if request.broadcast {
            SurveyDelivery::Broadcast(channel)
        } else {
            SurveyDelivery::Direct(channel)
        };
        let survey = SurveyRequest {
            questions: vec![Question::new(message.clone(), kind)],
            message,
            topic,
            duration,
            delivery,
        };
        let actor = self.actor(request.target_user_id);

        self.run("create survey", move |engine| {
            Box::pin(async move { engine.create_survey(&actor, survey).await })
        })?;
        Ok(CommandOutcome::success(format!(
            "Survey created in channel {channel} for {} seconds",
            duration.as_secs()
        )))
    }

    pub fn complex_survey(&self, request: ComplexSurveyRequest) -> CommandOutcome {
        self.try_complex_survey(request)
            .unwrap_or_else(|outcome| outcome)
    }

    fn try_complex_survey(&self, request: ComplexSurveyRequest) -> Outcome {
        let channel = ChannelId(required(request.channel_id, "Channel ID parameter is required")?);
        let message = required_text(request.message, "Message parameter is required")?;
        let topic = required_text(request.topic, "Topic parameter is required")?;
        if request.questions.is_empty() {
            return Err(CommandOutcome::error(
                SurveyError::EmptyQuestions.to_string(),
            ));
        }
        if request.questions.len() != request.button_types.len() {
            return Err(CommandOutcome::error(
                SurveyError::CountMismatch {
                    questions: request.questions.len(),
                    kinds: request.button_types.len(),
                }
                .to_string(),
            ));
        }
        let questions = request
            .questions
            .into_iter()
            .zip(&request.button_types)
            .map(|(prompt, kind)| Ok(Question::new(prompt, parse_kind(kind)?)))
            .collect::<Result<Vec<_>, CommandOutcome>>()?;
        let duration = self.duration(request.duration)?;

        let count = questions.len();
        let survey = SurveyRequest {
            message,
            topic,
            questions,
            duration,
            delivery: SurveyDelivery::Broadcast(channel),
        };
        let actor = self.actor(request.target_user_id);

        self.run("create survey", move |engine| {
            Box::pin(async move { engine.create_survey(&actor, survey).await })
        })?;
        Ok(CommandOutcome::success(format!(
            "Survey with {count} questions announced in channel {channel}"
        )))
    }

    pub fn feedback(&self, request: FeedbackRequest) -> CommandOutcome {
        self.try_feedback(request).unwrap_or_else(|outcome| outcome)
    }

    fn try_feedback(&self, request: FeedbackRequest) -> Outcome {
        let group = required_text(request.group_id, "Group ID parameter is required")?;
        let channel = ChannelId(required(request.channel_id, "Channel ID parameter is required")?);
        let duration = self.duration(request.duration)?;
        let actor = self.actor(request.target_user_id);

        self.run("create feedback", move |engine| {
            Box::pin(async move {
                engine
                    .create_feedback_form(&actor, &group, channel, duration)
                    .await
            })
        })?;
        Ok(CommandOutcome::success(format!(
            "Feedback was created in channel {channel}, the timer is set to: {} seconds.",
            duration.as_secs()
        )))
    }

    // ------------------------------------------------------------------------
    // Administration
    // ------------------------------------------------------------------------

    pub fn greet(&self, request: GreetRequest) -> CommandOutcome {
        let actor = self.actor(request.target_user_id);
        let message = request.message;
        self.run("greet", move |engine| {
            Box::pin(async move { engine.greet(&actor, message.as_deref()).await })
        })
        .map(|()| CommandOutcome::success("Greeting sent"))
        .unwrap_or_else(|outcome| outcome)
    }

    pub fn give_role(&self, request: GiveRoleRequest) -> CommandOutcome {
        self.try_give_role(request).unwrap_or_else(|outcome| outcome)
    }

    fn try_give_role(&self, request: GiveRoleRequest) -> Outcome {
        let member = UserId(required(request.member_id, "Member ID parameter is required")?);
        let role = RoleId(required(request.role_id, "Role ID parameter is required")?);
        let actor = self.actor(request.target_user_id);

        let reply = self.run("give role", move |engine| {
            Box::pin(async move { engine.give_role(&actor, member, role).await })
        })?;
        Ok(CommandOutcome::success(reply))
    }

    pub fn clear(&self, request: ClearRequest) -> CommandOutcome {
        self.try_clear(request).unwrap_or_else(|outcome| outcome)
    }

    fn try_clear(&self, request: ClearRequest) -> Outcome {
        let channel = ChannelId(required(request.channel_id, "Channel ID parameter is required")?);
        let limit = request.limit.unwrap_or(DEFAULT_CLEAR_LIMIT);
        let limit = u8::try_from(limit)
            .ok()
            .filter(|l| (1..=100).contains(l))
            .ok_or_else(|| CommandOutcome::error("Limit must be between 1 and 100"))?;
        let actor = self.actor(request.target_user_id);

        let deleted = self.run("clear messages", move |engine| {
            Box::pin(async move { engine.clear_messages(&actor, channel, limit).await })
        })?;
        Ok(CommandOutcome::success(format!(
            "Deleted {deleted} messages in channel {channel}."
        )))
    }

    // ------------------------------------------------------------------------
    // Guild directory
    // ------------------------------------------------------------------------

    pub fn guild(&self) -> CommandOutcome {
        let actor = self.actor(None);
        self.query(
            "fetch guild info",
            move |engine| Box::pin(async move { engine.guild_info(&actor).await }),
            |guild: &GuildInfo| format!("Connected to guild {}", guild.name),
        )
    }

    pub fn channels(&self) -> CommandOutcome {
        let actor = self.actor(None);
        self.query(
            "list channels",
            move |engine| Box::pin(async move { engine.channels(&actor).await }),
            |channels: &Vec<ChannelInfo>| format!("{} channels", channels.len()),
        )
    }

    pub fn roles(&self) -> CommandOutcome {
        let actor = self.actor(None);
        self.query(
            "list roles",
            move |engine| Box::pin(async move { engine.roles(&actor).await }),
            |roles: &Vec<RoleInfo>| format!("{} roles", roles.len()),
        )
    }

    pub fn members(&self) -> CommandOutcome {
        let actor = self.actor(None);
        self.query(
            "list members",
            move |engine| Box::pin(async move { engine.members(&actor).await }),
            |members: &Vec<Member>| format!("{} members", members.len()),
        )
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn required<T>(value: Option<T>, message: &str) -> Result<T, CommandOutcome> {
    value.ok_or_else(|| CommandOutcome::error(message))
}

/// Like [`required`], but blank strings count as missing.
fn required_text(value: Option<String>, message: &str) -> Result<String, CommandOutcome> {
    let value = required(value, message)?;
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CommandOutcome::error(message));
    }
    Ok(trimmed.to_string())
}

fn parse_kind(raw: &str) -> Result<QuestionKind, CommandOutcome> {
    raw.parse()
        .map_err(|e: SurveyError| CommandOutcome::error(e.to_string()))
}

fn failure(action: &str, error: BridgeError<EngineError>) -> CommandOutcome {
    match error {
        BridgeError::Failed(EngineError::Attendance(AttendanceError::UnknownGroup(_))) => {
            CommandOutcome::error(INCORRECT_GROUP)
        }
        e if e.is_unavailable() => {
            warn!(action, error = %e, "Command refused, engine is not running");
            CommandOutcome::conflict(NOT_RUNNING)
        }
        BridgeError::Timeout(timeout) => CommandOutcome::error(format!(
            "Timed out after {} seconds waiting for the bot to {action}",
            timeout.as_secs()
        )),
        e => {
            warn!(action, error = %e, "Command failed");
            CommandOutcome::error(format!("Failed to {action}: {e}"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AccessRole;

    fn config(roles: &[&str]) -> Config {
        let mut config = Config::default();
        config.access.roles = roles
            .iter()
            .enumerate()
            .map(|(i, name)| AccessRole {
                id: i as u64 + 1,
                name: name.to_string(),
            })
            .collect();
        config
    }

    fn controller() -> Controller {
        Controller::new(&config(&["Admin"]), Bridge::new()).unwrap()
    }

    #[test]
    fn new_requires_admin_role() {
        assert!(matches!(
            Controller::new(&config(&["Member"]), Bridge::new()),
            Err(ControllerError::MissingAdminRole(role)) if role == "Admin"
        ));
        assert!(Controller::new(&config(&["member", "admin"]), Bridge::new()).is_ok());
    }

    #[test]
    fn attendance_validates_before_touching_bridge() {
        let controller = controller();
        let cases = [
            (AttendanceRequest::default(), "Status parameter is required"),
            (
                AttendanceRequest {
                    status: Some("pause".into()),
                    ..Default::default()
                },
                "Status must be 'start' or 'stop'",
            ),
            (
                AttendanceRequest {
                    status: Some("start".into()),
                    ..Default::default()
                },
                "Group ID parameter is required",
            ),
            (
                AttendanceRequest {
                    status: Some("start".into()),
                    group_id: Some("g1".into()),
                    attendance_code: Some("  ".into()),
                    ..Default::default()
                },
                "Attendance code parameter is required",
            ),
            (
                AttendanceRequest {
                    status: Some("stop".into()),
                    group_id: Some("g1".into()),
                    attendance_code: Some("abc".into()),
                    target_user_id: None,
                },
                "Target User ID parameter is required",
            ),
        ];

        for (request, message) in cases {
            assert_eq!(controller.attendance(request), CommandOutcome::error(message));
        }
    }

    #[test]
    fn not_running_is_a_conflict() {
        let outcome = controller().attendance(AttendanceRequest {
            status: Some("START".into()),
            group_id: Some("g1".into()),
            attendance_code: Some("abc".into()),
            target_user_id: Some(5),
        });
        assert_eq!(outcome, CommandOutcome::conflict("Bot is not running"));
    }

    #[test]
    fn complex_survey_checks_counts_and_kinds() {
        let controller = controller();
        let base = ComplexSurveyRequest {
            channel_id: Some(1),
            message: Some("Feedback".into()),
            topic: Some("trees".into()),
            ..Default::default()
        };

        let outcome = controller.complex_survey(ComplexSurveyRequest {
            questions: vec!["Q1".into(), "Q2".into()],
            button_types: vec!["Score".into()],
            ..base.clone()
        });
        assert_eq!(
            outcome,
            CommandOutcome::error("got 2 questions but 1 button types")
        );

        let outcome = controller.complex_survey(ComplexSurveyRequest {
            questions: vec!["Q1".into()],
            button_types: vec!["stars".into()],
            ..base.clone()
        });
        assert_eq!(outcome.status, OutcomeStatus::Error);
        assert!(outcome.message.contains("stars"));

        let outcome = controller.complex_survey(base);
        assert_eq!(
            outcome,
            CommandOutcome::error("a survey needs at least one question")
        );
    }

    #[test]
    fn clear_limit_is_bounded() {
        let controller = controller();
        for limit in [0, 101, 1000] {
            let outcome = controller.clear(ClearRequest {
                channel_id: Some(1),
                limit: Some(limit),
                target_user_id: None,
            });
            assert_eq!(outcome, CommandOutcome::error("Limit must be between 1 and 100"));
        }
    }

    #[test]
    fn zero_duration_is_rejected() {
        let outcome = controller().feedback(FeedbackRequest {
            group_id: Some("g1".into()),
            channel_id: Some(1),
            duration: Some(0),
            target_user_id: None,
        });
        assert_eq!(
            outcome,
            CommandOutcome::error("survey duration must be greater than zero")
        );
    }

    #[test]
    fn commands_parse_from_tagged_json() {
        let command: Command =
            serde_json::from_str(r#"{"command": "give_role", "member_id": 7, "role_id": 9}"#)
                .unwrap();
        assert!(matches!(
            command,
            Command::GiveRole(GiveRoleRequest { member_id: Some(7), role_id: Some(9), .. })
        ));

        let command: Command = serde_json::from_str(r#"{"command": "clear", "channel_id": 3}"#).unwrap();
        let outcome = controller().execute(command);
        assert_eq!(outcome, CommandOutcome::conflict(NOT_RUNNING));

        assert!(serde_json::from_str::<Command>(r#"{"command": "dance"}"#).is_err());

        let command: Command = serde_json::from_str(r#"{"command": "roles"}"#).unwrap();
        assert!(matches!(command, Command::Roles));
        assert_eq!(controller().execute(command), CommandOutcome::conflict(NOT_RUNNING));
    }

    #[test]
    fn outcome_serializes_lowercase_status() {
        let json = serde_json::to_value(CommandOutcome::conflict(NOT_RUNNING)).unwrap();
        assert_eq!(json["status"], "conflict");
        assert_eq!(json["message"], "Bot is not running");
        assert!(json.get("data").is_none());

        let json = serde_json::to_value(
            CommandOutcome::success("2 roles").with_data(serde_json::json!([1, 2])),
        )
        .unwrap();
        assert_eq!(json["data"], serde_json::json!([1, 2]));
    }
}
