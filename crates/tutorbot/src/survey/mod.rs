//! Survey state: views, chains, announcements and feedback forms.
//!
//! Everything here is plain data mutated from the engine loop. The board
//! decides what happens on a press or an expiry and reports it; sending,
//! editing and persisting are left to the engine.
//!
//! A chain is a queue of views answered by one participant in order. The
//! in-progress entry travels with the head; when the queue is empty the
//! entry is finalized on the last view and persisted when that view expires.

mod announcement;
mod chain;
mod entry;
mod feedback;
mod ids;
mod kind;
mod view;

use std::collections::HashMap;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;
use tutorbot_gateway_protocol::{MessageRef, UserId};

pub use announcement::Announcement;
pub use chain::{Chain, ChainTemplate};
pub use entry::{NAME_COLUMN, SurveyEntry};
pub use feedback::{Category, FEEDBACK_COLUMN, FeedbackForm, Vote};
pub use ids::{AnnouncementId, ChainId, FormId, ViewId};
pub use kind::QuestionKind;
pub use view::{CHAINED_TAG, Question, SINGLE_TAG, Selection, SessionView, ViewSpec};

#[derive(Debug, Error)]
pub enum SurveyError {
    #[error("a survey needs at least one question")]
    EmptyQuestions,

    #[error("a survey with several questions must be broadcast")]
    ChainRequiresBroadcast,

    #[error("survey duration must be greater than zero")]
    ZeroDuration,

    #[error("got {questions} questions but {kinds} button types")]
    CountMismatch { questions: usize, kinds: usize },

    #[error("unknown button type '{0}' (expected Difficulty or Score)")]
    UnknownKind(String),
}

// ============================================================================
// Button targets
// ============================================================================

/// What a button's custom id points at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Target {
    View { view: ViewId, option: usize },
    Announcement(AnnouncementId),
    Feedback { form: FormId, category: Category },
}

impl Target {
    pub fn parse(custom_id: &str) -> Option<Self> {
        let mut parts = custom_id.split(':');
        let target = match (parts.next()?, parts.next()?, parts.next()) {
            ("sv", view, Some(option)) => Self::View {
                view: ViewId::parse(view)?,
                option: option.parse().ok()?,
            },
            ("an", ann, None) => Self::Announcement(AnnouncementId::parse(ann)?),
            ("fb", form, Some(category)) => Self::Feedback {
                form: FormId::parse(form)?,
                category: Category::from_index(category.parse().ok()?)?,
            },
            _ => return None,
        };
        parts.next().is_none().then_some(target)
    }
}

// ============================================================================
// Outcomes
// ============================================================================

/// Result of a press on a view.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Press {
    /// No live view with that id.
    Unknown,
    /// Already answered by this participant, or not a valid option.
    Ignored,
    /// The entry is complete and stored on `view`.
    Finalized { view: ViewId, disable: bool },
    /// The entry moved to `next`, which must now be delivered.
    Advanced {
        from: ViewId,
        next: ViewId,
        disable: bool,
    },
}

/// Result of pressing "Participate".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Participation {
    Unknown,
    AlreadyTaken,
    /// A fresh chain was built; `first` must be delivered to the participant.
    Started { first: ViewId },
}

/// A view removed on timeout, with everything needed to persist it.
#[derive(Debug)]
pub struct ExpiredView {
    pub view: SessionView,
    /// True when the view was the chain's head, which ends the chain.
    pub chain_ended: bool,
    /// Undelivered views dropped with the chain.
    pub discarded: usize,
}

// ============================================================================
// Board
// ============================================================================

#[derive(Debug, Default)]
pub struct SurveyBoard {
    views: HashMap<ViewId, SessionView>,
    chains: HashMap<ChainId, Chain>,
    announcements: HashMap<AnnouncementId, Announcement>,
    forms: HashMap<FormId, FeedbackForm>,
}

impl SurveyBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn view(&self, id: &ViewId) -> Option<&SessionView> {
        self.views.get(id)
    }

    pub fn announcement(&self, id: &AnnouncementId) -> Option<&Announcement> {
        self.announcements.get(id)
    }

    pub fn announcement_mut(&mut self, id: &AnnouncementId) -> Option<&mut Announcement> {
        self.announcements.get_mut(id)
    }

    pub fn form_mut(&mut self, id: &FormId) -> Option<&mut FeedbackForm> {
        self.forms.get_mut(id)
    }

    pub fn live_views(&self) -> usize {
        self.views.len()
    }

    pub fn live_chains(&self) -> usize {
        self.chains.len()
    }

    /// Register a standalone view answered by anyone in a channel.
    pub fn add_direct_view(&mut self, spec: ViewSpec, topic: &str) -> ViewId {
        let view = SessionView::new(spec, topic, None);
        let id = view.id().clone();
        self.views.insert(id.clone(), view);
        id
    }

    pub fn add_announcement(
        &mut self,
        text: &str,
        template: ChainTemplate,
        duration: Duration,
    ) -> AnnouncementId {
        let announcement = Announcement::new(text, template, duration);
        let id = announcement.id().clone();
        self.announcements.insert(id.clone(), announcement);
        id
    }

    pub fn add_form(&mut self, form: FeedbackForm) -> FormId {
        let id = form.id().clone();
        self.forms.insert(id.clone(), form);
        id
    }

    /// Drop a view that could not be delivered.
    pub fn remove_view(&mut self, id: &ViewId) -> Option<SessionView> {
        self.views.remove(id)
    }

    pub fn remove_announcement(&mut self, id: &AnnouncementId) -> Option<Announcement> {
        self.announcements.remove(id)
    }

    pub fn remove_form(&mut self, id: &FormId) -> Option<FeedbackForm> {
        self.forms.remove(id)
    }

    /// Clone the announcement's chain for `user` unless they already took it.
    pub fn participate(&mut self, id: &AnnouncementId, user: UserId) -> Participation {
        let Some(announcement) = self.announcements.get_mut(id) else {
            return Participation::Unknown;
        };
        if !announcement.register(user) {
            return Participation::AlreadyTaken;
        }

        let (mut chain, views) = announcement.template().instantiate();
        let Some(first) = chain.advance() else {
            return Participation::Unknown;
        };
        self.views
            .extend(views.into_iter().map(|view| (view.id().clone(), view)));
        self.chains.insert(chain.id().clone(), chain);

        debug!(announcement = %id, user = %user, first = %first, "Cloned survey chain");
        Participation::Started { first }
    }

    /// Apply a participant's choice to a view.
    pub fn press(&mut self, id: &ViewId, user: UserId, name: &str, option: usize) -> Press {
        let Some(view) = self.views.get_mut(id) else {
            return Press::Unknown;
        };
        if view.select(user, name, option) != Selection::Recorded {
            return Press::Ignored;
        }
        let disable = view.spec().disable_on_answer;

        let next = view
            .chain()
            .and_then(|chain| self.chains.get_mut(chain))
            .and_then(Chain::advance);

        match next {
            None => {
                view.finalize();
                Press::Finalized {
                    view: id.clone(),
                    disable,
                }
            }
            Some(next) => {
                let entry = view.take_entry();
                if let Some(next_view) = self.views.get_mut(&next) {
                    next_view.receive_entry(entry);
                }
                Press::Advanced {
                    from: id.clone(),
                    next,
                    disable,
                }
            }
        }
    }

    /// Remove a view whose deadline passed.
    ///
    /// If it is its chain's head, the chain ends and undelivered views go with it.
    pub fn expire_view(&mut self, id: &ViewId) -> Option<ExpiredView> {
        let view = self.views.remove(id)?;
        let mut chain_ended = false;
        let mut discarded = 0;

        if let Some(chain_id) = view.chain()
            && self.chains.get(chain_id).is_some_and(|c| c.is_head(id))
            && let Some(mut chain) = self.chains.remove(chain_id)
        {
            chain_ended = true;
            for pending in chain.discard_pending() {
                self.views.remove(&pending);
                discarded += 1;
            }
        }

        Some(ExpiredView {
            view,
            chain_ended,
            discarded,
        })
    }

    pub fn set_view_message(&mut self, id: &ViewId, message: MessageRef) {
        if let Some(view) = self.views.get_mut(id) {
            view.set_message(message);
        }
    }
}
