use std::collections::VecDeque;

use super::ids::{ChainId, ViewId};
use super::view::{SessionView, ViewSpec};

/// Read-only description of a chain, cloned once per participant.
#[derive(Debug, Clone)]
pub struct ChainTemplate {
    topic: String,
    specs: Vec<ViewSpec>,
}

impl ChainTemplate {
    pub fn new(topic: impl Into<String>, specs: Vec<ViewSpec>) -> Self {
        Self {
            topic: topic.into(),
            specs,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn specs(&self) -> &[ViewSpec] {
        &self.specs
    }

    /// Build an independent chain with fresh views in template order.
    ///
    /// Every view of the chain is pending; the caller pops the head.
    pub fn instantiate(&self) -> (Chain, Vec<SessionView>) {
        let id = ChainId::new();
        let views: Vec<SessionView> = self
            .specs
            .iter()
            .map(|spec| SessionView::new(spec.clone(), self.topic.clone(), Some(id.clone())))
            .collect();
        let chain = Chain {
            id,
            pending: views.iter().map(|v| v.id().clone()).collect(),
            head: None,
        };
        (chain, views)
    }
}

/// Runtime state of one chain: the delivered head and the views still queued.
#[derive(Debug)]
pub struct Chain {
    id: ChainId,
    pending: VecDeque<ViewId>,
    head: Option<ViewId>,
}

impl Chain {
    pub fn id(&self) -> &ChainId {
        &self.id
    }

    pub fn is_head(&self, view: &ViewId) -> bool {
        self.head.as_ref() == Some(view)
    }

    /// Pop the next pending view and make it the head.
    pub fn advance(&mut self) -> Option<ViewId> {
        let next = self.pending.pop_front()?;
        self.head = Some(next.clone());
        Some(next)
    }

    /// Drop the remaining queue, returning the ids that were never delivered.
    pub fn discard_pending(&mut self) -> Vec<ViewId> {
        self.pending.drain(..).collect()
    }
}
