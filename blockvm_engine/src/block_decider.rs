//! Middleware for intercepting and synthesizing block-editing events.
//!
//! External controllers simulate user actions by feeding synthetic events
//! through a [`BlockDecider`]: every event can be passed through, rewritten,
//! multiplied, or rejected by a pluggable decision handler. The decider also
//! keeps a bounded history of recent events as context for the handler.
//!
//! This layer operates on the pre-compilation block graph only; it never
//! touches the IR or the optimizer.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;

/// Default bound on the event history.
pub const MAX_HISTORY: usize = 100;

/// Workspace position of a block.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinates {
    pub x: f64,
    pub y: f64,
}

/// A synthetic block-editing event, shaped like the events the visual
/// editor emits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BlockEvent {
    Create {
        block_id: String,
        opcode: String,
        #[serde(default)]
        fields: BTreeMap<String, String>,
        #[serde(default)]
        inputs: BTreeMap<String, String>,
        top_level: bool,
        coordinates: Option<Coordinates>,
    },
    Delete {
        block_id: String,
    },
    Move {
        block_id: String,
        /// None moves the block to the top level.
        new_parent_id: Option<String>,
        /// Input name on the parent; None attaches to the next connection.
        new_input_name: Option<String>,
        coordinates: Option<Coordinates>,
    },
    ChangeField {
        block_id: String,
        field: String,
        new_value: String,
    },
}

impl BlockEvent {
    pub fn block_id(&self) -> &str {
        match self {
            BlockEvent::Create { block_id, .. }
            | BlockEvent::Delete { block_id }
            | BlockEvent::Move { block_id, .. }
            | BlockEvent::ChangeField { block_id, .. } => block_id,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            BlockEvent::Create { .. } => "create",
            BlockEvent::Delete { .. } => "delete",
            BlockEvent::Move { .. } => "move",
            BlockEvent::ChangeField { .. } => "change_field",
        }
    }
}

/// One remembered event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryEntry {
    pub kind: &'static str,
    pub block_id: String,
    /// Monotonic sequence number, in lieu of a wall clock.
    pub seq: u64,
}

/// Handler deciding what actually happens to an event. Returning an empty
/// vector rejects it; returning several events expands it.
pub type DecisionHandler = dyn FnMut(&BlockEvent, &VecDeque<HistoryEntry>) -> Vec<BlockEvent> + Send;

pub struct BlockDecider {
    enabled: bool,
    handler: Option<Box<DecisionHandler>>,
    history: VecDeque<HistoryEntry>,
    max_history: usize,
    next_seq: u64,
}

impl Default for BlockDecider {
    fn default() -> Self {
        Self {
            enabled: false,
            handler: None,
            history: VecDeque::new(),
            max_history: MAX_HISTORY,
            next_seq: 0,
        }
    }
}

impl BlockDecider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    pub fn disable(&mut self) {
        self.enabled = false;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn set_decision_handler(
        &mut self,
        handler: impl FnMut(&BlockEvent, &VecDeque<HistoryEntry>) -> Vec<BlockEvent> + Send + 'static,
    ) {
        self.handler = Some(Box::new(handler));
    }

    pub fn history(&self) -> &VecDeque<HistoryEntry> {
        &self.history
    }

    pub fn clear_history(&mut self) {
        self.history.clear();
    }

    /// Run one event through the middleware. Disabled deciders pass events
    /// through untouched and record nothing.
    pub fn process(&mut self, event: BlockEvent) -> Vec<BlockEvent> {
        if !self.enabled {
            return vec![event];
        }

        self.remember(&event);

        match self.handler.as_mut() {
            Some(handler) => handler(&event, &self.history),
            None => vec![event],
        }
    }

    fn remember(&mut self, event: &BlockEvent) {
        self.history.push_back(HistoryEntry {
            kind: event.kind(),
            block_id: event.block_id().to_string(),
            seq: self.next_seq,
        });
        self.next_seq += 1;
        while self.history.len() > self.max_history {
            self.history.pop_front();
        }
    }
}

impl fmt::Debug for BlockDecider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockDecider")
            .field("enabled", &self.enabled)
            .field("has_handler", &self.handler.is_some())
            .field("history_len", &self.history.len())
            .finish()
    }
}
