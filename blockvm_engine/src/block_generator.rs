//! Public API for synthesizing block edits.
//!
//! Wraps the [`BlockDecider`] middleware with target validation and event
//! delivery: callers describe an edit, the generator builds the synthetic
//! event, routes it through the decider, and hands whatever survives to the
//! event sink (the runtime's block store).

use crate::block_decider::{BlockDecider, BlockEvent, Coordinates};
use std::collections::BTreeMap;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("target with id `{0}` not found")]
    TargetNotFound(String),
}

/// Where delivered events land. The runtime implements this per project.
pub trait EventSink {
    fn has_target(&self, target_id: &str) -> bool;
    fn deliver(&mut self, target_id: &str, event: BlockEvent);
}

/// Options for [`BlockGenerator::create_block`].
#[derive(Debug, Clone)]
pub struct CreateBlockOptions {
    pub fields: BTreeMap<String, String>,
    pub inputs: BTreeMap<String, String>,
    pub coordinates: Option<Coordinates>,
    pub top_level: bool,
    /// Generated when not provided.
    pub block_id: Option<String>,
}

impl Default for CreateBlockOptions {
    fn default() -> Self {
        Self {
            fields: BTreeMap::new(),
            inputs: BTreeMap::new(),
            coordinates: None,
            top_level: true,
            block_id: None,
        }
    }
}

/// Options for [`BlockGenerator::move_block`].
#[derive(Debug, Clone, Default)]
pub struct MoveBlockOptions {
    /// None moves the block to the top level.
    pub parent_id: Option<String>,
    /// Input name on the parent; None attaches to the next connection.
    pub input_name: Option<String>,
    pub coordinates: Option<Coordinates>,
}

pub struct BlockGenerator<S: EventSink> {
    sink: S,
    decider: BlockDecider,
    next_block_id: u64,
}

impl<S: EventSink> BlockGenerator<S> {
    pub fn new(sink: S) -> Self {
        Self {
            sink,
            decider: BlockDecider::new(),
            next_block_id: 0,
        }
    }

    pub fn decider_mut(&mut self) -> &mut BlockDecider {
        &mut self.decider
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Create a block on the target; returns the created block's id.
    pub fn create_block(
        &mut self,
        target_id: &str,
        opcode: &str,
        options: CreateBlockOptions,
    ) -> Result<String, EngineError> {
        let block_id = options
            .block_id
            .unwrap_or_else(|| self.generate_block_id());
        let event = BlockEvent::Create {
            block_id: block_id.clone(),
            opcode: opcode.to_string(),
            fields: options.fields,
            inputs: options.inputs,
            top_level: options.top_level,
            coordinates: options.coordinates,
        };
        self.dispatch(target_id, event)?;
        Ok(block_id)
    }

    pub fn delete_block(&mut self, target_id: &str, block_id: &str) -> Result<(), EngineError> {
        self.dispatch(
            target_id,
            BlockEvent::Delete {
                block_id: block_id.to_string(),
            },
        )
    }

    pub fn move_block(
        &mut self,
        target_id: &str,
        block_id: &str,
        options: MoveBlockOptions,
    ) -> Result<(), EngineError> {
        self.dispatch(
            target_id,
            BlockEvent::Move {
                block_id: block_id.to_string(),
                new_parent_id: options.parent_id,
                new_input_name: options.input_name,
                coordinates: options.coordinates,
            },
        )
    }

    pub fn change_field(
        &mut self,
        target_id: &str,
        block_id: &str,
        field: &str,
        new_value: &str,
    ) -> Result<(), EngineError> {
        self.dispatch(
            target_id,
            BlockEvent::ChangeField {
                block_id: block_id.to_string(),
                field: field.to_string(),
                new_value: new_value.to_string(),
            },
        )
    }

    fn dispatch(&mut self, target_id: &str, event: BlockEvent) -> Result<(), EngineError> {
        if !self.sink.has_target(target_id) {
            return Err(EngineError::TargetNotFound(target_id.to_string()));
        }
        for event in self.decider.process(event) {
            self.sink.deliver(target_id, event);
        }
        Ok(())
    }

    fn generate_block_id(&mut self) -> String {
        let id = self.next_block_id;
        self.next_block_id += 1;
        format!("blockvm_{id}")
    }
}

impl<S: EventSink> fmt::Debug for BlockGenerator<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockGenerator")
            .field("decider", &self.decider)
            .field("next_block_id", &self.next_block_id)
            .finish()
    }
}
