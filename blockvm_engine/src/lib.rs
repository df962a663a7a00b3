//! Runtime-facing collaborators of the blockvm compiler.
//!
//! None of these share state with the optimizer: the frame loop drives
//! whatever the code generator emitted, the block-event middleware operates
//! on the pre-compilation graph, and the extension runner supplies the
//! opaque call targets the compiler treats as unknown-effect.

// Library code must not write to stderr; user-facing binaries own the
// terminal.
#![deny(clippy::print_stderr)]

pub mod block_decider;
pub mod block_generator;
pub mod extension_runner;
pub mod frame_loop;

pub use block_decider::{BlockDecider, BlockEvent, Coordinates, HistoryEntry};
pub use block_generator::{
    BlockGenerator, CreateBlockOptions, EngineError, EventSink, MoveBlockOptions,
};
pub use extension_runner::{
    DenyAllSecurityManager, ExtensionError, ExtensionInfo, ExtensionRunner, SecurityManager,
};
pub use frame_loop::{FrameLoop, FrameTarget};
