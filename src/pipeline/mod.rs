//! Frame pipeline
//!
//! ```text
//!  [ingest thread]        [blocking worker]         [async task]
//!  SourceConnection ──► FrameBuffer ──► Processor ──► LatestResultSlot ──► Broadcaster ──► subscribers
//!      push (drop-oldest)     pop (blocking)   publish (overwrite)   snapshot (per cycle)
//! ```
//!
//! The buffer decouples a real-time producer from a slow transform; the
//! slot decouples processing cadence from delivery cadence.

pub mod broadcaster;
pub mod pacing;
pub mod processor;
pub mod slot;

pub use broadcaster::{Broadcaster, CycleReport};
pub use pacing::{frame_period, Pacer};
pub use processor::{ProcessOutcome, Processor};
pub use slot::LatestResultSlot;
