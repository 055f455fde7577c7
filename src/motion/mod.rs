// src/motion/mod.rs - Motion queuing: watermark, lookahead, trapqs and axis slots

pub mod lookahead;
pub mod registry;
pub mod trapq;
pub mod watermark;

pub use lookahead::{LookaheadMove, LookaheadQueue, QueuingState};
pub use registry::{AxisId, AxisRegistry, RegistryError};
pub use trapq::{MotionQueuing, TrapQueue, TrapSegment};
pub use watermark::{DEFAULT_SAFETY_MARGIN, TimingWatermark};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MotionError {
    #[error("Invalid move for {stepper}: {reason}")]
    InvalidMove { stepper: String, reason: String },
    #[error("Stepper {0} is disabled; enable it before moving")]
    Disabled(String),
    #[error("Axis {0} is not registered; re-register GCODE_AXIS before moving")]
    AxisNotRegistered(AxisId),
}
