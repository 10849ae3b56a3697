/// Per-stack image processing.
///
/// Stages:
/// ```text
///   Stack ──► background ──► denoise ──► smooth ──┬──► project ──► threshold/segment ──► Roi
///                                                  │                                        │
///                                                  └──────────────► measure ◄───────────────┘
///                                                                      │
///                                                                      ▼
///                                                               Vec<Measurement>
/// ```
/// `pipeline` chains the stages for one stack. Every stage returns a new
/// stack or plane and keeps slice order.

pub mod background;
pub mod denoise;
pub mod measure;
pub mod pipeline;
pub mod project;
pub mod segment;
pub mod smooth;
pub mod threshold;
