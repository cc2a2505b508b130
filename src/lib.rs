//! Rising-smoke fluid solver for riseflow
//!
//! A grid-based incompressible flow driven by buoyancy, stirred by vorticity
//! confinement, projected with a Jacobi pressure solve and composited with
//! bloom. Every operator is a stage executed by a [`Device`]: the rayon
//! [`CpuDevice`] by default, or the wgpu `GpuDevice` with the `gpu` feature.

pub mod analysis;
pub mod bloom;
pub mod capabilities;
pub mod config;
pub mod cpu;
pub mod desktop;
pub mod device;
pub mod display;
pub mod export;
pub mod field;
pub mod framebuffers;
pub mod pointer;
pub mod solver;
pub mod splat;
pub mod stage;

#[cfg(feature = "gpu")]
pub mod gpu;

pub use analysis::{AnalysisRecorder, FieldSnapshot, SmokeMetrics};
pub use capabilities::{Capabilities, ChannelFormat, FilterMode, FormatSet, FormatSupport, TextureFormat};
pub use config::{ConfigError, Rgb, SimConfig};
pub use cpu::{CpuDevice, CpuTexture};
pub use desktop::SmokeApp;
pub use device::{Blend, Device};
pub use export::{ExportError, ImageExporter};
pub use field::{DoubleField, Field};
pub use framebuffers::{Framebuffers, ResourceManager};
pub use pointer::{PointerSample, Pointers};
pub use solver::{FieldId, SmokeSolver, SolverError};
pub use stage::{Define, StageError, StageKind, StageRegistry};

#[cfg(feature = "gpu")]
pub use gpu::{GpuDevice, GpuError};
