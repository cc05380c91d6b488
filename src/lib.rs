//! Dakar FM - foreign-material defect tracking for foil inspections
//!
//! Microscope inspections report each defect in pixels local to one tile
//! (FOV) of a foil. This crate places every defect on the whole foil
//! surface, tracks which defects were added, removed or stayed between two
//! inspection states, and renders crops, position plots and summaries.
//!
//! # Architecture
//!
//! The crate is organized into 5 logical layers:
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                      main                           │  ← Entry point
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                    engine/                          │  ← Orchestration
//! │           (defect table, analysis commands)         │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                      io/                            │  ← Infrastructure
//! │       (ingest, table CSV, imagery, plots, report)   │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │            algorithms/        config/               │  ← Core algorithms
//! │  (normalization, matching, size classes, settings)  │
//! └─────────────────────────────────────────────────────┘
//!                          │
//! ┌─────────────────────────────────────────────────────┐
//! │                     core/                           │  ← Foundation
//! │                (types, errors)                      │
//! └─────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```bash
//! # Every step with dakar.toml from the working directory
//! dakar-fm run
//!
//! # A single step with a custom config file
//! dakar-fm --config inspection.toml compare
//! ```

// Layer 1: Core foundation (no internal deps)
pub mod core;

// Layer 2: Algorithms and settings (depend on core)
pub mod algorithms;
pub mod config;

// Layer 3: File I/O (depends on core, algorithms, config)
pub mod io;

// Layer 4: Orchestration (depends on all layers)
pub mod engine;

pub use algorithms::{ChangeSet, CoordinateNormalizer, MatchConfig, StateMatcher, TileLayout};
pub use config::Settings;
pub use crate::core::{DefectError, DefectRecord, RawRow, TileIndex, TopBottom};
pub use engine::{Analysis, AnalysisError, DefectTable, RunSummary};
