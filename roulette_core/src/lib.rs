pub mod catalog;
pub mod config;
pub mod engine;
pub mod error;
pub mod prize;
pub mod record;
pub mod rng;
pub mod schedule;
pub mod spinner;

pub use crate::catalog::{parse_definition, LoadReport, PrizeCatalog};
pub use crate::config::{DrawConfig, DurationSource, ResourcePaths};
pub use crate::engine::{
    CommitOutcome, DrawEngine, DrawPhase, DrawRequest, DrawSession, QuotaPolicy, Tick,
    TraversalMode,
};
pub use crate::error::{CatalogError, ConfigError, DrawError, DrawResult, RecordError};
pub use crate::prize::{BandFormat, DefinitionFormat, PrizeCategory};
pub use crate::record::{import_winners, ImportReport, LogLayout, ResultRecorder, WinnerRow};
pub use crate::rng::{derive_floats, derive_hash_hex, ProvablyFairRng};
pub use crate::schedule::{
    compute_schedule, compute_schedule_with_exponent, DurationRange, IntervalBounds,
};
pub use crate::spinner::{SpinnerConfig, SpinnerFrame, SpinnerTimeSelector};
