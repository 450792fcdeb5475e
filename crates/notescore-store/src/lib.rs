//! Storage layer: Arrow table conversion, the cross-phase payload channel,
//! and Parquet-backed status history.

pub mod args;
pub mod channel;
mod error;
pub mod history_store;
pub mod tables;

pub use args::{PrescoringOutputs, ScoringArgs, ScoringInputs, TableNeeds};
pub use channel::{
    AcquiredArgs, FinalScoringArgsShared, PayloadChannel, PayloadLease, PrescoringArgsShared,
};
pub use error::StoreError;
pub use history_store::{
    HistoryStore, InMemoryHistoryStore, ParquetHistoryStore, RunState, read_history_file,
    write_history_file,
};
