//! Result-directory watchers
//!
//! Three artifact classes come out of the engine, each watched on its own
//! ticker: trade CSVs in `results/to_do`, parameter-optimization containers
//! in `opt/in`, and per-day summaries in `opt/summary` (scanned on a delay
//! after an optimization upload rather than on a standing ticker).

pub mod events;
pub mod opt;
pub mod summary;
pub mod trades;

pub use events::{upload_event_bus, UploadEvent, UploadEventKind};
pub use opt::OptResultWatcher;
pub use trades::TradeResultWatcher;
