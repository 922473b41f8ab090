//! The extraction engine.
//!
//! A scan walks the tree once, then reads and parses the candidate files on
//! a thread pool sized by `concurrency_limit`:
//!
//! ```text
//! ScanConfig ─► DirectoryWalker ─► [paths] ─► pool (N workers)
//!                                              ├─ FileProcessor: read + TodoParser per line
//!                                              └─ Vec<TodoItem> per file
//!                                  join ◄──────┘
//!                                   └─► ScanOutput (files in walk order, lines in order)
//! ```
//!
//! Workers never share mutable state; each returns its own list and the
//! lists are concatenated only after every worker has finished. A file that
//! cannot be read is logged and contributes nothing. Only a missing scan
//! root fails the whole call.
pub mod engine;
pub mod parser;
pub mod processor;

pub use engine::{scan, TodoScanner};
pub use parser::{ParsedLine, TodoParser};
pub use processor::FileProcessor;
