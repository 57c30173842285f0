//! `notefy-cli` library half: the document pipeline the `notefy` binary
//! drives. Exposed so tests and other front-ends can run it in-process.

pub mod pipeline;

pub use pipeline::{BatchReport, PipelineError, ProcessOutcome, ProcessRequest, SystemIntegrator};
