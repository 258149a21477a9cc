//! I/O for lbad
//!
//! This crate reads and writes delimited point recordings, provides the
//! [`PointSource`](lbad_core::PointSource) implementations the pipeline
//! consumes, and stores model libraries as JSON.

pub mod points;
pub mod source;
pub mod models;

pub use points::{
    write_recording, ColumnType, Delimiter, PointFileReader, PointFileSchema, PointFileWriter,
};
pub use source::{
    validate_broadcast_code, ChannelPointSource, FilePointSource, Pacing, PointFeeder,
    BROADCAST_CODE_LEN,
};
pub use models::{load_models, save_models, ModelLibrary};
