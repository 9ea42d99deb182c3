pub mod artifact_store;
pub mod config;
pub mod dataset_files;
pub mod error;
pub mod features;
pub mod fetcher;
pub mod indicator;
pub mod merger;
pub mod model;
pub mod pipeline;
pub mod sequence;
pub mod source;
pub mod splitter;
