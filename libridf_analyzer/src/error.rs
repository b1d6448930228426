use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RidfFileError {
    #[error("Could not open RIDF file because {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Reached end of RIDF file")]
    EndOfFile,
    #[error("Block size word {0} does not describe a valid block (buffer is {1} bytes)")]
    MalformedBlock(usize, usize),
    #[error("RIDF file failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum RidfPullError {
    #[error("Could not connect to event builder {0}: {1}")]
    ConnectFailed(String, std::io::Error),
    #[error("Event builder {0} closed the connection mid-reply")]
    ShortReply(String),
    #[error("Event builder reply of {0} bytes overflows the {1} byte buffer")]
    ReplyTooLarge(usize, usize),
    #[error("Network pull failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ParserError {
    #[error("No event data available yet; retry")]
    NoData,
    #[error("RIDF stream is exhausted")]
    EndOfStream,
    #[error("Rewind is only supported for file sources")]
    NotRewindable,
    #[error("Parser failed due to RIDF file error: {0}")]
    FileError(#[from] RidfFileError),
    #[error("Parser failed due to network pull error: {0}")]
    PullError(#[from] RidfPullError),
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load analysis configuration as file {0:?} does not exist")]
    BadFilePath(PathBuf),
    #[error("Config failed due to IO error: {0}")]
    IOError(#[from] std::io::Error),
    #[error("Config failed to parse JSON: {0}")]
    ParsingError(#[from] serde_json::Error),
    #[error("Config document root must be a JSON object")]
    NotAnObject,
    #[error("Invalid config schema: {0}")]
    SchemaViolation(String),
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Pipeline failed due to parser error: {0}")]
    ParserError(#[from] ParserError),
    #[error("Pipeline failed due to configuration error: {0}")]
    ConfigError(#[from] ConfigError),
}
