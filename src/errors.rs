//---------------------------------------------------------
// Copyright 2023 Ontario Institute for Cancer Research
// Written by Jared Simpson (jared.simpson@oicr.on.ca)
//---------------------------------------------------------
use thiserror::Error;

#[derive(Error, Debug)]
pub enum VarcallError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("could not write output record: {0}")]
    Output(#[from] csv::Error),

    #[error("malformed pileup record at line {line}: {reason}")]
    MalformedRecord { line: u64, reason: String },

    #[error("too many malformed pileup records ({count}); input is likely not pileup")]
    TooManyMalformedRecords { count: usize },

    #[error("could not synchronize normal and tumor streams at {chrom}:{position}: {reason}")]
    UnsynchronizableStreams {
        chrom: String,
        position: u64,
        reason: String,
    },

    #[error("invalid parameter: {field} must be between {min} and {max}, got {value}")]
    InvalidParameter {
        field: String,
        min: f64,
        max: f64,
        value: f64,
    },
}

pub type Result<T> = std::result::Result<T, VarcallError>;

impl VarcallError {
    pub fn malformed(line: u64, reason: impl Into<String>) -> VarcallError {
        VarcallError::MalformedRecord { line, reason: reason.into() }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, VarcallError::MalformedRecord { .. })
    }
}
