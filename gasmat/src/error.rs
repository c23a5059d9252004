//! Fatal configuration and ingress errors.
//!
//! Protocol invariant violations are bugs and stay as panicking assertions;
//! everything here is a misconfiguration surfaced before iteration begins.
///
/// Copyright (c) 2020, Institute for Defense Analyses
/// 4850 Mark Center Drive, Alexandria, VA 22311-1882; 703-845-2500
///
/// All rights reserved.
///
/// This file is part of GasMat.  For license information see the
/// LICENSE file in the top level dirctory of the distribution.
use thiserror::Error;

/// Errors raised while configuring the matrix or ingesting a graph.
#[derive(Debug, Error)]
pub enum Error {
    /// The input file could not be opened or read.
    #[error("i/o failure on {path}: {source}")]
    Io {
        /// Offending path.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The input file is malformed.
    #[error("bad input file {path}: {reason}")]
    BadInput {
        /// Offending path.
        path: String,
        /// What went wrong.
        reason: String,
    },

    /// The tile grid cannot be divided among the ranks.
    #[error("bad partitioning: {0}")]
    BadPartitioning(String),
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, Error>;
