// Copyright 2025 ReductSoftware UG
// This Source Code Form is subject to the terms of the Mozilla Public
//    License, v. 2.0. If a copy of the MPL was not distributed with this
//    file, You can obtain one at https://mozilla.org/MPL/2.0/.

pub use int_enum::IntEnum;
use std::error::Error;
use std::fmt::{Display, Error as FmtError, Formatter};

/// Status codes of cache operations.
///
/// The positive values follow HTTP semantics so the codes can be forwarded
/// as-is by a provider that serves cached files over the network.
#[repr(i16)]
#[derive(Debug, PartialEq, PartialOrd, Copy, Clone, IntEnum)]
pub enum ErrorCode {
    BadRequest = 400,
    NotFound = 404,
    ConsistencyFault = 500,
    InsufficientStorage = 507,
    InternalError = 520,
}

/// An error of the cache or its provider.
#[derive(PartialEq, Debug, Clone)]
pub struct CacheError {
    /// The status code.
    pub status: ErrorCode,

    /// The human readable message.
    pub message: String,
}

impl Display for CacheError {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        write!(f, "[{:?}] {}", self.status, self.message)
    }
}

impl Display for ErrorCode {
    fn fmt(&self, f: &mut Formatter) -> Result<(), FmtError> {
        write!(f, "{}", self.int_value())
    }
}

impl From<std::io::Error> for CacheError {
    fn from(err: std::io::Error) -> Self {
        let status = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorCode::NotFound,
            std::io::ErrorKind::StorageFull => ErrorCode::InsufficientStorage,
            _ => ErrorCode::InternalError,
        };

        CacheError {
            status,
            message: err.to_string(),
        }
    }
}

impl Error for CacheError {
    fn description(&self) -> &str {
        &self.message
    }
}

impl CacheError {
    pub fn new(status: ErrorCode, message: &str) -> Self {
        CacheError {
            status,
            message: message.to_string(),
        }
    }

    pub fn status(&self) -> ErrorCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// Create a not found error.
    pub fn not_found(msg: &str) -> CacheError {
        CacheError {
            status: ErrorCode::NotFound,
            message: msg.to_string(),
        }
    }

    /// Create a bad request error.
    pub fn bad_request(msg: &str) -> CacheError {
        CacheError {
            status: ErrorCode::BadRequest,
            message: msg.to_string(),
        }
    }

    /// Create a consistency fault.
    ///
    /// Raised when the size accounting and the eviction order of a cache
    /// disagree about which entries are alive.
    pub fn consistency_fault(msg: &str) -> CacheError {
        CacheError {
            status: ErrorCode::ConsistencyFault,
            message: msg.to_string(),
        }
    }

    pub fn internal_error(msg: &str) -> CacheError {
        CacheError {
            status: ErrorCode::InternalError,
            message: msg.to_string(),
        }
    }
}

#[macro_export]
macro_rules! not_found {
    ($msg:expr, $($arg:tt)*) => {
        $crate::error::CacheError::not_found(&format!($msg, $($arg)*))
    };
    ($msg:expr) => {
        $crate::error::CacheError::not_found($msg)
    };
}

#[macro_export]
macro_rules! bad_request {
    ($msg:expr, $($arg:tt)*) => {
        $crate::error::CacheError::bad_request(&format!($msg, $($arg)*))
    };
    ($msg:expr) => {
        $crate::error::CacheError::bad_request($msg)
    };
}

#[macro_export]
macro_rules! consistency_fault {
    ($msg:expr, $($arg:tt)*) => {
        $crate::error::CacheError::consistency_fault(&format!($msg, $($arg)*))
    };
    ($msg:expr) => {
        $crate::error::CacheError::consistency_fault($msg)
    };
}

#[macro_export]
macro_rules! internal_error {
    ($msg:expr, $($arg:tt)*) => {
        $crate::error::CacheError::internal_error(&format!($msg, $($arg)*))
    };
    ($msg:expr) => {
        $crate::error::CacheError::internal_error($msg)
    };
}
