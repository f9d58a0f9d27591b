//! Protocol response codes returned by Mensago servers
//!
//! Codes are grouped by their hundreds digit:
//! - 1xx: informational, the command continues
//! - 2xx: success
//! - 3xx: server-side errors
//! - 4xx: client-side errors

use serde::{Deserialize, Serialize};

/// A protocol response code and its status text
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseCode<'a> {
    pub code: u16,
    pub status: &'a str,
}

// Info codes
pub const CONTINUE: ResponseCode<'static> = ResponseCode {
    code: 100,
    status: "Continue",
};

pub const PENDING: ResponseCode<'static> = ResponseCode {
    code: 101,
    status: "Pending",
};

pub const ITEM: ResponseCode<'static> = ResponseCode {
    code: 102,
    status: "Item",
};

pub const UPDATE: ResponseCode<'static> = ResponseCode {
    code: 103,
    status: "Update",
};

pub const TRANSFER: ResponseCode<'static> = ResponseCode {
    code: 104,
    status: "Transfer",
};

// Success codes
pub const OK: ResponseCode<'static> = ResponseCode {
    code: 200,
    status: "OK",
};

pub const REGISTERED: ResponseCode<'static> = ResponseCode {
    code: 201,
    status: "Registered",
};

pub const UNREGISTERED: ResponseCode<'static> = ResponseCode {
    code: 202,
    status: "Unregistered",
};

// Server error codes
pub const INTERNAL_SERVER_ERROR: ResponseCode<'static> = ResponseCode {
    code: 300,
    status: "Internal Server Error",
};

pub const NOT_IMPLEMENTED: ResponseCode<'static> = ResponseCode {
    code: 301,
    status: "Not Implemented",
};

pub const SERVER_MAINTENANCE: ResponseCode<'static> = ResponseCode {
    code: 302,
    status: "Server Maintenance",
};

pub const SERVER_UNAVAILABLE: ResponseCode<'static> = ResponseCode {
    code: 303,
    status: "Server Unavailable",
};

pub const REGISTRATION_CLOSED: ResponseCode<'static> = ResponseCode {
    code: 304,
    status: "Registration Closed",
};

pub const INTERRUPTED: ResponseCode<'static> = ResponseCode {
    code: 305,
    status: "Interrupted",
};

pub const KEY_FAILURE: ResponseCode<'static> = ResponseCode {
    code: 306,
    status: "Key Failure",
};

pub const DELIVERY_FAILURE_LIMIT: ResponseCode<'static> = ResponseCode {
    code: 307,
    status: "Delivery Failure Limit Exceeded",
};

pub const DELIVERY_DELAY: ResponseCode<'static> = ResponseCode {
    code: 308,
    status: "Delivery Delay Not Reached",
};

pub const ALGORITHM_NOT_SUPPORTED: ResponseCode<'static> = ResponseCode {
    code: 309,
    status: "Algorithm Not Supported",
};

// Client error codes
pub const BAD_REQUEST: ResponseCode<'static> = ResponseCode {
    code: 400,
    status: "Bad Request",
};

pub const UNAUTHORIZED: ResponseCode<'static> = ResponseCode {
    code: 401,
    status: "Unauthorized",
};

pub const AUTHENTICATION_FAILURE: ResponseCode<'static> = ResponseCode {
    code: 402,
    status: "Authentication Failure",
};

pub const FORBIDDEN: ResponseCode<'static> = ResponseCode {
    code: 403,
    status: "Forbidden",
};

pub const NOT_FOUND: ResponseCode<'static> = ResponseCode {
    code: 404,
    status: "Not Found",
};

pub const TERMINATED: ResponseCode<'static> = ResponseCode {
    code: 405,
    status: "Terminated",
};

pub const PAYMENT_REQUIRED: ResponseCode<'static> = ResponseCode {
    code: 406,
    status: "Payment Required",
};

pub const UNAVAILABLE: ResponseCode<'static> = ResponseCode {
    code: 407,
    status: "Unavailable",
};

pub const RESOURCE_EXISTS: ResponseCode<'static> = ResponseCode {
    code: 408,
    status: "Resource Exists",
};

pub const QUOTA_INSUFFICIENT: ResponseCode<'static> = ResponseCode {
    code: 409,
    status: "Quota Insufficient",
};

pub const HASH_MISMATCH: ResponseCode<'static> = ResponseCode {
    code: 410,
    status: "Hash Mismatch",
};

pub const BAD_KEYCARD: ResponseCode<'static> = ResponseCode {
    code: 411,
    status: "Bad Keycard Data",
};

pub const NONCOMPLIANT_KEYCARD: ResponseCode<'static> = ResponseCode {
    code: 412,
    status: "Noncompliant Keycard",
};

pub const INVALID_SIGNATURE: ResponseCode<'static> = ResponseCode {
    code: 413,
    status: "Invalid Signature",
};

pub const LIMIT_REACHED: ResponseCode<'static> = ResponseCode {
    code: 414,
    status: "Limit Reached",
};

pub const EXPIRED: ResponseCode<'static> = ResponseCode {
    code: 415,
    status: "Expired",
};

const ALL: &[ResponseCode<'static>] = &[
    CONTINUE,
    PENDING,
    ITEM,
    UPDATE,
    TRANSFER,
    OK,
    REGISTERED,
    UNREGISTERED,
    INTERNAL_SERVER_ERROR,
    NOT_IMPLEMENTED,
    SERVER_MAINTENANCE,
    SERVER_UNAVAILABLE,
    REGISTRATION_CLOSED,
    INTERRUPTED,
    KEY_FAILURE,
    DELIVERY_FAILURE_LIMIT,
    DELIVERY_DELAY,
    ALGORITHM_NOT_SUPPORTED,
    BAD_REQUEST,
    UNAUTHORIZED,
    AUTHENTICATION_FAILURE,
    FORBIDDEN,
    NOT_FOUND,
    TERMINATED,
    PAYMENT_REQUIRED,
    UNAVAILABLE,
    RESOURCE_EXISTS,
    QUOTA_INSUFFICIENT,
    HASH_MISMATCH,
    BAD_KEYCARD,
    NONCOMPLIANT_KEYCARD,
    INVALID_SIGNATURE,
    LIMIT_REACHED,
    EXPIRED,
];

impl ResponseCode<'static> {
    /// Looks up a known code
    pub fn lookup(code: u16) -> Option<ResponseCode<'static>> {
        ALL.iter().copied().find(|c| c.code == code)
    }
}

impl ResponseCode<'_> {
    pub fn is_info(&self) -> bool {
        (100..200).contains(&self.code)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.code)
    }

    pub fn is_server_error(&self) -> bool {
        (300..400).contains(&self.code)
    }

    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.code)
    }
}

impl std::fmt::Display for ResponseCode<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}-{}", self.code, self.status)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        assert_eq!(ResponseCode::lookup(408), Some(RESOURCE_EXISTS));
        assert_eq!(ResponseCode::lookup(415).map(|c| c.status), Some("Expired"));
        assert_eq!(ResponseCode::lookup(499), None);
    }

    #[test]
    fn test_classes() {
        assert!(CONTINUE.is_info());
        assert!(REGISTERED.is_success());
        assert!(KEY_FAILURE.is_server_error());
        assert!(HASH_MISMATCH.is_client_error());
        assert!(!OK.is_client_error());
    }

    #[test]
    fn test_display() {
        assert_eq!(INTERNAL_SERVER_ERROR.to_string(), "300-Internal Server Error");
    }

    #[test]
    fn test_codes_unique() {
        let mut codes: Vec<u16> = ALL.iter().map(|c| c.code).collect();
        codes.dedup();
        assert_eq!(codes.len(), ALL.len());
    }
}
