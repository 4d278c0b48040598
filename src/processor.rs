//! Simulated payment authorization for a single request line.

use crate::{race, CancelToken, Winner};
use std::fmt;
use std::num::ParseIntError;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

/// Amounts up to and including this are authorized without any delay.
pub const INSTANT_LIMIT: u64 = 100;

/// Upper bound on the simulated processing delay, in milliseconds.
pub const MAX_DELAY_MS: u64 = 10_000;

const KEYWORD: &str = "PAYMENT";

/// A parsed `PAYMENT|<amount>` request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Payment {
    /// Transaction amount.
    pub amount: u64,
}

/// Why a request line could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    /// Not exactly two `|`-separated fields, or the first is not `PAYMENT`.
    #[error("Invalid request")]
    InvalidRequest,
    /// The amount is not a non-negative decimal integer.
    #[error("Invalid amount")]
    InvalidAmount(#[source] ParseIntError),
}

impl FromStr for Payment {
    type Err = ParseError;

    fn from_str(line: &str) -> Result<Self, Self::Err> {
        let mut fields = line.split('|');
        match (fields.next(), fields.next(), fields.next()) {
            (Some(KEYWORD), Some(amount), None) => amount
                .parse()
                .map(|amount| Payment { amount })
                .map_err(ParseError::InvalidAmount),
            _ => Err(ParseError::InvalidRequest),
        }
    }
}

/// The reply sent back for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Response {
    /// The transaction was authorized.
    Accepted,
    /// The line was not a well-formed request.
    InvalidRequest,
    /// The amount field was not a non-negative integer.
    InvalidAmount,
    /// Processing was abandoned because the server is shutting down.
    Cancelled,
}

impl Response {
    /// The wire form of the response, without the trailing newline.
    pub fn as_str(&self) -> &'static str {
        match self {
            Response::Accepted => "RESPONSE|ACCEPTED|Transaction processed",
            Response::InvalidRequest => "RESPONSE|REJECTED|Invalid request",
            Response::InvalidAmount => "RESPONSE|REJECTED|Invalid amount",
            Response::Cancelled => "RESPONSE|REJECTED|Cancelled",
        }
    }

    /// Return true for [`Response::Accepted`].
    pub fn is_accepted(&self) -> bool {
        matches!(self, Response::Accepted)
    }
}

impl fmt::Display for Response {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<ParseError> for Response {
    fn from(err: ParseError) -> Self {
        match err {
            ParseError::InvalidRequest => Response::InvalidRequest,
            ParseError::InvalidAmount(_) => Response::InvalidAmount,
        }
    }
}

/// How long authorizing `amount` takes, or `None` if it is authorized immediately.
pub fn processing_delay(amount: u64) -> Option<Duration> {
    if amount <= INSTANT_LIMIT {
        None
    } else {
        Some(Duration::from_millis(amount.min(MAX_DELAY_MS)))
    }
}

/// Authorize one request line.
///
/// Large amounts suspend the caller for a simulated delay. If `cancel` fires during that delay
/// the rest of it is abandoned and [`Response::Cancelled`] is returned at once. Small amounts and
/// malformed lines never suspend and never look at `cancel`.
pub async fn process(line: &str, cancel: &CancelToken) -> Response {
    let payment = match line.parse::<Payment>() {
        Ok(payment) => payment,
        Err(err) => return err.into(),
    };
    let delay = match processing_delay(payment.amount) {
        Some(delay) => delay,
        None => return Response::Accepted,
    };
    match race(tokio::time::sleep(delay), cancel.cancelled()).await {
        Winner::First(()) => Response::Accepted,
        Winner::Second(()) => Response::Cancelled,
    }
}
