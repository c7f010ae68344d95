// Copyright (C) 2026  winnyboy5
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.
//! Time sources and expiration arithmetic

use chrono::{DateTime, Duration, Utc};
use std::fmt;
use std::sync::{Mutex, PoisonError};

/// Seconds in a day
pub const SECONDS_PER_DAY: i64 = 86_400;

/// Source of the current time
pub trait TimeSource: Send + Sync + fmt::Debug {
    /// Current wall-clock time
    fn now(&self) -> DateTime<Utc>;
}

/// Wall-clock time
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Manually advanced clock for deterministic expiration checks
#[derive(Debug)]
pub struct ManualTimeSource {
    now: Mutex<DateTime<Utc>>,
}

impl ManualTimeSource {
    /// Start the clock at `now`
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Mutex::new(now),
        }
    }

    /// Jump to an absolute time
    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner) = now;
    }

    /// Move the clock forward
    pub fn advance(&self, by: Duration) {
        let mut now = self.now.lock().unwrap_or_else(PoisonError::into_inner);
        *now += by;
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Whole days from `now` until `expires_at`, floored, 0 once expired
pub fn days_between(now: DateTime<Utc>, expires_at: DateTime<Utc>) -> u64 {
    let seconds = (expires_at - now).num_seconds();
    if seconds <= 0 {
        0
    } else {
        (seconds / SECONDS_PER_DAY) as u64
    }
}

/// Health summary of the soonest-expiring managed certificate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryStatus {
    /// No live context holds a certificate
    NoCertificates,
    /// Soonest expiry is outside the rotation warning window
    Healthy {
        /// Whole days until expiry
        days: u64,
    },
    /// Soonest expiry is inside the rotation warning window
    RotationDue {
        /// Whole days until expiry
        days: u64,
    },
    /// A live certificate is already past `not_after`
    Expired,
}

impl ExpiryStatus {
    /// Classify the soonest expiry against a warning window
    pub fn classify(
        now: DateTime<Utc>,
        first_expiry: Option<DateTime<Utc>>,
        warning_days: u64,
    ) -> Self {
        match first_expiry {
            None => ExpiryStatus::NoCertificates,
            Some(expires_at) if expires_at <= now => ExpiryStatus::Expired,
            Some(expires_at) => {
                let days = days_between(now, expires_at);
                if days < warning_days {
                    ExpiryStatus::RotationDue { days }
                } else {
                    ExpiryStatus::Healthy { days }
                }
            }
        }
    }

    /// Whether an operator needs to act
    pub fn needs_attention(&self) -> bool {
        matches!(self, ExpiryStatus::RotationDue { .. } | ExpiryStatus::Expired)
    }
}
