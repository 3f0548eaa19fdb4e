//! Quiet hours - tenant-local windows during which nothing is sent

use chrono::{DateTime, Duration, Timelike, Utc};
use driprust_common::config::QuietHoursSettings;
use driprust_common::types::TenantId;
use std::collections::HashMap;

const SECONDS_PER_DAY: i64 = 86_400;

/// Per-tenant quiet-hours calculator.
///
/// Holds a default window plus tenant overrides, all supplied at
/// construction. Overnight windows (start after end, e.g. 21:00-08:00)
/// are supported; a window whose start equals its end is disabled.
pub struct QuietHours {
    default: QuietHoursSettings,
    overrides: HashMap<TenantId, QuietHoursSettings>,
}

impl QuietHours {
    /// Create a calculator with a default window for all tenants
    pub fn new(default: QuietHoursSettings) -> Self {
        Self {
            default,
            overrides: HashMap::new(),
        }
    }

    /// Override the window for a specific tenant
    pub fn with_override(mut self, tenant_id: TenantId, settings: QuietHoursSettings) -> Self {
        self.overrides.insert(tenant_id, settings);
        self
    }

    /// If the tenant is currently inside quiet hours, how long until the
    /// window reopens
    pub fn until_open(&self, tenant_id: TenantId, now: DateTime<Utc>) -> Option<Duration> {
        let settings = self.overrides.get(&tenant_id).unwrap_or(&self.default);
        until_open(settings, now)
    }
}

fn until_open(settings: &QuietHoursSettings, now: DateTime<Utc>) -> Option<Duration> {
    if settings.start == settings.end {
        return None;
    }

    let local = now + Duration::minutes(settings.utc_offset_minutes as i64);
    let time = local.time();

    let inside = if settings.start < settings.end {
        time >= settings.start && time < settings.end
    } else {
        time >= settings.start || time < settings.end
    };

    if !inside {
        return None;
    }

    let now_secs = time.num_seconds_from_midnight() as i64;
    let end_secs = settings.end.num_seconds_from_midnight() as i64;
    let wait = if end_secs > now_secs {
        end_secs - now_secs
    } else {
        SECONDS_PER_DAY - now_secs + end_secs
    };

    Some(Duration::seconds(wait))
}
