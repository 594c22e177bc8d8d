//! Access key detection.

use gatehouse_core::AccessKey;
use http::request::Parts;
use subtle::ConstantTimeEq;
use tracing::debug;

use crate::tenant::TenantConfig;

/// Header carrying the tenant access key.
pub const API_KEY_HEADER: &str = "x-gatehouse-api-key";

/// Classifies the key presented with `request` against the tenant's keys.
///
/// Keys are compared in constant time. A key matching neither tenant key
/// is treated the same as no key.
#[must_use]
pub fn detect_access_key(request: &Parts, tenant: &TenantConfig) -> AccessKey {
    let Some(presented) = request
        .headers
        .get(API_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
    else {
        return AccessKey::None;
    };

    if keys_match(presented, &tenant.master_key) {
        AccessKey::Master
    } else if keys_match(presented, &tenant.api_key) {
        AccessKey::Client
    } else {
        debug!(tenant = %tenant.tenant_id, "unrecognized api key");
        AccessKey::None
    }
}

fn keys_match(presented: &str, expected: &str) -> bool {
    !expected.is_empty() && bool::from(presented.as_bytes().ct_eq(expected.as_bytes()))
}
