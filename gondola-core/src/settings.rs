use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{CoreError, CoreResult};

/// 100% expressed in basis points.
pub const MAX_FEE_BPS: u32 = 10_000;

/// Singleton row of marketplace-wide settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlatformSettings {
    pub fee_bps: u32,
    pub updated_at: DateTime<Utc>,
}

impl PlatformSettings {
    pub fn new(fee_bps: u32) -> CoreResult<Self> {
        validate_fee_bps(fee_bps)?;
        Ok(Self {
            fee_bps,
            updated_at: Utc::now(),
        })
    }
}

pub fn validate_fee_bps(fee_bps: u32) -> CoreResult<()> {
    if fee_bps > MAX_FEE_BPS {
        return Err(CoreError::ValidationError(format!(
            "fee_bps must be between 0 and {}, got {}",
            MAX_FEE_BPS, fee_bps
        )));
    }
    Ok(())
}
