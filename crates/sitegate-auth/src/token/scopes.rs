//! Capability and role bit sets.
//!
//! Both are closed, small sets, kept as plain `u64` masks with named
//! constants. They serialize as bare integers.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign};

use serde::{Deserialize, Serialize};

/// Capability flags carried in a credential and required by a route.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Scopes(pub u64);

impl Scopes {
    /// No capability. On a route this means "public".
    pub const NONE: Self = Self(0);
    /// Read access to the own account.
    pub const ACCOUNT_READ: Self = Self(1 << 0);
    /// Full access for a top-level (master) account.
    pub const ACCOUNT_FULL_MASTER: Self = Self(1 << 1);
    /// Full access for a sub-account.
    pub const ACCOUNT_FULL_SUB: Self = Self(1 << 2);
    /// Either flavour of full account access.
    pub const ACCOUNT_FULL_ANY: Self = Self(Self::ACCOUNT_FULL_MASTER.0 | Self::ACCOUNT_FULL_SUB.0);
    /// Carries OAuth broker state across the provider redirect.
    pub const OAUTH_STATE: Self = Self(1 << 3);
    /// Account activation link.
    pub const OOB_USER_ACTIVATE: Self = Self(1 << 4);
    /// Password reset link.
    pub const OOB_USER_PASSWORD_CHANGE: Self = Self(1 << 5);
    /// Email change confirmation link.
    pub const OOB_USER_EMAIL_CHANGE: Self = Self(1 << 6);
    /// Payment confirmation.
    pub const TRANSACTION_PAYMENT: Self = Self(1 << 7);

    const OUT_OF_BAND_CATEGORY: [Self; 4] = [
        Self::TRANSACTION_PAYMENT,
        Self::OOB_USER_PASSWORD_CHANGE,
        Self::OOB_USER_EMAIL_CHANGE,
        Self::OOB_USER_ACTIVATE,
    ];

    /// Raw mask.
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// All flags of `other` are present.
    #[must_use]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    /// At least one flag is shared.
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    /// True when this is exactly one of the scopes delivered out of band
    /// (email links, payment confirmations). Denials on such routes are
    /// reported with a distinct code.
    #[must_use]
    pub fn is_out_of_band_category(self) -> bool {
        Self::OUT_OF_BAND_CATEGORY.contains(&self)
    }
}

impl BitOr for Scopes {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Scopes {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for Scopes {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl fmt::Display for Scopes {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#x}", self.0)
    }
}

/// Role flags stored on an account record.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Roles(pub u64);

impl Roles {
    pub const NONE: Self = Self(0);
    pub const ADMIN: Self = Self(1 << 0);
    pub const SUPPORT: Self = Self(1 << 1);

    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[must_use]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// At least one role is shared. Route roles are "any of".
    #[must_use]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }
}

impl BitOr for Roles {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}
