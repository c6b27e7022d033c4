//! Lifecycle states. Serialized in snake_case, matching the stored strings.

use serde::{Deserialize, Serialize};
use std::fmt;

macro_rules! status_enum {
    ($(#[$meta:meta])* $name:ident { $($variant:ident => $text:literal),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(rename_all = "snake_case")]
        pub enum $name {
            $($variant),+
        }

        impl $name {
            pub fn as_str(&self) -> &'static str {
                match self {
                    $(Self::$variant => $text),+
                }
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(self.as_str())
            }
        }

        impl std::str::FromStr for $name {
            type Err = String;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                match s {
                    $($text => Ok(Self::$variant),)+
                    other => Err(format!("unknown {} '{}'", stringify!($name), other)),
                }
            }
        }
    };
}

status_enum! {
    /// Tradability of one collectible instance. `Burned` is terminal.
    InstanceStatus {
        InWallet => "in_wallet",
        OnSale => "on_sale",
        PendingTrade => "pending_trade",
        Burned => "burned",
    }
}

status_enum! {
    ListingStatus {
        Active => "active",
        Sold => "sold",
        Canceled => "canceled",
    }
}

status_enum! {
    TradeStatus {
        Pending => "pending",
        Completed => "completed",
        Failed => "failed",
        Canceled => "canceled",
    }
}

status_enum! {
    OfferStatus {
        Pending => "pending",
        Accepted => "accepted",
        Rejected => "rejected",
        Cancelled => "cancelled",
        Expired => "expired",
    }
}

status_enum! {
    /// Review state of an asset definition.
    AssetStatus {
        PendingReview => "pending_review",
        Active => "active",
        Rejected => "rejected",
    }
}

impl OfferStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Pending)
    }
}
