use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Unique identifier for an aggregate instance.
///
/// Wraps a UUID to provide type safety and prevent mixing up
/// aggregate IDs with other UUID-based identifiers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AggregateId(Uuid);

impl AggregateId {
    /// Creates a new random aggregate ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Creates an aggregate ID from an existing UUID.
    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Derives a stable aggregate ID from a namespace and a name.
    ///
    /// The same `(namespace, name)` pair always yields the same ID, which lets
    /// callers address an aggregate by a natural key such as an idempotency key.
    pub fn derived(namespace: &Uuid, name: &str) -> Self {
        Self(Uuid::new_v5(namespace, name.as_bytes()))
    }

    /// Returns the underlying UUID.
    pub fn as_uuid(&self) -> Uuid {
        self.0
    }
}

impl Default for AggregateId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AggregateId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for AggregateId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl From<Uuid> for AggregateId {
    fn from(uuid: Uuid) -> Self {
        Self(uuid)
    }
}

impl From<AggregateId> for Uuid {
    fn from(id: AggregateId) -> Self {
        id.0
    }
}

/// Declares a UUID-backed identifier newtype with the usual conversions.
macro_rules! uuid_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(Uuid);

        impl $name {
            /// Creates a new random ID.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Creates an ID from an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Returns the underlying UUID.
            pub fn as_uuid(&self) -> Uuid {
                self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl From<$name> for Uuid {
            fn from(id: $name) -> Self {
                id.0
            }
        }
    };
}

/// Declares a string-backed catalog reference newtype.
macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            /// Creates a new ID from a string.
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            /// Returns the ID as a string slice.
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl AsRef<str> for $name {
            fn as_ref(&self) -> &str {
                &self.0
            }
        }
    };
}

uuid_id!(
    /// Identifier of a seller (vendor) on the marketplace.
    SellerId
);
uuid_id!(
    /// Identifier of a customer. Guest checkouts carry none.
    CustomerId
);
uuid_id!(
    /// Identifier of a checkout cart.
    CartId
);
uuid_id!(
    /// Identifier of a cart or order line item.
    LineItemId
);
uuid_id!(
    /// Identifier of a shipping method.
    ShippingMethodId
);
uuid_id!(
    /// Identifier of the parent payment collection of a checkout.
    PaymentCollectionId
);
uuid_id!(
    /// Identifier of a sales channel.
    SalesChannelId
);
uuid_id!(
    /// Identifier of an order set (one split checkout).
    OrderSetId
);
uuid_id!(
    /// Identifier of a single seller order.
    OrderId
);
uuid_id!(
    /// Identifier of a commission rule.
    CommissionRuleId
);
uuid_id!(
    /// Identifier of a commission line.
    CommissionLineId
);
uuid_id!(
    /// Identifier of a payout.
    PayoutId
);
uuid_id!(
    /// Identifier of a payout reversal.
    PayoutReversalId
);

string_id!(
    /// Product identifier.
    ProductId
);
string_id!(
    /// Product type identifier.
    ProductTypeId
);
string_id!(
    /// Product collection identifier.
    CollectionId
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_id_new_creates_unique_ids() {
        let id1 = AggregateId::new();
        let id2 = AggregateId::new();
        assert_ne!(id1, id2);
    }

    #[test]
    fn aggregate_id_from_uuid_preserves_value() {
        let uuid = Uuid::new_v4();
        let id = AggregateId::from_uuid(uuid);
        assert_eq!(id.as_uuid(), uuid);
    }

    #[test]
    fn aggregate_id_derived_is_stable() {
        let namespace = Uuid::new_v4();
        let a = AggregateId::derived(&namespace, "place_order_set:cart-1");
        let b = AggregateId::derived(&namespace, "place_order_set:cart-1");
        let c = AggregateId::derived(&namespace, "place_order_set:cart-2");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }

    #[test]
    fn aggregate_id_parses_from_string() {
        let id = AggregateId::new();
        let parsed: AggregateId = id.to_string().parse().unwrap();
        assert_eq!(id, parsed);
        assert!("not-a-uuid".parse::<AggregateId>().is_err());
    }

    #[test]
    fn typed_ids_serialize_transparently() {
        let seller = SellerId::new();
        let json = serde_json::to_string(&seller).unwrap();
        assert_eq!(json, format!("\"{}\"", seller));
        let back: SellerId = serde_json::from_str(&json).unwrap();
        assert_eq!(seller, back);
    }

    #[test]
    fn string_ids_convert() {
        let product: ProductId = "prod_01".into();
        assert_eq!(product.as_str(), "prod_01");
        assert_eq!(ProductTypeId::new("shoes").to_string(), "shoes");
    }
}
