//! Core types for the credit ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode)
//! - Memory safety (no unsafe code)
//! - Exact arithmetic (integer micro-units for money)

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Number of micro-units in one whole credit unit.
pub const MICROS_PER_UNIT: i128 = 1_000_000;

/// A signed monetary amount in micro-units.
///
/// 1 unit = 1,000,000 micro-units. Backed by `i128`; floating point never
/// appears on any path that touches an amount.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct MicroUnits(i128);

impl MicroUnits {
    /// Zero micro-units
    pub const ZERO: MicroUnits = MicroUnits(0);

    /// Create from a raw micro-unit count
    pub const fn new(micro: i128) -> Self {
        Self(micro)
    }

    /// Create from whole credit units
    pub const fn from_units(units: i64) -> Self {
        Self(units as i128 * MICROS_PER_UNIT)
    }

    /// Raw micro-unit count
    pub const fn raw(self) -> i128 {
        self.0
    }

    /// True if the amount is strictly negative
    pub const fn is_negative(self) -> bool {
        self.0 < 0
    }

    /// True if the amount is strictly positive
    pub const fn is_positive(self) -> bool {
        self.0 > 0
    }

    /// True if the amount is zero
    pub const fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Checked addition
    pub fn checked_add(self, rhs: MicroUnits) -> Option<MicroUnits> {
        self.0.checked_add(rhs.0).map(MicroUnits)
    }

    /// Checked subtraction
    pub fn checked_sub(self, rhs: MicroUnits) -> Option<MicroUnits> {
        self.0.checked_sub(rhs.0).map(MicroUnits)
    }

    /// Checked negation
    pub fn checked_neg(self) -> Option<MicroUnits> {
        self.0.checked_neg().map(MicroUnits)
    }

    /// Big-endian byte encoding (for hashing)
    pub fn to_be_bytes(self) -> [u8; 16] {
        self.0.to_be_bytes()
    }
}

impl fmt::Display for MicroUnits {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sign = if self.0 < 0 { "-" } else { "" };
        let abs = self.0.unsigned_abs();
        let units = abs / MICROS_PER_UNIT as u128;
        let frac = abs % MICROS_PER_UNIT as u128;
        write!(f, "{}{}.{:06}", sign, units, frac)
    }
}

/// Validates tenant and pool identifiers: non-empty, at most 64 bytes,
/// ASCII alphanumeric plus `-` and `_`. The storage layer embeds these in
/// composite keys, so the charset must exclude the `|` separator.
pub(crate) fn valid_ident(s: &str) -> bool {
    !s.is_empty()
        && s.len() <= 64
        && s.bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Tenant identifier. Every storage key is prefixed with the tenant, so a
/// bound tenant structurally scopes all reads and writes.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct TenantId(String);

impl TenantId {
    /// Create a validated tenant ID. Empty or malformed input means no
    /// tenant is bound, which is not retryable without rebinding.
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if !valid_ident(&id) {
            return Err(crate::Error::TenantContextMissing);
        }
        Ok(Self(id))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TenantId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Named partition of an account's balance (e.g. `"general"`).
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct PoolId(String);

impl PoolId {
    /// Create a validated pool ID
    pub fn new(id: impl Into<String>) -> crate::Result<Self> {
        let id = id.into();
        if !valid_ident(&id) {
            return Err(crate::Error::InvalidIdentifier(id));
        }
        Ok(Self(id))
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PoolId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! uuid_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a fresh time-ordered (UUIDv7) ID
            pub fn generate() -> Self {
                Self(Uuid::now_v7())
            }

            /// Wrap an existing UUID
            pub const fn from_uuid(id: Uuid) -> Self {
                Self(id)
            }

            /// Underlying UUID
            pub const fn as_uuid(&self) -> Uuid {
                self.0
            }

            /// Raw bytes (for storage keys)
            pub fn as_bytes(&self) -> &[u8; 16] {
                self.0.as_bytes()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

uuid_id! {
    /// Opaque, globally unique account identifier
    AccountId
}
uuid_id! {
    /// Credit lot identifier
    LotId
}
uuid_id! {
    /// Reservation identifier
    ReservationId
}
uuid_id! {
    /// Ledger entry identifier
    EntryId
}

/// Kind of balance-holding entity
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum EntityType {
    /// A human user
    Person = 1,
    /// A community / guild / server
    Community = 2,
    /// An autonomous agent
    Agent = 3,
}

impl EntityType {
    /// Stable code (used in storage keys)
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// External reference an account is keyed on. Account creation is
/// idempotent on this pair.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct EntityRef {
    /// Entity discriminator
    pub entity_type: EntityType,
    /// External identifier (platform user id, community id, ...)
    pub entity_id: String,
}

impl EntityRef {
    /// Create an entity reference
    pub fn new(entity_type: EntityType, entity_id: impl Into<String>) -> Self {
        Self {
            entity_type,
            entity_id: entity_id.into(),
        }
    }
}

/// Identity for a balance holder. Owns no money, only identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Account {
    /// Opaque, globally unique ID
    pub id: AccountId,

    /// External reference this account is keyed on
    pub entity: EntityRef,

    /// Optimistic-concurrency counter, bumped only by the registry
    pub version: u64,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,
}

/// Origin of a credit lot
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[repr(u8)]
pub enum SourceType {
    /// Payment-provider deposit
    Deposit = 1,
    /// Credit transferred in from another account
    TransferIn = 2,
    /// Token-bound-account deposit
    TbaDeposit = 3,
    /// Revenue-share distribution
    RevenueShare = 4,
}

impl SourceType {
    /// Stable code (used in storage keys)
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// Human-readable name (used in idempotency keys)
    pub const fn as_str(self) -> &'static str {
        match self {
            SourceType::Deposit => "deposit",
            SourceType::TransferIn => "transfer_in",
            SourceType::TbaDeposit => "tba_deposit",
            SourceType::RevenueShare => "revenue_share",
        }
    }
}

/// One funding event's worth of credit, trisected into
/// available / reserved / consumed portions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditLot {
    /// Lot ID (UUIDv7, time-ordered)
    pub id: LotId,

    /// Owning account
    pub account_id: AccountId,

    /// Balance pool
    pub pool_id: PoolId,

    /// Funding origin
    pub source_type: SourceType,

    /// External dedup key, unique per source type
    pub source_id: String,

    /// Minted amount. Write-once: never changes after creation.
    pub original: MicroUnits,

    /// Portion free to reserve
    pub available: MicroUnits,

    /// Portion held by pending reservations
    pub reserved: MicroUnits,

    /// Portion finalized away
    pub consumed: MicroUnits,

    /// Optimistic-concurrency counter, bumped on every write
    pub version: u64,

    /// Creation timestamp (FIFO consumption order key)
    pub created_at: DateTime<Utc>,
}

impl CreditLot {
    /// Validate lot conservation: `available + reserved + consumed == original`
    /// with no negative portion. Called by the engine before every commit and
    /// again by the storage layer inside the commit.
    pub fn validate(&self) -> crate::Result<()> {
        if self.available.is_negative() || self.reserved.is_negative() || self.consumed.is_negative()
        {
            return Err(crate::Error::InvariantViolation(format!(
                "lot {} has a negative partition: available={} reserved={} consumed={}",
                self.id, self.available, self.reserved, self.consumed
            )));
        }
        let sum = self
            .available
            .checked_add(self.reserved)
            .and_then(|s| s.checked_add(self.consumed))
            .ok_or_else(|| {
                crate::Error::InvariantViolation(format!("lot {} partition sum overflow", self.id))
            })?;
        if sum != self.original {
            return Err(crate::Error::InvariantViolation(format!(
                "lot {} partitions sum to {} but original is {}",
                self.id, sum, self.original
            )));
        }
        Ok(())
    }
}

/// Reservation lifecycle state. `Finalized`, `Released` and `Expired` are
/// terminal: no operation transitions out of them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u8)]
pub enum ReservationStatus {
    /// Hold is live; finalize/release/expire may act on it
    Pending = 1,
    /// Consumed (terminal)
    Finalized = 2,
    /// Returned by the caller (terminal)
    Released = 3,
    /// Returned by the liveness watchdog (terminal)
    Expired = 4,
}

impl ReservationStatus {
    /// True for the absorbing states
    pub const fn is_terminal(self) -> bool {
        !matches!(self, ReservationStatus::Pending)
    }
}

impl fmt::Display for ReservationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReservationStatus::Pending => "pending",
            ReservationStatus::Finalized => "finalized",
            ReservationStatus::Released => "released",
            ReservationStatus::Expired => "expired",
        };
        write!(f, "{}", s)
    }
}

/// How much of a reservation is held against one lot
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LotAllocation {
    /// Lot the hold sits on
    pub lot_id: LotId,
    /// Amount held against that lot
    pub amount: MicroUnits,
}

/// A temporary hold against one or more lots pending finalization or release
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reservation {
    /// Reservation ID
    pub id: ReservationId,

    /// Owning account
    pub account_id: AccountId,

    /// Balance pool
    pub pool_id: PoolId,

    /// Total amount held
    pub amount: MicroUnits,

    /// Lifecycle state
    pub status: ReservationStatus,

    /// Per-lot holds, summing to `amount`
    pub allocations: Vec<LotAllocation>,

    /// Optimistic-concurrency counter
    pub version: u64,

    /// Creation timestamp (watchdog expiry key)
    pub created_at: DateTime<Utc>,

    /// When the reservation entered a terminal state
    pub resolved_at: Option<DateTime<Utc>>,
}

impl Reservation {
    /// Sum of per-lot allocations
    pub fn allocated_total(&self) -> MicroUnits {
        self.allocations
            .iter()
            .fold(MicroUnits::ZERO, |acc, a| {
                acc.checked_add(a.amount).unwrap_or(acc)
            })
    }
}

/// Journal entry type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum EntryType {
    /// Lot minted (deposit / tba_deposit)
    Grant = 1,
    /// Hold placed
    Reserve = 2,
    /// Hold consumed
    Finalize = 3,
    /// Hold returned by the caller
    Release = 4,
    /// Hold returned by the watchdog
    Expired = 5,
    /// Credit arriving from another account
    TransferIn = 6,
    /// Credit leaving for another account
    TransferOut = 7,
    /// Revenue-share distribution minted
    RevenueShare = 8,
    /// Shadow-billing comparator record (no lot effect)
    ShadowReserve = 9,
    /// Shadow-billing comparator record (no lot effect)
    ShadowFinalize = 10,
}

impl EntryType {
    /// Stable code (hashed into the journal chain)
    pub const fn code(self) -> u8 {
        self as u8
    }

    /// True for the journal-only shadow entry types, which never touch lots
    /// and are excluded from conservation sums.
    pub const fn is_shadow(self) -> bool {
        matches!(self, EntryType::ShadowReserve | EntryType::ShadowFinalize)
    }

    /// True for entry types that record minting (they add to Σ minted)
    pub const fn is_mint(self) -> bool {
        matches!(
            self,
            EntryType::Grant | EntryType::TransferIn | EntryType::RevenueShare
        )
    }
}

/// An immutable journal row explaining one balance-affecting event.
///
/// Entries are append-only: the storage interface exposes no update or
/// delete for them, and each entry is hash-chained to its predecessor so any
/// after-the-fact mutation is detectable by the conservation checker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Entry ID
    pub id: EntryId,

    /// Account the entry explains
    pub account_id: AccountId,

    /// Balance pool
    pub pool_id: PoolId,

    /// 1-based, gapless sequence per (account, pool)
    pub entry_seq: u64,

    /// What happened
    pub entry_type: EntryType,

    /// Signed amount (reserve/finalize are negative, mints positive,
    /// release/expired zero)
    pub amount: MicroUnits,

    /// Caller-derived token making retried writes no-ops; unique per tenant
    pub idempotency_key: String,

    /// Reservation / lot / transfer this entry explains, if any
    pub reference: Option<Uuid>,

    /// Hash of the previous entry in this (account, pool) chain
    /// (all zeroes for seq 1)
    pub prev_hash: [u8; 32],

    /// Hash over this entry's content and `prev_hash`
    pub entry_hash: [u8; 32],

    /// Append timestamp
    pub created_at: DateTime<Utc>,
}

/// Summed balance across all lots of one (account, pool)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Balance {
    /// Free to reserve
    pub available: MicroUnits,
    /// Held by pending reservations
    pub reserved: MicroUnits,
    /// Finalized away
    pub consumed: MicroUnits,
    /// Total ever minted into the pool
    pub original: MicroUnits,
}

impl Balance {
    /// The zero balance
    pub const ZERO: Balance = Balance {
        available: MicroUnits::ZERO,
        reserved: MicroUnits::ZERO,
        consumed: MicroUnits::ZERO,
        original: MicroUnits::ZERO,
    };
}

/// Result of a completed transfer between accounts
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transfer {
    /// Transfer ID (shared by both journal entries)
    pub id: Uuid,

    /// Source account
    pub from_account: AccountId,

    /// Destination account
    pub to_account: AccountId,

    /// Pool on both sides
    pub pool_id: PoolId,

    /// Amount moved
    pub amount: MicroUnits,

    /// Lot minted on the destination side
    pub minted_lot: LotId,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_micro_units_display() {
        assert_eq!(MicroUnits::new(1_500_000).to_string(), "1.500000");
        assert_eq!(MicroUnits::new(-250_000).to_string(), "-0.250000");
        assert_eq!(MicroUnits::ZERO.to_string(), "0.000000");
    }

    #[test]
    fn test_micro_units_checked_math() {
        let a = MicroUnits::new(i128::MAX);
        assert!(a.checked_add(MicroUnits::new(1)).is_none());
        assert_eq!(
            MicroUnits::from_units(2).checked_sub(MicroUnits::new(500_000)),
            Some(MicroUnits::new(1_500_000))
        );
    }

    #[test]
    fn test_tenant_id_validation() {
        assert!(TenantId::new("acme-prod_1").is_ok());
        assert!(TenantId::new("").is_err());
        assert!(TenantId::new("has|pipe").is_err());
        assert!(TenantId::new("a".repeat(65)).is_err());
    }

    #[test]
    fn test_pool_id_validation() {
        assert!(PoolId::new("general").is_ok());
        assert!(PoolId::new("bad pool").is_err());
    }

    #[test]
    fn test_lot_validate_conservation() {
        let mut lot = CreditLot {
            id: LotId::generate(),
            account_id: AccountId::generate(),
            pool_id: PoolId::new("general").unwrap(),
            source_type: SourceType::Deposit,
            source_id: "dep-1".to_string(),
            original: MicroUnits::from_units(1),
            available: MicroUnits::new(400_000),
            reserved: MicroUnits::new(600_000),
            consumed: MicroUnits::ZERO,
            version: 1,
            created_at: Utc::now(),
        };
        assert!(lot.validate().is_ok());

        lot.reserved = MicroUnits::new(700_000);
        assert!(lot.validate().is_err());

        lot.reserved = MicroUnits::new(600_000);
        lot.available = MicroUnits::new(-200_000);
        lot.consumed = MicroUnits::new(600_000);
        assert!(lot.validate().is_err());
    }

    #[test]
    fn test_reservation_status_terminal() {
        assert!(!ReservationStatus::Pending.is_terminal());
        assert!(ReservationStatus::Finalized.is_terminal());
        assert!(ReservationStatus::Released.is_terminal());
        assert!(ReservationStatus::Expired.is_terminal());
    }
}
