use super::UserId;
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt::{Debug, Display};
use std::hash::Hash;

/// Trait that any row type must implement to be kept in a synced collection.
///
/// # Architecture Note
/// The collection, the in-memory store and the mock backend only need to key,
/// scope and order rows. Everything else about a row is business data they
/// never look at, so they are written once against this contract and reused
/// for every table.
///
/// The `Id` must be convertible from `u64` so that a store can assign ids from
/// a sequential counter, the way the backend's serial primary key does.
pub trait SyncRecord: Clone + Debug + PartialEq + Send + Sync + 'static {
    /// Server-assigned unique key.
    type Id: Eq + Hash + Clone + Send + Sync + Display + Debug + From<u64>;

    /// Payload accepted by a store to create a new row (DTO).
    type Insert: Send + Sync + Debug;

    /// Backend table (or collection) holding these rows.
    const TABLE: &'static str;

    fn id(&self) -> &Self::Id;

    /// The user that owns the row.
    fn owner_id(&self) -> &UserId;

    fn created_at(&self) -> DateTime<Utc>;

    /// Owner named by an insert payload, used to route change notifications.
    fn insert_owner(params: &Self::Insert) -> &UserId;

    /// Builds the stored row once the store has assigned an id and a timestamp.
    fn from_insert(id: Self::Id, created_at: DateTime<Utc>, params: Self::Insert) -> Self;

    /// Rows served in demo mode. Must not depend on the network.
    fn demo_fixtures() -> Vec<Self> {
        Vec::new()
    }
}

/// Sorts rows newest first. The sort is stable, so rows sharing a timestamp
/// keep the order the backend returned them in.
pub fn sort_newest_first<T: SyncRecord>(rows: &mut [T]) {
    rows.sort_by(|a, b| b.created_at().cmp(&a.created_at()));
}

/// Serial primary key of a `total_tva` row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub u64);

impl Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RecordId {
    fn from(id: u64) -> Self {
        Self(id)
    }
}

/// A VAT summary line extracted from one receipt or invoice.
///
/// Field names on the wire follow the backend's column names.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TvaRecord {
    pub id: RecordId,
    pub user_id: UserId,
    #[serde(default)]
    pub date: Option<NaiveDate>,
    #[serde(rename = "numero_facture", default)]
    pub invoice_number: Option<String>,
    #[serde(rename = "vendeur", default)]
    pub vendor: Option<String>,
    #[serde(rename = "montant_ttc", default)]
    pub amount_incl_tax: Option<f64>,
    #[serde(rename = "tva_20", default)]
    pub vat_20: Option<f64>,
    #[serde(rename = "tva_10", default)]
    pub vat_10: Option<f64>,
    #[serde(rename = "tva_5_5", default)]
    pub vat_5_5: Option<f64>,
    pub created_at: DateTime<Utc>,
}

/// Payload for inserting a new `total_tva` row.
#[derive(Debug, Clone, Default)]
pub struct TvaInsert {
    pub user_id: UserId,
    pub date: Option<NaiveDate>,
    pub invoice_number: Option<String>,
    pub vendor: Option<String>,
    pub amount_incl_tax: Option<f64>,
    pub vat_20: Option<f64>,
    pub vat_10: Option<f64>,
    pub vat_5_5: Option<f64>,
}

impl TvaInsert {
    pub fn new(user_id: impl Into<String>) -> Self {
        Self {
            user_id: UserId::new(user_id),
            ..Self::default()
        }
    }

    pub fn invoice(mut self, number: impl Into<String>, vendor: impl Into<String>) -> Self {
        self.invoice_number = Some(number.into());
        self.vendor = Some(vendor.into());
        self
    }

    pub fn amounts(mut self, incl_tax: f64, vat_20: f64) -> Self {
        self.amount_incl_tax = Some(incl_tax);
        self.vat_20 = Some(vat_20);
        self
    }
}

/// Owner of the demo fixture rows.
pub const DEMO_USER: &str = "demo-user";

impl SyncRecord for TvaRecord {
    type Id = RecordId;
    type Insert = TvaInsert;

    const TABLE: &'static str = "total_tva";

    fn id(&self) -> &RecordId {
        &self.id
    }

    fn owner_id(&self) -> &UserId {
        &self.user_id
    }

    fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn insert_owner(params: &TvaInsert) -> &UserId {
        &params.user_id
    }

    fn from_insert(id: RecordId, created_at: DateTime<Utc>, params: TvaInsert) -> Self {
        Self {
            id,
            user_id: params.user_id,
            date: params.date,
            invoice_number: params.invoice_number,
            vendor: params.vendor,
            amount_incl_tax: params.amount_incl_tax,
            vat_20: params.vat_20,
            vat_10: params.vat_10,
            vat_5_5: params.vat_5_5,
            created_at,
        }
    }

    /// Two receipts, newest first. Each fixture is stamped at midnight UTC of its date.
    fn demo_fixtures() -> Vec<Self> {
        [
            (1, (2024, 1, 15), "FAC001", "Carrefour", 25.50, 4.2),
            (2, (2024, 1, 10), "AMZ002", "Amazon", 48.00, 8.0),
        ]
        .into_iter()
        .filter_map(|(id, (year, month, day), invoice, vendor, total, vat_20)| {
            let date = NaiveDate::from_ymd_opt(year, month, day)?;
            let created_at = date.and_hms_opt(0, 0, 0)?.and_utc();
            Some(Self {
                id: RecordId(id),
                user_id: UserId::from(DEMO_USER),
                date: Some(date),
                invoice_number: Some(invoice.to_string()),
                vendor: Some(vendor.to_string()),
                amount_incl_tax: Some(total),
                vat_20: Some(vat_20),
                vat_10: Some(0.0),
                vat_5_5: Some(0.0),
                created_at,
            })
        })
        .collect()
    }
}
