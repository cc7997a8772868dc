/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;

/// Vendor identifier as issued by the vendor service.
pub type VendorId = String;

/// Inventory item identifier, unique within a vendor.
pub type ItemId = String;

/// Identifier of a checkout attempt holding locks. For checkout sessions this
/// is the payment session id, so it may not correspond to a persisted order.
pub type HolderId = String;
