use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InquiryStatus {
    Pending,
    Contacted,
    Quoted,
    Closed,
}

impl Default for InquiryStatus {
    fn default() -> Self {
        Self::Pending
    }
}

impl InquiryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Contacted => "contacted",
            Self::Quoted => "quoted",
            Self::Closed => "closed",
        }
    }
}

/// Bulk-purchase inquiry raised by a signed-in customer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryData {
    pub user_id: String,
    pub user_type: String,
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub product_specification: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<String>,
    pub contact_name: String,
    pub contact_email: String,
    pub contact_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub additional_requirements: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Inquiry {
    pub id: String,
    #[serde(flatten)]
    pub data: InquiryData,
    #[serde(default)]
    pub status: InquiryStatus,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

/// Inquiry form shown on the owner dashboard. Mirrored to device storage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InquiryForm {
    pub user_type: String,
    pub phone: String,
    pub email: String,
    pub address: String,
    pub pincode: String,
    pub brand: String,
    pub color: String,
    pub quantity: String,
    pub unit: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredInquiry {
    pub id: String,
    pub created_at: DateTime<Utc>,
    #[serde(flatten)]
    pub form: InquiryForm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<InquiryStatus>,
}

/// Fields every cached dashboard inquiry must carry.
pub const STORED_INQUIRY_FIELDS: [&str; 11] = [
    "id",
    "createdAt",
    "userType",
    "phone",
    "email",
    "address",
    "pincode",
    "brand",
    "color",
    "quantity",
    "unit",
];
