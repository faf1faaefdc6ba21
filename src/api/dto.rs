//! Request and response bodies of the remote cart API.

use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::domain::aggregates::NewLine;
use crate::domain::value_objects::{LineKey, LineKeyError, Money};

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AddLineRequest {
    #[validate(length(min = 1, max = 128))]
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 128))]
    pub variant_id: Option<String>,
    pub unit_price: Money,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub compare_at_price: Option<Money>,
    #[validate(range(min = 1, max = 100000))]
    pub quantity: i64,
}

impl AddLineRequest {
    pub fn into_line(self) -> Result<NewLine, LineKeyError> {
        let key = LineKey::new(self.product_id, self.variant_id)?;
        Ok(NewLine {
            key,
            unit_price: self.unit_price,
            compare_at_price: self.compare_at_price,
            quantity: u32::try_from(self.quantity).unwrap_or(0),
        })
    }
}

impl From<&NewLine> for AddLineRequest {
    fn from(line: &NewLine) -> Self {
        Self {
            product_id: line.key.product_id.clone(),
            variant_id: line.key.variant_id.clone(),
            unit_price: line.unit_price,
            compare_at_price: line.compare_at_price,
            quantity: i64::from(line.quantity),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct SetQuantityRequest {
    #[validate(length(min = 1, max = 128))]
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 128))]
    pub variant_id: Option<String>,
    /// Zero or negative deletes the line.
    pub quantity: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LineRef {
    #[validate(length(min = 1, max = 128))]
    pub product_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 128))]
    pub variant_id: Option<String>,
}

impl LineRef {
    pub fn key(&self) -> Result<LineKey, LineKeyError> {
        LineKey::new(self.product_id.clone(), self.variant_id.clone())
    }
}

impl From<&LineKey> for LineRef {
    fn from(key: &LineKey) -> Self {
        Self { product_id: key.product_id.clone(), variant_id: key.variant_id.clone() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
