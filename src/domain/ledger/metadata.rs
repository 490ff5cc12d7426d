//! Typed correlation metadata attached to ledger transactions.
//!
//! Persisted as a JSON document. The named fields are the stable keys the
//! reconciler searches on; anything else lands in `extra`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value as JsonValue};

use crate::domain::foundation::{PlanId, SubscriptionId, TaskId, TransactionId};

/// Stable JSON field name for the provider checkout id.
pub const CHECKOUT_ID_KEY: &str = "checkout_id";

/// Stable JSON field name for the request id given to the provider.
pub const REQUEST_ID_KEY: &str = "request_id";

/// Correlation and context keys recorded on a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionMetadata {
    /// External checkout session id issued by the payment provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub checkout_id: Option<String>,

    /// Request id handed to the payment provider at checkout creation,
    /// or the provider charge id for recurring charges.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subscription_id: Option<SubscriptionId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<PlanId>,

    /// Monthly grant counter for EARN transactions (1-based).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub month: Option<u32>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub feature_key: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub task_id: Option<TaskId>,

    /// Transaction this one compensates or derives from (refunds, grants).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub related_transaction_id: Option<TransactionId>,

    /// Open extension bag for caller-specific context.
    #[serde(default, flatten)]
    pub extra: Map<String, JsonValue>,
}

impl TransactionMetadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_checkout_id(mut self, id: impl Into<String>) -> Self {
        self.checkout_id = Some(id.into());
        self
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    pub fn with_subscription(mut self, id: SubscriptionId) -> Self {
        self.subscription_id = Some(id);
        self
    }

    pub fn with_plan(mut self, id: PlanId) -> Self {
        self.plan_id = Some(id);
        self
    }

    pub fn with_month(mut self, month: u32) -> Self {
        self.month = Some(month);
        self
    }

    pub fn with_feature_key(mut self, key: impl Into<String>) -> Self {
        self.feature_key = Some(key.into());
        self
    }

    pub fn with_task(mut self, id: TaskId) -> Self {
        self.task_id = Some(id);
        self
    }

    pub fn with_related(mut self, id: TransactionId) -> Self {
        self.related_transaction_id = Some(id);
        self
    }

    /// Adds an extension value. Known field names are ignored so the typed
    /// keys can never be shadowed.
    pub fn with_extra(mut self, key: impl Into<String>, value: JsonValue) -> Self {
        let key = key.into();
        if !Self::is_reserved(&key) {
            self.extra.insert(key, value);
        }
        self
    }

    /// Merges an arbitrary JSON object into the extension bag.
    pub fn merge_extra(mut self, value: Option<JsonValue>) -> Self {
        if let Some(JsonValue::Object(map)) = value {
            for (key, value) in map {
                if !Self::is_reserved(&key) {
                    self.extra.insert(key, value);
                }
            }
        }
        self
    }

    /// Correlation keys carried by this metadata.
    pub fn correlation_keys(&self) -> CorrelationKeys {
        CorrelationKeys {
            checkout_id: self.checkout_id.clone(),
            request_id: self.request_id.clone(),
        }
    }

    fn is_reserved(key: &str) -> bool {
        matches!(
            key,
            "checkout_id"
                | "request_id"
                | "subscription_id"
                | "plan_id"
                | "month"
                | "feature_key"
                | "task_id"
                | "related_transaction_id"
        )
    }
}

/// Keys a payment confirmation carries to find its pending transaction.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CorrelationKeys {
    pub checkout_id: Option<String>,
    pub request_id: Option<String>,
}

impl CorrelationKeys {
    pub fn checkout(id: impl Into<String>) -> Self {
        Self {
            checkout_id: Some(id.into()),
            request_id: None,
        }
    }

    pub fn request(id: impl Into<String>) -> Self {
        Self {
            checkout_id: None,
            request_id: Some(id.into()),
        }
    }

    pub fn with_request_id(mut self, id: impl Into<String>) -> Self {
        self.request_id = Some(id.into());
        self
    }

    /// True when no usable key is present.
    pub fn is_empty(&self) -> bool {
        self.checkout_id.as_deref().map_or(true, str::is_empty)
            && self.request_id.as_deref().map_or(true, str::is_empty)
    }

    /// True if any present key equals the corresponding key in `metadata`.
    pub fn matches(&self, metadata: &TransactionMetadata) -> bool {
        let checkout_hit = match (&self.checkout_id, &metadata.checkout_id) {
            (Some(a), Some(b)) => !a.is_empty() && a == b,
            _ => false,
        };
        let request_hit = match (&self.request_id, &metadata.request_id) {
            (Some(a), Some(b)) => !a.is_empty() && a == b,
            _ => false,
        };
        checkout_hit || request_hit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn serializes_only_present_fields() {
        let metadata = TransactionMetadata::new().with_checkout_id("cs_1").with_month(2);
        let value = serde_json::to_value(&metadata).unwrap();
        assert_eq!(value, json!({ "checkout_id": "cs_1", "month": 2 }));
    }

    #[test]
    fn unknown_fields_land_in_extra() {
        let value = json!({ "request_id": "req-9", "campaign": "spring" });
        let metadata: TransactionMetadata = serde_json::from_value(value).unwrap();
        assert_eq!(metadata.request_id.as_deref(), Some("req-9"));
        assert_eq!(metadata.extra.get("campaign"), Some(&json!("spring")));
    }

    #[test]
    fn extra_cannot_shadow_typed_keys() {
        let metadata = TransactionMetadata::new()
            .with_request_id("req-1")
            .with_extra("request_id", json!("evil"))
            .merge_extra(Some(json!({ "checkout_id": "cs_evil", "note": "ok" })));
        assert_eq!(metadata.request_id.as_deref(), Some("req-1"));
        assert!(metadata.checkout_id.is_none());
        assert_eq!(metadata.extra.get("note"), Some(&json!("ok")));
    }

    #[test]
    fn correlation_matches_either_key() {
        let metadata = TransactionMetadata::new()
            .with_checkout_id("cs_1")
            .with_request_id("req-1");
        assert!(CorrelationKeys::checkout("cs_1").matches(&metadata));
        assert!(CorrelationKeys::request("req-1").matches(&metadata));
        assert!(!CorrelationKeys::checkout("cs_2").matches(&metadata));
    }

    #[test]
    fn empty_keys_never_match() {
        let metadata = TransactionMetadata::new().with_checkout_id("");
        let keys = CorrelationKeys::checkout("");
        assert!(keys.is_empty());
        assert!(!keys.matches(&metadata));
    }
}
