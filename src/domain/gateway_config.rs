use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::order_id::OrderIdRange;
use crate::service::test_card_gate::TestCardPolicy;

/// Settings key of the singleton gateway configuration.
pub const CONFIG_KEY: &str = "payment.ameria.config";
pub const CONFIG_DESCRIPTION: &str = "Ameria Bank payment gateway configuration";
pub const DEFAULT_CURRENCY: &str = "AMD";

fn default_true() -> bool {
    true
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// Shape of the persisted JSON document. `password` holds the encryption envelope.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredGatewayConfig {
    #[serde(default)]
    pub client_id: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_true")]
    pub test_mode: bool,
    #[serde(default)]
    pub return_url: String,
    #[serde(default)]
    pub callback_url: String,
    #[serde(default = "default_currency")]
    pub currency: String,
    #[serde(default)]
    pub is_active: bool,
    #[serde(default)]
    pub activated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub last_validated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub order_id_min: Option<i64>,
    #[serde(default)]
    pub order_id_max: Option<i64>,
    #[serde(default)]
    pub allowed_test_cards: Vec<String>,
    #[serde(default = "default_true")]
    pub test_card_strict_mode: bool,
}

impl StoredGatewayConfig {
    pub fn empty() -> Self {
        Self {
            client_id: String::new(),
            username: String::new(),
            password: String::new(),
            test_mode: true,
            return_url: String::new(),
            callback_url: String::new(),
            currency: default_currency(),
            is_active: false,
            activated_at: None,
            last_validated_at: None,
            order_id_min: None,
            order_id_max: None,
            allowed_test_cards: Vec::new(),
            test_card_strict_mode: true,
        }
    }

    /// Decrypted view; `password` is supplied by the caller.
    pub fn into_config(self, password: String) -> GatewayConfig {
        GatewayConfig {
            client_id: self.client_id,
            username: self.username,
            password,
            test_mode: self.test_mode,
            return_url: self.return_url,
            callback_url: self.callback_url,
            currency: if self.currency.trim().is_empty() {
                default_currency()
            } else {
                self.currency
            },
            is_active: self.is_active,
            activated_at: self.activated_at,
            last_validated_at: self.last_validated_at,
            order_id_min: self.order_id_min,
            order_id_max: self.order_id_max,
            allowed_test_cards: self.allowed_test_cards,
            test_card_strict_mode: self.test_card_strict_mode,
        }
    }
}

/// Decrypted gateway configuration.
#[derive(Clone)]
pub struct GatewayConfig {
    pub client_id: String,
    pub username: String,
    pub password: String,
    pub test_mode: bool,
    pub return_url: String,
    pub callback_url: String,
    pub currency: String,
    pub is_active: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub order_id_min: Option<i64>,
    pub order_id_max: Option<i64>,
    pub allowed_test_cards: Vec<String>,
    pub test_card_strict_mode: bool,
}

impl std::fmt::Debug for GatewayConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayConfig")
            .field("client_id", &self.client_id)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .field("test_mode", &self.test_mode)
            .field("return_url", &self.return_url)
            .field("currency", &self.currency)
            .field("is_active", &self.is_active)
            .field("order_id_min", &self.order_id_min)
            .field("order_id_max", &self.order_id_max)
            .field("allowed_test_cards", &self.allowed_test_cards)
            .field("test_card_strict_mode", &self.test_card_strict_mode)
            .finish()
    }
}

impl GatewayConfig {
    pub fn order_id_range(&self) -> Option<OrderIdRange> {
        OrderIdRange::new(self.order_id_min, self.order_id_max)
    }

    pub fn test_card_policy(&self) -> TestCardPolicy {
        TestCardPolicy {
            allowed_last4: self.allowed_test_cards.clone(),
            strict_mode: self.test_card_strict_mode,
        }
    }

    pub fn view(&self) -> GatewayConfigView {
        GatewayConfigView {
            client_id: self.client_id.clone(),
            username: self.username.clone(),
            has_password: !self.password.is_empty(),
            test_mode: self.test_mode,
            return_url: self.return_url.clone(),
            callback_url: self.callback_url.clone(),
            currency: self.currency.clone(),
            is_active: self.is_active,
            activated_at: self.activated_at,
            last_validated_at: self.last_validated_at,
            order_id_min: self.order_id_min,
            order_id_max: self.order_id_max,
            allowed_test_cards: self.allowed_test_cards.clone(),
            test_card_strict_mode: self.test_card_strict_mode,
        }
    }

    /// Current values as a patch, the base admin edits are validated against.
    pub fn to_patch(&self) -> GatewayConfigPatch {
        GatewayConfigPatch {
            client_id: Some(self.client_id.clone()),
            username: Some(self.username.clone()),
            password: Some(self.password.clone()).filter(|p| !p.is_empty()),
            test_mode: Some(self.test_mode),
            return_url: Some(self.return_url.clone()),
            callback_url: Some(self.callback_url.clone()),
            currency: Some(self.currency.clone()),
            is_active: Some(self.is_active),
            last_validated_at: self.last_validated_at,
            order_id_min: Some(self.order_id_min),
            order_id_max: Some(self.order_id_max),
            allowed_test_cards: Some(self.allowed_test_cards.clone()),
            test_card_strict_mode: Some(self.test_card_strict_mode),
        }
    }
}

/// Treats an explicit JSON `null` as `Some(None)` so it can be told apart from an absent field.
fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Admin save payload; absent fields keep their stored value. The order id bounds
/// are cleared by an explicit `null`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigPatch {
    pub client_id: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub test_mode: Option<bool>,
    pub return_url: Option<String>,
    pub callback_url: Option<String>,
    pub currency: Option<String>,
    pub is_active: Option<bool>,
    pub last_validated_at: Option<DateTime<Utc>>,
    #[serde(default, deserialize_with = "nullable")]
    pub order_id_min: Option<Option<i64>>,
    #[serde(default, deserialize_with = "nullable")]
    pub order_id_max: Option<Option<i64>>,
    pub allowed_test_cards: Option<Vec<String>>,
    pub test_card_strict_mode: Option<bool>,
}

impl GatewayConfigPatch {
    /// Order id bounds after the patch, `None` where unset or cleared.
    pub fn order_id_bounds(&self) -> (Option<i64>, Option<i64>) {
        (self.order_id_min.flatten(), self.order_id_max.flatten())
    }

    /// `other` wins wherever it has a value.
    pub fn overlay(self, other: GatewayConfigPatch) -> GatewayConfigPatch {
        GatewayConfigPatch {
            client_id: other.client_id.or(self.client_id),
            username: other.username.or(self.username),
            password: other.password.filter(|p| !p.is_empty()).or(self.password),
            test_mode: other.test_mode.or(self.test_mode),
            return_url: other.return_url.or(self.return_url),
            callback_url: other.callback_url.or(self.callback_url),
            currency: other.currency.or(self.currency),
            is_active: other.is_active.or(self.is_active),
            last_validated_at: other.last_validated_at.or(self.last_validated_at),
            order_id_min: other.order_id_min.or(self.order_id_min),
            order_id_max: other.order_id_max.or(self.order_id_max),
            allowed_test_cards: other.allowed_test_cards.or(self.allowed_test_cards),
            test_card_strict_mode: other.test_card_strict_mode.or(self.test_card_strict_mode),
        }
    }
}

/// Admin read model. The password is never echoed, only whether one is stored.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GatewayConfigView {
    pub client_id: String,
    pub username: String,
    pub has_password: bool,
    pub test_mode: bool,
    pub return_url: String,
    pub callback_url: String,
    pub currency: String,
    pub is_active: bool,
    pub activated_at: Option<DateTime<Utc>>,
    pub last_validated_at: Option<DateTime<Utc>>,
    pub order_id_min: Option<i64>,
    pub order_id_max: Option<i64>,
    pub allowed_test_cards: Vec<String>,
    pub test_card_strict_mode: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stored_document_fills_defaults() {
        let stored: StoredGatewayConfig =
            serde_json::from_value(serde_json::json!({"clientId": "c", "username": "u"})).unwrap();
        assert!(stored.test_mode);
        assert!(stored.test_card_strict_mode);
        assert!(!stored.is_active);
        assert_eq!(stored.currency, "AMD");
        assert!(stored.allowed_test_cards.is_empty());
    }

    #[test]
    fn debug_redacts_password() {
        let config = StoredGatewayConfig::empty().into_config("hunter22".to_string());
        let rendered = format!("{config:?}");
        assert!(!rendered.contains("hunter22"));
        assert!(rendered.contains("<redacted>"));
    }

    #[test]
    fn view_hides_password() {
        let config = StoredGatewayConfig::empty().into_config("hunter22".to_string());
        let json = serde_json::to_value(config.view()).unwrap();
        assert!(json.get("password").is_none());
        assert_eq!(json["hasPassword"], true);
    }

    #[test]
    fn overlay_keeps_stored_password_when_blank() {
        let base = GatewayConfigPatch {
            password: Some("stored".into()),
            username: Some("old".into()),
            ..Default::default()
        };
        let merged = base.overlay(GatewayConfigPatch {
            password: Some(String::new()),
            username: Some("new".into()),
            ..Default::default()
        });
        assert_eq!(merged.password.as_deref(), Some("stored"));
        assert_eq!(merged.username.as_deref(), Some("new"));
    }

    #[test]
    fn null_bound_differs_from_absent() {
        let patch: GatewayConfigPatch =
            serde_json::from_value(serde_json::json!({"orderIdMin": null, "orderIdMax": 900})).unwrap();
        assert_eq!(patch.order_id_min, Some(None));
        assert_eq!(patch.order_id_max, Some(Some(900)));

        let absent: GatewayConfigPatch = serde_json::from_value(serde_json::json!({})).unwrap();
        assert_eq!(absent.order_id_min, None);

        let base = GatewayConfigPatch {
            order_id_min: Some(Some(100)),
            order_id_max: Some(Some(900)),
            ..Default::default()
        };
        let merged = base.overlay(patch);
        assert_eq!(merged.order_id_bounds(), (None, Some(900)));
    }
}
